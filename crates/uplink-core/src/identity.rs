//! Channel identity types.
//!
//! A channel is the remote service's identity record for one device
//! installation. It is created exactly once by the remote service on the
//! first successful registration and is immutable afterwards; the
//! orchestrator persists it opaquely through the settings store.

use serde::{Deserialize, Serialize};

/// The remote service's identity record for this device installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIdentity {
    /// Opaque channel identifier assigned by the remote service.
    pub channel_id: String,

    /// Opaque resource location for the channel, used for update calls.
    pub channel_location: String,
}

impl ChannelIdentity {
    /// Creates a new identity from the values reported by the remote service.
    #[must_use]
    pub fn new(channel_id: impl Into<String>, channel_location: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            channel_location: channel_location.into(),
        }
    }
}
