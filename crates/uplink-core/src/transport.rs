//! Registration transport seam.
//!
//! The transport owns the actual create/update network calls against the
//! remote registration service, including its own retry and backoff policy.
//! The orchestrator hands it one immutable payload snapshot per attempt and
//! expects exactly one terminal [`RegistrationOutcome`] back.
//!
//! Outcomes are delivered as return values and fed back through the
//! orchestrator's single serialization point, never invoked re-entrantly
//! from transport internals.

use async_trait::async_trait;

use crate::identity::ChannelIdentity;
use crate::payload::ChannelPayload;

/// Terminal outcome of one registration attempt.
///
/// One `register` call produces exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The remote service created (or re-associated) a channel identity.
    Created {
        /// Channel identifier assigned by the remote service.
        channel_id: String,
        /// Channel resource location for subsequent updates.
        channel_location: String,
        /// `true` if the channel already existed on the remote side.
        existing: bool,
    },

    /// The update call for an existing channel succeeded.
    Succeeded,

    /// The call did not succeed; the transport has exhausted its own retry
    /// policy for this attempt.
    Failed,
}

/// Performs channel create/update calls against the remote service.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Registers or updates the channel with the given payload snapshot.
    ///
    /// `channel` is `None` until a channel identity exists, in which case the
    /// transport must issue a create call. `forceful` requests that the
    /// transport bypass any payload-unchanged short-circuit of its own.
    async fn register(
        &self,
        channel: Option<&ChannelIdentity>,
        payload: &ChannelPayload,
        forceful: bool,
    ) -> RegistrationOutcome;
}
