//! Settings persistence seam and typed access.
//!
//! Persistence is delegated to the host through [`SettingsStore`], a plain
//! key-value interface over JSON values. [`SettingsAccess`] layers typed,
//! serde-backed reads and writes on top; decode failures degrade to the
//! default value with a warning, never to an error surfaced to the host.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::{QuietTime, RegistrationSettings};
use crate::identity::ChannelIdentity;
use crate::payload::ChannelPayload;
use crate::tags::TagGroupDeltas;

/// Persistence keys.
///
/// Each registration preference and each piece of cached identity state is
/// stored under its own key so hosts can inspect or clear them individually.
pub mod keys {
    /// Whether user-visible notifications are enabled.
    pub const USER_NOTIFICATIONS_ENABLED: &str = "uplink.push.user_notifications_enabled";

    /// Whether background notifications are enabled.
    pub const BACKGROUND_NOTIFICATIONS_ENABLED: &str =
        "uplink.push.background_notifications_enabled";

    /// Whether the device token may be sent during registration.
    pub const TOKEN_REGISTRATION_ENABLED: &str = "uplink.push.token_registration_enabled";

    /// Device alias.
    pub const ALIAS: &str = "uplink.push.alias";

    /// Device-level tags.
    pub const TAGS: &str = "uplink.push.tags";

    /// Badge count.
    pub const BADGE: &str = "uplink.push.badge";

    /// Quiet-time window (start/end/timezone).
    pub const QUIET_TIME: &str = "uplink.push.quiet_time";

    /// Whether the quiet-time window is active.
    pub const QUIET_TIME_ENABLED: &str = "uplink.push.quiet_time_enabled";

    /// Whether channel creation is allowed before an identity exists.
    pub const CHANNEL_CREATION_ENABLED: &str = "uplink.push.channel_creation_enabled";

    /// Marker recording that the legacy enabled-flag migration ran.
    pub const ENABLED_SETTINGS_MIGRATED: &str = "uplink.push.enabled_settings_migrated";

    /// Cached channel identifier.
    pub const CHANNEL_ID: &str = "uplink.push.channel_id";

    /// Cached channel resource location.
    pub const CHANNEL_LOCATION: &str = "uplink.push.channel_location";

    /// Pending tag-group additions.
    pub const ADD_TAG_GROUPS: &str = "uplink.push.add_tag_groups";

    /// Pending tag-group removals.
    pub const REMOVE_TAG_GROUPS: &str = "uplink.push.remove_tag_groups";

    /// Baseline payload of the last successful registration.
    pub const LAST_SENT_PAYLOAD: &str = "uplink.push.last_registration_payload";

    /// Legacy single push-enabled flag, read only by the migration.
    pub const LEGACY_PUSH_ENABLED: &str = "uplink.push.enabled";
}

/// Durable key-value persistence provided by the host.
///
/// Writes are expected to be cheap and infallible from the orchestrator's
/// point of view; hosts that can fail must absorb and report the failure
/// themselves.
pub trait SettingsStore: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`.
    fn set(&self, key: &str, value: Value);

    /// Removes any value stored under `key`.
    fn remove(&self, key: &str);
}

/// In-memory [`SettingsStore`] for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySettingsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Typed accessor over a [`SettingsStore`].
#[derive(Clone)]
pub struct SettingsAccess {
    store: Arc<dyn SettingsStore>,
}

impl SettingsAccess {
    /// Wraps a host-provided store.
    #[must_use]
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Reads and decodes the value for `key`.
    ///
    /// Returns `None` for both absent and undecodable values; the latter is
    /// logged and treated as absent.
    pub(crate) fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.store.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(key, %error, "discarding undecodable settings value");
                None
            }
        }
    }

    /// Encodes and stores `value` under `key`.
    pub(crate) fn put<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(encoded) => self.store.set(key, encoded),
            Err(error) => warn!(key, %error, "failed to encode settings value"),
        }
    }

    /// Removes the value stored under `key`.
    pub(crate) fn delete(&self, key: &str) {
        self.store.remove(key);
    }

    /// Loads the full settings model, applying defaults for absent keys.
    pub(crate) fn load_settings(&self) -> RegistrationSettings {
        let defaults = RegistrationSettings::default();
        RegistrationSettings {
            user_notifications_enabled: self
                .get(keys::USER_NOTIFICATIONS_ENABLED)
                .unwrap_or(defaults.user_notifications_enabled),
            background_notifications_enabled: self
                .get(keys::BACKGROUND_NOTIFICATIONS_ENABLED)
                .unwrap_or(defaults.background_notifications_enabled),
            token_registration_enabled: self
                .get(keys::TOKEN_REGISTRATION_ENABLED)
                .unwrap_or(defaults.token_registration_enabled),
            alias: self.get(keys::ALIAS),
            tags: self.get(keys::TAGS).unwrap_or_default(),
            badge: self.get(keys::BADGE).unwrap_or(defaults.badge),
            quiet_time: self.get::<QuietTime>(keys::QUIET_TIME),
            quiet_time_enabled: self
                .get(keys::QUIET_TIME_ENABLED)
                .unwrap_or(defaults.quiet_time_enabled),
            channel_creation_enabled: self
                .get(keys::CHANNEL_CREATION_ENABLED)
                .unwrap_or(defaults.channel_creation_enabled),
        }
    }

    /// Loads the cached channel identity, if both parts are present.
    pub(crate) fn channel_identity(&self) -> Option<ChannelIdentity> {
        let channel_id: String = self.get(keys::CHANNEL_ID)?;
        let channel_location: String = self.get(keys::CHANNEL_LOCATION)?;
        Some(ChannelIdentity {
            channel_id,
            channel_location,
        })
    }

    /// Persists the channel identity under its two keys.
    pub(crate) fn set_channel_identity(&self, identity: &ChannelIdentity) {
        self.put(keys::CHANNEL_ID, &identity.channel_id);
        self.put(keys::CHANNEL_LOCATION, &identity.channel_location);
    }

    /// Loads the pending tag-group deltas.
    pub(crate) fn pending_deltas(&self) -> TagGroupDeltas {
        TagGroupDeltas {
            add: self.get(keys::ADD_TAG_GROUPS).unwrap_or_default(),
            remove: self.get(keys::REMOVE_TAG_GROUPS).unwrap_or_default(),
        }
    }

    /// Persists the pending tag-group deltas under their two keys.
    pub(crate) fn set_pending_deltas(&self, deltas: &TagGroupDeltas) {
        self.put(keys::ADD_TAG_GROUPS, &deltas.add);
        self.put(keys::REMOVE_TAG_GROUPS, &deltas.remove);
    }

    /// Loads the last successfully sent payload baseline.
    pub(crate) fn last_sent_payload(&self) -> Option<ChannelPayload> {
        self.get(keys::LAST_SENT_PAYLOAD)
    }

    /// Persists the last successfully sent payload baseline.
    pub(crate) fn set_last_sent_payload(&self, payload: &ChannelPayload) {
        self.put(keys::LAST_SENT_PAYLOAD, payload);
    }
}
