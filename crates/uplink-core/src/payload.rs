//! Registration payload snapshots.
//!
//! A [`ChannelPayload`] is the immutable snapshot handed to the transport for
//! one registration attempt. It is a pure function of the orchestrator state
//! at launch time; a concurrent settings mutation can never corrupt an
//! in-flight call because the attempt keeps its own snapshot.
//!
//! Equality against the last successfully sent baseline decides whether a new
//! attempt is due. Pending tag-group deltas ride in the snapshot but are
//! excluded from the baseline ([`ChannelPayload::baseline`]): they are
//! one-shot operations, not channel state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::permissions::NotificationOptions;
use crate::settings::RegistrationSettings;
use crate::tags::TagGroupDeltas;

/// Quiet-time window as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietTimeWindow {
    /// Window start, `HH:MM`.
    pub start: String,

    /// Window end, `HH:MM`.
    pub end: String,
}

/// Immutable registration payload snapshot.
///
/// `push_address` is always serialized, `null` included: a previously
/// registered token must be actively unregistered, not merely omitted, to
/// stop delivery to a disabled device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPayload {
    /// Whether the user can currently receive user-visible notifications.
    pub opt_in: bool,

    /// Whether background notifications can currently be delivered.
    pub background: bool,

    /// Device push token; `None` unregisters any previously sent token.
    pub push_address: Option<String>,

    /// Device alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Device-level tags.
    pub tags: BTreeSet<String>,

    /// Marks `tags` as the authoritative tag set: the remote service
    /// replaces its stored list instead of merging into it.
    #[serde(default)]
    pub set_tags: bool,

    /// Badge count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,

    /// Active quiet-time window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_time: Option<QuietTimeWindow>,

    /// Timezone anchoring the quiet-time window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Tag-group deltas carried by this attempt.
    #[serde(default, skip_serializing_if = "TagGroupDeltas::is_empty")]
    pub tag_group_deltas: TagGroupDeltas,
}

impl ChannelPayload {
    /// Returns the baseline form of this payload: the snapshot without its
    /// one-shot tag-group deltas.
    #[must_use]
    pub fn baseline(&self) -> Self {
        Self {
            tag_group_deltas: TagGroupDeltas::default(),
            ..self.clone()
        }
    }
}

/// Inputs to payload construction.
#[derive(Debug, Clone, Copy)]
pub struct PayloadContext<'a> {
    /// Current device token, if one has been delivered.
    pub device_token: Option<&'a str>,

    /// Current registration settings.
    pub settings: &'a RegistrationSettings,

    /// Capabilities currently authorized by the platform.
    pub permissions: NotificationOptions,

    /// Whether the host reports background refresh as available.
    pub background_refresh_available: bool,

    /// Pending tag-group deltas to carry.
    pub deltas: &'a TagGroupDeltas,
}

impl PayloadContext<'_> {
    /// Returns whether user-visible notifications are fully allowed:
    /// user-enabled, authorized by the platform, and token registration on.
    #[must_use]
    pub fn user_push_allowed(&self) -> bool {
        self.settings.user_notifications_enabled
            && !self.permissions.is_empty()
            && self.settings.token_registration_enabled
    }

    /// Returns whether background notifications are fully allowed:
    /// background-enabled, background refresh granted, and token
    /// registration on.
    #[must_use]
    pub fn background_push_allowed(&self) -> bool {
        self.settings.background_notifications_enabled
            && self.background_refresh_available
            && self.settings.token_registration_enabled
    }

    /// Builds the payload snapshot. Deterministic and side-effect free.
    #[must_use]
    pub fn build(&self) -> ChannelPayload {
        let opt_in = self.user_push_allowed();
        let push_address = if self.settings.token_registration_enabled && opt_in {
            self.device_token.map(str::to_string)
        } else {
            None
        };
        let quiet_time = self
            .settings
            .quiet_time
            .as_ref()
            .filter(|_| self.settings.quiet_time_enabled);
        ChannelPayload {
            opt_in,
            background: self.background_push_allowed(),
            push_address,
            alias: self.settings.alias.clone(),
            tags: self.settings.tags.clone(),
            // Device tags are owned here, so the sent set always replaces
            // the service's stored list.
            set_tags: true,
            badge: Some(self.settings.badge),
            quiet_time: quiet_time.map(|qt| QuietTimeWindow {
                start: qt.start.clone(),
                end: qt.end.clone(),
            }),
            timezone: quiet_time.map(|qt| qt.timezone.clone()),
            tag_group_deltas: self.deltas.clone(),
        }
    }
}
