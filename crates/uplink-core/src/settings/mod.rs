//! Registration settings, persistence, and migration.
//!
//! The host application mutates registration preferences through the
//! orchestrator's setters; this module holds the settings model, the
//! key-value persistence seam ([`SettingsStore`]), the typed accessor over it
//! ([`SettingsAccess`]), and the one-shot legacy-flag migration.

mod migration;
mod store;


pub(crate) use migration::migrate_push_settings;
pub use store::{MemorySettingsStore, SettingsAccess, SettingsStore, keys};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised by settings mutations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
    /// A quiet-time boundary was not a valid `HH:MM` value.
    #[error("invalid quiet time boundary: {value:?} (expected HH:MM)")]
    InvalidQuietTime {
        /// The rejected value.
        value: String,
    },
}

/// Configured quiet-time window, carried verbatim to the remote service.
///
/// The remote service interprets the window; the orchestrator only validates
/// the `HH:MM` shape and stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietTime {
    /// Window start, `HH:MM` in the given timezone.
    pub start: String,

    /// Window end, `HH:MM` in the given timezone.
    pub end: String,

    /// IANA timezone name the window is anchored to.
    pub timezone: String,
}

impl QuietTime {
    /// Creates a validated quiet-time window.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidQuietTime`] when `start` or `end` is
    /// not a valid `HH:MM` value.
    pub fn new(
        start: impl Into<String>,
        end: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Result<Self, SettingsError> {
        let start = start.into();
        let end = end.into();
        for value in [&start, &end] {
            if !is_valid_hhmm(value) {
                return Err(SettingsError::InvalidQuietTime {
                    value: value.clone(),
                });
            }
        }
        Ok(Self {
            start,
            end,
            timezone: timezone.into(),
        })
    }
}

fn is_valid_hhmm(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    let digits = |hi: u8, lo: u8| -> Option<u8> {
        if hi.is_ascii_digit() && lo.is_ascii_digit() {
            Some((hi - b'0') * 10 + (lo - b'0'))
        } else {
            None
        }
    };
    let hour = digits(bytes[0], bytes[1]);
    let minute = digits(bytes[3], bytes[4]);
    matches!((hour, minute), (Some(h), Some(m)) if h < 24 && m < 60)
}

/// User-facing registration preferences.
///
/// Every field is persisted through the settings store under its own key and
/// every mutation re-evaluates whether a registration update is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSettings {
    /// Whether the user has enabled user-visible notifications.
    pub user_notifications_enabled: bool,

    /// Whether background (content-available) notifications are enabled.
    pub background_notifications_enabled: bool,

    /// Whether the device token may be sent during registration at all.
    pub token_registration_enabled: bool,

    /// Optional device alias.
    pub alias: Option<String>,

    /// Device-level tags.
    pub tags: BTreeSet<String>,

    /// Current badge count.
    pub badge: u32,

    /// Configured quiet-time window, if any.
    pub quiet_time: Option<QuietTime>,

    /// Whether the quiet-time window is active.
    pub quiet_time_enabled: bool,

    /// Whether channel creation is allowed before an identity exists.
    pub channel_creation_enabled: bool,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            user_notifications_enabled: false,
            background_notifications_enabled: true,
            token_registration_enabled: true,
            alias: None,
            tags: BTreeSet::new(),
            badge: 0,
            quiet_time: None,
            quiet_time_enabled: false,
            channel_creation_enabled: true,
        }
    }
}
