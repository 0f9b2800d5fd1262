//! Inbound notification surface types.
//!
//! The orchestrator does not render or route notification content; it only
//! needs enough structure to record the response that launched the app,
//! answer the host's foreground-presentation question, and acknowledge
//! received remote notifications with a fetch result.

use serde::{Deserialize, Serialize};

/// Action identifier the platform reports when the user taps the
/// notification itself rather than a custom action button.
pub const DEFAULT_ACTION_IDENTIFIER: &str = "com.uplink.default_action";

/// Opaque content of a received remote notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    /// Platform notification identifier, when one exists.
    pub identifier: Option<String>,

    /// Raw notification body as delivered by the platform.
    pub body: serde_json::Value,
}

impl NotificationContent {
    /// Creates content from a raw notification body.
    #[must_use]
    pub fn new(identifier: Option<String>, body: serde_json::Value) -> Self {
        Self { identifier, body }
    }
}

/// The user's response to a presented notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResponse {
    /// Identifier of the action the user chose.
    pub action_id: String,

    /// The notification the response belongs to.
    pub content: NotificationContent,
}

impl NotificationResponse {
    /// Returns `true` if the user tapped the notification itself.
    #[must_use]
    pub fn is_default_action(&self) -> bool {
        self.action_id == DEFAULT_ACTION_IDENTIFIER
    }
}

/// How a notification received in the foreground should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresentationOptions(u8);

impl PresentationOptions {
    /// Do not present the notification.
    pub const NONE: Self = Self(0);

    /// Show the alert.
    pub const ALERT: Self = Self(1);

    /// Update the badge.
    pub const BADGE: Self = Self(1 << 1);

    /// Play the sound.
    pub const SOUND: Self = Self(1 << 2);

    const ALL_BITS: u8 = 0b111;

    /// Builds a presentation set from raw bits, ignoring unknown bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Returns the raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns the union of two presentation sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if the notification should not be presented at all.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Result the host reports to the OS after a background notification is
/// processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchResult {
    /// Processing produced new data.
    NewData,

    /// Nothing new to report.
    NoData,

    /// Processing failed.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_action_detection() {
        let content = NotificationContent::new(None, serde_json::json!({"alert": "hi"}));
        let tap = NotificationResponse {
            action_id: DEFAULT_ACTION_IDENTIFIER.to_string(),
            content: content.clone(),
        };
        let custom = NotificationResponse {
            action_id: "custom_action".to_string(),
            content,
        };
        assert!(tap.is_default_action());
        assert!(!custom.is_default_action());
    }

    #[test]
    fn presentation_options_union() {
        let options = PresentationOptions::ALERT.union(PresentationOptions::SOUND);
        assert_eq!(options.bits(), 0b101);
        assert!(PresentationOptions::NONE.is_empty());
        assert!(!options.is_empty());
    }
}
