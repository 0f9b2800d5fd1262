//! Granted notification capability set.
//!
//! The host platform grants a set of notification capabilities (badge
//! updates, sounds, visible alerts) when the user accepts the permission
//! prompt. The orchestrator only consumes the set through
//! [`NotificationOptions::is_empty`] and equality: a non-empty set combined
//! with the user-enabled setting drives the channel's opt-in flag.

use serde::{Deserialize, Serialize};

/// Bitset of notification capabilities currently authorized by the platform.
///
/// Serialized as the raw bits so the value survives the settings store
/// opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationOptions(u8);

impl NotificationOptions {
    /// No capabilities granted.
    pub const NONE: Self = Self(0);

    /// Permission to update the application badge.
    pub const BADGE: Self = Self(1);

    /// Permission to play notification sounds.
    pub const SOUND: Self = Self(1 << 1);

    /// Permission to present visible alerts.
    pub const ALERT: Self = Self(1 << 2);

    const ALL_BITS: u8 = 0b111;

    /// Builds an option set from raw bits, ignoring unknown bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Returns the raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every capability in `other` is granted.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two option sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if no capability is granted.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}
