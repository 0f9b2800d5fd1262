//! Platform token registration seam.
//!
//! The token registrar wraps the platform-specific push registration flow:
//! requesting the permission prompt, registering for remote notifications,
//! and reading back the granted capability set. Results arrive
//! asynchronously through
//! [`ChannelOrchestrator::device_token_updated`](crate::ChannelOrchestrator::device_token_updated)
//! and
//! [`ChannelOrchestrator::permissions_updated`](crate::ChannelOrchestrator::permissions_updated).

use async_trait::async_trait;

use crate::permissions::NotificationOptions;

/// Requests platform push registration refreshes.
#[async_trait]
pub trait TokenRegistrar: Send + Sync {
    /// Asks the platform layer to (re)register for push with the requested
    /// capability set.
    ///
    /// `NotificationOptions::NONE` means the user has disabled notifications;
    /// the platform layer should report back the (possibly empty) granted set
    /// so the orchestrator can clear the registered token.
    async fn refresh_registration(&self, requested: NotificationOptions);
}

/// Normalizes a raw platform token into canonical form.
///
/// Strips angle-bracket wrappers and embedded whitespace and lowercases the
/// result. Returns `None` when nothing remains; the token value is otherwise
/// treated as opaque.
#[must_use]
pub fn normalize_device_token(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}
