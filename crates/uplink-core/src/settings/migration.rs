//! One-shot migration of the legacy single push-enabled flag.
//!
//! Earlier releases persisted a single `push.enabled` flag; the split
//! user-enabled and background-enabled flags replace it. The migration runs
//! on every startup and is a guarded no-op once the persisted marker is set.
//! A set marker with missing split flags is treated as corruption: the
//! missing fields are re-derived without clearing the marker.

use tracing::{info, warn};

use super::store::{SettingsAccess, keys};

pub(crate) fn migrate_push_settings(access: &SettingsAccess) {
    let user: Option<bool> = access.get(keys::USER_NOTIFICATIONS_ENABLED);
    let background: Option<bool> = access.get(keys::BACKGROUND_NOTIFICATIONS_ENABLED);

    if access
        .get::<bool>(keys::ENABLED_SETTINGS_MIGRATED)
        .unwrap_or(false)
    {
        if user.is_some() && background.is_some() {
            return;
        }
        // Marker set but fields missing: re-derive defensively, keep the
        // marker so legacy-flag edits after migration stay inert.
        let legacy: Option<bool> = access.get(keys::LEGACY_PUSH_ENABLED);
        if user.is_none() {
            let derived = legacy.unwrap_or(false);
            warn!(derived, "re-deriving missing user-enabled flag after migration");
            access.put(keys::USER_NOTIFICATIONS_ENABLED, &derived);
        }
        if background.is_none() {
            let derived = legacy.unwrap_or(true);
            warn!(
                derived,
                "re-deriving missing background-enabled flag after migration"
            );
            access.put(keys::BACKGROUND_NOTIFICATIONS_ENABLED, &derived);
        }
        return;
    }

    let legacy: Option<bool> = access.get(keys::LEGACY_PUSH_ENABLED);
    if user.is_none() {
        access.put(keys::USER_NOTIFICATIONS_ENABLED, &legacy.unwrap_or(false));
    }
    if background.is_none() {
        access.put(
            keys::BACKGROUND_NOTIFICATIONS_ENABLED,
            &legacy.unwrap_or(true),
        );
    }
    if let Some(legacy) = legacy {
        info!(legacy, "migrated legacy push-enabled setting to split flags");
    }
    access.put(keys::ENABLED_SETTINGS_MIGRATED, &true);
}
