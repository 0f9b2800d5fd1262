//! Engine-level tests driving events directly and asserting on effects.

use std::sync::Arc;

use super::engine::{AttemptId, Effect, Engine, Event};
use crate::permissions::NotificationOptions;
use crate::settings::{MemorySettingsStore, SettingsAccess};
use crate::transport::RegistrationOutcome;

fn engine() -> Engine {
    engine_with_store().1
}

fn engine_with_store() -> (Arc<MemorySettingsStore>, Engine) {
    let store = Arc::new(MemorySettingsStore::new());
    let engine = Engine::new(SettingsAccess::new(store.clone()));
    (store, engine)
}

fn created(existing: bool) -> RegistrationOutcome {
    RegistrationOutcome::Created {
        channel_id: "channel-1".to_string(),
        channel_location: "https://device.example/channel-1".to_string(),
        existing,
    }
}

fn launch(effects: &[Effect]) -> Option<(AttemptId, crate::payload::ChannelPayload, bool)> {
    effects.iter().find_map(|effect| match effect {
        Effect::LaunchRegistration {
            attempt,
            payload,
            forceful,
            ..
        } => Some((*attempt, payload.clone(), *forceful)),
        _ => None,
    })
}

fn launch_count(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::LaunchRegistration { .. }))
        .count()
}

fn release_count(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::ReleaseWindow { .. }))
        .count()
}

/// Drives a fresh engine through channel creation and one successful update
/// so the sent baseline matches the current state.
fn register(engine: &mut Engine) {
    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (attempt, _, _) = launch(&effects).expect("create attempt");
    engine.handle(Event::TransportOutcome {
        attempt,
        outcome: created(false),
    });

    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (attempt, _, _) = launch(&effects).expect("baseline attempt");
    engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Succeeded,
    });
}

#[test]
fn redundant_triggers_after_success_are_skipped() {
    let mut engine = engine();
    register(&mut engine);

    for event in [
        Event::UpdateRequested { forceful: false },
        Event::AppBecameActive,
        Event::AppEnteredBackground,
    ] {
        let effects = engine.handle(event);
        assert_eq!(launch_count(&effects), 0);
    }
}

#[test]
fn forceful_trigger_bypasses_the_skip_check() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.handle(Event::UpdateRequested { forceful: true });
    let (_, _, forceful) = launch(&effects).expect("forceful attempt");
    assert!(forceful);
}

#[test]
fn triggers_while_in_flight_coalesce_into_one_followup() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.set_badge(3);
    let (attempt, _, _) = launch(&effects).expect("badge update attempt");

    // Three triggers arrive mid-flight, one of them forceful.
    assert_eq!(
        launch_count(&engine.handle(Event::UpdateRequested { forceful: false })),
        0
    );
    assert_eq!(
        launch_count(&engine.handle(Event::UpdateRequested { forceful: true })),
        0
    );
    assert_eq!(launch_count(&engine.handle(Event::AppBecameActive)), 0);

    let effects = engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Succeeded,
    });
    assert_eq!(launch_count(&effects), 1);
    let (_, _, forceful) = launch(&effects).expect("coalesced follow-up");
    assert!(forceful, "forcefulness must survive coalescing");
}

#[test]
fn coalesced_non_forceful_trigger_skips_when_nothing_changed() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.set_badge(5);
    let (attempt, _, _) = launch(&effects).expect("badge update attempt");
    engine.handle(Event::UpdateRequested { forceful: false });

    // The success moves the baseline to badge 5, so the coalesced
    // re-evaluation finds nothing left to send.
    let effects = engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Succeeded,
    });
    assert_eq!(launch_count(&effects), 0);
}

#[test]
fn attempt_payload_is_a_snapshot_of_launch_state() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.set_badge(1);
    let (attempt, payload, _) = launch(&effects).expect("badge update attempt");
    assert_eq!(payload.badge, Some(1));

    // A mutation after launch coalesces; it must not leak into the attempt
    // that is already in flight.
    engine.set_badge(2);
    let effects = engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Succeeded,
    });
    assert_eq!(engine.last_sent().and_then(|p| p.badge), Some(1));

    let (_, follow_up, _) = launch(&effects).expect("coalesced follow-up");
    assert_eq!(follow_up.badge, Some(2));
}

#[test]
fn failed_attempt_retains_deltas_for_the_next_payload() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.add_group_tags("interests", vec!["news".to_string()]);
    let (attempt, payload, _) = launch(&effects).expect("delta attempt");
    assert!(payload.tag_group_deltas.add["interests"].contains("news"));

    engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Failed,
    });
    assert!(!engine.pending_deltas().is_empty());

    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (_, payload, _) = launch(&effects).expect("retry attempt");
    assert!(payload.tag_group_deltas.add["interests"].contains("news"));
}

#[test]
fn success_clears_only_the_deltas_the_attempt_sent() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.add_group_tags("interests", vec!["news".to_string()]);
    let (attempt, _, _) = launch(&effects).expect("delta attempt");

    // A second delta queued mid-flight was not part of the sent snapshot.
    engine.add_group_tags("interests", vec!["sports".to_string()]);

    let effects = engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Succeeded,
    });
    let pending = engine.pending_deltas();
    assert!(!pending.add["interests"].contains("news"));
    assert!(pending.add["interests"].contains("sports"));

    // The coalesced re-evaluation carries the leftover delta.
    let (_, payload, _) = launch(&effects).expect("leftover-delta attempt");
    assert!(payload.tag_group_deltas.add["interests"].contains("sports"));
}

#[test]
fn no_retry_is_scheduled_after_failure() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.set_badge(9);
    let (attempt, _, _) = launch(&effects).expect("badge update attempt");
    let effects = engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Failed,
    });
    assert_eq!(launch_count(&effects), 0);
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::NotifyFailed { .. })));

    // The update stays pending until the next trigger.
    let effects = engine.handle(Event::AppBecameActive);
    assert_eq!(launch_count(&effects), 1);
}

#[test]
fn outcome_releases_the_window_exactly_once() {
    let mut engine = engine();

    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (attempt, _, _) = launch(&effects).expect("create attempt");
    assert_eq!(release_count(&effects), 0);

    let effects = engine.handle(Event::TransportOutcome {
        attempt,
        outcome: created(false),
    });
    assert_eq!(release_count(&effects), 1);
}

#[test]
fn expiry_releases_the_window_and_a_late_outcome_does_not() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.set_badge(7);
    let (attempt, _, _) = launch(&effects).expect("badge update attempt");

    let effects = engine.handle(Event::WindowExpired);
    assert_eq!(release_count(&effects), 1);

    // Late success persists state only: no second release, no follow-up.
    let effects = engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Succeeded,
    });
    assert_eq!(release_count(&effects), 0);
    assert_eq!(launch_count(&effects), 0);
    assert_eq!(engine.last_sent().and_then(|p| p.badge), Some(7));

    // The baseline moved, so nothing is left to send.
    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    assert_eq!(launch_count(&effects), 0);
}

#[test]
fn window_acquired_for_the_current_attempt_needs_no_release() {
    let mut engine = engine();

    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (attempt, _, _) = launch(&effects).expect("create attempt");
    assert!(engine.handle(Event::WindowAcquired { attempt }).is_empty());
}

#[test]
fn window_acquired_after_expiry_is_released_immediately() {
    let mut engine = engine();

    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (attempt, _, _) = launch(&effects).expect("create attempt");

    // Expiry won the race: its release effect ran before the guard existed,
    // so the acquisition confirmation must surrender the guard.
    let effects = engine.handle(Event::WindowExpired);
    assert_eq!(release_count(&effects), 1);
    let effects = engine.handle(Event::WindowAcquired { attempt });
    assert_eq!(release_count(&effects), 1);
}

#[test]
fn window_acquired_after_completion_is_released_immediately() {
    let mut engine = engine();

    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (attempt, _, _) = launch(&effects).expect("create attempt");

    engine.handle(Event::TransportOutcome {
        attempt,
        outcome: created(false),
    });
    let effects = engine.handle(Event::WindowAcquired { attempt });
    assert_eq!(release_count(&effects), 1);
}

#[test]
fn expiry_with_nothing_in_flight_is_a_no_op() {
    let mut engine = engine();
    assert!(engine.handle(Event::WindowExpired).is_empty());
}

#[test]
fn window_unavailable_defers_without_an_immediate_retry() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.handle(Event::UpdateRequested { forceful: true });
    let (attempt, _, _) = launch(&effects).expect("forceful attempt");

    let effects = engine.handle(Event::WindowUnavailable { attempt });
    assert!(effects.is_empty(), "deferral must not retry in-place");

    // The next trigger picks the update back up, forcefulness intact.
    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (_, _, forceful) = launch(&effects).expect("deferred attempt");
    assert!(forceful);
}

#[test]
fn channel_creation_disabled_gates_the_first_registration() {
    let mut engine = engine();

    let effects = engine.set_channel_creation_enabled(false);
    assert_eq!(launch_count(&effects), 0);
    assert_eq!(
        launch_count(&engine.handle(Event::UpdateRequested { forceful: true })),
        0
    );

    // Re-enabling creation is itself a trigger.
    let effects = engine.set_channel_creation_enabled(true);
    assert_eq!(launch_count(&effects), 1);
}

#[test]
fn created_outcome_persists_identity_and_notifies_once() {
    let (store, mut engine) = engine_with_store();

    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (attempt, _, _) = launch(&effects).expect("create attempt");

    let effects = engine.handle(Event::TransportOutcome {
        attempt,
        outcome: created(false),
    });
    let notified: Vec<_> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::NotifyChannelCreated { identity, existing } => Some((identity, *existing)),
            _ => None,
        })
        .collect();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].0.channel_id, "channel-1");
    assert!(!notified[0].1);

    let restored = Engine::new(SettingsAccess::new(store));
    assert_eq!(
        restored.identity().map(|i| i.channel_id.as_str()),
        Some("channel-1")
    );
}

#[test]
fn unknown_attempt_created_outcome_still_persists_identity() {
    let mut engine = engine();

    let effects = engine.handle(Event::TransportOutcome {
        attempt: 7,
        outcome: created(true),
    });
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::NotifyChannelCreated { existing: true, .. })));
    assert!(engine.identity().is_some());
}

#[test]
fn identity_from_an_expired_attempt_is_still_persisted() {
    let mut engine = engine();

    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (attempt, _, _) = launch(&effects).expect("create attempt");

    // Expire the attempt, launch a replacement, then let the first
    // attempt's outcome trail in.
    engine.handle(Event::WindowExpired);
    let effects = engine.handle(Event::UpdateRequested { forceful: false });
    let (second, _, _) = launch(&effects).expect("replacement attempt");
    assert_ne!(attempt, second);

    engine.handle(Event::TransportOutcome {
        attempt,
        outcome: created(true),
    });
    assert!(engine.identity().is_some());
}

#[test]
fn outcomes_for_unknown_attempts_are_ignored() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.handle(Event::TransportOutcome {
        attempt: 99,
        outcome: RegistrationOutcome::Succeeded,
    });
    assert!(effects.is_empty());
}

#[test]
fn enabling_notifications_defers_to_the_token_refresh_round_trip() {
    let mut engine = engine();
    register(&mut engine);

    // Enabling only requests a platform refresh; the channel attempt waits
    // for the granted set and token to come back.
    let effects = engine.set_user_notifications_enabled(true);
    assert_eq!(launch_count(&effects), 0);
    let requested = effects.iter().find_map(|e| match e {
        Effect::RefreshTokenRegistration { requested } => Some(*requested),
        _ => None,
    });
    let requested = requested.expect("refresh request");
    assert!(requested.contains(NotificationOptions::ALERT));
    assert!(requested.contains(NotificationOptions::SOUND));
    assert!(requested.contains(NotificationOptions::BADGE));
}

#[test]
fn token_arrival_launches_exactly_one_attempt_with_the_new_token() {
    let mut engine = engine();
    register(&mut engine);
    assert_eq!(
        launch_count(&engine.handle(Event::PermissionsUpdated {
            options: NotificationOptions::ALERT,
        })),
        0
    );

    engine.set_user_notifications_enabled(true);

    let effects = engine.handle(Event::DeviceTokenUpdated {
        token: "0123abcd".to_string(),
    });
    assert_eq!(launch_count(&effects), 1);
    let (_, payload, _) = launch(&effects).expect("token attempt");
    assert!(payload.opt_in);
    assert_eq!(payload.push_address.as_deref(), Some("0123abcd"));
}

#[test]
fn disabling_token_registration_sends_an_explicit_null_address() {
    let mut engine = engine();
    register(&mut engine);

    engine.handle(Event::PermissionsUpdated {
        options: NotificationOptions::ALERT,
    });
    engine.set_user_notifications_enabled(true);
    let effects = engine.handle(Event::DeviceTokenUpdated {
        token: "0123abcd".to_string(),
    });
    let (attempt, _, _) = launch(&effects).expect("token attempt");
    engine.handle(Event::TransportOutcome {
        attempt,
        outcome: RegistrationOutcome::Succeeded,
    });

    let effects = engine.set_token_registration_enabled(false);
    let (_, payload, _) = launch(&effects).expect("unregister attempt");
    assert_eq!(payload.push_address, None);
    assert!(!payload.opt_in);
}

#[test]
fn became_active_requests_a_refresh_until_a_token_exists() {
    let mut engine = engine();
    register(&mut engine);

    let effects = engine.handle(Event::AppBecameActive);
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::RefreshTokenRegistration { .. })));

    // With the user opted out the payload carries no address, so the token
    // arrival changes nothing and launches nothing.
    let effects = engine.handle(Event::DeviceTokenUpdated {
        token: "0123abcd".to_string(),
    });
    assert_eq!(launch_count(&effects), 0);

    let effects = engine.handle(Event::AppBecameActive);
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::RefreshTokenRegistration { .. })));
}

#[test]
fn persisted_state_survives_a_restart() {
    let (store, mut engine) = engine_with_store();
    register(&mut engine);
    engine.add_group_tags("interests", vec!["news".to_string()]);
    drop(engine);

    let mut restored = Engine::new(SettingsAccess::new(store));
    assert!(restored.identity().is_some());
    assert!(restored.pending_deltas().add["interests"].contains("news"));

    // The leftover delta makes the first trigger after restart required.
    let effects = restored.handle(Event::UpdateRequested { forceful: false });
    assert_eq!(launch_count(&effects), 1);
}

#[test]
fn unchanged_setter_calls_are_no_ops() {
    let mut engine = engine();
    register(&mut engine);

    assert!(engine.set_badge(0).is_empty());
    assert!(engine.set_alias(Some("   ".to_string())).is_empty());
    assert!(engine.set_background_notifications_enabled(true).is_empty());
    assert!(engine.add_group_tags("g", Vec::new()).is_empty());
}
