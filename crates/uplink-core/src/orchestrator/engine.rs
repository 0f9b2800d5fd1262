//! Deterministic registration state machine.
//!
//! The engine owns all registration state and is the single decision point
//! for *whether*, *when*, and *with what payload* the remote service is
//! contacted. Every input (lifecycle signal, settings mutation, transport
//! outcome, window event) is dispatched through it one at a time; it mutates
//! state and returns the effects the runtime must execute. The engine itself
//! performs no I/O beyond settings-store writes, which keeps every decision
//! path testable without a runtime.
//!
//! # Attempt lifecycle
//!
//! ```text
//! (idle) --trigger, update required--> in flight
//! in flight --trigger--> in flight (coalesced, forceful OR-ed)
//! in flight --outcome--> idle (+ re-evaluation if a trigger coalesced)
//! in flight --window unavailable--> idle (update still pending)
//! in flight --window expired--> abandoned (late outcome persists state only)
//! ```
//!
//! # Invariants
//!
//! - At most one attempt is logically in flight; concurrent triggers coalesce
//!   into it instead of launching a second call.
//! - Each attempt owns an immutable payload snapshot taken at launch.
//! - A released window is never re-acquired for a late outcome.
//! - Redundant triggers never produce redundant network traffic: an
//!   unchanged baseline with no pending deltas and no forceful request is an
//!   idempotent skip.

use tracing::{debug, info, warn};

use crate::identity::ChannelIdentity;
use crate::payload::{ChannelPayload, PayloadContext};
use crate::permissions::NotificationOptions;
use crate::settings::{QuietTime, RegistrationSettings, SettingsAccess, keys};
use crate::tags::{self, TagGroupDeltas};
use crate::transport::RegistrationOutcome;

/// Identifier of one registration attempt, used to match asynchronous
/// outcomes and window events against the attempt they belong to.
pub(crate) type AttemptId = u64;

/// Inputs dispatched into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    /// The application moved to the foreground.
    AppBecameActive,
    /// The application moved to the background.
    AppEnteredBackground,
    /// The host's background-refresh permission changed.
    BackgroundRefreshStatusChanged { available: bool },
    /// The platform delivered a (normalized) push token.
    DeviceTokenUpdated { token: String },
    /// The platform reported the authorized capability set.
    PermissionsUpdated { options: NotificationOptions },
    /// The host explicitly requested a registration update.
    UpdateRequested { forceful: bool },
    /// The transport reported the terminal outcome of an attempt.
    TransportOutcome {
        attempt: AttemptId,
        outcome: RegistrationOutcome,
    },
    /// A window was acquired for a launched attempt.
    ///
    /// Acquisition happens outside the engine lock, so by the time this
    /// event lands the attempt may already have been abandoned; the engine
    /// answers with a release in that case.
    WindowAcquired { attempt: AttemptId },
    /// No execution window could be acquired for a launched attempt.
    WindowUnavailable { attempt: AttemptId },
    /// The OS reclaimed the held execution window.
    WindowExpired,
}

/// Side effects the runtime executes on the engine's behalf.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    /// Acquire a window and hand the payload snapshot to the transport.
    LaunchRegistration {
        attempt: AttemptId,
        channel: Option<ChannelIdentity>,
        payload: ChannelPayload,
        forceful: bool,
    },
    /// Release the window held for `attempt`.
    ReleaseWindow { attempt: AttemptId },
    /// Ask the platform layer to refresh its push registration.
    RefreshTokenRegistration { requested: NotificationOptions },
    /// Tell the delegate a channel identity was created.
    NotifyChannelCreated {
        identity: ChannelIdentity,
        existing: bool,
    },
    /// Tell the delegate the attempt succeeded.
    NotifySucceeded { payload: ChannelPayload },
    /// Tell the delegate the attempt failed.
    NotifyFailed { payload: ChannelPayload },
}

#[derive(Debug, Clone)]
struct InFlight {
    attempt: AttemptId,
    payload: ChannelPayload,
    forceful: bool,
}

/// Registration state machine. See the module docs for the lifecycle.
pub(crate) struct Engine {
    access: SettingsAccess,
    settings: RegistrationSettings,
    deltas: TagGroupDeltas,
    identity: Option<ChannelIdentity>,
    device_token: Option<String>,
    permissions: NotificationOptions,
    background_refresh_available: bool,
    last_sent: Option<ChannelPayload>,
    in_flight: Option<InFlight>,
    /// Attempt abandoned by window expiry; a late outcome for it only
    /// updates persisted state.
    expired_flight: Option<InFlight>,
    /// OR of the forcefulness of triggers that arrived while an attempt was
    /// in flight (or had to be deferred).
    coalesced_forceful: Option<bool>,
    /// The platform push registration is stale and should be refreshed on
    /// the next foreground transition.
    token_refresh_pending: bool,
    next_attempt: AttemptId,
}

impl Engine {
    /// Loads persisted state and runs the settings migration.
    pub(crate) fn new(access: SettingsAccess) -> Self {
        crate::settings::migrate_push_settings(&access);
        let settings = access.load_settings();
        let deltas = access.pending_deltas();
        let identity = access.channel_identity();
        let last_sent = access.last_sent_payload();
        Self {
            access,
            settings,
            deltas,
            identity,
            device_token: None,
            permissions: NotificationOptions::NONE,
            background_refresh_available: false,
            last_sent,
            in_flight: None,
            expired_flight: None,
            coalesced_forceful: None,
            token_refresh_pending: false,
            next_attempt: 1,
        }
    }

    /// Dispatches one event and returns the effects to execute.
    pub(crate) fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            Event::AppBecameActive => {
                if self.token_refresh_pending || self.device_token.is_none() {
                    effects.push(Effect::RefreshTokenRegistration {
                        requested: self.requested_options(),
                    });
                }
                self.evaluate(false, &mut effects);
            }
            Event::AppEnteredBackground => {
                self.evaluate(false, &mut effects);
            }
            Event::BackgroundRefreshStatusChanged { available } => {
                self.background_refresh_available = available;
                self.evaluate(false, &mut effects);
            }
            Event::DeviceTokenUpdated { token } => {
                self.token_refresh_pending = false;
                self.device_token = Some(token);
                self.evaluate(false, &mut effects);
            }
            Event::PermissionsUpdated { options } => {
                self.token_refresh_pending = false;
                self.permissions = options;
                self.evaluate(false, &mut effects);
            }
            Event::UpdateRequested { forceful } => {
                self.evaluate(forceful, &mut effects);
            }
            Event::TransportOutcome { attempt, outcome } => {
                self.handle_outcome(attempt, outcome, &mut effects);
            }
            Event::WindowAcquired { attempt } => {
                if !self.in_flight.as_ref().is_some_and(|f| f.attempt == attempt) {
                    // Expiry (or completion) raced ahead of the acquisition;
                    // the guard that was just inserted must not be kept.
                    warn!(attempt, "window acquired for an abandoned attempt; releasing");
                    effects.push(Effect::ReleaseWindow { attempt });
                }
            }
            Event::WindowUnavailable { attempt } => {
                if self.in_flight.as_ref().is_some_and(|f| f.attempt == attempt) {
                    if let Some(flight) = self.in_flight.take() {
                        debug!(
                            attempt,
                            "no execution window; deferring update to the next trigger"
                        );
                        if flight.forceful {
                            self.coalesced_forceful = Some(true);
                        }
                    }
                }
            }
            Event::WindowExpired => {
                if let Some(flight) = self.in_flight.take() {
                    warn!(
                        attempt = flight.attempt,
                        "execution window expired; abandoning in-flight attempt"
                    );
                    effects.push(Effect::ReleaseWindow {
                        attempt: flight.attempt,
                    });
                    self.expired_flight = Some(flight);
                } else {
                    debug!("window expiry with no attempt in flight");
                }
            }
        }
        effects
    }

    // -------------------------------------------------------------------
    // Settings mutation (each triggers re-evaluation)
    // -------------------------------------------------------------------

    /// Enables or disables user-visible notifications.
    ///
    /// Marks the platform push registration stale and requests a refresh.
    /// Channel evaluation happens when the platform reports the granted set
    /// (and token) back, never with the permission state that predates the
    /// toggle. A host whose registrar never reports back relies on the next
    /// organic trigger (foreground entry, another mutation) to pick the
    /// change up.
    pub(crate) fn set_user_notifications_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        if self.settings.user_notifications_enabled == enabled {
            return Vec::new();
        }
        self.settings.user_notifications_enabled = enabled;
        self.access.put(keys::USER_NOTIFICATIONS_ENABLED, &enabled);
        self.token_refresh_pending = true;
        vec![Effect::RefreshTokenRegistration {
            requested: self.requested_options(),
        }]
    }

    pub(crate) fn set_background_notifications_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        if self.settings.background_notifications_enabled == enabled {
            return Vec::new();
        }
        self.settings.background_notifications_enabled = enabled;
        self.access
            .put(keys::BACKGROUND_NOTIFICATIONS_ENABLED, &enabled);
        self.trigger_after_mutation()
    }

    pub(crate) fn set_token_registration_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        if self.settings.token_registration_enabled == enabled {
            return Vec::new();
        }
        self.settings.token_registration_enabled = enabled;
        self.access.put(keys::TOKEN_REGISTRATION_ENABLED, &enabled);
        self.trigger_after_mutation()
    }

    /// Sets or clears the device alias. Whitespace-only aliases clear it.
    pub(crate) fn set_alias(&mut self, alias: Option<String>) -> Vec<Effect> {
        let alias = alias
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        if self.settings.alias == alias {
            return Vec::new();
        }
        match &alias {
            Some(value) => self.access.put(keys::ALIAS, value),
            None => self.access.delete(keys::ALIAS),
        }
        self.settings.alias = alias;
        self.trigger_after_mutation()
    }

    /// Replaces the device-level tag set. Tags are normalized; invalid tags
    /// are dropped.
    pub(crate) fn set_tags(&mut self, tags: Vec<String>) -> Vec<Effect> {
        let tags = tags::normalize_tags(tags);
        if self.settings.tags == tags {
            return Vec::new();
        }
        self.settings.tags = tags;
        self.access.put(keys::TAGS, &self.settings.tags);
        self.trigger_after_mutation()
    }

    /// Queues tags for addition to a tag group.
    pub(crate) fn add_group_tags(&mut self, group: &str, tags: Vec<String>) -> Vec<Effect> {
        if !self.deltas.add_tags(group, tags) {
            return Vec::new();
        }
        self.access.set_pending_deltas(&self.deltas);
        self.trigger_after_mutation()
    }

    /// Queues tags for removal from a tag group.
    pub(crate) fn remove_group_tags(&mut self, group: &str, tags: Vec<String>) -> Vec<Effect> {
        if !self.deltas.remove_tags(group, tags) {
            return Vec::new();
        }
        self.access.set_pending_deltas(&self.deltas);
        self.trigger_after_mutation()
    }

    pub(crate) fn set_badge(&mut self, badge: u32) -> Vec<Effect> {
        if self.settings.badge == badge {
            return Vec::new();
        }
        self.settings.badge = badge;
        self.access.put(keys::BADGE, &badge);
        self.trigger_after_mutation()
    }

    /// Sets or clears the quiet-time window.
    pub(crate) fn set_quiet_time(&mut self, quiet_time: Option<QuietTime>) -> Vec<Effect> {
        if self.settings.quiet_time == quiet_time {
            return Vec::new();
        }
        match &quiet_time {
            Some(value) => self.access.put(keys::QUIET_TIME, value),
            None => self.access.delete(keys::QUIET_TIME),
        }
        self.settings.quiet_time = quiet_time;
        self.trigger_after_mutation()
    }

    pub(crate) fn set_quiet_time_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        if self.settings.quiet_time_enabled == enabled {
            return Vec::new();
        }
        self.settings.quiet_time_enabled = enabled;
        self.access.put(keys::QUIET_TIME_ENABLED, &enabled);
        self.trigger_after_mutation()
    }

    /// Allows or blocks channel creation before an identity exists.
    pub(crate) fn set_channel_creation_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        if self.settings.channel_creation_enabled == enabled {
            return Vec::new();
        }
        self.settings.channel_creation_enabled = enabled;
        self.access.put(keys::CHANNEL_CREATION_ENABLED, &enabled);
        self.trigger_after_mutation()
    }

    fn trigger_after_mutation(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.evaluate(false, &mut effects);
        effects
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    pub(crate) fn settings(&self) -> &RegistrationSettings {
        &self.settings
    }

    pub(crate) fn identity(&self) -> Option<&ChannelIdentity> {
        self.identity.as_ref()
    }

    pub(crate) fn device_token(&self) -> Option<&str> {
        self.device_token.as_deref()
    }

    pub(crate) fn pending_deltas(&self) -> &TagGroupDeltas {
        &self.deltas
    }

    #[cfg(test)]
    pub(crate) fn last_sent(&self) -> Option<&ChannelPayload> {
        self.last_sent.as_ref()
    }

    // -------------------------------------------------------------------
    // Trigger evaluation
    // -------------------------------------------------------------------

    /// Decides whether a registration update is due and, if so, launches it.
    ///
    /// With an attempt already in flight the trigger is coalesced: its
    /// forcefulness is OR-ed into the pending flag and re-evaluation happens
    /// when the attempt completes, so nothing that arrived mid-flight is
    /// lost.
    fn evaluate(&mut self, forceful: bool, effects: &mut Vec<Effect>) {
        if let Some(flight) = &self.in_flight {
            let merged = self.coalesced_forceful.unwrap_or(false) || forceful;
            self.coalesced_forceful = Some(merged);
            debug!(
                attempt = flight.attempt,
                forceful = merged,
                "attempt in flight; coalescing trigger"
            );
            return;
        }
        if self.identity.is_none() && !self.settings.channel_creation_enabled {
            debug!("channel creation disabled; skipping registration");
            return;
        }
        let forceful = forceful || self.coalesced_forceful.take().unwrap_or(false);
        let payload = self.build_payload();
        let required = forceful
            || self.identity.is_none()
            || !self.deltas.is_empty()
            || self.last_sent.as_ref() != Some(&payload.baseline());
        if !required {
            debug!("registration up to date; skipping");
            return;
        }
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        self.in_flight = Some(InFlight {
            attempt,
            payload: payload.clone(),
            forceful,
        });
        info!(
            attempt,
            forceful,
            create = self.identity.is_none(),
            "launching channel registration attempt"
        );
        effects.push(Effect::LaunchRegistration {
            attempt,
            channel: self.identity.clone(),
            payload,
            forceful,
        });
    }

    fn build_payload(&self) -> ChannelPayload {
        PayloadContext {
            device_token: self.device_token.as_deref(),
            settings: &self.settings,
            permissions: self.permissions,
            background_refresh_available: self.background_refresh_available,
            deltas: &self.deltas,
        }
        .build()
    }

    fn requested_options(&self) -> NotificationOptions {
        if self.settings.user_notifications_enabled {
            NotificationOptions::ALERT
                .union(NotificationOptions::SOUND)
                .union(NotificationOptions::BADGE)
        } else {
            NotificationOptions::NONE
        }
    }

    // -------------------------------------------------------------------
    // Outcome handling
    // -------------------------------------------------------------------

    fn handle_outcome(
        &mut self,
        attempt: AttemptId,
        outcome: RegistrationOutcome,
        effects: &mut Vec<Effect>,
    ) {
        if self.in_flight.as_ref().is_some_and(|f| f.attempt == attempt) {
            if let Some(flight) = self.in_flight.take() {
                self.apply_outcome(&flight.payload, outcome, effects);
                effects.push(Effect::ReleaseWindow { attempt });
                if self.coalesced_forceful.is_some() {
                    debug!(attempt, "re-evaluating coalesced trigger after completion");
                    self.evaluate(false, effects);
                }
            }
        } else if self
            .expired_flight
            .as_ref()
            .is_some_and(|f| f.attempt == attempt)
        {
            if let Some(flight) = self.expired_flight.take() {
                // Window already released at expiry; persist state only.
                debug!(attempt, "processing late outcome for expired attempt");
                self.apply_outcome(&flight.payload, outcome, effects);
            }
        } else if let RegistrationOutcome::Created {
            channel_id,
            channel_location,
            existing,
        } = outcome
        {
            // Identity is authoritative even from an attempt the engine no
            // longer tracks.
            warn!(attempt, "identity reported by unknown attempt; persisting");
            self.store_identity(
                ChannelIdentity::new(channel_id, channel_location),
                existing,
                effects,
            );
        } else {
            warn!(attempt, "ignoring outcome for unknown attempt");
        }
    }

    fn apply_outcome(
        &mut self,
        sent: &ChannelPayload,
        outcome: RegistrationOutcome,
        effects: &mut Vec<Effect>,
    ) {
        match outcome {
            RegistrationOutcome::Created {
                channel_id,
                channel_location,
                existing,
            } => {
                self.store_identity(
                    ChannelIdentity::new(channel_id, channel_location),
                    existing,
                    effects,
                );
            }
            RegistrationOutcome::Succeeded => {
                let baseline = sent.baseline();
                self.access.set_last_sent_payload(&baseline);
                self.last_sent = Some(baseline);
                self.deltas.clear_sent(&sent.tag_group_deltas);
                self.access.set_pending_deltas(&self.deltas);
                info!("channel registration succeeded");
                effects.push(Effect::NotifySucceeded {
                    payload: sent.clone(),
                });
            }
            RegistrationOutcome::Failed => {
                warn!("channel registration failed; update remains pending");
                effects.push(Effect::NotifyFailed {
                    payload: sent.clone(),
                });
            }
        }
    }

    fn store_identity(
        &mut self,
        identity: ChannelIdentity,
        existing: bool,
        effects: &mut Vec<Effect>,
    ) {
        info!(channel_id = %identity.channel_id, existing, "channel identity created");
        self.access.set_channel_identity(&identity);
        self.identity = Some(identity.clone());
        effects.push(Effect::NotifyChannelCreated { identity, existing });
    }
}
