//! Host-facing orchestrator runtime.
//!
//! [`ChannelOrchestrator`] wraps the deterministic engine behind the single
//! serialization point the concurrency model requires: every entry point
//! locks the engine, dispatches exactly one input, then executes the
//! returned effects outside the lock. Transport and token-registrar calls
//! run on spawned tasks whose results are queued back through the same
//! lock, so outcome processing is never re-entrant with trigger evaluation.
//!
//! Window guards are held in a map keyed by attempt id; the engine decides
//! when each is released (outcome or expiry), and the map guarantees at most
//! one release per acquire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::delegate::RegistrationDelegate;
use super::engine::{AttemptId, Effect, Engine, Event};
use crate::identity::ChannelIdentity;
use crate::notification::{
    FetchResult, NotificationContent, NotificationResponse, PresentationOptions,
};
use crate::permissions::NotificationOptions;
use crate::settings::{QuietTime, RegistrationSettings, SettingsAccess, SettingsStore};
use crate::tags::TagGroupDeltas;
use crate::token::{self, TokenRegistrar};
use crate::transport::{ChannelTransport, RegistrationOutcome};
use crate::window::{ExecutionWindow, WindowGuard};

/// Builds a [`ChannelOrchestrator`] from its collaborators.
pub struct OrchestratorBuilder {
    store: Arc<dyn SettingsStore>,
    transport: Arc<dyn ChannelTransport>,
    window: Arc<dyn ExecutionWindow>,
    registrar: Arc<dyn TokenRegistrar>,
    delegate: Option<Arc<dyn RegistrationDelegate>>,
    presentation: PresentationOptions,
}

impl OrchestratorBuilder {
    /// Creates a builder with the required collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn SettingsStore>,
        transport: Arc<dyn ChannelTransport>,
        window: Arc<dyn ExecutionWindow>,
        registrar: Arc<dyn TokenRegistrar>,
    ) -> Self {
        Self {
            store,
            transport,
            window,
            registrar,
            delegate: None,
            presentation: PresentationOptions::NONE,
        }
    }

    /// Registers a delegate for registration milestones.
    #[must_use]
    pub fn delegate(mut self, delegate: Arc<dyn RegistrationDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Sets the default foreground presentation options.
    #[must_use]
    pub fn default_presentation_options(mut self, options: PresentationOptions) -> Self {
        self.presentation = options;
        self
    }

    /// Loads persisted state (running the settings migration) and builds the
    /// orchestrator.
    #[must_use]
    pub fn build(self) -> ChannelOrchestrator {
        let engine = Engine::new(SettingsAccess::new(self.store));
        ChannelOrchestrator {
            inner: Arc::new(Inner {
                engine: AsyncMutex::new(engine),
                transport: self.transport,
                window: self.window,
                registrar: self.registrar,
                delegate: self.delegate,
                presentation: self.presentation,
                windows: StdMutex::new(HashMap::new()),
                launch_response: StdMutex::new(None),
            }),
        }
    }
}

/// Device channel registration orchestrator.
///
/// Cheap to clone; all clones share one engine and one serialization point.
#[derive(Clone)]
pub struct ChannelOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    engine: AsyncMutex<Engine>,
    transport: Arc<dyn ChannelTransport>,
    window: Arc<dyn ExecutionWindow>,
    registrar: Arc<dyn TokenRegistrar>,
    delegate: Option<Arc<dyn RegistrationDelegate>>,
    presentation: PresentationOptions,
    windows: StdMutex<HashMap<AttemptId, WindowGuard>>,
    launch_response: StdMutex<Option<NotificationResponse>>,
}

impl ChannelOrchestrator {
    // -------------------------------------------------------------------
    // Lifecycle signals
    // -------------------------------------------------------------------

    /// The application moved to the foreground.
    pub async fn app_became_active(&self) {
        self.apply(|engine| engine.handle(Event::AppBecameActive)).await;
    }

    /// The application moved to the background.
    pub async fn app_entered_background(&self) {
        self.take_launch_response();
        self.apply(|engine| engine.handle(Event::AppEnteredBackground))
            .await;
    }

    /// The host's background-refresh permission changed.
    pub async fn background_refresh_status_changed(&self, available: bool) {
        self.apply(|engine| engine.handle(Event::BackgroundRefreshStatusChanged { available }))
            .await;
    }

    /// The platform delivered a push token.
    ///
    /// The raw value is normalized; values that normalize to nothing are
    /// dropped with a warning.
    pub async fn device_token_updated(&self, raw_token: &str) {
        let Some(token) = token::normalize_device_token(raw_token) else {
            warn!("ignoring empty device token");
            return;
        };
        self.apply(|engine| engine.handle(Event::DeviceTokenUpdated { token }))
            .await;
    }

    /// The platform reported the authorized capability set.
    pub async fn permissions_updated(&self, options: NotificationOptions) {
        self.apply(|engine| engine.handle(Event::PermissionsUpdated { options }))
            .await;
    }

    /// Explicitly requests a registration update.
    ///
    /// `forceful` bypasses the payload-unchanged skip check.
    pub async fn update_registration(&self, forceful: bool) {
        self.apply(|engine| engine.handle(Event::UpdateRequested { forceful }))
            .await;
    }

    /// The OS reclaimed the background-execution window.
    ///
    /// Abandons the in-flight attempt and releases the window; a late
    /// transport outcome will still update persisted state.
    pub async fn window_expired(&self) {
        self.apply(|engine| engine.handle(Event::WindowExpired)).await;
    }

    // -------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------

    /// Enables or disables user-visible notifications.
    pub async fn set_user_notifications_enabled(&self, enabled: bool) {
        self.apply(|engine| engine.set_user_notifications_enabled(enabled))
            .await;
    }

    /// Enables or disables background notifications.
    pub async fn set_background_notifications_enabled(&self, enabled: bool) {
        self.apply(|engine| engine.set_background_notifications_enabled(enabled))
            .await;
    }

    /// Enables or disables sending the device token during registration.
    pub async fn set_token_registration_enabled(&self, enabled: bool) {
        self.apply(|engine| engine.set_token_registration_enabled(enabled))
            .await;
    }

    /// Sets or clears the device alias.
    pub async fn set_alias(&self, alias: Option<String>) {
        self.apply(|engine| engine.set_alias(alias)).await;
    }

    /// Replaces the device-level tag set.
    pub async fn set_tags(&self, tags: Vec<String>) {
        self.apply(|engine| engine.set_tags(tags)).await;
    }

    /// Queues tags for addition to a tag group.
    pub async fn add_group_tags(&self, group: &str, tags: Vec<String>) {
        self.apply(|engine| engine.add_group_tags(group, tags)).await;
    }

    /// Queues tags for removal from a tag group.
    pub async fn remove_group_tags(&self, group: &str, tags: Vec<String>) {
        self.apply(|engine| engine.remove_group_tags(group, tags))
            .await;
    }

    /// Sets the badge count.
    pub async fn set_badge(&self, badge: u32) {
        self.apply(|engine| engine.set_badge(badge)).await;
    }

    /// Sets or clears the quiet-time window.
    pub async fn set_quiet_time(&self, quiet_time: Option<QuietTime>) {
        self.apply(|engine| engine.set_quiet_time(quiet_time)).await;
    }

    /// Activates or deactivates the quiet-time window.
    pub async fn set_quiet_time_enabled(&self, enabled: bool) {
        self.apply(|engine| engine.set_quiet_time_enabled(enabled))
            .await;
    }

    /// Allows or blocks channel creation before an identity exists.
    pub async fn set_channel_creation_enabled(&self, enabled: bool) {
        self.apply(|engine| engine.set_channel_creation_enabled(enabled))
            .await;
    }

    // -------------------------------------------------------------------
    // Getters
    // -------------------------------------------------------------------

    /// Snapshot of the current registration settings.
    pub async fn settings(&self) -> RegistrationSettings {
        self.inner.engine.lock().await.settings().clone()
    }

    /// The channel identity, once one exists.
    pub async fn channel_identity(&self) -> Option<ChannelIdentity> {
        self.inner.engine.lock().await.identity().cloned()
    }

    /// The current (normalized) device token, if one has been delivered.
    pub async fn device_token(&self) -> Option<String> {
        self.inner
            .engine
            .lock()
            .await
            .device_token()
            .map(str::to_string)
    }

    /// Snapshot of the pending tag-group deltas.
    pub async fn pending_tag_group_deltas(&self) -> TagGroupDeltas {
        self.inner.engine.lock().await.pending_deltas().clone()
    }

    // -------------------------------------------------------------------
    // Notification surface
    // -------------------------------------------------------------------

    /// A remote notification was received.
    pub fn notification_received(
        &self,
        content: &NotificationContent,
        foreground: bool,
    ) -> FetchResult {
        debug!(
            identifier = content.identifier.as_deref().unwrap_or("<none>"),
            foreground, "remote notification received"
        );
        FetchResult::NoData
    }

    /// The user responded to a presented notification.
    ///
    /// The default (tap) action is recorded as the launch response until the
    /// app next enters the background.
    pub fn notification_response_received(&self, response: NotificationResponse) {
        if response.is_default_action() {
            *self
                .inner
                .launch_response
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(response);
        }
    }

    /// Foreground presentation options for a notification.
    pub fn presentation_options(&self, content: &NotificationContent) -> PresentationOptions {
        let _ = content;
        self.inner.presentation
    }

    /// The notification response that launched the app, if any.
    pub fn launch_notification_response(&self) -> Option<NotificationResponse> {
        self.inner
            .launch_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_launch_response(&self) {
        self.inner
            .launch_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    // -------------------------------------------------------------------
    // Effect execution
    // -------------------------------------------------------------------

    /// Locks the engine, applies one input, then executes the effects.
    ///
    /// Effects run outside the lock. Effects that produce follow-up events
    /// (window acquisition failure) loop back through the lock until the
    /// queue drains.
    async fn apply<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Engine) -> Vec<Effect>,
    {
        let mut effects = { mutate(&mut *self.inner.engine.lock().await) };
        loop {
            let mut follow_ups = Vec::new();
            for effect in effects.drain(..) {
                self.execute(effect, &mut follow_ups);
            }
            if follow_ups.is_empty() {
                break;
            }
            let mut engine = self.inner.engine.lock().await;
            for event in follow_ups {
                effects.extend(engine.handle(event));
            }
        }
    }

    fn execute(&self, effect: Effect, follow_ups: &mut Vec<Event>) {
        match effect {
            Effect::LaunchRegistration {
                attempt,
                channel,
                payload,
                forceful,
            } => match self.inner.window.try_begin() {
                Ok(guard) => {
                    self.inner
                        .windows
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(attempt, guard);
                    // Confirm the acquisition through the lock: an expiry that
                    // ran between the launch decision and this point already
                    // released an empty map slot, and the engine answers the
                    // confirmation with the release this guard still needs.
                    follow_ups.push(Event::WindowAcquired { attempt });
                    let orchestrator = self.clone();
                    let transport = Arc::clone(&self.inner.transport);
                    tokio::spawn(async move {
                        let outcome = transport
                            .register(channel.as_ref(), &payload, forceful)
                            .await;
                        orchestrator.deliver_outcome(attempt, outcome).await;
                    });
                }
                Err(error) => {
                    debug!(attempt, %error, "execution window unavailable");
                    follow_ups.push(Event::WindowUnavailable { attempt });
                }
            },
            Effect::ReleaseWindow { attempt } => {
                let guard = self
                    .inner
                    .windows
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&attempt);
                if let Some(guard) = guard {
                    guard.release();
                }
            }
            Effect::RefreshTokenRegistration { requested } => {
                let registrar = Arc::clone(&self.inner.registrar);
                tokio::spawn(async move {
                    registrar.refresh_registration(requested).await;
                });
            }
            Effect::NotifyChannelCreated { identity, existing } => {
                if let Some(delegate) = &self.inner.delegate {
                    delegate.channel_created(&identity, existing);
                }
            }
            Effect::NotifySucceeded { payload } => {
                if let Some(delegate) = &self.inner.delegate {
                    delegate.registration_succeeded(&payload);
                }
            }
            Effect::NotifyFailed { payload } => {
                if let Some(delegate) = &self.inner.delegate {
                    delegate.registration_failed(&payload);
                }
            }
        }
    }

    async fn deliver_outcome(&self, attempt: AttemptId, outcome: RegistrationOutcome) {
        self.apply(|engine| engine.handle(Event::TransportOutcome { attempt, outcome }))
            .await;
    }
}
