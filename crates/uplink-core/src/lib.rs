//! uplink-core — device channel registration orchestration.
//!
//! This crate keeps a device's identity record (a *channel*) synchronized
//! with a remote registration service as the device's push token,
//! notification settings, tags, and app lifecycle state change over time.
//! The hard part is reconciling many asynchronous triggers into a single,
//! race-free decision of whether, when, and with what payload to contact the
//! remote service, while respecting an OS-bounded background execution
//! window.
//!
//! # Collaborators
//!
//! The host supplies four seams:
//!
//! - [`settings::SettingsStore`]: durable key-value persistence.
//! - [`transport::ChannelTransport`]: the create/update network calls, with
//!   their own retry policy.
//! - [`token::TokenRegistrar`]: the platform push-registration flow.
//! - [`window::ExecutionWindow`]: bounded background-execution slots.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use uplink_core::{MemorySettingsStore, OrchestratorBuilder, UnboundedWindow};
//!
//! let orchestrator = OrchestratorBuilder::new(
//!     Arc::new(MemorySettingsStore::new()),
//!     transport,
//!     Arc::new(UnboundedWindow),
//!     registrar,
//! )
//! .build();
//!
//! orchestrator.app_became_active().await;
//! orchestrator.set_user_notifications_enabled(true).await;
//! ```
//!
//! # Guarantees
//!
//! - At most one registration attempt is in flight; triggers that arrive
//!   mid-flight coalesce into it and are re-evaluated on completion.
//! - Redundant triggers never generate redundant network traffic.
//! - Every acquired execution window is released exactly once across
//!   success, failure, and expiry paths.
//! - Tag-group deltas survive failed attempts and are cleared only for the
//!   attempt that actually sent them.

pub mod identity;
pub mod notification;
pub mod orchestrator;
pub mod payload;
pub mod permissions;
pub mod settings;
pub mod tags;
pub mod token;
pub mod transport;
pub mod window;

pub use identity::ChannelIdentity;
pub use notification::{
    DEFAULT_ACTION_IDENTIFIER, FetchResult, NotificationContent, NotificationResponse,
    PresentationOptions,
};
pub use orchestrator::{ChannelOrchestrator, OrchestratorBuilder, RegistrationDelegate};
pub use payload::{ChannelPayload, PayloadContext, QuietTimeWindow};
pub use permissions::NotificationOptions;
pub use settings::{
    MemorySettingsStore, QuietTime, RegistrationSettings, SettingsError, SettingsStore,
};
pub use tags::TagGroupDeltas;
pub use token::TokenRegistrar;
pub use transport::{ChannelTransport, RegistrationOutcome};
pub use window::{ExecutionWindow, UnboundedWindow, WindowGuard, WindowUnavailable};
