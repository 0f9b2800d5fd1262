//! Channel registration orchestrator.
//!
//! Reconciles asynchronous triggers — lifecycle transitions, platform token
//! refresh, settings mutations, permission changes — into a single race-free
//! decision of whether, when, and with what payload to contact the remote
//! registration service.
//!
//! # Architecture
//!
//! ```text
//! triggers ──► ChannelOrchestrator ──► Engine (serialized) ──► effects
//!                    ▲                                           │
//!                    └── queued transport outcomes ◄── spawned ──┘
//! ```
//!
//! The [`engine`](self) half is a deterministic state machine; the
//! [`ChannelOrchestrator`] half owns the serialization point, the window
//! guards, and the collaborator calls.

mod delegate;
mod engine;
mod runtime;

#[cfg(test)]
mod tests;

pub use delegate::RegistrationDelegate;
pub use runtime::{ChannelOrchestrator, OrchestratorBuilder};
