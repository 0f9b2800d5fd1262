//! Bounded background-execution window.
//!
//! Registration calls may outlive immediate app activity, so every launch
//! first claims a background-execution slot from the host. The slot is a
//! scarce, OS-bounded resource: at most one is held at a time, and every
//! acquire must be balanced by exactly one release on every exit path
//! (success, failure, or forced expiry).
//!
//! Release is structured rather than manually paired: [`WindowGuard`] fires
//! its release hook exactly once, either through an explicit
//! [`WindowGuard::release`] or on drop.

use std::fmt;

use thiserror::Error;

/// No background execution time is available right now.
///
/// The orchestrator reacts by deferring the update to the next organic
/// trigger instead of retrying in a tight loop.
#[derive(Debug, Error)]
#[error("no background execution window available")]
pub struct WindowUnavailable;

/// Host-provided source of background-execution windows.
///
/// Implementations map onto whatever bounded-execution facility the host
/// platform offers. Expiry is signaled out of band: the host calls
/// [`ChannelOrchestrator::window_expired`](crate::ChannelOrchestrator::window_expired)
/// when the OS reclaims the window mid-flight.
pub trait ExecutionWindow: Send + Sync {
    /// Attempts to open the single background-execution slot.
    ///
    /// # Errors
    ///
    /// Returns [`WindowUnavailable`] when the host cannot grant background
    /// time; the caller must defer, not retry.
    fn try_begin(&self) -> Result<WindowGuard, WindowUnavailable>;
}

/// Scoped handle for one held execution window.
///
/// The release hook fires exactly once: on [`release`](Self::release) or on
/// drop, whichever comes first.
pub struct WindowGuard {
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl WindowGuard {
    /// Creates a guard that invokes `on_release` when the window ends.
    #[must_use]
    pub fn new(on_release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_release: Some(Box::new(on_release)),
        }
    }

    /// Releases the window explicitly.
    pub fn release(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl Drop for WindowGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for WindowGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowGuard")
            .field("released", &self.on_release.is_none())
            .finish()
    }
}

/// Window source for hosts without background-execution limits.
///
/// Always grants; release is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnboundedWindow;

impl ExecutionWindow for UnboundedWindow {
    fn try_begin(&self) -> Result<WindowGuard, WindowUnavailable> {
        Ok(WindowGuard::new(|| {}))
    }
}
