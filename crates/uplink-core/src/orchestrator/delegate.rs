//! Host observer for registration milestones.

use crate::identity::ChannelIdentity;
use crate::payload::ChannelPayload;

/// Receives registration milestones.
///
/// All methods default to no-ops so hosts implement only what they need.
/// Calls are made from the orchestrator's effect execution, outside its
/// serialization point; implementations must not block.
pub trait RegistrationDelegate: Send + Sync {
    /// A channel identity was created.
    ///
    /// `existing == false` marks a first-time registration; this fires
    /// exactly once per created identity, so first-run logic belongs here.
    fn channel_created(&self, identity: &ChannelIdentity, existing: bool) {
        let _ = (identity, existing);
    }

    /// A registration attempt succeeded with the given payload.
    fn registration_succeeded(&self, payload: &ChannelPayload) {
        let _ = payload;
    }

    /// A registration attempt failed; the update stays pending.
    fn registration_failed(&self, payload: &ChannelPayload) {
        let _ = payload;
    }
}
