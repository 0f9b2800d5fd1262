//! Pending tag-group deltas.
//!
//! Tag-group edits are queued as add/remove sets scoped to a named group and
//! ride along with the next registration payload. A delta stays pending until
//! the transport reports success for the specific attempt that carried it; a
//! failed attempt keeps every delta queued so the next attempt retries them.
//!
//! # Invariants
//!
//! - Within a group, the pending add and remove sets are disjoint: queueing a
//!   tag for add withdraws any pending remove for it, and vice versa.
//! - Empty per-group sets are dropped, so `is_empty` means "no pending work".
//! - [`TagGroupDeltas::clear_sent`] removes exactly the entries contained in
//!   a sent snapshot; deltas queued concurrently with an in-flight attempt
//!   survive.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum accepted tag length after trimming.
pub const MAX_TAG_LENGTH: usize = 127;

/// Pending add/remove tag sets keyed by group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGroupDeltas {
    /// Tags queued for addition, per group.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, BTreeSet<String>>,

    /// Tags queued for removal, per group.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remove: BTreeMap<String, BTreeSet<String>>,
}

impl TagGroupDeltas {
    /// Returns `true` when no tag-group work is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Queues tags for addition to `group`.
    ///
    /// Invalid tags and an invalid group name are dropped after normalization.
    /// Returns `true` if any pending state changed.
    pub fn add_tags<I>(&mut self, group: &str, tags: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let Some(group) = normalize_group(group) else {
            return false;
        };
        let tags = normalize_tags(tags);
        if tags.is_empty() {
            return false;
        }
        let mut changed = false;
        if let Some(pending_remove) = self.remove.get_mut(&group) {
            for tag in &tags {
                changed |= pending_remove.remove(tag);
            }
            if pending_remove.is_empty() {
                self.remove.remove(&group);
            }
        }
        let pending_add = self.add.entry(group).or_default();
        for tag in tags {
            changed |= pending_add.insert(tag);
        }
        changed
    }

    /// Queues tags for removal from `group`.
    ///
    /// Invalid tags and an invalid group name are dropped after normalization.
    /// Returns `true` if any pending state changed.
    pub fn remove_tags<I>(&mut self, group: &str, tags: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let Some(group) = normalize_group(group) else {
            return false;
        };
        let tags = normalize_tags(tags);
        if tags.is_empty() {
            return false;
        }
        let mut changed = false;
        if let Some(pending_add) = self.add.get_mut(&group) {
            for tag in &tags {
                changed |= pending_add.remove(tag);
            }
            if pending_add.is_empty() {
                self.add.remove(&group);
            }
        }
        let pending_remove = self.remove.entry(group).or_default();
        for tag in tags {
            changed |= pending_remove.insert(tag);
        }
        changed
    }

    /// Drops exactly the entries contained in `sent`.
    ///
    /// Called after the transport reports success for the attempt that
    /// carried the `sent` snapshot. Entries queued after the snapshot was
    /// taken are untouched.
    pub fn clear_sent(&mut self, sent: &Self) {
        clear_map(&mut self.add, &sent.add);
        clear_map(&mut self.remove, &sent.remove);
    }
}

fn clear_map(
    pending: &mut BTreeMap<String, BTreeSet<String>>,
    sent: &BTreeMap<String, BTreeSet<String>>,
) {
    for (group, sent_tags) in sent {
        if let Some(tags) = pending.get_mut(group) {
            for tag in sent_tags {
                tags.remove(tag);
            }
            if tags.is_empty() {
                pending.remove(group);
            }
        }
    }
}

/// Normalizes a set of tags, dropping invalid ones with a warning.
///
/// A tag is trimmed and must be 1 to [`MAX_TAG_LENGTH`] characters long
/// afterwards.
pub fn normalize_tags<I>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    tags.into_iter()
        .filter_map(|tag| {
            let trimmed = tag.trim();
            if trimmed.is_empty() || trimmed.chars().count() > MAX_TAG_LENGTH {
                warn!(tag = %tag, "dropping invalid tag");
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn normalize_group(group: &str) -> Option<String> {
    let trimmed = group.trim();
    if trimmed.is_empty() {
        warn!("dropping tag-group operation with empty group name");
        None
    } else {
        Some(trimmed.to_string())
    }
}
