//! Connection selectors and the broadcast matching rule.

use serde::{Deserialize, Serialize};
use shared_bus::EventType;
use shared_types::MatchId;
use std::collections::BTreeSet;

/// A connection's declared interest.
///
/// An empty `event_types` set means the connection hears nothing. An empty
/// `match_ids` allow-list means "any match" for the subscribed types.
/// Removing the last allowed match leaves no interest at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selector {
    pub event_types: BTreeSet<EventType>,
    pub match_ids: BTreeSet<MatchId>,
}

/// How `update_filters` combines the new selector with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Replace both sets.
    #[default]
    Set,
    /// Union with the stored sets.
    Add,
    /// Remove the given entries from the stored sets.
    Remove,
}

impl Selector {
    pub fn new(
        event_types: impl IntoIterator<Item = EventType>,
        match_ids: impl IntoIterator<Item = MatchId>,
    ) -> Self {
        Self {
            event_types: event_types.into_iter().collect(),
            match_ids: match_ids.into_iter().collect(),
        }
    }

    /// Interested in `event_types`, any match.
    pub fn for_types(event_types: impl IntoIterator<Item = EventType>) -> Self {
        Self::new(event_types, [])
    }

    /// Does a broadcast of `event_type` targeting `targets` reach this selector?
    ///
    /// A broadcast with no targets is global for its event type.
    pub fn matches(&self, event_type: EventType, targets: &[MatchId]) -> bool {
        if !self.event_types.contains(&event_type) {
            return false;
        }
        if self.match_ids.is_empty() || targets.is_empty() {
            return true;
        }
        targets.iter().any(|id| self.match_ids.contains(id))
    }

    pub fn apply(&mut self, op: FilterOp, other: Selector) {
        match op {
            FilterOp::Set => *self = other,
            FilterOp::Add => {
                self.event_types.extend(other.event_types);
                self.match_ids.extend(other.match_ids);
            }
            FilterOp::Remove => {
                let narrowed = !self.match_ids.is_empty();
                for t in &other.event_types {
                    self.event_types.remove(t);
                }
                for id in &other.match_ids {
                    self.match_ids.remove(id);
                }
                // An emptied allow-list must not widen to "any match".
                if narrowed && self.match_ids.is_empty() {
                    self.event_types.clear();
                }
            }
        }
    }
}
