//! In-memory topic → session table map for one connected session.
//!
//! A topic moves `Unregistered → Provisioning → Active` at most once per
//! session. The registry is never persisted; a new session starts empty.

use std::collections::HashMap;

use crate::naming::SessionTableId;

/// Lifecycle state of a topic within the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicState<'a> {
    Unregistered,
    Provisioning,
    Active(&'a SessionTableId),
}

#[derive(Debug)]
enum Slot {
    Provisioning,
    Active(SessionTableId),
}

/// Session-scoped registry owned by the engine.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    topics: HashMap<String, Slot>,
}

impl SessionRegistry {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, topic: &str) -> TopicState<'_> {
        // ---
        match self.topics.get(topic) {
            None => TopicState::Unregistered,
            Some(Slot::Provisioning) => TopicState::Provisioning,
            Some(Slot::Active(id)) => TopicState::Active(id),
        }
    }

    /// Session table of an active topic.
    pub fn active(&self, topic: &str) -> Option<&SessionTableId> {
        // ---
        match self.topics.get(topic) {
            Some(Slot::Active(id)) => Some(id),
            _ => None,
        }
    }

    /// Mark an unregistered topic as provisioning.
    ///
    /// Returns `false` and leaves the entry untouched for any other state.
    pub fn begin(&mut self, topic: &str) -> bool {
        // ---
        if self.topics.contains_key(topic) {
            return false;
        }
        self.topics.insert(topic.to_string(), Slot::Provisioning);
        true
    }

    /// Complete provisioning of `topic`.
    ///
    /// Returns `false` unless the topic was provisioning.
    pub fn activate(&mut self, topic: &str, id: SessionTableId) -> bool {
        // ---
        match self.topics.get_mut(topic) {
            Some(slot) if matches!(slot, Slot::Provisioning) => {
                *slot = Slot::Active(id);
                true
            }
            _ => false,
        }
    }

    /// Roll a failed provisioning back to unregistered.
    pub fn abandon(&mut self, topic: &str) {
        // ---
        if matches!(self.topics.get(topic), Some(Slot::Provisioning)) {
            self.topics.remove(topic);
        }
    }

    /// Number of active topics.
    pub fn active_count(&self) -> usize {
        // ---
        self.topics
            .values()
            .filter(|slot| matches!(slot, Slot::Active(_)))
            .count()
    }

    /// Forget every topic, as at the start of a new session.
    pub fn clear(&mut self) {
        self.topics.clear();
    }
}
