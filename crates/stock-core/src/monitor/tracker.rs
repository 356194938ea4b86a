use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::status::{Observation, Status, TransitionKind};
use crate::target::Target;

#[derive(Debug, Clone, Copy)]
struct Entry {
    observation: Observation,
    last_polled: Option<DateTime<Utc>>,
}

/// Last observed status per target URL.
#[derive(Debug, Default)]
pub struct StateTracker {
    entries: HashMap<String, Entry>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `status` against the stored observation, then store it.
    pub fn record_and_classify(&mut self, target: &Target, status: Status) -> TransitionKind {
        self.record_at(target, status, Utc::now())
    }

    pub fn record_at(&mut self, target: &Target, status: Status, at: DateTime<Utc>) -> TransitionKind {
        let entry = self.entries.entry(target.url.clone()).or_insert(Entry {
            observation: Observation::NotYetObserved,
            last_polled: None,
        });
        let transition = TransitionKind::classify(entry.observation, status);
        entry.observation = Observation::Observed(status);
        entry.last_polled = Some(at);
        transition
    }

    pub fn observation(&self, url: &str) -> Observation {
        self.entries
            .get(url)
            .map(|e| e.observation)
            .unwrap_or_default()
    }

    pub fn last_polled(&self, url: &str) -> Option<DateTime<Utc>> {
        self.entries.get(url).and_then(|e| e.last_polled)
    }

    pub fn snapshot(&self) -> HashMap<String, Observation> {
        self.entries
            .iter()
            .map(|(url, e)| (url.clone(), e.observation))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
