use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::Target;

/// Tri-state availability of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Available,
    NotAvailable,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::NotAvailable => "not_available",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Observation {
    #[default]
    NotYetObserved,
    Observed(Status),
}

impl Observation {
    pub fn status(self) -> Option<Status> {
        match self {
            Self::NotYetObserved => None,
            Self::Observed(s) => Some(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    FirstObservation,
    Unchanged,
    ChangedTo(Status),
}

impl TransitionKind {
    /// A change is only meaningful once a previous status exists.
    pub fn classify(previous: Observation, current: Status) -> Self {
        match previous {
            Observation::NotYetObserved => Self::FirstObservation,
            Observation::Observed(prev) if prev == current => Self::Unchanged,
            Observation::Observed(_) => Self::ChangedTo(current),
        }
    }

    pub fn is_change(self) -> bool {
        matches!(self, Self::ChangedTo(_))
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstObservation => write!(f, "first"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::ChangedTo(s) => write!(f, "changed_to_{}", s),
        }
    }
}

/// Outcome of polling one target once. Consumed by the dispatcher, then dropped.
#[derive(Debug, Clone)]
pub struct PollResult {
    pub target: Arc<Target>,
    pub previous: Option<Status>,
    pub status: Status,
    pub transition: TransitionKind,
    pub timestamp: DateTime<Utc>,
}

/// Per-target live status, for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    pub target_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled: Option<DateTime<Utc>>,
}
