//! Session state: request-cycle status, undo history, and milestones.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Dimension, OnboardingData};

/// Where the session is in an oracle round trip.
///
/// One round trip walks Idle → Thinking → Retrieving → Assembling → Idle.
/// Completion is tracked separately and is not a status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Thinking,
    Retrieving,
    Assembling,
}

impl SessionStatus {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, target),
            (Idle, Thinking)
                | (Thinking, Retrieving)
                | (Retrieving, Assembling)
                | (Assembling, Idle)
                // failures drop straight back to idle
                | (Thinking, Idle)
                | (Retrieving, Idle)
        )
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
        };
        write!(f, "{s}")
    }
}

/// Bounded stack of prior data snapshots used for undo.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<OnboardingData>,
    limit: usize,
}

impl History {
    /// Create a history holding `initial` as its sole entry.
    pub fn new(initial: OnboardingData, limit: usize) -> Self {
        let mut entries = VecDeque::with_capacity(limit);
        entries.push_back(initial);
        Self {
            entries,
            limit: limit.max(1),
        }
    }

    /// Push a snapshot, dropping the oldest once the limit is exceeded.
    pub fn push(&mut self, snapshot: OnboardingData) {
        self.entries.push_back(snapshot);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// Pop the most recent snapshot. The last remaining entry is never popped.
    pub fn pop(&mut self) -> Option<OnboardingData> {
        if self.entries.len() <= 1 {
            return None;
        }
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A dimension crossing the milestone threshold for the first time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub step: usize,
    pub dimension: Dimension,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of overall progress for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub current_step: usize,
    pub total_steps: usize,
    pub progress_percent: u8,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_milestone: Option<Dimension>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with_progress(progress: u8) -> OnboardingData {
        OnboardingData {
            progress_percent: progress,
            ..Default::default()
        }
    }

    #[test]
    fn round_trip_transitions() {
        use SessionStatus::*;
        assert!(Idle.can_transition_to(Thinking));
        assert!(Thinking.can_transition_to(Retrieving));
        assert!(Retrieving.can_transition_to(Assembling));
        assert!(Assembling.can_transition_to(Idle));
        assert!(Retrieving.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Assembling));
        assert!(!Assembling.can_transition_to(Thinking));
        assert!(!Idle.can_transition_to(Idle));
    }

    #[test]
    fn display_matches_serde() {
        use SessionStatus::*;
        for status in [Idle, Thinking, Retrieving, Assembling] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(format!("\"{status}\""), json);
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut history = History::new(data_with_progress(0), 10);
        for i in 1..=10 {
            history.push(data_with_progress(i));
        }
        assert_eq!(history.len(), 10);

        // Oldest entries were dropped; the newest is on top.
        let top = history.pop().unwrap();
        assert_eq!(top.progress_percent, 10);
    }

    #[test]
    fn history_keeps_floor_of_one() {
        let mut history = History::new(data_with_progress(0), 10);
        assert!(history.pop().is_none());
        assert_eq!(history.len(), 1);

        history.push(data_with_progress(5));
        assert_eq!(history.pop().unwrap().progress_percent, 5);
        assert_eq!(history.len(), 1);
        assert!(history.pop().is_none());
    }

    #[test]
    fn progress_summary_serializes_camel_case() {
        let summary = ProgressSummary {
            current_step: 2,
            total_steps: 8,
            progress_percent: 31,
            is_complete: false,
            next_milestone: Some(Dimension::Workflows),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["currentStep"], 2);
        assert_eq!(json["nextMilestone"], "workflows");
    }
}
