//! Session telemetry: structured log lines plus a broadcast feed.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::model::{AnswerValue, Dimension, UiKind};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// A dimension and its score, as reported in completion events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub name: Dimension,
    pub score: f64,
}

/// Something observable that happened in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    #[serde(rename = "question.asked")]
    QuestionAsked {
        question_id: String,
        question_type: UiKind,
        fallback: bool,
    },
    #[serde(rename = "answer.captured")]
    AnswerCaptured {
        question_id: String,
        answer_type: String,
        value: AnswerValue,
    },
    #[serde(rename = "coverage.updated")]
    CoverageUpdated {
        dimension: Dimension,
        old_score: f64,
        new_score: f64,
    },
    #[serde(rename = "tracks.updated")]
    TracksUpdated { track_count: usize },
    #[serde(rename = "tracks.accepted")]
    TrackAccepted { track_id: String },
    #[serde(rename = "tracks.swap_requested")]
    TrackSwapRequested { track_id: String },
    #[serde(rename = "oracle.failed")]
    OracleFailed { kind: String, message: String },
    #[serde(rename = "undo")]
    Undo { action_type: String },
    #[serde(rename = "reset")]
    Reset,
    #[serde(rename = "save.resume")]
    SessionResumed { answers: usize },
    #[serde(rename = "progress.step_completed")]
    StepCompleted {
        step: usize,
        question_id: String,
        targets: Vec<Dimension>,
    },
    #[serde(rename = "progress.step_skipped")]
    StepSkipped { step: usize },
    #[serde(rename = "progress.dimension_milestone")]
    DimensionMilestone {
        step: usize,
        dimension: Dimension,
        score: f64,
    },
    #[serde(rename = "progress.completion_reached")]
    CompletionReached {
        final_score: u8,
        total_answers: usize,
        top_dimensions: Vec<DimensionScore>,
    },
}

impl SessionEvent {
    /// Dotted event name, matching the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QuestionAsked { .. } => "question.asked",
            Self::AnswerCaptured { .. } => "answer.captured",
            Self::CoverageUpdated { .. } => "coverage.updated",
            Self::TracksUpdated { .. } => "tracks.updated",
            Self::TrackAccepted { .. } => "tracks.accepted",
            Self::TrackSwapRequested { .. } => "tracks.swap_requested",
            Self::OracleFailed { .. } => "oracle.failed",
            Self::Undo { .. } => "undo",
            Self::Reset => "reset",
            Self::SessionResumed { .. } => "save.resume",
            Self::StepCompleted { .. } => "progress.step_completed",
            Self::StepSkipped { .. } => "progress.step_skipped",
            Self::DimensionMilestone { .. } => "progress.dimension_milestone",
            Self::CompletionReached { .. } => "progress.completion_reached",
        }
    }

    fn is_milestone(&self) -> bool {
        matches!(
            self,
            Self::DimensionMilestone { .. } | Self::CompletionReached { .. }
        )
    }
}

/// Fire-and-forget event sink. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Log and broadcast an event. Never blocks or fails.
    pub fn emit(&self, event: SessionEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        if event.is_milestone() {
            info!(event = event.name(), payload = %payload, "Telemetry");
        } else {
            debug!(event = event.name(), payload = %payload, "Telemetry");
        }
        // ok if nobody is listening
        let _ = self.tx.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
