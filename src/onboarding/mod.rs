//! Onboarding system: an adaptive questionnaire that maps a user's work.
//!
//! Each answer raises coverage on the dimensions the question targeted. An
//! LLM oracle picks the next question from the current coverage and
//! answers, with JSON recovery and a fixed fallback sequence when its output
//! is unusable. The session persists itself after every change and can be
//! resumed, undone, or reset.

pub mod coverage;
pub mod events;
pub mod fallback;
pub mod manager;
pub mod model;
pub mod oracle;
pub mod prompts;
pub mod repair;
pub mod routes;
pub mod state;

pub use coverage::{CoveragePatch, CoverageUpdate, calculate_progress, update_coverage};
pub use events::{EventEmitter, SessionEvent};
pub use manager::{OnboardingSession, SessionView};
pub use model::{
    Answer, AnswerValue, Coverage, CoverageEntry, Dimension, OnboardingData, Question, QuickPick,
    Track,
};
pub use oracle::{LlmQuestionOracle, OracleResponse, QuestionOracle, ResponseSource};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use state::{History, Milestone, ProgressSummary, SessionStatus};
