//! OnboardingSession: the onboarding state machine.
//!
//! Owns the session data, undo history, and request-cycle status. Every
//! action that changes data recomputes progress, re-derives completion, and
//! schedules a debounced snapshot write. Oracle failures never escape: the
//! session always ends an action Idle with either a question or none.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::store::{DebouncedSaver, SnapshotStore};

use super::coverage::{
    CoveragePatch, CoverageUpdate, calculate_progress, dimensions_by_score, update_coverage,
};
use super::events::{DimensionScore, EventEmitter, SessionEvent};
use super::model::{
    Answer, AnswerValue, Coverage, Dimension, OnboardingData, QuickPick, Question, Track,
};
use super::oracle::QuestionOracle;
use super::state::{History, Milestone, ProgressSummary, SessionStatus};

/// Serializable view of the whole session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub status: SessionStatus,
    pub current_question: Option<Question>,
    pub rationale: Option<String>,
    pub data: OnboardingData,
    pub current_step: usize,
    pub is_complete: bool,
    pub milestones: Vec<Milestone>,
    pub history_length: usize,
}

/// The onboarding state machine.
pub struct OnboardingSession {
    oracle: Arc<dyn QuestionOracle>,
    saver: DebouncedSaver,
    events: EventEmitter,
    config: SessionConfig,
    data: OnboardingData,
    history: History,
    current_question: Option<Question>,
    current_rationale: Option<String>,
    current_step: usize,
    milestones: Vec<Milestone>,
    is_complete: bool,
    status_tx: Arc<watch::Sender<SessionStatus>>,
}

/// Puts the status back to Idle when a round trip ends, including when its
/// future is dropped at the oracle call.
struct IdleOnDrop(Arc<watch::Sender<SessionStatus>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        let idle = self.0.borrow().is_idle();
        if !idle {
            warn!("Oracle round trip cancelled, returning to idle");
            self.0.send_replace(SessionStatus::Idle);
        }
    }
}

impl OnboardingSession {
    /// Create a session with empty data. Must be called inside a Tokio
    /// runtime (the snapshot writer is spawned here).
    pub fn new(
        oracle: Arc<dyn QuestionOracle>,
        store: Arc<dyn SnapshotStore>,
        events: EventEmitter,
        config: SessionConfig,
    ) -> Self {
        let saver = DebouncedSaver::spawn(store, config.save_debounce);
        let data = OnboardingData::default();
        let history = History::new(data.clone(), config.history_limit);
        let (status_tx, _rx) = watch::channel(SessionStatus::Idle);
        Self {
            oracle,
            saver,
            events,
            config,
            data,
            history,
            current_question: None,
            current_rationale: None,
            current_step: 0,
            milestones: Vec::new(),
            is_complete: false,
            status_tx: Arc::new(status_tx),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Observe status changes, including while an action holds the session.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_question.as_ref()
    }

    pub fn current_rationale(&self) -> Option<&str> {
        self.current_rationale.as_deref()
    }

    pub fn data(&self) -> &OnboardingData {
        &self.data
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            status: self.status(),
            current_question: self.current_question.clone(),
            rationale: self.current_rationale.clone(),
            data: self.data.clone(),
            current_step: self.current_step,
            is_complete: self.is_complete,
            milestones: self.milestones.clone(),
            history_length: self.history.len(),
        }
    }

    /// Overall progress plus the most valuable dimension still below the
    /// milestone ceiling.
    pub fn progress_summary(&self) -> ProgressSummary {
        let mut next: Option<(Dimension, f64)> = None;
        for (dim, entry) in self.data.coverage.iter() {
            if entry.score >= self.config.next_milestone_ceiling {
                continue;
            }
            if next.is_none_or(|(_, weight)| entry.weight > weight) {
                next = Some((dim, entry.weight));
            }
        }

        ProgressSummary {
            current_step: self.current_step,
            total_steps: self.config.total_estimated_steps,
            progress_percent: self.data.progress_percent,
            is_complete: self.is_complete,
            next_milestone: next.map(|(dim, _)| dim),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Wipe any persisted session, start from empty data, and fetch the
    /// first question.
    pub async fn initialize(&mut self) {
        self.clear_persisted().await;
        self.reset_state(OnboardingData::default());
        info!("Onboarding session initialized");
        self.fetch_next_question().await;
    }

    /// Continue the persisted session if there is one, otherwise behave like
    /// `initialize`. Returns whether a snapshot was resumed.
    pub async fn resume(&mut self) -> bool {
        let loaded = match self.saver.store().load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Failed to load onboarding snapshot, starting fresh");
                None
            }
        };

        let Some(mut data) = loaded else {
            self.initialize().await;
            return false;
        };

        data.progress_percent = calculate_progress(&data.coverage);
        self.reset_state(data);
        self.current_step = self.data.answers.len();
        self.is_complete = self.completion_reached();
        info!(
            answers = self.data.answers.len(),
            progress = self.data.progress_percent,
            "Onboarding session resumed"
        );
        self.events.emit(SessionEvent::SessionResumed {
            answers: self.data.answers.len(),
        });
        self.fetch_next_question().await;
        true
    }

    /// Return to empty data without fetching a question.
    pub async fn reset(&mut self) {
        self.reset_state(OnboardingData::default());
        self.clear_persisted().await;
        self.events.emit(SessionEvent::Reset);
        info!("Onboarding session reset");
    }

    /// Write any pending snapshot now.
    pub async fn flush(&self) {
        self.saver.flush().await;
    }

    // ── Request cycle ───────────────────────────────────────────────

    /// One oracle round trip: Idle → Thinking → Retrieving → Assembling → Idle.
    ///
    /// On success the coverage update and tracks are merged before the new
    /// question is published. On failure the question is cleared.
    ///
    /// Cancel-safe: the previous question is cleared before the oracle call,
    /// and a dropped round trip still leaves the session Idle.
    pub async fn fetch_next_question(&mut self) {
        let _idle = IdleOnDrop(Arc::clone(&self.status_tx));
        self.current_question = None;
        self.current_rationale = None;
        self.set_status(SessionStatus::Thinking);
        self.set_status(SessionStatus::Retrieving);

        let result = self
            .oracle
            .request_next_question(&self.data.profile, &self.data.coverage, &self.data.answers)
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Failed to fetch next question");
                self.events.emit(SessionEvent::OracleFailed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                self.set_status(SessionStatus::Idle);
                return;
            }
        };

        self.set_status(SessionStatus::Assembling);

        let update = without_score_regressions(&self.data.coverage, &response.coverage_update);
        let tracks = response.tracks;
        let track_count = tracks.len();
        self.update_data(|data| {
            data.coverage = update_coverage(&data.coverage, &update);
            data.tracks = tracks;
        });
        self.events.emit(SessionEvent::TracksUpdated { track_count });

        let question = response.question;
        self.events.emit(SessionEvent::QuestionAsked {
            question_id: question.id.clone(),
            question_type: question.ui.kind(),
            fallback: response.source.is_fallback(),
        });
        debug!(question_id = %question.id, targets = ?question.targets, "Question published");
        self.current_question = Some(question);
        self.current_rationale = response.rationale;

        self.set_status(SessionStatus::Idle);
    }

    // ── Actions ─────────────────────────────────────────────────────

    /// Record an answer to the current question and fetch the next one.
    ///
    /// Returns false (and changes nothing) when there is no current question.
    pub async fn answer_question(&mut self, value: AnswerValue) -> bool {
        let Some(question) = self.current_question.clone() else {
            debug!("Answer ignored, no current question");
            return false;
        };

        self.history.push(self.data.clone());

        let step = self.data.answers.len() + 1;
        let answer_text = value.to_string().to_lowercase();
        let mut update = CoverageUpdate::new();
        for &dimension in &question.targets {
            let Some(entry) = self.data.coverage.get(dimension) else {
                continue;
            };
            let increase = self.config.answer_increment.min(100.0 - entry.score).max(0.0);
            let unknowns = entry
                .unknowns
                .iter()
                .filter(|u| !answer_text.contains(&u.to_lowercase()))
                .cloned()
                .collect();
            update.insert(
                dimension,
                CoveragePatch {
                    weight: None,
                    score: Some((entry.score + increase).min(100.0)),
                    unknowns: Some(unknowns),
                },
            );
        }

        self.events.emit(SessionEvent::AnswerCaptured {
            question_id: question.id.clone(),
            answer_type: value.type_label().to_string(),
            value: value.clone(),
        });

        let previous = self.data.coverage.clone();
        self.update_data(|data| {
            data.answers.push(Answer::new(question.id.clone(), value));
            data.coverage = update_coverage(&data.coverage, &update);
        });
        self.current_step = self.data.answers.len();
        self.record_score_changes(&previous, &update, step);

        self.events.emit(SessionEvent::StepCompleted {
            step,
            question_id: question.id,
            targets: question.targets,
        });

        self.fetch_next_question().await;
        true
    }

    /// Move on without answering.
    pub async fn skip_question(&mut self) {
        self.current_step += 1;
        self.events.emit(SessionEvent::StepSkipped {
            step: self.current_step,
        });
        self.fetch_next_question().await;
    }

    /// Submit a predefined shortcut as the answer for this step.
    pub async fn handle_quick_pick(&mut self, pick: &QuickPick) {
        self.history.push(self.data.clone());

        let step = self.data.answers.len() + 1;
        let mut update = CoverageUpdate::new();
        for &dimension in pick.targets {
            if let Some(entry) = self.data.coverage.get(dimension) {
                let score = (entry.score + self.config.quick_pick_increment).min(100.0);
                update.insert(dimension, CoveragePatch::score(score));
            }
        }

        let question_id = pick.question_id();
        let value = AnswerValue::Text(pick.value.to_string());
        self.events.emit(SessionEvent::AnswerCaptured {
            question_id: question_id.clone(),
            answer_type: "quickpick".to_string(),
            value: value.clone(),
        });

        let previous = self.data.coverage.clone();
        self.update_data(|data| {
            data.answers.push(Answer::new(question_id, value));
            data.coverage = update_coverage(&data.coverage, &update);
        });
        self.current_step = self.data.answers.len();
        self.record_score_changes(&previous, &update, step);

        self.fetch_next_question().await;
    }

    /// Restore the snapshot taken before the last answer or quick pick.
    ///
    /// Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.pop() else {
            return false;
        };

        self.data = previous;
        self.current_question = None;
        self.current_rationale = None;
        self.current_step = self.data.answers.len();
        self.is_complete = self.completion_reached();
        self.saver.schedule(&self.data);
        self.events.emit(SessionEvent::Undo {
            action_type: "answer".to_string(),
        });
        info!(step = self.current_step, "Undid last answer");
        true
    }

    /// Accept a recommended track. Returns it if it exists.
    pub fn accept_track(&self, track_id: &str) -> Option<Track> {
        let track = self.data.tracks.iter().find(|t| t.id == track_id)?.clone();
        self.events.emit(SessionEvent::TrackAccepted {
            track_id: track.id.clone(),
        });
        info!(track_id = %track.id, title = %track.title, "Track accepted");
        Some(track)
    }

    /// Ask for an alternative to a recommended track. Returns false for
    /// unknown tracks.
    pub fn swap_track(&self, track_id: &str) -> bool {
        if !self.data.tracks.iter().any(|t| t.id == track_id) {
            return false;
        }
        self.events.emit(SessionEvent::TrackSwapRequested {
            track_id: track_id.to_string(),
        });
        true
    }

    // ── Internals ───────────────────────────────────────────────────

    fn set_status(&self, status: SessionStatus) {
        let current = self.status();
        if current != status && !current.can_transition_to(status) {
            warn!(from = %current, to = %status, "Unexpected status transition");
        }
        self.status_tx.send_replace(status);
    }

    fn reset_state(&mut self, data: OnboardingData) {
        self.history = History::new(data.clone(), self.config.history_limit);
        self.data = data;
        self.current_question = None;
        self.current_rationale = None;
        self.current_step = 0;
        self.milestones.clear();
        self.is_complete = false;
        self.set_status(SessionStatus::Idle);
    }

    async fn clear_persisted(&self) {
        if let Err(e) = self.saver.clear().await {
            warn!(error = %e, "Failed to clear onboarding snapshot");
        }
    }

    fn completion_reached(&self) -> bool {
        self.data.progress_percent >= self.config.completion_threshold
    }

    /// Apply a change, recompute progress and completion, schedule a save.
    fn update_data(&mut self, change: impl FnOnce(&mut OnboardingData)) {
        change(&mut self.data);
        self.data.progress_percent = calculate_progress(&self.data.coverage);
        self.check_completion();
        self.saver.schedule(&self.data);
    }

    fn check_completion(&mut self) {
        let complete = self.completion_reached();
        if complete && !self.is_complete {
            let top_dimensions = dimensions_by_score(&self.data.coverage, true, 3)
                .into_iter()
                .map(|name| DimensionScore {
                    name,
                    score: self.data.coverage.score(name),
                })
                .collect();
            self.events.emit(SessionEvent::CompletionReached {
                final_score: self.data.progress_percent,
                total_answers: self.data.answers.len(),
                top_dimensions,
            });
            info!(progress = self.data.progress_percent, "Onboarding complete");
        }
        self.is_complete = complete;
    }

    /// Emit coverage events and record first crossings of the milestone
    /// threshold.
    fn record_score_changes(&mut self, previous: &Coverage, update: &CoverageUpdate, step: usize) {
        let threshold = self.config.milestone_threshold;
        for (&dimension, patch) in update {
            let (Some(old_score), Some(new_score)) =
                (previous.get(dimension).map(|e| e.score), patch.score)
            else {
                continue;
            };

            self.events.emit(SessionEvent::CoverageUpdated {
                dimension,
                old_score,
                new_score,
            });

            let crossed = old_score < threshold && new_score >= threshold;
            let seen = self.milestones.iter().any(|m| m.dimension == dimension);
            if crossed && !seen {
                self.milestones.push(Milestone {
                    step,
                    dimension,
                    score: new_score,
                    timestamp: chrono::Utc::now(),
                });
                self.events.emit(SessionEvent::DimensionMilestone {
                    step,
                    dimension,
                    score: new_score,
                });
            }
        }
    }
}

/// Clamp oracle score updates so no dimension's score goes down.
fn without_score_regressions(base: &Coverage, update: &CoverageUpdate) -> CoverageUpdate {
    update
        .iter()
        .map(|(&dimension, patch)| {
            let mut patch = patch.clone();
            if let (Some(score), Some(entry)) = (patch.score, base.get(dimension)) {
                patch.score = Some(score.max(entry.score));
            }
            (dimension, patch)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::OracleError;
    use crate::onboarding::model::{CoverageEntry, Profile, TrackLevel, UiSpec, find_quick_pick};
    use crate::onboarding::oracle::{OracleResponse, ResponseSource};
    use crate::onboarding::repair::RecoveryStage;
    use crate::store::MemorySnapshotStore;

    /// Oracle that replays scripted results, then a default question.
    #[derive(Default)]
    struct StubOracle {
        script: Mutex<VecDeque<Result<OracleResponse, OracleError>>>,
        calls: AtomicUsize,
        status_rx: Mutex<Option<watch::Receiver<SessionStatus>>>,
        seen_status: Mutex<Vec<SessionStatus>>,
        /// 1-based call number that never returns.
        hang_on_call: Option<usize>,
    }

    impl StubOracle {
        fn scripted(results: Vec<Result<OracleResponse, OracleError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(results.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuestionOracle for StubOracle {
        async fn request_next_question(
            &self,
            _profile: &Profile,
            _coverage: &Coverage,
            answers: &[Answer],
        ) -> Result<OracleResponse, OracleError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang_on_call == Some(call) {
                std::future::pending::<()>().await;
            }
            if let Some(rx) = self.status_rx.lock().unwrap().as_ref() {
                self.seen_status.lock().unwrap().push(*rx.borrow());
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(response(&format!("q{}", answers.len() + 1), &[Dimension::Role])))
        }
    }

    fn response(id: &str, targets: &[Dimension]) -> OracleResponse {
        OracleResponse {
            question: Question {
                id: id.to_string(),
                prompt: "Tell us more".to_string(),
                context: None,
                ui: UiSpec::short_text("..."),
                targets: targets.to_vec(),
            },
            coverage_update: CoverageUpdate::new(),
            tracks: Vec::new(),
            rationale: Some("stub".to_string()),
            source: ResponseSource::Oracle(RecoveryStage::Extracted),
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: "AI-Powered Product Management".to_string(),
            level: TrackLevel::Applied,
            modules: vec!["User Story Generation".to_string()],
            rationale: "PM role".to_string(),
            eta_hours: Some(8.0),
        }
    }

    fn coverage_of(entries: &[(Dimension, f64, f64, &[&str])]) -> Coverage {
        entries
            .iter()
            .map(|(d, w, s, u)| (*d, CoverageEntry::new(*w, *s, u)))
            .collect()
    }

    fn data_with(coverage: Coverage) -> OnboardingData {
        OnboardingData {
            coverage,
            ..Default::default()
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            save_debounce: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn session_with(
        oracle: Arc<StubOracle>,
        store: Arc<MemorySnapshotStore>,
    ) -> OnboardingSession {
        OnboardingSession::new(oracle, store, EventEmitter::new(), config())
    }

    async fn started(oracle: Arc<StubOracle>) -> (OnboardingSession, Arc<MemorySnapshotStore>) {
        let store = Arc::new(MemorySnapshotStore::new());
        let mut session = session_with(oracle, store.clone());
        session.initialize().await;
        (session, store)
    }

    async fn resumed(oracle: Arc<StubOracle>, data: OnboardingData) -> OnboardingSession {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(data));
        let mut session = session_with(oracle, store);
        assert!(session.resume().await);
        session
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn initialize_wipes_store_and_fetches_first_question() {
        let oracle = StubOracle::scripted(vec![]);
        let store = Arc::new(MemorySnapshotStore::with_snapshot(OnboardingData {
            progress_percent: 50,
            ..Default::default()
        }));
        let mut session = session_with(oracle.clone(), store.clone());
        session.initialize().await;

        assert!(store.load().await.unwrap().is_none());
        assert_eq!(oracle.calls(), 1);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.current_question().unwrap().id, "q1");
        assert_eq!(session.current_rationale(), Some("stub"));
        assert_eq!(session.current_step(), 0);
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.data().progress_percent, 0);
    }

    #[tokio::test]
    async fn answer_raises_targets_and_drops_matched_unknowns() {
        let (mut session, _store) = started(StubOracle::scripted(vec![])).await;

        let answered = session
            .answer_question(AnswerValue::Text("My TITLE is VP of Engineering at Meta".into()))
            .await;
        assert!(answered);

        let role = session.data().coverage.get(Dimension::Role).unwrap();
        assert_eq!(role.score, 25.0);
        assert_eq!(role.unknowns, vec!["seniority"]);
        assert_eq!(session.current_step(), 1);
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.data().answers.len(), 1);
        assert_eq!(session.data().answers[0].question_id, "q1");
        // A new question was fetched
        assert_eq!(session.current_question().unwrap().id, "q2");
    }

    #[tokio::test]
    async fn single_dimension_progress_after_answer() {
        let data = data_with(coverage_of(&[(Dimension::Role, 0.8, 0.0, &["title"])]));
        let mut session = resumed(StubOracle::scripted(vec![]), data).await;

        session.answer_question(AnswerValue::Text("Senior PM".into())).await;
        assert_eq!(session.data().coverage.score(Dimension::Role), 25.0);
        assert_eq!(session.data().progress_percent, 25);
    }

    #[tokio::test]
    async fn answer_never_exceeds_one_hundred() {
        let data = data_with(coverage_of(&[(Dimension::Role, 0.8, 90.0, &[])]));
        let mut session = resumed(StubOracle::scripted(vec![]), data).await;

        session.answer_question(AnswerValue::Number(7.0)).await;
        assert_eq!(session.data().coverage.score(Dimension::Role), 100.0);

        session.answer_question(AnswerValue::Number(8.0)).await;
        assert_eq!(session.data().coverage.score(Dimension::Role), 100.0);
    }

    #[tokio::test]
    async fn answer_without_question_is_ignored() {
        let oracle = StubOracle::scripted(vec![Err(OracleError::RateLimited)]);
        let (mut session, _store) = started(oracle.clone()).await;
        assert!(session.current_question().is_none());

        let before = session.data().clone();
        assert!(!session.answer_question(AnswerValue::Text("hello".into())).await);
        assert_eq!(session.data(), &before);
        assert_eq!(session.history_len(), 1);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn undo_restores_exact_prior_data() {
        let (mut session, _store) = started(StubOracle::scripted(vec![])).await;
        session.answer_question(AnswerValue::Text("PM".into())).await;

        let before = session.data().clone();
        let history_before = session.history_len();
        session
            .answer_question(AnswerValue::Choices(vec!["Jira".into(), "Slack".into()]))
            .await;
        assert_ne!(session.data(), &before);

        assert!(session.undo());
        assert_eq!(session.data(), &before);
        assert_eq!(session.history_len(), history_before);
        assert!(session.current_question().is_none());
        assert_eq!(session.current_step(), 1);
    }

    #[tokio::test]
    async fn undo_also_reverts_quick_picks() {
        let (mut session, _store) = started(StubOracle::scripted(vec![])).await;
        let before = session.data().clone();

        session.handle_quick_pick(find_quick_pick("jira").unwrap()).await;
        assert!(session.undo());
        assert_eq!(session.data(), &before);
    }

    #[tokio::test]
    async fn undo_at_floor_is_noop() {
        let (mut session, _store) = started(StubOracle::scripted(vec![])).await;
        let mut rx = session.events().subscribe();

        assert!(!session.undo());
        assert_eq!(session.history_len(), 1);
        assert!(session.current_question().is_some());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn history_is_capped() {
        let (mut session, _store) = started(StubOracle::scripted(vec![])).await;
        for i in 0..12 {
            session.answer_question(AnswerValue::Text(format!("answer {i}"))).await;
        }
        assert_eq!(session.history_len(), 10);
        assert_eq!(session.current_step(), 12);
    }

    #[tokio::test]
    async fn quick_pick_adds_flat_increment() {
        let (mut session, _store) = started(StubOracle::scripted(vec![])).await;
        let slack = find_quick_pick("slack").unwrap();
        session.handle_quick_pick(slack).await;

        let coverage = &session.data().coverage;
        assert_eq!(coverage.score(Dimension::Tools), 20.0);
        assert_eq!(coverage.score(Dimension::Collaboration), 20.0);
        // Unknowns are left alone
        assert_eq!(coverage.get(Dimension::Tools).unwrap().unknowns.len(), 2);

        let answer = &session.data().answers[0];
        assert_eq!(answer.question_id, "quickpick-slack");
        assert_eq!(answer.value, AnswerValue::Text("Slack".into()));
        assert_eq!(session.current_step(), 1);
        assert_eq!(session.history_len(), 2);
    }

    #[tokio::test]
    async fn skip_advances_step_only() {
        let oracle = StubOracle::scripted(vec![]);
        let (mut session, _store) = started(oracle.clone()).await;
        let before = session.data().clone();

        session.skip_question().await;
        assert_eq!(session.current_step(), 1);
        assert_eq!(session.data(), &before);
        assert_eq!(session.history_len(), 1);
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn oracle_failure_clears_question_and_returns_idle() {
        let oracle = StubOracle::scripted(vec![
            Ok(response("q1", &[Dimension::Role])),
            Err(OracleError::Transport("connection reset".into())),
        ]);
        let (mut session, _store) = started(oracle).await;
        let mut rx = session.events().subscribe();

        session.answer_question(AnswerValue::Text("PM".into())).await;
        assert!(session.current_question().is_none());
        assert!(session.current_rationale().is_none());
        assert_eq!(session.status(), SessionStatus::Idle);
        // The answer itself was kept
        assert_eq!(session.data().answers.len(), 1);

        let failed = drain(&mut rx)
            .into_iter()
            .any(|e| matches!(e, SessionEvent::OracleFailed { ref kind, .. } if kind == "unknown_transport_error"));
        assert!(failed);
    }

    #[tokio::test]
    async fn dropped_answer_round_trip_leaves_session_idle() {
        let oracle = Arc::new(StubOracle {
            hang_on_call: Some(2),
            ..Default::default()
        });
        let (mut session, _store) = started(oracle.clone()).await;
        assert_eq!(session.current_question().unwrap().id, "q1");

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            session.answer_question(AnswerValue::Text("PM".into())),
        )
        .await;
        assert!(outcome.is_err());

        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.current_question().is_none());
        assert_eq!(session.data().answers.len(), 1);
        assert_eq!(session.data().coverage.score(Dimension::Role), 25.0);

        // The answered question cannot be answered twice
        assert!(!session.answer_question(AnswerValue::Text("PM".into())).await);
        assert_eq!(session.data().answers.len(), 1);

        // A fresh fetch recovers the flow
        session.fetch_next_question().await;
        assert_eq!(session.current_question().unwrap().id, "q2");
        assert!(session.answer_question(AnswerValue::Text("Jira".into())).await);
        assert_eq!(session.data().answers.len(), 2);
        assert_eq!(session.data().coverage.score(Dimension::Role), 50.0);
        assert_eq!(oracle.calls(), 4);
    }

    #[tokio::test]
    async fn status_is_retrieving_during_oracle_call() {
        let oracle = StubOracle::scripted(vec![]);
        let store = Arc::new(MemorySnapshotStore::new());
        let mut session = session_with(oracle.clone(), store);
        *oracle.status_rx.lock().unwrap() = Some(session.watch_status());

        session.initialize().await;
        assert_eq!(*oracle.seen_status.lock().unwrap(), vec![SessionStatus::Retrieving]);
        assert_eq!(*session.watch_status().borrow(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn oracle_update_merges_before_question_and_never_lowers_scores() {
        let mut first = response("team", &[Dimension::Role]);
        first.coverage_update = CoverageUpdate::from([
            (
                Dimension::Role,
                CoveragePatch {
                    weight: Some(0.8),
                    score: Some(10.0),
                    unknowns: Some(vec!["direct_reports".into()]),
                },
            ),
            (Dimension::Tools, CoveragePatch::score(40.0)),
        ]);
        first.tracks = vec![track("pm-essentials")];

        let data = data_with({
            let mut c = Coverage::initial();
            if let Some(role) = c.get_mut(Dimension::Role) {
                role.score = 60.0;
            }
            c
        });
        let session = resumed(StubOracle::scripted(vec![Ok(first)]), data).await;

        let coverage = &session.data().coverage;
        assert_eq!(coverage.score(Dimension::Role), 60.0);
        assert_eq!(
            coverage.get(Dimension::Role).unwrap().unknowns,
            vec!["direct_reports"]
        );
        assert_eq!(coverage.score(Dimension::Tools), 40.0);
        assert_eq!(session.data().tracks, vec![track("pm-essentials")]);
        assert_eq!(session.data().progress_percent, calculate_progress(coverage));
        assert_eq!(session.current_question().unwrap().id, "team");
    }

    #[tokio::test]
    async fn completion_threshold_is_inclusive() {
        let below = data_with(coverage_of(&[(Dimension::Role, 1.0, 79.0, &[])]));
        let session = resumed(StubOracle::scripted(vec![]), below).await;
        assert!(!session.is_complete());

        let at = data_with(coverage_of(&[(Dimension::Role, 1.0, 80.0, &[])]));
        let session = resumed(StubOracle::scripted(vec![]), at).await;
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn completion_event_fires_once() {
        let data = data_with(coverage_of(&[(Dimension::Role, 1.0, 60.0, &[])]));
        let oracle = StubOracle::scripted(vec![]);
        let store = Arc::new(MemorySnapshotStore::with_snapshot(data));
        let mut session = session_with(oracle, store);
        let mut rx = session.events().subscribe();
        session.resume().await;

        session.answer_question(AnswerValue::Text("a".into())).await;
        assert!(session.is_complete());
        session.answer_question(AnswerValue::Text("b".into())).await;

        let completions = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::CompletionReached { .. }))
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn undo_rederives_completion() {
        let data = data_with(coverage_of(&[(Dimension::Role, 1.0, 70.0, &[])]));
        let mut session = resumed(StubOracle::scripted(vec![]), data).await;

        session.answer_question(AnswerValue::Text("a".into())).await;
        assert!(session.is_complete());
        session.undo();
        assert!(!session.is_complete());
    }

    #[tokio::test]
    async fn milestone_recorded_on_first_crossing() {
        let (mut session, _store) = started(StubOracle::scripted(vec![])).await;

        session.answer_question(AnswerValue::Text("a".into())).await;
        assert!(session.milestones().is_empty());

        session.answer_question(AnswerValue::Text("b".into())).await;
        assert_eq!(session.milestones().len(), 1);
        let milestone = &session.milestones()[0];
        assert_eq!(milestone.dimension, Dimension::Role);
        assert_eq!(milestone.score, 50.0);
        assert_eq!(milestone.step, 2);

        session.answer_question(AnswerValue::Text("c".into())).await;
        assert_eq!(session.milestones().len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_everything_without_fetching() {
        let oracle = StubOracle::scripted(vec![]);
        let (mut session, store) = started(oracle.clone()).await;
        session.answer_question(AnswerValue::Text("PM".into())).await;
        session.flush().await;
        assert!(store.load().await.unwrap().is_some());
        let calls = oracle.calls();

        session.reset().await;
        assert_eq!(oracle.calls(), calls);
        assert!(session.current_question().is_none());
        assert_eq!(session.data(), &OnboardingData::default());
        assert_eq!(session.current_step(), 0);
        assert_eq!(session.history_len(), 1);
        assert!(session.milestones().is_empty());
        assert!(!session.is_complete());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_without_snapshot_initializes() {
        let oracle = StubOracle::scripted(vec![]);
        let store = Arc::new(MemorySnapshotStore::new());
        let mut session = session_with(oracle.clone(), store);

        assert!(!session.resume().await);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(session.current_step(), 0);
        assert!(session.current_question().is_some());
    }

    #[tokio::test]
    async fn resume_restores_answers_and_step() {
        let mut data = OnboardingData::default();
        data.answers.push(Answer::new("q1", AnswerValue::Text("PM".into())));
        data.answers.push(Answer::new("q2", AnswerValue::Number(4.0)));
        if let Some(role) = data.coverage.get_mut(Dimension::Role) {
            role.score = 50.0;
        }
        // Stale stored progress is recomputed
        data.progress_percent = 99;

        let session = resumed(StubOracle::scripted(vec![]), data).await;
        assert_eq!(session.current_step(), 2);
        assert_eq!(session.history_len(), 1);
        assert_eq!(
            session.data().progress_percent,
            calculate_progress(&session.data().coverage)
        );
        assert_eq!(session.current_question().unwrap().id, "q3");
    }

    #[tokio::test]
    async fn answers_are_persisted_after_debounce() {
        let (mut session, store) = started(StubOracle::scripted(vec![])).await;
        session.answer_question(AnswerValue::Text("PM".into())).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.load().await.unwrap().as_ref(), Some(session.data()));
    }

    #[tokio::test]
    async fn progress_summary_points_at_heaviest_open_dimension() {
        let (session, _store) = started(StubOracle::scripted(vec![])).await;
        let summary = session.progress_summary();
        assert_eq!(summary.total_steps, 8);
        assert_eq!(summary.current_step, 0);
        assert_eq!(summary.next_milestone, Some(Dimension::Responsibilities));

        let data = data_with(coverage_of(&[
            (Dimension::Role, 0.8, 100.0, &[]),
            (Dimension::Tools, 0.6, 69.0, &[]),
        ]));
        let session = resumed(StubOracle::scripted(vec![]), data).await;
        assert_eq!(session.progress_summary().next_milestone, Some(Dimension::Tools));

        let done = data_with(coverage_of(&[(Dimension::Role, 0.8, 70.0, &[])]));
        let session = resumed(StubOracle::scripted(vec![]), done).await;
        assert_eq!(session.progress_summary().next_milestone, None);
    }

    #[tokio::test]
    async fn track_accept_and_swap() {
        let mut first = response("q1", &[Dimension::Role]);
        first.tracks = vec![track("pm-essentials")];
        let (session, _store) = started(StubOracle::scripted(vec![Ok(first)])).await;
        let mut rx = session.events().subscribe();

        assert_eq!(session.accept_track("pm-essentials"), Some(track("pm-essentials")));
        assert!(session.accept_track("unknown").is_none());
        assert!(session.swap_track("pm-essentials"));
        assert!(!session.swap_track("unknown"));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                SessionEvent::TrackAccepted {
                    track_id: "pm-essentials".into()
                },
                SessionEvent::TrackSwapRequested {
                    track_id: "pm-essentials".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn answer_emits_step_events_in_order() {
        let (mut session, _store) = started(StubOracle::scripted(vec![])).await;
        let mut rx = session.events().subscribe();
        session.answer_question(AnswerValue::Text("PM".into())).await;

        let names: Vec<&str> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "answer.captured",
                "coverage.updated",
                "progress.step_completed",
                "tracks.updated",
                "question.asked",
            ]
        );
    }
}
