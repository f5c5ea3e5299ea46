//! Question oracle gateway.
//!
//! Turns session state into exactly one LLM call and always hands back a
//! schema-valid question: either recovered oracle output or a deterministic
//! fallback. Transport failures are reported as `OracleError`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::OracleConfig;
use crate::error::{LlmError, OracleError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

use super::coverage::CoverageUpdate;
use super::fallback::fallback_question;
use super::model::{Answer, Coverage, Profile, Question, Track};
use super::prompts::{build_context_summary, oracle_system_prompt, oracle_user_prompt};
use super::repair::{RecoveryStage, recover_response};

/// Where an accepted response came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseSource {
    Oracle(RecoveryStage),
    #[default]
    Fallback,
}

impl ResponseSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback)
    }
}

/// A validated next-question payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleResponse {
    pub question: Question,
    pub coverage_update: CoverageUpdate,
    pub tracks: Vec<Track>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip)]
    pub source: ResponseSource,
}

/// Source of next questions.
#[async_trait]
pub trait QuestionOracle: Send + Sync {
    /// Produce the next question for the given session state.
    ///
    /// Only transport-level failures and invalid input are errors; any
    /// unusable output degrades to a fallback question.
    async fn request_next_question(
        &self,
        profile: &Profile,
        coverage: &Coverage,
        answers: &[Answer],
    ) -> Result<OracleResponse, OracleError>;
}

/// Gateway backed by a chat completion provider.
pub struct LlmQuestionOracle {
    llm: Arc<dyn LlmProvider>,
    config: OracleConfig,
}

impl LlmQuestionOracle {
    pub fn new(llm: Arc<dyn LlmProvider>, config: OracleConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl QuestionOracle for LlmQuestionOracle {
    async fn request_next_question(
        &self,
        _profile: &Profile,
        coverage: &Coverage,
        answers: &[Answer],
    ) -> Result<OracleResponse, OracleError> {
        if coverage.is_empty() {
            return Err(OracleError::InvalidInput("coverage is empty".to_string()));
        }

        let summary = build_context_summary(coverage, answers);
        debug!(
            step = summary.current_step,
            progress = summary.progress_percent,
            answers = answers.len(),
            "Requesting next question"
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(oracle_system_prompt()),
            ChatMessage::user(oracle_user_prompt(coverage, &summary)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let result = tokio::time::timeout(self.config.timeout, self.llm.complete(request)).await;

        let content = match result {
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "Oracle call timed out");
                return Err(LlmError::Timeout {
                    provider: self.llm.model_name().to_string(),
                    timeout: self.config.timeout,
                }
                .into());
            }
            Ok(Err(LlmError::InvalidResponse { reason, .. })) => {
                warn!(reason = %reason, "Oracle returned no usable content, using fallback");
                return Ok(fallback_question(answers.len()));
            }
            Ok(Err(e)) => {
                let err = OracleError::from(e);
                warn!(kind = err.kind(), error = %err, "Oracle call failed");
                return Err(err);
            }
            Ok(Ok(response)) => response.content,
        };

        if content.trim().is_empty() {
            warn!("Oracle returned empty content, using fallback");
            return Ok(fallback_question(answers.len()));
        }

        match recover_response(&content) {
            Ok(response) => {
                info!(
                    question_id = %response.question.id,
                    source = ?response.source,
                    "Oracle question accepted"
                );
                Ok(response)
            }
            Err(failure) => {
                warn!(
                    error = %failure,
                    preview = %content.chars().take(200).collect::<String>(),
                    "Oracle output unrecoverable, using fallback"
                );
                Ok(fallback_question(answers.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::llm::{CompletionResponse, FinishReason};
    use crate::onboarding::model::Dimension;

    enum Reply {
        Text(String),
        Fail(fn() -> LlmError),
        Hang,
    }

    struct MockOracleLlm {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl MockOracleLlm {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockOracleLlm {
        fn model_name(&self) -> &str {
            "mock-oracle"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.temperature, Some(0.3));
            assert_eq!(request.max_tokens, Some(1500));
            match &self.reply {
                Reply::Text(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 100,
                    output_tokens: 50,
                    finish_reason: FinishReason::Stop,
                    response_id: None,
                }),
                Reply::Fail(make) => Err(make()),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!("timeout should fire first")
                }
            }
        }
    }

    fn oracle(llm: Arc<MockOracleLlm>) -> LlmQuestionOracle {
        let mut config = OracleConfig::new(secrecy::SecretString::from("test"));
        config.timeout = Duration::from_millis(100);
        LlmQuestionOracle::new(llm, config)
    }

    const GOOD: &str = r#"```json
{
  "question": {
    "id": "pain_points_1",
    "prompt": "What slows you down most each week?",
    "ui": {"kind": "checkbox_list", "options": ["Too many meetings", "Manual reporting"]},
    "targets": ["pain_points"],
  },
  "coverageUpdate": {"role": {"score": 60}},
  "tracks": [],
  "rationale": "Role is known.",
}
```"#;

    #[tokio::test]
    async fn accepts_recoverable_output() {
        let llm = MockOracleLlm::new(Reply::Text(GOOD.to_string()));
        let response = oracle(llm.clone())
            .request_next_question(&Profile::new(), &Coverage::initial(), &[])
            .await
            .unwrap();

        assert_eq!(response.question.id, "pain_points_1");
        assert_eq!(response.question.targets, vec![Dimension::PainPoints]);
        assert!(!response.source.is_fallback());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unrecoverable_output_falls_back_by_answer_count() {
        let llm = MockOracleLlm::new(Reply::Text("Sorry, I cannot do that.".to_string()));
        let gateway = oracle(llm.clone());

        let first = gateway
            .request_next_question(&Profile::new(), &Coverage::initial(), &[])
            .await
            .unwrap();
        assert_eq!(first.question.id, "role_fallback");
        assert!(first.source.is_fallback());

        let answers: Vec<Answer> = (0..5)
            .map(|i| Answer::new(format!("q{i}"), crate::onboarding::model::AnswerValue::Text("x".into())))
            .collect();
        let later = gateway
            .request_next_question(&Profile::new(), &Coverage::initial(), &answers)
            .await
            .unwrap();
        assert_eq!(later.question.id, "tools_fallback");

        // Exactly one outbound call per invocation, no retries.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_content_falls_back() {
        let llm = MockOracleLlm::new(Reply::Fail(|| LlmError::InvalidResponse {
            provider: "mock".into(),
            reason: "empty content".into(),
        }));
        let response = oracle(llm)
            .request_next_question(&Profile::new(), &Coverage::initial(), &[])
            .await
            .unwrap();
        assert_eq!(response.question.id, "role_fallback");
    }

    #[tokio::test]
    async fn transport_failures_are_structured_errors() {
        let cases: [(fn() -> LlmError, &str); 4] = [
            (|| LlmError::AuthFailed { provider: "mock".into() }, "auth_failure"),
            (
                || LlmError::RateLimited {
                    provider: "mock".into(),
                    retry_after: None,
                },
                "rate_limited",
            ),
            (
                || LlmError::BadRequest {
                    provider: "mock".into(),
                    reason: "bad model".into(),
                },
                "bad_request",
            ),
            (
                || LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection reset".into(),
                },
                "unknown_transport_error",
            ),
        ];

        for (make, kind) in cases {
            let err = oracle(MockOracleLlm::new(Reply::Fail(make)))
                .request_next_question(&Profile::new(), &Coverage::initial(), &[])
                .await
                .unwrap_err();
            assert_eq!(err.kind(), kind);
        }
    }

    #[tokio::test]
    async fn timeout_is_transport_error() {
        let err = oracle(MockOracleLlm::new(Reply::Hang))
            .request_next_question(&Profile::new(), &Coverage::initial(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Transport(_)));
    }

    #[tokio::test]
    async fn empty_coverage_is_rejected_before_any_call() {
        let llm = MockOracleLlm::new(Reply::Text(GOOD.to_string()));
        let err = oracle(llm.clone())
            .request_next_question(&Profile::new(), &Coverage::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidInput(_)));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }
}
