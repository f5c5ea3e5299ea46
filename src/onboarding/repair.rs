//! Best-effort recovery of oracle output.
//!
//! The oracle is a free-text model. Its output may wrap JSON in prose or code
//! fences, leave trailing commas, or emit near-JSON. Recovery runs in three
//! escalating stages and stops at the first candidate that both parses and
//! passes schema validation:
//!
//! 1. **Extracted**: strip fences and trailing commas, take the first
//!    top-level `{...}` span.
//! 2. **Repaired**: targeted textual repairs on the extracted candidate
//!    (bare words before numbers, doubled quotes, missing closers).
//! 3. **Aggressive**: keep only first `{` through last `}`, normalize
//!    whitespace, retry.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::coverage::{CoveragePatch, CoverageUpdate};
use super::model::{Dimension, MAX_PROMPT_CHARS, Question, Track, UiKind, UiSpec};
use super::oracle::{OracleResponse, ResponseSource};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?").expect("static pattern"));
static BARE_WORD_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":\s*[A-Za-z]+\s+(-?\d+(?:\.\d+)?)").expect("static pattern")
});
static DOUBLED_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""("[^"]+")""#).expect("static pattern"));
static ESCAPED_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[nr]").expect("static pattern"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Which recovery stage produced an accepted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    Extracted,
    Repaired,
    Aggressive,
}

impl std::fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Extracted => "extracted",
            Self::Repaired => "repaired",
            Self::Aggressive => "aggressive",
        };
        write!(f, "{s}")
    }
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("no JSON object found")]
    NoObject,

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("response shape mismatch: {0}")]
    Shape(String),

    #[error("prompt is {0} characters, limit is {MAX_PROMPT_CHARS}")]
    PromptTooLong(usize),

    #[error("question has no target dimensions")]
    NoTargets,

    #[error("{field} for {dimension} out of range: {value}")]
    OutOfRange {
        dimension: Dimension,
        field: &'static str,
        value: f64,
    },
}

/// Every stage failed; carries the last rejection for logging.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("oracle output unrecoverable: {last}")]
pub struct RecoveryFailure {
    pub last: SchemaViolation,
}

/// Run the recovery pipeline over raw oracle text.
pub fn recover_response(raw: &str) -> Result<OracleResponse, RecoveryFailure> {
    let extracted = extract_candidate(raw);
    let stages: [(RecoveryStage, Option<String>); 3] = [
        (RecoveryStage::Extracted, extracted.clone()),
        (RecoveryStage::Repaired, extracted.as_deref().map(repair_candidate)),
        (RecoveryStage::Aggressive, aggressive_candidate(raw)),
    ];

    let mut last = SchemaViolation::NoObject;
    for (stage, candidate) in stages {
        let Some(candidate) = candidate else {
            continue;
        };
        match parse_and_validate(&candidate) {
            Ok(mut response) => {
                response.source = ResponseSource::Oracle(stage);
                return Ok(response);
            }
            Err(violation) => {
                debug!(stage = %stage, error = %violation, "Recovery stage rejected candidate");
                last = violation;
            }
        }
    }

    Err(RecoveryFailure { last })
}

/// Parse a candidate and validate it against the response schema.
pub fn parse_and_validate(candidate: &str) -> Result<OracleResponse, SchemaViolation> {
    let value: serde_json::Value =
        serde_json::from_str(candidate).map_err(|e| SchemaViolation::Parse(e.to_string()))?;
    validate_response(value)
}

/// Validate a parsed value against the oracle response schema.
pub fn validate_response(value: serde_json::Value) -> Result<OracleResponse, SchemaViolation> {
    let raw: RawResponse =
        serde_json::from_value(value).map_err(|e| SchemaViolation::Shape(e.to_string()))?;

    let prompt_len = raw.question.prompt.chars().count();
    if prompt_len > MAX_PROMPT_CHARS {
        return Err(SchemaViolation::PromptTooLong(prompt_len));
    }
    if raw.question.targets.is_empty() {
        return Err(SchemaViolation::NoTargets);
    }

    for (dimension, patch) in &raw.coverage_update {
        check_range(*dimension, "weight", patch.weight, 1.0)?;
        check_range(*dimension, "score", patch.score, 100.0)?;
    }

    let ui = raw.question.ui.into_spec();
    Ok(OracleResponse {
        question: Question {
            id: raw.question.id,
            prompt: raw.question.prompt,
            context: raw.question.context,
            ui,
            targets: raw.question.targets,
        },
        coverage_update: raw.coverage_update.into_iter().collect::<CoverageUpdate>(),
        tracks: raw.tracks,
        rationale: raw.rationale,
        source: ResponseSource::Fallback,
    })
}

fn check_range(
    dimension: Dimension,
    field: &'static str,
    value: Option<f64>,
    max: f64,
) -> Result<(), SchemaViolation> {
    match value {
        Some(v) if !(0.0..=max).contains(&v) => Err(SchemaViolation::OutOfRange {
            dimension,
            field,
            value: v,
        }),
        _ => Ok(()),
    }
}

// ── Stage 1: extraction ─────────────────────────────────────────────

/// Strip fences and trailing commas, then take the first top-level object.
///
/// When the object never closes, everything from its opening brace onward is
/// returned so the repair stage can try to close it.
fn extract_candidate(raw: &str) -> Option<String> {
    let unfenced = CODE_FENCE.replace_all(raw, "");
    let cleaned = strip_trailing_commas(&unfenced);
    let cleaned = cleaned.trim();

    let start = cleaned.find('{')?;
    let span = match closing_index(&cleaned[start..]) {
        Some(end) => &cleaned[start..=start + end],
        None => &cleaned[start..],
    };
    Some(span.to_string())
}

/// Byte index of the brace closing the object that opens at `text[0]`.
fn closing_index(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop commas that directly precede `}` or `]`, leaving string literals
/// untouched.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => in_string = true,
            ',' => {
                let next = text[i + 1..].trim_start().chars().next();
                if matches!(next, Some('}' | ']')) {
                    continue;
                }
            }
            _ => {}
        }
        out.push(ch);
    }
    out
}

// ── Stage 2: targeted repairs ───────────────────────────────────────

/// Apply repairs for known malformation patterns.
fn repair_candidate(candidate: &str) -> String {
    let fixed = DOUBLED_QUOTES.replace_all(candidate, "$1");
    let fixed = BARE_WORD_NUMBER.replace_all(&fixed, ": $1");
    let mut fixed = fixed.trim_end().to_string();
    fixed.push_str(&missing_closers(&fixed));
    strip_trailing_commas(&fixed)
}

/// Closers needed to balance every `{`/`[` left open outside string literals.
fn missing_closers(text: &str) -> String {
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }

    let mut closers = String::new();
    if in_string {
        closers.push('"');
    }
    closers.extend(open.iter().rev());
    closers
}

// ── Stage 3: aggressive recovery ────────────────────────────────────

/// Keep only the outermost braces and normalize whitespace.
fn aggressive_candidate(raw: &str) -> Option<String> {
    let unfenced = CODE_FENCE.replace_all(raw, "");
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end < start {
        return None;
    }
    let body = &unfenced[start..=end];
    let body = strip_trailing_commas(body);
    let body = ESCAPED_NEWLINE.replace_all(&body, " ");
    let body = WHITESPACE_RUN.replace_all(&body, " ");
    Some(body.trim().to_string())
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    question: RawQuestion,
    coverage_update: BTreeMap<Dimension, CoveragePatch>,
    tracks: Vec<Track>,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: String,
    prompt: String,
    #[serde(default)]
    context: Option<String>,
    ui: RawUi,
    targets: Vec<Dimension>,
}

/// Flat UI description as the oracle emits it; fields irrelevant to the
/// kind are dropped on conversion.
#[derive(Debug, Deserialize)]
struct RawUi {
    kind: UiKind,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    placeholder: Option<String>,
}

impl RawUi {
    fn into_spec(self) -> UiSpec {
        let options = self.options.unwrap_or_default();
        match self.kind {
            UiKind::Chips => UiSpec::Chips { options },
            UiKind::CheckboxList => UiSpec::CheckboxList { options },
            UiKind::TogglePair => UiSpec::TogglePair { options },
            UiKind::Range => UiSpec::Range {
                min: self.min.unwrap_or(1.0),
                max: self.max.unwrap_or(10.0),
            },
            UiKind::ShortText => UiSpec::ShortText {
                placeholder: self.placeholder,
            },
        }
    }
}
