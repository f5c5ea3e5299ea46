//! Onboarding data model: dimensions, coverage, questions, answers, tracks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the ten knowledge areas tracked about the user's work profile.
///
/// Variant order is the canonical order; it is used wherever a stable
/// tie-break between dimensions is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Role,
    Responsibilities,
    Workflows,
    Tools,
    InputsOutputs,
    PainPoints,
    MetricsKpis,
    Compliance,
    Collaboration,
    AiReadiness,
}

impl Dimension {
    /// Every dimension, in canonical order.
    pub const ALL: [Dimension; 10] = [
        Self::Role,
        Self::Responsibilities,
        Self::Workflows,
        Self::Tools,
        Self::InputsOutputs,
        Self::PainPoints,
        Self::MetricsKpis,
        Self::Compliance,
        Self::Collaboration,
        Self::AiReadiness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Responsibilities => "responsibilities",
            Self::Workflows => "workflows",
            Self::Tools => "tools",
            Self::InputsOutputs => "inputs_outputs",
            Self::PainPoints => "pain_points",
            Self::MetricsKpis => "metrics_kpis",
            Self::Compliance => "compliance",
            Self::Collaboration => "collaboration",
            Self::AiReadiness => "ai_readiness",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|d| d.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown dimension: {s}"))
    }
}

/// How well a single dimension is understood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageEntry {
    /// Importance, 0.0-1.0.
    pub weight: f64,
    /// Coverage score, 0-100.
    pub score: f64,
    /// What we still need to learn, in ask order.
    #[serde(default)]
    pub unknowns: Vec<String>,
}

impl CoverageEntry {
    pub fn new(weight: f64, score: f64, unknowns: &[&str]) -> Self {
        Self {
            weight,
            score,
            unknowns: unknowns.iter().map(|u| u.to_string()).collect(),
        }
    }
}

/// Per-dimension coverage mapping.
///
/// Iteration follows canonical dimension order, which matches the order the
/// initial coverage is built in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coverage(BTreeMap<Dimension, CoverageEntry>);

impl Coverage {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The starting coverage for a fresh session: every dimension at score 0.
    pub fn initial() -> Self {
        use Dimension::*;
        [
            (Role, CoverageEntry::new(0.8, 0.0, &["title", "seniority"])),
            (
                Responsibilities,
                CoverageEntry::new(1.0, 0.0, &["daily_tasks", "ownership"]),
            ),
            (Workflows, CoverageEntry::new(1.0, 0.0, &["processes", "cadence"])),
            (
                Tools,
                CoverageEntry::new(0.6, 0.0, &["primary_stack", "integrations"]),
            ),
            (
                InputsOutputs,
                CoverageEntry::new(0.7, 0.0, &["data_sources", "deliverables"]),
            ),
            (
                PainPoints,
                CoverageEntry::new(0.7, 0.0, &["bottlenecks", "frustrations"]),
            ),
            (
                MetricsKpis,
                CoverageEntry::new(0.8, 0.0, &["success_metrics", "targets"]),
            ),
            (
                Compliance,
                CoverageEntry::new(0.9, 0.0, &["regulations", "policies"]),
            ),
            (
                Collaboration,
                CoverageEntry::new(0.6, 0.0, &["handoffs", "stakeholders"]),
            ),
            (
                AiReadiness,
                CoverageEntry::new(0.6, 0.0, &["current_usage", "policies"]),
            ),
        ]
        .into_iter()
        .collect()
    }

    pub fn get(&self, dimension: Dimension) -> Option<&CoverageEntry> {
        self.0.get(&dimension)
    }

    pub fn get_mut(&mut self, dimension: Dimension) -> Option<&mut CoverageEntry> {
        self.0.get_mut(&dimension)
    }

    pub fn insert(&mut self, dimension: Dimension, entry: CoverageEntry) {
        self.0.insert(dimension, entry);
    }

    pub fn contains(&self, dimension: Dimension) -> bool {
        self.0.contains_key(&dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &CoverageEntry)> {
        self.0.iter().map(|(d, e)| (*d, e))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Score for a dimension, 0 when the dimension is not tracked.
    pub fn score(&self, dimension: Dimension) -> f64 {
        self.get(dimension).map(|e| e.score).unwrap_or(0.0)
    }
}

impl FromIterator<(Dimension, CoverageEntry)> for Coverage {
    fn from_iter<I: IntoIterator<Item = (Dimension, CoverageEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The closed set of answer widgets a question can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiKind {
    Chips,
    CheckboxList,
    TogglePair,
    Range,
    ShortText,
}

impl std::fmt::Display for UiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Chips => "chips",
            Self::CheckboxList => "checkbox_list",
            Self::TogglePair => "toggle_pair",
            Self::Range => "range",
            Self::ShortText => "short_text",
        };
        f.write_str(s)
    }
}

fn default_range_min() -> f64 {
    1.0
}

fn default_range_max() -> f64 {
    10.0
}

/// Widget description for a question. Each kind carries only its own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiSpec {
    Chips {
        #[serde(default)]
        options: Vec<String>,
    },
    /// Oracle prompts ask for exactly 12 options (a 3x4 grid); not enforced.
    CheckboxList {
        #[serde(default)]
        options: Vec<String>,
    },
    TogglePair {
        #[serde(default)]
        options: Vec<String>,
    },
    Range {
        #[serde(default = "default_range_min")]
        min: f64,
        #[serde(default = "default_range_max")]
        max: f64,
    },
    ShortText {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
    },
}

impl UiSpec {
    pub fn kind(&self) -> UiKind {
        match self {
            Self::Chips { .. } => UiKind::Chips,
            Self::CheckboxList { .. } => UiKind::CheckboxList,
            Self::TogglePair { .. } => UiKind::TogglePair,
            Self::Range { .. } => UiKind::Range,
            Self::ShortText { .. } => UiKind::ShortText,
        }
    }

    fn options(options: &[&str]) -> Vec<String> {
        options.iter().map(|o| o.to_string()).collect()
    }

    pub fn chips(options: &[&str]) -> Self {
        Self::Chips {
            options: Self::options(options),
        }
    }

    pub fn checkbox_list(options: &[&str]) -> Self {
        Self::CheckboxList {
            options: Self::options(options),
        }
    }

    pub fn short_text(placeholder: &str) -> Self {
        Self::ShortText {
            placeholder: Some(placeholder.to_string()),
        }
    }
}

/// Longest prompt a question may carry, in characters.
pub const MAX_PROMPT_CHARS: usize = 140;

/// A single question shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub ui: UiSpec,
    /// Dimensions whose coverage this question's answer raises. Never empty.
    pub targets: Vec<Dimension>,
}

/// An answer value. Every widget kind produces exactly one of these shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(Vec<String>),
    Number(f64),
}

impl AnswerValue {
    /// Short type label used in telemetry.
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Choices(_) => "choices",
            Self::Number(_) => "number",
        }
    }
}

impl std::fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Choices(items) => f.write_str(&items.join(",")),
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A recorded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub value: AnswerValue,
    pub captured_at: DateTime<Utc>,
}

impl Answer {
    pub fn new(question_id: impl Into<String>, value: AnswerValue) -> Self {
        Self {
            question_id: question_id.into(),
            value,
            captured_at: Utc::now(),
        }
    }
}

/// Learning track level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackLevel {
    Intro,
    Applied,
    Security,
    Manager,
}

/// A recommended learning track. Always oracle-supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub level: TrackLevel,
    pub modules: Vec<String>,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_hours: Option<f64>,
}

/// Free-form profile attributes.
pub type Profile = serde_json::Map<String, serde_json::Value>;

/// The aggregate owned by the onboarding session. This is also the
/// persisted snapshot shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingData {
    #[serde(default)]
    pub profile: Profile,
    pub coverage: Coverage,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// Derived from `coverage`; recomputed on every update.
    #[serde(default)]
    pub progress_percent: u8,
}

impl Default for OnboardingData {
    fn default() -> Self {
        Self {
            profile: Profile::new(),
            coverage: Coverage::initial(),
            answers: Vec::new(),
            tracks: Vec::new(),
            progress_percent: 0,
        }
    }
}

/// Grouping for the quick-pick rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickPickCategory {
    Workflows,
    Tools,
    Compliance,
}

/// A predefined shortcut answer that bypasses the oracle for one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickPick {
    pub id: &'static str,
    pub label: &'static str,
    pub category: QuickPickCategory,
    pub targets: &'static [Dimension],
    pub value: &'static str,
}

impl QuickPick {
    /// Synthetic question id recorded with the answer.
    pub fn question_id(&self) -> String {
        format!("quickpick-{}", self.id)
    }
}

macro_rules! quick_pick {
    ($id:literal, $label:literal, $category:ident, [$($target:ident),+], $value:literal) => {
        QuickPick {
            id: $id,
            label: $label,
            category: QuickPickCategory::$category,
            targets: &[$(Dimension::$target),+],
            value: $value,
        }
    };
}

/// Static quick-pick catalog.
pub static QUICK_PICKS: &[QuickPick] = &[
    quick_pick!("sprint-planning", "Sprint planning", Workflows, [Workflows], "Sprint planning"),
    quick_pick!("bug-triage", "Bug triage", Workflows, [Workflows], "Bug triage"),
    quick_pick!(
        "stakeholder-report",
        "Stakeholder report",
        Workflows,
        [Workflows, Collaboration],
        "Stakeholder reporting"
    ),
    quick_pick!(
        "weekly-kpi",
        "Weekly KPI roll-up",
        Workflows,
        [Workflows, MetricsKpis],
        "Weekly KPI roll-up"
    ),
    quick_pick!("linear", "Linear", Tools, [Tools], "Linear"),
    quick_pick!("jira", "Jira", Tools, [Tools], "Jira"),
    quick_pick!("notion", "Notion", Tools, [Tools], "Notion"),
    quick_pick!("salesforce", "Salesforce", Tools, [Tools], "Salesforce"),
    quick_pick!("slack", "Slack", Tools, [Tools, Collaboration], "Slack"),
    quick_pick!("soc2", "SOC2", Compliance, [Compliance], "SOC2"),
    quick_pick!("hipaa", "HIPAA", Compliance, [Compliance], "HIPAA"),
    quick_pick!("gdpr", "GDPR", Compliance, [Compliance], "GDPR"),
    quick_pick!("none-compliance", "None/Unsure", Compliance, [Compliance], "None/Unsure"),
];

/// Look up a quick pick by id.
pub fn find_quick_pick(id: &str) -> Option<&'static QuickPick> {
    QUICK_PICKS.iter().find(|p| p.id == id)
}
