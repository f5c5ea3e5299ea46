//! Prompt construction for the question oracle.

use super::coverage::{calculate_progress, dimensions_by_score};
use super::model::{Answer, Coverage, Dimension};

/// How many recent answers are echoed back as conversation context.
const RECENT_ANSWERS: usize = 3;

/// Derived session context sent alongside the full coverage breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSummary {
    /// 1-based index of the step being asked.
    pub current_step: usize,
    pub total_answers: usize,
    pub progress_percent: u8,
    pub strongest: Vec<Dimension>,
    pub weakest: Vec<Dimension>,
    /// `"Q1: <value>; Q2: <value>"`, or `"No previous answers"`.
    pub answer_summary: String,
    /// The last few answers, oldest first, as `"<question id>: <value>"`.
    pub recent_answers: Vec<String>,
}

/// Build the context summary for one oracle call.
pub fn build_context_summary(coverage: &Coverage, answers: &[Answer]) -> ContextSummary {
    let answer_summary = if answers.is_empty() {
        "No previous answers".to_string()
    } else {
        answers
            .iter()
            .enumerate()
            .map(|(i, a)| format!("Q{}: {}", i + 1, a.value))
            .collect::<Vec<_>>()
            .join("; ")
    };

    let recent_answers = answers
        .iter()
        .skip(answers.len().saturating_sub(RECENT_ANSWERS))
        .map(|a| format!("{}: {}", a.question_id, a.value))
        .collect();

    ContextSummary {
        current_step: answers.len() + 1,
        total_answers: answers.len(),
        progress_percent: calculate_progress(coverage),
        strongest: dimensions_by_score(coverage, true, 3),
        weakest: dimensions_by_score(coverage, false, 3),
        answer_summary,
        recent_answers,
    }
}

fn join_dimensions(dims: &[Dimension]) -> String {
    dims.iter()
        .map(Dimension::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// System prompt for question generation.
pub fn oracle_system_prompt() -> &'static str {
    "\
You are an onboarding assistant. Your goal is to create a personalized, progress-oriented \
experience that efficiently maps the user's work profile.

CORE PRINCIPLES:
- Ask ONE focused question at a time that maximizes information gain
- Follow a logical progression: Role → Responsibilities → Workflows → Tools → Pain Points → Goals
- Use the most appropriate UI component for each question type
- Build context from previous answers to ask smarter follow-up questions
- Prioritize high-impact dimensions that unlock the most value

QUESTION PROGRESSION:
1. Start with open-ended text about role and seniority (e.g. \"VP of Engineering at Meta\")
2. Follow up with context-driven questions (team size, reporting structure, workflows)
3. Then tools, pain points, metrics, compliance, collaboration, and AI readiness

UI COMPONENTS:
- short_text: role/seniority and other free-form context
- chips: follow-up context like team structure or company size (4-8 options)
- checkbox_list: workflows, tools, pain points, processes (exactly 12 options, a 3x4 grid)
- range: satisfaction, frequency, confidence ratings (1-10 scale)
- toggle_pair: only for clear binary choices

COVERAGE:
- Focus on dimensions with the highest weight and lowest current score
- Each question targets 1-3 dimensions
- Update coverage scores based on information quality and completeness
- Maintain the unknowns list to track what still needs exploration

Available dimensions: role, responsibilities, workflows, tools, inputs_outputs, pain_points, \
metrics_kpis, compliance, collaboration, ai_readiness"
}

/// User prompt carrying the session state and the response contract.
pub fn oracle_user_prompt(coverage: &Coverage, summary: &ContextSummary) -> String {
    let coverage_json =
        serde_json::to_string_pretty(coverage).unwrap_or_else(|_| "{}".to_string());
    let recent = if summary.recent_answers.is_empty() {
        "none".to_string()
    } else {
        summary.recent_answers.join(" | ")
    };

    format!(
        "\
CURRENT SESSION STATE:
- Step: {step} (user has answered {answered} questions)
- Overall Progress: {progress}%
- Previous answers: {answers}
- Most recent answers: {recent}

COVERAGE ANALYSIS:
- Strongest areas: {strongest}
- Needs attention: {weakest}
- Full coverage breakdown: {coverage_json}

Generate the next question. Reference previous answers for continuity, target \
high-impact low-coverage dimensions, and keep the whole onboarding under 10 questions.

Respond with ONLY valid JSON. No markdown, no explanations, no code blocks.

Use this exact format:
{{
  \"question\": {{
    \"id\": \"string (unique, descriptive)\",
    \"prompt\": \"string (conversational, at most 140 chars)\",
    \"context\": \"string (why this matters)\",
    \"ui\": {{
      \"kind\": \"chips|checkbox_list|toggle_pair|range|short_text\",
      \"options\": [\"array, 12 for checkbox_list, 4-8 for chips\"],
      \"min\": 1, \"max\": 10,
      \"placeholder\": \"string, for short_text\"
    }},
    \"targets\": [\"dimension_names\"]
  }},
  \"coverageUpdate\": {{
    \"dimension_name\": {{ \"weight\": 0.0, \"score\": 0, \"unknowns\": [\"strings\"] }}
  }},
  \"tracks\": [{{
    \"id\": \"string\",
    \"title\": \"string\",
    \"level\": \"Intro|Applied|Security|Manager\",
    \"modules\": [\"strings\"],
    \"rationale\": \"string\",
    \"etaHours\": 0
  }}],
  \"rationale\": \"string (2-3 sentences: why this question now)\"
}}",
        step = summary.current_step,
        answered = summary.total_answers,
        progress = summary.progress_percent,
        answers = summary.answer_summary,
        strongest = join_dimensions(&summary.strongest),
        weakest = join_dimensions(&summary.weakest),
    )
}
