//! Deterministic fallback questions used when the oracle output cannot be
//! recovered.

use super::coverage::{CoveragePatch, CoverageUpdate};
use super::model::{Dimension, Question, UiSpec};
use super::oracle::{OracleResponse, ResponseSource};

/// Number of distinct fallback questions; later indices repeat the last.
pub const FALLBACK_COUNT: usize = 3;

fn patch(weight: f64, score: f64, unknowns: &[&str]) -> CoveragePatch {
    CoveragePatch {
        weight: Some(weight),
        score: Some(score),
        unknowns: Some(unknowns.iter().map(|u| u.to_string()).collect()),
    }
}

fn role_fallback() -> OracleResponse {
    OracleResponse {
        question: Question {
            id: "role_fallback".into(),
            prompt: "Tell us about your role and seniority".into(),
            context: Some(
                "Help us understand your position and level of experience \
                 (e.g., 'VP of Engineering at Meta' or 'Senior Product Manager at a fintech startup')"
                    .into(),
            ),
            ui: UiSpec::short_text("e.g., VP of Engineering at Meta, Senior PM at Stripe..."),
            targets: vec![Dimension::Role],
        },
        coverage_update: CoverageUpdate::from([(
            Dimension::Role,
            patch(0.8, 60.0, &["team_structure", "direct_reports"]),
        )]),
        tracks: Vec::new(),
        rationale: Some(
            "Starting with open-ended role and seniority to capture rich context about \
             their position and experience level."
                .into(),
        ),
        source: ResponseSource::Fallback,
    }
}

fn team_structure_fallback() -> OracleResponse {
    OracleResponse {
        question: Question {
            id: "team_structure_fallback".into(),
            prompt: "Tell us about your team structure and scope".into(),
            context: Some(
                "Understanding your leadership context helps us tailor recommendations to your level"
                    .into(),
            ),
            ui: UiSpec::chips(&[
                "Individual contributor",
                "Team lead (2-5 people)",
                "Manager (5-15 people)",
                "Director (15-50 people)",
                "VP/Head (50+ people)",
                "Cross-functional lead",
                "Consultant/Freelancer",
            ]),
            targets: vec![Dimension::Role, Dimension::Collaboration],
        },
        coverage_update: CoverageUpdate::from([
            (Dimension::Role, patch(0.8, 85.0, &["direct_reports"])),
            (
                Dimension::Collaboration,
                patch(0.6, 30.0, &["meeting_frequency", "reporting_structure"]),
            ),
        ]),
        tracks: Vec::new(),
        rationale: Some(
            "Following up on role with team context to understand scope of responsibility \
             and collaboration needs."
                .into(),
        ),
        source: ResponseSource::Fallback,
    }
}

fn tools_fallback() -> OracleResponse {
    OracleResponse {
        question: Question {
            id: "tools_fallback".into(),
            prompt: "What tools do you use most?".into(),
            context: Some("Knowing your tech stack helps us suggest integrations".into()),
            ui: UiSpec::checkbox_list(&[
                "Slack",
                "Jira",
                "Notion",
                "Google Workspace",
                "Figma",
                "GitHub",
                "Salesforce",
                "Linear",
                "Asana",
                "Microsoft Teams",
                "HubSpot",
                "Zapier",
            ]),
            targets: vec![Dimension::Tools],
        },
        coverage_update: CoverageUpdate::from([(
            Dimension::Tools,
            patch(0.6, 40.0, &["integrations"]),
        )]),
        tracks: Vec::new(),
        rationale: Some(
            "Understanding your current tech stack for integration opportunities.".into(),
        ),
        source: ResponseSource::Fallback,
    }
}

/// Pick the fallback for the given answer count, clamped to the last entry.
pub fn fallback_question(answer_count: usize) -> OracleResponse {
    match answer_count.min(FALLBACK_COUNT - 1) {
        0 => role_fallback(),
        1 => team_structure_fallback(),
        _ => tools_fallback(),
    }
}
