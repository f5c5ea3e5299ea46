//! Onboard Assist: adaptive AI onboarding questionnaire.

pub mod config;
pub mod error;
pub mod llm;
pub mod onboarding;
pub mod store;
