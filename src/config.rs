//! Configuration types.
//!
//! Each config has a `Default` and a `from_env()` constructor. `from_lookup()`
//! takes the variable source as a closure so tests don't touch the process
//! environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Groq's OpenAI-compatible endpoint.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-70b-versatile";

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        _ => Ok(None),
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Onboarding session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Progress percent at which the session counts as complete.
    pub completion_threshold: u8,
    /// Maximum undo snapshots kept.
    pub history_limit: usize,
    /// Score points an answer adds to each target dimension.
    pub answer_increment: f64,
    /// Score points a quick pick adds to each target dimension.
    pub quick_pick_increment: f64,
    /// Score a dimension must reach to record a milestone.
    pub milestone_threshold: f64,
    pub total_estimated_steps: usize,
    /// Dimensions below this score are candidates for the next milestone.
    pub next_milestone_ceiling: f64,
    /// Coalescing window for snapshot writes.
    pub save_debounce: Duration,
    /// Resume the persisted session on start instead of wiping it.
    pub resume_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            completion_threshold: 80,
            history_limit: 10,
            answer_increment: 25.0,
            quick_pick_increment: 20.0,
            milestone_threshold: 50.0,
            total_estimated_steps: 8,
            next_milestone_ceiling: 70.0,
            save_debounce: Duration::from_secs(1),
            resume_on_start: false,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Reads `ONBOARD_COMPLETION_THRESHOLD`, `ONBOARD_SAVE_DEBOUNCE_MS`, and
    /// `ONBOARD_RESUME`. Everything else keeps its default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(threshold) = parse_var::<u8>(&lookup, "ONBOARD_COMPLETION_THRESHOLD")? {
            if threshold > 100 {
                return Err(ConfigError::InvalidValue {
                    key: "ONBOARD_COMPLETION_THRESHOLD".into(),
                    message: format!("{threshold} is above 100"),
                });
            }
            config.completion_threshold = threshold;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ONBOARD_SAVE_DEBOUNCE_MS")? {
            config.save_debounce = Duration::from_millis(ms);
        }
        if let Some(resume) = parse_var::<bool>(&lookup, "ONBOARD_RESUME")? {
            config.resume_on_start = resume;
        }
        Ok(config)
    }
}

/// Question oracle connection settings.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    /// Hard bound on one oracle call.
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl OracleConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
            temperature: 0.3,
            max_tokens: 1500,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// The API key comes from `ONBOARD_API_KEY`, then `GROQ_API_KEY`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("ONBOARD_API_KEY")
            .or_else(|| lookup("GROQ_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("ONBOARD_API_KEY".to_string()))?;

        let mut config = Self::new(SecretString::from(api_key.trim().to_string()));
        if let Some(url) = lookup("ONBOARD_LLM_BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(model) = lookup("ONBOARD_MODEL").or_else(|| lookup("GROQ_MODEL")) {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ONBOARD_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// HTTP server and storage settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/onboarding.db"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(port) = parse_var::<u16>(&lookup, "ONBOARD_PORT")? {
            config.port = port;
        }
        if let Some(path) = lookup("ONBOARD_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.db_path = PathBuf::from(path.trim());
        }
        Ok(config)
    }
}
