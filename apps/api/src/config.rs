use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Postgres workflow store; in-memory when absent.
    pub database_url: Option<String>,
    /// Redis pub/sub notification fan-out; in-app inbox only when absent.
    pub redis_url: Option<String>,
    /// Archive of approved CVs; in-memory when absent.
    pub s3: Option<S3Settings>,
    pub discovery_sources_path: Option<PathBuf>,
    pub workflow: WorkflowSettings,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Knobs of the workflow orchestrator, passed in at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    /// Fraction of 100: 0.85 auto-approves CVs scoring 85 or more.
    pub ats_score_threshold: f64,
    /// Minimum knowledge-store confidence for the form filler to use an answer.
    pub confidence_threshold: f64,
    /// Jobs picked by autonomous selection.
    pub auto_select_limit: usize,
    /// Ceiling on driver-loop iterations per `run_workflow` call.
    pub max_iterations: usize,
    pub collaborator_timeout: Duration,
    /// How long a form question waits for the user before it is considered stale.
    pub user_response_timeout: Duration,
    pub cv_max_attempts: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            ats_score_threshold: 0.85,
            confidence_threshold: 0.80,
            auto_select_limit: 10,
            max_iterations: 100,
            collaborator_timeout: Duration::from_secs(120),
            user_response_timeout: Duration::from_secs(48 * 3600),
            cv_max_attempts: 3,
        }
    }
}

impl WorkflowSettings {
    /// Reads `WORKFLOW_*` variables through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            ats_score_threshold: parse_or(
                &lookup,
                "WORKFLOW_ATS_SCORE_THRESHOLD",
                defaults.ats_score_threshold,
            )?,
            confidence_threshold: parse_or(
                &lookup,
                "WORKFLOW_CONFIDENCE_THRESHOLD",
                defaults.confidence_threshold,
            )?,
            auto_select_limit: parse_or(&lookup, "WORKFLOW_AUTO_SELECT_LIMIT", defaults.auto_select_limit)?,
            max_iterations: parse_or(&lookup, "WORKFLOW_MAX_ITERATIONS", defaults.max_iterations)?,
            collaborator_timeout: Duration::from_secs(parse_or(
                &lookup,
                "WORKFLOW_COLLABORATOR_TIMEOUT_SECS",
                defaults.collaborator_timeout.as_secs(),
            )?),
            user_response_timeout: Duration::from_secs(
                3600 * parse_or(
                    &lookup,
                    "WORKFLOW_USER_RESPONSE_TIMEOUT_HOURS",
                    defaults.user_response_timeout.as_secs() / 3600,
                )?,
            ),
            cv_max_attempts: parse_or(&lookup, "WORKFLOW_CV_MAX_ATTEMPTS", defaults.cv_max_attempts)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("WORKFLOW_ATS_SCORE_THRESHOLD", self.ats_score_threshold),
            ("WORKFLOW_CONFIDENCE_THRESHOLD", self.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{key} must be between 0 and 1, got {value}");
            }
        }
        if self.auto_select_limit == 0 {
            bail!("WORKFLOW_AUTO_SELECT_LIMIT must be at least 1");
        }
        if self.max_iterations == 0 {
            bail!("WORKFLOW_MAX_ITERATIONS must be at least 1");
        }
        if self.collaborator_timeout.is_zero() {
            bail!("WORKFLOW_COLLABORATOR_TIMEOUT_SECS must be at least 1");
        }
        if self.cv_max_attempts == 0 {
            bail!("WORKFLOW_CV_MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let s3 = match optional_env("S3_BUCKET") {
            Some(bucket) => Some(S3Settings {
                bucket,
                endpoint: require_env("S3_ENDPOINT")?,
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: optional_env("DATABASE_URL"),
            redis_url: optional_env("REDIS_URL"),
            s3,
            discovery_sources_path: optional_env("DISCOVERY_SOURCES_PATH").map(PathBuf::from),
            workflow: WorkflowSettings::from_lookup(optional_env)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank are the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let settings = WorkflowSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, WorkflowSettings::default());
        assert_eq!(settings.user_response_timeout, Duration::from_secs(172_800));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let settings = WorkflowSettings::from_lookup(lookup(&[
            ("WORKFLOW_ATS_SCORE_THRESHOLD", "0.9"),
            ("WORKFLOW_AUTO_SELECT_LIMIT", "3"),
            ("WORKFLOW_COLLABORATOR_TIMEOUT_SECS", "15"),
            ("WORKFLOW_USER_RESPONSE_TIMEOUT_HOURS", "2"),
        ]))
        .unwrap();
        assert_eq!(settings.ats_score_threshold, 0.9);
        assert_eq!(settings.auto_select_limit, 3);
        assert_eq!(settings.collaborator_timeout, Duration::from_secs(15));
        assert_eq!(settings.user_response_timeout, Duration::from_secs(7200));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = WorkflowSettings::from_lookup(lookup(&[("WORKFLOW_MAX_ITERATIONS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("WORKFLOW_MAX_ITERATIONS"));

        let err = WorkflowSettings::from_lookup(lookup(&[("WORKFLOW_ATS_SCORE_THRESHOLD", "85")]))
            .unwrap_err();
        assert!(err.to_string().contains("between 0 and 1"));

        assert!(WorkflowSettings::from_lookup(lookup(&[("WORKFLOW_CV_MAX_ATTEMPTS", "0")])).is_err());
    }
}
