// Discovery: finds open postings on public job-board APIs and ranks them
// against the user's search preferences.

pub mod boards;
pub mod matching;

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::{JobRecord, JobSearchPreferences};

pub use boards::BoardDiscovery;

/// Held by the orchestrator as `Arc<dyn DiscoveryService>`.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// Jobs matching `prefs`, highest relevance first. Safe to call repeatedly.
    async fn search(&self, prefs: &JobSearchPreferences) -> Result<Vec<JobRecord>, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ats {
    Greenhouse,
    Lever,
}

impl Ats {
    pub fn as_str(self) -> &'static str {
        match self {
            Ats::Greenhouse => "greenhouse",
            Ats::Lever => "lever",
        }
    }
}

/// One company's public job board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSource {
    pub company: String,
    pub ats: Ats,
    /// Greenhouse board token or Lever company id.
    pub board: String,
}

impl BoardSource {
    fn new(company: &str, ats: Ats, board: &str) -> Self {
        Self {
            company: company.to_string(),
            ats,
            board: board.to_string(),
        }
    }
}

/// Boards searched when no `DISCOVERY_SOURCES_PATH` is configured.
pub fn default_sources() -> Vec<BoardSource> {
    vec![
        BoardSource::new("Stripe", Ats::Greenhouse, "stripe"),
        BoardSource::new("Airbnb", Ats::Greenhouse, "airbnb"),
        BoardSource::new("Figma", Ats::Greenhouse, "figma"),
        BoardSource::new("Databricks", Ats::Greenhouse, "databricks"),
        BoardSource::new("Coinbase", Ats::Greenhouse, "coinbase"),
        BoardSource::new("Palantir", Ats::Lever, "palantir"),
        BoardSource::new("Spotify", Ats::Lever, "spotify"),
    ]
}

/// Reads a JSON array of `BoardSource` from `path`.
pub fn load_sources(path: &Path) -> anyhow::Result<Vec<BoardSource>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading discovery sources from {}", path.display()))?;
    let sources: Vec<BoardSource> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing discovery sources in {}", path.display()))?;
    if sources.is_empty() {
        anyhow::bail!("{} lists no discovery sources", path.display());
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_file_format() {
        let json = r#"[
            {"company": "Stripe", "ats": "greenhouse", "board": "stripe"},
            {"company": "Palantir", "ats": "lever", "board": "palantir"}
        ]"#;
        let sources: Vec<BoardSource> = serde_json::from_str(json).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].ats, Ats::Lever);
        assert_eq!(sources[1].ats.as_str(), "lever");
    }

    #[test]
    fn test_load_sources_missing_file_is_an_error() {
        let err = load_sources(Path::new("/nonexistent/sources.json")).unwrap_err();
        assert!(err.to_string().contains("reading discovery sources"));
    }

    #[test]
    fn test_default_sources_are_not_empty() {
        assert!(!default_sources().is_empty());
    }
}
