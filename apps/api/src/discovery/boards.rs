//! Greenhouse and Lever public job-board clients.
//!
//! Greenhouse: GET boards-api.greenhouse.io/v1/boards/{board}/jobs?content=true
//! Lever:      GET api.lever.co/v0/postings/{company}?mode=json
//!
//! Boards are fetched concurrently. A board that fails is logged and skipped;
//! the search only fails when every board does.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::discovery::matching::{detect_location_type, filter_and_rank};
use crate::discovery::{Ats, BoardSource, DiscoveryService};
use crate::errors::ServiceError;
use crate::models::{JobRecord, JobSearchPreferences};

const GREENHOUSE_API: &str = "https://boards-api.greenhouse.io/v1/boards";
const LEVER_API: &str = "https://api.lever.co/v0/postings";

#[derive(Clone)]
pub struct BoardDiscovery {
    http: Client,
    sources: Vec<BoardSource>,
}

impl BoardDiscovery {
    pub fn new(sources: Vec<BoardSource>, request_timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            http: Client::builder().timeout(request_timeout).build()?,
            sources,
        })
    }

    /// Boards to query: all of them, or those whose company matches one of
    /// the preferred companies.
    fn sources_for(&self, prefs: &JobSearchPreferences) -> Vec<BoardSource> {
        if prefs.companies.is_empty() {
            return self.sources.clone();
        }
        self.sources
            .iter()
            .filter(|s| {
                let company = s.company.to_lowercase();
                prefs.companies.iter().any(|c| {
                    let c = c.to_lowercase();
                    company.contains(&c) || c.contains(&company)
                })
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DiscoveryService for BoardDiscovery {
    async fn search(&self, prefs: &JobSearchPreferences) -> Result<Vec<JobRecord>, ServiceError> {
        let sources = self.sources_for(prefs);
        if sources.is_empty() {
            warn!("No discovery source matches the preferred companies {:?}", prefs.companies);
            return Ok(vec![]);
        }

        let mut tasks = JoinSet::new();
        for source in sources.iter().cloned() {
            let http = self.http.clone();
            tasks.spawn(async move {
                let result = fetch_board(&http, &source).await;
                (source, result)
            });
        }

        let mut jobs = vec![];
        let mut failures = 0;
        let mut last_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source, Ok(found))) => {
                    debug!("{} ({}): {} postings", source.company, source.ats.as_str(), found.len());
                    jobs.extend(found);
                }
                Ok((source, Err(e))) => {
                    warn!("Job board {} ({}) failed: {e}", source.company, source.ats.as_str());
                    failures += 1;
                    last_error = Some(e.to_string());
                }
                Err(e) => {
                    warn!("Job board task panicked: {e}");
                    failures += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        if failures == sources.len() {
            return Err(ServiceError::Upstream(format!(
                "all {failures} job boards failed, last error: {}",
                last_error.unwrap_or_default()
            )));
        }

        let total = jobs.len();
        let ranked = filter_and_rank(jobs, prefs);
        info!(
            "Discovery: {} of {} postings match preferences ({} boards, {} failed)",
            ranked.len(),
            total,
            sources.len(),
            failures
        );
        Ok(ranked)
    }
}

async fn fetch_board(http: &Client, source: &BoardSource) -> Result<Vec<JobRecord>, ServiceError> {
    match source.ats {
        Ats::Greenhouse => {
            let url = format!("{GREENHOUSE_API}/{}/jobs?content=true", source.board);
            let body: GreenhouseJobs = get_json(http, &url).await?;
            Ok(greenhouse_jobs(source, body))
        }
        Ats::Lever => {
            let url = format!("{LEVER_API}/{}?mode=json", source.board);
            let body: Vec<LeverPosting> = get_json(http, &url).await?;
            Ok(lever_jobs(source, body))
        }
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(http: &Client, url: &str) -> Result<T, ServiceError> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Upstream(format!("GET {url} returned {status}")));
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ServiceError::Malformed(format!("{url}: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Greenhouse
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GreenhouseJobs {
    #[serde(default)]
    jobs: Vec<GreenhouseJob>,
}

#[derive(Debug, Deserialize)]
struct GreenhouseJob {
    id: u64,
    title: String,
    #[serde(default)]
    location: Option<GreenhouseLocation>,
    absolute_url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GreenhouseLocation {
    #[serde(default)]
    name: String,
}

fn greenhouse_jobs(source: &BoardSource, body: GreenhouseJobs) -> Vec<JobRecord> {
    body.jobs
        .into_iter()
        .map(|job| {
            let location = job.location.map(|l| l.name).unwrap_or_default();
            JobRecord {
                job_id: format!("greenhouse:{}:{}", source.board, job.id),
                company: source.company.clone(),
                title: job.title,
                location_type: detect_location_type(&location),
                location,
                apply_url: Some(job.absolute_url.clone()),
                job_url: job.absolute_url,
                description: job.content.map(|c| html_to_text(&c)).filter(|d| !d.is_empty()),
                source: Ats::Greenhouse.as_str().to_string(),
                relevance_score: None,
                posted_at: job
                    .updated_at
                    .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
                    .map(|d| d.with_timezone(&Utc)),
            }
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Lever
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeverPosting {
    id: String,
    text: String,
    #[serde(default)]
    categories: LeverCategories,
    hosted_url: String,
    #[serde(default)]
    apply_url: Option<String>,
    #[serde(default)]
    description_plain: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    created_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct LeverCategories {
    #[serde(default)]
    location: Option<String>,
}

fn lever_jobs(source: &BoardSource, postings: Vec<LeverPosting>) -> Vec<JobRecord> {
    postings
        .into_iter()
        .map(|posting| {
            let location = posting.categories.location.unwrap_or_default();
            JobRecord {
                job_id: format!("lever:{}:{}", source.board, posting.id),
                company: source.company.clone(),
                title: posting.text,
                location_type: detect_location_type(&location),
                location,
                job_url: posting.hosted_url,
                apply_url: posting.apply_url,
                description: posting
                    .description_plain
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
                source: Ats::Lever.as_str().to_string(),
                relevance_score: None,
                posted_at: posting
                    .created_at
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            }
        })
        .collect()
}

/// Greenhouse returns HTML-escaped HTML. Unescape, drop tags, collapse
/// whitespace.
fn html_to_text(escaped: &str) -> String {
    let html = escaped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");

    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationType;

    fn greenhouse_source() -> BoardSource {
        BoardSource {
            company: "Stripe".to_string(),
            ats: Ats::Greenhouse,
            board: "stripe".to_string(),
        }
    }

    #[test]
    fn test_greenhouse_payload_maps_to_job_records() {
        let json = r#"{"jobs": [{
            "id": 4211,
            "title": "Data Engineer, Payments",
            "location": {"name": "Remote - US"},
            "absolute_url": "https://boards.greenhouse.io/stripe/jobs/4211",
            "content": "&lt;p&gt;Build &amp;amp; run pipelines&lt;/p&gt;",
            "updated_at": "2024-05-01T10:00:00-04:00"
        }]}"#;
        let body: GreenhouseJobs = serde_json::from_str(json).unwrap();
        let jobs = greenhouse_jobs(&greenhouse_source(), body);

        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.job_id, "greenhouse:stripe:4211");
        assert_eq!(job.company, "Stripe");
        assert_eq!(job.location_type, LocationType::Remote);
        assert_eq!(job.description.as_deref(), Some("Build &amp; run pipelines"));
        assert_eq!(job.source, "greenhouse");
        assert_eq!(job.posted_at.unwrap().to_rfc3339(), "2024-05-01T14:00:00+00:00");
    }

    #[test]
    fn test_lever_payload_maps_to_job_records() {
        let json = r#"[{
            "id": "a1b2",
            "text": "Senior Data Engineer",
            "categories": {"location": "New York (Hybrid)", "team": "Data"},
            "hostedUrl": "https://jobs.lever.co/palantir/a1b2",
            "applyUrl": "https://jobs.lever.co/palantir/a1b2/apply",
            "descriptionPlain": "  Own the warehouse.  ",
            "createdAt": 1714557600000
        }]"#;
        let postings: Vec<LeverPosting> = serde_json::from_str(json).unwrap();
        let source = BoardSource {
            company: "Palantir".to_string(),
            ats: Ats::Lever,
            board: "palantir".to_string(),
        };
        let jobs = lever_jobs(&source, postings);

        assert_eq!(jobs[0].job_id, "lever:palantir:a1b2");
        assert_eq!(jobs[0].location_type, LocationType::Hybrid);
        assert_eq!(jobs[0].description.as_deref(), Some("Own the warehouse."));
        assert_eq!(
            jobs[0].apply_url.as_deref(),
            Some("https://jobs.lever.co/palantir/a1b2/apply")
        );
        assert!(jobs[0].posted_at.is_some());
    }

    #[test]
    fn test_missing_location_is_onsite_and_empty() {
        let json = r#"{"jobs": [{"id": 1, "title": "Analyst", "absolute_url": "https://x"}]}"#;
        let body: GreenhouseJobs = serde_json::from_str(json).unwrap();
        let jobs = greenhouse_jobs(&greenhouse_source(), body);
        assert_eq!(jobs[0].location, "");
        assert_eq!(jobs[0].location_type, LocationType::Onsite);
        assert!(jobs[0].description.is_none());
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("&lt;h2&gt;About&lt;/h2&gt;&lt;ul&gt;&lt;li&gt;SQL&lt;/li&gt;&lt;/ul&gt;"),
            "About SQL"
        );
        assert_eq!(html_to_text("plain text"), "plain text");
    }

    #[test]
    fn test_sources_filtered_by_preferred_companies() {
        let discovery = BoardDiscovery::new(
            crate::discovery::default_sources(),
            Duration::from_secs(5),
        )
        .unwrap();
        let prefs = JobSearchPreferences {
            companies: vec!["stripe".to_string(), "Spotify".to_string()],
            ..Default::default()
        };
        let picked: Vec<String> = discovery
            .sources_for(&prefs)
            .into_iter()
            .map(|s| s.company)
            .collect();
        assert_eq!(picked, vec!["Stripe".to_string(), "Spotify".to_string()]);
        assert_eq!(
            discovery.sources_for(&JobSearchPreferences::default()).len(),
            crate::discovery::default_sources().len()
        );
    }

    #[tokio::test]
    async fn test_no_matching_source_returns_empty() {
        let discovery = BoardDiscovery::new(vec![], Duration::from_secs(5)).unwrap();
        let jobs = discovery.search(&JobSearchPreferences::default()).await.unwrap();
        assert!(jobs.is_empty());
    }
}
