use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Remote,
    Hybrid,
    #[default]
    Onsite,
    Any,
}

/// Supervised mode asks the user before selecting jobs and before every CV approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationMode {
    #[default]
    Supervised,
    Autonomous,
}

/// A job posting as produced by discovery. Never mutated after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub company: String,
    pub title: String,
    pub location: String,
    #[serde(default)]
    pub location_type: LocationType,
    pub job_url: String,
    #[serde(default)]
    pub apply_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// "greenhouse", "lever", ...
    pub source: String,
    /// 0 – 100 match against the user's preferences.
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSearchPreferences {
    /// Empty means every company the discovery sources know about.
    pub companies: Vec<String>,
    pub job_titles: Vec<String>,
    pub countries: Vec<String>,
    pub cities: Vec<String>,
    pub location_type: LocationType,
    pub min_years_experience: Option<u32>,
    pub max_years_experience: Option<u32>,
    pub min_salary: Option<u32>,
    pub salary_currency: String,
    pub application_mode: ApplicationMode,
}

impl Default for JobSearchPreferences {
    fn default() -> Self {
        Self {
            companies: vec![],
            job_titles: vec![],
            countries: vec!["United States".to_string()],
            cities: vec![],
            location_type: LocationType::Any,
            min_years_experience: None,
            max_years_experience: None,
            min_salary: None,
            salary_currency: "USD".to_string(),
            application_mode: ApplicationMode::Supervised,
        }
    }
}
