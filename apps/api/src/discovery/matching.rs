//! Preference filtering and relevance scoring for discovered jobs.
//!
//! Relevance (0 – 100): base 50, +20 title match, +15 exact / +10 partial
//! company match, +10 location-type match (+5 if the job is remote instead),
//! +5 preferred city. Capped at 100.

use std::collections::HashSet;

use crate::models::{JobRecord, JobSearchPreferences, LocationType};

const US_INDICATORS: [&str; 7] = [
    "usa",
    "united states",
    "us-",
    "-us",
    "u.s.",
    "remote - us",
    "us remote",
];
const NON_US: [&str; 10] = [
    "canada",
    "uk",
    "united kingdom",
    "london",
    "india",
    "germany",
    "ireland",
    "singapore",
    "australia",
    "toronto",
];
const US_STATES: [&str; 12] = [
    "california",
    "new york",
    "texas",
    "washington",
    "colorado",
    "florida",
    "massachusetts",
    "illinois",
    "georgia",
    "oregon",
    "virginia",
    "san francisco",
];
/// Matched as whole tokens only.
const US_STATE_CODES: [&str; 12] = [
    "ca", "ny", "tx", "wa", "co", "fl", "ma", "il", "ga", "or", "va", "nj",
];

pub fn detect_location_type(location: &str) -> LocationType {
    let lower = location.to_lowercase();
    if ["remote", "anywhere", "wfh"].iter().any(|k| lower.contains(k)) {
        LocationType::Remote
    } else if ["hybrid", "flexible"].iter().any(|k| lower.contains(k)) {
        LocationType::Hybrid
    } else {
        LocationType::Onsite
    }
}

pub fn is_us_location(location: &str) -> bool {
    let lower = location.to_lowercase();
    if lower.trim().is_empty() {
        return false;
    }
    if US_INDICATORS.iter().any(|i| lower.contains(i)) {
        return true;
    }
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let non_us = NON_US.iter().any(|n| {
        if n.contains(' ') {
            lower.contains(n)
        } else {
            tokens.contains(n)
        }
    });
    if non_us {
        return false;
    }
    if tokens.contains(&"us") {
        return true;
    }
    US_STATES.iter().any(|s| lower.contains(s)) || US_STATE_CODES.iter().any(|c| tokens.contains(c))
}

fn is_us_country(country: &str) -> bool {
    matches!(
        country.trim().to_lowercase().as_str(),
        "united states" | "us" | "usa" | "united states of america"
    )
}

/// Empty `job_titles` accepts every title.
pub fn title_matches(title: &str, prefs: &JobSearchPreferences) -> bool {
    let title = title.to_lowercase();
    prefs.job_titles.is_empty()
        || prefs
            .job_titles
            .iter()
            .any(|t| title.contains(&t.to_lowercase()))
}

pub fn matches_preferences(job: &JobRecord, prefs: &JobSearchPreferences) -> bool {
    if !prefs.companies.is_empty() {
        let company = job.company.to_lowercase();
        let wanted = prefs.companies.iter().any(|c| {
            let c = c.to_lowercase();
            company.contains(&c) || c.contains(&company)
        });
        if !wanted {
            return false;
        }
    }

    if prefs.location_type != LocationType::Any && job.location_type != prefs.location_type {
        // remote jobs are acceptable to someone asking for hybrid
        let remote_for_hybrid =
            prefs.location_type == LocationType::Hybrid && job.location_type == LocationType::Remote;
        if !remote_for_hybrid {
            return false;
        }
    }

    if !prefs.countries.is_empty() {
        let location = job.location.to_lowercase();
        let named = prefs
            .countries
            .iter()
            .any(|c| location.contains(&c.to_lowercase()));
        if !named {
            let wants_us = prefs.countries.iter().any(|c| is_us_country(c));
            if !(wants_us && is_us_location(&job.location)) {
                return false;
            }
        }
    }

    true
}

pub fn score_relevance(job: &JobRecord, prefs: &JobSearchPreferences) -> f64 {
    let mut score = 50.0;

    let title = job.title.to_lowercase();
    if prefs
        .job_titles
        .iter()
        .any(|t| title.contains(&t.to_lowercase()))
    {
        score += 20.0;
    }

    let company = job.company.to_lowercase();
    for wanted in prefs.companies.iter().map(|c| c.to_lowercase()) {
        if wanted == company {
            score += 15.0;
            break;
        } else if company.contains(&wanted) {
            score += 10.0;
            break;
        }
    }

    if prefs.location_type != LocationType::Any {
        if job.location_type == prefs.location_type {
            score += 10.0;
        } else if job.location_type == LocationType::Remote {
            score += 5.0;
        }
    }

    let location = job.location.to_lowercase();
    if prefs
        .cities
        .iter()
        .any(|c| location.contains(&c.to_lowercase()))
    {
        score += 5.0;
    }

    f64::min(100.0, score)
}

/// Filters, scores, removes duplicates (same company, title and location) and
/// sorts by relevance, highest first. The sort is stable.
pub fn filter_and_rank(jobs: Vec<JobRecord>, prefs: &JobSearchPreferences) -> Vec<JobRecord> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<JobRecord> = jobs
        .into_iter()
        .filter(|job| title_matches(&job.title, prefs) && matches_preferences(job, prefs))
        .filter(|job| {
            seen.insert(format!(
                "{}|{}|{}",
                job.company.to_lowercase(),
                job.title.to_lowercase(),
                job.location.to_lowercase()
            ))
        })
        .map(|mut job| {
            job.relevance_score = Some(score_relevance(&job, prefs));
            job
        })
        .collect();

    sort_by_relevance(&mut ranked);
    ranked
}

/// Highest relevance first; unscored jobs last. Stable.
pub fn sort_by_relevance(jobs: &mut [JobRecord]) {
    jobs.sort_by(|a, b| {
        let a = a.relevance_score.unwrap_or(0.0);
        let b = b.relevance_score.unwrap_or(0.0);
        b.total_cmp(&a)
    });
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
