//! In-memory knowledge base and profile seeding.
//!
//! Matching: an entry whose question text appears inside the asked question
//! scores `len(entry) / len(question)`; an entry whose category patterns appear
//! in the question scores 0.5. The best score wins if it exceeds
//! `MIN_MATCH_SCORE`, and confidence is the score plus `CONFIDENCE_BOOST`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::knowledge::{
    normalize_question, AnswerSource, KnowledgeEntry, KnowledgeMatch, KnowledgeStore,
    QuestionCategory,
};
use crate::models::UserProfile;

const MIN_MATCH_SCORE: f64 = 0.2;
const CATEGORY_MATCH_SCORE: f64 = 0.5;
const CONFIDENCE_BOOST: f64 = 0.3;

#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    entries: RwLock<HashMap<Uuid, Vec<KnowledgeEntry>>>,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeBase {
    async fn add_entry(
        &self,
        user_id: Uuid,
        question: &str,
        answer: &str,
        category: Option<QuestionCategory>,
        source: AnswerSource,
    ) -> Result<(), ServiceError> {
        let entry = KnowledgeEntry {
            question_pattern: normalize_question(question),
            answer: answer.to_string(),
            category: category.unwrap_or_else(|| QuestionCategory::detect(question)),
            source,
            times_used: 0,
            created_at: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        let user_entries = entries.entry(user_id).or_default();
        match user_entries
            .iter_mut()
            .find(|e| e.question_pattern == entry.question_pattern)
        {
            Some(existing) => {
                debug!("Updated knowledge entry ({:?}) for user {user_id}", entry.category);
                *existing = entry;
            }
            None => {
                debug!("Added knowledge entry ({:?}) for user {user_id}", entry.category);
                user_entries.push(entry);
            }
        }
        Ok(())
    }

    async fn find_answer(
        &self,
        user_id: Uuid,
        question: &str,
    ) -> Result<Option<KnowledgeMatch>, ServiceError> {
        let question = normalize_question(question);
        let mut entries = self.entries.write().await;
        let Some(user_entries) = entries.get_mut(&user_id) else {
            return Ok(None);
        };

        let best = user_entries
            .iter_mut()
            .map(|entry| (score_entry(entry, &question), entry))
            .filter(|(score, _)| score.overall > MIN_MATCH_SCORE)
            .fold(None::<(MatchScore, &mut KnowledgeEntry)>, |best, candidate| match best {
                Some(b) if !candidate.0.beats(&b.0) => Some(b),
                _ => Some(candidate),
            });

        Ok(best.map(|(score, entry)| {
            let score = score.overall;
            entry.times_used += 1;
            KnowledgeMatch {
                answer: entry.answer.clone(),
                confidence: (score + CONFIDENCE_BOOST).min(1.0),
                category: entry.category,
                source: entry.source,
            }
        }))
    }

    async fn entries(&self, user_id: Uuid) -> Result<Vec<KnowledgeEntry>, ServiceError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MatchScore {
    overall: f64,
    /// Substring score alone; breaks ties between category matches.
    direct: f64,
}

impl MatchScore {
    fn beats(&self, other: &MatchScore) -> bool {
        self.overall > other.overall || (self.overall == other.overall && self.direct > other.direct)
    }
}

/// `question` must be normalised.
fn score_entry(entry: &KnowledgeEntry, question: &str) -> MatchScore {
    if question.is_empty() {
        return MatchScore { overall: 0.0, direct: 0.0 };
    }
    let direct = if !entry.question_pattern.is_empty() && question.contains(&entry.question_pattern) {
        entry.question_pattern.chars().count() as f64 / question.chars().count() as f64
    } else {
        0.0
    };
    let by_category = if entry.category.matches(question) {
        CATEGORY_MATCH_SCORE
    } else {
        0.0
    };
    MatchScore {
        overall: direct.max(by_category),
        direct,
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Seeds answers the profile already settles: work authorisation, sponsorship,
/// location, public links and voluntary disclosures.
pub async fn populate_from_profile(
    store: &dyn KnowledgeStore,
    user_id: Uuid,
    profile: &UserProfile,
) -> Result<usize, ServiceError> {
    let mut seeded: Vec<(String, String, Option<QuestionCategory>)> = vec![];

    if let Some(authorized) = profile.work_authorized {
        let country = profile.country.as_deref().unwrap_or("the United States");
        seeded.push((
            format!("authorized to work in {country}"),
            yes_no(authorized).to_string(),
            Some(QuestionCategory::WorkAuthorization),
        ));
    }
    if let Some(sponsorship) = profile.requires_sponsorship {
        seeded.push((
            "require visa sponsorship".to_string(),
            yes_no(sponsorship).to_string(),
            Some(QuestionCategory::WorkAuthorization),
        ));
    }

    let location = [profile.city.as_deref(), profile.state.as_deref(), profile.country.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    if !location.is_empty() {
        seeded.push(("current location".to_string(), location, None));
    }

    let links = [
        ("linkedin profile", &profile.linkedin_url),
        ("github profile", &profile.github_url),
        ("portfolio website", &profile.portfolio_url),
    ];
    for (question, value) in links {
        if let Some(url) = value {
            seeded.push((question.to_string(), url.clone(), None));
        }
    }

    let disclosures = [
        ("veteran status", &profile.veteran_status, QuestionCategory::VeteranStatus),
        ("disability status", &profile.disability_status, QuestionCategory::Disability),
        ("gender", &profile.gender, QuestionCategory::Gender),
        ("ethnicity", &profile.ethnicity, QuestionCategory::Ethnicity),
    ];
    for (question, value, category) in disclosures {
        if let Some(answer) = value.as_deref().filter(|a| !a.trim().is_empty()) {
            seeded.push((question.to_string(), answer.to_string(), Some(category)));
        }
    }

    for (question, answer, category) in &seeded {
        store
            .add_entry(user_id, question, answer, *category, AnswerSource::Profile)
            .await?;
    }

    info!("Seeded {} knowledge entries from profile for user {user_id}", seeded.len());
    Ok(seeded.len())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
