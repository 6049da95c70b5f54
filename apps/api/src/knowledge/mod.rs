// Knowledge store: learned answers to application-form questions, per user.
// Shared by every workflow of a user; last write wins per normalised question.

pub mod base;
pub mod categories;
pub mod handlers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

pub use base::InMemoryKnowledgeBase;
pub use categories::QuestionCategory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Profile,
    #[default]
    UserInput,
    /// Answered by the user while a workflow was paused on a form question.
    FormLearned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Lowercased question text; the upsert key.
    pub question_pattern: String,
    pub answer: String,
    pub category: QuestionCategory,
    pub source: AnswerSource,
    pub times_used: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMatch {
    pub answer: String,
    /// 0.0 – 1.0
    pub confidence: f64,
    pub category: QuestionCategory,
    pub source: AnswerSource,
}

/// Held as `Arc<dyn KnowledgeStore>` by the orchestrator, the form filler and the API.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Upserts by normalised question text. `category` is detected when `None`.
    async fn add_entry(
        &self,
        user_id: Uuid,
        question: &str,
        answer: &str,
        category: Option<QuestionCategory>,
        source: AnswerSource,
    ) -> Result<(), ServiceError>;

    async fn find_answer(
        &self,
        user_id: Uuid,
        question: &str,
    ) -> Result<Option<KnowledgeMatch>, ServiceError>;

    async fn entries(&self, user_id: Uuid) -> Result<Vec<KnowledgeEntry>, ServiceError>;
}

pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
