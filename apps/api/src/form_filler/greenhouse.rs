//! Board-aware form filler.
//!
//! Greenhouse publishes each posting's application questions at
//! GET boards-api.greenhouse.io/v1/boards/{board}/jobs/{id}?questions=true.
//! Lever (and anything else) gets the standard hosted-form field set.
//! The resolved form is handed to an `ApplicationSubmitter`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cv_architect::GeneratedCv;
use crate::errors::ServiceError;
use crate::form_filler::resolver::{FieldResolver, FilledField, ResolvedForm};
use crate::form_filler::{ApplicationOutcome, FieldType, FormField, FormFiller, PendingQuestion};
use crate::models::{JobRecord, UserProfile};

const GREENHOUSE_API: &str = "https://boards-api.greenhouse.io/v1/boards";

/// Sends a fully resolved application to the board.
#[async_trait]
pub trait ApplicationSubmitter: Send + Sync {
    /// Returns the board's confirmation reference.
    async fn submit(
        &self,
        job: &JobRecord,
        form: &ResolvedForm,
        cv: Option<&GeneratedCv>,
    ) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct DryRunSubmission {
    pub confirmation: String,
    pub job_id: String,
    pub company: String,
    pub fields: Vec<FilledField>,
    pub cv_attached: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Records what would have been submitted without contacting the board.
#[derive(Default)]
pub struct DryRunSubmitter {
    submissions: Mutex<Vec<DryRunSubmission>>,
}

impl DryRunSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn submissions(&self) -> Vec<DryRunSubmission> {
        self.submissions.lock().await.clone()
    }
}

#[async_trait]
impl ApplicationSubmitter for DryRunSubmitter {
    async fn submit(
        &self,
        job: &JobRecord,
        form: &ResolvedForm,
        cv: Option<&GeneratedCv>,
    ) -> Result<String, ServiceError> {
        let confirmation = format!("dry-run-{}", Uuid::new_v4());
        info!(
            "Dry-run submission {confirmation} for {} at {} ({} fields)",
            job.title,
            job.company,
            form.filled.len()
        );
        self.submissions.lock().await.push(DryRunSubmission {
            confirmation: confirmation.clone(),
            job_id: job.job_id.clone(),
            company: job.company.clone(),
            fields: form.filled.clone(),
            cv_attached: cv.is_some(),
            submitted_at: Utc::now(),
        });
        Ok(confirmation)
    }
}

pub struct BoardFormFiller {
    http: Client,
    resolver: FieldResolver,
    submitter: Arc<dyn ApplicationSubmitter>,
}

impl BoardFormFiller {
    pub fn new(
        resolver: FieldResolver,
        submitter: Arc<dyn ApplicationSubmitter>,
        request_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            http: Client::builder().timeout(request_timeout).build()?,
            resolver,
            submitter,
        })
    }

    async fn form_for(&self, job: &JobRecord) -> Result<Vec<FormField>, ServiceError> {
        match greenhouse_posting(&job.job_id) {
            Some((board, id)) => {
                let url = format!("{GREENHOUSE_API}/{board}/jobs/{id}?questions=true");
                let response = self.http.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ServiceError::Upstream(format!("GET {url} returned {status}")));
                }
                let body = response.text().await?;
                let posting: GreenhousePosting = serde_json::from_str(&body)
                    .map_err(|e| ServiceError::Malformed(format!("{url}: {e}")))?;
                let fields = greenhouse_fields(posting);
                if fields.is_empty() {
                    warn!("Greenhouse posting {board}/{id} lists no questions, using standard form");
                    return Ok(standard_form());
                }
                Ok(fields)
            }
            None => Ok(standard_form()),
        }
    }
}

#[async_trait]
impl FormFiller for BoardFormFiller {
    async fn apply(
        &self,
        user_id: Uuid,
        job: &JobRecord,
        profile: &UserProfile,
        cv: Option<&GeneratedCv>,
    ) -> Result<ApplicationOutcome, ServiceError> {
        let fields = self.form_for(job).await?;
        let resolved = self.resolver.resolve_form(user_id, profile, &fields).await?;

        if !resolved.is_complete() {
            let context = format!("Application for {} at {}", job.title, job.company);
            let questions = resolved
                .unanswered
                .into_iter()
                .map(|field| PendingQuestion {
                    field_id: field.field_id,
                    question: field.label,
                    field_type: field.field_type,
                    options: field.options,
                    context: Some(context.clone()),
                })
                .collect::<Vec<_>>();
            info!(
                "{} question(s) need the user for {} at {}",
                questions.len(),
                job.title,
                job.company
            );
            return Ok(ApplicationOutcome::NeedsInput { questions });
        }

        let confirmation = self.submitter.submit(job, &resolved, cv).await?;
        Ok(ApplicationOutcome::Submitted { confirmation })
    }
}

/// `greenhouse:{board}:{id}` → `(board, id)`.
fn greenhouse_posting(job_id: &str) -> Option<(&str, &str)> {
    let mut parts = job_id.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("greenhouse"), Some(board), Some(id)) if !board.is_empty() && !id.is_empty() => {
            Some((board, id))
        }
        _ => None,
    }
}

/// Fields of a standard hosted application form.
pub fn standard_form() -> Vec<FormField> {
    let field = |id: &str, label: &str, field_type: FieldType, required: bool| FormField {
        field_id: id.to_string(),
        label: label.to_string(),
        field_type,
        required,
        options: None,
    };
    vec![
        field("name", "Full name", FieldType::Text, true),
        field("email", "Email", FieldType::Email, true),
        field("phone", "Phone", FieldType::Phone, true),
        field("resume", "Resume/CV", FieldType::File, true),
        field("org", "Current company", FieldType::Text, false),
        field("urls[LinkedIn]", "LinkedIn URL", FieldType::Text, false),
        field("urls[GitHub]", "GitHub URL", FieldType::Text, false),
        field("comments", "Additional information", FieldType::Textarea, false),
    ]
}

// ────────────────────────────────────────────────────────────────────────────
// Greenhouse question payload
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GreenhousePosting {
    #[serde(default)]
    questions: Vec<GreenhouseQuestion>,
}

#[derive(Debug, Deserialize)]
struct GreenhouseQuestion {
    #[serde(default)]
    required: bool,
    label: String,
    #[serde(default)]
    fields: Vec<GreenhouseField>,
}

#[derive(Debug, Deserialize)]
struct GreenhouseField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    values: Vec<GreenhouseValue>,
}

#[derive(Debug, Deserialize)]
struct GreenhouseValue {
    label: String,
}

fn greenhouse_field_type(raw: &str) -> Option<FieldType> {
    match raw {
        "input_text" => Some(FieldType::Text),
        "input_file" => Some(FieldType::File),
        "textarea" => Some(FieldType::Textarea),
        "multi_value_single_select" => Some(FieldType::Select),
        "multi_value_multi_select" => Some(FieldType::MultiSelect),
        _ => None,
    }
}

/// One `FormField` per question, from its first fillable input. Hidden and
/// unknown input types are dropped.
fn greenhouse_fields(posting: GreenhousePosting) -> Vec<FormField> {
    posting
        .questions
        .into_iter()
        .filter_map(|question| {
            let (field, field_type) = question
                .fields
                .into_iter()
                .find_map(|f| greenhouse_field_type(&f.field_type).map(|t| (f, t)))?;
            let options: Vec<String> = field.values.into_iter().map(|v| v.label).collect();
            Some(FormField {
                field_id: field.name,
                label: question.label,
                field_type,
                required: question.required,
                options: (!options.is_empty()).then_some(options),
            })
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{AnswerSource, InMemoryKnowledgeBase, KnowledgeStore};
    use crate::models::LocationType;

    fn lever_job() -> JobRecord {
        JobRecord {
            job_id: "lever:palantir:a1b2".to_string(),
            company: "Palantir".to_string(),
            title: "Data Engineer".to_string(),
            location: "New York".to_string(),
            location_type: LocationType::Onsite,
            job_url: "https://jobs.lever.co/palantir/a1b2".to_string(),
            apply_url: None,
            description: None,
            source: "lever".to_string(),
            relevance_score: Some(80.0),
            posted_at: None,
        }
    }

    fn profile(phone: Option<&str>) -> UserProfile {
        UserProfile {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: phone.map(str::to_string),
            ..Default::default()
        }
    }

    fn filler(kb: Arc<InMemoryKnowledgeBase>, submitter: Arc<DryRunSubmitter>) -> BoardFormFiller {
        BoardFormFiller::new(FieldResolver::new(kb, 0.8), submitter, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_greenhouse_posting_id() {
        assert_eq!(greenhouse_posting("greenhouse:stripe:4211"), Some(("stripe", "4211")));
        assert_eq!(greenhouse_posting("lever:palantir:a1b2"), None);
        assert_eq!(greenhouse_posting("greenhouse:stripe"), None);
    }

    #[test]
    fn test_greenhouse_questions_map_to_fields() {
        let json = r#"{"id": 4211, "questions": [
            {"required": true, "label": "First Name",
             "fields": [{"name": "first_name", "type": "input_text", "values": []}]},
            {"required": true, "label": "Resume/CV",
             "fields": [{"name": "resume", "type": "input_file", "values": []},
                        {"name": "resume_text", "type": "textarea", "values": []}]},
            {"required": false, "label": "Will you require sponsorship?",
             "fields": [{"name": "question_9", "type": "multi_value_single_select",
                         "values": [{"label": "Yes", "value": 1}, {"label": "No", "value": 0}]}]},
            {"required": false, "label": "Tracking",
             "fields": [{"name": "gh_src", "type": "input_hidden", "values": []}]}
        ]}"#;
        let posting: GreenhousePosting = serde_json::from_str(json).unwrap();
        let fields = greenhouse_fields(posting);

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].field_id, "first_name");
        assert_eq!(fields[1].field_type, FieldType::File);
        assert_eq!(fields[2].field_type, FieldType::Select);
        assert_eq!(
            fields[2].options,
            Some(vec!["Yes".to_string(), "No".to_string()])
        );
        assert!(!fields[2].required);
    }

    #[tokio::test]
    async fn test_complete_form_is_submitted() {
        let submitter = Arc::new(DryRunSubmitter::new());
        let filler = filler(Arc::new(InMemoryKnowledgeBase::new()), submitter.clone());

        let outcome = filler
            .apply(Uuid::new_v4(), &lever_job(), &profile(Some("+1 555 0100")), None)
            .await
            .unwrap();

        let ApplicationOutcome::Submitted { confirmation } = outcome else {
            panic!("expected submission, got {outcome:?}");
        };
        let recorded = submitter.submissions().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].confirmation, confirmation);
        assert_eq!(recorded[0].job_id, "lever:palantir:a1b2");
        assert!(!recorded[0].cv_attached);
    }

    #[tokio::test]
    async fn test_missing_required_answer_asks_the_user() {
        let submitter = Arc::new(DryRunSubmitter::new());
        let filler = filler(Arc::new(InMemoryKnowledgeBase::new()), submitter.clone());

        let outcome = filler
            .apply(Uuid::new_v4(), &lever_job(), &profile(None), None)
            .await
            .unwrap();

        let ApplicationOutcome::NeedsInput { questions } = outcome else {
            panic!("expected questions, got {outcome:?}");
        };
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question, "Phone");
        assert_eq!(
            questions[0].context.as_deref(),
            Some("Application for Data Engineer at Palantir")
        );
        assert!(submitter.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_learned_answer_unblocks_the_form() {
        let kb = Arc::new(InMemoryKnowledgeBase::new());
        let user = Uuid::new_v4();
        kb.add_entry(user, "Phone", "+1 555 0100", None, AnswerSource::FormLearned)
            .await
            .unwrap();
        let submitter = Arc::new(DryRunSubmitter::new());
        let filler = filler(kb, submitter.clone());

        let outcome = filler.apply(user, &lever_job(), &profile(None), None).await.unwrap();
        assert!(matches!(outcome, ApplicationOutcome::Submitted { .. }));
    }
}
