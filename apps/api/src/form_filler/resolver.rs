//! Field resolution: profile → knowledge store → decline option for optional
//! EEO questions → needs a human.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::form_filler::{FieldType, FormField};
use crate::knowledge::{KnowledgeStore, QuestionCategory};
use crate::models::UserProfile;

/// Placeholder answer for resume upload fields; the submitter attaches the CV.
pub const RESUME_ATTACHMENT: &str = "(attached: tailored CV)";

const DECLINE_PHRASES: [&str; 4] = ["decline", "prefer not", "choose not", "not to say"];

/// What a form label is asking for, as far as the profile can answer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    FirstName,
    LastName,
    FullName,
    Email,
    Phone,
    LinkedIn,
    GitHub,
    Portfolio,
    Location,
    Resume,
    WorkAuthorization,
    Sponsorship,
}

impl ProfileField {
    /// Order matters: "first name" must win over "name".
    const PATTERNS: [(ProfileField, &'static [&'static str]); 12] = [
        (ProfileField::FirstName, &["first name", "given name", "firstname"]),
        (ProfileField::LastName, &["last name", "surname", "family name", "lastname"]),
        (ProfileField::Email, &["email", "e-mail"]),
        (ProfileField::Phone, &["phone", "telephone", "mobile"]),
        (ProfileField::LinkedIn, &["linkedin"]),
        (ProfileField::GitHub, &["github"]),
        (ProfileField::Portfolio, &["portfolio", "website"]),
        (ProfileField::Resume, &["resume", "résumé", "curriculum vitae"]),
        (ProfileField::Sponsorship, &["sponsorship", "require a visa", "require visa"]),
        (
            ProfileField::WorkAuthorization,
            &["authorized to work", "authorised to work", "eligible to work", "work authorization"],
        ),
        (
            ProfileField::Location,
            &["current location", "current city", "city of residence", "where are you located"],
        ),
        (ProfileField::FullName, &["full name", "name"]),
    ];

    pub fn classify(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        Self::PATTERNS
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| label.contains(p)))
            .map(|(field, _)| *field)
    }

    fn answer(self, profile: &UserProfile) -> Option<String> {
        let yes_no = |b: bool| (if b { "Yes" } else { "No" }).to_string();
        let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
        match self {
            ProfileField::FirstName => profile.first_name().map(str::to_string),
            ProfileField::LastName => profile.last_name().map(str::to_string),
            ProfileField::FullName => non_empty(profile.full_name.trim()),
            ProfileField::Email => non_empty(profile.email.trim()),
            ProfileField::Phone => profile.phone.clone(),
            ProfileField::LinkedIn => profile.linkedin_url.clone(),
            ProfileField::GitHub => profile.github_url.clone(),
            ProfileField::Portfolio => profile.portfolio_url.clone(),
            ProfileField::Location => {
                let parts: Vec<&str> = [profile.city.as_deref(), profile.state.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect();
                non_empty(&parts.join(", "))
            }
            ProfileField::Resume => Some(RESUME_ATTACHMENT.to_string()),
            ProfileField::WorkAuthorization => profile.work_authorized.map(yes_no),
            ProfileField::Sponsorship => profile.requires_sponsorship.map(yes_no),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOrigin {
    Profile,
    Knowledge,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilledField {
    pub field_id: String,
    pub label: String,
    pub value: String,
    pub confidence: f64,
    pub origin: AnswerOrigin,
}

/// Outcome of resolving every field on a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedForm {
    pub filled: Vec<FilledField>,
    /// Required fields nobody could answer.
    pub unanswered: Vec<FormField>,
    /// Optional fields left blank.
    pub skipped: Vec<String>,
}

impl ResolvedForm {
    pub fn is_complete(&self) -> bool {
        self.unanswered.is_empty()
    }
}

#[derive(Clone)]
pub struct FieldResolver {
    knowledge: Arc<dyn KnowledgeStore>,
    confidence_threshold: f64,
}

impl FieldResolver {
    pub fn new(knowledge: Arc<dyn KnowledgeStore>, confidence_threshold: f64) -> Self {
        Self {
            knowledge,
            confidence_threshold,
        }
    }

    pub async fn resolve_form(
        &self,
        user_id: Uuid,
        profile: &UserProfile,
        fields: &[FormField],
    ) -> Result<ResolvedForm, ServiceError> {
        let mut resolved = ResolvedForm::default();
        for field in fields {
            match self.resolve_field(user_id, profile, field).await? {
                Some(filled) => resolved.filled.push(filled),
                None if field.required => resolved.unanswered.push(field.clone()),
                None => resolved.skipped.push(field.field_id.clone()),
            }
        }
        debug!(
            "Resolved {}/{} fields, {} need input",
            resolved.filled.len(),
            fields.len(),
            resolved.unanswered.len()
        );
        Ok(resolved)
    }

    async fn resolve_field(
        &self,
        user_id: Uuid,
        profile: &UserProfile,
        field: &FormField,
    ) -> Result<Option<FilledField>, ServiceError> {
        let fill = |value: String, confidence: f64, origin: AnswerOrigin| FilledField {
            field_id: field.field_id.clone(),
            label: field.label.clone(),
            value,
            confidence,
            origin,
        };

        if let Some(value) = ProfileField::classify(&field.label)
            .filter(|p| *p != ProfileField::Resume || field.field_type == FieldType::File)
            .and_then(|p| p.answer(profile))
            .and_then(|v| fit_to_options(&v, field.options.as_deref()))
        {
            return Ok(Some(fill(value, 1.0, AnswerOrigin::Profile)));
        }

        if !field.label.trim().is_empty() {
            if let Some(found) = self.knowledge.find_answer(user_id, &field.label).await? {
                if found.confidence >= self.confidence_threshold {
                    if let Some(value) = fit_to_options(&found.answer, field.options.as_deref()) {
                        return Ok(Some(fill(value, found.confidence, AnswerOrigin::Knowledge)));
                    }
                }
            }
        }

        if !field.required && QuestionCategory::detect(&field.label).is_eeo() {
            if let Some(option) = decline_option(field.options.as_deref()) {
                return Ok(Some(fill(option, 0.7, AnswerOrigin::Declined)));
            }
        }

        Ok(None)
    }
}

/// For fields with options, maps `answer` onto the matching option
/// (case-insensitive, then prefix). Free-text fields take `answer` as is.
fn fit_to_options(answer: &str, options: Option<&[String]>) -> Option<String> {
    let Some(options) = options.filter(|o| !o.is_empty()) else {
        return Some(answer.to_string());
    };
    let wanted = answer.trim().to_lowercase();
    options
        .iter()
        .find(|o| o.trim().to_lowercase() == wanted)
        .or_else(|| {
            options
                .iter()
                .find(|o| o.trim().to_lowercase().starts_with(&wanted))
        })
        .cloned()
}

fn decline_option(options: Option<&[String]>) -> Option<String> {
    options?
        .iter()
        .find(|o| {
            let lower = o.to_lowercase();
            DECLINE_PHRASES.iter().any(|p| lower.contains(p))
        })
        .cloned()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
