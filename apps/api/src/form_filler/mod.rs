// Form Filler: answers an application form from the profile and the knowledge
// store, and reports the required questions it could not answer instead of
// guessing.

pub mod greenhouse;
pub mod resolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cv_architect::GeneratedCv;
use crate::errors::ServiceError;
use crate::models::{JobRecord, UserProfile};

pub use greenhouse::{BoardFormFiller, DryRunSubmitter};
pub use resolver::FieldResolver;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Email,
    Phone,
    Select,
    MultiSelect,
    Checkbox,
    Textarea,
    File,
    Date,
    Number,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Select => "select",
            FieldType::MultiSelect => "multi_select",
            FieldType::Checkbox => "checkbox",
            FieldType::Textarea => "textarea",
            FieldType::File => "file",
            FieldType::Date => "date",
            FieldType::Number => "number",
        }
    }
}

/// One question on an application form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// The name the board expects the answer under.
    pub field_id: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

/// A required question only the user can answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub field_id: String,
    pub question: String,
    pub field_type: FieldType,
    pub options: Option<Vec<String>>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplicationOutcome {
    Submitted { confirmation: String },
    NeedsInput { questions: Vec<PendingQuestion> },
}

/// Held by the orchestrator as `Arc<dyn FormFiller>`.
#[async_trait]
pub trait FormFiller: Send + Sync {
    /// `cv` is the approved tailored CV for `job`, attached to resume fields.
    async fn apply(
        &self,
        user_id: Uuid,
        job: &JobRecord,
        profile: &UserProfile,
        cv: Option<&GeneratedCv>,
    ) -> Result<ApplicationOutcome, ServiceError>;
}
