//! WorkflowContext: all mutable state of one user's job-application session.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cv_architect::{GeneratedCv, ValidationReport};
use crate::models::{ApplicationMode, JobRecord, JobSearchPreferences, UserProfile};
use crate::workflow::state::WorkflowState;

// ────────────────────────────────────────────────────────────────────────────
// Records kept on the context
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStep {
    Search,
    CvGeneration,
    Apply,
    /// Workflow-level conditions such as running out of selected jobs.
    Workflow,
}

/// One entry of the append-only error log. Carries enough to explain the
/// failure to a user without going back to the logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub step: ErrorStep,
    /// Title of the job being processed, when the failure concerns one.
    pub job: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// The critic's report plus the approval decision taken on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvReview {
    pub report: ValidationReport,
    pub approved: bool,
    pub feedback: Option<String>,
}

/// A required form question the form filler could not answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanInputRequest {
    pub workflow_id: Uuid,
    pub job_id: String,
    pub company: String,
    pub question: String,
    pub field_type: String,
    pub options: Option<Vec<String>>,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
    pub timeout_at: Option<DateTime<Utc>>,
}

/// Status summary. Computed from context fields only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub state: WorkflowState,
    pub mode: ApplicationMode,
    pub jobs_found: usize,
    pub jobs_selected: usize,
    pub cvs_generated: usize,
    pub cvs_approved: usize,
    pub applications_submitted: usize,
    pub applications_pending_input: usize,
    pub jobs_failed: usize,
    pub current_job: Option<String>,
    pub current_action: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Context
// ────────────────────────────────────────────────────────────────────────────

/// One instance per job-search session.
///
/// `current_state` is private: only `WorkflowStateMachine` changes it, and every
/// change goes through the transition table (or through `cancel`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub preferences: JobSearchPreferences,
    pub mode: ApplicationMode,
    current_state: WorkflowState,

    pub discovered_jobs: Vec<JobRecord>,
    pub selected_jobs: Vec<JobRecord>,
    /// Cursor into `selected_jobs`; never exceeds its length.
    pub current_job_index: usize,

    pub base_cv: String,
    pub user_profile: UserProfile,
    /// job_id → CV. Every key also has an entry in `cv_validations`.
    pub generated_cvs: BTreeMap<String, GeneratedCv>,
    pub cv_validations: BTreeMap<String, CvReview>,

    /// Non-empty only while in `NeedsInput`.
    pub pending_inputs: Vec<HumanInputRequest>,
    /// job_ids in submission order, each at most once.
    pub submitted_applications: Vec<String>,
    /// job_ids abandoned after a generation error, a rejection or an apply error.
    pub failed_jobs: Vec<String>,
    pub errors: Vec<ErrorRecord>,

    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowContext {
    pub fn new(
        user_id: Uuid,
        preferences: JobSearchPreferences,
        base_cv: String,
        user_profile: UserProfile,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: Uuid::new_v4(),
            user_id,
            mode: preferences.application_mode,
            preferences,
            current_state: WorkflowState::Init,
            discovered_jobs: vec![],
            selected_jobs: vec![],
            current_job_index: 0,
            base_cv,
            user_profile,
            generated_cvs: BTreeMap::new(),
            cv_validations: BTreeMap::new(),
            pending_inputs: vec![],
            submitted_applications: vec![],
            failed_jobs: vec![],
            errors: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.current_state
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Only the state machine sets the state.
    pub(in crate::workflow) fn set_state(&mut self, state: WorkflowState) {
        self.current_state = state;
        self.touch();
    }

    /// Refreshes `updated_at`, always moving it strictly forward.
    pub(in crate::workflow) fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::nanoseconds(1)
        };
    }

    pub fn current_job(&self) -> Option<&JobRecord> {
        self.selected_jobs.get(self.current_job_index)
    }

    pub fn jobs_remaining(&self) -> bool {
        self.current_job_index < self.selected_jobs.len()
    }

    /// Moves the cursor past the current job, saturating at `selected_jobs.len()`.
    pub(in crate::workflow) fn advance_cursor(&mut self) {
        if self.current_job_index < self.selected_jobs.len() {
            self.current_job_index += 1;
        }
    }

    /// Stores a generated CV together with its review so the two maps never diverge.
    pub(in crate::workflow) fn record_cv(
        &mut self,
        job_id: &str,
        cv: GeneratedCv,
        report: ValidationReport,
    ) {
        self.generated_cvs.insert(job_id.to_string(), cv);
        self.cv_validations.insert(
            job_id.to_string(),
            CvReview {
                report,
                approved: false,
                feedback: None,
            },
        );
    }

    pub(in crate::workflow) fn log_error(
        &mut self,
        step: ErrorStep,
        job: Option<&JobRecord>,
        message: impl Into<String>,
    ) {
        self.errors.push(ErrorRecord {
            step,
            job: job.map(|j| j.title.clone()),
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub(in crate::workflow) fn mark_failed(&mut self, job_id: &str) {
        if !self.failed_jobs.iter().any(|j| j == job_id) {
            self.failed_jobs.push(job_id.to_string());
        }
    }

    /// Returns false if the job was already recorded as submitted.
    pub(in crate::workflow) fn mark_submitted(&mut self, job_id: &str) -> bool {
        if self.submitted_applications.iter().any(|j| j == job_id) {
            return false;
        }
        self.submitted_applications.push(job_id.to_string());
        true
    }

    pub fn to_status(&self) -> WorkflowStatus {
        WorkflowStatus {
            workflow_id: self.workflow_id,
            user_id: self.user_id,
            state: self.current_state,
            mode: self.mode,
            jobs_found: self.discovered_jobs.len(),
            jobs_selected: self.selected_jobs.len(),
            cvs_generated: self.generated_cvs.len(),
            cvs_approved: self.cv_validations.values().filter(|r| r.approved).count(),
            applications_submitted: self.submitted_applications.len(),
            applications_pending_input: self.pending_inputs.len(),
            jobs_failed: self.failed_jobs.len(),
            current_job: self.current_job().map(|j| j.title.clone()),
            current_action: self.current_state.to_string(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_error: self.errors.last().map(|e| e.message.clone()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
