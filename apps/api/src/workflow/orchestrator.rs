//! Step functions and the `run_workflow` driver.
//!
//! Each step advances a `WorkflowContext` by one phase. Steps return `Err`
//! only when the caller misuses them (wrong state, unknown job). Collaborator
//! failures are written into `ctx.errors` and handled by policy:
//!
//! - search failure: workflow `Failed`
//! - CV generation failure or rejection: job abandoned, next job
//! - apply failure: workflow `Failed` (there is no `Applying → CvGenerating` edge)
//!
//! Every collaborator call is bounded by `collaborator_timeout`. Notification
//! and archive failures are logged and never affect the workflow.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifacts::CvArchive;
use crate::config::WorkflowSettings;
use crate::cv_architect::render::render_markdown;
use crate::cv_architect::CvArchitect;
use crate::discovery::matching::sort_by_relevance;
use crate::discovery::DiscoveryService;
use crate::errors::ServiceError;
use crate::form_filler::{ApplicationOutcome, FormFiller, PendingQuestion};
use crate::knowledge::{AnswerSource, KnowledgeStore};
use crate::models::{ApplicationMode, JobRecord};
use crate::notifications::{Notification, NotificationSink};
use crate::workflow::context::{ErrorStep, HumanInputRequest, WorkflowContext};
use crate::workflow::machine::WorkflowStateMachine;
use crate::workflow::state::WorkflowState;
use crate::workflow::store::StoreError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("Job {job_id} is not awaiting approval in workflow {workflow_id}")]
    UnknownJob { workflow_id: Uuid, job_id: String },

    #[error("Cannot {operation} while the workflow is {state}")]
    WrongState {
        operation: &'static str,
        state: WorkflowState,
    },

    #[error("Workflow store error: {0}")]
    Store(#[from] StoreError),
}

/// Why `run_workflow` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "state", rename_all = "snake_case")]
pub enum HaltReason {
    Terminal(WorkflowState),
    /// Reached the `until` state the caller asked for.
    UntilState(WorkflowState),
    /// Needs `select_jobs`, `approve_cv` or `handle_input`.
    AwaitingUser(WorkflowState),
    /// No step is dispatched from this state.
    Unhandled(WorkflowState),
    IterationLimit,
    /// A step left both state and cursor unchanged.
    Stalled(WorkflowState),
}

/// The external services a workflow talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn DiscoveryService>,
    pub cv_architect: Arc<dyn CvArchitect>,
    pub form_filler: Arc<dyn FormFiller>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub archive: Arc<dyn CvArchive>,
}

pub struct WorkflowOrchestrator {
    collaborators: Collaborators,
    settings: WorkflowSettings,
}

impl WorkflowOrchestrator {
    pub fn new(collaborators: Collaborators, settings: WorkflowSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Steps
    // ────────────────────────────────────────────────────────────────────────

    /// `Init → Searching → JobsFound`, or `Failed` if discovery fails or
    /// finds nothing.
    pub async fn step_search(&self, ctx: &mut WorkflowContext) -> Result<(), OrchestratorError> {
        require(ctx, "search", &[WorkflowState::Init])?;
        WorkflowStateMachine::transition(ctx, WorkflowState::Searching);

        let discovery = self.collaborators.discovery.clone();
        let result = self.bounded(discovery.search(&ctx.preferences)).await;

        match result {
            // Nothing to select from, so JobsFound could never progress.
            Ok(jobs) if jobs.is_empty() => {
                warn!(workflow_id = %ctx.workflow_id, "Discovery found no matching jobs");
                self.fail(ctx, ErrorStep::Search, None, "No jobs matched the search preferences".to_string())
                    .await;
            }
            Ok(jobs) => {
                info!(workflow_id = %ctx.workflow_id, "Discovery found {} jobs", jobs.len());
                ctx.discovered_jobs = jobs;
                WorkflowStateMachine::transition(ctx, WorkflowState::JobsFound);
                let notification =
                    Notification::jobs_found(ctx.user_id, ctx.workflow_id, &ctx.discovered_jobs);
                self.notify(notification).await;
            }
            Err(e) => {
                error!(workflow_id = %ctx.workflow_id, "Job search failed: {e}");
                self.fail(ctx, ErrorStep::Search, None, format!("Job search failed: {e}"))
                    .await;
            }
        }
        Ok(())
    }

    /// Autonomous mode takes the `auto_select_limit` most relevant jobs and
    /// ignores `indices`. Supervised mode takes `discovered_jobs[i]` for each
    /// index in order, dropping repeats and out-of-range indices. An empty
    /// selection leaves the context unchanged.
    pub async fn step_select_jobs(
        &self,
        ctx: &mut WorkflowContext,
        indices: &[usize],
    ) -> Result<(), OrchestratorError> {
        require(ctx, "select jobs", &[WorkflowState::JobsFound])?;

        let selected = match ctx.mode {
            ApplicationMode::Autonomous => {
                let mut ranked = ctx.discovered_jobs.clone();
                sort_by_relevance(&mut ranked);
                ranked.truncate(self.settings.auto_select_limit);
                ranked
            }
            ApplicationMode::Supervised => {
                let mut seen = HashSet::new();
                let mut picked = vec![];
                for &i in indices {
                    match ctx.discovered_jobs.get(i) {
                        Some(job) if seen.insert(i) => picked.push(job.clone()),
                        Some(_) => {}
                        None => warn!(
                            workflow_id = %ctx.workflow_id,
                            "Dropping job index {i}: only {} jobs found",
                            ctx.discovered_jobs.len()
                        ),
                    }
                }
                picked
            }
        };

        if selected.is_empty() {
            warn!(workflow_id = %ctx.workflow_id, "No jobs selected, waiting for a selection");
            return Ok(());
        }

        info!(workflow_id = %ctx.workflow_id, "Selected {} jobs", selected.len());
        ctx.selected_jobs = selected;
        ctx.current_job_index = 0;
        WorkflowStateMachine::transition(ctx, WorkflowState::JobsSelected);
        Ok(())
    }

    /// Tailors a CV for the job at the cursor. A no-op once every selected job
    /// has been processed. On failure the job is abandoned and the cursor moves
    /// on; the state stays `CvGenerating`.
    pub async fn step_generate_cv(&self, ctx: &mut WorkflowContext) -> Result<(), OrchestratorError> {
        require(
            ctx,
            "generate a CV",
            &[
                WorkflowState::JobsSelected,
                WorkflowState::CvGenerating,
                WorkflowState::Submitted,
            ],
        )?;
        let Some(job) = ctx.current_job().cloned() else {
            return Ok(());
        };
        if ctx.state() != WorkflowState::CvGenerating {
            WorkflowStateMachine::transition(ctx, WorkflowState::CvGenerating);
        }

        let architect = self.collaborators.cv_architect.clone();
        let result = self
            .bounded(architect.create_tailored_cv(&ctx.base_cv, &job))
            .await;

        let (cv, report) = match result {
            Ok(generated) => generated,
            Err(e) => {
                error!(
                    workflow_id = %ctx.workflow_id,
                    "CV generation failed for {} at {}: {e}", job.title, job.company
                );
                ctx.log_error(ErrorStep::CvGeneration, Some(&job), e.to_string());
                ctx.mark_failed(&job.job_id);
                ctx.advance_cursor();
                return Ok(());
            }
        };

        let auto_approve = ctx.mode == ApplicationMode::Autonomous
            && architect.should_auto_approve(&cv, &report, self.settings.ats_score_threshold);
        let ats_score = cv.ats_score;
        ctx.record_cv(&job.job_id, cv, report);
        WorkflowStateMachine::transition(ctx, WorkflowState::CvReady);

        if auto_approve {
            info!(
                workflow_id = %ctx.workflow_id,
                "Auto-approved CV for {} at {} (ATS {ats_score:.0})", job.title, job.company
            );
            if let Some(review) = ctx.cv_validations.get_mut(&job.job_id) {
                review.approved = true;
            }
            WorkflowStateMachine::transition(ctx, WorkflowState::CvApproved);
            self.archive_cv(ctx, &job.job_id).await;
        } else {
            WorkflowStateMachine::transition(ctx, WorkflowState::AwaitingUserApproval);
            self.notify(Notification::cv_ready(ctx.user_id, ctx.workflow_id, &job, ats_score))
                .await;
        }
        Ok(())
    }

    /// Approval moves to `CvApproved`. Rejection abandons the job and returns
    /// to `CvGenerating` for the next one.
    pub async fn step_approve_cv(
        &self,
        ctx: &mut WorkflowContext,
        job_id: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<(), OrchestratorError> {
        require(ctx, "approve a CV", &[WorkflowState::AwaitingUserApproval])?;
        let job = match ctx.current_job() {
            Some(job) if job.job_id == job_id => job.clone(),
            _ => {
                return Err(OrchestratorError::UnknownJob {
                    workflow_id: ctx.workflow_id,
                    job_id: job_id.to_string(),
                })
            }
        };

        if let Some(review) = ctx.cv_validations.get_mut(job_id) {
            review.approved = approved;
            review.feedback = feedback;
        }

        if approved {
            info!(workflow_id = %ctx.workflow_id, "CV approved for {} at {}", job.title, job.company);
            WorkflowStateMachine::transition(ctx, WorkflowState::CvApproved);
            self.archive_cv(ctx, job_id).await;
        } else {
            info!(workflow_id = %ctx.workflow_id, "CV rejected for {} at {}", job.title, job.company);
            ctx.mark_failed(job_id);
            ctx.advance_cursor();
            WorkflowStateMachine::transition(ctx, WorkflowState::CvGenerating);
        }
        Ok(())
    }

    /// Submits the application for the current job. Accepts `CvApproved` and
    /// `InputReceived` (both move to `Applying`) and `Applying` itself.
    pub async fn step_apply(&self, ctx: &mut WorkflowContext) -> Result<(), OrchestratorError> {
        match ctx.state() {
            WorkflowState::CvApproved | WorkflowState::InputReceived => {
                WorkflowStateMachine::transition(ctx, WorkflowState::Applying);
            }
            WorkflowState::Applying => {}
            state => {
                return Err(OrchestratorError::WrongState {
                    operation: "apply",
                    state,
                })
            }
        }

        let Some(job) = ctx.current_job().cloned() else {
            self.fail(ctx, ErrorStep::Apply, None, "No job left to apply to".to_string())
                .await;
            return Ok(());
        };
        let cv = ctx.generated_cvs.get(&job.job_id).cloned();

        let filler = self.collaborators.form_filler.clone();
        let result = self
            .bounded(filler.apply(ctx.user_id, &job, &ctx.user_profile, cv.as_ref()))
            .await;

        match result {
            Ok(ApplicationOutcome::Submitted { confirmation }) => {
                info!(
                    workflow_id = %ctx.workflow_id,
                    "Submitted application to {} for {} ({confirmation})", job.company, job.title
                );
                ctx.mark_submitted(&job.job_id);
                WorkflowStateMachine::transition(ctx, WorkflowState::Submitted);
                self.notify(Notification::application_submitted(
                    ctx.user_id,
                    ctx.workflow_id,
                    &job,
                    &confirmation,
                ))
                .await;

                ctx.advance_cursor();
                if ctx.jobs_remaining() {
                    WorkflowStateMachine::transition(ctx, WorkflowState::CvGenerating);
                } else {
                    self.complete(ctx).await;
                }
            }
            Ok(ApplicationOutcome::NeedsInput { questions }) if questions.is_empty() => {
                self.fail_apply(ctx, &job, "Form filler asked for input without any question".to_string())
                    .await;
            }
            Ok(ApplicationOutcome::NeedsInput { questions }) => {
                self.request_input(ctx, &job, questions).await;
            }
            Err(e) => {
                self.fail_apply(ctx, &job, e.to_string()).await;
            }
        }
        Ok(())
    }

    /// Stores every answer in the knowledge store, then resumes the
    /// application through `InputReceived → Applying`. Questions left
    /// unanswered are asked again by the form filler.
    pub async fn step_handle_input(
        &self,
        ctx: &mut WorkflowContext,
        answers: &BTreeMap<String, String>,
    ) -> Result<(), OrchestratorError> {
        require(ctx, "handle input", &[WorkflowState::NeedsInput])?;

        for (question, answer) in answers {
            if question.trim().is_empty() || answer.trim().is_empty() {
                continue;
            }
            let knowledge = self.collaborators.knowledge.clone();
            let stored = self
                .bounded(knowledge.add_entry(
                    ctx.user_id,
                    question,
                    answer.trim(),
                    None,
                    AnswerSource::FormLearned,
                ))
                .await;
            if let Err(e) = stored {
                warn!(workflow_id = %ctx.workflow_id, "Could not store answer to '{question}': {e}");
                let job = ctx.current_job().cloned();
                ctx.log_error(
                    ErrorStep::Apply,
                    job.as_ref(),
                    format!("Could not store answer to '{question}': {e}"),
                );
            }
        }

        ctx.pending_inputs.clear();
        WorkflowStateMachine::transition(ctx, WorkflowState::InputReceived);
        WorkflowStateMachine::transition(ctx, WorkflowState::Applying);
        self.step_apply(ctx).await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Driver
    // ────────────────────────────────────────────────────────────────────────

    /// Dispatches steps until the workflow is terminal, reaches `until`, needs
    /// the user, stops making progress or hits `max_iterations`.
    pub async fn run_workflow(
        &self,
        ctx: &mut WorkflowContext,
        until: Option<WorkflowState>,
    ) -> Result<HaltReason, OrchestratorError> {
        for _ in 0..self.settings.max_iterations {
            let state = ctx.state();
            if state.is_terminal() {
                return Ok(HaltReason::Terminal(state));
            }
            if until == Some(state) {
                return Ok(HaltReason::UntilState(state));
            }
            if state.awaits_user(ctx.mode) {
                info!(workflow_id = %ctx.workflow_id, "Waiting for the user in {state}");
                return Ok(HaltReason::AwaitingUser(state));
            }

            let cursor = ctx.current_job_index;
            match state {
                WorkflowState::Init => self.step_search(ctx).await?,
                WorkflowState::JobsFound => self.step_select_jobs(ctx, &[]).await?,
                WorkflowState::JobsSelected => self.step_generate_cv(ctx).await?,
                WorkflowState::CvGenerating if !ctx.jobs_remaining() => self.exhausted(ctx).await,
                WorkflowState::CvGenerating => self.step_generate_cv(ctx).await?,
                WorkflowState::CvApproved | WorkflowState::InputReceived => self.step_apply(ctx).await?,
                WorkflowState::Submitted if !ctx.jobs_remaining() => self.complete(ctx).await,
                WorkflowState::Submitted => self.step_generate_cv(ctx).await?,
                _ => {
                    warn!(workflow_id = %ctx.workflow_id, "No step handles state {state}, halting");
                    return Ok(HaltReason::Unhandled(state));
                }
            }

            if ctx.state() == state && ctx.current_job_index == cursor {
                warn!(workflow_id = %ctx.workflow_id, "Workflow made no progress in {state}, halting");
                return Ok(HaltReason::Stalled(state));
            }
        }

        warn!(
            workflow_id = %ctx.workflow_id,
            "Iteration limit {} reached in {}", self.settings.max_iterations, ctx.state()
        );
        Ok(HaltReason::IterationLimit)
    }

    /// Cancels from any non-terminal state.
    pub async fn cancel(&self, ctx: &mut WorkflowContext) -> Result<(), OrchestratorError> {
        let state = ctx.state();
        if !WorkflowStateMachine::cancel(ctx) {
            return Err(OrchestratorError::WrongState {
                operation: "cancel",
                state,
            });
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Helpers
    // ────────────────────────────────────────────────────────────────────────

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        let limit = self.settings.collaborator_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(ServiceError::Timeout(limit)))
    }

    async fn notify(&self, notification: Notification) {
        let sink = self.collaborators.notifications.clone();
        if let Err(e) = self.bounded(sink.send(&notification)).await {
            warn!("Could not deliver notification '{}': {e}", notification.title);
        }
    }

    async fn archive_cv(&self, ctx: &WorkflowContext, job_id: &str) {
        let Some(cv) = ctx.generated_cvs.get(job_id) else {
            return;
        };
        let markdown = render_markdown(cv);
        let archive = self.collaborators.archive.clone();
        match self.bounded(archive.store(ctx.workflow_id, job_id, &markdown)).await {
            Ok(key) => info!(workflow_id = %ctx.workflow_id, "Archived CV for {job_id} as {key}"),
            Err(e) => warn!(workflow_id = %ctx.workflow_id, "Could not archive CV for {job_id}: {e}"),
        }
    }

    /// Records the error and moves to `Failed`.
    async fn fail(
        &self,
        ctx: &mut WorkflowContext,
        step: ErrorStep,
        job: Option<&JobRecord>,
        message: String,
    ) {
        ctx.log_error(step, job, message.clone());
        WorkflowStateMachine::transition(ctx, WorkflowState::Failed);
        self.notify(Notification::error(ctx.user_id, ctx.workflow_id, &message))
            .await;
    }

    async fn fail_apply(&self, ctx: &mut WorkflowContext, job: &JobRecord, message: String) {
        error!(
            workflow_id = %ctx.workflow_id,
            "Application to {} for {} failed: {message}", job.company, job.title
        );
        ctx.mark_failed(&job.job_id);
        self.fail(ctx, ErrorStep::Apply, Some(job), message).await;
    }

    async fn request_input(
        &self,
        ctx: &mut WorkflowContext,
        job: &JobRecord,
        questions: Vec<PendingQuestion>,
    ) {
        let created_at = Utc::now();
        let timeout_at = chrono::Duration::from_std(self.settings.user_response_timeout)
            .ok()
            .map(|wait| created_at + wait);

        let workflow_id = ctx.workflow_id;
        ctx.pending_inputs = questions
            .into_iter()
            .map(|q| HumanInputRequest {
                workflow_id,
                job_id: job.job_id.clone(),
                company: job.company.clone(),
                question: q.question,
                field_type: q.field_type.as_str().to_string(),
                options: q.options,
                context: q.context,
                created_at,
                timeout_at,
            })
            .collect();
        info!(
            workflow_id = %ctx.workflow_id,
            "{} question(s) for {} need the user", ctx.pending_inputs.len(), job.company
        );
        WorkflowStateMachine::transition(ctx, WorkflowState::NeedsInput);

        let asked: Vec<String> = ctx.pending_inputs.iter().map(|p| p.question.clone()).collect();
        self.notify(Notification::input_needed(
            ctx.user_id,
            ctx.workflow_id,
            &job.company,
            &asked,
        ))
        .await;
    }

    /// `Submitted → Complete`.
    async fn complete(&self, ctx: &mut WorkflowContext) {
        if WorkflowStateMachine::transition(ctx, WorkflowState::Complete) {
            info!(
                workflow_id = %ctx.workflow_id,
                "Workflow complete: {} of {} applications submitted",
                ctx.submitted_applications.len(),
                ctx.selected_jobs.len()
            );
            self.notify(Notification::workflow_complete(
                ctx.user_id,
                ctx.workflow_id,
                ctx.submitted_applications.len(),
                ctx.selected_jobs.len(),
            ))
            .await;
        }
    }

    /// `CvGenerating` with no job left: the last job failed or was rejected.
    async fn exhausted(&self, ctx: &mut WorkflowContext) {
        let submitted = ctx.submitted_applications.len();
        let total = ctx.selected_jobs.len();
        ctx.log_error(
            ErrorStep::Workflow,
            None,
            format!(
                "No selected jobs left: {submitted} of {total} submitted, {} abandoned",
                ctx.failed_jobs.len()
            ),
        );
        WorkflowStateMachine::transition(ctx, WorkflowState::Failed);
        self.notify(Notification::workflow_complete(
            ctx.user_id,
            ctx.workflow_id,
            submitted,
            total,
        ))
        .await;
    }
}

fn require(
    ctx: &WorkflowContext,
    operation: &'static str,
    allowed: &[WorkflowState],
) -> Result<(), OrchestratorError> {
    if allowed.contains(&ctx.state()) {
        Ok(())
    } else {
        Err(OrchestratorError::WrongState {
            operation,
            state: ctx.state(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::test_support::*;
    use super::*;
    use crate::artifacts::cv_key;
    use crate::notifications::NotificationKind;
    use crate::workflow::context::test_support::context;

    fn selected(mode: ApplicationMode, n: usize) -> WorkflowContext {
        let mut ctx = context(mode);
        ctx.discovered_jobs = jobs(n);
        ctx.selected_jobs = jobs(n);
        ctx.set_state(WorkflowState::JobsSelected);
        ctx
    }

    // ── search ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_search_stores_jobs_and_notifies() {
        let h = default_harness(3);
        let mut ctx = context(ApplicationMode::Supervised);

        h.orchestrator.step_search(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::JobsFound);
        assert_eq!(ctx.discovered_jobs.len(), 3);
        let inbox = h.inbox.list(ctx.user_id, false, 10).await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, "Jobs Found");
    }

    #[tokio::test]
    async fn test_search_failure_is_terminal() {
        let h = harness(
            StubDiscovery { jobs: vec![], fail: true },
            StubArchitect::scoring(95.0),
            FillerBehaviour::Submit,
            WorkflowSettings::default(),
        );
        let mut ctx = context(ApplicationMode::Supervised);

        h.orchestrator.step_search(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::Failed);
        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors[0].step, ErrorStep::Search);
        assert!(ctx.errors[0].message.contains("board unreachable"));
    }

    #[tokio::test]
    async fn test_search_with_no_results_fails() {
        let h = default_harness(0);
        let mut ctx = context(ApplicationMode::Autonomous);
        h.orchestrator.step_search(&mut ctx).await.unwrap();
        assert_eq!(ctx.state(), WorkflowState::Failed);
        assert_eq!(ctx.errors[0].step, ErrorStep::Search);
        assert!(ctx.errors[0].message.contains("No jobs matched"));
        assert!(ctx.discovered_jobs.is_empty());
    }

    #[tokio::test]
    async fn test_search_outside_init_is_rejected() {
        let h = default_harness(3);
        let mut ctx = context(ApplicationMode::Supervised);
        ctx.set_state(WorkflowState::JobsFound);
        let err = h.orchestrator.step_search(&mut ctx).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::WrongState { operation: "search", .. }));
        assert_eq!(ctx.state(), WorkflowState::JobsFound);
    }

    // ── selection ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_autonomous_selection_takes_top_ten_by_relevance() {
        let h = default_harness(0);
        let mut ctx = context(ApplicationMode::Autonomous);
        ctx.discovered_jobs = jobs(15);
        ctx.set_state(WorkflowState::JobsFound);

        h.orchestrator.step_select_jobs(&mut ctx, &[]).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::JobsSelected);
        assert_eq!(ctx.selected_jobs.len(), 10);
        // job(n) has relevance 50 + n
        assert_eq!(ctx.selected_jobs[0].job_id, "job-14");
        assert_eq!(ctx.selected_jobs[9].job_id, "job-5");
    }

    #[tokio::test]
    async fn test_autonomous_selection_takes_all_when_few() {
        let h = default_harness(0);
        let mut ctx = context(ApplicationMode::Autonomous);
        ctx.discovered_jobs = jobs(4);
        ctx.set_state(WorkflowState::JobsFound);

        h.orchestrator.step_select_jobs(&mut ctx, &[0]).await.unwrap();
        assert_eq!(ctx.selected_jobs.len(), 4);
    }

    #[tokio::test]
    async fn test_supervised_selection_drops_out_of_range_indices() {
        let h = default_harness(0);
        let mut ctx = context(ApplicationMode::Supervised);
        ctx.discovered_jobs = jobs(3);
        ctx.set_state(WorkflowState::JobsFound);

        h.orchestrator
            .step_select_jobs(&mut ctx, &[0, 2, 99])
            .await
            .unwrap();

        assert_eq!(ctx.state(), WorkflowState::JobsSelected);
        let ids: Vec<&str> = ctx.selected_jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["job-0", "job-2"]);
    }

    #[tokio::test]
    async fn test_supervised_selection_ignores_repeated_indices() {
        let h = default_harness(0);
        let mut ctx = context(ApplicationMode::Supervised);
        ctx.discovered_jobs = jobs(3);
        ctx.set_state(WorkflowState::JobsFound);

        h.orchestrator.step_select_jobs(&mut ctx, &[1, 1, 0]).await.unwrap();
        let ids: Vec<&str> = ctx.selected_jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["job-1", "job-0"]);
    }

    #[tokio::test]
    async fn test_empty_supervised_selection_changes_nothing() {
        let h = default_harness(0);
        let mut ctx = context(ApplicationMode::Supervised);
        ctx.discovered_jobs = jobs(3);
        ctx.set_state(WorkflowState::JobsFound);
        let before = ctx.updated_at();

        h.orchestrator.step_select_jobs(&mut ctx, &[]).await.unwrap();
        h.orchestrator.step_select_jobs(&mut ctx, &[7, 8]).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::JobsFound);
        assert!(ctx.selected_jobs.is_empty());
        assert_eq!(ctx.updated_at(), before);
    }

    // ── CV generation and approval ──────────────────────────────────────────

    #[tokio::test]
    async fn test_supervised_generation_waits_for_approval() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Supervised, 2);

        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::AwaitingUserApproval);
        assert!(ctx.generated_cvs.contains_key("job-0"));
        assert!(!ctx.cv_validations["job-0"].approved);
        let inbox = h.inbox.list(ctx.user_id, false, 10).await;
        assert_eq!(inbox.last().unwrap().title, "CV Ready for Review");
        assert_eq!(inbox.last().unwrap().kind, NotificationKind::ActionRequired);
    }

    #[tokio::test]
    async fn test_autonomous_generation_auto_approves_and_archives() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Autonomous, 2);

        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::CvApproved);
        assert!(ctx.cv_validations["job-0"].approved);
        let archived = h.archive.get(&cv_key(ctx.workflow_id, "job-0")).await;
        assert!(archived.unwrap().starts_with("# Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_autonomous_below_threshold_asks_the_user() {
        let h = harness(
            StubDiscovery { jobs: vec![], fail: false },
            StubArchitect::scoring(70.0),
            FillerBehaviour::Submit,
            WorkflowSettings::default(),
        );
        let mut ctx = selected(ApplicationMode::Autonomous, 1);

        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();
        assert_eq!(ctx.state(), WorkflowState::AwaitingUserApproval);
    }

    #[tokio::test]
    async fn test_generation_failure_skips_the_job() {
        let mut architect = StubArchitect::scoring(95.0);
        architect.fail_for = vec!["job-0".to_string()];
        let h = harness(
            StubDiscovery { jobs: vec![], fail: false },
            architect,
            FillerBehaviour::Submit,
            WorkflowSettings::default(),
        );
        let mut ctx = selected(ApplicationMode::Supervised, 2);

        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::CvGenerating);
        assert_eq!(ctx.current_job_index, 1);
        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors[0].step, ErrorStep::CvGeneration);
        assert_eq!(ctx.errors[0].job.as_deref(), Some("Data Engineer 0"));
        assert_eq!(ctx.failed_jobs, vec!["job-0".to_string()]);
        assert!(ctx.generated_cvs.is_empty());
    }

    #[tokio::test]
    async fn test_generation_with_no_job_left_is_a_no_op() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Supervised, 1);
        ctx.set_state(WorkflowState::CvGenerating);
        ctx.advance_cursor();

        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();
        assert_eq!(ctx.state(), WorkflowState::CvGenerating);
        assert_eq!(h.architect.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejection_moves_to_next_job() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Supervised, 2);
        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        h.orchestrator
            .step_approve_cv(&mut ctx, "job-0", false, Some("x".to_string()))
            .await
            .unwrap();

        assert_eq!(ctx.state(), WorkflowState::CvGenerating);
        assert_eq!(ctx.current_job_index, 1);
        assert_eq!(ctx.cv_validations["job-0"].feedback.as_deref(), Some("x"));
        assert!(!ctx.cv_validations["job-0"].approved);
        assert_eq!(ctx.failed_jobs, vec!["job-0".to_string()]);
    }

    #[tokio::test]
    async fn test_approval_of_wrong_job_is_rejected() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Supervised, 2);
        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        let err = h
            .orchestrator
            .step_approve_cv(&mut ctx, "job-1", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownJob { .. }));
        assert_eq!(ctx.state(), WorkflowState::AwaitingUserApproval);
    }

    #[tokio::test]
    async fn test_approval_outside_review_is_rejected() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Supervised, 2);
        let err = h
            .orchestrator
            .step_approve_cv(&mut ctx, "job-0", true, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::WrongState { state: WorkflowState::JobsSelected, .. }
        ));
    }

    // ── apply ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_apply_submits_and_moves_on() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Autonomous, 2);
        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        h.orchestrator.step_apply(&mut ctx).await.unwrap();

        assert_eq!(ctx.submitted_applications, vec!["job-0".to_string()]);
        assert_eq!(ctx.current_job_index, 1);
        assert_eq!(ctx.state(), WorkflowState::CvGenerating);
    }

    #[tokio::test]
    async fn test_apply_to_last_job_completes() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Autonomous, 1);
        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        h.orchestrator.step_apply(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::Complete);
        let inbox = h.inbox.list(ctx.user_id, false, 10).await;
        assert_eq!(inbox.last().unwrap().title, "Job Applications Complete");
    }

    #[tokio::test]
    async fn test_apply_failure_is_terminal() {
        let h = harness(
            StubDiscovery { jobs: vec![], fail: false },
            StubArchitect::scoring(95.0),
            FillerBehaviour::Fail,
            WorkflowSettings::default(),
        );
        let mut ctx = selected(ApplicationMode::Autonomous, 2);
        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        h.orchestrator.step_apply(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::Failed);
        assert_eq!(ctx.errors.last().unwrap().step, ErrorStep::Apply);
        assert_eq!(ctx.failed_jobs, vec!["job-0".to_string()]);
        assert!(ctx.submitted_applications.is_empty());
    }

    #[tokio::test]
    async fn test_apply_outside_approved_is_rejected() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Autonomous, 1);
        let err = h.orchestrator.step_apply(&mut ctx).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::WrongState { operation: "apply", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_form_filler_times_out() {
        let settings = WorkflowSettings {
            collaborator_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let h = harness(
            StubDiscovery { jobs: vec![], fail: false },
            StubArchitect::scoring(95.0),
            FillerBehaviour::Hang,
            settings,
        );
        let mut ctx = selected(ApplicationMode::Autonomous, 1);
        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();

        h.orchestrator.step_apply(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::Failed);
        assert_eq!(ctx.errors.last().unwrap().message, "Timed out after 5s");
    }

    // ── human input ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_unanswered_question_pauses_then_resumes() {
        let question = "Why do you want to work here?".to_string();
        let h = harness(
            StubDiscovery { jobs: vec![], fail: false },
            StubArchitect::scoring(95.0),
            FillerBehaviour::AskOnce {
                question: question.clone(),
            },
            WorkflowSettings::default(),
        );
        let mut ctx = selected(ApplicationMode::Autonomous, 1);
        h.orchestrator.step_generate_cv(&mut ctx).await.unwrap();
        h.orchestrator.step_apply(&mut ctx).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::NeedsInput);
        assert_eq!(ctx.pending_inputs.len(), 1);
        let pending = &ctx.pending_inputs[0];
        assert_eq!(pending.question, question);
        assert_eq!(pending.field_type, "textarea");
        assert_eq!(pending.job_id, "job-0");
        let wait = pending.timeout_at.unwrap() - pending.created_at;
        assert_eq!(wait, chrono::Duration::hours(48));
        assert_eq!(
            h.orchestrator.run_workflow(&mut ctx, None).await.unwrap(),
            HaltReason::AwaitingUser(WorkflowState::NeedsInput)
        );

        let answers = BTreeMap::from([(question.clone(), "The mission.".to_string())]);
        h.orchestrator.step_handle_input(&mut ctx, &answers).await.unwrap();

        assert_eq!(ctx.state(), WorkflowState::Complete);
        assert!(ctx.pending_inputs.is_empty());
        assert_eq!(ctx.submitted_applications, vec!["job-0".to_string()]);
        let learned = h.knowledge.entries(ctx.user_id).await.unwrap();
        assert_eq!(learned.len(), 1);
        assert_eq!(learned[0].source, AnswerSource::FormLearned);
    }

    #[tokio::test]
    async fn test_handle_input_outside_needs_input_is_rejected() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Supervised, 1);
        let err = h
            .orchestrator
            .step_handle_input(&mut ctx, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::WrongState { .. }));
    }

    // ── driver ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_supervised_end_to_end() {
        let h = default_harness(3);
        let mut ctx = context(ApplicationMode::Supervised);

        h.orchestrator.step_search(&mut ctx).await.unwrap();
        assert_eq!(ctx.state(), WorkflowState::JobsFound);
        assert_eq!(ctx.discovered_jobs.len(), 3);

        h.orchestrator.step_select_jobs(&mut ctx, &[0, 1]).await.unwrap();
        assert_eq!(ctx.state(), WorkflowState::JobsSelected);
        assert_eq!(ctx.selected_jobs.len(), 2);

        let halt = h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();
        assert_eq!(halt, HaltReason::AwaitingUser(WorkflowState::AwaitingUserApproval));

        for _ in 0..2 {
            let job_id = ctx.current_job().unwrap().job_id.clone();
            h.orchestrator
                .step_approve_cv(&mut ctx, &job_id, true, None)
                .await
                .unwrap();
            h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();
        }

        assert_eq!(ctx.state(), WorkflowState::Complete);
        assert_eq!(ctx.submitted_applications.len(), 2);
        assert_eq!(h.filler.applied.lock().await.len(), 2);
        assert!(ctx.errors.is_empty());
    }

    #[tokio::test]
    async fn test_autonomous_runs_to_completion_unattended() {
        let h = default_harness(3);
        let mut ctx = context(ApplicationMode::Autonomous);

        let halt = h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();

        assert_eq!(halt, HaltReason::Terminal(WorkflowState::Complete));
        assert_eq!(ctx.submitted_applications.len(), 3);
        assert_eq!(ctx.to_status().cvs_approved, 3);
    }

    #[tokio::test]
    async fn test_supervised_driver_waits_for_selection() {
        let h = default_harness(3);
        let mut ctx = context(ApplicationMode::Supervised);
        let halt = h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();
        assert_eq!(halt, HaltReason::AwaitingUser(WorkflowState::JobsFound));
    }

    #[tokio::test]
    async fn test_until_state_stops_early() {
        let h = default_harness(3);
        let mut ctx = context(ApplicationMode::Autonomous);
        let halt = h
            .orchestrator
            .run_workflow(&mut ctx, Some(WorkflowState::JobsSelected))
            .await
            .unwrap();
        assert_eq!(halt, HaltReason::UntilState(WorkflowState::JobsSelected));
        assert!(ctx.generated_cvs.is_empty());
    }

    #[tokio::test]
    async fn test_driver_halts_on_unhandled_state() {
        let h = default_harness(0);
        let mut ctx = context(ApplicationMode::Supervised);
        ctx.set_state(WorkflowState::CvReady);
        let halt = h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();
        assert_eq!(halt, HaltReason::Unhandled(WorkflowState::CvReady));
    }

    #[tokio::test]
    async fn test_driver_stops_at_iteration_ceiling() {
        let settings = WorkflowSettings {
            max_iterations: 20,
            ..Default::default()
        };
        let h = harness(
            StubDiscovery { jobs: vec![], fail: false },
            StubArchitect::scoring(95.0),
            FillerBehaviour::Submit,
            settings,
        );
        let mut ctx = selected(ApplicationMode::Autonomous, 300);

        let halt = h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();

        assert_eq!(halt, HaltReason::IterationLimit);
        assert!(!ctx.state().is_terminal());
        // one generate and one apply per job
        assert_eq!(ctx.submitted_applications.len(), 10);
    }

    #[tokio::test]
    async fn test_every_generation_failing_ends_in_failed() {
        let mut architect = StubArchitect::scoring(95.0);
        architect.fail_for = vec!["*".to_string()];
        let h = harness(
            StubDiscovery { jobs: vec![], fail: false },
            architect,
            FillerBehaviour::Submit,
            WorkflowSettings::default(),
        );
        let mut ctx = selected(ApplicationMode::Autonomous, 3);

        let halt = h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();

        assert_eq!(halt, HaltReason::Terminal(WorkflowState::Failed));
        assert_eq!(ctx.current_job_index, 3);
        assert_eq!(ctx.failed_jobs.len(), 3);
        let last = ctx.errors.last().unwrap();
        assert_eq!(last.step, ErrorStep::Workflow);
        assert!(last.message.contains("0 of 3 submitted"));
    }

    #[tokio::test]
    async fn test_generation_failures_beyond_ceiling_still_terminate() {
        let mut architect = StubArchitect::scoring(95.0);
        architect.fail_for = vec!["*".to_string()];
        let h = harness(
            StubDiscovery { jobs: vec![], fail: false },
            architect,
            FillerBehaviour::Submit,
            WorkflowSettings::default(),
        );
        let mut ctx = selected(ApplicationMode::Autonomous, 250);

        let halt = h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();

        assert_eq!(halt, HaltReason::IterationLimit);
        assert_eq!(ctx.current_job_index, 100);
    }

    #[tokio::test]
    async fn test_autonomous_with_nothing_discovered_stalls() {
        let h = default_harness(0);
        let mut ctx = context(ApplicationMode::Autonomous);
        ctx.set_state(WorkflowState::JobsFound);
        let halt = h.orchestrator.run_workflow(&mut ctx, None).await.unwrap();
        assert_eq!(halt, HaltReason::Stalled(WorkflowState::JobsFound));
    }

    #[tokio::test]
    async fn test_cancel() {
        let h = default_harness(0);
        let mut ctx = selected(ApplicationMode::Supervised, 1);
        h.orchestrator.cancel(&mut ctx).await.unwrap();
        assert_eq!(ctx.state(), WorkflowState::Cancelled);

        let err = h.orchestrator.cancel(&mut ctx).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::WrongState { operation: "cancel", state: WorkflowState::Cancelled }
        ));
    }

    #[test]
    fn test_halt_reason_wire_format() {
        let json = serde_json::to_value(HaltReason::AwaitingUser(WorkflowState::NeedsInput)).unwrap();
        assert_eq!(json, serde_json::json!({"reason": "awaiting_user", "state": "needs_input"}));
        let json = serde_json::to_value(HaltReason::IterationLimit).unwrap();
        assert_eq!(json, serde_json::json!({"reason": "iteration_limit"}));
    }
}
