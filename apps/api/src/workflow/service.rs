//! Workflow-id keyed API over the orchestrator.
//!
//! Every operation runs under a per-workflow lock: load the context, run one
//! step on it, write it back. Two requests against the same workflow never
//! interleave; different workflows run concurrently. A lock entry exists only
//! for a workflow that is in the store and only while some request holds or
//! waits on it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cv_architect::render::render_markdown;
use crate::knowledge::base::populate_from_profile;
use crate::knowledge::KnowledgeStore;
use crate::models::{JobRecord, JobSearchPreferences, UserProfile};
use crate::workflow::context::{HumanInputRequest, WorkflowContext, WorkflowStatus};
use crate::workflow::orchestrator::{HaltReason, OrchestratorError, WorkflowOrchestrator};
use crate::workflow::state::WorkflowState;
use crate::workflow::store::WorkflowStore;

#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkflow {
    pub user_id: Uuid,
    pub preferences: JobSearchPreferences,
    pub base_cv: String,
    #[serde(default)]
    pub user_profile: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub halt: HaltReason,
    pub status: WorkflowStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowJobs {
    pub discovered_jobs: Vec<JobRecord>,
    pub selected_jobs: Vec<JobRecord>,
    pub current_job_index: usize,
}

pub struct WorkflowService {
    store: Arc<dyn WorkflowStore>,
    orchestrator: WorkflowOrchestrator,
    knowledge: Arc<dyn KnowledgeStore>,
    locks: LockMap,
}

type LockMap = StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>;

/// Holds one workflow's lock; the map entry is pruned on drop once no other
/// request is holding or waiting on it.
struct WorkflowLock<'a> {
    locks: &'a LockMap,
    workflow_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WorkflowLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.workflow_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.workflow_id);
        }
    }
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        orchestrator: WorkflowOrchestrator,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            knowledge,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Creates a workflow in `Init` and seeds the knowledge store from the
    /// profile. Seeding failures are logged only.
    pub async fn create_workflow(&self, new: NewWorkflow) -> Result<WorkflowContext, OrchestratorError> {
        let ctx = WorkflowContext::new(new.user_id, new.preferences, new.base_cv, new.user_profile);

        match populate_from_profile(self.knowledge.as_ref(), ctx.user_id, &ctx.user_profile).await {
            Ok(seeded) => info!(user_id = %ctx.user_id, "Seeded {seeded} knowledge entries from profile"),
            Err(e) => warn!(user_id = %ctx.user_id, "Could not seed knowledge from profile: {e}"),
        }

        self.store.put(&ctx).await?;
        info!(
            workflow_id = %ctx.workflow_id,
            user_id = %ctx.user_id,
            "Created {:?} workflow", ctx.mode
        );
        Ok(ctx)
    }

    pub async fn get_workflow(&self, workflow_id: Uuid) -> Result<WorkflowContext, OrchestratorError> {
        self.load(workflow_id).await
    }

    pub async fn get_workflow_status(&self, workflow_id: Uuid) -> Result<WorkflowStatus, OrchestratorError> {
        Ok(self.load(workflow_id).await?.to_status())
    }

    pub async fn list_workflows(&self, user_id: Uuid) -> Result<Vec<WorkflowStatus>, OrchestratorError> {
        let found = self.store.list_by_user(user_id).await?;
        Ok(found.iter().map(WorkflowContext::to_status).collect())
    }

    pub async fn jobs(&self, workflow_id: Uuid) -> Result<WorkflowJobs, OrchestratorError> {
        let ctx = self.load(workflow_id).await?;
        Ok(WorkflowJobs {
            discovered_jobs: ctx.discovered_jobs,
            selected_jobs: ctx.selected_jobs,
            current_job_index: ctx.current_job_index,
        })
    }

    pub async fn pending_inputs(&self, workflow_id: Uuid) -> Result<Vec<HumanInputRequest>, OrchestratorError> {
        Ok(self.load(workflow_id).await?.pending_inputs)
    }

    /// The generated CV for `job_id` rendered as markdown.
    pub async fn cv_markdown(&self, workflow_id: Uuid, job_id: &str) -> Result<String, OrchestratorError> {
        let ctx = self.load(workflow_id).await?;
        ctx.generated_cvs
            .get(job_id)
            .map(render_markdown)
            .ok_or_else(|| OrchestratorError::UnknownJob {
                workflow_id,
                job_id: job_id.to_string(),
            })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Steps
    // ────────────────────────────────────────────────────────────────────────

    pub async fn search(&self, workflow_id: Uuid) -> Result<WorkflowStatus, OrchestratorError> {
        let (_lock, mut ctx) = self.lock(workflow_id).await?;
        self.orchestrator.step_search(&mut ctx).await?;
        self.save(ctx).await
    }

    pub async fn select_jobs(&self, workflow_id: Uuid, indices: &[usize]) -> Result<WorkflowStatus, OrchestratorError> {
        let (_lock, mut ctx) = self.lock(workflow_id).await?;
        self.orchestrator.step_select_jobs(&mut ctx, indices).await?;
        self.save(ctx).await
    }

    pub async fn approve_cv(
        &self,
        workflow_id: Uuid,
        job_id: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<WorkflowStatus, OrchestratorError> {
        let (_lock, mut ctx) = self.lock(workflow_id).await?;
        self.orchestrator
            .step_approve_cv(&mut ctx, job_id, approved, feedback)
            .await?;
        self.save(ctx).await
    }

    pub async fn handle_input(
        &self,
        workflow_id: Uuid,
        answers: &BTreeMap<String, String>,
    ) -> Result<WorkflowStatus, OrchestratorError> {
        let (_lock, mut ctx) = self.lock(workflow_id).await?;
        self.orchestrator.step_handle_input(&mut ctx, answers).await?;
        self.save(ctx).await
    }

    pub async fn run(&self, workflow_id: Uuid, until: Option<WorkflowState>) -> Result<RunOutcome, OrchestratorError> {
        let (_lock, mut ctx) = self.lock(workflow_id).await?;
        let halt = self.orchestrator.run_workflow(&mut ctx, until).await?;
        info!(workflow_id = %workflow_id, "Driver halted: {halt:?}");
        let status = self.save(ctx).await?;
        Ok(RunOutcome { halt, status })
    }

    pub async fn cancel(&self, workflow_id: Uuid) -> Result<WorkflowStatus, OrchestratorError> {
        let (_lock, mut ctx) = self.lock(workflow_id).await?;
        self.orchestrator.cancel(&mut ctx).await?;
        self.save(ctx).await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Helpers
    // ────────────────────────────────────────────────────────────────────────

    /// Takes the workflow's lock and loads its context under it. Unknown ids
    /// fail before any lock entry is created.
    async fn lock(&self, workflow_id: Uuid) -> Result<(WorkflowLock<'_>, WorkflowContext), OrchestratorError> {
        self.load(workflow_id).await?;

        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(workflow_id)
            .or_default()
            .clone();
        let mut held = WorkflowLock {
            locks: &self.locks,
            workflow_id,
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);

        let ctx = self.load(workflow_id).await?;
        Ok((held, ctx))
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn load(&self, workflow_id: Uuid) -> Result<WorkflowContext, OrchestratorError> {
        self.store
            .get(workflow_id)
            .await?
            .ok_or(OrchestratorError::WorkflowNotFound(workflow_id))
    }

    async fn save(&self, ctx: WorkflowContext) -> Result<WorkflowStatus, OrchestratorError> {
        self.store.put(&ctx).await?;
        Ok(ctx.to_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowSettings;
    use crate::models::ApplicationMode;
    use crate::workflow::orchestrator::test_support::{
        harness, jobs, FillerBehaviour, StubArchitect, StubDiscovery,
    };
    use crate::workflow::store::InMemoryWorkflowStore;

    fn service(discovered: usize) -> WorkflowService {
        let h = harness(
            StubDiscovery {
                jobs: jobs(discovered),
                fail: false,
            },
            StubArchitect::scoring(95.0),
            FillerBehaviour::Submit,
            WorkflowSettings::default(),
        );
        WorkflowService::new(Arc::new(InMemoryWorkflowStore::new()), h.orchestrator, h.knowledge)
    }

    fn new_workflow(mode: ApplicationMode) -> NewWorkflow {
        NewWorkflow {
            user_id: Uuid::new_v4(),
            preferences: JobSearchPreferences {
                job_titles: vec!["Data Engineer".to_string()],
                application_mode: mode,
                ..Default::default()
            },
            base_cv: "Ada Lovelace\nData Engineer".to_string(),
            user_profile: UserProfile {
                full_name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                work_authorized: Some(true),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_create_seeds_knowledge_and_persists() {
        let svc = service(3);
        let ctx = svc.create_workflow(new_workflow(ApplicationMode::Supervised)).await.unwrap();

        let status = svc.get_workflow_status(ctx.workflow_id).await.unwrap();
        assert_eq!(status.state, WorkflowState::Init);
        assert!(!svc.knowledge.entries(ctx.user_id).await.unwrap().is_empty());

        let listed = svc.list_workflows(ctx.user_id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let svc = service(3);
        let err = svc.search(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_lock_entries() {
        let svc = service(3);
        for _ in 0..1000 {
            let err = svc.search(Uuid::new_v4()).await.unwrap_err();
            assert!(matches!(err, OrchestratorError::WorkflowNotFound(_)));
        }
        assert!(svc.cancel(Uuid::new_v4()).await.is_err());
        assert_eq!(svc.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_lock_entries_are_released_after_steps() {
        let svc = service(3);
        let mut ids = Vec::new();
        for _ in 0..20 {
            let id = svc
                .create_workflow(new_workflow(ApplicationMode::Supervised))
                .await
                .unwrap()
                .workflow_id;
            svc.search(id).await.unwrap();
            // Rejected in JobsFound: the error path releases too.
            assert!(svc.approve_cv(id, "job-0", true, None).await.is_err());
            ids.push(id);
        }
        assert_eq!(svc.lock_entries(), 0);

        let (a, b) = tokio::join!(svc.select_jobs(ids[0], &[0]), svc.cancel(ids[0]));
        assert!(a.is_ok() || b.is_ok());
        assert_eq!(svc.lock_entries(), 0);
    }

    #[tokio::test]
    async fn test_supervised_flow_through_service() {
        let svc = service(3);
        let id = svc
            .create_workflow(new_workflow(ApplicationMode::Supervised))
            .await
            .unwrap()
            .workflow_id;

        let outcome = svc.run(id, None).await.unwrap();
        assert_eq!(outcome.halt, HaltReason::AwaitingUser(WorkflowState::JobsFound));
        assert_eq!(svc.jobs(id).await.unwrap().discovered_jobs.len(), 3);

        svc.select_jobs(id, &[2]).await.unwrap();
        let outcome = svc.run(id, None).await.unwrap();
        assert_eq!(outcome.status.state, WorkflowState::AwaitingUserApproval);

        let markdown = svc.cv_markdown(id, "job-2").await.unwrap();
        assert!(markdown.starts_with("# Ada Lovelace"));
        assert!(matches!(
            svc.cv_markdown(id, "job-0").await,
            Err(OrchestratorError::UnknownJob { .. })
        ));

        svc.approve_cv(id, "job-2", true, None).await.unwrap();
        let outcome = svc.run(id, None).await.unwrap();
        assert_eq!(outcome.halt, HaltReason::Terminal(WorkflowState::Complete));
        assert_eq!(outcome.status.applications_submitted, 1);
    }

    #[tokio::test]
    async fn test_racing_approvals_apply_once() {
        let svc = service(3);
        let id = svc
            .create_workflow(new_workflow(ApplicationMode::Supervised))
            .await
            .unwrap()
            .workflow_id;
        svc.search(id).await.unwrap();
        svc.select_jobs(id, &[0]).await.unwrap();
        svc.run(id, None).await.unwrap();

        let (a, b) = tokio::join!(
            svc.approve_cv(id, "job-0", true, None),
            svc.approve_cv(id, "job-0", true, None),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let loser = a.err().or(b.err()).unwrap();
        assert!(matches!(
            loser,
            OrchestratorError::WrongState { state: WorkflowState::CvApproved, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_persists_and_blocks_further_steps() {
        let svc = service(3);
        let id = svc
            .create_workflow(new_workflow(ApplicationMode::Supervised))
            .await
            .unwrap()
            .workflow_id;

        let status = svc.cancel(id).await.unwrap();
        assert_eq!(status.state, WorkflowState::Cancelled);
        assert!(matches!(
            svc.search(id).await,
            Err(OrchestratorError::WrongState { .. })
        ));
        assert!(svc.cancel(id).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_step_leaves_stored_context_untouched() {
        let svc = service(3);
        let id = svc
            .create_workflow(new_workflow(ApplicationMode::Supervised))
            .await
            .unwrap()
            .workflow_id;
        let before = svc.get_workflow(id).await.unwrap().updated_at();

        assert!(svc.approve_cv(id, "job-0", true, None).await.is_err());
        assert_eq!(svc.get_workflow(id).await.unwrap().updated_at(), before);
    }
}
