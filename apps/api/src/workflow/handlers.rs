use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::workflow::context::{HumanInputRequest, WorkflowContext, WorkflowStatus};
use crate::workflow::service::{NewWorkflow, RunOutcome, WorkflowJobs};
use crate::workflow::state::WorkflowState;

#[derive(Debug, Deserialize)]
pub struct ListWorkflowsQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SelectJobsRequest {
    #[serde(default)]
    pub job_indices: Vec<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveCvRequest {
    pub job_id: String,
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Answers keyed by the question text shown in `GET /inputs`.
#[derive(Debug, Deserialize)]
pub struct SubmitInputRequest {
    pub answers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    #[serde(default)]
    pub until: Option<WorkflowState>,
}

/// POST /api/v1/workflows
pub async fn handle_create_workflow(
    State(state): State<AppState>,
    Json(req): Json<NewWorkflow>,
) -> Result<(StatusCode, Json<WorkflowStatus>), AppError> {
    if req.base_cv.trim().is_empty() {
        return Err(AppError::Validation("base_cv cannot be empty".to_string()));
    }
    if req.preferences.job_titles.iter().all(|t| t.trim().is_empty()) {
        return Err(AppError::Validation(
            "preferences.job_titles must name at least one title".to_string(),
        ));
    }
    let ctx = state.service.create_workflow(req).await?;
    Ok((StatusCode::CREATED, Json(ctx.to_status())))
}

/// GET /api/v1/workflows?user_id=
pub async fn handle_list_workflows(
    State(state): State<AppState>,
    Query(query): Query<ListWorkflowsQuery>,
) -> Result<Json<Vec<WorkflowStatus>>, AppError> {
    Ok(Json(state.service.list_workflows(query.user_id).await?))
}

/// GET /api/v1/workflows/:id
pub async fn handle_get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<WorkflowContext>, AppError> {
    Ok(Json(state.service.get_workflow(workflow_id).await?))
}

/// GET /api/v1/workflows/:id/status
pub async fn handle_get_status(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<WorkflowStatus>, AppError> {
    Ok(Json(state.service.get_workflow_status(workflow_id).await?))
}

/// GET /api/v1/workflows/:id/jobs
pub async fn handle_get_jobs(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<WorkflowJobs>, AppError> {
    Ok(Json(state.service.jobs(workflow_id).await?))
}

/// POST /api/v1/workflows/:id/search
pub async fn handle_search(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<WorkflowStatus>, AppError> {
    Ok(Json(state.service.search(workflow_id).await?))
}

/// POST /api/v1/workflows/:id/select
pub async fn handle_select_jobs(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Json(req): Json<SelectJobsRequest>,
) -> Result<Json<WorkflowStatus>, AppError> {
    Ok(Json(
        state
            .service
            .select_jobs(workflow_id, &req.job_indices)
            .await?,
    ))
}

/// POST /api/v1/workflows/:id/cv/approve
pub async fn handle_approve_cv(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Json(req): Json<ApproveCvRequest>,
) -> Result<Json<WorkflowStatus>, AppError> {
    let feedback = req.feedback.filter(|f| !f.trim().is_empty());
    Ok(Json(
        state
            .service
            .approve_cv(workflow_id, &req.job_id, req.approved, feedback)
            .await?,
    ))
}

/// GET /api/v1/workflows/:id/cv/:job_id
pub async fn handle_get_cv(
    State(state): State<AppState>,
    Path((workflow_id, job_id)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let markdown = state.service.cv_markdown(workflow_id, &job_id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        markdown,
    ))
}

/// GET /api/v1/workflows/:id/inputs
pub async fn handle_get_inputs(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<Vec<HumanInputRequest>>, AppError> {
    Ok(Json(state.service.pending_inputs(workflow_id).await?))
}

/// POST /api/v1/workflows/:id/input
pub async fn handle_submit_input(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Json(req): Json<SubmitInputRequest>,
) -> Result<Json<WorkflowStatus>, AppError> {
    if req.answers.values().all(|a| a.trim().is_empty()) {
        return Err(AppError::Validation("answers cannot be empty".to_string()));
    }
    Ok(Json(
        state
            .service
            .handle_input(workflow_id, &req.answers)
            .await?,
    ))
}

/// POST /api/v1/workflows/:id/run?until=
pub async fn handle_run(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Query(query): Query<RunQuery>,
) -> Result<Json<RunOutcome>, AppError> {
    Ok(Json(state.service.run(workflow_id, query.until).await?))
}

/// POST /api/v1/workflows/:id/cancel
pub async fn handle_cancel(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<WorkflowStatus>, AppError> {
    Ok(Json(state.service.cancel(workflow_id).await?))
}
