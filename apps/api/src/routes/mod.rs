pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::cv_architect::handlers as cv;
use crate::knowledge::handlers as knowledge;
use crate::notifications::handlers as notifications;
use crate::state::AppState;
use crate::workflow::handlers as workflows;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Workflows
        .route(
            "/api/v1/workflows",
            get(workflows::handle_list_workflows).post(workflows::handle_create_workflow),
        )
        .route("/api/v1/workflows/:id", get(workflows::handle_get_workflow))
        .route("/api/v1/workflows/:id/status", get(workflows::handle_get_status))
        .route("/api/v1/workflows/:id/jobs", get(workflows::handle_get_jobs))
        .route("/api/v1/workflows/:id/search", post(workflows::handle_search))
        .route("/api/v1/workflows/:id/select", post(workflows::handle_select_jobs))
        .route(
            "/api/v1/workflows/:id/cv/approve",
            post(workflows::handle_approve_cv),
        )
        .route("/api/v1/workflows/:id/cv/:job_id", get(workflows::handle_get_cv))
        .route("/api/v1/workflows/:id/inputs", get(workflows::handle_get_inputs))
        .route("/api/v1/workflows/:id/input", post(workflows::handle_submit_input))
        .route("/api/v1/workflows/:id/run", post(workflows::handle_run))
        .route("/api/v1/workflows/:id/cancel", post(workflows::handle_cancel))
        // Base CV upload
        .route("/api/v1/cv/extract", post(cv::handle_extract_cv))
        // Notifications
        .route(
            "/api/v1/notifications/:user_id",
            get(notifications::handle_list_notifications),
        )
        .route(
            "/api/v1/notifications/:user_id/read-all",
            post(notifications::handle_mark_all_read),
        )
        .route(
            "/api/v1/notifications/:user_id/:notification_id/read",
            post(notifications::handle_mark_read),
        )
        // Knowledge
        .route(
            "/api/v1/knowledge/:user_id",
            get(knowledge::handle_list_knowledge).post(knowledge::handle_add_knowledge),
        )
        .with_state(state)
}
