use std::sync::Arc;

use crate::knowledge::KnowledgeStore;
use crate::notifications::InAppNotifications;
use crate::workflow::service::WorkflowService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
    /// The same store the orchestrator's form filler reads from.
    pub knowledge: Arc<dyn KnowledgeStore>,
    /// In-app inbox; also one of the notification sinks.
    pub inbox: Arc<InAppNotifications>,
}
