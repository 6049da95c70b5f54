// Workflow: the job-application state machine, its context, the step
// functions that drive it and the service that persists it between calls.

pub mod context;
pub mod handlers;
pub mod machine;
pub mod orchestrator;
pub mod service;
pub mod state;
pub mod store;

