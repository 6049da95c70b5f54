//! Workflow states and the fixed transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::ApplicationMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    Searching,
    JobsFound,
    JobsSelected,
    CvGenerating,
    CvReady,
    AwaitingUserApproval,
    CvApproved,
    Applying,
    NeedsInput,
    InputReceived,
    Submitted,
    Complete,
    Failed,
    Cancelled,
}

impl WorkflowState {
    #[cfg(test)]
    pub const ALL: [WorkflowState; 15] = [
        WorkflowState::Init,
        WorkflowState::Searching,
        WorkflowState::JobsFound,
        WorkflowState::JobsSelected,
        WorkflowState::CvGenerating,
        WorkflowState::CvReady,
        WorkflowState::AwaitingUserApproval,
        WorkflowState::CvApproved,
        WorkflowState::Applying,
        WorkflowState::NeedsInput,
        WorkflowState::InputReceived,
        WorkflowState::Submitted,
        WorkflowState::Complete,
        WorkflowState::Failed,
        WorkflowState::Cancelled,
    ];

    /// The transition table. `Complete`, `Failed` and `Cancelled` have no outgoing edges,
    /// and nothing leads back to `Init`.
    pub fn allowed_targets(self) -> &'static [WorkflowState] {
        use WorkflowState::*;
        match self {
            Init => &[Searching],
            Searching => &[JobsFound, Failed],
            JobsFound => &[JobsSelected],
            JobsSelected => &[CvGenerating],
            CvGenerating => &[CvReady, Failed],
            CvReady => &[AwaitingUserApproval, CvApproved],
            AwaitingUserApproval => &[CvApproved, CvGenerating],
            CvApproved => &[Applying],
            Applying => &[NeedsInput, Submitted, Failed],
            NeedsInput => &[InputReceived],
            InputReceived => &[Applying],
            Submitted => &[CvGenerating, Complete],
            Complete | Failed | Cancelled => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Complete | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }

    /// States the driver loop cannot leave without an external call
    /// (`select_jobs`, `approve_cv` or `handle_input`).
    pub fn awaits_user(self, mode: ApplicationMode) -> bool {
        match self {
            WorkflowState::AwaitingUserApproval | WorkflowState::NeedsInput => true,
            WorkflowState::JobsFound => mode == ApplicationMode::Supervised,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Init => "init",
            WorkflowState::Searching => "searching",
            WorkflowState::JobsFound => "jobs_found",
            WorkflowState::JobsSelected => "jobs_selected",
            WorkflowState::CvGenerating => "cv_generating",
            WorkflowState::CvReady => "cv_ready",
            WorkflowState::AwaitingUserApproval => "awaiting_user_approval",
            WorkflowState::CvApproved => "cv_approved",
            WorkflowState::Applying => "applying",
            WorkflowState::NeedsInput => "needs_input",
            WorkflowState::InputReceived => "input_received",
            WorkflowState::Submitted => "submitted",
            WorkflowState::Complete => "complete",
            WorkflowState::Failed => "failed",
            WorkflowState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
