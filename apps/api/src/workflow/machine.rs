//! The only code allowed to change `WorkflowContext::state()`.

use tracing::{info, warn};

use crate::workflow::context::WorkflowContext;
use crate::workflow::state::WorkflowState;

pub struct WorkflowStateMachine;

impl WorkflowStateMachine {
    pub fn can_transition(from: WorkflowState, to: WorkflowState) -> bool {
        from.allowed_targets().contains(&to)
    }

    /// Moves `ctx` to `to` if the table allows it. Rejected transitions leave
    /// `ctx` untouched and return false.
    pub fn transition(ctx: &mut WorkflowContext, to: WorkflowState) -> bool {
        let from = ctx.state();
        if !Self::can_transition(from, to) {
            warn!(
                workflow_id = %ctx.workflow_id,
                "Rejected transition {from} -> {to}"
            );
            return false;
        }
        ctx.set_state(to);
        info!(workflow_id = %ctx.workflow_id, "Transition {from} -> {to}");
        true
    }

    /// Cancels from any non-terminal state. Pending questions are dropped.
    pub fn cancel(ctx: &mut WorkflowContext) -> bool {
        let from = ctx.state();
        if from.is_terminal() {
            warn!(workflow_id = %ctx.workflow_id, "Cannot cancel workflow in {from}");
            return false;
        }
        ctx.pending_inputs.clear();
        ctx.set_state(WorkflowState::Cancelled);
        info!(workflow_id = %ctx.workflow_id, "Workflow cancelled from {from}");
        true
    }
}
