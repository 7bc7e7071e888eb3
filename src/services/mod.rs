pub mod blockers;
pub mod deadlines;
pub mod stage_approvals;
pub mod tasks;

pub use blockers::{BlockerPatch, BlockerService};
pub use deadlines::StageDeadlineJob;
pub use stage_approvals::{StageApprovalService, StageTransition, TransitionOutcome};
pub use tasks::TaskService;
