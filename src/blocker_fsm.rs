use std::fmt;
use std::str::FromStr;

use rust_fsm::*;
use serde::{Deserialize, Serialize};

use crate::error::ProjectHubError;

state_machine! {
    blocker_flow(Open)

    Open(HydrateAssigned) => Assigned,
    Open(HydrateInvestigating) => Investigating,
    Open(HydrateResolved) => Resolved,
    Open(HydrateClosed) => Closed,

    Open(Assign) => Assigned,
    Open(Investigate) => Investigating,
    Open(Resolve) => Resolved,
    Open(Close) => Closed,

    Assigned(Investigate) => Investigating,
    Assigned(Resolve) => Resolved,
    Assigned(Close) => Closed,
    Assigned(Reopen) => Open,

    Investigating(Assign) => Assigned,
    Investigating(Resolve) => Resolved,
    Investigating(Close) => Closed,
    Investigating(Reopen) => Open,

    Resolved(Close) => Closed,
    Resolved(Reopen) => Open,

    Closed(Reopen) => Open
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockerStatus {
    Open,
    Assigned,
    Investigating,
    Resolved,
    Closed,
}

impl BlockerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockerStatus::Open => "Open",
            BlockerStatus::Assigned => "Assigned",
            BlockerStatus::Investigating => "Investigating",
            BlockerStatus::Resolved => "Resolved",
            BlockerStatus::Closed => "Closed",
        }
    }

    /// Resolved and Closed blockers no longer impede their task.
    pub fn is_terminal(self) -> bool {
        matches!(self, BlockerStatus::Resolved | BlockerStatus::Closed)
    }
}

impl fmt::Display for BlockerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockerStatus {
    type Err = ProjectHubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(BlockerStatus::Open),
            "assigned" => Ok(BlockerStatus::Assigned),
            "investigating" => Ok(BlockerStatus::Investigating),
            "resolved" => Ok(BlockerStatus::Resolved),
            "closed" => Ok(BlockerStatus::Closed),
            _ => Err(ProjectHubError::Validation(format!(
                "unknown blocker status: {}",
                value.trim()
            ))),
        }
    }
}

fn hydrate(machine: &mut blocker_flow::StateMachine, state: BlockerStatus) -> Result<(), ()> {
    let input = match state {
        BlockerStatus::Open => return Ok(()),
        BlockerStatus::Assigned => blocker_flow::Input::HydrateAssigned,
        BlockerStatus::Investigating => blocker_flow::Input::HydrateInvestigating,
        BlockerStatus::Resolved => blocker_flow::Input::HydrateResolved,
        BlockerStatus::Closed => blocker_flow::Input::HydrateClosed,
    };
    machine.consume(&input).map_err(|_| ())?;
    Ok(())
}

/// Returns the target status when `current -> target` is allowed. Writing
/// the current status again is always allowed.
pub fn transition(current: BlockerStatus, target: BlockerStatus) -> Option<BlockerStatus> {
    if current == target {
        return Some(current);
    }

    let mut machine = blocker_flow::StateMachine::new();
    hydrate(&mut machine, current).ok()?;

    let input = match target {
        BlockerStatus::Open => blocker_flow::Input::Reopen,
        BlockerStatus::Assigned => blocker_flow::Input::Assign,
        BlockerStatus::Investigating => blocker_flow::Input::Investigate,
        BlockerStatus::Resolved => blocker_flow::Input::Resolve,
        BlockerStatus::Closed => blocker_flow::Input::Close,
    };

    machine.consume(&input).ok()?;
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocker_fsm_allows_happy_path() {
        assert_eq!(
            transition(BlockerStatus::Open, BlockerStatus::Assigned),
            Some(BlockerStatus::Assigned)
        );
        assert_eq!(
            transition(BlockerStatus::Assigned, BlockerStatus::Investigating),
            Some(BlockerStatus::Investigating)
        );
        assert_eq!(
            transition(BlockerStatus::Investigating, BlockerStatus::Resolved),
            Some(BlockerStatus::Resolved)
        );
        assert_eq!(
            transition(BlockerStatus::Resolved, BlockerStatus::Closed),
            Some(BlockerStatus::Closed)
        );
    }

    #[test]
    fn blocker_fsm_rejects_invalid_transition() {
        assert_eq!(
            transition(BlockerStatus::Closed, BlockerStatus::Resolved),
            None
        );
        assert_eq!(
            transition(BlockerStatus::Resolved, BlockerStatus::Assigned),
            None
        );
    }

    #[test]
    fn terminal_states_can_reopen() {
        assert_eq!(
            transition(BlockerStatus::Closed, BlockerStatus::Open),
            Some(BlockerStatus::Open)
        );
        assert_eq!(
            transition(BlockerStatus::Resolved, BlockerStatus::Open),
            Some(BlockerStatus::Open)
        );
    }

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(
            "investigating".parse::<BlockerStatus>().unwrap(),
            BlockerStatus::Investigating
        );
        assert!("blocked".parse::<BlockerStatus>().is_err());
    }
}
