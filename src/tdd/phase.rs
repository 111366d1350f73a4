//! TDD phases.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tracker::TaskStatus;

/// Position in the cycle. Phases run in declaration order and are never
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TddPhase {
    Analysis,
    Red,
    Green,
    Refactor,
    Done,
}

impl TddPhase {
    /// The phase after this one; `Done` stays `Done`.
    #[must_use]
    pub fn next(&self) -> Self {
        match self {
            TddPhase::Analysis => TddPhase::Red,
            TddPhase::Red => TddPhase::Green,
            TddPhase::Green => TddPhase::Refactor,
            TddPhase::Refactor | TddPhase::Done => TddPhase::Done,
        }
    }

    /// Task status recorded when the phase starts. Analysis leaves the task
    /// pending.
    #[must_use]
    pub fn task_status(&self) -> Option<TaskStatus> {
        match self {
            TddPhase::Analysis => None,
            TddPhase::Red => Some(TaskStatus::TddRed),
            TddPhase::Green => Some(TaskStatus::TddGreen),
            TddPhase::Refactor => Some(TaskStatus::TddRefactor),
            TddPhase::Done => Some(TaskStatus::Completed),
        }
    }

    /// Issue comment posted when the phase starts.
    #[must_use]
    pub fn start_comment(&self) -> &'static str {
        match self {
            TddPhase::Analysis => {
                "**Auto-development started**\n\n**Phase:** Analysis\n\nAnalysing requirements and planning the TDD approach."
            }
            TddPhase::Red => {
                "**TDD Phase: RED**\n\nWriting tests that should fail initially. They drive the implementation."
            }
            TddPhase::Green => {
                "**TDD Phase: GREEN**\n\nImplementing the minimal code that makes the tests pass."
            }
            TddPhase::Refactor => {
                "**TDD Phase: REFACTOR**\n\nImproving the code while keeping every test green."
            }
            TddPhase::Done => "**Development complete**",
        }
    }
}

impl fmt::Display for TddPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TddPhase::Analysis => "ANALYSIS",
            TddPhase::Red => "RED",
            TddPhase::Green => "GREEN",
            TddPhase::Refactor => "REFACTOR",
            TddPhase::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}
