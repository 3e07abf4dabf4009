//! Editorial stages and their per-stage status.
//!
//! Stages run in a fixed total order:
//! `acquisitions → developmental → line → copy → proof → cold_read`.
//! The stage name doubles as the `stage` tag on every issue it produces.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::WorkflowError;

/// One step of the fixed editorial sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquisitions,
    Developmental,
    Line,
    Copy,
    Proof,
    ColdRead,
}

impl Stage {
    /// All stages, initial to terminal.
    pub const ORDER: [Stage; 6] = [
        Stage::Acquisitions,
        Stage::Developmental,
        Stage::Line,
        Stage::Copy,
        Stage::Proof,
        Stage::ColdRead,
    ];

    pub fn first() -> Self {
        Self::ORDER[0]
    }

    /// Position in the fixed order (0-based).
    pub fn index(self) -> usize {
        match self {
            Self::Acquisitions => 0,
            Self::Developmental => 1,
            Self::Line => 2,
            Self::Copy => 3,
            Self::Proof => 4,
            Self::ColdRead => 5,
        }
    }

    /// The stage after this one, or `None` for the terminal stage.
    pub fn next(self) -> Option<Self> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    /// Stages strictly before this one, in order.
    pub fn predecessors(self) -> &'static [Stage] {
        &Self::ORDER[..self.index()]
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Wire name, as used in issue tags and `<stage>_status` keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acquisitions => "acquisitions",
            Self::Developmental => "developmental",
            Self::Line => "line",
            Self::Copy => "copy",
            Self::Proof => "proof",
            Self::ColdRead => "cold_read",
        }
    }

    /// Reviewer role that runs this stage.
    pub fn reviewer(self) -> &'static str {
        match self {
            Self::Acquisitions => "Acquisitions Editor",
            Self::Developmental => "Developmental Editor",
            Self::Line => "Line Editor",
            Self::Copy => "Copy Editor",
            Self::Proof => "Proofreader",
            Self::ColdRead => "Cold Reader",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = WorkflowError;

    /// Accepts wire names plus the hyphenated `cold-read`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "acquisitions" => Ok(Self::Acquisitions),
            "developmental" => Ok(Self::Developmental),
            "line" => Ok(Self::Line),
            "copy" => Ok(Self::Copy),
            "proof" => Ok(Self::Proof),
            "cold_read" => Ok(Self::ColdRead),
            _ => Err(WorkflowError::InvalidStage {
                name: s.to_string(),
            }),
        }
    }
}

/// Status of a single stage within a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Skipped,
}

impl StageStatus {
    /// Completed or skipped: later stages may run.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_fixed_and_indexed() {
        for (i, stage) in Stage::ORDER.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
        assert_eq!(Stage::first(), Stage::Acquisitions);
    }

    #[test]
    fn next_walks_the_order_and_stops_at_terminal() {
        assert_eq!(Stage::Acquisitions.next(), Some(Stage::Developmental));
        assert_eq!(Stage::Proof.next(), Some(Stage::ColdRead));
        assert_eq!(Stage::ColdRead.next(), None);
        assert!(Stage::ColdRead.is_terminal());
        assert!(!Stage::Copy.is_terminal());
    }

    #[test]
    fn predecessors_exclude_the_stage_itself() {
        assert!(Stage::Acquisitions.predecessors().is_empty());
        assert_eq!(
            Stage::Copy.predecessors(),
            &[Stage::Acquisitions, Stage::Developmental, Stage::Line]
        );
    }

    #[test]
    fn parse_accepts_wire_names_and_hyphens() {
        assert_eq!("cold_read".parse::<Stage>().unwrap(), Stage::ColdRead);
        assert_eq!("Cold-Read".parse::<Stage>().unwrap(), Stage::ColdRead);
        assert_eq!(" proof ".parse::<Stage>().unwrap(), Stage::Proof);
    }

    #[test]
    fn parse_rejects_unknown_stage() {
        let err = "galley".parse::<Stage>().unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InvalidStage {
                name: "galley".into()
            }
        );
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Stage::ColdRead).unwrap();
        assert_eq!(json, "\"cold_read\"");
        let status = serde_json::to_string(&StageStatus::NotStarted).unwrap();
        assert_eq!(status, "\"not_started\"");
    }

    #[test]
    fn only_completed_and_skipped_are_settled() {
        assert!(StageStatus::Completed.is_settled());
        assert!(StageStatus::Skipped.is_settled());
        assert!(!StageStatus::InProgress.is_settled());
        assert!(!StageStatus::NotStarted.is_settled());
    }
}
