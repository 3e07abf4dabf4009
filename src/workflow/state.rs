//! Per-manuscript workflow state and its wire shape.
//!
//! `WorkflowState` keeps one [`StageStatus`] per fixed stage. The current
//! stage is never stored: it is always derived as the first stage that is
//! neither completed nor skipped, so it cannot drift from the statuses. The
//! wire shape (`WorkflowRecord`) still carries `current_stage` and one
//! `<stage>_status` key per stage for external consumers, plus the issue
//! count of each finished stage run so a re-run replaces rather than adds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::errors::WorkflowError;
use crate::stage::{Stage, StageStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WorkflowRecord", into = "WorkflowRecord")]
pub struct WorkflowState {
    pub manuscript_id: String,
    statuses: [StageStatus; 6],
    stage_issues: [u64; 6],
    // Settled status a re-run started from; restored when the re-run is abandoned.
    rerun_from: [Option<StageStatus>; 6],
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_issues_found: u64,
    pub total_fixes_applied: u64,
}

impl WorkflowState {
    /// Fresh workflow: every stage not started, `started_at = now`.
    pub fn new(manuscript_id: impl Into<String>) -> Self {
        Self {
            manuscript_id: manuscript_id.into(),
            statuses: [StageStatus::NotStarted; 6],
            stage_issues: [0; 6],
            rerun_from: [None; 6],
            started_at: Some(Utc::now()),
            completed_at: None,
            total_issues_found: 0,
            total_fixes_applied: 0,
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.statuses[stage.index()]
    }

    /// Issues counted for `stage` so far.
    pub fn issues_found(&self, stage: Stage) -> u64 {
        self.stage_issues[stage.index()]
    }

    /// The next stage eligible to run, or `None` once every stage is settled.
    pub fn current_stage(&self) -> Option<Stage> {
        Stage::ORDER
            .iter()
            .copied()
            .find(|s| !self.status(*s).is_settled())
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Every stage before `stage` must be completed or skipped.
    pub fn check_can_run(&self, stage: Stage) -> Result<(), WorkflowError> {
        match stage
            .predecessors()
            .iter()
            .copied()
            .find(|s| !self.status(*s).is_settled())
        {
            Some(blocking) => Err(WorkflowError::OutOfOrder { stage, blocking }),
            None => Ok(()),
        }
    }

    /// Mark `stage` in progress.
    ///
    /// A settled stage may be re-run unless a later stage is in progress; the
    /// settled status comes back if the re-run is abandoned.
    pub(crate) fn begin(&mut self, stage: Stage) -> Result<(), WorkflowError> {
        self.check_can_run(stage)?;
        match self.status(stage) {
            StageStatus::NotStarted => {}
            StageStatus::InProgress => return Err(self.invalid(stage, StageStatus::InProgress)),
            settled @ (StageStatus::Completed | StageStatus::Skipped) => {
                if Stage::ORDER[stage.index() + 1..]
                    .iter()
                    .any(|s| self.status(*s) == StageStatus::InProgress)
                {
                    return Err(self.invalid(stage, StageStatus::InProgress));
                }
                self.rerun_from[stage.index()] = Some(settled);
            }
        }
        self.set(stage, StageStatus::InProgress);
        Ok(())
    }

    /// in_progress → the status it started from; anything else is left alone.
    pub(crate) fn abandon(&mut self, stage: Stage) {
        if self.status(stage) == StageStatus::InProgress {
            let previous = self.rerun_from[stage.index()]
                .take()
                .unwrap_or(StageStatus::NotStarted);
            self.set(stage, previous);
        }
    }

    /// Mark `stage` completed.
    ///
    /// Finishing a run (in_progress) replaces the stage's issue count in the
    /// total. Re-marking a completed stage adds to the counters.
    pub(crate) fn complete(
        &mut self,
        stage: Stage,
        issues_found: u64,
        fixes_applied: u64,
    ) -> Result<(), WorkflowError> {
        self.check_can_run(stage)?;
        let i = stage.index();
        match self.status(stage) {
            StageStatus::Skipped => return Err(self.invalid(stage, StageStatus::Completed)),
            StageStatus::InProgress => {
                self.total_issues_found =
                    self.total_issues_found.saturating_sub(self.stage_issues[i]) + issues_found;
                self.stage_issues[i] = issues_found;
            }
            StageStatus::NotStarted | StageStatus::Completed => {
                self.total_issues_found += issues_found;
                self.stage_issues[i] += issues_found;
            }
        }
        self.rerun_from[i] = None;
        self.set(stage, StageStatus::Completed);
        self.total_fixes_applied += fixes_applied;
        self.settle();
        Ok(())
    }

    pub(crate) fn skip(&mut self, stage: Stage) -> Result<(), WorkflowError> {
        self.check_can_run(stage)?;
        if self.status(stage) == StageStatus::Completed {
            return Err(self.invalid(stage, StageStatus::Skipped));
        }
        self.set(stage, StageStatus::Skipped);
        self.settle();
        Ok(())
    }

    /// Summary for display and export.
    pub fn report(&self) -> WorkflowReport {
        let duration_hours = match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                let hours = (end - start).num_milliseconds() as f64 / 3_600_000.0;
                Some((hours * 100.0).round() / 100.0)
            }
            _ => None,
        };

        WorkflowReport {
            manuscript_id: self.manuscript_id.clone(),
            status: if self.is_complete() {
                ReportStatus::Complete
            } else {
                ReportStatus::InProgress
            },
            current_stage: self.current_stage(),
            stages: Stage::ORDER.iter().map(|s| (*s, self.status(*s))).collect(),
            total_issues_found: self.total_issues_found,
            total_fixes_applied: self.total_fixes_applied,
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_hours,
        }
    }

    fn set(&mut self, stage: Stage, status: StageStatus) {
        self.statuses[stage.index()] = status;
    }

    // completed_at is written once, when the last pending stage settles.
    fn settle(&mut self) {
        if self.current_stage().is_none() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    fn invalid(&self, stage: Stage, to: StageStatus) -> WorkflowError {
        WorkflowError::InvalidTransition {
            stage,
            from: self.status(stage).to_string(),
            to: to.to_string(),
        }
    }
}

/// Wire shape of a workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub manuscript_id: String,
    pub current_stage: Option<Stage>,
    #[serde(default)]
    pub acquisitions_status: StageStatus,
    #[serde(default)]
    pub developmental_status: StageStatus,
    #[serde(default)]
    pub line_status: StageStatus,
    #[serde(default)]
    pub copy_status: StageStatus,
    #[serde(default)]
    pub proof_status: StageStatus,
    #[serde(default)]
    pub cold_read_status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_issues_found: u64,
    #[serde(default)]
    pub total_fixes_applied: u64,
    /// Issues counted per stage; absent in records written before it existed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stage_issues: BTreeMap<Stage, u64>,
}

impl From<WorkflowState> for WorkflowRecord {
    fn from(state: WorkflowState) -> Self {
        let [
            acquisitions_status,
            developmental_status,
            line_status,
            copy_status,
            proof_status,
            cold_read_status,
        ] = state.statuses;
        let stage_issues = Stage::ORDER
            .iter()
            .map(|s| (*s, state.stage_issues[s.index()]))
            .filter(|(_, n)| *n > 0)
            .collect();
        Self {
            current_stage: state.current_stage(),
            manuscript_id: state.manuscript_id,
            acquisitions_status,
            developmental_status,
            line_status,
            copy_status,
            proof_status,
            cold_read_status,
            started_at: state.started_at,
            completed_at: state.completed_at,
            total_issues_found: state.total_issues_found,
            total_fixes_applied: state.total_fixes_applied,
            stage_issues,
        }
    }
}

impl From<WorkflowRecord> for WorkflowState {
    fn from(record: WorkflowRecord) -> Self {
        let mut state = Self {
            manuscript_id: record.manuscript_id,
            statuses: [
                record.acquisitions_status,
                record.developmental_status,
                record.line_status,
                record.copy_status,
                record.proof_status,
                record.cold_read_status,
            ],
            stage_issues: Stage::ORDER.map(|s| record.stage_issues.get(&s).copied().unwrap_or(0)),
            rerun_from: [None; 6],
            started_at: record.started_at,
            completed_at: record.completed_at,
            total_issues_found: record.total_issues_found,
            total_fixes_applied: record.total_fixes_applied,
        };
        if record.current_stage != state.current_stage() {
            warn!(
                manuscript_id = %state.manuscript_id,
                stored = ?record.current_stage,
                derived = ?state.current_stage(),
                "Stored current_stage disagrees with stage statuses; using statuses"
            );
        }
        if state.completed_at.is_none() && state.current_stage().is_none() {
            state.settle();
        }
        state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    InProgress,
    Complete,
}

/// Summary of a workflow for display and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub manuscript_id: String,
    pub status: ReportStatus,
    pub current_stage: Option<Stage>,
    pub stages: BTreeMap<Stage, StageStatus>,
    pub total_issues_found: u64,
    pub total_fixes_applied: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_hours: Option<f64>,
}
