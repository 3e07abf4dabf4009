//! The managing editor: per-manuscript workflows behind a concurrent map.
//!
//! Every check-then-mutate runs while holding the manuscript's map entry, so
//! two concurrent requests against the same manuscript cannot both pass the
//! ordering gate.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use super::state::{WorkflowReport, WorkflowState};
use crate::errors::WorkflowError;
use crate::stage::Stage;

#[derive(Debug, Default)]
pub struct ManagingEditor {
    workflows: DashMap<String, WorkflowState>,
}

impl ManagingEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a workflow at the first stage.
    pub fn start(&self, manuscript_id: &str) -> Result<WorkflowState, WorkflowError> {
        match self.workflows.entry(manuscript_id.to_string()) {
            Entry::Occupied(_) => Err(WorkflowError::AlreadyStarted {
                manuscript_id: manuscript_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                let state = WorkflowState::new(manuscript_id);
                slot.insert(state.clone());
                info!(manuscript_id, "Workflow started");
                Ok(state)
            }
        }
    }

    /// Drop a workflow so it can be started again.
    pub fn reset(&self, manuscript_id: &str) -> Option<WorkflowState> {
        let removed = self.workflows.remove(manuscript_id).map(|(_, state)| state);
        if removed.is_some() {
            info!(manuscript_id, "Workflow reset");
        }
        removed
    }

    /// Put back a workflow reconstructed from storage, replacing any in memory.
    pub fn restore(&self, state: WorkflowState) {
        debug!(manuscript_id = %state.manuscript_id, "Workflow restored");
        self.workflows.insert(state.manuscript_id.clone(), state);
    }

    /// `(true, "OK")` when every earlier stage is settled, otherwise `false`
    /// with the reason.
    pub fn can_run(&self, manuscript_id: &str, stage: Stage) -> Result<(bool, String), WorkflowError> {
        let state = self.get(manuscript_id)?;
        Ok(match state.check_can_run(stage) {
            Ok(()) => (true, "OK".to_string()),
            Err(e) => (false, e.reason()),
        })
    }

    /// Gate and mark `stage` in progress in one step.
    pub fn begin(&self, manuscript_id: &str, stage: Stage) -> Result<WorkflowState, WorkflowError> {
        self.update(manuscript_id, |state| state.begin(stage))
    }

    /// Return an in-progress stage to the status it started from.
    pub fn abandon(&self, manuscript_id: &str, stage: Stage) -> Result<WorkflowState, WorkflowError> {
        self.update(manuscript_id, |state| {
            state.abandon(stage);
            Ok(())
        })
    }

    pub fn mark_complete(
        &self,
        manuscript_id: &str,
        stage: Stage,
        issues_found: u64,
        fixes_applied: u64,
    ) -> Result<WorkflowState, WorkflowError> {
        let state = self.update(manuscript_id, |state| {
            state.complete(stage, issues_found, fixes_applied)
        })?;
        info!(
            manuscript_id,
            %stage,
            issues_found,
            fixes_applied,
            next = ?state.current_stage(),
            "Stage complete"
        );
        Ok(state)
    }

    pub fn skip(&self, manuscript_id: &str, stage: Stage) -> Result<WorkflowState, WorkflowError> {
        let state = self.update(manuscript_id, |state| state.skip(stage))?;
        info!(manuscript_id, %stage, next = ?state.current_stage(), "Stage skipped");
        Ok(state)
    }

    pub fn status(&self, manuscript_id: &str) -> Option<WorkflowState> {
        self.workflows.get(manuscript_id).map(|s| s.clone())
    }

    pub fn report(&self, manuscript_id: &str) -> Option<WorkflowReport> {
        self.workflows.get(manuscript_id).map(|s| s.report())
    }

    /// Manuscript ids with a workflow, sorted.
    pub fn manuscripts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn get(&self, manuscript_id: &str) -> Result<WorkflowState, WorkflowError> {
        self.status(manuscript_id)
            .ok_or_else(|| WorkflowError::NotStarted {
                manuscript_id: manuscript_id.to_string(),
            })
    }

    /// Apply `f` under the entry lock. On error the state is left untouched.
    fn update(
        &self,
        manuscript_id: &str,
        f: impl FnOnce(&mut WorkflowState) -> Result<(), WorkflowError>,
    ) -> Result<WorkflowState, WorkflowError> {
        let mut entry = self
            .workflows
            .get_mut(manuscript_id)
            .ok_or_else(|| WorkflowError::NotStarted {
                manuscript_id: manuscript_id.to_string(),
            })?;
        let mut next = entry.clone();
        f(&mut next)?;
        *entry = next.clone();
        Ok(next)
    }
}
