//! Bridge between the managing editor, extraction and the fix engine.
//!
//! ## Usage
//!
//! ```no_run
//! use quire::backend::CliBackend;
//! use quire::cancel::CancellationRegistry;
//! use quire::extract::ExtractionConfig;
//! use quire::fix::FixConfig;
//! use quire::pipeline::Pipeline;
//! use quire::stage::Stage;
//! use quire::workflow::ManagingEditor;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let editor = Arc::new(ManagingEditor::new());
//! let registry = CancellationRegistry::new();
//! let backend = Arc::new(CliBackend::new("claude"));
//! let pipeline = Pipeline::new(
//!     editor.clone(),
//!     registry,
//!     backend,
//!     ExtractionConfig::default(),
//!     FixConfig::default(),
//! );
//!
//! editor.start("novel-1")?;
//! let run = pipeline
//!     .run_stage("novel-1", Stage::Acquisitions, "It was a dark night.", None)
//!     .await?;
//! println!("{} issues", run.issues.len());
//! # Ok(())
//! # }
//! ```

use anyhow::anyhow;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::GenerationBackend;
use crate::cancel::CancellationRegistry;
use crate::errors::{PipelineError, WorkflowError};
use crate::extract::{ExtractionConfig, Extractor, IdAllocator};
use crate::fix::{FixConfig, FixEngine, FixReport};
use crate::issue::{self, Issue};
use crate::review::kinds_for;
use crate::stage::{Stage, StageStatus};
use crate::workflow::{ManagingEditor, WorkflowState};

/// Outcome of one successful stage run.
#[derive(Debug, Clone)]
pub struct StageRun {
    pub stage: Stage,
    pub issues: Vec<Issue>,
    /// Workflow after the stage was marked complete.
    pub state: WorkflowState,
}

pub struct Pipeline {
    editor: Arc<ManagingEditor>,
    registry: CancellationRegistry,
    extractor: Extractor,
    fixer: FixEngine,
}

impl Pipeline {
    /// `backend` should already consult `registry` (see `GuardedBackend`).
    pub fn new(
        editor: Arc<ManagingEditor>,
        registry: CancellationRegistry,
        backend: Arc<dyn GenerationBackend>,
        extraction: ExtractionConfig,
        fixes: FixConfig,
    ) -> Self {
        Self {
            editor,
            registry,
            extractor: Extractor::new(backend.clone(), extraction),
            fixer: FixEngine::new(backend, fixes),
        }
    }

    pub fn editor(&self) -> &ManagingEditor {
        &self.editor
    }

    pub fn registry(&self) -> &CancellationRegistry {
        &self.registry
    }

    /// Review `text` for `stage` and mark the stage complete.
    ///
    /// Fails before any generation call when an earlier stage is pending.
    /// On cancellation the stage goes back to the status it had before.
    pub async fn run_stage(
        &self,
        manuscript_id: &str,
        stage: Stage,
        text: &str,
        reference_notes: Option<&str>,
    ) -> Result<StageRun, PipelineError> {
        self.editor.begin(manuscript_id, stage)?;
        self.registry.reset(manuscript_id);
        info!(manuscript_id, %stage, reviewer = stage.reviewer(), "Stage run started");

        let mut ids = IdAllocator::new();
        let extracted = self
            .extractor
            .extract(
                text,
                kinds_for(stage),
                reference_notes,
                manuscript_id,
                &mut ids,
            )
            .await;

        let issues = match extracted {
            Ok(issues) => issues,
            Err(cancelled) => {
                warn!(manuscript_id, %stage, "Stage run cancelled");
                self.editor.abandon(manuscript_id, stage)?;
                return Err(cancelled.into());
            }
        };

        let state = self
            .editor
            .mark_complete(manuscript_id, stage, issues.len() as u64, 0)?;
        Ok(StageRun {
            stage,
            issues,
            state,
        })
    }

    /// Apply the open issues of `stage` whose ids are in `selected_ids`.
    ///
    /// Applied issues in `issues` are marked applied. When the stage is
    /// already complete the workflow's fix counter is bumped by the batch.
    pub async fn apply_fixes(
        &self,
        manuscript_id: &str,
        stage: Stage,
        text: &str,
        issues: &mut [Issue],
        selected_ids: &[u64],
    ) -> Result<FixReport, PipelineError> {
        let state = self
            .editor
            .status(manuscript_id)
            .ok_or_else(|| WorkflowError::NotStarted {
                manuscript_id: manuscript_id.to_string(),
            })?;

        let mut selected = Vec::with_capacity(selected_ids.len());
        for id in selected_ids {
            let found = issue::find_mut(issues, stage, *id).map_err(|e| anyhow!(e))?;
            if found.is_open() {
                selected.push(found.clone());
            } else {
                warn!(manuscript_id, issue_id = id, status = %found.status, "Issue is not open; skipping");
            }
        }

        self.registry.reset(manuscript_id);
        let report = self.fixer.apply(text, &selected, manuscript_id).await;

        for id in report.applied_ids() {
            if let Ok(applied) = issue::find_mut(issues, stage, id) {
                applied.mark_applied();
            }
        }

        if state.status(stage) == StageStatus::Completed && report.fixes_applied > 0 {
            self.editor
                .mark_complete(manuscript_id, stage, 0, report.fixes_applied as u64)?;
        }

        info!(
            manuscript_id,
            %stage,
            requested = report.fixes_requested,
            applied = report.fixes_applied,
            "Fix batch finished"
        );
        Ok(report)
    }

    /// Stop further generation calls for `manuscript_id`.
    pub fn cancel(&self, manuscript_id: &str) {
        self.registry.cancel(manuscript_id);
    }
}
