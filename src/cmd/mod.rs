//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                                  |
//! |------------|---------------------------------------------------|
//! | `workflow` | `Init`, `Start`, `Status`, `Skip`, `Reset`        |
//! | `review`   | `Review`, `Issues`                                |
//! | `bible`    | `Bible extract`, `Bible show`                     |
//! | `fix`      | `Fix`, `Ignore`, `Unignore`                       |
//! | `config`   | `Config`                                          |

pub mod bible;
pub mod config;
pub mod fix;
pub mod review;
pub mod workflow;

pub use bible::{cmd_bible_extract, cmd_bible_show};
pub use config::cmd_config;
pub use fix::{cmd_fix, cmd_ignore, cmd_unignore};
pub use review::{cmd_issues, cmd_review};
pub use workflow::{cmd_init, cmd_reset, cmd_skip, cmd_start, cmd_status};

use anyhow::{Result, bail};
use std::path::Path;
use std::sync::Arc;

use quire::config::QuireConfig;
use quire::workflow::{ManagingEditor, ProjectStore, WorkflowState};

/// An initialized project: configuration, on-disk store and the in-memory
/// editor holding whatever workflows a command has loaded.
pub struct Project {
    pub config: QuireConfig,
    pub store: ProjectStore,
    pub editor: Arc<ManagingEditor>,
}

impl Project {
    /// Open the project at `project_dir`. Fails when `quire init` has not run.
    pub fn open(project_dir: &Path, verbose: bool, max_concurrency: Option<usize>) -> Result<Self> {
        let config = QuireConfig::with_cli_args(project_dir.to_path_buf(), verbose, max_concurrency)?;
        if !config.is_initialized() {
            bail!("No .quire directory found. Run 'quire init' first.");
        }
        for warning in config.validate() {
            tracing::warn!("{}", warning);
        }
        let store = ProjectStore::new(config.quire_dir.clone());
        Ok(Self {
            config,
            store,
            editor: Arc::new(ManagingEditor::new()),
        })
    }

    /// Load `manuscript_id`'s stored workflow into the editor.
    pub fn load(&self, manuscript_id: &str) -> Result<WorkflowState> {
        match self.store.load_workflow(manuscript_id)? {
            Some(state) => {
                self.editor.restore(state.clone());
                Ok(state)
            }
            None => bail!(
                "No workflow for '{}'. Run 'quire start {}' first.",
                manuscript_id,
                manuscript_id
            ),
        }
    }

    /// Write the editor's copy of `manuscript_id` back to disk.
    pub fn save(&self, manuscript_id: &str) -> Result<()> {
        if let Some(state) = self.editor.status(manuscript_id) {
            self.store.save_workflow(&state)?;
        }
        Ok(())
    }
}
