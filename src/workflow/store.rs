//! On-disk project state under `.quire/`.
//!
//! ```text
//! .quire/
//!   quire.toml
//!   workflows/<manuscript_id>.json
//!   issues/<manuscript_id>/<stage>.json
//!   changes/<manuscript_id>/<stage>-<timestamp>.json
//!   bible/<manuscript_id>.json
//!   usage/<manuscript_id>.json
//! ```
//!
//! Every write goes to a temporary sibling first and is renamed into place.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use super::state::WorkflowState;
use crate::backend::TokenUsage;
use crate::bible::StyleSheet;
use crate::fix::FixReport;
use crate::issue::Issue;
use crate::stage::Stage;

pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    /// `root` is the `.quire` directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory skeleton.
    pub fn init(&self) -> Result<()> {
        for dir in ["workflows", "issues", "changes"] {
            let path = self.root.join(dir);
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
        }
        Ok(())
    }

    pub fn save_workflow(&self, state: &WorkflowState) -> Result<()> {
        let path = self.workflow_path(&state.manuscript_id)?;
        write_json(&path, state)
    }

    pub fn load_workflow(&self, manuscript_id: &str) -> Result<Option<WorkflowState>> {
        read_json(&self.workflow_path(manuscript_id)?)
    }

    /// Remove a workflow together with its stored issues and change logs.
    /// Returns whether anything was removed.
    pub fn remove_workflow(&self, manuscript_id: &str) -> Result<bool> {
        let id = safe_id(manuscript_id)?;
        let mut removed = false;

        let path = self.workflow_path(id)?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            removed = true;
        }
        for dir in ["issues", "changes"] {
            let path = self.root.join(dir).join(id);
            if path.exists() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed = true;
            }
        }
        for path in [self.bible_path(id)?, self.usage_path(id)?] {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed = true;
            }
        }
        Ok(removed)
    }

    /// Every stored workflow, sorted by manuscript id.
    pub fn load_all_workflows(&self) -> Result<Vec<WorkflowState>> {
        let dir = self.root.join("workflows");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut states = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(state) = read_json::<WorkflowState>(&path)?
            {
                states.push(state);
            }
        }
        states.sort_by(|a, b| a.manuscript_id.cmp(&b.manuscript_id));
        Ok(states)
    }

    pub fn save_issues(&self, manuscript_id: &str, stage: Stage, issues: &[Issue]) -> Result<()> {
        write_json(&self.issues_path(manuscript_id, stage)?, &issues)
    }

    /// Stored issues for a stage; empty when the stage has not been reviewed.
    pub fn load_issues(&self, manuscript_id: &str, stage: Stage) -> Result<Vec<Issue>> {
        Ok(read_json(&self.issues_path(manuscript_id, stage)?)?.unwrap_or_default())
    }

    /// Persist a fix batch's report; returns the file written.
    pub fn save_change_log(
        &self,
        manuscript_id: &str,
        stage: Stage,
        report: &FixReport,
    ) -> Result<PathBuf> {
        let dir = self.root.join("changes").join(safe_id(manuscript_id)?);
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = dir.join(format!("{}-{}.json", stage, stamp));
        write_json(&path, report)?;
        Ok(path)
    }

    pub fn save_bible(&self, sheet: &StyleSheet) -> Result<()> {
        write_json(&self.bible_path(&sheet.manuscript_id)?, sheet)
    }

    pub fn load_bible(&self, manuscript_id: &str) -> Result<Option<StyleSheet>> {
        read_json(&self.bible_path(manuscript_id)?)
    }

    /// Token usage accumulated over every run for a manuscript.
    pub fn load_usage(&self, manuscript_id: &str) -> Result<TokenUsage> {
        Ok(read_json(&self.usage_path(manuscript_id)?)?.unwrap_or_default())
    }

    /// Add one run's usage to the stored total and return the new total.
    pub fn record_usage(&self, manuscript_id: &str, usage: &TokenUsage) -> Result<TokenUsage> {
        let mut total = self.load_usage(manuscript_id)?;
        if usage.is_empty() {
            return Ok(total);
        }
        total.add(usage);
        write_json(&self.usage_path(manuscript_id)?, &total)?;
        Ok(total)
    }

    fn bible_path(&self, manuscript_id: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join("bible")
            .join(format!("{}.json", safe_id(manuscript_id)?)))
    }

    fn usage_path(&self, manuscript_id: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join("usage")
            .join(format!("{}.json", safe_id(manuscript_id)?)))
    }

    fn workflow_path(&self, manuscript_id: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join("workflows")
            .join(format!("{}.json", safe_id(manuscript_id)?)))
    }

    fn issues_path(&self, manuscript_id: &str, stage: Stage) -> Result<PathBuf> {
        Ok(self
            .root
            .join("issues")
            .join(safe_id(manuscript_id)?)
            .join(format!("{}.json", stage)))
    }
}

/// Manuscript ids become file names; keep them to one plain path component.
fn safe_id(manuscript_id: &str) -> Result<&str> {
    let valid = !manuscript_id.is_empty()
        && manuscript_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !manuscript_id.starts_with('.');
    if !valid {
        bail!(
            "Invalid manuscript id '{}': use letters, digits, '-', '_' or '.'",
            manuscript_id
        );
    }
    Ok(manuscript_id)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}
