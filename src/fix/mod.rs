//! Selective fix application.
//!
//! Takes a manuscript text and the issues a human chose to fix, and returns
//! the edited text plus an audit trail. Issues are applied critical first,
//! keeping input order within a severity. Each issue edits at most one span:
//!
//! - **direct**: bible conflicts whose anchor is present and whose suggestion
//!   reads `Change to: '...'` are replaced literally, without the backend
//! - **rewrite**: otherwise a window around the anchor (or around the
//!   midpoint when the issue has no anchor) is rewritten by the backend and
//!   spliced back in place
//!
//! Nothing here fails the batch. Every issue gets a [`FixResult`].

mod replacement;
mod window;

pub use replacement::parse_change_to;
pub use window::{around, around_midpoint};

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{GenerationBackend, GenerationRequest};
use crate::errors::GenerationError;
use crate::issue::Issue;

#[derive(Debug, Clone, PartialEq)]
pub struct FixConfig {
    /// Characters on each side of the anchor.
    pub window_radius: usize,
    /// Characters on each side of the midpoint for anchorless issues.
    pub fallback_radius: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            window_radius: 200,
            fallback_radius: 1500,
            max_tokens: 1000,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixMethod {
    Direct,
    Rewrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotAppliedReason {
    /// The anchor text is not in the current text, or the text is empty.
    AnchorNotFound,
    BackendFailed,
    EmptyRewrite,
    Unchanged,
    Cancelled,
}

impl std::fmt::Display for NotAppliedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AnchorNotFound => "anchor not found",
            Self::BackendFailed => "backend failed",
            Self::EmptyRewrite => "empty rewrite",
            Self::Unchanged => "rewrite unchanged",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome for one requested issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixResult {
    pub issue_id: u64,
    pub applied: bool,
    pub method: Option<FixMethod>,
    pub reason: Option<NotAppliedReason>,
}

impl FixResult {
    fn applied(issue_id: u64, method: FixMethod) -> Self {
        Self {
            issue_id,
            applied: true,
            method: Some(method),
            reason: None,
        }
    }

    fn skipped(issue_id: u64, method: Option<FixMethod>, reason: NotAppliedReason) -> Self {
        Self {
            issue_id,
            applied: false,
            method,
            reason: Some(reason),
        }
    }
}

/// Literal before/after spans of one applied fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub issue_id: u64,
    pub description: String,
    pub before_text: String,
    pub after_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    pub edited_text: String,
    pub change_log: Vec<ChangeLogEntry>,
    /// In application order.
    pub results: Vec<FixResult>,
    pub fixes_requested: usize,
    pub fixes_applied: usize,
}

impl FixReport {
    pub fn applied_ids(&self) -> Vec<u64> {
        self.change_log.iter().map(|e| e.issue_id).collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.reason == Some(NotAppliedReason::Cancelled))
    }
}

enum Attempt {
    Applied {
        method: FixMethod,
        span: Range<usize>,
        replacement: String,
    },
    NotApplied(Option<FixMethod>, NotAppliedReason),
}

pub struct FixEngine {
    backend: Arc<dyn GenerationBackend>,
    config: FixConfig,
}

impl FixEngine {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: FixConfig) -> Self {
        Self { backend, config }
    }

    /// Apply `issues` to `text`. Never fails; see [`FixReport::results`].
    pub async fn apply(&self, text: &str, issues: &[Issue], context_id: &str) -> FixReport {
        let mut ordered: Vec<&Issue> = issues.iter().collect();
        ordered.sort_by_key(|issue| issue.severity);

        info!(context_id, requested = ordered.len(), "Applying fixes");

        let mut current = text.to_string();
        let mut change_log = Vec::new();
        let mut results = Vec::with_capacity(ordered.len());
        let mut cancelled = false;

        for issue in ordered {
            if cancelled {
                results.push(FixResult::skipped(issue.id, None, NotAppliedReason::Cancelled));
                continue;
            }

            match self.attempt(&current, issue, context_id).await {
                Attempt::Applied {
                    method,
                    span,
                    replacement,
                } => {
                    debug!(issue_id = issue.id, ?method, "Fix applied");
                    change_log.push(ChangeLogEntry {
                        issue_id: issue.id,
                        description: issue.description.clone(),
                        before_text: current[span.clone()].to_string(),
                        after_text: replacement.clone(),
                    });
                    current.replace_range(span, &replacement);
                    results.push(FixResult::applied(issue.id, method));
                }
                Attempt::NotApplied(method, reason) => {
                    debug!(issue_id = issue.id, %reason, "Fix not applied");
                    cancelled = reason == NotAppliedReason::Cancelled;
                    results.push(FixResult::skipped(issue.id, method, reason));
                }
            }
        }

        let report = FixReport {
            edited_text: current,
            fixes_requested: results.len(),
            fixes_applied: change_log.len(),
            change_log,
            results,
        };
        info!(
            context_id,
            requested = report.fixes_requested,
            applied = report.fixes_applied,
            cancelled,
            "Fix batch complete"
        );
        report
    }

    async fn attempt(&self, text: &str, issue: &Issue, context_id: &str) -> Attempt {
        let anchor = if issue.original_text.is_empty() {
            None
        } else {
            match text.find(&issue.original_text) {
                Some(start) => Some(start..start + issue.original_text.len()),
                None => {
                    return Attempt::NotApplied(None, NotAppliedReason::AnchorNotFound);
                }
            }
        };

        if issue.bible_conflict
            && let Some(ref span) = anchor
            && let Some(replacement) = parse_change_to(&issue.suggestion)
        {
            if replacement == issue.original_text {
                return Attempt::NotApplied(Some(FixMethod::Direct), NotAppliedReason::Unchanged);
            }
            return Attempt::Applied {
                method: FixMethod::Direct,
                span: span.clone(),
                replacement,
            };
        }

        let window = match anchor {
            Some(span) => around(text, span, self.config.window_radius),
            None => match around_midpoint(text, self.config.fallback_radius) {
                Some(range) => range,
                None => {
                    return Attempt::NotApplied(None, NotAppliedReason::AnchorNotFound);
                }
            },
        };

        self.rewrite(&text[window.clone()], window, issue, context_id)
            .await
    }

    async fn rewrite(
        &self,
        section: &str,
        window: Range<usize>,
        issue: &Issue,
        context_id: &str,
    ) -> Attempt {
        let request = GenerationRequest::new(build_rewrite_prompt(section, issue))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
            .with_context_id(context_id);

        let response = match self.backend.generate(request).await {
            Ok(response) => response,
            Err(GenerationError::Cancelled(_)) => {
                return Attempt::NotApplied(Some(FixMethod::Rewrite), NotAppliedReason::Cancelled);
            }
            Err(e) => {
                warn!(issue_id = issue.id, error = %e, "Rewrite failed");
                return Attempt::NotApplied(
                    Some(FixMethod::Rewrite),
                    NotAppliedReason::BackendFailed,
                );
            }
        };

        let rewritten = clean_rewrite(&response);
        if rewritten.is_empty() {
            return Attempt::NotApplied(Some(FixMethod::Rewrite), NotAppliedReason::EmptyRewrite);
        }
        if rewritten == section.trim() {
            return Attempt::NotApplied(Some(FixMethod::Rewrite), NotAppliedReason::Unchanged);
        }

        // The window edges are arbitrary; keep the whitespace that bordered it.
        let leading = &section[..section.len() - section.trim_start().len()];
        let body = &section[leading.len()..];
        let trailing = &body[body.trim_end().len()..];
        Attempt::Applied {
            method: FixMethod::Rewrite,
            span: window,
            replacement: format!("{leading}{rewritten}{trailing}"),
        }
    }
}

fn build_rewrite_prompt(section: &str, issue: &Issue) -> String {
    let target = if issue.original_text.is_empty() {
        "(not isolated)".to_string()
    } else {
        format!("\"{}\"", issue.original_text)
    };

    format!(
        r#"You are a professional editor. Fix the issue described below in the provided text segment.

## Issue

{description}

## Suggestion

{suggestion}

## Target Text

{target}

## Context Segment

{section}

## Instructions

1. Rewrite the context segment to fix the issue.
2. Preserve the author's voice and style.
3. Make only the necessary changes.
4. Return only the rewritten segment, without commentary or surrounding quotes."#,
        description = issue.description,
        suggestion = issue.suggestion,
    )
}

/// Trim whitespace and one pair of wrapping quotes.
fn clean_rewrite(response: &str) -> &str {
    let trimmed = response.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = trimmed
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner.trim();
        }
    }
    trimmed
}
