//! Issue records shared by every reviewer and the fix engine.
//!
//! ## Types
//!
//! - [`Severity`]: `critical | major | minor`, ordered most to least severe
//! - [`IssueStatus`]: `open | applied | ignored`
//! - [`Issue`]: a single finding against a manuscript
//! - [`IssueSummary`]: counts over a list of issues
//!
//! ## Example
//!
//! ```
//! use quire::issue::{Issue, Severity};
//! use quire::stage::Stage;
//!
//! let issue = Issue::new(1, Stage::Proof, Severity::Minor, "typo")
//!     .with_original_text("recieved")
//!     .with_suggestion("Change to: 'received'");
//!
//! assert_eq!(issue.original_text, "recieved");
//! assert!(issue.is_open());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::IssueError;
use crate::stage::Stage;

/// Severity of an issue.
///
/// Ordered from most to least severe, so sorting by severity puts critical
/// issues first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    #[default]
    Minor,
}

impl Severity {
    /// Lenient parse used at the extraction boundary. Unknown labels yield `None`.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "blocker" | "severe" => Some(Self::Critical),
            "major" | "high" | "important" => Some(Self::Major),
            "minor" | "low" | "trivial" => Some(Self::Minor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an issue. Extraction always produces `Open`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    #[default]
    Open,
    Applied,
    Ignored,
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Applied => "applied",
            Self::Ignored => "ignored",
        };
        f.write_str(s)
    }
}

/// A single finding produced by a reviewer stage.
///
/// Every field is always present on the wire; extraction fills placeholders
/// for anything the backend left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub stage: Stage,
    pub severity: Severity,
    pub category: String,
    /// Advisory locator ("Chapter 3, paragraph 5"), not an offset.
    pub location: String,
    /// Literal anchor text from the manuscript; empty when the reviewer could
    /// not isolate one.
    #[serde(default)]
    pub original_text: String,
    pub description: String,
    pub suggestion: String,
    #[serde(default)]
    pub bible_conflict: bool,
    #[serde(default)]
    pub status: IssueStatus,
}

impl Issue {
    pub fn new(id: u64, stage: Stage, severity: Severity, category: impl Into<String>) -> Self {
        Self {
            id,
            stage,
            severity,
            category: category.into(),
            location: "Unknown".to_string(),
            original_text: String::new(),
            description: String::new(),
            suggestion: String::new(),
            bible_conflict: false,
            status: IssueStatus::Open,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_original_text(mut self, text: impl Into<String>) -> Self {
        self.original_text = text.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn with_bible_conflict(mut self, conflict: bool) -> Self {
        self.bible_conflict = conflict;
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Open
    }

    /// Open → ignored. Applied issues stay applied.
    pub fn ignore(&mut self) -> Result<(), IssueError> {
        if self.status == IssueStatus::Applied {
            return Err(IssueError::AlreadyApplied {
                id: self.id,
                action: "ignored",
            });
        }
        self.status = IssueStatus::Ignored;
        Ok(())
    }

    /// Ignored → open.
    pub fn unignore(&mut self) -> Result<(), IssueError> {
        if self.status == IssueStatus::Applied {
            return Err(IssueError::AlreadyApplied {
                id: self.id,
                action: "unignored",
            });
        }
        self.status = IssueStatus::Open;
        Ok(())
    }

    pub fn mark_applied(&mut self) {
        self.status = IssueStatus::Applied;
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.bible_conflict {
            "BIBLE CONFLICT: "
        } else {
            ""
        };
        write!(
            f,
            "[{}] {}{}",
            self.severity.as_str().to_uppercase(),
            marker,
            self.description
        )
    }
}

/// Find an issue by id within one stage's list.
pub fn find_mut(issues: &mut [Issue], stage: Stage, id: u64) -> Result<&mut Issue, IssueError> {
    issues
        .iter_mut()
        .find(|i| i.id == id && i.stage == stage)
        .ok_or(IssueError::NotFound { id, stage })
}

/// Counts over a list of issues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub total: usize,
    pub critical: usize,
    pub major: usize,
    pub minor: usize,
    pub bible_conflicts: usize,
    pub open: usize,
    pub applied: usize,
    pub ignored: usize,
}

impl IssueSummary {
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let mut summary = Self::default();
        for issue in issues {
            summary.total += 1;
            match issue.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Major => summary.major += 1,
                Severity::Minor => summary.minor += 1,
            }
            match issue.status {
                IssueStatus::Open => summary.open += 1,
                IssueStatus::Applied => summary.applied += 1,
                IssueStatus::Ignored => summary.ignored += 1,
            }
            if issue.bible_conflict {
                summary.bible_conflicts += 1;
            }
        }
        summary
    }
}

impl fmt::Display for IssueSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} issues ({} critical, {} major, {} minor; {} bible conflicts)",
            self.total, self.critical, self.major, self.minor, self.bible_conflicts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Issue {
        Issue::new(7, Stage::Copy, Severity::Major, "timeline")
            .with_location("Chapter 3")
            .with_original_text("It was Monday, March 15th")
            .with_description("March 15th is a Wednesday")
            .with_suggestion("Change to 'Wednesday, March 15th'")
            .with_bible_conflict(true)
    }

    #[test]
    fn severity_orders_critical_first() {
        let mut sevs = vec![Severity::Minor, Severity::Critical, Severity::Major];
        sevs.sort();
        assert_eq!(sevs, vec![Severity::Critical, Severity::Major, Severity::Minor]);
    }

    #[test]
    fn severity_parse_is_lenient() {
        assert_eq!(Severity::parse_lenient(" MAJOR "), Some(Severity::Major));
        assert_eq!(Severity::parse_lenient("low"), Some(Severity::Minor));
        assert_eq!(Severity::parse_lenient("catastrophic"), None);
    }

    #[test]
    fn wire_shape_has_every_field() {
        let value = serde_json::to_value(sample()).unwrap();
        for key in [
            "id",
            "stage",
            "severity",
            "category",
            "location",
            "original_text",
            "description",
            "suggestion",
            "bible_conflict",
            "status",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["stage"], "copy");
        assert_eq!(value["severity"], "major");
        assert_eq!(value["status"], "open");
    }

    #[test]
    fn wire_shape_round_trips() {
        let issue = sample();
        let json = serde_json::to_string(&issue).unwrap();
        let back: Issue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, issue);
    }

    #[test]
    fn ignore_and_unignore_toggle_status() {
        let mut issue = sample();
        issue.ignore().unwrap();
        assert_eq!(issue.status, IssueStatus::Ignored);
        issue.unignore().unwrap();
        assert_eq!(issue.status, IssueStatus::Open);
    }

    #[test]
    fn applied_issue_cannot_be_ignored() {
        let mut issue = sample();
        issue.mark_applied();
        let err = issue.ignore().unwrap_err();
        assert_eq!(
            err,
            IssueError::AlreadyApplied {
                id: 7,
                action: "ignored"
            }
        );
        assert_eq!(issue.status, IssueStatus::Applied);
    }

    #[test]
    fn find_mut_matches_stage_and_id() {
        let mut issues = vec![sample(), Issue::new(7, Stage::Proof, Severity::Minor, "typo")];
        let found = find_mut(&mut issues, Stage::Proof, 7).unwrap();
        assert_eq!(found.category, "typo");
        assert!(find_mut(&mut issues, Stage::Line, 7).is_err());
    }

    #[test]
    fn summary_counts_severity_status_and_conflicts() {
        let mut applied = Issue::new(2, Stage::Copy, Severity::Minor, "grammar");
        applied.mark_applied();
        let issues = vec![
            sample(),
            applied,
            Issue::new(3, Stage::Copy, Severity::Critical, "grammar"),
        ];
        let summary = IssueSummary::from_issues(&issues);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.major, 1);
        assert_eq!(summary.minor, 1);
        assert_eq!(summary.bible_conflicts, 1);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.open, 2);
    }

    #[test]
    fn display_marks_bible_conflicts() {
        assert_eq!(
            sample().to_string(),
            "[MAJOR] BIBLE CONFLICT: March 15th is a Wednesday"
        );
    }
}
