//! Finding kinds requested by each editorial stage.
//!
//! Each stage asks the backend for one or more kinds of finding (grammar,
//! timeline, pacing...). A [`FindingKind`] carries everything needed to build
//! the request and to turn a raw finding into an [`Issue`]: the category,
//! how severity is decided, whether the kind checks canonical facts, focus
//! areas for the prompt, and placeholder text for missing fields.
//!
//! ## Example
//!
//! ```
//! use quire::review::kinds_for;
//! use quire::stage::Stage;
//!
//! let categories: Vec<_> = kinds_for(Stage::Copy).iter().map(|k| k.category).collect();
//! assert_eq!(categories, ["grammar", "timeline", "consistency", "house_style"]);
//! ```

use crate::extract::RawFinding;
use crate::issue::{Issue, Severity};
use crate::stage::Stage;

/// How an issue's severity is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityRule {
    /// Always this severity.
    Fixed(Severity),
    /// Taken from the finding's `severity` field, `default` when missing or unknown.
    FromFinding { default: Severity },
}

/// One category of finding a stage asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct FindingKind {
    pub stage: Stage,
    pub category: &'static str,
    /// Short heading used in the prompt, e.g. "GRAMMAR and PUNCTUATION".
    pub heading: &'static str,
    pub severity: SeverityRule,
    /// Use the finding's own `category` when present.
    pub category_from_finding: bool,
    /// Findings contradict canonical facts and are eligible for direct fixes.
    pub bible_conflict: bool,
    /// Skipped unless reference notes are supplied.
    pub requires_reference: bool,
    pub focus: &'static [&'static str],
    pub fallback_description: &'static str,
    pub fallback_suggestion: &'static str,
    pub temperature: f32,
}

const ACQUISITIONS: &[FindingKind] = &[FindingKind {
    stage: Stage::Acquisitions,
    category: "market_fit",
    heading: "MARKET FIT and COMMERCIAL VIABILITY",
    severity: SeverityRule::FromFinding {
        default: Severity::Major,
    },
    category_from_finding: true,
    bible_conflict: false,
    requires_reference: false,
    focus: &[
        "Weak or missing hook in the opening pages",
        "Genre conventions the manuscript breaks without payoff",
        "Unclear target audience",
        "Length far outside genre norms",
    ],
    fallback_description: "Market fit concern",
    fallback_suggestion: "Review positioning",
    temperature: 0.4,
}];

const DEVELOPMENTAL: &[FindingKind] = &[FindingKind {
    stage: Stage::Developmental,
    category: "plot",
    heading: "BIG-PICTURE STORY PROBLEMS",
    severity: SeverityRule::FromFinding {
        default: Severity::Major,
    },
    category_from_finding: true,
    bible_conflict: false,
    requires_reference: false,
    focus: &[
        "Plot holes, logic gaps, missing motivation",
        "Character arcs that lack growth or behave inconsistently",
        "Sections that drag or rush",
        "Chapter organization and scene flow",
    ],
    fallback_description: "Structural issue",
    fallback_suggestion: "Revise the affected section",
    temperature: 0.3,
}];

const LINE: &[FindingKind] = &[
    FindingKind {
        stage: Stage::Line,
        category: "voice",
        heading: "VOICE and TONE",
        severity: SeverityRule::FromFinding {
            default: Severity::Minor,
        },
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Inconsistent narrative voice",
            "Tone shifts without reason",
            "Weak or unclear authorial voice",
            "POV slips",
        ],
        fallback_description: "Voice inconsistency",
        fallback_suggestion: "Align with the established voice",
        temperature: 0.3,
    },
    FindingKind {
        stage: Stage::Line,
        category: "wordiness",
        heading: "WORDINESS",
        severity: SeverityRule::Fixed(Severity::Minor),
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Redundant phrases (\"past history\")",
            "Overwriting",
            "Weak verbs propped up by adverbs",
            "Passive voice where active is better",
        ],
        fallback_description: "Wordy passage",
        fallback_suggestion: "Tighten the prose",
        temperature: 0.3,
    },
    FindingKind {
        stage: Stage::Line,
        category: "syntax",
        heading: "SENTENCE SYNTAX",
        severity: SeverityRule::Fixed(Severity::Minor),
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Unclear syntax",
            "Confusing sentence structure",
            "Clunky transitions",
            "Repetitive sentence patterns",
        ],
        fallback_description: "Awkward sentence",
        fallback_suggestion: "Restructure the sentence",
        temperature: 0.3,
    },
];

const COPY: &[FindingKind] = &[
    FindingKind {
        stage: Stage::Copy,
        category: "grammar",
        heading: "GRAMMAR and PUNCTUATION",
        severity: SeverityRule::Fixed(Severity::Minor),
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Subject-verb agreement",
            "Comma splices",
            "Sentence fragments",
            "Misplaced modifiers",
            "Pronoun agreement",
        ],
        fallback_description: "Grammar error",
        fallback_suggestion: "Fix grammar",
        temperature: 0.1,
    },
    FindingKind {
        stage: Stage::Copy,
        category: "timeline",
        heading: "TIMELINE CONSISTENCY",
        severity: SeverityRule::Fixed(Severity::Major),
        category_from_finding: false,
        bible_conflict: true,
        requires_reference: true,
        focus: &[
            "Wrong day of week for a date",
            "Events out of chronological order",
            "Character aging inconsistencies",
            "Time passage errors",
        ],
        fallback_description: "Timeline inconsistency",
        fallback_suggestion: "Align with the established timeline",
        temperature: 0.1,
    },
    FindingKind {
        stage: Stage::Copy,
        category: "consistency",
        heading: "CHARACTER CONSISTENCY",
        severity: SeverityRule::Fixed(Severity::Major),
        category_from_finding: false,
        bible_conflict: true,
        requires_reference: true,
        focus: &[
            "Physical descriptions that contradict the reference",
            "Ages and occupations that change",
            "Names spelled inconsistently",
        ],
        fallback_description: "Character detail contradicts the reference",
        fallback_suggestion: "Match the reference notes",
        temperature: 0.1,
    },
    FindingKind {
        stage: Stage::Copy,
        category: "house_style",
        heading: "HOUSE STYLE compliance",
        severity: SeverityRule::Fixed(Severity::Minor),
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Oxford comma usage",
            "Number style",
            "Time format",
            "Quote style",
        ],
        fallback_description: "House style deviation",
        fallback_suggestion: "Apply house style",
        temperature: 0.1,
    },
];

const PROOF: &[FindingKind] = &[
    FindingKind {
        stage: Stage::Proof,
        category: "typo",
        heading: "TYPOS",
        severity: SeverityRule::Fixed(Severity::Minor),
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Misspellings",
            "Repeated words (\"the the\")",
            "Missing words",
            "Transposed letters",
            "Homophones (\"their\" vs \"there\")",
        ],
        fallback_description: "Typo",
        fallback_suggestion: "Correct the typo",
        temperature: 0.1,
    },
    FindingKind {
        stage: Stage::Proof,
        category: "formatting",
        heading: "FORMATTING",
        severity: SeverityRule::Fixed(Severity::Minor),
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Inconsistent paragraph spacing",
            "Missing scene breaks",
            "Inconsistent chapter headings",
            "Orphaned dialogue tags",
        ],
        fallback_description: "Formatting issue",
        fallback_suggestion: "Fix formatting",
        temperature: 0.1,
    },
];

const COLD_READ: &[FindingKind] = &[
    FindingKind {
        stage: Stage::ColdRead,
        category: "clarity",
        heading: "CLARITY for a first-time reader",
        severity: SeverityRule::Fixed(Severity::Minor),
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Unclear character motivations",
            "Confusing scene transitions",
            "Ambiguous pronouns",
            "Missing context or setup",
            "Unclear time jumps",
        ],
        fallback_description: "Unclear passage",
        fallback_suggestion: "Clarify for the reader",
        temperature: 0.3,
    },
    FindingKind {
        stage: Stage::ColdRead,
        category: "pacing",
        heading: "PACING as a reader experiences it",
        severity: SeverityRule::Fixed(Severity::Minor),
        category_from_finding: false,
        bible_conflict: false,
        requires_reference: false,
        focus: &[
            "Scenes that drag",
            "Repetitive information",
            "Lack of tension or stakes",
            "Info dumps",
        ],
        fallback_description: "Pacing problem",
        fallback_suggestion: "Tighten or cut",
        temperature: 0.3,
    },
];

/// The finding kinds a stage asks for, in request order.
pub fn kinds_for(stage: Stage) -> &'static [FindingKind] {
    match stage {
        Stage::Acquisitions => ACQUISITIONS,
        Stage::Developmental => DEVELOPMENTAL,
        Stage::Line => LINE,
        Stage::Copy => COPY,
        Stage::Proof => PROOF,
        Stage::ColdRead => COLD_READ,
    }
}

impl FindingKind {
    /// Build the extraction prompt for one segment.
    pub fn build_prompt(&self, segment: &str, notes: Option<&str>) -> String {
        let focus_list = self
            .focus
            .iter()
            .map(|area| format!("- {}", area))
            .collect::<Vec<_>>()
            .join("\n");

        let reference = match notes {
            Some(notes) if self.requires_reference => {
                format!("\n## Reference Notes (canonical facts)\n\n{}\n", notes.trim())
            }
            _ => String::new(),
        };

        let extra_fields = match (self.severity, self.category_from_finding) {
            (SeverityRule::FromFinding { .. }, true) => {
                "\n    \"severity\": \"critical | major | minor\",\n    \"category\": \"short label\","
            }
            (SeverityRule::FromFinding { .. }, false) => {
                "\n    \"severity\": \"critical | major | minor\","
            }
            _ => "",
        };

        format!(
            r#"You are the {reviewer} checking {heading}.

## Focus Areas

{focus_list}
{reference}
## Manuscript Excerpt

{segment}

## Output Format

Return ONLY a JSON array. Each element:
[
  {{{extra_fields}
    "location": "Chapter and paragraph",
    "quote": "exact text from the excerpt",
    "description": "what is wrong",
    "suggestion": "Change to: 'corrected text'"
  }}
]

Quote the manuscript exactly. Return [] if nothing is found."#,
            reviewer = self.stage.reviewer(),
            heading = self.heading,
        )
    }

    /// Turn a raw finding into an issue with every field populated.
    pub fn shape(&self, raw: RawFinding, id: u64) -> Issue {
        let severity = match self.severity {
            SeverityRule::Fixed(s) => s,
            SeverityRule::FromFinding { default } => raw
                .severity
                .as_deref()
                .and_then(Severity::parse_lenient)
                .unwrap_or(default),
        };
        let category = if self.category_from_finding {
            non_blank(raw.category).unwrap_or_else(|| self.category.to_string())
        } else {
            self.category.to_string()
        };

        Issue::new(id, self.stage, severity, category)
            .with_location(non_blank(raw.location).unwrap_or_else(|| "Unknown".to_string()))
            .with_original_text(raw.quote.unwrap_or_default())
            .with_description(
                non_blank(raw.description).unwrap_or_else(|| self.fallback_description.to_string()),
            )
            .with_suggestion(
                non_blank(raw.suggestion).unwrap_or_else(|| self.fallback_suggestion.to_string()),
            )
            .with_bible_conflict(self.bible_conflict)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueStatus;

    fn kind(stage: Stage, category: &str) -> &'static FindingKind {
        kinds_for(stage)
            .iter()
            .find(|k| k.category == category)
            .unwrap()
    }

    #[test]
    fn test_every_stage_has_kinds_tagged_with_it() {
        for stage in Stage::ORDER {
            let kinds = kinds_for(stage);
            assert!(!kinds.is_empty(), "{stage} has no kinds");
            assert!(kinds.iter().all(|k| k.stage == stage));
        }
    }

    #[test]
    fn test_only_copy_consistency_kinds_are_bible_checks() {
        let bible: Vec<_> = Stage::ORDER
            .iter()
            .flat_map(|s| kinds_for(*s))
            .filter(|k| k.bible_conflict)
            .map(|k| k.category)
            .collect();
        assert_eq!(bible, ["timeline", "consistency"]);
        assert!(
            Stage::ORDER
                .iter()
                .flat_map(|s| kinds_for(*s))
                .all(|k| k.bible_conflict == k.requires_reference)
        );
    }

    #[test]
    fn test_shape_fills_placeholders() {
        let issue = kind(Stage::Copy, "grammar").shape(RawFinding::default(), 3);
        assert_eq!(issue.id, 3);
        assert_eq!(issue.stage, Stage::Copy);
        assert_eq!(issue.severity, Severity::Minor);
        assert_eq!(issue.location, "Unknown");
        assert_eq!(issue.original_text, "");
        assert_eq!(issue.description, "Grammar error");
        assert_eq!(issue.suggestion, "Fix grammar");
        assert_eq!(issue.status, IssueStatus::Open);
        assert!(!issue.bible_conflict);
    }

    #[test]
    fn test_shape_keeps_provided_fields() {
        let raw = RawFinding {
            location: Some("Chapter 2".into()),
            quote: Some("It was Monday, March 15th".into()),
            description: Some("March 15th is a Wednesday".into()),
            suggestion: Some("Change to: 'Wednesday, March 15th'".into()),
            severity: Some("minor".into()),
            category: Some("ignored".into()),
        };
        let issue = kind(Stage::Copy, "timeline").shape(raw, 1);
        assert_eq!(issue.severity, Severity::Major);
        assert_eq!(issue.category, "timeline");
        assert!(issue.bible_conflict);
        assert_eq!(issue.original_text, "It was Monday, March 15th");
    }

    #[test]
    fn test_developmental_takes_severity_and_category_from_finding() {
        let k = kind(Stage::Developmental, "plot");
        let raw = RawFinding {
            severity: Some("Critical".into()),
            category: Some("character_arc".into()),
            ..Default::default()
        };
        let issue = k.shape(raw, 1);
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.category, "character_arc");

        let defaulted = k.shape(
            RawFinding {
                severity: Some("apocalyptic".into()),
                category: Some("  ".into()),
                ..Default::default()
            },
            2,
        );
        assert_eq!(defaulted.severity, Severity::Major);
        assert_eq!(defaulted.category, "plot");
    }

    #[test]
    fn test_voice_severity_defaults_to_minor() {
        let issue = kind(Stage::Line, "voice").shape(RawFinding::default(), 1);
        assert_eq!(issue.severity, Severity::Minor);
        assert_eq!(issue.category, "voice");
    }

    #[test]
    fn test_prompt_includes_segment_focus_and_notes() {
        let k = kind(Stage::Copy, "timeline");
        let prompt = k.build_prompt("It was Monday.", Some("March 15th: Wednesday"));
        assert!(prompt.contains("Copy Editor"));
        assert!(prompt.contains("TIMELINE CONSISTENCY"));
        assert!(prompt.contains("- Wrong day of week for a date"));
        assert!(prompt.contains("It was Monday."));
        assert!(prompt.contains("March 15th: Wednesday"));
        assert!(!prompt.contains("\"severity\""));
    }

    #[test]
    fn test_prompt_omits_notes_for_kinds_that_do_not_use_them() {
        let prompt = kind(Stage::Proof, "typo").build_prompt("text", Some("secret notes"));
        assert!(!prompt.contains("secret notes"));
    }

    #[test]
    fn test_prompt_asks_for_severity_when_taken_from_finding() {
        let prompt = kind(Stage::Developmental, "plot").build_prompt("text", None);
        assert!(prompt.contains("\"severity\""));
        assert!(prompt.contains("\"category\""));
    }
}
