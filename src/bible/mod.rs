//! Series bible extraction: the manuscript's canonical facts.
//!
//! Characters, locations, timeline events and plot objects are pulled out of
//! every segment with one generation call per (segment, entity kind) pair.
//! The merged [`StyleSheet`] renders as markdown reference notes, which is
//! what the copy stage's consistency kinds check against.

mod entity;

pub use entity::{Character, Location, StoryObject, TimelineEvent};

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{GenerationBackend, GenerationRequest};
use crate::errors::{Cancelled, GenerationError};
use crate::extract::{ExtractionConfig, parse_json_list, split_chunks};
use entity::parse_entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Characters,
    Locations,
    Timeline,
    Objects,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Characters,
        EntityKind::Locations,
        EntityKind::Timeline,
        EntityKind::Objects,
    ];

    /// Object key a response may wrap its list in.
    pub fn key(self) -> &'static str {
        match self {
            EntityKind::Characters => "characters",
            EntityKind::Locations => "locations",
            EntityKind::Timeline => "timeline",
            EntityKind::Objects => "objects",
        }
    }

    fn instructions(self) -> &'static str {
        match self {
            EntityKind::Characters => {
                "Extract ALL characters mentioned. For each: name, age (integer if stated, \
                 otherwise null), physical_description, occupation, personality_traits (list), \
                 speech_patterns, arc_notes."
            }
            EntityKind::Locations => {
                "Extract ALL significant locations. For each: name, description, atmosphere, \
                 key_features (list)."
            }
            EntityKind::Timeline => {
                "Extract the key events in story order. For each: date (as written in the text), \
                 day_of_week (if stated), event, chapter_reference."
            }
            EntityKind::Objects => {
                "Extract plot-significant objects. For each: name, description, color (if \
                 stated), significance."
            }
        }
    }

    fn example(self) -> &'static str {
        match self {
            EntityKind::Characters => {
                r#"{"name": "John Smith", "age": 35, "physical_description": "Tall, dark hair", "occupation": "Detective", "personality_traits": ["determined", "cynical"], "speech_patterns": "Short sentences", "arc_notes": "Learns to trust"}"#
            }
            EntityKind::Locations => {
                r#"{"name": "The Old Mill", "description": "Abandoned mill by the river", "atmosphere": "Damp and quiet", "key_features": ["waterwheel", "broken windows"]}"#
            }
            EntityKind::Timeline => {
                r#"{"date": "March 14th", "day_of_week": "Monday", "event": "The letter arrives", "chapter_reference": "Chapter 2"}"#
            }
            EntityKind::Objects => {
                r#"{"name": "Locket", "description": "Oval, engraved", "color": "silver", "significance": "Proof of the inheritance"}"#
            }
        }
    }

    pub fn build_prompt(self, segment: &str) -> String {
        format!(
            r#"You are a professional book editor building a STYLE SHEET ({kind}).

{instructions}

## Manuscript Excerpt

{segment}

## Output Format

Return ONLY a JSON array. Each element:
[
  {example}
]

Return [] if nothing is found."#,
            kind = self.key(),
            instructions = self.instructions(),
            example = self.example(),
        )
    }
}

/// Canonical facts for one manuscript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSheet {
    pub manuscript_id: String,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default)]
    pub objects: Vec<StoryObject>,
    pub extracted_at: DateTime<Utc>,
}

impl StyleSheet {
    pub fn new(manuscript_id: &str) -> Self {
        Self {
            manuscript_id: manuscript_id.to_string(),
            characters: Vec::new(),
            locations: Vec::new(),
            timeline: Vec::new(),
            objects: Vec::new(),
            extracted_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
            && self.locations.is_empty()
            && self.timeline.is_empty()
            && self.objects.is_empty()
    }

    /// Fold one response's elements in. Named entities are matched
    /// case-insensitively; a repeat only fills fields still empty.
    pub fn absorb(&mut self, kind: EntityKind, values: Vec<Value>) {
        for value in values {
            match kind {
                EntityKind::Characters => {
                    if let Some(c) = parse_entity(value, |c: &Character| !c.name.is_empty()) {
                        merge_named(&mut self.characters, c);
                    }
                }
                EntityKind::Locations => {
                    if let Some(l) = parse_entity(value, |l: &Location| !l.name.is_empty()) {
                        merge_named(&mut self.locations, l);
                    }
                }
                EntityKind::Timeline => {
                    if let Some(e) = parse_entity(value, |e: &TimelineEvent| !e.event.is_empty())
                        && !self.timeline.contains(&e)
                    {
                        self.timeline.push(e);
                    }
                }
                EntityKind::Objects => {
                    if let Some(o) = parse_entity(value, |o: &StoryObject| !o.name.is_empty()) {
                        merge_named(&mut self.objects, o);
                    }
                }
            }
        }
    }

    /// Markdown reference notes; empty when nothing was extracted.
    pub fn to_notes(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = format!("# Series Bible: {}\n", self.manuscript_id);

        if !self.characters.is_empty() {
            out.push_str("\n## Characters\n\n");
            for c in &self.characters {
                let mut details = Vec::new();
                if let Some(age) = c.age {
                    details.push(format!("age {age}"));
                }
                push_field(&mut details, "", &c.occupation);
                push_field(&mut details, "", &c.physical_description);
                if !c.personality_traits.is_empty() {
                    details.push(format!("traits: {}", c.personality_traits.join(", ")));
                }
                push_field(&mut details, "speech: ", &c.speech_patterns);
                push_field(&mut details, "arc: ", &c.arc_notes);
                entry(&mut out, &c.name, &details);
            }
        }

        if !self.locations.is_empty() {
            out.push_str("\n## Locations\n\n");
            for l in &self.locations {
                let mut details = Vec::new();
                push_field(&mut details, "", &l.description);
                push_field(&mut details, "atmosphere: ", &l.atmosphere);
                if !l.key_features.is_empty() {
                    details.push(format!("features: {}", l.key_features.join(", ")));
                }
                entry(&mut out, &l.name, &details);
            }
        }

        if !self.timeline.is_empty() {
            out.push_str("\n## Timeline\n\n");
            for e in &self.timeline {
                let when = match (&e.day_of_week, e.date.is_empty()) {
                    (Some(day), false) => format!("{} ({day})", e.date),
                    (Some(day), true) => day.clone(),
                    (None, false) => e.date.clone(),
                    (None, true) => "Undated".to_string(),
                };
                let _ = write!(out, "- {when}: {}", e.event);
                if !e.chapter_reference.is_empty() {
                    let _ = write!(out, " [{}]", e.chapter_reference);
                }
                out.push('\n');
            }
        }

        if !self.objects.is_empty() {
            out.push_str("\n## Objects\n\n");
            for o in &self.objects {
                let mut details = Vec::new();
                if let Some(color) = &o.color {
                    details.push(color.clone());
                }
                push_field(&mut details, "", &o.description);
                push_field(&mut details, "significance: ", &o.significance);
                entry(&mut out, &o.name, &details);
            }
        }
        out
    }
}

trait Named {
    fn name(&self) -> &str;
    fn fill_from(&mut self, other: Self);
}

fn fill(slot: &mut String, other: String) {
    if slot.is_empty() {
        *slot = other;
    }
}

fn fill_list(slot: &mut Vec<String>, other: Vec<String>) {
    for item in other {
        if !slot.iter().any(|s| s.eq_ignore_ascii_case(&item)) {
            slot.push(item);
        }
    }
}

impl Named for Character {
    fn name(&self) -> &str {
        &self.name
    }

    fn fill_from(&mut self, other: Self) {
        self.age = self.age.or(other.age);
        fill(&mut self.physical_description, other.physical_description);
        fill(&mut self.occupation, other.occupation);
        fill_list(&mut self.personality_traits, other.personality_traits);
        fill(&mut self.speech_patterns, other.speech_patterns);
        fill(&mut self.arc_notes, other.arc_notes);
    }
}

impl Named for Location {
    fn name(&self) -> &str {
        &self.name
    }

    fn fill_from(&mut self, other: Self) {
        fill(&mut self.description, other.description);
        fill(&mut self.atmosphere, other.atmosphere);
        fill_list(&mut self.key_features, other.key_features);
    }
}

impl Named for StoryObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn fill_from(&mut self, other: Self) {
        fill(&mut self.description, other.description);
        if self.color.is_none() {
            self.color = other.color;
        }
        fill(&mut self.significance, other.significance);
    }
}

fn merge_named<T: Named>(list: &mut Vec<T>, item: T) {
    match list
        .iter_mut()
        .find(|existing| existing.name().eq_ignore_ascii_case(item.name()))
    {
        Some(existing) => existing.fill_from(item),
        None => list.push(item),
    }
}

fn push_field(details: &mut Vec<String>, label: &str, value: &str) {
    if !value.is_empty() {
        details.push(format!("{label}{value}"));
    }
}

fn entry(out: &mut String, name: &str, details: &[String]) {
    if details.is_empty() {
        let _ = writeln!(out, "- **{name}**");
    } else {
        let _ = writeln!(out, "- **{name}**: {}", details.join("; "));
    }
}

pub struct BibleExtractor {
    backend: Arc<dyn GenerationBackend>,
    config: ExtractionConfig,
}

impl BibleExtractor {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: ExtractionConfig) -> Self {
        Self { backend, config }
    }

    /// Run every entity kind over every segment and merge in sequential order.
    ///
    /// A failed call contributes nothing; cancellation discards the sheet.
    pub async fn extract(&self, text: &str, manuscript_id: &str) -> Result<StyleSheet, Cancelled> {
        let segments = split_chunks(text, self.config.chunk_size);
        let units: Vec<(usize, EntityKind, &str)> = segments
            .iter()
            .enumerate()
            .flat_map(|(i, segment)| EntityKind::ALL.into_iter().map(move |kind| (i, kind, *segment)))
            .collect();

        info!(
            manuscript_id,
            segments = segments.len(),
            calls = units.len(),
            "Starting bible extraction"
        );

        let per_unit: Vec<(EntityKind, Vec<Value>)> = stream::iter(units)
            .map(|(index, kind, segment)| async move {
                let values = self.run_unit(index, kind, segment, manuscript_id).await?;
                Ok::<_, Cancelled>((kind, values))
            })
            .buffered(self.config.max_concurrency.max(1))
            .try_collect()
            .await?;

        let mut sheet = StyleSheet::new(manuscript_id);
        for (kind, values) in per_unit {
            sheet.absorb(kind, values);
        }

        info!(
            manuscript_id,
            characters = sheet.characters.len(),
            locations = sheet.locations.len(),
            events = sheet.timeline.len(),
            objects = sheet.objects.len(),
            "Bible extraction complete"
        );
        Ok(sheet)
    }

    async fn run_unit(
        &self,
        segment_index: usize,
        kind: EntityKind,
        segment: &str,
        manuscript_id: &str,
    ) -> Result<Vec<Value>, Cancelled> {
        let request = GenerationRequest::new(kind.build_prompt(segment))
            .with_max_tokens(self.config.max_tokens)
            .with_context_id(manuscript_id);

        let response = match self.backend.generate(request).await {
            Ok(response) => response,
            Err(GenerationError::Cancelled(c)) => return Err(c),
            Err(e) => {
                warn!(
                    segment = segment_index,
                    kind = kind.key(),
                    error = %e,
                    "Generation failed; treating as no entities"
                );
                return Ok(Vec::new());
            }
        };

        match parse_json_list(&response, &[kind.key()]) {
            Some(values) => {
                debug!(segment = segment_index, kind = kind.key(), entries = values.len(), "Parsed entities");
                Ok(values)
            }
            None => {
                warn!(
                    segment = segment_index,
                    kind = kind.key(),
                    response_chars = response.len(),
                    "Unrecoverable response; treating as no entities"
                );
                Ok(Vec::new())
            }
        }
    }
}
