//! Chunked extraction: manuscript text in, issues out.
//!
//! The text is split into bounded segments; every (segment, finding kind)
//! pair becomes one generation call. Responses are recovered into finding
//! lists, shaped into issues and numbered in (segment, kind) order.
//!
//! A failed call costs only that pair's findings. Cancellation aborts the
//! whole run and returns no issues.

mod chunk;
mod finding;
mod recover;

pub use chunk::split_chunks;
pub use finding::RawFinding;
pub use recover::{balanced_end, parse_finding_array, parse_json_list, strip_fence};
pub(crate) use finding::lenient_string;

use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{GenerationBackend, GenerationRequest};
use crate::errors::{Cancelled, GenerationError};
use crate::issue::Issue;
use crate::review::FindingKind;

/// Monotonic id source for one extraction run.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Ids start at 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Continue after an existing id.
    pub fn after(last: u64) -> Self {
        Self { next: last + 1 }
    }

    pub fn allocate(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub chunk_size: usize,
    /// Calls in flight at once; results keep their sequential order.
    pub max_concurrency: usize,
    pub max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50_000,
            max_concurrency: 1,
            max_tokens: 4000,
        }
    }
}

pub struct Extractor {
    backend: Arc<dyn GenerationBackend>,
    config: ExtractionConfig,
}

impl Extractor {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: ExtractionConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run every kind over every segment of `text`.
    ///
    /// Kinds that need reference notes are skipped when `notes` is `None`.
    pub async fn extract(
        &self,
        text: &str,
        kinds: &[FindingKind],
        notes: Option<&str>,
        context_id: &str,
        ids: &mut IdAllocator,
    ) -> Result<Vec<Issue>, Cancelled> {
        let active: Vec<&FindingKind> = kinds
            .iter()
            .filter(|kind| {
                let usable = notes.is_some() || !kind.requires_reference;
                if !usable {
                    debug!(category = kind.category, "No reference notes; skipping kind");
                }
                usable
            })
            .collect();

        let segments = split_chunks(text, self.config.chunk_size);
        let units: Vec<(usize, &FindingKind, &str)> = segments
            .iter()
            .enumerate()
            .flat_map(|(i, segment)| active.iter().map(move |kind| (i, *kind, *segment)))
            .collect();

        info!(
            context_id,
            segments = segments.len(),
            kinds = active.len(),
            calls = units.len(),
            "Starting extraction"
        );

        let per_unit: Vec<(&FindingKind, Vec<RawFinding>)> = stream::iter(units)
            .map(|(index, kind, segment)| async move {
                let findings = self
                    .run_unit(index, kind, segment, notes, context_id)
                    .await?;
                Ok::<_, Cancelled>((kind, findings))
            })
            .buffered(self.config.max_concurrency.max(1))
            .try_collect()
            .await?;

        let issues: Vec<Issue> = per_unit
            .into_iter()
            .flat_map(|(kind, findings)| findings.into_iter().map(move |raw| (kind, raw)))
            .map(|(kind, raw)| kind.shape(raw, ids.allocate()))
            .collect();

        info!(context_id, issues = issues.len(), "Extraction complete");
        Ok(issues)
    }

    async fn run_unit(
        &self,
        segment_index: usize,
        kind: &FindingKind,
        segment: &str,
        notes: Option<&str>,
        context_id: &str,
    ) -> Result<Vec<RawFinding>, Cancelled> {
        let request = GenerationRequest::new(kind.build_prompt(segment, notes))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(kind.temperature)
            .with_context_id(context_id);

        let response = match self.backend.generate(request).await {
            Ok(response) => response,
            Err(GenerationError::Cancelled(c)) => return Err(c),
            Err(e) => {
                warn!(
                    segment = segment_index,
                    category = kind.category,
                    error = %e,
                    "Generation failed; treating as no findings"
                );
                return Ok(Vec::new());
            }
        };

        match parse_finding_array(&response) {
            Some(values) => {
                let findings: Vec<RawFinding> =
                    values.into_iter().filter_map(RawFinding::from_value).collect();
                debug!(
                    segment = segment_index,
                    category = kind.category,
                    findings = findings.len(),
                    "Parsed findings"
                );
                Ok(findings)
            }
            None => {
                warn!(
                    segment = segment_index,
                    category = kind.category,
                    response_chars = response.len(),
                    "Unrecoverable response; treating as no findings"
                );
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::kinds_for;
    use crate::stage::Stage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers by looking for a marker in the prompt; records every prompt.
    struct KeyedBackend {
        rules: Vec<(&'static str, Result<&'static str, &'static str>)>,
        prompts: Mutex<Vec<String>>,
    }

    impl KeyedBackend {
        fn new(rules: Vec<(&'static str, Result<&'static str, &'static str>)>) -> Arc<Self> {
            Arc::new(Self {
                rules,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompt_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationBackend for KeyedBackend {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            for (marker, answer) in &self.rules {
                if request.prompt.contains(marker) {
                    return match answer {
                        Ok(text) => Ok(text.to_string()),
                        Err("cancel") => Err(Cancelled::new("ms-1").into()),
                        Err(msg) => Err(GenerationError::RetriesExhausted {
                            attempts: 5,
                            last: msg.to_string(),
                        }),
                    };
                }
            }
            Ok("[]".to_string())
        }
    }

    fn extractor(backend: Arc<dyn GenerationBackend>, chunk_size: usize, concurrency: usize) -> Extractor {
        Extractor::new(
            backend,
            ExtractionConfig {
                chunk_size,
                max_concurrency: concurrency,
                max_tokens: 100,
            },
        )
    }

    #[test]
    fn test_id_allocator_is_monotonic() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(IdAllocator::after(9).allocate(), 10);
    }

    #[tokio::test]
    async fn test_issues_are_numbered_in_kind_order() {
        let backend = KeyedBackend::new(vec![
            ("TYPOS", Ok(r#"[{"quote": "teh"}, {"quote": "recieve"}]"#)),
            ("FORMATTING", Ok("```json\n[{\"quote\": \"***\"}]\n```")),
        ]);
        let ex = extractor(backend, 50_000, 1);
        let issues = ex
            .extract("teh recieve ***", kinds_for(Stage::Proof), None, "ms-1", &mut IdAllocator::new())
            .await
            .unwrap();

        let summary: Vec<_> = issues
            .iter()
            .map(|i| (i.id, i.category.as_str(), i.original_text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![(1, "typo", "teh"), (2, "typo", "recieve"), (3, "formatting", "***")]
        );
        assert!(issues.iter().all(|i| i.stage == Stage::Proof));
    }

    #[tokio::test]
    async fn test_one_call_per_segment_and_kind() {
        let backend = KeyedBackend::new(vec![]);
        let ex = extractor(backend.clone(), 4, 1);
        let issues = ex
            .extract("abcdefghij", kinds_for(Stage::Proof), None, "ms-1", &mut IdAllocator::new())
            .await
            .unwrap();
        assert!(issues.is_empty());
        // 3 segments x 2 kinds
        assert_eq!(backend.prompt_count(), 6);
    }

    #[tokio::test]
    async fn test_failed_or_garbled_calls_yield_no_findings() {
        let backend = KeyedBackend::new(vec![
            ("TYPOS", Err("backend down")),
            ("FORMATTING", Ok("Sorry, I can't produce JSON today.")),
        ]);
        let ex = extractor(backend, 50_000, 1);
        let issues = ex
            .extract("text", kinds_for(Stage::Proof), None, "ms-1", &mut IdAllocator::new())
            .await
            .unwrap();
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn test_reference_kinds_need_notes() {
        let backend = KeyedBackend::new(vec![
            ("TIMELINE", Ok(r#"[{"quote": "Monday"}]"#)),
            ("CHARACTER CONSISTENCY", Ok(r#"[{"quote": "blue eyes"}]"#)),
        ]);
        let ex = extractor(backend.clone(), 50_000, 1);

        let without = ex
            .extract("text", kinds_for(Stage::Copy), None, "ms-1", &mut IdAllocator::new())
            .await
            .unwrap();
        assert!(without.is_empty());
        assert_eq!(backend.prompt_count(), 2);

        let with = ex
            .extract(
                "text",
                kinds_for(Stage::Copy),
                Some("Monday is March 14th"),
                "ms-1",
                &mut IdAllocator::new(),
            )
            .await
            .unwrap();
        assert_eq!(with.len(), 2);
        assert!(with.iter().all(|i| i.bible_conflict));
    }

    #[tokio::test]
    async fn test_cancellation_discards_everything() {
        let backend = KeyedBackend::new(vec![
            ("TYPOS", Ok(r#"[{"quote": "teh"}]"#)),
            ("FORMATTING", Err("cancel")),
        ]);
        let ex = extractor(backend, 50_000, 1);
        let err = ex
            .extract("text", kinds_for(Stage::Proof), None, "ms-1", &mut IdAllocator::new())
            .await
            .unwrap_err();
        assert_eq!(err, Cancelled::new("ms-1"));
    }

    #[tokio::test]
    async fn test_concurrency_preserves_order() {
        let backend = KeyedBackend::new(vec![
            ("aaaa", Ok(r#"[{"quote": "first"}]"#)),
            ("bbbb", Ok(r#"[{"quote": "second"}]"#)),
            ("cccc", Ok(r#"[{"quote": "third"}]"#)),
        ]);
        let ex = extractor(backend, 4, 3);
        let kinds = &kinds_for(Stage::Developmental)[..1];
        let issues = ex
            .extract("aaaabbbbcccc", kinds, None, "ms-1", &mut IdAllocator::new())
            .await
            .unwrap();
        let quotes: Vec<_> = issues.iter().map(|i| i.original_text.as_str()).collect();
        assert_eq!(quotes, ["first", "second", "third"]);
        assert_eq!(issues.iter().map(|i| i.id).collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_non_object_elements_are_dropped() {
        let backend = KeyedBackend::new(vec![("TYPOS", Ok(r#"["stray", {"quote": "teh"}, 7]"#))]);
        let ex = extractor(backend, 50_000, 1);
        let issues = ex
            .extract("teh", &kinds_for(Stage::Proof)[..1], None, "ms-1", &mut IdAllocator::new())
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, 1);
    }
}
