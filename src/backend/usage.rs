//! Token accounting for generation calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Text returned by a backend, with token counts when the provider reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            input_tokens: None,
            output_tokens: None,
        }
    }

    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self
    }
}

/// Roughly four characters per token for providers that report nothing.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Accumulated usage over a number of calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Calls whose counts were estimated from text length.
    #[serde(default)]
    pub estimated_calls: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.calls == 0
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.calls += other.calls;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.estimated_calls += other.estimated_calls;
    }
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} calls, {} input + {} output tokens",
            self.calls, self.input_tokens, self.output_tokens
        )?;
        if self.estimated_calls > 0 {
            write!(f, " ({} estimated)", self.estimated_calls)?;
        }
        Ok(())
    }
}

/// Shared counters; clones observe the same totals.
#[derive(Debug, Clone, Default)]
pub struct UsageMeter {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    estimated_calls: AtomicU64,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful call for `prompt`.
    pub fn record(&self, prompt: &str, generation: &Generation) {
        let c = &self.inner;
        c.calls.fetch_add(1, Ordering::Relaxed);
        match (generation.input_tokens, generation.output_tokens) {
            (Some(input), Some(output)) => {
                c.input_tokens.fetch_add(input, Ordering::Relaxed);
                c.output_tokens.fetch_add(output, Ordering::Relaxed);
            }
            _ => {
                c.input_tokens
                    .fetch_add(estimate_tokens(prompt), Ordering::Relaxed);
                c.output_tokens
                    .fetch_add(estimate_tokens(&generation.text), Ordering::Relaxed);
                c.estimated_calls.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> TokenUsage {
        let c = &self.inner;
        TokenUsage {
            calls: c.calls.load(Ordering::Relaxed),
            input_tokens: c.input_tokens.load(Ordering::Relaxed),
            output_tokens: c.output_tokens.load(Ordering::Relaxed),
            estimated_calls: c.estimated_calls.load(Ordering::Relaxed),
        }
    }

    /// Zero the counters and return what they held.
    pub fn reset(&self) -> TokenUsage {
        let c = &self.inner;
        TokenUsage {
            calls: c.calls.swap(0, Ordering::Relaxed),
            input_tokens: c.input_tokens.swap(0, Ordering::Relaxed),
            output_tokens: c.output_tokens.swap(0, Ordering::Relaxed),
            estimated_calls: c.estimated_calls.swap(0, Ordering::Relaxed),
        }
    }
}
