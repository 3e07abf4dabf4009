//! Cancellation registry for in-flight stage runs.
//!
//! A concurrency-safe set of cancelled context ids (manuscript ids). The
//! guarded backend consults it immediately before every generation attempt;
//! an attempt already sent to the backend is never interrupted.
//!
//! The registry is an explicit value: clone it into every component that
//! needs it. Clones share the same underlying set.

use dashmap::DashSet;
use std::sync::Arc;
use tracing::info;

use crate::errors::Cancelled;

#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    cancelled: Arc<DashSet<String>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that all further work for `context_id` stop.
    pub fn cancel(&self, context_id: &str) {
        if self.cancelled.insert(context_id.to_string()) {
            info!(context_id, "Cancellation requested");
        }
    }

    /// Clear the flag; called at the start of each stage run.
    pub fn reset(&self, context_id: &str) {
        self.cancelled.remove(context_id);
    }

    pub fn is_cancelled(&self, context_id: &str) -> bool {
        self.cancelled.contains(context_id)
    }

    /// `Err(Cancelled)` when `context_id` has been cancelled.
    pub fn check(&self, context_id: &str) -> Result<(), Cancelled> {
        if self.is_cancelled(context_id) {
            Err(Cancelled::new(context_id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_then_reset() {
        let registry = CancellationRegistry::new();
        assert!(!registry.is_cancelled("ms-1"));

        registry.cancel("ms-1");
        assert!(registry.is_cancelled("ms-1"));
        assert_eq!(registry.check("ms-1"), Err(Cancelled::new("ms-1")));

        registry.reset("ms-1");
        assert!(!registry.is_cancelled("ms-1"));
        assert!(registry.check("ms-1").is_ok());
    }

    #[test]
    fn flags_are_scoped_per_context() {
        let registry = CancellationRegistry::new();
        registry.cancel("ms-1");
        assert!(!registry.is_cancelled("ms-2"));
    }

    #[test]
    fn reset_of_unknown_id_is_a_no_op() {
        let registry = CancellationRegistry::new();
        registry.reset("never-cancelled");
        assert!(!registry.is_cancelled("never-cancelled"));
    }

    #[test]
    fn clones_share_state() {
        let registry = CancellationRegistry::new();
        let handle = registry.clone();
        handle.cancel("ms-9");
        assert!(registry.is_cancelled("ms-9"));
    }

    #[test]
    fn independent_registries_do_not_interfere() {
        let a = CancellationRegistry::new();
        let b = CancellationRegistry::new();
        a.cancel("ms-1");
        assert!(!b.is_cancelled("ms-1"));
    }

    #[tokio::test]
    async fn concurrent_cancel_and_reset_are_safe() {
        let registry = CancellationRegistry::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let r = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("ms-{}", i % 4);
                r.cancel(&id);
                let _ = r.is_cancelled(&id);
                if i % 2 == 0 {
                    r.reset(&id);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        registry.cancel("ms-0");
        assert!(registry.is_cancelled("ms-0"));
    }
}
