//! Ack correlation between request senders and the reader task.
//!
//! A task that sends a subscribe or auth request registers a waiter
//! under the correlation key before sending; the reader resolves it when
//! the matching ack arrives. One waiter per key at a time.

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

/// Resolution of one awaited request.
#[derive(Debug, Clone)]
pub struct AckOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl AckOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Pending waiters keyed by channel name or op.
#[derive(Debug, Default)]
pub struct AckRegistry {
    waiters: DashMap<String, oneshot::Sender<AckOutcome>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key`. Returns `None` when a waiter for the
    /// same key is already in flight.
    pub fn register(&self, key: &str) -> Option<oneshot::Receiver<AckOutcome>> {
        use dashmap::mapref::entry::Entry;
        match self.waiters.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Some(rx)
            }
        }
    }

    /// Resolve the waiter for `key`, if any. Returns whether a waiter was
    /// found; unmatched acks are normal after a timeout.
    pub fn resolve(&self, key: &str, outcome: AckOutcome) -> bool {
        match self.waiters.remove(key) {
            Some((_, tx)) => {
                if tx.send(outcome).is_err() {
                    debug!(key, "ack waiter gave up before resolution");
                }
                true
            }
            None => false,
        }
    }

    /// Drop the waiter for `key` without resolving it (caller timed out).
    pub fn cancel(&self, key: &str) {
        self.waiters.remove(key);
    }

    /// Fail every pending waiter, e.g. on disconnect.
    pub fn fail_all(&self, reason: &str) {
        let keys: Vec<String> = self.waiters.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.resolve(&key, AckOutcome::failure(reason));
        }
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_resolve() {
        let registry = AckRegistry::new();
        let mut rx = registry.register("trade:ETHUSD").unwrap();
        assert!(rx.try_recv().is_err());

        assert!(registry.resolve("trade:ETHUSD", AckOutcome::success()));
        assert!(rx.try_recv().unwrap().success);
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_double_register_is_refused() {
        let registry = AckRegistry::new();
        let _rx = registry.register("authKeyExpires").unwrap();
        assert!(registry.register("authKeyExpires").is_none());
    }

    #[test]
    fn test_unmatched_ack_is_not_an_error() {
        let registry = AckRegistry::new();
        assert!(!registry.resolve("trade:ETHUSD", AckOutcome::success()));
    }

    #[test]
    fn test_cancel_then_reregister() {
        let registry = AckRegistry::new();
        let _rx = registry.register("trade:ETHUSD").unwrap();
        registry.cancel("trade:ETHUSD");
        assert!(registry.register("trade:ETHUSD").is_some());
    }

    #[test]
    fn test_fail_all() {
        let registry = AckRegistry::new();
        let mut rx_a = registry.register("trade:ETHUSD").unwrap();
        let mut rx_b = registry.register("authKeyExpires").unwrap();
        registry.fail_all("connection lost");

        let outcome = rx_a.try_recv().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("connection lost"));
        assert!(!rx_b.try_recv().unwrap().success);
    }
}
