//! Concurrent position cache.

use dashmap::DashMap;
use tracing::debug;

use crate::position::{Position, PositionPatch};

/// All known positions, keyed by `(account, symbol)`.
///
/// The feed task applies patches sequentially; readers query concurrently.
/// Application is infallible: patches for unknown keys create the
/// position, and unknown lifecycle states are stored verbatim.
#[derive(Debug, Default)]
pub struct PositionCache {
    positions: DashMap<(i64, String), Position>,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one patch into the cache.
    pub fn apply(&self, patch: PositionPatch) {
        let key = (patch.account, patch.symbol.clone());
        let mut entry = self
            .positions
            .entry(key)
            .or_insert_with(|| Position::new(patch.account, patch.symbol.clone()));
        entry.merge(patch);
        debug!(
            account = entry.account,
            symbol = %entry.symbol,
            qty = %entry.current_qty,
            "position updated"
        );
    }

    /// Current state of one position, if any patch has mentioned it.
    pub fn get(&self, account: i64, symbol: &str) -> Option<Position> {
        self.positions
            .get(&(account, symbol.to_string()))
            .map(|entry| entry.clone())
    }

    /// Drop one position, e.g. on a table delete.
    pub fn remove(&self, account: i64, symbol: &str) -> Option<Position> {
        self.positions
            .remove(&(account, symbol.to_string()))
            .map(|(_, position)| position)
    }

    /// Snapshot of every tracked position.
    pub fn all(&self) -> Vec<Position> {
        self.positions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn patch(json: &str) -> PositionPatch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_apply_creates_then_merges() {
        let cache = PositionCache::new();
        cache.apply(patch(
            r#"{"account":2,"symbol":"ETHUSD","currency":"XBt","currentQty":100,"isOpen":true}"#,
        ));
        cache.apply(patch(
            r#"{"account":2,"symbol":"ETHUSD","isOpen":false,"markPrice":null}"#,
        ));

        let position = cache.get(2, "ETHUSD").unwrap();
        assert_eq!(position.current_qty, dec!(100));
        assert!(!position.is_open);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_accounts_are_isolated() {
        let cache = PositionCache::new();
        cache.apply(patch(r#"{"account":2,"symbol":"ETHUSD","currentQty":100}"#));
        cache.apply(patch(r#"{"account":3,"symbol":"ETHUSD","currentQty":-50}"#));

        assert_eq!(cache.get(2, "ETHUSD").unwrap().current_qty, dec!(100));
        assert_eq!(cache.get(3, "ETHUSD").unwrap().current_qty, dec!(-50));
        assert!(cache.get(2, "XBTUSD").is_none());
    }

    #[test]
    fn test_remove() {
        let cache = PositionCache::new();
        cache.apply(patch(r#"{"account":2,"symbol":"ETHUSD","currentQty":100}"#));
        assert!(cache.remove(2, "ETHUSD").is_some());
        assert!(cache.is_empty());
        assert!(cache.remove(2, "ETHUSD").is_none());
    }
}
