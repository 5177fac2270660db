//! Per-symbol, per-side price ladders keyed by exchange-assigned level id.
//!
//! The venue identifies each price level by an opaque `u64` id and keeps
//! every side's levels in ascending id order. The id encodes the venue's
//! own priority; it is never decoded back into a price, and levels are
//! never reordered by price locally.

use chrono::{DateTime, Utc};
use mex_core::{Price, Side, Size};
use serde::Deserialize;

use crate::error::{BookError, BookResult};

/// One resting price level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub id: u64,
    pub price: Price,
    pub size: Size,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One row of a table-scoped delta batch, as decoded off the wire.
///
/// `price` is present on snapshots and inserts, absent on size-only
/// updates and deletes. `size` is absent on deletes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LevelDelta {
    pub symbol: String,
    pub id: u64,
    pub side: Side,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LevelDelta {
    /// A snapshot or insert row must carry a price; a priceless row would
    /// otherwise materialize as a phantom price-zero level.
    fn into_level(self) -> BookResult<Level> {
        let Some(price) = self.price else {
            return Err(BookError::MissingPrice {
                symbol: self.symbol,
                side: self.side,
                id: self.id,
            });
        };
        Ok(Level {
            id: self.id,
            price,
            size: self.size.unwrap_or_default(),
            timestamp: self.timestamp,
        })
    }
}

/// One side of a symbol's book, levels held in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    symbol: String,
    side: Side,
    levels: Vec<Level>,
}

impl Ladder {
    pub fn new(symbol: impl Into<String>, side: Side) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            levels: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels in ascending id order.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, id: u64) -> Option<&Level> {
        self.position(id).ok().map(|i| &self.levels[i])
    }

    fn position(&self, id: u64) -> Result<usize, usize> {
        self.levels.binary_search_by_key(&id, |level| level.id)
    }

    /// Discard all levels and rebuild from a snapshot batch.
    ///
    /// The batch is sorted into id order locally; a duplicate id inside
    /// the snapshot itself is a protocol fault. An empty batch is a valid
    /// (empty) side.
    pub fn replace(&mut self, deltas: Vec<LevelDelta>) -> BookResult<()> {
        let mut levels: Vec<Level> = deltas
            .into_iter()
            .map(LevelDelta::into_level)
            .collect::<BookResult<_>>()?;
        levels.sort_by_key(|level| level.id);
        if let Some(dup) = levels.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(self.duplicate(dup[0].id));
        }
        self.levels = levels;
        Ok(())
    }

    /// Insert a new level. The id must not already be present.
    pub fn insert(&mut self, delta: LevelDelta) -> BookResult<()> {
        match self.position(delta.id) {
            Ok(_) => Err(self.duplicate(delta.id)),
            Err(at) => {
                self.levels.insert(at, delta.into_level()?);
                Ok(())
            }
        }
    }

    /// Amend an existing level in place. Only the fields present on the
    /// delta change; a size-only update leaves the price untouched.
    pub fn amend(&mut self, delta: &LevelDelta) -> BookResult<()> {
        let at = self.position(delta.id).map_err(|_| self.missing(delta.id))?;
        let level = &mut self.levels[at];
        if let Some(price) = delta.price {
            level.price = price;
        }
        if let Some(size) = delta.size {
            level.size = size;
        }
        if delta.timestamp.is_some() {
            level.timestamp = delta.timestamp;
        }
        Ok(())
    }

    /// Remove an existing level. A second delete of the same id is the
    /// primary signal that the local book has diverged from the venue.
    pub fn delete(&mut self, id: u64) -> BookResult<()> {
        let at = self.position(id).map_err(|_| self.missing(id))?;
        self.levels.remove(at);
        Ok(())
    }

    /// Amend when the id exists, insert otherwise.
    pub fn upsert(&mut self, delta: LevelDelta) -> BookResult<()> {
        if self.position(delta.id).is_ok() {
            self.amend(&delta)
        } else {
            self.insert(delta)
        }
    }

    /// Whether the levels are in strictly ascending id order.
    pub fn is_ordered(&self) -> bool {
        self.levels.windows(2).all(|pair| pair[0].id < pair[1].id)
    }

    fn duplicate(&self, id: u64) -> BookError {
        BookError::DuplicateLevel {
            symbol: self.symbol.clone(),
            side: self.side,
            id,
        }
    }

    fn missing(&self, id: u64) -> BookError {
        BookError::MissingLevel {
            symbol: self.symbol.clone(),
            side: self.side,
            id,
        }
    }
}
