//! Multi-symbol book state and batch application.
//!
//! A single feed task applies delta batches sequentially through
//! [`BookEngine::apply`]; any number of readers take point-in-time
//! snapshots concurrently. A batch either applies completely or not at
//! all: mutations run on a working copy of the symbol's book and commit
//! only on success, so a mid-batch fault leaves the last complete state
//! visible to readers.

use std::collections::HashMap;

use mex_core::Side;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::action::Action;
use crate::error::{BookError, BookResult};
use crate::ladder::{Ladder, Level, LevelDelta};

/// Both sides of one symbol's book.
#[derive(Debug, Clone)]
struct SymbolBook {
    bids: Ladder,
    asks: Ladder,
}

impl SymbolBook {
    fn new(symbol: &str) -> Self {
        Self {
            bids: Ladder::new(symbol, Side::Buy),
            asks: Ladder::new(symbol, Side::Sell),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut Ladder {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn apply(&mut self, action: Action, deltas: Vec<LevelDelta>) -> BookResult<()> {
        match action {
            Action::Partial => {
                let (buys, sells): (Vec<_>, Vec<_>) =
                    deltas.into_iter().partition(|d| d.side == Side::Buy);
                self.bids.replace(buys)?;
                self.asks.replace(sells)?;
            }
            Action::Insert => {
                for delta in deltas {
                    self.side_mut(delta.side).insert(delta)?;
                }
            }
            Action::Update => {
                for delta in &deltas {
                    self.side_mut(delta.side).amend(delta)?;
                }
            }
            Action::Delete => {
                for delta in deltas {
                    self.side_mut(delta.side).delete(delta.id)?;
                }
            }
            Action::UpdateInsert => {
                for delta in deltas {
                    self.side_mut(delta.side).upsert(delta)?;
                }
            }
        }
        debug_assert!(self.bids.is_ordered() && self.asks.is_ordered());
        Ok(())
    }
}

/// A point-in-time copy of one symbol's book, levels in ascending id order.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    pub symbol: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Notification that a symbol's book changed.
#[derive(Debug, Clone)]
pub struct BookEvent {
    pub symbol: String,
    pub action: Action,
    pub bid_depth: usize,
    pub ask_depth: usize,
}

/// Shared book state for every subscribed symbol.
#[derive(Debug)]
pub struct BookEngine {
    books: RwLock<HashMap<String, SymbolBook>>,
    events: Option<mpsc::Sender<BookEvent>>,
}

impl Default for BookEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BookEngine {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            events: None,
        }
    }

    /// An engine that publishes a [`BookEvent`] after every committed
    /// batch. The channel is bounded; when the consumer falls behind, the
    /// newest event is dropped with a warning rather than blocking the
    /// feed task. Consumers resynchronize via [`BookEngine::snapshot`].
    pub fn with_events(capacity: usize) -> (Self, mpsc::Receiver<BookEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let engine = Self {
            books: RwLock::new(HashMap::new()),
            events: Some(tx),
        };
        (engine, rx)
    }

    /// Apply one table-scoped delta batch.
    ///
    /// The batch may span symbols; rows are grouped per symbol in arrival
    /// order and each symbol's mutations commit atomically. When a later
    /// group faults, groups committed before it stay committed; the error
    /// names the symbol where application stopped, and every ladder is
    /// still a complete pre- or post-batch book. An empty `update` batch
    /// is a protocol fault; an empty snapshot is not.
    pub fn apply(&self, action: Action, deltas: Vec<LevelDelta>) -> BookResult<()> {
        if deltas.is_empty() {
            return match action {
                Action::Update => Err(BookError::EmptyUpdate),
                _ => Ok(()),
            };
        }

        for (symbol, group) in group_by_symbol(deltas) {
            self.apply_symbol(&symbol, action, group)?;
        }
        Ok(())
    }

    fn apply_symbol(
        &self,
        symbol: &str,
        action: Action,
        deltas: Vec<LevelDelta>,
    ) -> BookResult<()> {
        let mut books = self.books.write();
        let mut working = match action {
            // A snapshot replaces whatever was there, including nothing.
            Action::Partial => SymbolBook::new(symbol),
            _ => books
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| SymbolBook::new(symbol)),
        };
        working.apply(action, deltas)?;

        let event = BookEvent {
            symbol: symbol.to_string(),
            action,
            bid_depth: working.bids.len(),
            ask_depth: working.asks.len(),
        };
        books.insert(symbol.to_string(), working);
        drop(books);

        self.publish(event);
        Ok(())
    }

    fn publish(&self, event: BookEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(symbol = %event.symbol, "book event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("book event channel closed");
            }
        }
    }

    /// A point-in-time copy of one symbol's book.
    pub fn snapshot(&self, symbol: &str) -> Option<BookSnapshot> {
        let books = self.books.read();
        let book = books.get(symbol)?;
        Some(BookSnapshot {
            symbol: symbol.to_string(),
            bids: book.bids.levels().to_vec(),
            asks: book.asks.levels().to_vec(),
        })
    }

    /// Symbols with a tracked book.
    pub fn symbols(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }

    /// Forget one symbol's book, e.g. after a desync before resubscribing.
    pub fn invalidate(&self, symbol: &str) -> bool {
        self.books.write().remove(symbol).is_some()
    }
}

fn group_by_symbol(deltas: Vec<LevelDelta>) -> Vec<(String, Vec<LevelDelta>)> {
    // Batches are small and almost always single-symbol; a linear scan
    // beats a map allocation here.
    let mut groups: Vec<(String, Vec<LevelDelta>)> = Vec::new();
    for delta in deltas {
        match groups.iter_mut().find(|(symbol, _)| *symbol == delta.symbol) {
            Some((_, group)) => group.push(delta),
            None => groups.push((delta.symbol.clone(), vec![delta])),
        }
    }
    groups
}
