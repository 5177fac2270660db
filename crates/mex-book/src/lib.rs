//! Order book reconstruction from venue delta feeds.
//!
//! The venue streams per-table deltas (`partial`, `insert`, `update`,
//! `delete`, `update/insert`) against per-symbol, per-side price ladders
//! keyed by an exchange-assigned level id. This crate rebuilds and
//! maintains those ladders and surfaces any disagreement between the feed
//! and local state as a typed desync error.

pub mod action;
pub mod engine;
pub mod error;
pub mod ladder;

pub use action::Action;
pub use engine::{BookEngine, BookEvent, BookSnapshot};
pub use error::{BookError, BookResult};
pub use ladder::{Ladder, Level, LevelDelta};
