//! Account-scoped state: positions and wallet balances.
//!
//! The venue streams account tables as merge patches. This crate holds
//! the tri-state patch field type, the position records it patches, a
//! concurrent cache keyed by `(account, symbol)`, and wallet balance
//! normalization. Patch application never fails; malformed frames are
//! rejected upstream at decode time.

pub mod cache;
pub mod field;
pub mod position;
pub mod wallet;

pub use cache::PositionCache;
pub use field::Field;
pub use position::{Position, PositionPatch};
pub use wallet::{WalletBalance, WalletRecord};
