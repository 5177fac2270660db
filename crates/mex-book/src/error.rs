//! Order book error types.

use mex_core::Side;
use thiserror::Error;

/// Errors raised while reconstructing an order book from the feed.
///
/// Everything except `InvalidAction` means the local book can no longer be
/// trusted to match the venue; the session layer decides whether to drop
/// the connection and resnapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookError {
    /// Unknown wire action token.
    #[error("invalid book action token: {token:?}")]
    InvalidAction { token: String },

    /// Insert targeted an id already present on the side.
    #[error("orderbook invalid: duplicate level id {id} on {symbol} {side}")]
    DuplicateLevel { symbol: String, side: Side, id: u64 },

    /// Amend or delete targeted an id that is not on the side.
    #[error("orderbook invalid: level id {id} not found on {symbol} {side}")]
    MissingLevel { symbol: String, side: Side, id: u64 },

    /// A snapshot or insert row arrived without a price. Price is only
    /// legitimately absent on amends and deletes.
    #[error("orderbook invalid: level id {id} on {symbol} {side} has no price")]
    MissingPrice { symbol: String, side: Side, id: u64 },

    /// An update action carried no levels. The venue never sends empty
    /// updates, so this is a desync guard rather than a no-op.
    #[error("orderbook invalid: empty update batch")]
    EmptyUpdate,

    /// Post-mutation validation found the ladder out of id order.
    #[error("orderbook invalid: id ordering violated on {symbol} {side}")]
    OutOfOrder { symbol: String, side: Side },
}

impl BookError {
    /// True for the orderbook-invalid family: the reconstructed book has
    /// diverged from the venue and needs a fresh snapshot.
    pub fn is_orderbook_invalid(&self) -> bool {
        matches!(
            self,
            Self::DuplicateLevel { .. }
                | Self::MissingLevel { .. }
                | Self::MissingPrice { .. }
                | Self::EmptyUpdate
                | Self::OutOfOrder { .. }
        )
    }
}

pub type BookResult<T> = Result<T, BookError>;
