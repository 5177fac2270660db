//! Core domain types for the mex streaming client.
//!
//! This crate provides the primitives shared by the order book, account
//! and stream crates:
//! - `Price`, `Size`: precision-safe numeric types
//! - `Side`: order book / trade side
//! - currency normalization for venue-internal settlement codes

pub mod currency;
pub mod decimal;
pub mod error;
pub mod side;

pub use currency::{normalize, normalize_code, Normalized};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use side::Side;
