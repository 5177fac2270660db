//! Wallet balance records.

use chrono::{DateTime, Utc};
use mex_core::normalize;
use rust_decimal::Decimal;
use serde::Deserialize;

/// One wallet-table record off the wire, amount in smallest units of the
/// venue currency.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub account: i64,
    pub currency: String,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub pending_credit: Decimal,
    #[serde(default)]
    pub pending_debit: Decimal,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A wallet balance in the standard currency and scale.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletBalance {
    pub account: i64,
    pub currency: String,
    pub amount: Decimal,
    pub pending_credit: Decimal,
    pub pending_debit: Decimal,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<WalletRecord> for WalletBalance {
    fn from(record: WalletRecord) -> Self {
        let normalized = normalize(&record.currency, record.amount);
        let scale = |amount| normalize(&record.currency, amount).amount;
        Self {
            account: record.account,
            currency: normalized.code,
            amount: normalized.amount,
            pending_credit: scale(record.pending_credit),
            pending_debit: scale(record.pending_debit),
            timestamp: record.timestamp,
        }
    }
}
