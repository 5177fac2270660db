//! Position records and merge-patch application.

use chrono::{DateTime, Utc};
use mex_core::{normalize, normalize_code, Price};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::field::Field;

/// One position-table record off the wire.
///
/// Everything past the `(account, symbol)` key is a tri-state patch
/// field. Margin and PnL amounts arrive in smallest units of the
/// settlement currency (e.g. satoshi for `XBt`-margined contracts).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPatch {
    pub account: i64,
    pub symbol: String,
    #[serde(default)]
    pub currency: Field<String>,
    #[serde(default)]
    pub current_qty: Field<Decimal>,
    #[serde(default)]
    pub avg_entry_price: Field<Price>,
    #[serde(default)]
    pub mark_price: Field<Price>,
    #[serde(default)]
    pub mark_value: Field<Decimal>,
    #[serde(default)]
    pub risk_value: Field<Decimal>,
    #[serde(default)]
    pub maint_margin: Field<Decimal>,
    #[serde(default)]
    pub unrealised_pnl: Field<Decimal>,
    #[serde(default)]
    pub realised_pnl: Field<Decimal>,
    #[serde(default)]
    pub liquidation_price: Field<Price>,
    #[serde(default)]
    pub bankrupt_price: Field<Price>,
    #[serde(default)]
    pub leverage: Field<Decimal>,
    #[serde(default)]
    pub cross_margin: Field<bool>,
    #[serde(default)]
    pub is_open: Field<bool>,
    #[serde(default, rename = "posState")]
    pub state: Field<String>,
    #[serde(default)]
    pub timestamp: Field<DateTime<Utc>>,
}

/// Current state of one position, merged from successive patches.
///
/// Fields a patch has never set (or has cleared with an explicit null)
/// hold their zero value. Monetary amounts are stored normalized to the
/// standard settlement currency named by `currency`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    pub account: i64,
    pub symbol: String,
    /// Normalized settlement currency code (e.g. `BTC`), empty until a
    /// patch names one.
    pub currency: String,
    pub current_qty: Decimal,
    pub avg_entry_price: Price,
    pub mark_price: Price,
    pub mark_value: Decimal,
    pub risk_value: Decimal,
    pub maint_margin: Decimal,
    pub unrealised_pnl: Decimal,
    pub realised_pnl: Decimal,
    pub liquidation_price: Price,
    pub bankrupt_price: Price,
    pub leverage: Decimal,
    pub cross_margin: bool,
    pub is_open: bool,
    /// Latest venue lifecycle string, e.g. `Liquidation` or `Deleverage`.
    pub state: String,
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw venue currency code, kept so amounts on later patches that omit
    /// `currency` still scale correctly.
    raw_currency: String,
}

impl Position {
    pub fn new(account: i64, symbol: impl Into<String>) -> Self {
        Self {
            account,
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Merge one patch into this position. Never fails; unknown states and
    /// partial records are data, not faults.
    pub fn merge(&mut self, patch: PositionPatch) {
        debug_assert_eq!(self.account, patch.account);
        debug_assert_eq!(self.symbol, patch.symbol);

        if let Some(code) = patch.currency.value() {
            self.raw_currency = code.clone();
        }
        let raw = self.raw_currency.clone();
        let scale = |amount: Decimal| normalize(&raw, amount).amount;

        patch
            .currency
            .map(|code| normalize_code(&code))
            .merge_into(&mut self.currency);
        patch.current_qty.merge_into(&mut self.current_qty);
        patch.avg_entry_price.merge_into(&mut self.avg_entry_price);
        patch.mark_price.merge_into(&mut self.mark_price);
        patch.mark_value.map(scale).merge_into(&mut self.mark_value);
        patch.risk_value.map(scale).merge_into(&mut self.risk_value);
        patch
            .maint_margin
            .map(scale)
            .merge_into(&mut self.maint_margin);
        patch
            .unrealised_pnl
            .map(scale)
            .merge_into(&mut self.unrealised_pnl);
        patch
            .realised_pnl
            .map(scale)
            .merge_into(&mut self.realised_pnl);
        patch
            .liquidation_price
            .merge_into(&mut self.liquidation_price);
        patch.bankrupt_price.merge_into(&mut self.bankrupt_price);
        patch.leverage.merge_into(&mut self.leverage);
        patch.cross_margin.merge_into(&mut self.cross_margin);
        patch.is_open.merge_into(&mut self.is_open);
        patch.state.merge_into(&mut self.state);
        patch.timestamp.merge_opt(&mut self.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_patch_decodes_tri_state_fields() {
        let patch: PositionPatch = serde_json::from_str(
            r#"{"account":2,"symbol":"ETHUSD","currency":"XBt",
                "currentQty":100,"markPrice":null,"posState":"Liquidation"}"#,
        )
        .unwrap();
        assert_eq!(patch.account, 2);
        assert_eq!(patch.current_qty, Field::Value(dec!(100)));
        assert_eq!(patch.mark_price, Field::Null);
        assert!(patch.liquidation_price.is_absent());
        assert_eq!(patch.state, Field::Value("Liquidation".to_string()));
    }

    #[test]
    fn test_merge_respects_absent_null_value() {
        let mut position = Position::new(2, "ETHUSD");
        let open: PositionPatch = serde_json::from_str(
            r#"{"account":2,"symbol":"ETHUSD","currency":"XBt","currentQty":100,
                "markPrice":1136.88,"isOpen":true}"#,
        )
        .unwrap();
        position.merge(open);
        assert_eq!(position.current_qty, dec!(100));
        assert_eq!(position.mark_price, Price::new(dec!(1136.88)));
        assert!(position.is_open);

        // Close-out patch: qty untouched (absent), mark price cleared.
        let close: PositionPatch = serde_json::from_str(
            r#"{"account":2,"symbol":"ETHUSD","isOpen":false,"markPrice":null}"#,
        )
        .unwrap();
        position.merge(close);
        assert_eq!(position.current_qty, dec!(100));
        assert_eq!(position.mark_price, Price::ZERO);
        assert!(!position.is_open);
    }

    #[test]
    fn test_margin_amounts_normalize_to_settlement_currency() {
        let mut position = Position::new(2, "ETHUSD");
        let patch: PositionPatch = serde_json::from_str(
            r#"{"account":2,"symbol":"ETHUSD","currency":"XBt","maintMargin":263,
                "unrealisedPnl":-149}"#,
        )
        .unwrap();
        position.merge(patch);
        assert_eq!(position.currency, "BTC");
        assert_eq!(position.maint_margin, dec!(0.00000263));
        assert_eq!(position.unrealised_pnl, dec!(-0.00000149));
    }

    #[test]
    fn test_amounts_scale_with_remembered_currency() {
        let mut position = Position::new(2, "ETHUSD");
        position.merge(
            serde_json::from_str(r#"{"account":2,"symbol":"ETHUSD","currency":"XBt"}"#).unwrap(),
        );
        // Later patch omits the currency; satoshi scaling must still apply.
        position.merge(
            serde_json::from_str(r#"{"account":2,"symbol":"ETHUSD","realisedPnl":100000000}"#)
                .unwrap(),
        );
        assert_eq!(position.realised_pnl, dec!(1));
    }

    #[test]
    fn test_state_stores_latest_literal() {
        let mut position = Position::new(2, "ETHUSD");
        for state in ["Liquidation", "Deleverage", "Liquidated"] {
            let patch: PositionPatch = serde_json::from_str(&format!(
                r#"{{"account":2,"symbol":"ETHUSD","posState":"{state}"}}"#
            ))
            .unwrap();
            position.merge(patch);
            assert_eq!(position.state, state);
        }
    }
}
