//! Currency normalization for venue-internal settlement codes.
//!
//! The venue reports margin and wallet amounts in its internal settlement
//! currencies, denominated in smallest units (e.g. `XBt` = satoshi).
//! `normalize` maps those onto standard codes and decimal-scaled amounts.
//! Already-standard pairs pass through unchanged, so the operation is
//! idempotent.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// A normalized (code, amount) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub code: String,
    pub amount: Decimal,
}

/// Scale table for venue-internal codes: (venue code, standard code, divisor).
fn scale_for(code: &str) -> Option<(&'static str, Decimal)> {
    match code {
        "XBt" => Some(("BTC", dec!(100_000_000))),
        "USDt" => Some(("USDT", dec!(1_000_000))),
        "Gwei" => Some(("ETH", dec!(1_000_000_000))),
        _ => None,
    }
}

/// Normalize a raw (code, amount) pair from the venue.
///
/// Venue-internal codes are converted to the standard currency code with
/// the amount scaled down from smallest units; anything else is returned
/// as-is.
pub fn normalize(code: &str, amount: Decimal) -> Normalized {
    match scale_for(code) {
        Some((standard, divisor)) => Normalized {
            code: standard.to_string(),
            amount: amount / divisor,
        },
        None => Normalized {
            code: code.to_string(),
            amount,
        },
    }
}

/// Normalize a bare currency code without an amount.
pub fn normalize_code(code: &str) -> String {
    match scale_for(code) {
        Some((standard, _)) => standard.to_string(),
        None => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satoshi_to_btc() {
        let n = normalize("XBt", dec!(100_000_000));
        assert_eq!(n.code, "BTC");
        assert_eq!(n.amount, dec!(1));
    }

    #[test]
    fn test_standard_code_is_noop() {
        let n = normalize("BTC", dec!(1.5));
        assert_eq!(n.code, "BTC");
        assert_eq!(n.amount, dec!(1.5));

        // Idempotence: normalizing the output changes nothing.
        let again = normalize(&n.code, n.amount);
        assert_eq!(again, n);
    }

    #[test]
    fn test_round_trip_reproduces_original() {
        let original = dec!(0.00052731);
        let smallest_units = original * dec!(100_000_000);
        let n = normalize("XBt", smallest_units);
        assert_eq!(n.amount, original);
    }

    #[test]
    fn test_tether_and_gwei_scales() {
        assert_eq!(
            normalize("USDt", dec!(2_500_000)),
            Normalized {
                code: "USDT".to_string(),
                amount: dec!(2.5)
            }
        );
        assert_eq!(normalize("Gwei", dec!(1_000_000_000)).code, "ETH");
    }
}
