//! Wire message types.
//!
//! Every frame from the venue is one of three shapes: the one-shot
//! welcome banner, a request ack (`success` or `error` plus an echo of
//! the request), or a table push (`table`/`action`/`data`). The shapes
//! carry disjoint marker fields, so an untagged enum classifies them.

use chrono::{DateTime, Utc};
use mex_core::{Price, Side, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Incoming frame, classified by shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    /// Table push: `{"table":..,"action":..,"data":[..]}`.
    Table(TableMessage),
    /// Welcome banner sent once after connect.
    Welcome(WelcomeBanner),
    /// Request ack, positive or negative.
    Ack(AckMessage),
}

/// The banner the venue sends on connect. Informational only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeBanner {
    pub info: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub docs: Option<String>,
    #[serde(default)]
    pub heartbeat_enabled: Option<bool>,
}

/// Ack for a subscribe/unsubscribe/auth request.
///
/// Positive acks carry `success: true` and echo the channel or request;
/// negative acks carry `error` (and usually `status`). A frame with
/// neither marker is not an ack at all; the dispatcher treats it as an
/// unrecognized frame.
#[derive(Debug, Clone, Deserialize)]
pub struct AckMessage {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub subscribe: Option<String>,
    #[serde(default)]
    pub unsubscribe: Option<String>,
    #[serde(default)]
    pub request: Option<Request>,
}

impl AckMessage {
    pub fn is_ack(&self) -> bool {
        self.success.is_some() || self.error.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.success.unwrap_or(false)
    }

    /// Key the ack correlates under: the channel for subscribe and
    /// unsubscribe, the op name for anything else (e.g. auth).
    pub fn correlation_key(&self) -> Option<&str> {
        if let Some(channel) = self.subscribe.as_deref() {
            return Some(channel);
        }
        if let Some(channel) = self.unsubscribe.as_deref() {
            return Some(channel);
        }
        // Negative acks do not echo the channel at top level; fall back to
        // the request echo.
        match self.request.as_ref() {
            Some(request) if request.op == "subscribe" || request.op == "unsubscribe" => {
                request.args.first().and_then(|arg| arg.as_str())
            }
            Some(request) => Some(&request.op),
            None => None,
        }
    }
}

/// A table push frame. `action` is absent on some snapshot frames and
/// defaults to `partial` downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct TableMessage {
    pub table: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outgoing request: `{"op":..,"args":[..]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub op: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<serde_json::Value>,
}

impl Request {
    pub fn subscribe(channels: &[String]) -> Self {
        Self {
            op: "subscribe".to_string(),
            args: channels
                .iter()
                .map(|c| serde_json::Value::String(c.clone()))
                .collect(),
        }
    }

    pub fn unsubscribe(channels: &[String]) -> Self {
        Self {
            op: "unsubscribe".to_string(),
            args: channels
                .iter()
                .map(|c| serde_json::Value::String(c.clone()))
                .collect(),
        }
    }
}

fn opt_side<'de, D>(deserializer: D) -> Result<Option<Side>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // Executions without a direction carry side as an empty string.
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// One public trade.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default, rename = "trdMatchID")]
    pub trd_match_id: Option<String>,
    #[serde(default)]
    pub tick_direction: Option<String>,
    #[serde(default)]
    pub gross_value: Option<Decimal>,
    #[serde(default)]
    pub home_notional: Option<Decimal>,
    #[serde(default)]
    pub foreign_notional: Option<Decimal>,
}

/// One execution report on the authenticated account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    #[serde(rename = "execID")]
    pub exec_id: String,
    #[serde(default, rename = "orderID")]
    pub order_id: Option<String>,
    #[serde(default, rename = "clOrdID")]
    pub cl_ord_id: Option<String>,
    #[serde(default)]
    pub account: Option<i64>,
    pub symbol: String,
    #[serde(default, deserialize_with = "opt_side")]
    pub side: Option<Side>,
    #[serde(default)]
    pub order_qty: Option<Size>,
    #[serde(default)]
    pub last_qty: Option<Size>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub last_px: Option<Price>,
    #[serde(default)]
    pub exec_type: Option<String>,
    #[serde(default)]
    pub ord_type: Option<String>,
    #[serde(default)]
    pub ord_status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
