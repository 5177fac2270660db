//! Frame classification and routing.
//!
//! The reader task feeds raw frames here one at a time. Classification
//! runs in a fixed order: welcome banner, then request acks, then table
//! pushes. Table pushes route by table name to the book engine, the
//! position cache, or typed event fan-out; a malformed record anywhere
//! in a batch fails the whole frame and nothing from it is applied.

use std::sync::Arc;

use mex_account::{PositionCache, PositionPatch, WalletBalance, WalletRecord};
use mex_book::{Action, BookEngine, LevelDelta};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::ack::{AckOutcome, AckRegistry};
use crate::error::StreamResult;
use crate::events::{EventSink, FeedEvent};
use crate::message::{AckMessage, ExecutionRecord, InboundMessage, TableMessage, TradeRecord, WelcomeBanner};

/// What to do with tables the dispatcher has no route for.
///
/// The venue adds tables over time; an unknown table is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTablePolicy {
    /// Forward the raw frame on the event sink.
    #[default]
    Forward,
    /// Log at debug and drop.
    Ignore,
}

pub struct Dispatcher {
    engine: Arc<BookEngine>,
    positions: Arc<PositionCache>,
    registry: Arc<AckRegistry>,
    sink: EventSink,
    policy: UnknownTablePolicy,
    banner: RwLock<Option<WelcomeBanner>>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<BookEngine>,
        positions: Arc<PositionCache>,
        registry: Arc<AckRegistry>,
        sink: EventSink,
    ) -> Self {
        Self {
            engine,
            positions,
            registry,
            sink,
            policy: UnknownTablePolicy::default(),
            banner: RwLock::new(None),
        }
    }

    pub fn with_policy(mut self, policy: UnknownTablePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The welcome banner, once received.
    pub fn banner(&self) -> Option<WelcomeBanner> {
        self.banner.read().clone()
    }

    /// A clone of the event sink, for publishers outside the dispatch
    /// path (e.g. the connection layer reporting a failed handshake).
    pub fn events(&self) -> EventSink {
        self.sink.clone()
    }

    /// Handle one raw text frame. Must be called from a single task;
    /// ordering across frames is part of the venue's contract.
    pub fn handle(&self, raw: &str) -> StreamResult<()> {
        match serde_json::from_str::<InboundMessage>(raw)? {
            InboundMessage::Welcome(banner) => {
                info!(
                    version = banner.version.as_deref().unwrap_or("unknown"),
                    "connected: {}", banner.info
                );
                *self.banner.write() = Some(banner.clone());
                self.sink.publish(FeedEvent::Welcome(banner));
                Ok(())
            }
            InboundMessage::Ack(ack) if ack.is_ack() => {
                self.handle_ack(ack);
                Ok(())
            }
            InboundMessage::Ack(_) => {
                // No marker field at all: a frame shape we do not know.
                match self.policy {
                    UnknownTablePolicy::Forward => self.sink.publish(FeedEvent::Unhandled {
                        table: String::new(),
                        data: serde_json::from_str(raw)?,
                    }),
                    UnknownTablePolicy::Ignore => debug!(frame = raw, "ignoring unknown frame"),
                }
                Ok(())
            }
            InboundMessage::Table(table) => self.handle_table(table),
        }
    }

    fn handle_ack(&self, ack: AckMessage) {
        let success = ack.is_success();
        let Some(key) = ack.correlation_key().map(str::to_string) else {
            warn!(?ack.error, "ack without a correlation key");
            return;
        };

        let outcome = if success {
            AckOutcome::success()
        } else {
            AckOutcome::failure(ack.error.clone().unwrap_or_else(|| "unspecified".to_string()))
        };
        if !self.registry.resolve(&key, outcome) {
            debug!(key = %key, "ack arrived with no waiter");
        }

        self.sink.publish(FeedEvent::SubscriptionAck {
            channel: key,
            success,
            error: ack.error,
        });
    }

    fn handle_table(&self, frame: TableMessage) -> StreamResult<()> {
        let action = match frame.action.as_deref() {
            Some(token) => Action::parse(token)?,
            None => Action::Partial,
        };

        match frame.table.as_str() {
            table if table.starts_with("orderBookL2") => {
                let deltas: Vec<LevelDelta> = serde_json::from_value(frame.data)?;
                self.engine.apply(action, deltas)?;
            }
            "position" => {
                let patches: Vec<PositionPatch> = serde_json::from_value(frame.data)?;
                for patch in patches {
                    if action == Action::Delete {
                        self.positions.remove(patch.account, &patch.symbol);
                    } else {
                        self.positions.apply(patch);
                    }
                }
            }
            "trade" => {
                let trades: Vec<TradeRecord> = serde_json::from_value(frame.data)?;
                self.sink.publish(FeedEvent::Trades(trades));
            }
            "execution" => {
                let executions: Vec<ExecutionRecord> = serde_json::from_value(frame.data)?;
                self.sink.publish(FeedEvent::Executions(executions));
            }
            "wallet" => {
                let records: Vec<WalletRecord> = serde_json::from_value(frame.data)?;
                let balances = records.into_iter().map(WalletBalance::from).collect();
                self.sink.publish(FeedEvent::Wallets(balances));
            }
            other => match self.policy {
                UnknownTablePolicy::Forward => {
                    self.sink.publish(FeedEvent::Unhandled {
                        table: other.to_string(),
                        data: frame.data,
                    });
                }
                UnknownTablePolicy::Ignore => {
                    debug!(table = other, "ignoring unrecognized table");
                }
            },
        }
        Ok(())
    }
}
