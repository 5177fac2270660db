//! Feed events fanned out to the application.

use mex_account::WalletBalance;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::message::{ExecutionRecord, TradeRecord, WelcomeBanner};

/// Everything the dispatcher surfaces beyond book and position state.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Welcome(WelcomeBanner),
    SubscriptionAck {
        channel: String,
        success: bool,
        error: Option<String>,
    },
    /// Authentication failed on the current socket. Subscriptions for
    /// that socket were withheld; the session owner decides whether to
    /// shut down or let the connection recycle.
    AuthFailed { error: String },
    Trades(Vec<TradeRecord>),
    Executions(Vec<ExecutionRecord>),
    Wallets(Vec<WalletBalance>),
    /// A table the dispatcher has no route for, forwarded raw.
    Unhandled {
        table: String,
        data: serde_json::Value,
    },
}

/// Bounded, non-blocking event publisher.
///
/// The feed task must never stall on a slow consumer: when the channel
/// is full the newest event is dropped with a warning. Consumers that
/// fall behind resynchronize from the engine and cache snapshots.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<FeedEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: FeedEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "event sink full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event sink receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_never_blocks_when_full() {
        let (sink, mut rx) = EventSink::new(1);
        sink.publish(FeedEvent::Trades(Vec::new()));
        sink.publish(FeedEvent::Executions(Vec::new()));

        assert!(matches!(rx.try_recv().unwrap(), FeedEvent::Trades(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_after_receiver_dropped() {
        let (sink, rx) = EventSink::new(1);
        drop(rx);
        sink.publish(FeedEvent::Trades(Vec::new()));
    }
}
