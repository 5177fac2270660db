//! WebSocket streaming session for the venue's realtime API.
//!
//! One connection carries everything: the welcome banner, request acks,
//! and table pushes. A single reader task classifies frames through the
//! [`Dispatcher`], which routes book deltas to `mex-book`, account
//! patches to `mex-account`, and typed records to a bounded event sink.
//! Authentication and subscription requests correlate with their acks
//! through the [`AckRegistry`].

pub mod ack;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod message;
pub mod session;

pub use ack::{AckOutcome, AckRegistry};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use dispatcher::{Dispatcher, UnknownTablePolicy};
pub use error::{StreamError, StreamResult};
pub use events::{EventSink, FeedEvent};
pub use message::{
    AckMessage, ExecutionRecord, InboundMessage, Request, TableMessage, TradeRecord, WelcomeBanner,
};
pub use session::{Clock, Credentials, ExpirySource, SessionHandshake, SystemClock, AUTH_OP};
