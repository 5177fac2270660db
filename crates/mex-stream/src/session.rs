//! Authenticated session handshake.
//!
//! Authentication is a single signed frame:
//! `{"op":"authKeyExpires","args":[key, expires, signature]}` where
//! `signature = hex(HMAC-SHA256(secret, "GET/realtime" + expires))` and
//! `expires` is a Unix timestamp a short grace window in the future. The
//! venue answers with a correlated ack on the same socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ack::AckRegistry;
use crate::error::{StreamError, StreamResult};
use crate::message::Request;

/// Op name of the auth request; acks correlate under it.
pub const AUTH_OP: &str = "authKeyExpires";

const SIGN_PAYLOAD_PREFIX: &str = "GET/realtime";

/// API credentials. The secret is wiped from memory on drop and never
/// appears in logs or debug output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Trait for obtaining current time, enabling testability.
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds.
    fn now_secs(&self) -> u64;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Issues auth expiry timestamps that are strictly increasing even when
/// the wall clock regresses, so a re-auth can never replay an earlier
/// signature's expiry.
pub struct ExpirySource<C: Clock> {
    last: AtomicU64,
    grace: Duration,
    clock: C,
}

impl<C: Clock> ExpirySource<C> {
    pub fn new(grace: Duration, clock: C) -> Self {
        Self {
            last: AtomicU64::new(0),
            grace,
            clock,
        }
    }

    /// Next expiry: `max(last + 1, now + grace)`. Thread-safe via CAS loop.
    pub fn next(&self) -> u64 {
        let target = self.clock.now_secs().saturating_add(self.grace.as_secs());
        loop {
            let current = self.last.load(Ordering::Acquire);
            let next_val = current.saturating_add(1).max(target);
            match self.last.compare_exchange_weak(
                current,
                next_val,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next_val,
                Err(_) => continue,
            }
        }
    }
}

/// Signature over the canonical auth payload, hex-encoded.
pub fn sign_auth(secret: &str, expires: u64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(SIGN_PAYLOAD_PREFIX.as_bytes());
    mac.update(expires.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Drives the auth exchange on an established connection.
pub struct SessionHandshake<C: Clock = SystemClock> {
    credentials: Credentials,
    expiry: ExpirySource<C>,
    ack_timeout: Duration,
}

impl SessionHandshake<SystemClock> {
    pub fn new(credentials: Credentials, grace: Duration, ack_timeout: Duration) -> Self {
        Self::with_clock(credentials, grace, ack_timeout, SystemClock)
    }
}

impl<C: Clock> SessionHandshake<C> {
    pub fn with_clock(
        credentials: Credentials,
        grace: Duration,
        ack_timeout: Duration,
        clock: C,
    ) -> Self {
        Self {
            credentials,
            expiry: ExpirySource::new(grace, clock),
            ack_timeout,
        }
    }

    /// The signed auth frame for a fresh expiry.
    pub fn auth_request(&self) -> Request {
        let expires = self.expiry.next();
        let signature = sign_auth(&self.credentials.api_secret, expires);
        Request {
            op: AUTH_OP.to_string(),
            args: vec![
                json!(self.credentials.api_key),
                json!(expires),
                json!(signature),
            ],
        }
    }

    /// Send the auth request and await its ack.
    ///
    /// The reader task must keep draining frames into the dispatcher while
    /// this future is pending, otherwise the ack can never resolve. A
    /// timeout is distinct from an explicit rejection: the former says
    /// nothing about credential validity.
    pub async fn authenticate(
        &self,
        outbound: &mpsc::Sender<String>,
        registry: &AckRegistry,
    ) -> StreamResult<()> {
        let rx = registry
            .register(AUTH_OP)
            .ok_or(StreamError::HandshakeInFlight)?;

        let frame = serde_json::to_string(&self.auth_request())?;
        debug!(key = %self.credentials.api_key, "sending auth request");
        if outbound.send(frame).await.is_err() {
            registry.cancel(AUTH_OP);
            return Err(StreamError::ConnectionFailed(
                "outbound channel closed before auth".to_string(),
            ));
        }

        match timeout(self.ack_timeout, rx).await {
            Err(_) => {
                registry.cancel(AUTH_OP);
                Err(StreamError::HandshakeTimeout(self.ack_timeout))
            }
            Ok(Err(_)) => Err(StreamError::ConnectionFailed(
                "connection dropped before auth ack".to_string(),
            )),
            Ok(Ok(outcome)) if outcome.success => {
                info!("session authenticated");
                Ok(())
            }
            Ok(Ok(outcome)) => Err(StreamError::HandshakeRejected(
                outcome.error.unwrap_or_else(|| "unspecified".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    use super::*;
    use crate::ack::AckOutcome;

    /// Mock clock with controllable time.
    struct MockClock {
        secs: AtomicU64,
    }

    impl MockClock {
        fn new(initial: u64) -> Self {
            Self {
                secs: AtomicU64::new(initial),
            }
        }

        fn set(&self, secs: u64) {
            self.secs.store(secs, Ordering::Release);
        }
    }

    impl Clock for Arc<MockClock> {
        fn now_secs(&self) -> u64 {
            self.secs.load(Ordering::Acquire)
        }
    }

    const BASE_TIME: u64 = 1_573_726_900;

    fn handshake(clock: Arc<MockClock>) -> SessionHandshake<Arc<MockClock>> {
        SessionHandshake::with_clock(
            Credentials::new("api-key", "api-secret"),
            Duration::from_secs(10),
            Duration::from_millis(50),
            clock,
        )
    }

    #[test]
    fn test_signature_matches_reference() {
        // hex(HMAC-SHA256("chNOOS4KvNXR_Xq4k4c9qsfoKWvnDecLATCRlcBwyKDYnWgO",
        //                 "GET/realtime1518064237"))
        let signature = sign_auth(
            "chNOOS4KvNXR_Xq4k4c9qsfoKWvnDecLATCRlcBwyKDYnWgO",
            1_518_064_237,
        );
        assert_eq!(
            signature,
            "36c781f56dbbb9d8c511dc0d3c201cabbeb99aff714023d6de1b77ad0b1ffad2"
        );
    }

    #[test]
    fn test_expiries_strictly_increase_under_clock_regression() {
        let clock = Arc::new(MockClock::new(BASE_TIME));
        let source = ExpirySource::new(Duration::from_secs(10), Arc::clone(&clock));

        let e1 = source.next();
        assert_eq!(e1, BASE_TIME + 10);

        clock.set(BASE_TIME - 100);
        let e2 = source.next();
        let e3 = source.next();
        assert!(e2 > e1, "expiry must not regress with the clock");
        assert!(e3 > e2);
    }

    #[test]
    fn test_auth_request_shape() {
        let clock = Arc::new(MockClock::new(BASE_TIME));
        let hs = handshake(clock);
        let request = hs.auth_request();

        assert_eq!(request.op, "authKeyExpires");
        assert_eq!(request.args.len(), 3);
        assert_eq!(request.args[0], "api-key");
        let expires = request.args[1].as_u64().unwrap();
        assert_eq!(expires, BASE_TIME + 10);
        assert_eq!(
            request.args[2].as_str().unwrap(),
            sign_auth("api-secret", expires)
        );
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let clock = Arc::new(MockClock::new(BASE_TIME));
        let hs = handshake(clock);
        let registry = Arc::new(AckRegistry::new());
        let (tx, mut rx) = mpsc::channel::<String>(4);

        let resolver = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let frame = rx.recv().await.unwrap();
                assert!(frame.contains("authKeyExpires"));
                registry.resolve(AUTH_OP, AckOutcome::success());
            })
        };

        hs.authenticate(&tx, &registry).await.unwrap();
        resolver.await.unwrap();
    }

    #[tokio::test]
    async fn test_authenticate_rejection_is_not_timeout() {
        let clock = Arc::new(MockClock::new(BASE_TIME));
        let hs = handshake(clock);
        let registry = Arc::new(AckRegistry::new());
        let (tx, mut rx) = mpsc::channel::<String>(4);

        let registry_clone = Arc::clone(&registry);
        tokio::spawn(async move {
            let _ = rx.recv().await;
            registry_clone.resolve(AUTH_OP, AckOutcome::failure("Signature not valid."));
        });

        match hs.authenticate(&tx, &registry).await {
            Err(StreamError::HandshakeRejected(reason)) => {
                assert_eq!(reason, "Signature not valid.");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticate_timeout() {
        let clock = Arc::new(MockClock::new(BASE_TIME));
        let hs = handshake(clock);
        let registry = AckRegistry::new();
        let (tx, _rx) = mpsc::channel::<String>(4);

        match hs.authenticate(&tx, &registry).await {
            Err(StreamError::HandshakeTimeout(_)) => {}
            other => panic!("expected timeout, got {other:?}"),
        }
        // The waiter is released; a retry may register again.
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_second_authenticate_while_in_flight() {
        let clock = Arc::new(MockClock::new(BASE_TIME));
        let hs = handshake(clock);
        let registry = AckRegistry::new();
        let (tx, _rx) = mpsc::channel::<String>(4);

        let _pending = registry.register(AUTH_OP).unwrap();
        match hs.authenticate(&tx, &registry).await {
            Err(StreamError::HandshakeInFlight) => {}
            other => panic!("expected in-flight error, got {other:?}"),
        }
    }
}
