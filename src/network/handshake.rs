// src/network/handshake.rs
//! WebSocket handshake with the orchestrator
//!
//! The client authenticates through request headers; the orchestrator
//! answers with the per-connection mining parameters in response headers,
//! or with an HTTP error/redirection that decides the retry policy.

use crate::config::HashRateStore;
use crate::network::WsStream;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION},
};

/// Fallback for `BatchingDuration` and `InitialBatchDelay`
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(60);

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

/// Mining parameters assigned by the orchestrator for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Prefix of every nonce mined on this connection
    pub nonce_prefix: Vec<u8>,
    /// Minimum share difficulty
    pub target: u64,
    /// Interval between share batch claims
    pub batching_duration: Duration,
    /// Delay before the first share batch claim
    pub initial_batch_delay: Duration,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        ConnectionInfo {
            nonce_prefix: Vec::new(),
            target: 0,
            batching_duration: DEFAULT_BATCH_INTERVAL,
            initial_batch_delay: DEFAULT_BATCH_INTERVAL,
        }
    }
}

/// Why a connection attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialError {
    /// 3xx with a `Location` header
    #[error("Redirecting to {0}")]
    Redirect(String),

    /// 400: request rejected, the body says why
    #[error("{0}")]
    BadRequest(String),

    /// 401
    #[error("Failed to authenticate with the orchestrator")]
    Unauthorized,

    /// 409
    #[error("Already connected with the same miner id")]
    Conflict,

    /// Anything worth retrying: transport failures, 5xx, unexpected replies
    #[error("{0}")]
    Transient(String),
}

impl DialError {
    /// Permanent errors abort the client, the others are retried
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            DialError::BadRequest(_) | DialError::Unauthorized | DialError::Conflict
        )
    }
}

/// Establishes connections to the orchestrator
///
/// The connect/retry loop only depends on this trait, which lets the
/// retry and redirect policy run against scripted dialers.
pub trait Dialer: Send + Sync {
    /// Connection produced by a successful handshake
    type Conn: Send + 'static;

    /// Performs one handshake against `endpoint`
    fn dial(
        &self,
        endpoint: &str,
    ) -> impl Future<Output = Result<(Self::Conn, ConnectionInfo), DialError>> + Send;
}

/// Miner credentials sent in the `Authorization` header
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Miner identifier
    pub miner_id: String,
    /// Miner secret
    pub miner_secret: String,
}

/// WebSocket dialer used in production
pub struct WsDialer {
    credentials: Credentials,
    hash_rates: Arc<dyn HashRateStore>,
    workers: usize,
}

impl WsDialer {
    /// Creates a dialer
    ///
    /// # Arguments
    /// * `credentials` - Miner id and secret
    /// * `hash_rates` - Source of the `HashRate` header, read on every attempt
    /// * `workers` - Worker count the hash rate is looked up for
    pub fn new(credentials: Credentials, hash_rates: Arc<dyn HashRateStore>, workers: usize) -> Self {
        WsDialer {
            credentials,
            hash_rates,
            workers,
        }
    }

    fn auth_headers(&self) -> Result<Vec<(&'static str, HeaderValue)>, DialError> {
        let value = |s: String| {
            HeaderValue::from_str(&s).map_err(|e| DialError::BadRequest(format!("Invalid header: {}", e)))
        };
        Ok(vec![
            (
                "Authorization",
                value(format!(
                    "{}:{}",
                    self.credentials.miner_id, self.credentials.miner_secret
                ))?,
            ),
            ("Version", value(env!("CARGO_PKG_VERSION").to_string())?),
            (
                "HashRate",
                value(self.hash_rates.indicative_hash_rate(self.workers).to_string())?,
            ),
        ])
    }
}

impl Dialer for WsDialer {
    type Conn = WsStream;

    async fn dial(&self, endpoint: &str) -> Result<(WsStream, ConnectionInfo), DialError> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| DialError::Transient(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
        for (name, value) in self.auth_headers()? {
            request.headers_mut().insert(name, value);
        }

        let attempt = tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::connect_async(request));
        match attempt.await {
            Ok(Ok((stream, response))) => {
                let info = parse_connection_headers(response.headers())?;
                Ok((stream, info))
            }
            Ok(Err(tungstenite::Error::Http(response))) => Err(classify_rejection(
                response.status(),
                response.headers(),
                response.body().as_deref(),
            )),
            Ok(Err(e)) => Err(DialError::Transient(e.to_string())),
            Err(_) => Err(DialError::Transient("Handshake timed out".into())),
        }
    }
}

/// Maps a failed handshake response to a retry decision
pub fn classify_rejection(status: StatusCode, headers: &HeaderMap, body: Option<&[u8]>) -> DialError {
    let body_text = || {
        body.map(|b| String::from_utf8_lossy(b).trim().to_string())
            .unwrap_or_default()
    };

    if status.is_redirection() {
        return match headers.get(LOCATION).and_then(|l| l.to_str().ok()) {
            Some(location) if !location.is_empty() => DialError::Redirect(location.to_string()),
            _ => DialError::Transient("Location missing for redirection".into()),
        };
    }

    match status {
        StatusCode::BAD_REQUEST => DialError::BadRequest(body_text()),
        StatusCode::UNAUTHORIZED => DialError::Unauthorized,
        StatusCode::CONFLICT => DialError::Conflict,
        _ => DialError::Transient(format!("Unexpected response {}: {}", status, body_text())),
    }
}

/// Reads the mining parameters from the handshake response headers
///
/// A missing or non-hex nonce prefix and an unparseable target are errors
/// (the attempt is retried). Missing or unparseable batching values fall
/// back to [`DEFAULT_BATCH_INTERVAL`].
pub fn parse_connection_headers(headers: &HeaderMap) -> Result<ConnectionInfo, DialError> {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let nonce_prefix = hex::decode(text("NoncePrefix").unwrap_or_default())
        .map_err(|e| DialError::Transient(format!("Failed to get nonce prefix: {}", e)))?;

    let target = match text("Target") {
        Some(value) => value
            .parse::<u64>()
            .map_err(|e| DialError::Transient(format!("Failed to get target: {}", e)))?,
        None => 0,
    };

    let seconds = |name: &str| match text(name) {
        None => DEFAULT_BATCH_INTERVAL,
        Some(value) => match value.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                log::warn!("Failed to parse {} value from the server: {}", name, value);
                DEFAULT_BATCH_INTERVAL
            }
        },
    };

    Ok(ConnectionInfo {
        nonce_prefix,
        target,
        batching_duration: seconds("BatchingDuration"),
        initial_batch_delay: seconds("InitialBatchDelay"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn parses_full_connection_headers() {
        let info = parse_connection_headers(&headers(&[
            ("NoncePrefix", "1359"),
            ("Target", "18446462598732840960"),
            ("BatchingDuration", "30"),
            ("InitialBatchDelay", "5"),
        ]))
        .unwrap();

        assert_eq!(info.nonce_prefix, vec![0x13, 0x59]);
        assert_eq!(info.target, 18_446_462_598_732_840_960);
        assert_eq!(info.batching_duration, Duration::from_secs(30));
        assert_eq!(info.initial_batch_delay, Duration::from_secs(5));
    }

    #[test]
    fn optional_headers_fall_back_to_defaults() {
        let info = parse_connection_headers(&headers(&[
            ("NoncePrefix", "ab"),
            ("BatchingDuration", "soon"),
        ]))
        .unwrap();

        assert_eq!(info.target, 0);
        assert_eq!(info.batching_duration, DEFAULT_BATCH_INTERVAL);
        assert_eq!(info.initial_batch_delay, DEFAULT_BATCH_INTERVAL);
    }

    #[test]
    fn bad_prefix_or_target_is_retried() {
        let err = parse_connection_headers(&headers(&[("NoncePrefix", "xyz")])).unwrap_err();
        assert!(!err.is_permanent());

        let err = parse_connection_headers(&headers(&[("NoncePrefix", "ab"), ("Target", "-1")]))
            .unwrap_err();
        assert!(!err.is_permanent());
    }

    #[test]
    fn classifies_handshake_rejections() {
        let empty = HeaderMap::new();

        let redirect = classify_rejection(
            StatusCode::TEMPORARY_REDIRECT,
            &headers(&[("Location", "ws://other:8077/miner")]),
            None,
        );
        assert_eq!(redirect, DialError::Redirect("ws://other:8077/miner".into()));
        assert!(!redirect.is_permanent());

        let no_location = classify_rejection(StatusCode::FOUND, &empty, None);
        assert!(matches!(no_location, DialError::Transient(_)));

        let bad = classify_rejection(StatusCode::BAD_REQUEST, &empty, Some(b"version too old\n"));
        assert_eq!(bad, DialError::BadRequest("version too old".into()));
        assert!(bad.is_permanent());

        assert!(classify_rejection(StatusCode::UNAUTHORIZED, &empty, None).is_permanent());
        assert!(classify_rejection(StatusCode::CONFLICT, &empty, None).is_permanent());
        assert!(!classify_rejection(StatusCode::SERVICE_UNAVAILABLE, &empty, None).is_permanent());
        assert!(!classify_rejection(StatusCode::FORBIDDEN, &empty, None).is_permanent());
    }
}
