//! TCP client for a SpamAssassin-compatible scoring daemon
//!
//! Speaks the SPAMC protocol: a command line, a blank line, the raw
//! message, then a half-close; the daemon replies with headers and the
//! matched symbols and closes.

use async_trait::async_trait;
use mailward_common::config::SpamConfig;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const SCAN_COMMAND: &str = "SYMBOLS SPAMC/1.5\r\n\r\n";

/// Scan failure. Every variant carries enough context to act on: a
/// refused connection and a reachable-but-silent daemon are different
/// operational problems.
#[derive(Debug, ThisError)]
pub enum ScanError {
    #[error("could not connect to spamd at {host}:{port}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
    },
    #[error("timed out connecting to spamd at {host}:{port}")]
    ConnectTimeout { host: String, port: u16 },
    #[error("timed out reading from spamd at {host}:{port}")]
    ReadTimeout { host: String, port: u16 },
    #[error(
        "spamd at {host}:{port} closed the connection without a response; \
         check that the daemon accepts SPAMC connections from this host"
    )]
    EmptyResponse { host: String, port: u16 },
    #[error("spamd response contains no spam score: {response:?}")]
    ScoreNotFound { response: String },
    #[error("i/o error talking to spamd: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw daemon reply plus the extracted score
#[derive(Debug, Clone)]
pub struct SpamdResponse {
    pub raw: String,
    pub score: f64,
}

/// Scan daemon seam; the scanner only needs check()
#[async_trait]
pub trait Spamd: Send + Sync {
    async fn check(&self, message: &str) -> Result<SpamdResponse, ScanError>;
}

/// Production spamd client
pub struct SpamdClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl SpamdClient {
    pub fn new(config: &SpamConfig) -> Self {
        Self::with_endpoint(
            &config.host,
            config.port,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.read_timeout_secs),
        )
    }

    pub fn with_endpoint(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout,
            read_timeout,
        }
    }
}

#[async_trait]
impl Spamd for SpamdClient {
    async fn check(&self, message: &str) -> Result<SpamdResponse, ScanError> {
        let addr = format!("{}:{}", self.host, self.port);

        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ScanError::ConnectionFailed {
                    host: self.host.clone(),
                    port: self.port,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ScanError::ConnectTimeout {
                    host: self.host.clone(),
                    port: self.port,
                })
            }
        };

        debug!(addr = %addr, bytes = message.len(), "Submitting message to spamd");

        stream.write_all(SCAN_COMMAND.as_bytes()).await?;
        stream.write_all(message.as_bytes()).await?;
        // Half-close so the daemon sees EOF and starts scanning
        stream.shutdown().await?;

        let mut response = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match timeout(self.read_timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => response.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(ScanError::Io(e)),
                Err(_) => {
                    return Err(ScanError::ReadTimeout {
                        host: self.host.clone(),
                        port: self.port,
                    })
                }
            }
        }

        let raw = String::from_utf8_lossy(&response).to_string();
        if raw.trim().is_empty() {
            return Err(ScanError::EmptyResponse {
                host: self.host.clone(),
                port: self.port,
            });
        }

        let score = extract_score(&raw).ok_or_else(|| ScanError::ScoreNotFound {
            response: raw.clone(),
        })?;

        Ok(SpamdResponse { raw, score })
    }
}

static SCORE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Pull the score out of the `Spam: True ; 5.5 / 5.0` status line
pub(crate) fn extract_score(response: &str) -> Option<f64> {
    let pattern = SCORE_PATTERN
        .get_or_init(|| Regex::new(r"Spam:.*?;\s*(-?\d+\.\d+)\s*/").expect("score pattern"));
    pattern
        .captures(response)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}
