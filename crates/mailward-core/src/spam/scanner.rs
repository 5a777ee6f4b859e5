//! Scanning strategies on top of the spamd client
//!
//! Attachments dominate scan cost but rarely carry the signal, so the
//! exclude-attachments and hybrid strategies rebuild the message without
//! its attachment parts before submitting it.

use crate::spam::client::{ScanError, Spamd, SpamdClient, SpamdResponse};
use chrono::Utc;
use mailward_common::config::SpamConfig;
use mailward_common::types::{MessageDirection, ScanningMode};
use mailward_storage::models::SpamScanLog;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use uuid::Uuid;

/// Runs the configured scanning strategy and produces scan logs
pub struct SpamScanner {
    config: SpamConfig,
    daemon: Arc<dyn Spamd>,
}

impl SpamScanner {
    pub fn new(config: SpamConfig) -> Self {
        let daemon = Arc::new(SpamdClient::new(&config));
        Self { config, daemon }
    }

    /// Scanner with a custom daemon, for tests and alternative transports
    pub fn with_daemon(config: SpamConfig, daemon: Arc<dyn Spamd>) -> Self {
        Self { config, daemon }
    }

    /// Scan a message with the configured strategy.
    ///
    /// Hybrid scans the stripped variant first and keeps that score when
    /// it stays below the threshold; otherwise the original message is
    /// rescanned and that result wins. Only exclude-attachments mode logs
    /// the stripped text; hybrid always logs the original message.
    pub async fn scan(
        &self,
        message: &str,
        source_ip: Option<&str>,
        source_host: Option<&str>,
    ) -> Result<SpamScanLog, ScanError> {
        let started_at = Utc::now();

        let (scanned_text, response) = match self.config.scanning_mode {
            ScanningMode::Full => {
                let response = self.daemon.check(message).await?;
                (message.to_string(), response)
            }
            ScanningMode::ExcludeAttachments => {
                let stripped = strip_attachments(message);
                let response = self.daemon.check(&stripped).await?;
                (stripped, response)
            }
            ScanningMode::Hybrid => {
                let stripped = strip_attachments(message);
                let cheap = self.daemon.check(&stripped).await?;
                let response = if cheap.score < self.config.hybrid_threshold {
                    cheap
                } else {
                    debug!(
                        score = cheap.score,
                        threshold = self.config.hybrid_threshold,
                        "Stripped scan inconclusive, rescanning full message"
                    );
                    self.daemon.check(message).await?
                };
                (message.to_string(), response)
            }
        };

        let completed_at = Utc::now();
        let SpamdResponse { raw, score } = response;

        Ok(SpamScanLog {
            id: Uuid::now_v7(),
            message: scanned_text,
            source_ip: source_ip.map(|s| s.to_string()),
            source_host: source_host.map(|s| s.to_string()),
            scanning_mode: self.config.scanning_mode.to_string(),
            hybrid_threshold: self.config.hybrid_threshold,
            spamd_response: raw,
            spam_score: score,
            started_at,
            completed_at,
            duration_secs: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            created_at: completed_at,
        })
    }

    /// Compare a score against the configured maximum for the direction
    pub fn is_spam(&self, score: f64, direction: MessageDirection) -> bool {
        let max = match direction {
            MessageDirection::Inbound => self.config.max_inbound_score,
            MessageDirection::Outbound => self.config.max_outbound_score,
        };
        score > max
    }
}

/// Rebuild a multipart message without its attachment parts.
///
/// Top-level headers are kept verbatim. Parts carrying a
/// Content-Disposition header are dropped; nested multiparts are filtered
/// recursively. Non-multipart messages pass through unchanged.
pub fn strip_attachments(message: &str) -> String {
    let Some((header_end, body_start)) = header_split(message) else {
        return message.to_string();
    };
    let headers = &message[..header_end];
    let Some(boundary) = multipart_boundary(headers) else {
        return message.to_string();
    };

    let separator = &message[header_end..body_start];
    let filtered = filter_multipart(&message[body_start..], &boundary);
    format!("{}{}{}", headers, separator, filtered)
}

/// Byte offsets of the end of the header section (including its final
/// line break) and the start of the body.
fn header_split(text: &str) -> Option<(usize, usize)> {
    if let Some(i) = text.find("\r\n\r\n") {
        return Some((i + 2, i + 4));
    }
    text.find("\n\n").map(|i| (i + 1, i + 2))
}

static BOUNDARY_PATTERN: OnceLock<Regex> = OnceLock::new();

fn multipart_boundary(headers: &str) -> Option<String> {
    let pattern = BOUNDARY_PATTERN
        .get_or_init(|| Regex::new(r#"(?i)boundary\s*=\s*"?([^";\r\n]+)"?"#).expect("boundary pattern"));
    pattern
        .captures(headers)
        .map(|c| c[1].trim().to_string())
}

fn filter_multipart(body: &str, boundary: &str) -> String {
    let delimiter = format!("--{}", boundary);
    let close = format!("--{}--", boundary);

    let mut preamble: Vec<&str> = Vec::new();
    let mut epilogue: Vec<&str> = Vec::new();
    let mut kept: Vec<String> = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    let mut closed = false;

    for line in body.split('\n') {
        let bare = line.trim_end_matches('\r');
        if !closed && bare == close {
            finish_part(&mut current, &mut kept);
            closed = true;
            continue;
        }
        if !closed && bare == delimiter {
            finish_part(&mut current, &mut kept);
            current = Some(Vec::new());
            continue;
        }
        if closed {
            epilogue.push(line);
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        } else {
            preamble.push(line);
        }
    }
    finish_part(&mut current, &mut kept);

    let mut out = preamble.join("\n");
    for part in &kept {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&delimiter);
        out.push('\n');
        out.push_str(part);
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&close);
    if !epilogue.is_empty() {
        out.push('\n');
        out.push_str(&epilogue.join("\n"));
    }
    out
}

fn finish_part(current: &mut Option<Vec<&str>>, kept: &mut Vec<String>) {
    if let Some(lines) = current.take() {
        if let Some(part) = filter_part(&lines.join("\n")) {
            kept.push(part);
        }
    }
}

/// Keep a part unless it declares a Content-Disposition; recurse into
/// nested multiparts.
fn filter_part(part: &str) -> Option<String> {
    let split = header_split(part);
    let header_end = split.map(|(end, _)| end).unwrap_or(part.len());
    let part_headers = &part[..header_end];

    if has_content_disposition(part_headers) {
        return None;
    }

    match (multipart_boundary(part_headers), split) {
        (Some(nested), Some((end, body_start))) => {
            let separator = &part[end..body_start];
            let filtered = filter_multipart(&part[body_start..], &nested);
            Some(format!("{}{}{}", part_headers, separator, filtered))
        }
        _ => Some(part.to_string()),
    }
}

fn has_content_disposition(headers: &str) -> bool {
    headers
        .lines()
        .any(|line| line.to_ascii_lowercase().starts_with("content-disposition:"))
}
