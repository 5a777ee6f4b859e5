//! Watermark-driven fetch loop against the upstream inbound API

use crate::inbound::router::{InboundMail, MailRouter};
use crate::spam::SpamScanner;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailward_common::types::MessageDirection;
use mailward_common::{Error, Result};
use mailward_storage::repository::{ScanLogRepository, SyncStateRepository};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One undelivered mail as the upstream API reports it
#[derive(Debug, Clone, Deserialize)]
pub struct FetchedMail {
    /// Upstream log id, carried through as the dedup key
    pub log: String,
    pub message: String,
    pub is_spam: bool,
}

/// One page of undelivered mail plus the watermark to resume from
#[derive(Debug, Clone, Deserialize)]
pub struct FetchBatch {
    pub mails: Vec<FetchedMail>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Upstream inbound API seam
#[async_trait]
pub trait InboundApi: Send + Sync {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<FetchBatch>;
}

/// Production API client
pub struct HttpInboundApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpInboundApi {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(|k| k.to_string()),
        }
    }
}

#[async_trait]
impl InboundApi for HttpInboundApi {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<FetchBatch> {
        let mut request = self
            .client
            .get(format!("{}/inbound/mails", self.base_url));
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Inbound fetch failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "Inbound fetch returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Inbound fetch response invalid: {}", e)))
    }
}

/// Pulls undelivered mail in batches and routes it.
///
/// The watermark only advances once a batch has routed completely, so a
/// crash or failure redelivers from the last good batch; the store's
/// uniqueness constraint absorbs the duplicates.
pub struct MailSync {
    api: Arc<dyn InboundApi>,
    router: Arc<MailRouter>,
    state: Arc<dyn SyncStateRepository>,
    scanner: Option<(Arc<SpamScanner>, Arc<dyn ScanLogRepository>)>,
    max_failures: u32,
}

impl MailSync {
    pub fn new(
        api: Arc<dyn InboundApi>,
        router: Arc<MailRouter>,
        state: Arc<dyn SyncStateRepository>,
        max_failures: u32,
    ) -> Self {
        Self {
            api,
            router,
            state,
            scanner: None,
            max_failures,
        }
    }

    /// Scan each fetched message locally before routing. The local verdict
    /// can only raise the spam flag, never clear an upstream one.
    pub fn with_scanner(
        mut self,
        scanner: Arc<SpamScanner>,
        scan_logs: Arc<dyn ScanLogRepository>,
    ) -> Self {
        self.scanner = Some((scanner, scan_logs));
        self
    }

    /// Run one sync cycle: fetch and route batches until an empty one.
    ///
    /// A failed batch sleeps `2^failures` seconds and is retried; after
    /// `max_failures` consecutive failures the cycle gives up and returns
    /// the last error, leaving the watermark untouched.
    pub async fn run_cycle(&self) -> Result<()> {
        let mut failures: u32 = 0;

        loop {
            let since = self.state.last_synced_at().await?;
            match self.fetch_and_route(since).await {
                Ok((count, watermark)) => {
                    failures = 0;
                    if let Some(watermark) = watermark {
                        self.state.set_last_synced_at(watermark).await?;
                    }
                    if count == 0 {
                        return Ok(());
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        failures,
                        max_failures = self.max_failures,
                        "Inbound batch failed: {}",
                        e
                    );
                    if failures >= self.max_failures {
                        return Err(e);
                    }
                    tokio::time::sleep(Duration::from_secs(2u64.pow(failures))).await;
                }
            }
        }
    }

    async fn fetch_and_route(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<(usize, Option<DateTime<Utc>>)> {
        let batch = self.api.fetch(since).await?;
        let fetched_at = Utc::now();
        let count = batch.mails.len();

        for fetched in batch.mails {
            let is_spam = fetched.is_spam || self.local_verdict(&fetched.message).await;
            let mail = InboundMail {
                log_reference: fetched.log,
                message: fetched.message,
                is_spam,
                fetched_at,
            };
            self.router.route(&mail).await?;
        }

        if count > 0 {
            info!(count, "Routed inbound batch");
        }
        Ok((count, batch.last_synced_at))
    }

    /// Best-effort local scan. Failures keep the upstream verdict.
    async fn local_verdict(&self, message: &str) -> bool {
        let Some((scanner, scan_logs)) = &self.scanner else {
            return false;
        };
        match scanner.scan(message, None, None).await {
            Ok(log) => {
                let spam = scanner.is_spam(log.spam_score, MessageDirection::Inbound);
                if let Err(e) = scan_logs.create(&log).await {
                    warn!("Failed to persist scan log: {}", e);
                }
                spam
            }
            Err(e) => {
                warn!("Local spam scan failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::testutil::{fixture, raw_message};
    use chrono::TimeZone;
    use mailward_common::Error;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MemSyncState {
        watermark: Mutex<Option<DateTime<Utc>>>,
    }

    #[async_trait]
    impl SyncStateRepository for MemSyncState {
        async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
            Ok(*self.watermark.lock().unwrap())
        }
        async fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<()> {
            *self.watermark.lock().unwrap() = Some(at);
            Ok(())
        }
    }

    struct ScriptedApi {
        batches: Mutex<VecDeque<Result<FetchBatch>>>,
        calls: Mutex<Vec<Option<DateTime<Utc>>>>,
    }

    impl ScriptedApi {
        fn new(batches: Vec<Result<FetchBatch>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InboundApi for ScriptedApi {
        async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<FetchBatch> {
            self.calls.lock().unwrap().push(since);
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(FetchBatch {
                    mails: Vec::new(),
                    last_synced_at: None,
                }))
        }
    }

    fn mail(log: &str) -> FetchedMail {
        FetchedMail {
            log: log.to_string(),
            message: raw_message("alice@example.com"),
            is_spam: false,
        }
    }

    fn stamp(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, second).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_routes_batches_and_advances_watermark() {
        let fx = fixture(false);
        let api = ScriptedApi::new(vec![
            Ok(FetchBatch {
                mails: vec![mail("L1"), mail("L2")],
                last_synced_at: Some(stamp(10)),
            }),
            Ok(FetchBatch {
                mails: Vec::new(),
                last_synced_at: None,
            }),
        ]);
        let state = Arc::new(MemSyncState {
            watermark: Mutex::new(None),
        });
        let sync = MailSync::new(api.clone(), fx.router.clone(), state.clone(), 3);

        sync.run_cycle().await.unwrap();

        assert_eq!(fx.messages.rows.lock().unwrap().len(), 2);
        assert_eq!(*state.watermark.lock().unwrap(), Some(stamp(10)));
        // Second fetch resumed from the advanced watermark
        assert_eq!(api.calls.lock().unwrap().as_slice(), &[None, Some(stamp(10))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_backs_off_and_gives_up() {
        let fx = fixture(false);
        let api = ScriptedApi::new(vec![
            Err(Error::Internal("boom 1".to_string())),
            Err(Error::Internal("boom 2".to_string())),
            Err(Error::Internal("boom 3".to_string())),
        ]);
        let state = Arc::new(MemSyncState {
            watermark: Mutex::new(Some(stamp(0))),
        });
        let sync = MailSync::new(api.clone(), fx.router.clone(), state.clone(), 3);

        let err = sync.run_cycle().await.unwrap_err();
        assert!(err.to_string().contains("boom 3"));
        // Three attempts, watermark untouched
        assert_eq!(api.calls.lock().unwrap().len(), 3);
        assert_eq!(*state.watermark.lock().unwrap(), Some(stamp(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_recovers_after_transient_failure() {
        let fx = fixture(false);
        let api = ScriptedApi::new(vec![
            Err(Error::Internal("transient".to_string())),
            Ok(FetchBatch {
                mails: vec![mail("L1")],
                last_synced_at: Some(stamp(20)),
            }),
            Ok(FetchBatch {
                mails: Vec::new(),
                last_synced_at: None,
            }),
        ]);
        let state = Arc::new(MemSyncState {
            watermark: Mutex::new(None),
        });
        let sync = MailSync::new(api.clone(), fx.router.clone(), state.clone(), 3);

        sync.run_cycle().await.unwrap();

        assert_eq!(fx.messages.rows.lock().unwrap().len(), 1);
        assert_eq!(*state.watermark.lock().unwrap(), Some(stamp(20)));
    }

    #[tokio::test]
    async fn test_local_scan_raises_spam_flag() {
        use crate::spam::{ScanError, Spamd, SpamdResponse};
        use mailward_common::config::SpamConfig;
        use mailward_storage::models::SpamScanLog;

        struct HighScoreDaemon;

        #[async_trait]
        impl Spamd for HighScoreDaemon {
            async fn check(&self, _message: &str) -> std::result::Result<SpamdResponse, ScanError> {
                Ok(SpamdResponse {
                    raw: "Spam: True ; 9.9 / 5.0".to_string(),
                    score: 9.9,
                })
            }
        }

        struct MemScanLogs {
            logs: Mutex<Vec<SpamScanLog>>,
        }

        #[async_trait]
        impl ScanLogRepository for MemScanLogs {
            async fn create(&self, log: &SpamScanLog) -> Result<()> {
                self.logs.lock().unwrap().push(log.clone());
                Ok(())
            }
            async fn clear_older_than(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
                Ok(0)
            }
        }

        let fx = fixture(false);
        let api = ScriptedApi::new(vec![
            Ok(FetchBatch {
                // Upstream says ham, the local daemon disagrees
                mails: vec![mail("L1")],
                last_synced_at: None,
            }),
            Ok(FetchBatch {
                mails: Vec::new(),
                last_synced_at: None,
            }),
        ]);
        let state = Arc::new(MemSyncState {
            watermark: Mutex::new(None),
        });
        let scanner = Arc::new(SpamScanner::with_daemon(
            SpamConfig::default(),
            Arc::new(HighScoreDaemon),
        ));
        let scan_logs = Arc::new(MemScanLogs {
            logs: Mutex::new(Vec::new()),
        });
        let sync = MailSync::new(api, fx.router.clone(), state, 3)
            .with_scanner(scanner, scan_logs.clone());

        sync.run_cycle().await.unwrap();

        let rows = fx.messages.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_spam);
        assert_eq!(rows[0].folder, "spam");
        assert_eq!(scan_logs.logs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_batch_is_absorbed() {
        let fx = fixture(false);
        let api = ScriptedApi::new(vec![
            Ok(FetchBatch {
                mails: vec![mail("L1")],
                last_synced_at: Some(stamp(10)),
            }),
            // Same log redelivered, as after a crash before the watermark moved
            Ok(FetchBatch {
                mails: vec![mail("L1")],
                last_synced_at: Some(stamp(11)),
            }),
            Ok(FetchBatch {
                mails: Vec::new(),
                last_synced_at: None,
            }),
        ]);
        let state = Arc::new(MemSyncState {
            watermark: Mutex::new(None),
        });
        let sync = MailSync::new(api, fx.router.clone(), state, 3);

        sync.run_cycle().await.unwrap();
        assert_eq!(fx.messages.rows.lock().unwrap().len(), 1);
    }
}
