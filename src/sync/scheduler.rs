//! Periodic refresh of configured inventory targets
//!
//! Each target is an (account, kind, region) triple refreshed on its own
//! interval with random jitter so that targets sharing an interval do not
//! hit the provider together. Refreshes bypass the freshness cache.

use crate::config::{RefreshTargetConfig, SchedulerSettings};
use crate::error::SyncError;
use crate::models::SyncOutcome;
use crate::sync::orchestrator::{SyncOrchestrator, SyncResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

/// Summary of one completed refresh
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSummary {
    /// Records returned
    pub records: usize,
    /// Collection outcome
    pub outcome: SyncOutcome,
    /// Whether the persisted snapshot was served instead of fresh data
    pub stale: bool,
}

impl From<&SyncResponse> for RefreshSummary {
    fn from(response: &SyncResponse) -> Self {
        Self {
            records: response.records.len(),
            outcome: response.outcome,
            stale: response.stale,
        }
    }
}

/// Refresh state of one target
#[derive(Debug, Clone, Default)]
pub struct RefreshStatus {
    /// When the last refresh finished
    pub last_refresh: Option<DateTime<Utc>>,
    /// Result of the last refresh
    pub last_result: Option<Result<RefreshSummary, String>>,
    /// Estimated next scheduled refresh
    pub next_refresh: Option<DateTime<Utc>>,
    /// Whether a refresh is running
    pub in_progress: bool,
}

/// Something that can force-refresh a target
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Collect the target's inventory, bypassing the freshness cache
    async fn refresh(&self, target: &RefreshTargetConfig) -> Result<SyncResponse, SyncError>;
}

#[async_trait]
impl Refresher for SyncOrchestrator {
    async fn refresh(&self, target: &RefreshTargetConfig) -> Result<SyncResponse, SyncError> {
        self.request(
            target.kind,
            &target.account_id,
            target.region.as_deref(),
            true,
        )
        .await
    }
}

struct ManualRefreshRequest {
    target: String,
    response: oneshot::Sender<Result<RefreshSummary, SyncError>>,
}

type StatusMap = Arc<RwLock<HashMap<String, RefreshStatus>>>;

/// Drives periodic refreshes until shutdown
pub struct RefreshScheduler {
    settings: SchedulerSettings,
    refresher: Arc<dyn Refresher>,
    status: StatusMap,
    shutdown_rx: broadcast::Receiver<()>,
    manual_rx: mpsc::Receiver<ManualRefreshRequest>,
    manual_tx: mpsc::Sender<ManualRefreshRequest>,
}

impl RefreshScheduler {
    /// Create a scheduler for `settings.targets`
    pub fn new(
        settings: SchedulerSettings,
        refresher: Arc<dyn Refresher>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (manual_tx, manual_rx) = mpsc::channel(32);

        let status = settings
            .targets
            .iter()
            .map(|t| (t.name(), RefreshStatus::default()))
            .collect();

        Self {
            settings,
            refresher,
            status: Arc::new(RwLock::new(status)),
            shutdown_rx,
            manual_rx,
            manual_tx,
        }
    }

    /// Handle for triggering refreshes outside the schedule
    pub fn manual_handle(&self) -> ManualRefreshHandle {
        ManualRefreshHandle {
            tx: self.manual_tx.clone(),
        }
    }

    /// Shared view of per-target status
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            status: self.status.clone(),
        }
    }

    /// Run until the shutdown channel fires
    pub async fn run(mut self) {
        info!(targets = self.settings.targets.len(), "Starting refresh scheduler");

        if self.settings.initial_delay_secs > 0 {
            debug!(
                delay_secs = self.settings.initial_delay_secs,
                "Waiting for initial delay"
            );
            tokio::time::sleep(Duration::from_secs(self.settings.initial_delay_secs)).await;
        }

        let (task_shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut handles = Vec::with_capacity(self.settings.targets.len());

        for target in &self.settings.targets {
            let target = target.clone();
            let refresher = self.refresher.clone();
            let status = self.status.clone();
            let settings = self.settings.clone();
            let task_shutdown_rx = task_shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                Self::run_target(target, refresher, status, settings, task_shutdown_rx).await;
            }));
        }

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping refresh scheduler");
                    let _ = task_shutdown_tx.send(());
                    break;
                }
                Some(request) = self.manual_rx.recv() => {
                    self.handle_manual(request).await;
                }
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("Refresh scheduler stopped");
    }

    fn jitter(settings: &SchedulerSettings) -> u64 {
        if settings.jitter_secs > 0 {
            rand::thread_rng().gen_range(0..settings.jitter_secs)
        } else {
            0
        }
    }

    async fn run_target(
        target: RefreshTargetConfig,
        refresher: Arc<dyn Refresher>,
        status: StatusMap,
        settings: SchedulerSettings,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let name = target.name();
        let interval = Duration::from_secs(target.interval_secs);

        info!(refresh = name, "Performing initial refresh");
        let _ = Self::perform_refresh(&target, refresher.as_ref(), &status, &settings).await;

        let jitter = Self::jitter(&settings);
        let first_tick = Instant::now() + interval + Duration::from_secs(jitter);
        debug!(
            refresh = name,
            interval_secs = interval.as_secs(),
            jitter_secs = jitter,
            "Scheduled next refresh"
        );

        let mut timer = interval_at(first_tick, interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(refresh = name, "Refresh task shutting down");
                    break;
                }
                _ = timer.tick() => {
                    let jitter = Self::jitter(&settings);
                    if jitter > 0 {
                        tokio::time::sleep(Duration::from_secs(jitter)).await;
                    }

                    info!(refresh = name, "Performing scheduled refresh");
                    let _ = Self::perform_refresh(&target, refresher.as_ref(), &status, &settings).await;
                }
            }
        }
    }

    async fn perform_refresh(
        target: &RefreshTargetConfig,
        refresher: &dyn Refresher,
        status: &StatusMap,
        settings: &SchedulerSettings,
    ) -> Result<RefreshSummary, SyncError> {
        let name = target.name();

        if let Some(s) = status.write().await.get_mut(&name) {
            s.in_progress = true;
        }

        let result = tokio::time::timeout(
            Duration::from_secs(settings.sync_timeout_secs),
            refresher.refresh(target),
        )
        .await;

        let result = match result {
            Ok(Ok(response)) => {
                let summary = RefreshSummary::from(&response);
                if summary.stale {
                    warn!(refresh = name, records = summary.records, "Refresh served stale data");
                } else {
                    info!(
                        refresh = name,
                        records = summary.records,
                        outcome = %summary.outcome,
                        "Refresh completed"
                    );
                }
                Ok(summary)
            }
            Ok(Err(err)) => {
                warn!(refresh = name, error = %err, "Refresh failed");
                Err(err)
            }
            Err(_) => {
                error!(
                    refresh = name,
                    timeout_secs = settings.sync_timeout_secs,
                    "Refresh timed out"
                );
                Err(SyncError::Timeout(settings.sync_timeout_secs))
            }
        };

        if let Some(s) = status.write().await.get_mut(&name) {
            let now = Utc::now();
            s.in_progress = false;
            s.last_refresh = Some(now);
            s.last_result = Some(result.clone().map_err(|e| e.to_string()));
            s.next_refresh = chrono::Duration::from_std(Duration::from_secs(target.interval_secs))
                .ok()
                .map(|d| now + d);
        }

        result
    }

    async fn handle_manual(&self, request: ManualRefreshRequest) {
        let target = self
            .settings
            .targets
            .iter()
            .find(|t| t.name() == request.target);

        let result = match target {
            Some(target) => {
                info!(refresh = request.target, "Manual refresh triggered");
                Self::perform_refresh(target, self.refresher.as_ref(), &self.status, &self.settings)
                    .await
            }
            None => {
                warn!(
                    refresh = request.target,
                    "Manual refresh requested for unknown target"
                );
                Err(SyncError::UnknownTarget(request.target.clone()))
            }
        };

        let _ = request.response.send(result);
    }
}

/// Read access to the scheduler's per-target status
#[derive(Clone)]
pub struct StatusHandle {
    status: StatusMap,
}

impl StatusHandle {
    /// Snapshot of every target's status
    pub async fn snapshot(&self) -> HashMap<String, RefreshStatus> {
        self.status.read().await.clone()
    }

    /// Status of one target
    pub async fn get(&self, target: &str) -> Option<RefreshStatus> {
        self.status.read().await.get(target).cloned()
    }
}

/// Handle for triggering manual refreshes
#[derive(Clone)]
pub struct ManualRefreshHandle {
    tx: mpsc::Sender<ManualRefreshRequest>,
}

impl ManualRefreshHandle {
    /// Refresh the named target now and wait for its result
    pub async fn trigger(&self, target: &str) -> Result<RefreshSummary, SyncError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(ManualRefreshRequest {
                target: target.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| SyncError::SchedulerUnavailable("scheduler not running".to_string()))?;

        response_rx.await.map_err(|_| {
            SyncError::SchedulerUnavailable("no response from scheduler".to_string())
        })?
    }
}
