//! Dashboard sync engine.
//!
//! Holds the latest dashboard snapshot and publishes it through a watch
//! channel. Snapshot fetches are ordered by issuance: issuing a new fetch
//! cancels the one in flight, and a response is only applied if no newer
//! fetch was issued after it. Auto-refresh runs on a single timer task that
//! is replaced, never duplicated, whenever its settings change.

pub mod state;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::api::DashboardApi;
use crate::config::SyncConfig;
use crate::error::ClientError;
use crate::types::{Account, DashboardSnapshot, Transaction, TransactionFilters};

pub use state::{ErrorInfo, SliceState, SyncControl, SyncPhase, SyncStatus};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Superseded by a newer snapshot request")]
    Superseded,

    #[error("Dashboard sync has been shut down")]
    Closed,

    #[error(transparent)]
    Request(#[from] ClientError),
}

struct EngineState {
    phase: SyncPhase,
    control: SyncControl,
    /// Generation of the most recently issued snapshot fetch.
    latest_issued: u64,
    in_flight: Option<u64>,
    last_fetched_at: Option<DateTime<Utc>>,
    timer: Option<JoinHandle<()>>,
    closed: bool,
    transactions: HashMap<String, SliceState<Vec<Transaction>>>,
    accounts: HashMap<String, SliceState<Account>>,
}

struct SyncInner {
    api: Arc<dyn DashboardApi>,
    config: SyncConfig,
    state: Mutex<EngineState>,
    snapshot_tx: watch::Sender<Option<Arc<DashboardSnapshot>>>,
    status_tx: watch::Sender<SyncStatus>,
    generation_tx: watch::Sender<u64>,
    closed_tx: watch::Sender<bool>,
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}

#[derive(Clone)]
pub struct DashboardSync {
    inner: Arc<SyncInner>,
}

impl DashboardSync {
    pub fn new(api: Arc<dyn DashboardApi>, config: &SyncConfig) -> Self {
        let control = SyncControl {
            loading: false,
            refreshing: false,
            error: None,
            auto_refresh_enabled: config.auto_refresh,
            interval: config.refresh_interval(),
        };
        let (snapshot_tx, _) = watch::channel(None);
        let (status_tx, _) = watch::channel(SyncStatus {
            phase: SyncPhase::Idle,
            control: control.clone(),
        });
        let (generation_tx, _) = watch::channel(0);
        let (closed_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(SyncInner {
                api,
                config: config.clone(),
                state: Mutex::new(EngineState {
                    phase: SyncPhase::Idle,
                    control,
                    latest_issued: 0,
                    in_flight: None,
                    last_fetched_at: None,
                    timer: None,
                    closed: false,
                    transactions: HashMap::new(),
                    accounts: HashMap::new(),
                }),
                snapshot_tx,
                status_tx,
                generation_tx,
                closed_tx,
            }),
        }
    }

    /// Arm auto-refresh (if enabled) and perform the initial load. Must be
    /// called from within a tokio runtime.
    pub async fn start(&self) -> Result<Arc<DashboardSnapshot>, SyncError> {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(SyncError::Closed);
            }
            self.reschedule(&mut state);
        }
        self.fetch_snapshot(false).await
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Option<Arc<DashboardSnapshot>>> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn snapshot(&self) -> Option<Arc<DashboardSnapshot>> {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// Fetch the aggregate dashboard. A fetch issued while another is in
    /// flight supersedes it; the older call resolves to `Superseded`.
    pub async fn fetch_snapshot(
        &self,
        show_as_refresh: bool,
    ) -> Result<Arc<DashboardSnapshot>, SyncError> {
        let generation = self.issue(show_as_refresh)?;
        let mut guard = InFlightGuard {
            inner: &self.inner,
            generation,
        };

        let mut cancel_rx = self.inner.generation_tx.subscribe();
        let outcome = tokio::select! {
            result = self.inner.api.dashboard() => Some(result),
            _ = async { let _ = cancel_rx.wait_for(|latest| *latest != generation).await; } => None,
        };

        let mut state = self.inner.state.lock();
        guard.disarm();

        if state.closed {
            return Err(SyncError::Closed);
        }
        let Some(result) = outcome else {
            debug!("Snapshot request #{} superseded", generation);
            return Err(SyncError::Superseded);
        };
        if state.latest_issued != generation {
            debug!("Discarding response for superseded snapshot request #{}", generation);
            return Err(SyncError::Superseded);
        }

        state.in_flight = None;
        state.control.loading = false;
        state.control.refreshing = false;

        match result {
            Ok(payload) => {
                let now = Utc::now();
                let fetched_at = match state.last_fetched_at {
                    Some(previous) if previous > now => previous,
                    _ => now,
                };
                state.last_fetched_at = Some(fetched_at);

                let snapshot = Arc::new(DashboardSnapshot::from_payload(payload, fetched_at));
                state.control.error = None;
                state.phase = SyncPhase::Ready;
                self.inner.snapshot_tx.send_replace(Some(snapshot.clone()));
                self.publish_status(&state);
                debug!("Snapshot request #{} applied", generation);
                Ok(snapshot)
            }
            Err(err) => {
                let stale = self.inner.snapshot_tx.borrow().is_some();
                warn!("Dashboard fetch failed (stale snapshot kept: {}): {}", stale, err);
                state.control.error = Some(ErrorInfo::from_client_error(&err));
                state.phase = SyncPhase::Failed { stale };
                self.publish_status(&state);
                Err(SyncError::Request(err))
            }
        }
    }

    /// Narrow read of transaction history. Independent of the snapshot cycle;
    /// results land in the slice keyed by `filters`.
    pub async fn fetch_transaction_history(
        &self,
        filters: &TransactionFilters,
    ) -> Result<Vec<Transaction>, SyncError> {
        let key = filters.cache_key();
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(SyncError::Closed);
            }
            state.transactions.entry(key.clone()).or_default().loading = true;
        }
        let mut guard = SliceGuard {
            inner: &self.inner,
            key: Some(SliceKey::Transactions(key.clone())),
        };

        let result = self
            .until_closed(self.inner.api.transactions(filters))
            .await?;
        guard.disarm();

        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(SyncError::Closed);
        }
        let slice = state.transactions.entry(key).or_default();
        apply_slice(slice, result)
    }

    /// Narrow read of one account, keyed by `id`.
    pub async fn fetch_account_details(&self, id: &str) -> Result<Account, SyncError> {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(SyncError::Closed);
            }
            state.accounts.entry(id.to_string()).or_default().loading = true;
        }
        let mut guard = SliceGuard {
            inner: &self.inner,
            key: Some(SliceKey::Account(id.to_string())),
        };

        let result = self.until_closed(self.inner.api.account(id)).await?;
        guard.disarm();

        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(SyncError::Closed);
        }
        let slice = state.accounts.entry(id.to_string()).or_default();
        apply_slice(slice, result)
    }

    pub fn transaction_history(
        &self,
        filters: &TransactionFilters,
    ) -> Option<SliceState<Vec<Transaction>>> {
        self.inner
            .state
            .lock()
            .transactions
            .get(&filters.cache_key())
            .cloned()
    }

    pub fn account_details(&self, id: &str) -> Option<SliceState<Account>> {
        self.inner.state.lock().accounts.get(id).cloned()
    }

    /// Turn auto-refresh on or off. Re-arms the timer. Requires a tokio runtime.
    pub fn set_auto_refresh(&self, enabled: bool) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.control.auto_refresh_enabled = enabled;
        self.reschedule(&mut state);
        self.publish_status(&state);
    }

    /// Change the refresh period (clamped to the configured floor). Re-arms
    /// the timer. Requires a tokio runtime.
    pub fn set_refresh_interval(&self, interval: Duration) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.control.interval = self.inner.config.clamp_interval(interval);
        self.reschedule(&mut state);
        self.publish_status(&state);
    }

    pub fn has_pending_timer(&self) -> bool {
        self.inner
            .state
            .lock()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Cancel the timer and every in-flight request. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        state.latest_issued += 1;
        self.inner.generation_tx.send_replace(state.latest_issued);
        self.inner.closed_tx.send_replace(true);

        state.in_flight = None;
        state.control.loading = false;
        state.control.refreshing = false;
        state.phase = SyncPhase::Closed;
        self.publish_status(&state);
        debug!("Dashboard sync shut down");
    }

    /// Claim the next generation and mark the engine busy.
    fn issue(&self, show_as_refresh: bool) -> Result<u64, SyncError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(SyncError::Closed);
        }

        state.latest_issued += 1;
        let generation = state.latest_issued;
        if let Some(previous) = state.in_flight.replace(generation) {
            debug!("Snapshot request #{} supersedes #{}", generation, previous);
        }

        let has_snapshot = self.inner.snapshot_tx.borrow().is_some();
        if !show_as_refresh && !has_snapshot {
            state.control.loading = true;
            state.control.refreshing = false;
        } else {
            state.control.loading = false;
            state.control.refreshing = true;
        }
        state.phase = match state.phase {
            SyncPhase::Ready | SyncPhase::Failed { .. } | SyncPhase::Refreshing => {
                SyncPhase::Refreshing
            }
            _ if has_snapshot => SyncPhase::Refreshing,
            _ => SyncPhase::Loading,
        };

        self.inner.generation_tx.send_replace(generation);
        self.publish_status(&state);
        Ok(generation)
    }

    fn reschedule(&self, state: &mut EngineState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        if state.control.auto_refresh_enabled && !state.closed {
            let period = state.control.interval;
            let weak = Arc::downgrade(&self.inner);
            state.timer = Some(tokio::spawn(run_timer(weak, period)));
            debug!("Auto-refresh armed every {:?}", period);
        }
    }

    async fn until_closed<T>(
        &self,
        request: impl std::future::Future<Output = Result<T, ClientError>>,
    ) -> Result<Result<T, ClientError>, SyncError> {
        let mut closed_rx = self.inner.closed_tx.subscribe();
        tokio::select! {
            result = request => Ok(result),
            _ = async { let _ = closed_rx.wait_for(|closed| *closed).await; } => Err(SyncError::Closed),
        }
    }

    fn publish_status(&self, state: &EngineState) {
        self.inner.status_tx.send_replace(SyncStatus {
            phase: state.phase,
            control: state.control.clone(),
        });
    }
}

fn apply_slice<T: Clone>(
    slice: &mut SliceState<T>,
    result: Result<T, ClientError>,
) -> Result<T, SyncError> {
    slice.loading = false;
    match result {
        Ok(data) => {
            slice.data = Some(data.clone());
            slice.error = None;
            slice.fetched_at = Some(Utc::now());
            Ok(data)
        }
        Err(err) => {
            slice.error = Some(ErrorInfo::from_client_error(&err));
            Err(SyncError::Request(err))
        }
    }
}

/// Clears the busy flags if a fetch future is dropped before it resolves.
struct InFlightGuard<'a> {
    inner: &'a Arc<SyncInner>,
    generation: u64,
}

impl InFlightGuard<'_> {
    fn disarm(&mut self) {
        self.generation = 0;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.generation == 0 {
            return;
        }
        let mut state = self.inner.state.lock();
        if state.in_flight != Some(self.generation) {
            return;
        }

        debug!("Snapshot request #{} dropped before completion", self.generation);
        state.in_flight = None;
        state.control.loading = false;
        state.control.refreshing = false;
        let has_snapshot = self.inner.snapshot_tx.borrow().is_some();
        state.phase = match (has_snapshot, state.control.error.is_some()) {
            (_, true) => SyncPhase::Failed { stale: has_snapshot },
            (true, false) => SyncPhase::Ready,
            (false, false) => SyncPhase::Idle,
        };
        self.inner.status_tx.send_replace(SyncStatus {
            phase: state.phase,
            control: state.control.clone(),
        });
    }
}

enum SliceKey {
    Transactions(String),
    Account(String),
}

/// Clears a slice's `loading` flag if its read is dropped or cancelled
/// before a result is applied.
struct SliceGuard<'a> {
    inner: &'a Arc<SyncInner>,
    key: Option<SliceKey>,
}

impl SliceGuard<'_> {
    fn disarm(&mut self) {
        self.key = None;
    }
}

impl Drop for SliceGuard<'_> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let mut state = self.inner.state.lock();
        let loading = match &key {
            SliceKey::Transactions(key) => state.transactions.get_mut(key).map(|s| &mut s.loading),
            SliceKey::Account(id) => state.accounts.get_mut(id).map(|s| &mut s.loading),
        };
        if let Some(loading) = loading {
            *loading = false;
        }
    }
}

async fn run_timer(inner: Weak<SyncInner>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let engine = DashboardSync { inner };

        if engine.is_fetching() {
            debug!("Auto-refresh tick skipped: snapshot request already in flight");
            continue;
        }

        // Detached so re-arming the timer never cancels a refresh mid-flight
        tokio::spawn(async move {
            match engine.fetch_snapshot(true).await {
                Ok(_) | Err(SyncError::Superseded) | Err(SyncError::Closed) => {}
                Err(SyncError::Request(e)) => debug!("Auto-refresh failed: {}", e),
            }
        });
    }
}
