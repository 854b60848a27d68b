//! The single task that owns committed holder state.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use abi::DiffResult;
use log::{error, info, warn};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};

use crate::aggregator::collect_snapshot;
use crate::broadcast::BroadcastSink;
use crate::differ::{PaginationGuard, SnapshotDiffer};
use crate::error::CycleError;
use crate::fetcher::AccountPages;
use crate::snapshot::{Snapshot, SnapshotWriter};
use crate::tagger::SpecialAddressTagger;
use crate::upstream::TokenAccountSource;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Comparing,
}

/// Cycle state and counters shared with the HTTP status endpoint.
#[derive(Debug, Default)]
pub struct TrackerStatus {
    comparing: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: CycleState,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_error: Option<String>,
}

impl TrackerStatus {
    fn set_state(&self, state: CycleState) {
        self.comparing
            .store(state == CycleState::Comparing, Ordering::SeqCst);
    }

    pub fn state(&self) -> CycleState {
        if self.comparing.load(Ordering::SeqCst) {
            CycleState::Comparing
        } else {
            CycleState::Idle
        }
    }

    fn record_success(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn record_failure(&self, err: &CycleError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            state: self.state(),
            cycles_completed: self.completed.load(Ordering::Relaxed),
            cycles_failed: self.failed.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

pub struct TrackerSettings {
    pub mint: String,
    pub decimals: u32,
    pub page_limit: u32,
    pub max_pages: u32,
    pub poll_interval: Duration,
    pub guard: PaginationGuard,
    pub bonding_curve_address: Option<String>,
    pub liquidity_pool_address: Option<String>,
}

/// Runs diff cycles one at a time: fetch, aggregate, tag, diff, commit and
/// broadcast.
pub struct Tracker {
    mint: String,
    decimals: u32,
    page_limit: u32,
    max_pages: u32,
    poll_interval: Duration,
    source: Arc<dyn TokenAccountSource>,
    tagger: SpecialAddressTagger,
    differ: SnapshotDiffer,
    sink: Arc<dyn BroadcastSink>,
    status: Arc<TrackerStatus>,
}

impl Tracker {
    pub fn new(
        settings: TrackerSettings,
        source: Arc<dyn TokenAccountSource>,
        sink: Arc<dyn BroadcastSink>,
        writer: SnapshotWriter,
        status: Arc<TrackerStatus>,
    ) -> Self {
        Self {
            mint: settings.mint,
            decimals: settings.decimals,
            page_limit: settings.page_limit,
            max_pages: settings.max_pages,
            poll_interval: settings.poll_interval,
            source,
            tagger: SpecialAddressTagger::new(
                settings.bonding_curve_address,
                settings.liquidity_pool_address,
            ),
            differ: SnapshotDiffer::new(settings.guard, writer),
            sink,
            status,
        }
    }

    pub fn committed(&self) -> &Arc<Snapshot> {
        self.differ.committed()
    }

    pub fn tagger(&self) -> &SpecialAddressTagger {
        &self.tagger
    }

    /// One full pass. On error nothing is committed, latched or broadcast.
    ///
    /// The status reads `Comparing` from the first page request until the
    /// pass ends, successfully or not.
    pub async fn run_cycle(&mut self) -> Result<Option<DiffResult>, CycleError> {
        self.status.set_state(CycleState::Comparing);
        let outcome = self.compare_cycle().await;
        self.status.set_state(CycleState::Idle);
        outcome
    }

    async fn compare_cycle(&mut self) -> Result<Option<DiffResult>, CycleError> {
        let started = Instant::now();
        let mut pages = AccountPages::new(
            self.source.as_ref(),
            &self.mint,
            self.page_limit,
            self.max_pages,
        );
        let mut candidate = collect_snapshot(&mut pages, self.decimals).await?;
        info!(
            "No more results after page {}. Total holders processed: {}",
            pages.pages_read(),
            candidate.len()
        );

        let tags = self.tagger.tag(&mut candidate);
        let diff = self.differ.apply(candidate)?;
        self.tagger.latch(tags);

        if let Some(diff) = &diff {
            self.sink.send_diff(diff);
            info!(
                "Updates sent to clients: added={} updated={} removed={} in {:?}",
                diff.added.len(),
                diff.updated.len(),
                diff.removed.len(),
                started.elapsed()
            );
        }
        Ok(diff)
    }

    async fn tick(&mut self) {
        match self.run_cycle().await {
            Ok(_) => self.status.record_success(),
            Err(e) => {
                match &e {
                    CycleError::Integrity { .. } => {
                        warn!("Discarding holder snapshot: {}", e)
                    }
                    CycleError::Fetch(_) => error!("Holder fetch failed: {}", e),
                }
                self.status.record_failure(&e);
            }
        }
    }

    /// Ticks every poll interval until `shutdown` resolves. The first cycle
    /// starts immediately. Ticks that fall due while a cycle is still running
    /// are skipped, and shutdown is only observed between cycles.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Holder tracker for {} stopping", self.mint);
                    break;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::SubscriberId;
    use crate::error::UpstreamError;
    use crate::snapshot::committed_channel;
    use crate::upstream::{MockTokenAccountSource, TokenAccount};
    use abi::InitialData;
    use rust_decimal::Decimal;

    #[derive(Default)]
    struct RecordingSink {
        diffs: Mutex<Vec<DiffResult>>,
    }

    impl BroadcastSink for RecordingSink {
        fn send_initial(&self, _subscriber: SubscriberId, _payload: &InitialData) {}

        fn send_diff(&self, diff: &DiffResult) {
            self.diffs.lock().unwrap().push(diff.clone());
        }
    }

    fn settings() -> TrackerSettings {
        TrackerSettings {
            mint: "mint".into(),
            decimals: 0,
            page_limit: 1000,
            max_pages: 10,
            poll_interval: Duration::from_millis(10),
            guard: PaginationGuard::default(),
            bonding_curve_address: Some("curve".into()),
            liquidity_pool_address: None,
        }
    }

    fn one_page(accounts: Vec<TokenAccount>) -> MockTokenAccountSource {
        let mut source = MockTokenAccountSource::new();
        source.expect_token_accounts().returning(move |_, page, _| {
            Ok(if page == 1 { Some(accounts.clone()) } else { None })
        });
        source
    }

    #[tokio::test]
    async fn cycle_commits_tags_and_broadcasts() {
        let source = one_page(vec![
            TokenAccount::new("A", 100),
            TokenAccount::new("curve", 900),
        ]);
        let sink = Arc::new(RecordingSink::default());
        let (writer, reader) = committed_channel();
        let mut tracker = Tracker::new(
            settings(),
            Arc::new(source),
            sink.clone(),
            writer,
            Arc::new(TrackerStatus::default()),
        );

        let diff = tracker.run_cycle().await.unwrap().unwrap();
        assert_eq!(diff.added.len(), 2);
        assert!(tracker.tagger().bonding_curve_found());
        assert_eq!(reader.current()["curve"].is_bonding_curve, Some(true));
        assert_eq!(reader.current()["A"].balance, Decimal::new(100, 0));
        assert_eq!(sink.diffs.lock().unwrap().len(), 1);

        assert!(tracker.run_cycle().await.unwrap().is_none());
        assert_eq!(sink.diffs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_is_comparing_during_cycle() {
        let status = Arc::new(TrackerStatus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut source = MockTokenAccountSource::new();
        {
            let status = status.clone();
            let seen = seen.clone();
            source.expect_token_accounts().returning(move |_, page, _| {
                seen.lock().unwrap().push(status.state());
                Ok(if page == 1 {
                    Some(vec![TokenAccount::new("A", 1)])
                } else {
                    None
                })
            });
        }
        let (writer, _reader) = committed_channel();
        let mut tracker = Tracker::new(
            settings(),
            Arc::new(source),
            Arc::new(RecordingSink::default()),
            writer,
            status.clone(),
        );

        assert_eq!(status.state(), CycleState::Idle);
        tracker.run_cycle().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![CycleState::Comparing; 2]);
        assert_eq!(status.report().state, CycleState::Idle);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_state_untouched() {
        let mut source = MockTokenAccountSource::new();
        source.expect_token_accounts().returning(|_, _, _| {
            Err(UpstreamError::Rpc {
                code: -32000,
                message: "overloaded".into(),
            })
        });
        let sink = Arc::new(RecordingSink::default());
        let status = Arc::new(TrackerStatus::default());
        let (writer, reader) = committed_channel();
        let mut tracker = Tracker::new(settings(), Arc::new(source), sink.clone(), writer, status.clone());

        tracker.tick().await;

        assert!(reader.current().is_empty());
        assert!(tracker.committed().is_empty());
        assert!(!tracker.tagger().bonding_curve_found());
        assert!(sink.diffs.lock().unwrap().is_empty());
        let report = status.report();
        assert_eq!(report.state, CycleState::Idle);
        assert_eq!(report.cycles_failed, 1);
        assert!(report.last_error.unwrap().contains("overloaded"));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let source = one_page(vec![TokenAccount::new("A", 1)]);
        let sink = Arc::new(RecordingSink::default());
        let status = Arc::new(TrackerStatus::default());
        let (writer, reader) = committed_channel();
        let tracker = Tracker::new(settings(), Arc::new(source), sink.clone(), writer, status.clone());

        tracker
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert!(status.report().cycles_completed >= 1);
        assert_eq!(reader.current().len(), 1);
        assert_eq!(sink.diffs.lock().unwrap().len(), 1);
    }
}
