//! Engine and driver tests over in-memory stores.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::appdata::{AppData, DeficitEntry, WeightEntry};
use crate::sync::{
    FailedSyncRecord, IdentityProvider, ReconciliationDriver, RemoteRecordStore, SessionIdentity,
    SnapshotStore, SyncEngine,
};

#[derive(Default)]
struct MemorySnapshots {
    data: Mutex<Option<AppData>>,
    queue: Mutex<Vec<FailedSyncRecord>>,
}

impl MemorySnapshots {
    fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

impl SnapshotStore for MemorySnapshots {
    fn read(&self) -> AppData {
        self.data.lock().unwrap().clone().unwrap_or_default()
    }

    fn write(&self, data: &AppData) {
        *self.data.lock().unwrap() = Some(data.clone());
    }

    fn load_failure_queue(&self) -> Vec<FailedSyncRecord> {
        self.queue.lock().unwrap().clone()
    }

    fn store_failure_queue(&self, queue: &[FailedSyncRecord]) {
        *self.queue.lock().unwrap() = queue.to_vec();
    }
}

/// Remote double that serves a scripted fetch result and fails the first
/// `n` upserts before acknowledging.
struct ScriptedRemote {
    fetch_result: Mutex<Option<AppData>>,
    upsert_failures_remaining: AtomicUsize,
    fetch_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
    last_upsert: Mutex<Option<(String, AppData)>>,
}

impl ScriptedRemote {
    fn new(fetch_result: Option<AppData>, upsert_failures: usize) -> Self {
        Self {
            fetch_result: Mutex::new(fetch_result),
            upsert_failures_remaining: AtomicUsize::new(upsert_failures),
            fetch_calls: AtomicUsize::new(0),
            upsert_calls: AtomicUsize::new(0),
            last_upsert: Mutex::new(None),
        }
    }

    fn succeeding() -> Self {
        Self::new(None, 0)
    }

    fn always_failing() -> Self {
        Self::new(None, usize::MAX)
    }

    fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn last_upsert(&self) -> Option<(String, AppData)> {
        self.last_upsert.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteRecordStore for ScriptedRemote {
    async fn fetch(&self, _user_id: &str) -> Option<AppData> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_result.lock().unwrap().clone()
    }

    async fn upsert(&self, user_id: &str, data: &AppData) -> Result<(), String> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_upsert.lock().unwrap() = Some((user_id.to_string(), data.clone()));
        let remaining = self.upsert_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.upsert_failures_remaining
                    .store(remaining - 1, Ordering::SeqCst);
            }
            return Err("network error".to_string());
        }
        Ok(())
    }
}

/// Remote double whose upserts never resolve, forcing the per-attempt
/// timeout to fire.
#[derive(Default)]
struct HangingRemote {
    upsert_calls: AtomicUsize,
}

#[async_trait]
impl RemoteRecordStore for HangingRemote {
    async fn fetch(&self, _user_id: &str) -> Option<AppData> {
        None
    }

    async fn upsert(&self, _user_id: &str, _data: &AppData) -> Result<(), String> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        unreachable!("upsert future never resolves")
    }
}

struct Fixture {
    engine: Arc<SyncEngine>,
    snapshots: Arc<MemorySnapshots>,
    remote: Arc<ScriptedRemote>,
    session: Arc<SessionIdentity>,
}

fn fixture(remote: ScriptedRemote, user_id: Option<&str>) -> Fixture {
    let snapshots = Arc::new(MemorySnapshots::default());
    let remote = Arc::new(remote);
    let session = Arc::new(SessionIdentity::new());
    if let Some(user_id) = user_id {
        session.sign_in(user_id);
    }
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        Arc::clone(&remote) as Arc<dyn RemoteRecordStore>,
        Arc::clone(&session) as Arc<dyn IdentityProvider>,
    ));
    Fixture {
        engine,
        snapshots,
        remote,
        session,
    }
}

fn weight_entry() -> WeightEntry {
    WeightEntry {
        date: "2024-01-01".to_string(),
        weight: 180.0,
        timestamp: 1,
    }
}

fn deficit(date: &str, calories_in: i32) -> DeficitEntry {
    DeficitEntry {
        date: date.to_string(),
        calories_in,
        calories_out: 2300,
        protein_grams: Some(140),
    }
}

fn queued(user_id: &str, age_hours: i64) -> FailedSyncRecord {
    FailedSyncRecord::new(
        user_id,
        AppData::default(),
        Utc::now() - ChronoDuration::hours(age_hours),
        "network error",
    )
}

#[tokio::test]
async fn guest_update_never_touches_remote() {
    let fx = fixture(ScriptedRemote::succeeding(), None);

    let result = fx
        .engine
        .update(|mut data| {
            data.put_weight_entry(weight_entry());
            data
        })
        .await;

    assert_eq!(result.weight_history, vec![weight_entry()]);
    assert_eq!(fx.snapshots.read().weight_history, vec![weight_entry()]);
    assert_eq!(fx.remote.fetch_calls(), 0);
    assert_eq!(fx.remote.upsert_calls(), 0);
}

#[tokio::test]
async fn guest_save_reports_success() {
    let fx = fixture(ScriptedRemote::always_failing(), None);

    let mut data = AppData::default();
    data.put_deficit_entry(deficit("2024-02-01", 1900));

    assert!(fx.engine.save(&data).await);
    assert_eq!(fx.snapshots.read(), data);
    assert_eq!(fx.remote.upsert_calls(), 0);
}

#[tokio::test]
async fn load_prefers_remote_and_overwrites_local() {
    let mut remote_doc = AppData::default();
    remote_doc.put_deficit_entry(deficit("2024-02-01", 1700));
    remote_doc.profile_setup_complete = true;

    let fx = fixture(ScriptedRemote::new(Some(remote_doc.clone()), 0), Some("u1"));
    let mut stale_local = AppData::default();
    stale_local.put_deficit_entry(deficit("2023-12-31", 2500));
    fx.snapshots.write(&stale_local);

    let loaded = fx.engine.load().await;

    assert_eq!(loaded, remote_doc);
    assert_eq!(fx.snapshots.read(), remote_doc);
}

#[tokio::test]
async fn load_falls_back_to_local_and_self_heals() {
    let fx = fixture(ScriptedRemote::succeeding(), Some("u1"));
    let mut local = AppData::default();
    local.put_weight_entry(weight_entry());
    fx.snapshots.write(&local);

    let loaded = fx.engine.load().await;

    assert_eq!(loaded, local);
    assert_eq!(fx.remote.upsert_calls(), 1);
    let (user_id, pushed) = fx.remote.last_upsert().unwrap();
    assert_eq!(user_id, "u1");
    assert_eq!(pushed, local);
}

#[tokio::test(start_paused = true)]
async fn failed_save_is_locally_durable_and_queued() {
    let fx = fixture(ScriptedRemote::always_failing(), Some("u1"));

    let mut data = AppData::default();
    data.put_deficit_entry(deficit("2024-02-01", 1850));

    let ok = fx.engine.save(&data).await;

    assert!(!ok);
    assert_eq!(fx.snapshots.read(), data);
    assert_eq!(fx.remote.upsert_calls(), 3);

    let queue = fx.snapshots.load_failure_queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].user_id, "u1");
    assert_eq!(queue[0].data, data);
    assert_eq!(queue[0].error, "network error");
}

#[tokio::test]
async fn sequential_same_date_saves_keep_latest() {
    let fx = fixture(ScriptedRemote::succeeding(), Some("u1"));

    fx.engine
        .update(|mut data| {
            data.put_deficit_entry(deficit("2024-02-01", 1800));
            data
        })
        .await;
    let result = fx
        .engine
        .update(|mut data| {
            data.put_deficit_entry(deficit("2024-02-01", 1500));
            data
        })
        .await;

    assert_eq!(result.deficit_entries.len(), 1);
    assert_eq!(result.deficit_entries[0].calories_in, 1500);
    assert_eq!(fx.snapshots.read().deficit_entries.len(), 1);
}

#[tokio::test]
async fn drain_drops_expired_records_without_retry() {
    let fx = fixture(ScriptedRemote::succeeding(), Some("u1"));
    fx.snapshots
        .store_failure_queue(&[queued("u1", 25), queued("u1", 1)]);

    let cleared = fx.engine.drain_queue().await;

    assert_eq!(cleared, 1);
    assert_eq!(fx.remote.upsert_calls(), 1);
    assert_eq!(fx.snapshots.queue_len(), 0);
}

#[tokio::test]
async fn drain_leaves_other_users_records_alone() {
    let fx = fixture(ScriptedRemote::succeeding(), Some("u1"));
    fx.snapshots.store_failure_queue(&[queued("u2", 1)]);

    let cleared = fx.engine.drain_queue().await;

    assert_eq!(cleared, 0);
    assert_eq!(fx.remote.upsert_calls(), 0);
    assert_eq!(fx.snapshots.queue_len(), 1);
}

#[tokio::test]
async fn drain_is_a_noop_for_guests() {
    let fx = fixture(ScriptedRemote::succeeding(), Some("u1"));
    fx.snapshots.store_failure_queue(&[queued("u1", 1)]);
    fx.session.sign_out();

    assert_eq!(fx.engine.drain_queue().await, 0);
    assert_eq!(fx.remote.upsert_calls(), 0);
    assert_eq!(fx.snapshots.queue_len(), 1);
}

#[tokio::test]
async fn successful_save_prunes_superseded_queue_entries() {
    let fx = fixture(ScriptedRemote::succeeding(), Some("u1"));
    fx.snapshots.store_failure_queue(&[queued("u1", 2)]);

    let mut data = AppData::default();
    data.put_weight_entry(weight_entry());

    assert!(fx.engine.save(&data).await);
    assert_eq!(fx.snapshots.queue_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn status_signal_tracks_failure_and_recovery() {
    let fx = fixture(ScriptedRemote::new(None, 3), Some("u1"));
    let status = fx.engine.subscribe_status();

    let mut data = AppData::default();
    data.put_deficit_entry(deficit("2024-02-01", 1800));
    assert!(!fx.engine.save(&data).await);

    {
        let snapshot = status.borrow();
        assert_eq!(snapshot.pending_queue_len, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("network error"));
        assert!(snapshot.last_success_at.is_none());
    }

    assert_eq!(fx.engine.drain_queue().await, 1);

    let snapshot = status.borrow();
    assert_eq!(snapshot.pending_queue_len, 0);
    assert!(snapshot.last_error.is_none());
    assert!(snapshot.last_success_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn bootstrap_loads_then_drains() {
    let fx = fixture(ScriptedRemote::succeeding(), Some("u1"));
    let mut local = AppData::default();
    local.put_weight_entry(weight_entry());
    fx.snapshots.write(&local);
    fx.snapshots.store_failure_queue(&[queued("u1", 1)]);

    let data = fx.engine.bootstrap().await;

    assert_eq!(data, local);
    assert_eq!(fx.snapshots.queue_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn driver_drains_queue_on_request() {
    let fx = fixture(ScriptedRemote::new(None, 3), Some("u1"));
    let mut data = AppData::default();
    data.put_deficit_entry(deficit("2024-02-01", 1800));
    assert!(!fx.engine.save(&data).await);
    assert_eq!(fx.snapshots.queue_len(), 1);

    let driver = ReconciliationDriver::new(Arc::clone(&fx.engine));
    driver.start().await;
    driver.request_drain();

    for _ in 0..100 {
        if fx.snapshots.queue_len() == 0 {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(fx.snapshots.queue_len(), 0);
    driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn hung_upsert_times_out_retries_and_queues() {
    let snapshots = Arc::new(MemorySnapshots::default());
    let remote = Arc::new(HangingRemote::default());
    let session = Arc::new(SessionIdentity::new());
    session.sign_in("u1");
    let engine = SyncEngine::new(
        Arc::clone(&snapshots) as Arc<dyn SnapshotStore>,
        Arc::clone(&remote) as Arc<dyn RemoteRecordStore>,
        session as Arc<dyn IdentityProvider>,
    );

    let mut data = AppData::default();
    data.put_weight_entry(weight_entry());

    let ok = engine.save(&data).await;

    assert!(!ok);
    // Every attempt hit the timeout and was retried like an explicit error.
    assert_eq!(remote.upsert_calls.load(Ordering::SeqCst), 3);
    assert_eq!(snapshots.read(), data);

    let queue = snapshots.load_failure_queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].error, "remote write timed out");
}

#[tokio::test(start_paused = true)]
async fn driver_coalesces_drain_signals_inside_debounce_window() {
    let fx = fixture(ScriptedRemote::always_failing(), Some("u1"));
    fx.snapshots.store_failure_queue(&[queued("u1", 1)]);

    let driver = ReconciliationDriver::new(Arc::clone(&fx.engine));
    driver.start().await;

    // First signal drains immediately: 2 replay attempts against the
    // always-failing remote, so the record stays queued.
    driver.request_drain();
    for _ in 0..300 {
        if fx.remote.upsert_calls() >= 2 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fx.remote.upsert_calls(), 2);

    // Two more signals right after the completed drain land inside the
    // debounce window and are coalesced; no extra attempts happen.
    driver.request_drain();
    driver.request_drain();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(fx.remote.upsert_calls(), 2);

    // The coalesced work runs once on the next interval tick.
    sleep(Duration::from_secs(31)).await;
    for _ in 0..300 {
        if fx.remote.upsert_calls() >= 4 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fx.remote.upsert_calls(), 4);
    driver.stop().await;
}

#[tokio::test(start_paused = true)]
async fn driver_drains_queue_on_interval() {
    let fx = fixture(ScriptedRemote::new(None, 3), Some("u1"));
    let mut data = AppData::default();
    data.put_weight_entry(weight_entry());
    assert!(!fx.engine.save(&data).await);
    assert_eq!(fx.snapshots.queue_len(), 1);

    let driver = ReconciliationDriver::new(Arc::clone(&fx.engine));
    driver.start().await;

    for _ in 0..100 {
        if fx.snapshots.queue_len() == 0 {
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(fx.snapshots.queue_len(), 0);
    driver.stop().await;
}
