//! Integration tests for leader-gated store maintenance.

use alopex_startree::lifecycle::{
    ControllerResources, LeaderGatedTask, LeadershipState, PeriodicTaskConfig,
    StoreMaintenanceTask, TickOutcome,
};
use alopex_startree::{CircularBufferStore, Dictionary, RecordSchema, StarTreeRecord, StoreConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

struct Cluster {
    leader: AtomicBool,
    tables: Mutex<Vec<String>>,
}

impl Cluster {
    fn new(leader: bool, tables: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            leader: AtomicBool::new(leader),
            tables: Mutex::new(tables.iter().map(|t| t.to_string()).collect()),
        })
    }
}

impl ControllerResources for Cluster {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    fn all_table_names(&self) -> Vec<String> {
        self.tables.lock().unwrap().clone()
    }
}

fn open_store(temp_dir: &TempDir, name: &str) -> Arc<CircularBufferStore> {
    let schema = RecordSchema::new(["A"], ["M"]).unwrap();
    let dictionary = Dictionary::builder().dimension("A", ["a0"]).build();
    let store = CircularBufferStore::new(
        Uuid::new_v4(),
        temp_dir.path().join(name),
        schema,
        &dictionary,
        StoreConfig::default().with_max_records(32),
    )
    .unwrap();
    store.open().unwrap();
    Arc::new(store)
}

#[test]
fn test_maintenance_runs_only_while_leader() {
    let temp_dir = TempDir::new().unwrap();
    let orders = open_store(&temp_dir, "orders.buf");
    orders
        .append(&StarTreeRecord::new(vec!["a0".into()], vec![5], 0))
        .unwrap();

    let mut maintenance = StoreMaintenanceTask::new();
    maintenance.register("orders", Arc::clone(&orders));

    let cluster = Cluster::new(false, &["orders", "unknown"]);
    let config = PeriodicTaskConfig::new("StoreMaintenanceTask", Duration::from_secs(60))
        .with_initial_delay(Duration::from_secs(200));
    assert_eq!(config.initial_delay, Duration::from_secs(200));
    let mut task = LeaderGatedTask::new(config, cluster.clone(), maintenance);

    assert_eq!(task.tick().unwrap(), TickOutcome::Skipped);
    assert_eq!(task.state(), LeadershipState::Follower);

    cluster.leader.store(true, Ordering::SeqCst);
    assert_eq!(task.tick().unwrap(), TickOutcome::Processed { tables: 2 });
    assert_eq!(task.state(), LeadershipState::Leader);

    cluster.leader.store(false, Ordering::SeqCst);
    assert_eq!(task.tick().unwrap(), TickOutcome::Skipped);
    assert_eq!(task.state(), LeadershipState::Follower);

    // Flushed data is durable in the backing file
    let bytes = std::fs::read(orders.path()).unwrap();
    let decoded = orders.codec().decode(&bytes[..orders.entry_size()]).unwrap();
    assert_eq!(decoded.metrics(), &[5]);
}

#[test]
fn test_zero_interval_maintenance_never_runs() {
    let cluster = Cluster::new(true, &["orders"]);
    let config = PeriodicTaskConfig::new("StoreMaintenanceTask", Duration::ZERO);
    let mut task = LeaderGatedTask::new(config, cluster, StoreMaintenanceTask::new());

    assert_eq!(task.tick().unwrap(), TickOutcome::Skipped);
    assert_eq!(task.state(), LeadershipState::Follower);
}

#[test]
fn test_closed_store_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let orders = open_store(&temp_dir, "orders.buf");
    orders.close().unwrap();

    let mut maintenance = StoreMaintenanceTask::new();
    maintenance.register("orders", orders);

    let cluster = Cluster::new(true, &["orders"]);
    let config = PeriodicTaskConfig::new("StoreMaintenanceTask", Duration::from_secs(60));
    let mut task = LeaderGatedTask::new(config, cluster, maintenance);
    assert_eq!(task.tick().unwrap(), TickOutcome::Processed { tables: 1 });
}
