//! Periodic flushing of open stores.

use crate::error::{Result, StoreError};
use crate::lifecycle::leadership::LeaderTask;
use crate::store::CircularBufferStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Task name used in logs and errors.
pub const STORE_MAINTENANCE_TASK: &str = "StoreMaintenanceTask";

/// Flushes the stores of the tables it is asked to process.
#[derive(Debug, Default)]
pub struct StoreMaintenanceTask {
    stores: HashMap<String, Arc<CircularBufferStore>>,
}

impl StoreMaintenanceTask {
    /// Creates a task with no registered stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the store backing `table`, replacing any previous one.
    pub fn register(
        &mut self,
        table: impl Into<String>,
        store: Arc<CircularBufferStore>,
    ) -> Option<Arc<CircularBufferStore>> {
        self.stores.insert(table.into(), store)
    }

    /// Removes the store backing `table`.
    pub fn unregister(&mut self, table: &str) -> Option<Arc<CircularBufferStore>> {
        self.stores.remove(table)
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Returns true if no store is registered.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl LeaderTask for StoreMaintenanceTask {
    fn name(&self) -> &str {
        STORE_MAINTENANCE_TASK
    }

    fn on_become_leader(&mut self) {
        info!("{} managing {} stores", STORE_MAINTENANCE_TASK, self.stores.len());
    }

    /// Flushes every open store among `tables`.
    ///
    /// A failing store does not stop the others; the first failure is
    /// reported once every table has been visited.
    fn process(&mut self, tables: &[String]) -> Result<()> {
        let mut flushed = 0;
        let mut first_failure = None;

        for table in tables {
            let Some(store) = self.stores.get(table) else {
                debug!("No store registered for table {}", table);
                continue;
            };
            if !store.is_open() {
                debug!("Store for table {} is closed, skipping", table);
                continue;
            }
            match store.flush() {
                Ok(()) => flushed += 1,
                Err(err) => {
                    error!("Flush failed for table {}: {:?}", table, err);
                    first_failure.get_or_insert_with(|| format!("{table}: {err}"));
                }
            }
        }

        debug!("{} flushed {} stores", STORE_MAINTENANCE_TASK, flushed);
        match first_failure {
            Some(reason) => Err(StoreError::TaskFailed {
                task: STORE_MAINTENANCE_TASK.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::record::RecordSchema;
    use crate::store::StoreConfig;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn store(temp_dir: &TempDir, name: &str) -> Arc<CircularBufferStore> {
        let schema = RecordSchema::new(["A"], ["M"]).unwrap();
        let dictionary = Dictionary::builder().dimension("A", ["a"]).build();
        Arc::new(
            CircularBufferStore::new(
                Uuid::new_v4(),
                temp_dir.path().join(name),
                schema,
                &dictionary,
                StoreConfig::default().with_max_records(16),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_process_skips_unknown_and_closed() {
        let temp_dir = TempDir::new().unwrap();
        let open = store(&temp_dir, "open.buf");
        open.open().unwrap();
        let closed = store(&temp_dir, "closed.buf");

        let mut task = StoreMaintenanceTask::new();
        task.register("open", open);
        task.register("closed", closed);
        assert_eq!(task.len(), 2);

        let tables = vec![
            "open".to_string(),
            "closed".to_string(),
            "unknown".to_string(),
        ];
        task.process(&tables).unwrap();
    }

    #[test]
    fn test_unregister() {
        let temp_dir = TempDir::new().unwrap();
        let mut task = StoreMaintenanceTask::new();
        task.register("t", store(&temp_dir, "t.buf"));

        assert!(task.unregister("t").is_some());
        assert!(task.is_empty());
    }
}
