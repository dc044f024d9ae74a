//! Circular buffer record store.
//!
//! This module provides the [`CircularBufferStore`], a fixed-width,
//! dictionary-encoded record store over a memory-mapped file. It keeps
//! records for at most `num_time_buckets` distinct time buckets.
//!
//! # Architecture
//!
//! ```text
//! append_all → window plan → capacity check → encode → write past cursor → publish cursor
//!                         └─ bucket evicted → compact into tmp file → fsync → rename → swap mapping
//! ```
//!
//! - Records are encoded by the [`RecordCodec`] and written at
//!   `index * entry_size`; there is no header, footer or delimiter.
//! - Mutation is serialized by a writer lock. Readers never take it: an
//!   iterator clones the current mapping and loads the cursor once.
//! - Eviction never rewrites published bytes. Retained records are copied
//!   into a fresh file that atomically replaces the old one, so iterators
//!   created earlier keep reading their own snapshot.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_startree::store::{CircularBufferStore, StoreConfig};
//!
//! let store = CircularBufferStore::new(id, path, schema, &dictionary, StoreConfig::default())?;
//! store.open()?;
//! store.append_all(&records)?;
//!
//! let mut total = 0;
//! for record in store.iter()? {
//!     total += record?.metrics()[0];
//! }
//! store.close()?;
//! ```

mod iter;
mod region;
mod window;

pub use iter::RecordIterator;

use crate::codec::RecordCodec;
use crate::dictionary::Dictionary;
use crate::error::{Result, StoreError};
use crate::record::{RecordSchema, StarTreeRecord, TimeBucket};
use region::Region;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;
use window::{TimeWindow, WindowPlan};

/// Default number of retained time buckets.
pub const DEFAULT_NUM_TIME_BUCKETS: usize = 24;

/// Default provisioned capacity in records.
pub const DEFAULT_MAX_RECORDS: usize = 1 << 20;

/// Durability of [`CircularBufferStore::flush`] and `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Flush the mapping and fsync the file (default, highest durability).
    #[default]
    Sync,
    /// Schedule the mapping flush without waiting for it.
    Async,
    /// No flush (fastest, lowest durability - for testing only).
    None,
}

/// Provisioned size of the backing region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Room for this many records.
    Records(usize),
    /// Exactly this many bytes; must be a multiple of the entry size.
    Bytes(usize),
}

impl Capacity {
    /// Capacity in bytes for the given entry size.
    pub fn bytes(self, entry_size: usize) -> usize {
        match self {
            Self::Records(records) => records.saturating_mul(entry_size),
            Self::Bytes(bytes) => bytes,
        }
    }
}

/// Configuration for a [`CircularBufferStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of distinct time buckets retained.
    ///
    /// Default: 24.
    pub num_time_buckets: usize,

    /// Provisioned size of the backing region.
    ///
    /// The store never grows the region; appends past it fail with
    /// `CapacityExceeded`. Default: 1Mi records.
    pub capacity: Capacity,

    /// Durability of flush and close. Default: [`SyncMode::Sync`].
    pub sync_mode: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            num_time_buckets: DEFAULT_NUM_TIME_BUCKETS,
            capacity: Capacity::Records(DEFAULT_MAX_RECORDS),
            sync_mode: SyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Sets the number of retained time buckets.
    pub fn with_num_time_buckets(mut self, num_time_buckets: usize) -> Self {
        self.num_time_buckets = num_time_buckets;
        self
    }

    /// Sets the capacity in records.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.capacity = Capacity::Records(max_records);
        self
    }

    /// Sets the capacity in bytes.
    pub fn with_capacity_bytes(mut self, bytes: usize) -> Self {
        self.capacity = Capacity::Bytes(bytes);
        self
    }

    /// Sets the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.num_time_buckets == 0 {
            return Err(StoreError::InvalidConfig(
                "num_time_buckets must be positive".to_string(),
            ));
        }
        if matches!(self.capacity, Capacity::Records(0) | Capacity::Bytes(0)) {
            return Err(StoreError::InvalidConfig(
                "capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Statistics for a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of records currently stored.
    pub record_count: usize,
    /// Number of records the region can hold.
    pub capacity_records: usize,
    /// Number of distinct retained time buckets.
    pub bucket_count: usize,
    /// Oldest retained time bucket.
    pub min_bucket: Option<TimeBucket>,
    /// Newest retained time bucket.
    pub max_bucket: Option<TimeBucket>,
    /// Time buckets evicted since the store was opened.
    pub evicted_buckets: u64,
}

#[derive(Debug)]
struct WriterState {
    window: TimeWindow,
    scratch: Vec<u8>,
}

/// Fixed-width, time-windowed record store over a memory-mapped file.
///
/// The store is `Send + Sync`; share it in an `Arc` to give readers and the
/// writer access from different threads.
#[derive(Debug)]
pub struct CircularBufferStore {
    id: Uuid,
    path: PathBuf,
    codec: Arc<RecordCodec>,
    config: StoreConfig,
    region: RwLock<Option<Arc<Region>>>,
    writer: Mutex<WriterState>,
}

impl CircularBufferStore {
    /// Creates a closed store.
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier used in log output
    /// * `path` - Backing file; its parent directory must exist at `open`
    /// * `schema` - Dimension and metric layout
    /// * `dictionary` - Forward index covering every schema dimension
    /// * `config` - Retention window, capacity and durability
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the dictionary
    /// does not cover the schema.
    pub fn new(
        id: Uuid,
        path: impl AsRef<Path>,
        schema: RecordSchema,
        dictionary: &Dictionary,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        let codec = RecordCodec::new(schema, dictionary)?;
        let window = TimeWindow::new(config.num_time_buckets);

        Ok(Self {
            id,
            path: path.as_ref().to_path_buf(),
            codec: Arc::new(codec),
            config,
            region: RwLock::new(None),
            writer: Mutex::new(WriterState {
                window,
                scratch: Vec::new(),
            }),
        })
    }

    /// Maps the backing file, creating it if needed.
    ///
    /// The records of an existing file end at its length. Reopening
    /// recovers the cursor from that length and rebuilds the retention
    /// window from the stored records. Opening an open store is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StoreOpen` if the file cannot be created or
    /// mapped, or its length does not fit the schema and capacity.
    pub fn open(&self) -> Result<()> {
        let mut writer = self.lock_writer();
        if self.region_handle().is_some() {
            return Ok(());
        }

        let entry_size = self.codec.entry_size();
        let capacity = self.config.capacity.bytes(entry_size);
        let (region, _) = Region::open(&self.path, capacity, entry_size)?;

        let mut window = TimeWindow::new(self.config.num_time_buckets);
        let cursor = region.cursor();
        if cursor > 0 {
            let mut buckets = Vec::with_capacity(cursor / entry_size);
            for offset in (0..cursor).step_by(entry_size) {
                let bytes = region
                    .read(offset, entry_size)
                    .ok_or_else(|| StoreError::corrupt(offset, "record beyond cursor"))?;
                buckets.push(self.codec.decode_time(bytes)?);
            }
            window = TimeWindow::from_buckets(self.config.num_time_buckets, buckets);
        }

        let mut region = Arc::new(region);
        let plan = window.plan(std::iter::empty());
        if plan.needs_compaction() {
            region = self.compact(&region, &plan, &[])?;
        }
        window.apply(plan);

        info!(
            "Opened store {} at {} ({} records, {} time buckets)",
            self.id,
            self.path.display(),
            window.record_count(),
            window.bucket_count()
        );
        writer.window = window;
        *self.region.write().unwrap_or_else(|err| err.into_inner()) = Some(region);
        Ok(())
    }

    /// Appends a single record.
    ///
    /// See [`append_all`](Self::append_all).
    pub fn append(&self, record: &StarTreeRecord) -> Result<()> {
        self.append_all(std::slice::from_ref(record)).map(|_| ())
    }

    /// Appends records in order and publishes them together.
    ///
    /// Records whose time bucket falls out of the retention window by the
    /// end of the batch are not stored. If the batch evicts buckets that
    /// hold stored records, the region is compacted.
    ///
    /// Returns the number of records stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CapacityExceeded` if the retained records would
    /// not fit, `StoreError::RecordShape` for a record not matching the
    /// schema and `StoreError::StoreClosed` if the store is not open. On
    /// error nothing from the batch is visible.
    pub fn append_all(&self, records: &[StarTreeRecord]) -> Result<usize> {
        let mut writer = self.lock_writer();
        let region = self.current_region()?;
        if records.is_empty() {
            return Ok(0);
        }
        for record in records {
            record.check_shape(self.codec.schema())?;
        }

        let entry_size = self.codec.entry_size();
        let plan = writer.window.plan(records.iter().map(StarTreeRecord::time));
        let required = plan.record_count() as usize * entry_size;
        if required > region.capacity() {
            return Err(StoreError::CapacityExceeded {
                required,
                capacity: region.capacity(),
            });
        }

        let accepted: Vec<&StarTreeRecord> = records
            .iter()
            .filter(|record| plan.retains(record.time()))
            .collect();
        if accepted.len() < records.len() {
            debug!(
                "Store {} dropped {} records outside the retention window",
                self.id,
                records.len() - accepted.len()
            );
        }

        if plan.needs_compaction() {
            let compacted = self.compact(&region, &plan, &accepted)?;
            *self.region.write().unwrap_or_else(|err| err.into_inner()) = Some(compacted);
        } else if !accepted.is_empty() {
            let scratch = &mut writer.scratch;
            scratch.clear();
            scratch.resize(accepted.len() * entry_size, 0);
            for (record, slot) in accepted.iter().zip(scratch.chunks_exact_mut(entry_size)) {
                self.codec.encode_into(record, slot)?;
            }

            let cursor = region.cursor();
            // SAFETY: the writer lock is held, so this is the only writer.
            unsafe {
                region.write_unpublished(cursor, scratch)?;
                region.publish(cursor + scratch.len());
            }
        }

        writer.window.apply(plan);
        debug!(
            "Store {} appended {} records ({} stored)",
            self.id,
            accepted.len(),
            writer.window.record_count()
        );
        Ok(accepted.len())
    }

    /// Creates an iterator over the records stored right now.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StoreClosed` if the store is not open.
    pub fn iter(&self) -> Result<RecordIterator> {
        let region = self.current_region()?;
        Ok(RecordIterator::new(region, Arc::clone(&self.codec)))
    }

    /// Reads the record at `index`, located at `index * entry_size`.
    ///
    /// Returns `None` if fewer than `index + 1` records are stored.
    pub fn record_at(&self, index: usize) -> Result<Option<StarTreeRecord>> {
        let region = self.current_region()?;
        let entry_size = self.codec.entry_size();
        let Some(offset) = index.checked_mul(entry_size) else {
            return Ok(None);
        };
        match region.read(offset, entry_size) {
            Some(bytes) => self.codec.decode_at(bytes, offset).map(Some),
            None => Ok(None),
        }
    }

    /// Number of records currently stored; zero when closed.
    pub fn record_count(&self) -> usize {
        self.region_handle()
            .map_or(0, |region| region.cursor() / self.codec.entry_size())
    }

    /// Flushes written records to the backing file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StoreClosed` if the store is not open, or an
    /// I/O error from the flush.
    pub fn flush(&self) -> Result<()> {
        let _writer = self.lock_writer();
        self.current_region()?.flush(self.config.sync_mode)
    }

    /// Flushes and releases the mapping. Closing a closed store is a no-op.
    ///
    /// Iterators created before `close` keep their own mapping until dropped.
    pub fn close(&self) -> Result<()> {
        let mut writer = self.lock_writer();
        let Some(region) = self.region_handle() else {
            return Ok(());
        };
        region.flush(self.config.sync_mode)?;

        *self.region.write().unwrap_or_else(|err| err.into_inner()) = None;
        writer.window = TimeWindow::new(self.config.num_time_buckets);
        writer.scratch = Vec::new();
        info!("Closed store {}", self.id);
        Ok(())
    }

    /// Returns true if the store is open.
    pub fn is_open(&self) -> bool {
        self.region_handle().is_some()
    }

    /// Width in bytes of every stored record.
    pub fn entry_size(&self) -> usize {
        self.codec.entry_size()
    }

    /// Store identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dimension and metric layout.
    pub fn schema(&self) -> &RecordSchema {
        self.codec.schema()
    }

    /// The codec used to encode records.
    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns current statistics.
    pub fn stats(&self) -> StoreStats {
        let writer = self.lock_writer();
        let entry_size = self.codec.entry_size();
        StoreStats {
            record_count: self.record_count(),
            capacity_records: self.config.capacity.bytes(entry_size) / entry_size,
            bucket_count: writer.window.bucket_count(),
            min_bucket: writer.window.min_bucket(),
            max_bucket: writer.window.max_bucket(),
            evicted_buckets: writer.window.evicted_total(),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, WriterState> {
        self.writer.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn region_handle(&self) -> Option<Arc<Region>> {
        self.region
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    fn current_region(&self) -> Result<Arc<Region>> {
        self.region_handle().ok_or(StoreError::StoreClosed)
    }

    /// Rewrites the retained records into a fresh file replacing the backing file.
    ///
    /// Durability contract: write tmp file → fsync tmp → fsync dir → rename → fsync dir.
    /// The old mapping is left untouched for readers still holding it.
    fn compact(
        &self,
        region: &Region,
        plan: &WindowPlan,
        new_records: &[&StarTreeRecord],
    ) -> Result<Arc<Region>> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self.path.with_file_name(format!("{file_name}.compact.tmp"));

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let result = self
            .write_compacted(&tmp_path, region, plan, new_records)
            .and_then(|compacted| {
                sync_dir(&dir)?;
                std::fs::rename(&tmp_path, &self.path)?;
                Ok(compacted)
            });
        let compacted = match result {
            Ok(compacted) => compacted,
            Err(err) => {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(err);
            }
        };

        // The backing path already names the compacted file, so it must be
        // installed even if the rename cannot be made durable.
        if let Err(err) = sync_dir(&dir) {
            warn!(
                "Failed to sync directory {} after compacting store {}: {:?}",
                dir.display(),
                self.id,
                err
            );
        }

        info!(
            "Compacted store {}: evicted time buckets {:?}, {} records retained",
            self.id,
            plan.evicted_existing,
            compacted.cursor() / self.codec.entry_size()
        );
        Ok(Arc::new(compacted))
    }

    fn write_compacted(
        &self,
        tmp_path: &Path,
        region: &Region,
        plan: &WindowPlan,
        new_records: &[&StarTreeRecord],
    ) -> Result<Region> {
        let entry_size = self.codec.entry_size();
        let target = Region::create(tmp_path, region.capacity())?;
        let mut cursor = 0;

        // SAFETY: `target` is private to this call until it is returned.
        unsafe {
            for offset in (0..region.cursor()).step_by(entry_size) {
                let bytes = region
                    .read(offset, entry_size)
                    .ok_or_else(|| StoreError::corrupt(offset, "record beyond cursor"))?;
                if plan.retains(self.codec.decode_time(bytes)?) {
                    target.write_unpublished(cursor, bytes)?;
                    cursor += entry_size;
                }
            }

            let mut entry = vec![0u8; entry_size];
            for record in new_records {
                self.codec.encode_into(record, &mut entry)?;
                target.write_unpublished(cursor, &entry)?;
                cursor += entry_size;
            }
            target.publish(cursor);
        }

        target.flush(SyncMode::Sync)?;
        Ok(target)
    }
}

fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

impl Drop for CircularBufferStore {
    fn drop(&mut self) {
        // Best effort to flush remaining records
        if let Err(e) = self.close() {
            warn!("Failed to close store {} on drop: {:?}", self.id, e);
        }
    }
}
