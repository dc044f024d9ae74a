//! Alopex Star-Tree - Circular Buffer Record Store
//!
//! This crate provides the storage primitives for star-tree rollups: a
//! fixed-width, dictionary-encoded record store over a memory-mapped file
//! that retains a bounded window of time buckets.
//!
//! # Components
//!
//! - [`Dictionary`]: Per-dimension forward index with reserved STAR/OTHER ids
//! - [`RecordCodec`]: Fixed-width binary encoding of [`StarTreeRecord`]s
//! - [`CircularBufferStore`]: Mapped, time-windowed store with snapshot iterators
//! - [`SegmentDigest`]: Adler-32 and MD5 fingerprints of segment directories
//! - [`lifecycle`]: Leader-gated periodic tasks
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_startree::{CircularBufferStore, Dictionary, RecordSchema, StarTreeRecord, StoreConfig};
//!
//! let schema = RecordSchema::new(["A", "B", "C"], ["M"])?;
//! let dictionary = Dictionary::builder()
//!     .dimension("A", ["A0", "A1"])
//!     .dimension("B", ["B0", "B1", "B2"])
//!     .dimension("C", ["C0", "C1"])
//!     .build();
//!
//! let store = CircularBufferStore::new(id, path, schema, &dictionary, StoreConfig::default())?;
//! store.open()?;
//! store.append(&record)?;
//!
//! for record in store.iter()? {
//!     println!("{:?}", record?);
//! }
//! ```

#![deny(missing_docs)]

pub mod aggregation;
pub mod codec;
pub mod dictionary;
pub mod digest;
pub mod error;
pub mod lifecycle;
pub mod record;
pub mod store;

pub use aggregation::{execute, AggregationExecutor, MetricSumExecutor};
pub use codec::RecordCodec;
pub use dictionary::{Dictionary, DimensionDictionary, OTHER_ID, STAR_ID};
pub use digest::SegmentDigest;
pub use error::{Result, StoreError};
pub use record::{DimensionValue, RecordSchema, StarTreeRecord, TimeBucket};
pub use store::{
    Capacity, CircularBufferStore, RecordIterator, StoreConfig, StoreStats, SyncMode,
};
