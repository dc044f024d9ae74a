//! Snapshot iterator over stored records.

use crate::codec::RecordCodec;
use crate::error::{Result, StoreError};
use crate::record::StarTreeRecord;
use crate::store::region::Region;
use std::sync::Arc;

/// Forward-only iterator over the records present when it was created.
///
/// The iterator keeps its own handle to the mapped region, so it stays
/// valid across appends, evictions and even `close` of the store. Records
/// appended after creation are not observed.
///
/// A corrupt record is yielded once as an error, after which the iterator
/// is exhausted.
pub struct RecordIterator {
    region: Arc<Region>,
    codec: Arc<RecordCodec>,
    offset: usize,
    bound: usize,
    failed: bool,
}

impl RecordIterator {
    pub(crate) fn new(region: Arc<Region>, codec: Arc<RecordCodec>) -> Self {
        let bound = region.cursor();
        Self {
            region,
            codec,
            offset: 0,
            bound,
            failed: false,
        }
    }

    /// Number of records in the snapshot.
    pub fn snapshot_len(&self) -> usize {
        self.bound / self.codec.entry_size()
    }

    /// Number of records not yet yielded.
    pub fn remaining(&self) -> usize {
        if self.failed {
            return 0;
        }
        (self.bound - self.offset) / self.codec.entry_size()
    }
}

impl Iterator for RecordIterator {
    type Item = Result<StarTreeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bound {
            return None;
        }

        let entry_size = self.codec.entry_size();
        let offset = self.offset;
        self.offset += entry_size;

        let result = match self.region.read(offset, entry_size) {
            Some(bytes) => self.codec.decode_at(bytes, offset),
            None => Err(StoreError::corrupt(offset, "record span beyond snapshot")),
        };
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // A corrupt record ends the scan early.
        (0, Some(self.remaining()))
    }
}

impl std::fmt::Debug for RecordIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIterator")
            .field("offset", &self.offset)
            .field("bound", &self.bound)
            .field("failed", &self.failed)
            .finish()
    }
}
