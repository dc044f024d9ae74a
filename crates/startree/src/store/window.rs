//! Time bucket retention window.
//!
//! Tracks how many stored records belong to each time bucket and decides
//! which buckets fall out of the window when new records arrive. The window
//! keeps at most `num_time_buckets` distinct buckets; when it overflows the
//! smallest buckets (furthest from the newest one) are evicted.

use crate::record::TimeBucket;
use std::collections::{BTreeMap, BTreeSet};

/// Record counts per retained time bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TimeWindow {
    num_time_buckets: usize,
    counts: BTreeMap<TimeBucket, u64>,
    evicted_total: u64,
}

/// Outcome of admitting a batch of time buckets into the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WindowPlan {
    /// Bucket counts once the batch has been admitted.
    pub counts: BTreeMap<TimeBucket, u64>,
    /// Buckets that held records before the batch and are now evicted.
    pub evicted_existing: BTreeSet<TimeBucket>,
    /// Number of buckets holding records that the batch evicted.
    pub evicted_count: u64,
}

impl WindowPlan {
    /// Returns true if a record of `bucket` survives the batch.
    pub fn retains(&self, bucket: TimeBucket) -> bool {
        self.counts.contains_key(&bucket)
    }

    /// Total number of records held once the plan is applied.
    pub fn record_count(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Returns true if previously stored records must be dropped.
    pub fn needs_compaction(&self) -> bool {
        !self.evicted_existing.is_empty()
    }
}

impl TimeWindow {
    pub fn new(num_time_buckets: usize) -> Self {
        Self {
            num_time_buckets,
            counts: BTreeMap::new(),
            evicted_total: 0,
        }
    }

    /// Rebuilds the window from stored time buckets, without evicting.
    pub fn from_buckets(num_time_buckets: usize, buckets: impl IntoIterator<Item = TimeBucket>) -> Self {
        let mut window = Self::new(num_time_buckets);
        for bucket in buckets {
            *window.counts.entry(bucket).or_insert(0) += 1;
        }
        window
    }

    /// Plans the admission of a batch, processing records in order.
    ///
    /// A record whose bucket is evicted before the batch ends, including a
    /// late record for a bucket older than the window, is not retained.
    pub fn plan(&self, batch: impl IntoIterator<Item = TimeBucket>) -> WindowPlan {
        let mut counts = self.counts.clone();
        let mut evicted_existing = BTreeSet::new();
        let mut evicted_count = 0;

        // Covers a window that already overflows, e.g. right after reopen.
        for bucket in evict_overflow(&mut counts, self.num_time_buckets) {
            evicted_existing.insert(bucket);
            evicted_count += 1;
        }
        for bucket in batch {
            let admitted = counts.contains_key(&bucket);
            *counts.entry(bucket).or_insert(0) += 1;
            for evicted in evict_overflow(&mut counts, self.num_time_buckets) {
                // A late record older than the window never held a slot.
                if evicted == bucket && !admitted {
                    continue;
                }
                if self.counts.contains_key(&evicted) {
                    evicted_existing.insert(evicted);
                }
                evicted_count += 1;
            }
        }

        WindowPlan {
            counts,
            evicted_existing,
            evicted_count,
        }
    }

    /// Applies a plan produced by [`plan`](Self::plan).
    pub fn apply(&mut self, plan: WindowPlan) {
        self.counts = plan.counts;
        self.evicted_total += plan.evicted_count;
    }

    pub fn record_count(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn bucket_count(&self) -> usize {
        self.counts.len()
    }

    pub fn min_bucket(&self) -> Option<TimeBucket> {
        self.counts.keys().next().copied()
    }

    pub fn max_bucket(&self) -> Option<TimeBucket> {
        self.counts.keys().next_back().copied()
    }

    pub fn evicted_total(&self) -> u64 {
        self.evicted_total
    }

    pub fn buckets(&self) -> Vec<TimeBucket> {
        self.counts.keys().copied().collect()
    }
}

/// Pops the smallest buckets until at most `limit` remain.
fn evict_overflow(counts: &mut BTreeMap<TimeBucket, u64>, limit: usize) -> Vec<TimeBucket> {
    let mut evicted = Vec::new();
    while counts.len() > limit {
        match counts.pop_first() {
            Some((bucket, _)) => evicted.push(bucket),
            None => break,
        }
    }
    evicted
}
