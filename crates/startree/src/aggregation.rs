//! Aggregation over decoded records.
//!
//! An [`AggregationExecutor`] folds records one at a time and reports its
//! results once every record has been seen. Query engines drive executors
//! from a [`RecordIterator`](crate::store::RecordIterator) via [`execute`].

use crate::error::Result;
use crate::record::StarTreeRecord;

/// Folds records into per-function results.
pub trait AggregationExecutor {
    /// Result type produced by each aggregation function.
    type Output;

    /// Folds one record.
    fn aggregate(&mut self, record: &StarTreeRecord);

    /// Results, one per aggregation function, after all records are folded.
    fn result(&self) -> Vec<Self::Output>;
}

/// Sums every metric column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSumExecutor {
    sums: Vec<i64>,
    records: u64,
}

impl MetricSumExecutor {
    /// Creates an executor for `metrics` metric columns.
    pub fn new(metrics: usize) -> Self {
        Self {
            sums: vec![0; metrics],
            records: 0,
        }
    }

    /// Number of records folded so far.
    pub fn record_count(&self) -> u64 {
        self.records
    }
}

impl AggregationExecutor for MetricSumExecutor {
    type Output = i64;

    fn aggregate(&mut self, record: &StarTreeRecord) {
        if self.sums.len() < record.metrics().len() {
            self.sums.resize(record.metrics().len(), 0);
        }
        for (sum, value) in self.sums.iter_mut().zip(record.metrics()) {
            *sum = sum.wrapping_add(*value);
        }
        self.records += 1;
    }

    fn result(&self) -> Vec<i64> {
        self.sums.clone()
    }
}

/// Drains `records` into `executor`.
///
/// Returns the number of records aggregated, or the first error.
pub fn execute<I, E>(records: I, executor: &mut E) -> Result<usize>
where
    I: IntoIterator<Item = Result<StarTreeRecord>>,
    E: AggregationExecutor + ?Sized,
{
    let mut count = 0;
    for record in records {
        executor.aggregate(&record?);
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::record::DimensionValue;

    fn record(metrics: Vec<i64>) -> StarTreeRecord {
        StarTreeRecord::new(vec![DimensionValue::Star], metrics, 0)
    }

    #[test]
    fn test_metric_sum() {
        let mut executor = MetricSumExecutor::new(2);
        let records = vec![Ok(record(vec![1, 10])), Ok(record(vec![2, 20]))];

        assert_eq!(execute(records, &mut executor).unwrap(), 2);
        assert_eq!(executor.result(), vec![3, 30]);
        assert_eq!(executor.record_count(), 2);
    }

    #[test]
    fn test_execute_stops_at_first_error() {
        let mut executor = MetricSumExecutor::new(1);
        let records = vec![
            Ok(record(vec![1])),
            Err(StoreError::corrupt(8, "bad")),
            Ok(record(vec![5])),
        ];

        let err = execute(records, &mut executor).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { offset: 8, .. }));
        assert_eq!(executor.result(), vec![1]);
    }
}
