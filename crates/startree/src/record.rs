//! Logical records and the dimension/metric schema.

use crate::error::{Result, StoreError};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Time bucket value attached to every record.
pub type TimeBucket = i64;

/// A single dimension value of a logical record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimensionValue {
    /// A raw value, resolved through the dictionary on encode.
    Value(String),
    /// Aggregate over all values of the dimension.
    Star,
    /// Value that was absent from the dictionary.
    Other,
}

impl DimensionValue {
    /// Textual marker for [`DimensionValue::Star`].
    pub const STAR_MARKER: &'static str = "*";

    /// Textual marker for [`DimensionValue::Other`].
    pub const OTHER_MARKER: &'static str = "?";

    /// Returns the raw value, or `None` for sentinels.
    pub fn as_value(&self) -> Option<&str> {
        match self {
            Self::Value(value) => Some(value),
            Self::Star | Self::Other => None,
        }
    }

    /// Returns true for the wildcard sentinel.
    pub fn is_star(&self) -> bool {
        matches!(self, Self::Star)
    }

    /// Returns true for the overflow sentinel.
    pub fn is_other(&self) -> bool {
        matches!(self, Self::Other)
    }
}

impl From<&str> for DimensionValue {
    /// Converts a raw string; the markers `"*"` and `"?"` become sentinels.
    fn from(value: &str) -> Self {
        match value {
            Self::STAR_MARKER => Self::Star,
            Self::OTHER_MARKER => Self::Other,
            _ => Self::Value(value.to_string()),
        }
    }
}

impl From<String> for DimensionValue {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::STAR_MARKER => Self::Star,
            Self::OTHER_MARKER => Self::Other,
            _ => Self::Value(value),
        }
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.write_str(value),
            Self::Star => f.write_str(Self::STAR_MARKER),
            Self::Other => f.write_str(Self::OTHER_MARKER),
        }
    }
}

/// Ordered dimension and metric names.
///
/// The order of names defines the order of fields in the encoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    dimensions: Vec<String>,
    metrics: Vec<String>,
}

impl RecordSchema {
    /// Creates a schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidSchema` for empty or duplicate names.
    pub fn new<D, M, S, T>(dimensions: D, metrics: M) -> Result<Self>
    where
        D: IntoIterator<Item = S>,
        M: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let dimensions: Vec<String> = dimensions.into_iter().map(Into::into).collect();
        let metrics: Vec<String> = metrics.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        for name in dimensions.iter().chain(metrics.iter()) {
            if name.is_empty() {
                return Err(StoreError::InvalidSchema("empty field name".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(StoreError::InvalidSchema(format!(
                    "duplicate field name {name:?}"
                )));
            }
        }

        Ok(Self {
            dimensions,
            metrics,
        })
    }

    /// Dimension names in layout order.
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Metric names in layout order.
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Position of a dimension in the layout.
    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d == name)
    }

    /// Position of a metric in the layout.
    pub fn metric_index(&self, name: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == name)
    }
}

/// A logical record: one value per dimension and metric plus a time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StarTreeRecord {
    dimensions: Vec<DimensionValue>,
    metrics: Vec<i64>,
    time: TimeBucket,
}

impl StarTreeRecord {
    /// Creates a record from values already in schema order.
    pub fn new(dimensions: Vec<DimensionValue>, metrics: Vec<i64>, time: TimeBucket) -> Self {
        Self {
            dimensions,
            metrics,
            time,
        }
    }

    /// Starts a builder that sets fields by name.
    pub fn builder() -> StarTreeRecordBuilder {
        StarTreeRecordBuilder::default()
    }

    /// Dimension values in schema order.
    pub fn dimensions(&self) -> &[DimensionValue] {
        &self.dimensions
    }

    /// Metric values in schema order.
    pub fn metrics(&self) -> &[i64] {
        &self.metrics
    }

    /// Time bucket of the record.
    pub fn time(&self) -> TimeBucket {
        self.time
    }

    /// Looks up a dimension value by name.
    pub fn dimension(&self, schema: &RecordSchema, name: &str) -> Option<&DimensionValue> {
        schema
            .dimension_index(name)
            .and_then(|idx| self.dimensions.get(idx))
    }

    /// Looks up a metric value by name.
    pub fn metric(&self, schema: &RecordSchema, name: &str) -> Option<i64> {
        schema
            .metric_index(name)
            .and_then(|idx| self.metrics.get(idx))
            .copied()
    }

    /// Checks that the record has exactly one value per schema field.
    pub fn check_shape(&self, schema: &RecordSchema) -> Result<()> {
        if self.dimensions.len() != schema.dimensions().len()
            || self.metrics.len() != schema.metrics().len()
        {
            return Err(StoreError::RecordShape {
                expected_dimensions: schema.dimensions().len(),
                actual_dimensions: self.dimensions.len(),
                expected_metrics: schema.metrics().len(),
                actual_metrics: self.metrics.len(),
            });
        }
        Ok(())
    }
}

/// Builds a [`StarTreeRecord`] by field name.
#[derive(Debug, Clone, Default)]
pub struct StarTreeRecordBuilder {
    dimensions: HashMap<String, DimensionValue>,
    metrics: HashMap<String, i64>,
    time: TimeBucket,
}

impl StarTreeRecordBuilder {
    /// Sets a dimension value.
    pub fn dimension(
        mut self,
        name: impl Into<String>,
        value: impl Into<DimensionValue>,
    ) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    /// Sets a metric value.
    pub fn metric(mut self, name: impl Into<String>, value: i64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Sets the time bucket.
    pub fn time(mut self, time: TimeBucket) -> Self {
        self.time = time;
        self
    }

    /// Orders the fields according to `schema`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RecordShape` if a schema field is missing or
    /// a field not in the schema was set.
    pub fn build(mut self, schema: &RecordSchema) -> Result<StarTreeRecord> {
        let shape_error = |dims: usize, metrics: usize| StoreError::RecordShape {
            expected_dimensions: schema.dimensions().len(),
            actual_dimensions: dims,
            expected_metrics: schema.metrics().len(),
            actual_metrics: metrics,
        };
        let (set_dims, set_metrics) = (self.dimensions.len(), self.metrics.len());

        let mut dimensions = Vec::with_capacity(schema.dimensions().len());
        for name in schema.dimensions() {
            match self.dimensions.remove(name) {
                Some(value) => dimensions.push(value),
                None => return Err(shape_error(set_dims, set_metrics)),
            }
        }
        let mut metrics = Vec::with_capacity(schema.metrics().len());
        for name in schema.metrics() {
            match self.metrics.remove(name) {
                Some(value) => metrics.push(value),
                None => return Err(shape_error(set_dims, set_metrics)),
            }
        }
        if !self.dimensions.is_empty() || !self.metrics.is_empty() {
            return Err(shape_error(set_dims, set_metrics));
        }

        Ok(StarTreeRecord::new(dimensions, metrics, self.time))
    }
}
