//! Fixed-width record codec.
//!
//! Every record of a store is encoded to exactly [`RecordCodec::entry_size`]
//! bytes, which is what allows record `i` to live at offset
//! `i * entry_size` without any length prefix or delimiter.
//!
//! ## Binary Layout
//!
//! ```text
//! Offset  Size    Field
//! ------  ----    -----
//! 0x00    8       time bucket (i64 LE)
//! 0x08    w[0]    dimension 0 id (LE, w[0] = id width of dimension 0)
//! ...     w[k]    dimension k id
//! ...     8       metric 0 (i64 LE)
//! ...     8       metric m
//! ```
//!
//! Id widths are derived from the largest id of each dimension's dictionary
//! (sentinels included) and never change for the lifetime of a store.

use crate::dictionary::{Dictionary, DimensionDictionary};
use crate::error::{Result, StoreError};
use crate::record::{RecordSchema, StarTreeRecord, TimeBucket};

/// Size of the time bucket field in bytes.
pub const TIME_FIELD_SIZE: usize = 8;

/// Size of a metric field in bytes.
pub const METRIC_FIELD_SIZE: usize = 8;

/// Stateless translation between logical records and fixed-width bytes.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    schema: RecordSchema,
    tables: Vec<DimensionDictionary>,
    widths: Vec<usize>,
    entry_size: usize,
}

impl RecordCodec {
    /// Creates a codec for a schema and its dictionary.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidDictionary` if a schema dimension has no
    /// dictionary table.
    pub fn new(schema: RecordSchema, dictionary: &Dictionary) -> Result<Self> {
        let mut tables = Vec::with_capacity(schema.dimensions().len());
        for name in schema.dimensions() {
            let table = dictionary.get(name).ok_or_else(|| {
                StoreError::InvalidDictionary(format!("no dictionary for dimension {name:?}"))
            })?;
            tables.push(table.clone());
        }
        let widths: Vec<usize> = tables.iter().map(DimensionDictionary::id_width).collect();
        let entry_size = TIME_FIELD_SIZE
            + widths.iter().sum::<usize>()
            + METRIC_FIELD_SIZE * schema.metrics().len();

        Ok(Self {
            schema,
            tables,
            widths,
            entry_size,
        })
    }

    /// Width in bytes of every encoded record.
    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    /// The schema this codec lays out.
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Width of each dimension id field, in schema order.
    pub fn dimension_widths(&self) -> &[usize] {
        &self.widths
    }

    /// Encodes a record into a new buffer of `entry_size` bytes.
    pub fn encode(&self, record: &StarTreeRecord) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.entry_size];
        self.encode_into(record, &mut buf)?;
        Ok(buf)
    }

    /// Encodes a record into the first `entry_size` bytes of `buf`.
    ///
    /// Dimension values missing from the dictionary are stored as the
    /// `OTHER` sentinel; this never fails.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RecordShape` if the record does not match the
    /// schema. Panics if `buf` is shorter than `entry_size`.
    pub fn encode_into(&self, record: &StarTreeRecord, buf: &mut [u8]) -> Result<()> {
        record.check_shape(&self.schema)?;
        let buf = &mut buf[..self.entry_size];

        buf[..TIME_FIELD_SIZE].copy_from_slice(&record.time().to_le_bytes());
        let mut pos = TIME_FIELD_SIZE;

        for ((value, table), &width) in record
            .dimensions()
            .iter()
            .zip(&self.tables)
            .zip(&self.widths)
        {
            let id = table.resolve(value);
            buf[pos..pos + width].copy_from_slice(&id.to_le_bytes()[..width]);
            pos += width;
        }

        for metric in record.metrics() {
            buf[pos..pos + METRIC_FIELD_SIZE].copy_from_slice(&metric.to_le_bytes());
            pos += METRIC_FIELD_SIZE;
        }

        Ok(())
    }

    /// Decodes the record held in the first `entry_size` bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CorruptRecord` if `bytes` is too short or holds
    /// an id unknown to the dictionary.
    pub fn decode(&self, bytes: &[u8]) -> Result<StarTreeRecord> {
        self.decode_at(bytes, 0)
    }

    /// Like [`decode`](Self::decode), reporting `offset` in errors.
    pub(crate) fn decode_at(&self, bytes: &[u8], offset: usize) -> Result<StarTreeRecord> {
        if bytes.len() < self.entry_size {
            return Err(StoreError::corrupt(
                offset,
                format!(
                    "record span is {} bytes, expected {}",
                    bytes.len(),
                    self.entry_size
                ),
            ));
        }

        let time = read_time(bytes);
        let mut pos = TIME_FIELD_SIZE;

        let mut dimensions = Vec::with_capacity(self.tables.len());
        for ((table, &width), name) in self
            .tables
            .iter()
            .zip(&self.widths)
            .zip(self.schema.dimensions())
        {
            let mut id_bytes = [0u8; 4];
            id_bytes[..width].copy_from_slice(&bytes[pos..pos + width]);
            let id = u32::from_le_bytes(id_bytes);
            let value = table.lookup(id).ok_or_else(|| {
                StoreError::corrupt(offset, format!("unknown id {id} for dimension {name:?}"))
            })?;
            dimensions.push(value);
            pos += width;
        }

        let mut metrics = Vec::with_capacity(self.schema.metrics().len());
        for _ in self.schema.metrics() {
            metrics.push(i64::from_le_bytes(
                bytes[pos..pos + METRIC_FIELD_SIZE].try_into().unwrap(),
            ));
            pos += METRIC_FIELD_SIZE;
        }

        Ok(StarTreeRecord::new(dimensions, metrics, time))
    }

    /// Reads only the time bucket of an encoded record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CorruptRecord` if `bytes` is too short.
    pub fn decode_time(&self, bytes: &[u8]) -> Result<TimeBucket> {
        if bytes.len() < self.entry_size {
            return Err(StoreError::corrupt(0, "record span too short"));
        }
        Ok(read_time(bytes))
    }
}

fn read_time(bytes: &[u8]) -> TimeBucket {
    i64::from_le_bytes(bytes[..TIME_FIELD_SIZE].try_into().unwrap())
}
