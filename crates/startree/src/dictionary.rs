//! Dimension dictionaries (forward index).
//!
//! A [`Dictionary`] maps, for every dimension, a raw string value to a small
//! integer id. Two ids are reserved in every dimension:
//!
//! - [`STAR_ID`]: the record aggregates over all values of the dimension.
//! - [`OTHER_ID`]: the value was not present when the dictionary was built.
//!
//! Caller-supplied values receive ids starting at [`FIRST_VALUE_ID`]. The
//! dictionary is immutable once built and can be shared freely between
//! threads.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_startree::dictionary::Dictionary;
//!
//! let dictionary = Dictionary::builder()
//!     .dimension("country", ["us", "ca", "mx"])
//!     .dimension("browser", ["firefox", "chrome"])
//!     .build();
//!
//! assert_eq!(dictionary.get("country").unwrap().id_of("ca"), Some(3));
//! ```

use crate::error::{Result, StoreError};
use crate::record::DimensionValue;
use std::collections::HashMap;

/// Reserved id for the wildcard ("all values") marker.
pub const STAR_ID: u32 = 0;

/// Reserved id for values absent from the dictionary.
pub const OTHER_ID: u32 = 1;

/// First id handed out to caller-supplied values.
pub const FIRST_VALUE_ID: u32 = 2;

/// Value-to-id table for a single dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionDictionary {
    ids: HashMap<String, u32>,
    values: HashMap<u32, String>,
    max_id: u32,
}

impl DimensionDictionary {
    /// Builds a dictionary assigning sequential ids from [`FIRST_VALUE_ID`].
    ///
    /// Duplicate values keep the id of their first occurrence. The sentinel
    /// markers `"*"` and `"?"` always resolve to [`STAR_ID`] and
    /// [`OTHER_ID`], so they are skipped.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dictionary = Self {
            max_id: OTHER_ID,
            ..Self::default()
        };
        let mut next_id = FIRST_VALUE_ID;
        for value in values {
            let value = value.into();
            if is_marker(&value) || dictionary.ids.contains_key(&value) {
                continue;
            }
            dictionary.ids.insert(value.clone(), next_id);
            dictionary.values.insert(next_id, value);
            dictionary.max_id = next_id;
            next_id += 1;
        }
        dictionary
    }

    /// Builds a dictionary from explicit value ids.
    ///
    /// Entries for the sentinel markers themselves (`"*"` → [`STAR_ID`],
    /// `"?"` → [`OTHER_ID`]) are accepted and ignored, so forward indexes
    /// that list the sentinels alongside regular values can be passed as is.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidDictionary` if a regular value uses a
    /// reserved id or two values share one id.
    pub fn from_ids<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut dictionary = Self {
            max_id: OTHER_ID,
            ..Self::default()
        };
        for (value, id) in entries {
            let value = value.into();
            match (value.as_str(), id) {
                (DimensionValue::STAR_MARKER, STAR_ID) | (DimensionValue::OTHER_MARKER, OTHER_ID) => {
                    continue
                }
                (marker, _) if is_marker(marker) => {
                    return Err(StoreError::InvalidDictionary(format!(
                        "sentinel marker {marker:?} mapped to id {id}"
                    )));
                }
                _ => {}
            }
            if id < FIRST_VALUE_ID {
                return Err(StoreError::InvalidDictionary(format!(
                    "value {value:?} uses reserved id {id}"
                )));
            }
            if let Some(existing) = dictionary.values.get(&id) {
                if *existing != value {
                    return Err(StoreError::InvalidDictionary(format!(
                        "values {existing:?} and {value:?} share id {id}"
                    )));
                }
                continue;
            }
            if dictionary.ids.contains_key(&value) {
                return Err(StoreError::InvalidDictionary(format!(
                    "value {value:?} is mapped to more than one id"
                )));
            }
            dictionary.ids.insert(value.clone(), id);
            dictionary.values.insert(id, value);
            dictionary.max_id = dictionary.max_id.max(id);
        }
        Ok(dictionary)
    }

    /// Returns the id of a raw value, if present.
    pub fn id_of(&self, value: &str) -> Option<u32> {
        self.ids.get(value).copied()
    }

    /// Returns the raw value for a non-sentinel id, if present.
    pub fn value_of(&self, id: u32) -> Option<&str> {
        self.values.get(&id).map(String::as_str)
    }

    /// Resolves a dimension value to the id stored on disk.
    ///
    /// Values missing from the dictionary resolve to [`OTHER_ID`].
    pub fn resolve(&self, value: &DimensionValue) -> u32 {
        match value {
            DimensionValue::Star => STAR_ID,
            DimensionValue::Other => OTHER_ID,
            DimensionValue::Value(raw) => self.id_of(raw).unwrap_or(OTHER_ID),
        }
    }

    /// Maps a stored id back to a dimension value.
    ///
    /// Returns `None` for ids that are neither a sentinel nor known.
    pub fn lookup(&self, id: u32) -> Option<DimensionValue> {
        match id {
            STAR_ID => Some(DimensionValue::Star),
            OTHER_ID => Some(DimensionValue::Other),
            _ => self
                .value_of(id)
                .map(|value| DimensionValue::Value(value.to_string())),
        }
    }

    /// Largest id in the dictionary, sentinels included.
    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    /// Number of ids, sentinels included.
    pub fn len(&self) -> usize {
        self.ids.len() + 2
    }

    /// Returns true if no regular values are present.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Width in bytes of the on-disk id field for this dimension.
    ///
    /// Enough whole bytes to hold `max_id`, at least one.
    pub fn id_width(&self) -> usize {
        let bits = (u32::BITS - self.max_id.leading_zeros()).max(1) as usize;
        bits.div_ceil(8)
    }
}

/// Per-dimension dictionaries for a whole schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    dimensions: HashMap<String, DimensionDictionary>,
}

impl Dictionary {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a dictionary.
    pub fn builder() -> DictionaryBuilder {
        DictionaryBuilder::default()
    }

    /// Adds or replaces the table for one dimension.
    pub fn insert(&mut self, dimension: impl Into<String>, table: DimensionDictionary) {
        self.dimensions.insert(dimension.into(), table);
    }

    /// Returns the table for a dimension.
    pub fn get(&self, dimension: &str) -> Option<&DimensionDictionary> {
        self.dimensions.get(dimension)
    }

    /// Number of dimensions covered.
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    /// Returns true if no dimensions are covered.
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }
}

/// Builder for [`Dictionary`].
#[derive(Debug, Default)]
pub struct DictionaryBuilder {
    dictionary: Dictionary,
}

impl DictionaryBuilder {
    /// Adds a dimension whose values get sequential ids.
    pub fn dimension<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dictionary
            .insert(name, DimensionDictionary::from_values(values));
        self
    }

    /// Adds a prebuilt dimension table.
    pub fn table(mut self, name: impl Into<String>, table: DimensionDictionary) -> Self {
        self.dictionary.insert(name, table);
        self
    }

    /// Finishes the dictionary.
    pub fn build(self) -> Dictionary {
        self.dictionary
    }
}

fn is_marker(value: &str) -> bool {
    value == DimensionValue::STAR_MARKER || value == DimensionValue::OTHER_MARKER
}
