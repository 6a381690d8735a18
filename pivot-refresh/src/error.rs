//! FILENAME: pivot-refresh/src/error.rs

use thiserror::Error;

/// Rejected-configuration errors, surfaced before any tree building
/// begins. Data-quality conditions (non-numeric values, unparsable dates,
/// unresolved formula references) are never errors; they are absorbed and
/// tallied in `RefreshStats` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("field index {index} is out of range: the cache has {count} fields")]
    FieldOutOfRange { index: usize, count: usize },

    #[error("field `{field}` is calculated and cannot be placed on a row, column, or page axis")]
    CalculatedFieldOnAxis { field: String },

    #[error("page field `{field}` selects item {index}, but the field has {count} items")]
    PageItemOutOfRange {
        field: String,
        index: usize,
        count: usize,
    },

    #[error("field `{field}` sorts by data field {index}, but only {count} data fields are defined")]
    SortDataFieldOutOfRange {
        field: String,
        index: usize,
        count: usize,
    },

    #[error("numeric grouping on field `{field}` requires a positive bucket size, got {size}")]
    InvalidBucketSize { field: String, size: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_compare_by_value() {
        let a = ConfigError::InvalidBucketSize {
            field: "Score".to_string(),
            size: 0.0,
        };
        assert_eq!(a.clone(), a);
        assert_ne!(
            a,
            ConfigError::InvalidBucketSize {
                field: "Score".to_string(),
                size: -1.0,
            }
        );
        assert_eq!(
            ConfigError::FieldOutOfRange { index: 9, count: 3 }.to_string(),
            "field index 9 is out of range: the cache has 3 fields"
        );
    }
}
