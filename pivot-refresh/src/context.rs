//! FILENAME: pivot-refresh/src/context.rs
//! Per-refresh working set.
//!
//! The shared `SourceCache` is immutable, so everything a single refresh
//! derives from it lives here: grouping-generated virtual fields and their
//! per-record values, the page-filter mask, and the data-quality tallies.
//! The context is dropped when the refresh finishes; nothing leaks back
//! into the cache.

use serde::{Deserialize, Serialize};

use crate::cache::{FieldCache, SourceCache, ValueId, VALUE_ID_EMPTY};
use crate::definition::{FieldIndex, Function, ItemSort};

// ============================================================================
// REFRESH STATS
// ============================================================================

/// Data-quality tallies for one refresh. These are the conditions absorbed
/// rather than raised: they degrade output gracefully, and the caller can
/// inspect them afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshStats {
    /// Total records in the cache.
    pub records_total: usize,
    /// Records passing the page filters.
    pub records_live: usize,
    /// Records excluded from a date-grouped field because their value was
    /// not a date.
    pub skipped_non_date: usize,
    /// Records excluded from a numeric-grouped field because their value
    /// was not a number.
    pub skipped_non_numeric: usize,
}

// ============================================================================
// EFFECTIVE AXIS FIELDS
// ============================================================================

/// An axis field after grouping expansion: either a source field or a
/// grouping-derived virtual field, with its item-level configuration
/// resolved against the cache.
#[derive(Debug, Clone)]
pub struct AxisField {
    /// Index into the context's field space (cache fields first, then
    /// virtual fields).
    pub field_index: FieldIndex,
    pub name: String,
    pub sort: ItemSort,
    pub subtotal_top: bool,
    /// Deduplicated, display-ordered subtotal functions.
    pub subtotal_functions: Vec<Function>,
    /// True when the configured subtotal set was exactly the default Sum.
    pub default_subtotal: bool,
    /// Resolved hidden item ids.
    pub hidden: Vec<ValueId>,
    /// Grouping-derived fields exclude records whose value is empty
    /// (non-dates under date grouping, non-numbers under bucket grouping).
    pub grouped: bool,
}

// ============================================================================
// REFRESH CONTEXT
// ============================================================================

/// The working set of one refresh over a shared cache.
pub(crate) struct RefreshContext<'a> {
    pub cache: &'a SourceCache,
    /// Virtual fields appended after the cache fields; `field_index` =
    /// `cache.field_count() + position`.
    pub virtual_fields: Vec<FieldCache>,
    /// Per-record values for each virtual field, parallel to
    /// `cache.records`.
    pub virtual_records: Vec<Vec<ValueId>>,
    /// Which records pass the page filters.
    pub live: Vec<bool>,
    pub stats: RefreshStats,
}

impl<'a> RefreshContext<'a> {
    pub fn new(cache: &'a SourceCache) -> Self {
        RefreshContext {
            cache,
            virtual_fields: Vec::new(),
            virtual_records: Vec::new(),
            live: vec![true; cache.record_count()],
            stats: RefreshStats {
                records_total: cache.record_count(),
                records_live: cache.record_count(),
                ..RefreshStats::default()
            },
        }
    }

    /// Looks up a field in the combined (cache + virtual) field space.
    pub fn field(&self, index: FieldIndex) -> Option<&FieldCache> {
        let base = self.cache.field_count();
        if index < base {
            self.cache.field(index)
        } else {
            self.virtual_fields.get(index - base)
        }
    }

    /// Registers a virtual field and returns its combined-space index.
    pub fn add_virtual_field(&mut self, field: FieldCache) -> FieldIndex {
        let index = self.cache.field_count() + self.virtual_fields.len();
        self.virtual_fields.push(field);
        self.virtual_records
            .push(vec![VALUE_ID_EMPTY; self.cache.record_count()]);
        index
    }

    pub fn virtual_field_mut(&mut self, index: FieldIndex) -> &mut FieldCache {
        let base = self.cache.field_count();
        &mut self.virtual_fields[index - base]
    }

    pub fn set_virtual_value(&mut self, index: FieldIndex, record: usize, value: ValueId) {
        let base = self.cache.field_count();
        self.virtual_records[index - base][record] = value;
    }

    /// The record's value id at a combined-space field index.
    pub fn value_at(&self, record_idx: usize, field_index: FieldIndex) -> ValueId {
        let base = self.cache.field_count();
        if field_index < base {
            self.cache.records[record_idx]
                .values
                .get(field_index)
                .copied()
                .unwrap_or(VALUE_ID_EMPTY)
        } else {
            self.virtual_records
                .get(field_index - base)
                .and_then(|vr| vr.get(record_idx))
                .copied()
                .unwrap_or(VALUE_ID_EMPTY)
        }
    }

    /// Iterates indices of records passing the page filters.
    pub fn live_records(&self) -> impl Iterator<Item = usize> + '_ {
        self.live
            .iter()
            .enumerate()
            .filter_map(|(i, &ok)| if ok { Some(i) } else { None })
    }
}
