//! FILENAME: pivot-refresh/src/cache.rs
//! Source Cache - the deduplicated, field-oriented snapshot of source data.
//!
//! The cache is designed for:
//! - Fast initial build from source data (O(n) where n = rows)
//! - Memory-efficient storage via value interning
//! - Sharing between several pivot tables (immutable after build, held
//!   behind an `Arc`; a cache refresh replaces the whole object)
//!
//! Architecture:
//! - Each unique value is stored once per field and referenced by index
//!   ("shared items", mirroring the file format's cache-field structure)
//! - Records are stored as vectors of indices into the shared item stores
//! - A field's nature (plain, grouped, calculated) is resolved once at
//!   build time into a `FieldKind`, never re-interpreted per access

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use sheet_model::CellValue;

use crate::definition::FieldIndex;

// ============================================================================
// VALUE INTERNING
// ============================================================================

/// A reference to an interned value within a field's shared item store.
/// Using u32 to save memory (supports up to 4B unique values per field).
pub type ValueId = u32;

/// Represents a "null" or missing value in the cache.
pub const VALUE_ID_EMPTY: ValueId = u32::MAX;

/// A normalized, hashable representation of a cell value.
/// Used as keys in the shared item store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheValue {
    Empty,
    Number(OrderedFloat),
    Text(String),
    Boolean(bool),
    Error(String),
}

impl From<&CellValue> for CacheValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => CacheValue::Empty,
            CellValue::Number(n) => CacheValue::Number(OrderedFloat(*n)),
            CellValue::Text(s) => CacheValue::Text(s.clone()),
            CellValue::Boolean(b) => CacheValue::Boolean(*b),
            CellValue::Error(e) => CacheValue::Error(format!("{:?}", e)),
        }
    }
}

impl CacheValue {
    pub fn number(n: f64) -> Self {
        CacheValue::Number(OrderedFloat(n))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CacheValue::Number(n) => Some(n.0),
            _ => None,
        }
    }
}

/// Wrapper around f64 that implements Eq and Hash for use as HashMap keys.
/// NaN values are treated as equal to each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            true
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            // All NaN values hash to the same thing
            u64::MAX.hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}

impl OrderedFloat {
    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

/// Total order over cache values: empty first, then numbers, text,
/// booleans, errors. Used by the ascending/descending item sorts.
pub(crate) fn compare_cache_values(a: &CacheValue, b: &CacheValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (CacheValue::Empty, CacheValue::Empty) => Ordering::Equal,
        (CacheValue::Empty, _) => Ordering::Less,
        (_, CacheValue::Empty) => Ordering::Greater,

        (CacheValue::Number(na), CacheValue::Number(nb)) => {
            na.0.partial_cmp(&nb.0).unwrap_or(Ordering::Equal)
        }
        (CacheValue::Number(_), _) => Ordering::Less,
        (_, CacheValue::Number(_)) => Ordering::Greater,

        (CacheValue::Text(ta), CacheValue::Text(tb)) => ta.cmp(tb),
        (CacheValue::Text(_), _) => Ordering::Less,
        (_, CacheValue::Text(_)) => Ordering::Greater,

        (CacheValue::Boolean(ba), CacheValue::Boolean(bb)) => ba.cmp(bb),
        (CacheValue::Boolean(_), _) => Ordering::Less,
        (_, CacheValue::Boolean(_)) => Ordering::Greater,

        (CacheValue::Error(ea), CacheValue::Error(eb)) => ea.cmp(eb),
    }
}

// ============================================================================
// FIELD KIND
// ============================================================================

/// Granularities for date grouping, in fixed coarse-to-fine order.
/// The variant order is load-bearing: grouping always instantiates the
/// selected levels in this order regardless of configuration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DateLevel {
    Years,
    Quarters,
    Months,
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl DateLevel {
    /// All levels, coarse to fine.
    pub const COARSE_TO_FINE: [DateLevel; 7] = [
        DateLevel::Years,
        DateLevel::Quarters,
        DateLevel::Months,
        DateLevel::Days,
        DateLevel::Hours,
        DateLevel::Minutes,
        DateLevel::Seconds,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DateLevel::Years => "Years",
            DateLevel::Quarters => "Quarters",
            DateLevel::Months => "Months",
            DateLevel::Days => "Days",
            DateLevel::Hours => "Hours",
            DateLevel::Minutes => "Minutes",
            DateLevel::Seconds => "Seconds",
        }
    }
}

/// The nature of a cache field, resolved once at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum FieldKind {
    /// Plain field: shared items are the deduplicated source values.
    #[default]
    Discrete,
    /// Date-grouped field: expands into one virtual field per selected
    /// granularity when placed on an axis.
    DateGroup { levels: Vec<DateLevel> },
    /// Numeric range grouping: expands into a single virtual field whose
    /// items are contiguous `[start, start+size)` buckets anchored at the
    /// data minimum.
    NumericGroup { size: f64 },
    /// Calculated field: no shared items of its own; values are produced
    /// per record by the external formula evaluator.
    Calculated { formula: String },
}

// ============================================================================
// FIELD CACHE
// ============================================================================

/// Shared items for a single field (column) of the source range.
/// Interning preserves first-seen order, so ascending `ValueId` *is* the
/// field's natural item order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCache {
    /// The source column index this cache represents.
    pub source_index: FieldIndex,

    /// Display name (from the header row).
    pub name: String,

    /// The field's resolved nature.
    pub kind: FieldKind,

    /// Map from value to its unique ID (for deduplication during build).
    value_to_id: FxHashMap<CacheValue, ValueId>,

    /// Ordered list of unique values (indexed by ValueId).
    id_to_value: Vec<CacheValue>,

    /// Friendly display labels keyed by ValueId. Used by grouping-derived
    /// virtual fields ("Jan", "Qtr1", "0-10"); plain fields format their
    /// values directly.
    pub(crate) label_map: FxHashMap<ValueId, String>,
}

impl FieldCache {
    pub fn new(source_index: FieldIndex, name: impl Into<String>) -> Self {
        FieldCache {
            source_index,
            name: name.into(),
            kind: FieldKind::Discrete,
            value_to_id: FxHashMap::default(),
            id_to_value: Vec::new(),
            label_map: FxHashMap::default(),
        }
    }

    /// Interns a value and returns its ValueId.
    /// If the value already exists, returns the existing ID.
    pub fn intern(&mut self, value: CacheValue) -> ValueId {
        if let CacheValue::Empty = value {
            return VALUE_ID_EMPTY;
        }

        if let Some(&id) = self.value_to_id.get(&value) {
            return id;
        }

        let id = self.id_to_value.len() as ValueId;
        self.id_to_value.push(value.clone());
        self.value_to_id.insert(value, id);
        id
    }

    /// Gets the value for a given ID.
    pub fn get_value(&self, id: ValueId) -> Option<&CacheValue> {
        if id == VALUE_ID_EMPTY {
            return Some(&CacheValue::Empty);
        }
        self.id_to_value.get(id as usize)
    }

    /// Returns the number of shared items (excluding empty).
    pub fn unique_count(&self) -> usize {
        self.id_to_value.len()
    }

    /// Display label for a shared item. Grouping-derived fields resolve
    /// through the label map; plain values format like cells do.
    pub fn label(&self, id: ValueId) -> String {
        if id == VALUE_ID_EMPTY {
            return "(blank)".to_string();
        }
        if let Some(label) = self.label_map.get(&id) {
            return label.clone();
        }
        match self.get_value(id) {
            Some(CacheValue::Empty) | None => "(blank)".to_string(),
            Some(CacheValue::Number(n)) => {
                let v = n.as_f64();
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    format!("{:.0}", v)
                } else {
                    format!("{}", v)
                }
            }
            Some(CacheValue::Text(s)) => s.clone(),
            Some(CacheValue::Boolean(b)) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Some(CacheValue::Error(e)) => format!("#{}", e),
        }
    }

    /// Finds the item id whose display label matches `label`.
    pub fn find_by_label(&self, label: &str) -> Option<ValueId> {
        (0..self.unique_count() as ValueId).find(|&id| self.label(id) == label)
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// A single row from the source data, stored as interned value IDs.
/// Rebuilt wholesale whenever the source range changes; never mutated in
/// place. Calculated fields hold `VALUE_ID_EMPTY` placeholders, their
/// values are produced per refresh by the formula evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// The original row index in the source data (0-based, excluding header).
    pub source_row: u32,

    /// ValueIds for each field, indexed by FieldIndex.
    pub values: SmallVec<[ValueId; 8]>,
}

// ============================================================================
// SOURCE CACHE
// ============================================================================

/// The deduplicated snapshot of the source range. Shared between pivot
/// tables behind an `Arc`; immutable once a refresh starts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceCache {
    /// Shared items per source field, plus any calculated fields appended
    /// after the source columns.
    pub fields: Vec<FieldCache>,

    /// All source records, stored as interned value IDs.
    pub records: Vec<CacheRecord>,
}

impl SourceCache {
    /// Creates an empty cache with `field_count` plain fields.
    pub fn new(field_count: usize) -> Self {
        SourceCache {
            fields: (0..field_count)
                .map(|i| FieldCache::new(i, format!("Field{}", i)))
                .collect(),
            records: Vec::new(),
        }
    }

    /// Builds a cache from header names and rows of cell values.
    pub fn from_rows(names: &[&str], rows: &[Vec<CellValue>]) -> Self {
        let mut cache = SourceCache::new(names.len());
        for (i, name) in names.iter().enumerate() {
            cache.set_field_name(i, *name);
        }
        for (row, values) in rows.iter().enumerate() {
            cache.add_record(row as u32, values);
        }
        cache
    }

    /// Sets the field name (from the header row).
    pub fn set_field_name(&mut self, field_index: FieldIndex, name: impl Into<String>) {
        if let Some(field) = self.fields.get_mut(field_index) {
            field.name = name.into();
        }
    }

    /// Marks a source field as date-grouped. Takes effect when the field
    /// is placed on an axis.
    pub fn set_date_grouping(&mut self, field_index: FieldIndex, levels: Vec<DateLevel>) {
        if let Some(field) = self.fields.get_mut(field_index) {
            field.kind = FieldKind::DateGroup { levels };
        }
    }

    /// Marks a source field as numeric-range-grouped with the given bucket
    /// size.
    pub fn set_numeric_grouping(&mut self, field_index: FieldIndex, size: f64) {
        if let Some(field) = self.fields.get_mut(field_index) {
            field.kind = FieldKind::NumericGroup { size };
        }
    }

    /// Appends a calculated field. It has no shared items; records carry an
    /// empty placeholder in its slot.
    pub fn add_calculated_field(
        &mut self,
        name: impl Into<String>,
        formula: impl Into<String>,
    ) -> FieldIndex {
        let index = self.fields.len();
        let mut field = FieldCache::new(index, name);
        field.kind = FieldKind::Calculated {
            formula: formula.into(),
        };
        self.fields.push(field);
        for record in &mut self.records {
            record.values.push(VALUE_ID_EMPTY);
        }
        index
    }

    /// Adds a record to the cache. Values should be in source field order;
    /// missing trailing values and calculated-field slots become empty.
    pub fn add_record(&mut self, source_row: u32, values: &[CellValue]) {
        let mut interned: SmallVec<[ValueId; 8]> = SmallVec::with_capacity(self.fields.len());

        for (i, field) in self.fields.iter_mut().enumerate() {
            if matches!(field.kind, FieldKind::Calculated { .. }) {
                interned.push(VALUE_ID_EMPTY);
                continue;
            }
            match values.get(i) {
                Some(value) => interned.push(field.intern(CacheValue::from(value))),
                None => interned.push(VALUE_ID_EMPTY),
            }
        }

        self.records.push(CacheRecord {
            source_row,
            values: interned,
        });
    }

    pub fn field(&self, index: FieldIndex) -> Option<&FieldCache> {
        self.fields.get(index)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Finds a field by display name. Used when binding record values to
    /// formula identifiers.
    pub fn field_index_by_name(&self, name: &str) -> Option<FieldIndex> {
        self.fields.iter().position(|f| f.name == name)
    }
}

// ============================================================================
// DATE PARSING
// ============================================================================

/// Interprets a cache value as a point in time, for date grouping.
///
/// Numbers are treated as spreadsheet serial dates (days since 1899-12-30,
/// fractional part = time of day). Text values are tried against the ISO
/// formats the source reader emits. Anything else is not a date; the
/// caller excludes such records from grouped output.
pub(crate) fn parse_cache_value_as_datetime(value: &CacheValue) -> Option<NaiveDateTime> {
    match value {
        CacheValue::Number(n) => serial_to_datetime(n.as_f64()),
        CacheValue::Text(s) => {
            let s = s.trim();
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return d.and_hms_opt(0, 0, 0);
            }
            None
        }
        _ => None,
    }
}

/// Converts a spreadsheet serial number to a date-time. Serial 1 is
/// 1899-12-31; negative and absurdly large serials are rejected.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None; // outside 1899-12-30 ..= 9999-12-31
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_intern_preserves_first_seen_order() {
        let mut field = FieldCache::new(0, "Month");
        let jan = field.intern(CacheValue::Text("Jan".to_string()));
        let mar = field.intern(CacheValue::Text("Mar".to_string()));
        let jan_again = field.intern(CacheValue::Text("Jan".to_string()));

        assert_eq!(jan, 0);
        assert_eq!(mar, 1);
        assert_eq!(jan_again, jan);
        assert_eq!(field.unique_count(), 2);
        assert_eq!(field.label(0), "Jan");
    }

    #[test]
    fn test_empty_is_not_interned() {
        let mut field = FieldCache::new(0, "F");
        assert_eq!(field.intern(CacheValue::Empty), VALUE_ID_EMPTY);
        assert_eq!(field.unique_count(), 0);
        assert_eq!(field.label(VALUE_ID_EMPTY), "(blank)");
    }

    #[test]
    fn test_number_labels_drop_trailing_zeroes() {
        let mut field = FieldCache::new(0, "Qty");
        let a = field.intern(CacheValue::number(4.0));
        let b = field.intern(CacheValue::number(4.5));
        assert_eq!(field.label(a), "4");
        assert_eq!(field.label(b), "4.5");
    }

    #[test]
    fn test_add_record_interns_per_field() {
        let cache = SourceCache::from_rows(
            &["Month", "Total"],
            &[
                vec![CellValue::text("Jan"), CellValue::Number(415.75)],
                vec![CellValue::text("Jan"), CellValue::Number(415.75)],
                vec![CellValue::text("Mar"), CellValue::Number(24.99)],
            ],
        );

        assert_eq!(cache.record_count(), 3);
        assert_eq!(cache.field_index_by_name("Month"), Some(0));
        assert_eq!(cache.field_index_by_name("Total"), Some(1));
        assert_eq!(cache.fields[0].unique_count(), 2);
        assert_eq!(cache.fields[1].unique_count(), 2); // 415.75 deduplicated
        assert_eq!(cache.records[0].values[0], cache.records[1].values[0]);
    }

    #[test]
    fn test_calculated_field_has_no_shared_items() {
        let mut cache = SourceCache::from_rows(
            &["Qty", "Price"],
            &[vec![CellValue::Number(2.0), CellValue::Number(10.0)]],
        );
        let calc = cache.add_calculated_field("Amount", "Qty * Price");

        assert_eq!(cache.fields[calc].unique_count(), 0);
        assert_eq!(cache.records[0].values[calc], VALUE_ID_EMPTY);

        // Records added after the calculated field also carry a placeholder.
        cache.add_record(1, &[CellValue::Number(3.0), CellValue::Number(5.0)]);
        assert_eq!(cache.records[1].values[calc], VALUE_ID_EMPTY);
    }

    #[test]
    fn test_parse_iso_text_dates() {
        let dt = parse_cache_value_as_datetime(&CacheValue::Text("2018-03-15".to_string()))
            .expect("date");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2018, 3, 15));

        let dt = parse_cache_value_as_datetime(&CacheValue::Text(
            "2018-03-15 13:45:10".to_string(),
        ))
        .expect("datetime");
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (13, 45, 10));
    }

    #[test]
    fn test_parse_serial_dates() {
        // Serial 43115 is 2018-01-15.
        let dt = parse_cache_value_as_datetime(&CacheValue::number(43115.0)).expect("serial");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2018, 1, 15));

        // Fractional part is time of day.
        let dt = parse_cache_value_as_datetime(&CacheValue::number(43115.5)).expect("serial");
        assert_eq!(dt.hour(), 12);

        assert!(parse_cache_value_as_datetime(&CacheValue::number(-1.0)).is_none());
        assert!(parse_cache_value_as_datetime(&CacheValue::Text("CarRack".to_string())).is_none());
    }
}
