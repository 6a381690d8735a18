//! FILENAME: pivot-refresh/src/grouping.rs
//! Field Grouper - expands grouped cache fields into virtual axis fields.
//!
//! Date grouping instantiates one virtual field per selected granularity,
//! always in coarse-to-fine order (Years, Quarters, Months, Days, Hours,
//! Minutes, Seconds) regardless of configuration order. Numeric grouping
//! instantiates a single virtual field of contiguous `[start, start+size)`
//! buckets anchored at the data minimum.
//!
//! Virtual items are pre-interned in calendar/bucket order, so the natural
//! item order of a grouped field is its calendar order. Records whose
//! source value cannot be grouped (non-dates, non-numbers) get the empty
//! id: they are excluded from that field's grouped output and tallied as a
//! data-quality condition, never raised as an error.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::cache::{
    parse_cache_value_as_datetime, CacheValue, DateLevel, FieldCache, FieldKind, ValueId,
    VALUE_ID_EMPTY,
};
use crate::context::{AxisField, RefreshContext};
use crate::definition::PivotField;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Expands an ordered axis field list, replacing grouped fields with their
/// virtual expansions. Configuration was validated beforehand.
pub(crate) fn expand_axis_fields(
    ctx: &mut RefreshContext<'_>,
    fields: &[PivotField],
) -> Vec<AxisField> {
    let mut effective = Vec::new();

    for field in fields {
        let kind = ctx
            .field(field.source_index)
            .map(|f| f.kind.clone())
            .unwrap_or_default();

        match kind {
            FieldKind::Discrete | FieldKind::Calculated { .. } => {
                effective.push(plain_axis_field(ctx, field));
            }
            FieldKind::DateGroup { levels } if !levels.is_empty() => {
                expand_date_group(ctx, field, &levels, &mut effective);
            }
            // An empty level set behaves like an ungrouped field.
            FieldKind::DateGroup { .. } => {
                effective.push(plain_axis_field(ctx, field));
            }
            FieldKind::NumericGroup { size } => {
                expand_numeric_group(ctx, field, size, &mut effective);
            }
        }
    }

    effective
}

/// Builds the effective field for an ungrouped source field.
fn plain_axis_field(ctx: &RefreshContext<'_>, field: &PivotField) -> AxisField {
    let hidden = resolve_hidden(ctx, field.source_index, &field.hidden_items);
    AxisField {
        field_index: field.source_index,
        name: field.name.clone(),
        sort: field.sort,
        subtotal_top: field.subtotal_top,
        subtotal_functions: field.ordered_subtotal_functions(),
        default_subtotal: field.has_default_subtotal(),
        hidden,
        grouped: false,
    }
}

/// Resolves hidden item labels to value ids for a (possibly virtual) field.
fn resolve_hidden(ctx: &RefreshContext<'_>, field_index: usize, labels: &[String]) -> Vec<ValueId> {
    let Some(field) = ctx.field(field_index) else {
        return Vec::new();
    };
    labels
        .iter()
        .filter_map(|label| field.find_by_label(label))
        .collect()
}

// ============================================================================
// DATE GROUPING
// ============================================================================

/// Instantiates one virtual field per selected granularity, coarse to fine.
fn expand_date_group(
    ctx: &mut RefreshContext<'_>,
    field: &PivotField,
    levels: &[DateLevel],
    effective: &mut Vec<AxisField>,
) {
    // Parse every record's source value once.
    let record_count = ctx.cache.record_count();
    let mut parsed: Vec<Option<NaiveDateTime>> = Vec::with_capacity(record_count);
    for record_idx in 0..record_count {
        let value_id = ctx.value_at(record_idx, field.source_index);
        let dt = ctx
            .field(field.source_index)
            .and_then(|f| f.get_value(value_id))
            .and_then(parse_cache_value_as_datetime);
        parsed.push(dt);
    }
    ctx.stats.skipped_non_date += parsed.iter().filter(|p| p.is_none()).count();

    // Selected granularities in fixed coarse-to-fine order, deduplicated.
    for level in DateLevel::COARSE_TO_FINE {
        if !levels.contains(&level) {
            continue;
        }

        let name = format!("{} ({})", field.name, level.name());
        let mut vf = FieldCache::new(0, name.clone());
        pre_intern_level(&mut vf, level, &parsed);
        let vf_index = ctx.add_virtual_field(vf);

        for (record_idx, dt) in parsed.iter().enumerate() {
            let value_id = match dt {
                Some(dt) => {
                    let value = date_level_value(dt, level);
                    ctx.virtual_field_mut(vf_index).intern(value)
                }
                None => VALUE_ID_EMPTY,
            };
            ctx.set_virtual_value(vf_index, record_idx, value_id);
        }

        let hidden = resolve_hidden(ctx, vf_index, &field.hidden_items);
        effective.push(AxisField {
            field_index: vf_index,
            name,
            sort: field.sort,
            subtotal_top: field.subtotal_top,
            subtotal_functions: field.ordered_subtotal_functions(),
            default_subtotal: field.has_default_subtotal(),
            hidden,
            grouped: true,
        });
    }
}

/// Interns a granularity's items in calendar order, with display labels,
/// so ascending value id is calendar order.
fn pre_intern_level(vf: &mut FieldCache, level: DateLevel, parsed: &[Option<NaiveDateTime>]) {
    match level {
        DateLevel::Quarters => {
            for q in 1..=4u32 {
                let id = vf.intern(CacheValue::number(q as f64));
                vf.label_map.insert(id, format!("Qtr{}", q));
            }
        }
        DateLevel::Months => {
            for (i, name) in MONTH_NAMES.iter().enumerate() {
                let id = vf.intern(CacheValue::number((i + 1) as f64));
                vf.label_map.insert(id, name.to_string());
            }
        }
        // The open-ended levels intern only values that occur, sorted.
        DateLevel::Years
        | DateLevel::Days
        | DateLevel::Hours
        | DateLevel::Minutes
        | DateLevel::Seconds => {
            let mut seen: Vec<i64> = parsed
                .iter()
                .flatten()
                .map(|dt| date_level_key(dt, level))
                .collect();
            seen.sort_unstable();
            seen.dedup();
            for key in seen {
                let id = vf.intern(CacheValue::number(key as f64));
                vf.label_map.insert(id, date_level_label(key, level));
            }
        }
    }
}

/// The cache value a date-time maps to at a granularity.
fn date_level_value(dt: &NaiveDateTime, level: DateLevel) -> CacheValue {
    CacheValue::number(date_level_key(dt, level) as f64)
}

/// Sortable integer key per granularity. Days group day-of-month within
/// month (the same "15-Mar" bucket across years), like the reference
/// application.
fn date_level_key(dt: &NaiveDateTime, level: DateLevel) -> i64 {
    match level {
        DateLevel::Years => dt.year() as i64,
        DateLevel::Quarters => ((dt.month() - 1) / 3 + 1) as i64,
        DateLevel::Months => dt.month() as i64,
        DateLevel::Days => (dt.month() * 100 + dt.day()) as i64,
        DateLevel::Hours => dt.hour() as i64,
        DateLevel::Minutes => dt.minute() as i64,
        DateLevel::Seconds => dt.second() as i64,
    }
}

/// Display label for an open-ended granularity key.
fn date_level_label(key: i64, level: DateLevel) -> String {
    match level {
        DateLevel::Years => format!("{}", key),
        DateLevel::Days => {
            let month = (key / 100) as usize;
            let day = key % 100;
            format!("{}-{}", day, MONTH_NAMES[month.saturating_sub(1).min(11)])
        }
        DateLevel::Hours => format!("{:02}", key),
        DateLevel::Minutes | DateLevel::Seconds => format!(":{:02}", key),
        DateLevel::Quarters | DateLevel::Months => unreachable!("pre-interned levels"),
    }
}

// ============================================================================
// NUMERIC GROUPING
// ============================================================================

/// Instantiates a single virtual field of `[start, start+size)` buckets,
/// with `start` anchored at the data minimum.
fn expand_numeric_group(
    ctx: &mut RefreshContext<'_>,
    field: &PivotField,
    size: f64,
    effective: &mut Vec<AxisField>,
) {
    let record_count = ctx.cache.record_count();
    let mut numeric: Vec<Option<f64>> = Vec::with_capacity(record_count);
    for record_idx in 0..record_count {
        let value_id = ctx.value_at(record_idx, field.source_index);
        let n = ctx
            .field(field.source_index)
            .and_then(|f| f.get_value(value_id))
            .and_then(|v| match v {
                CacheValue::Number(n) => Some(n.as_f64()),
                _ => None,
            });
        numeric.push(n);
    }
    ctx.stats.skipped_non_numeric += numeric.iter().filter(|n| n.is_none()).count();

    let mut vf = FieldCache::new(0, field.name.clone());
    let start = numeric
        .iter()
        .flatten()
        .fold(f64::INFINITY, |acc, &v| acc.min(v));

    let mut bucket_of = vec![VALUE_ID_EMPTY; record_count];
    if start.is_finite() && size > 0.0 {
        let max = numeric
            .iter()
            .flatten()
            .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let bucket_count = ((max - start) / size).floor() as usize + 1;

        // Pre-intern every bucket in range order.
        for i in 0..bucket_count {
            let lo = start + i as f64 * size;
            let hi = lo + size;
            let id = vf.intern(CacheValue::number(i as f64));
            vf.label_map
                .insert(id, format!("{}-{}", fmt_bound(lo), fmt_bound(hi)));
        }

        for (record_idx, n) in numeric.iter().enumerate() {
            if let Some(v) = n {
                let i = (((v - start) / size).floor() as usize).min(bucket_count - 1);
                bucket_of[record_idx] = i as ValueId;
            }
        }
    }

    let name = field.name.clone();
    let vf_index = ctx.add_virtual_field(vf);
    for (record_idx, &id) in bucket_of.iter().enumerate() {
        ctx.set_virtual_value(vf_index, record_idx, id);
    }

    let hidden = resolve_hidden(ctx, vf_index, &field.hidden_items);
    effective.push(AxisField {
        field_index: vf_index,
        name,
        sort: field.sort,
        subtotal_top: field.subtotal_top,
        subtotal_functions: field.ordered_subtotal_functions(),
        default_subtotal: field.has_default_subtotal(),
        hidden,
        grouped: true,
    });
}

/// Formats a bucket bound, trimming the decimal point off whole numbers.
fn fmt_bound(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.0}", v)
    } else {
        format!("{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SourceCache;
    use sheet_model::CellValue;

    fn date_cache() -> SourceCache {
        let mut cache = SourceCache::from_rows(
            &["Date", "Total"],
            &[
                vec![CellValue::text("2018-01-15"), CellValue::Number(415.75)],
                vec![CellValue::text("2018-02-20"), CellValue::Number(415.75)],
                vec![CellValue::text("2018-03-05"), CellValue::Number(24.99)],
                vec![CellValue::text("not a date"), CellValue::Number(1.0)],
            ],
        );
        cache.set_date_grouping(
            0,
            vec![DateLevel::Months, DateLevel::Quarters, DateLevel::Years],
        );
        cache
    }

    #[test]
    fn test_date_levels_expand_coarse_to_fine() {
        let cache = date_cache();
        let mut ctx = RefreshContext::new(&cache);
        let fields = vec![PivotField::new(0, "Date")];

        // Configured as Months+Quarters+Years; must come out Years,
        // Quarters, Months.
        let effective = expand_axis_fields(&mut ctx, &fields);
        let names: Vec<&str> = effective.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Date (Years)", "Date (Quarters)", "Date (Months)"]
        );
        assert!(effective.iter().all(|f| f.grouped));
    }

    #[test]
    fn test_non_dates_excluded_not_raised() {
        let cache = date_cache();
        let mut ctx = RefreshContext::new(&cache);
        let effective = expand_axis_fields(&mut ctx, &[PivotField::new(0, "Date")]);

        // The bad record is tallied once per grouped field, not per level.
        assert_eq!(ctx.stats.skipped_non_date, 1);

        // The bad record maps to the empty id on every virtual level.
        for f in &effective {
            assert_eq!(ctx.value_at(3, f.field_index), VALUE_ID_EMPTY);
        }
    }

    #[test]
    fn test_month_and_quarter_labels_are_calendar_ordered() {
        let cache = date_cache();
        let mut ctx = RefreshContext::new(&cache);
        let effective = expand_axis_fields(&mut ctx, &[PivotField::new(0, "Date")]);

        let months = ctx.field(effective[2].field_index).unwrap();
        assert_eq!(months.label(0), "Jan");
        assert_eq!(months.label(11), "Dec");

        let quarters = ctx.field(effective[1].field_index).unwrap();
        assert_eq!(quarters.label(0), "Qtr1");
        assert_eq!(quarters.label(3), "Qtr4");
    }

    #[test]
    fn test_numeric_buckets_anchor_at_minimum() {
        let mut cache = SourceCache::from_rows(
            &["Score"],
            &[
                vec![CellValue::Number(7.0)],
                vec![CellValue::Number(12.0)],
                vec![CellValue::Number(29.0)],
                vec![CellValue::text("n/a")],
            ],
        );
        cache.set_numeric_grouping(0, 10.0);

        let mut ctx = RefreshContext::new(&cache);
        let effective = expand_axis_fields(&mut ctx, &[PivotField::new(0, "Score")]);
        assert_eq!(effective.len(), 1);
        let vf = ctx.field(effective[0].field_index).unwrap();

        // Buckets start at the minimum (7), not at zero.
        assert_eq!(vf.label(0), "7-17");
        assert_eq!(vf.label(1), "17-27");
        assert_eq!(vf.label(2), "27-37");

        assert_eq!(ctx.value_at(0, effective[0].field_index), 0);
        assert_eq!(ctx.value_at(1, effective[0].field_index), 0);
        assert_eq!(ctx.value_at(2, effective[0].field_index), 2);
        assert_eq!(
            ctx.value_at(3, effective[0].field_index),
            VALUE_ID_EMPTY
        );
        assert_eq!(ctx.stats.skipped_non_numeric, 1);
    }
}
