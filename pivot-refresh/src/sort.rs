//! FILENAME: pivot-refresh/src/sort.rs
//! Item Sorter - orders the materialized items of an axis field.
//!
//! All sorts are stable. Natural order is first-seen order, which is
//! ascending `ValueId` by construction (and calendar/bucket order for
//! grouping-derived fields). Value sorts compare the interned cache values
//! with the total order from the cache module; data-driven sorts compare
//! externally computed aggregate keys and keep natural order on ties.

use rustc_hash::FxHashMap;

use crate::cache::{compare_cache_values, ValueId};
use crate::context::{AxisField, RefreshContext};
use crate::definition::ItemSort;

/// Orders sibling items by the field's value-based sort. `ByDataField`
/// is not handled here; the caller supplies aggregate keys to
/// [`order_by_keys`] instead.
pub(crate) fn order_value_ids(
    ctx: &RefreshContext<'_>,
    field: &AxisField,
    items: &mut [ValueId],
) {
    match field.sort {
        ItemSort::Natural | ItemSort::ByDataField { .. } => {
            items.sort_unstable();
        }
        ItemSort::Ascending | ItemSort::Descending => {
            // Natural pre-order makes the stable sort tie-break on it.
            items.sort_unstable();
            let descending = field.sort == ItemSort::Descending;
            let cache_field = ctx.field(field.field_index);
            items.sort_by(|&a, &b| {
                let va = cache_field.and_then(|f| f.get_value(a));
                let vb = cache_field.and_then(|f| f.get_value(b));
                let ord = match (va, vb) {
                    (Some(va), Some(vb)) => compare_cache_values(va, vb),
                    _ => std::cmp::Ordering::Equal,
                };
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
    }
}

/// Orders sibling items by externally computed aggregate keys. Items
/// without a key sort as zero; ties keep the incoming (natural) order.
pub(crate) fn order_by_keys(
    items: &mut [ValueId],
    keys: &FxHashMap<ValueId, f64>,
    descending: bool,
) {
    items.sort_unstable();
    items.sort_by(|&a, &b| {
        let ka = keys.get(&a).copied().unwrap_or(0.0);
        let kb = keys.get(&b).copied().unwrap_or(0.0);
        let ord = ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SourceCache;
    use crate::definition::Function;
    use sheet_model::CellValue;

    fn axis(sort: ItemSort) -> AxisField {
        AxisField {
            field_index: 0,
            name: "Month".to_string(),
            sort,
            subtotal_top: false,
            subtotal_functions: vec![Function::Sum],
            default_subtotal: true,
            hidden: Vec::new(),
            grouped: false,
        }
    }

    fn month_cache() -> SourceCache {
        SourceCache::from_rows(
            &["Month"],
            &[
                vec![CellValue::text("Mar")],
                vec![CellValue::text("Jan")],
                vec![CellValue::text("Feb")],
            ],
        )
    }

    #[test]
    fn test_natural_is_first_seen_order() {
        let cache = month_cache();
        let ctx = RefreshContext::new(&cache);
        let mut items = vec![2, 0, 1];
        order_value_ids(&ctx, &axis(ItemSort::Natural), &mut items);
        // Mar, Jan, Feb - the order they appeared in the source.
        assert_eq!(items, vec![0, 1, 2]);
    }

    #[test]
    fn test_ascending_sorts_by_label_value() {
        let cache = month_cache();
        let ctx = RefreshContext::new(&cache);
        let mut items = vec![0, 1, 2];
        order_value_ids(&ctx, &axis(ItemSort::Ascending), &mut items);
        // Feb, Jan, Mar alphabetically.
        assert_eq!(items, vec![2, 1, 0]);
    }

    #[test]
    fn test_descending_reverses_comparison() {
        let cache = month_cache();
        let ctx = RefreshContext::new(&cache);
        let mut items = vec![0, 1, 2];
        order_value_ids(&ctx, &axis(ItemSort::Descending), &mut items);
        assert_eq!(items, vec![0, 1, 2]); // Mar, Jan, Feb
    }

    #[test]
    fn test_numbers_sort_before_text() {
        let cache = SourceCache::from_rows(
            &["Mixed"],
            &[
                vec![CellValue::text("Widget")],
                vec![CellValue::Number(42.0)],
                vec![CellValue::Number(7.0)],
            ],
        );
        let ctx = RefreshContext::new(&cache);
        let mut items = vec![0, 1, 2];
        order_value_ids(&ctx, &axis(ItemSort::Ascending), &mut items);
        assert_eq!(items, vec![2, 1, 0]); // 7, 42, "Widget"
    }

    #[test]
    fn test_order_by_keys_ties_keep_natural_order() {
        let mut keys = FxHashMap::default();
        keys.insert(0u32, 50.0);
        keys.insert(1u32, 10.0);
        keys.insert(2u32, 50.0);

        let mut items = vec![2, 1, 0];
        order_by_keys(&mut items, &keys, false);
        // 10 first; the two 50s keep ascending-id (natural) order.
        assert_eq!(items, vec![1, 0, 2]);

        let mut items = vec![0, 1, 2];
        order_by_keys(&mut items, &keys, true);
        assert_eq!(items, vec![0, 2, 1]);
    }
}
