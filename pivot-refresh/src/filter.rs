//! FILENAME: pivot-refresh/src/filter.rs
//! Page Filter - restricts which cache records participate in a refresh.
//!
//! Page fields never appear on an axis; they only narrow the record set.
//! Axis-level visibility (hidden items, grouped-field exclusions) is folded
//! into the same live mask so that subtotals and grand totals always
//! aggregate exactly the visible records.

use rustc_hash::FxHashSet;

use crate::cache::{ValueId, VALUE_ID_EMPTY};
use crate::context::{AxisField, RefreshContext};
use crate::definition::{PageField, PageSelection};

/// Applies every page field's selection to the live mask.
pub(crate) fn apply_page_filters(ctx: &mut RefreshContext<'_>, page_fields: &[PageField]) {
    for page in page_fields {
        match &page.selection {
            PageSelection::All => {}
            PageSelection::Item(item) => {
                let wanted = *item as ValueId;
                for record_idx in 0..ctx.live.len() {
                    if ctx.live[record_idx]
                        && ctx.value_at(record_idx, page.source_index) != wanted
                    {
                        ctx.live[record_idx] = false;
                    }
                }
            }
            PageSelection::Multi { hidden } => {
                // Blanks are never shared items, so they always pass a
                // multi-select.
                let hidden: FxHashSet<ValueId> =
                    hidden.iter().map(|&i| i as ValueId).collect();
                for record_idx in 0..ctx.live.len() {
                    if ctx.live[record_idx]
                        && hidden.contains(&ctx.value_at(record_idx, page.source_index))
                    {
                        ctx.live[record_idx] = false;
                    }
                }
            }
        }
    }
    ctx.stats.records_live = ctx.live.iter().filter(|&&ok| ok).count();
}

/// Removes records that are invisible on an axis: their item is hidden on
/// some axis field, or the field is grouping-derived and the record could
/// not be grouped (empty id).
pub(crate) fn apply_axis_visibility(
    ctx: &mut RefreshContext<'_>,
    row_axis: &[AxisField],
    column_axis: &[AxisField],
) {
    for field in row_axis.iter().chain(column_axis.iter()) {
        if field.hidden.is_empty() && !field.grouped {
            continue;
        }
        let hidden: FxHashSet<ValueId> = field.hidden.iter().copied().collect();
        for record_idx in 0..ctx.live.len() {
            if !ctx.live[record_idx] {
                continue;
            }
            let id = ctx.value_at(record_idx, field.field_index);
            if hidden.contains(&id) || (field.grouped && id == VALUE_ID_EMPTY) {
                ctx.live[record_idx] = false;
            }
        }
    }
    ctx.stats.records_live = ctx.live.iter().filter(|&&ok| ok).count();
}
