//! FILENAME: pivot-refresh/src/tree.rs
//! Axis Tree Builder - materializes item hierarchies and flattens them.
//!
//! Each axis becomes a tree: one level per effective field, one node per
//! item that actually occurs under its ancestor path. Sibling order is the
//! field's item sort. The tree is then flattened into `AxisLine`s, which
//! are what the layout renders: row lines include group header lines,
//! subtotal lines placed above or below their children, and the grand
//! total; column lines carry only the value-bearing columns (leaves,
//! subtotal columns, grand total), with header bands reconstructed from
//! path labels.
//!
//! When the data-field dimension lives on an axis and there is more than
//! one data field, the flattened lines are replicated per data field as an
//! extra innermost level.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::aggregate::AggregationEngine;
use crate::cache::{ValueId, VALUE_ID_EMPTY};
use crate::context::{AxisField, RefreshContext};
use crate::definition::{DataField, Function, ItemSort};
use crate::sort;

// ============================================================================
// TREE
// ============================================================================

#[derive(Debug)]
pub(crate) struct AxisNode {
    pub value_id: ValueId,
    pub children: Vec<usize>,
}

/// Arena-allocated item tree for one axis. `nodes[0]` is the synthetic
/// root; its children are the outermost field's items in display order.
#[derive(Debug)]
pub(crate) struct AxisTree {
    nodes: Vec<AxisNode>,
}

impl AxisTree {
    pub fn root(&self) -> &AxisNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> &AxisNode {
        &self.nodes[index]
    }
}

/// Builds the item tree for one axis from the live records, sorting
/// siblings at every node. `is_row` picks which side of the aggregate map
/// data-driven sorts read from.
pub(crate) fn build_axis_tree(
    ctx: &RefreshContext<'_>,
    axis: &[AxisField],
    engine: &AggregationEngine,
    data_fields: &[DataField],
    is_row: bool,
) -> AxisTree {
    let mut nodes = vec![AxisNode {
        value_id: VALUE_ID_EMPTY,
        children: Vec::new(),
    }];

    let root_records: Vec<usize> = ctx.live_records().collect();
    let mut work: Vec<(usize, usize, SmallVec<[ValueId; 8]>, Vec<usize>)> =
        vec![(0, 0, SmallVec::new(), root_records)];

    while let Some((node_idx, level, path, records)) = work.pop() {
        if level >= axis.len() {
            continue;
        }
        let field = &axis[level];

        // Partition the node's records by item, first-seen order.
        let mut groups: FxHashMap<ValueId, Vec<usize>> = FxHashMap::default();
        let mut items: Vec<ValueId> = Vec::new();
        for &record_idx in &records {
            let id = ctx.value_at(record_idx, field.field_index);
            groups
                .entry(id)
                .or_insert_with(|| {
                    items.push(id);
                    Vec::new()
                })
                .push(record_idx);
        }

        match field.sort {
            ItemSort::ByDataField {
                data_field,
                descending,
            } if data_field < data_fields.len() => {
                // Key each item by its own aggregate under the ancestor
                // path, rolled up across the other axis.
                let function = data_fields[data_field].function;
                let mut keys: FxHashMap<ValueId, f64> = FxHashMap::default();
                for &id in &items {
                    let mut prefix = path.clone();
                    prefix.push(id);
                    let value = if is_row {
                        engine.value(&prefix, &[], data_field, function)
                    } else {
                        engine.value(&[], &prefix, data_field, function)
                    };
                    keys.insert(id, value.unwrap_or(0.0));
                }
                sort::order_by_keys(&mut items, &keys, descending);
            }
            _ => sort::order_value_ids(ctx, field, &mut items),
        }

        for id in items {
            let child_idx = nodes.len();
            nodes.push(AxisNode {
                value_id: id,
                children: Vec::new(),
            });
            nodes[node_idx].children.push(child_idx);

            let mut child_path = path.clone();
            child_path.push(id);
            let child_records = groups.remove(&id).unwrap_or_default();
            work.push((child_idx, level + 1, child_path, child_records));
        }
    }

    AxisTree { nodes }
}

// ============================================================================
// FLATTENED LINES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LineKind {
    /// An item line. Lines with children carry labels only; leaves carry
    /// values.
    Item { has_children: bool },
    /// A group subtotal computed with this function, overriding the data
    /// field's own function.
    Subtotal(Function),
    /// The axis grand total.
    GrandTotal,
}

/// One flattened row or column of the pivot body.
#[derive(Debug, Clone)]
pub(crate) struct AxisLine {
    pub kind: LineKind,
    pub label: String,
    /// Field depth of this line (indent for rows, header band for columns).
    pub level: usize,
    /// Item-id prefix for aggregate lookups. Unpadded: subtotals and the
    /// grand total simply have shorter paths.
    pub path: SmallVec<[ValueId; 8]>,
    /// Display labels along `path`, used to rebuild column header bands.
    pub path_labels: Vec<String>,
    /// Which data field this line renders, when the data dimension lives
    /// on this axis.
    pub data_field: Option<usize>,
}

impl AxisLine {
    /// True when this line holds aggregate values (anything but a group
    /// header line).
    pub fn carries_values(&self) -> bool {
        !matches!(self.kind, LineKind::Item { has_children: true })
    }
}

// ============================================================================
// ROW FLATTENING
// ============================================================================

/// Flattens the row tree into display order: item lines with their
/// children, subtotals above or below per field configuration, and the
/// grand total last.
pub(crate) fn row_lines(
    ctx: &RefreshContext<'_>,
    axis: &[AxisField],
    tree: &AxisTree,
    df_names: &[String],
    data_on_rows: bool,
    grand_totals: bool,
) -> Vec<AxisLine> {
    let mut out = Vec::new();

    if axis.is_empty() {
        if data_on_rows && !df_names.is_empty() {
            for (i, name) in df_names.iter().enumerate() {
                out.push(AxisLine {
                    kind: LineKind::Item {
                        has_children: false,
                    },
                    label: name.clone(),
                    level: 0,
                    path: SmallVec::new(),
                    path_labels: Vec::new(),
                    data_field: Some(i),
                });
            }
        } else {
            out.push(AxisLine {
                kind: LineKind::GrandTotal,
                label: "Total".to_string(),
                level: 0,
                path: SmallVec::new(),
                path_labels: Vec::new(),
                data_field: None,
            });
        }
        return out;
    }

    let replicate = data_on_rows && df_names.len() > 1;
    let mut path = SmallVec::new();
    let mut labels = Vec::new();
    for &child in &tree.root().children {
        emit_row_subtree(
            ctx, axis, tree, child, 0, &mut path, &mut labels, df_names, replicate, data_on_rows,
            &mut out,
        );
    }

    if grand_totals {
        if replicate {
            for (i, name) in df_names.iter().enumerate() {
                out.push(AxisLine {
                    kind: LineKind::GrandTotal,
                    label: format!("Total {}", name),
                    level: 0,
                    path: SmallVec::new(),
                    path_labels: Vec::new(),
                    data_field: Some(i),
                });
            }
        } else {
            out.push(AxisLine {
                kind: LineKind::GrandTotal,
                label: "Grand Total".to_string(),
                level: 0,
                path: SmallVec::new(),
                path_labels: Vec::new(),
                data_field: if data_on_rows { Some(0) } else { None },
            });
        }
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn emit_row_subtree(
    ctx: &RefreshContext<'_>,
    axis: &[AxisField],
    tree: &AxisTree,
    node_idx: usize,
    level: usize,
    path: &mut SmallVec<[ValueId; 8]>,
    labels: &mut Vec<String>,
    df_names: &[String],
    replicate: bool,
    data_on_rows: bool,
    out: &mut Vec<AxisLine>,
) {
    let node = tree.node(node_idx);
    let field = &axis[level];
    let label = ctx
        .field(field.field_index)
        .map(|f| f.label(node.value_id))
        .unwrap_or_default();

    path.push(node.value_id);
    labels.push(label.clone());

    let structural = !node.children.is_empty();
    let leaf_expands = !structural && replicate;
    out.push(AxisLine {
        kind: LineKind::Item {
            has_children: structural || leaf_expands,
        },
        label: label.clone(),
        level,
        path: path.clone(),
        path_labels: labels.clone(),
        data_field: if structural || leaf_expands {
            None
        } else if data_on_rows {
            Some(0)
        } else {
            None
        },
    });

    if structural {
        if field.subtotal_top {
            push_row_subtotals(field, &label, level, path, labels, df_names, replicate, data_on_rows, out);
        }
        let children = node.children.clone();
        for child in children {
            emit_row_subtree(
                ctx, axis, tree, child, level + 1, path, labels, df_names, replicate,
                data_on_rows, out,
            );
        }
        if !field.subtotal_top {
            push_row_subtotals(field, &label, level, path, labels, df_names, replicate, data_on_rows, out);
        }
    } else if leaf_expands {
        for (i, name) in df_names.iter().enumerate() {
            out.push(AxisLine {
                kind: LineKind::Item {
                    has_children: false,
                },
                label: name.clone(),
                level: level + 1,
                path: path.clone(),
                path_labels: labels.clone(),
                data_field: Some(i),
            });
        }
    }

    path.pop();
    labels.pop();
}

#[allow(clippy::too_many_arguments)]
fn push_row_subtotals(
    field: &AxisField,
    item_label: &str,
    level: usize,
    path: &SmallVec<[ValueId; 8]>,
    labels: &[String],
    df_names: &[String],
    replicate: bool,
    data_on_rows: bool,
    out: &mut Vec<AxisLine>,
) {
    for &function in &field.subtotal_functions {
        let base = if field.default_subtotal {
            format!("{} Total", item_label)
        } else {
            format!("{} {}", item_label, function.name())
        };
        if replicate {
            for (i, name) in df_names.iter().enumerate() {
                let label = if field.default_subtotal {
                    format!("{} {}", item_label, name)
                } else {
                    format!("{} {} {}", item_label, function.name(), name)
                };
                out.push(AxisLine {
                    kind: LineKind::Subtotal(function),
                    label,
                    level,
                    path: path.clone(),
                    path_labels: labels.to_vec(),
                    data_field: Some(i),
                });
            }
        } else {
            out.push(AxisLine {
                kind: LineKind::Subtotal(function),
                label: base,
                level,
                path: path.clone(),
                path_labels: labels.to_vec(),
                data_field: if data_on_rows { Some(0) } else { None },
            });
        }
    }
}

// ============================================================================
// COLUMN FLATTENING
// ============================================================================

/// Flattens the column tree into the value-bearing columns, in display
/// order. Group header cells are not columns; the layout reconstructs the
/// header bands from each leaf's path labels.
pub(crate) fn column_lines(
    ctx: &RefreshContext<'_>,
    axis: &[AxisField],
    tree: &AxisTree,
    df_names: &[String],
    data_on_columns: bool,
    grand_totals: bool,
) -> Vec<AxisLine> {
    let mut out = Vec::new();

    if axis.is_empty() {
        if data_on_columns && !df_names.is_empty() {
            for (i, name) in df_names.iter().enumerate() {
                out.push(AxisLine {
                    kind: LineKind::Item {
                        has_children: false,
                    },
                    label: name.clone(),
                    level: 0,
                    path: SmallVec::new(),
                    path_labels: Vec::new(),
                    data_field: Some(i),
                });
            }
        } else {
            out.push(AxisLine {
                kind: LineKind::GrandTotal,
                label: "Total".to_string(),
                level: 0,
                path: SmallVec::new(),
                path_labels: Vec::new(),
                data_field: None,
            });
        }
        return out;
    }

    let replicate = data_on_columns && df_names.len() > 1;
    let mut path = SmallVec::new();
    let mut labels = Vec::new();
    for &child in &tree.root().children {
        emit_column_subtree(
            ctx,
            axis,
            tree,
            child,
            0,
            &mut path,
            &mut labels,
            df_names,
            replicate,
            data_on_columns,
            &mut out,
        );
    }

    if grand_totals {
        if replicate {
            for (i, name) in df_names.iter().enumerate() {
                out.push(AxisLine {
                    kind: LineKind::GrandTotal,
                    label: format!("Total {}", name),
                    level: 0,
                    path: SmallVec::new(),
                    path_labels: Vec::new(),
                    data_field: Some(i),
                });
            }
        } else {
            out.push(AxisLine {
                kind: LineKind::GrandTotal,
                label: "Grand Total".to_string(),
                level: 0,
                path: SmallVec::new(),
                path_labels: Vec::new(),
                data_field: if data_on_columns { Some(0) } else { None },
            });
        }
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn emit_column_subtree(
    ctx: &RefreshContext<'_>,
    axis: &[AxisField],
    tree: &AxisTree,
    node_idx: usize,
    level: usize,
    path: &mut SmallVec<[ValueId; 8]>,
    labels: &mut Vec<String>,
    df_names: &[String],
    replicate: bool,
    data_on_columns: bool,
    out: &mut Vec<AxisLine>,
) {
    let node = tree.node(node_idx);
    let field = &axis[level];
    let label = ctx
        .field(field.field_index)
        .map(|f| f.label(node.value_id))
        .unwrap_or_default();

    path.push(node.value_id);
    labels.push(label.clone());

    if node.children.is_empty() {
        push_column_leaf(&label, level, path, labels, df_names, replicate, data_on_columns, out);
    } else {
        if field.subtotal_top {
            push_column_subtotals(
                field, &label, level, path, labels, df_names, replicate, data_on_columns, out,
            );
        }
        let children = node.children.clone();
        for child in children {
            emit_column_subtree(
                ctx,
                axis,
                tree,
                child,
                level + 1,
                path,
                labels,
                df_names,
                replicate,
                data_on_columns,
                out,
            );
        }
        if !field.subtotal_top {
            push_column_subtotals(
                field, &label, level, path, labels, df_names, replicate, data_on_columns, out,
            );
        }
    }

    path.pop();
    labels.pop();
}

#[allow(clippy::too_many_arguments)]
fn push_column_leaf(
    label: &str,
    level: usize,
    path: &SmallVec<[ValueId; 8]>,
    labels: &[String],
    df_names: &[String],
    replicate: bool,
    data_on_columns: bool,
    out: &mut Vec<AxisLine>,
) {
    if replicate {
        for (i, _) in df_names.iter().enumerate() {
            out.push(AxisLine {
                kind: LineKind::Item {
                    has_children: false,
                },
                label: label.to_string(),
                level,
                path: path.clone(),
                path_labels: labels.to_vec(),
                data_field: Some(i),
            });
        }
    } else {
        out.push(AxisLine {
            kind: LineKind::Item {
                has_children: false,
            },
            label: label.to_string(),
            level,
            path: path.clone(),
            path_labels: labels.to_vec(),
            data_field: if data_on_columns { Some(0) } else { None },
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn push_column_subtotals(
    field: &AxisField,
    item_label: &str,
    level: usize,
    path: &SmallVec<[ValueId; 8]>,
    labels: &[String],
    df_names: &[String],
    replicate: bool,
    data_on_columns: bool,
    out: &mut Vec<AxisLine>,
) {
    for &function in &field.subtotal_functions {
        let base = if field.default_subtotal {
            format!("{} Total", item_label)
        } else {
            format!("{} {}", item_label, function.name())
        };
        if replicate {
            for (i, name) in df_names.iter().enumerate() {
                let label = if field.default_subtotal {
                    format!("{} {}", item_label, name)
                } else {
                    format!("{} {} {}", item_label, function.name(), name)
                };
                out.push(AxisLine {
                    kind: LineKind::Subtotal(function),
                    label,
                    level,
                    path: path.clone(),
                    path_labels: labels.to_vec(),
                    data_field: Some(i),
                });
            }
        } else {
            out.push(AxisLine {
                kind: LineKind::Subtotal(function),
                label: base,
                level,
                path: path.clone(),
                path_labels: labels.to_vec(),
                data_field: if data_on_columns { Some(0) } else { None },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{null_evaluator, resolve_data_values, AggregationEngine};
    use crate::cache::SourceCache;
    use crate::definition::PivotField;
    use sheet_model::CellValue;

    fn month_product_cache() -> SourceCache {
        SourceCache::from_rows(
            &["Month", "Product", "Total"],
            &[
                vec![
                    CellValue::text("Jan"),
                    CellValue::text("CarRack"),
                    CellValue::Number(415.75),
                ],
                vec![
                    CellValue::text("Jan"),
                    CellValue::text("CarRack"),
                    CellValue::Number(415.75),
                ],
                vec![
                    CellValue::text("Mar"),
                    CellValue::text("SpeedBike"),
                    CellValue::Number(24.99),
                ],
            ],
        )
    }

    fn axis_from(field: &PivotField) -> AxisField {
        AxisField {
            field_index: field.source_index,
            name: field.name.clone(),
            sort: field.sort,
            subtotal_top: field.subtotal_top,
            subtotal_functions: field.ordered_subtotal_functions(),
            default_subtotal: field.has_default_subtotal(),
            hidden: Vec::new(),
            grouped: false,
        }
    }

    fn lines_for(
        cache: &SourceCache,
        month: PivotField,
        grand: bool,
    ) -> Vec<AxisLine> {
        let ctx = RefreshContext::new(cache);
        let axis = vec![axis_from(&month), axis_from(&PivotField::new(1, "Product"))];
        let data = vec![DataField::new(2, Function::Sum)];
        let values = resolve_data_values(&ctx, &data, &null_evaluator());
        let engine = AggregationEngine::build(&ctx, &axis, &[], &values);
        let tree = build_axis_tree(&ctx, &axis, &engine, &data, true);
        row_lines(&ctx, &axis, &tree, &["Sum of Total".to_string()], false, grand)
    }

    #[test]
    fn test_subtotal_below_children_by_default() {
        let cache = month_product_cache();
        let lines = lines_for(&cache, PivotField::new(0, "Month"), true);
        let labels: Vec<&str> = lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Jan",
                "CarRack",
                "Jan Total",
                "Mar",
                "SpeedBike",
                "Mar Total",
                "Grand Total"
            ]
        );
        assert!(matches!(lines[2].kind, LineKind::Subtotal(Function::Sum)));
        assert_eq!(lines[2].path.as_slice(), &[0]);
        assert!(matches!(lines[6].kind, LineKind::GrandTotal));
        assert!(lines[6].path.is_empty());
    }

    #[test]
    fn test_subtotal_top_moves_placement_only() {
        let cache = month_product_cache();
        let mut month = PivotField::new(0, "Month");
        month.subtotal_top = true;
        let lines = lines_for(&cache, month, false);
        let labels: Vec<&str> = lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Jan", "Jan Total", "CarRack", "Mar", "Mar Total", "SpeedBike"]
        );
    }

    #[test]
    fn test_multiple_subtotal_functions_emit_in_display_order() {
        let cache = month_product_cache();
        let mut month = PivotField::new(0, "Month");
        month.subtotal_functions = vec![Function::Product, Function::Sum, Function::Count];
        let lines = lines_for(&cache, month, false);
        let labels: Vec<&str> = lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Jan",
                "CarRack",
                "Jan Sum",
                "Jan Count",
                "Jan Product",
                "Mar",
                "SpeedBike",
                "Mar Sum",
                "Mar Count",
                "Mar Product"
            ]
        );
    }

    #[test]
    fn test_innermost_field_never_subtotals() {
        let cache = month_product_cache();
        let lines = lines_for(&cache, PivotField::new(0, "Month"), false);
        // Product is innermost; no "CarRack Total" appears.
        assert!(lines.iter().all(|l| l.label != "CarRack Total"));
    }

    #[test]
    fn test_column_lines_are_leaves_and_totals_only() {
        let cache = month_product_cache();
        let ctx = RefreshContext::new(&cache);
        let axis = vec![axis_from(&PivotField::new(0, "Month"))];
        let data = vec![DataField::new(2, Function::Sum)];
        let values = resolve_data_values(&ctx, &data, &null_evaluator());
        let engine = AggregationEngine::build(&ctx, &[], &axis, &values);
        let tree = build_axis_tree(&ctx, &axis, &engine, &data, false);
        let lines = column_lines(
            &ctx,
            &axis,
            &tree,
            &["Sum of Total".to_string()],
            true,
            true,
        );

        let labels: Vec<&str> = lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["Jan", "Mar", "Grand Total"]);
        assert_eq!(lines[0].data_field, Some(0));
        assert_eq!(lines[0].path_labels, vec!["Jan".to_string()]);
    }

    #[test]
    fn test_data_dimension_replicates_leaf_rows() {
        let cache = month_product_cache();
        let ctx = RefreshContext::new(&cache);
        let axis = vec![axis_from(&PivotField::new(0, "Month"))];
        let data = vec![
            DataField::new(2, Function::Sum),
            DataField::new(2, Function::Count),
        ];
        let values = resolve_data_values(&ctx, &data, &null_evaluator());
        let engine = AggregationEngine::build(&ctx, &axis, &[], &values);
        let tree = build_axis_tree(&ctx, &axis, &engine, &data, true);
        let df_names = vec!["Sum of Total".to_string(), "Count of Total".to_string()];
        let lines = row_lines(&ctx, &axis, &tree, &df_names, true, true);

        let labels: Vec<&str> = lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Jan",
                "Sum of Total",
                "Count of Total",
                "Mar",
                "Sum of Total",
                "Count of Total",
                "Total Sum of Total",
                "Total Count of Total"
            ]
        );
        assert_eq!(lines[1].data_field, Some(0));
        assert_eq!(lines[2].data_field, Some(1));
        assert_eq!(lines[1].path.as_slice(), &[0]);
    }

    #[test]
    fn test_by_data_field_sort_orders_items_by_aggregate() {
        let cache = month_product_cache();
        let ctx = RefreshContext::new(&cache);
        let mut month = PivotField::new(0, "Month");
        month.sort = ItemSort::ByDataField {
            data_field: 0,
            descending: false,
        };
        let axis = vec![axis_from(&month)];
        let data = vec![DataField::new(2, Function::Sum)];
        let values = resolve_data_values(&ctx, &data, &null_evaluator());
        let engine = AggregationEngine::build(&ctx, &axis, &[], &values);
        let tree = build_axis_tree(&ctx, &axis, &engine, &data, true);

        // Mar (24.99) sorts before Jan (831.5).
        let items: Vec<ValueId> = tree
            .root()
            .children
            .iter()
            .map(|&i| tree.node(i).value_id)
            .collect();
        assert_eq!(items, vec![1, 0]);
    }
}
