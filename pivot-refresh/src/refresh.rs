//! FILENAME: pivot-refresh/src/refresh.rs
//! Refresh pipeline - from definition plus cache to a rendered layout.
//!
//! A refresh is a pure function of (definition, cache, evaluator): it
//! validates the configuration, expands grouped fields, applies page and
//! visibility filters, aggregates once, builds both axis trees, and
//! renders the grid. `PivotTable` wraps that pipeline with the state a
//! host sheet keeps per pivot: the definition, the shared cache, and the
//! artifacts of the last successful refresh. A failed refresh leaves the
//! previous layout untouched.

use std::sync::Arc;

use smallvec::SmallVec;
use sheet_model::{CellCoord, CellValue};

use crate::aggregate::{resolve_data_values, AggregationEngine, FormulaEvaluator};
use crate::cache::{CacheValue, FieldKind, SourceCache, ValueId};
use crate::context::{RefreshContext, RefreshStats};
use crate::definition::{DataPlacement, ItemSort, PivotDefinition};
use crate::error::ConfigError;
use crate::layout::{self, CellWriter, LayoutGeometry, LayoutInputs, PivotTableLayout};
use crate::tree::{self, AxisLine};
use crate::{filter, grouping};

// ============================================================================
// VALIDATION
// ============================================================================

/// Checks a definition against a cache. Everything here is a rejected
/// configuration: nothing downstream of a passing validation raises.
pub fn validate(definition: &PivotDefinition, cache: &SourceCache) -> Result<(), ConfigError> {
    let count = cache.field_count();
    let data_count = definition.data_fields.len();

    for field in definition
        .row_fields
        .iter()
        .chain(definition.column_fields.iter())
    {
        let fc = cache
            .field(field.source_index)
            .ok_or(ConfigError::FieldOutOfRange {
                index: field.source_index,
                count,
            })?;
        if matches!(fc.kind, FieldKind::Calculated { .. }) {
            return Err(ConfigError::CalculatedFieldOnAxis {
                field: field.name.clone(),
            });
        }
        if let FieldKind::NumericGroup { size } = fc.kind {
            if !size.is_finite() || size <= 0.0 {
                return Err(ConfigError::InvalidBucketSize {
                    field: field.name.clone(),
                    size,
                });
            }
        }
        if let ItemSort::ByDataField { data_field, .. } = field.sort {
            if data_field >= data_count {
                return Err(ConfigError::SortDataFieldOutOfRange {
                    field: field.name.clone(),
                    index: data_field,
                    count: data_count,
                });
            }
        }
    }

    for page in &definition.page_fields {
        let fc = cache
            .field(page.source_index)
            .ok_or(ConfigError::FieldOutOfRange {
                index: page.source_index,
                count,
            })?;
        if matches!(fc.kind, FieldKind::Calculated { .. }) {
            return Err(ConfigError::CalculatedFieldOnAxis {
                field: page.name.clone(),
            });
        }
        let items = fc.unique_count();
        match &page.selection {
            crate::definition::PageSelection::All => {}
            crate::definition::PageSelection::Item(item) => {
                if *item >= items {
                    return Err(ConfigError::PageItemOutOfRange {
                        field: page.name.clone(),
                        index: *item,
                        count: items,
                    });
                }
            }
            crate::definition::PageSelection::Multi { hidden } => {
                for &item in hidden {
                    if item >= items {
                        return Err(ConfigError::PageItemOutOfRange {
                            field: page.name.clone(),
                            index: item,
                            count: items,
                        });
                    }
                }
            }
        }
    }

    for df in &definition.data_fields {
        if df.source_index >= count {
            return Err(ConfigError::FieldOutOfRange {
                index: df.source_index,
                count,
            });
        }
    }

    Ok(())
}

// ============================================================================
// PIPELINE
// ============================================================================

/// One live record's axis coordinates, kept for drill-down.
struct DrillRecord {
    record_idx: usize,
    row_path: SmallVec<[ValueId; 8]>,
    col_path: SmallVec<[ValueId; 8]>,
}

struct RefreshArtifacts {
    layout: PivotTableLayout,
    stats: RefreshStats,
    row_lines: Vec<AxisLine>,
    column_lines: Vec<AxisLine>,
    geometry: LayoutGeometry,
    drill: Vec<DrillRecord>,
}

fn run_refresh(
    definition: &PivotDefinition,
    cache: &SourceCache,
    evaluator: &dyn FormulaEvaluator,
) -> Result<RefreshArtifacts, ConfigError> {
    validate(definition, cache)?;

    let mut ctx = RefreshContext::new(cache);
    let row_axis = grouping::expand_axis_fields(&mut ctx, &definition.row_fields);
    let column_axis = grouping::expand_axis_fields(&mut ctx, &definition.column_fields);
    filter::apply_page_filters(&mut ctx, &definition.page_fields);
    filter::apply_axis_visibility(&mut ctx, &row_axis, &column_axis);

    let data_values = resolve_data_values(&ctx, &definition.data_fields, evaluator);
    let engine = AggregationEngine::build(&ctx, &row_axis, &column_axis, &data_values);
    let df_names = layout::data_field_names(&ctx, &definition.data_fields);
    let data_on_columns = definition.data_placement == DataPlacement::Columns;

    let row_tree = tree::build_axis_tree(&ctx, &row_axis, &engine, &definition.data_fields, true);
    let column_tree =
        tree::build_axis_tree(&ctx, &column_axis, &engine, &definition.data_fields, false);
    let row_lines = tree::row_lines(
        &ctx,
        &row_axis,
        &row_tree,
        &df_names,
        !data_on_columns,
        definition.row_grand_totals,
    );
    let column_lines = tree::column_lines(
        &ctx,
        &column_axis,
        &column_tree,
        &df_names,
        data_on_columns,
        definition.column_grand_totals,
    );

    let inputs = LayoutInputs {
        ctx: &ctx,
        engine: &engine,
        row_axis: &row_axis,
        column_axis: &column_axis,
        row_lines: &row_lines,
        column_lines: &column_lines,
        page_fields: &definition.page_fields,
        data_fields: &definition.data_fields,
        df_names: &df_names,
        data_placement: definition.data_placement,
        origin: definition.origin,
    };
    let geometry = layout::compute_geometry(&inputs);
    let layout = layout::build_layout(&inputs);

    let mut drill = Vec::with_capacity(ctx.stats.records_live);
    for record_idx in ctx.live_records() {
        let mut row_path = SmallVec::new();
        for f in &row_axis {
            row_path.push(ctx.value_at(record_idx, f.field_index));
        }
        let mut col_path = SmallVec::new();
        for f in &column_axis {
            col_path.push(ctx.value_at(record_idx, f.field_index));
        }
        drill.push(DrillRecord {
            record_idx,
            row_path,
            col_path,
        });
    }

    Ok(RefreshArtifacts {
        layout,
        stats: ctx.stats.clone(),
        row_lines,
        column_lines,
        geometry,
        drill,
    })
}

/// Refreshes a definition against a cache in one call, without the
/// `PivotTable` wrapper.
pub fn refresh_pivot(
    definition: &PivotDefinition,
    cache: &SourceCache,
    evaluator: &dyn FormulaEvaluator,
) -> Result<(PivotTableLayout, RefreshStats), ConfigError> {
    let artifacts = run_refresh(definition, cache, evaluator)?;
    Ok((artifacts.layout, artifacts.stats))
}

// ============================================================================
// PIVOT TABLE
// ============================================================================

/// The records behind one data cell, materialized for drill-down.
#[derive(Debug, Clone)]
pub struct DrillDownResult {
    /// Cache field names, one per output column.
    pub field_names: Vec<String>,
    /// Original 0-based source rows of the matching records.
    pub source_rows: Vec<u32>,
    /// The matching records' values, one row per record. Calculated
    /// fields come back empty: their values exist only during a refresh.
    pub rows: Vec<Vec<CellValue>>,
}

/// A pivot table as the host sheet holds it: definition, shared cache,
/// and the last successful refresh.
pub struct PivotTable {
    definition: PivotDefinition,
    cache: Arc<SourceCache>,
    artifacts: Option<RefreshArtifacts>,
}

impl PivotTable {
    pub fn new(definition: PivotDefinition, cache: Arc<SourceCache>) -> Self {
        PivotTable {
            definition,
            cache,
            artifacts: None,
        }
    }

    pub fn definition(&self) -> &PivotDefinition {
        &self.definition
    }

    /// Mutable access for reconfiguring; takes effect on the next refresh.
    pub fn definition_mut(&mut self) -> &mut PivotDefinition {
        &mut self.definition
    }

    pub fn cache(&self) -> &Arc<SourceCache> {
        &self.cache
    }

    /// Swaps in a rebuilt cache. The current layout stays visible until
    /// the next refresh.
    pub fn set_cache(&mut self, cache: Arc<SourceCache>) {
        self.cache = cache;
    }

    /// Runs the pipeline and replaces the layout. On error the previous
    /// layout and stats are kept.
    pub fn refresh(
        &mut self,
        evaluator: &dyn FormulaEvaluator,
    ) -> Result<&PivotTableLayout, ConfigError> {
        let artifacts = run_refresh(&self.definition, &self.cache, evaluator)?;
        Ok(&self.artifacts.insert(artifacts).layout)
    }

    /// The last successful refresh's layout, if any.
    pub fn layout(&self) -> Option<&PivotTableLayout> {
        self.artifacts.as_ref().map(|a| &a.layout)
    }

    pub fn stats(&self) -> Option<&RefreshStats> {
        self.artifacts.as_ref().map(|a| &a.stats)
    }

    /// Writes the current layout to the host sheet. Returns false when the
    /// table has never been refreshed.
    pub fn write_to(&self, writer: &mut dyn CellWriter) -> bool {
        match self.layout() {
            Some(layout) => {
                layout.write_to(writer);
                true
            }
            None => false,
        }
    }

    /// The records behind the value cell at an absolute sheet coordinate.
    /// Returns `None` outside the value area or before the first refresh.
    pub fn drill_down(&self, coord: CellCoord) -> Option<DrillDownResult> {
        let artifacts = self.artifacts.as_ref()?;
        let (origin_row, origin_col) = artifacts.layout.origin;
        let r = (coord.0.checked_sub(origin_row)?) as usize;
        let c = (coord.1.checked_sub(origin_col)?) as usize;

        let body_start = artifacts.geometry.body_start();
        let band = artifacts.geometry.row_band_width;
        if r < body_start || c < band {
            return None;
        }
        let row_line = artifacts.row_lines.get(r - body_start)?;
        let col_line = artifacts.column_lines.get(c - band)?;
        if !row_line.carries_values() {
            return None;
        }

        let field_names: Vec<String> = self.cache.fields.iter().map(|f| f.name.clone()).collect();
        let mut source_rows = Vec::new();
        let mut rows = Vec::new();
        for record in &artifacts.drill {
            if !record.row_path.starts_with(&row_line.path)
                || !record.col_path.starts_with(&col_line.path)
            {
                continue;
            }
            let cache_record = &self.cache.records[record.record_idx];
            source_rows.push(cache_record.source_row);
            rows.push(
                self.cache
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, field)| {
                        cache_record
                            .values
                            .get(i)
                            .and_then(|&id| field.get_value(id))
                            .map(cache_value_to_cell)
                            .unwrap_or(CellValue::Empty)
                    })
                    .collect(),
            );
        }

        Some(DrillDownResult {
            field_names,
            source_rows,
            rows,
        })
    }
}

fn cache_value_to_cell(value: &CacheValue) -> CellValue {
    match value {
        CacheValue::Empty => CellValue::Empty,
        CacheValue::Number(n) => CellValue::Number(n.as_f64()),
        CacheValue::Text(s) => CellValue::Text(s.clone()),
        CacheValue::Boolean(b) => CellValue::Boolean(*b),
        CacheValue::Error(e) => CellValue::Text(format!("#{}", e)),
    }
}
