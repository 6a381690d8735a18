//! FILENAME: pivot-refresh/src/layout.rs
//! Layout Mapper - renders flattened axis lines into a cell grid.
//!
//! The grid mirrors the classic spreadsheet pivot layout:
//!
//! ```text
//! Region        East            <- page area (one row per page field)
//!
//! Sum of Total  Column Labels   <- caption row (only with column fields)
//! Row Labels    Jan    Mar  Grand Total
//! CarRack       831.5       831.5
//! SpeedBike            24.99 24.99
//! Grand Total   831.5  24.99 856.49
//! ```
//!
//! Column header bands are rebuilt from each value column's path labels;
//! a label is written only where its group starts, so spanned groups read
//! like merged cells. The layout itself is plain data: rendering to a
//! sheet goes through the `CellWriter` seam.

use serde::{Deserialize, Serialize};
use sheet_model::{CellCoord, CellValue};

use crate::context::{AxisField, RefreshContext};
use crate::definition::{DataField, DataPlacement, PageField, PageSelection};
use crate::tree::{AxisLine, LineKind};
use crate::aggregate::AggregationEngine;

// ============================================================================
// CELLS AND GRID
// ============================================================================

/// One rendered cell of the pivot output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum LayoutCell {
    #[default]
    Empty,
    Label(String),
    Number(f64),
}

impl LayoutCell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LayoutCell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            LayoutCell::Label(s) => Some(s),
            _ => None,
        }
    }

    fn to_cell_value(&self) -> CellValue {
        match self {
            LayoutCell::Empty => CellValue::Empty,
            LayoutCell::Label(s) => CellValue::Text(s.clone()),
            LayoutCell::Number(n) => CellValue::Number(*n),
        }
    }
}

/// Receives rendered cells. The host sheet implements this; tests use an
/// in-memory grid.
pub trait CellWriter {
    fn write_cell(&mut self, coord: CellCoord, value: &CellValue);
}

/// The rendered pivot table: a dense grid anchored at `origin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotTableLayout {
    pub origin: CellCoord,
    /// Row-major cell grid. Every row has the same width.
    pub cells: Vec<Vec<LayoutCell>>,
}

impl PivotTableLayout {
    pub fn height(&self) -> u32 {
        self.cells.len() as u32
    }

    pub fn width(&self) -> u32 {
        self.cells.first().map(|r| r.len()).unwrap_or(0) as u32
    }

    pub fn cell(&self, row: u32, col: u32) -> &LayoutCell {
        static EMPTY: LayoutCell = LayoutCell::Empty;
        self.cells
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
            .unwrap_or(&EMPTY)
    }

    /// The sheet range the layout occupies: (top-left, bottom-right),
    /// inclusive.
    pub fn range(&self) -> (CellCoord, CellCoord) {
        let (row, col) = self.origin;
        let height = self.height().max(1);
        let width = self.width().max(1);
        ((row, col), (row + height - 1, col + width - 1))
    }

    /// Writes every cell, including empties, so a shrunken refresh clears
    /// the cells it no longer covers within its own grid.
    pub fn write_to(&self, writer: &mut dyn CellWriter) {
        let (origin_row, origin_col) = self.origin;
        for (r, row) in self.cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                writer.write_cell(
                    (origin_row + r as u32, origin_col + c as u32),
                    &cell.to_cell_value(),
                );
            }
        }
    }
}

// ============================================================================
// LAYOUT BUILDING
// ============================================================================

pub(crate) struct LayoutInputs<'a> {
    pub ctx: &'a RefreshContext<'a>,
    pub engine: &'a AggregationEngine,
    pub row_axis: &'a [AxisField],
    pub column_axis: &'a [AxisField],
    pub row_lines: &'a [AxisLine],
    pub column_lines: &'a [AxisLine],
    pub page_fields: &'a [PageField],
    pub data_fields: &'a [DataField],
    pub df_names: &'a [String],
    pub data_placement: DataPlacement,
    pub origin: CellCoord,
}

/// Where the bands of the grid sit. Shared with drill-down, which maps a
/// sheet cell back to its axis lines.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LayoutGeometry {
    /// Rows occupied by the page area (including its separator row).
    pub page_rows: usize,
    /// Header rows below the page area; the body starts after them.
    pub header_rows: usize,
    /// Item-band header rows within `header_rows` (one per column field).
    pub item_header_rows: usize,
    /// Leftmost columns holding row labels; the value band starts after.
    pub row_band_width: usize,
    /// Column value lines replicated per data field.
    pub replicate_cols: bool,
}

impl LayoutGeometry {
    pub fn body_start(&self) -> usize {
        self.page_rows + self.header_rows
    }
}

pub(crate) fn compute_geometry(inputs: &LayoutInputs<'_>) -> LayoutGeometry {
    let data_on_columns = inputs.data_placement == DataPlacement::Columns;
    let has_col_fields = !inputs.column_axis.is_empty();
    let replicate_cols = data_on_columns && has_col_fields && inputs.df_names.len() > 1;
    let replicate_rows =
        !data_on_columns && !inputs.row_axis.is_empty() && inputs.df_names.len() > 1;

    let item_header_rows = if has_col_fields {
        inputs.column_axis.len()
    } else {
        0
    };
    LayoutGeometry {
        page_rows: if inputs.page_fields.is_empty() {
            0
        } else {
            inputs.page_fields.len() + 1 // trailing separator row
        },
        header_rows: if has_col_fields {
            1 + item_header_rows + usize::from(replicate_cols)
        } else {
            1
        },
        item_header_rows,
        row_band_width: (inputs.row_axis.len() + usize::from(replicate_rows)).max(1),
        replicate_cols,
    }
}

/// Builds the full cell grid.
pub(crate) fn build_layout(inputs: &LayoutInputs<'_>) -> PivotTableLayout {
    let geometry = compute_geometry(inputs);
    let has_col_fields = !inputs.column_axis.is_empty();
    let replicate_cols = geometry.replicate_cols;
    let row_band_width = geometry.row_band_width;
    let item_header_rows = geometry.item_header_rows;
    let header_rows = geometry.header_rows;
    let page_rows = geometry.page_rows;

    let width = row_band_width + inputs.column_lines.len();
    let height = page_rows + header_rows + inputs.row_lines.len();
    let mut cells = vec![vec![LayoutCell::Empty; width]; height];

    render_page_area(inputs, &mut cells);
    render_headers(
        inputs,
        &mut cells,
        page_rows,
        header_rows,
        item_header_rows,
        replicate_cols,
        row_band_width,
        has_col_fields,
    );
    render_body(
        inputs,
        &mut cells,
        page_rows + header_rows,
        row_band_width,
    );

    PivotTableLayout {
        origin: inputs.origin,
        cells,
    }
}

/// Page area: one row per page field (name, current selection), then a
/// separator row.
fn render_page_area(inputs: &LayoutInputs<'_>, cells: &mut [Vec<LayoutCell>]) {
    for (i, page) in inputs.page_fields.iter().enumerate() {
        cells[i][0] = LayoutCell::Label(page.name.clone());
        let selection = match &page.selection {
            PageSelection::All => "(All)".to_string(),
            PageSelection::Item(item) => inputs
                .ctx
                .field(page.source_index)
                .map(|f| f.label(*item as u32))
                .unwrap_or_default(),
            PageSelection::Multi { .. } => "(Multiple Items)".to_string(),
        };
        if cells[i].len() > 1 {
            cells[i][1] = LayoutCell::Label(selection);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn render_headers(
    inputs: &LayoutInputs<'_>,
    cells: &mut [Vec<LayoutCell>],
    page_rows: usize,
    header_rows: usize,
    item_header_rows: usize,
    replicate_cols: bool,
    row_band_width: usize,
    has_col_fields: bool,
) {
    let first = page_rows;
    let last = page_rows + header_rows - 1;

    if has_col_fields {
        // Caption row: single data field name in the corner, "Column
        // Labels" over the value band.
        if inputs.df_names.len() == 1 {
            cells[first][0] = LayoutCell::Label(inputs.df_names[0].clone());
        } else if !inputs.df_names.is_empty() {
            cells[first][0] = LayoutCell::Label("Values".to_string());
        }
        // With every record filtered away there is no value band to
        // caption, only the header rows themselves.
        if !inputs.column_lines.is_empty() {
            cells[first][row_band_width] = LayoutCell::Label("Column Labels".to_string());
        }

        // Item bands: a label only where its group starts.
        let mut prev: Option<&AxisLine> = None;
        for (j, line) in inputs.column_lines.iter().enumerate() {
            let col = row_band_width + j;
            match line.kind {
                LineKind::Item { .. } => {
                    for k in 0..line.path.len().min(item_header_rows) {
                        let changed = match prev {
                            Some(p) => {
                                p.path.len() <= k
                                    || p.path[..=k] != line.path[..=k]
                                    || !matches!(p.kind, LineKind::Item { .. })
                            }
                            None => true,
                        };
                        if changed {
                            cells[first + 1 + k][col] =
                                LayoutCell::Label(line.path_labels[k].clone());
                        }
                    }
                    if replicate_cols {
                        if let Some(df) = line.data_field {
                            cells[first + 1 + item_header_rows][col] =
                                LayoutCell::Label(inputs.df_names[df].clone());
                        }
                    }
                }
                LineKind::Subtotal(_) => {
                    if replicate_cols {
                        cells[first + 1 + item_header_rows][col] =
                            LayoutCell::Label(line.label.clone());
                    } else {
                        let k = line.level.min(item_header_rows.saturating_sub(1));
                        let changed = match prev {
                            Some(p) => {
                                !matches!(p.kind, LineKind::Subtotal(_))
                                    || p.label != line.label
                            }
                            None => true,
                        };
                        if changed {
                            cells[first + 1 + k][col] = LayoutCell::Label(line.label.clone());
                        }
                    }
                }
                LineKind::GrandTotal => {
                    if replicate_cols {
                        cells[first + 1 + item_header_rows][col] =
                            LayoutCell::Label(line.label.clone());
                    } else {
                        let changed =
                            !matches!(prev.map(|p| p.kind), Some(LineKind::GrandTotal));
                        if changed {
                            cells[first + 1][col] = LayoutCell::Label(line.label.clone());
                        }
                    }
                }
            }
            prev = Some(line);
        }
    } else {
        // Single header row: the value columns are named directly.
        for (j, line) in inputs.column_lines.iter().enumerate() {
            cells[first][row_band_width + j] = LayoutCell::Label(line.label.clone());
        }
    }

    if !inputs.row_axis.is_empty() {
        cells[last][0] = LayoutCell::Label("Row Labels".to_string());
    }
}

fn render_body(
    inputs: &LayoutInputs<'_>,
    cells: &mut [Vec<LayoutCell>],
    body_start: usize,
    row_band_width: usize,
) {
    for (i, row_line) in inputs.row_lines.iter().enumerate() {
        let r = body_start + i;

        let label_col = match row_line.kind {
            LineKind::GrandTotal => 0,
            _ => row_line.level.min(row_band_width - 1),
        };
        cells[r][label_col] = LayoutCell::Label(row_line.label.clone());

        if !row_line.carries_values() {
            continue;
        }

        for (j, col_line) in inputs.column_lines.iter().enumerate() {
            let c = row_band_width + j;
            if let Some(value) = cell_value(inputs, row_line, col_line) {
                cells[r][c] = LayoutCell::Number(value);
            }
        }
    }
}

/// The aggregate for one intersection. Row subtotal functions take
/// precedence over column subtotal functions; plain intersections use the
/// data field's own function. `None` renders blank (no record matched).
fn cell_value(
    inputs: &LayoutInputs<'_>,
    row_line: &AxisLine,
    col_line: &AxisLine,
) -> Option<f64> {
    let df = row_line
        .data_field
        .or(col_line.data_field)
        .unwrap_or(0);
    let data_field = inputs.data_fields.get(df)?;

    let function = match (row_line.kind, col_line.kind) {
        (LineKind::Subtotal(f), _) => f,
        (_, LineKind::Subtotal(f)) => f,
        _ => data_field.function,
    };

    inputs
        .engine
        .value(&row_line.path, &col_line.path, df, function)
}

/// Resolves the generated or overridden display name of every data field.
pub(crate) fn data_field_names(
    ctx: &RefreshContext<'_>,
    data_fields: &[DataField],
) -> Vec<String> {
    data_fields
        .iter()
        .map(|df| {
            let field_name = ctx
                .field(df.source_index)
                .map(|f| f.name.clone())
                .unwrap_or_default();
            df.display_name(&field_name)
        })
        .collect()
}
