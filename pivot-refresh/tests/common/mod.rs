//! FILENAME: tests/common/mod.rs
//! Shared fixtures for the refresh integration tests.

use pivot_refresh::{LayoutCell, PivotTableLayout, SourceCache};
use sheet_model::CellValue;

/// The sales snapshot used throughout: Month, Product, City, Total.
pub fn sales_cache() -> SourceCache {
    SourceCache::from_rows(
        &["Month", "Product", "City", "Total"],
        &[
            vec![
                CellValue::text("Jan"),
                CellValue::text("CarRack"),
                CellValue::text("Chicago"),
                CellValue::Number(415.75),
            ],
            vec![
                CellValue::text("Jan"),
                CellValue::text("CarRack"),
                CellValue::text("Nashville"),
                CellValue::Number(415.75),
            ],
            vec![
                CellValue::text("Mar"),
                CellValue::text("Headlamp"),
                CellValue::text("Chicago"),
                CellValue::Number(24.99),
            ],
        ],
    )
}

/// Four January sales of 415.75 plus one March row, for the subtotal
/// function scenarios.
pub fn january_heavy_cache() -> SourceCache {
    let mut rows = Vec::new();
    for city in ["Chicago", "Nashville", "Portland", "Seattle"] {
        rows.push(vec![
            CellValue::text("Jan"),
            CellValue::text("CarRack"),
            CellValue::text(city),
            CellValue::Number(415.75),
        ]);
    }
    rows.push(vec![
        CellValue::text("Mar"),
        CellValue::text("Headlamp"),
        CellValue::text("Chicago"),
        CellValue::Number(24.99),
    ]);
    SourceCache::from_rows(&["Month", "Product", "City", "Total"], &rows)
}

/// Renders a cell as text: labels verbatim, numbers trimmed, empties as
/// "". Makes grid assertions readable.
pub fn cell_text(layout: &PivotTableLayout, row: u32, col: u32) -> String {
    match layout.cell(row, col) {
        LayoutCell::Empty => String::new(),
        LayoutCell::Label(s) => s.clone(),
        LayoutCell::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.0}", n)
            } else {
                format!("{}", n)
            }
        }
    }
}

/// One grid row as text cells.
pub fn row_text(layout: &PivotTableLayout, row: u32) -> Vec<String> {
    (0..layout.width()).map(|c| cell_text(layout, row, c)).collect()
}

/// All non-empty labels in one grid column, top to bottom.
pub fn labels_in_column(layout: &PivotTableLayout, col: u32) -> Vec<String> {
    (0..layout.height())
        .filter_map(|r| match layout.cell(r, col) {
            LayoutCell::Label(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}
