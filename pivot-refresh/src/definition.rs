//! FILENAME: pivot-refresh/src/definition.rs
//! Pivot Table Definition - The serializable configuration.
//!
//! This module contains all the types needed to DESCRIBE a pivot table.
//! These structures are designed to be:
//! - Serializable (they mirror the file format's pivot-table part one-to-one)
//! - Immutable snapshots of user intent
//!
//! The definition never owns data; a refresh pairs it with a shared
//! `SourceCache` and produces a `PivotTableLayout`.

use serde::{Deserialize, Serialize};
use sheet_model::CellCoord;

/// Index into the source cache fields (0-based).
pub type FieldIndex = usize;

// ============================================================================
// AGGREGATION FUNCTIONS
// ============================================================================

/// Supported aggregation functions for data fields.
///
/// The variant order is the fixed display order: when a field requests
/// several subtotal functions, their subtotal rows/columns are emitted in
/// this order regardless of configuration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Function {
    #[default]
    Sum,
    Count,
    Average,
    Max,
    Min,
    Product,
    CountNums,
    StdDev,
    StdDevp,
    Var,
    Varp,
}

impl Function {
    /// All functions in fixed display order.
    pub const DISPLAY_ORDER: [Function; 11] = [
        Function::Sum,
        Function::Count,
        Function::Average,
        Function::Max,
        Function::Min,
        Function::Product,
        Function::CountNums,
        Function::StdDev,
        Function::StdDevp,
        Function::Var,
        Function::Varp,
    ];

    /// The function name used in generated labels ("Jan Sum", "Sum of Total").
    pub fn name(&self) -> &'static str {
        match self {
            Function::Sum => "Sum",
            Function::Count => "Count",
            Function::Average => "Average",
            Function::Max => "Max",
            Function::Min => "Min",
            Function::Product => "Product",
            Function::CountNums => "CountNums",
            Function::StdDev => "StdDev",
            Function::StdDevp => "StdDevp",
            Function::Var => "Var",
            Function::Varp => "Varp",
        }
    }

    /// Rank in the fixed display order.
    pub fn display_rank(&self) -> usize {
        Function::DISPLAY_ORDER
            .iter()
            .position(|f| f == self)
            .unwrap_or(usize::MAX)
    }
}

// ============================================================================
// ITEM SORTING
// ============================================================================

/// How a pivot field orders its materialized items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum ItemSort {
    /// First-seen order in the cache (calendar order for grouped fields).
    #[default]
    Natural,
    /// Ascending by item value/label.
    Ascending,
    /// Descending by item value/label.
    Descending,
    /// By the aggregated value of a data field, computed for each item under
    /// its ancestor path. Items with equal keys keep natural order.
    ByDataField {
        /// Index into `PivotDefinition::data_fields`.
        data_field: usize,
        descending: bool,
    },
}

// ============================================================================
// AXIS FIELD DEFINITION
// ============================================================================

/// A field placed in the row or column area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotField {
    /// Index of the source cache field.
    pub source_index: FieldIndex,

    /// Display name (defaults to the cache field name).
    pub name: String,

    /// Item ordering for this field.
    pub sort: ItemSort,

    /// Whether group subtotals precede their children (`true`) or follow
    /// them (`false`). Strictly a placement flag: it never changes any
    /// aggregated value.
    pub subtotal_top: bool,

    /// Which subtotal functions to emit at this field's group boundaries,
    /// one subtotal row/column per function. Empty disables subtotals.
    /// Innermost fields never emit subtotals (the leaf rows already carry
    /// the values).
    pub subtotal_functions: Vec<Function>,

    /// Item labels that are hidden (filtered out of the axis).
    pub hidden_items: Vec<String>,
}

impl PivotField {
    pub fn new(source_index: FieldIndex, name: impl Into<String>) -> Self {
        PivotField {
            source_index,
            name: name.into(),
            sort: ItemSort::Natural,
            subtotal_top: false,
            subtotal_functions: vec![Function::Sum],
            hidden_items: Vec::new(),
        }
    }

    /// Returns the requested subtotal functions deduplicated and in fixed
    /// display order, regardless of configuration order.
    pub fn ordered_subtotal_functions(&self) -> Vec<Function> {
        let mut funcs: Vec<Function> = Vec::new();
        for &f in &self.subtotal_functions {
            if !funcs.contains(&f) {
                funcs.push(f);
            }
        }
        funcs.sort_by_key(|f| f.display_rank());
        funcs
    }

    /// True when the subtotal configuration is the single default Sum.
    /// Such subtotals are rendered as a bare "<item> Total" rollup when
    /// there is exactly one data field.
    pub fn has_default_subtotal(&self) -> bool {
        self.subtotal_functions == [Function::Sum]
    }
}

// ============================================================================
// PAGE (FILTER) FIELD DEFINITION
// ============================================================================

/// Selection state of a page field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PageSelection {
    /// No restriction.
    #[default]
    All,
    /// Exactly one shared item selected, by its 0-based item index.
    Item(usize),
    /// Multi-select: the listed item indices are hidden, everything else
    /// passes.
    Multi { hidden: Vec<usize> },
}

/// A field placed in the page (filter) area. Page fields restrict which
/// records participate in the refresh; they never appear on an axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageField {
    pub source_index: FieldIndex,
    pub name: String,
    pub selection: PageSelection,
}

impl PageField {
    pub fn new(source_index: FieldIndex, name: impl Into<String>) -> Self {
        PageField {
            source_index,
            name: name.into(),
            selection: PageSelection::All,
        }
    }
}

// ============================================================================
// DATA FIELD DEFINITION
// ============================================================================

/// A field placed in the data area: a source field (possibly calculated)
/// paired with an aggregation function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataField {
    /// Index of the source cache field (may reference a calculated field).
    pub source_index: FieldIndex,

    /// The aggregation function to apply.
    pub function: Function,

    /// Display name override. When `None` the name is generated as
    /// "<Function> of <field>".
    pub name: Option<String>,
}

impl DataField {
    pub fn new(source_index: FieldIndex, function: Function) -> Self {
        DataField {
            source_index,
            function,
            name: None,
        }
    }

    /// The generated display name, e.g. "Sum of Total".
    pub fn display_name(&self, field_name: &str) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => format!("{} of {}", self.function.name(), field_name),
        }
    }
}

/// Where the data-field dimension is placed when it needs its own axis
/// band (more than one data field, or an otherwise empty axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DataPlacement {
    /// Data fields become an innermost column level.
    #[default]
    Columns,
    /// Data fields become an innermost row level.
    Rows,
}

// ============================================================================
// MAIN DEFINITION STRUCT
// ============================================================================

/// The complete, serializable definition of a pivot table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotDefinition {
    /// User-friendly name for this pivot table.
    #[serde(default)]
    pub name: Option<String>,

    /// Fields placed in the Row area (ordered from outer to inner).
    pub row_fields: Vec<PivotField>,

    /// Fields placed in the Column area (ordered from outer to inner).
    pub column_fields: Vec<PivotField>,

    /// Fields placed in the Page (filter) area.
    pub page_fields: Vec<PageField>,

    /// Fields placed in the Data area.
    pub data_fields: Vec<DataField>,

    /// Which axis hosts the data-field dimension.
    #[serde(default)]
    pub data_placement: DataPlacement,

    /// Show the row-axis grand total (the "Grand Total" row).
    pub row_grand_totals: bool,

    /// Show the column-axis grand total (the "Grand Total" column).
    pub column_grand_totals: bool,

    /// Top-left cell of the pivot table output.
    pub origin: CellCoord,
}

impl PivotDefinition {
    /// Creates an empty definition anchored at `origin`. Grand totals are
    /// on by default, matching the reference application.
    pub fn new(origin: CellCoord) -> Self {
        PivotDefinition {
            name: None,
            row_fields: Vec::new(),
            column_fields: Vec::new(),
            page_fields: Vec::new(),
            data_fields: Vec::new(),
            data_placement: DataPlacement::Columns,
            row_grand_totals: true,
            column_grand_totals: true,
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtotal_functions_fixed_order() {
        let mut field = PivotField::new(0, "Month");
        field.subtotal_functions = vec![
            Function::Product,
            Function::Count,
            Function::Sum,
            Function::Count, // duplicate
        ];
        assert_eq!(
            field.ordered_subtotal_functions(),
            vec![Function::Sum, Function::Count, Function::Product]
        );
    }

    #[test]
    fn test_default_subtotal_detection() {
        let field = PivotField::new(0, "Month");
        assert!(field.has_default_subtotal());

        let mut multi = PivotField::new(0, "Month");
        multi.subtotal_functions = vec![Function::Sum, Function::Count];
        assert!(!multi.has_default_subtotal());

        let mut none = PivotField::new(0, "Month");
        none.subtotal_functions.clear();
        assert!(!none.has_default_subtotal());
    }

    #[test]
    fn test_data_field_display_name() {
        let df = DataField::new(3, Function::Sum);
        assert_eq!(df.display_name("Total"), "Sum of Total");

        let mut named = DataField::new(3, Function::Average);
        named.name = Some("Avg Sales".to_string());
        assert_eq!(named.display_name("Total"), "Avg Sales");
    }

    #[test]
    fn test_definition_roundtrip() {
        let mut def = PivotDefinition::new((0, 0));
        def.row_fields.push(PivotField::new(0, "Month"));
        def.data_fields.push(DataField::new(3, Function::Sum));

        let json = serde_json::to_string(&def).unwrap();
        let back: PivotDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.row_fields.len(), 1);
        assert_eq!(back.data_fields[0].function, Function::Sum);
        assert!(back.row_grand_totals);
    }
}
