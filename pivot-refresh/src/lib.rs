//! FILENAME: pivot-refresh/src/lib.rs
//! Pivot table refresh engine.
//!
//! This crate turns a serializable pivot definition plus a shared source
//! cache into a rendered cell grid. It depends on `sheet-model` only for
//! shared types (CellValue, CellCoord).
//!
//! Layers:
//! - `definition`: Serializable configuration (what the pivot table IS)
//! - `cache`: The deduplicated source snapshot (WHAT we aggregate over)
//! - `refresh`: The pipeline and the `PivotTable` wrapper (HOW we compute)
//! - `layout`: The rendered grid and the sheet-writing seam (WHAT we display)
//!
//! The internal stages (grouping, filtering, sorting, tree building,
//! aggregation) are private modules behind `refresh`.

pub mod cache;
pub mod definition;
pub mod error;
pub mod layout;
pub mod refresh;

mod aggregate;
mod context;
mod filter;
mod grouping;
mod sort;
mod tree;

pub use cache::*;
pub use definition::*;
pub use error::ConfigError;
pub use layout::{CellWriter, LayoutCell, PivotTableLayout};
pub use refresh::{refresh_pivot, validate, DrillDownResult, PivotTable};

pub use aggregate::{null_evaluator, FormulaEvaluator, RecordView};
pub use context::RefreshStats;
