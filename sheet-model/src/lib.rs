//! FILENAME: sheet-model/src/lib.rs
//! Shared spreadsheet primitives.
//!
//! This crate holds the types the pivot refresh engine exchanges with its
//! collaborators (the source-range reader and the cell-writer): typed cell
//! values and 0-based cell coordinates with A1-style conversion helpers.

pub mod cell;
pub mod coord;

pub use cell::{CellError, CellValue};
pub use coord::{col_to_index, coord_to_a1, index_to_col, CellCoord};
