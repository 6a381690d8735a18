//! FILENAME: sheet-model/src/cell.rs
//! PURPOSE: Defines the typed value a single spreadsheet cell can hold.
//! CONTEXT: The pivot cache is built from rows of `CellValue`s handed over
//! by the source-range reader, and the finished layout is written back out
//! as `CellValue`s. The type is kept lightweight since millions of values
//! may flow through a refresh.

use serde::{Deserialize, Serialize};

/// Represents the possible errors a cell can hold (e.g., #DIV/0!)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellError {
    Div0,       // Division by zero
    Ref,        // Invalid reference
    Name,       // Unknown function name
    Value,      // Wrong type of argument
    Parse,      // Formula parsing error
    Circular,   // Circular dependency detected
}

/// The calculated result or raw data within a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Returns the display string for this value, the way it would appear
    /// in a cell. Whole numbers drop their decimal point.
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.0}", n)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => {
                if *b { "TRUE" } else { "FALSE" }.to_string()
            }
            CellValue::Error(e) => format!("#{:?}", e).to_uppercase(),
        }
    }

    /// Returns the numeric content, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_whole_numbers() {
        assert_eq!(CellValue::Number(415.0).display(), "415");
        assert_eq!(CellValue::Number(415.75).display(), "415.75");
    }

    #[test]
    fn test_display_text_and_bool() {
        assert_eq!(CellValue::text("CarRack").display(), "CarRack");
        assert_eq!(CellValue::Boolean(true).display(), "TRUE");
        assert_eq!(CellValue::Empty.display(), "");
    }

    #[test]
    fn test_display_error() {
        assert_eq!(CellValue::Error(CellError::Div0).display(), "#DIV0");
    }

    #[test]
    fn test_serde_round_trip() {
        let values = vec![
            CellValue::Empty,
            CellValue::Number(415.75),
            CellValue::text("CarRack"),
            CellValue::Boolean(false),
            CellValue::Error(CellError::Ref),
        ];
        let json = serde_json::to_string(&values).unwrap();
        let back: Vec<CellValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
