//! Type definitions for streamed worksheet data

use crate::styles::Font;
use chrono::{NaiveDateTime, TimeDelta};

/// A scalar value for a single cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// No value; nothing is emitted unless a style is attached
    Empty,
    /// String value
    String(String),
    /// Raw bytes, written as (lossy) UTF-8 text
    Bytes(Vec<u8>),
    /// Signed integer value
    Int(i64),
    /// Unsigned integer value
    UInt(u64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Timestamp, written as a serial day number
    DateTime(NaiveDateTime),
    /// Elapsed time, written as a fraction of a day
    Duration(TimeDelta),
    /// Error literal such as `#N/A`
    Error(String),
    /// A value of a kind the worksheet format cannot hold (e.g. a complex
    /// number). Accepted without failing the row; it carries no content.
    Unsupported(String),
}

impl CellValue {
    /// Check if cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

macro_rules! cell_value_from {
    ($variant:ident as $target:ty: $($t:ty),*) => {
        $(
            impl From<$t> for CellValue {
                fn from(v: $t) -> Self {
                    CellValue::$variant(v as $target)
                }
            }
        )*
    };
}

cell_value_from!(Int as i64: i8, i16, i32, i64, isize);
cell_value_from!(UInt as u64: u8, u16, u32, u64, usize);

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<f32> for CellValue {
    fn from(f: f32) -> Self {
        // Widen through the shortest f32 text so 100.1588f32 stays 100.1588
        CellValue::Float(f.to_string().parse().unwrap_or(f as f64))
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(b: Vec<u8>) -> Self {
        CellValue::Bytes(b)
    }
}

impl From<&[u8]> for CellValue {
    fn from(b: &[u8]) -> Self {
        CellValue::Bytes(b.to_vec())
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(dt: NaiveDateTime) -> Self {
        CellValue::DateTime(dt)
    }
}

impl<Tz: chrono::TimeZone> From<chrono::DateTime<Tz>> for CellValue {
    fn from(dt: chrono::DateTime<Tz>) -> Self {
        CellValue::DateTime(dt.naive_utc())
    }
}

impl From<TimeDelta> for CellValue {
    fn from(d: TimeDelta) -> Self {
        CellValue::Duration(d)
    }
}

impl From<std::time::Duration> for CellValue {
    fn from(d: std::time::Duration) -> Self {
        match TimeDelta::from_std(d) {
            Ok(delta) => CellValue::Duration(delta),
            Err(_) => CellValue::Unsupported(format!("{:?}", d)),
        }
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// Explicit cell descriptor: value, optional formula and style
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    /// Cached value (or the only content when there is no formula)
    pub value: CellValue,
    /// Formula text, with or without a leading `=`
    pub formula: Option<String>,
    /// Style identifier from the workbook's style registry (0 = none)
    pub style_id: u32,
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl Cell {
    /// Create a cell holding a value
    pub fn new(value: impl Into<CellValue>) -> Self {
        Cell {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Create a cell holding a formula without a cached value
    pub fn formula(formula: impl Into<String>) -> Self {
        Cell {
            formula: Some(formula.into()),
            ..Default::default()
        }
    }

    /// Create an empty cell carrying only a style
    pub fn styled(style_id: u32) -> Self {
        Cell {
            style_id,
            ..Default::default()
        }
    }

    /// Set the style identifier
    pub fn with_style(mut self, style_id: u32) -> Self {
        self.style_id = style_id;
        self
    }

    /// Set the formula
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Set the value
    pub fn with_value(mut self, value: impl Into<CellValue>) -> Self {
        self.value = value.into();
        self
    }
}

/// One run of rich text with an optional font override
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RichTextRun {
    pub text: String,
    pub font: Option<Font>,
}

impl RichTextRun {
    pub fn new(text: impl Into<String>) -> Self {
        RichTextRun {
            text: text.into(),
            font: None,
        }
    }

    pub fn with_font(mut self, font: Font) -> Self {
        self.font = Some(font);
        self
    }
}

/// Input for one column position of a streamed row
#[derive(Debug, Clone, PartialEq)]
pub enum CellInput {
    /// Bare scalar; inherits the row's default style
    Value(CellValue),
    /// Explicit descriptor; uses its own style
    Cell(Cell),
    /// Inline rich text made of styled runs
    RichText(Vec<RichTextRun>),
}

impl CellInput {
    /// True when the input produces no cell element at all
    pub fn is_absent(&self) -> bool {
        match self {
            CellInput::Value(v) => v.is_empty(),
            CellInput::Cell(c) => c.value.is_empty() && c.formula.is_none() && c.style_id == 0,
            CellInput::RichText(_) => false,
        }
    }
}

impl From<CellValue> for CellInput {
    fn from(v: CellValue) -> Self {
        CellInput::Value(v)
    }
}

impl From<Cell> for CellInput {
    fn from(c: Cell) -> Self {
        CellInput::Cell(c)
    }
}

impl From<Vec<RichTextRun>> for CellInput {
    fn from(runs: Vec<RichTextRun>) -> Self {
        CellInput::RichText(runs)
    }
}

macro_rules! cell_input_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for CellInput {
                fn from(v: $t) -> Self {
                    CellInput::Value(CellValue::from(v))
                }
            }
        )*
    };
}

cell_input_from!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, &str, String,
    Vec<u8>, NaiveDateTime, TimeDelta
);

/// Row-level attributes for a streamed row
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RowOpts {
    /// Row height in points
    pub height: Option<f64>,
    pub hidden: bool,
    /// Default style for bare values in the row (0 = none)
    pub style_id: u32,
    /// Outline (grouping) level, 0-7
    pub outline_level: u8,
}

impl RowOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(mut self, height: f64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn style(mut self, style_id: u32) -> Self {
        self.style_id = style_id;
        self
    }

    pub fn outline_level(mut self, level: u8) -> Self {
        self.outline_level = level;
        self
    }
}

/// Freeze or split pane configuration for the worksheet view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panes {
    pub freeze: bool,
    pub split: bool,
    /// Columns left of the split (frozen) or horizontal split position
    pub x_split: u32,
    /// Rows above the split (frozen) or vertical split position
    pub y_split: u32,
    /// Top-left visible cell of the bottom-right pane
    pub top_left_cell: Option<String>,
    /// `bottomLeft`, `bottomRight`, `topLeft` or `topRight`
    pub active_pane: Option<String>,
    pub selections: Vec<PaneSelection>,
}

/// Selection within one pane
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaneSelection {
    pub sqref: String,
    pub active_cell: String,
    pub pane: String,
}

/// Table definition over a cell range whose first row is the header
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Range such as `A1:C20`
    pub range: String,
    /// Table name; defaults to `Table{id}`
    pub name: Option<String>,
    /// Built-in table style such as `TableStyleMedium2`
    pub style_name: Option<String>,
    pub show_first_column: bool,
    pub show_last_column: bool,
    pub show_row_stripes: bool,
    pub show_column_stripes: bool,
}

impl Table {
    pub fn new(range: impl Into<String>) -> Self {
        Table {
            range: range.into(),
            name: None,
            style_name: None,
            show_first_column: false,
            show_last_column: false,
            show_row_stripes: true,
            show_column_stripes: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_style(mut self, style_name: impl Into<String>) -> Self {
        self.style_name = Some(style_name.into());
        self
    }
}

/// A row read back from a worksheet
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Row number (1-based)
    pub index: u32,
    /// Cell texts, padded up to the last non-empty cell
    pub cells: Vec<String>,
}

impl Row {
    pub fn new(index: u32, cells: Vec<String>) -> Self {
        Row { index, cells }
    }

    /// Get cell at column index (0-based)
    pub fn get(&self, col: usize) -> Option<&str> {
        self.cells.get(col).map(String::as_str)
    }

    /// Get number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if row is empty
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversions() {
        assert_eq!(CellValue::from(-128i8), CellValue::Int(-128));
        assert_eq!(CellValue::from(u64::MAX), CellValue::UInt(u64::MAX));
        assert_eq!(CellValue::from(100.1588f32), CellValue::Float(100.1588));
    }

    #[test]
    fn test_absent_inputs() {
        assert!(CellInput::Value(CellValue::Empty).is_absent());
        assert!(CellInput::Cell(Cell::default()).is_absent());
        assert!(!CellInput::Cell(Cell::styled(3)).is_absent());
        assert!(!CellInput::Cell(Cell::formula("SUM(A1:A2)")).is_absent());
        assert!(!CellInput::RichText(vec![]).is_absent());
    }

    #[test]
    fn test_option_maps_to_empty() {
        let none: Option<i32> = None;
        assert!(CellValue::from(none).is_empty());
        assert_eq!(CellValue::from(Some("x")), CellValue::String("x".into()));
    }
}
