//! # sheetstream
//!
//! Forward-only, memory-bounded writer for the row data of a single XLSX
//! worksheet.
//!
//! Rows are encoded straight into a [`SpillBuffer`](stream::SpillBuffer) that
//! lives in memory until it crosses a size threshold and then continues in a
//! temporary file, so a worksheet of any size can be produced with bounded
//! memory. Worksheet features whose XML lives at fixed positions around the
//! row block (column widths, panes, merged cells, page breaks, tables) are
//! collected by the session and placed where they belong when it is flushed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sheetstream::{CellValue, RowOpts, Workbook};
//!
//! let mut workbook = Workbook::new()?;
//! let mut writer = workbook.new_stream_writer("Sheet1")?;
//!
//! writer.set_col_width(1, 3, 18.0)?;
//! writer.set_row("A1", &["ID".into(), "Name".into(), "Score".into()], RowOpts::default())?;
//! for i in 2..=10_000u32 {
//!     writer.set_row(
//!         &format!("A{}", i),
//!         &[CellValue::from(i).into(), format!("Name_{}", i).into(), (i as f64 * 1.5).into()],
//!         RowOpts::default(),
//!     )?;
//! }
//! writer.flush(&mut workbook)?;
//! workbook.save_as("report.xlsx")?;
//! # Ok::<(), sheetstream::ExcelError>(())
//! ```

pub mod cell_ref;
pub mod date;
pub mod error;
pub mod reader;
pub mod stream;
pub mod styles;
pub mod types;
pub mod workbook;

pub use error::{ExcelError, Result};
pub use reader::{RowAttributes, RowIterator};
pub use stream::{SpillBuffer, StreamWriter};
pub use styles::{Font, Style};
pub use types::{
    Cell, CellInput, CellValue, PaneSelection, Panes, RichTextRun, Row, RowOpts, Table,
};
pub use workbook::{Workbook, WorkbookOptions};

/// Maximum number of columns in a worksheet (XFD)
pub const MAX_COLUMNS: u32 = 16_384;

/// Maximum number of rows in a worksheet
pub const TOTAL_ROWS: u32 = 1_048_576;

/// Maximum number of characters a cell can hold
pub const TOTAL_CELL_CHARS: usize = 32_767;

/// Maximum row height in points
pub const MAX_ROW_HEIGHT: f64 = 409.0;

/// Maximum column width in characters
pub const MAX_COLUMN_WIDTH: f64 = 255.0;

/// Highest accepted row outline level
pub const MAX_OUTLINE_LEVEL: u8 = 7;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LENGTH: usize = 31;

/// Bytes a spill buffer keeps in memory before it moves to a temporary file
pub const STREAM_CHUNK_SIZE: usize = 1 << 24;
