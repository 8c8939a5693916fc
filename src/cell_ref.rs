//! Cell reference utilities
//!
//! Conversions between `A1`-style names and 1-based `(column, row)`
//! coordinates.

use crate::error::{ExcelError, Result};
use crate::{MAX_COLUMNS, TOTAL_ROWS};

/// Convert a 1-based column number to its letters (1 -> A, 27 -> AA)
pub fn column_number_to_name(col: u32) -> Result<String> {
    if col < 1 || col > MAX_COLUMNS {
        return Err(ExcelError::ColumnNumber);
    }
    let mut col_str = String::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        col_str.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    Ok(col_str)
}

/// Convert column letters to a 1-based column number (A -> 1, AA -> 27)
pub fn column_name_to_number(name: &str) -> Result<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(ExcelError::InvalidCellReference {
            cell: name.to_string(),
        });
    }
    let mut col = 0u32;
    for b in name.bytes() {
        col = col * 26 + (b.to_ascii_uppercase() - b'A' + 1) as u32;
        if col > MAX_COLUMNS {
            return Err(ExcelError::ColumnNumber);
        }
    }
    Ok(col)
}

/// Parse a cell name such as `B12` (absolute markers `$` are accepted)
pub fn cell_name_to_coordinates(cell: &str) -> Result<(u32, u32)> {
    let invalid = || ExcelError::InvalidCellReference {
        cell: cell.to_string(),
    };
    let trimmed: String = cell.chars().filter(|c| *c != '$').collect();
    let split = trimmed
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (letters, digits) = trimmed.split_at(split);
    if letters.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let col = column_name_to_number(letters).map_err(|e| match e {
        ExcelError::ColumnNumber => ExcelError::ColumnNumber,
        _ => invalid(),
    })?;
    let row: u32 = digits.parse().map_err(|_| invalid())?;
    if row == 0 {
        return Err(invalid());
    }
    if row > TOTAL_ROWS {
        return Err(ExcelError::RowNumber);
    }
    Ok((col, row))
}

/// Format 1-based coordinates as a cell name
pub fn coordinates_to_cell_name(col: u32, row: u32) -> Result<String> {
    if row < 1 || row > TOTAL_ROWS {
        return Err(ExcelError::RowNumber);
    }
    let mut name = column_number_to_name(col)?;
    let mut buf = itoa::Buffer::new();
    name.push_str(buf.format(row));
    Ok(name)
}

/// Parse a range such as `A1:C20` into normalized `(col1, row1, col2, row2)`
/// where the first corner is top-left
pub fn range_to_coordinates(range: &str) -> Result<(u32, u32, u32, u32)> {
    let (first, second) = range
        .split_once(':')
        .ok_or_else(|| ExcelError::InvalidCellReference {
            cell: range.to_string(),
        })?;
    let (c1, r1) = cell_name_to_coordinates(first)?;
    let (c2, r2) = cell_name_to_coordinates(second)?;
    Ok((c1.min(c2), r1.min(r2), c1.max(c2), r1.max(r2)))
}

/// Format normalized coordinates as a range
pub fn coordinates_to_range(col1: u32, row1: u32, col2: u32, row2: u32) -> Result<String> {
    Ok(format!(
        "{}:{}",
        coordinates_to_cell_name(col1, row1)?,
        coordinates_to_cell_name(col2, row2)?
    ))
}
