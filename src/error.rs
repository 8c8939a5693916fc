//! Error types for sheetstream

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, ExcelError>;

/// Errors raised while assembling a workbook or streaming a worksheet
#[derive(Debug, Error)]
pub enum ExcelError {
    /// Underlying I/O failure (spill file, container drain, output file)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// ZIP container failure
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// A persisted XML part is not valid text or not well-formed
    #[error("XML syntax error: {0}")]
    MalformedXml(String),

    /// Committed row data could not be re-read as a complete structure
    #[error("XML syntax error: {0}")]
    IncompleteDocument(String),

    #[error("cannot convert cell \"{cell}\" to coordinates: invalid cell name \"{cell}\"")]
    InvalidCellReference { cell: String },

    #[error("row {0} has already been written")]
    NonAscendingRow(u32),

    #[error("the column number must be greater than or equal to 1 and less than or equal to {}", crate::MAX_COLUMNS)]
    ColumnNumber,

    #[error("row number exceeds maximum limit {}", crate::TOTAL_ROWS)]
    RowNumber,

    #[error("the height of the row must be less than or equal to {} points", crate::MAX_ROW_HEIGHT)]
    MaxRowHeight,

    #[error("invalid outline level, must be between 0 and {}", crate::MAX_OUTLINE_LEVEL)]
    OutlineLevel,

    #[error("the width of the column must be less than or equal to {} characters", crate::MAX_COLUMN_WIDTH)]
    ColumnWidth,

    #[error("columns {min}:{max} overlap a width range that is already set")]
    ColumnRangeOverlap { min: u32, max: u32 },

    /// A pre-row feature was requested after the first row was written
    #[error("must call {0} before writing any row")]
    FeatureAlreadyStreamed(&'static str),

    #[error("parameter is invalid: {0}")]
    InvalidParameter(&'static str),

    #[error("sheet {0} does not exist")]
    SheetNotExist(String),

    #[error("the sheet name {0:?} is invalid")]
    SheetNameInvalid(String),

    #[error("the table name {0:?} is invalid")]
    InvalidTableName(String),

    /// Operation attempted on a disposed buffer or a finalized session
    #[error("resource closed: {0}")]
    ResourceClosed(&'static str),

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<quick_xml::Error> for ExcelError {
    fn from(err: quick_xml::Error) -> Self {
        ExcelError::MalformedXml(err.to_string())
    }
}

impl From<quick_xml::DeError> for ExcelError {
    fn from(err: quick_xml::DeError) -> Self {
        ExcelError::MalformedXml(err.to_string())
    }
}

impl From<quick_xml::SeError> for ExcelError {
    fn from(err: quick_xml::SeError) -> Self {
        ExcelError::WriteError(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ExcelError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ExcelError::MalformedXml(err.to_string())
    }
}

impl From<std::str::Utf8Error> for ExcelError {
    fn from(err: std::str::Utf8Error) -> Self {
        ExcelError::MalformedXml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_reference_names_token() {
        let err = ExcelError::InvalidCellReference {
            cell: "A".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot convert cell \"A\" to coordinates: invalid cell name \"A\""
        );
    }

    #[test]
    fn test_utf8_error_is_malformed_xml() {
        let bytes = [0x8f_u8, 0xe0, 0xa8];
        let err: ExcelError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert!(matches!(err, ExcelError::MalformedXml(_)));
    }
}
