//! Table support for streamed sheets
//!
//! Header names come from the rows that were already streamed, so they are
//! recovered by parsing the session buffer back.

use super::sections::PendingTable;
use super::xml_writer::XmlWriter;
use crate::cell_ref::{cell_name_to_coordinates, coordinates_to_range};
use crate::error::{ExcelError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{BufReader, Read};

const MAX_TABLE_NAME_LENGTH: usize = 255;

/// Collect the header names of columns `first_col..=last_col` in `header_row`.
///
/// Empty header cells are named `Column{n}` after their position in the
/// table. Fails with [`ExcelError::IncompleteDocument`] when the buffer ends
/// before the header row shows up.
pub(crate) fn read_header_names<R: Read>(
    source: R,
    header_row: u32,
    first_col: u32,
    last_col: u32,
) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(BufReader::new(source));
    let mut buf = Vec::new();

    let width = (last_col - first_col + 1) as usize;
    let mut names = vec![String::new(); width];
    let mut depth = 0usize;
    let mut in_header = false;
    let mut current_col: Option<u32> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                match e.local_name().as_ref() {
                    b"row" => {
                        let r = row_number(&e)?;
                        if r > header_row {
                            break;
                        }
                        in_header = r == header_row;
                    }
                    b"c" if in_header => current_col = cell_column(&e)?,
                    b"rPh" => in_phonetic = true,
                    b"t" | b"v" if in_header && !in_phonetic => in_text = true,
                    _ => {}
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let r = row_number(&e)?;
                if r == header_row {
                    return Ok(default_names(names));
                }
                if r > header_row {
                    break;
                }
            }
            Event::Text(t) if in_text => {
                if let Some(col) = current_col.filter(|c| (first_col..=last_col).contains(c)) {
                    names[(col - first_col) as usize].push_str(&t.unescape()?);
                }
            }
            Event::CData(t) if in_text => {
                if let Some(col) = current_col.filter(|c| (first_col..=last_col).contains(c)) {
                    names[(col - first_col) as usize].push_str(std::str::from_utf8(&t)?);
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    b"t" | b"v" => in_text = false,
                    b"rPh" => in_phonetic = false,
                    b"c" => current_col = None,
                    b"row" if in_header => {
                        return Ok(default_names(names));
                    }
                    _ => {}
                }
            }
            Event::Eof => {
                log::debug!(
                    "header row {} not found in streamed data (open elements: {})",
                    header_row,
                    depth
                );
                return Err(ExcelError::IncompleteDocument(format!(
                    "unexpected EOF before header row {}",
                    header_row
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    // Rows arrive in ascending order; a later row means the header was skipped
    Err(ExcelError::IncompleteDocument(format!(
        "header row {} was not streamed",
        header_row
    )))
}

fn default_names(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            if name.is_empty() {
                format!("Column{}", i + 1)
            } else {
                name
            }
        })
        .collect()
}

fn attribute_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(std::str::from_utf8(&attr.value)?.to_string()));
        }
    }
    Ok(None)
}

fn row_number(e: &BytesStart<'_>) -> Result<u32> {
    let value = attribute_value(e, b"r")?.unwrap_or_default();
    value
        .parse()
        .map_err(|_| ExcelError::MalformedXml(format!("invalid row number {:?}", value)))
}

fn cell_column(e: &BytesStart<'_>) -> Result<Option<u32>> {
    match attribute_value(e, b"r")? {
        Some(reference) => Ok(Some(cell_name_to_coordinates(&reference)?.0)),
        None => Ok(None),
    }
}

/// Check a user supplied table name
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    let invalid = || ExcelError::InvalidTableName(name.to_string());
    let mut chars = name.chars();
    let first = chars.next().ok_or_else(invalid)?;
    if !(first.is_alphabetic() || first == '_' || first == '\\') {
        return Err(invalid());
    }
    if name.chars().count() > MAX_TABLE_NAME_LENGTH
        || !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '\\')
    {
        return Err(invalid());
    }
    // Names that read as cell references would be ambiguous in formulas
    if cell_name_to_coordinates(name).is_ok() || is_r1c1_reference(name) {
        return Err(invalid());
    }
    Ok(())
}

fn is_r1c1_reference(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let Some(rest) = upper.strip_prefix('R') else {
        return false;
    };
    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let rest = &rest[digits_end..];
    match rest.strip_prefix('C') {
        Some(cols) => cols.bytes().all(|b| b.is_ascii_digit()),
        None => rest.is_empty(),
    }
}

/// Pick the final name of each pending table.
///
/// Explicit names must not repeat a name already used by a table of the
/// workbook. Unnamed tables get `Table{id}`, moving to the next free number
/// when that name is taken. Names compare case-insensitively.
pub(crate) fn resolve_table_names(
    ids: &[u32],
    tables: &[PendingTable],
    existing: &[String],
) -> Result<Vec<String>> {
    let mut taken: Vec<String> = existing.iter().map(|n| n.to_lowercase()).collect();
    for name in tables.iter().filter_map(|t| t.name.as_deref()) {
        let lower = name.to_lowercase();
        if taken.contains(&lower) {
            return Err(ExcelError::InvalidTableName(name.to_string()));
        }
        taken.push(lower);
    }

    let mut names = Vec::with_capacity(tables.len());
    for (id, table) in ids.iter().zip(tables) {
        let name = match &table.name {
            Some(name) => name.clone(),
            None => {
                let mut n = *id;
                while taken.contains(&format!("table{}", n)) {
                    n += 1;
                }
                let name = format!("Table{}", n);
                taken.push(name.to_lowercase());
                name
            }
        };
        names.push(name);
    }
    Ok(names)
}

/// Render `xl/tables/table{id}.xml`
pub(crate) fn table_part_xml(id: u32, name: &str, table: &PendingTable) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut xml = XmlWriter::new(&mut out);
        xml.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")?;
        xml.start_element("table")?;
        xml.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        xml.attribute_int("id", id as i64)?;
        xml.attribute("name", name)?;
        xml.attribute("displayName", name)?;
        xml.attribute("ref", &table.range)?;
        xml.close_start_tag()?;

        xml.start_element("autoFilter")?;
        xml.attribute("ref", &table.range)?;
        xml.write_raw(b"/>")?;

        xml.start_element("tableColumns")?;
        xml.attribute_int("count", table.columns.len() as i64)?;
        xml.close_start_tag()?;
        for (i, column) in table.columns.iter().enumerate() {
            xml.start_element("tableColumn")?;
            xml.attribute_int("id", i as i64 + 1)?;
            xml.attribute("name", column)?;
            xml.write_raw(b"/>")?;
        }
        xml.end_element("tableColumns")?;

        xml.start_element("tableStyleInfo")?;
        if let Some(style) = &table.style_name {
            xml.attribute("name", style)?;
        }
        xml.attribute("showFirstColumn", flag(table.show_first_column))?;
        xml.attribute("showLastColumn", flag(table.show_last_column))?;
        xml.attribute("showRowStripes", flag(table.show_row_stripes))?;
        xml.attribute("showColumnStripes", flag(table.show_column_stripes))?;
        xml.write_raw(b"/>")?;

        xml.end_element("table")?;
        xml.flush()?;
    }
    Ok(out)
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Normalized range of a table, extended to two rows when it covers only one
pub(crate) fn table_range(c1: u32, r1: u32, c2: u32, r2: u32) -> Result<String> {
    let r2 = if r1 == r2 { r2 + 1 } else { r2 };
    coordinates_to_range(c1, r1, c2, r2)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAMED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
        <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>\
        <row r=\"1\"><c r=\"A1\" t=\"inlineStr\"><is><t>A</t></is></c>\
        <c r=\"B1\" t=\"inlineStr\"><is><r><t>B</t></r><r><t>&amp;1</t></r></is></c>\
        <c r=\"D1\"><v>4</v></c></row>\
        <row r=\"2\"><c r=\"A2\"><v>1</v></c></row>";

    #[test]
    fn test_header_names_from_streamed_rows() {
        let names = read_header_names(STREAMED.as_bytes(), 1, 1, 4).unwrap();
        assert_eq!(names, vec!["A", "B&1", "Column3", "4"]);

        let names = read_header_names(STREAMED.as_bytes(), 1, 2, 3).unwrap();
        assert_eq!(names, vec!["B&1", "Column2"]);
    }

    #[test]
    fn test_header_before_any_row_is_incomplete() {
        let header_only = "<?xml version=\"1.0\"?>\n<worksheet><sheetData>";
        assert!(matches!(
            read_header_names(header_only.as_bytes(), 1, 1, 3),
            Err(ExcelError::IncompleteDocument(_))
        ));
        // Row 3 was never written
        assert!(matches!(
            read_header_names(STREAMED.as_bytes(), 3, 1, 3),
            Err(ExcelError::IncompleteDocument(_))
        ));
    }

    #[test]
    fn test_table_names() {
        validate_table_name("Sales_2024").unwrap();
        validate_table_name("_hidden.table").unwrap();
        for bad in ["", "1Table", "A1", "R1C1", "R2", "has space", "Tab-le"] {
            assert!(
                matches!(validate_table_name(bad), Err(ExcelError::InvalidTableName(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    fn pending(name: Option<&str>) -> PendingTable {
        PendingTable {
            range: "A1:B2".to_string(),
            name: name.map(str::to_string),
            columns: vec!["A".to_string(), "B".to_string()],
            style_name: None,
            show_first_column: false,
            show_last_column: false,
            show_row_stripes: true,
            show_column_stripes: false,
        }
    }

    #[test]
    fn test_table_names_are_unique() {
        let tables = [pending(None), pending(Some("Table2")), pending(None)];
        let names = resolve_table_names(&[2, 3, 4], &tables, &["Table1".to_string()]).unwrap();
        assert_eq!(names, vec!["Table3", "Table2", "Table4"]);

        let tables = [pending(Some("sales"))];
        assert!(matches!(
            resolve_table_names(&[2], &tables, &["Sales".to_string()]),
            Err(ExcelError::InvalidTableName(name)) if name == "sales"
        ));
    }

    #[test]
    fn test_single_row_range_is_extended() {
        assert_eq!(table_range(1, 1, 3, 1).unwrap(), "A1:C2");
        assert_eq!(table_range(1, 1, 3, 5).unwrap(), "A1:C5");
    }

    #[test]
    fn test_table_part_xml() {
        let table = PendingTable {
            range: "A1:C2".to_string(),
            name: None,
            columns: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            style_name: Some("TableStyleMedium2".to_string()),
            show_first_column: false,
            show_last_column: false,
            show_row_stripes: true,
            show_column_stripes: false,
        };
        let xml = String::from_utf8(table_part_xml(1, "Table1", &table).unwrap()).unwrap();
        assert!(xml.contains("id=\"1\" name=\"Table1\" displayName=\"Table1\" ref=\"A1:C2\">"));
        assert!(xml.contains("<autoFilter ref=\"A1:C2\"/>"));
        assert!(xml.contains(
            "<tableColumns count=\"3\"><tableColumn id=\"1\" name=\"A\"/>\
             <tableColumn id=\"2\" name=\"B\"/><tableColumn id=\"3\" name=\"C\"/></tableColumns>"
        ));
        assert!(xml.contains(
            "<tableStyleInfo name=\"TableStyleMedium2\" showFirstColumn=\"0\" \
             showLastColumn=\"0\" showRowStripes=\"1\" showColumnStripes=\"0\"/>"
        ));
    }
}
