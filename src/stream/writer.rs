//! Streaming worksheet writer
//!
//! A [`StreamWriter`] replaces the data of one worksheet. Rows are encoded
//! as they arrive and appended to a [`SpillBuffer`]; nothing is kept per
//! cell, so memory stays flat no matter how many rows are written. Calling
//! [`StreamWriter::flush`] closes the XML document, adds the deferred
//! sections and stores the result as the sheet part of the [`Workbook`].

use super::encoder::CellEncoder;
use super::sections::{DeferredSections, PendingTable, SheetLayout};
use super::spill_buffer::SpillBuffer;
use super::table::{
    read_header_names, resolve_table_names, table_part_xml, table_range, validate_table_name,
};
use super::xml_writer::XmlWriter;
use crate::cell_ref::{cell_name_to_coordinates, column_number_to_name, range_to_coordinates};
use crate::error::{ExcelError, Result};
use crate::types::{CellInput, Panes, RowOpts, Table};
use crate::workbook::Workbook;
use crate::{MAX_COLUMNS, MAX_OUTLINE_LEVEL, MAX_ROW_HEIGHT};
use std::path::PathBuf;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

/// Column letters computed up front; wider rows fall back to computing them
const COLUMN_NAME_CACHE: u32 = 256;

/// Append-only writer for the rows of one worksheet
///
/// Obtained from [`Workbook::new_stream_writer`]. Rows must be written in
/// strictly ascending order. Column widths and panes must be configured
/// before the first row.
pub struct StreamWriter {
    sheet_name: String,
    sheet_path: String,
    layout: SheetLayout,
    sections: DeferredSections,
    raw_data: SpillBuffer,
    encoder: CellEncoder,
    last_row: u32,
    sheet_data_started: bool,
    finished: bool,
    row_buffer: Vec<u8>,
    column_names: Vec<String>,
}

impl StreamWriter {
    pub(crate) fn new(
        sheet_name: String,
        sheet_path: String,
        sheet_xml: &[u8],
        date1904: bool,
        spill_threshold: usize,
    ) -> Result<Self> {
        let layout = SheetLayout::parse(sheet_xml)?;

        let mut raw_data = SpillBuffer::with_threshold(spill_threshold);
        raw_data.write(XML_DECLARATION.as_bytes())?;
        raw_data.write(layout.root().as_bytes())?;

        let column_names = (1..=COLUMN_NAME_CACHE)
            .map(column_number_to_name)
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "opened stream writer for sheet {} ({})",
            sheet_name,
            sheet_path
        );

        Ok(StreamWriter {
            sheet_name,
            sheet_path,
            layout,
            sections: DeferredSections::new(),
            raw_data,
            encoder: CellEncoder::new(date1904),
            last_row: 0,
            sheet_data_started: false,
            finished: false,
            row_buffer: Vec::with_capacity(4096),
            column_names,
        })
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Highest row number written so far (0 before the first row)
    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    /// Whether [`flush`](Self::flush) completed; the writer is unusable afterwards
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Session buffer holding the XML written so far
    pub fn buffer(&self) -> &SpillBuffer {
        &self.raw_data
    }

    pub fn buffer_mut(&mut self) -> &mut SpillBuffer {
        &mut self.raw_data
    }

    /// Change the size at which buffered XML moves to a temporary file
    pub fn set_spill_threshold(&mut self, bytes: usize) {
        self.raw_data.set_threshold(bytes);
    }

    /// Directory for the spill file (defaults to the system temp dir)
    pub fn set_spill_dir(&mut self, dir: Option<PathBuf>) {
        self.raw_data.set_spill_dir(dir);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(ExcelError::ResourceClosed("stream writer has been flushed"));
        }
        Ok(())
    }

    /// Write one row starting at `cell`.
    ///
    /// `values[i]` lands in the column `i` positions right of `cell`. Empty
    /// values leave their position blank. The row is validated completely
    /// before anything is appended, so a rejected row leaves no trace.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use sheetstream::{Cell, RowOpts, Workbook};
    ///
    /// let wb = Workbook::new()?;
    /// let mut writer = wb.new_stream_writer("Sheet1")?;
    /// writer.set_row(
    ///     "A1",
    ///     &["Name".into(), 42.into(), Cell::formula("SUM(B1:B1)").into()],
    ///     RowOpts::default(),
    /// )?;
    /// # Ok::<(), sheetstream::ExcelError>(())
    /// ```
    pub fn set_row(&mut self, cell: &str, values: &[CellInput], opts: RowOpts) -> Result<()> {
        self.ensure_open()?;

        let (col, row) = cell_name_to_coordinates(cell)?;
        if row <= self.last_row {
            return Err(ExcelError::NonAscendingRow(row));
        }
        if let Some(height) = opts.height {
            if !(0.0..=MAX_ROW_HEIGHT).contains(&height) {
                return Err(ExcelError::MaxRowHeight);
            }
        }
        if opts.outline_level > MAX_OUTLINE_LEVEL {
            return Err(ExcelError::OutlineLevel);
        }
        if !values.is_empty() && col as u64 + values.len() as u64 - 1 > MAX_COLUMNS as u64 {
            return Err(ExcelError::ColumnNumber);
        }

        let mut row_buffer = std::mem::take(&mut self.row_buffer);
        row_buffer.clear();
        let encoded = self.encode_row(&mut row_buffer, col, row, values, &opts);
        let result = encoded.and_then(|_| {
            self.ensure_sheet_data_started()?;
            self.raw_data.write(&row_buffer)
        });
        self.row_buffer = row_buffer;
        result?;

        self.last_row = row;
        Ok(())
    }

    fn encode_row(
        &self,
        out: &mut Vec<u8>,
        col: u32,
        row: u32,
        values: &[CellInput],
        opts: &RowOpts,
    ) -> Result<()> {
        let mut xml = XmlWriter::new(out);
        xml.start_element("row")?;
        xml.attribute_int("r", row as i64)?;
        if opts.style_id > 0 {
            xml.attribute_int("s", opts.style_id as i64)?;
            xml.attribute("customFormat", "1")?;
        }
        if let Some(height) = opts.height {
            xml.attribute("ht", &height.to_string())?;
            xml.attribute("customHeight", "1")?;
        }
        if opts.hidden {
            xml.attribute("hidden", "1")?;
        }
        if opts.outline_level > 0 {
            xml.attribute_int("outlineLevel", opts.outline_level as i64)?;
        }
        xml.close_start_tag()?;

        for (i, input) in values.iter().enumerate() {
            if input.is_absent() {
                continue;
            }
            let col_num = col + i as u32;
            let computed;
            let col_name = match self.column_names.get(col_num as usize - 1) {
                Some(name) => name.as_str(),
                None => {
                    computed = column_number_to_name(col_num)?;
                    computed.as_str()
                }
            };
            self.encoder
                .encode(&mut xml, col_name, row, input, opts.style_id)?;
        }

        xml.end_element("row")?;
        xml.flush()
    }

    /// Write everything in front of the first row, once
    fn ensure_sheet_data_started(&mut self) -> Result<()> {
        if self.sheet_data_started {
            return Ok(());
        }
        let mut head = Vec::new();
        {
            let mut xml = XmlWriter::new(&mut head);
            self.sections.write_pre_row(&mut xml, &self.layout)?;
            xml.write_str("<sheetData>")?;
            xml.flush()?;
        }
        self.raw_data.write(&head)?;
        self.sheet_data_started = true;
        self.sections.mark_rows_started();
        Ok(())
    }

    /// Set the width of columns `min..=max` (1-based, either order).
    ///
    /// Only allowed before the first row. Ranges must not overlap.
    pub fn set_col_width(&mut self, min: u32, max: u32, width: f64) -> Result<()> {
        self.ensure_open()?;
        self.sections.set_col_width(min, max, width)
    }

    /// Configure freeze or split panes. Only allowed before the first row;
    /// the last configuration wins.
    pub fn set_panes(&mut self, panes: Option<&Panes>) -> Result<()> {
        self.ensure_open()?;
        self.sections.set_panes(panes)
    }

    /// Merge the rectangle spanned by two corner cells
    pub fn merge_cell(&mut self, top_left: &str, bottom_right: &str) -> Result<()> {
        self.ensure_open()?;
        self.sections.merge_cell(top_left, bottom_right)
    }

    /// Insert a manual page break above and left of `cell`
    pub fn insert_page_break(&mut self, cell: &str) -> Result<()> {
        self.ensure_open()?;
        self.sections.insert_page_break(cell)
    }

    /// Register a table over rows that were already written.
    ///
    /// The first row of the range is the header; its cell texts become the
    /// column names. A single-row range is extended by one row.
    pub fn add_table(&mut self, table: &Table) -> Result<()> {
        self.ensure_open()?;

        let (c1, r1, c2, r2) = range_to_coordinates(&table.range)?;
        let range = table_range(c1, r1, c2, r2)?;
        if let Some(name) = &table.name {
            validate_table_name(name)?;
            let duplicate = self
                .sections
                .tables()
                .iter()
                .filter_map(|t| t.name.as_deref())
                .any(|n| n.eq_ignore_ascii_case(name));
            if duplicate {
                return Err(ExcelError::InvalidTableName(name.clone()));
            }
        }

        let columns = read_header_names(self.raw_data.reader()?, r1, c1, c2)?;
        self.sections.add_table(PendingTable {
            range,
            name: table.name.clone(),
            columns,
            style_name: table.style_name.clone(),
            show_first_column: table.show_first_column,
            show_last_column: table.show_last_column,
            show_row_stripes: table.show_row_stripes,
            show_column_stripes: table.show_column_stripes,
        });
        Ok(())
    }

    /// Finish the sheet and store it in `workbook`.
    ///
    /// After success the session buffer is gone and every further call
    /// fails with [`ExcelError::ResourceClosed`]. On failure the writer is
    /// not marked finished.
    pub fn flush(&mut self, workbook: &mut Workbook) -> Result<()> {
        self.ensure_open()?;
        if !workbook.has_part(&self.sheet_path) {
            return Err(ExcelError::SheetNotExist(self.sheet_name.clone()));
        }

        let plan = workbook.plan_tables(&self.sheet_path, self.sections.tables().len())?;
        let rids: Vec<String> = plan.iter().map(|(_, rid)| rid.clone()).collect();
        let names = if plan.is_empty() {
            Vec::new()
        } else {
            let ids: Vec<u32> = plan.iter().map(|(id, _)| *id).collect();
            resolve_table_names(&ids, self.sections.tables(), &workbook.table_names()?)?
        };

        self.ensure_sheet_data_started()?;
        let mut tail = Vec::new();
        {
            let mut xml = XmlWriter::new(&mut tail);
            xml.write_str("</sheetData>")?;
            self.sections.write_post_row(&mut xml, &self.layout, &rids)?;
            xml.flush()?;
        }
        self.raw_data.write(&tail)?;
        self.raw_data.close_for_write()?;

        let mut sheet = Vec::with_capacity(self.raw_data.len() as usize);
        self.raw_data.drain_to(&mut sheet)?;

        let mut parts = Vec::with_capacity(plan.len());
        for (((id, rid), name), table) in plan.into_iter().zip(&names).zip(self.sections.tables()) {
            parts.push((id, rid, table_part_xml(id, name, table)?));
        }
        workbook.commit_tables(&self.sheet_path, parts)?;

        let size = sheet.len();
        workbook.set_part(&self.sheet_path, sheet);
        self.raw_data.dispose()?;
        self.finished = true;

        log::debug!(
            "flushed sheet {}: {} rows, {} bytes",
            self.sheet_name,
            self.last_row,
            size
        );
        Ok(())
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("sheet_name", &self.sheet_name)
            .field("sheet_path", &self.sheet_path)
            .field("last_row", &self.last_row)
            .field("finished", &self.finished)
            .field("buffer", &self.raw_data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, CellValue};
    use std::io::Read;

    fn buffered_xml(writer: &mut StreamWriter) -> String {
        let mut out = String::new();
        writer
            .buffer_mut()
            .reader()
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    fn sheet_xml(workbook: &Workbook) -> String {
        String::from_utf8(workbook.part("xl/worksheets/sheet1.xml").unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_row_attributes() {
        let wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer
            .set_row(
                "A4",
                &[Cell::styled(1).into()],
                RowOpts::new().height(45.0).style(2),
            )
            .unwrap();
        writer
            .set_row("A7", &[], RowOpts::new().height(20.0).hidden(true))
            .unwrap();
        writer
            .set_row("B8", &["x".into()], RowOpts::new().outline_level(7))
            .unwrap();

        let xml = buffered_xml(&mut writer);
        assert!(xml.contains(
            "<row r=\"4\" s=\"2\" customFormat=\"1\" ht=\"45\" customHeight=\"1\"><c r=\"A4\" s=\"1\"/></row>"
        ));
        assert!(xml.contains("<row r=\"7\" ht=\"20\" customHeight=\"1\" hidden=\"1\"></row>"));
        assert!(xml.contains(
            "<row r=\"8\" outlineLevel=\"7\"><c r=\"B8\" t=\"inlineStr\"><is><t>x</t></is></c></row>"
        ));
    }

    #[test]
    fn test_rejected_rows_leave_no_trace() {
        let wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer.set_row("A1", &["a".into()], RowOpts::default()).unwrap();
        let before = writer.buffer().len();

        assert!(matches!(
            writer.set_row("A1", &["b".into()], RowOpts::default()),
            Err(ExcelError::NonAscendingRow(1))
        ));
        assert!(matches!(
            writer.set_row("A2", &[], RowOpts::new().height(MAX_ROW_HEIGHT + 1.0)),
            Err(ExcelError::MaxRowHeight)
        ));
        assert!(matches!(
            writer.set_row("A2", &[], RowOpts::new().outline_level(8)),
            Err(ExcelError::OutlineLevel)
        ));
        assert!(matches!(
            writer.set_row("XFD2", &["a".into(), "b".into()], RowOpts::default()),
            Err(ExcelError::ColumnNumber)
        ));
        assert!(matches!(
            writer.set_row("A", &[], RowOpts::default()),
            Err(ExcelError::InvalidCellReference { .. })
        ));

        assert_eq!(writer.buffer().len(), before);
        assert_eq!(writer.last_row(), 1);
        writer.set_row("A2", &["b".into()], RowOpts::default()).unwrap();
    }

    #[test]
    fn test_failed_spill_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer.set_spill_threshold(300);
        writer.set_spill_dir(Some(dir.path().join("missing")));
        let before = writer.buffer().len();

        let long = "x".repeat(400);
        assert!(matches!(
            writer.set_row("A1", &[long.as_str().into()], RowOpts::default()),
            Err(ExcelError::IoError(_))
        ));
        assert_eq!(writer.buffer().len(), before);
        assert_eq!(writer.last_row(), 0);

        writer.set_spill_dir(None);
        writer.set_row("A1", &["x".into()], RowOpts::default()).unwrap();
        let xml = buffered_xml(&mut writer);
        assert_eq!(xml.matches("<sheetData>").count(), 1);
        assert_eq!(xml.matches("<sheetViews>").count(), 1);
        assert_eq!(xml.matches("<row ").count(), 1);
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer
            .set_row(
                "A1",
                &[
                    CellValue::Empty.into(),
                    "B".into(),
                    Cell::default().into(),
                    CellValue::Empty.into(),
                ],
                RowOpts::new().style(3),
            )
            .unwrap();
        let xml = buffered_xml(&mut writer);
        assert!(xml.contains(
            "<row r=\"1\" s=\"3\" customFormat=\"1\"><c r=\"B1\" s=\"3\" t=\"inlineStr\"><is><t>B</t></is></c></row>"
        ));
    }

    #[test]
    fn test_pre_row_features_close_after_first_row() {
        let wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer.set_col_width(3, 2, 20.0).unwrap();
        writer.set_row("A1", &["x".into()], RowOpts::default()).unwrap();

        assert!(matches!(
            writer.set_col_width(2, 3, 20.0),
            Err(ExcelError::FeatureAlreadyStreamed(_))
        ));
        assert!(matches!(
            writer.set_panes(Some(&Panes::default())),
            Err(ExcelError::FeatureAlreadyStreamed(_))
        ));

        let xml = buffered_xml(&mut writer);
        assert!(xml.contains(
            "<cols><col min=\"2\" max=\"3\" width=\"20\" customWidth=\"1\"/></cols><sheetData>"
        ));
    }

    #[test]
    fn test_add_table_before_rows_fails() {
        let wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        assert!(matches!(
            writer.add_table(&Table::new("A1:C2")),
            Err(ExcelError::IncompleteDocument(_))
        ));
    }

    #[test]
    fn test_flush_finishes_session() {
        let mut wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer
            .set_row("A1", &["A".into(), "B".into(), "C".into()], RowOpts::default())
            .unwrap();
        writer.add_table(&Table::new("A1:C1")).unwrap();
        writer.merge_cell("A2", "C2").unwrap();
        writer.flush(&mut wb).unwrap();

        assert!(writer.is_finished());
        assert!(writer.buffer().is_disposed());
        assert!(matches!(
            writer.set_row("A2", &[], RowOpts::default()),
            Err(ExcelError::ResourceClosed(_))
        ));
        assert!(matches!(writer.flush(&mut wb), Err(ExcelError::ResourceClosed(_))));
        assert!(matches!(
            writer.merge_cell("A1", "B1"),
            Err(ExcelError::ResourceClosed(_))
        ));

        let xml = sheet_xml(&wb);
        assert!(xml.ends_with(
            "</sheetData><mergeCells count=\"1\"><mergeCell ref=\"A2:C2\"/></mergeCells>\
             <pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>\
             <tableParts count=\"1\"><tablePart r:id=\"rId1\"/></tableParts></worksheet>"
        ));
        let table = String::from_utf8(wb.part("xl/tables/table1.xml").unwrap().to_vec()).unwrap();
        assert!(table.contains("ref=\"A1:C2\""));
        assert!(table.contains("<tableColumn id=\"3\" name=\"C\"/>"));
    }

    #[test]
    fn test_table_names_must_be_unique() {
        let mut wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer
            .set_row("A1", &["A".into(), "B".into()], RowOpts::default())
            .unwrap();
        writer.add_table(&Table::new("A1:B2").with_name("Sales")).unwrap();
        assert!(matches!(
            writer.add_table(&Table::new("A1:B3").with_name("SALES")),
            Err(ExcelError::InvalidTableName(_))
        ));
        writer.add_table(&Table::new("A1:B2").with_name("Table2")).unwrap();
        writer.add_table(&Table::new("A1:B2")).unwrap();
        writer.flush(&mut wb).unwrap();

        let table3 = String::from_utf8(wb.part("xl/tables/table3.xml").unwrap().to_vec()).unwrap();
        assert!(table3.contains("name=\"Table3\""));
        assert_eq!(wb.table_names().unwrap(), vec!["Sales", "Table2", "Table3"]);

        // A later session cannot reuse a name stored in the workbook
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer
            .set_row("A1", &["A".into(), "B".into()], RowOpts::default())
            .unwrap();
        writer.add_table(&Table::new("A1:B2").with_name("sales")).unwrap();
        assert!(matches!(
            writer.flush(&mut wb),
            Err(ExcelError::InvalidTableName(_))
        ));
        assert!(!writer.is_finished());
    }

    #[test]
    fn test_flush_without_rows_writes_empty_sheet_data() {
        let mut wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer.flush(&mut wb).unwrap();
        let xml = sheet_xml(&wb);
        assert!(xml.contains("<sheetData></sheetData>"));
        assert!(!xml.contains("<dimension"));
    }

    #[test]
    fn test_flush_fails_on_disposed_buffer() {
        let mut wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer.set_row("A1", &["x".into()], RowOpts::default()).unwrap();
        writer.buffer_mut().dispose().unwrap();

        assert!(matches!(writer.flush(&mut wb), Err(ExcelError::ResourceClosed(_))));
        assert!(!writer.is_finished());
    }

    #[test]
    fn test_spilled_session_produces_same_sheet() {
        let mut wb = Workbook::new().unwrap();
        let mut writer = wb.new_stream_writer("Sheet1").unwrap();
        writer.set_spill_threshold(256);
        for r in 1..=200u32 {
            let cell = format!("A{}", r);
            writer
                .set_row(&cell, &[r.into(), "text".into()], RowOpts::default())
                .unwrap();
        }
        assert!(writer.buffer().is_spilled());
        let path = writer.buffer().path().unwrap().to_path_buf();
        writer.flush(&mut wb).unwrap();

        assert!(!path.exists());
        let xml = sheet_xml(&wb);
        assert!(xml.contains("<row r=\"200\"><c r=\"A200\"><v>200</v></c>"));
        assert_eq!(xml.matches("<row ").count(), 200);
    }
}
