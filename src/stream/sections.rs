//! Worksheet sections that cannot be written at call time
//!
//! Column widths and panes sit in front of `<sheetData>`, so they have to be
//! known before the first row goes out. Merged cells, page breaks and table
//! parts come after it and are collected until the session is flushed.
//! Elements already present in the persisted sheet are kept and re-emitted
//! in schema order around the streamed ones.

use super::xml_writer::XmlWriter;
use crate::cell_ref::{cell_name_to_coordinates, coordinates_to_range};
use crate::error::{ExcelError, Result};
use crate::types::Panes;
use crate::{MAX_COLUMNS, MAX_COLUMN_WIDTH, TOTAL_ROWS};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Write;

const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// Top-level worksheet children in the order the schema requires
const SCHEMA_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

fn schema_position(name: &str) -> usize {
    SCHEMA_ORDER
        .iter()
        .position(|n| *n == name)
        .unwrap_or(SCHEMA_ORDER.len() - 1)
}

/// Top-level structure of the worksheet XML that existed before streaming
#[derive(Debug, Clone)]
pub(crate) struct SheetLayout {
    /// The `<worksheet ...>` start tag
    root: String,
    /// Qualified name of the root element, used for the end tag
    root_name: String,
    /// Raw top-level elements as `(local name, xml)`
    elements: Vec<(String, String)>,
}

impl SheetLayout {
    /// Parse a persisted worksheet part.
    ///
    /// Fails when the bytes are not UTF-8 or not well-formed XML.
    pub(crate) fn parse(xml: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(xml)?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().check_end_names = true;

        let mut root: Option<String> = None;
        let mut root_name = String::from("worksheet");
        let mut elements = Vec::new();
        let mut depth = 0usize;

        loop {
            let start = reader.buffer_position() as usize;
            match reader.read_event()? {
                Event::Start(e) if depth == 0 => {
                    let end = reader.buffer_position() as usize;
                    root = Some(text[start..end].to_string());
                    root_name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    depth = 1;
                }
                Event::Empty(e) if depth == 0 => {
                    // <worksheet/>: reopen it so children can follow
                    root_name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    let end = reader.buffer_position() as usize;
                    let tag = text[start..end].trim_end_matches("/>").trim_end();
                    root = Some(format!("{}>", tag));
                }
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    reader.read_to_end(e.name())?;
                    let end = reader.buffer_position() as usize;
                    elements.push((name, text[start..end].to_string()));
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    let end = reader.buffer_position() as usize;
                    elements.push((name, text[start..end].to_string()));
                }
                Event::End(_) => depth = 0,
                Event::Eof => break,
                _ => {}
            }
        }

        let mut root = root.unwrap_or_else(|| {
            "<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">"
                .to_string()
        });
        if !root.contains("xmlns:r=") {
            let at = root.len() - 1;
            root.insert_str(at, &format!(" xmlns:r=\"{}\"", RELATIONSHIPS_NS));
        }
        // Streamed elements are unprefixed and need the main namespace as default
        if root_name.contains(':') && !root.contains(" xmlns=") {
            let at = root.len() - 1;
            root.insert_str(at, &format!(" xmlns=\"{}\"", SPREADSHEET_NS));
        }

        Ok(SheetLayout {
            root,
            root_name,
            elements,
        })
    }

    pub(crate) fn root(&self) -> &str {
        &self.root
    }

    pub(crate) fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Relationship ids of the `tablePart` entries already in the sheet
    fn table_part_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for raw in self.existing("tableParts") {
            let mut reader = Reader::from_str(raw);
            loop {
                match reader.read_event()? {
                    Event::Start(e) | Event::Empty(e)
                        if e.local_name().as_ref() == b"tablePart" =>
                    {
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.local_name().as_ref() == b"id" {
                                ids.push(attr.unescape_value()?.into_owned());
                            }
                        }
                    }
                    Event::Eof => break,
                    _ => {}
                }
            }
        }
        Ok(ids)
    }

    fn existing(&self, name: &str) -> impl Iterator<Item = &str> {
        let name = name.to_string();
        self.elements
            .iter()
            .filter(move |(n, _)| *n == name)
            .map(|(_, xml)| xml.as_str())
    }

    /// Whether the persisted view marked this sheet as the selected tab
    fn tab_selected(&self) -> bool {
        self.existing("sheetViews")
            .any(|xml| xml.contains("tabSelected=\"1\"") || xml.contains("tabSelected=\"true\""))
    }

    /// Names of existing elements that are not in the schema list
    fn unknown(&self) -> impl Iterator<Item = &(String, String)> {
        self.elements
            .iter()
            .filter(|(n, _)| !SCHEMA_ORDER.contains(&n.as_str()))
    }
}

/// Column width over an inclusive 1-based column range
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ColWidth {
    pub min: u32,
    pub max: u32,
    pub width: f64,
}

/// A table registered during the session, materialized at flush
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingTable {
    pub range: String,
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub style_name: Option<String>,
    pub show_first_column: bool,
    pub show_last_column: bool,
    pub show_row_stripes: bool,
    pub show_column_stripes: bool,
}

/// Deferred worksheet sections of one streaming session
#[derive(Debug, Default)]
pub(crate) struct DeferredSections {
    rows_started: bool,
    cols: Vec<ColWidth>,
    panes: Option<Panes>,
    merge_cells: Vec<String>,
    row_breaks: Vec<u32>,
    col_breaks: Vec<u32>,
    tables: Vec<PendingTable>,
}

impl DeferredSections {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Close the window for pre-row features
    pub(crate) fn mark_rows_started(&mut self) {
        self.rows_started = true;
    }

    pub(crate) fn set_col_width(&mut self, min: u32, max: u32, width: f64) -> Result<()> {
        if self.rows_started {
            return Err(ExcelError::FeatureAlreadyStreamed("set_col_width"));
        }
        let (min, max) = if min > max { (max, min) } else { (min, max) };
        if min < 1 || max > MAX_COLUMNS {
            return Err(ExcelError::ColumnNumber);
        }
        if !(0.0..=MAX_COLUMN_WIDTH).contains(&width) {
            return Err(ExcelError::ColumnWidth);
        }
        if self.cols.iter().any(|c| min <= c.max && c.min <= max) {
            return Err(ExcelError::ColumnRangeOverlap { min, max });
        }
        self.cols.push(ColWidth { min, max, width });
        Ok(())
    }

    pub(crate) fn set_panes(&mut self, panes: Option<&Panes>) -> Result<()> {
        let panes = panes.ok_or(ExcelError::InvalidParameter("panes must not be empty"))?;
        if self.rows_started {
            return Err(ExcelError::FeatureAlreadyStreamed("set_panes"));
        }
        if let Some(cell) = &panes.top_left_cell {
            cell_name_to_coordinates(cell)?;
        }
        for selection in &panes.selections {
            if !selection.active_cell.is_empty() {
                cell_name_to_coordinates(&selection.active_cell)?;
            }
        }
        self.panes = Some(panes.clone());
        Ok(())
    }

    pub(crate) fn merge_cell(&mut self, top_left: &str, bottom_right: &str) -> Result<()> {
        let (c1, r1) = cell_name_to_coordinates(top_left)?;
        let (c2, r2) = cell_name_to_coordinates(bottom_right)?;
        let range = coordinates_to_range(c1.min(c2), r1.min(r2), c1.max(c2), r1.max(r2))?;
        self.merge_cells.push(range);
        Ok(())
    }

    pub(crate) fn insert_page_break(&mut self, cell: &str) -> Result<()> {
        let (col, row) = cell_name_to_coordinates(cell)?;
        let (row_id, col_id) = (row - 1, col - 1);
        if row_id != 0 && !self.row_breaks.contains(&row_id) {
            self.row_breaks.push(row_id);
        }
        if col_id != 0 && !self.col_breaks.contains(&col_id) {
            self.col_breaks.push(col_id);
        }
        Ok(())
    }

    pub(crate) fn add_table(&mut self, table: PendingTable) {
        self.tables.push(table);
    }

    pub(crate) fn tables(&self) -> &[PendingTable] {
        &self.tables
    }

    /// Write everything that precedes `<sheetData>`
    pub(crate) fn write_pre_row<W: Write>(
        &self,
        xml: &mut XmlWriter<W>,
        layout: &SheetLayout,
    ) -> Result<()> {
        for name in &SCHEMA_ORDER[..schema_position("sheetData")] {
            match *name {
                // Stale once rows are replaced
                "dimension" => {}
                "sheetViews" if self.panes.is_some() => {
                    self.write_sheet_views(xml, layout.tab_selected())?;
                }
                "cols" if !self.cols.is_empty() => self.write_cols(xml)?,
                _ => {
                    for raw in layout.existing(name) {
                        xml.write_str(raw)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Write everything that follows `</sheetData>`, then close the root
    pub(crate) fn write_post_row<W: Write>(
        &self,
        xml: &mut XmlWriter<W>,
        layout: &SheetLayout,
        table_rids: &[String],
    ) -> Result<()> {
        for name in &SCHEMA_ORDER[schema_position("sheetData") + 1..] {
            match *name {
                "mergeCells" if !self.merge_cells.is_empty() => self.write_merge_cells(xml)?,
                "rowBreaks" if !self.row_breaks.is_empty() => {
                    write_breaks(xml, "rowBreaks", &self.row_breaks, MAX_COLUMNS - 1)?
                }
                "colBreaks" if !self.col_breaks.is_empty() => {
                    write_breaks(xml, "colBreaks", &self.col_breaks, TOTAL_ROWS - 1)?
                }
                "tableParts" if !table_rids.is_empty() => {
                    let mut rids = layout.table_part_ids()?;
                    rids.extend(table_rids.iter().cloned());
                    write_table_parts(xml, &rids)?
                }
                "extLst" => {
                    for (_, raw) in layout.unknown() {
                        xml.write_str(raw)?;
                    }
                    for raw in layout.existing(name) {
                        xml.write_str(raw)?;
                    }
                }
                _ => {
                    for raw in layout.existing(name) {
                        xml.write_str(raw)?;
                    }
                }
            }
        }
        xml.end_element(layout.root_name())
    }

    fn write_cols<W: Write>(&self, xml: &mut XmlWriter<W>) -> Result<()> {
        let mut cols = self.cols.clone();
        cols.sort_by_key(|c| c.min);

        xml.start_element("cols")?;
        xml.close_start_tag()?;
        for col in cols {
            xml.start_element("col")?;
            xml.attribute_int("min", col.min as i64)?;
            xml.attribute_int("max", col.max as i64)?;
            xml.attribute("width", &col.width.to_string())?;
            xml.attribute("customWidth", "1")?;
            xml.write_raw(b"/>")?;
        }
        xml.end_element("cols")
    }

    fn write_sheet_views<W: Write>(&self, xml: &mut XmlWriter<W>, tab_selected: bool) -> Result<()> {
        let Some(panes) = &self.panes else {
            return Ok(());
        };

        xml.write_str("<sheetViews>")?;
        xml.start_element("sheetView")?;
        if tab_selected {
            xml.attribute("tabSelected", "1")?;
        }
        xml.attribute("workbookViewId", "0")?;
        xml.close_start_tag()?;

        xml.start_element("pane")?;
        if panes.x_split > 0 {
            xml.attribute_int("xSplit", panes.x_split as i64)?;
        }
        if panes.y_split > 0 {
            xml.attribute_int("ySplit", panes.y_split as i64)?;
        }
        if let Some(cell) = &panes.top_left_cell {
            xml.attribute("topLeftCell", cell)?;
        }
        if let Some(active) = &panes.active_pane {
            xml.attribute("activePane", active)?;
        }
        if panes.freeze {
            xml.attribute("state", "frozen")?;
        } else if panes.split {
            xml.attribute("state", "split")?;
        }
        xml.write_raw(b"/>")?;

        for selection in &panes.selections {
            xml.start_element("selection")?;
            if !selection.pane.is_empty() {
                xml.attribute("pane", &selection.pane)?;
            }
            if !selection.active_cell.is_empty() {
                xml.attribute("activeCell", &selection.active_cell)?;
            }
            if !selection.sqref.is_empty() {
                xml.attribute("sqref", &selection.sqref)?;
            }
            xml.write_raw(b"/>")?;
        }

        xml.end_element("sheetView")?;
        xml.end_element("sheetViews")
    }

    fn write_merge_cells<W: Write>(&self, xml: &mut XmlWriter<W>) -> Result<()> {
        xml.start_element("mergeCells")?;
        xml.attribute_int("count", self.merge_cells.len() as i64)?;
        xml.close_start_tag()?;
        for range in &self.merge_cells {
            xml.start_element("mergeCell")?;
            xml.attribute("ref", range)?;
            xml.write_raw(b"/>")?;
        }
        xml.end_element("mergeCells")
    }
}

fn write_breaks<W: Write>(
    xml: &mut XmlWriter<W>,
    tag: &str,
    ids: &[u32],
    max: u32,
) -> Result<()> {
    xml.start_element(tag)?;
    xml.attribute_int("count", ids.len() as i64)?;
    xml.attribute_int("manualBreakCount", ids.len() as i64)?;
    xml.close_start_tag()?;
    for id in ids {
        xml.start_element("brk")?;
        xml.attribute_int("id", *id as i64)?;
        xml.attribute_int("max", max as i64)?;
        xml.attribute("man", "1")?;
        xml.write_raw(b"/>")?;
    }
    xml.end_element(tag)
}

fn write_table_parts<W: Write>(xml: &mut XmlWriter<W>, rids: &[String]) -> Result<()> {
    xml.start_element("tableParts")?;
    xml.attribute_int("count", rids.len() as i64)?;
    xml.close_start_tag()?;
    for rid in rids {
        xml.start_element("tablePart")?;
        xml.attribute("r:id", rid)?;
        xml.write_raw(b"/>")?;
    }
    xml.end_element("tableParts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaneSelection;

    const DEFAULT_SHEET: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
        <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
        xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
        <dimension ref=\"A1\"/><sheetViews><sheetView tabSelected=\"1\" workbookViewId=\"0\"/></sheetViews>\
        <sheetFormatPr defaultRowHeight=\"15\"/><sheetData/>\
        <pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>\
        </worksheet>";

    fn render(sections: &DeferredSections, layout: &SheetLayout, rids: &[String]) -> String {
        let mut out = Vec::new();
        {
            let mut xml = XmlWriter::new(&mut out);
            sections.write_pre_row(&mut xml, layout).unwrap();
            xml.write_str("<sheetData></sheetData>").unwrap();
            sections.write_post_row(&mut xml, layout, rids).unwrap();
            xml.flush().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_layout_keeps_existing_elements() {
        let layout = SheetLayout::parse(DEFAULT_SHEET.as_bytes()).unwrap();
        assert!(layout.root().starts_with("<worksheet "));
        assert!(layout.existing("pageMargins").next().is_some());
        assert!(layout.tab_selected());

        let xml = render(&DeferredSections::new(), &layout, &[]);
        assert!(!xml.contains("<dimension"));
        assert!(xml.starts_with("<sheetViews>"));
        assert!(xml.contains("<sheetFormatPr defaultRowHeight=\"15\"/><sheetData>"));
        assert!(xml.ends_with("footer=\"0.3\"/></worksheet>"));
    }

    #[test]
    fn test_layout_rejects_malformed_xml() {
        let invalid_utf8 = b"\x8f\xe0\xa8\xa2\xa5\xe2 \xac\xa8\xe0";
        assert!(matches!(
            SheetLayout::parse(invalid_utf8),
            Err(ExcelError::MalformedXml(_))
        ));
        assert!(matches!(
            SheetLayout::parse(b"<worksheet><sheetData></cols></worksheet>"),
            Err(ExcelError::MalformedXml(_))
        ));
    }

    #[test]
    fn test_layout_adds_relationship_namespace() {
        let layout = SheetLayout::parse(b"<worksheet xmlns=\"urn:x\"/>").unwrap();
        assert_eq!(
            layout.root(),
            format!("<worksheet xmlns=\"urn:x\" xmlns:r=\"{}\">", RELATIONSHIPS_NS)
        );
    }

    #[test]
    fn test_col_width_validation() {
        let mut sections = DeferredSections::new();
        sections.set_col_width(3, 2, 20.0).unwrap();
        assert!(matches!(sections.set_col_width(0, 3, 20.0), Err(ExcelError::ColumnNumber)));
        assert!(matches!(
            sections.set_col_width(MAX_COLUMNS + 1, 3, 20.0),
            Err(ExcelError::ColumnNumber)
        ));
        assert!(matches!(
            sections.set_col_width(5, 6, MAX_COLUMN_WIDTH + 1.0),
            Err(ExcelError::ColumnWidth)
        ));
        assert!(matches!(
            sections.set_col_width(3, 4, 10.0),
            Err(ExcelError::ColumnRangeOverlap { min: 3, max: 4 })
        ));

        sections.mark_rows_started();
        assert!(matches!(
            sections.set_col_width(7, 8, 20.0),
            Err(ExcelError::FeatureAlreadyStreamed(_))
        ));
    }

    #[test]
    fn test_panes_rules() {
        let mut sections = DeferredSections::new();
        let panes = Panes {
            freeze: true,
            x_split: 1,
            top_left_cell: Some("B1".to_string()),
            active_pane: Some("topRight".to_string()),
            selections: vec![PaneSelection {
                sqref: "K16".to_string(),
                active_cell: "K16".to_string(),
                pane: "topRight".to_string(),
            }],
            ..Default::default()
        };
        sections.set_panes(Some(&panes)).unwrap();
        assert!(matches!(
            sections.set_panes(None),
            Err(ExcelError::InvalidParameter(_))
        ));

        let layout = SheetLayout::parse(DEFAULT_SHEET.as_bytes()).unwrap();
        let xml = render(&sections, &layout, &[]);
        assert!(xml.starts_with(
            "<sheetViews><sheetView tabSelected=\"1\" workbookViewId=\"0\">\
             <pane xSplit=\"1\" topLeftCell=\"B1\" activePane=\"topRight\" state=\"frozen\"/>\
             <selection pane=\"topRight\" activeCell=\"K16\" sqref=\"K16\"/></sheetView></sheetViews>"
        ));

        sections.mark_rows_started();
        assert!(matches!(
            sections.set_panes(Some(&panes)),
            Err(ExcelError::FeatureAlreadyStreamed(_))
        ));
    }

    #[test]
    fn test_post_row_sections_in_schema_order() {
        let mut sections = DeferredSections::new();
        sections.merge_cell("D1", "A1").unwrap();
        sections.insert_page_break("C5").unwrap();
        sections.insert_page_break("C5").unwrap();
        sections.insert_page_break("A1").unwrap();

        let layout = SheetLayout::parse(DEFAULT_SHEET.as_bytes()).unwrap();
        let xml = render(&sections, &layout, &["rId1".to_string()]);

        let merge = xml.find("<mergeCells count=\"1\"><mergeCell ref=\"A1:D1\"/></mergeCells>").unwrap();
        let margins = xml.find("<pageMargins").unwrap();
        let row_breaks = xml
            .find("<rowBreaks count=\"1\" manualBreakCount=\"1\"><brk id=\"4\" max=\"16383\" man=\"1\"/></rowBreaks>")
            .unwrap();
        let col_breaks = xml
            .find("<colBreaks count=\"1\" manualBreakCount=\"1\"><brk id=\"2\" max=\"1048575\" man=\"1\"/></colBreaks>")
            .unwrap();
        let tables = xml.find("<tableParts count=\"1\"><tablePart r:id=\"rId1\"/></tableParts>").unwrap();
        assert!(merge < margins && margins < row_breaks && row_breaks < col_breaks && col_breaks < tables);
    }

    #[test]
    fn test_prefixed_root_is_closed_by_its_own_name() {
        let sheet = "<x:worksheet xmlns:x=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
            <x:sheetData/></x:worksheet>";
        let layout = SheetLayout::parse(sheet.as_bytes()).unwrap();
        assert_eq!(layout.root_name(), "x:worksheet");
        assert!(layout
            .root()
            .contains(" xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\""));

        let xml = render(&DeferredSections::new(), &layout, &[]);
        assert!(xml.ends_with("<sheetData></sheetData></x:worksheet>"));
    }

    #[test]
    fn test_existing_table_parts_are_kept() {
        let sheet = DEFAULT_SHEET.replace(
            "</worksheet>",
            "<tableParts count=\"1\"><tablePart r:id=\"rId3\"/></tableParts></worksheet>",
        );
        let layout = SheetLayout::parse(sheet.as_bytes()).unwrap();
        assert_eq!(layout.table_part_ids().unwrap(), vec!["rId3"]);

        let xml = render(&DeferredSections::new(), &layout, &["rId4".to_string()]);
        assert!(xml.contains(
            "<tableParts count=\"2\"><tablePart r:id=\"rId3\"/><tablePart r:id=\"rId4\"/></tableParts>"
        ));
        assert_eq!(xml.matches("<tableParts").count(), 1);

        // Without new tables the stored element is re-emitted as is
        let xml = render(&DeferredSections::new(), &layout, &[]);
        assert!(xml.contains("<tableParts count=\"1\"><tablePart r:id=\"rId3\"/></tableParts>"));
    }

    #[test]
    fn test_merge_cell_rejects_bad_reference() {
        let mut sections = DeferredSections::new();
        match sections.merge_cell("A", "D1") {
            Err(ExcelError::InvalidCellReference { cell }) => assert_eq!(cell, "A"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
