//! Minimal workbook package
//!
//! Holds the parts of an XLSX package in memory (keyed by their path inside
//! the ZIP container), hands out [`StreamWriter`] sessions for its sheets and
//! writes the package with s-zip.

use crate::error::{ExcelError, Result};
use crate::reader::{self, RowAttributes, RowIterator, SharedStrings};
use crate::stream::{StreamWriter, XmlWriter};
use crate::styles::{Style, StyleRegistry};
use crate::types::Row;
use crate::{MAX_SHEET_NAME_LENGTH, STREAM_CHUNK_SIZE};
use indexmap::IndexMap;
use quick_xml::events::Event;
use quick_xml::Reader;
use s_zip::{CompressionMethod, StreamingZipReader, StreamingZipWriter};
use serde::{Deserialize, Serialize};
use std::path::Path;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const TABLE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml";
const WORKSHEET_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const TABLE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/table";
const STYLES_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PART: &str = "xl/styles.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

const DEFAULT_SHEET_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    "<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" ",
    "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
    "<dimension ref=\"A1\"/>",
    "<sheetViews><sheetView workbookViewId=\"0\"/></sheetViews>",
    "<sheetFormatPr defaultRowHeight=\"15\"/>",
    "<sheetData/>",
    "<pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>",
    "</worksheet>"
);

/// Workbook-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookOptions {
    /// Use the 1904 date system for timestamps
    pub date1904: bool,
    /// Deflate level used by [`Workbook::save_as`] (0-9)
    pub compression_level: u32,
    /// Bytes a stream session keeps in memory before spilling to disk
    pub stream_chunk_size: usize,
}

impl Default for WorkbookOptions {
    fn default() -> Self {
        WorkbookOptions {
            date1904: false,
            compression_level: 6,
            stream_chunk_size: STREAM_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "Types")]
struct ContentTypes {
    #[serde(rename = "@xmlns", default = "content_types_ns", skip_deserializing)]
    xmlns: String,
    #[serde(rename = "Default", default)]
    defaults: Vec<ContentTypeDefault>,
    #[serde(rename = "Override", default)]
    overrides: Vec<ContentTypeOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentTypeDefault {
    #[serde(rename = "@Extension")]
    extension: String,
    #[serde(rename = "@ContentType")]
    content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentTypeOverride {
    #[serde(rename = "@PartName")]
    part_name: String,
    #[serde(rename = "@ContentType")]
    content_type: String,
}

fn content_types_ns() -> String {
    CONTENT_TYPES_NS.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "Relationships")]
struct Relationships {
    #[serde(rename = "@xmlns", default = "relationships_ns", skip_deserializing)]
    xmlns: String,
    #[serde(rename = "Relationship", default)]
    items: Vec<Relationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Relationship {
    #[serde(rename = "@Id")]
    id: String,
    #[serde(rename = "@Type")]
    rel_type: String,
    #[serde(rename = "@Target")]
    target: String,
    #[serde(rename = "@TargetMode", default, skip_serializing_if = "Option::is_none")]
    target_mode: Option<String>,
}

fn relationships_ns() -> String {
    PACKAGE_RELATIONSHIPS_NS.to_string()
}

impl Relationships {
    fn new() -> Self {
        Relationships {
            xmlns: relationships_ns(),
            items: Vec::new(),
        }
    }

    /// Smallest `rId{n}` above every id in use
    fn next_id(&self) -> u32 {
        self.items
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    fn push(&mut self, rel_type: &str, target: &str) -> String {
        let id = format!("rId{}", self.next_id());
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            target_mode: None,
        });
        id
    }
}

fn to_part<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let body = quick_xml::se::to_string(value)?;
    let mut out = Vec::with_capacity(XML_DECLARATION.len() + body.len());
    out.extend_from_slice(XML_DECLARATION.as_bytes());
    out.extend_from_slice(body.as_bytes());
    Ok(out)
}

fn from_part<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    Ok(quick_xml::de::from_str(std::str::from_utf8(bytes)?)?)
}

/// `xl/worksheets/sheet1.xml` -> `xl/worksheets/_rels/sheet1.xml.rels`
fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Check a worksheet name against the format rules
pub fn validate_sheet_name(name: &str) -> Result<()> {
    let invalid = || ExcelError::SheetNameInvalid(name.to_string());
    if name.is_empty() || name.chars().count() > MAX_SHEET_NAME_LENGTH {
        return Err(invalid());
    }
    if name.contains([':', '\\', '/', '?', '*', '[', ']']) {
        return Err(invalid());
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(invalid());
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    sheet_id: u32,
    rel_id: String,
    path: String,
}

/// In-memory XLSX package
pub struct Workbook {
    parts: IndexMap<String, Vec<u8>>,
    sheets: Vec<SheetEntry>,
    /// `None` for opened packages, whose styles part is kept as is
    styles: Option<StyleRegistry>,
    options: WorkbookOptions,
}

impl Workbook {
    /// Create a workbook with a single empty sheet named `Sheet1`
    pub fn new() -> Result<Self> {
        Self::with_options(WorkbookOptions::default())
    }

    pub fn with_options(options: WorkbookOptions) -> Result<Self> {
        let styles = StyleRegistry::new();
        let mut workbook = Workbook {
            parts: IndexMap::new(),
            sheets: Vec::new(),
            styles: None,
            options,
        };

        let content_types = ContentTypes {
            xmlns: content_types_ns(),
            defaults: vec![
                ContentTypeDefault {
                    extension: "rels".to_string(),
                    content_type: "application/vnd.openxmlformats-package.relationships+xml"
                        .to_string(),
                },
                ContentTypeDefault {
                    extension: "xml".to_string(),
                    content_type: "application/xml".to_string(),
                },
            ],
            overrides: [
                (
                    "/xl/workbook.xml",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
                ),
                (
                    "/xl/styles.xml",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml",
                ),
                (
                    "/docProps/core.xml",
                    "application/vnd.openxmlformats-package.core-properties+xml",
                ),
                (
                    "/docProps/app.xml",
                    "application/vnd.openxmlformats-officedocument.extended-properties+xml",
                ),
            ]
            .iter()
            .map(|(part_name, content_type)| ContentTypeOverride {
                part_name: part_name.to_string(),
                content_type: content_type.to_string(),
            })
            .collect(),
        };
        workbook.set_part(CONTENT_TYPES_PART, to_part(&content_types)?);

        let mut root_rels = Relationships::new();
        root_rels.push(
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument",
            "xl/workbook.xml",
        );
        root_rels.push(
            "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties",
            "docProps/core.xml",
        );
        root_rels.push(
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties",
            "docProps/app.xml",
        );
        workbook.set_part("_rels/.rels", to_part(&root_rels)?);
        workbook.set_part("docProps/app.xml", app_props().into_bytes());
        workbook.set_part("docProps/core.xml", core_props().into_bytes());

        let mut workbook_rels = Relationships::new();
        workbook_rels.push(STYLES_REL_TYPE, "styles.xml");
        workbook.set_part(WORKBOOK_RELS_PART, to_part(&workbook_rels)?);
        workbook.set_part(STYLES_PART, styles.to_xml()?);
        workbook.styles = Some(styles);

        workbook.add_sheet("Sheet1")?;
        Ok(workbook)
    }

    /// Load an existing package
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut zip = StreamingZipReader::open(path)
            .map_err(|e| ExcelError::ZipError(format!("failed to open {}: {}", path.display(), e)))?;

        let names: Vec<String> = zip.entries().iter().map(|e| e.name.clone()).collect();
        let mut parts = IndexMap::with_capacity(names.len());
        for name in names {
            let data = zip
                .read_entry_by_name(&name)
                .map_err(|e| ExcelError::ZipError(format!("failed to read {}: {}", name, e)))?;
            parts.insert(name, data);
        }

        let mut workbook = Workbook {
            parts,
            sheets: Vec::new(),
            styles: None,
            options: WorkbookOptions::default(),
        };
        workbook.sheets = workbook.load_sheet_entries()?;
        workbook.options.date1904 = workbook.date1904()?;

        log::debug!(
            "opened {} with {} sheets",
            path.display(),
            workbook.sheets.len()
        );
        Ok(workbook)
    }

    /// Sheets listed in `xl/workbook.xml`, resolved through its relationships
    fn load_sheet_entries(&self) -> Result<Vec<SheetEntry>> {
        let rels: Relationships = match self.part(WORKBOOK_RELS_PART) {
            Some(bytes) => from_part(bytes)?,
            None => Relationships::new(),
        };
        let workbook_xml = self
            .part(WORKBOOK_PART)
            .ok_or_else(|| ExcelError::ReadError("package has no xl/workbook.xml".to_string()))?;

        let mut reader = Reader::from_str(std::str::from_utf8(workbook_xml)?);
        let mut sheets = Vec::new();
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                    let mut name = String::new();
                    let mut sheet_id = 0u32;
                    let mut rel_id = String::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let value = attr.unescape_value()?.into_owned();
                        match attr.key.local_name().as_ref() {
                            b"name" => name = value,
                            b"sheetId" => sheet_id = value.parse().unwrap_or(0),
                            b"id" => rel_id = value,
                            _ => {}
                        }
                    }
                    let target = rels
                        .items
                        .iter()
                        .find(|r| r.id == rel_id)
                        .map(|r| r.target.clone())
                        .ok_or_else(|| {
                            ExcelError::ReadError(format!("sheet {} has no relationship", name))
                        })?;
                    let path = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    };
                    sheets.push(SheetEntry {
                        name,
                        sheet_id,
                        rel_id,
                        path,
                    });
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(sheets)
    }

    pub fn options(&self) -> &WorkbookOptions {
        &self.options
    }

    /// Names of the worksheets in tab order
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn sheet(&self, name: &str) -> Result<&SheetEntry> {
        validate_sheet_name(name)?;
        self.sheets
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ExcelError::SheetNotExist(name.to_string()))
    }

    /// Append an empty worksheet and return its index
    pub fn add_sheet(&mut self, name: &str) -> Result<usize> {
        validate_sheet_name(name)?;
        if self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
            return Err(ExcelError::SheetNameInvalid(format!(
                "{} (already exists)",
                name
            )));
        }

        let mut n = self.sheets.len() + 1;
        while self.has_part(&format!("xl/worksheets/sheet{}.xml", n)) {
            n += 1;
        }
        let path = format!("xl/worksheets/sheet{}.xml", n);

        let mut rels: Relationships = match self.part(WORKBOOK_RELS_PART) {
            Some(bytes) => from_part(bytes)?,
            None => Relationships::new(),
        };
        let mut content_types: ContentTypes = self.content_types()?;

        let rel_id = rels.push(WORKSHEET_REL_TYPE, &format!("worksheets/sheet{}.xml", n));
        content_types.overrides.push(ContentTypeOverride {
            part_name: format!("/{}", path),
            content_type: WORKSHEET_CONTENT_TYPE.to_string(),
        });
        let sheet_id = self.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1;

        self.set_part(WORKBOOK_RELS_PART, to_part(&rels)?);
        self.set_part(CONTENT_TYPES_PART, to_part(&content_types)?);
        self.set_part(&path, DEFAULT_SHEET_XML.as_bytes().to_vec());
        self.sheets.push(SheetEntry {
            name: name.to_string(),
            sheet_id,
            rel_id,
            path,
        });
        let workbook_xml = self.workbook_xml()?;
        self.set_part(WORKBOOK_PART, workbook_xml);

        Ok(self.sheets.len() - 1)
    }

    fn workbook_xml(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut xml_writer = XmlWriter::new(&mut out);
            xml_writer.write_str(XML_DECLARATION)?;
            xml_writer.start_element("workbook")?;
            xml_writer.attribute("xmlns", SPREADSHEET_NS)?;
            xml_writer.attribute("xmlns:r", RELATIONSHIPS_NS)?;
            xml_writer.close_start_tag()?;

            if self.options.date1904 {
                xml_writer.write_str("<workbookPr date1904=\"1\"/>")?;
            }

            xml_writer.start_element("sheets")?;
            xml_writer.close_start_tag()?;
            for sheet in &self.sheets {
                xml_writer.start_element("sheet")?;
                xml_writer.attribute("name", &sheet.name)?;
                xml_writer.attribute_int("sheetId", sheet.sheet_id as i64)?;
                xml_writer.attribute("r:id", &sheet.rel_id)?;
                xml_writer.write_raw(b"/>")?;
            }
            xml_writer.end_element("sheets")?;
            xml_writer.end_element("workbook")?;
            xml_writer.flush()?;
        }
        Ok(out)
    }

    /// Whether timestamps use the 1904 date system, per `xl/workbook.xml`
    pub fn date1904(&self) -> Result<bool> {
        let Some(bytes) = self.part(WORKBOOK_PART) else {
            return Ok(self.options.date1904);
        };
        let mut reader = Reader::from_str(std::str::from_utf8(bytes)?);
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"workbookPr" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"date1904" {
                            let value = attr.unescape_value()?;
                            return Ok(value == "1" || value == "true");
                        }
                    }
                    return Ok(false);
                }
                Event::Eof => return Ok(false),
                _ => {}
            }
        }
    }

    /// Register a cell style and return its identifier
    pub fn new_style(&mut self, style: &Style) -> Result<u32> {
        let registry = self.styles.as_mut().ok_or_else(|| {
            ExcelError::InvalidState("styles of an opened workbook cannot be extended".to_string())
        })?;
        let id = registry.add(style);
        let xml = registry.to_xml()?;
        self.set_part(STYLES_PART, xml);
        Ok(id)
    }

    /// Start a streaming session that replaces the rows of `sheet`.
    ///
    /// The sheet's current XML must be well-formed; its elements other than
    /// the row data are carried over when the session is flushed.
    pub fn new_stream_writer(&self, sheet: &str) -> Result<StreamWriter> {
        let entry = self.sheet(sheet)?;
        let sheet_xml = self
            .part(&entry.path)
            .unwrap_or(DEFAULT_SHEET_XML.as_bytes());
        let date1904 = self.date1904()?;

        StreamWriter::new(
            entry.name.clone(),
            entry.path.clone(),
            sheet_xml,
            date1904,
            self.options.stream_chunk_size,
        )
    }

    /// Raw bytes of a package part
    pub fn part(&self, path: &str) -> Option<&[u8]> {
        self.parts.get(path).map(Vec::as_slice)
    }

    /// Insert or replace a package part
    pub fn set_part(&mut self, path: &str, data: Vec<u8>) {
        self.parts.insert(path.to_string(), data);
    }

    pub fn has_part(&self, path: &str) -> bool {
        self.parts.contains_key(path)
    }

    fn content_types(&self) -> Result<ContentTypes> {
        match self.part(CONTENT_TYPES_PART) {
            Some(bytes) => from_part(bytes),
            None => Ok(ContentTypes {
                xmlns: content_types_ns(),
                defaults: Vec::new(),
                overrides: Vec::new(),
            }),
        }
    }

    fn sheet_rels(&self, sheet_path: &str) -> Result<Relationships> {
        match self.part(&rels_path_for(sheet_path)) {
            Some(bytes) => from_part(bytes),
            None => Ok(Relationships::new()),
        }
    }

    /// Reserve `(table id, relationship id)` pairs for `count` new tables of
    /// a sheet without changing the package
    pub(crate) fn plan_tables(&self, sheet_path: &str, count: usize) -> Result<Vec<(u32, String)>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.content_types()?;
        let rels = self.sheet_rels(sheet_path)?;

        let first_table = self
            .parts
            .keys()
            .filter_map(|k| {
                k.strip_prefix("xl/tables/table")?
                    .strip_suffix(".xml")?
                    .parse::<u32>()
                    .ok()
            })
            .max()
            .unwrap_or(0)
            + 1;
        let first_rel = rels.next_id();

        Ok((0..count as u32)
            .map(|i| (first_table + i, format!("rId{}", first_rel + i)))
            .collect())
    }

    /// Names of the tables stored in the package, in part order
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for (path, bytes) in &self.parts {
            if !(path.starts_with("xl/tables/") && path.ends_with(".xml")) {
                continue;
            }
            let mut reader = Reader::from_str(std::str::from_utf8(bytes)?);
            loop {
                match reader.read_event()? {
                    Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"table" => {
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.as_ref() == b"name" {
                                names.push(attr.unescape_value()?.into_owned());
                            }
                        }
                        break;
                    }
                    Event::Eof => break,
                    _ => {}
                }
            }
        }
        Ok(names)
    }

    /// Store table parts planned by [`plan_tables`](Self::plan_tables)
    pub(crate) fn commit_tables(
        &mut self,
        sheet_path: &str,
        tables: Vec<(u32, String, Vec<u8>)>,
    ) -> Result<()> {
        if tables.is_empty() {
            return Ok(());
        }
        let mut rels = self.sheet_rels(sheet_path)?;
        let mut content_types = self.content_types()?;

        let mut parts = Vec::with_capacity(tables.len());
        for (id, rel_id, xml) in tables {
            rels.items.push(Relationship {
                id: rel_id,
                rel_type: TABLE_REL_TYPE.to_string(),
                target: format!("../tables/table{}.xml", id),
                target_mode: None,
            });
            content_types.overrides.push(ContentTypeOverride {
                part_name: format!("/xl/tables/table{}.xml", id),
                content_type: TABLE_CONTENT_TYPE.to_string(),
            });
            parts.push((format!("xl/tables/table{}.xml", id), xml));
        }

        self.set_part(&rels_path_for(sheet_path), to_part(&rels)?);
        self.set_part(CONTENT_TYPES_PART, to_part(&content_types)?);
        for (path, xml) in parts {
            self.set_part(&path, xml);
        }
        Ok(())
    }

    /// Write the package to `path`
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut zip = StreamingZipWriter::with_method(
            path,
            CompressionMethod::Deflate,
            self.options.compression_level.min(9),
        )
        .map_err(|e| ExcelError::ZipError(format!("failed to create ZIP writer: {}", e)))?;

        for (name, data) in &self.parts {
            zip.start_entry(name)
                .map_err(|e| ExcelError::ZipError(format!("failed to start {}: {}", name, e)))?;
            zip.write_data(data)
                .map_err(|e| ExcelError::ZipError(format!("failed to write {}: {}", name, e)))?;
        }
        zip.finish()
            .map_err(|e| ExcelError::ZipError(format!("failed to finish ZIP: {}", e)))?;

        log::debug!("saved {} parts to {}", self.parts.len(), path.display());
        Ok(())
    }

    fn sheet_xml(&self, sheet: &str) -> Result<&[u8]> {
        let entry = self.sheet(sheet)?;
        self.part(&entry.path)
            .ok_or_else(|| ExcelError::SheetNotExist(sheet.to_string()))
    }

    fn shared_strings(&self) -> Result<SharedStrings> {
        match self.part(SHARED_STRINGS_PART) {
            Some(bytes) => SharedStrings::parse(bytes),
            None => Ok(SharedStrings::default()),
        }
    }

    /// Iterate over the stored rows of a sheet
    pub fn rows(&self, sheet: &str) -> Result<RowIterator<'_>> {
        RowIterator::new(self.sheet_xml(sheet)?, self.shared_strings()?)
    }

    /// Text of one cell; empty when the cell is not stored
    pub fn cell_value(&self, sheet: &str, cell: &str) -> Result<String> {
        reader::cell_value(self.sheet_xml(sheet)?, &self.shared_strings()?, cell)
    }

    /// Style identifier of one cell (0 when unstyled or absent)
    pub fn cell_style(&self, sheet: &str, cell: &str) -> Result<u32> {
        reader::cell_style(self.sheet_xml(sheet)?, cell)
    }

    /// Outline level of a row (0 when the row is absent)
    pub fn row_outline_level(&self, sheet: &str, row: u32) -> Result<u8> {
        reader::row_outline_level(self.sheet_xml(sheet)?, row)
    }

    /// Height, visibility and outline level of a stored row
    pub fn row_attributes(&self, sheet: &str, row: u32) -> Result<Option<RowAttributes>> {
        reader::row_attributes(self.sheet_xml(sheet)?, row)
    }

    /// Collect every row of a sheet
    pub fn read_rows(&self, sheet: &str) -> Result<Vec<Row>> {
        self.rows(sheet)?.collect()
    }
}

impl std::fmt::Debug for Workbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbook")
            .field("sheets", &self.sheet_names())
            .field("parts", &self.parts.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

fn core_props() -> String {
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>sheetstream</dc:creator>
<cp:lastModifiedBy>sheetstream</cp:lastModifiedBy>
<dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified>
</cp:coreProperties>"#
    )
}

fn app_props() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>sheetstream</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
<AppVersion>{}</AppVersion>
</Properties>"#,
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part_str<'a>(wb: &'a Workbook, path: &str) -> &'a str {
        std::str::from_utf8(wb.part(path).unwrap()).unwrap()
    }

    #[test]
    fn test_new_workbook_parts() {
        let wb = Workbook::new().unwrap();
        assert_eq!(wb.sheet_names(), vec!["Sheet1"]);
        assert!(wb.has_part("xl/worksheets/sheet1.xml"));
        assert!(part_str(&wb, CONTENT_TYPES_PART).contains(
            "<Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>"
        ));
        assert!(part_str(&wb, WORKBOOK_PART)
            .contains("<sheet name=\"Sheet1\" sheetId=\"1\" r:id=\"rId2\"/>"));
        assert!(!wb.date1904().unwrap());
    }

    #[test]
    fn test_sheet_names_are_validated() {
        let mut wb = Workbook::new().unwrap();
        for bad in ["", "Sheet:1", "a/b", "[x]", "'quoted'", "x".repeat(32).as_str()] {
            assert!(
                matches!(wb.add_sheet(bad), Err(ExcelError::SheetNameInvalid(_))),
                "{:?}",
                bad
            );
        }
        assert!(matches!(
            wb.add_sheet("sheet1"),
            Err(ExcelError::SheetNameInvalid(_))
        ));
        assert_eq!(wb.add_sheet("Data").unwrap(), 1);
        assert!(wb.has_part("xl/worksheets/sheet2.xml"));
    }

    #[test]
    fn test_stream_writer_lookup() {
        let wb = Workbook::new().unwrap();
        match wb.new_stream_writer("SheetN") {
            Err(e) => assert_eq!(e.to_string(), "sheet SheetN does not exist"),
            Ok(_) => panic!("missing sheet accepted"),
        }
        assert!(matches!(
            wb.new_stream_writer("Sheet:1"),
            Err(ExcelError::SheetNameInvalid(_))
        ));
    }

    #[test]
    fn test_malformed_sheet_xml_blocks_session() {
        let mut wb = Workbook::new().unwrap();
        wb.set_part(
            "xl/worksheets/sheet1.xml",
            b"\x8f\xe0\xa8\xa2\xa5\xe2 \xac\xa8\xe0".to_vec(),
        );
        assert!(matches!(
            wb.new_stream_writer("Sheet1"),
            Err(ExcelError::MalformedXml(_))
        ));
    }

    #[test]
    fn test_date1904_option() {
        let wb = Workbook::with_options(WorkbookOptions {
            date1904: true,
            ..Default::default()
        })
        .unwrap();
        assert!(part_str(&wb, WORKBOOK_PART).contains("<workbookPr date1904=\"1\"/>"));
        assert!(wb.date1904().unwrap());
    }

    #[test]
    fn test_table_planning_is_read_only() {
        let mut wb = Workbook::new().unwrap();
        let plan = wb.plan_tables("xl/worksheets/sheet1.xml", 2).unwrap();
        assert_eq!(
            plan,
            vec![(1, "rId1".to_string()), (2, "rId2".to_string())]
        );
        assert!(!wb.has_part("xl/worksheets/_rels/sheet1.xml.rels"));

        let parts = plan
            .into_iter()
            .map(|(id, rid)| (id, rid, b"<table/>".to_vec()))
            .collect();
        wb.commit_tables("xl/worksheets/sheet1.xml", parts).unwrap();

        let rels = part_str(&wb, "xl/worksheets/_rels/sheet1.xml.rels");
        assert!(rels.contains("Target=\"../tables/table2.xml\""));
        assert!(part_str(&wb, CONTENT_TYPES_PART).contains("/xl/tables/table1.xml"));
        assert_eq!(
            wb.plan_tables("xl/worksheets/sheet1.xml", 1).unwrap(),
            vec![(3, "rId3".to_string())]
        );
    }

    #[test]
    fn test_new_style_ids() {
        let mut wb = Workbook::new().unwrap();
        let bold = Style::default().with_font(crate::styles::Font::bold());
        let id = wb.new_style(&bold).unwrap();
        assert_eq!(id, 1);
        assert_eq!(wb.new_style(&bold).unwrap(), 1);
        assert!(part_str(&wb, STYLES_PART).contains("<cellXfs count=\"2\">"));
    }
}
