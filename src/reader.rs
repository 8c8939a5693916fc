//! Read-back of stored worksheet XML
//!
//! Pull-parses a worksheet part row by row, so checking a large streamed
//! sheet never materializes more than one row at a time.

use crate::cell_ref::cell_name_to_coordinates;
use crate::error::{ExcelError, Result};
use crate::types::Row;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Shared string table (`xl/sharedStrings.xml`)
#[derive(Debug, Clone, Default)]
pub struct SharedStrings {
    strings: Vec<String>,
}

impl SharedStrings {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_str(std::str::from_utf8(bytes)?);
        let mut strings = Vec::new();
        let mut current: Option<String> = None;
        let mut in_text = false;
        let mut in_phonetic = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"si" => current = Some(String::new()),
                    b"rPh" => in_phonetic = true,
                    b"t" if !in_phonetic => in_text = true,
                    _ => {}
                },
                Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
                Event::Text(t) if in_text => {
                    if let Some(s) = current.as_mut() {
                        s.push_str(&t.unescape()?);
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"si" => strings.extend(current.take()),
                    b"rPh" => in_phonetic = false,
                    b"t" => in_text = false,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(SharedStrings { strings })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// One `<c>` element as stored
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredCell {
    pub col: u32,
    pub style: u32,
    pub value: String,
}

/// One `<row>` element as stored
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StoredRow {
    pub index: u32,
    pub outline_level: u8,
    pub hidden: bool,
    pub height: Option<f64>,
    pub cells: Vec<StoredCell>,
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(Vec<u8>, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        out.push((
            attr.key.local_name().as_ref().to_vec(),
            attr.unescape_value()?.into_owned(),
        ));
    }
    Ok(out)
}

/// Pull parser over the rows of a worksheet part
pub(crate) struct RowScanner<'a> {
    reader: Reader<&'a [u8]>,
    sst: SharedStrings,
    last_row: u32,
    done: bool,
}

impl<'a> RowScanner<'a> {
    pub(crate) fn new(xml: &'a [u8], sst: SharedStrings) -> Result<Self> {
        std::str::from_utf8(xml)?;
        Ok(RowScanner {
            reader: Reader::from_reader(xml),
            sst,
            last_row: 0,
            done: false,
        })
    }

    fn read_row(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<StoredRow> {
        let mut row = StoredRow {
            index: self.last_row + 1,
            ..Default::default()
        };
        for (key, value) in attributes(start)? {
            match key.as_slice() {
                b"r" => {
                    row.index = value.parse().map_err(|_| {
                        ExcelError::MalformedXml(format!("invalid row number {:?}", value))
                    })?
                }
                b"outlineLevel" => row.outline_level = value.parse().unwrap_or(0),
                b"hidden" => row.hidden = value == "1" || value == "true",
                b"ht" => row.height = value.parse().ok(),
                _ => {}
            }
        }
        self.last_row = row.index;
        if empty {
            return Ok(row);
        }

        let mut next_col = 1u32;
        let mut cell: Option<(u32, u32, String)> = None;
        let mut text = String::new();
        let mut in_value = false;
        let mut in_phonetic = false;

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"c" => {
                        cell = Some(self.cell_header(&e, next_col)?);
                        text.clear();
                    }
                    b"rPh" => in_phonetic = true,
                    b"v" | b"t" if !in_phonetic => in_value = true,
                    _ => {}
                },
                Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                    let (col, style, _) = self.cell_header(&e, next_col)?;
                    row.cells.push(StoredCell {
                        col,
                        style,
                        value: String::new(),
                    });
                    next_col = col + 1;
                }
                Event::Text(t) if in_value => text.push_str(&t.unescape()?),
                Event::CData(t) if in_value => text.push_str(std::str::from_utf8(&t)?),
                Event::End(e) => match e.local_name().as_ref() {
                    b"v" | b"t" => in_value = false,
                    b"rPh" => in_phonetic = false,
                    b"c" => {
                        if let Some((col, style, cell_type)) = cell.take() {
                            let value = self.resolve(&cell_type, std::mem::take(&mut text));
                            row.cells.push(StoredCell { col, style, value });
                            next_col = col + 1;
                        }
                    }
                    b"row" => return Ok(row),
                    _ => {}
                },
                Event::Eof => {
                    return Err(ExcelError::IncompleteDocument(format!(
                        "unexpected EOF inside row {}",
                        row.index
                    )))
                }
                _ => {}
            }
        }
    }

    fn cell_header(&self, e: &BytesStart<'_>, next_col: u32) -> Result<(u32, u32, String)> {
        let mut col = next_col;
        let mut style = 0;
        let mut cell_type = String::new();
        for (key, value) in attributes(e)? {
            match key.as_slice() {
                b"r" => col = cell_name_to_coordinates(&value)?.0,
                b"s" => style = value.parse().unwrap_or(0),
                b"t" => cell_type = value,
                _ => {}
            }
        }
        Ok((col, style, cell_type))
    }

    fn resolve(&self, cell_type: &str, text: String) -> String {
        match cell_type {
            "s" => text
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| self.sst.get(i))
                .map(str::to_string)
                .unwrap_or_default(),
            "b" => {
                if text.trim() == "1" {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            _ => text,
        }
    }
}

impl Iterator for RowScanner<'_> {
    type Item = Result<StoredRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            let result = match event {
                Event::Start(e) if e.local_name().as_ref() == b"row" => self.read_row(&e, false),
                Event::Empty(e) if e.local_name().as_ref() == b"row" => self.read_row(&e, true),
                Event::Eof => {
                    self.done = true;
                    return None;
                }
                _ => continue,
            };
            if result.is_err() {
                self.done = true;
            }
            return Some(result);
        }
    }
}

/// Rows of a worksheet as padded cell texts
pub struct RowIterator<'a> {
    scanner: RowScanner<'a>,
}

impl<'a> RowIterator<'a> {
    pub fn new(xml: &'a [u8], sst: SharedStrings) -> Result<Self> {
        Ok(RowIterator {
            scanner: RowScanner::new(xml, sst)?,
        })
    }
}

impl Iterator for RowIterator<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.scanner.next()?.map(|stored| {
            let width = stored
                .cells
                .iter()
                .filter(|c| !c.value.is_empty())
                .map(|c| c.col as usize)
                .max()
                .unwrap_or(0);
            let mut cells = vec![String::new(); width];
            for cell in stored.cells {
                if (cell.col as usize) <= width {
                    cells[cell.col as usize - 1] = cell.value;
                }
            }
            Row::new(stored.index, cells)
        }))
    }
}

fn find_row(xml: &[u8], sst: SharedStrings, row: u32) -> Result<Option<StoredRow>> {
    for stored in RowScanner::new(xml, sst)? {
        let stored = stored?;
        if stored.index == row {
            return Ok(Some(stored));
        }
        if stored.index > row {
            break;
        }
    }
    Ok(None)
}

fn find_cell(xml: &[u8], sst: SharedStrings, cell: &str) -> Result<Option<StoredCell>> {
    let (col, row) = cell_name_to_coordinates(cell)?;
    Ok(find_row(xml, sst, row)?.and_then(|r| r.cells.into_iter().find(|c| c.col == col)))
}

pub(crate) fn cell_value(xml: &[u8], sst: &SharedStrings, cell: &str) -> Result<String> {
    Ok(find_cell(xml, sst.clone(), cell)?
        .map(|c| c.value)
        .unwrap_or_default())
}

pub(crate) fn cell_style(xml: &[u8], cell: &str) -> Result<u32> {
    Ok(find_cell(xml, SharedStrings::default(), cell)?
        .map(|c| c.style)
        .unwrap_or(0))
}

pub(crate) fn row_outline_level(xml: &[u8], row: u32) -> Result<u8> {
    Ok(row_attributes(xml, row)?
        .map(|r| r.outline_level)
        .unwrap_or(0))
}

/// Attributes of a stored row element
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RowAttributes {
    pub height: Option<f64>,
    pub hidden: bool,
    pub outline_level: u8,
}

pub(crate) fn row_attributes(xml: &[u8], row: u32) -> Result<Option<RowAttributes>> {
    Ok(find_row(xml, SharedStrings::default(), row)?.map(|r| RowAttributes {
        height: r.height,
        hidden: r.hidden,
        outline_level: r.outline_level,
    }))
}
