//! Cell value encoding
//!
//! Turns one [`CellInput`] into a `<c>` element. Numbers and booleans are
//! written as values, text as inline strings (`t="inlineStr"`), timestamps
//! and durations as serial day numbers.

use super::xml_writer::XmlWriter;
use crate::date::{datetime_to_serial, duration_to_serial};
use crate::error::Result;
use crate::types::{CellInput, CellValue, RichTextRun};
use crate::TOTAL_CELL_CHARS;
use std::borrow::Cow;
use std::io::Write;

/// Cell content after type dispatch
#[derive(Debug, PartialEq)]
enum Encoded<'a> {
    Blank,
    Number(String),
    Bool(bool),
    Text(Cow<'a, str>),
    Error(Cow<'a, str>),
}

/// Encoder for cell elements of one worksheet
#[derive(Debug, Clone, Copy, Default)]
pub struct CellEncoder {
    date1904: bool,
}

impl CellEncoder {
    pub fn new(date1904: bool) -> Self {
        CellEncoder { date1904 }
    }

    /// Write the cell at `col_name``row` for `input`.
    ///
    /// Bare values use `row_style`; descriptors carry their own style.
    /// Returns `false` when the input produced no element.
    pub fn encode<W: Write>(
        &self,
        xml: &mut XmlWriter<W>,
        col_name: &str,
        row: u32,
        input: &CellInput,
        row_style: u32,
    ) -> Result<bool> {
        match input {
            CellInput::Value(value) => self.encode_value(xml, col_name, row, value, None, row_style),
            CellInput::Cell(cell) => self.encode_value(
                xml,
                col_name,
                row,
                &cell.value,
                cell.formula.as_deref(),
                cell.style_id,
            ),
            CellInput::RichText(runs) => {
                encode_rich_text(xml, col_name, row, runs, row_style)?;
                Ok(true)
            }
        }
    }

    fn encode_value<W: Write>(
        &self,
        xml: &mut XmlWriter<W>,
        col_name: &str,
        row: u32,
        value: &CellValue,
        formula: Option<&str>,
        style_id: u32,
    ) -> Result<bool> {
        let formula = formula
            .map(|f| f.strip_prefix('=').unwrap_or(f))
            .filter(|f| !f.is_empty());
        let encoded = self.dispatch(value);

        if encoded == Encoded::Blank && formula.is_none() && style_id == 0 {
            return Ok(false);
        }

        write_cell_start(xml, col_name, row, style_id)?;
        match (&encoded, formula.is_some()) {
            (Encoded::Bool(_), _) => xml.write_raw(b" t=\"b\"")?,
            (Encoded::Error(_), _) => xml.write_raw(b" t=\"e\"")?,
            (Encoded::Text(_), true) => xml.write_raw(b" t=\"str\"")?,
            (Encoded::Text(_), false) => xml.write_raw(b" t=\"inlineStr\"")?,
            _ => {}
        }

        if encoded == Encoded::Blank && formula.is_none() {
            xml.write_raw(b"/>")?;
            return Ok(true);
        }
        xml.close_start_tag()?;

        if let Some(f) = formula {
            xml.write_raw(b"<f>")?;
            xml.write_escaped(f)?;
            xml.write_raw(b"</f>")?;
        }

        match &encoded {
            Encoded::Blank => {}
            Encoded::Number(n) => {
                xml.write_raw(b"<v>")?;
                xml.write_str(n)?;
                xml.write_raw(b"</v>")?;
            }
            Encoded::Bool(b) => {
                xml.write_raw(if *b { b"<v>1</v>" } else { b"<v>0</v>" })?;
            }
            Encoded::Error(e) => {
                xml.write_raw(b"<v>")?;
                xml.write_escaped(e)?;
                xml.write_raw(b"</v>")?;
            }
            Encoded::Text(t) if formula.is_some() => {
                xml.write_raw(b"<v>")?;
                xml.write_escaped(t)?;
                xml.write_raw(b"</v>")?;
            }
            Encoded::Text(t) => {
                xml.write_raw(b"<is>")?;
                xml.text_element(t)?;
                xml.write_raw(b"</is>")?;
            }
        }

        xml.end_element("c")?;
        Ok(true)
    }

    fn dispatch<'a>(&self, value: &'a CellValue) -> Encoded<'a> {
        match value {
            CellValue::Empty => Encoded::Blank,
            CellValue::String(s) => Encoded::Text(truncate_cell_text(Cow::Borrowed(s))),
            CellValue::Bytes(b) => Encoded::Text(truncate_cell_text(String::from_utf8_lossy(b))),
            CellValue::Int(i) => Encoded::Number(itoa::Buffer::new().format(*i).to_string()),
            CellValue::UInt(u) => Encoded::Number(itoa::Buffer::new().format(*u).to_string()),
            CellValue::Float(f) => encode_float(*f),
            CellValue::Bool(b) => Encoded::Bool(*b),
            CellValue::DateTime(dt) => match datetime_to_serial(*dt, self.date1904) {
                Some(serial) => encode_float(serial),
                None => Encoded::Text(Cow::Owned(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            },
            CellValue::Duration(d) => encode_float(duration_to_serial(*d)),
            CellValue::Error(e) => Encoded::Error(Cow::Borrowed(e)),
            // Kinds the format cannot hold carry no content; a style still applies
            CellValue::Unsupported(_) => Encoded::Blank,
        }
    }

    /// Encode into a standalone string (handy for tests and debugging)
    pub fn encode_to_string(
        &self,
        col_name: &str,
        row: u32,
        input: &CellInput,
        row_style: u32,
    ) -> Result<String> {
        let mut out = Vec::new();
        {
            let mut xml = XmlWriter::new(&mut out);
            self.encode(&mut xml, col_name, row, input, row_style)?;
            xml.flush()?;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

fn encode_float<'a>(f: f64) -> Encoded<'a> {
    if f.is_finite() {
        // Display is the shortest representation that parses back to `f`
        Encoded::Number(f.to_string())
    } else {
        Encoded::Error(Cow::Borrowed("#NUM!"))
    }
}

/// Cut text to the cell character limit
fn truncate_cell_text(text: Cow<'_, str>) -> Cow<'_, str> {
    let cut = text.char_indices().nth(TOTAL_CELL_CHARS).map(|(idx, _)| idx);
    match cut {
        Some(cut) => {
            log::warn!(
                "cell text truncated to {} characters",
                TOTAL_CELL_CHARS
            );
            match text {
                Cow::Borrowed(s) => Cow::Borrowed(&s[..cut]),
                Cow::Owned(mut s) => {
                    s.truncate(cut);
                    Cow::Owned(s)
                }
            }
        }
        None => text,
    }
}

fn write_cell_start<W: Write>(
    xml: &mut XmlWriter<W>,
    col_name: &str,
    row: u32,
    style_id: u32,
) -> Result<()> {
    xml.write_raw(b"<c r=\"")?;
    xml.write_str(col_name)?;
    xml.write_uint(row as u64)?;
    xml.write_raw(b"\"")?;
    if style_id > 0 {
        xml.write_raw(b" s=\"")?;
        xml.write_uint(style_id as u64)?;
        xml.write_raw(b"\"")?;
    }
    Ok(())
}

fn encode_rich_text<W: Write>(
    xml: &mut XmlWriter<W>,
    col_name: &str,
    row: u32,
    runs: &[RichTextRun],
    style_id: u32,
) -> Result<()> {
    write_cell_start(xml, col_name, row, style_id)?;
    xml.write_raw(b" t=\"inlineStr\"><is>")?;
    // The character limit covers the whole cell, not each run
    let mut remaining = TOTAL_CELL_CHARS;
    let mut truncated = false;
    for run in runs {
        if remaining == 0 {
            truncated = true;
            break;
        }
        let text = match run.text.char_indices().nth(remaining) {
            Some((cut, _)) => {
                truncated = true;
                &run.text[..cut]
            }
            None => run.text.as_str(),
        };
        remaining -= text.chars().count();

        xml.write_raw(b"<r>")?;
        if let Some(font) = &run.font {
            xml.write_raw(b"<rPr>")?;
            font.write_children(xml, "rFont")?;
            xml.write_raw(b"</rPr>")?;
        }
        xml.text_element(text)?;
        xml.write_raw(b"</r>")?;
    }
    if truncated {
        log::warn!(
            "rich text truncated to {} characters",
            TOTAL_CELL_CHARS
        );
    }
    xml.write_raw(b"</is></c>")
}
