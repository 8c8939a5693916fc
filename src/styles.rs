//! Minimal style registry
//!
//! Maps style descriptors to stable `cellXfs` indices and renders
//! `xl/styles.xml`. Style identifiers are handed to the stream writer as
//! opaque integers; nothing in the streaming path looks them up again.

use crate::stream::XmlWriter;
use crate::Result;

/// Font attributes, used both by cell styles and by rich-text runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Font {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    /// Font family name, e.g. `Calibri`
    pub family: Option<String>,
    /// Size in points
    pub size: Option<f64>,
    /// RGB color as `#RRGGBB`, `RRGGBB` or `AARRGGBB`
    pub color: Option<String>,
}

impl Font {
    pub fn color(color: impl Into<String>) -> Self {
        Font {
            color: Some(color.into()),
            ..Default::default()
        }
    }

    pub fn bold() -> Self {
        Font {
            bold: true,
            ..Default::default()
        }
    }

    /// Color normalized to the `AARRGGBB` form used in SpreadsheetML
    pub fn argb(&self) -> Option<String> {
        let color = self.color.as_deref()?.trim_start_matches('#');
        match color.len() {
            6 => Some(format!("FF{}", color.to_ascii_uppercase())),
            8 => Some(color.to_ascii_uppercase()),
            _ => None,
        }
    }

    /// Write the font children shared by `<font>` and `<rPr>`.
    ///
    /// `name_tag` is `name` inside `<font>` and `rFont` inside `<rPr>`.
    pub(crate) fn write_children<W: std::io::Write>(
        &self,
        xml: &mut XmlWriter<W>,
        name_tag: &str,
    ) -> Result<()> {
        if let Some(family) = &self.family {
            xml.start_element(name_tag)?;
            xml.attribute("val", family)?;
            xml.write_raw(b"/>")?;
        }
        if self.bold {
            xml.empty_element("b")?;
        }
        if self.italic {
            xml.empty_element("i")?;
        }
        if self.strike {
            xml.empty_element("strike")?;
        }
        if let Some(argb) = self.argb() {
            xml.start_element("color")?;
            xml.attribute("rgb", &argb)?;
            xml.write_raw(b"/>")?;
        }
        if let Some(size) = self.size {
            xml.start_element("sz")?;
            xml.attribute("val", &size.to_string())?;
            xml.write_raw(b"/>")?;
        }
        if self.underline {
            xml.empty_element("u")?;
        }
        Ok(())
    }
}

/// Cell style descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Style {
    pub font: Option<Font>,
    /// Built-in number format id (e.g. 14 for dates, 22 for date-times)
    pub num_fmt: Option<u32>,
}

impl Style {
    pub fn with_font(mut self, font: Font) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_num_fmt(mut self, num_fmt: u32) -> Self {
        self.num_fmt = Some(num_fmt);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CellXf {
    num_fmt: u32,
    font_id: usize,
}

/// Registry of fonts and cell formats for one workbook
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    fonts: Vec<Font>,
    xfs: Vec<CellXf>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        StyleRegistry {
            fonts: vec![Font {
                family: Some("Calibri".to_string()),
                size: Some(11.0),
                ..Default::default()
            }],
            xfs: vec![CellXf {
                num_fmt: 0,
                font_id: 0,
            }],
        }
    }
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a style and return its identifier; equal styles share an id
    pub fn add(&mut self, style: &Style) -> u32 {
        let font_id = match &style.font {
            Some(font) => {
                let mut font = font.clone();
                if font.family.is_none() {
                    font.family = self.fonts[0].family.clone();
                }
                if font.size.is_none() {
                    font.size = self.fonts[0].size;
                }
                match self.fonts.iter().position(|f| *f == font) {
                    Some(idx) => idx,
                    None => {
                        self.fonts.push(font);
                        self.fonts.len() - 1
                    }
                }
            }
            None => 0,
        };
        let xf = CellXf {
            num_fmt: style.num_fmt.unwrap_or(0),
            font_id,
        };
        match self.xfs.iter().position(|x| *x == xf) {
            Some(idx) => idx as u32,
            None => {
                self.xfs.push(xf);
                (self.xfs.len() - 1) as u32
            }
        }
    }

    /// Number of registered cell formats
    pub fn len(&self) -> usize {
        self.xfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xfs.is_empty()
    }

    /// Render `xl/styles.xml`
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1024);
        {
            let mut xml = XmlWriter::new(&mut out);
            xml.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")?;
            xml.start_element("styleSheet")?;
            xml.attribute(
                "xmlns",
                "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
            )?;
            xml.close_start_tag()?;

            xml.start_element("fonts")?;
            xml.attribute_int("count", self.fonts.len() as i64)?;
            xml.close_start_tag()?;
            for font in &self.fonts {
                xml.start_element("font")?;
                xml.close_start_tag()?;
                font.write_children(&mut xml, "name")?;
                xml.end_element("font")?;
            }
            xml.end_element("fonts")?;

            xml.write_str(
                "<fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill>\
                 <fill><patternFill patternType=\"gray125\"/></fill></fills>\
                 <borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
                 <cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
            )?;

            xml.start_element("cellXfs")?;
            xml.attribute_int("count", self.xfs.len() as i64)?;
            xml.close_start_tag()?;
            for xf in &self.xfs {
                xml.start_element("xf")?;
                xml.attribute_int("numFmtId", xf.num_fmt as i64)?;
                xml.attribute_int("fontId", xf.font_id as i64)?;
                xml.attribute("fillId", "0")?;
                xml.attribute("borderId", "0")?;
                xml.attribute("xfId", "0")?;
                if xf.num_fmt != 0 {
                    xml.attribute("applyNumberFormat", "1")?;
                }
                if xf.font_id != 0 {
                    xml.attribute("applyFont", "1")?;
                }
                xml.write_raw(b"/>")?;
            }
            xml.end_element("cellXfs")?;

            xml.write_str(
                "<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>",
            )?;
            xml.end_element("styleSheet")?;
            xml.flush()?;
        }
        Ok(out)
    }
}
