//! Streaming worksheet session
//!
//! - [`SpillBuffer`]: memory/disk hybrid sink for the sheet XML
//! - [`CellEncoder`]: one value to one `<c>` element
//! - [`StreamWriter`]: row emitter plus the deferred sections around it

mod encoder;
mod sections;
mod spill_buffer;
mod table;
mod writer;
mod xml_writer;

pub use encoder::CellEncoder;
pub use spill_buffer::{SpillBuffer, SpillReader};
pub use writer::StreamWriter;
pub use xml_writer::{needs_space_preserve, XmlWriter};
