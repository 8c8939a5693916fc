//! Hybrid memory/disk write sink
//!
//! A [`SpillBuffer`] behaves like a growing `Vec<u8>` until its content
//! crosses a threshold; from then on everything (including the bytes already
//! buffered) lives in a temporary file and the in-memory copy is released.
//!
//! State machine:
//!
//! ```text
//!   Open(Memory) --threshold--> Open(File)
//!        |                          |
//!   close_for_write            close_for_write
//!        v                          v
//!   Closed(Memory)             Closed(File)
//!
//!   any state --dispose--> Disposed
//! ```

use crate::error::{ExcelError, Result};
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const FILE_BUFFER_SIZE: usize = 64 * 1024;
const DRAIN_CHUNK_SIZE: usize = 64 * 1024;

enum Backing {
    Memory(Vec<u8>),
    File(BufWriter<NamedTempFile>),
}

enum SpillState {
    Open(Backing),
    Closed(Backing),
    Disposed,
}

/// Write sink that moves to a temporary file once it grows past a threshold
pub struct SpillBuffer {
    state: SpillState,
    len: u64,
    threshold: usize,
    /// Directory for the spill file; the system temp dir when unset
    spill_dir: Option<PathBuf>,
}

impl SpillBuffer {
    /// Create a buffer that spills after [`STREAM_CHUNK_SIZE`](crate::STREAM_CHUNK_SIZE) bytes
    pub fn new() -> Self {
        Self::with_threshold(crate::STREAM_CHUNK_SIZE)
    }

    /// Create a buffer with a custom spill threshold in bytes
    pub fn with_threshold(threshold: usize) -> Self {
        SpillBuffer {
            state: SpillState::Open(Backing::Memory(Vec::with_capacity(threshold.min(8192)))),
            len: 0,
            threshold,
            spill_dir: None,
        }
    }

    /// Change the threshold; takes effect on the next write
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Create the spill file in `dir` instead of the system temp dir
    pub fn set_spill_dir(&mut self, dir: Option<PathBuf>) {
        self.spill_dir = dir;
    }

    /// Total bytes written so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the content has moved to a temporary file
    pub fn is_spilled(&self) -> bool {
        matches!(
            self.state,
            SpillState::Open(Backing::File(_)) | SpillState::Closed(Backing::File(_))
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SpillState::Closed(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, SpillState::Disposed)
    }

    /// Path of the temporary file, if the buffer has spilled
    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            SpillState::Open(Backing::File(w)) | SpillState::Closed(Backing::File(w)) => {
                Some(w.get_ref().path())
            }
            _ => None,
        }
    }

    /// Append bytes, spilling to disk when the threshold would be crossed.
    ///
    /// Either all of `data` is appended or, on error, none of it.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let needs_spill = match &self.state {
            SpillState::Open(Backing::Memory(buf)) => buf.len() + data.len() > self.threshold,
            SpillState::Open(Backing::File(_)) => false,
            SpillState::Closed(_) => {
                return Err(ExcelError::ResourceClosed("spill buffer is closed for writing"))
            }
            SpillState::Disposed => {
                return Err(ExcelError::ResourceClosed("spill buffer has been disposed"))
            }
        };
        if needs_spill {
            self.spill()?;
        }

        match &mut self.state {
            SpillState::Open(Backing::Memory(buf)) => buf.extend_from_slice(data),
            SpillState::Open(Backing::File(w)) => {
                if let Err(err) = w.write_all(data) {
                    self.rollback_file();
                    return Err(err.into());
                }
            }
            _ => {}
        }
        self.len += data.len() as u64;
        Ok(())
    }

    /// Cut the spill file back to the last complete write
    fn rollback_file(&mut self) {
        let SpillState::Open(Backing::File(w)) =
            std::mem::replace(&mut self.state, SpillState::Disposed)
        else {
            return;
        };
        match truncate_spill_file(w, self.len) {
            Ok(w) => self.state = SpillState::Open(Backing::File(w)),
            Err(err) => log::warn!("spill file could not be restored, buffer disposed: {}", err),
        }
    }

    /// Move the in-memory content into a fresh temporary file
    fn spill(&mut self) -> Result<()> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sheetstream-").suffix(".xml");
        let tmp = match &self.spill_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let mut writer = BufWriter::with_capacity(FILE_BUFFER_SIZE, tmp);

        if let SpillState::Open(Backing::Memory(buf)) = &self.state {
            writer.write_all(buf)?;
        }
        log::debug!(
            "spill buffer crossed {} bytes, continuing in {}",
            self.threshold,
            writer.get_ref().path().display()
        );
        // Dropping the old Vec releases the in-memory copy
        self.state = SpillState::Open(Backing::File(writer));
        Ok(())
    }

    /// Finish writing. Calling it again is a no-op; reading stays possible.
    pub fn close_for_write(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SpillState::Disposed) {
            SpillState::Open(mut backing) => {
                if let Backing::File(w) = &mut backing {
                    w.flush()?;
                }
                self.state = SpillState::Closed(backing);
                Ok(())
            }
            other => {
                let disposed = matches!(other, SpillState::Disposed);
                self.state = other;
                if disposed {
                    Err(ExcelError::ResourceClosed("spill buffer has been disposed"))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Sequential reader over everything written so far.
    ///
    /// Works while the buffer is still open for writing; a spilled buffer is
    /// read through an independent handle on the temporary file.
    pub fn reader(&mut self) -> Result<SpillReader<'_>> {
        match &mut self.state {
            SpillState::Open(backing) | SpillState::Closed(backing) => match backing {
                Backing::Memory(buf) => Ok(SpillReader::Memory(Cursor::new(buf.as_slice()))),
                Backing::File(w) => {
                    w.flush()?;
                    let file = w.get_ref().reopen()?;
                    Ok(SpillReader::File(BufReader::with_capacity(
                        FILE_BUFFER_SIZE,
                        file,
                    )))
                }
            },
            SpillState::Disposed => Err(ExcelError::ResourceClosed("spill buffer has been disposed")),
        }
    }

    /// Copy the whole content into `out` in bounded chunks
    pub fn drain_to<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        let mut reader = self.reader()?;
        let mut chunk = vec![0u8; DRAIN_CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            let bytes_read = reader.read(&mut chunk)?;
            if bytes_read == 0 {
                break;
            }
            out.write_all(&chunk[..bytes_read])?;
            total += bytes_read as u64;
        }

        Ok(total)
    }

    /// Release the content and remove the temporary file, if any
    pub fn dispose(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SpillState::Disposed) {
            SpillState::Open(Backing::File(w)) | SpillState::Closed(Backing::File(w)) => {
                let (tmp, _) = w.into_parts();
                tmp.close()?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Keep the first `len` bytes of a spill file, whether they already reached
/// the disk or still sit in the write buffer
fn truncate_spill_file(
    w: BufWriter<NamedTempFile>,
    len: u64,
) -> std::io::Result<BufWriter<NamedTempFile>> {
    let (mut tmp, buffered) = w.into_parts();
    let buffered = buffered.unwrap_or_else(|panicked| panicked.into_inner());
    let on_disk = tmp.stream_position()?;

    if on_disk >= len {
        tmp.as_file().set_len(len)?;
        tmp.seek(SeekFrom::Start(len))?;
        return Ok(BufWriter::with_capacity(FILE_BUFFER_SIZE, tmp));
    }
    let keep = ((len - on_disk) as usize).min(buffered.len());
    let mut writer = BufWriter::with_capacity(FILE_BUFFER_SIZE.max(keep), tmp);
    writer.write_all(&buffered[..keep])?;
    Ok(writer)
}

impl Default for SpillBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpillBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillBuffer")
            .field("len", &self.len)
            .field("threshold", &self.threshold)
            .field("spilled", &self.is_spilled())
            .field("closed", &self.is_closed())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Read handle returned by [`SpillBuffer::reader`]
pub enum SpillReader<'a> {
    Memory(Cursor<&'a [u8]>),
    File(BufReader<std::fs::File>),
}

impl Read for SpillReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            SpillReader::Memory(cursor) => cursor.read(buf),
            SpillReader::File(file) => file.read(buf),
        }
    }
}
