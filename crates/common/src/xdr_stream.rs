//! Size-prefixed XDR frame streams.
//!
//! Ledger snapshots and change batches are fed to the ingester as files of
//! framed XDR values, the record-marking format stellar-core uses for its
//! meta streams:
//!
//! ```text
//! [4-byte big-endian size, bit 31 set] [XDR payload]
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use stellar_xdr::curr::{Limits, ReadXdr, WriteXdr};

const CONTINUATION_BIT: u32 = 0x8000_0000;

/// Writes XDR values as size-prefixed frames.
pub struct XdrOutputStream<W: Write> {
    writer: BufWriter<W>,
}

impl XdrOutputStream<File> {
    /// Creates (or truncates) `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> XdrOutputStream<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Encodes `value` and writes one frame. Returns the bytes written,
    /// header included.
    pub fn write_one<T: WriteXdr>(&mut self, value: &T) -> io::Result<usize> {
        let payload = value
            .to_xdr(Limits::none())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let size = u32::try_from(payload.len())
            .ok()
            .filter(|sz| sz & CONTINUATION_BIT == 0)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("XDR frame of {} bytes is too large", payload.len()),
                )
            })?;

        self.writer.write_all(&(size | CONTINUATION_BIT).to_be_bytes())?;
        self.writer.write_all(&payload)?;
        Ok(4 + payload.len())
    }

    /// Flushes and returns the inner writer.
    pub fn finish(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Reads size-prefixed XDR frames.
pub struct XdrInputStream<R: Read> {
    reader: BufReader<R>,
}

impl XdrInputStream<File> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> XdrInputStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Reads one value. `Ok(None)` at a clean end of stream; a truncated
    /// payload is an error.
    pub fn read_one<T: ReadXdr>(&mut self) -> io::Result<Option<T>> {
        let mut header = [0u8; 4];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let size = u32::from_be_bytes(header) & !CONTINUATION_BIT;

        let mut payload = vec![0u8; size as usize];
        self.reader.read_exact(&mut payload)?;
        let value = T::from_xdr(&payload, Limits::none())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(value))
    }

    /// Reads every remaining frame.
    pub fn read_all<T: ReadXdr>(&mut self) -> io::Result<Vec<T>> {
        let mut values = Vec::new();
        while let Some(value) = self.read_one()? {
            values.push(value);
        }
        Ok(values)
    }
}
