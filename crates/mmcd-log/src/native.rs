//! Native `.mmcd` binary log
//!
//! Little-endian layout:
//!
//! ```text
//! header (16 bytes)
//!   [0..4)   magic "MMCD"
//!   [4]      version
//!   [5]      unit system tag
//!   [6..8)   u16 number of logged slot indices
//!   [8..12)  u32 sample count, 0 until the writer is finished
//!   [12..16) reserved
//! index table, one byte per logged slot
//! records (48 bytes each)
//!   [0..8)   i64 nanoseconds since the Unix epoch
//!   [8..12)  u32 presence mask
//!   [12..16) reserved
//!   [16..48) raw sensor bytes
//! ```
//!
//! The header count is only reliable once the writer has been finished, so
//! readers count records themselves.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};
use chrono::{TimeZone, Utc};
use mmcd_core::{Sample, UnitSystem, MAX_SENSORS};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CodecError, CodecResult};

pub const NATIVE_MAGIC: &[u8; 4] = b"MMCD";
pub const NATIVE_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 16;
pub const RECORD_SIZE: usize = 48;
/// Offset of the sample count rewritten on finish
const COUNT_OFFSET: u64 = 8;

/// Decoded native log header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeHeader {
    pub version: u8,
    pub units: UnitSystem,
    /// Logged slots, in column order
    pub indices: Vec<usize>,
    /// Count stored in the header (0 when the writer was not finished)
    pub declared_count: u32,
}

/// Appends samples to a native log
///
/// The header and index table are written on creation; [`finish`] patches
/// the sample count. A writer dropped without `finish` leaves a valid log
/// whose header count is 0.
///
/// [`finish`]: NativeWriter::finish
pub struct NativeWriter<W: Write + Seek> {
    inner: W,
    count: u32,
}

impl NativeWriter<BufWriter<File>> {
    /// Create (or truncate) a log file
    pub fn create(path: impl AsRef<Path>, indices: &[usize], units: UnitSystem) -> CodecResult<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let writer = Self::new(BufWriter::new(file), indices, units)?;
        info!(path = %path.display(), sensors = indices.len(), "Native log created");
        Ok(writer)
    }
}

impl<W: Write + Seek> NativeWriter<W> {
    /// Write the header and index table to `inner`
    pub fn new(mut inner: W, indices: &[usize], units: UnitSystem) -> CodecResult<Self> {
        let index_count =
            u16::try_from(indices.len()).map_err(|_| CodecError::TooManyIndices(indices.len()))?;
        if let Some(&bad) = indices.iter().find(|&&idx| idx >= MAX_SENSORS) {
            return Err(CodecError::InvalidIndex(bad));
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + indices.len());
        buf.put_slice(NATIVE_MAGIC);
        buf.put_u8(NATIVE_VERSION);
        buf.put_u8(units.to_tag());
        buf.put_u16_le(index_count);
        buf.put_u32_le(0);
        buf.put_bytes(0, 4);
        for &idx in indices {
            buf.put_u8(idx as u8);
        }
        inner.write_all(&buf)?;

        Ok(Self { inner, count: 0 })
    }

    /// Append one record
    pub fn write_sample(&mut self, sample: &Sample) -> CodecResult<()> {
        let nanos = sample
            .time()
            .timestamp_nanos_opt()
            .ok_or(CodecError::TimestampOutOfRange)?;

        let mut buf = BytesMut::with_capacity(RECORD_SIZE);
        buf.put_i64_le(nanos);
        buf.put_u32_le(sample.present_mask());
        buf.put_bytes(0, 4);
        buf.put_slice(sample.raw_bytes());
        self.inner.write_all(&buf)?;

        self.count += 1;
        Ok(())
    }

    /// Records written so far
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Patch the header count, flush, and hand back the inner writer
    pub fn finish(mut self) -> CodecResult<W> {
        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(COUNT_OFFSET))?;
        self.inner.write_all(&self.count.to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()?;
        debug!(samples = self.count, "Native log finished");
        Ok(self.inner)
    }
}

/// Streaming reader over a native log
pub struct NativeReader<R: Read> {
    header: NativeHeader,
    inner: R,
    done: bool,
}

impl NativeReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> CodecResult<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> NativeReader<R> {
    /// Read and validate the header and index table
    pub fn new(mut inner: R) -> CodecResult<Self> {
        let mut header = [0u8; HEADER_SIZE];
        let got = read_up_to(&mut inner, &mut header)?;
        if got >= NATIVE_MAGIC.len() && &header[..4] != NATIVE_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&header[..4]);
            return Err(CodecError::BadMagic { found });
        }
        if got < HEADER_SIZE {
            return Err(CodecError::Truncated {
                section: "header",
                expected: HEADER_SIZE,
                got,
            });
        }

        let mut buf = &header[4..];
        let version = buf.get_u8();
        let units = UnitSystem::from_tag(buf.get_u8());
        let index_count = usize::from(buf.get_u16_le());
        let declared_count = buf.get_u32_le();

        let mut table = vec![0u8; index_count];
        let got = read_up_to(&mut inner, &mut table)?;
        if got < index_count {
            return Err(CodecError::Truncated {
                section: "index table",
                expected: index_count,
                got,
            });
        }

        Ok(Self {
            header: NativeHeader {
                version,
                units,
                indices: table.into_iter().map(usize::from).collect(),
                declared_count,
            },
            inner,
            done: false,
        })
    }

    pub fn header(&self) -> &NativeHeader {
        &self.header
    }

    /// Next record, or `None` at end of file
    ///
    /// A trailing partial record (interrupted write) is treated as end of
    /// file.
    pub fn next_sample(&mut self) -> CodecResult<Option<Sample>> {
        if self.done {
            return Ok(None);
        }
        let mut record = [0u8; RECORD_SIZE];
        let got = read_up_to(&mut self.inner, &mut record)?;
        if got < RECORD_SIZE {
            if got > 0 {
                debug!(bytes = got, "Ignoring partial trailing record");
            }
            self.done = true;
            return Ok(None);
        }

        let mut buf = &record[..];
        let nanos = buf.get_i64_le();
        let present = buf.get_u32_le();
        buf.advance(4);
        let mut raw = [0u8; MAX_SENSORS];
        buf.copy_to_slice(&mut raw);

        Ok(Some(Sample::from_parts(Utc.timestamp_nanos(nanos), present, raw)))
    }
}

impl<R: Read> Iterator for NativeReader<R> {
    type Item = CodecResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_sample() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// A native log read fully into memory
#[derive(Debug, Clone)]
pub struct NativeLog {
    pub header: NativeHeader,
    pub samples: Vec<Sample>,
}

impl NativeLog {
    pub fn open(path: impl AsRef<Path>) -> CodecResult<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }

    pub fn read_from<R: Read>(reader: R) -> CodecResult<Self> {
        let mut reader = NativeReader::new(reader)?;
        let mut samples = Vec::with_capacity(reader.header().declared_count as usize);
        while let Some(sample) = reader.next_sample()? {
            samples.push(sample);
        }
        Ok(Self {
            header: reader.header,
            samples,
        })
    }

    pub fn units(&self) -> UnitSystem {
        self.header.units
    }

    pub fn indices(&self) -> &[usize] {
        &self.header.indices
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
