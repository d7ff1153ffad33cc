//! Legacy PalmOS log import
//!
//! Logs recorded by the original handheld application are PalmOS stream
//! databases (`.pdb`, type `strm`, creator `MMCd`). Everything is
//! big-endian:
//!
//! ```text
//! header (78 bytes)
//!   [0..32)   NUL-terminated name
//!   [32..34)  attributes        [34..36)  version
//!   [36..40)  created           [40..44)  modified
//!   [44..48)  backed up         [48..52)  modification number
//!   [52..56)  app info offset   [56..60)  sort info offset
//!   [60..64)  type "strm"       [64..68)  creator "MMCd"
//!   [68..72)  unique id seed    [72..76)  next record list id
//!   [76..78)  u16 record count
//! record index, 8 bytes per record
//!   u32 data offset, u8 attributes, 3-byte unique id
//! record bodies
//!   "DBLK" + u32 length, then packed 40-byte samples:
//!   u32 seconds since 1904-01-01, u32 presence mask, 32 raw bytes
//! ```
//!
//! A record ends where the next one starts, the last one at end of file.

use std::path::Path;

use bytes::Buf;
use chrono::{DateTime, Datelike, Utc};
use mmcd_core::{Sample, MAX_SENSORS};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{CodecError, CodecResult};

pub const PDB_HEADER_SIZE: usize = 78;
pub const RECORD_ENTRY_SIZE: usize = 8;
pub const BLOCK_HEADER_SIZE: usize = 8;
pub const LEGACY_SAMPLE_SIZE: usize = 40;

pub const PDB_TYPE: &[u8; 4] = b"strm";
pub const PDB_CREATOR: &[u8; 4] = b"MMCd";
pub const BLOCK_TAG: &[u8; 4] = b"DBLK";

/// Seconds between the PalmOS epoch (1904-01-01) and the Unix epoch
pub const PALM_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Convert a PalmOS timestamp
pub fn palm_time(seconds: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(seconds) - PALM_EPOCH_OFFSET, 0)
}

/// Filters for the garbage found in real legacy logs
///
/// Uninitialised handheld memory shows up as zeroed entries, entries with
/// every presence bit set (slots 23-31 never existed) and absurd dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportPolicy {
    /// Drop entries with a zero timestamp or an empty presence mask
    pub drop_empty: bool,
    /// Drop entries whose presence mask is all ones
    pub drop_all_present: bool,
    /// Earliest plausible year
    pub min_year: i32,
    /// Latest plausible year
    pub max_year: i32,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            drop_empty: true,
            drop_all_present: true,
            min_year: 1995,
            max_year: 2030,
        }
    }
}

impl ImportPolicy {
    /// Keep everything that decodes
    pub fn permissive() -> Self {
        Self {
            drop_empty: false,
            drop_all_present: false,
            min_year: i32::MIN,
            max_year: i32::MAX,
        }
    }

    /// Timestamp of an entry the policy keeps, `None` when it is dropped
    pub fn accept(&self, palm_seconds: u32, present: u32) -> Option<DateTime<Utc>> {
        if self.drop_empty && (palm_seconds == 0 || present == 0) {
            return None;
        }
        if self.drop_all_present && present == u32::MAX {
            return None;
        }
        let time = palm_time(palm_seconds)?;
        (self.min_year..=self.max_year)
            .contains(&time.year())
            .then_some(time)
    }
}

/// Decoded PDB header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdbHeader {
    pub name: String,
    pub attributes: u16,
    pub version: u16,
    pub created: u32,
    pub modified: u32,
    pub backed_up: u32,
    pub modification_number: u32,
    pub app_info_offset: u32,
    pub sort_info_offset: u32,
    pub unique_id_seed: u32,
    pub next_record_list: u32,
    pub record_count: u16,
}

impl PdbHeader {
    fn parse(data: &[u8]) -> CodecResult<Self> {
        if data.len() < PDB_HEADER_SIZE {
            return Err(CodecError::Truncated {
                section: "PDB header",
                expected: PDB_HEADER_SIZE,
                got: data.len(),
            });
        }

        let type_code = &data[60..64];
        let creator = &data[64..68];
        if type_code != PDB_TYPE || creator != PDB_CREATOR {
            return Err(CodecError::NotLegacyLog {
                type_code: String::from_utf8_lossy(type_code).into_owned(),
                creator: String::from_utf8_lossy(creator).into_owned(),
            });
        }

        let raw_name = &data[..32];
        let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(&raw_name[..name_len]).into_owned();

        let mut buf = &data[32..PDB_HEADER_SIZE];
        let attributes = buf.get_u16();
        let version = buf.get_u16();
        let created = buf.get_u32();
        let modified = buf.get_u32();
        let backed_up = buf.get_u32();
        let modification_number = buf.get_u32();
        let app_info_offset = buf.get_u32();
        let sort_info_offset = buf.get_u32();
        buf.advance(8);
        let unique_id_seed = buf.get_u32();
        let next_record_list = buf.get_u32();
        let record_count = buf.get_u16();

        Ok(Self {
            name,
            attributes,
            version,
            created,
            modified,
            backed_up,
            modification_number,
            app_info_offset,
            sort_info_offset,
            unique_id_seed,
            next_record_list,
            record_count,
        })
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        palm_time(self.created)
    }
}

/// One record index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordEntry {
    pub offset: u32,
    pub attributes: u8,
    pub unique_id: u32,
}

/// A legacy log decoded into samples
#[derive(Debug, Clone)]
pub struct LegacyLog {
    pub header: PdbHeader,
    pub samples: Vec<Sample>,
    /// Records without a data block tag, or with no usable extent
    pub skipped_records: usize,
    /// Entries rejected by the import policy
    pub dropped_samples: usize,
}

impl LegacyLog {
    pub fn open(path: impl AsRef<Path>, policy: &ImportPolicy) -> CodecResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let log = Self::parse(&data, policy)?;
        info!(
            path = %path.display(),
            name = %log.header.name,
            samples = log.samples.len(),
            dropped = log.dropped_samples,
            skipped_records = log.skipped_records,
            "Legacy log read"
        );
        Ok(log)
    }

    /// Decode a complete PDB image
    pub fn parse(data: &[u8], policy: &ImportPolicy) -> CodecResult<Self> {
        let header = PdbHeader::parse(data)?;
        let entries = read_record_index(data, header.record_count)?;

        let mut log = Self {
            header,
            samples: Vec::new(),
            skipped_records: 0,
            dropped_samples: 0,
        };

        for (i, entry) in entries.iter().enumerate() {
            let start = entry.offset as usize;
            let end = entries
                .get(i + 1)
                .map_or(data.len(), |next| next.offset as usize)
                .min(data.len());

            if start >= end || end - start < BLOCK_HEADER_SIZE {
                debug!(record = i, start, end, "Skipping record with no data block");
                log.skipped_records += 1;
                continue;
            }

            let record = &data[start..end];
            if &record[..4] != BLOCK_TAG {
                warn!(
                    record = i,
                    tag = %String::from_utf8_lossy(&record[..4]),
                    "Skipping record without DBLK tag"
                );
                log.skipped_records += 1;
                continue;
            }

            for chunk in record[BLOCK_HEADER_SIZE..].chunks_exact(LEGACY_SAMPLE_SIZE) {
                let mut buf = chunk;
                let palm_seconds = buf.get_u32();
                let present = buf.get_u32();
                let mut raw = [0u8; MAX_SENSORS];
                buf.copy_to_slice(&mut raw);

                match policy.accept(palm_seconds, present) {
                    Some(time) => log.samples.push(Sample::from_parts(time, present, raw)),
                    None => log.dropped_samples += 1,
                }
            }
        }

        Ok(log)
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Union of every sample's presence mask
    pub fn present_mask(&self) -> u32 {
        self.samples.iter().fold(0, |mask, s| mask | s.present_mask())
    }
}

fn read_record_index(data: &[u8], count: u16) -> CodecResult<Vec<RecordEntry>> {
    let count = usize::from(count);
    let needed = count * RECORD_ENTRY_SIZE;
    let available = data.len().saturating_sub(PDB_HEADER_SIZE);
    if available < needed {
        return Err(CodecError::Truncated {
            section: "record index",
            expected: needed,
            got: available,
        });
    }

    let mut buf = &data[PDB_HEADER_SIZE..PDB_HEADER_SIZE + needed];
    let entries = (0..count)
        .map(|_| {
            let offset = buf.get_u32();
            let attributes = buf.get_u8();
            let unique_id = (u32::from(buf.get_u8()) << 16) | u32::from(buf.get_u16());
            RecordEntry {
                offset,
                attributes,
                unique_id,
            }
        })
        .collect();
    Ok(entries)
}
