//! Legacy PalmOS log import tests
//!
//! Run with: cargo test -p mmcd-tests --test import_test

use chrono::{TimeZone, Utc};
use mmcd_core::sensor::{SLOT_INJD, SLOT_INJP, SLOT_RPM};
use mmcd_core::{SensorTable, UnitSystem};
use mmcd_log::{import_legacy, CodecError, ImportPolicy, LegacyLog, NativeLog};
use pretty_assertions::assert_eq;

const PALM_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Builds PalmOS stream databases the way the handheld application wrote them
struct PdbBuilder {
    name: String,
    records: Vec<Vec<u8>>,
}

impl PdbBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Vec::new(),
        }
    }

    /// Add a data block holding `(palm seconds, presence mask, raw bytes)` entries
    fn block(mut self, entries: &[(u32, u32, [u8; 32])]) -> Self {
        let mut body = Vec::new();
        for (time, present, raw) in entries {
            body.extend_from_slice(&time.to_be_bytes());
            body.extend_from_slice(&present.to_be_bytes());
            body.extend_from_slice(raw);
        }
        let mut record = b"DBLK".to_vec();
        record.extend_from_slice(&(body.len() as u32).to_be_bytes());
        record.extend_from_slice(&body);
        self.records.push(record);
        self
    }

    /// Add a record that is not a data block
    fn raw_record(mut self, bytes: &[u8]) -> Self {
        self.records.push(bytes.to_vec());
        self
    }

    fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; 78];
        out[..self.name.len()].copy_from_slice(self.name.as_bytes());
        out[60..64].copy_from_slice(b"strm");
        out[64..68].copy_from_slice(b"MMCd");
        out[76..78].copy_from_slice(&(self.records.len() as u16).to_be_bytes());

        let mut offset = 78 + self.records.len() * 8;
        for (i, record) in self.records.iter().enumerate() {
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            out.extend_from_slice(&[0x40, 0, 0, i as u8]);
            offset += record.len();
        }
        for record in &self.records {
            out.extend_from_slice(record);
        }
        out
    }
}

fn palm_seconds(year: i32, month: u32, day: u32, secs: u32) -> u32 {
    let unix = Utc
        .with_ymd_and_hms(year, month, day, 0, 0, 0)
        .unwrap()
        .timestamp();
    (unix + PALM_EPOCH_OFFSET) as u32 + secs
}

fn raw_with(slots: &[(usize, u8)]) -> [u8; 32] {
    let mut raw = [0u8; 32];
    for &(idx, value) in slots {
        raw[idx] = value;
    }
    raw
}

fn mask(slots: &[usize]) -> u32 {
    slots.iter().fold(0, |m, &idx| m | (1 << idx))
}

#[test]
fn test_import_to_native() {
    let t = palm_seconds(2002, 8, 17, 0);
    let engine = mask(&[SLOT_RPM, SLOT_INJP]);
    let pdb = PdbBuilder::new("Dyno pull")
        .block(&[
            (t, engine, raw_with(&[(SLOT_RPM, 117), (SLOT_INJP, 2)])),
            (t + 1, engine | mask(&[14]), raw_with(&[(SLOT_RPM, 200), (SLOT_INJP, 100), (14, 80)])),
        ])
        .block(&[(t + 2, mask(&[4]), raw_with(&[(4, 0x60)]))])
        .build();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("dyno.pdb");
    let output = dir.path().join("dyno.mmcd");
    std::fs::write(&input, pdb).unwrap();

    let table = SensorTable::default();
    let summary = import_legacy(
        &input,
        &output,
        &ImportPolicy::default(),
        &table,
        UnitSystem::Metric,
    )
    .unwrap();
    assert_eq!(summary.name, "Dyno pull");
    assert_eq!(summary.samples, 3);
    assert_eq!(summary.indices, vec![4, 14, SLOT_RPM, SLOT_INJP, SLOT_INJD]);

    let log = NativeLog::open(&output).unwrap();
    assert_eq!(log.indices(), summary.indices.as_slice());
    assert_eq!(log.samples.len(), 3);
    assert_eq!(
        log.samples[0].time(),
        Utc.with_ymd_and_hms(2002, 8, 17, 0, 0, 0).unwrap()
    );
    assert_eq!(log.samples[0].get(SLOT_INJD), Some(2));
    // 100 * 200 / 117 = 170
    assert_eq!(log.samples[1].get(SLOT_INJD), Some(170));
    assert_eq!(log.samples[1].get(14), Some(80));
    assert_eq!(log.samples[2].get(SLOT_INJD), None);
    assert_eq!(log.samples[2].get(4), Some(0x60));
}

#[test]
fn test_garbage_entries_and_records_skipped() {
    let t = palm_seconds(1999, 1, 1, 60);
    let future = palm_seconds(2031, 1, 1, 0);
    let pdb = PdbBuilder::new("Garbage")
        .raw_record(b"JUNKJUNKJUNK")
        .block(&[
            (0, 1, raw_with(&[])),
            (t, 0, raw_with(&[])),
            (t, u32::MAX, [0xFF; 32]),
            (future, 1, raw_with(&[])),
            (t, mask(&[SLOT_RPM]), raw_with(&[(SLOT_RPM, 64)])),
        ])
        .build();

    let log = LegacyLog::parse(&pdb, &ImportPolicy::default()).unwrap();
    assert_eq!(log.skipped_records, 1);
    assert_eq!(log.dropped_samples, 4);
    assert_eq!(log.samples.len(), 1);
    assert_eq!(log.samples[0].get(SLOT_RPM), Some(64));
}

#[test]
fn test_custom_policy_widens_year_range() {
    let old = palm_seconds(1990, 6, 1, 0);
    let pdb = PdbBuilder::new("Old")
        .block(&[(old, 1, raw_with(&[]))])
        .build();

    let strict = LegacyLog::parse(&pdb, &ImportPolicy::default()).unwrap();
    assert!(strict.samples.is_empty());

    let policy = ImportPolicy {
        min_year: 1980,
        ..ImportPolicy::default()
    };
    let wide = LegacyLog::parse(&pdb, &policy).unwrap();
    assert_eq!(wide.samples.len(), 1);
}

#[test]
fn test_import_without_samples_fails() {
    let pdb = PdbBuilder::new("Empty").block(&[]).build();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.pdb");
    let output = dir.path().join("empty.mmcd");
    std::fs::write(&input, pdb).unwrap();

    let err = import_legacy(
        &input,
        &output,
        &ImportPolicy::default(),
        &SensorTable::default(),
        UnitSystem::Metric,
    )
    .unwrap_err();
    assert!(matches!(err, CodecError::NoSamples));
    assert!(!output.exists());
}

#[test]
fn test_not_a_legacy_log() {
    let mut pdb = PdbBuilder::new("Memo").build();
    pdb[60..64].copy_from_slice(b"DATA");

    let err = LegacyLog::parse(&pdb, &ImportPolicy::default()).unwrap_err();
    assert!(matches!(err, CodecError::NotLegacyLog { .. }));
}
