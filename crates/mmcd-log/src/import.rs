//! Legacy to native conversion

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use mmcd_core::{Sample, SensorTable, UnitSystem, MAX_SENSORS};
use serde::Serialize;
use tracing::info;

use crate::error::{CodecError, CodecResult};
use crate::legacy::{ImportPolicy, LegacyLog};
use crate::native::NativeWriter;

/// Result of a completed import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub name: String,
    pub samples: u32,
    pub indices: Vec<usize>,
}

/// Slots to record for a set of samples
///
/// Every slot present in at least one sample, in ascending order, plus the
/// derived duty-cycle slot when both of its sources were logged.
pub fn logged_indices(samples: &[Sample], table: &SensorTable) -> Vec<usize> {
    let mask = samples.iter().fold(0u32, |mask, s| mask | s.present_mask());
    let present: Vec<usize> = (0..MAX_SENSORS).filter(|&i| mask & (1 << i) != 0).collect();
    table.with_derived(&present)
}

/// Write a decoded legacy log as a native log
pub fn write_native<W: Write + Seek>(
    log: &LegacyLog,
    writer: W,
    table: &SensorTable,
    units: UnitSystem,
) -> CodecResult<(W, ImportSummary)> {
    if log.samples.is_empty() {
        return Err(CodecError::NoSamples);
    }

    let indices = logged_indices(&log.samples, table);
    let mut native = NativeWriter::new(writer, &indices, units)?;
    for sample in &log.samples {
        let mut sample = *sample;
        sample.compute_derived(table);
        native.write_sample(&sample)?;
    }

    let summary = ImportSummary {
        name: log.name().to_string(),
        samples: native.count(),
        indices,
    };
    Ok((native.finish()?, summary))
}

/// Convert a legacy `.pdb` file into a native log file
pub fn import_legacy(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    policy: &ImportPolicy,
    table: &SensorTable,
    units: UnitSystem,
) -> CodecResult<ImportSummary> {
    let log = LegacyLog::open(input.as_ref(), policy)?;
    if log.samples.is_empty() {
        return Err(CodecError::NoSamples);
    }

    let output = output.as_ref();
    let file = BufWriter::new(File::create(output)?);
    let (mut file, summary) = write_native(&log, file, table, units)?;
    file.flush()?;

    info!(
        output = %output.display(),
        name = %summary.name,
        samples = summary.samples,
        sensors = summary.indices.len(),
        "Legacy log imported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::PdbHeader;
    use crate::native::NativeLog;
    use chrono::{TimeZone, Utc};
    use mmcd_core::sensor::{SLOT_INJD, SLOT_INJP, SLOT_RPM};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn sample(slots: &[(usize, u8)]) -> Sample {
        let mut s = Sample::new(Utc.with_ymd_and_hms(2004, 3, 9, 8, 0, 0).unwrap());
        for &(idx, raw) in slots {
            s.set(idx, raw);
        }
        s
    }

    fn legacy(samples: Vec<Sample>) -> LegacyLog {
        LegacyLog {
            header: PdbHeader {
                name: "Track day".into(),
                attributes: 0,
                version: 0,
                created: 0,
                modified: 0,
                backed_up: 0,
                modification_number: 0,
                app_info_offset: 0,
                sort_info_offset: 0,
                unique_id_seed: 0,
                next_record_list: 0,
                record_count: 1,
            },
            samples,
            skipped_records: 0,
            dropped_samples: 0,
        }
    }

    #[test]
    fn test_logged_indices_union() {
        let table = SensorTable::default();
        let samples = vec![sample(&[(14, 1)]), sample(&[(4, 2), (14, 3)])];
        assert_eq!(logged_indices(&samples, &table), vec![4, 14]);
    }

    #[test]
    fn test_logged_indices_adds_duty_cycle() {
        let table = SensorTable::default();
        let samples = vec![sample(&[(SLOT_RPM, 32), (SLOT_INJP, 40), (21, 5)])];
        assert_eq!(
            logged_indices(&samples, &table),
            vec![SLOT_RPM, SLOT_INJP, SLOT_INJD, 21]
        );

        let rpm_only = vec![sample(&[(SLOT_RPM, 32)])];
        assert_eq!(logged_indices(&rpm_only, &table), vec![SLOT_RPM]);
    }

    #[test]
    fn test_logged_indices_no_duplicate_duty_cycle() {
        let table = SensorTable::default();
        let samples = vec![sample(&[(SLOT_RPM, 32), (SLOT_INJP, 40), (SLOT_INJD, 10)])];
        assert_eq!(
            logged_indices(&samples, &table),
            vec![SLOT_RPM, SLOT_INJP, SLOT_INJD]
        );
    }

    #[test]
    fn test_write_native_computes_duty_cycle() {
        let table = SensorTable::default();
        let log = legacy(vec![
            sample(&[(SLOT_RPM, 117), (SLOT_INJP, 1)]),
            sample(&[(SLOT_RPM, 100)]),
        ]);

        let (cursor, summary) =
            write_native(&log, Cursor::new(Vec::new()), &table, UnitSystem::Metric).unwrap();
        assert_eq!(summary.name, "Track day");
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.indices, vec![SLOT_RPM, SLOT_INJP, SLOT_INJD]);

        let native = NativeLog::read_from(Cursor::new(cursor.into_inner())).unwrap();
        assert_eq!(native.samples.len(), 2);
        assert_eq!(native.samples[0].get(SLOT_INJD), Some(1));
        assert_eq!(native.samples[1].get(SLOT_INJD), None);
    }

    #[test]
    fn test_empty_log_rejected() {
        let table = SensorTable::default();
        let err = write_native(
            &legacy(Vec::new()),
            Cursor::new(Vec::new()),
            &table,
            UnitSystem::Metric,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::NoSamples));
    }
}
