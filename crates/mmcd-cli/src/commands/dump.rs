//! Dump command - print a native log

use anyhow::{Context, Result};
use mmcd_core::{Sample, SensorTable, UnitSystem};
use mmcd_log::NativeReader;
use serde::Serialize;
use std::path::Path;

use crate::output::OutputContext;

#[derive(Serialize)]
struct HeaderInfo<'a> {
    path: String,
    version: u8,
    units: UnitSystem,
    sensors: Vec<&'a str>,
    declared_count: u32,
}

/// Print a native log's header and up to `limit` samples
pub fn dump(
    path: &Path,
    limit: Option<usize>,
    table: &SensorTable,
    ctx: &OutputContext,
) -> Result<()> {
    let reader =
        NativeReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let header = reader.header().clone();

    let slugs: Vec<&str> = header
        .indices
        .iter()
        .map(|&idx| table.get(idx).map_or("?", |def| def.slug))
        .collect();

    if !ctx.quiet {
        let info = HeaderInfo {
            path: path.display().to_string(),
            version: header.version,
            units: header.units,
            sensors: slugs.clone(),
            declared_count: header.declared_count,
        };
        ctx.print_kv(
            &[
                ("File", info.path.clone()),
                ("Version", info.version.to_string()),
                ("Units", info.units.to_string()),
                ("Sensors", slugs.join(" ")),
                ("Samples (header)", info.declared_count.to_string()),
            ],
            &info,
        );
    }

    let samples = reader
        .take(limit.unwrap_or(usize::MAX))
        .collect::<Result<Vec<Sample>, _>>()
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;

    let headers: Vec<String> = std::iter::once("time".to_string())
        .chain(slugs.iter().map(|s| s.to_string()))
        .collect();
    let rows: Vec<Vec<String>> = samples
        .iter()
        .map(|sample| sample_row(sample, &header.indices, table, header.units))
        .collect();

    ctx.print_grid(&headers, &rows);
    Ok(())
}

fn sample_row(
    sample: &Sample,
    indices: &[usize],
    table: &SensorTable,
    units: UnitSystem,
) -> Vec<String> {
    std::iter::once(sample.time().format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .chain(indices.iter().map(|&idx| {
            match (sample.get(idx), table.get(idx)) {
                (Some(raw), Some(def)) => def.format(raw, units),
                (Some(raw), None) => raw.to_string(),
                (None, _) => "-".to_string(),
            }
        }))
        .collect()
}
