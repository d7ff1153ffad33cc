//! Import command - convert a legacy PalmOS log

use anyhow::{Context, Result};
use mmcd_core::{SensorTable, UnitSystem};
use mmcd_log::{import_legacy, ImportPolicy};
use std::path::Path;

use crate::output::OutputContext;

/// Convert a legacy `.pdb` log into a native log
pub fn import(
    input: &Path,
    output: &Path,
    table: &SensorTable,
    units: UnitSystem,
    ctx: &OutputContext,
) -> Result<()> {
    ctx.info(&format!("Importing {}...", input.display()));
    let summary = import_legacy(input, output, &ImportPolicy::default(), table, units)
        .with_context(|| format!("Failed to import {}", input.display()))?;

    let slugs: Vec<&str> = summary
        .indices
        .iter()
        .filter_map(|&idx| table.get(idx).map(|def| def.slug))
        .collect();

    ctx.print_kv(
        &[
            ("Name", summary.name.clone()),
            ("Samples", summary.samples.to_string()),
            ("Sensors", slugs.join(" ")),
            ("Output", output.display().to_string()),
        ],
        &summary,
    );
    Ok(())
}
