//! Sensors command - print the sensor table

use anyhow::Result;
use mmcd_core::SensorTable;

use crate::output::{OutputContext, SensorRow};

/// Print every active slot of the sensor table
pub fn sensors(table: &SensorTable, ctx: &OutputContext) -> Result<()> {
    let rows: Vec<SensorRow> = table
        .iter()
        .filter(|(_, def)| def.exists)
        .map(|(slot, def)| SensorRow {
            slot,
            address: match def.address {
                Some(addr) if !def.computed => format!("0x{addr:02X}"),
                _ => "-".to_string(),
            },
            slug: def.slug.to_string(),
            description: def.description.to_string(),
            unit: def.unit.to_string(),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
