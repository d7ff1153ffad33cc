//! Ports command - list serial devices

use anyhow::{Context, Result};
use mmcd_ecu::transport::available_ports;

use crate::output::{OutputContext, PortRow};

/// List serial ports present on this machine
pub fn ports(ctx: &OutputContext) -> Result<()> {
    let ports = available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        ctx.info("No serial ports found");
        return Ok(());
    }

    let rows: Vec<PortRow> = ports.into_iter().map(|port| PortRow { port }).collect();
    ctx.print(&rows);
    Ok(())
}
