//! Probe command - check the ECU answers

use anyhow::Result;
use mmcd_core::SensorTable;
use mmcd_ecu::protocol::PROBE_ADDRESS;
use mmcd_ecu::{EcuConfig, Session};
use std::sync::Arc;

use crate::output::OutputContext;

/// Open the port and query engine speed once
pub async fn probe(config: &EcuConfig, table: Arc<SensorTable>, ctx: &OutputContext) -> Result<()> {
    let mut config = config.clone();
    config.connection.probe_on_connect = false;

    ctx.info(&format!("Probing ECU on {}...", config.connection.port));
    let session = Session::connect(&config, Arc::clone(&table)).await?;
    let Some(ecu) = session.ecu().cloned() else {
        anyhow::bail!("Session has no ECU");
    };

    let result = ecu.probe().await;
    session.close().await?;
    let raw = result?;

    let rpm = table
        .find_by_address(PROBE_ADDRESS)
        .map(|(_, def)| def.format(raw, config.units))
        .unwrap_or_else(|| raw.to_string());
    ctx.success(&format!("ECU responded, engine speed {rpm}"));
    Ok(())
}
