//! DTC command - read and erase fault codes

use anyhow::{Context, Result};
use mmcd_core::{DtcReport, SensorTable, DTC_TABLE};
use mmcd_ecu::{EcuConfig, Session};
use std::sync::Arc;

use crate::output::{DtcRow, OutputContext};

/// Print active and stored faults, optionally erasing them
pub async fn dtc(
    config: &EcuConfig,
    table: Arc<SensorTable>,
    erase: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let session = Session::connect(config, table).await?;
    let result = run(&session, erase, ctx).await;
    session.close().await?;
    result
}

async fn run(session: &Session, erase: bool, ctx: &OutputContext) -> Result<()> {
    let ecu = session.ecu().context("Session has no ECU")?;

    let report = ecu.read_dtcs().await.context("Failed to read fault codes")?;
    print_report(&report, ctx);

    if !erase {
        return Ok(());
    }
    if report.is_clear() {
        ctx.info("Nothing to erase");
        return Ok(());
    }
    if !ctx.confirm("Erase all stored fault codes? The engine must be off.")? {
        ctx.warn("Erase cancelled");
        return Ok(());
    }

    ecu.erase_dtcs().await.context("Failed to erase fault codes")?;
    ctx.success("Fault codes erased");

    let after = ecu.read_dtcs().await.context("Failed to re-read fault codes")?;
    print_report(&after, ctx);
    Ok(())
}

fn print_report(report: &DtcReport, ctx: &OutputContext) {
    if report.is_clear() {
        ctx.success("No fault codes");
        return;
    }
    ctx.print(&rows(report));
}

fn rows(report: &DtcReport) -> Vec<DtcRow> {
    let flag = |set: bool| if set { "Yes" } else { "No" }.to_string();
    DTC_TABLE
        .iter()
        .filter_map(|entry| {
            let active = report.active.contains(entry);
            let stored = report.stored.contains(entry);
            (active || stored).then(|| DtcRow {
                code: entry.code.to_string(),
                description: entry.description.to_string(),
                active: flag(active),
                stored: flag(stored),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rows_merge_active_and_stored() {
        let report = DtcReport::from_bitmaps(0b0001, 0b1001);
        let rows = rows(&report);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "11");
        assert_eq!(rows[0].active, "Yes");
        assert_eq!(rows[0].stored, "Yes");
        assert_eq!(rows[1].code, "14");
        assert_eq!(rows[1].active, "No");
    }

    #[test]
    fn test_clear_report_has_no_rows() {
        assert!(rows(&DtcReport::from_bitmaps(0, 0)).is_empty());
    }
}
