//! Log command - sample the ECU (or the simulator) into a native log

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use mmcd_core::{Sample, SensorTable};
use mmcd_ecu::{EcuConfig, EngineStats, SamplingConfig, Session};
use mmcd_log::NativeWriter;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::output::OutputContext;

/// Options for one logging run
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub output: PathBuf,
    /// Sensor slugs, the common set when empty
    pub sensors: Vec<String>,
    pub duration: Option<Duration>,
    /// Use the synthetic source instead of the serial port
    pub demo: bool,
}

/// Why a logging run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Interrupted,
    DurationElapsed,
    Disconnected,
    WriteFailed,
}

/// Run the sampling engine and write every sample to a native log
pub async fn log(
    config: &EcuConfig,
    table: Arc<SensorTable>,
    options: &LogOptions,
    ctx: &OutputContext,
) -> Result<()> {
    let indices = resolve_sensors(&table, &options.sensors)?;
    let logged = table.with_derived(&indices);

    let session = if options.demo {
        ctx.info("Using simulated ECU");
        let mut sampling = SamplingConfig::synthetic();
        sampling.watchdog_threshold = config.sampling.watchdog_threshold;
        Session::simulated(Arc::clone(&table), sampling)
    } else {
        ctx.info(&format!("Connecting to ECU on {}...", config.connection.port));
        Session::connect(config, Arc::clone(&table)).await?
    };

    let writer = match NativeWriter::create(&options.output, &logged, config.units) {
        Ok(writer) => writer,
        Err(e) => {
            session.close().await?;
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to create {}", options.output.display())));
        }
    };

    let slugs: Vec<&str> = logged
        .iter()
        .filter_map(|&idx| table.get(idx).map(|def| def.slug))
        .collect();
    ctx.info(&format!(
        "Logging {} to {}, press Ctrl+C to stop",
        slugs.join(" "),
        options.output.display()
    ));

    record(session, writer, indices, options.duration, &options.output, ctx).await
}

/// Sample until interrupted, timed out, disconnected or the log cannot be
/// written; the log is finished and the session closed in every case
async fn record<W: Write + Seek>(
    session: Session,
    mut writer: NativeWriter<W>,
    indices: Vec<usize>,
    duration: Option<Duration>,
    output: &Path,
    ctx: &OutputContext,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Sample>();
    let disconnected = Arc::new(Notify::new());

    let engine = session.engine();
    engine.on_sample(move |sample| {
        // receiver gone means the run is finishing
        let _ = tx.send(*sample);
    });
    engine.on_error(|err| debug!(error = %err, "Poll cycle failed"));
    {
        let disconnected = Arc::clone(&disconnected);
        engine.on_disconnect(move || disconnected.notify_one());
    }
    engine.set_indices(indices);
    engine.start();

    let progress = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner().template("{spinner:.green} {elapsed} {msg}");
        if let Ok(style) = style {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(200));
        pb
    };

    let deadline = duration.map(|d| tokio::time::Instant::now() + d);
    let ctrl_c = tokio::signal::ctrl_c();
    let timer = sleep_until(deadline);
    tokio::pin!(ctrl_c, timer);

    let mut write_error = None;
    let reason = loop {
        tokio::select! {
            Some(sample) = rx.recv() => {
                if let Err(e) = writer.write_sample(&sample) {
                    write_error = Some(e);
                    break StopReason::WriteFailed;
                }
                let count = writer.count();
                if count % 10 == 0 {
                    progress.set_message(format!("{count} samples"));
                }
            }
            _ = &mut ctrl_c => break StopReason::Interrupted,
            _ = &mut timer => break StopReason::DurationElapsed,
            _ = disconnected.notified() => break StopReason::Disconnected,
        }
    };
    progress.finish_and_clear();

    engine.stop().await;
    let stats = engine.stats();
    if write_error.is_none() {
        while let Ok(sample) = rx.try_recv() {
            if let Err(e) = writer.write_sample(&sample) {
                write_error = Some(e);
                break;
            }
        }
    }
    let samples = writer.count();
    let finished = writer.finish();
    let closed = session.close().await;

    if let Some(e) = write_error {
        return Err(anyhow::Error::new(e).context(format!("Failed to write {}", output.display())));
    }
    finished.with_context(|| format!("Failed to finish {}", output.display()))?;
    closed?;

    match reason {
        StopReason::Interrupted => ctx.info("Interrupted"),
        StopReason::DurationElapsed => ctx.info("Duration reached"),
        StopReason::Disconnected => ctx.error("ECU stopped responding, logging aborted"),
        StopReason::WriteFailed => {}
    }
    print_stats(&stats, samples, ctx);

    if reason == StopReason::Disconnected {
        anyhow::bail!("ECU disconnected");
    }
    Ok(())
}

/// Slugs to slot indices, the common set when none are given
fn resolve_sensors(table: &SensorTable, slugs: &[String]) -> Result<Vec<usize>> {
    if slugs.is_empty() {
        return Ok(table.common_indices());
    }
    let (indices, unknown) = table.slugs_to_indices(slugs);
    if !unknown.is_empty() {
        anyhow::bail!(
            "Unknown sensor(s): {} (run `mmcd sensors` for the list)",
            unknown.join(", ")
        );
    }
    if !indices.iter().any(|&idx| table.query_address(idx).is_some()) {
        anyhow::bail!(
            "None of {} can be read from the ECU, select at least one polled sensor",
            slugs.join(", ")
        );
    }
    Ok(indices)
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn print_stats(stats: &EngineStats, written: u32, ctx: &OutputContext) {
    ctx.print_kv(
        &[
            ("Samples written", written.to_string()),
            ("Poll cycles", stats.sample_count.to_string()),
            ("Errors", stats.error_count.to_string()),
            ("Rate", format!("{:.1} Hz", stats.current_hz)),
            ("Duration", format!("{:.1} s", stats.uptime.as_secs_f64())),
        ],
        stats,
    );
}
