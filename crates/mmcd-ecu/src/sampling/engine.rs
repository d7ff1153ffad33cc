//! Background sampling loop

use std::sync::Arc;

use mmcd_core::{Sample, SamplePoller, SourceError};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::stats::{Counters, EngineStats};
use crate::config::SamplingConfig;

pub type SampleCallback = Arc<dyn Fn(&Sample) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&SourceError) + Send + Sync>;
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle of the sampling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Idle,
    Running,
    /// The watchdog tripped; disconnect subscribers are being notified
    Disconnected,
}

#[derive(Default)]
struct Subscribers {
    sample: Vec<SampleCallback>,
    error: Vec<ErrorCallback>,
    disconnect: Vec<DisconnectCallback>,
}

struct EngineState {
    status: EngineStatus,
    indices: Vec<usize>,
    /// Bumped on every start so a stale loop can tell it has been replaced
    generation: u64,
    cancel: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    counters: Counters,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    last_sample: Option<Sample>,
    subscribers: Subscribers,
}

impl EngineState {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.status == EngineStatus::Running
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        if self.status == EngineStatus::Running {
            self.status = EngineStatus::Idle;
            self.stopped_at = Some(Instant::now());
            info!(
                samples = self.counters.sample_count,
                errors = self.counters.error_count,
                "Sampling stopped"
            );
        }
    }
}

/// Polls a sample source on a timer and notifies subscribers
///
/// One background task per running engine. Subscriber callbacks run on
/// that task, outside the state lock, in cycle order.
pub struct SamplingEngine {
    source: Arc<dyn SamplePoller>,
    config: SamplingConfig,
    state: Arc<Mutex<EngineState>>,
}

impl SamplingEngine {
    pub fn new(source: Arc<dyn SamplePoller>, config: SamplingConfig) -> Self {
        Self {
            source,
            config,
            state: Arc::new(Mutex::new(EngineState {
                status: EngineStatus::Idle,
                indices: Vec::new(),
                generation: 0,
                cancel: None,
                task: None,
                counters: Counters::default(),
                started_at: None,
                stopped_at: None,
                last_sample: None,
                subscribers: Subscribers::default(),
            })),
        }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Slots to poll, in order; takes effect on the next tick
    pub fn set_indices(&self, indices: Vec<usize>) {
        self.state.lock().indices = indices;
    }

    pub fn indices(&self) -> Vec<usize> {
        self.state.lock().indices.clone()
    }

    pub fn status(&self) -> EngineStatus {
        self.state.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == EngineStatus::Running
    }

    /// Most recent successful sample
    pub fn last_sample(&self) -> Option<Sample> {
        self.state.lock().last_sample
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.state.lock();
        EngineStats::new(
            state.status,
            state.counters,
            state.started_at,
            state.stopped_at,
        )
    }

    pub fn on_sample<F>(&self, callback: F)
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        self.state.lock().subscribers.sample.push(Arc::new(callback));
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&SourceError) + Send + Sync + 'static,
    {
        self.state.lock().subscribers.error.push(Arc::new(callback));
    }

    /// Called once when the watchdog gives up on the source
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.state.lock().subscribers.disconnect.push(Arc::new(callback));
    }

    /// Spawn the sampling loop; does nothing if it is already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.status == EngineStatus::Running {
            return;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        state.generation += 1;
        state.status = EngineStatus::Running;
        state.counters = Counters::default();
        state.started_at = Some(Instant::now());
        state.stopped_at = None;
        state.cancel = Some(cancel_tx);

        let ctx = LoopContext {
            source: Arc::clone(&self.source),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            generation: state.generation,
        };
        state.task = Some(tokio::spawn(run_loop(ctx, cancel_rx)));

        info!(
            sensors = state.indices.len(),
            interval_ms = self.config.interval_ms,
            "Sampling started"
        );
    }

    /// Signal the loop to stop without waiting for it
    ///
    /// Safe to call from a subscriber callback. No callback of a later
    /// cycle fires after this returns.
    pub fn request_stop(&self) {
        self.state.lock().cancel();
    }

    /// Stop the loop and wait until it has exited
    ///
    /// Idempotent. Once this returns no callback is running or will run,
    /// and the source is no longer in use.
    pub async fn stop(&self) {
        let task = {
            let mut state = self.state.lock();
            state.cancel();
            state.task.take()
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("Sampling loop panicked");
                }
            }
        }
    }
}

impl Drop for SamplingEngine {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.cancel();
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}

struct LoopContext {
    source: Arc<dyn SamplePoller>,
    config: SamplingConfig,
    state: Arc<Mutex<EngineState>>,
    generation: u64,
}

async fn run_loop(ctx: LoopContext, mut cancel: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(ctx.config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }

        let indices = {
            let state = ctx.state.lock();
            if !state.is_current(ctx.generation) {
                break;
            }
            state.indices.clone()
        };

        if indices.is_empty() {
            tokio::select! {
                biased;
                _ = cancel.changed() => break,
                _ = tokio::time::sleep(ctx.config.idle_backoff()) => continue,
            }
        }

        let result = tokio::select! {
            biased;
            _ = cancel.changed() => break,
            result = ctx.source.poll(&indices) => result,
        };

        match result {
            Err(SourceError::NothingToPoll) => {
                tokio::select! {
                    biased;
                    _ = cancel.changed() => break,
                    _ = tokio::time::sleep(ctx.config.idle_backoff()) => continue,
                }
            }
            Ok(sample) => {
                let callbacks = {
                    let mut state = ctx.state.lock();
                    if !state.is_current(ctx.generation) {
                        break;
                    }
                    state.counters.sample_count += 1;
                    state.counters.consecutive_errors = 0;
                    state.last_sample = Some(sample);
                    state.subscribers.sample.clone()
                };
                for callback in &callbacks {
                    callback(&sample);
                }
            }
            Err(err) => {
                let (callbacks, tripped) = {
                    let mut state = ctx.state.lock();
                    if !state.is_current(ctx.generation) {
                        break;
                    }
                    state.counters.error_count += 1;
                    state.counters.consecutive_errors += 1;
                    let consecutive = state.counters.consecutive_errors;
                    if err.is_link_failure() {
                        warn!(error = %err, consecutive, "Poll cycle failed");
                    } else {
                        debug!(error = %err, consecutive, "Poll cycle failed");
                    }

                    let tripped = consecutive >= ctx.config.watchdog_threshold;
                    if tripped {
                        state.status = EngineStatus::Disconnected;
                        state.stopped_at = Some(Instant::now());
                        warn!(consecutive, "Too many consecutive failures, ECU disconnected");
                    }
                    (
                        state.subscribers.error.clone(),
                        tripped.then(|| state.subscribers.disconnect.clone()),
                    )
                };

                for callback in &callbacks {
                    callback(&err);
                }

                if let Some(disconnect) = tripped {
                    for callback in &disconnect {
                        callback();
                    }
                    let mut state = ctx.state.lock();
                    if state.generation == ctx.generation
                        && state.status == EngineStatus::Disconnected
                    {
                        state.status = EngineStatus::Idle;
                    }
                    break;
                }
            }
        }
    }

    debug!(generation = ctx.generation, "Sampling loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use mmcd_core::SourceResult;
    use tokio::sync::Notify;

    /// Succeeds or fails per a script, then keeps succeeding
    struct ScriptedSource {
        calls: AtomicUsize,
        script: Mutex<VecDeque<bool>>,
        fail_forever: bool,
    }

    impl ScriptedSource {
        fn new(script: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                fail_forever: false,
            })
        }

        fn dead() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(VecDeque::new()),
                fail_forever: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SamplePoller for ScriptedSource {
        async fn poll(&self, indices: &[usize]) -> SourceResult<Sample> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.script.lock().pop_front().unwrap_or(!self.fail_forever);
            if !ok {
                return Err(SourceError::NoResponse {
                    attempted: indices.len(),
                });
            }
            let mut sample = Sample::now();
            for &idx in indices {
                sample.set(idx, n as u8);
            }
            Ok(sample)
        }
    }

    fn config() -> SamplingConfig {
        SamplingConfig::synthetic()
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_samples_in_order() {
        let engine = SamplingEngine::new(ScriptedSource::new(vec![]), config());
        engine.set_indices(vec![17]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.on_sample(move |s| sink.lock().push(s.get(17).unwrap()));

        engine.start();
        assert!(engine.is_running());
        tokio::time::sleep(Duration::from_millis(500)).await;
        engine.stop().await;

        let seen = seen.lock().clone();
        assert!(seen.len() >= 5);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        let stats = engine.stats();
        assert_eq!(stats.sample_count as usize, seen.len());
        assert_eq!(stats.status, EngineStatus::Idle);
        assert_eq!(engine.last_sample().unwrap().get(17), seen.last().copied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let engine = SamplingEngine::new(ScriptedSource::new(vec![]), config());
        engine.stop().await;
        engine.start();
        engine.stop().await;
        engine.stop().await;
        assert_eq!(engine.status(), EngineStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let source = ScriptedSource::new(vec![]);
        let engine = SamplingEngine::new(source.clone(), config());
        engine.set_indices(vec![1]);
        engine.start();
        tokio::time::sleep(Duration::from_millis(120)).await;
        engine.start();
        tokio::time::sleep(Duration::from_millis(120)).await;
        engine.stop().await;
        // one loop at 50 ms, not two
        assert!(source.calls() <= 6, "calls {}", source.calls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_stop() {
        let engine = SamplingEngine::new(ScriptedSource::new(vec![]), config());
        engine.set_indices(vec![3]);
        let count = counter();
        let c = Arc::clone(&count);
        engine.on_sample(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        engine.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop().await;
        let at_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_fires_disconnect_once() {
        let source = ScriptedSource::dead();
        let engine = SamplingEngine::new(source.clone(), config());
        engine.set_indices(vec![17]);

        let errors = counter();
        let disconnects = counter();
        let notify = Arc::new(Notify::new());
        let e = Arc::clone(&errors);
        engine.on_error(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });
        let d = Arc::clone(&disconnects);
        let n = Arc::clone(&notify);
        engine.on_disconnect(move || {
            d.fetch_add(1, Ordering::SeqCst);
            n.notify_one();
        });

        engine.start();
        tokio::time::timeout(Duration::from_secs(10), notify.notified())
            .await
            .unwrap();
        engine.stop().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 20);
        assert_eq!(source.calls(), 20);
        let stats = engine.stats();
        assert_eq!(stats.error_count, 20);
        assert_eq!(stats.consecutive_errors, 20);
        assert_eq!(stats.status, EngineStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_count() {
        let mut script = vec![false; 19];
        script.push(true);
        script.extend(vec![false; 19]);
        let engine = SamplingEngine::new(ScriptedSource::new(script), config());
        engine.set_indices(vec![17]);
        let disconnects = counter();
        let d = Arc::clone(&disconnects);
        engine.on_disconnect(move || {
            d.fetch_add(1, Ordering::SeqCst);
        });

        engine.start();
        // 39 scripted cycles plus a few successes
        tokio::time::sleep(Duration::from_secs(3)).await;
        engine.stop().await;

        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
        let stats = engine.stats();
        assert_eq!(stats.error_count, 38);
        assert_eq!(stats.consecutive_errors, 0);
        assert!(stats.sample_count >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_indices_never_poll() {
        let source = ScriptedSource::new(vec![]);
        let engine = SamplingEngine::new(source.clone(), config());
        engine.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 0);
        assert_eq!(engine.stats().sample_count, 0);

        engine.set_indices(vec![4]);
        tokio::time::sleep(Duration::from_millis(500)).await;
        engine.stop().await;
        assert!(source.calls() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unqueryable_selection_never_counts_as_sample() {
        use crate::protocol::Ecu;
        use crate::transport::MockTransport;
        use mmcd_core::sensor::{SLOT_INJD, SLOT_RPM};
        use mmcd_core::SensorTable;

        let mock = MockTransport::with_sensors(&[(0x21, 0x20)]);
        let handle = mock.handle();
        let ecu = Ecu::new(Box::new(mock), Arc::new(SensorTable::default()));
        let engine = SamplingEngine::new(Arc::new(ecu), SamplingConfig::live());
        let delivered = counter();
        let d = Arc::clone(&delivered);
        engine.on_sample(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        // inactive slot and the computed duty cycle
        engine.set_indices(vec![0, SLOT_INJD]);
        engine.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = engine.stats();
        assert_eq!(stats.sample_count, 0);
        assert_eq!(stats.error_count, 0);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert!(engine.last_sample().is_none());
        assert_eq!(handle.send_count(), 0);

        engine.set_indices(vec![SLOT_RPM]);
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop().await;
        assert!(delivered.load(Ordering::SeqCst) > 0);
        assert_eq!(engine.last_sample().unwrap().get(SLOT_RPM), Some(0x20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_stop_from_callback() {
        let engine = Arc::new(SamplingEngine::new(ScriptedSource::new(vec![]), config()));
        engine.set_indices(vec![17]);
        let count = counter();
        let c = Arc::clone(&count);
        let weak = Arc::downgrade(&engine);
        engine.on_sample(move |_| {
            if c.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                if let Some(engine) = weak.upgrade() {
                    engine.request_stop();
                }
            }
        });

        engine.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(engine.status(), EngineStatus::Idle);
        engine.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_counters() {
        let engine = SamplingEngine::new(ScriptedSource::new(vec![false, false]), config());
        engine.set_indices(vec![17]);
        engine.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop().await;
        assert_eq!(engine.stats().error_count, 2);

        engine.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop().await;
        let stats = engine.stats();
        assert_eq!(stats.error_count, 0);
        assert!(stats.sample_count > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_engine_ends_loop() {
        let source = ScriptedSource::new(vec![]);
        let engine = SamplingEngine::new(source.clone(), config());
        engine.set_indices(vec![17]);
        engine.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(engine);
        let calls = source.calls();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), calls);
    }
}
