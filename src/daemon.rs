use crate::collectors::probe::ProbeError;
use crate::collectors::system::{collect_shared, SharedCollector};
use crate::collectors::SystemSnapshot;
use crate::metrics::Metrics;
use crate::state::DaemonState;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("не удалось инициализировать сборщик метрик: {0}")]
    Collector(#[source] ProbeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    AlreadyStopped,
    Clean,
    /// The deadline passed before the collection task finished.
    Forced,
}

enum Lifecycle {
    Stopped,
    Running(Worker),
}

struct Worker {
    stop: CancellationToken,
    handle: JoinHandle<()>,
    cycle: u64,
}

pub struct Daemon {
    collector: SharedCollector,
    metrics: Arc<Metrics>,
    interval: Duration,
    lifecycle: RwLock<Lifecycle>,
    span: Span,
}

impl Daemon {
    pub fn new(collector: SharedCollector, metrics: Arc<Metrics>, interval: Duration) -> Self {
        Self {
            collector,
            metrics,
            interval,
            lifecycle: RwLock::new(Lifecycle::Stopped),
            span: info_span!("daemon"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn state(&self) -> DaemonState {
        match &*self.lifecycle.read().await {
            Lifecycle::Stopped => DaemonState::Stopped,
            Lifecycle::Running(_) => DaemonState::Running,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == DaemonState::Running
    }

    /// Returns once the collection task is spawned; the first tick comes one
    /// interval later. `cancel` ends the task from outside, but the daemon
    /// still reports Running until [`Daemon::stop`].
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), StartupError> {
        let mut lifecycle = self.lifecycle.write().await;
        if let Lifecycle::Running(_) = *lifecycle {
            debug!(parent: &self.span, "демон уже запущен");
            return Ok(());
        }

        let (cycle, baseline_interfaces) = {
            let mut collector = self.collector.lock().await;
            collector.start().map_err(StartupError::Collector)?;
            (collector.cycle(), collector.baseline().len())
        };

        let stop = CancellationToken::new();
        let handle = tokio::spawn(
            run_collection_loop(
                self.collector.clone(),
                self.metrics.clone(),
                self.interval,
                stop.clone(),
                cancel,
            )
            .instrument(self.span.clone()),
        );

        *lifecycle = Lifecycle::Running(Worker {
            stop,
            handle,
            cycle,
        });
        self.metrics.set_daemon_state(DaemonState::Running);
        info!(
            parent: &self.span,
            interval = %humantime::format_duration(self.interval),
            baseline_interfaces,
            state = %DaemonState::Running,
            "демон запущен"
        );
        Ok(())
    }

    /// Never waits past `deadline`. A collection still holding the collector
    /// then releases it when it finishes.
    pub async fn stop(&self, deadline: Instant) -> ShutdownOutcome {
        let mut lifecycle = self.lifecycle.write().await;
        let Worker {
            stop,
            mut handle,
            cycle,
        } = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Stopped => return ShutdownOutcome::AlreadyStopped,
            Lifecycle::Running(worker) => worker,
        };

        stop.cancel();
        let mut outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => ShutdownOutcome::Clean,
            Ok(Err(err)) => {
                error!(parent: &self.span, error = %err, "цикл сбора завершился аварийно");
                ShutdownOutcome::Clean
            }
            Err(_) => {
                warn!(
                    parent: &self.span,
                    "цикл сбора не завершился до дедлайна, остановка принудительная"
                );
                handle.abort();
                ShutdownOutcome::Forced
            }
        };

        match tokio::time::timeout_at(deadline, self.collector.lock()).await {
            Ok(mut collector) => collector.stop_cycle(cycle),
            Err(_) => {
                warn!(
                    parent: &self.span,
                    "сборщик занят, освобождение отложено до конца текущего сбора"
                );
                let collector = self.collector.clone();
                let release = async move {
                    collector.lock().await.stop_cycle(cycle);
                };
                tokio::spawn(release.instrument(self.span.clone()));
                outcome = ShutdownOutcome::Forced;
            }
        }

        self.metrics.set_daemon_state(DaemonState::Stopped);
        info!(
            parent: &self.span,
            state = %DaemonState::Stopped,
            outcome = ?outcome,
            "демон остановлен"
        );
        outcome
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Lifecycle::Running(worker) = self.lifecycle.get_mut() {
            worker.stop.cancel();
        }
    }
}

async fn run_collection_loop(
    collector: SharedCollector,
    metrics: Arc<Metrics>,
    period: Duration,
    stop: CancellationToken,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!("получен сигнал остановки цикла сбора");
                break;
            }
            _ = cancel.cancelled() => {
                info!("внешняя отмена, цикл сбора завершается");
                break;
            }
            _ = ticker.tick() => {
                run_tick(&collector, &metrics).await;
            }
        }
    }
}

async fn run_tick(collector: &SharedCollector, metrics: &Metrics) {
    match collect_shared(collector).await {
        Ok(snapshot) => {
            log_summary(&snapshot);
            metrics.update_from_snapshot(&snapshot);
            metrics.inc_collections();
        }
        Err(err) => {
            error!(error = %err, collector = err.label(), "ошибка сбора метрик");
            metrics.inc_collect_error(err.label());
        }
    }
}

fn log_summary(snapshot: &SystemSnapshot) {
    info!(
        cpu_percent = snapshot.cpu.as_ref().map(|c| round1(c.usage_percent)),
        ram_percent = snapshot.memory.as_ref().map(|m| round1(m.usage_percent)),
        disk_percent = snapshot.disk.as_ref().map(|d| round1(d.usage_percent)),
        recv_mib = snapshot.network.as_ref().map(|n| mib(n.bytes_received)),
        sent_mib = snapshot.network.as_ref().map(|n| mib(n.bytes_sent)),
        "метрики собраны"
    );
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn mib(bytes: u64) -> f64 {
    round1(bytes as f64 / (1024.0 * 1024.0))
}
