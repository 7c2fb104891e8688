use crate::collectors::probe::{ProbeError, SystemProbe};
use crate::collectors::{ProbeKind, SystemSnapshot};
use crate::config::{MetricsConfig, NetworkScope};
use crate::state::{InterfaceCounters, NetStat};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Span};

#[cfg(windows)]
pub const DEFAULT_DISK_PATH: &str = "C:\\";
#[cfg(not(windows))]
pub const DEFAULT_DISK_PATH: &str = "/";

pub type SharedCollector = Arc<Mutex<MetricsCollector>>;

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub enable_cpu: bool,
    pub enable_memory: bool,
    pub enable_disk: bool,
    pub enable_network: bool,
    pub disk_path: PathBuf,
    pub network: NetworkScope,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            enable_cpu: true,
            enable_memory: true,
            enable_disk: true,
            enable_network: true,
            disk_path: PathBuf::from(DEFAULT_DISK_PATH),
            network: NetworkScope::Total,
        }
    }
}

impl From<&MetricsConfig> for CollectorOptions {
    fn from(cfg: &MetricsConfig) -> Self {
        Self {
            enable_cpu: cfg.enable_cpu,
            enable_memory: cfg.enable_memory,
            enable_disk: cfg.enable_disk,
            enable_network: cfg.enable_network,
            disk_path: cfg
                .disk_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DISK_PATH)),
            network: cfg.network.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("не удалось собрать метрики {kind}: {source}")]
    Probe {
        kind: ProbeKind,
        #[source]
        source: ProbeError,
    },
    #[error("поток сбора метрик завершился аварийно: {0}")]
    Worker(String),
}

impl CollectionError {
    pub fn kind(&self) -> Option<ProbeKind> {
        match self {
            Self::Probe { kind, .. } => Some(*kind),
            Self::Worker(_) => None,
        }
    }

    /// Label used for the collect-error counter.
    pub fn label(&self) -> &'static str {
        self.kind().map(ProbeKind::as_str).unwrap_or("worker")
    }
}

pub struct MetricsCollector {
    probe: Box<dyn SystemProbe>,
    options: CollectorOptions,
    baseline: HashMap<String, InterfaceCounters>,
    started: bool,
    cycle: u64,
    span: Span,
}

impl MetricsCollector {
    pub fn new(probe: impl SystemProbe + 'static, options: CollectorOptions) -> Self {
        Self {
            probe: Box::new(probe),
            options,
            baseline: HashMap::new(),
            started: false,
            cycle: 0,
            span: info_span!("collector"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn into_shared(self) -> SharedCollector {
        Arc::new(Mutex::new(self))
    }

    /// Per-interface counters captured by the last [`MetricsCollector::start`].
    /// Snapshots never consult it; network figures stay cumulative.
    pub fn baseline(&self) -> &HashMap<String, InterfaceCounters> {
        &self.baseline
    }

    /// Incremented by every successful [`MetricsCollector::start`].
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn start(&mut self) -> Result<(), ProbeError> {
        let span = self.span.clone();
        let _enter = span.enter();

        // A release deferred from the previous cycle has not run yet.
        self.stop();
        self.probe.init()?;

        self.baseline = match self.probe.interfaces() {
            Ok(ifaces) => ifaces
                .into_iter()
                .map(|iface| (iface.name.clone(), iface))
                .collect(),
            Err(err) => {
                warn!(error = %err, "не удалось снять исходные счётчики сети, продолжаем без них");
                HashMap::new()
            }
        };
        self.started = true;
        self.cycle += 1;

        info!(disk_path = %self.options.disk_path.display(), "сборщик метрик запущен");
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        let _enter = self.span.enter();
        self.baseline.clear();
        self.probe.release();
        self.started = false;
        info!("сборщик метрик остановлен");
    }

    /// Stops only if no newer cycle has started since `cycle` was read.
    pub fn stop_cycle(&mut self, cycle: u64) {
        if self.cycle == cycle {
            self.stop();
        }
    }

    pub fn collect_all(&mut self) -> Result<SystemSnapshot, CollectionError> {
        let timestamp = SystemTime::now();

        let cpu = if self.options.enable_cpu {
            Some(self.probe.cpu().map_err(probe_error(ProbeKind::Cpu))?)
        } else {
            None
        };

        let memory = if self.options.enable_memory {
            Some(self.probe.memory().map_err(probe_error(ProbeKind::Memory))?)
        } else {
            None
        };

        let disk = if self.options.enable_disk {
            let target = self.options.disk_path.clone();
            Some(
                self.probe
                    .disk(&target)
                    .map_err(probe_error(ProbeKind::Disk))?,
            )
        } else {
            None
        };

        let network = if self.options.enable_network {
            Some(
                self.collect_network()
                    .map_err(probe_error(ProbeKind::Network))?,
            )
        } else {
            None
        };

        Ok(SystemSnapshot {
            timestamp,
            cpu,
            memory,
            disk,
            network,
        })
    }

    fn collect_network(&mut self) -> Result<NetStat, ProbeError> {
        let ifaces = self.probe.interfaces()?;
        if ifaces.is_empty() {
            debug!(parent: &self.span, "ОС не сообщила ни одного сетевого интерфейса");
            return Ok(NetStat::default());
        }

        match &self.options.network {
            NetworkScope::Total => Ok(ifaces.iter().fold(NetStat::default(), |mut acc, iface| {
                acc.accumulate(iface);
                acc
            })),
            NetworkScope::Interface { name } => ifaces
                .iter()
                .find(|iface| &iface.name == name)
                .map(NetStat::from)
                .ok_or_else(|| ProbeError::InterfaceNotFound(name.clone())),
        }
    }
}

fn probe_error(kind: ProbeKind) -> impl FnOnce(ProbeError) -> CollectionError {
    move |source| CollectionError::Probe { kind, source }
}

/// Runs one collection on the blocking pool. Callers queue on the collector
/// mutex, so a tick and an on-demand pull never overlap.
pub async fn collect_shared(
    collector: &SharedCollector,
) -> Result<SystemSnapshot, CollectionError> {
    let mut guard = collector.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || guard.collect_all())
        .await
        .map_err(|err| CollectionError::Worker(err.to_string()))?
}
