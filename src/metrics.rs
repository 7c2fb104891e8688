use crate::collectors::SystemSnapshot;
use crate::state::DaemonState;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub struct Metrics {
    registry: Registry,
    started: Instant,
    pub cpu_usage_percent: Gauge,
    pub cpu_logical_cores: Gauge,
    pub memory_usage_percent: Gauge,
    pub memory_total_bytes: Gauge,
    pub memory_available_bytes: Gauge,
    pub memory_used_bytes: Gauge,
    pub disk_usage_percent: Gauge,
    pub disk_total_bytes: Gauge,
    pub disk_used_bytes: Gauge,
    pub disk_free_bytes: Gauge,
    pub net_bytes_recv: Gauge,
    pub net_bytes_sent: Gauge,
    pub net_packets_recv: Gauge,
    pub net_packets_sent: Gauge,
    pub daemon_running: Gauge,
    pub uptime_seconds: Gauge,
    pub collections_total: Counter,
    pub collect_errors_total: CounterVec,
    pub scrape_count_total: Counter,
    pub last_collect_timestamp_seconds: Gauge,
}

fn gauge(name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    Gauge::with_opts(opts!(name, help))
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some("syswatch".to_string()), None)?;

        let metrics = Self {
            started: Instant::now(),
            cpu_usage_percent: gauge("cpu_usage_percent", "CPU usage over the sample window (0..100)")?,
            cpu_logical_cores: gauge("cpu_logical_cores", "Number of logical CPU cores")?,
            memory_usage_percent: gauge("memory_usage_percent", "Memory usage in percent")?,
            memory_total_bytes: gauge("memory_total_bytes", "Total memory in bytes")?,
            memory_available_bytes: gauge("memory_available_bytes", "Available memory in bytes")?,
            memory_used_bytes: gauge("memory_used_bytes", "Used memory in bytes")?,
            disk_usage_percent: gauge("disk_usage_percent", "Usage of the watched volume in percent")?,
            disk_total_bytes: gauge("disk_total_bytes", "Capacity of the watched volume in bytes")?,
            disk_used_bytes: gauge("disk_used_bytes", "Used bytes on the watched volume")?,
            disk_free_bytes: gauge("disk_free_bytes", "Free bytes on the watched volume")?,
            net_bytes_recv: gauge("net_bytes_recv", "Cumulative received bytes since boot")?,
            net_bytes_sent: gauge("net_bytes_sent", "Cumulative sent bytes since boot")?,
            net_packets_recv: gauge("net_packets_recv", "Cumulative received packets since boot")?,
            net_packets_sent: gauge("net_packets_sent", "Cumulative sent packets since boot")?,
            daemon_running: gauge("daemon_running", "1 while the collection loop runs")?,
            uptime_seconds: gauge("uptime_seconds", "Process uptime in seconds")?,
            collections_total: Counter::with_opts(opts!(
                "collections_total",
                "Successful periodic collections"
            ))?,
            collect_errors_total: CounterVec::new(
                opts!("collect_errors_total", "Failed collections by category"),
                &["collector"],
            )?,
            scrape_count_total: Counter::with_opts(opts!(
                "scrape_count_total",
                "Number of /metrics scrapes"
            ))?,
            last_collect_timestamp_seconds: gauge(
                "last_collect_timestamp_seconds",
                "Unix time of the last successful collection",
            )?,
            registry,
        };

        register(&metrics.registry, &metrics.cpu_usage_percent)?;
        register(&metrics.registry, &metrics.cpu_logical_cores)?;
        register(&metrics.registry, &metrics.memory_usage_percent)?;
        register(&metrics.registry, &metrics.memory_total_bytes)?;
        register(&metrics.registry, &metrics.memory_available_bytes)?;
        register(&metrics.registry, &metrics.memory_used_bytes)?;
        register(&metrics.registry, &metrics.disk_usage_percent)?;
        register(&metrics.registry, &metrics.disk_total_bytes)?;
        register(&metrics.registry, &metrics.disk_used_bytes)?;
        register(&metrics.registry, &metrics.disk_free_bytes)?;
        register(&metrics.registry, &metrics.net_bytes_recv)?;
        register(&metrics.registry, &metrics.net_bytes_sent)?;
        register(&metrics.registry, &metrics.net_packets_recv)?;
        register(&metrics.registry, &metrics.net_packets_sent)?;
        register(&metrics.registry, &metrics.daemon_running)?;
        register(&metrics.registry, &metrics.uptime_seconds)?;
        register(&metrics.registry, &metrics.collections_total)?;
        register(&metrics.registry, &metrics.collect_errors_total)?;
        register(&metrics.registry, &metrics.scrape_count_total)?;
        register(&metrics.registry, &metrics.last_collect_timestamp_seconds)?;

        Ok(Arc::new(metrics))
    }

    /// Disabled categories keep their last value; Prometheus has no null.
    pub fn update_from_snapshot(&self, snapshot: &SystemSnapshot) {
        if let Some(cpu) = &snapshot.cpu {
            self.cpu_usage_percent.set(cpu.usage_percent);
            self.cpu_logical_cores.set(cpu.logical_core_count as f64);
        }
        if let Some(mem) = &snapshot.memory {
            self.memory_usage_percent.set(mem.usage_percent);
            self.memory_total_bytes.set(mem.total_bytes as f64);
            self.memory_available_bytes.set(mem.available_bytes as f64);
            self.memory_used_bytes.set(mem.used_bytes as f64);
        }
        if let Some(disk) = &snapshot.disk {
            self.disk_usage_percent.set(disk.usage_percent);
            self.disk_total_bytes.set(disk.total_bytes as f64);
            self.disk_used_bytes.set(disk.used_bytes as f64);
            self.disk_free_bytes.set(disk.free_bytes as f64);
        }
        if let Some(net) = &snapshot.network {
            self.net_bytes_recv.set(net.bytes_received as f64);
            self.net_bytes_sent.set(net.bytes_sent as f64);
            self.net_packets_recv.set(net.packets_received as f64);
            self.net_packets_sent.set(net.packets_sent as f64);
        }

        self.last_collect_timestamp_seconds
            .set(unix_seconds(snapshot.timestamp));
    }

    pub fn set_daemon_state(&self, state: DaemonState) {
        self.daemon_running
            .set(if state == DaemonState::Running { 1.0 } else { 0.0 });
    }

    pub fn inc_collections(&self) {
        self.collections_total.inc();
    }

    pub fn inc_scrape_count(&self) {
        self.scrape_count_total.inc();
    }

    pub fn inc_collect_error(&self, collector: &str) {
        self.collect_errors_total
            .with_label_values(&[collector])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        self.uptime_seconds
            .set(self.started.elapsed().as_secs_f64());

        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn unix_seconds(ts: SystemTime) -> f64 {
    ts.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CpuStat, NetStat};

    fn encoded(metrics: &Metrics) -> String {
        String::from_utf8(metrics.encode_metrics().unwrap()).unwrap()
    }

    #[test]
    fn snapshot_values_reach_the_registry() {
        let metrics = Metrics::new().unwrap();
        metrics.update_from_snapshot(&SystemSnapshot {
            timestamp: SystemTime::now(),
            cpu: Some(CpuStat {
                usage_percent: 42.0,
                logical_core_count: 8,
            }),
            memory: None,
            disk: None,
            network: Some(NetStat {
                bytes_received: 1024,
                ..NetStat::default()
            }),
        });

        let text = encoded(&metrics);
        assert!(text.contains("syswatch_cpu_usage_percent 42"));
        assert!(text.contains("syswatch_cpu_logical_cores 8"));
        assert!(text.contains("syswatch_net_bytes_recv 1024"));
        assert!(text.contains("syswatch_memory_total_bytes 0"));
    }

    #[test]
    fn counters_and_state_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_collect_error("disk");
        metrics.inc_collect_error("disk");
        metrics.inc_collections();
        metrics.inc_scrape_count();
        metrics.set_daemon_state(DaemonState::Running);

        let text = encoded(&metrics);
        assert!(text.contains("syswatch_collect_errors_total{collector=\"disk\"} 2"));
        assert!(text.contains("syswatch_collections_total 1"));
        assert!(text.contains("syswatch_scrape_count_total 1"));
        assert!(text.contains("syswatch_daemon_running 1"));
        assert!(text.contains("syswatch_uptime_seconds"));
    }
}
