use crate::state::{clamp_percent, CpuStat, DiskStat, InterfaceCounters, MemoryStat};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{
    CpuExt, CpuRefreshKind, DiskExt, NetworkExt, NetworksExt, RefreshKind, System, SystemExt,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("платформа не поддерживается sysinfo")]
    Unsupported,
    #[error("ОС не сообщила ни одного логического ядра")]
    NoCpus,
    #[error("ОС сообщила нулевой объём памяти")]
    NoMemory,
    #[error("не удалось получить объём тома для {}: {source}", path.display())]
    SpaceQuery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("сетевой интерфейс '{0}' не найден")]
    InterfaceNotFound(String),
    #[error("ошибка запроса к ОС: {0}")]
    Query(String),
}

/// Raw OS queries, one per subsystem. Implementations keep whatever handles
/// they need between calls; callers never invoke them concurrently.
pub trait SystemProbe: Send {
    fn init(&mut self) -> Result<(), ProbeError>;

    /// Blocks for the sampling window.
    fn cpu(&mut self) -> Result<CpuStat, ProbeError>;

    fn memory(&mut self) -> Result<MemoryStat, ProbeError>;

    fn disk(&mut self, target: &Path) -> Result<DiskStat, ProbeError>;

    fn interfaces(&mut self) -> Result<Vec<InterfaceCounters>, ProbeError>;

    fn release(&mut self) {}
}

pub struct SysinfoProbe {
    system: System,
    cpu_sample: Duration,
}

impl SysinfoProbe {
    pub fn new(cpu_sample: Duration) -> Self {
        Self {
            system: fresh_system(),
            cpu_sample: cpu_sample.max(System::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

fn space_at_path(target: &Path) -> Result<(u64, u64), ProbeError> {
    let space_err = |source| ProbeError::SpaceQuery {
        path: target.to_path_buf(),
        source,
    };
    let total = fs2::total_space(target).map_err(space_err)?;
    let available = fs2::available_space(target).map_err(space_err)?;
    Ok((total, available))
}

fn fresh_system() -> System {
    System::new_with_specifics(
        RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(),
    )
}

impl SystemProbe for SysinfoProbe {
    fn init(&mut self) -> Result<(), ProbeError> {
        if !System::IS_SUPPORTED {
            return Err(ProbeError::Unsupported);
        }
        self.system.refresh_cpu();
        Ok(())
    }

    fn cpu(&mut self) -> Result<CpuStat, ProbeError> {
        self.system.refresh_cpu();
        std::thread::sleep(self.cpu_sample);
        self.system.refresh_cpu();

        let count = self.system.cpus().len() as u32;
        if count == 0 {
            return Err(ProbeError::NoCpus);
        }

        Ok(CpuStat {
            usage_percent: clamp_percent(self.system.global_cpu_info().cpu_usage() as f64),
            logical_core_count: count,
        })
    }

    fn memory(&mut self) -> Result<MemoryStat, ProbeError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(ProbeError::NoMemory);
        }
        Ok(MemoryStat::from_raw(
            total,
            self.system.available_memory(),
            self.system.used_memory(),
        ))
    }

    fn disk(&mut self, target: &Path) -> Result<DiskStat, ProbeError> {
        self.system.refresh_disks_list();
        let listed = self
            .system
            .disks()
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().components().count())
            .map(|d| (d.total_space(), d.available_space()));

        // Container roots and some bind mounts are missing from the mount list.
        let (total, available) = match listed {
            Some(space) if space.0 > 0 => space,
            _ => space_at_path(target)?,
        };

        if total == 0 {
            return Err(ProbeError::Query(format!(
                "{} сообщает нулевой объём",
                target.display()
            )));
        }
        Ok(DiskStat::from_space(total, available))
    }

    fn interfaces(&mut self) -> Result<Vec<InterfaceCounters>, ProbeError> {
        self.system.refresh_networks_list();
        self.system.refresh_networks();
        Ok(self
            .system
            .networks()
            .iter()
            .map(|(iface, data)| InterfaceCounters {
                name: iface.to_string(),
                bytes_received: data.total_received(),
                bytes_sent: data.total_transmitted(),
                packets_received: data.total_packets_received(),
                packets_sent: data.total_packets_transmitted(),
            })
            .collect())
    }

    fn release(&mut self) {
        self.system = fresh_system();
    }
}
