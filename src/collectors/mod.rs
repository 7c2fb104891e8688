#[cfg(test)]
pub mod fake;
pub mod probe;
pub mod system;

use crate::state::{CpuStat, DiskStat, MemoryStat, NetStat};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: SystemTime,
    pub cpu: Option<CpuStat>,
    pub memory: Option<MemoryStat>,
    pub disk: Option<DiskStat>,
    pub network: Option<NetStat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn serialize_rfc3339<S: Serializer>(ts: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_rfc3339_millis(*ts))
}
