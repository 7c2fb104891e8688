use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Stopped,
    Running,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuStat {
    #[serde(rename = "usage")]
    pub usage_percent: f64,
    #[serde(rename = "count")]
    pub logical_core_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStat {
    #[serde(rename = "usage")]
    pub usage_percent: f64,
    #[serde(rename = "total")]
    pub total_bytes: u64,
    #[serde(rename = "available")]
    pub available_bytes: u64,
    #[serde(rename = "used")]
    pub used_bytes: u64,
}

impl MemoryStat {
    pub fn from_raw(total_bytes: u64, available_bytes: u64, used_bytes: u64) -> Self {
        let used_bytes = used_bytes.min(total_bytes);
        Self {
            usage_percent: usage_percent(used_bytes, total_bytes),
            total_bytes,
            available_bytes: available_bytes.min(total_bytes),
            used_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskStat {
    #[serde(rename = "usage")]
    pub usage_percent: f64,
    #[serde(rename = "total")]
    pub total_bytes: u64,
    #[serde(rename = "used")]
    pub used_bytes: u64,
    #[serde(rename = "free")]
    pub free_bytes: u64,
}

impl DiskStat {
    pub fn from_space(total_bytes: u64, available_bytes: u64) -> Self {
        let free_bytes = available_bytes.min(total_bytes);
        let used_bytes = total_bytes - free_bytes;
        Self {
            usage_percent: usage_percent(used_bytes, total_bytes),
            total_bytes,
            used_bytes,
            free_bytes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetStat {
    #[serde(rename = "bytes_recv")]
    pub bytes_received: u64,
    pub bytes_sent: u64,
    #[serde(rename = "packets_recv")]
    pub packets_received: u64,
    pub packets_sent: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
}

impl NetStat {
    pub fn accumulate(&mut self, iface: &InterfaceCounters) {
        self.bytes_received = self.bytes_received.saturating_add(iface.bytes_received);
        self.bytes_sent = self.bytes_sent.saturating_add(iface.bytes_sent);
        self.packets_received = self.packets_received.saturating_add(iface.packets_received);
        self.packets_sent = self.packets_sent.saturating_add(iface.packets_sent);
    }
}

impl From<&InterfaceCounters> for NetStat {
    fn from(value: &InterfaceCounters) -> Self {
        let mut out = Self::default();
        out.accumulate(value);
        out
    }
}

pub fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn usage_percent(used: u64, total: u64) -> f64 {
    if total > 0 {
        clamp_percent((used as f64 / total as f64) * 100.0)
    } else {
        0.0
    }
}
