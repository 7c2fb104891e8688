use crate::collectors::probe::{ProbeError, SystemProbe};
use crate::collectors::ProbeKind;
use crate::state::{CpuStat, DiskStat, InterfaceCounters, MemoryStat};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const GIB: u64 = 1024 * 1024 * 1024;

/// Scripted probe for tests. The paired [`ProbeControl`] flips failures and
/// reads call counters while the probe itself is owned by a collector.
pub struct FakeProbe {
    inner: Arc<Inner>,
}

#[derive(Clone)]
pub struct ProbeControl {
    inner: Arc<Inner>,
}

struct Inner {
    fail_init: AtomicBool,
    fail_cpu: AtomicBool,
    fail_memory: AtomicBool,
    fail_disk: AtomicBool,
    fail_network: AtomicBool,
    cpu_delay_ms: AtomicU64,
    init_calls: AtomicUsize,
    cpu_calls: AtomicUsize,
    disk_calls: AtomicUsize,
    releases: AtomicUsize,
    interfaces: Mutex<Vec<InterfaceCounters>>,
    last_disk_target: Mutex<Option<PathBuf>>,
}

impl Inner {
    fn flag(&self, kind: ProbeKind) -> &AtomicBool {
        match kind {
            ProbeKind::Cpu => &self.fail_cpu,
            ProbeKind::Memory => &self.fail_memory,
            ProbeKind::Disk => &self.fail_disk,
            ProbeKind::Network => &self.fail_network,
        }
    }

    fn check(&self, kind: ProbeKind) -> Result<(), ProbeError> {
        if self.flag(kind).load(Ordering::SeqCst) {
            Err(ProbeError::Query(format!("{kind}: сбой по сценарию теста")))
        } else {
            Ok(())
        }
    }
}

impl FakeProbe {
    pub fn new() -> (Self, ProbeControl) {
        let inner = Arc::new(Inner {
            fail_init: AtomicBool::new(false),
            fail_cpu: AtomicBool::new(false),
            fail_memory: AtomicBool::new(false),
            fail_disk: AtomicBool::new(false),
            fail_network: AtomicBool::new(false),
            cpu_delay_ms: AtomicU64::new(0),
            init_calls: AtomicUsize::new(0),
            cpu_calls: AtomicUsize::new(0),
            disk_calls: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            interfaces: Mutex::new(vec![
                iface("eth0", 1_000, 500, 10, 20),
                iface("lo", 50, 50, 2, 2),
            ]),
            last_disk_target: Mutex::new(None),
        });
        (
            Self {
                inner: inner.clone(),
            },
            ProbeControl { inner },
        )
    }
}

fn iface(name: &str, rx: u64, tx: u64, prx: u64, ptx: u64) -> InterfaceCounters {
    InterfaceCounters {
        name: name.to_string(),
        bytes_received: rx,
        bytes_sent: tx,
        packets_received: prx,
        packets_sent: ptx,
    }
}

impl ProbeControl {
    pub fn fail(&self, kind: ProbeKind, on: bool) {
        self.inner.flag(kind).store(on, Ordering::SeqCst);
    }

    pub fn fail_init(&self, on: bool) {
        self.inner.fail_init.store(on, Ordering::SeqCst);
    }

    pub fn set_cpu_delay(&self, delay: Duration) {
        self.inner
            .cpu_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_interfaces(&self, ifaces: Vec<InterfaceCounters>) {
        *self.inner.interfaces.lock().unwrap() = ifaces;
    }

    pub fn init_calls(&self) -> usize {
        self.inner.init_calls.load(Ordering::SeqCst)
    }

    pub fn cpu_calls(&self) -> usize {
        self.inner.cpu_calls.load(Ordering::SeqCst)
    }

    pub fn disk_calls(&self) -> usize {
        self.inner.disk_calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    pub fn last_disk_target(&self) -> Option<PathBuf> {
        self.inner.last_disk_target.lock().unwrap().clone()
    }
}

impl SystemProbe for FakeProbe {
    fn init(&mut self) -> Result<(), ProbeError> {
        self.inner.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_init.load(Ordering::SeqCst) {
            return Err(ProbeError::Unsupported);
        }
        Ok(())
    }

    fn cpu(&mut self) -> Result<CpuStat, ProbeError> {
        self.inner.cpu_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.inner.cpu_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.inner.check(ProbeKind::Cpu)?;
        Ok(CpuStat {
            usage_percent: 12.5,
            logical_core_count: 4,
        })
    }

    fn memory(&mut self) -> Result<MemoryStat, ProbeError> {
        self.inner.check(ProbeKind::Memory)?;
        Ok(MemoryStat::from_raw(8 * GIB, 6 * GIB, 2 * GIB))
    }

    fn disk(&mut self, target: &Path) -> Result<DiskStat, ProbeError> {
        self.inner.disk_calls.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_disk_target.lock().unwrap() = Some(target.to_path_buf());
        self.inner.check(ProbeKind::Disk)?;
        Ok(DiskStat::from_space(100 * GIB, 40 * GIB))
    }

    fn interfaces(&mut self) -> Result<Vec<InterfaceCounters>, ProbeError> {
        self.inner.check(ProbeKind::Network)?;
        Ok(self.inner.interfaces.lock().unwrap().clone())
    }

    fn release(&mut self) {
        self.inner.releases.fetch_add(1, Ordering::SeqCst);
    }
}
