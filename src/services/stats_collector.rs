use crate::models::ResourceReading;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("resource query unavailable: {0}")]
    Unavailable(String),
}

/// 资源查询：给定 pid，返回整个进程树每个进程的读数
///
/// `started` 是该进程 spawn 时的时间，用作第一次读数的 CPU 基线。
/// 查询是阻塞的，monitor 会把它放到 blocking 线程池里执行。
pub trait ResourceProbe: Send + Sync {
    fn query(&self, pid: u32, started: Instant) -> Result<Vec<ResourceReading>, ProbeError>;
}

/// 某个进程上一次读数时的累计 CPU 时间
#[derive(Debug, Clone, Copy)]
struct CpuBaseline {
    at: Instant,
    cpu_ms: u64,
}

impl CpuBaseline {
    /// 区间内的平均 CPU 使用率 (百分比)
    fn usage_since(&self, now: Instant, cpu_ms: u64) -> f32 {
        let wall_ms = now.saturating_duration_since(self.at).as_secs_f64() * 1000.0;
        if wall_ms <= 0.0 {
            return 0.0;
        }
        let busy_ms = cpu_ms.saturating_sub(self.cpu_ms) as f64;
        (busy_ms / wall_ms * 100.0) as f32
    }
}

struct ProbeState {
    system: System,
    /// root pid -> (树中 pid -> 基线)
    baselines: HashMap<u32, HashMap<u32, CpuBaseline>>,
}

/// 基于 sysinfo 的实现
///
/// CPU 使用率由累计 CPU 时间的差值除以墙钟时间得出，每个被查询的进程树
/// 各自保存基线，互不影响。新出现的进程以 `started`（spawn 时间，CPU 时间为 0）
/// 为基线，所以第一次读数就是 spawn 以来的平均值。
pub struct SysinfoProbe {
    state: Mutex<ProbeState>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProbeState {
                system: System::new(),
                baselines: HashMap::new(),
            }),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn query(&self, pid: u32, started: Instant) -> Result<Vec<ResourceReading>, ProbeError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| ProbeError::Unavailable(e.to_string()))?;
        let ProbeState { system: sys, baselines } = &mut *state;

        sys.refresh_processes(ProcessesToUpdate::All, true);
        let now = Instant::now();

        // 已结束的进程树不再保留基线
        baselines.retain(|root, _| sys.process(Pid::from_u32(*root)).is_some());

        let root = Pid::from_u32(pid);
        if sys.process(root).is_none() {
            return Err(ProbeError::NotFound(pid));
        }

        // 收集 root 及其所有子孙进程（线程不单独计算）
        let mut tree: HashSet<Pid> = HashSet::from([root]);
        loop {
            let before = tree.len();
            for (child, process) in sys.processes() {
                if process.thread_kind().is_some() || tree.contains(child) {
                    continue;
                }
                if process.parent().is_some_and(|parent| tree.contains(&parent)) {
                    tree.insert(*child);
                }
            }
            if tree.len() == before {
                break;
            }
        }

        let previous = baselines.remove(&pid).unwrap_or_default();
        let mut current = HashMap::with_capacity(tree.len());

        let mut readings: Vec<ResourceReading> = tree
            .iter()
            .filter_map(|p| sys.process(*p))
            .map(|process| {
                let member = process.pid().as_u32();
                let cpu_ms = process.accumulated_cpu_time();
                let baseline = previous
                    .get(&member)
                    .copied()
                    .unwrap_or(CpuBaseline { at: started, cpu_ms: 0 });
                current.insert(member, CpuBaseline { at: now, cpu_ms });

                ResourceReading {
                    pid: member,
                    cpu: baseline.usage_since(now, cpu_ms),
                    mem: process.memory(),
                }
            })
            .collect();
        readings.sort_by_key(|r| r.pid);
        baselines.insert(pid, current);

        log::trace!("Queried {} process(es) under pid {}", readings.len(), pid);
        Ok(readings)
    }
}
