use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::models::stats::{Sample, SampleStats};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 监控器发起 kill 的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillReason {
    Timeout,
    QueryError(String),
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillReason::Timeout => write!(f, "timeout"),
            KillReason::QueryError(msg) => write!(f, "query error: {}", msg),
        }
    }
}

struct Tracking {
    samples: Vec<Sample>,
    finalized: bool,
}

/// 一个正在被监管的子进程
///
/// 进程句柄本身由 supervisor 持有；这里只保存 monitor 需要共享的状态。
/// monitor 通过 [`ManagedProcess::request_kill`] 请求终止，supervisor
/// 在等待退出的同时响应该请求。
pub struct ManagedProcess {
    id: u64,
    /// 测试脚本的文件名
    pub script: String,
    pub engine_name: String,
    pub pid: u32,
    pub start_time: Instant,
    tracking: Mutex<Tracking>,
    timed_out: AtomicBool,
    exited: AtomicBool,
    kill_reason: Mutex<Option<KillReason>>,
    kill_notify: Notify,
}

impl ManagedProcess {
    pub fn new(script: impl Into<String>, engine_name: impl Into<String>, pid: u32) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            script: script.into(),
            engine_name: engine_name.into(),
            pid,
            start_time: Instant::now(),
            tracking: Mutex::new(Tracking {
                samples: Vec::new(),
                finalized: false,
            }),
            timed_out: AtomicBool::new(false),
            exited: AtomicBool::new(false),
            kill_reason: Mutex::new(None),
            kill_notify: Notify::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 进程是否仍在运行（supervisor 观察到退出前为 true）
    pub fn is_running(&self) -> bool {
        !self.exited.load(Ordering::Acquire)
    }

    pub fn mark_exited(&self) {
        self.exited.store(true, Ordering::Release);
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    /// 设置超时标记，只有第一次调用返回 true
    pub fn mark_timed_out(&self) -> bool {
        self.timed_out
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 追加一次采样；进程已 finalize 时丢弃并返回 false
    pub fn push_sample(&self, sample: Sample) -> bool {
        let Ok(mut tracking) = self.tracking.lock() else {
            return false;
        };
        if tracking.finalized {
            return false;
        }
        tracking.samples.push(sample);
        true
    }

    pub fn sample_count(&self) -> usize {
        self.tracking.lock().map(|t| t.samples.len()).unwrap_or(0)
    }

    /// 结束跟踪并返回最终统计；只有第一次调用返回 `Some`
    pub fn finalize(&self) -> Option<SampleStats> {
        let mut tracking = self.tracking.lock().ok()?;
        if tracking.finalized {
            return None;
        }
        tracking.finalized = true;
        Some(SampleStats::from_samples(&tracking.samples))
    }

    pub fn is_finalized(&self) -> bool {
        self.tracking.lock().map(|t| t.finalized).unwrap_or(true)
    }

    /// 请求终止进程。可重复调用，只有第一次生效，之后的调用没有任何效果。
    pub fn request_kill(&self, reason: KillReason) -> bool {
        let Ok(mut slot) = self.kill_reason.lock() else {
            return false;
        };
        if slot.is_some() || !self.is_running() {
            return false;
        }
        log::debug!("Kill requested for {} (pid {}): {}", self.script, self.pid, reason);
        *slot = Some(reason);
        self.kill_notify.notify_one();
        true
    }

    pub fn kill_reason(&self) -> Option<KillReason> {
        self.kill_reason.lock().ok().and_then(|r| r.clone())
    }

    /// 等待 kill 请求
    pub async fn kill_requested(&self) {
        self.kill_notify.notified().await;
    }
}

impl fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("id", &self.id)
            .field("script", &self.script)
            .field("engine_name", &self.engine_name)
            .field("pid", &self.pid)
            .field("timed_out", &self.timed_out())
            .field("running", &self.is_running())
            .finish()
    }
}
