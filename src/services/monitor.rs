use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::METRICS;
use crate::models::{KillReason, ManagedProcess, Sample};
use crate::services::stats_collector::{ProbeError, ResourceProbe};
use crate::state::SharedRegistry;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// 每次成功采样输出一行
pub trait SampleSink: Send + Sync {
    fn emit(&self, process: &ManagedProcess, sample: &Sample);
}

/// 默认 sink：写日志并更新 Prometheus gauge
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl SampleSink for LogSink {
    fn emit(&self, process: &ManagedProcess, sample: &Sample) {
        info!(
            "[{}] {} cpu={:.1}% mem={}",
            process.engine_name, process.script, sample.cpu, sample.mem
        );
        METRICS.observe_sample(&process.engine_name, &process.script, sample.cpu, sample.mem);
    }
}

/// 周期性遍历注册表：检查超时、采样 CPU/内存
#[derive(Clone)]
pub struct Monitor {
    registry: SharedRegistry,
    probe: Arc<dyn ResourceProbe>,
    sink: Arc<dyn SampleSink>,
    interval: Duration,
    timeout: Duration,
}

impl Monitor {
    pub fn new(registry: SharedRegistry, probe: Arc<dyn ResourceProbe>) -> Self {
        Self {
            registry,
            probe,
            sink: Arc::new(LogSink),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 启动后台 ticker，直到 `shutdown` 触发（或发送端被丢弃）
    pub fn spawn(self, mut shutdown: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;

            debug!(
                "Resource monitor started (interval {:?}, timeout {:?})",
                self.interval, self.timeout
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        debug!("Resource monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        // 采样任务不等待，慢查询不会阻塞下一次 tick
                        self.tick();
                    }
                }
            }
        })
    }

    /// 单次 tick，返回本次发起的采样任务
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        for process in self.registry.snapshot() {
            if !process.is_running() || process.timed_out() {
                continue;
            }

            if process.elapsed() >= self.timeout {
                if process.mark_timed_out() {
                    warn!(
                        "{} on {} exceeded timeout of {:?}, killing pid {}",
                        process.script, process.engine_name, self.timeout, process.pid
                    );
                    process.request_kill(KillReason::Timeout);
                }
                continue;
            }

            let monitor = self.clone();
            tasks.push(tokio::spawn(async move {
                monitor.sample(process).await;
            }));
        }

        tasks
    }

    async fn sample(&self, process: Arc<ManagedProcess>) {
        let probe = self.probe.clone();
        let pid = process.pid;
        let started = process.start_time;

        let result = match tokio::task::spawn_blocking(move || probe.query(pid, started)).await {
            Ok(result) => result,
            Err(e) => Err(ProbeError::Unavailable(e.to_string())),
        };

        match result {
            Ok(readings) => {
                let sample = Sample::aggregate(&readings);
                if process.push_sample(sample) {
                    self.sink.emit(&process, &sample);
                } else {
                    debug!("Dropped late sample for finished {}", process.script);
                }
            }
            Err(err) => self.on_query_error(&process, &err),
        }
    }

    fn on_query_error(&self, process: &ManagedProcess, err: &ProbeError) {
        // NotFound 表示 OS 中已没有该进程：它已退出，只是 supervisor 还没处理
        let gone = matches!(err, ProbeError::NotFound(_));
        if !gone && process.is_running() && !process.timed_out() {
            error!(
                "Resource query for {} (pid {}) failed: {}; killing it",
                process.script, process.pid, err
            );
            process.request_kill(KillReason::QueryError(err.to_string()));
            self.registry.remove(process.id());
        } else if process.sample_count() == 0 {
            warn!(
                "{} exited before it could be sampled: {}",
                process.script, err
            );
        } else {
            debug!("Resource query for finished {} failed: {}", process.script, err);
        }
    }
}
