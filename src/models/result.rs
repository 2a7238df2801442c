use serde::{Serialize, Serializer};
use std::fmt;

use crate::models::stats::SampleStats;

/// 子进程最终的退出状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitState {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub stderr_empty: bool,
}

impl ExitState {
    pub fn from_status(status: &std::process::ExitStatus, stderr: &str) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            stderr_empty: stderr.trim().is_empty(),
        }
    }

    pub fn is_zero_exit(&self) -> bool {
        self.code == Some(0) && self.signal.is_none()
    }
}

/// 三类结束信号（退出、启动错误、monitor 终止）汇总后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    CleanExit,
    AbnormalExit { code: Option<i32>, signal: Option<i32> },
    SpawnError(String),
    MonitorTimeout,
    MonitorKillOnQueryError(String),
}

impl ProcessOutcome {
    /// 合并退出状态与 monitor 标记。超时优先于任何退出分类。
    pub fn reduce(exit: &ExitState, timed_out: bool, query_error: Option<String>) -> Self {
        if timed_out {
            return ProcessOutcome::MonitorTimeout;
        }
        if let Some(msg) = query_error {
            return ProcessOutcome::MonitorKillOnQueryError(msg);
        }
        if exit.is_zero_exit() {
            ProcessOutcome::CleanExit
        } else {
            ProcessOutcome::AbnormalExit {
                code: exit.code,
                signal: exit.signal,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestStatus {
    Success,
    Timeout,
    Error(String),
}

impl TestStatus {
    /// `verdict_ok` 只在 `CleanExit` 时有意义
    pub fn from_outcome(outcome: &ProcessOutcome, verdict_ok: bool) -> Self {
        match outcome {
            ProcessOutcome::CleanExit if verdict_ok => TestStatus::Success,
            ProcessOutcome::CleanExit => TestStatus::Error("verdict".to_string()),
            ProcessOutcome::AbnormalExit { code, signal } => {
                let detail = match (signal, code) {
                    (Some(sig), _) => signal_name(*sig),
                    (None, Some(code)) => code.to_string(),
                    (None, None) => "unknown".to_string(),
                };
                TestStatus::Error(detail)
            }
            ProcessOutcome::SpawnError(msg) => TestStatus::Error(format!("spawn: {}", msg)),
            ProcessOutcome::MonitorTimeout => TestStatus::Timeout,
            ProcessOutcome::MonitorKillOnQueryError(msg) => {
                TestStatus::Error(format!("query: {}", msg))
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Success)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Success => write!(f, "success"),
            TestStatus::Timeout => write!(f, "timeout"),
            TestStatus::Error(detail) => write!(f, "error {}", detail),
        }
    }
}

impl Serialize for TestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 常见信号编号到名称
pub fn signal_name(signal: i32) -> String {
    let name = match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        6 => "SIGABRT",
        7 => "SIGBUS",
        8 => "SIGFPE",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        _ => return format!("signal {}", signal),
    };
    name.to_string()
}

/// 单个测试的最终记录
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub script: String,
    pub stdout: String,
    pub stderr: String,
    pub status: TestStatus,
    /// 执行耗时 (毫秒)
    pub elapsed_ms: u64,
    pub stats: SampleStats,
}

/// 失败测试的 stdout 不做解析，只把换行压平
pub fn flatten_output(stdout: &str) -> String {
    stdout.replace("\r\n", " ").replace('\n', " ")
}
