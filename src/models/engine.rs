use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use crate::models::process::ManagedProcess;
use crate::models::result::TestResult;

/// 引擎配置信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 引擎名称（唯一标识符）
    pub name: String,
    /// 可执行文件路径
    pub path: PathBuf,
    /// 放在脚本路径之前的额外参数
    #[serde(default)]
    pub args: Vec<String>,
}

/// 引擎运行状态：待执行队列与测试结果
#[derive(Debug, Clone, Serialize)]
pub struct Engine {
    pub name: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip)]
    pub queue: VecDeque<PathBuf>,
    pub tests_passed: Vec<TestResult>,
    pub tests_failed: Vec<TestResult>,
}

impl Engine {
    pub fn new(config: EngineConfig, scripts: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            name: config.name,
            path: config.path,
            args: config.args,
            queue: scripts.into_iter().collect(),
            tests_passed: Vec::new(),
            tests_failed: Vec::new(),
        }
    }

    pub fn record(&mut self, result: TestResult) {
        if result.status.is_success() {
            self.tests_passed.push(result);
        } else {
            self.tests_failed.push(result);
        }
    }

    pub fn completed(&self) -> usize {
        self.tests_passed.len() + self.tests_failed.len()
    }
}

/// 每个引擎同一时间最多一个进程
#[derive(Debug, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Running(Arc<ManagedProcess>),
    /// 队列已空，最后一个测试已完成，等待完成回调
    Draining,
}

impl EngineState {
    pub fn is_idle(&self) -> bool {
        matches!(self, EngineState::Idle)
    }

    pub fn is_draining(&self) -> bool {
        matches!(self, EngineState::Draining)
    }

    pub fn current(&self) -> Option<&Arc<ManagedProcess>> {
        match self {
            EngineState::Running(process) => Some(process),
            _ => None,
        }
    }
}
