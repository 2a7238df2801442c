use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::CommandArgs;
use crate::models::{Engine, EngineConfig};
use crate::services::monitor::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

/// 配置文件 (JSON)
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 测试脚本所在目录
    pub tests_dir: PathBuf,
    /// 文件名过滤正则
    #[serde(default)]
    pub filter: Option<String>,
    /// 干净退出但写了 stderr 时也判为失败
    #[serde(default)]
    pub strict_stderr: bool,
    pub engines: Vec<EngineConfig>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL.as_millis() as u64
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: HarnessConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;

        // tests_dir 相对于配置文件所在目录
        if config.tests_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.tests_dir = parent.join(&config.tests_dir);
            }
        }
        Ok(config)
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_args(&mut self, args: &CommandArgs) {
        if let Some(timeout) = args.timeout {
            self.timeout_ms = timeout;
        }
        if let Some(interval) = args.interval {
            self.interval_ms = interval;
        }
        if let Some(filter) = &args.filter {
            self.filter = Some(filter.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engines.is_empty() {
            bail!("No engines configured");
        }
        if self.interval_ms == 0 {
            bail!("interval_ms must be greater than zero");
        }
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        for (i, engine) in self.engines.iter().enumerate() {
            if self.engines[..i].iter().any(|e| e.name == engine.name) {
                bail!("Duplicate engine name '{}'", engine.name);
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// 按文件名排序发现测试脚本
    pub fn discover_scripts(&self) -> Result<Vec<PathBuf>> {
        let filter = match &self.filter {
            Some(pattern) => Some(
                Regex::new(pattern).with_context(|| format!("Invalid filter '{}'", pattern))?,
            ),
            None => None,
        };

        let entries = std::fs::read_dir(&self.tests_dir)
            .with_context(|| format!("Failed to read tests dir {}", self.tests_dir.display()))?;

        let mut scripts = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if filter.as_ref().is_some_and(|re| !re.is_match(&name)) {
                continue;
            }
            scripts.push(entry.path());
        }
        scripts.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        log::debug!(
            "Discovered {} script(s) in {}",
            scripts.len(),
            self.tests_dir.display()
        );
        Ok(scripts)
    }

    /// 每个引擎使用同一份脚本队列
    pub fn build_engines(&self) -> Result<Vec<Engine>> {
        let scripts = self.discover_scripts()?;
        Ok(self
            .engines
            .iter()
            .cloned()
            .map(|config| Engine::new(config, scripts.clone()))
            .collect())
    }
}
