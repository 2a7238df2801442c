use crate::models::ExitState;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

/// 判断进程的退出状态是否算作干净结束
pub trait Verdict: Send + Sync {
    fn is_clean(&self, exit: &ExitState) -> bool;
}

/// 默认判定：退出码 0 且没有被信号终止。
///
/// `strict_stderr` 打开时，写了 stderr 的进程也算失败。
#[derive(Debug, Clone, Default)]
pub struct ExitVerdict {
    pub strict_stderr: bool,
}

impl ExitVerdict {
    pub fn new(strict_stderr: bool) -> Self {
        Self { strict_stderr }
    }
}

impl Verdict for ExitVerdict {
    fn is_clean(&self, exit: &ExitState) -> bool {
        exit.is_zero_exit() && (!self.strict_stderr || exit.stderr_empty)
    }
}

/// 把通过测试的 stdout 规整为有意义的内容
pub trait OutputParser: Send + Sync {
    fn parse(&self, engine: &str, script: &Path, stdout: &str) -> String;
}

lazy_static! {
    static ref ANSI_ESCAPE: Regex =
        Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ANSI escape pattern is valid");
}

/// 去掉 ANSI 转义序列和首尾空白
#[derive(Debug, Clone, Default)]
pub struct TrimmedOutput;

impl OutputParser for TrimmedOutput {
    fn parse(&self, engine: &str, script: &Path, stdout: &str) -> String {
        let cleaned = ANSI_ESCAPE.replace_all(stdout, "");
        let trimmed = cleaned.trim();
        log::trace!(
            "Parsed {} bytes of output from {} on {}",
            trimmed.len(),
            script.display(),
            engine
        );
        trimmed.to_string()
    }
}
