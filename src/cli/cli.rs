use clap::Parser;
use std::path::PathBuf;

/// Engine Harness - 在多个解释器引擎上依次运行测试脚本并采集资源使用
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// 配置文件 (JSON)
    #[arg(short, long, env = "HARNESS_CONFIG", default_value = "harness.json")]
    pub config: PathBuf,

    /// 单个测试的超时 (毫秒)，覆盖配置文件
    #[arg(short, long, env = "HARNESS_TIMEOUT")]
    pub timeout: Option<u64>,

    /// 采样间隔 (毫秒)，覆盖配置文件
    #[arg(short, long, env = "HARNESS_INTERVAL")]
    pub interval: Option<u64>,

    /// 只运行文件名匹配该正则的脚本
    #[arg(short, long)]
    pub filter: Option<String>,

    /// 以 JSON 输出结果
    #[arg(long)]
    pub json: bool,

    /// 结束后输出 Prometheus 文本格式的 metrics
    #[arg(long)]
    pub print_metrics: bool,
}
