use crate::models::{Engine, SampleStats, TestResult};
use std::fmt::Write;

fn fmt_cpu(value: Option<f32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}%", v))
}

fn fmt_mem(value: Option<u64>) -> String {
    match value {
        Some(bytes) => format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0)),
        None => "-".to_string(),
    }
}

fn fmt_stats(stats: &SampleStats) -> String {
    format!(
        "cpu {}..{} mem {}..{} ({} samples)",
        fmt_cpu(stats.min_cpu),
        fmt_cpu(stats.max_cpu),
        fmt_mem(stats.min_mem),
        fmt_mem(stats.max_mem),
        stats.len()
    )
}

fn write_result(out: &mut String, result: &TestResult) {
    let _ = writeln!(
        out,
        "  {:<8} {:<32} {:>7}ms  {}",
        result.status.to_string(),
        result.script,
        result.elapsed_ms,
        fmt_stats(&result.stats)
    );
}

/// 纯文本汇总
pub fn render_text(engines: &[Engine]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "═══════════════════════════════════════════════════════════");

    for engine in engines {
        let _ = writeln!(
            out,
            "{} ({}): {} passed, {} failed",
            engine.name,
            engine.path.display(),
            engine.tests_passed.len(),
            engine.tests_failed.len()
        );
        for result in &engine.tests_passed {
            write_result(&mut out, result);
        }
        for result in &engine.tests_failed {
            write_result(&mut out, result);
        }
        let _ = writeln!(out);
    }

    let passed: usize = engines.iter().map(|e| e.tests_passed.len()).sum();
    let failed: usize = engines.iter().map(|e| e.tests_failed.len()).sum();
    let _ = writeln!(out, "Total: {} passed, {} failed", passed, failed);
    let _ = writeln!(out, "═══════════════════════════════════════════════════════════");
    out
}

pub fn render_json(engines: &[Engine]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(engines)
}
