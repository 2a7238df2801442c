use prometheus::{
    Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder,
    register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
};
use lazy_static::lazy_static;
use std::sync::Arc;

use crate::models::TestStatus;

pub struct MetricsRegistry {
    registry: Registry,

    // Gauge metrics
    pub process_cpu_usage: GaugeVec,
    pub process_memory_bytes: GaugeVec,
    pub test_duration_seconds: GaugeVec,

    // Counter metrics
    pub tests_total: IntCounterVec,
}

impl MetricsRegistry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let process_labels = &["engine", "script"];

        let process_cpu_usage = register_gauge_vec_with_registry!(
            Opts::new("harness_process_cpu_usage_percent", "Last sampled CPU usage of a test process tree"),
            process_labels,
            registry
        )?;

        let process_memory_bytes = register_gauge_vec_with_registry!(
            Opts::new("harness_process_memory_bytes", "Last sampled resident memory of a test process tree"),
            process_labels,
            registry
        )?;

        let test_duration_seconds = register_gauge_vec_with_registry!(
            Opts::new("harness_test_duration_seconds", "Wall-clock duration of a finished test"),
            process_labels,
            registry
        )?;

        let tests_total = register_int_counter_vec_with_registry!(
            Opts::new("harness_tests_total", "Finished tests by outcome"),
            &["engine", "status"],
            registry
        )?;

        Ok(Self {
            registry,
            process_cpu_usage,
            process_memory_bytes,
            test_duration_seconds,
            tests_total,
        })
    }

    pub fn observe_sample(&self, engine: &str, script: &str, cpu: f32, mem: u64) {
        let labels = &[engine, script];
        self.process_cpu_usage.with_label_values(labels).set(cpu as f64);
        self.process_memory_bytes.with_label_values(labels).set(mem as f64);
    }

    pub fn observe_result(&self, engine: &str, script: &str, status: &TestStatus, elapsed_ms: u64) {
        let outcome = match status {
            TestStatus::Success => "success",
            TestStatus::Timeout => "timeout",
            TestStatus::Error(_) => "failed",
        };
        self.tests_total.with_label_values(&[engine, outcome]).inc();
        self.test_duration_seconds
            .with_label_values(&[engine, script])
            .set(elapsed_ms as f64 / 1000.0);
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> =
        Arc::new(MetricsRegistry::new().expect("static metric definitions are valid"));
}
