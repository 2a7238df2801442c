use std::sync::Arc;

use anyhow::Result;
use tokio::sync::oneshot;

use crate::config::HarnessConfig;
use crate::models::Engine;
use crate::services::monitor::Monitor;
use crate::services::process_checker::ExitVerdict;
use crate::services::stats_collector::ResourceProbe;
use crate::services::supervisor::Supervisor;
use crate::state::new_registry;

/// 启动 monitor，并发运行所有引擎，结束后停止 monitor
pub async fn run(config: &HarnessConfig, probe: Arc<dyn ResourceProbe>) -> Result<Vec<Engine>> {
    config.validate()?;
    let engines = config.build_engines()?;

    let registry = new_registry();
    let (shutdown, shutdown_rx) = oneshot::channel();
    let monitor = Monitor::new(registry.clone(), probe)
        .with_interval(config.interval())
        .with_timeout(config.timeout())
        .spawn(shutdown_rx);

    let supervisor = Supervisor::new(registry.clone())
        .with_verdict(Arc::new(ExitVerdict::new(config.strict_stderr)));

    let engines = supervisor
        .run_all(engines, |engine| {
            log::info!(
                "Engine {} finished: {} passed, {} failed",
                engine.name,
                engine.tests_passed.len(),
                engine.tests_failed.len()
            );
        })
        .await;

    let _ = shutdown.send(());
    if let Err(e) = monitor.await {
        log::warn!("Resource monitor task ended abnormally: {}", e);
    }

    Ok(engines)
}
