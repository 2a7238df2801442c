use clap::Parser;
use std::sync::Arc;

use engine_harness::cli::CommandArgs;
use engine_harness::config::HarnessConfig;
use engine_harness::harness;
use engine_harness::metrics::METRICS;
use engine_harness::models::Engine;
use engine_harness::report;
use engine_harness::services::SysinfoProbe;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();

    let mut config = HarnessConfig::load(&args.config)?;
    config.apply_args(&args);

    if !args.json {
        print_banner(&config);
    }

    let engines = match harness::run(&config, Arc::new(SysinfoProbe::new())).await {
        Ok(engines) => engines,
        Err(e) => {
            log::error!("Harness run failed: {}", e);
            for cause in e.chain().skip(1) {
                log::error!("     - {}", cause);
            }
            return Err(e);
        }
    };

    print_results(&engines, args.json)?;

    if args.print_metrics {
        match METRICS.render() {
            Ok(text) => println!("{}", text),
            Err(e) => log::error!("Failed to render metrics: {}", e),
        }
    }

    Ok(())
}

fn print_results(engines: &[Engine], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", report::render_json(engines)?);
    } else {
        print!("{}", report::render_text(engines));
    }
    Ok(())
}

fn print_banner(config: &HarnessConfig) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      Engine Harness v{:<37}║", env!("CARGO_PKG_VERSION"));
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("📂 Tests:    {}", config.tests_dir.display());
    println!("⏱  Timeout:  {}ms", config.timeout_ms);
    println!("📈 Interval: {}ms", config.interval_ms);
    println!();
    println!("🔧 Engines:");
    for engine in &config.engines {
        println!("  • {:<12} {}", engine.name, engine.path.display());
    }
    println!("═══════════════════════════════════════════════════════════");
}
