//! GeoCatch Simulator CLI
//!
//! Run deterministic end-to-end session scenarios.

use clap::Parser;
use geocatch_core::{SessionConfig, TargetCatalog};
use geocatch_sim::scenarios::ScenarioId;
use geocatch_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// GeoCatch Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "geocatch-sim")]
#[command(about = "Run deterministic catch-session simulations", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (approach, pacing, gps_outlier, compass_wrap,
    /// permission_denied, fix_timeout, immersive_unsupported, immersive_placement,
    /// anchor_timeout, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Minimum walk duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Session configuration (JSON)
    #[arg(long)]
    config: Option<String>,

    /// Target catalog (JSON array of target records)
    #[arg(long)]
    catalog: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-fix frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins when set
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("GeoCatch Simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(2);
            }
        }
    };

    let config = match &args.config {
        Some(path) => SessionConfig::from_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}: {}", path, e);
            std::process::exit(2);
        }),
        None => SessionConfig::default(),
    };

    let catalog = match &args.catalog {
        Some(path) => TargetCatalog::from_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}: {}", path, e);
            std::process::exit(2);
        }),
        None => TargetCatalog::demo(),
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let runner_for = |seed: u64| {
        ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_config(config.clone())
            .with_catalog(catalog.clone())
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(2);
        }

        let (result, export) = runner_for(base_seed).run_with_export(scenarios[0]);
        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path),
            Err(e) => error!("Failed to write export: {}", e),
        }
        report(&[result], args.json);
        return;
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            all_results.push(result);
        }
    }

    report(&all_results, args.json);
}

/// Prints the summary and exits non-zero if anything failed.
fn report(results: &[ScenarioResult], json: bool) {
    let total = results.len();
    let failed = results.iter().filter(|r| !r.passed).count();

    if json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else if failed == 0 {
        info!("All {} scenario runs passed", total);
    } else {
        error!("{}/{} scenario runs failed", failed, total);
        for result in results.iter().filter(|r| !r.passed) {
            error!(
                "  - {} seed={}: {}",
                result.scenario.name(),
                result.seed,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
