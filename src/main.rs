use anyhow::{Context, Result, anyhow};
use clap::Parser;
use occ_delete_demo::harness::{self, ConcurrencyHarness, HarnessConfig, TrialReport};
use occ_delete_demo::{CarStore, StrategyKind, seed_fords};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "occ-delete-demo")]
#[command(about = "Run version-checked and bulk deletes from concurrent units and check the outcome")]
struct Cli {
    /// Concurrent units per trial (overrides OCC_DEMO_UNITS)
    #[arg(long)]
    units: Option<usize>,

    /// Make to delete
    #[arg(long, default_value = "Ford")]
    make: String,

    /// version-checked or bulk; both when omitted
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Trials per strategy, each on a freshly seeded store
    #[arg(long, default_value_t = 1)]
    trials: usize,

    /// Print the trial reports as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = HarnessConfig::from_env().context("failed to load harness configuration")?;
    if let Some(units) = cli.units {
        config = config.units(units);
    }

    let kinds = match cli.strategy {
        Some(kind) => vec![kind],
        None => StrategyKind::ALL.to_vec(),
    };

    let mut reports = Vec::new();
    let mut violations = 0;
    for kind in kinds {
        for _ in 0..cli.trials {
            let store = CarStore::new();
            seed_fords(&store).await.context("failed to seed cars")?;
            let harness = ConcurrencyHarness::new(store.clone(), config.clone())
                .context("invalid harness configuration")?;

            let report = harness.run(kind.strategy(), &cli.make).await;
            let remaining = store
                .count_by_make(&cli.make)
                .await
                .context("failed to count remaining cars")?;

            match harness::verify(kind, &report) {
                Ok(()) => info!(trial_id = %report.trial_id, strategy = %kind, "trial behaved as expected"),
                Err(violation) => {
                    error!(error = %violation, "trial violated expectation");
                    violations += 1;
                }
            }
            if !cli.json {
                print_report(&report, remaining);
            }
            reports.push(report);
        }
    }

    if cli.json {
        let rendered =
            serde_json::to_string_pretty(&reports).context("failed to render reports as JSON")?;
        println!("{rendered}");
    }

    if violations > 0 {
        return Err(anyhow!("{violations} trial(s) did not behave as expected"));
    }
    Ok(())
}

fn print_report(report: &TrialReport, remaining: usize) {
    println!(
        "[{}] {} x{} on '{}': deleted {}, {} conflict(s), {} failure(s), {} remaining, {} ms",
        report.trial_id,
        report.strategy,
        report.units,
        report.make,
        report.total_deleted(),
        report.conflict_count(),
        report.failure_count(),
        remaining,
        report.elapsed_ms
    );
    for failure in report.failures() {
        println!("    unit {}: {}", failure.unit, failure.error);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("occ_delete_demo=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
