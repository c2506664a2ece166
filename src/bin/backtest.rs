use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use td_forecast::cli::{self, InputArgs};
use td_forecast::pipeline::Pipeline;
use td_forecast::report;

#[derive(Debug, Parser)]
#[command(name = "backtest", about = "Walk-forward backtest of touchdown models by season")]
struct Cli {
    #[command(flatten)]
    inputs: InputArgs,

    /// Directory for the summary, per-season and calibration tables
    #[arg(long, default_value = "reports")]
    out_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    cli::init();
    let args = Cli::parse();

    let config = args.inputs.pipeline_config().context("loading config")?;
    let pipeline = Pipeline::load(config, &args.inputs.paths()).context("loading inputs")?;
    let report = pipeline.run_backtest().context("running backtest")?;

    println!("Walk-forward backtest");
    println!("Stats: {}", args.inputs.stats.display());
    let cfg = pipeline.config();
    println!(
        "Windows: {:?}  AUC policy: {:?}  calibration bins: {}",
        cfg.features.window_sizes, cfg.backtest.auc_policy, cfg.backtest.calibration_bins
    );
    for skip in &report.skipped_seasons {
        println!("Skipped season {}: {}", skip.season, skip.reason);
    }
    for skip in &report.skipped_models {
        println!("Skipped {} in {}: {}", skip.model, skip.season, skip.reason);
    }
    println!();
    println!(
        "{:<22} {:>7} {:>8} {:>9} {:>8} {:>8} {:>8} {:>8}",
        "model", "seasons", "samples", "brier", "logloss", "acc", "auc", "ece"
    );
    for s in &report.summary {
        println!(
            "{:<22} {:>7} {:>8} {:>9.5} {:>8.4} {:>8.3} {:>8.3} {:>8.4}",
            s.model, s.seasons, s.samples, s.brier, s.log_loss, s.accuracy, s.roc_auc, s.ece
        );
    }
    println!();
    println!("{:<8} {:<22} {:>8} {:>9} {:>8}", "season", "model", "samples", "brier", "auc");
    for fold in &report.folds {
        println!(
            "{:<8} {:<22} {:>8} {:>9.5} {:>8.3}",
            fold.season, fold.model, fold.metrics.samples, fold.metrics.brier, fold.metrics.roc_auc
        );
    }

    let written = report::write_backtest(&args.out_dir, &report)
        .with_context(|| format!("writing reports to {}", args.out_dir.display()))?;
    println!();
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
