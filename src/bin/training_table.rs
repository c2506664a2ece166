use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use td_forecast::cli::{self, InputArgs};
use td_forecast::pipeline::Pipeline;
use td_forecast::report;

#[derive(Debug, Parser)]
#[command(name = "training_table", about = "Export the leakage-free training table as CSV")]
struct Cli {
    #[command(flatten)]
    inputs: InputArgs,

    #[arg(long, default_value = "reports/training_table.csv")]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    cli::init();
    let args = Cli::parse();

    let config = args.inputs.pipeline_config().context("loading config")?;
    let pipeline = Pipeline::load(config, &args.inputs.paths()).context("loading inputs")?;
    let table = pipeline.build_training_table();

    println!(
        "Rows: {}  positives: {}  features: {}  seasons: {:?}",
        table.len(),
        table.positives(),
        table.feature_names.len(),
        table.seasons()
    );
    report::write_training_table(&args.out, &table)
        .with_context(|| format!("writing {}", args.out.display()))?;
    println!("Wrote {}", args.out.display());
    Ok(())
}
