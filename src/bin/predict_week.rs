use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use td_forecast::cli::{self, InputArgs};
use td_forecast::pipeline::{InputPaths, Pipeline};
use td_forecast::predictions::PredictionRequest;
use td_forecast::report;

#[derive(Debug, Parser)]
#[command(name = "predict_week", about = "Touchdown probabilities for an upcoming week")]
struct Cli {
    #[command(flatten)]
    inputs: InputArgs,

    /// Upcoming schedule: season, week, home_team, away_team
    #[arg(long, env = "TDF_SCHEDULE")]
    schedule: PathBuf,

    /// Extra players to leave out (any table with a player_id column)
    #[arg(long, env = "TDF_EXCLUSIONS")]
    exclusions: Option<PathBuf>,

    #[arg(long)]
    season: i32,

    #[arg(long)]
    week: u32,

    /// Models to fit and apply (comma separated); all enabled models by default
    #[arg(long, value_delimiter = ',')]
    models: Vec<String>,

    /// Restrict the models to these feature columns (comma separated)
    #[arg(long, value_delimiter = ',')]
    features: Option<Vec<String>>,

    #[arg(long, default_value = "reports/predictions.csv")]
    out: PathBuf,

    /// Rows to print
    #[arg(long, default_value_t = 25)]
    top: usize,
}

fn main() -> anyhow::Result<()> {
    cli::init();
    let args = Cli::parse();

    let config = args.inputs.pipeline_config().context("loading config")?;
    let paths = InputPaths {
        schedule: Some(args.schedule.clone()),
        exclusions: args.exclusions.clone(),
        ..args.inputs.paths()
    };
    let pipeline = Pipeline::load(config, &paths).context("loading inputs")?;

    let mut request = PredictionRequest::new(args.season, args.week);
    request.models = args.models.clone();
    request.feature_columns = args.features.clone();
    let rows = pipeline
        .generate_predictions(&request)
        .with_context(|| format!("predicting {} week {}", args.season, args.week))?;

    println!("Anytime touchdown probabilities, {} week {}", args.season, args.week);
    for row in rows.iter().take(args.top) {
        let probs: Vec<String> = row
            .probabilities
            .iter()
            .map(|(model, p)| format!("{model}={:.1}%", p * 100.0))
            .collect();
        println!(
            "{:<24} {:<3} {:<4} {}{:<4} {}",
            row.player_name,
            row.position.code(),
            row.team,
            if row.home { "vs " } else { "@  " },
            row.opponent,
            probs.join("  ")
        );
    }

    report::write_predictions(&args.out, &rows)
        .with_context(|| format!("writing {}", args.out.display()))?;
    println!("Wrote {} rows to {}", rows.len(), args.out.display());
    Ok(())
}
