//! Arguments and setup shared by the binaries.

use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::InputPaths;

#[derive(Debug, Clone, Args)]
pub struct InputArgs {
    /// Player-game stats (CSV or Parquet)
    #[arg(long, env = "TDF_STATS")]
    pub stats: PathBuf,

    /// Team ratings by season: offense, defense, red-zone efficiency
    #[arg(long, env = "TDF_TEAM_RATINGS")]
    pub team_ratings: Option<PathBuf>,

    /// Roster with position, current team and injury status
    #[arg(long, env = "TDF_ROSTER")]
    pub roster: Option<PathBuf>,

    /// Pipeline config (TOML); defaults apply when omitted
    #[arg(short, long, env = "TDF_CONFIG")]
    pub config: Option<PathBuf>,
}

impl InputArgs {
    pub fn paths(&self) -> InputPaths {
        InputPaths {
            stats: self.stats.clone(),
            team_ratings: self.team_ratings.clone(),
            roster: self.roster.clone(),
            ..InputPaths::default()
        }
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        PipelineConfig::resolve(self.config.as_deref())
    }
}

/// `.env` first so `RUST_LOG` and `TDF_*` can live there, then the subscriber.
pub fn init() {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
