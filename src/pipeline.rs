//! Entry points tying the loader, feature builder, models and backtester together.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::info;

use crate::backtest::{BacktestReport, run_backtest};
use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::model::build_models;
use crate::player_game::PlayerGameRecord;
use crate::predictions::{PredictionRequest, PredictionRow, predict_rows};
use crate::projector::{UpcomingWeek, project_week};
use crate::stats_loader::{
    Roster, TeamRatings, UpcomingGame, load_exclusions, load_player_games, load_roster,
    load_schedule, load_team_ratings, read_table,
};
use crate::training_table::{TrainingTable, assemble};

/// Locations of the input tables. Only the player-game stats are mandatory.
#[derive(Debug, Clone, Default)]
pub struct InputPaths {
    pub stats: PathBuf,
    pub team_ratings: Option<PathBuf>,
    pub roster: Option<PathBuf>,
    pub schedule: Option<PathBuf>,
    pub exclusions: Option<PathBuf>,
}

/// Loaded, read-only inputs.
#[derive(Debug, Clone, Default)]
pub struct HistoricalData {
    pub records: Vec<PlayerGameRecord>,
    pub ratings: TeamRatings,
    pub roster: Roster,
    pub schedule: Vec<UpcomingGame>,
    pub exclusions: HashSet<String>,
}

impl HistoricalData {
    pub fn load(paths: &InputPaths) -> Result<Self> {
        // Roster first: it fills in positions missing from the stats table.
        let roster = match &paths.roster {
            Some(path) => load_roster(&read_table(path)?)?,
            None => Roster::default(),
        };
        let load = load_player_games(&read_table(&paths.stats)?, Some(&roster))?;
        let ratings = match &paths.team_ratings {
            Some(path) => load_team_ratings(&read_table(path)?)?,
            None => TeamRatings::default(),
        };
        let schedule = match &paths.schedule {
            Some(path) => load_schedule(&read_table(path)?)?,
            None => Vec::new(),
        };
        let exclusions = match &paths.exclusions {
            Some(path) => load_exclusions(&read_table(path)?)?,
            None => HashSet::new(),
        };
        info!(
            records = load.records.len(),
            ratings = ratings.len(),
            roster = roster.len(),
            games = schedule.len(),
            exclusions = exclusions.len(),
            "loaded inputs"
        );
        Ok(Self {
            records: load.records,
            ratings,
            roster,
            schedule,
            exclusions,
        })
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    data: HistoricalData,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, data: HistoricalData) -> Self {
        Self { config, data }
    }

    pub fn load(config: PipelineConfig, paths: &InputPaths) -> Result<Self> {
        Ok(Self::new(config, HistoricalData::load(paths)?))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn data(&self) -> &HistoricalData {
        &self.data
    }

    pub fn build_training_table(&self) -> TrainingTable {
        assemble(&self.data.records, &self.data.ratings, &self.config)
    }

    pub fn run_backtest(&self) -> Result<BacktestReport> {
        run_backtest(&self.build_training_table(), &self.config)
    }

    /// Fit the requested models on every historical row, then score the upcoming week.
    pub fn generate_predictions(&self, request: &PredictionRequest) -> Result<Vec<PredictionRow>> {
        if self.data.roster.is_empty() {
            return Err(ForecastError::DataIntegrity(
                "a roster table is required to generate predictions".to_string(),
            ));
        }
        // The baseline always reads the full layout by name; a feature subset only narrows what
        // the fitted learners see.
        let table = self.build_training_table();
        let subset_table;
        let fit_table = match &request.feature_columns {
            Some(columns) => {
                subset_table = table.select_columns(columns)?;
                &subset_table
            }
            None => &table,
        };

        let models_config = request.restrict(&self.config.models)?;
        let mut models = build_models(&models_config, &table.feature_names)?;
        for model in models.iter_mut().filter(|m| m.needs_fit()) {
            model.fit(&fit_table.features, &fit_table.labels)?;
        }

        let mut exclusions = self.data.exclusions.clone();
        exclusions.extend(request.exclusions.iter().cloned());
        let upcoming = UpcomingWeek {
            season: request.season,
            week: request.week,
            schedule: &self.data.schedule,
            roster: &self.data.roster,
            exclusions: &exclusions,
        };
        let week = project_week(
            &self.data.records,
            &self.data.ratings,
            &upcoming,
            &self.config,
        )?;
        let subset_week;
        let fit_week = match &request.feature_columns {
            Some(columns) => {
                subset_week = week.select_columns(columns)?;
                &subset_week
            }
            None => &week,
        };

        let mut rows = predict_rows(&models, &week, fit_week)?;
        if let Some(first) = models.first() {
            let lead = first.name();
            rows.sort_by(|a, b| {
                let pa = a.probability(lead).unwrap_or(0.0);
                let pb = b.probability(lead).unwrap_or(0.0);
                pb.total_cmp(&pa)
            });
        }
        info!(
            season = request.season,
            week = request.week,
            rows = rows.len(),
            models = models.len(),
            "generated predictions"
        );
        Ok(rows)
    }
}
