//! Pipeline configuration.
//!
//! One immutable [`PipelineConfig`] is threaded through the feature builder, the training-table
//! assembler, the projector and the backtester, so training and prediction always see the same
//! windows, stats and positions. Values come from an optional TOML file, then `TDF_*`
//! environment overrides, then [`PipelineConfig::validate`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::player_game::{Position, StatKey};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub models: ModelsConfig,
    pub backtest: BacktestConfig,
    pub runtime: RuntimeConfig,
}

/// How the opponent scoring rate is computed for a row in week W of season S.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpponentMode {
    /// Only games of season S played before week W.
    #[default]
    PriorWeeks,
    /// Every game of season S, including weeks after W. Leaks future games into early-week rows.
    SeasonAverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub window_sizes: Vec<usize>,
    pub base_stats: Vec<StatKey>,
    pub cumulative_stats: Vec<StatKey>,
    pub tracked_positions: Vec<Position>,
    pub opponent_mode: OpponentMode,
    pub opponent_recent_games: usize,
    /// Floor for league-rate denominators in the opponent adjustment ratio.
    pub rate_floor: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_sizes: vec![3, 5, 8, 12],
            base_stats: vec![
                StatKey::RushingAttempts,
                StatKey::RushingYards,
                StatKey::RushingTds,
                StatKey::Targets,
                StatKey::Receptions,
                StatKey::ReceivingYards,
                StatKey::ReceivingTds,
                StatKey::Touches,
                StatKey::TotalTds,
                StatKey::FantasyPoints,
            ],
            cumulative_stats: vec![StatKey::TotalTds, StatKey::Touches],
            tracked_positions: vec![Position::Rb, Position::Wr, Position::Te],
            opponent_mode: OpponentMode::PriorWeeks,
            opponent_recent_games: 4,
            rate_floor: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeighting {
    /// Inverse-frequency weights: each class carries half of the total weight.
    #[default]
    Balanced,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub min_positive_examples: usize,
    pub class_weighting: ClassWeighting,
    pub poisson_baseline: PoissonBaselineConfig,
    pub logistic: LogisticConfig,
    pub random_forest: RandomForestConfig,
    pub gradient_boosting: GradientBoostingConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            min_positive_examples: 10,
            class_weighting: ClassWeighting::Balanced,
            poisson_baseline: PoissonBaselineConfig::default(),
            logistic: LogisticConfig::default(),
            random_forest: RandomForestConfig::default(),
            gradient_boosting: GradientBoostingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoissonBaselineConfig {
    pub enabled: bool,
    /// Rolling window of `total_tds` used as the player's base rate. Must be a configured window.
    pub window: usize,
    pub rate_floor: f64,
    pub opponent_floor: f64,
}

impl Default for PoissonBaselineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 5,
            rate_floor: 0.01,
            opponent_floor: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    pub enabled: bool,
    pub learning_rate: f64,
    pub l2: f64,
    pub max_iters: usize,
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            learning_rate: 0.5,
            l2: 1e-3,
            max_iters: 600,
            tolerance: 1e-7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub enabled: bool,
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of features considered at each split.
    pub feature_fraction: f64,
    pub seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_trees: 100,
            max_depth: 8,
            min_samples_leaf: 5,
            feature_fraction: 0.5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    pub enabled: bool,
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf values (Newton step denominator).
    pub l2: f64,
    /// Row fraction sampled per round; 1.0 disables sampling.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_rounds: 150,
            learning_rate: 0.05,
            max_depth: 3,
            min_samples_leaf: 10,
            l2: 1.0,
            subsample: 1.0,
            seed: 7,
        }
    }
}

/// What to do with an undefined ROC-AUC (single-class fold) when aggregating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AucPolicy {
    /// Treat as 0.5, no better than chance.
    #[default]
    Midpoint,
    /// Leave the fold out of the ROC-AUC average.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Seasons to evaluate; `None` evaluates every season in the table.
    pub seasons: Option<Vec<i32>>,
    pub auc_policy: AucPolicy,
    pub calibration_bins: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            seasons: None,
            auc_policy: AucPolicy::Midpoint,
            calibration_bins: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Threads for per-player feature building; 0 uses every core.
    pub feature_workers: usize,
    /// Concurrent backtest folds; 0 derives it from cores / `model_threads`.
    pub fold_workers: usize,
    /// Threads one model fit is expected to occupy.
    pub model_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            feature_workers: 0,
            fold_workers: 0,
            model_threads: 1,
        }
    }
}

impl RuntimeConfig {
    pub fn resolved_fold_workers(&self) -> usize {
        if self.fold_workers > 0 {
            return self.fold_workers;
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cores / self.model_threads.max(1)).max(1)
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self> {
        toml::from_str(raw).map_err(|source| ForecastError::Toml {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ForecastError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// File (if any) + environment overrides + validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = non_empty(lookup("TDF_WINDOWS")) {
            self.features.window_sizes = parse_list(&raw, "TDF_WINDOWS")?;
        }
        if let Some(raw) = non_empty(lookup("TDF_TRACKED_POSITIONS")) {
            self.features.tracked_positions = raw
                .split([',', ';', ' '])
                .filter(|part| !part.trim().is_empty())
                .map(Position::parse_lenient)
                .collect();
        }
        if let Some(raw) = non_empty(lookup("TDF_OPPONENT_MODE")) {
            self.features.opponent_mode = match raw.trim() {
                "prior_weeks" => OpponentMode::PriorWeeks,
                "season_average" => OpponentMode::SeasonAverage,
                other => {
                    return Err(ForecastError::config(
                        "TDF_OPPONENT_MODE",
                        format!("expected prior_weeks or season_average, got `{other}`"),
                    ));
                }
            };
        }
        if let Some(raw) = non_empty(lookup("TDF_MIN_POSITIVES")) {
            self.models.min_positive_examples = raw.trim().parse().map_err(|_| {
                ForecastError::config("TDF_MIN_POSITIVES", format!("not a count: `{raw}`"))
            })?;
        }
        if let Some(raw) = non_empty(lookup("TDF_FOLD_WORKERS")) {
            self.runtime.fold_workers = raw.trim().parse().map_err(|_| {
                ForecastError::config("TDF_FOLD_WORKERS", format!("not a count: `{raw}`"))
            })?;
        }
        if let Some(raw) = non_empty(lookup("TDF_BACKTEST_SEASONS")) {
            self.backtest.seasons = Some(parse_list(&raw, "TDF_BACKTEST_SEASONS")?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let f = &self.features;
        if f.window_sizes.is_empty() {
            return Err(ForecastError::config("features.window_sizes", "must not be empty"));
        }
        if f.window_sizes.contains(&0) {
            return Err(ForecastError::config("features.window_sizes", "windows must be >= 1"));
        }
        let unique_windows: HashSet<usize> = f.window_sizes.iter().copied().collect();
        if unique_windows.len() != f.window_sizes.len() {
            return Err(ForecastError::config("features.window_sizes", "duplicate window"));
        }
        if f.base_stats.is_empty() {
            return Err(ForecastError::config("features.base_stats", "must not be empty"));
        }
        if f.tracked_positions.is_empty() {
            return Err(ForecastError::config("features.tracked_positions", "must not be empty"));
        }
        if f.opponent_recent_games == 0 {
            return Err(ForecastError::config("features.opponent_recent_games", "must be >= 1"));
        }
        if !(f.rate_floor > 0.0) {
            return Err(ForecastError::config("features.rate_floor", "must be > 0"));
        }

        let m = &self.models;
        if m.poisson_baseline.enabled {
            if !f.base_stats.contains(&StatKey::TotalTds) {
                return Err(ForecastError::config(
                    "features.base_stats",
                    "the Poisson baseline needs `total_tds` among the base stats",
                ));
            }
            if !f.window_sizes.contains(&m.poisson_baseline.window) {
                return Err(ForecastError::config(
                    "models.poisson_baseline.window",
                    format!(
                        "window {} is not one of {:?}",
                        m.poisson_baseline.window, f.window_sizes
                    ),
                ));
            }
            if !(m.poisson_baseline.rate_floor > 0.0) || !(m.poisson_baseline.opponent_floor > 0.0)
            {
                return Err(ForecastError::config(
                    "models.poisson_baseline",
                    "floors must be > 0",
                ));
            }
        }
        if m.logistic.enabled && (!(m.logistic.learning_rate > 0.0) || m.logistic.max_iters == 0) {
            return Err(ForecastError::config(
                "models.logistic",
                "learning_rate must be > 0 and max_iters >= 1",
            ));
        }
        let rf = &m.random_forest;
        if rf.enabled
            && (rf.n_trees == 0
                || rf.max_depth == 0
                || !(rf.feature_fraction > 0.0 && rf.feature_fraction <= 1.0))
        {
            return Err(ForecastError::config(
                "models.random_forest",
                "n_trees and max_depth must be >= 1, feature_fraction in (0, 1]",
            ));
        }
        let gb = &m.gradient_boosting;
        if gb.enabled
            && (gb.n_rounds == 0
                || gb.max_depth == 0
                || !(gb.learning_rate > 0.0)
                || !(gb.subsample > 0.0 && gb.subsample <= 1.0))
        {
            return Err(ForecastError::config(
                "models.gradient_boosting",
                "n_rounds and max_depth must be >= 1, learning_rate > 0, subsample in (0, 1]",
            ));
        }
        if self.backtest.calibration_bins < 2 {
            return Err(ForecastError::config("backtest.calibration_bins", "must be >= 2"));
        }
        Ok(())
    }

    pub fn is_tracked(&self, position: Position) -> bool {
        self.features.tracked_positions.contains(&position)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|raw| !raw.trim().is_empty())
}

fn parse_list<T: std::str::FromStr>(raw: &str, field: &str) -> Result<Vec<T>> {
    raw.split([',', ';', ' '])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<T>()
                .map_err(|_| ForecastError::config(field, format!("cannot parse `{part}`")))
        })
        .collect()
}
