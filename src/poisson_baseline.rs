use crate::config::PoissonBaselineConfig;
use crate::error::{ForecastError, Result};
use crate::features::{OPP_TD_RATE_RECENT, OPP_TD_RATE_SEASON, rolling_column};
use crate::player_game::StatKey;

/// Closed-form touchdown probability: the player's recent `total_tds` rate scaled by how the
/// opponent has defended lately relative to its season, mapped through `P(N >= 1) = 1 - e^-rate`.
#[derive(Debug, Clone)]
pub struct PoissonBaseline {
    rate_idx: usize,
    recent_idx: usize,
    season_idx: usize,
    width: usize,
    rate_floor: f64,
    opponent_floor: f64,
}

impl PoissonBaseline {
    pub fn new(config: &PoissonBaselineConfig, feature_names: &[String]) -> Result<Self> {
        let find = |name: &str| {
            feature_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| {
                    ForecastError::config(
                        "models.poisson_baseline",
                        format!("feature column `{name}` is not available"),
                    )
                })
        };
        Ok(Self {
            rate_idx: find(&rolling_column(StatKey::TotalTds, config.window))?,
            recent_idx: find(OPP_TD_RATE_RECENT)?,
            season_idx: find(OPP_TD_RATE_SEASON)?,
            width: feature_names.len(),
            rate_floor: config.rate_floor,
            opponent_floor: config.opponent_floor,
        })
    }

    pub fn rate(&self, row: &[f64]) -> f64 {
        let recent = row[self.recent_idx].max(self.opponent_floor);
        let season = row[self.season_idx].max(self.opponent_floor);
        (row[self.rate_idx] * recent / season).max(self.rate_floor)
    }

    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        features
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                if row.len() != self.width {
                    return Err(ForecastError::DataIntegrity(format!(
                        "poisson_baseline: row {idx} has {} features, expected {}",
                        row.len(),
                        self.width
                    )));
                }
                Ok(1.0 - (-self.rate(row)).exp())
            })
            .collect()
    }
}
