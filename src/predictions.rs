use std::collections::HashSet;

use serde::Serialize;

use crate::config::ModelsConfig;
use crate::error::{ForecastError, Result};
use crate::model::{GRADIENT_BOOSTING, LOGISTIC_REGRESSION, Model, POISSON_BASELINE, RANDOM_FOREST};
use crate::player_game::Position;
use crate::projector::ProjectedWeek;

/// One player's touchdown probability for an upcoming game, per model.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRow {
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub opponent: String,
    pub home: bool,
    pub position: Position,
    pub season: i32,
    pub week: u32,
    pub probabilities: Vec<(String, f64)>,
}

impl PredictionRow {
    pub fn probability(&self, model: &str) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|(name, _)| name == model)
            .map(|(_, p)| *p)
    }
}

/// Which models and feature columns an upcoming-week run uses, and who to leave out.
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub season: i32,
    pub week: u32,
    /// Model names to fit and apply; empty means every enabled model.
    pub models: Vec<String>,
    /// Feature subset; `None` uses the full layout.
    pub feature_columns: Option<Vec<String>>,
    pub exclusions: HashSet<String>,
}

impl PredictionRequest {
    pub fn new(season: i32, week: u32) -> Self {
        Self {
            season,
            week,
            models: Vec::new(),
            feature_columns: None,
            exclusions: HashSet::new(),
        }
    }

    /// Disable every model the request does not name. Unknown or disabled names are a config
    /// error.
    pub fn restrict(&self, config: &ModelsConfig) -> Result<ModelsConfig> {
        let mut restricted = config.clone();
        if self.models.is_empty() {
            return Ok(restricted);
        }
        let enabled = enabled_models(config);
        if let Some(unknown) = self.models.iter().find(|m| !enabled.contains(&m.as_str())) {
            return Err(ForecastError::config(
                "models",
                format!("`{unknown}` is not an enabled model (have: {})", enabled.join(", ")),
            ));
        }
        let wanted = |name: &str| self.models.iter().any(|m| m == name);
        restricted.poisson_baseline.enabled &= wanted(POISSON_BASELINE);
        restricted.logistic.enabled &= wanted(LOGISTIC_REGRESSION);
        restricted.random_forest.enabled &= wanted(RANDOM_FOREST);
        restricted.gradient_boosting.enabled &= wanted(GRADIENT_BOOSTING);
        Ok(restricted)
    }
}

fn enabled_models(config: &ModelsConfig) -> Vec<&'static str> {
    [
        (POISSON_BASELINE, config.poisson_baseline.enabled),
        (LOGISTIC_REGRESSION, config.logistic.enabled),
        (RANDOM_FOREST, config.random_forest.enabled),
        (GRADIENT_BOOSTING, config.gradient_boosting.enabled),
    ]
    .into_iter()
    .filter(|(_, enabled)| *enabled)
    .map(|(name, _)| name)
    .collect()
}

/// Apply models to a projected week. The baseline reads `full`, which carries the whole feature
/// layout it looks columns up in; fitted learners read `fitted`, the same rows projected onto the
/// columns they were trained on.
pub fn predict_rows(
    models: &[Model],
    full: &ProjectedWeek,
    fitted: &ProjectedWeek,
) -> Result<Vec<PredictionRow>> {
    if full.rows.len() != fitted.rows.len() {
        return Err(ForecastError::DataIntegrity(format!(
            "projected week has {} rows but the fitted projection has {}",
            full.rows.len(),
            fitted.rows.len()
        )));
    }
    let full_x = feature_matrix(full);
    let fitted_x = feature_matrix(fitted);
    let per_model = models
        .iter()
        .map(|m| {
            let x = if m.needs_fit() { &fitted_x } else { &full_x };
            Ok((m.name().to_string(), m.predict_proba(x)?))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(full
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| PredictionRow {
            player_id: row.player_id.clone(),
            player_name: row.player_name.clone(),
            team: row.context.team.clone(),
            opponent: row.context.opponent.clone(),
            home: row.context.home,
            position: row.context.position,
            season: row.context.season,
            week: row.context.week,
            probabilities: per_model
                .iter()
                .map(|(name, probs)| (name.clone(), probs[idx]))
                .collect(),
        })
        .collect())
}

fn feature_matrix(week: &ProjectedWeek) -> Vec<Vec<f64>> {
    week.rows.iter().map(|r| r.features.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::PredictionRequest;
    use crate::config::ModelsConfig;
    use crate::error::ForecastError;

    #[test]
    fn restrict_keeps_only_named_models() {
        let mut request = PredictionRequest::new(2024, 1);
        let cfg = ModelsConfig::default();
        let all = request.restrict(&cfg).unwrap();
        assert!(all.poisson_baseline.enabled && all.gradient_boosting.enabled);

        request.models = vec!["random_forest".to_string()];
        let only = request.restrict(&cfg).unwrap();
        assert!(only.random_forest.enabled);
        assert!(!only.poisson_baseline.enabled);
        assert!(!only.logistic.enabled);
        assert!(!only.gradient_boosting.enabled);

        request.models = vec!["xgboost".to_string()];
        assert!(matches!(
            request.restrict(&cfg),
            Err(ForecastError::Config { .. })
        ));
    }
}
