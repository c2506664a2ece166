//! Walk-forward evaluation: for every season S, fit on seasons before S and score on S.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::calibration::{
    CalibrationBin, Metrics, calibration_bins, evaluate_probs, expected_calibration_error,
    weighted_mean,
};
use crate::config::{AucPolicy, PipelineConfig};
use crate::error::{ForecastError, Result};
use crate::model::build_models;
use crate::pool::WorkerPool;
use crate::training_table::TrainingTable;

/// Seasons to evaluate, ascending and deduplicated.
#[derive(Debug, Clone)]
pub struct SeasonCursor {
    seasons: Vec<i32>,
    pos: usize,
}

impl SeasonCursor {
    pub fn new(available: &[i32], requested: Option<&[i32]>) -> Self {
        let mut seasons = requested.map_or_else(|| available.to_vec(), <[i32]>::to_vec);
        seasons.sort_unstable();
        seasons.dedup();
        Self { seasons, pos: 0 }
    }
}

impl Iterator for SeasonCursor {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        let season = self.seasons.get(self.pos).copied()?;
        self.pos += 1;
        Some(season)
    }
}

/// One (season, model) evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct SeasonMetrics {
    pub season: i32,
    pub model: String,
    pub train_rows: usize,
    #[serde(flatten)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub seasons: usize,
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
    pub roc_auc: f64,
    pub mae: f64,
    pub ece: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSeason {
    pub season: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedModel {
    pub season: i32,
    pub model: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelCalibration {
    pub model: String,
    pub ece: f64,
    pub bins: Vec<CalibrationBin>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BacktestReport {
    pub folds: Vec<SeasonMetrics>,
    /// Sorted by ascending Brier score.
    pub summary: Vec<ModelSummary>,
    pub skipped_seasons: Vec<SkippedSeason>,
    pub skipped_models: Vec<SkippedModel>,
    pub calibration: Vec<ModelCalibration>,
}

struct ModelFold {
    metrics: SeasonMetrics,
    predictions: Vec<f64>,
    outcomes: Vec<bool>,
}

enum FoldOutcome {
    Skipped(SkippedSeason),
    Evaluated {
        models: Vec<ModelFold>,
        skipped: Vec<SkippedModel>,
    },
}

pub fn run_backtest(table: &TrainingTable, config: &PipelineConfig) -> Result<BacktestReport> {
    let seasons: Vec<i32> =
        SeasonCursor::new(&table.seasons(), config.backtest.seasons.as_deref()).collect();
    let pool = WorkerPool::sized(config.runtime.resolved_fold_workers());
    info!(
        seasons = ?seasons,
        workers = pool.threads(),
        rows = table.len(),
        "starting walk-forward backtest"
    );

    let outcomes: Vec<FoldOutcome> = pool.run(|| {
        seasons
            .par_iter()
            .map(|season| run_fold(table, *season, config))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut report = BacktestReport::default();
    let mut pooled: BTreeMap<String, (Vec<f64>, Vec<bool>)> = BTreeMap::new();
    let mut model_order: Vec<String> = Vec::new();
    for outcome in outcomes {
        match outcome {
            FoldOutcome::Skipped(skip) => report.skipped_seasons.push(skip),
            FoldOutcome::Evaluated { models, skipped } => {
                report.skipped_models.extend(skipped);
                for fold in models {
                    if !model_order.contains(&fold.metrics.model) {
                        model_order.push(fold.metrics.model.clone());
                    }
                    let entry = pooled.entry(fold.metrics.model.clone()).or_default();
                    entry.0.extend(fold.predictions);
                    entry.1.extend(fold.outcomes);
                    report.folds.push(fold.metrics);
                }
            }
        }
    }
    if report.folds.is_empty() {
        return Err(ForecastError::NoEvaluableSeasons);
    }

    for model in &model_order {
        if let Some((predictions, outcomes)) = pooled.get(model) {
            let bins = calibration_bins(predictions, outcomes, config.backtest.calibration_bins);
            report.calibration.push(ModelCalibration {
                model: model.clone(),
                ece: expected_calibration_error(&bins),
                bins,
            });
        }
    }
    report.summary = aggregate(&report.folds, config.backtest.auc_policy);
    for summary in &mut report.summary {
        if let Some(cal) = report.calibration.iter().find(|c| c.model == summary.model) {
            summary.ece = cal.ece;
        }
    }

    for s in &report.summary {
        info!(
            model = %s.model,
            brier = s.brier,
            log_loss = s.log_loss,
            roc_auc = s.roc_auc,
            samples = s.samples,
            "backtest summary"
        );
    }
    Ok(report)
}

fn run_fold(table: &TrainingTable, season: i32, config: &PipelineConfig) -> Result<FoldOutcome> {
    let (train, test) = table.partition(season);
    if train.is_empty() || test.is_empty() {
        let reason = if test.is_empty() {
            "no rows for this season"
        } else {
            "no earlier seasons to train on"
        };
        warn!(season, reason, "skipping season");
        return Ok(FoldOutcome::Skipped(SkippedSeason {
            season,
            reason: reason.to_string(),
        }));
    }

    let mut models = Vec::new();
    let mut skipped = Vec::new();
    for mut model in build_models(&config.models, &table.feature_names)? {
        match model.fit(&train.features, &train.labels) {
            Ok(()) => {}
            Err(err) if err.is_recoverable_for_fold() => {
                warn!(season, model = model.name(), error = %err, "skipping model for season");
                skipped.push(SkippedModel {
                    season,
                    model: model.name().to_string(),
                    reason: err.to_string(),
                });
                continue;
            }
            Err(err) => return Err(err),
        }
        let predictions = model.predict_proba(&test.features)?;
        let metrics = evaluate_probs(&predictions, &test.labels);
        info!(
            season,
            model = model.name(),
            train_rows = train.len(),
            test_rows = test.len(),
            brier = metrics.brier,
            "evaluated fold"
        );
        models.push(ModelFold {
            metrics: SeasonMetrics {
                season,
                model: model.name().to_string(),
                train_rows: train.len(),
                metrics,
            },
            predictions,
            outcomes: test.labels.clone(),
        });
    }
    Ok(FoldOutcome::Evaluated { models, skipped })
}

/// Per-model sample-weighted means over folds, sorted by ascending Brier score. `ece` is left
/// NaN; the backtester fills it from pooled calibration bins.
pub fn aggregate(folds: &[SeasonMetrics], auc_policy: AucPolicy) -> Vec<ModelSummary> {
    let mut order: Vec<&str> = Vec::new();
    for fold in folds {
        if !order.contains(&fold.model.as_str()) {
            order.push(&fold.model);
        }
    }

    let mut summary: Vec<ModelSummary> = order
        .into_iter()
        .map(|model| {
            let rows: Vec<&SeasonMetrics> = folds.iter().filter(|f| f.model == model).collect();
            let weight = |f: &&SeasonMetrics| f.metrics.samples as f64;
            let roc_auc = match auc_policy {
                AucPolicy::Midpoint => weighted_mean(
                    &rows,
                    weight,
                    |f| {
                        if f.metrics.roc_auc.is_nan() {
                            0.5
                        } else {
                            f.metrics.roc_auc
                        }
                    },
                    false,
                ),
                AucPolicy::Skip => weighted_mean(&rows, weight, |f| f.metrics.roc_auc, true),
            };
            ModelSummary {
                model: model.to_string(),
                seasons: rows.len(),
                samples: rows.iter().map(|f| f.metrics.samples).sum(),
                brier: weighted_mean(&rows, weight, |f| f.metrics.brier, false),
                log_loss: weighted_mean(&rows, weight, |f| f.metrics.log_loss, false),
                accuracy: weighted_mean(&rows, weight, |f| f.metrics.accuracy, false),
                roc_auc,
                mae: weighted_mean(&rows, weight, |f| f.metrics.mae, false),
                ece: f64::NAN,
            }
        })
        .collect();
    summary.sort_by(|a, b| a.brier.total_cmp(&b.brier));
    summary
}
