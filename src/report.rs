//! CSV and JSON writers for backtest results, predictions and the training table.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::backtest::BacktestReport;
use crate::error::{ForecastError, Result};
use crate::predictions::PredictionRow;
use crate::training_table::TrainingTable;

pub const SUMMARY_CSV: &str = "backtest_summary.csv";
pub const SEASONS_CSV: &str = "backtest_seasons.csv";
pub const CALIBRATION_CSV: &str = "backtest_calibration.csv";
pub const SUMMARY_JSON: &str = "backtest_summary.json";

#[derive(Serialize)]
struct SeasonRow<'a> {
    season: i32,
    model: &'a str,
    train_rows: usize,
    samples: usize,
    brier: f64,
    log_loss: f64,
    accuracy: f64,
    roc_auc: f64,
    mae: f64,
}

#[derive(Serialize)]
struct CalibrationRow<'a> {
    model: &'a str,
    bucket_start: f64,
    bucket_end: f64,
    count: usize,
    avg_pred: f64,
    actual_rate: f64,
}

#[derive(Serialize)]
struct SummaryDump<'a> {
    generated_at: String,
    report: &'a BacktestReport,
}

fn csv_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ForecastError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    csv::Writer::from_path(path).map_err(|source| ForecastError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_err(path: &Path) -> impl Fn(csv::Error) -> ForecastError + '_ {
    move |source| ForecastError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn finish(mut writer: csv::Writer<fs::File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|source| ForecastError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Summary, per-season and calibration tables plus a JSON dump, all under `dir`.
pub fn write_backtest(dir: &Path, report: &BacktestReport) -> Result<Vec<PathBuf>> {
    let summary_path = dir.join(SUMMARY_CSV);
    let mut writer = csv_writer(&summary_path)?;
    for row in &report.summary {
        writer.serialize(row).map_err(csv_err(&summary_path))?;
    }
    finish(writer, &summary_path)?;

    let seasons_path = dir.join(SEASONS_CSV);
    let mut writer = csv_writer(&seasons_path)?;
    for fold in &report.folds {
        writer
            .serialize(SeasonRow {
                season: fold.season,
                model: &fold.model,
                train_rows: fold.train_rows,
                samples: fold.metrics.samples,
                brier: fold.metrics.brier,
                log_loss: fold.metrics.log_loss,
                accuracy: fold.metrics.accuracy,
                roc_auc: fold.metrics.roc_auc,
                mae: fold.metrics.mae,
            })
            .map_err(csv_err(&seasons_path))?;
    }
    finish(writer, &seasons_path)?;

    let calibration_path = dir.join(CALIBRATION_CSV);
    let mut writer = csv_writer(&calibration_path)?;
    for model in &report.calibration {
        for bin in &model.bins {
            writer
                .serialize(CalibrationRow {
                    model: &model.model,
                    bucket_start: bin.bucket_start,
                    bucket_end: bin.bucket_end,
                    count: bin.count,
                    avg_pred: bin.avg_pred,
                    actual_rate: bin.actual_rate,
                })
                .map_err(csv_err(&calibration_path))?;
        }
    }
    finish(writer, &calibration_path)?;

    let json_path = dir.join(SUMMARY_JSON);
    let dump = SummaryDump {
        generated_at: Utc::now().to_rfc3339(),
        report,
    };
    let body = serde_json::to_string_pretty(&dump).map_err(|err| ForecastError::Io {
        path: json_path.clone(),
        source: io::Error::from(err),
    })?;
    fs::write(&json_path, body).map_err(|source| ForecastError::Io {
        path: json_path.clone(),
        source,
    })?;

    let written = vec![summary_path, seasons_path, calibration_path, json_path];
    info!(dir = %dir.display(), files = written.len(), "wrote backtest report");
    Ok(written)
}

/// One row per player with a probability column per model.
pub fn write_predictions(path: &Path, rows: &[PredictionRow]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    let mut header: Vec<String> = [
        "player_id",
        "player_name",
        "team",
        "opponent",
        "home",
        "position",
        "season",
        "week",
    ]
    .map(String::from)
    .to_vec();
    if let Some(first) = rows.first() {
        header.extend(first.probabilities.iter().map(|(model, _)| format!("p_{model}")));
    }
    writer.write_record(&header).map_err(csv_err(path))?;
    for row in rows {
        let mut record = vec![
            row.player_id.clone(),
            row.player_name.clone(),
            row.team.clone(),
            row.opponent.clone(),
            u8::from(row.home).to_string(),
            row.position.to_string(),
            row.season.to_string(),
            row.week.to_string(),
        ];
        record.extend(row.probabilities.iter().map(|(_, p)| format!("{p:.6}")));
        writer.write_record(&record).map_err(csv_err(path))?;
    }
    finish(writer, path)?;
    info!(path = %path.display(), rows = rows.len(), "wrote predictions");
    Ok(())
}

pub fn write_training_table(path: &Path, table: &TrainingTable) -> Result<()> {
    let mut writer = csv_writer(path)?;
    let mut header: Vec<String> = [
        "player_id",
        "player_name",
        "team",
        "opponent",
        "position",
        "season",
        "week",
        "home",
        "scored_any_td",
    ]
    .map(String::from)
    .to_vec();
    header.extend(table.feature_names.iter().cloned());
    writer.write_record(&header).map_err(csv_err(path))?;

    for ((meta, features), label) in table.meta.iter().zip(&table.features).zip(&table.labels) {
        let mut record = vec![
            meta.player_id.clone(),
            meta.player_name.clone(),
            meta.team.clone(),
            meta.opponent.clone(),
            meta.position.to_string(),
            meta.season.to_string(),
            meta.week.to_string(),
            u8::from(meta.home).to_string(),
            u8::from(*label).to_string(),
        ];
        record.extend(features.iter().map(|v| v.to_string()));
        writer.write_record(&record).map_err(csv_err(path))?;
    }
    finish(writer, path)?;
    info!(path = %path.display(), rows = table.len(), "wrote training table");
    Ok(())
}
