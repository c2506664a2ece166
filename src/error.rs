use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    /// Bad input: a required column or table is missing or malformed. Never retried.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("insufficient data to fit {model}: {positives} positive examples, need at least {required}")]
    InsufficientData {
        model: String,
        positives: usize,
        required: usize,
    },

    #[error("model {model} used before fit")]
    NotFitted { model: String },

    #[error("no evaluable seasons")]
    NoEvaluableSeasons,

    #[error("invalid configuration for `{field}`: {message}")]
    Config { field: String, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("parquet error in {path}: {source}")]
    Parquet {
        path: PathBuf,
        source: parquet::errors::ParquetError,
    },

    #[error("failed to parse config file {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ForecastError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Errors a backtest fold may absorb by skipping the model for that season.
    pub fn is_recoverable_for_fold(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}
