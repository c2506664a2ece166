pub mod backtest;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod decision_tree;
pub mod error;
pub mod features;
pub mod gradient_boosting;
pub mod logistic;
pub mod model;
pub mod pipeline;
pub mod player_game;
pub mod poisson_baseline;
pub mod pool;
pub mod predictions;
pub mod projector;
pub mod random_forest;
pub mod report;
pub mod stats_loader;
pub mod training_table;

pub use error::{ForecastError, Result};
