use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::config::RandomForestConfig;
use crate::decision_tree::{RegressionTree, TreeParams};
use crate::error::Result;
use crate::model::Learner;

/// Bagged regression trees on the 0/1 label. Tree `t` draws its bootstrap and feature subsets
/// from `seed + t`, so a fit is reproducible regardless of thread scheduling.
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: RandomForestConfig,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }
}

impl Learner for RandomForest {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[bool], weights: &[f64]) -> Result<()> {
        let g: Vec<f64> = labels
            .iter()
            .zip(weights)
            .map(|(y, w)| if *y { *w } else { 0.0 })
            .collect();
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_leaf: self.config.min_samples_leaf,
            l2: 0.0,
            feature_fraction: self.config.feature_fraction,
        };
        let n = features.len();
        let seed = self.config.seed;
        self.trees = (0..self.config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(features, &rows, &g, weights, &params, &mut rng)
            })
            .collect();
        debug!(
            trees = self.trees.len(),
            deepest = self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0),
            "grew forest"
        );
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
        let n_trees = self.trees.len().max(1) as f64;
        features
            .iter()
            .map(|row| {
                let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
                (sum / n_trees).clamp(0.0, 1.0)
            })
            .collect()
    }
}
