use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

use crate::config::GradientBoostingConfig;
use crate::decision_tree::{RegressionTree, TreeParams};
use crate::error::Result;
use crate::logistic::sigmoid;
use crate::model::Learner;

/// Gradient-boosted trees on the logistic loss. Leaves take a regularized Newton step and every
/// tree is shrunk by the learning rate.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    config: GradientBoostingConfig,
    base_logit: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            base_logit: 0.0,
            trees: Vec::new(),
        }
    }

    fn logit(&self, row: &[f64]) -> f64 {
        self.base_logit
            + self.config.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl Learner for GradientBoosting {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[bool], weights: &[f64]) -> Result<()> {
        let cfg = &self.config;
        let n = features.len();
        let wsum: f64 = weights.iter().sum();
        let wpos: f64 = labels
            .iter()
            .zip(weights)
            .filter(|(y, _)| **y)
            .map(|(_, w)| w)
            .sum();
        let prior = (wpos / wsum.max(1e-12)).clamp(1e-6, 1.0 - 1e-6);
        let base_logit = (prior / (1.0 - prior)).ln();

        let params = TreeParams {
            max_depth: cfg.max_depth,
            min_samples_leaf: cfg.min_samples_leaf,
            l2: cfg.l2,
            feature_fraction: 1.0,
        };
        let sample_size = ((n as f64 * cfg.subsample).round() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut logits = vec![base_logit; n];
        let mut g = vec![0.0; n];
        let mut h = vec![0.0; n];
        let mut trees = Vec::with_capacity(cfg.n_rounds);

        for _ in 0..cfg.n_rounds {
            for i in 0..n {
                let p = sigmoid(logits[i]);
                let y = if labels[i] { 1.0 } else { 0.0 };
                g[i] = weights[i] * (y - p);
                h[i] = (weights[i] * p * (1.0 - p)).max(1e-12);
            }
            let rows: Vec<usize> = if sample_size < n {
                sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };
            let tree = RegressionTree::fit(features, &rows, &g, &h, &params, &mut rng);
            for (logit, row) in logits.iter_mut().zip(features) {
                *logit += cfg.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        self.base_logit = base_logit;
        self.trees = trees;
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features.iter().map(|row| sigmoid(self.logit(row))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::GradientBoosting;
    use crate::config::GradientBoostingConfig;
    use crate::model::Learner;

    #[test]
    fn boosts_towards_labels() {
        let xs: Vec<Vec<f64>> = (0..80).map(|i| vec![(i % 8) as f64]).collect();
        let ys: Vec<bool> = xs.iter().map(|x| x[0] >= 5.0).collect();
        let cfg = GradientBoostingConfig {
            n_rounds: 60,
            learning_rate: 0.3,
            min_samples_leaf: 5,
            ..GradientBoostingConfig::default()
        };
        let mut model = GradientBoosting::new(cfg);
        model.fit(&xs, &ys, &vec![1.0; xs.len()]).unwrap();
        let p = model.predict_proba(&[vec![1.0], vec![6.0]]);
        assert!(p[0] < 0.1, "{}", p[0]);
        assert!(p[1] > 0.9, "{}", p[1]);
    }

    #[test]
    fn no_rounds_predicts_the_weighted_prior() {
        let xs = vec![vec![0.0]; 4];
        let ys = vec![true, false, false, false];
        let cfg = GradientBoostingConfig {
            n_rounds: 0,
            ..GradientBoostingConfig::default()
        };
        let mut model = GradientBoosting::new(cfg);
        model.fit(&xs, &ys, &[1.0; 4]).unwrap();
        let p = model.predict_proba(&[vec![3.0]]);
        assert!((p[0] - 0.25).abs() < 1e-9);
    }
}
