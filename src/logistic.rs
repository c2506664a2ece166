use crate::config::LogisticConfig;
use crate::error::Result;
use crate::model::Learner;

/// L2-regularized logistic regression on standardized features, fitted by full-batch gradient
/// descent with a decaying step.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    config: LogisticConfig,
    mean: Vec<f64>,
    std: Vec<f64>,
    coeffs: Vec<f64>,
    intercept: f64,
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            mean: Vec::new(),
            std: Vec::new(),
            coeffs: Vec::new(),
            intercept: 0.0,
        }
    }

    fn logit(&self, row: &[f64]) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(&self.coeffs)
                .enumerate()
                .map(|(j, (x, c))| c * standardized(*x, self.mean[j], self.std[j]))
                .sum::<f64>()
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn standardized(x: f64, mean: f64, std: f64) -> f64 {
    (x - mean) / std.max(1e-6)
}

fn feature_norm_stats(features: &[Vec<f64>], weights: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let width = features.first().map_or(0, Vec::len);
    let mut mean = vec![0.0; width];
    let mut var = vec![0.0; width];
    let mut wsum = 0.0;

    for (row, w) in features.iter().zip(weights) {
        let w = w.max(1e-6);
        wsum += w;
        for (m, x) in mean.iter_mut().zip(row) {
            *m += w * x;
        }
    }
    if wsum <= 0.0 {
        return (mean, vec![1.0; width]);
    }
    for m in &mut mean {
        *m /= wsum;
    }
    for (row, w) in features.iter().zip(weights) {
        let w = w.max(1e-6);
        for (j, x) in row.iter().enumerate() {
            let d = x - mean[j];
            var[j] += w * d * d;
        }
    }
    for v in &mut var {
        *v = (*v / wsum).sqrt().max(1e-6);
    }
    (mean, var)
}

impl Learner for LogisticRegression {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[bool], weights: &[f64]) -> Result<()> {
        let (mean, std) = feature_norm_stats(features, weights);
        let width = mean.len();
        let xs: Vec<Vec<f64>> = features
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, x)| standardized(*x, mean[j], std[j]))
                    .collect()
            })
            .collect();
        let wsum: f64 = weights.iter().map(|w| w.max(1e-6)).sum();

        let mut coeffs = vec![0.0; width];
        let mut intercept = 0.0;
        let cfg = &self.config;
        for iter in 0..cfg.max_iters {
            let mut grad = vec![0.0; width];
            let mut grad_b = 0.0;
            for ((x, y), w) in xs.iter().zip(labels).zip(weights) {
                let z = intercept + x.iter().zip(&coeffs).map(|(a, b)| a * b).sum::<f64>();
                let dz = w.max(1e-6) * (sigmoid(z) - if *y { 1.0 } else { 0.0 });
                grad_b += dz;
                for (g, xj) in grad.iter_mut().zip(x) {
                    *g += dz * xj;
                }
            }

            let lr = cfg.learning_rate / (1.0 + iter as f64 * 0.003);
            let step_b = lr * grad_b / wsum;
            intercept -= step_b;
            let mut max_step = step_b.abs();
            for (c, g) in coeffs.iter_mut().zip(&grad) {
                let step = lr * (g / wsum + cfg.l2 * *c);
                *c -= step;
                max_step = max_step.max(step.abs());
            }
            if max_step < cfg.tolerance {
                break;
            }
        }

        self.mean = mean;
        self.std = std;
        self.coeffs = coeffs;
        self.intercept = intercept;
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features.iter().map(|row| sigmoid(self.logit(row))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{LogisticRegression, sigmoid};
    use crate::config::LogisticConfig;
    use crate::model::Learner;

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(-800.0).is_finite());
    }

    #[test]
    fn separates_a_linear_signal() {
        let xs: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, 3.0]).collect();
        let ys: Vec<bool> = (0..40).map(|i| i >= 20).collect();
        let mut model = LogisticRegression::new(LogisticConfig::default());
        model.fit(&xs, &ys, &vec![1.0; 40]).unwrap();
        let p = model.predict_proba(&[vec![2.0, 3.0], vec![37.0, 3.0]]);
        assert!(p[0] < 0.2, "low end {}", p[0]);
        assert!(p[1] > 0.8, "high end {}", p[1]);
        assert!(model.coeffs[0] > 0.0);
        // Constant column contributes nothing.
        assert_eq!(model.coeffs[1], 0.0);
    }
}
