//! Uniform fit / predict_proba surface over every model the backtester compares.

use tracing::debug;

use crate::config::{ClassWeighting, ModelsConfig};
use crate::error::{ForecastError, Result};
use crate::gradient_boosting::GradientBoosting;
use crate::logistic::LogisticRegression;
use crate::poisson_baseline::PoissonBaseline;
use crate::random_forest::RandomForest;

pub const POISSON_BASELINE: &str = "poisson_baseline";
pub const LOGISTIC_REGRESSION: &str = "logistic_regression";
pub const RANDOM_FOREST: &str = "random_forest";
pub const GRADIENT_BOOSTING: &str = "gradient_boosting";

/// A fittable binary classifier. Implementations may assume rows are non-empty, all of equal
/// width, and that `predict_proba` only follows a successful `fit`; [`Model`] enforces that.
pub trait Learner: Send + Sync {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[bool], weights: &[f64]) -> Result<()>;

    /// Probability of the positive class for every row, each in [0, 1].
    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64>;
}

enum ModelKind {
    Baseline(PoissonBaseline),
    Learner(Box<dyn Learner>),
}

pub struct Model {
    name: &'static str,
    kind: ModelKind,
    min_positive_examples: usize,
    class_weighting: ClassWeighting,
    fitted_width: Option<usize>,
}

impl Model {
    pub fn baseline(baseline: PoissonBaseline) -> Self {
        Self {
            name: POISSON_BASELINE,
            kind: ModelKind::Baseline(baseline),
            min_positive_examples: 0,
            class_weighting: ClassWeighting::None,
            fitted_width: None,
        }
    }

    pub fn learner(name: &'static str, learner: Box<dyn Learner>, config: &ModelsConfig) -> Self {
        Self {
            name,
            kind: ModelKind::Learner(learner),
            min_positive_examples: config.min_positive_examples,
            class_weighting: config.class_weighting,
            fitted_width: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `fit` does anything. The baseline is closed-form.
    pub fn needs_fit(&self) -> bool {
        matches!(self.kind, ModelKind::Learner(_))
    }

    pub fn fit(&mut self, features: &[Vec<f64>], labels: &[bool]) -> Result<()> {
        let ModelKind::Learner(learner) = &mut self.kind else {
            return Ok(());
        };
        if features.len() != labels.len() {
            return Err(ForecastError::DataIntegrity(format!(
                "{}: {} feature rows but {} labels",
                self.name,
                features.len(),
                labels.len()
            )));
        }
        let positives = labels.iter().filter(|l| **l).count();
        if features.is_empty() || positives < self.min_positive_examples.max(1) {
            return Err(ForecastError::InsufficientData {
                model: self.name.to_string(),
                positives,
                required: self.min_positive_examples.max(1),
            });
        }
        let width = features[0].len();
        check_width(self.name, features, width)?;

        let weights = sample_weights(labels, self.class_weighting);
        learner.fit(features, labels, &weights)?;
        self.fitted_width = Some(width);
        debug!(
            model = self.name,
            rows = features.len(),
            positives,
            "fitted model"
        );
        Ok(())
    }

    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        let probs = match &self.kind {
            ModelKind::Baseline(baseline) => baseline.predict_proba(features)?,
            ModelKind::Learner(learner) => {
                let width = self.fitted_width.ok_or_else(|| ForecastError::NotFitted {
                    model: self.name.to_string(),
                })?;
                if features.is_empty() {
                    return Ok(Vec::new());
                }
                check_width(self.name, features, width)?;
                learner.predict_proba(features)
            }
        };
        if let Some(idx) = probs.iter().position(|p| !p.is_finite()) {
            return Err(ForecastError::DataIntegrity(format!(
                "{}: non-finite probability {} for row {idx}",
                self.name, probs[idx]
            )));
        }
        Ok(probs.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }
}

fn check_width(name: &str, features: &[Vec<f64>], width: usize) -> Result<()> {
    match features.iter().position(|row| row.len() != width) {
        Some(idx) => Err(ForecastError::DataIntegrity(format!(
            "{name}: row {idx} has {} features, expected {width}",
            features[idx].len()
        ))),
        None => Ok(()),
    }
}

/// Per-row weights. Balanced weighting gives each class half of the total mass:
/// `n / (2 * n_class)`.
pub fn sample_weights(labels: &[bool], weighting: ClassWeighting) -> Vec<f64> {
    let n = labels.len() as f64;
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    match weighting {
        ClassWeighting::Balanced if positives > 0 && negatives > 0 => {
            let w_pos = n / (2.0 * positives as f64);
            let w_neg = n / (2.0 * negatives as f64);
            labels
                .iter()
                .map(|l| if *l { w_pos } else { w_neg })
                .collect()
        }
        _ => vec![1.0; labels.len()],
    }
}

/// Fresh, unfitted instances of every enabled model, in a fixed order.
pub fn build_models(config: &ModelsConfig, feature_names: &[String]) -> Result<Vec<Model>> {
    let mut models = Vec::new();
    if config.poisson_baseline.enabled {
        models.push(Model::baseline(PoissonBaseline::new(
            &config.poisson_baseline,
            feature_names,
        )?));
    }
    if config.logistic.enabled {
        models.push(Model::learner(
            LOGISTIC_REGRESSION,
            Box::new(LogisticRegression::new(config.logistic.clone())),
            config,
        ));
    }
    if config.random_forest.enabled {
        models.push(Model::learner(
            RANDOM_FOREST,
            Box::new(RandomForest::new(config.random_forest.clone())),
            config,
        ));
    }
    if config.gradient_boosting.enabled {
        models.push(Model::learner(
            GRADIENT_BOOSTING,
            Box::new(GradientBoosting::new(config.gradient_boosting.clone())),
            config,
        ));
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::{Learner, Model, build_models, sample_weights};
    use crate::config::{ClassWeighting, ModelsConfig};
    use crate::error::{ForecastError, Result};
    use crate::logistic::LogisticRegression;

    /// Diverged learner: every prediction is NaN.
    struct Diverged;

    impl Learner for Diverged {
        fn fit(&mut self, _: &[Vec<f64>], _: &[bool], _: &[f64]) -> Result<()> {
            Ok(())
        }

        fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
            vec![f64::NAN; features.len()]
        }
    }

    #[test]
    fn balanced_weights_split_mass_evenly() {
        let labels = [true, false, false, false];
        let w = sample_weights(&labels, ClassWeighting::Balanced);
        assert_eq!(w, vec![2.0, 2.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0]);
        let pos: f64 = w.iter().zip(&labels).filter(|(_, l)| **l).map(|(w, _)| w).sum();
        assert!((pos - 2.0).abs() < 1e-12);
        assert_eq!(
            sample_weights(&labels, ClassWeighting::None),
            vec![1.0; 4]
        );
    }

    #[test]
    fn predict_before_fit_is_not_fitted() {
        let cfg = ModelsConfig::default();
        let model = Model::learner(
            "logistic_regression",
            Box::new(LogisticRegression::new(cfg.logistic.clone())),
            &cfg,
        );
        assert!(matches!(
            model.predict_proba(&[vec![0.0]]),
            Err(ForecastError::NotFitted { .. })
        ));
    }

    #[test]
    fn too_few_positives_is_insufficient_data() {
        let cfg = ModelsConfig::default();
        let mut model = Model::learner(
            "logistic_regression",
            Box::new(LogisticRegression::new(cfg.logistic.clone())),
            &cfg,
        );
        let x = vec![vec![1.0]; 20];
        let mut y = vec![false; 20];
        y[0] = true;
        match model.fit(&x, &y) {
            Err(ForecastError::InsufficientData {
                positives,
                required,
                ..
            }) => {
                assert_eq!(positives, 1);
                assert_eq!(required, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn width_mismatch_after_fit_is_rejected() {
        let mut cfg = ModelsConfig::default();
        cfg.min_positive_examples = 1;
        let mut model = Model::learner(
            "logistic_regression",
            Box::new(LogisticRegression::new(cfg.logistic.clone())),
            &cfg,
        );
        let x = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
        model.fit(&x, &[true, false, true]).unwrap();
        assert!(matches!(
            model.predict_proba(&[vec![1.0]]),
            Err(ForecastError::DataIntegrity(_))
        ));
    }

    #[test]
    fn non_finite_output_is_an_integrity_error() {
        let mut cfg = ModelsConfig::default();
        cfg.min_positive_examples = 1;
        let mut model = Model::learner("diverged", Box::new(Diverged), &cfg);
        model.fit(&[vec![0.0], vec![1.0]], &[false, true]).unwrap();
        match model.predict_proba(&[vec![0.5], vec![2.0]]) {
            Err(ForecastError::DataIntegrity(msg)) => assert!(msg.contains("row 0"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn factory_respects_enabled_flags() {
        let names: Vec<String> = ["total_tds_roll5", "opp_td_rate_recent", "opp_td_rate_season"]
            .map(String::from)
            .to_vec();
        let mut cfg = ModelsConfig::default();
        cfg.random_forest.enabled = false;
        let models = build_models(&cfg, &names).unwrap();
        let names: Vec<&str> = models.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["poisson_baseline", "logistic_regression", "gradient_boosting"]
        );
        assert!(!models[0].needs_fit());
    }
}
