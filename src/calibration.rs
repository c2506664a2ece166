use serde::Serialize;

/// Scores for one set of binary probability forecasts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
    /// NaN when the outcomes contain a single class.
    pub roc_auc: f64,
    pub mae: f64,
}

impl Metrics {
    pub fn empty() -> Self {
        Self {
            samples: 0,
            brier: f64::NAN,
            log_loss: f64::NAN,
            accuracy: f64::NAN,
            roc_auc: f64::NAN,
            mae: f64::NAN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

const LOG_LOSS_EPS: f64 = 1e-15;

pub fn evaluate_probs(predictions: &[f64], outcomes: &[bool]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut abs_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = if *outcome { 1.0 } else { 0.0 };
        brier_sum += (p - y).powi(2);
        abs_sum += (p - y).abs();

        let clipped = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
        log_loss_sum += if *outcome {
            -clipped.ln()
        } else {
            -(1.0 - clipped).ln()
        };

        if (*p >= 0.5) == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
        roc_auc: roc_auc(predictions, outcomes),
        mae: abs_sum / n,
    }
}

/// Area under the ROC curve via the rank-sum statistic; tied scores share their average rank.
pub fn roc_auc(predictions: &[f64], outcomes: &[bool]) -> f64 {
    let positives = outcomes.iter().filter(|o| **o).count();
    let negatives = outcomes.len() - positives;
    if positives == 0 || negatives == 0 || predictions.len() != outcomes.len() {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|a, b| predictions[*a].total_cmp(&predictions[*b]));

    let mut positive_rank_sum = 0.0_f64;
    let mut start = 0usize;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && predictions[order[end]] == predictions[order[start]] {
            end += 1;
        }
        // Ranks are 1-based: the tie group covers start+1..=end.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for idx in &order[start..end] {
            if outcomes[*idx] {
                positive_rank_sum += avg_rank;
            }
        }
        start = end;
    }

    let n_pos = positives as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * negatives as f64)
}

pub fn calibration_bins(predictions: &[f64], outcomes: &[bool], bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        if *outcome {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Count-weighted mean gap between predicted and observed rates across bins.
pub fn expected_calibration_error(bins: &[CalibrationBin]) -> f64 {
    let total: usize = bins.iter().map(|b| b.count).sum();
    if total == 0 {
        return f64::NAN;
    }
    bins.iter()
        .map(|b| b.count as f64 * (b.avg_pred - b.actual_rate).abs())
        .sum::<f64>()
        / total as f64
}

/// Sample-weighted mean of `value_fn` over `items`. NaN values are skipped (their weight too)
/// when `skip_nan` is set, otherwise they propagate.
pub fn weighted_mean<T>(
    items: &[T],
    weight_fn: impl Fn(&T) -> f64,
    value_fn: impl Fn(&T) -> f64,
    skip_nan: bool,
) -> f64 {
    let mut sum = 0.0_f64;
    let mut weight_sum = 0.0_f64;
    for item in items {
        let value = value_fn(item);
        if skip_nan && value.is_nan() {
            continue;
        }
        let w = weight_fn(item);
        sum += w * value;
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        f64::NAN
    } else {
        sum / weight_sum
    }
}
