//! Second-order regression tree shared by the forest and the boosted ensemble.
//!
//! Each sample carries a target sum `g` and a weight/curvature `h`. A node's value is
//! `G / (H + l2)` and a split is scored by `G_L²/(H_L+l2) + G_R²/(H_R+l2) - G²/(H+l2)`. With
//! `g = w·y`, `h = w`, `l2 = 0` this is weighted variance reduction and leaves are weighted means;
//! with logistic-loss residuals and curvatures it is the Newton step used by gradient boosting.

use rand::Rng;
use rand::seq::index::sample;

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub l2: f64,
    /// Fraction of features considered at each split.
    pub feature_fraction: f64,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree over `rows` (indices into `features`, repeats allowed for bootstraps).
    pub fn fit<R: Rng>(
        features: &[Vec<f64>],
        rows: &[usize],
        g: &[f64],
        h: &[f64],
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let width = features.first().map_or(0, Vec::len);
        tree.grow(features, rows.to_vec(), g, h, params, width, 0, rng);
        tree
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    #[allow(clippy::too_many_arguments)]
    fn grow<R: Rng>(
        &mut self,
        features: &[Vec<f64>],
        rows: Vec<usize>,
        g: &[f64],
        h: &[f64],
        params: &TreeParams,
        width: usize,
        depth: usize,
        rng: &mut R,
    ) -> usize {
        let (g_sum, h_sum) = rows
            .iter()
            .fold((0.0, 0.0), |(gs, hs), i| (gs + g[*i], hs + h[*i]));
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf(leaf_value(g_sum, h_sum, params.l2)));

        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf.max(1) {
            return idx;
        }
        let Some(split) = best_split(features, &rows, g, h, params, width, g_sum, h_sum, rng)
        else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|i| features[*i][split.feature] <= split.threshold);
        let left = self.grow(features, left_rows, g, h, params, width, depth + 1, rng);
        let right = self.grow(features, right_rows, g, h, params, width, depth + 1, rng);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

fn leaf_value(g_sum: f64, h_sum: f64, l2: f64) -> f64 {
    let denom = h_sum + l2;
    if denom <= 1e-12 { 0.0 } else { g_sum / denom }
}

fn score(g_sum: f64, h_sum: f64, l2: f64) -> f64 {
    let denom = h_sum + l2;
    if denom <= 1e-12 { 0.0 } else { g_sum * g_sum / denom }
}

#[allow(clippy::too_many_arguments)]
fn best_split<R: Rng>(
    features: &[Vec<f64>],
    rows: &[usize],
    g: &[f64],
    h: &[f64],
    params: &TreeParams,
    width: usize,
    g_sum: f64,
    h_sum: f64,
    rng: &mut R,
) -> Option<SplitCandidate> {
    if width == 0 {
        return None;
    }
    let k = ((width as f64 * params.feature_fraction).ceil() as usize).clamp(1, width);
    let candidates: Vec<usize> = if k == width {
        (0..width).collect()
    } else {
        sample(rng, width, k).into_vec()
    };
    let min_leaf = params.min_samples_leaf.max(1);
    let parent = score(g_sum, h_sum, params.l2);

    let mut best: Option<SplitCandidate> = None;
    let mut order = rows.to_vec();
    for feature in candidates {
        order.sort_by(|a, b| features[*a][feature].total_cmp(&features[*b][feature]));
        let (mut g_left, mut h_left) = (0.0, 0.0);
        for pos in 0..order.len() - 1 {
            let i = order[pos];
            g_left += g[i];
            h_left += h[i];
            let n_left = pos + 1;
            if n_left < min_leaf || order.len() - n_left < min_leaf {
                continue;
            }
            let here = features[i][feature];
            let next = features[order[pos + 1]][feature];
            if here == next {
                continue;
            }
            let gain = score(g_left, h_left, params.l2)
                + score(g_sum - g_left, h_sum - h_left, params.l2)
                - parent;
            if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: here + (next - here) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}
