//! CART decision tree for binary classification and regression
//!
//! Nodes live in a flat arena so a fitted tree serialises as a plain list.
//! Classification leaves hold the weighted fraction of positive samples,
//! regression leaves the weighted mean target.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Smallest impurity decrease that still counts as a split
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Binary labels encoded as 0.0 / 1.0, gini impurity
    Classification,
    /// Continuous targets, variance impurity
    Regression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Non-constant features examined per split
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    task: Task,
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree on the rows selected by `indices` (duplicates allowed).
    ///
    /// Returns the tree and its normalised impurity-decrease importances.
    pub fn fit(
        task: Task,
        x: &[Vec<f64>],
        y: &[f64],
        weights: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> (Self, Vec<f64>) {
        let n_features = x.first().map_or(0, Vec::len);
        let mut builder = Builder {
            task,
            x,
            y,
            weights,
            params,
            n_features,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
            root_weight: 0.0,
        };
        let root = Stats::collect(indices, y, weights);
        builder.root_weight = root.w;
        builder.grow(indices.to_vec(), root, 0, rng);

        let total: f64 = builder.importances.iter().sum();
        if total > 0.0 {
            builder.importances.iter_mut().for_each(|v| *v /= total);
        }
        (
            Self {
                task,
                nodes: builder.nodes,
            },
            builder.importances,
        )
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    count: usize,
    w: f64,
    wy: f64,
    wy2: f64,
}

impl Stats {
    fn collect(indices: &[usize], y: &[f64], weights: &[f64]) -> Self {
        let mut stats = Self::default();
        for &i in indices {
            stats.add(weights[i], y[i]);
        }
        stats
    }

    fn add(&mut self, w: f64, y: f64) {
        self.count += 1;
        self.w += w;
        self.wy += w * y;
        self.wy2 += w * y * y;
    }

    fn remove(&mut self, w: f64, y: f64) {
        self.count -= 1;
        self.w -= w;
        self.wy -= w * y;
        self.wy2 -= w * y * y;
    }

    fn mean(&self) -> f64 {
        if self.w > 0.0 {
            self.wy / self.w
        } else {
            0.0
        }
    }

    fn impurity(&self, task: Task) -> f64 {
        if self.w <= 0.0 {
            return 0.0;
        }
        let m = self.mean();
        match task {
            Task::Classification => (2.0 * m * (1.0 - m)).max(0.0),
            Task::Regression => (self.wy2 / self.w - m * m).max(0.0),
        }
    }
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Builder<'a> {
    task: Task,
    x: &'a [Vec<f64>],
    y: &'a [f64],
    weights: &'a [f64],
    params: &'a TreeParams,
    n_features: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    root_weight: f64,
}

impl Builder<'_> {
    fn grow(&mut self, indices: Vec<usize>, stats: Stats, depth: usize, rng: &mut StdRng) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: stats.mean(),
        });

        let parent_impurity = stats.impurity(self.task);
        let splittable = depth < self.params.max_depth
            && stats.count >= self.params.min_samples_split
            && stats.count >= 2 * self.params.min_samples_leaf
            && parent_impurity > MIN_GAIN;
        if !splittable {
            return id;
        }

        let Some(best) = self.best_split(&indices, &stats, parent_impurity, rng) else {
            return id;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);
        let left_stats = Stats::collect(&left_idx, self.y, self.weights);
        let right_stats = Stats::collect(&right_idx, self.y, self.weights);

        if self.root_weight > 0.0 {
            self.importances[best.feature] += stats.w / self.root_weight * best.gain;
        }

        let left = self.grow(left_idx, left_stats, depth + 1, rng);
        let right = self.grow(right_idx, right_stats, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    /// Scan shuffled features until `max_features` non-constant ones were
    /// examined and at least one valid split exists.
    fn best_split(
        &self,
        indices: &[usize],
        parent: &Stats,
        parent_impurity: f64,
        rng: &mut StdRng,
    ) -> Option<Candidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);

        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut examined = 0usize;
        let mut best: Option<Candidate> = None;
        let mut order = indices.to_vec();

        for feature in features {
            if examined >= self.params.max_features && best.is_some() {
                break;
            }
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            let (Some(&lo), Some(&hi)) = (order.first(), order.last()) else {
                return None;
            };
            if self.x[hi][feature] - self.x[lo][feature] <= f64::EPSILON {
                continue;
            }
            examined += 1;

            let mut left = Stats::default();
            let mut right = *parent;
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left.add(self.weights[i], self.y[i]);
                right.remove(self.weights[i], self.y[i]);

                let current = self.x[i][feature];
                let next = self.x[order[pos + 1]][feature];
                if next - current <= f64::EPSILON {
                    continue;
                }
                if left.count < min_leaf || right.count < min_leaf {
                    continue;
                }

                let child = (left.w * left.impurity(self.task)
                    + right.w * right.impurity(self.task))
                    / parent.w;
                let gain = parent_impurity - child;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold: (current + next) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}
