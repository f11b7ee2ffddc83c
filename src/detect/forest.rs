//! Isolation Forest による外れ値スコアリング
//!
//! ランダム分割木のアンサンブル。少ない分割で孤立する点ほど異常。
//! 固定シードの `StdRng` で構築するため、同一バッチ・同一シードなら
//! ラベルもスコアもビット単位で再現される。

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::detect::features::TemporalFeatures;
use crate::error::{Error, Result};

/// 1本の木あたりのサブサンプル上限
const MAX_SAMPLE_SIZE: usize = 256;

/// オイラー・マスケローニ定数（平均パス長の計算に使用）
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// 分割木のノード
#[derive(Debug)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

/// 学習済みのIsolation Forest
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    /// サブサンプルサイズに対する期待パス長 c(n)
    normalizer: f64,
}

impl IsolationForest {
    /// 特徴行列からアンサンブルを構築
    pub fn fit(data: &[TemporalFeatures], n_trees: usize, seed: u64) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::Model(format!(
                "isolation forest needs at least 2 samples, got {}",
                data.len()
            )));
        }

        let sample_size = data.len().min(MAX_SAMPLE_SIZE);
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..n_trees)
            .map(|_| {
                let indices = index::sample(&mut rng, data.len(), sample_size);
                let subsample: Vec<TemporalFeatures> =
                    indices.iter().map(|i| data[i]).collect();
                build_tree(&subsample, 0, max_depth, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            normalizer: average_path_length(sample_size),
        })
    }

    /// 各データ点の異常スコアを計算（高いほど異常、(0,1) の範囲）
    pub fn score_samples(&self, data: &[TemporalFeatures]) -> Vec<f64> {
        data.iter().map(|point| self.score(point)).collect()
    }

    fn score(&self, point: &TemporalFeatures) -> f64 {
        let total_path: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(point, tree, 0))
            .sum();
        let mean_path = total_path / self.trees.len() as f64;

        2f64.powf(-mean_path / self.normalizer)
    }
}

fn build_tree(
    points: &[TemporalFeatures],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if points.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: points.len() };
    }

    // 広がりのある特徴だけが分割候補
    let dims = points[0].len();
    let mut candidates = Vec::with_capacity(dims);
    for feature in 0..dims {
        let (min, max) = feature_range(points, feature);
        if max > min {
            candidates.push((feature, min, max));
        }
    }

    if candidates.is_empty() {
        // 全点が同一: これ以上孤立させられない
        return Node::Leaf { size: points.len() };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(min..max);

    let (left, right): (Vec<TemporalFeatures>, Vec<TemporalFeatures>) =
        points.iter().copied().partition(|p| p[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn feature_range(points: &[TemporalFeatures], feature: usize) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for p in points {
        min = min.min(p[feature]);
        max = max.max(p[feature]);
    }
    (min, max)
}

fn path_length(point: &TemporalFeatures, node: &Node, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] < *threshold {
                path_length(point, left, depth + 1)
            } else {
                path_length(point, right, depth + 1)
            }
        }
    }
}

/// BSTの失敗探索の平均パス長 c(n)
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER_GAMMA;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_with_outlier() -> Vec<TemporalFeatures> {
        let mut data: Vec<TemporalFeatures> = (0..9)
            .map(|i| [10.0, (i * 3) as f64, 0.0])
            .collect();
        data.push([3.0, 13.0, 5.0]); // 明確な外れ値
        data
    }

    #[test]
    fn test_deterministic_with_fixed_seed() {
        let data = clustered_with_outlier();
        let a = IsolationForest::fit(&data, 100, 42).unwrap();
        let b = IsolationForest::fit(&data, 100, 42).unwrap();
        assert_eq!(a.score_samples(&data), b.score_samples(&data));
    }

    #[test]
    fn test_different_seed_changes_scores() {
        let data = clustered_with_outlier();
        let a = IsolationForest::fit(&data, 100, 42).unwrap();
        let b = IsolationForest::fit(&data, 100, 7).unwrap();
        assert_ne!(a.score_samples(&data), b.score_samples(&data));
    }

    #[test]
    fn test_outlier_scores_highest() {
        let data = clustered_with_outlier();
        let forest = IsolationForest::fit(&data, 100, 42).unwrap();
        let scores = forest.score_samples(&data);

        let outlier_score = scores[9];
        for (i, score) in scores.iter().enumerate().take(9) {
            assert!(
                outlier_score > *score,
                "outlier {:.3} should exceed point {} at {:.3}",
                outlier_score,
                i,
                score
            );
        }
    }

    #[test]
    fn test_scores_in_unit_interval() {
        let data = clustered_with_outlier();
        let forest = IsolationForest::fit(&data, 100, 42).unwrap();
        for score in forest.score_samples(&data) {
            assert!(score > 0.0 && score < 1.0);
        }
    }

    #[test]
    fn test_fit_rejects_tiny_input() {
        assert!(IsolationForest::fit(&[[1.0, 2.0, 3.0]], 10, 42).is_err());
    }

    #[test]
    fn test_identical_points_degenerate_gracefully() {
        // 全点同一でもパニックせず、全スコアが等しい
        let data = vec![[10.0, 0.0, 0.0]; 5];
        let forest = IsolationForest::fit(&data, 50, 42).unwrap();
        let scores = forest.score_samples(&data);
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }
}
