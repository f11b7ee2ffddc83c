//! 統計的異常検知
//!
//! バッチ全体の時刻特徴にIsolation Forestを適用し、全レコードを
//! スコアリングします。モデルはリクエストごとに学習し直し、
//! 呼び出しをまたいで保持しません。

use tracing::debug;

use crate::detect::features::extract_features;
use crate::detect::forest::IsolationForest;
use crate::error::Result;
use crate::types::{AnomalyType, AnomalyVerdict, AttendanceRecord, Severity};

/// 統計的検知が動く最小バッチサイズ
const MIN_BATCH_SIZE: usize = 3;
/// アンサンブルの木の本数
const N_TREES: usize = 100;
/// 再現性のための固定シード
const RANDOM_SEED: u64 = 42;
/// 外れ値の期待割合
const CONTAMINATION: f64 = 0.1;
/// 正規化スコアがこの値以上なら深刻度 high
const HIGH_SEVERITY_CUTOFF: f64 = 0.7;

/// バッチ全体を統計的にスコアリング
///
/// 出力は位置合わせ: 入力と同じ順序で1レコード1判定。マージエンジンは
/// インデックスの一致に依存する（識別子での結合ではない）。
///
/// バッチが3件未満なら空の結果（エラーではない）。特徴抽出やモデル学習の
/// 失敗は `Err` で返し、呼び出し側がバッチ全体の統計的補強をスキップする。
pub fn detect_statistical_anomalies(records: &[AttendanceRecord]) -> Result<Vec<AnomalyVerdict>> {
    if records.len() < MIN_BATCH_SIZE {
        debug!(
            "Batch of {} below statistical minimum of {}, skipping",
            records.len(),
            MIN_BATCH_SIZE
        );
        return Ok(Vec::new());
    }

    let features = extract_features(records)?;
    let forest = IsolationForest::fit(&features, N_TREES, RANDOM_SEED)?;
    let scores = forest.score_samples(&features);

    let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let threshold = outlier_threshold(&scores, CONTAMINATION);

    let verdicts = scores
        .iter()
        .map(|&score| {
            if score > threshold {
                let normalized = (score / max_score).min(1.0);
                AnomalyVerdict {
                    is_anomaly: true,
                    anomaly_score: normalized,
                    anomaly_type: AnomalyType::StatisticalAnomaly,
                    reason: format!(
                        "Statistically unusual check-in pattern (score: {:.2})",
                        normalized
                    ),
                    severity: if normalized < HIGH_SEVERITY_CUTOFF {
                        Severity::Medium
                    } else {
                        Severity::High
                    },
                }
            } else {
                AnomalyVerdict::normal()
            }
        })
        .collect();

    Ok(verdicts)
}

/// 外れ値ラベルのしきい値: バッチ自身のスコア分布の (1 - contamination)
/// 分位点。これを超えるスコアが外れ値。
fn outlier_threshold(scores: &[f64], contamination: f64) -> f64 {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    // 線形補間付き分位点
    let q = 1.0 - contamination;
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let weight = pos - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(student: &str, timestamp: &str) -> AttendanceRecord {
        AttendanceRecord {
            student_id: student.to_string(),
            student_name: format!("Student {}", student),
            session_id: "sess1".to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    fn batch_with_outlier() -> Vec<AttendanceRecord> {
        // 月曜10時台の9件 + 土曜深夜の1件
        let mut batch: Vec<AttendanceRecord> = (0..9)
            .map(|i| {
                record(
                    &format!("s{}", i),
                    &format!("2024-03-11T10:{:02}:00Z", i * 3),
                )
            })
            .collect();
        batch.push(record("s9", "2024-03-16T03:13:00Z"));
        batch
    }

    #[test]
    fn test_small_batch_yields_no_verdicts() {
        let batch = vec![
            record("s1", "2024-03-11T10:00:00Z"),
            record("s2", "2024-03-11T10:05:00Z"),
        ];
        let verdicts = detect_statistical_anomalies(&batch).unwrap();
        assert!(verdicts.is_empty());
    }

    #[test]
    fn test_output_is_positionally_aligned() {
        let batch = batch_with_outlier();
        let verdicts = detect_statistical_anomalies(&batch).unwrap();
        assert_eq!(verdicts.len(), batch.len());
    }

    #[test]
    fn test_outlier_is_flagged() {
        let batch = batch_with_outlier();
        let verdicts = detect_statistical_anomalies(&batch).unwrap();

        let outlier = &verdicts[9];
        assert!(outlier.is_anomaly);
        assert_eq!(outlier.anomaly_type, AnomalyType::StatisticalAnomaly);
        // 最大スコアのレコードなので正規化後は 1.0
        assert_eq!(outlier.anomaly_score, 1.0);
        assert_eq!(outlier.severity, Severity::High);
        assert!(outlier.reason.contains("1.00"));
    }

    #[test]
    fn test_inliers_get_normal_verdicts() {
        let batch = batch_with_outlier();
        let verdicts = detect_statistical_anomalies(&batch).unwrap();

        let inliers = verdicts.iter().filter(|v| !v.is_anomaly).count();
        assert!(inliers >= 8, "expected most records to be inliers");
        for v in verdicts.iter().filter(|v| !v.is_anomaly) {
            assert_eq!(*v, AnomalyVerdict::normal());
        }
    }

    #[test]
    fn test_deterministic_across_runs() {
        let batch = batch_with_outlier();
        let a = detect_statistical_anomalies(&batch).unwrap();
        let b = detect_statistical_anomalies(&batch).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bad_timestamp_fails_batch() {
        let mut batch = batch_with_outlier();
        batch[4].timestamp = "garbage".to_string();
        assert!(detect_statistical_anomalies(&batch).is_err());
    }

    #[test]
    fn test_identical_batch_flags_nothing() {
        // 全レコード同時刻: しきい値と同スコアになり誰も外れ値にならない
        let batch: Vec<AttendanceRecord> = (0..5)
            .map(|i| record(&format!("s{}", i), "2024-03-11T10:00:00Z"))
            .collect();
        let verdicts = detect_statistical_anomalies(&batch).unwrap();
        assert!(verdicts.iter().all(|v| !v.is_anomaly));
    }
}
