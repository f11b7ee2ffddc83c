//! マージエンジン
//!
//! 検知パイプラインのメイン実装。レコード取得、セッションキャッシュの
//! 構築、レコード単位のルール評価、バッチ全体の統計的補強を1リクエスト
//! 分の逐次計算としてまとめる。リクエスト間で共有する可変状態はない。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::detect::{rules, statistical, SessionCache};
use crate::error::Result;
use crate::store::RecordStore;
use crate::types::{
    AnomalyVerdict, AttendanceRecord, DetectionRequest, DetectionResponse, ScoredRecord,
};

/// バッチサイズ上限のデフォルト（検知前に適用）
pub const DEFAULT_LIMIT: usize = 100;

/// 異常検知エンジン
pub struct AnomalyEngine {
    store: Arc<dyn RecordStore>,
}

impl AnomalyEngine {
    /// 新しいエンジンを作成
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// 1リクエスト分の検知を実行
    ///
    /// バッチは完結型で処理される: 統計的判定の組み立てに失敗した場合は
    /// その検知器をバッチ全体でスキップし、部分適用はしない。呼び出し側に
    /// 返るのは常に完全な結果集合か、単一の致命的エラーのどちらか。
    pub async fn detect(&self, request: &DetectionRequest) -> Result<DetectionResponse> {
        let mut records = self
            .store
            .fetch_records(request.session_id.as_deref(), request.student_id.as_deref())
            .await;

        if records.is_empty() {
            return Ok(DetectionResponse {
                message: "No attendance data found".to_string(),
                total_records: 0,
                anomaly_count: 0,
                anomaly_rate: "0.00%".to_string(),
                results: Vec::new(),
            });
        }

        // limit 0 は「制限なし」。切り詰めると空バッチになり異常率が
        // 計算できなくなる
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT);
        if limit > 0 {
            records.truncate(limit);
        }

        // セッションメタデータを事前にまとめて取得（各セッション最大1回）
        let session_cache = self.build_session_cache(&records).await;

        // レコード単位のルール評価
        let mut verdicts: Vec<AnomalyVerdict> = records
            .iter()
            .map(|record| evaluate_rules(record, &records, &session_cache))
            .collect();

        // バッチ全体の統計的補強。失敗時はルール判定のみ返す
        match statistical::detect_statistical_anomalies(&records) {
            Ok(statistical_verdicts) => {
                if statistical_verdicts.len() == verdicts.len() {
                    for (verdict, stat) in verdicts.iter_mut().zip(&statistical_verdicts) {
                        *verdict = merge_statistical(verdict, stat);
                    }
                } else if !statistical_verdicts.is_empty() {
                    warn!(
                        "Statistical verdict count {} does not match batch size {}, skipping",
                        statistical_verdicts.len(),
                        verdicts.len()
                    );
                }
            }
            Err(e) => {
                warn!("Statistical detector skipped for this batch: {}", e);
            }
        }

        let anomaly_count = verdicts.iter().filter(|v| v.is_anomaly).count();
        let total_records = records.len();
        let anomaly_rate = format!(
            "{:.2}%",
            anomaly_count as f64 / total_records as f64 * 100.0
        );

        info!(
            "Anomaly detection completed: {}/{} records flagged",
            anomaly_count, total_records
        );

        let results = records
            .into_iter()
            .zip(verdicts)
            .map(|(record, anomaly)| ScoredRecord { record, anomaly })
            .collect();

        Ok(DetectionResponse {
            message: "Anomaly detection completed".to_string(),
            total_records,
            anomaly_count,
            anomaly_rate,
            results,
        })
    }

    /// バッチ内の各セッションを1回だけフェッチしてキャッシュを作る
    async fn build_session_cache(&self, records: &[AttendanceRecord]) -> SessionCache {
        let mut cache = SessionCache::new();
        for record in records {
            if record.session_id.is_empty() || cache.contains_key(&record.session_id) {
                continue;
            }
            let metadata = self.store.fetch_session(&record.session_id).await;
            cache.insert(record.session_id.clone(), metadata);
        }
        debug!("Session cache built for {} sessions", cache.len());
        cache
    }
}

/// レコード単位のルールベース判定
///
/// 時間ルール → 重複ルールの順で評価し、発火した中で最高スコアの判定を
/// 採用する。同点は評価順（時間ルール優先）。どちらも発火しなければ
/// デフォルトの正常判定。
fn evaluate_rules(
    record: &AttendanceRecord,
    batch: &[AttendanceRecord],
    session_cache: &SessionCache,
) -> AnomalyVerdict {
    let session = session_cache
        .get(&record.session_id)
        .and_then(|s| s.as_ref());

    let mut candidates = Vec::with_capacity(2);
    if let Some(verdict) = rules::detect_time_anomaly(record, session) {
        candidates.push(verdict);
    }
    if let Some(verdict) = rules::detect_duplicate_anomaly(record, batch) {
        candidates.push(verdict);
    }

    // 先勝ちの最大値選択: 同点なら先に評価されたルールが残る
    candidates
        .into_iter()
        .reduce(|best, candidate| {
            if candidate.anomaly_score > best.anomaly_score {
                candidate
            } else {
                best
            }
        })
        .unwrap_or_else(AnomalyVerdict::normal)
}

/// 統計的判定をルール判定に畳み込む
///
/// 判定は毎回新しく構築する（インプレース変更ではない）。観測可能な
/// 契約は連結された reason 文字列のみ。
fn merge_statistical(rule: &AnomalyVerdict, statistical: &AnomalyVerdict) -> AnomalyVerdict {
    if !statistical.is_anomaly {
        // 統計的に正常ならルール判定はそのまま
        return rule.clone();
    }

    if !rule.is_anomaly {
        // ルールが発火していなければ統計的判定で置き換える
        return statistical.clone();
    }

    // 両方発火: ルールのタイプ・深刻度を保ち、スコアは最大値、理由は連結
    AnomalyVerdict {
        is_anomaly: true,
        anomaly_score: rule.anomaly_score.max(statistical.anomaly_score),
        anomaly_type: rule.anomaly_type,
        reason: format!("{} | {}", rule.reason, statistical.reason),
        severity: rule.severity,
    }
}
