//! 出席異常検知の型定義
//!
//! ワイヤフォーマットは元のAttendAIサービスと互換（camelCaseフィールド、
//! snake_caseの異常タイプ、小文字の深刻度）。

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// 出席記録
///
/// レコードストアから取得した1件のチェックインイベント。取得後は不変。
/// (sessionId, studentId, timestamp) の組が識別子だが一意ではない —
/// 重複そのものが検知対象のひとつ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// 学生ID
    #[serde(rename = "studentId", default)]
    pub student_id: String,
    /// 学生名
    #[serde(rename = "studentName", default)]
    pub student_name: String,
    /// セッションID（取得時にストアアダプタが付与）
    #[serde(rename = "sessionId", default)]
    pub session_id: String,
    /// チェックイン時刻（ISO-8601、UTCオフセット付き）。欠損時は空文字列で
    /// 流し、各検知器がフェイルオープンで扱う
    #[serde(default)]
    pub timestamp: String,
}

impl AttendanceRecord {
    /// タイムスタンプをパース。不正な値は `None`（フェイルオープン）
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}

/// セッションメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// セッションID
    #[serde(rename = "sessionId", default)]
    pub session_id: String,
    /// セッション開始時刻（ISO-8601、存在しない場合あり）
    #[serde(rename = "startTime", default)]
    pub start_time: Option<String>,
}

impl SessionMetadata {
    /// 開始時刻をパース。未設定・不正な値は `None`
    pub fn parsed_start_time(&self) -> Option<DateTime<FixedOffset>> {
        self.start_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    }
}

/// 深刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 低
    Low,
    /// 中
    Medium,
    /// 高
    High,
}

/// 異常タイプ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    /// 正常
    Normal,
    /// 授業時間外のチェックイン
    TimeAnomaly,
    /// 開始前の早すぎるチェックイン
    EarlyAttendance,
    /// 開始後の遅すぎるチェックイン
    LateAttendance,
    /// 同一セッション内の重複チェックイン
    DuplicateAttendance,
    /// 統計的外れ値
    StatisticalAnomaly,
}

/// 異常判定結果
///
/// 不変条件: `is_anomaly == false` のとき score は 0.0、severity は Low、
/// anomaly_type は Normal。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    /// 異常フラグ
    pub is_anomaly: bool,
    /// 異常スコア（0.0-1.0）
    pub anomaly_score: f64,
    /// 異常タイプ
    pub anomaly_type: AnomalyType,
    /// 人間可読の説明
    pub reason: String,
    /// 深刻度
    pub severity: Severity,
}

impl AnomalyVerdict {
    /// 正常判定（デフォルト）を作成
    pub fn normal() -> Self {
        Self {
            is_anomaly: false,
            anomaly_score: 0.0,
            anomaly_type: AnomalyType::Normal,
            reason: "Normal attendance record".to_string(),
            severity: Severity::Low,
        }
    }
}

/// 記録と最終判定のペア（パイプラインの終端出力）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// 出席記録
    pub record: AttendanceRecord,
    /// 最終判定
    pub anomaly: AnomalyVerdict,
}

/// 検知リクエスト
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRequest {
    /// セッションIDフィルタ（完全一致）
    pub session_id: Option<String>,
    /// 学生IDフィルタ（完全一致）
    pub student_id: Option<String>,
    /// バッチサイズ上限（検知前に適用）
    pub limit: Option<usize>,
}

/// 検知レスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    /// 処理結果メッセージ
    pub message: String,
    /// 入力レコード数
    pub total_records: usize,
    /// 異常と判定されたレコード数
    pub anomaly_count: usize,
    /// 異常率（"12.34%" 形式）
    pub anomaly_rate: String,
    /// 入力順の判定結果
    pub results: Vec<ScoredRecord>,
}
