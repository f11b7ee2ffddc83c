//! ルールベース検知器
//!
//! レコード単位のステートレスな検知関数。いずれも異常がなければ `None` を
//! 返し、デフォルト判定は呼び出し側（マージエンジン）に委ねる。
//! 不正なタイムスタンプはフェイルオープンで「異常なし」扱い。

use chrono::Timelike;
use tracing::debug;

use crate::types::{AnomalyType, AnomalyVerdict, AttendanceRecord, SessionMetadata, Severity};

// ============================================================================
// しきい値（ランタイムでは変更しない）
// ============================================================================

/// 通常授業時間の開始（この時より前は時間外）
const CLASS_HOURS_START: u32 = 8;
/// 通常授業時間の終了（この時以降は時間外、排他的上限）
const CLASS_HOURS_END: u32 = 18;
/// セッション開始よりこの分数以上前のチェックインは「早すぎ」
const EARLY_CUTOFF_MINUTES: f64 = -5.0;
/// セッション開始からこの分数以上後のチェックインは「遅すぎ」
const LATE_CUTOFF_MINUTES: f64 = 30.0;

const TIME_ANOMALY_SCORE: f64 = 0.8;
const EARLY_ATTENDANCE_SCORE: f64 = 0.9;
const LATE_ATTENDANCE_SCORE: f64 = 0.7;
const DUPLICATE_SCORE: f64 = 0.95;

/// 時間ベースの異常検知
///
/// 最初にマッチしたルールが勝つ（相互排他、この順で判定）:
/// 1. 授業時間外（hour < 8 または hour >= 18）
/// 2. セッション開始時刻との符号付き分差（-5分未満 = 早すぎ、30分超 = 遅すぎ）
pub fn detect_time_anomaly(
    record: &AttendanceRecord,
    session: Option<&SessionMetadata>,
) -> Option<AnomalyVerdict> {
    let record_time = record.parsed_timestamp()?;
    let hour = record_time.hour();
    let minute = record_time.minute();

    if hour < CLASS_HOURS_START || hour >= CLASS_HOURS_END {
        return Some(AnomalyVerdict {
            is_anomaly: true,
            anomaly_score: TIME_ANOMALY_SCORE,
            anomaly_type: AnomalyType::TimeAnomaly,
            reason: format!(
                "Check-in outside normal class hours ({:02}:{:02})",
                hour, minute
            ),
            severity: Severity::High,
        });
    }

    // セッション開始時刻との比較（メタデータがある場合のみ）
    if let Some(start) = session.and_then(|s| s.parsed_start_time()) {
        let offset_minutes = (record_time - start).num_seconds() as f64 / 60.0;
        debug!(
            "Record {} offset from session start: {:.1} min",
            record.student_id, offset_minutes
        );

        if offset_minutes < EARLY_CUTOFF_MINUTES {
            return Some(AnomalyVerdict {
                is_anomaly: true,
                anomaly_score: EARLY_ATTENDANCE_SCORE,
                anomaly_type: AnomalyType::EarlyAttendance,
                reason: format!(
                    "Check-in {:.1} minutes before session start",
                    offset_minutes.abs()
                ),
                severity: Severity::High,
            });
        }

        if offset_minutes > LATE_CUTOFF_MINUTES {
            return Some(AnomalyVerdict {
                is_anomaly: true,
                anomaly_score: LATE_ATTENDANCE_SCORE,
                anomaly_type: AnomalyType::LateAttendance,
                reason: format!(
                    "Check-in {:.1} minutes after session start",
                    offset_minutes
                ),
                severity: Severity::Medium,
            });
        }
    }

    None
}

/// 重複チェックインの検知
///
/// バッチ内で同一 (sessionId, studentId) を持つレコード数（自身を含む）を
/// 数え、2件以上なら異常。レコードごとに O(n) の全バッチ走査 —
/// 1クラス分のバッチなら許容範囲だが、スケール上の制限として明記しておく。
pub fn detect_duplicate_anomaly(
    record: &AttendanceRecord,
    batch: &[AttendanceRecord],
) -> Option<AnomalyVerdict> {
    if record.session_id.is_empty() || record.student_id.is_empty() {
        return None;
    }

    let duplicate_count = batch
        .iter()
        .filter(|r| r.session_id == record.session_id && r.student_id == record.student_id)
        .count();

    if duplicate_count > 1 {
        return Some(AnomalyVerdict {
            is_anomaly: true,
            anomaly_score: DUPLICATE_SCORE,
            anomaly_type: AnomalyType::DuplicateAttendance,
            reason: format!(
                "Student checked in {} times in the same session",
                duplicate_count
            ),
            severity: Severity::High,
        });
    }

    None
}
