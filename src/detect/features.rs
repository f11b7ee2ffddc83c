//! 特徴量抽出
//!
//! 出席記録から統計モデル用の時刻特徴量を生成します。

use chrono::{Datelike, Timelike};

use crate::error::{Error, Result};
use crate::types::AttendanceRecord;

/// 1レコードあたりの特徴量次元数
pub const FEATURE_COUNT: usize = 3;

/// 時刻特徴ベクトル: [hour, minute, day_of_week]
pub type TemporalFeatures = [f64; FEATURE_COUNT];

/// バッチ全体の特徴行列を抽出
///
/// 特徴量は時（0-23）、分（0-59）、曜日（月曜=0 .. 日曜=6）。
/// パースできないタイムスタンプが1件でもあれば `Err` —
/// 呼び出し側はバッチ全体の統計的検知をスキップする。
pub fn extract_features(records: &[AttendanceRecord]) -> Result<Vec<TemporalFeatures>> {
    records
        .iter()
        .map(|record| {
            let ts = record.parsed_timestamp().ok_or_else(|| {
                Error::Parse(format!("unparseable timestamp: {}", record.timestamp))
            })?;

            Ok([
                ts.hour() as f64,
                ts.minute() as f64,
                ts.weekday().num_days_from_monday() as f64,
            ])
        })
        .collect()
}
