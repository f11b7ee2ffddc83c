//! 出席異常検知パイプライン
//!
//! 3つの独立した検知器と、その結果を1レコード1判定にまとめるマージエンジン。
//!
//! ## 主要機能
//!
//! - **ルールベース検知**: 授業時間外・開始時刻相対の早遅・重複チェックイン
//! - **統計的異常検知**: バッチ全体の時刻特徴に対するIsolation Forest
//! - **マージエンジン**: スコア優先のマージと決定的な同点解消
//!
//! ## 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use attendai_rs::detect::AnomalyEngine;
//! use attendai_rs::store::RealtimeDbStore;
//! use attendai_rs::types::DetectionRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RealtimeDbStore::new("http://localhost:9000", None)?);
//! let engine = AnomalyEngine::new(store);
//!
//! let response = engine.detect(&DetectionRequest::default()).await?;
//! println!("{} anomalies in {} records", response.anomaly_count, response.total_records);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod features;
pub mod forest;
pub mod rules;
pub mod statistical;

use std::collections::HashMap;

use crate::types::SessionMetadata;

pub use engine::AnomalyEngine;

/// バッチ内で共有するセッションメタデータのキャッシュ
///
/// リクエストごとに作られる一時的な状態。各セッションは最大1回だけ
/// フェッチされ、レコード単位のルール評価から読み取り専用で参照される。
/// グローバル状態にはしない — 評価呼び出しへ明示的に渡す。
pub type SessionCache = HashMap<String, Option<SessionMetadata>>;
