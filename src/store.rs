//! Record store adapter for fetching attendance data.
//!
//! The external realtime database is a best-effort dependency: transport or
//! parse failures at this boundary are swallowed and logged, surfacing as
//! empty data rather than errors (fail-open). A missing data source must not
//! take down anomaly scoring for sessions whose data is available.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{AttendanceRecord, SessionMetadata};

/// Default per-request deadline; exceeding it counts as fetch failure.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Abstract fetch interface consumed by the detection pipeline.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch attendance records, optionally filtered by exact session and/or
    /// student id. Failures yield an empty batch, never an error.
    async fn fetch_records(
        &self,
        session_filter: Option<&str>,
        student_filter: Option<&str>,
    ) -> Vec<AttendanceRecord>;

    /// Fetch metadata for one session. Failures and unknown ids yield `None`.
    async fn fetch_session(&self, session_id: &str) -> Option<SessionMetadata>;
}

/// Realtime-database backed store (Firebase-style JSON REST endpoints).
pub struct RealtimeDbStore {
    client: Client,
    base_url: String,
}

impl RealtimeDbStore {
    /// Create a new store client with a fixed request timeout.
    pub fn new(base_url: impl Into<String>, timeout_seconds: Option<u64>) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_seconds.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS));
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fallible inner fetch; the trait impl wraps this fail-open.
    async fn try_fetch_records(
        &self,
        session_filter: Option<&str>,
        student_filter: Option<&str>,
    ) -> Result<Vec<AttendanceRecord>> {
        let url = format!("{}/attendances.json", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;

        // The database returns null when the tree is empty.
        let data: Option<HashMap<String, Value>> = response.json().await?;
        let Some(data) = data else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for (session_id, students) in data {
            if let Some(filter) = session_filter {
                if session_id != filter {
                    continue;
                }
            }

            let Value::Object(students) = students else {
                continue;
            };

            for (student_id, raw) in students {
                if let Some(filter) = student_filter {
                    if student_id != filter {
                        continue;
                    }
                }

                if !raw.is_object() {
                    continue;
                }

                match serde_json::from_value::<AttendanceRecord>(raw) {
                    Ok(mut record) => {
                        record.session_id = session_id.clone();
                        records.push(record);
                    }
                    Err(e) => {
                        // One malformed record must not drop the batch.
                        warn!("Skipping malformed attendance record: {}", e);
                    }
                }
            }
        }

        Ok(records)
    }

    async fn try_fetch_session(&self, session_id: &str) -> Result<Option<SessionMetadata>> {
        let url = format!("{}/sessions/{}.json", self.base_url, session_id);
        let response = self.client.get(&url).send().await?.error_for_status()?;

        let metadata: Option<SessionMetadata> = response.json().await?;
        Ok(metadata)
    }
}

#[async_trait]
impl RecordStore for RealtimeDbStore {
    async fn fetch_records(
        &self,
        session_filter: Option<&str>,
        student_filter: Option<&str>,
    ) -> Vec<AttendanceRecord> {
        match self.try_fetch_records(session_filter, student_filter).await {
            Ok(records) => {
                debug!("Fetched {} attendance records", records.len());
                records
            }
            Err(e) => {
                warn!("Attendance fetch failed, continuing with empty batch: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_session(&self, session_id: &str) -> Option<SessionMetadata> {
        match self.try_fetch_session(session_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Session fetch failed for {}: {}", session_id, e);
                None
            }
        }
    }
}
