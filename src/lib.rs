//! # attendai-rs
//!
//! Anomaly detection service for classroom attendance check-ins.
//!
//! This crate scores batches of attendance records with three independent
//! detectors (session-timing rules, duplicate submissions, and a seeded
//! isolation-forest outlier model) and merges them into one verdict per
//! record with a deterministic precedence policy.

pub mod config;
pub mod detect;
pub mod error;
pub mod http_server;
pub mod store;
pub mod types;

pub use detect::AnomalyEngine;
pub use error::{Error, Result};
