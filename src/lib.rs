//! Hyperliquid wallet trade monitoring and alerting pipeline.
//!
//! Ingests fills for a watched wallet set over the exchange WebSocket
//! feed, classifies each by USD notional, deduplicates, evaluates alert
//! rules, and delivers qualifying alerts to notification channels under
//! per-channel rate limits.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod ingestion;
pub mod intelligence;
pub mod services;
