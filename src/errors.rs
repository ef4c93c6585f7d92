//! Pipeline error taxonomy. None of these terminate the process: parse
//! errors drop the offending frame or fill, rule errors skip the offending
//! rule. Transport and delivery failures are handled in place by the feed
//! and dispatcher loops. Only configuration errors (surfaced as
//! `anyhow::Error` from `AppConfig::from_env`) are fatal, and only at
//! startup.

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid decimal in field {field}: {value}")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("unknown side: {0}")]
    UnknownSide(String),

    #[error("negative size: {0}")]
    NegativeSize(String),

    #[error("negative price: {0}")]
    NegativePrice(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("rule {rule_id} misconfigured: {reason}")]
    Misconfigured { rule_id: String, reason: String },
}
