//! Error Types for the Analytics Core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Brokerage error: {0}")]
    Broker(String),

    /// Account discovery is the one call the whole run depends on.
    #[error("Account discovery failed: {0}")]
    AccountDiscovery(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Invalid risk profile: {0}")]
    InvalidRiskProfile(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
