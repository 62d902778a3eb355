//! Common types used across the ledger

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or submitted enum string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Origin of a movement log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Inbound,
    Outbound,
    Adjust,
    Transfer,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Inbound => "INBOUND",
            SourceType::Outbound => "OUTBOUND",
            SourceType::Adjust => "ADJUST",
            SourceType::Transfer => "TRANSFER",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INBOUND" => Ok(SourceType::Inbound),
            "OUTBOUND" => Ok(SourceType::Outbound),
            "ADJUST" => Ok(SourceType::Adjust),
            "TRANSFER" => Ok(SourceType::Transfer),
            other => Err(ParseEnumError::new("source type", other)),
        }
    }
}

/// How an outbound line chooses the batches it consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchPolicy {
    /// First-expiry-first-out across every batch with stock
    #[default]
    System,
    /// Exactly the batch named on the line
    Specified,
}

impl BatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchPolicy::System => "SYSTEM",
            BatchPolicy::Specified => "SPECIFIED",
        }
    }
}

impl std::str::FromStr for BatchPolicy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYSTEM" => Ok(BatchPolicy::System),
            "SPECIFIED" => Ok(BatchPolicy::Specified),
            other => Err(ParseEnumError::new("batch policy", other)),
        }
    }
}

/// Read state of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "UNREAD",
            NotificationStatus::Read => "READ",
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNREAD" => Ok(NotificationStatus::Unread),
            "READ" => Ok(NotificationStatus::Read),
            other => Err(ParseEnumError::new("notification status", other)),
        }
    }
}

/// Category of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    LowStock,
    NearExpiry,
    SlowMoving,
    Success,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LowStock => "LOW_STOCK",
            NotificationKind::NearExpiry => "NEAR_EXPIRY",
            NotificationKind::SlowMoving => "SLOW_MOVING",
            NotificationKind::Success => "SUCCESS",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW_STOCK" => Ok(NotificationKind::LowStock),
            "NEAR_EXPIRY" => Ok(NotificationKind::NearExpiry),
            "SLOW_MOVING" => Ok(NotificationKind::SlowMoving),
            "SUCCESS" => Ok(NotificationKind::Success),
            other => Err(ParseEnumError::new("notification kind", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_round_trips_through_storage_form() {
        for source in [
            SourceType::Inbound,
            SourceType::Outbound,
            SourceType::Adjust,
            SourceType::Transfer,
        ] {
            assert_eq!(source.as_str().parse::<SourceType>().unwrap(), source);
        }
    }

    #[test]
    fn test_unknown_batch_policy_is_rejected() {
        let err = "FIFO".parse::<BatchPolicy>().unwrap_err();
        assert_eq!(err.kind, "batch policy");
        assert_eq!(err.value, "FIFO");
    }

    #[test]
    fn test_batch_policy_defaults_to_system() {
        assert_eq!(BatchPolicy::default(), BatchPolicy::System);
    }

    #[test]
    fn test_serde_uses_storage_names() {
        let json = serde_json::to_string(&NotificationKind::NearExpiry).unwrap();
        assert_eq!(json, "\"NEAR_EXPIRY\"");
    }
}
