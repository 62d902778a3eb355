//! Inbound and outbound order lifecycles
//!
//! Both order kinds share one shape: DRAFT -> APPROVED -> posted, with CANCELLED reachable
//! from DRAFT or APPROVED only. The posted state is PUTAWAY for inbound orders and PICKED for
//! outbound orders, and it is the only transition that touches the stock ledger.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ParseEnumError;

/// Kind-independent position of an order in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Draft,
    Approved,
    Posted,
    Cancelled,
}

impl Phase {
    #[cfg(test)]
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, Phase::Posted | Phase::Cancelled)
    }
}

/// Something a caller asks an order to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    /// Replace the item set of a draft
    Edit,
    Approve,
    /// Putaway (inbound) or pick (outbound)
    Post,
    Cancel,
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderAction::Edit => write!(f, "edit"),
            OrderAction::Approve => write!(f, "approve"),
            OrderAction::Post => write!(f, "post"),
            OrderAction::Cancel => write!(f, "cancel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} an order in status {status}")]
    InvalidStatus {
        status: &'static str,
        action: OrderAction,
    },

    #[error("order was already posted ({status}) and cannot be cancelled")]
    AlreadyPosted { status: &'static str },
}

/// Result of a permitted action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange<S> {
    /// The order moves to (or is rewritten in) this status
    To(S),
    /// The action is a no-op in the current status
    Unchanged(S),
}

impl<S: Copy> StatusChange<S> {
    pub fn status(&self) -> S {
        match self {
            StatusChange::To(s) | StatusChange::Unchanged(s) => *s,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, StatusChange::To(_))
    }
}

/// Status enum of one order kind
pub trait OrderStatus: Copy + Eq + std::fmt::Debug {
    fn phase(&self) -> Phase;
    fn from_phase(phase: Phase) -> Self;
    fn as_str(&self) -> &'static str;

    /// Validate `action` against the current status and return the resulting status.
    fn apply(&self, action: OrderAction) -> Result<StatusChange<Self>, TransitionError> {
        let invalid = || TransitionError::InvalidStatus {
            status: self.as_str(),
            action,
        };

        match (action, self.phase()) {
            (OrderAction::Edit, Phase::Draft) => Ok(StatusChange::To(*self)),
            (OrderAction::Approve, Phase::Draft) => {
                Ok(StatusChange::To(Self::from_phase(Phase::Approved)))
            }
            (OrderAction::Post, Phase::Approved) => {
                Ok(StatusChange::To(Self::from_phase(Phase::Posted)))
            }
            (OrderAction::Cancel, Phase::Draft | Phase::Approved) => {
                Ok(StatusChange::To(Self::from_phase(Phase::Cancelled)))
            }
            (OrderAction::Cancel, Phase::Cancelled) => Ok(StatusChange::Unchanged(*self)),
            (OrderAction::Cancel, Phase::Posted) => Err(TransitionError::AlreadyPosted {
                status: self.as_str(),
            }),
            _ => Err(invalid()),
        }
    }
}

/// Inbound order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundStatus {
    Draft,
    Approved,
    Putaway,
    Cancelled,
}

impl OrderStatus for InboundStatus {
    fn phase(&self) -> Phase {
        match self {
            InboundStatus::Draft => Phase::Draft,
            InboundStatus::Approved => Phase::Approved,
            InboundStatus::Putaway => Phase::Posted,
            InboundStatus::Cancelled => Phase::Cancelled,
        }
    }

    fn from_phase(phase: Phase) -> Self {
        match phase {
            Phase::Draft => InboundStatus::Draft,
            Phase::Approved => InboundStatus::Approved,
            Phase::Posted => InboundStatus::Putaway,
            Phase::Cancelled => InboundStatus::Cancelled,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            InboundStatus::Draft => "DRAFT",
            InboundStatus::Approved => "APPROVED",
            InboundStatus::Putaway => "PUTAWAY",
            InboundStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for InboundStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(InboundStatus::Draft),
            "APPROVED" => Ok(InboundStatus::Approved),
            "PUTAWAY" => Ok(InboundStatus::Putaway),
            "CANCELLED" => Ok(InboundStatus::Cancelled),
            other => Err(ParseEnumError {
                kind: "inbound status",
                value: other.to_string(),
            }),
        }
    }
}

/// Outbound order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundStatus {
    Draft,
    Approved,
    Picked,
    Cancelled,
}

impl OrderStatus for OutboundStatus {
    fn phase(&self) -> Phase {
        match self {
            OutboundStatus::Draft => Phase::Draft,
            OutboundStatus::Approved => Phase::Approved,
            OutboundStatus::Picked => Phase::Posted,
            OutboundStatus::Cancelled => Phase::Cancelled,
        }
    }

    fn from_phase(phase: Phase) -> Self {
        match phase {
            Phase::Draft => OutboundStatus::Draft,
            Phase::Approved => OutboundStatus::Approved,
            Phase::Posted => OutboundStatus::Picked,
            Phase::Cancelled => OutboundStatus::Cancelled,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            OutboundStatus::Draft => "DRAFT",
            OutboundStatus::Approved => "APPROVED",
            OutboundStatus::Picked => "PICKED",
            OutboundStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for OutboundStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(OutboundStatus::Draft),
            "APPROVED" => Ok(OutboundStatus::Approved),
            "PICKED" => Ok(OutboundStatus::Picked),
            "CANCELLED" => Ok(OutboundStatus::Cancelled),
            other => Err(ParseEnumError {
                kind: "outbound status",
                value: other.to_string(),
            }),
        }
    }
}
