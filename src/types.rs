//! Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database operations an operation descriptor may carry.
/// Anything other than `Read` must be approved before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Read,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Read,
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "READ",
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }

    /// Write-class operations are held for a human decision
    pub fn requires_approval(&self) -> bool {
        !matches!(self, OperationKind::Read)
    }

    /// Leading SQL keywords a statement of this kind may start with
    pub fn statement_keywords(&self) -> &'static [&'static str] {
        match self {
            OperationKind::Read => &["SELECT", "WITH"],
            OperationKind::Create => &["INSERT"],
            OperationKind::Update => &["UPDATE"],
            OperationKind::Delete => &["DELETE"],
        }
    }

    /// Map a SQL verb (SELECT, INSERT, ...) onto an operation kind
    pub fn from_sql_verb(verb: &str) -> Option<Self> {
        match verb.trim().to_ascii_uppercase().as_str() {
            "SELECT" | "WITH" | "READ" => Some(OperationKind::Read),
            "INSERT" | "CREATE" => Some(OperationKind::Create),
            "UPDATE" => Some(OperationKind::Update),
            "DELETE" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(OperationKind::Read),
            "CREATE" => Ok(OperationKind::Create),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            other => Err(format!("unknown operation kind '{}'", other)),
        }
    }
}

/// Lifecycle status of a stored operation.
///
/// `Pending -> Approved | Rejected`, `Approved -> Executed | Failed`.
/// `Rejected`, `Executed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
}

impl OperationStatus {
    pub const ALL: [OperationStatus; 5] = [
        OperationStatus::Pending,
        OperationStatus::Approved,
        OperationStatus::Rejected,
        OperationStatus::Executed,
        OperationStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Approved => "APPROVED",
            OperationStatus::Rejected => "REJECTED",
            OperationStatus::Executed => "EXECUTED",
            OperationStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Rejected | OperationStatus::Executed | OperationStatus::Failed
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        matches!(
            (self, next),
            (OperationStatus::Pending, OperationStatus::Approved)
                | (OperationStatus::Pending, OperationStatus::Rejected)
                | (OperationStatus::Approved, OperationStatus::Executed)
                | (OperationStatus::Approved, OperationStatus::Failed)
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OperationStatus::Pending),
            "APPROVED" => Ok(OperationStatus::Approved),
            "REJECTED" => Ok(OperationStatus::Rejected),
            "EXECUTED" => Ok(OperationStatus::Executed),
            "FAILED" => Ok(OperationStatus::Failed),
            other => Err(format!("unknown operation status '{}'", other)),
        }
    }
}

/// Operator decision on a pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn from_approve(approve: bool) -> Self {
        if approve {
            Decision::Approved
        } else {
            Decision::Rejected
        }
    }

    pub fn status(&self) -> OperationStatus {
        match self {
            Decision::Approved => OperationStatus::Approved,
            Decision::Rejected => OperationStatus::Rejected,
        }
    }
}
