//! Actors acting on the ledger and their privileges.

use ledgerline_shared::types::UserId;
use serde::{Deserialize, Serialize};

/// Roles of users acting on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Full access.
    Owner,
    /// Full access, including reopening closed periods.
    Admin,
    /// Can post entries and close periods.
    Accountant,
    /// Can post entries.
    Clerk,
    /// Read-only access.
    Viewer,
}

impl ActorRole {
    /// Returns true if this role can post journal entries.
    #[must_use]
    pub const fn can_post(&self) -> bool {
        !matches!(self, Self::Viewer)
    }

    /// Returns true if this role can close and lock periods.
    #[must_use]
    pub const fn can_close_periods(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin | Self::Accountant)
    }

    /// Returns true if this role can reopen closed or locked periods.
    #[must_use]
    pub const fn can_reopen_periods(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Accountant => write!(f, "accountant"),
            Self::Clerk => write!(f, "clerk"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

/// A user performing a privileged ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The acting user.
    pub user_id: UserId,
    /// The user's role.
    pub role: ActorRole,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub const fn new(user_id: UserId, role: ActorRole) -> Self {
        Self { user_id, role }
    }

    /// System actor used by background jobs.
    #[must_use]
    pub fn system() -> Self {
        Self {
            user_id: UserId::from_uuid(uuid::Uuid::nil()),
            role: ActorRole::Admin,
        }
    }
}
