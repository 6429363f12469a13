//! Domain entities for the teams domain

use chrono::{DateTime, Duration, Utc};
use crowd_common::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

pub use crate::domain::state::InvitationState;
use crate::domain::state::{InvitationEvent, InvitationGuardContext, InvitationStateMachine};

/// Maximum team name length, in characters
pub const TEAM_NAME_MAX_LENGTH: usize = 100;

/// Membership roles, stored as the `membership_role` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "membership_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    #[default]
    Member,
}

impl std::fmt::Display for MembershipRole {
    #[mutants::skip] // Only used in log fields
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipRole::Owner => write!(f, "owner"),
            MembershipRole::Member => write!(f, "member"),
        }
    }
}

/// Team entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Create a new team with validation
    pub fn new(name: &str, created_by: Uuid) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > TEAM_NAME_MAX_LENGTH {
            let mut error = ValidationError::new("length");
            error.message = Some("Team name must be 1-100 characters".into());
            let mut errors = ValidationErrors::new();
            errors.add("name", error);
            return Err(Error::Validation(errors));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_by,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Team membership: the relation between a team and an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub team_id: Uuid,
    pub account_id: Uuid,
    pub role: MembershipRole,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(team_id: Uuid, account_id: Uuid, role: MembershipRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            account_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// Team invitation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamInvitation {
    pub id: Uuid,
    pub team_id: Uuid,
    pub invitor_id: Uuid,
    /// Address the invitation was sent to, original casing
    pub invitee_email: String,
    /// Resolved when the invitee already had an account at creation time
    pub invitee_id: Option<Uuid>,
    pub state: InvitationState,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamInvitation {
    /// Create a pending invitation that lapses after `ttl`. A `ttl` reaching
    /// past the representable range never lapses.
    pub fn new(
        team_id: Uuid,
        invitor_id: Uuid,
        invitee_email: &str,
        invitee_id: Option<Uuid>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            team_id,
            invitor_id,
            invitee_email: invitee_email.trim().to_string(),
            invitee_id,
            state: InvitationState::Pending,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            responded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == InvitationState::Pending
    }

    /// Still pending but past its expiry time
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.expires_at <= now
    }

    /// Case-folded invitee address
    pub fn invitee_key(&self) -> String {
        self.invitee_email.trim().to_lowercase()
    }

    /// Whether `email` names the invitee, ignoring case
    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.invitee_key() == email.trim().to_lowercase()
    }

    /// Next state for `event`, checked against the state machine
    pub fn next_state(
        &self,
        event: InvitationEvent,
        now: DateTime<Utc>,
    ) -> Result<InvitationState> {
        let context = InvitationGuardContext {
            is_overdue: self.is_overdue(now),
        };
        Ok(InvitationStateMachine::transition(self.state, event, Some(&context))?)
    }
}
