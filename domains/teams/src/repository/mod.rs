//! Repository implementations for the teams domain

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowd_common::Result;
use uuid::Uuid;

use crate::domain::entities::{InvitationState, Membership, Team, TeamInvitation};

pub use memory::InMemoryTeamRepository;
pub use postgres::PgTeamRepository;

/// Persistence for teams, memberships and invitations.
///
/// Every invitation transition is a compare-and-set on `state = 'pending'`:
/// of two concurrent callers at most one observes `Some`.
#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Insert a team together with its owner membership
    async fn insert_team(&self, team: &Team, owner: &Membership) -> Result<Team>;

    async fn get_team(&self, team_id: Uuid) -> Result<Option<Team>>;

    async fn get_membership(&self, team_id: Uuid, account_id: Uuid) -> Result<Option<Membership>>;

    async fn list_members(&self, team_id: Uuid) -> Result<Vec<Membership>>;

    /// Insert a pending invitation; `Conflict` when the team already has a
    /// pending invitation for the same case-folded address
    async fn insert_invitation(&self, invitation: &TeamInvitation) -> Result<TeamInvitation>;

    async fn get_invitation(&self, invitation_id: Uuid) -> Result<Option<TeamInvitation>>;

    /// Newest first
    async fn list_invitations(&self, team_id: Uuid) -> Result<Vec<TeamInvitation>>;

    /// Move a pending invitation to `to`. `None` when it is no longer pending.
    async fn transition_invitation(
        &self,
        invitation_id: Uuid,
        to: InvitationState,
        at: DateTime<Utc>,
    ) -> Result<Option<TeamInvitation>>;

    /// Accept a pending invitation and insert the membership as one unit.
    /// `None` when it is no longer pending; `Conflict` (with nothing
    /// written) when the account is already a member.
    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        membership: &Membership,
        at: DateTime<Utc>,
    ) -> Result<Option<(TeamInvitation, Membership)>>;

    /// Expire every pending invitation whose `expires_at` is not after `now`
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<TeamInvitation>>;
}
