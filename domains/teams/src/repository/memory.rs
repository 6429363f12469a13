//! In-memory team repository

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowd_common::{Error, RepositoryError, Result};
use uuid::Uuid;

use super::TeamRepository;
use crate::domain::entities::{InvitationState, Membership, Team, TeamInvitation};

#[derive(Default)]
struct State {
    teams: HashMap<Uuid, Team>,
    memberships: Vec<Membership>,
    invitations: HashMap<Uuid, TeamInvitation>,
}

impl State {
    fn is_member(&self, team_id: Uuid, account_id: Uuid) -> bool {
        self.memberships
            .iter()
            .any(|m| m.team_id == team_id && m.account_id == account_id)
    }
}

#[derive(Default)]
pub struct InMemoryTeamRepository {
    state: Mutex<State>,
}

impl InMemoryTeamRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::Internal(format!("team store lock poisoned: {}", e)))
    }
}

fn apply(invitation: &mut TeamInvitation, to: InvitationState, at: DateTime<Utc>) {
    invitation.state = to;
    invitation.updated_at = at;
    if to != InvitationState::Expired {
        invitation.responded_at = Some(at);
    }
}

#[async_trait]
impl TeamRepository for InMemoryTeamRepository {
    async fn insert_team(&self, team: &Team, owner: &Membership) -> Result<Team> {
        let mut state = self.lock()?;
        if state.teams.contains_key(&team.id) {
            return Err(RepositoryError::AlreadyExists.into());
        }
        state.teams.insert(team.id, team.clone());
        state.memberships.push(owner.clone());
        Ok(team.clone())
    }

    async fn get_team(&self, team_id: Uuid) -> Result<Option<Team>> {
        Ok(self.lock()?.teams.get(&team_id).cloned())
    }

    async fn get_membership(&self, team_id: Uuid, account_id: Uuid) -> Result<Option<Membership>> {
        Ok(self
            .lock()?
            .memberships
            .iter()
            .find(|m| m.team_id == team_id && m.account_id == account_id)
            .cloned())
    }

    async fn list_members(&self, team_id: Uuid) -> Result<Vec<Membership>> {
        let mut members: Vec<Membership> = self
            .lock()?
            .memberships
            .iter()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.created_at);
        Ok(members)
    }

    async fn insert_invitation(&self, invitation: &TeamInvitation) -> Result<TeamInvitation> {
        let mut state = self.lock()?;
        let key = invitation.invitee_key();
        let duplicate = state
            .invitations
            .values()
            .any(|i| i.team_id == invitation.team_id && i.is_pending() && i.invitee_key() == key);
        if duplicate {
            return Err(Error::Conflict(
                "A pending invitation already exists for this email".to_string(),
            ));
        }

        state.invitations.insert(invitation.id, invitation.clone());
        Ok(invitation.clone())
    }

    async fn get_invitation(&self, invitation_id: Uuid) -> Result<Option<TeamInvitation>> {
        Ok(self.lock()?.invitations.get(&invitation_id).cloned())
    }

    async fn list_invitations(&self, team_id: Uuid) -> Result<Vec<TeamInvitation>> {
        let mut invitations: Vec<TeamInvitation> = self
            .lock()?
            .invitations
            .values()
            .filter(|i| i.team_id == team_id)
            .cloned()
            .collect();
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invitations)
    }

    async fn transition_invitation(
        &self,
        invitation_id: Uuid,
        to: InvitationState,
        at: DateTime<Utc>,
    ) -> Result<Option<TeamInvitation>> {
        let mut state = self.lock()?;
        let Some(invitation) = state
            .invitations
            .get_mut(&invitation_id)
            .filter(|i| i.is_pending())
        else {
            return Ok(None);
        };

        apply(invitation, to, at);
        Ok(Some(invitation.clone()))
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        membership: &Membership,
        at: DateTime<Utc>,
    ) -> Result<Option<(TeamInvitation, Membership)>> {
        let mut state = self.lock()?;
        let pending = state
            .invitations
            .get(&invitation_id)
            .is_some_and(|i| i.is_pending());
        if !pending {
            return Ok(None);
        }
        if state.is_member(membership.team_id, membership.account_id) {
            return Err(Error::Conflict(
                "Account is already a member of this team".to_string(),
            ));
        }

        let invitation = state
            .invitations
            .get_mut(&invitation_id)
            .ok_or(RepositoryError::NotFound)?;
        apply(invitation, InvitationState::Accepted, at);
        let invitation = invitation.clone();

        state.memberships.push(membership.clone());
        Ok(Some((invitation, membership.clone())))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<TeamInvitation>> {
        let mut state = self.lock()?;
        let mut expired = Vec::new();
        for invitation in state.invitations.values_mut() {
            if invitation.is_overdue(now) {
                apply(invitation, InvitationState::Expired, now);
                expired.push(invitation.clone());
            }
        }
        Ok(expired)
    }
}
