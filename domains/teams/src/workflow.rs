//! Invitation workflow
//!
//! Creates teams and invitations and drives invitations through
//! `pending → accepted | declined | expired`. Acceptance attaches the
//! invitee to the team and notifies the invitor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crowd_common::config::IdentityConfig;
use crowd_common::{AuthFailure, Error, Result};
use crowd_identity::{normalize_email, validate_email, Account, AccountRepository};
use crowd_notify::{NotificationDispatcher, NotificationRequest};
use uuid::Uuid;

use crate::domain::entities::{InvitationState, Membership, MembershipRole, Team, TeamInvitation};
use crate::domain::state::InvitationEvent;
use crate::repository::TeamRepository;

/// Result of a successful acceptance
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub invitation: TeamInvitation,
    pub membership: Membership,
    /// Request handed to the dispatcher, addressed to the invitor
    pub notification: NotificationRequest,
}

#[derive(Clone)]
pub struct InvitationWorkflow {
    teams: Arc<dyn TeamRepository>,
    accounts: Arc<dyn AccountRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    config: IdentityConfig,
}

impl InvitationWorkflow {
    pub fn new(
        teams: Arc<dyn TeamRepository>,
        accounts: Arc<dyn AccountRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: IdentityConfig,
    ) -> Self {
        Self {
            teams,
            accounts,
            dispatcher,
            config,
        }
    }

    /// Create a team owned by `owner`
    pub async fn create_team(&self, owner: &Account, name: &str) -> Result<Team> {
        let owner = self.load_account(owner.id).await?;
        let team = Team::new(name, owner.id)?;
        let membership = Membership::new(team.id, owner.id, MembershipRole::Owner);

        let team = self.teams.insert_team(&team, &membership).await?;
        tracing::info!(team_id = %team.id, owner_id = %owner.id, "Team created");
        Ok(team)
    }

    /// Invite `invitee_email` to a team
    pub async fn create(
        &self,
        team_id: Uuid,
        invitor: &Account,
        invitee_email: &str,
    ) -> Result<TeamInvitation> {
        validate_email(invitee_email)?;

        let team = self.load_team(team_id).await?;
        let invitor = self.load_account(invitor.id).await?;

        let is_member = self.teams.get_membership(team.id, invitor.id).await?.is_some();
        if !is_member && !invitor.admin {
            tracing::warn!(
                team_id = %team.id,
                invitor_id = %invitor.id,
                "Invitation refused: invitor not a member"
            );
            return Err(Error::Authorization(
                "Only team members can invite to this team".to_string(),
            ));
        }

        if normalize_email(invitee_email) == invitor.email_key() {
            return Err(Error::Conflict("You cannot invite yourself".to_string()));
        }

        let invitee = self.accounts.find_by_email(invitee_email).await?;
        if let Some(invitee) = &invitee {
            if self.teams.get_membership(team.id, invitee.id).await?.is_some() {
                return Err(Error::Conflict(
                    "Account is already a member of this team".to_string(),
                ));
            }
        }

        let invitation = TeamInvitation::new(
            team.id,
            invitor.id,
            invitee_email,
            invitee.map(|a| a.id),
            self.config.invitation_ttl,
        );
        let invitation = self.teams.insert_invitation(&invitation).await?;

        tracing::info!(
            invitation_id = %invitation.id,
            team_id = %team.id,
            invitor_id = %invitor.id,
            invitee_resolved = invitation.invitee_id.is_some(),
            "Invitation created"
        );
        Ok(invitation)
    }

    /// Accept an invitation as `acting`.
    ///
    /// The state change and membership are committed together; the
    /// notification is dispatched afterwards and its failure only logged.
    pub async fn accept(&self, invitation_id: Uuid, acting: &Account) -> Result<Acceptance> {
        let now = Utc::now();
        let invitation = self.load_invitation(invitation_id).await?;
        let acting = self.load_account(acting.id).await?;
        self.check_invitee(&invitation, &acting)?;

        if !acting.is_confirmed() {
            return Err(Error::Authentication(AuthFailure::Unconfirmed));
        }

        self.guard(&invitation, InvitationEvent::Accept, now).await?;

        let team = self.load_team(invitation.team_id).await?;
        let invitor = self.load_account(invitation.invitor_id).await?;

        let membership = Membership::new(team.id, acting.id, MembershipRole::Member);
        let (invitation, membership) = self
            .teams
            .accept_invitation(invitation.id, &membership, now)
            .await?
            .ok_or_else(no_longer_pending)?;

        tracing::info!(
            invitation_id = %invitation.id,
            team_id = %team.id,
            account_id = %acting.id,
            "Invitation accepted"
        );

        let notification = NotificationRequest::invitation_accepted(
            invitor.email.clone(),
            team.name.clone(),
            acting.name.clone(),
            acting.email.clone(),
        );
        if let Err(e) = self.dispatcher.dispatch(notification.clone()).await {
            tracing::warn!(
                error = %e,
                invitation_id = %invitation.id,
                "Failed to dispatch invitation accepted notification"
            );
        }

        Ok(Acceptance {
            invitation,
            membership,
            notification,
        })
    }

    /// Decline an invitation as `acting`
    pub async fn decline(&self, invitation_id: Uuid, acting: &Account) -> Result<TeamInvitation> {
        let now = Utc::now();
        let invitation = self.load_invitation(invitation_id).await?;
        let acting = self.load_account(acting.id).await?;
        self.check_invitee(&invitation, &acting)?;

        let next = self.guard(&invitation, InvitationEvent::Decline, now).await?;
        let invitation = self
            .teams
            .transition_invitation(invitation.id, next, now)
            .await?
            .ok_or_else(no_longer_pending)?;

        tracing::info!(
            invitation_id = %invitation.id,
            account_id = %acting.id,
            "Invitation declined"
        );
        Ok(invitation)
    }

    /// Expire a pending invitation regardless of its expiry time
    pub async fn expire(&self, invitation_id: Uuid) -> Result<TeamInvitation> {
        let now = Utc::now();
        let invitation = self.load_invitation(invitation_id).await?;
        let next = invitation.next_state(InvitationEvent::Expire, now)?;

        let invitation = self
            .teams
            .transition_invitation(invitation.id, next, now)
            .await?
            .ok_or_else(no_longer_pending)?;

        tracing::info!(invitation_id = %invitation.id, "Invitation expired");
        Ok(invitation)
    }

    /// Expire every pending invitation past its expiry time
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<TeamInvitation>> {
        let expired = self.teams.expire_overdue(now).await?;
        tracing::info!(count = expired.len(), "Expired overdue invitations");
        Ok(expired)
    }

    pub async fn get(&self, invitation_id: Uuid) -> Result<Option<TeamInvitation>> {
        tracing::debug!(invitation_id = %invitation_id, "Loading invitation");
        self.teams.get_invitation(invitation_id).await
    }

    pub async fn list_for_team(&self, team_id: Uuid) -> Result<Vec<TeamInvitation>> {
        self.teams.list_invitations(team_id).await
    }

    pub async fn members(&self, team_id: Uuid) -> Result<Vec<Membership>> {
        self.teams.list_members(team_id).await
    }

    /// Only the invitee may answer an invitation
    fn check_invitee(&self, invitation: &TeamInvitation, acting: &Account) -> Result<()> {
        let email_matches = invitation.is_addressed_to(&acting.email);
        let id_matches = invitation.invitee_id.is_none_or(|id| id == acting.id);

        if email_matches && id_matches {
            Ok(())
        } else {
            tracing::warn!(
                invitation_id = %invitation.id,
                account_id = %acting.id,
                "Refused: account is not the invitee"
            );
            Err(Error::Authorization(
                "This invitation was sent to a different account".to_string(),
            ))
        }
    }

    /// Check `event` against the state machine. An overdue pending invitation
    /// is expired on the spot and the event refused.
    async fn guard(
        &self,
        invitation: &TeamInvitation,
        event: InvitationEvent,
        now: DateTime<Utc>,
    ) -> Result<InvitationState> {
        if invitation.is_overdue(now) {
            if self
                .teams
                .transition_invitation(invitation.id, InvitationState::Expired, now)
                .await?
                .is_some()
            {
                tracing::info!(invitation_id = %invitation.id, "Invitation expired on use");
            }
            return Err(Error::AlreadyTerminal("Invitation has expired".to_string()));
        }

        invitation.next_state(event, now)
    }

    async fn load_invitation(&self, invitation_id: Uuid) -> Result<TeamInvitation> {
        self.teams
            .get_invitation(invitation_id)
            .await?
            .ok_or_else(|| Error::NotFound("Invitation not found".to_string()))
    }

    async fn load_team(&self, team_id: Uuid) -> Result<Team> {
        self.teams
            .get_team(team_id)
            .await?
            .ok_or_else(|| Error::NotFound("Team not found".to_string()))
    }

    async fn load_account(&self, account_id: Uuid) -> Result<Account> {
        self.accounts
            .get(account_id)
            .await?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))
    }
}

fn no_longer_pending() -> Error {
    Error::AlreadyTerminal("Invitation is no longer pending".to_string())
}
