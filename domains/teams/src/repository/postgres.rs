//! PostgreSQL team repository
//!
//! Multi-statement writes run in one transaction through the `*_tx` helpers
//! below. The partial unique index `team_invitations_one_pending` backs the
//! one-pending-invitation rule; `memberships_team_account_key` backs
//! single membership.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowd_common::{map_unique_violation, Result};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::TeamRepository;
use crate::domain::entities::{InvitationState, Membership, Team, TeamInvitation};

const INVITATION_COLUMNS: &str = "id, team_id, invitor_id, invitee_email, invitee_id, state, \
     expires_at, responded_at, created_at, updated_at";

const MEMBERSHIP_COLUMNS: &str = "id, team_id, account_id, role, created_at";

#[derive(Clone)]
pub struct PgTeamRepository {
    pool: PgPool,
}

impl PgTeamRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Insert a membership within an existing transaction.
async fn create_membership_tx(
    transaction: &mut Transaction<'_, Postgres>,
    membership: &Membership,
) -> std::result::Result<Membership, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO memberships (id, team_id, account_id, role, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {MEMBERSHIP_COLUMNS}
        "#
    );
    sqlx::query_as::<_, Membership>(&sql)
        .bind(membership.id)
        .bind(membership.team_id)
        .bind(membership.account_id)
        .bind(membership.role)
        .bind(membership.created_at)
        .fetch_one(&mut **transaction)
        .await
}

/// Move a pending invitation to `to` within an existing transaction.
///
/// Returns `None` when the row is missing or no longer pending.
async fn transition_invitation_tx(
    transaction: &mut Transaction<'_, Postgres>,
    invitation_id: Uuid,
    to: InvitationState,
    at: DateTime<Utc>,
) -> std::result::Result<Option<TeamInvitation>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE team_invitations
        SET state = $2,
            responded_at = CASE WHEN $2 = 'expired'::invitation_state THEN responded_at ELSE $3 END,
            updated_at = $3
        WHERE id = $1 AND state = 'pending'
        RETURNING {INVITATION_COLUMNS}
        "#
    );
    sqlx::query_as::<_, TeamInvitation>(&sql)
        .bind(invitation_id)
        .bind(to)
        .bind(at)
        .fetch_optional(&mut **transaction)
        .await
}

#[async_trait]
impl TeamRepository for PgTeamRepository {
    async fn insert_team(&self, team: &Team, owner: &Membership) -> Result<Team> {
        let mut transaction = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Team>(
            r#"
            INSERT INTO teams (id, name, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, created_by, created_at, updated_at
            "#,
        )
        .bind(team.id)
        .bind(&team.name)
        .bind(team.created_by)
        .bind(team.created_at)
        .bind(team.updated_at)
        .fetch_one(&mut *transaction)
        .await?;

        create_membership_tx(&mut transaction, owner).await?;
        transaction.commit().await?;

        Ok(created)
    }

    async fn get_team(&self, team_id: Uuid) -> Result<Option<Team>> {
        let row = sqlx::query_as::<_, Team>(
            "SELECT id, name, created_by, created_at, updated_at FROM teams WHERE id = $1",
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_membership(&self, team_id: Uuid, account_id: Uuid) -> Result<Option<Membership>> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE team_id = $1 AND account_id = $2"
        );
        let row = sqlx::query_as::<_, Membership>(&sql)
            .bind(team_id)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_members(&self, team_id: Uuid) -> Result<Vec<Membership>> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE team_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, Membership>(&sql)
            .bind(team_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn insert_invitation(&self, invitation: &TeamInvitation) -> Result<TeamInvitation> {
        let sql = format!(
            r#"
            INSERT INTO team_invitations ({INVITATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {INVITATION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, TeamInvitation>(&sql)
            .bind(invitation.id)
            .bind(invitation.team_id)
            .bind(invitation.invitor_id)
            .bind(&invitation.invitee_email)
            .bind(invitation.invitee_id)
            .bind(invitation.state)
            .bind(invitation.expires_at)
            .bind(invitation.responded_at)
            .bind(invitation.created_at)
            .bind(invitation.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                map_unique_violation(e, "A pending invitation already exists for this email")
            })
    }

    async fn get_invitation(&self, invitation_id: Uuid) -> Result<Option<TeamInvitation>> {
        let sql = format!("SELECT {INVITATION_COLUMNS} FROM team_invitations WHERE id = $1");
        let row = sqlx::query_as::<_, TeamInvitation>(&sql)
            .bind(invitation_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_invitations(&self, team_id: Uuid) -> Result<Vec<TeamInvitation>> {
        let sql = format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM team_invitations
            WHERE team_id = $1
            ORDER BY created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, TeamInvitation>(&sql)
            .bind(team_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn transition_invitation(
        &self,
        invitation_id: Uuid,
        to: InvitationState,
        at: DateTime<Utc>,
    ) -> Result<Option<TeamInvitation>> {
        let mut transaction = self.pool.begin().await?;
        let row = transition_invitation_tx(&mut transaction, invitation_id, to, at).await?;
        transaction.commit().await?;

        Ok(row)
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        membership: &Membership,
        at: DateTime<Utc>,
    ) -> Result<Option<(TeamInvitation, Membership)>> {
        let mut transaction = self.pool.begin().await?;

        let Some(invitation) =
            transition_invitation_tx(&mut transaction, invitation_id, InvitationState::Accepted, at)
                .await?
        else {
            transaction.rollback().await?;
            return Ok(None);
        };

        // Dropping the transaction on error rolls the state change back
        let created = create_membership_tx(&mut transaction, membership)
            .await
            .map_err(|e| map_unique_violation(e, "Account is already a member of this team"))?;

        transaction.commit().await?;
        Ok(Some((invitation, created)))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<TeamInvitation>> {
        let sql = format!(
            r#"
            UPDATE team_invitations
            SET state = 'expired', updated_at = $1
            WHERE state = 'pending' AND expires_at <= $1
            RETURNING {INVITATION_COLUMNS}
            "#
        );
        let rows = sqlx::query_as::<_, TeamInvitation>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}
