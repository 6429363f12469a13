//! PostgreSQL account repository
//!
//! Uniqueness rides on the `accounts_email_lower_key` index over
//! `lower(email)`; lockout and token consumption are single conditional
//! `UPDATE … RETURNING` statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowd_common::{map_unique_violation, RepositoryError, Result};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccountRepository, ProfileChanges};
use crate::domain::entities::{Account, Redemption, TokenPurpose};

const ACCOUNT_COLUMNS: &str = r#"
    id, email, unconfirmed_email, name, password_hash,
    first_name, last_name, email_public, city, country, timezone, bio,
    website, github, linkedin, twitter,
    hosting_institution_id, hosting_institution_primary, image_url,
    admin, verified, verification_date,
    confirmation_token, confirmation_sent_at, confirmed_at,
    reset_password_token, reset_password_sent_at,
    unlock_token, unlock_sent_at, locked_at,
    failed_attempts, sign_in_count,
    current_sign_in_at, last_sign_in_at, current_sign_in_ip, last_sign_in_ip,
    remember_created_at, created_at, updated_at
"#;

const EMAIL_TAKEN: &str = "Email has already been taken";

/// Profile assignments appended to the profile update, binding from `$6`
const PROFILE_ASSIGNMENTS: &str = r#",
    first_name = $6, last_name = $7, email_public = $8, city = $9, country = $10,
    timezone = $11, bio = $12, website = $13, github = $14, linkedin = $15,
    twitter = $16, hosting_institution_id = $17, hosting_institution_primary = $18,
    image_url = $19
"#;

/// Columns a redemption writes besides clearing its token. `$3` is the
/// redemption time, `$4` the new password hash.
fn redemption_assignments(redemption: &Redemption) -> &'static str {
    match redemption {
        Redemption::Confirm => {
            r#"
            email = COALESCE(unconfirmed_email, email),
            unconfirmed_email = NULL,
            confirmed_at = $3, verified = TRUE, verification_date = $3
            "#
        }
        Redemption::ResetPassword { .. } => {
            r#"
            password_hash = $4, reset_password_sent_at = NULL,
            unlock_token = NULL, unlock_sent_at = NULL,
            locked_at = NULL, failed_attempts = 0
            "#
        }
        Redemption::Unlock => {
            r#"
            unlock_sent_at = NULL, locked_at = NULL, failed_attempts = 0
            "#
        }
    }
}

#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn insert(&self, account: &Account) -> Result<Account> {
        let sql = format!(
            r#"
            INSERT INTO accounts (
                id, email, name, password_hash,
                first_name, last_name, email_public, city, country, timezone, bio,
                website, github, linkedin, twitter,
                hosting_institution_id, hosting_institution_primary, image_url,
                admin, verified, verification_date,
                failed_attempts, sign_in_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let profile = &account.profile;
        sqlx::query_as::<_, Account>(&sql)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.password_hash)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(profile.email_public)
            .bind(&profile.city)
            .bind(&profile.country)
            .bind(&profile.timezone)
            .bind(&profile.bio)
            .bind(&profile.website)
            .bind(&profile.github)
            .bind(&profile.linkedin)
            .bind(&profile.twitter)
            .bind(profile.hosting_institution_id)
            .bind(profile.hosting_institution_primary)
            .bind(&profile.image_url)
            .bind(account.admin)
            .bind(account.verified)
            .bind(account.verification_date)
            .bind(account.failed_attempts)
            .bind(account.sign_in_count)
            .bind(account.created_at)
            .bind(account.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, EMAIL_TAKEN))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let sql =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = lower($1)");
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_by_token(&self, purpose: TokenPurpose, digest: &str) -> Result<Option<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {} = $1",
            purpose.token_column()
        );
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn store_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        digest: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Account> {
        let sql = format!(
            r#"
            UPDATE accounts SET {} = $2, {} = $3, updated_at = $3
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#,
            purpose.token_column(),
            purpose.sent_at_column()
        );
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(digest)
            .bind(sent_at)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound.into())
    }

    async fn take_token(&self, purpose: TokenPurpose, digest: &str) -> Result<Option<Account>> {
        let column = purpose.token_column();
        let sql = format!(
            "UPDATE accounts SET {column} = NULL WHERE {column} = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn redeem_token(
        &self,
        redemption: &Redemption,
        digest: &str,
        issued_after: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let purpose = redemption.purpose();
        let sql = format!(
            r#"
            UPDATE accounts SET
                {token} = NULL,
                {assignments},
                updated_at = $3
            WHERE {token} = $1
              AND ($2::timestamptz IS NULL OR {sent_at} >= $2)
            RETURNING {ACCOUNT_COLUMNS}
            "#,
            token = purpose.token_column(),
            sent_at = purpose.sent_at_column(),
            assignments = redemption_assignments(redemption),
        );

        let mut query = sqlx::query_as::<_, Account>(&sql)
            .bind(digest)
            .bind(issued_after)
            .bind(at);
        if let Redemption::ResetPassword { password_hash } = redemption {
            query = query.bind(password_hash);
        }

        // A promoted email that collides trips the lower(email) index
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, EMAIL_TAKEN))?;

        Ok(row)
    }

    async fn set_admin(&self, id: Uuid, admin: bool, at: DateTime<Utc>) -> Result<Account> {
        let sql = format!(
            r#"
            UPDATE accounts SET admin = $2, updated_at = $3
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(admin)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound.into())
    }

    async fn update_password(
        &self,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let sql = format!(
            r#"
            UPDATE accounts SET
                password_hash = $3,
                reset_password_token = NULL, reset_password_sent_at = NULL,
                updated_at = $4
            WHERE id = $1 AND password_hash = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(expected_hash)
            .bind(new_hash)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        at: DateTime<Utc>,
    ) -> Result<Account> {
        let profile_assignments = if changes.profile.is_some() {
            PROFILE_ASSIGNMENTS
        } else {
            ""
        };
        let sql = format!(
            r#"
            UPDATE accounts SET
                name = COALESCE($2, name),
                unconfirmed_email = CASE WHEN $4 THEN $5 ELSE unconfirmed_email END,
                updated_at = $3
                {profile_assignments}
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let mut query = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(&changes.name)
            .bind(at)
            .bind(changes.unconfirmed_email.is_some())
            .bind(changes.unconfirmed_email.clone().flatten());
        if let Some(profile) = &changes.profile {
            query = query
                .bind(&profile.first_name)
                .bind(&profile.last_name)
                .bind(profile.email_public)
                .bind(&profile.city)
                .bind(&profile.country)
                .bind(&profile.timezone)
                .bind(&profile.bio)
                .bind(&profile.website)
                .bind(&profile.github)
                .bind(&profile.linkedin)
                .bind(&profile.twitter)
                .bind(profile.hosting_institution_id)
                .bind(profile.hosting_institution_primary)
                .bind(&profile.image_url);
        }

        let row = query.fetch_optional(&self.pool).await?;
        row.ok_or_else(|| RepositoryError::NotFound.into())
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
        unlock_digest: &str,
        at: DateTime<Utc>,
    ) -> Result<Account> {
        // Every SET expression sees the pre-update row
        let sql = format!(
            r#"
            UPDATE accounts SET
                failed_attempts = failed_attempts + 1,
                locked_at = CASE WHEN locked_at IS NULL AND failed_attempts + 1 >= $2
                                 THEN $4 ELSE locked_at END,
                unlock_token = CASE WHEN locked_at IS NULL AND failed_attempts + 1 >= $2
                                    THEN $3 ELSE unlock_token END,
                unlock_sent_at = CASE WHEN locked_at IS NULL AND failed_attempts + 1 >= $2
                                      THEN $4 ELSE unlock_sent_at END,
                updated_at = $4
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(max_attempts)
            .bind(unlock_digest)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound.into())
    }

    async fn record_sign_in(
        &self,
        id: Uuid,
        ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let sql = format!(
            r#"
            UPDATE accounts SET
                failed_attempts = 0,
                sign_in_count = sign_in_count + 1,
                last_sign_in_at = COALESCE(current_sign_in_at, $3),
                current_sign_in_at = $3,
                last_sign_in_ip = COALESCE(current_sign_in_ip, $2),
                current_sign_in_ip = $2,
                updated_at = $3
            WHERE id = $1 AND locked_at IS NULL
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(ip)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}
