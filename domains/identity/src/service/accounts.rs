//! Account store
//!
//! Registration, authentication with lockout, and account maintenance.
//! Every mutation validates the record before it is written.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use crowd_common::config::IdentityConfig;
use crowd_common::{AuthFailure, Error, Result};
use serde::Deserialize;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::domain::entities::{Account, AccountProfile, TokenPurpose};
use crate::domain::password::PasswordHasher;
use crate::domain::policy;
use crate::repository::{AccountRepository, ProfileChanges};
use crate::service::tokens::TokenIssuer;

/// Registration form
#[derive(Clone, Default, Deserialize)]
pub struct RegistrationAttrs {
    pub email: String,
    pub name: String,
    pub password: String,
    pub password_confirmation: Option<String>,
    #[serde(default)]
    pub profile: AccountProfile,
}

impl std::fmt::Debug for RegistrationAttrs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationAttrs")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password", &"[REDACTED]")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// Partial profile update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub profile: Option<AccountProfile>,
}

#[derive(Clone)]
pub struct AccountStore {
    accounts: Arc<dyn AccountRepository>,
    tokens: TokenIssuer,
    hasher: PasswordHasher,
    config: IdentityConfig,
}

impl AccountStore {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        tokens: TokenIssuer,
        hasher: PasswordHasher,
        config: IdentityConfig,
    ) -> Self {
        Self {
            accounts,
            tokens,
            hasher,
            config,
        }
    }

    /// Register a new, unconfirmed account
    pub async fn register(&self, attrs: RegistrationAttrs) -> Result<Account> {
        let mut errors = ValidationErrors::new();
        policy::check_email(&mut errors, &attrs.email);
        policy::check_password(&mut errors, Some(&attrs.password), true);
        policy::check_password_confirmation(
            &mut errors,
            Some(&attrs.password),
            attrs.password_confirmation.as_deref(),
        );
        policy::check_name(&mut errors, &attrs.name);
        policy::finish(errors)?;

        if self.accounts.find_by_email(&attrs.email).await?.is_some() {
            return Err(Error::Conflict("Email has already been taken".to_string()));
        }

        let password_hash = self.hasher.hash_async(&attrs.password).await?;
        let account = Account::new(attrs.email, attrs.name, password_hash, attrs.profile);

        // The repository re-checks uniqueness atomically for concurrent signups
        let account = self.accounts.insert(&account).await?;
        tracing::info!(account_id = %account.id, "Account registered");
        Ok(account)
    }

    /// Verify credentials and record the sign-in.
    ///
    /// A wrong password counts towards the lockout threshold; the attempt
    /// that reaches it locks the account and mails unlock instructions.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        ip: Option<IpAddr>,
    ) -> Result<Account> {
        let account = self
            .accounts
            .find_by_email(email)
            .await?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;

        if account.is_locked() {
            tracing::warn!(account_id = %account.id, "Sign-in refused: account locked");
            return Err(Error::Authentication(AuthFailure::Locked));
        }

        if !self.hasher.verify_async(password, &account.password_hash).await? {
            return Err(self.fail_attempt(&account).await?);
        }

        if !account.is_confirmed() {
            tracing::warn!(account_id = %account.id, "Sign-in refused: account unconfirmed");
            return Err(Error::Authentication(AuthFailure::Unconfirmed));
        }

        let account = self
            .accounts
            .record_sign_in(account.id, ip.map(|ip| ip.to_string()), Utc::now())
            .await?
            .ok_or(Error::Authentication(AuthFailure::Locked))?;

        tracing::info!(
            account_id = %account.id,
            sign_in_count = account.sign_in_count,
            "Signed in"
        );
        Ok(account)
    }

    /// Grant or revoke site administration
    pub async fn set_admin(
        &self,
        actor: &Account,
        account_id: Uuid,
        admin: bool,
    ) -> Result<Account> {
        self.require_admin(actor).await?;

        let mut account = self.load(account_id).await?;
        account.admin = admin;
        account.validate()?;

        let account = self.accounts.set_admin(account_id, admin, Utc::now()).await?;
        tracing::info!(
            actor_id = %actor.id,
            account_id = %account.id,
            admin = account.admin,
            "Admin flag updated"
        );
        Ok(account)
    }

    /// Update name, email or profile fields.
    ///
    /// A changed email is held as pending and confirmation instructions go
    /// to it; the current address keeps working until the new one is
    /// confirmed. Asking for the current address again withdraws a pending
    /// change.
    pub async fn update_profile(
        &self,
        actor: &Account,
        account_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Account> {
        if actor.id != account_id {
            self.require_admin(actor).await?;
        }

        let account = self.load(account_id).await?;
        let mut candidate = account.clone();
        let mut changes = ProfileChanges::default();

        if let Some(name) = update.name {
            candidate.name = name.trim().to_string();
            changes.name = Some(candidate.name.clone());
        }
        if let Some(profile) = update.profile {
            candidate.profile = profile.clone();
            changes.profile = Some(profile);
        }
        if let Some(email) = update.email {
            candidate.email = email.trim().to_string();
            if candidate.email_key() != account.email_key() {
                changes.unconfirmed_email = Some(Some(candidate.email.clone()));
            } else if account.unconfirmed_email.is_some() {
                changes.unconfirmed_email = Some(None);
            }
        }
        candidate.validate()?;

        let email_changed = matches!(changes.unconfirmed_email, Some(Some(_)));
        if let Some(Some(email)) = &changes.unconfirmed_email {
            if self.accounts.find_by_email(email).await?.is_some() {
                return Err(Error::Conflict("Email has already been taken".to_string()));
            }
        }

        let account = self
            .accounts
            .update_profile(account_id, &changes, Utc::now())
            .await?;
        tracing::info!(account_id = %account.id, email_changed, "Profile updated");

        if email_changed {
            self.tokens.issue_confirmation(account.id).await?;
        }
        Ok(account)
    }

    /// Replace the password after verifying the current one
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
        confirmation: Option<&str>,
    ) -> Result<Account> {
        let account = self.load(account_id).await?;
        if !self
            .hasher
            .verify_async(current_password, &account.password_hash)
            .await?
        {
            tracing::warn!(
                account_id = %account.id,
                "Password change refused: bad current password"
            );
            return Err(Error::Authentication(AuthFailure::BadCredential));
        }

        let mut errors = ValidationErrors::new();
        policy::check_password(&mut errors, Some(new_password), true);
        policy::check_password_confirmation(&mut errors, Some(new_password), confirmation);
        policy::finish(errors)?;

        let new_hash = self.hasher.hash_async(new_password).await?;
        // Only replace the hash that was just verified
        let account = self
            .accounts
            .update_password(account.id, &account.password_hash, &new_hash, Utc::now())
            .await?
            .ok_or_else(|| {
                Error::Conflict("Password was changed by another request".to_string())
            })?;
        tracing::info!(account_id = %account.id, "Password changed");
        Ok(account)
    }

    pub async fn get(&self, account_id: Uuid) -> Result<Option<Account>> {
        tracing::debug!(account_id = %account_id, "Loading account");
        self.accounts.get(account_id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.accounts.find_by_email(email).await
    }

    /// Count a failed attempt and pick the error to report
    async fn fail_attempt(&self, account: &Account) -> Result<Error> {
        let prepared = self.tokens.prepare()?;
        let updated = self
            .accounts
            .record_failed_attempt(
                account.id,
                self.config.max_failed_attempts,
                &prepared.digest,
                Utc::now(),
            )
            .await?;

        if updated.unlock_token.as_deref() == Some(prepared.digest.as_str()) {
            tracing::warn!(
                account_id = %updated.id,
                failed_attempts = updated.failed_attempts,
                "Account locked after repeated failed sign-ins"
            );
            self.tokens
                .announce(&updated, TokenPurpose::Unlock, &prepared.raw)
                .await;
            return Ok(Error::Authentication(AuthFailure::Locked));
        }

        if updated.is_locked() {
            return Ok(Error::Authentication(AuthFailure::Locked));
        }

        tracing::warn!(
            account_id = %updated.id,
            failed_attempts = updated.failed_attempts,
            "Sign-in refused: bad credential"
        );
        Ok(Error::Authentication(AuthFailure::BadCredential))
    }

    /// The actor's admin flag is read from storage, not from the caller's copy
    async fn require_admin(&self, actor: &Account) -> Result<()> {
        let current = self.accounts.get(actor.id).await?;
        if current.is_some_and(|a| a.admin) {
            Ok(())
        } else {
            tracing::warn!(actor_id = %actor.id, "Refused: actor is not an admin");
            Err(Error::Authorization("Administrator rights required".to_string()))
        }
    }

    async fn load(&self, account_id: Uuid) -> Result<Account> {
        self.accounts
            .get(account_id)
            .await?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))
    }
}
