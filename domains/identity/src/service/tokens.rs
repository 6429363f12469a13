//! Session/token issuer
//!
//! Issues and redeems the three lifecycle tokens (confirmation, password
//! reset, unlock). A raw token exists only in the returned [`IssuedToken`]
//! and the notification carrying it; storage sees the digest. Redemption
//! clears the stored digest in one atomic step, so each token works once.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crowd_common::config::IdentityConfig;
use crowd_common::{generate_token, token_digest, Error, Result, TokenRejection};
use crowd_notify::{NotificationDispatcher, NotificationKind, NotificationRequest};
use uuid::Uuid;
use validator::ValidationErrors;

use crate::domain::entities::{Account, Redemption, TokenPurpose};
use crate::domain::password::PasswordHasher;
use crate::domain::policy;
use crate::repository::AccountRepository;

/// A freshly issued token. `token` is the only copy of the raw value.
#[derive(Clone)]
pub struct IssuedToken {
    pub account_id: Uuid,
    pub purpose: TokenPurpose,
    pub token: String,
    pub sent_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("account_id", &self.account_id)
            .field("purpose", &self.purpose)
            .field("token", &"[REDACTED]")
            .field("sent_at", &self.sent_at)
            .finish()
    }
}

/// Raw token paired with the digest that gets stored
pub(crate) struct PreparedToken {
    pub raw: String,
    pub digest: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    accounts: Arc<dyn AccountRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    hasher: PasswordHasher,
    config: IdentityConfig,
}

impl TokenIssuer {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        hasher: PasswordHasher,
        config: IdentityConfig,
    ) -> Self {
        Self {
            accounts,
            dispatcher,
            hasher,
            config,
        }
    }

    /// Issue a confirmation token for an unconfirmed account or a pending
    /// email change
    pub async fn issue_confirmation(&self, account_id: Uuid) -> Result<IssuedToken> {
        let account = self.load(account_id).await?;
        if !account.awaiting_confirmation() {
            return Err(Error::Conflict(
                "Email was already confirmed, please try signing in".to_string(),
            ));
        }
        self.issue(&account, TokenPurpose::Confirmation).await
    }

    /// Redeem a confirmation token. A pending email change becomes the
    /// account's address, unless another account has taken it meanwhile.
    pub async fn confirm(&self, token: &str) -> Result<Account> {
        let account = self.redeem(Redemption::Confirm, token).await?;
        tracing::info!(account_id = %account.id, "Account confirmed");
        Ok(account)
    }

    /// Issue a password reset token
    pub async fn issue_reset(&self, account_id: Uuid) -> Result<IssuedToken> {
        let account = self.load(account_id).await?;
        self.issue(&account, TokenPurpose::ResetPassword).await
    }

    /// Issue a password reset token for the account registered under `email`
    pub async fn issue_reset_for_email(&self, email: &str) -> Result<IssuedToken> {
        let account = self
            .accounts
            .find_by_email(email)
            .await?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))?;
        self.issue(&account, TokenPurpose::ResetPassword).await
    }

    /// Redeem a reset token and replace the password.
    ///
    /// The new password is validated first; an invalid password leaves the
    /// token redeemable. A successful reset also lifts any lockout.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirmation: Option<&str>,
    ) -> Result<Account> {
        let mut errors = ValidationErrors::new();
        policy::check_password(&mut errors, Some(new_password), true);
        policy::check_password_confirmation(&mut errors, Some(new_password), confirmation);
        policy::finish(errors)?;

        let password_hash = self.hasher.hash_async(new_password).await?;
        let account = self
            .redeem(Redemption::ResetPassword { password_hash }, token)
            .await?;
        tracing::info!(account_id = %account.id, "Password reset");
        Ok(account)
    }

    /// Issue a fresh unlock token for a locked account
    pub async fn issue_unlock(&self, account_id: Uuid) -> Result<IssuedToken> {
        let account = self.load(account_id).await?;
        if !account.is_locked() {
            return Err(Error::Conflict("Account was not locked".to_string()));
        }
        self.issue(&account, TokenPurpose::Unlock).await
    }

    /// Redeem an unlock token
    pub async fn unlock(&self, token: &str) -> Result<Account> {
        let account = self.redeem(Redemption::Unlock, token).await?;
        tracing::info!(account_id = %account.id, "Account unlocked");
        Ok(account)
    }

    pub(crate) fn prepare(&self) -> Result<PreparedToken> {
        let raw = generate_token()?;
        let digest = token_digest(&raw);
        Ok(PreparedToken { raw, digest })
    }

    /// Send the instructions carrying a raw token. Delivery problems are
    /// logged; the stored token stays valid either way.
    pub(crate) async fn announce(&self, account: &Account, purpose: TokenPurpose, raw: &str) {
        let token = raw.to_string();
        let kind = match purpose {
            TokenPurpose::Confirmation => NotificationKind::ConfirmationInstructions { token },
            TokenPurpose::ResetPassword => NotificationKind::ResetPasswordInstructions { token },
            TokenPurpose::Unlock => NotificationKind::UnlockInstructions { token },
        };

        let recipient = match purpose {
            TokenPurpose::Confirmation => account.confirmation_recipient(),
            _ => account.email.as_str(),
        };

        if let Err(e) = self
            .dispatcher
            .dispatch(NotificationRequest::new(recipient.to_string(), kind))
            .await
        {
            tracing::warn!(
                error = %e,
                account_id = %account.id,
                purpose = %purpose,
                "Failed to dispatch token instructions"
            );
        }
    }

    async fn issue(&self, account: &Account, purpose: TokenPurpose) -> Result<IssuedToken> {
        let prepared = self.prepare()?;
        let sent_at = Utc::now();

        let account = self
            .accounts
            .store_token(account.id, purpose, &prepared.digest, sent_at)
            .await?;
        tracing::info!(account_id = %account.id, purpose = %purpose, "Token issued");

        self.announce(&account, purpose, &prepared.raw).await;

        Ok(IssuedToken {
            account_id: account.id,
            purpose,
            token: prepared.raw,
            sent_at,
        })
    }

    /// Redeem a token inside its window, applying the redemption in the
    /// same write.
    ///
    /// A token that is stored but too old is consumed anyway, so it cannot
    /// be retried.
    async fn redeem(&self, redemption: Redemption, token: &str) -> Result<Account> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidToken(TokenRejection::Invalid));
        }

        let purpose = redemption.purpose();
        let digest = token_digest(token);
        let now = Utc::now();
        // A window reaching past the representable range never closes
        let issued_after = self
            .window(purpose)
            .and_then(|window| now.checked_sub_signed(window));

        if let Some(account) = self
            .accounts
            .redeem_token(&redemption, &digest, issued_after, now)
            .await?
        {
            return Ok(account);
        }

        match self.accounts.take_token(purpose, &digest).await? {
            Some(account) => {
                tracing::warn!(
                    account_id = %account.id,
                    purpose = %purpose,
                    "Expired token presented"
                );
                Err(Error::InvalidToken(TokenRejection::Expired))
            }
            None => Err(Error::InvalidToken(TokenRejection::Invalid)),
        }
    }

    fn window(&self, purpose: TokenPurpose) -> Option<Duration> {
        match purpose {
            TokenPurpose::Confirmation => Some(self.config.confirm_within),
            TokenPurpose::ResetPassword => Some(self.config.reset_password_within),
            TokenPurpose::Unlock => self.config.unlock_within,
        }
    }

    async fn load(&self, account_id: Uuid) -> Result<Account> {
        self.accounts
            .get(account_id)
            .await?
            .ok_or_else(|| Error::NotFound("Account not found".to_string()))
    }
}
