//! In-memory account repository
//!
//! A single mutex guards both the rows and the email index so every
//! conditional write observes and changes them together.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowd_common::{constant_time_eq, Error, RepositoryError, Result};
use uuid::Uuid;

use super::{AccountRepository, ProfileChanges};
use crate::domain::entities::{Account, Redemption, TokenPurpose};
use crate::domain::policy::normalize_email;

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    by_email: HashMap<String, Uuid>,
}

impl State {
    fn find_token(&self, purpose: TokenPurpose, digest: &str) -> Option<Uuid> {
        self.accounts
            .values()
            .find(|a| {
                a.token_digest(purpose)
                    .is_some_and(|stored| constant_time_eq(stored.as_bytes(), digest.as_bytes()))
            })
            .map(|a| a.id)
    }

    /// Write a row back, moving its email index entry when the address changed
    fn store(&mut self, account: Account) -> Result<Account> {
        let previous_key = self
            .accounts
            .get(&account.id)
            .map(Account::email_key)
            .ok_or(RepositoryError::NotFound)?;

        let key = account.email_key();
        if key != previous_key {
            if self.by_email.contains_key(&key) {
                return Err(Error::Conflict("Email has already been taken".to_string()));
            }
            self.by_email.remove(&previous_key);
            self.by_email.insert(key, account.id);
        }

        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }
}

#[derive(Default)]
pub struct InMemoryAccountRepository {
    state: Mutex<State>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::Internal(format!("account store lock poisoned: {}", e)))
    }

    /// Overwrite a stored row wholesale. Used to seed fixtures; request
    /// paths go through the column-scoped trait methods.
    pub fn replace(&self, account: &Account) -> Result<Account> {
        self.lock()?.store(account.clone())
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn insert(&self, account: &Account) -> Result<Account> {
        let mut state = self.lock()?;
        let key = account.email_key();

        if state.by_email.contains_key(&key) {
            return Err(Error::Conflict("Email has already been taken".to_string()));
        }
        if state.accounts.contains_key(&account.id) {
            return Err(RepositoryError::AlreadyExists.into());
        }

        state.by_email.insert(key, account.id);
        state.accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let state = self.lock()?;
        Ok(state
            .by_email
            .get(&normalize_email(email))
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn find_by_token(&self, purpose: TokenPurpose, digest: &str) -> Result<Option<Account>> {
        let state = self.lock()?;
        Ok(state
            .find_token(purpose, digest)
            .and_then(|id| state.accounts.get(&id))
            .cloned())
    }

    async fn store_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        digest: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Account> {
        let mut state = self.lock()?;
        let account = state.accounts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        account.set_token(purpose, Some(digest.to_string()), Some(sent_at));
        account.updated_at = sent_at;
        Ok(account.clone())
    }

    async fn take_token(&self, purpose: TokenPurpose, digest: &str) -> Result<Option<Account>> {
        let mut state = self.lock()?;
        let Some(id) = state.find_token(purpose, digest) else {
            return Ok(None);
        };

        let account = state.accounts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let sent_at = account.token_sent_at(purpose);
        account.set_token(purpose, None, sent_at);
        Ok(Some(account.clone()))
    }

    async fn redeem_token(
        &self,
        redemption: &Redemption,
        digest: &str,
        issued_after: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let purpose = redemption.purpose();
        let mut state = self.lock()?;
        let Some(id) = state.find_token(purpose, digest) else {
            return Ok(None);
        };

        let mut account = state.accounts.get(&id).cloned().ok_or(RepositoryError::NotFound)?;
        let sent_at = account.token_sent_at(purpose);
        if let Some(cutoff) = issued_after {
            if !sent_at.is_some_and(|sent_at| sent_at >= cutoff) {
                return Ok(None);
            }
        }

        account.set_token(purpose, None, sent_at);
        account.apply_redemption(redemption, at);
        state.store(account).map(Some)
    }

    async fn set_admin(&self, id: Uuid, admin: bool, at: DateTime<Utc>) -> Result<Account> {
        let mut state = self.lock()?;
        let account = state.accounts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        account.admin = admin;
        account.updated_at = at;
        Ok(account.clone())
    }

    async fn update_password(
        &self,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let mut state = self.lock()?;
        let account = state.accounts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if account.password_hash != expected_hash {
            return Ok(None);
        }

        account.password_hash = new_hash.to_string();
        account.set_token(TokenPurpose::ResetPassword, None, None);
        account.updated_at = at;
        Ok(Some(account.clone()))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        at: DateTime<Utc>,
    ) -> Result<Account> {
        let mut state = self.lock()?;
        let account = state.accounts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = &changes.name {
            account.name = name.clone();
        }
        if let Some(profile) = &changes.profile {
            account.profile = profile.clone();
        }
        if let Some(pending) = &changes.unconfirmed_email {
            account.unconfirmed_email = pending.clone();
        }
        account.updated_at = at;
        Ok(account.clone())
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
        unlock_digest: &str,
        at: DateTime<Utc>,
    ) -> Result<Account> {
        let mut state = self.lock()?;
        let account = state.accounts.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        let reaches_limit =
            account.locked_at.is_none() && account.failed_attempts + 1 >= max_attempts;
        account.failed_attempts += 1;
        if reaches_limit {
            account.locked_at = Some(at);
            account.set_token(TokenPurpose::Unlock, Some(unlock_digest.to_string()), Some(at));
        }
        account.updated_at = at;
        Ok(account.clone())
    }

    async fn record_sign_in(
        &self,
        id: Uuid,
        ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let mut state = self.lock()?;
        let Some(account) = state.accounts.get_mut(&id) else {
            return Ok(None);
        };
        if account.is_locked() {
            return Ok(None);
        }

        account.failed_attempts = 0;
        account.sign_in_count += 1;
        account.last_sign_in_at = account.current_sign_in_at.or(Some(at));
        account.current_sign_in_at = Some(at);
        account.last_sign_in_ip = account.current_sign_in_ip.take().or_else(|| ip.clone());
        account.current_sign_in_ip = ip;
        account.updated_at = at;
        Ok(Some(account.clone()))
    }
}
