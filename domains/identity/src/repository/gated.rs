//! Account repository wrapper that can hold one call at a gate, so a test
//! can run a competing request while the held one waits

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowd_common::Result;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{AccountRepository, InMemoryAccountRepository, ProfileChanges};
use crate::domain::entities::{Account, Redemption, TokenPurpose};

pub(crate) struct GatedAccountRepository {
    inner: Arc<InMemoryAccountRepository>,
    armed: Mutex<Option<&'static str>>,
    reached: Notify,
    released: Notify,
}

impl GatedAccountRepository {
    pub fn new(inner: Arc<InMemoryAccountRepository>) -> Self {
        Self {
            inner,
            armed: Mutex::new(None),
            reached: Notify::new(),
            released: Notify::new(),
        }
    }

    /// Hold the next call to `method` until [`release`](Self::release)
    pub fn arm(&self, method: &'static str) {
        *self.armed.lock().unwrap() = Some(method);
    }

    /// Wait until the armed call is being held
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    async fn gate(&self, method: &'static str) {
        let hit = {
            let mut armed = self.armed.lock().unwrap();
            if *armed == Some(method) {
                *armed = None;
                true
            } else {
                false
            }
        };
        if hit {
            self.reached.notify_one();
            self.released.notified().await;
        }
    }
}

#[async_trait]
impl AccountRepository for GatedAccountRepository {
    async fn insert(&self, account: &Account) -> Result<Account> {
        self.gate("insert").await;
        self.inner.insert(account).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>> {
        self.inner.get(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_token(&self, purpose: TokenPurpose, digest: &str) -> Result<Option<Account>> {
        self.inner.find_by_token(purpose, digest).await
    }

    async fn store_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        digest: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Account> {
        self.gate("store_token").await;
        self.inner.store_token(id, purpose, digest, sent_at).await
    }

    async fn take_token(&self, purpose: TokenPurpose, digest: &str) -> Result<Option<Account>> {
        self.gate("take_token").await;
        self.inner.take_token(purpose, digest).await
    }

    async fn redeem_token(
        &self,
        redemption: &Redemption,
        digest: &str,
        issued_after: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        self.gate("redeem_token").await;
        self.inner
            .redeem_token(redemption, digest, issued_after, at)
            .await
    }

    async fn set_admin(&self, id: Uuid, admin: bool, at: DateTime<Utc>) -> Result<Account> {
        self.gate("set_admin").await;
        self.inner.set_admin(id, admin, at).await
    }

    async fn update_password(
        &self,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        self.gate("update_password").await;
        self.inner
            .update_password(id, expected_hash, new_hash, at)
            .await
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        at: DateTime<Utc>,
    ) -> Result<Account> {
        self.gate("update_profile").await;
        self.inner.update_profile(id, changes, at).await
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
        unlock_digest: &str,
        at: DateTime<Utc>,
    ) -> Result<Account> {
        self.gate("record_failed_attempt").await;
        self.inner
            .record_failed_attempt(id, max_attempts, unlock_digest, at)
            .await
    }

    async fn record_sign_in(
        &self,
        id: Uuid,
        ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        self.gate("record_sign_in").await;
        self.inner.record_sign_in(id, ip, at).await
    }
}
