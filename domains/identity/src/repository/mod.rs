//! Repository implementations for the identity domain

pub mod memory;
pub mod postgres;

#[cfg(test)]
pub(crate) mod gated;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowd_common::Result;
use uuid::Uuid;

use crate::domain::entities::{Account, AccountProfile, Redemption, TokenPurpose};

pub use memory::InMemoryAccountRepository;
pub use postgres::PgAccountRepository;

/// Column-scoped profile write. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub profile: Option<AccountProfile>,
    /// `Some(Some(_))` sets the pending address, `Some(None)` withdraws it
    pub unconfirmed_email: Option<Option<String>>,
}

/// Persistence for accounts.
///
/// Email uniqueness is case-insensitive and enforced by the store itself, so
/// two concurrent registrations of the same address cannot both succeed.
/// Every write is a single atomic step that touches only the columns it
/// names; nothing writes back a whole row read earlier.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account; `Conflict` when the email is taken
    async fn insert(&self, account: &Account) -> Result<Account>;

    async fn get(&self, id: Uuid) -> Result<Option<Account>>;

    /// Case-insensitive lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_by_token(&self, purpose: TokenPurpose, digest: &str) -> Result<Option<Account>>;

    /// Store a token digest and its issue time
    async fn store_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        digest: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Account>;

    /// Clear a token matching `digest` and return the account as it was
    /// updated. At most one caller ever receives `Some` for a given digest.
    async fn take_token(&self, purpose: TokenPurpose, digest: &str) -> Result<Option<Account>>;

    /// Consume a token issued at or after `issued_after` and apply the
    /// redemption's column changes in the same write. `None` when no such
    /// token is stored. Promoting a pending email that another account has
    /// taken in the meantime fails with `Conflict` and changes nothing.
    async fn redeem_token(
        &self,
        redemption: &Redemption,
        digest: &str,
        issued_after: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>>;

    async fn set_admin(&self, id: Uuid, admin: bool, at: DateTime<Utc>) -> Result<Account>;

    /// Replace the password hash if it is still `expected_hash`, clearing
    /// any reset token. `None` when the hash changed in the meantime.
    async fn update_password(
        &self,
        id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>>;

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
        at: DateTime<Utc>,
    ) -> Result<Account>;

    /// Count a failed sign-in. The attempt that reaches `max_attempts` on an
    /// unlocked account also sets `locked_at` and stores `unlock_digest`.
    async fn record_failed_attempt(
        &self,
        id: Uuid,
        max_attempts: i32,
        unlock_digest: &str,
        at: DateTime<Utc>,
    ) -> Result<Account>;

    /// Record a successful sign-in unless the account is locked.
    /// Returns `None` when it is locked (or gone).
    async fn record_sign_in(
        &self,
        id: Uuid,
        ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Account>>;
}
