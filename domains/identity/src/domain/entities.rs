//! Domain entities for the identity domain
//!
//! The [`Account`] row carries the credential, lockout and lifecycle token
//! bookkeeping for one person. Token columns only ever hold SHA-256 digests;
//! raw tokens leave the process inside notifications and are never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidationErrors;

use crate::domain::policy::{self, ValidationResult};

/// Avatar shown when an account has no uploaded image
pub const DEFAULT_AVATAR_PATH: &str = "users/user-avatar-default.svg";

/// Lifecycle token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Confirmation,
    ResetPassword,
    Unlock,
}

impl TokenPurpose {
    /// Column holding the token digest
    pub fn token_column(&self) -> &'static str {
        match self {
            TokenPurpose::Confirmation => "confirmation_token",
            TokenPurpose::ResetPassword => "reset_password_token",
            TokenPurpose::Unlock => "unlock_token",
        }
    }

    /// Column holding the issue timestamp
    pub fn sent_at_column(&self) -> &'static str {
        match self {
            TokenPurpose::Confirmation => "confirmation_sent_at",
            TokenPurpose::ResetPassword => "reset_password_sent_at",
            TokenPurpose::Unlock => "unlock_sent_at",
        }
    }
}

/// What redeeming a token changes on the account.
///
/// Each variant owns a fixed set of columns and the repository writes only
/// those, in the same step that consumes the token.
#[derive(Clone, PartialEq, Eq)]
pub enum Redemption {
    /// Mark the account confirmed and promote any pending email address
    Confirm,
    /// Install a new password hash and lift any lockout
    ResetPassword { password_hash: String },
    /// Lift the lockout
    Unlock,
}

impl Redemption {
    pub fn purpose(&self) -> TokenPurpose {
        match self {
            Redemption::Confirm => TokenPurpose::Confirmation,
            Redemption::ResetPassword { .. } => TokenPurpose::ResetPassword,
            Redemption::Unlock => TokenPurpose::Unlock,
        }
    }
}

impl std::fmt::Debug for Redemption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Redemption::Confirm => write!(f, "Confirm"),
            Redemption::ResetPassword { .. } => write!(f, "ResetPassword {{ .. }}"),
            Redemption::Unlock => write!(f, "Unlock"),
        }
    }
}

impl std::fmt::Display for TokenPurpose {
    #[mutants::skip] // Only used in log fields
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenPurpose::Confirmation => write!(f, "confirmation"),
            TokenPurpose::ResetPassword => write!(f, "reset_password"),
            TokenPurpose::Unlock => write!(f, "unlock"),
        }
    }
}

/// Public profile fields. None of these take part in authentication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccountProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_public: bool,
    pub city: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub github: Option<String>,
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
    pub hosting_institution_id: Option<Uuid>,
    #[serde(default)]
    pub hosting_institution_primary: bool,
    pub image_url: Option<String>,
}

/// Account entity
#[derive(Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    /// Stored with the casing it was registered with
    pub email: String,
    /// New address waiting for confirmation; `email` stays active until then
    pub unconfirmed_email: Option<String>,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub profile: AccountProfile,
    pub admin: bool,
    pub verified: bool,
    pub verification_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub confirmation_token: Option<String>,
    pub confirmation_sent_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>,
    pub reset_password_sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub unlock_token: Option<String>,
    pub unlock_sent_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub sign_in_count: i32,
    pub current_sign_in_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub current_sign_in_ip: Option<String>,
    pub last_sign_in_ip: Option<String>,
    pub remember_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("unconfirmed_email", &self.unconfirmed_email)
            .field("name", &self.name)
            .field("password_hash", &"[REDACTED]")
            .field("admin", &self.admin)
            .field("confirmed_at", &self.confirmed_at)
            .field("confirmation_token", &redacted(&self.confirmation_token))
            .field("reset_password_token", &redacted(&self.reset_password_token))
            .field("unlock_token", &redacted(&self.unlock_token))
            .field("locked_at", &self.locked_at)
            .field("failed_attempts", &self.failed_attempts)
            .field("sign_in_count", &self.sign_in_count)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

fn redacted(token: &Option<String>) -> Option<&'static str> {
    token.as_ref().map(|_| "[REDACTED]")
}

impl Account {
    /// Create a new, unconfirmed account around an already hashed password
    pub fn new(
        email: String,
        name: String,
        password_hash: String,
        profile: AccountProfile,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_string(),
            unconfirmed_email: None,
            name: name.trim().to_string(),
            password_hash,
            profile,
            admin: false,
            verified: false,
            verification_date: None,
            confirmation_token: None,
            confirmation_sent_at: None,
            confirmed_at: None,
            reset_password_token: None,
            reset_password_sent_at: None,
            unlock_token: None,
            unlock_sent_at: None,
            locked_at: None,
            failed_attempts: 0,
            sign_in_count: 0,
            current_sign_in_at: None,
            last_sign_in_at: None,
            current_sign_in_ip: None,
            last_sign_in_ip: None,
            remember_created_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    /// Unconfirmed, or confirmed with a changed address still pending
    pub fn awaiting_confirmation(&self) -> bool {
        !self.is_confirmed() || self.unconfirmed_email.is_some()
    }

    /// Where confirmation instructions go: the pending address when there
    /// is one
    pub fn confirmation_recipient(&self) -> &str {
        self.unconfirmed_email.as_deref().unwrap_or(&self.email)
    }

    /// Case-folded email used for uniqueness
    pub fn email_key(&self) -> String {
        policy::normalize_email(&self.email)
    }

    /// Uploaded image, or the default avatar
    pub fn avatar_url(&self) -> &str {
        self.profile
            .image_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(DEFAULT_AVATAR_PATH)
    }

    /// Stored digest for a token purpose
    pub fn token_digest(&self, purpose: TokenPurpose) -> Option<&str> {
        match purpose {
            TokenPurpose::Confirmation => self.confirmation_token.as_deref(),
            TokenPurpose::ResetPassword => self.reset_password_token.as_deref(),
            TokenPurpose::Unlock => self.unlock_token.as_deref(),
        }
    }

    /// When the token for a purpose was last issued
    pub fn token_sent_at(&self, purpose: TokenPurpose) -> Option<DateTime<Utc>> {
        match purpose {
            TokenPurpose::Confirmation => self.confirmation_sent_at,
            TokenPurpose::ResetPassword => self.reset_password_sent_at,
            TokenPurpose::Unlock => self.unlock_sent_at,
        }
    }

    /// Store a digest and its issue time for a purpose
    pub fn set_token(
        &mut self,
        purpose: TokenPurpose,
        digest: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) {
        match purpose {
            TokenPurpose::Confirmation => {
                self.confirmation_token = digest;
                self.confirmation_sent_at = sent_at;
            }
            TokenPurpose::ResetPassword => {
                self.reset_password_token = digest;
                self.reset_password_sent_at = sent_at;
            }
            TokenPurpose::Unlock => {
                self.unlock_token = digest;
                self.unlock_sent_at = sent_at;
            }
        }
    }

    /// Apply the column changes of a redeemed token. The token itself is
    /// cleared by the caller.
    pub fn apply_redemption(&mut self, redemption: &Redemption, at: DateTime<Utc>) {
        match redemption {
            Redemption::Confirm => {
                if let Some(email) = self.unconfirmed_email.take() {
                    self.email = email;
                }
                self.confirmed_at = Some(at);
                self.verified = true;
                self.verification_date = Some(at);
            }
            Redemption::ResetPassword { password_hash } => {
                self.password_hash = password_hash.clone();
                self.set_token(TokenPurpose::ResetPassword, None, None);
                self.set_token(TokenPurpose::Unlock, None, None);
                self.locked_at = None;
                self.failed_attempts = 0;
            }
            Redemption::Unlock => {
                self.set_token(TokenPurpose::Unlock, None, None);
                self.locked_at = None;
                self.failed_attempts = 0;
            }
        }
        self.updated_at = at;
    }

    /// Re-validate the stored identity fields.
    ///
    /// The hash never carries the plain password, so password rules are
    /// checked by the caller that holds it.
    pub fn validate(&self) -> ValidationResult {
        let mut errors = ValidationErrors::new();
        policy::check_email(&mut errors, &self.email);
        policy::check_name(&mut errors, &self.name);
        policy::finish(errors)
    }
}
