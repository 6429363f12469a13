//! Identity domain: credential policy, accounts, lockout, lifecycle tokens

pub mod domain;
pub mod repository;
pub mod service;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{
    Account, AccountProfile, Redemption, TokenPurpose, DEFAULT_AVATAR_PATH,
};
pub use domain::password::{Argon2Config, PasswordHasher};
pub use domain::policy::{
    normalize_email, validate_credentials, validate_display_name, validate_email,
    validate_password, validate_password_confirmation, ValidationResult,
};
// Re-export repository types
pub use repository::{
    AccountRepository, InMemoryAccountRepository, PgAccountRepository, ProfileChanges,
};
// Re-export services
pub use service::{AccountStore, IssuedToken, ProfileUpdate, RegistrationAttrs, TokenIssuer};
