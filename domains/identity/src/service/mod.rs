//! Identity services

pub mod accounts;
pub mod tokens;

pub use accounts::{AccountStore, ProfileUpdate, RegistrationAttrs};
pub use tokens::{IssuedToken, TokenIssuer};
