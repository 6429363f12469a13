//! Publications domain: external links attached to a publication
//!
//! Pure storage. A link belongs to exactly one publication and carries no
//! lifecycle of its own.

pub mod entities;
pub mod repository;

pub use entities::PublicationExternalLink;
pub use repository::{
    InMemoryPublicationLinkRepository, PgPublicationLinkRepository, PublicationLinkRepository,
};
