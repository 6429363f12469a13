//! Publication link entity

use chrono::{DateTime, Utc};
use crowd_common::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicationExternalLink {
    pub id: Uuid,
    pub link: String,
    pub publication_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublicationExternalLink {
    /// Create a link; the link text is required
    pub fn new(publication_id: Uuid, link: &str) -> Result<Self> {
        let link = link.trim();
        if link.is_empty() {
            let mut error = ValidationError::new("blank");
            error.message = Some("Link can't be blank".into());
            let mut errors = ValidationErrors::new();
            errors.add("link", error);
            return Err(Error::Validation(errors));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            link: link.to_string(),
            publication_id,
            created_at: now,
            updated_at: now,
        })
    }
}
