//! Publication link repositories

use std::sync::Mutex;

use async_trait::async_trait;
use crowd_common::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::PublicationExternalLink;

#[async_trait]
pub trait PublicationLinkRepository: Send + Sync {
    async fn create(&self, link: &PublicationExternalLink) -> Result<PublicationExternalLink>;

    /// Oldest first
    async fn list_for_publication(
        &self,
        publication_id: Uuid,
    ) -> Result<Vec<PublicationExternalLink>>;
}

#[derive(Default)]
pub struct InMemoryPublicationLinkRepository {
    links: Mutex<Vec<PublicationExternalLink>>,
}

impl InMemoryPublicationLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublicationLinkRepository for InMemoryPublicationLinkRepository {
    async fn create(&self, link: &PublicationExternalLink) -> Result<PublicationExternalLink> {
        self.links
            .lock()
            .map_err(|e| Error::Internal(format!("link store lock poisoned: {}", e)))?
            .push(link.clone());
        tracing::info!(
            link_id = %link.id,
            publication_id = %link.publication_id,
            "Publication link created"
        );
        Ok(link.clone())
    }

    async fn list_for_publication(
        &self,
        publication_id: Uuid,
    ) -> Result<Vec<PublicationExternalLink>> {
        let mut links: Vec<PublicationExternalLink> = self
            .links
            .lock()
            .map_err(|e| Error::Internal(format!("link store lock poisoned: {}", e)))?
            .iter()
            .filter(|l| l.publication_id == publication_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.created_at);
        Ok(links)
    }
}

#[derive(Clone)]
pub struct PgPublicationLinkRepository {
    pool: PgPool,
}

impl PgPublicationLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PublicationLinkRepository for PgPublicationLinkRepository {
    async fn create(&self, link: &PublicationExternalLink) -> Result<PublicationExternalLink> {
        let created = sqlx::query_as::<_, PublicationExternalLink>(
            r#"
            INSERT INTO publication_external_links
                (id, link, publication_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, link, publication_id, created_at, updated_at
            "#,
        )
        .bind(link.id)
        .bind(&link.link)
        .bind(link.publication_id)
        .bind(link.created_at)
        .bind(link.updated_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            link_id = %created.id,
            publication_id = %created.publication_id,
            "Publication link created"
        );
        Ok(created)
    }

    async fn list_for_publication(
        &self,
        publication_id: Uuid,
    ) -> Result<Vec<PublicationExternalLink>> {
        let rows = sqlx::query_as::<_, PublicationExternalLink>(
            r#"
            SELECT id, link, publication_id, created_at, updated_at
            FROM publication_external_links
            WHERE publication_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(publication_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
