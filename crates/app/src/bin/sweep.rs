//! Expire every pending team invitation whose deadline has passed
//!
//! Intended to run on a schedule. Lazy expiry on accept/decline covers the
//! gap between runs.

use chrono::Utc;
use crowd_app::CrowdApp;
use crowd_common::config::{Config, IdentityConfig};
use crowd_notify::NotifyConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    let filter = EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.json_logs() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    }

    let Some(database_url) = config.database_url.as_deref() else {
        error!("DATABASE_URL must be set to sweep invitations");
        anyhow::bail!("DATABASE_URL not set");
    };

    let app = CrowdApp::connect(
        database_url,
        IdentityConfig::from_env()?,
        NotifyConfig::from_env()?,
    )
    .await?;

    let expired = app.invitations.expire_overdue(Utc::now()).await.map_err(|e| {
        error!(error = %e, "Invitation sweep failed");
        anyhow::anyhow!("Invitation sweep failed: {}", e)
    })?;

    info!(count = expired.len(), "Expired overdue invitations");
    Ok(())
}
