//! Crowd Notification Dispatcher
//!
//! The identity and team domains never deliver mail themselves. They hand a
//! structured [`NotificationRequest`] to a [`NotificationDispatcher`], which
//! renders it into an [`EmailMessage`] and passes it on:
//! - [`mock::MockDispatcher`] captures rendered messages for tests
//! - [`log::LogDispatcher`] renders and logs, for environments without a transport

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod content;
pub mod log;
pub mod mock;
pub mod templates;

/// Sender address used for every outbound notification unless overridden
pub const DEFAULT_SENDER: &str = "no-reply@aicrowd.com";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification configuration error: {0}")]
    Configuration(String),

    #[error("Notification validation error: {0}")]
    Validation(String),

    #[error("Notification delivery error: {0}")]
    Delivery(String),
}

/// What is being announced, with the fields its template needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// An invitee joined the team; sent to the invitor
    InvitationAccepted {
        team_name: String,
        invitee_name: String,
        invitee_email: String,
    },
    /// Proof-of-ownership link for a freshly registered address
    ConfirmationInstructions { token: String },
    /// Password reset link
    ResetPasswordInstructions { token: String },
    /// Unlock link for an account locked after repeated failed sign-ins
    UnlockInstructions { token: String },
}

impl NotificationKind {
    /// Stable template identifier, also recorded as `email_type` metadata
    pub fn template_name(&self) -> &'static str {
        match self {
            NotificationKind::InvitationAccepted { .. } => "invitation_accepted",
            NotificationKind::ConfirmationInstructions { .. } => "confirmation_instructions",
            NotificationKind::ResetPasswordInstructions { .. } => "reset_password_instructions",
            NotificationKind::UnlockInstructions { .. } => "unlock_instructions",
        }
    }
}

/// Structured request handed from the domain core to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub recipient_email: String,
    #[serde(flatten)]
    pub kind: NotificationKind,
}

impl NotificationRequest {
    pub fn new(recipient_email: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            recipient_email: recipient_email.into(),
            kind,
        }
    }

    pub fn invitation_accepted(
        invitor_email: impl Into<String>,
        team_name: impl Into<String>,
        invitee_name: impl Into<String>,
        invitee_email: impl Into<String>,
    ) -> Self {
        Self::new(
            invitor_email,
            NotificationKind::InvitationAccepted {
                team_name: team_name.into(),
                invitee_name: invitee_name.into(),
                invitee_email: invitee_email.into(),
            },
        )
    }
}

/// Rendered email ready for a transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl EmailMessage {
    /// Create a new email message
    pub fn new(to: String, from: String, subject: String, body_text: String) -> Self {
        Self {
            to,
            from,
            subject,
            body_text,
            body_html: None,
            metadata: HashMap::new(),
        }
    }

    /// Add HTML body content
    pub fn with_html(mut self, body_html: String) -> Self {
        self.body_html = Some(body_html);
        self
    }

    /// Add metadata for tracking
    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Acknowledgement returned by a dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub message_id: String,
    pub dispatched_at: DateTime<Utc>,
    pub provider: String,
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Dispatcher implementation (log, mock)
    pub provider: String,
    /// Sender address
    pub sender: String,
    /// Disable to swallow every notification
    pub enabled: bool,
    /// Base URL for links embedded in notifications
    pub app_base_url: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: "log".to_string(),
            sender: DEFAULT_SENDER.to_string(),
            enabled: true,
            app_base_url: "https://www.aicrowd.com".to_string(),
        }
    }
}

impl NotifyConfig {
    /// Create dispatcher config from environment variables
    pub fn from_env() -> Result<Self, NotifyError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let enabled = match std::env::var("NOTIFY_ENABLED") {
            Ok(raw) => raw.parse().map_err(|_| {
                NotifyError::Configuration(format!("NOTIFY_ENABLED must be true or false: {}", raw))
            })?,
            Err(_) => defaults.enabled,
        };

        Ok(Self {
            provider: std::env::var("NOTIFY_PROVIDER").unwrap_or(defaults.provider),
            sender: std::env::var("MAILER_SENDER").unwrap_or(defaults.sender),
            enabled,
            app_base_url: std::env::var("APP_BASE_URL").unwrap_or(defaults.app_base_url),
        })
    }
}

/// Dispatcher seam between the domain core and whatever delivers mail
#[async_trait::async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Hand a rendered message to the underlying transport
    async fn deliver(&self, message: EmailMessage) -> Result<DispatchReceipt, NotifyError>;

    /// Sender address for outgoing notifications
    fn sender(&self) -> &str;

    /// Application base URL for building links
    fn app_base_url(&self) -> &str;

    fn provider_name(&self) -> &'static str;

    /// Render and deliver a notification request
    async fn dispatch(&self, request: NotificationRequest) -> Result<DispatchReceipt, NotifyError> {
        let message = templates::render(&request, self.sender(), self.app_base_url())?;
        self.deliver(message).await
    }
}

/// Dispatcher factory
pub struct DispatcherFactory;

impl DispatcherFactory {
    /// Create a dispatcher based on configuration
    pub fn create(config: NotifyConfig) -> Result<Box<dyn NotificationDispatcher>, NotifyError> {
        if !config.enabled {
            tracing::info!("Notifications disabled, using disabled mock dispatcher");
            return Ok(Box::new(mock::MockDispatcher::new_disabled()));
        }

        match config.provider.as_str() {
            "log" => {
                tracing::info!("Creating log dispatcher");
                Ok(Box::new(log::LogDispatcher::new(config)))
            }
            "mock" => {
                tracing::info!("Creating mock dispatcher");
                Ok(Box::new(mock::MockDispatcher::with_config(config)))
            }
            provider => Err(NotifyError::Configuration(format!(
                "Unknown notification provider: {}. Supported providers: log, mock",
                provider
            ))),
        }
    }
}
