//! Log-only dispatcher
//!
//! Renders every notification and records it through `tracing` instead of
//! handing it to a mail transport. Used wherever delivery is owned by
//! another system (or not wired up at all).

use chrono::Utc;
use uuid::Uuid;

use crate::{DispatchReceipt, EmailMessage, NotificationDispatcher, NotifyConfig, NotifyError};

#[derive(Debug, Clone)]
pub struct LogDispatcher {
    config: NotifyConfig,
}

impl LogDispatcher {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn deliver(&self, message: EmailMessage) -> Result<DispatchReceipt, NotifyError> {
        let message_id = format!("log-{}", Uuid::new_v4());

        let email_type = message
            .metadata
            .get("email_type")
            .map(String::as_str)
            .unwrap_or("unknown");
        tracing::info!(
            message_id = %message_id,
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            email_type,
            "Notification rendered"
        );

        Ok(DispatchReceipt {
            message_id,
            dispatched_at: Utc::now(),
            provider: "log".to_string(),
        })
    }

    fn sender(&self) -> &str {
        &self.config.sender
    }

    fn app_base_url(&self) -> &str {
        &self.config.app_base_url
    }

    fn provider_name(&self) -> &'static str {
        "log"
    }
}
