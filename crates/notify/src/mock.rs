//! Mock Dispatcher Implementation
//!
//! Captures rendered notifications in memory so tests can assert on what
//! the domain core asked to send. Thread-safe via `Arc<Mutex<>>`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{DispatchReceipt, EmailMessage, NotificationDispatcher, NotifyConfig, NotifyError};

/// Notification captured by the mock dispatcher
#[derive(Debug, Clone)]
pub struct CapturedNotification {
    pub message: EmailMessage,
    pub receipt: DispatchReceipt,
    pub captured_at: DateTime<Utc>,
}

impl CapturedNotification {
    /// Template identifier recorded when the message was rendered
    pub fn email_type(&self) -> Option<&str> {
        self.message.metadata.get("email_type").map(String::as_str)
    }

    /// Extract the value of a `name=value` query parameter from the body link
    pub fn link_param(&self, name: &str) -> Option<String> {
        let needle = format!("{}=", name);
        let start = self.message.body_text.find(&needle)? + needle.len();
        let value: String = self.message.body_text[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Delivery behaviour of the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Capture,
    Disabled,
    Failing,
}

/// Mock dispatcher for testing
#[derive(Debug, Clone)]
pub struct MockDispatcher {
    notifications: Arc<Mutex<Vec<CapturedNotification>>>,
    by_recipient: Arc<Mutex<HashMap<String, Vec<CapturedNotification>>>>,
    config: NotifyConfig,
    mode: Mode,
}

impl MockDispatcher {
    /// Create a new capturing mock dispatcher
    pub fn new() -> Self {
        Self::with_config(NotifyConfig::default())
    }

    /// Create a capturing mock dispatcher with an explicit sender/base URL
    pub fn with_config(config: NotifyConfig) -> Self {
        Self {
            notifications: Arc::new(Mutex::new(Vec::new())),
            by_recipient: Arc::new(Mutex::new(HashMap::new())),
            config,
            mode: Mode::Capture,
        }
    }

    /// Create a disabled mock dispatcher that acknowledges but keeps nothing
    pub fn new_disabled() -> Self {
        Self {
            mode: Mode::Disabled,
            ..Self::new()
        }
    }

    /// Create a mock dispatcher whose transport always fails
    pub fn new_failing() -> Self {
        Self {
            mode: Mode::Failing,
            ..Self::new()
        }
    }

    /// Get all captured notifications
    pub fn all(&self) -> Vec<CapturedNotification> {
        self.notifications
            .lock()
            .expect("notifications lock poisoned by a panicking test")
            .clone()
    }

    /// Get notifications sent to a specific recipient
    pub fn for_recipient(&self, email: &str) -> Vec<CapturedNotification> {
        self.by_recipient
            .lock()
            .expect("recipient index lock poisoned by a panicking test")
            .get(email)
            .cloned()
            .unwrap_or_default()
    }

    /// Most recent notification of a template type sent to a recipient
    pub fn latest(&self, email: &str, email_type: &str) -> Option<CapturedNotification> {
        self.for_recipient(email)
            .into_iter()
            .filter(|n| n.email_type() == Some(email_type))
            .max_by_key(|n| n.captured_at)
    }

    /// Get count of captured notifications
    pub fn count(&self) -> usize {
        self.notifications
            .lock()
            .expect("notifications lock poisoned by a panicking test")
            .len()
    }

    /// Clear all captured notifications
    pub fn clear(&self) {
        self.notifications
            .lock()
            .expect("notifications lock poisoned by a panicking test")
            .clear();
        self.by_recipient
            .lock()
            .expect("recipient index lock poisoned by a panicking test")
            .clear();
    }
}

impl Default for MockDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for MockDispatcher {
    async fn deliver(&self, message: EmailMessage) -> Result<DispatchReceipt, NotifyError> {
        match self.mode {
            Mode::Disabled => {
                tracing::warn!("Mock dispatcher disabled, skipping delivery");
                return Ok(DispatchReceipt {
                    message_id: format!("disabled-{}", Uuid::new_v4()),
                    dispatched_at: Utc::now(),
                    provider: "mock-disabled".to_string(),
                });
            }
            Mode::Failing => {
                return Err(NotifyError::Delivery(
                    "mock transport configured to fail".to_string(),
                ));
            }
            Mode::Capture => {}
        }

        tracing::debug!(
            to = %message.to,
            subject = %message.subject,
            "Mock dispatcher capturing notification"
        );

        let receipt = DispatchReceipt {
            message_id: format!("mock-{}", Uuid::new_v4()),
            dispatched_at: Utc::now(),
            provider: "mock".to_string(),
        };

        let captured = CapturedNotification {
            message: message.clone(),
            receipt: receipt.clone(),
            captured_at: Utc::now(),
        };

        self.notifications
            .lock()
            .map_err(|e| NotifyError::Delivery(format!("notifications lock poisoned: {e}")))?
            .push(captured.clone());

        self.by_recipient
            .lock()
            .map_err(|e| NotifyError::Delivery(format!("recipient index lock poisoned: {e}")))?
            .entry(message.to)
            .or_default()
            .push(captured);

        Ok(receipt)
    }

    fn sender(&self) -> &str {
        &self.config.sender
    }

    fn app_base_url(&self) -> &str {
        &self.config.app_base_url
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
