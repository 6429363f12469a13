//! Shared fixtures for the integration tests
//!
//! Builds an in-memory [`CrowdApp`] around a [`MockDispatcher`] so tests can
//! read the links out of captured mail the same way a user would.

#![allow(dead_code)]

use std::env;
use std::sync::{Arc, Once};

use crowd_app::CrowdApp;
use crowd_common::config::IdentityConfig;
use crowd_identity::{Account, Argon2Config, RegistrationAttrs};
use crowd_notify::mock::MockDispatcher;

static INIT: Once = Once::new();

pub const PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub app: CrowdApp,
    pub mailer: MockDispatcher,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(IdentityConfig::default())
    }

    pub fn with_config(identity: IdentityConfig) -> Self {
        let mailer = MockDispatcher::new();
        let app =
            CrowdApp::in_memory_with(identity, Arc::new(mailer.clone()), Argon2Config::fast());
        Self { app, mailer }
    }

    /// Sign up without confirming
    pub async fn sign_up(&self, email: &str, name: &str) -> Account {
        let (account, _) = self
            .app
            .sign_up(RegistrationAttrs {
                email: email.to_string(),
                name: name.to_string(),
                password: PASSWORD.to_string(),
                password_confirmation: Some(PASSWORD.to_string()),
                ..RegistrationAttrs::default()
            })
            .await
            .expect("sign up");
        account
    }

    /// Sign up and follow the link from the confirmation mail
    pub async fn confirmed(&self, email: &str, name: &str) -> Account {
        self.sign_up(email, name).await;
        let token = self
            .mail_token(email, "confirmation_instructions", "confirmation_token")
            .expect("confirmation mail");
        self.app.tokens.confirm(&token).await.expect("confirm")
    }

    /// Token carried by the latest mail of `email_type` to `email`
    pub fn mail_token(&self, email: &str, email_type: &str, param: &str) -> Option<String> {
        self.mailer.latest(email, email_type)?.link_param(param)
    }
}

/// Postgres URL for store tests, if one is configured
pub fn database_url() -> Option<String> {
    INIT.call_once(|| {
        dotenvy::from_filename(".env.test").ok();
        dotenvy::dotenv().ok();
    });

    env::var("TEST_DATABASE_URL").ok().filter(|url| !url.is_empty())
}
