//! Account lifecycle integration tests
//!
//! Drives sign-up, confirmation, sign-in, lockout and password reset through
//! the composed application, reading tokens out of captured mail.

mod common;

use std::net::{IpAddr, Ipv4Addr};

use chrono::{Duration, Utc};
use crowd_common::config::IdentityConfig;
use crowd_common::{AuthFailure, Error, TokenRejection};
use crowd_identity::{ProfileUpdate, RegistrationAttrs};
use test_log::test;

use common::{TestApp, PASSWORD};

const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

#[test(tokio::test)]
async fn test_sign_up_confirm_and_sign_in() {
    let t = TestApp::new();
    let account = t.sign_up("ada@example.com", "Ada").await;
    assert!(!account.is_confirmed());

    let refused = t.app.accounts.authenticate("ada@example.com", PASSWORD, Some(IP)).await;
    assert!(matches!(
        refused,
        Err(Error::Authentication(AuthFailure::Unconfirmed))
    ));

    let mail = t
        .mailer
        .latest("ada@example.com", "confirmation_instructions")
        .expect("confirmation mail");
    assert_eq!(mail.message.from, "no-reply@aicrowd.com");
    assert_eq!(mail.message.subject, "Confirmation instructions");

    let token = mail.link_param("confirmation_token").expect("token in link");
    let confirmed = t.app.tokens.confirm(&token).await.unwrap();
    assert!(confirmed.is_confirmed());
    assert!(confirmed.verified);

    let signed_in = t
        .app
        .accounts
        .authenticate("ADA@example.com", PASSWORD, Some(IP))
        .await
        .unwrap();
    assert_eq!(signed_in.sign_in_count, 1);
    assert_eq!(signed_in.current_sign_in_ip.as_deref(), Some("10.0.0.7"));
}

#[test(tokio::test)]
async fn test_tokens_are_single_use() {
    let t = TestApp::new();
    t.sign_up("ada@example.com", "Ada").await;
    let token = t
        .mail_token("ada@example.com", "confirmation_instructions", "confirmation_token")
        .unwrap();

    t.app.tokens.confirm(&token).await.unwrap();
    assert!(matches!(
        t.app.tokens.confirm(&token).await,
        Err(Error::InvalidToken(TokenRejection::Invalid))
    ));
}

#[test(tokio::test)]
async fn test_email_uniqueness_ignores_case() {
    let t = TestApp::new();
    t.sign_up("ada@example.com", "Ada").await;

    let result = t
        .app
        .sign_up(RegistrationAttrs {
            email: "Ada@Example.COM".to_string(),
            name: "Other Ada".to_string(),
            password: PASSWORD.to_string(),
            ..RegistrationAttrs::default()
        })
        .await;
    assert!(matches!(result, Err(Error::Conflict(_))));
}

#[test(tokio::test)]
async fn test_invalid_registration_reports_every_field() {
    let t = TestApp::new();
    let result = t
        .app
        .sign_up(RegistrationAttrs {
            email: "not-an-email".to_string(),
            name: " ".to_string(),
            password: "short".to_string(),
            password_confirmation: Some("different".to_string()),
            ..RegistrationAttrs::default()
        })
        .await;

    let Err(Error::Validation(errors)) = result else {
        panic!("expected validation errors, got {:?}", result);
    };
    let fields = errors.field_errors();
    assert!(fields.contains_key("email"));
    assert!(fields.contains_key("name"));
    assert!(fields.contains_key("password"));
    assert!(fields.contains_key("password_confirmation"));
    assert_eq!(t.mailer.count(), 0);
}

#[test(tokio::test)]
async fn test_lockout_unlock_flow() {
    let t = TestApp::new();
    t.confirmed("ada@example.com", "Ada").await;

    for _ in 0..4 {
        let result = t.app.accounts.authenticate("ada@example.com", "wrong-pass", None).await;
        assert!(matches!(
            result,
            Err(Error::Authentication(AuthFailure::BadCredential))
        ));
    }

    let fifth = t.app.accounts.authenticate("ada@example.com", "wrong-pass", None).await;
    assert!(matches!(fifth, Err(Error::Authentication(AuthFailure::Locked))));

    // Locked accounts refuse even the right password
    let correct = t.app.accounts.authenticate("ada@example.com", PASSWORD, None).await;
    assert!(matches!(correct, Err(Error::Authentication(AuthFailure::Locked))));

    // Further failures do not send a second unlock mail
    let _ = t.app.accounts.authenticate("ada@example.com", "wrong-pass", None).await;
    let unlock_mails = t
        .mailer
        .for_recipient("ada@example.com")
        .into_iter()
        .filter(|n| n.email_type() == Some("unlock_instructions"))
        .count();
    assert_eq!(unlock_mails, 1);

    let token = t
        .mail_token("ada@example.com", "unlock_instructions", "unlock_token")
        .unwrap();
    let unlocked = t.app.tokens.unlock(&token).await.unwrap();
    assert!(!unlocked.is_locked());
    assert_eq!(unlocked.failed_attempts, 0);

    t.app
        .accounts
        .authenticate("ada@example.com", PASSWORD, None)
        .await
        .unwrap();
}

#[test(tokio::test)]
async fn test_password_reset_lifts_lockout() {
    let t = TestApp::new();
    t.confirmed("ada@example.com", "Ada").await;
    for _ in 0..5 {
        let _ = t.app.accounts.authenticate("ada@example.com", "wrong-pass", None).await;
    }

    t.app.tokens.issue_reset_for_email("ADA@example.com").await.unwrap();
    let token = t
        .mail_token("ada@example.com", "reset_password_instructions", "reset_password_token")
        .unwrap();

    // A rejected password leaves the token usable
    assert!(matches!(
        t.app.tokens.reset_password(&token, "short", None).await,
        Err(Error::Validation(_))
    ));

    let account = t
        .app
        .tokens
        .reset_password(&token, "brand-new-secret", Some("brand-new-secret"))
        .await
        .unwrap();
    assert!(!account.is_locked());

    t.app
        .accounts
        .authenticate("ada@example.com", "brand-new-secret", None)
        .await
        .unwrap();
    assert!(matches!(
        t.app.tokens.reset_password(&token, "another-secret", None).await,
        Err(Error::InvalidToken(TokenRejection::Invalid))
    ));
}

#[test(tokio::test)]
async fn test_expired_reset_token_is_consumed() {
    let mut identity = IdentityConfig::default();
    // Every token is already past a window that closed before it was sent
    identity.reset_password_within = Duration::seconds(-1);
    let t = TestApp::with_config(identity);
    t.confirmed("ada@example.com", "Ada").await;

    let issued = t.app.tokens.issue_reset_for_email("ada@example.com").await.unwrap();
    assert!(issued.sent_at <= Utc::now());

    assert!(matches!(
        t.app.tokens.reset_password(&issued.token, "brand-new-secret", None).await,
        Err(Error::InvalidToken(TokenRejection::Expired))
    ));
    assert!(matches!(
        t.app.tokens.reset_password(&issued.token, "brand-new-secret", None).await,
        Err(Error::InvalidToken(TokenRejection::Invalid))
    ));

    // The old password still works
    t.app
        .accounts
        .authenticate("ada@example.com", PASSWORD, None)
        .await
        .unwrap();
}

#[test(tokio::test)]
async fn test_email_change_requires_reconfirmation() {
    let t = TestApp::new();
    let account = t.confirmed("ada@example.com", "Ada").await;

    let updated = t
        .app
        .accounts
        .update_profile(
            &account,
            account.id,
            ProfileUpdate {
                email: Some("ada@lovelace.dev".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.is_confirmed());
    assert_eq!(updated.email, "ada@example.com");
    assert_eq!(updated.unconfirmed_email.as_deref(), Some("ada@lovelace.dev"));

    // Until the new address is confirmed the old one still signs in
    t.app
        .accounts
        .authenticate("ada@example.com", PASSWORD, None)
        .await
        .unwrap();

    let token = t
        .mail_token("ada@lovelace.dev", "confirmation_instructions", "confirmation_token")
        .unwrap();
    let reconfirmed = t.app.tokens.confirm(&token).await.unwrap();
    assert_eq!(reconfirmed.email, "ada@lovelace.dev");
    assert_eq!(reconfirmed.unconfirmed_email, None);
    assert!(reconfirmed.is_confirmed());

    t.app
        .accounts
        .authenticate("ada@lovelace.dev", PASSWORD, None)
        .await
        .unwrap();
    assert!(matches!(
        t.app.accounts.authenticate("ada@example.com", PASSWORD, None).await,
        Err(Error::NotFound(_))
    ));
}

#[test(tokio::test)]
async fn test_email_change_to_taken_address_at_confirmation() {
    let t = TestApp::new();
    let account = t.confirmed("ada@example.com", "Ada").await;
    t.app
        .accounts
        .update_profile(
            &account,
            account.id,
            ProfileUpdate {
                email: Some("shared@example.com".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    let token = t
        .mail_token("shared@example.com", "confirmation_instructions", "confirmation_token")
        .unwrap();

    // Someone else claims the address before Ada confirms it
    t.sign_up("Shared@Example.com", "Bob").await;

    assert!(matches!(
        t.app.tokens.confirm(&token).await,
        Err(Error::Conflict(_))
    ));
    let stored = t.app.accounts.get(account.id).await.unwrap().unwrap();
    assert_eq!(stored.email, "ada@example.com");
}

#[test(tokio::test)]
async fn test_only_admins_grant_admin() {
    let t = TestApp::new();
    let ada = t.confirmed("ada@example.com", "Ada").await;
    let bob = t.confirmed("bob@example.com", "Bob").await;

    assert!(matches!(
        t.app.accounts.set_admin(&bob, ada.id, true).await,
        Err(Error::Authorization(_))
    ));
}
