//! PostgreSQL-backed store tests
//!
//! Run against `TEST_DATABASE_URL`; each test returns early when it is not
//! set. Addresses are unique per run so the database needs no cleanup.

mod common;

use crowd_app::CrowdApp;
use crowd_common::config::IdentityConfig;
use crowd_common::{Error, TokenRejection};
use crowd_identity::{Account, ProfileUpdate, RegistrationAttrs};
use crowd_notify::NotifyConfig;
use crowd_publications::PublicationExternalLink;
use crowd_teams::InvitationState;
use serial_test::serial;
use test_log::test;
use uuid::Uuid;

use common::{database_url, PASSWORD};

async fn connect() -> Option<CrowdApp> {
    let Some(url) = database_url() else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let notify = NotifyConfig {
        provider: "mock".to_string(),
        ..NotifyConfig::default()
    };
    Some(
        CrowdApp::connect(&url, IdentityConfig::default(), notify)
            .await
            .expect("connect and migrate"),
    )
}

fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, Uuid::new_v4().simple())
}

async fn confirmed(app: &CrowdApp, email: &str, name: &str) -> Account {
    let (_, issued) = app
        .sign_up(RegistrationAttrs {
            email: email.to_string(),
            name: name.to_string(),
            password: PASSWORD.to_string(),
            ..RegistrationAttrs::default()
        })
        .await
        .expect("sign up");
    app.tokens.confirm(&issued.token).await.expect("confirm")
}

#[test(tokio::test)]
#[serial]
async fn test_pg_account_lifecycle() {
    let Some(app) = connect().await else { return };
    let email = unique_email("ada");

    let (account, issued) = app
        .sign_up(RegistrationAttrs {
            email: email.clone(),
            name: "Ada".to_string(),
            password: PASSWORD.to_string(),
            ..RegistrationAttrs::default()
        })
        .await
        .unwrap();
    assert!(!account.is_confirmed());

    let duplicate = app
        .sign_up(RegistrationAttrs {
            email: email.to_uppercase(),
            name: "Ada Again".to_string(),
            password: PASSWORD.to_string(),
            ..RegistrationAttrs::default()
        })
        .await;
    assert!(matches!(duplicate, Err(Error::Conflict(_))));

    app.tokens.confirm(&issued.token).await.unwrap();
    assert!(matches!(
        app.tokens.confirm(&issued.token).await,
        Err(Error::InvalidToken(TokenRejection::Invalid))
    ));

    let signed_in = app.accounts.authenticate(&email, PASSWORD, None).await.unwrap();
    assert_eq!(signed_in.sign_in_count, 1);
}

#[test(tokio::test)]
#[serial]
async fn test_pg_email_change_is_promoted_on_confirmation() {
    let Some(app) = connect().await else { return };
    let old_email = unique_email("old");
    let new_email = unique_email("new");
    let account = confirmed(&app, &old_email, "Mover").await;

    let updated = app
        .accounts
        .update_profile(
            &account,
            account.id,
            ProfileUpdate {
                name: Some("Moved".to_string()),
                email: Some(new_email.clone()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Moved");
    assert_eq!(updated.email, old_email);
    assert_eq!(updated.unconfirmed_email.as_deref(), Some(new_email.as_str()));
    app.accounts.authenticate(&old_email, PASSWORD, None).await.unwrap();

    let issued = app.tokens.issue_confirmation(account.id).await.unwrap();
    let (first, second) = tokio::join!(
        app.tokens.confirm(&issued.token),
        app.tokens.confirm(&issued.token)
    );
    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);

    let stored = app.accounts.get(account.id).await.unwrap().unwrap();
    assert_eq!(stored.email, new_email);
    assert_eq!(stored.unconfirmed_email, None);
    assert_eq!(stored.name, "Moved");
    assert!(app.accounts.find_by_email(&old_email).await.unwrap().is_none());
}

#[test(tokio::test)]
#[serial]
async fn test_pg_reset_lifts_lockout() {
    let Some(app) = connect().await else { return };
    let email = unique_email("locked");
    let account = confirmed(&app, &email, "Locked").await;

    for _ in 0..5 {
        let _ = app.accounts.authenticate(&email, "wrong-password", None).await;
    }
    let locked = app.accounts.get(account.id).await.unwrap().unwrap();
    assert!(locked.is_locked());

    // Column-scoped writes leave the lock alone
    let renamed = app
        .accounts
        .update_profile(
            &locked,
            account.id,
            ProfileUpdate {
                name: Some("Still Locked".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(renamed.is_locked());

    let issued = app.tokens.issue_reset_for_email(&email).await.unwrap();
    let reset = app
        .tokens
        .reset_password(&issued.token, "brand-new-secret", None)
        .await
        .unwrap();
    assert!(!reset.is_locked());
    assert_eq!(reset.failed_attempts, 0);
    assert_eq!(reset.unlock_token, None);
    assert_eq!(reset.reset_password_token, None);

    app.accounts
        .authenticate(&email, "brand-new-secret", None)
        .await
        .unwrap();
    app.accounts
        .change_password(account.id, "brand-new-secret", "another-secret", None)
        .await
        .unwrap();
    app.accounts
        .authenticate(&email, "another-secret", None)
        .await
        .unwrap();
}

#[test(tokio::test)]
#[serial]
async fn test_pg_invitation_accept_is_single_shot() {
    let Some(app) = connect().await else { return };
    let owner = confirmed(&app, &unique_email("owner"), "Owner").await;
    let invitee_email = unique_email("invitee");
    let invitee = confirmed(&app, &invitee_email, "Invitee").await;

    let team = app.invitations.create_team(&owner, "Rocket").await.unwrap();
    let invitation = app
        .invitations
        .create(team.id, &owner, &invitee_email.to_uppercase())
        .await
        .unwrap();
    assert!(matches!(
        app.invitations.create(team.id, &owner, &invitee_email).await,
        Err(Error::Conflict(_))
    ));

    let (first, second) = tokio::join!(
        app.invitations.accept(invitation.id, &invitee),
        app.invitations.accept(invitation.id, &invitee)
    );
    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);

    let stored = app.invitations.get(invitation.id).await.unwrap().unwrap();
    assert_eq!(stored.state, InvitationState::Accepted);
    assert_eq!(app.invitations.members(team.id).await.unwrap().len(), 2);
}

#[test(tokio::test)]
#[serial]
async fn test_pg_publication_links() {
    let Some(app) = connect().await else { return };
    let publication_id = Uuid::new_v4();

    let link =
        PublicationExternalLink::new(publication_id, "https://arxiv.org/abs/1234.5678").unwrap();
    app.publication_links.create(&link).await.unwrap();

    let links = app
        .publication_links
        .list_for_publication(publication_id)
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].id, link.id);
}
