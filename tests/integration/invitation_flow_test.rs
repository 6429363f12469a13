//! Team invitation integration tests
//!
//! Covers the full path from an invitation to a not-yet-registered address
//! through sign-up, confirmation and acceptance, plus the terminal-state and
//! authorization edges.

mod common;

use chrono::{Duration, Utc};
use crowd_common::{AuthFailure, Error};
use crowd_teams::{InvitationState, MembershipRole};
use test_log::test;

use common::{TestApp, PASSWORD};

#[test(tokio::test)]
async fn test_invite_register_confirm_accept() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();

    // Invitee has no account yet
    let invitation = t
        .app
        .invitations
        .create(team.id, &owner, "Newbie@Example.com")
        .await
        .unwrap();
    assert_eq!(invitation.state, InvitationState::Pending);
    assert_eq!(invitation.invitee_id, None);

    let invitee = t.confirmed("newbie@example.com", "Newbie").await;
    t.app
        .accounts
        .authenticate("newbie@example.com", PASSWORD, None)
        .await
        .unwrap();

    let acceptance = t.app.invitations.accept(invitation.id, &invitee).await.unwrap();
    assert_eq!(acceptance.invitation.state, InvitationState::Accepted);
    assert!(acceptance.invitation.responded_at.is_some());
    assert_eq!(acceptance.membership.account_id, invitee.id);
    assert_eq!(acceptance.membership.role, MembershipRole::Member);

    let members = t.app.invitations.members(team.id).await.unwrap();
    assert_eq!(members.len(), 2);

    let mail = t
        .mailer
        .latest("owner@example.com", "invitation_accepted")
        .expect("invitor is notified");
    assert_eq!(mail.message.to, "owner@example.com");
    assert_eq!(mail.message.from, "no-reply@aicrowd.com");
    assert_eq!(mail.message.subject, "Welcome to Team T");
    assert!(mail.message.body_text.contains("You’ve just joined"));
}

#[test(tokio::test)]
async fn test_second_accept_is_already_terminal() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let invitee = t.confirmed("invitee@example.com", "Invitee").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();
    let invitation = t
        .app
        .invitations
        .create(team.id, &owner, "invitee@example.com")
        .await
        .unwrap();
    assert_eq!(invitation.invitee_id, Some(invitee.id));

    t.app.invitations.accept(invitation.id, &invitee).await.unwrap();
    assert!(matches!(
        t.app.invitations.accept(invitation.id, &invitee).await,
        Err(Error::AlreadyTerminal(_))
    ));
    assert!(matches!(
        t.app.invitations.decline(invitation.id, &invitee).await,
        Err(Error::AlreadyTerminal(_))
    ));

    assert_eq!(t.app.invitations.members(team.id).await.unwrap().len(), 2);
    let notices = t
        .mailer
        .for_recipient("owner@example.com")
        .into_iter()
        .filter(|n| n.email_type() == Some("invitation_accepted"))
        .count();
    assert_eq!(notices, 1);
}

#[test(tokio::test)]
async fn test_concurrent_accepts_admit_one_winner() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let invitee = t.confirmed("invitee@example.com", "Invitee").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();
    let invitation = t
        .app
        .invitations
        .create(team.id, &owner, "invitee@example.com")
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        t.app.invitations.accept(invitation.id, &invitee),
        t.app.invitations.accept(invitation.id, &invitee)
    );
    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    assert_eq!(t.app.invitations.members(team.id).await.unwrap().len(), 2);
}

#[test(tokio::test)]
async fn test_unconfirmed_invitee_cannot_accept() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let invitee = t.sign_up("invitee@example.com", "Invitee").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();
    let invitation = t
        .app
        .invitations
        .create(team.id, &owner, "invitee@example.com")
        .await
        .unwrap();

    assert!(matches!(
        t.app.invitations.accept(invitation.id, &invitee).await,
        Err(Error::Authentication(AuthFailure::Unconfirmed))
    ));
    let stored = t.app.invitations.get(invitation.id).await.unwrap().unwrap();
    assert_eq!(stored.state, InvitationState::Pending);
}

#[test(tokio::test)]
async fn test_only_the_invitee_may_answer() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let stranger = t.confirmed("stranger@example.com", "Stranger").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();
    let invitation = t
        .app
        .invitations
        .create(team.id, &owner, "invitee@example.com")
        .await
        .unwrap();

    assert!(matches!(
        t.app.invitations.accept(invitation.id, &stranger).await,
        Err(Error::Authorization(_))
    ));
    assert!(matches!(
        t.app.invitations.decline(invitation.id, &stranger).await,
        Err(Error::Authorization(_))
    ));
}

#[test(tokio::test)]
async fn test_non_member_cannot_invite() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let outsider = t.confirmed("outsider@example.com", "Outsider").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();

    assert!(matches!(
        t.app.invitations.create(team.id, &outsider, "friend@example.com").await,
        Err(Error::Authorization(_))
    ));
}

#[test(tokio::test)]
async fn test_duplicate_pending_invitation_conflicts() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();

    t.app
        .invitations
        .create(team.id, &owner, "friend@example.com")
        .await
        .unwrap();
    assert!(matches!(
        t.app.invitations.create(team.id, &owner, "FRIEND@example.com").await,
        Err(Error::Conflict(_))
    ));
}

#[test(tokio::test)]
async fn test_decline_then_expire_is_terminal() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let invitee = t.confirmed("invitee@example.com", "Invitee").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();
    let invitation = t
        .app
        .invitations
        .create(team.id, &owner, "invitee@example.com")
        .await
        .unwrap();

    let declined = t.app.invitations.decline(invitation.id, &invitee).await.unwrap();
    assert_eq!(declined.state, InvitationState::Declined);
    assert!(matches!(
        t.app.invitations.expire(invitation.id).await,
        Err(Error::AlreadyTerminal(_))
    ));
    assert_eq!(t.app.invitations.members(team.id).await.unwrap().len(), 1);
}

#[test(tokio::test)]
async fn test_sweep_expires_overdue_invitations() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let invitee = t.confirmed("invitee@example.com", "Invitee").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();
    let invitation = t
        .app
        .invitations
        .create(team.id, &owner, "invitee@example.com")
        .await
        .unwrap();

    // Nothing is due yet
    assert!(t.app.invitations.expire_overdue(Utc::now()).await.unwrap().is_empty());

    let later = Utc::now() + Duration::days(8);
    let expired = t.app.invitations.expire_overdue(later).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].state, InvitationState::Expired);
    assert_eq!(expired[0].responded_at, None);

    assert!(matches!(
        t.app.invitations.accept(invitation.id, &invitee).await,
        Err(Error::AlreadyTerminal(_))
    ));
}

#[test(tokio::test)]
async fn test_listing_is_newest_first() {
    let t = TestApp::new();
    let owner = t.confirmed("owner@example.com", "Owner").await;
    let team = t.app.invitations.create_team(&owner, "T").await.unwrap();

    let first = t.app.invitations.create(team.id, &owner, "one@example.com").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = t.app.invitations.create(team.id, &owner, "two@example.com").await.unwrap();

    let listed = t.app.invitations.list_for_team(team.id).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}
