//! Notification templates
//!
//! Turns a [`NotificationRequest`] into a rendered [`EmailMessage`].

use crate::content;
use crate::{EmailMessage, NotificationKind, NotificationRequest, NotifyError};

/// Version tag recorded in message metadata
const TEMPLATE_VERSION: &str = "1.0";

/// Render a notification request into an email message.
pub fn render(
    request: &NotificationRequest,
    sender: &str,
    app_base_url: &str,
) -> Result<EmailMessage, NotifyError> {
    let recipient = request.recipient_email.trim();
    if recipient.is_empty() || !recipient.contains('@') {
        return Err(NotifyError::Validation(format!(
            "Invalid recipient address: '{}'",
            request.recipient_email
        )));
    }

    let base_url = app_base_url.trim_end_matches('/');
    let (subject, body_text, body_html) = match &request.kind {
        NotificationKind::InvitationAccepted {
            team_name,
            invitee_name,
            invitee_email,
        } => (
            content::invitation_accepted_subject(team_name),
            content::invitation_accepted_text(team_name, invitee_name, invitee_email),
            content::invitation_accepted_html(team_name, invitee_name, invitee_email),
        ),
        NotificationKind::ConfirmationInstructions { token } => {
            let link = format!(
                "{}/participants/confirmation?confirmation_token={}",
                base_url, token
            );
            instructions(
                "Confirmation instructions",
                "Confirm your AIcrowd account",
                "Thanks for signing up. \
                 Please confirm your email address to activate your account.",
                "Confirm my account",
                &link,
                "If you didn't create an account, you can safely ignore this email.",
            )
        }
        NotificationKind::ResetPasswordInstructions { token } => {
            let link = format!(
                "{}/participants/password/edit?reset_password_token={}", // pragma: allowlist secret
                base_url, token
            );
            instructions(
                "Reset password instructions",
                "Reset your AIcrowd password",
                "Someone has requested a link to change your password.",
                "Change my password",
                &link,
                "If you didn't request this, please ignore this email. \
                 Your password won't change until you use the link above.",
            )
        }
        NotificationKind::UnlockInstructions { token } => {
            let link = format!("{}/participants/unlock?unlock_token={}", base_url, token);
            instructions(
                "Unlock instructions",
                "Your AIcrowd account has been locked",
                "Your account has been locked due to an excessive number of \
                 unsuccessful sign in attempts.",
                "Unlock my account",
                &link,
                "If you didn't try to sign in, consider changing your password after unlocking.",
            )
        }
    };

    Ok(
        EmailMessage::new(recipient.to_string(), sender.to_string(), subject, body_text)
            .with_html(body_html)
            .with_metadata("email_type", request.kind.template_name())
            .with_metadata("template_version", TEMPLATE_VERSION),
    )
}

fn instructions(
    subject: &str,
    heading: &str,
    intro: &str,
    button: &str,
    link: &str,
    outro: &str,
) -> (String, String, String) {
    (
        subject.to_string(),
        content::instructions_text(intro, button, link, outro),
        content::instructions_html(heading, intro, button, link, outro),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invitation_accepted_template() {
        let request = NotificationRequest::invitation_accepted(
            "invitor@example.com",
            "T",
            "Invitee",
            "invitee@x.com",
        );

        let message = render(&request, "no-reply@aicrowd.com", "https://www.aicrowd.com").unwrap();

        assert_eq!(message.to, "invitor@example.com");
        assert_eq!(message.from, "no-reply@aicrowd.com");
        assert_eq!(message.subject, "Welcome to Team T");
        assert!(message.body_text.contains("You’ve just joined"));
        assert!(message.body_html.unwrap().contains("You’ve just joined"));
        assert_eq!(
            message.metadata.get("email_type"),
            Some(&"invitation_accepted".to_string())
        );
    }

    #[test]
    fn test_reset_password_template_embeds_token_link() {
        let request = NotificationRequest::new(
            "user@example.com",
            NotificationKind::ResetPasswordInstructions {
                token: "reset_token_123".to_string(), // pragma: allowlist secret
            },
        );

        let message = render(&request, "no-reply@aicrowd.com", "https://www.aicrowd.com/").unwrap();

        assert_eq!(message.subject, "Reset password instructions");
        let link = "https://www.aicrowd.com/participants/password/edit\
                    ?reset_password_token=reset_token_123"; // pragma: allowlist secret
        assert!(message.body_text.contains(link));
        assert_eq!(
            message.metadata.get("email_type"),
            Some(&"reset_password_instructions".to_string())
        );
    }

    #[test]
    fn test_confirmation_and_unlock_subjects() {
        let confirm = NotificationRequest::new(
            "user@example.com",
            NotificationKind::ConfirmationInstructions {
                token: "abc".to_string(),
            },
        );
        let unlock = NotificationRequest::new(
            "user@example.com",
            NotificationKind::UnlockInstructions {
                token: "def".to_string(),
            },
        );

        let confirm = render(&confirm, "a@b.com", "https://h").unwrap();
        let unlock = render(&unlock, "a@b.com", "https://h").unwrap();

        assert_eq!(confirm.subject, "Confirmation instructions");
        assert!(confirm.body_text.contains("confirmation_token=abc"));
        assert_eq!(unlock.subject, "Unlock instructions");
        assert!(unlock.body_text.contains("unlock_token=def"));
    }

    #[test]
    fn test_invitation_accepted_html_escapes_team_name() {
        let request = NotificationRequest::invitation_accepted(
            "invitor@example.com",
            "<script>alert(1)</script>",
            "Invitee",
            "invitee@x.com",
        );

        let message = render(&request, "no-reply@aicrowd.com", "https://h").unwrap();
        let html = message.body_html.unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("Welcome to Team &lt;script&gt;alert(1)&lt;/script&gt;!"));
    }

    #[test]
    fn test_render_rejects_missing_recipient() {
        let request = NotificationRequest::invitation_accepted("  ", "T", "I", "i@x.com");
        assert!(matches!(
            render(&request, "no-reply@aicrowd.com", "https://h"),
            Err(NotifyError::Validation(_))
        ));
    }
}
