//! Shared notification content
//!
//! Canonical body generators used by [`crate::templates::render`]. Every
//! value interpolated into an HTML body is escaped first; team and account
//! names are user input.

/// Escape text for HTML element content and quoted attribute values
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Subject line for the invitation-accepted notification.
pub fn invitation_accepted_subject(team_name: &str) -> String {
    format!("Welcome to Team {}", team_name)
}

/// Plain-text body for the invitation-accepted notification.
pub fn invitation_accepted_text(
    team_name: &str,
    invitee_name: &str,
    invitee_email: &str,
) -> String {
    format!(
        "Hi there!\n\n\
        {invitee_name} ({invitee_email}) has accepted your invitation.\n\n\
        You’ve just joined forces on Team {team_name}. Head over to AIcrowd \
        to start working on your next submission together.\n\n\
        Thanks,\n\
        The AIcrowd Team",
        invitee_name = invitee_name,
        invitee_email = invitee_email,
        team_name = team_name
    )
}

/// Styled HTML body for the invitation-accepted notification.
pub fn invitation_accepted_html(
    team_name: &str,
    invitee_name: &str,
    invitee_email: &str,
) -> String {
    format!(
        r#"
            <html>
            <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
                <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
                    <h2 style="color: #f0524d;">Welcome to Team {team_name}!</h2>

                    <p>Hi there!</p>

                    <p><strong>{invitee_name}</strong> ({invitee_email})
                    has accepted your invitation.</p>

                    <p>You’ve just joined forces on Team <strong>{team_name}</strong>.
                    Head over to AIcrowd to start working on your next submission together.</p>

                    <hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">

                    <p style="color: #666; font-size: 12px;">Thanks, The AIcrowd Team</p>
                </div>
            </body>
            </html>
            "#,
        team_name = escape_html(team_name),
        invitee_name = escape_html(invitee_name),
        invitee_email = escape_html(invitee_email)
    )
}

/// Plain-text body for a single-link account instruction email
/// (confirmation, password reset, unlock).
pub fn instructions_text(intro: &str, action: &str, link: &str, outro: &str) -> String {
    format!(
        "Hi there,\n\n\
        {intro}\n\n\
        {action}:\n\
        {link}\n\n\
        {outro}\n\n\
        Thanks,\n\
        The AIcrowd Team",
        intro = intro,
        action = action,
        link = link,
        outro = outro
    )
}

/// HTML body for a single-link account instruction email.
pub fn instructions_html(
    heading: &str,
    intro: &str,
    button: &str,
    link: &str,
    outro: &str,
) -> String {
    format!(
        r#"
            <html>
            <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
                <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
                    <h2 style="color: #f0524d;">{heading}</h2>

                    <p>Hi there,</p>

                    <p>{intro}</p>

                    <div style="text-align: center; margin: 30px 0;">
                        <a href="{link}"
                           style="background-color: #f0524d; color: white; padding: 12px 24px;
                                  text-decoration: none; border-radius: 4px;
                                  display: inline-block; font-weight: bold;">
                            {button}
                        </a>
                    </div>

                    <p>Or copy and paste this link in your browser:</p>
                    <p style="background-color: #f5f5f5; padding: 10px; border-radius: 4px;
                              word-break: break-all;">
                        <a href="{link}">{link}</a>
                    </p>

                    <p style="color: #666; font-size: 12px;">{outro}<br>Thanks, The AIcrowd Team</p>
                </div>
            </body>
            </html>
            "#,
        heading = escape_html(heading),
        intro = escape_html(intro),
        button = escape_html(button),
        link = escape_html(link),
        outro = escape_html(outro)
    )
}
