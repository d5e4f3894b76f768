use crate::{
    errors::GateError,
    hooks::Hooks,
    mailer::Mailer,
    models::{OutgoingMail, Settings},
    repository::Repository,
};

/// compose_approval_notice
///
/// Renders the approval mail for `to`. Header, subject and body each pass through their
/// own filter.
pub fn compose_approval_notice(to: &str, settings: &Settings, hooks: &Hooks) -> OutgoingMail {
    let headers = hooks.filter_mail_header(format!("From: {}\r\n", settings.from.trim_end()));
    let subject = hooks.filter_mail_subject(settings.subject.clone());
    let body = hooks.filter_mail_message(settings.message.clone());

    OutgoingMail {
        to: to.to_string(),
        subject,
        body,
        headers,
    }
}

/// send_approval_notice
///
/// Looks up the user's address and hands the rendered mail to the transport. Transport
/// errors are returned as they are; nothing is retried.
pub async fn send_approval_notice(
    repo: &dyn Repository,
    mailer: &dyn Mailer,
    hooks: &Hooks,
    settings: &Settings,
    user_id: i64,
) -> Result<(), GateError> {
    let user = repo.get_user(user_id).await.ok_or(GateError::NotFound)?;
    let mail = compose_approval_notice(&user.email, settings, hooks);
    mailer.send(mail).await?;
    tracing::debug!(user_id, "approval notice sent");
    Ok(())
}
