/*!
Outbound notification email.

The portal sends exactly five kinds of mail: request-creation confirmation
to the student, a review alert to the responsible faculty member, a status
change notice back to the student, and the two account-recovery messages.

Every send here is best-effort: a failure is logged and swallowed, and must
never disturb whatever state change triggered it. The one routing question
that IS allowed to fail loudly, "which faculty member gets the alert?", is
answered upstream in the lifecycle layer; by the time a `Mailer` is
involved the recipient is already known.
*/
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
};

use crate::request::Request;
use crate::user::User;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Tell the creator their request was filed.
    async fn creation_confirmation(&self, request: &Request, creator_email: &str);

    /// Tell the responsible faculty member a request awaits review.
    async fn creation_alert(&self, request: &Request, creator: &User, faculty_email: &str);

    /// Tell the creator their request's status changed.
    async fn status_change(&self, request: &Request, creator_email: &str);

    /// Send a password-reset link.
    async fn reset_link(&self, email: &str, link: &str);

    /// Confirm a completed password change.
    async fn password_changed(&self, email: &str);
}

fn confirmation_text(request: &Request) -> String {
    format!(
        "Request number {} has successfully been created",
        &request.id
    )
}

fn alert_text(request: &Request, creator: &User) -> String {
    format!(
        "Request number {} ready for review. Submitted by: {} {}",
        &request.id, creator.first_name(), creator.last_name()
    )
}

fn status_text(request: &Request) -> String {
    format!(
        "Request number {} has been {}",
        &request.id, &request.status
    )
}

/// Real mail over SMTP (STARTTLS submission, the usual port-587 setup).
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        username: String,
        password: String,
        from: &str,
    ) -> Result<Self, String> {
        let from: Mailbox = from.parse()
            .map_err(|e| format!("Bad from address {:?}: {}", from, &e))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| format!("Error setting up SMTP relay {:?}: {}", host, &e))?
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self { transport, from })
    }

    /// Build and send one plain-text message, logging any failure.
    async fn send(&self, to: &str, subject: &str, text: String) {
        log::trace!("SmtpMailer::send( {:?}, {:?}, ... ) called.", to, subject);

        let to: Mailbox = match to.parse() {
            Ok(mbx) => mbx,
            Err(e) => {
                log::error!("Unmailable address {:?}: {}", to, &e);
                return;
            },
        };

        let msg = match Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(text)
        {
            Ok(msg) => msg,
            Err(e) => {
                log::error!("Error building {:?} message: {}", subject, &e);
                return;
            },
        };

        if let Err(e) = self.transport.send(msg).await {
            log::error!("Error sending {:?} message: {}", subject, &e);
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn creation_confirmation(&self, request: &Request, creator_email: &str) {
        self.send(creator_email, "Request Status", confirmation_text(request)).await;
    }

    async fn creation_alert(&self, request: &Request, creator: &User, faculty_email: &str) {
        self.send(faculty_email, "Request Status", alert_text(request, creator)).await;
    }

    async fn status_change(&self, request: &Request, creator_email: &str) {
        self.send(creator_email, "Request Status", status_text(request)).await;
    }

    async fn reset_link(&self, email: &str, link: &str) {
        let text = format!(
            "Use the link below to reset your password. \
             The link expires in 24 hours.\n\n{}",
            link
        );
        self.send(email, "Password Reset", text).await;
    }

    async fn password_changed(&self, email: &str) {
        let text = "Your password has been changed. If you did not do this, \
                    contact the registrar's office immediately.".to_owned();
        self.send(email, "Password Changed", text).await;
    }
}

/// Mail to the log instead of the wire; what you get with no SMTP
/// configuration. Keeps local development from needing a mail account.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn creation_confirmation(&self, request: &Request, creator_email: &str) {
        log::info!("MAIL to {}: {}", creator_email, confirmation_text(request));
    }

    async fn creation_alert(&self, request: &Request, creator: &User, faculty_email: &str) {
        log::info!("MAIL to {}: {}", faculty_email, alert_text(request, creator));
    }

    async fn status_change(&self, request: &Request, creator_email: &str) {
        log::info!("MAIL to {}: {}", creator_email, status_text(request));
    }

    async fn reset_link(&self, email: &str, link: &str) {
        log::info!("MAIL to {}: password reset link {}", email, link);
    }

    async fn password_changed(&self, email: &str) {
        log::info!("MAIL to {}: password changed notice", email);
    }
}

#[cfg(test)]
pub mod recording {
    /*!
    A `Mailer` that remembers what it was asked to send, so tests can
    assert on notification traffic.
    */
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Sent {
        CreationConfirmation { request_id: i32, to: String },
        CreationAlert { request_id: i32, to: String },
        StatusChange { request_id: i32, to: String, status: String },
        ResetLink { to: String, link: String },
        PasswordChanged { to: String },
    }

    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingMailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, s: Sent) {
            self.sent.lock().unwrap().push(s);
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn creation_confirmation(&self, request: &Request, creator_email: &str) {
            self.record(Sent::CreationConfirmation {
                request_id: request.id,
                to: creator_email.to_owned(),
            });
        }

        async fn creation_alert(&self, request: &Request, _creator: &User, faculty_email: &str) {
            self.record(Sent::CreationAlert {
                request_id: request.id,
                to: faculty_email.to_owned(),
            });
        }

        async fn status_change(&self, request: &Request, creator_email: &str) {
            self.record(Sent::StatusChange {
                request_id: request.id,
                to: creator_email.to_owned(),
                status: request.status.to_string(),
            });
        }

        async fn reset_link(&self, email: &str, link: &str) {
            self.record(Sent::ResetLink {
                to: email.to_owned(),
                link: link.to_owned(),
            });
        }

        async fn password_changed(&self, email: &str) {
            self.record(Sent::PasswordChanged { to: email.to_owned() });
        }
    }
}
