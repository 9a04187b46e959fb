use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox}, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::users::repo_types::User;

/// A rendered email ready for delivery.
#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    from: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(cfg: &EmailConfig) -> anyhow::Result<Self> {
        let builder = if cfg.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                .with_context(|| format!("smtp relay {}", cfg.host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
        };
        let mut builder = builder.port(cfg.port);
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ));
        }
        Ok(Self {
            from: cfg.from.clone(),
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse::<Mailbox>().context("parse EMAIL_FROM")?)
            .to(email.to.parse::<Mailbox>().context("parse recipient")?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .context("build email")?;
        self.transport.send(message).await.context("smtp send")?;
        info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

fn first_name(user: &User) -> &str {
    user.name.split_whitespace().next().unwrap_or(&user.name)
}

fn layout(greeting: &str, body: &str, url: &str, action: &str) -> String {
    format!(
        "<!doctype html><html><body>\
         <p>Hi {greeting},</p>\
         <p>{body}</p>\
         <p><a href=\"{url}\">{action}</a></p>\
         <p>If the button does not work, paste this link into your browser: {url}</p>\
         </body></html>"
    )
}

pub fn verify_email(user: &User, url: &str, expires_in: &str) -> Email {
    debug!(user_id = %user.id, "render verify email");
    Email {
        to: user.email.clone(),
        subject: "Verify your email address".into(),
        html: layout(
            first_name(user),
            &format!("Thanks for signing up. Please confirm your email address. The link is valid for {expires_in}."),
            url,
            "Verify email",
        ),
    }
}

pub fn welcome(user: &User, url: &str) -> Email {
    Email {
        to: user.email.clone(),
        subject: "Welcome aboard".into(),
        html: layout(
            first_name(user),
            "Your email is verified and your account is ready.",
            url,
            "Open your profile",
        ),
    }
}

pub fn password_reset(user: &User, url: &str, expires_in: &str) -> Email {
    Email {
        to: user.email.clone(),
        subject: "Reset your password".into(),
        html: layout(
            first_name(user),
            &format!("Forgot your password? Use the link below to choose a new one. It is valid for {expires_in}. If you did not ask for this, ignore this email."),
            url,
            "Reset password",
        ),
    }
}

#[cfg(test)]
pub use recording::RecordingMailer;

#[cfg(test)]
mod recording {
    use super::{Email, Mailer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    /// Keeps every email instead of sending it; can be told to fail.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
        fail: AtomicBool,
    }

    impl RecordingMailer {
        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub async fn sent(&self) -> Vec<Email> {
            self.sent.lock().await.clone()
        }

        /// Pulls the token that follows `marker` out of the newest email.
        pub async fn last_token(&self, marker: &str) -> Option<String> {
            let sent = self.sent.lock().await;
            let html = &sent.last()?.html;
            let start = html.find(marker)? + marker.len();
            let token: String = html[start..]
                .chars()
                .take_while(|c| c.is_ascii_hexdigit())
                .collect();
            (!token.is_empty()).then_some(token)
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("smtp unavailable");
            }
            self.sent.lock().await.push(email);
            Ok(())
        }
    }
}
