use crate::secrets::SecretRepository;
use async_once_cell::OnceCell;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

pub const SMTP_CREDENTIALS_NAME: &str = "smtp-credentials";

/// A fully rendered HTML email, ready to be handed to a [`MailTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: Mailbox,
    pub from: Mailbox,
    pub reply_to: Option<Mailbox>,
    pub subject: String,
    pub html_body: String,
}

impl OutgoingEmail {
    fn into_message(self) -> anyhow::Result<Message> {
        let mut builder = Message::builder()
            .from(self.from)
            .to(self.to)
            .subject(self.subject)
            .header(ContentType::TEXT_HTML);
        if let Some(reply_to) = self.reply_to {
            builder = builder.reply_to(reply_to);
        }
        Ok(builder.body(self.html_body)?)
    }
}

/// Delivers emails. Delivery, retries and bounces are the transport's concern;
/// callers only learn whether the message was accepted.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

/// Sends through an SMTP relay, by default the one on the local host.
pub struct SmtpMailTransport<SecretRepositoryT: SecretRepository> {
    secrets_repository: SecretRepositoryT,
    smtp_url: String,
    timeout: Duration,
    mailer: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl<SecretRepositoryT: SecretRepository> SmtpMailTransport<SecretRepositoryT> {
    pub fn new(
        secrets_repository: SecretRepositoryT,
        smtp_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            secrets_repository,
            smtp_url: smtp_url.into(),
            timeout,
            mailer: Default::default(),
        }
    }

    async fn initialise_mailer(&self) -> anyhow::Result<AsyncSmtpTransport<Tokio1Executor>> {
        info!("Connecting to SMTP relay at {}", self.smtp_url);
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.smtp_url)?
            .timeout(Some(self.timeout));

        // Credentials are only ever sent over TLS. A relay demanding them on a
        // plain connection rejects the message instead.
        if self.smtp_url.starts_with("smtps://") {
            let credentials: SmtpCredentials = self
                .secrets_repository
                .get_secret(SMTP_CREDENTIALS_NAME)
                .await?;
            builder = builder
                .authentication(vec![Mechanism::Plain])
                .credentials(Credentials::new(credentials.username, credentials.password));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl<SecretRepositoryT: SecretRepository> MailTransport for SmtpMailTransport<SecretRepositoryT> {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let mailer = self
            .mailer
            .get_or_try_init(self.initialise_mailer())
            .await
            .map_err(|e| e.context("Unable to connect to SMTP server"))?;
        let response = mailer.send(email.into_message()?).await?;
        if !response.is_positive() {
            anyhow::bail!("SMTP relay refused message: {}", response.code());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct SmtpCredentials {
    #[serde(rename = "SMTP_USERNAME")]
    username: String,
    #[serde(rename = "SMTP_PASSWORD")]
    password: String,
}

#[cfg(test)]
mod tests {
    use super::{MailTransport, OutgoingEmail, SmtpMailTransport, SMTP_CREDENTIALS_NAME};
    use crate::secrets::{test_support::FakeSecretRepository, SecretRepository};
    use googletest::prelude::*;
    use serial_test::serial;
    use std::time::Duration;
    use test_support::{
        fake_smtp::{start_rejecting_smtp_server, FakeSmtpServer, SMTP_PORT},
        setup_logging,
    };
    use tokio::time::timeout;

    fn arbitrary_email() -> OutgoingEmail {
        OutgoingEmail {
            to: "Site Owner <owner@example.com>".parse().unwrap(),
            from: "Example Studio <noreply@contact.example.com>".parse().unwrap(),
            reply_to: Some("Ann Example <ann@example.com>".parse().unwrap()),
            subject: "Portfolio Contact: Hi".into(),
            html_body: "<p>Hello there</p>".into(),
        }
    }

    async fn transport(smtp_url: String) -> SmtpMailTransport<FakeSecretRepository> {
        setup_logging();
        SmtpMailTransport::new(
            FakeSecretRepository::open().await,
            smtp_url,
            Duration::from_secs(2),
        )
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn delivers_html_email_with_headers() {
        fake_smtp().start();
        fake_smtp().flush().await;
        let subject = transport(FakeSmtpServer::url()).await;

        let result = subject.send(arbitrary_email()).await;

        expect_that!(result.map_err(|e| e.to_string()), ok(anything()));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().next_mail_content()).await,
            ok(some(all!(
                contains_substring("To: \"Site Owner\" <owner@example.com>"),
                contains_substring("From: \"Example Studio\" <noreply@contact.example.com>"),
                contains_substring("Reply-To: \"Ann Example\" <ann@example.com>"),
                contains_substring("Subject: Portfolio Contact: Hi"),
                contains_substring("Content-Type: text/html; charset=utf-8"),
                contains_substring("<p>Hello there</p>")
            )))
        );
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn omits_reply_to_when_not_given() {
        fake_smtp().start();
        fake_smtp().flush().await;
        let subject = transport(FakeSmtpServer::url()).await;

        subject
            .send(OutgoingEmail {
                reply_to: None,
                ..arbitrary_email()
            })
            .await
            .unwrap();

        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().next_mail_content()).await,
            ok(some(not(contains_substring("Reply-To:"))))
        );
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn returns_error_when_relay_rejects_message() {
        let subject = transport(start_rejecting_smtp_server()).await;

        let result = subject.send(arbitrary_email()).await;

        expect_that!(result, err(anything()));
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn returns_error_when_relay_is_unreachable() {
        let subject = transport("smtp://nonexistent.host.internal".into()).await;

        let result = subject.send(arbitrary_email()).await;

        expect_that!(result, err(anything()));
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn returns_error_when_tls_credentials_are_missing() {
        let mut secrets_repository = FakeSecretRepository::open().await;
        secrets_repository.remove_secret(SMTP_CREDENTIALS_NAME);
        let subject = SmtpMailTransport::new(
            secrets_repository,
            format!("smtps://localhost:{SMTP_PORT}"),
            Duration::from_secs(2),
        );

        let result = subject.send(arbitrary_email()).await;

        expect_that!(
            result.map_err(|e| format!("{e:#}")),
            err(contains_substring("Missing secret smtp-credentials"))
        );
    }

    fn fake_smtp() -> &'static FakeSmtpServer {
        FakeSmtpServer::shared()
    }
}
