mod config;
mod email;
mod mailer;
mod metadata;
mod response;
mod sanitize;
mod secrets;
mod submission;
mod submission_log;
mod validation;

use chrono::{Local, NaiveDateTime};
use config::ContactFormConfig;
use email::{render_auto_reply, render_notification};
use lambda_http::{http::Method, run, service_fn, Body, Error, Request, Response};
use mailer::{MailTransport, OutgoingEmail, SmtpMailTransport};
use metadata::RequestMetadata;
use response::{ApiResponse, INVALID_METHOD_MESSAGE, SEND_FAILED_MESSAGE};
use secrets::{AwsSecretsManagerSecretRepository, SecretRepository};
use std::fmt::Display;
use submission::{ContactFormSubmission, SanitizedSubmission};
use submission_log::{ContactRecord, SubmissionLog};
use tokio::time::timeout;
use tracing::{error, info, warn};
use validation::{validate, ValidationErrors};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = ContactFormConfig::from_env()?;
    let mailer = SmtpMailTransport::new(
        AwsSecretsManagerSecretRepository::open().await,
        config.smtp_url.clone(),
        config.dispatch_timeout,
    );
    let handler = ContactFormHandler::new(config, mailer);
    run(service_fn(|event| handler.handle(event))).await
}

struct ContactFormHandler<MailTransportT: MailTransport> {
    config: ContactFormConfig,
    mailer: MailTransportT,
    submission_log: SubmissionLog,
}

impl<MailTransportT: MailTransport> ContactFormHandler<MailTransportT> {
    fn new(config: ContactFormConfig, mailer: MailTransportT) -> Self {
        let submission_log = SubmissionLog::new(config.log_path.clone());
        Self {
            config,
            mailer,
            submission_log,
        }
    }

    /// Always answers with a JSON body; the outcome is only ever reported
    /// inside it.
    async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        let response = match self.process_submission(&event).await {
            Ok(()) => ApiResponse::accepted(),
            Err(error) => {
                error.log();
                error.into_api_response()
            }
        };
        response.into_http_response()
    }

    async fn process_submission(&self, event: &Request) -> Result<(), ContactFormError> {
        if event.method() != Method::POST {
            return Err(ContactFormError::InvalidMethod(event.method().to_string()));
        }
        let submission = ContactFormSubmission::from_request(event)
            .await
            .map_err(|error| {
                ContactFormError::Unexpected(format!("Unable to read form data: {error}"))
            })?
            .sanitize();
        let errors = validate(&submission, &self.config);
        if !errors.is_empty() {
            return Err(ContactFormError::Validation(errors));
        }

        let metadata = RequestMetadata::from_request(event);
        let submitted_at = Local::now().naive_local();
        let notification =
            render_notification(&submission, &metadata, &self.config, submitted_at)
                .map_err(|error| ContactFormError::Unexpected(error.to_string()))?;
        self.dispatch(notification).await?;
        info!(
            remote_address = %metadata.remote_address,
            "Contact form message sent"
        );

        // Neither of these may turn a sent message into a failure.
        self.send_auto_reply(&submission).await;
        self.record_submission(&submission, &metadata, submitted_at);
        Ok(())
    }

    async fn dispatch(&self, email: OutgoingEmail) -> Result<(), ContactFormError> {
        match timeout(self.config.dispatch_timeout, self.mailer.send(email)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(ContactFormError::Transport(format!("{error:#}"))),
            Err(_) => Err(ContactFormError::Transport(format!(
                "No answer from mail transport within {:?}",
                self.config.dispatch_timeout
            ))),
        }
    }

    async fn send_auto_reply(&self, submission: &SanitizedSubmission) {
        let result = match render_auto_reply(submission, &self.config) {
            Ok(email) => self.dispatch(email).await,
            Err(error) => Err(ContactFormError::Unexpected(error.to_string())),
        };
        if let Err(error) = result {
            warn!("Auto-reply not sent: {error}");
        }
    }

    fn record_submission(
        &self,
        submission: &SanitizedSubmission,
        metadata: &RequestMetadata,
        submitted_at: NaiveDateTime,
    ) {
        let record = ContactRecord::new(submission, metadata, submitted_at);
        if let Err(error) = self.submission_log.append(&record) {
            warn!(
                "Submission not recorded in {}: {error}",
                self.submission_log.path().display()
            );
        }
    }
}

#[derive(Debug)]
enum ContactFormError {
    InvalidMethod(String),
    Validation(ValidationErrors),
    Transport(String),
    Unexpected(String),
}

impl ContactFormError {
    fn log(&self) {
        match self {
            ContactFormError::InvalidMethod(method) => {
                warn!("Rejected contact form request with method {method}");
            }
            ContactFormError::Validation(errors) => {
                info!(
                    "Rejected contact form submission, invalid fields: {:?}",
                    errors.fields().collect::<Vec<_>>()
                );
            }
            ContactFormError::Transport(description) => {
                error!("Error sending contact form email: {description}");
            }
            ContactFormError::Unexpected(description) => {
                error!("Internal error handling contact form submission: {description}");
            }
        }
    }

    fn into_api_response(self) -> ApiResponse {
        match self {
            ContactFormError::InvalidMethod(_) => ApiResponse::failed(INVALID_METHOD_MESSAGE),
            ContactFormError::Validation(errors) => ApiResponse::rejected(errors),
            ContactFormError::Transport(_) => ApiResponse::failed(SEND_FAILED_MESSAGE),
            ContactFormError::Unexpected(description) => ApiResponse::failed(description),
        }
    }
}

impl Display for ContactFormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactFormError::InvalidMethod(method) => write!(f, "Invalid request method {method}"),
            ContactFormError::Validation(errors) => {
                write!(f, "{} invalid field(s)", errors.len())
            }
            ContactFormError::Transport(description) => {
                write!(f, "Transport error: {description}")
            }
            ContactFormError::Unexpected(description) => {
                write!(f, "Internal error: {description}")
            }
        }
    }
}

impl std::error::Error for ContactFormError {}
