use crate::{
    config::ContactFormConfig, mailer::OutgoingEmail, metadata::RequestMetadata,
    submission::SanitizedSubmission,
};
use chrono::NaiveDateTime;
use lettre::{address::AddressError, message::Mailbox, Address};
use serde::Serialize;
use std::fmt::Display;
use tinytemplate::TinyTemplate;

const NOTIFICATION_TEMPLATE_NAME: &str = "notification";
const AUTO_REPLY_TEMPLATE_NAME: &str = "auto-reply";
const NOTIFICATION_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/notification.html"
));
const AUTO_REPLY_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/auto-reply.html"
));

const NOT_PROVIDED: &str = "Not provided";
const SUBMITTED_AT_FORMAT: &str = "%B %-d, %Y, %-I:%M %P";
const NOREPLY_USER: &str = "noreply";

// Rows hold sanitized text and are inserted without further escaping. Every
// other value goes through the default HTML escaping of TinyTemplate.
#[derive(Serialize)]
struct NotificationContext<'a> {
    site_name: &'a str,
    rows: Vec<Row<'a>>,
    remote_address: &'a str,
    user_agent: &'a str,
}

#[derive(Serialize)]
struct Row<'a> {
    label: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct AutoReplyContext<'a> {
    site_name: &'a str,
    name: &'a str,
}

/// Builds the email telling the site owner about a new submission.
pub fn render_notification(
    submission: &SanitizedSubmission,
    metadata: &RequestMetadata,
    config: &ContactFormConfig,
    submitted_at: NaiveDateTime,
) -> Result<OutgoingEmail, RenderError> {
    let submitted_at = submitted_at.format(SUBMITTED_AT_FORMAT).to_string();
    let phone = if submission.phone.is_empty() {
        NOT_PROVIDED
    } else {
        submission.phone.as_str()
    };
    let context = NotificationContext {
        site_name: &config.site_name,
        rows: vec![
            Row {
                label: "Date & Time",
                value: &submitted_at,
            },
            Row {
                label: "Name",
                value: submission.name.as_str(),
            },
            Row {
                label: "Email",
                value: submission.email.as_str(),
            },
            Row {
                label: "Phone",
                value: phone,
            },
            Row {
                label: "Subject",
                value: submission.subject.as_str(),
            },
            Row {
                label: "Message",
                value: submission.message.as_str(),
            },
        ],
        remote_address: &metadata.remote_address,
        user_agent: &metadata.user_agent,
    };

    Ok(OutgoingEmail {
        to: config.admin_mailbox.clone(),
        from: Mailbox::new(
            Some(config.site_name.clone()),
            noreply_address(metadata.host.as_deref(), &config.sender_domain)?,
        ),
        reply_to: Some(submitter_mailbox(submission)?),
        subject: header_text(&format!("{}: {}", config.subject_tag, submission.subject)),
        html_body: render(NOTIFICATION_TEMPLATE_NAME, NOTIFICATION_TEMPLATE, &context)?,
    })
}

/// Builds the acknowledgement sent back to the visitor.
pub fn render_auto_reply(
    submission: &SanitizedSubmission,
    config: &ContactFormConfig,
) -> Result<OutgoingEmail, RenderError> {
    let context = AutoReplyContext {
        site_name: &config.site_name,
        name: submission.name.as_str(),
    };

    Ok(OutgoingEmail {
        to: submitter_mailbox(submission)?,
        from: Mailbox::new(
            Some(config.site_name.clone()),
            config.admin_mailbox.email.clone(),
        ),
        reply_to: None,
        subject: header_text(&format!("Thank you for contacting {}", config.site_name)),
        html_body: render(AUTO_REPLY_TEMPLATE_NAME, AUTO_REPLY_TEMPLATE, &context)?,
    })
}

fn render<C: Serialize>(
    name: &'static str,
    template: &'static str,
    context: &C,
) -> Result<String, RenderError> {
    let mut tt = TinyTemplate::new();
    tt.add_template(name, template)?;
    Ok(tt.render(name, context)?)
}

fn submitter_mailbox(submission: &SanitizedSubmission) -> Result<Mailbox, RenderError> {
    let address: Address = submission.email.as_str().parse()?;
    let name = (!submission.name.is_empty()).then(|| header_text(submission.name.as_str()));
    Ok(Mailbox::new(name, address))
}

fn noreply_address(host: Option<&str>, fallback_domain: &str) -> Result<Address, AddressError> {
    // The host header may carry a port, or be anything at all.
    host.and_then(|host| host.split(':').next())
        .and_then(|domain| Address::new(NOREPLY_USER, domain).ok())
        .map_or_else(|| Address::new(NOREPLY_USER, fallback_domain), Ok)
}

fn header_text(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[derive(Debug)]
pub enum RenderError {
    Template(tinytemplate::error::Error),
    Address(AddressError),
}

impl From<tinytemplate::error::Error> for RenderError {
    fn from(error: tinytemplate::error::Error) -> Self {
        RenderError::Template(error)
    }
}

impl From<AddressError> for RenderError {
    fn from(error: AddressError) -> Self {
        RenderError::Address(error)
    }
}

impl Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Template(error) => write!(f, "Error rendering email: {error}"),
            RenderError::Address(error) => write!(f, "Invalid email address: {error}"),
        }
    }
}

impl std::error::Error for RenderError {}
