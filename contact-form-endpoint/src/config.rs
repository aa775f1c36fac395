use crate::submission::FormField;
use lettre::message::Mailbox;
use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";
const DEFAULT_SITE_NAME: &str = "Portfolio";
const DEFAULT_MAX_MESSAGE_LENGTH: usize = 500;
const DEFAULT_REQUIRED_FIELDS: [FormField; 4] = [
    FormField::Name,
    FormField::Email,
    FormField::Subject,
    FormField::Message,
];
const DEFAULT_SUBJECT_TAG: &str = "Portfolio Contact";
// The Lambda deployment package is read-only; only /tmp is writable.
const DEFAULT_LOG_FILE: &str = "/tmp/contact_log.csv";
const DEFAULT_SENDER_DOMAIN: &str = "localhost";
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SMTP_URL: &str = "smtp://localhost";

/// Settings of the contact form endpoint, read once at startup.
#[derive(Debug, Clone)]
pub struct ContactFormConfig {
    /// Recipient of the notification email.
    pub admin_mailbox: Mailbox,
    pub site_name: String,
    pub max_message_length: usize,
    pub required_fields: Vec<FormField>,
    /// Prefix of the notification subject line.
    pub subject_tag: String,
    pub log_path: PathBuf,
    /// Domain of the `noreply` sender when the request carries no usable host.
    pub sender_domain: String,
    pub dispatch_timeout: Duration,
    pub smtp_url: String,
}

impl ContactFormConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());
        Ok(Self {
            admin_mailbox: parse_value(
                "CONTACT_ADMIN_EMAIL",
                &string_or("CONTACT_ADMIN_EMAIL", DEFAULT_ADMIN_EMAIL),
            )?,
            site_name: string_or("CONTACT_SITE_NAME", DEFAULT_SITE_NAME),
            max_message_length: match lookup("CONTACT_MAX_MESSAGE_LENGTH") {
                Some(value) => parse_value("CONTACT_MAX_MESSAGE_LENGTH", &value)?,
                None => DEFAULT_MAX_MESSAGE_LENGTH,
            },
            required_fields: match lookup("CONTACT_REQUIRED_FIELDS") {
                Some(value) => parse_field_list("CONTACT_REQUIRED_FIELDS", &value)?,
                None => DEFAULT_REQUIRED_FIELDS.to_vec(),
            },
            subject_tag: string_or("CONTACT_SUBJECT_TAG", DEFAULT_SUBJECT_TAG),
            log_path: string_or("CONTACT_LOG_FILE", DEFAULT_LOG_FILE).into(),
            sender_domain: string_or("CONTACT_SENDER_DOMAIN", DEFAULT_SENDER_DOMAIN),
            dispatch_timeout: Duration::from_secs(match lookup("CONTACT_DISPATCH_TIMEOUT_SECS") {
                Some(value) => parse_value("CONTACT_DISPATCH_TIMEOUT_SECS", &value)?,
                None => DEFAULT_DISPATCH_TIMEOUT_SECS,
            }),
            smtp_url: string_or("SMTP_URL", DEFAULT_SMTP_URL),
        })
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|error: T::Err| ConfigError {
        key,
        value: value.into(),
        reason: error.to_string(),
    })
}

fn parse_field_list(key: &'static str, value: &str) -> Result<Vec<FormField>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| parse_value(key, name))
        .collect()
}

#[derive(Debug)]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid value {:?} for {}: {}",
            self.value, self.key, self.reason
        )
    }
}

impl std::error::Error for ConfigError {}
