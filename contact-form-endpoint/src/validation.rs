use crate::{
    config::ContactFormConfig,
    submission::{FormField, SanitizedSubmission},
};
use lettre::Address;
use serde::Serialize;
use std::collections::BTreeMap;

pub const INVALID_EMAIL_FORMAT: &str = "Invalid email format";
pub const MESSAGE_TOO_LONG: &str = "Message is too long";

/// Problems found with a submission, keyed by the field they concern. An empty
/// set means the submission is accepted.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<FormField, String>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn get(&self, field: FormField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = FormField> + '_ {
        self.0.keys().copied()
    }

    fn insert(&mut self, field: FormField, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }
}

pub fn validate(submission: &SanitizedSubmission, config: &ContactFormConfig) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    for &field in &config.required_fields {
        if submission.field(field).is_empty() {
            errors.insert(field, format!("{} is required", field.label()));
        }
    }

    if !submission.email.is_empty() && !is_valid_email(submission.email.as_str()) {
        errors.insert(FormField::Email, INVALID_EMAIL_FORMAT);
    }

    if !submission.message.is_empty() && submission.message.char_count() > config.max_message_length
    {
        errors.insert(FormField::Message, MESSAGE_TOO_LONG);
    }

    errors
}

/// Syntax lettre can deliver to, with a domain of at least two labels so that
/// local names such as `ann@localhost` are refused.
fn is_valid_email(email: &str) -> bool {
    email.parse::<Address>().is_ok_and(|address| {
        let mut labels = address.domain().split('.');
        labels.clone().count() >= 2 && labels.all(|label| !label.is_empty())
    })
}
