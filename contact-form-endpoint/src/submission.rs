use crate::sanitize::{sanitize, Sanitized};
use lambda_http::{http::header::CONTENT_TYPE, Request, RequestPayloadExt};
use multer::Multipart;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// The fields a visitor can fill in on the contact form.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FormField {
    Name,
    Email,
    Phone,
    Subject,
    Message,
}

impl FormField {
    pub const ALL: [FormField; 5] = [
        FormField::Name,
        FormField::Email,
        FormField::Phone,
        FormField::Subject,
        FormField::Message,
    ];

    /// Name of the field in the submitted form.
    pub fn as_str(self) -> &'static str {
        match self {
            FormField::Name => "name",
            FormField::Email => "email",
            FormField::Phone => "phone",
            FormField::Subject => "subject",
            FormField::Message => "message",
        }
    }

    /// Capitalised name used in messages shown to the visitor.
    pub fn label(self) -> &'static str {
        match self {
            FormField::Name => "Name",
            FormField::Email => "Email",
            FormField::Phone => "Phone",
            FormField::Subject => "Subject",
            FormField::Message => "Message",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownFormField(pub String);

impl Display for UnknownFormField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown form field {:?}", self.0)
    }
}

impl std::error::Error for UnknownFormField {}

impl FromStr for FormField {
    type Err = UnknownFormField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| UnknownFormField(s.into()))
    }
}

/// The form as posted, before anything has been checked.
#[derive(Deserialize, Debug, Default)]
pub struct ContactFormSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

impl ContactFormSubmission {
    /// Reads the form from a url-encoded, JSON or `multipart/form-data` body.
    /// A request without a body of one of those types is an empty form.
    pub async fn from_request(request: &Request) -> Result<Self, FormDataError> {
        let boundary = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|content_type| multer::parse_boundary(content_type).ok());
        match boundary {
            Some(boundary) => Self::from_multipart(request.body().as_ref(), boundary).await,
            None => request
                .payload::<Self>()
                .map(Option::unwrap_or_default)
                .map_err(|error| FormDataError::Encoded(error.to_string())),
        }
    }

    async fn from_multipart(body: &[u8], boundary: String) -> Result<Self, FormDataError> {
        let mut multipart = Multipart::with_reader(body, boundary);
        let mut submission = Self::default();
        while let Some(part) = multipart.next_field().await? {
            // Anything else a page posts alongside the form is ignored.
            let Some(field) = part.name().and_then(|name| name.parse::<FormField>().ok()) else {
                continue;
            };
            *submission.value_mut(field) = Some(part.text().await?);
        }
        Ok(submission)
    }

    fn value_mut(&mut self, field: FormField) -> &mut Option<String> {
        match field {
            FormField::Name => &mut self.name,
            FormField::Email => &mut self.email,
            FormField::Phone => &mut self.phone,
            FormField::Subject => &mut self.subject,
            FormField::Message => &mut self.message,
        }
    }

    pub fn sanitize(&self) -> SanitizedSubmission {
        let sanitize_field =
            |value: &Option<String>| sanitize(value.as_deref().unwrap_or_default());
        SanitizedSubmission {
            name: sanitize_field(&self.name),
            email: sanitize_field(&self.email),
            phone: sanitize_field(&self.phone),
            subject: sanitize_field(&self.subject),
            message: sanitize_field(&self.message),
        }
    }
}

#[derive(Debug)]
pub enum FormDataError {
    Encoded(String),
    Multipart(multer::Error),
}

impl From<multer::Error> for FormDataError {
    fn from(value: multer::Error) -> Self {
        Self::Multipart(value)
    }
}

impl Display for FormDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormDataError::Encoded(description) => f.write_str(description),
            FormDataError::Multipart(error) => write!(f, "Malformed multipart body: {error}"),
        }
    }
}

impl std::error::Error for FormDataError {}

/// A submission whose every field has been through [`sanitize`]. Only this
/// type is handed to the renderer and to the submission log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSubmission {
    pub name: Sanitized,
    pub email: Sanitized,
    pub phone: Sanitized,
    pub subject: Sanitized,
    pub message: Sanitized,
}

impl SanitizedSubmission {
    pub fn field(&self, field: FormField) -> &Sanitized {
        match field {
            FormField::Name => &self.name,
            FormField::Email => &self.email,
            FormField::Phone => &self.phone,
            FormField::Subject => &self.subject,
            FormField::Message => &self.message,
        }
    }
}
