use crate::{metadata::RequestMetadata, submission::SanitizedSubmission};
use chrono::NaiveDateTime;
use std::{
    fmt::Display,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

const HEADER: [&str; 7] = [
    "Date",
    "Name",
    "Email",
    "Phone",
    "Subject",
    "Message Preview",
    "IP Address",
];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PREVIEW_LENGTH: usize = 100;
const PREVIEW_MARKER: &str = "...";
const PHONE_PLACEHOLDER: &str = "N/A";

/// One row of the submission log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    timestamp: String,
    name: String,
    email: String,
    phone: String,
    subject: String,
    message_preview: String,
    remote_address: String,
}

impl ContactRecord {
    pub fn new(
        submission: &SanitizedSubmission,
        metadata: &RequestMetadata,
        submitted_at: NaiveDateTime,
    ) -> Self {
        let phone = if submission.phone.is_empty() {
            PHONE_PLACEHOLDER
        } else {
            submission.phone.as_str()
        };
        let mut message_preview: String = submission
            .message
            .as_str()
            .chars()
            .take(PREVIEW_LENGTH)
            .collect();
        message_preview.push_str(PREVIEW_MARKER);
        Self {
            timestamp: submitted_at.format(TIMESTAMP_FORMAT).to_string(),
            name: submission.name.to_string(),
            email: submission.email.to_string(),
            phone: phone.into(),
            subject: submission.subject.to_string(),
            message_preview,
            remote_address: metadata.remote_address.clone(),
        }
    }

    fn fields(&self) -> [&str; 7] {
        [
            &self.timestamp,
            &self.name,
            &self.email,
            &self.phone,
            &self.subject,
            &self.message_preview,
            &self.remote_address,
        ]
    }
}

/// Append-only CSV file with one row per submission that was sent.
pub struct SubmissionLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl SubmissionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `record`, writing the header row first if the file is new.
    pub fn append(&self, record: &ContactRecord) -> Result<(), SubmissionLogError> {
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut rows = Vec::with_capacity(2);
        if file.metadata()?.len() == 0 {
            rows.push(HEADER);
        }
        rows.push(record.fields());
        // A single write on an append-mode descriptor keeps rows from
        // interleaving with other processes writing to the same file.
        file.write_all(&encode_rows(&rows)?)?;
        Ok(())
    }
}

fn encode_rows(rows: &[[&str; 7]]) -> Result<Vec<u8>, SubmissionLogError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|error| SubmissionLogError::Io(error.into_error()))
}

#[derive(Debug)]
pub enum SubmissionLogError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl From<std::io::Error> for SubmissionLogError {
    fn from(error: std::io::Error) -> Self {
        SubmissionLogError::Io(error)
    }
}

impl From<csv::Error> for SubmissionLogError {
    fn from(error: csv::Error) -> Self {
        SubmissionLogError::Csv(error)
    }
}

impl Display for SubmissionLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionLogError::Io(error) => write!(f, "Error writing submission log: {error}"),
            SubmissionLogError::Csv(error) => write!(f, "Error encoding submission log row: {error}"),
        }
    }
}

impl std::error::Error for SubmissionLogError {}

#[cfg(test)]
mod tests {
    use super::{ContactRecord, SubmissionLog};
    use crate::{metadata::RequestMetadata, submission::ContactFormSubmission};
    use chrono::{NaiveDate, NaiveDateTime};
    use googletest::prelude::*;
    use tempfile::TempDir;

    const HEADER_LINE: &str = "Date,Name,Email,Phone,Subject,Message Preview,IP Address";

    fn record_for(submission: ContactFormSubmission) -> ContactRecord {
        ContactRecord::new(
            &submission.sanitize(),
            &RequestMetadata {
                remote_address: "203.0.113.7".into(),
                user_agent: "Mozilla/5.0 (Test)".into(),
                host: None,
            },
            submitted_at(),
        )
    }

    fn arbitrary_submission() -> ContactFormSubmission {
        ContactFormSubmission {
            name: Some("Ann Example".into()),
            email: Some("ann@example.com".into()),
            phone: None,
            subject: Some("Hi".into()),
            message: Some("Hello".into()),
        }
    }

    fn submitted_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(16, 5, 9)
            .unwrap()
    }

    fn read_rows(log: &SubmissionLog) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(log.path())
            .unwrap()
            .records()
            .map(|record| record.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[googletest::test]
    fn writes_header_before_first_row() -> Result<()> {
        let directory = TempDir::new().unwrap();
        let log = SubmissionLog::new(directory.path().join("contact_log.csv"));

        log.append(&record_for(arbitrary_submission())).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        verify_that!(
            content.lines().collect::<Vec<_>>(),
            elements_are![
                eq(HEADER_LINE),
                eq("2026-10-18 16:05:09,Ann Example,ann@example.com,N/A,Hi,Hello...,203.0.113.7")
            ]
        )
    }

    #[googletest::test]
    fn appends_one_row_per_submission() -> Result<()> {
        let directory = TempDir::new().unwrap();
        let log = SubmissionLog::new(directory.path().join("contact_log.csv"));

        for _ in 0..3 {
            log.append(&record_for(arbitrary_submission())).unwrap();
        }

        let rows = read_rows(&log);
        expect_that!(rows.len(), eq(4));
        verify_that!(
            rows.iter().filter(|row| row[0] == "Date").count(),
            eq(1)
        )
    }

    #[googletest::test]
    fn writes_header_into_existing_empty_file() -> Result<()> {
        let directory = TempDir::new().unwrap();
        let path = directory.path().join("contact_log.csv");
        std::fs::write(&path, "").unwrap();
        let log = SubmissionLog::new(path);

        log.append(&record_for(arbitrary_submission())).unwrap();

        verify_that!(
            std::fs::read_to_string(log.path()).unwrap(),
            starts_with(HEADER_LINE)
        )
    }

    #[googletest::test]
    fn quotes_fields_containing_separators() -> Result<()> {
        let directory = TempDir::new().unwrap();
        let log = SubmissionLog::new(directory.path().join("contact_log.csv"));

        log.append(&record_for(ContactFormSubmission {
            name: Some("Example, Ann".into()),
            subject: Some("Line one\nline two".into()),
            ..arbitrary_submission()
        }))
        .unwrap();

        let rows = read_rows(&log);
        expect_that!(rows.len(), eq(2));
        expect_that!(rows[1].len(), eq(7));
        expect_that!(rows[1][1], eq("Example, Ann"));
        verify_that!(rows[1][4], eq("Line one\nline two"))
    }

    #[googletest::test]
    fn logs_sanitized_values() -> Result<()> {
        let record = record_for(ContactFormSubmission {
            name: Some("<b>Ann</b> \"The Tester\"".into()),
            ..arbitrary_submission()
        });

        verify_that!(
            record.name,
            eq("&lt;b&gt;Ann&lt;/b&gt; &quot;The Tester&quot;")
        )
    }

    #[googletest::test]
    fn truncates_message_preview() -> Result<()> {
        let record = record_for(ContactFormSubmission {
            message: Some("é".repeat(150)),
            ..arbitrary_submission()
        });

        verify_that!(record.message_preview, eq(format!("{}...", "é".repeat(100))))
    }

    #[googletest::test]
    fn records_phone_when_given() -> Result<()> {
        let record = record_for(ContactFormSubmission {
            phone: Some("555-0100".into()),
            ..arbitrary_submission()
        });

        verify_that!(record.phone, eq("555-0100"))
    }

    #[googletest::test]
    fn reports_unwritable_location() -> Result<()> {
        let directory = TempDir::new().unwrap();
        let log = SubmissionLog::new(directory.path().join("missing").join("contact_log.csv"));

        verify_that!(
            log.append(&record_for(arbitrary_submission())),
            err(anything())
        )
    }
}
