//! Validation of incoming analysis submissions.
//!
//! Both the HTTP boundary and the CLI collect raw fields into a
//! [`Submission`]; [`Submission::validate`] either produces a
//! [`ValidatedSubmission`] or a [`ValidationErrors`] listing every failing
//! field. Blank strings are treated as absent.
//!
//! | Field | Rule |
//! |-------|------|
//! | `cv` | required, `pdf` or `docx`, at most `max_upload_bytes` |
//! | `job_title` | required, ≤ 255 chars |
//! | `job_description` | required |
//! | `target_company` | optional, ≤ 255 chars, defaults to "the Employer" |
//! | `industry`, `experience_level` | required |
//! | `target_country`, `current_career_level` | required |
//! | `analysis_preferences` | optional list |
//! | `name` | optional, ≤ 255 chars |
//! | `email` | optional, e-mail shaped, ≤ 255 chars |

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use cv_analyzer_core::models::{JobContext, SubjectContext, DEFAULT_TARGET_COMPANY};

use crate::extract::DocumentKind;

const MAX_STRING_CHARS: usize = 255;

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The `cv` size error on its own, for uploads rejected before the
    /// document is fully read.
    pub fn document_too_large(max_upload_bytes: usize) -> Self {
        let mut errors = Self::new();
        errors.add("cv", too_large_message(max_upload_bytes));
        errors
    }
}

fn too_large_message(max_upload_bytes: usize) -> String {
    format!(
        "The cv field must not be greater than {} kilobytes.",
        max_upload_bytes / 1024
    )
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.0.values().flatten().next();
        match (first, self.0.values().map(Vec::len).sum::<usize>()) {
            (None, _) => f.write_str("The given data was invalid."),
            (Some(msg), 1) => f.write_str(msg),
            (Some(msg), n) => write!(f, "{} (and {} more errors)", msg, n - 1),
        }
    }
}

impl std::error::Error for ValidationErrors {}

/// An uploaded document before validation.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// Client-supplied file name; only its extension is used.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Raw submission fields as received.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub cv: Option<DocumentUpload>,
    pub job_title: Option<String>,
    pub job_description: Option<String>,
    pub target_company: Option<String>,
    pub industry: Option<String>,
    pub experience_level: Option<String>,
    pub analysis_preferences: Vec<String>,
    pub target_country: Option<String>,
    pub current_career_level: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A submission that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
    pub subject: SubjectContext,
    pub job: JobContext,
}

fn human(field: &str) -> String {
    field.replace('_', " ")
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn required(errors: &mut ValidationErrors, field: &str, value: &Option<String>) -> String {
    match present(value) {
        Some(v) => v,
        None => {
            errors.add(field, format!("The {} field is required.", human(field)));
            String::new()
        }
    }
}

fn max_chars(errors: &mut ValidationErrors, field: &str, value: Option<&str>) {
    if let Some(v) = value {
        if v.chars().count() > MAX_STRING_CHARS {
            errors.add(
                field,
                format!(
                    "The {} field must not be greater than {} characters.",
                    human(field),
                    MAX_STRING_CHARS
                ),
            );
        }
    }
}

/// Loose e-mail shape check: `local@domain.tld`, no whitespace.
pub fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

impl Submission {
    /// Validate every field, collecting all failures.
    pub fn validate(&self, max_upload_bytes: usize) -> Result<ValidatedSubmission, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let document = match &self.cv {
            None => {
                errors.add("cv", "The cv field is required.");
                None
            }
            Some(upload) if upload.bytes.is_empty() => {
                errors.add("cv", "The cv field is required.");
                None
            }
            Some(upload) => {
                let kind = Path::new(&upload.file_name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(DocumentKind::from_extension);
                if kind.is_none() {
                    errors.add(
                        "cv",
                        format!(
                            "The cv field must be a file of type: {}.",
                            DocumentKind::EXTENSIONS.join(", ")
                        ),
                    );
                }
                if upload.bytes.len() > max_upload_bytes {
                    errors.add("cv", too_large_message(max_upload_bytes));
                }
                kind.map(|k| (k, upload.bytes.clone()))
            }
        };

        let job_title = required(&mut errors, "job_title", &self.job_title);
        max_chars(&mut errors, "job_title", Some(job_title.as_str()));
        let job_description = required(&mut errors, "job_description", &self.job_description);
        let target_company = present(&self.target_company);
        max_chars(&mut errors, "target_company", target_company.as_deref());
        let industry = required(&mut errors, "industry", &self.industry);
        let experience_level = required(&mut errors, "experience_level", &self.experience_level);
        let target_country = required(&mut errors, "target_country", &self.target_country);
        let current_career_level =
            required(&mut errors, "current_career_level", &self.current_career_level);

        let name = present(&self.name);
        max_chars(&mut errors, "name", name.as_deref());

        let email = present(&self.email);
        if let Some(e) = &email {
            if !looks_like_email(e) {
                errors.add("email", "The email field must be a valid email address.");
            }
        }
        max_chars(&mut errors, "email", email.as_deref());

        let analysis_preferences: Vec<String> = self
            .analysis_preferences
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();

        match document {
            Some((kind, bytes)) if errors.is_empty() => Ok(ValidatedSubmission {
                kind,
                bytes,
                subject: SubjectContext {
                    name,
                    email,
                    target_country,
                    current_career_level,
                    analysis_preferences,
                },
                job: JobContext {
                    job_title,
                    job_description,
                    target_company: target_company
                        .unwrap_or_else(|| DEFAULT_TARGET_COMPANY.to_string()),
                    industry,
                    experience_level,
                },
            }),
            _ => Err(errors),
        }
    }
}
