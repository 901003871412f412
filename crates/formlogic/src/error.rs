//! Error types for formlogic.
//!
//! The rule engine itself never fails: malformed rules degrade to false
//! conditions and no-op actions. Errors here come from the surfaces around it,
//! such as loading form documents, editing rules, building submissions and the
//! local store.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for formlogic operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Form Errors ===
    /// A form definition could not be found.
    #[error("form not found: {form_id}")]
    FormNotFound {
        /// Id of the missing form.
        form_id: String,
    },

    /// A field referenced by an operation does not exist in the form.
    #[error("field not found: {field_id}")]
    FieldNotFound {
        /// Id of the missing field.
        field_id: String,
    },

    /// A rule referenced by an operation does not exist.
    #[error("rule not found: {rule_id}")]
    RuleNotFound {
        /// Id of the missing rule.
        rule_id: String,
    },

    /// A rule edit was rejected.
    #[error("invalid rule: {message}")]
    InvalidRule {
        /// Why the edit was rejected.
        message: String,
    },

    /// A form definition failed save-time validation.
    #[error("form '{form_id}' has {count} validation error(s)")]
    FormInvalid {
        /// Id of the rejected form.
        form_id: String,
        /// Number of error-severity issues.
        count: usize,
    },

    /// A submission failed client-side validation.
    #[error("submission rejected: {}", .errors.join("; "))]
    SubmissionInvalid {
        /// One message per failing field.
        errors: Vec<String>,
    },

    /// An answer string could not be parsed.
    #[error("invalid answer '{input}': {message}")]
    InvalidAnswer {
        /// The raw input.
        input: String,
        /// Description of the problem.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for formlogic operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a form-not-found error.
    #[must_use]
    pub fn form_not_found(form_id: impl Into<String>) -> Self {
        Self::FormNotFound {
            form_id: form_id.into(),
        }
    }

    /// Create a field-not-found error.
    #[must_use]
    pub fn field_not_found(field_id: impl Into<String>) -> Self {
        Self::FieldNotFound {
            field_id: field_id.into(),
        }
    }

    /// Create a rule-not-found error.
    #[must_use]
    pub fn rule_not_found(rule_id: impl Into<String>) -> Self {
        Self::RuleNotFound {
            rule_id: rule_id.into(),
        }
    }

    /// Create an invalid-rule error.
    #[must_use]
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRule {
            message: message.into(),
        }
    }

    /// Create an invalid-answer error.
    #[must_use]
    pub fn invalid_answer(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAnswer {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Check if this error means something was looked up and not found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FormNotFound { .. } | Self::FieldNotFound { .. } | Self::RuleNotFound { .. }
        )
    }

    /// Check if this error is a validation failure of user-supplied data.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRule { .. }
                | Self::FormInvalid { .. }
                | Self::SubmissionInvalid { .. }
                | Self::InvalidAnswer { .. }
        )
    }
}
