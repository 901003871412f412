//! `SQLite` schema definitions for the form store.
//!
//! Form definitions are stored as JSON documents keyed by form id.
//! Submissions reference their form by id.

/// SQL statement to create the forms table.
pub const CREATE_FORMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS forms (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    definition TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the submissions table.
pub const CREATE_SUBMISSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    form_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    submitted_at TEXT NOT NULL
)
";

/// SQL statement to index submissions by form, newest first.
pub const CREATE_SUBMISSION_FORM_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_submissions_form ON submissions(form_id, submitted_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_FORMS_TABLE,
    CREATE_SUBMISSIONS_TABLE,
    CREATE_SUBMISSION_FORM_INDEX,
    CREATE_METADATA_TABLE,
];
