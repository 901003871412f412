//! Storage layer for formlogic.
//!
//! This module provides `SQLite`-based persistent storage for form
//! definitions and the submissions made against them.

pub mod migrations;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::form::FormDefinition;
use crate::submission::Submission;

/// Storage engine for forms and submissions.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Saving form definitions, skipping writes that change nothing
/// - Submission insertion, one row per submission
/// - Per-form submission listing and counts
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

/// What [`Storage::save_form`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The form was not stored before.
    Created,
    /// The stored definition was replaced.
    Updated,
    /// The stored definition already had the same content hash.
    Unchanged,
}

impl fmt::Display for SaveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// A stored form, without its definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    /// Form id.
    pub id: String,
    /// Form title.
    pub title: String,
    /// Number of stored submissions.
    pub submission_count: i64,
    /// When the definition was last written.
    pub updated_at: DateTime<Utc>,
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Total number of stored forms.
    pub total_forms: i64,
    /// Total number of stored submissions.
    pub total_submissions: i64,
    /// Timestamp of the newest submission.
    pub newest_submission: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save a form definition, replacing any stored form with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the form cannot be serialized or the database
    /// operation fails.
    pub fn save_form(&self, form: &FormDefinition) -> Result<SaveOutcome> {
        let hash = form.content_hash()?;
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT content_hash FROM forms WHERE id = ?1",
                [&form.id],
                |row| row.get(0),
            )
            .optional()?;

        if stored.as_deref() == Some(hash.as_str()) {
            debug!(form = %form.id, "Form unchanged, skipping write");
            return Ok(SaveOutcome::Unchanged);
        }

        let definition = serde_json::to_string(form)?;
        let now = timestamp(Utc::now());

        let outcome = if stored.is_some() {
            self.conn.execute(
                r"
                UPDATE forms SET title = ?2, definition = ?3, content_hash = ?4, updated_at = ?5
                WHERE id = ?1
                ",
                params![form.id, form.title, definition, hash, now],
            )?;
            SaveOutcome::Updated
        } else {
            self.conn.execute(
                r"
                INSERT INTO forms (id, title, definition, content_hash, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ",
                params![form.id, form.title, definition, hash, now],
            )?;
            SaveOutcome::Created
        };

        info!(form = %form.id, %outcome, "Form saved");
        Ok(outcome)
    }

    /// Load a form definition by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored
    /// definition is not valid JSON.
    pub fn load_form(&self, form_id: &str) -> Result<Option<FormDefinition>> {
        let definition: Option<String> = self
            .conn
            .query_row(
                "SELECT definition FROM forms WHERE id = ?1",
                [form_id],
                |row| row.get(0),
            )
            .optional()?;

        definition
            .map(|json| FormDefinition::from_json(&json))
            .transpose()
    }

    /// Load a form definition, failing if it is not stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormNotFound`] if no form has this id.
    pub fn require_form(&self, form_id: &str) -> Result<FormDefinition> {
        self.load_form(form_id)?
            .ok_or_else(|| Error::form_not_found(form_id))
    }

    /// Whether a form with this id is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn has_form(&self, form_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM forms WHERE id = ?1",
            [form_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List stored forms ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_forms(&self) -> Result<Vec<FormSummary>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT f.id, f.title, f.updated_at,
                   (SELECT COUNT(*) FROM submissions s WHERE s.form_id = f.id)
            FROM forms f ORDER BY f.id
            ",
        )?;

        let forms = stmt
            .query_map([], |row| {
                let updated_at: String = row.get(2)?;
                Ok(FormSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    updated_at: parse_timestamp(&updated_at).unwrap_or_else(Utc::now),
                    submission_count: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(forms)
    }

    /// Delete a form and all of its submissions.
    ///
    /// Returns `true` if a form was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_form(&self, form_id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let submissions = tx.execute("DELETE FROM submissions WHERE form_id = ?1", [form_id])?;
        let affected = tx.execute("DELETE FROM forms WHERE id = ?1", [form_id])?;
        tx.commit()?;

        if affected > 0 {
            info!(form = %form_id, submissions, "Form deleted");
        }
        Ok(affected > 0)
    }

    /// Insert a submission into storage and return its assigned ID.
    ///
    /// Every call stores a new row. Identical answers from different
    /// respondents are separate submissions; the content hash only records
    /// what was stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormNotFound`] if the form is not stored, or an error
    /// if the database operation fails.
    pub fn insert_submission(&self, submission: &Submission) -> Result<i64> {
        if !self.has_form(&submission.form_id)? {
            return Err(Error::form_not_found(&submission.form_id));
        }

        let payload = serde_json::to_string(&submission.payload)?;
        self.conn.execute(
            r"
            INSERT INTO submissions (form_id, payload, content_hash, submitted_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                submission.form_id,
                payload,
                submission.content_hash,
                timestamp(submission.submitted_at),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(form = %submission.form_id, id, "Inserted submission");
        Ok(id)
    }

    /// Get the most recent submissions for a form, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn submissions_for(&self, form_id: &str, limit: usize) -> Result<Vec<Submission>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, form_id, payload, content_hash, submitted_at
            FROM submissions WHERE form_id = ?1
            ORDER BY submitted_at DESC, id DESC LIMIT ?2
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let submissions = stmt
            .query_map(params![form_id, limit_i64], Self::row_to_submission)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(submissions)
    }

    /// Count submissions for a form.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_submissions(&self, form_id: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE form_id = ?1",
            [form_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let total_forms: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM forms", [], |row| row.get(0))?;
        let total_submissions: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;

        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT submitted_at FROM submissions ORDER BY submitted_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_forms,
            total_submissions,
            newest_submission: newest.as_deref().and_then(parse_timestamp),
            db_size_bytes,
        })
    }

    fn row_to_submission(row: &rusqlite::Row) -> rusqlite::Result<Submission> {
        let payload: String = row.get(2)?;
        let submitted_at: String = row.get(4)?;

        let payload = serde_json::from_str(&payload).map_err(|e| conversion_error(2, e))?;
        let submitted_at = DateTime::parse_from_rfc3339(&submitted_at)
            .map_err(|e| conversion_error(4, e))?
            .with_timezone(&Utc);

        Ok(Submission {
            id: Some(row.get(0)?),
            form_id: row.get(1)?,
            payload,
            content_hash: row.get(3)?,
            submitted_at,
        })
    }
}
