//! Building form submissions from the render state.
//!
//! The submitted payload is a JSON object keyed by field id. Which keys are
//! included, and which are checked for presence, follows the render state:
//! hidden fields are left out and effective requiredness replaces the static
//! flag.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::SubmissionConfig;
use crate::error::{Error, Result};
use crate::form::{compute_hash, AnswerValue, FieldType, FormDefinition, FormField};
use crate::render::{FieldRenderState, RenderState};

/// Loose address check, matching what browsers accept for `type=email`.
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
}

/// A submission ready to be posted or stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Identifier assigned by the storage layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Form the submission belongs to.
    pub form_id: String,

    /// Answers keyed by field id.
    pub payload: Map<String, Value>,

    /// BLAKE3 hash of form id and payload, recorded for integrity checks.
    pub content_hash: String,

    /// When the submission was built.
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    /// Create a submission, hashing its content and stamping it with now.
    #[must_use]
    pub fn new(form_id: impl Into<String>, payload: Map<String, Value>) -> Self {
        let form_id = form_id.into();
        let content_hash = Self::compute_hash(&form_id, &payload);
        Self {
            id: None,
            form_id,
            payload,
            content_hash,
            submitted_at: Utc::now(),
        }
    }

    /// Hash a form id and payload the way [`Submission::new`] does.
    #[must_use]
    pub fn compute_hash(form_id: &str, payload: &Map<String, Value>) -> String {
        compute_hash(&format!("{form_id}\n{}", Value::Object(payload.clone())))
    }
}

/// Validate the answers in `state` and build the submission payload.
///
/// # Errors
///
/// Returns [`Error::SubmissionInvalid`] listing every failing field.
pub fn build_submission(
    form: &FormDefinition,
    state: &RenderState,
    config: &SubmissionConfig,
) -> Result<Submission> {
    let mut payload = Map::new();
    let mut errors = Vec::new();

    for field in &form.fields {
        let Some(fs) = state.field(&field.id) else {
            continue;
        };
        if !fs.visible && !config.include_hidden {
            continue;
        }

        let value = fs.value.as_ref().filter(|v| !v.is_empty());
        let Some(value) = value else {
            if fs.visible && fs.required {
                errors.push(format!("{}: is required", field.id));
            } else if let Some(unchecked) = fs.value.as_ref() {
                // Unchecked boxes and empty strings are still reported.
                payload.insert(field.id.clone(), to_json(field, unchecked));
            }
            continue;
        };

        match check_value(field, fs, value, config) {
            Ok(()) => {
                payload.insert(field.id.clone(), to_json(field, value));
            }
            Err(message) => errors.push(format!("{}: {message}", field.id)),
        }
    }

    if !errors.is_empty() {
        debug!(form = %form.id, errors = errors.len(), "Submission rejected");
        return Err(Error::SubmissionInvalid { errors });
    }

    debug!(form = %form.id, fields = payload.len(), "Submission built");
    Ok(Submission::new(form.id.clone(), payload))
}

fn check_value(
    field: &FormField,
    fs: &FieldRenderState,
    value: &AnswerValue,
    config: &SubmissionConfig,
) -> std::result::Result<(), &'static str> {
    match field.field_type {
        FieldType::Email if config.validate_email => {
            if !email_regex().is_match(&value.as_text()) {
                return Err("is not a valid email address");
            }
        }
        FieldType::Number => {
            if value.as_number().is_none() {
                return Err("must be a number");
            }
        }
        FieldType::Date => {
            if NaiveDate::parse_from_str(&value.as_text(), "%Y-%m-%d").is_err() {
                return Err("must be a date (YYYY-MM-DD)");
            }
        }
        FieldType::Select => {
            if !fs.options.contains(&value.as_text()) {
                return Err("is not one of the available options");
            }
        }
        FieldType::Checkbox => {
            if value.as_bool().is_none() {
                return Err("must be true or false");
            }
        }
        FieldType::Email | FieldType::Text | FieldType::Textarea => {}
    }
    Ok(())
}

fn to_json(field: &FormField, value: &AnswerValue) -> Value {
    match (field.field_type, value) {
        (FieldType::Number, v) => v
            .as_number()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(v.as_text()), Value::Number),
        (FieldType::Checkbox, v) => v
            .as_bool()
            .map_or_else(|| Value::String(v.as_text()), Value::Bool),
        (_, v) => Value::String(v.as_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::RuleEngine;
    use crate::form::Answers;
    use crate::rule::{ActionKind, Operator, StoredRule};
    use serde_json::json;

    fn form() -> FormDefinition {
        FormDefinition::new("quote", "Quote")
            .with_field(FormField::new("email", "Email", FieldType::Email).required())
            .with_field(FormField::new("budget", "Budget", FieldType::Number))
            .with_field(
                FormField::new("approval_code", "Approval code", FieldType::Text).with_rule(
                    StoredRule::new(
                        "r1",
                        "budget",
                        Operator::GreaterThan,
                        ActionKind::Require,
                        "approval_code",
                    )
                    .with_value(1000),
                ),
            )
            .with_field(
                FormField::new("country", "Country", FieldType::Select)
                    .with_options(["USA", "Other"]),
            )
            .with_field(
                FormField::new("state", "State", FieldType::Text).with_rule(
                    StoredRule::new("r2", "country", Operator::Equals, ActionKind::Show, "state")
                        .with_value("USA"),
                ),
            )
            .with_field(FormField::new("start", "Start date", FieldType::Date))
            .with_field(FormField::new("terms", "Terms", FieldType::Checkbox))
    }

    fn submit(answers: &str, config: &SubmissionConfig) -> Result<Submission> {
        let form = form();
        let engine = RuleEngine::new(&form, &EngineConfig::default());
        let answers = Answers::from_json(answers).unwrap();
        build_submission(&form, &engine.evaluate(&answers).state, config)
    }

    fn errors_of(result: Result<Submission>) -> Vec<String> {
        match result {
            Err(Error::SubmissionInvalid { errors }) => errors,
            other => panic!("expected SubmissionInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_submission() {
        let submission = submit(
            r#"{"email": "ada@example.com", "budget": "1500", "approval_code": "X1",
                "country": "USA", "state": "Ohio", "start": "2024-05-01", "terms": true}"#,
            &SubmissionConfig::default(),
        )
        .unwrap();

        assert_eq!(submission.form_id, "quote");
        assert!(submission.id.is_none());
        assert_eq!(submission.payload["budget"], json!(1500.0));
        assert_eq!(submission.payload["state"], json!("Ohio"));
        assert_eq!(submission.payload["terms"], json!(true));
        assert_eq!(submission.content_hash.len(), 64);
    }

    #[test]
    fn test_hidden_fields_are_excluded() {
        let submission = submit(
            r#"{"email": "ada@example.com", "country": "Other", "state": "Ohio"}"#,
            &SubmissionConfig::default(),
        )
        .unwrap();
        assert!(!submission.payload.contains_key("state"));
        assert_eq!(submission.payload["country"], json!("Other"));
    }

    #[test]
    fn test_include_hidden() {
        let config = SubmissionConfig {
            include_hidden: true,
            ..SubmissionConfig::default()
        };
        let submission = submit(
            r#"{"email": "ada@example.com", "country": "Other", "state": "Ohio"}"#,
            &config,
        )
        .unwrap();
        assert_eq!(submission.payload["state"], json!("Ohio"));
    }

    #[test]
    fn test_rule_required_field_missing() {
        let errors = errors_of(submit(
            r#"{"email": "ada@example.com", "budget": 1500}"#,
            &SubmissionConfig::default(),
        ));
        assert_eq!(errors, vec!["approval_code: is required".to_string()]);

        assert!(submit(
            r#"{"email": "ada@example.com", "budget": 500}"#,
            &SubmissionConfig::default(),
        )
        .is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let errors = errors_of(submit(
            r#"{"email": "not-an-email", "budget": "lots", "country": "Mars",
                "start": "05/01/2024", "terms": "maybe"}"#,
            &SubmissionConfig::default(),
        ));
        assert_eq!(
            errors,
            vec![
                "email: is not a valid email address".to_string(),
                "budget: must be a number".to_string(),
                "country: is not one of the available options".to_string(),
                "start: must be a date (YYYY-MM-DD)".to_string(),
                "terms: must be true or false".to_string(),
            ]
        );
    }

    #[test]
    fn test_email_check_can_be_disabled() {
        let config = SubmissionConfig {
            validate_email: false,
            ..SubmissionConfig::default()
        };
        assert!(submit(r#"{"email": "whatever"}"#, &config).is_ok());
    }

    #[test]
    fn test_statically_required_empty_string() {
        let errors = errors_of(submit(r#"{"email": ""}"#, &SubmissionConfig::default()));
        assert_eq!(errors, vec!["email: is required".to_string()]);
    }

    #[test]
    fn test_unchecked_optional_checkbox_is_reported() {
        let submission = submit(
            r#"{"email": "ada@example.com", "terms": false}"#,
            &SubmissionConfig::default(),
        )
        .unwrap();
        assert_eq!(submission.payload["terms"], json!(false));
    }

    #[test]
    fn test_hash_depends_on_payload() {
        let mut a = Map::new();
        a.insert("x".to_string(), json!(1));
        let mut b = Map::new();
        b.insert("x".to_string(), json!(2));
        assert_eq!(
            Submission::compute_hash("f", &a),
            Submission::new("f", a.clone()).content_hash
        );
        assert_ne!(Submission::compute_hash("f", &a), Submission::compute_hash("f", &b));
        assert_ne!(Submission::compute_hash("f", &a), Submission::compute_hash("g", &a));
    }

    #[test]
    fn test_email_pattern() {
        assert!(email_regex().is_match("a@b.co"));
        assert!(!email_regex().is_match("a@b"));
        assert!(!email_regex().is_match("a b@c.de"));
    }
}
