//! `formlogic` - conditional field rules for FastSubmit forms
//!
//! This library evaluates per-field conditional rules (show/hide, require,
//! set value, set options, skip) against a form's current answers and yields
//! the render state the form should be drawn with. It also validates rule
//! definitions, edits rules, builds submissions, and keeps a local `SQLite`
//! store of forms and submissions.
//!
//! ```
//! use formlogic::{Answers, EngineConfig, FormDefinition, RuleEngine};
//!
//! let form = FormDefinition::from_json(r#"{
//!     "id": "shipping",
//!     "title": "Shipping",
//!     "fields": [
//!         {"id": "country", "label": "Country", "type": "select", "options": ["USA", "Other"]},
//!         {"id": "state", "label": "State", "type": "text", "conditionalRules": [
//!             {"id": "r1", "fieldId": "country", "operator": "equals", "value": "USA",
//!              "action": "show", "targetFieldId": "state"}
//!         ]}
//!     ]
//! }"#).unwrap();
//!
//! let engine = RuleEngine::new(&form, &EngineConfig::default());
//! let mut answers = Answers::new();
//! assert!(!engine.evaluate(&answers).state.is_visible("state"));
//!
//! answers.set("country", "USA");
//! assert!(engine.evaluate(&answers).state.is_visible("state"));
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod editor;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod form;
pub mod logging;
pub mod render;
pub mod rule;
pub mod storage;
pub mod submission;
pub mod validation;

pub use config::{Config, EngineConfig, SubmissionConfig};
pub use editor::{RuleDraft, RuleEditor, RulePatch};
pub use engine::{Evaluation, FormSession, Outcome, RuleEngine};
pub use error::{Error, Result};
pub use form::{AnswerValue, Answers, FieldType, FormDefinition, FormField};
pub use logging::init_logging;
pub use render::{FieldRenderState, RenderState};
pub use rule::{Action, ActionKind, Condition, ConditionalRule, Operand, Operator, StoredRule};
pub use storage::{FormSummary, SaveOutcome, Storage, StorageStats};
pub use submission::{build_submission, Submission};
pub use validation::{validate_form, Issue, IssueKind, Severity, ValidationReport};
