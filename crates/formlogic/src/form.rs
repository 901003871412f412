//! Form definition data model.
//!
//! A form definition is the document the editor saves and the fill page loads:
//! an ordered list of typed fields, each carrying the conditional rules that
//! target it. Answers are the values a respondent has entered, keyed by field id.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rule::StoredRule;

/// The input type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Single-line text input.
    Text,
    /// Email address input.
    Email,
    /// Multi-line text input.
    Textarea,
    /// Numeric input.
    Number,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// Single choice from a list of options.
    Select,
    /// Boolean checkbox.
    Checkbox,
}

impl FieldType {
    /// Every field type, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Text,
        Self::Email,
        Self::Textarea,
        Self::Number,
        Self::Date,
        Self::Select,
        Self::Checkbox,
    ];
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Email => write!(f, "email"),
            Self::Textarea => write!(f, "textarea"),
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
            Self::Select => write!(f, "select"),
            Self::Checkbox => write!(f, "checkbox"),
        }
    }
}

/// A single field of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// Stable identifier, used as the DOM name and the answer key.
    pub id: String,

    /// Display label.
    pub label: String,

    /// Input type.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Static requiredness; rules may override it at fill time.
    #[serde(default)]
    pub required: bool,

    /// Optional placeholder text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    /// Ordered option list for `select` fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    /// Rules whose action targets this field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_rules: Vec<StoredRule>,
}

impl FormField {
    /// Create an optional field with no options and no rules.
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            field_type,
            required: false,
            placeholder: None,
            options: Vec::new(),
            conditional_rules: Vec::new(),
        }
    }

    /// Mark the field as statically required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the option list.
    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Append a rule targeting this field.
    #[must_use]
    pub fn with_rule(mut self, rule: StoredRule) -> Self {
        self.conditional_rules.push(rule);
        self
    }

    /// Whether this field is a `select`.
    #[must_use]
    pub fn is_select(&self) -> bool {
        self.field_type == FieldType::Select
    }
}

/// A complete form definition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    /// Unique form identifier.
    pub id: String,

    /// Display title.
    #[serde(default)]
    pub title: String,

    /// Fields in display order.
    #[serde(default)]
    pub fields: Vec<FormField>,
}

impl FormDefinition {
    /// Create an empty form.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn with_field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    /// Parse a form definition from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON or does not match
    /// the form definition shape.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the form definition as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Look up a field by id.
    #[must_use]
    pub fn field(&self, id: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Look up a field by id for modification.
    pub fn field_mut(&mut self, id: &str) -> Option<&mut FormField> {
        self.fields.iter_mut().find(|f| f.id == id)
    }

    /// Whether a field with the given id exists.
    #[must_use]
    pub fn has_field(&self, id: &str) -> bool {
        self.field(id).is_some()
    }

    /// All rules in rule-list order: fields in display order, then each
    /// field's rules in the order they were stored.
    pub fn rules(&self) -> impl Iterator<Item = &StoredRule> {
        self.fields.iter().flat_map(|f| f.conditional_rules.iter())
    }

    /// BLAKE3 hash of the canonical JSON encoding of this form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn content_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        Ok(compute_hash(&canonical))
    }

    /// Parse a raw string into an answer typed by the target field.
    ///
    /// Number fields parse as numbers, checkboxes as booleans, everything
    /// else (including unknown fields) as text. Input that does not parse
    /// for the field's type is kept as text so validation can report it.
    #[must_use]
    pub fn parse_answer(&self, field_id: &str, raw: &str) -> AnswerValue {
        match self.field(field_id).map(|f| f.field_type) {
            Some(FieldType::Number) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map_or_else(|| AnswerValue::Text(raw.to_string()), AnswerValue::Number),
            Some(FieldType::Checkbox) => parse_bool(raw)
                .map_or_else(|| AnswerValue::Text(raw.to_string()), AnswerValue::Bool),
            _ => AnswerValue::Text(raw.to_string()),
        }
    }

    /// Parse an `id=value` assignment into a typed answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the input has no `=` or an empty id.
    pub fn parse_assignment(&self, input: &str) -> Result<(String, AnswerValue)> {
        let (id, raw) = input
            .split_once('=')
            .ok_or_else(|| Error::invalid_answer(input, "expected <field-id>=<value>"))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::invalid_answer(input, "field id is empty"));
        }
        Ok((id.to_string(), self.parse_answer(id, raw)))
    }
}

/// Compute the BLAKE3 hash of the given content.
#[must_use]
pub fn compute_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// A single answer value.
///
/// Serialized as a bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Checkbox state.
    Bool(bool),
    /// Numeric answer.
    Number(f64),
    /// Free text, email, date, or selected option.
    Text(String),
}

impl AnswerValue {
    /// Whether the answer counts as empty: an empty string or an unchecked box.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Bool(b) => !b,
            Self::Number(_) => false,
        }
    }

    /// Numeric reading of the answer, if it has one.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n).filter(|n| n.is_finite()),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::Bool(_) => None,
        }
    }

    /// Boolean reading of the answer, if it has one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(s) => parse_bool(s),
            Self::Number(_) => None,
        }
    }

    /// The answer as text, the way a text comparison sees it.
    #[must_use]
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for AnswerValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for AnswerValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Current answers of one form instance, keyed by field id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<String, AnswerValue>);

impl Answers {
    /// Create an empty answer map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse answers from a JSON object. `null` values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a JSON object of scalars.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Option<AnswerValue>> = serde_json::from_str(json)?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    /// Get the answer for a field.
    #[must_use]
    pub fn get(&self, field_id: &str) -> Option<&AnswerValue> {
        self.0.get(field_id)
    }

    /// Set the answer for a field, returning the previous answer.
    pub fn set(
        &mut self,
        field_id: impl Into<String>,
        value: impl Into<AnswerValue>,
    ) -> Option<AnswerValue> {
        self.0.insert(field_id.into(), value.into())
    }

    /// Unset the answer for a field, returning the previous answer.
    pub fn remove(&mut self, field_id: &str) -> Option<AnswerValue> {
        self.0.remove(field_id)
    }

    /// Iterate over answers in field-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnswerValue)> {
        self.0.iter()
    }

    /// Number of answered fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no field has an answer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, AnswerValue)> for Answers {
    fn from_iter<T: IntoIterator<Item = (String, AnswerValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
