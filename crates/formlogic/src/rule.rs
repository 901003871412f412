//! Conditional rules.
//!
//! Rules are persisted in a loosely typed shape ([`StoredRule`]) where the
//! comparison operand and the action payload are raw JSON. Before evaluation
//! each stored rule is resolved once against the form into a
//! [`ConditionalRule`], whose [`Condition`] and [`Action`] carry payloads typed
//! by the trigger and target field types. Resolution never fails: an operand
//! or payload that cannot be read degrades to [`Condition::Never`] or
//! [`Action::Noop`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::form::{parse_bool, AnswerValue, FieldType, FormDefinition};

/// Comparison applied to the trigger field's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Answer equals the operand.
    Equals,
    /// Answer does not equal the operand.
    NotEquals,
    /// Answer contains the operand as a substring.
    Contains,
    /// Answer does not contain the operand as a substring.
    NotContains,
    /// Answer is a number greater than the operand.
    GreaterThan,
    /// Answer is a number less than the operand.
    LessThan,
    /// Answer is unset, empty, or an unchecked box.
    IsEmpty,
    /// Negation of [`Operator::IsEmpty`].
    IsNotEmpty,
}

impl Operator {
    /// Every operator, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Equals,
        Self::NotEquals,
        Self::Contains,
        Self::NotContains,
        Self::GreaterThan,
        Self::LessThan,
        Self::IsEmpty,
        Self::IsNotEmpty,
    ];

    /// Whether the operator compares against an operand.
    #[must_use]
    pub fn needs_operand(self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }

    /// Whether the operator only makes sense with a numeric operand.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::GreaterThan | Self::LessThan)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        };
        f.write_str(name)
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.to_string() == s)
            .ok_or_else(|| format!("unknown operator '{s}'"))
    }
}

/// What a matched rule does to its target field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Make the target visible.
    Show,
    /// Hide the target.
    Hide,
    /// Make the target required.
    Require,
    /// Make the target optional.
    Optional,
    /// Request navigation to the target (paged forms).
    SkipTo,
    /// Force the target's value.
    SetValue,
    /// Replace the target's option list.
    SetOptions,
}

impl ActionKind {
    /// Every action, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Show,
        Self::Hide,
        Self::Require,
        Self::Optional,
        Self::SkipTo,
        Self::SetValue,
        Self::SetOptions,
    ];

    /// Whether the action carries a `targetValue` payload.
    #[must_use]
    pub fn needs_payload(self) -> bool {
        matches!(self, Self::SetValue | Self::SetOptions)
    }

    /// Whether the action is only meaningful on `select` targets.
    #[must_use]
    pub fn requires_select_target(self) -> bool {
        self == Self::SetOptions
    }

    /// Whether the action changes the target's value.
    #[must_use]
    pub fn changes_value(self) -> bool {
        matches!(self, Self::SetValue | Self::SetOptions)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Show => "show",
            Self::Hide => "hide",
            Self::Require => "require",
            Self::Optional => "optional",
            Self::SkipTo => "skip_to",
            Self::SetValue => "set_value",
            Self::SetOptions => "set_options",
        };
        f.write_str(name)
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

/// A rule as persisted in the form definition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRule {
    /// Unique rule identifier.
    pub id: String,

    /// Trigger field id.
    pub field_id: String,

    /// Comparison operator.
    pub operator: Operator,

    /// Comparison operand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Action applied when the condition holds.
    pub action: ActionKind,

    /// Target field id.
    pub target_field_id: String,

    /// Payload for `set_value` (scalar) and `set_options` (list of strings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<Value>,
}

impl StoredRule {
    /// Create a rule without operand or payload.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        field_id: impl Into<String>,
        operator: Operator,
        action: ActionKind,
        target_field_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            field_id: field_id.into(),
            operator,
            value: None,
            action,
            target_field_id: target_field_id.into(),
            target_value: None,
        }
    }

    /// Set the comparison operand.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set the action payload.
    #[must_use]
    pub fn with_target_value(mut self, target_value: impl Into<Value>) -> Self {
        self.target_value = Some(target_value.into());
        self
    }
}

/// Comparison operand for equality tests, typed by the trigger field.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Text comparison.
    Text(String),
    /// Numeric comparison (trigger is a `number` field).
    Number(f64),
    /// Boolean comparison (trigger is a `checkbox`).
    Bool(bool),
}

impl Operand {
    /// Resolve a raw operand for a trigger of the given type.
    ///
    /// An unknown trigger type falls back to the JSON type of the operand.
    #[must_use]
    pub fn resolve(value: &Value, trigger_type: Option<FieldType>) -> Option<Self> {
        match trigger_type {
            Some(FieldType::Number) => numeric_operand(value).map(Self::Number),
            Some(FieldType::Checkbox) => bool_operand(value).map(Self::Bool),
            Some(_) => text_operand(value).map(Self::Text),
            None => match value {
                Value::Number(n) => n.as_f64().map(Self::Number),
                Value::Bool(b) => Some(Self::Bool(*b)),
                Value::String(s) => Some(Self::Text(s.clone())),
                _ => None,
            },
        }
    }
}

/// A trigger condition with its operand already typed.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Answer equals the operand.
    Equals(Operand),
    /// Answer does not equal the operand.
    NotEquals(Operand),
    /// Answer text contains the operand.
    Contains(String),
    /// Answer text does not contain the operand.
    NotContains(String),
    /// Answer is a number greater than the operand.
    GreaterThan(f64),
    /// Answer is a number less than the operand.
    LessThan(f64),
    /// Answer is empty.
    IsEmpty,
    /// Answer is not empty.
    IsNotEmpty,
    /// Operand missing or unreadable; never holds.
    Never,
}

impl Condition {
    /// Resolve an operator and raw operand into a typed condition.
    #[must_use]
    pub fn resolve(operator: Operator, value: Option<&Value>, trigger_type: Option<FieldType>) -> Self {
        let value = value.filter(|v| !v.is_null());
        let resolved = match operator {
            Operator::IsEmpty => Some(Self::IsEmpty),
            Operator::IsNotEmpty => Some(Self::IsNotEmpty),
            Operator::Equals => value
                .and_then(|v| Operand::resolve(v, trigger_type))
                .map(Self::Equals),
            Operator::NotEquals => value
                .and_then(|v| Operand::resolve(v, trigger_type))
                .map(Self::NotEquals),
            Operator::Contains => value.and_then(text_operand).map(Self::Contains),
            Operator::NotContains => value.and_then(text_operand).map(Self::NotContains),
            Operator::GreaterThan => value.and_then(numeric_operand).map(Self::GreaterThan),
            Operator::LessThan => value.and_then(numeric_operand).map(Self::LessThan),
        };
        resolved.unwrap_or(Self::Never)
    }
}

/// A rule action with its payload already typed.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Make the target visible.
    Show,
    /// Hide the target.
    Hide,
    /// Make the target required.
    Require,
    /// Make the target optional.
    Optional,
    /// Request navigation to the target.
    SkipTo,
    /// Force the target's value.
    SetValue(AnswerValue),
    /// Replace the target's option list.
    SetOptions(Vec<String>),
    /// Payload missing or unreadable; does nothing.
    Noop,
}

impl Action {
    /// Resolve an action kind and raw payload into a typed action.
    #[must_use]
    pub fn resolve(kind: ActionKind, payload: Option<&Value>, target_type: Option<FieldType>) -> Self {
        match kind {
            ActionKind::Show => Self::Show,
            ActionKind::Hide => Self::Hide,
            ActionKind::Require => Self::Require,
            ActionKind::Optional => Self::Optional,
            ActionKind::SkipTo => Self::SkipTo,
            ActionKind::SetValue => payload
                .and_then(|v| scalar_payload(v, target_type))
                .map_or(Self::Noop, Self::SetValue),
            ActionKind::SetOptions => payload
                .and_then(options_payload)
                .map_or(Self::Noop, Self::SetOptions),
        }
    }
}

/// A rule resolved against its form and ready to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalRule {
    /// Rule identifier.
    pub id: String,
    /// Trigger field id.
    pub trigger: String,
    /// Target field id.
    pub target: String,
    /// Typed condition.
    pub condition: Condition,
    /// Typed action.
    pub action: Action,
}

impl ConditionalRule {
    /// Resolve a stored rule against the form it belongs to.
    ///
    /// Unreadable operands and payloads are logged and degrade to a condition
    /// that never holds or an action that does nothing.
    #[must_use]
    pub fn resolve(stored: &StoredRule, form: &FormDefinition) -> Self {
        let trigger_type = form.field(&stored.field_id).map(|f| f.field_type);
        let target_type = form.field(&stored.target_field_id).map(|f| f.field_type);

        let condition = Condition::resolve(stored.operator, stored.value.as_ref(), trigger_type);
        if condition == Condition::Never {
            warn!(
                rule = %stored.id,
                operator = %stored.operator,
                "Rule operand missing or unreadable, condition will never hold"
            );
        }

        let action = Action::resolve(stored.action, stored.target_value.as_ref(), target_type);
        if action == Action::Noop {
            warn!(
                rule = %stored.id,
                action = %stored.action,
                "Rule payload missing or unreadable, action will do nothing"
            );
        }

        Self {
            id: stored.id.clone(),
            trigger: stored.field_id.clone(),
            target: stored.target_field_id.clone(),
            condition,
            action,
        }
    }
}

pub(crate) fn numeric_operand(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

pub(crate) fn text_operand(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn bool_operand(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        _ => None,
    }
}

pub(crate) fn scalar_payload(value: &Value, target_type: Option<FieldType>) -> Option<AnswerValue> {
    match target_type {
        Some(FieldType::Number) => numeric_operand(value).map(AnswerValue::Number),
        Some(FieldType::Checkbox) => bool_operand(value).map(AnswerValue::Bool),
        Some(_) => text_operand(value).map(AnswerValue::Text),
        None => match value {
            Value::Number(n) => n.as_f64().map(AnswerValue::Number),
            Value::Bool(b) => Some(AnswerValue::Bool(*b)),
            Value::String(s) => Some(AnswerValue::Text(s.clone())),
            _ => None,
        },
    }
}

pub(crate) fn options_payload(value: &Value) -> Option<Vec<String>> {
    value.as_array()?.iter().map(text_operand).collect()
}
