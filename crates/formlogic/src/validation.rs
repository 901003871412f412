//! Save-time validation of form definitions.
//!
//! This is a separate pass from evaluation: the engine tolerates malformed
//! rules at fill time, while the editor runs [`validate_form`] before saving
//! and refuses documents with error-severity issues. Warnings cover things the
//! engine handles but that are probably mistakes, such as self-referencing
//! rules and `set_value` cycles.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::form::{FieldType, FormDefinition};
use crate::rule::{
    numeric_operand, options_payload, scalar_payload, ActionKind, Operator, StoredRule,
};

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Saved anyway; the engine copes.
    Warning,
    /// Blocks saving.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What is wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    /// Two fields share an id.
    DuplicateFieldId,
    /// A `select` field has no options.
    SelectWithoutOptions,
    /// Two rules share an id.
    DuplicateRuleId,
    /// The rule's trigger field does not exist.
    UnknownTrigger {
        /// The missing field id.
        missing: String,
    },
    /// The rule's target field does not exist.
    UnknownTarget {
        /// The missing field id.
        missing: String,
    },
    /// The operator needs an operand and none is set.
    MissingOperand,
    /// The operand must be a number and is not.
    NonNumericOperand,
    /// The `targetValue` payload is missing or has the wrong shape.
    InvalidTargetValue,
    /// The rule's trigger is its own target.
    SelfReference,
    /// `set_options` targets a field that is not a `select`.
    SetOptionsOnNonSelect,
    /// The rule is stored under a field other than its target.
    MisplacedRule {
        /// The field the rule is stored under.
        stored_under: String,
    },
    /// Value-changing rules form a cycle.
    ValueCycle {
        /// Field ids along the cycle, first repeated at the end.
        path: Vec<String>,
    },
}

impl IssueKind {
    /// Severity of this kind of issue.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::SelfReference
            | Self::SetOptionsOnNonSelect
            | Self::MisplacedRule { .. }
            | Self::ValueCycle { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateFieldId => write!(f, "duplicate field id"),
            Self::SelectWithoutOptions => write!(f, "select field has no options"),
            Self::DuplicateRuleId => write!(f, "duplicate rule id"),
            Self::UnknownTrigger { missing } => write!(f, "unknown trigger field '{missing}'"),
            Self::UnknownTarget { missing } => write!(f, "unknown target field '{missing}'"),
            Self::MissingOperand => write!(f, "operator needs a value"),
            Self::NonNumericOperand => write!(f, "value must be a number"),
            Self::InvalidTargetValue => write!(f, "targetValue is missing or malformed"),
            Self::SelfReference => write!(f, "rule triggers on its own target"),
            Self::SetOptionsOnNonSelect => write!(f, "set_options on a non-select field"),
            Self::MisplacedRule { stored_under } => {
                write!(f, "rule stored under '{stored_under}' but targets another field")
            }
            Self::ValueCycle { path } => write!(f, "value rules form a cycle: {}", path.join(" -> ")),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Severity.
    pub severity: Severity,
    /// Rule the issue belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Field the issue belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    /// What is wrong.
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl Issue {
    fn field(field_id: &str, kind: IssueKind) -> Self {
        Self {
            severity: kind.severity(),
            rule_id: None,
            field_id: Some(field_id.to_string()),
            kind,
        }
    }

    fn rule(rule: &StoredRule, kind: IssueKind) -> Self {
        Self {
            severity: kind.severity(),
            rule_id: Some(rule.id.clone()),
            field_id: Some(rule.target_field_id.clone()),
            kind,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.severity)?;
        if let Some(rule_id) = &self.rule_id {
            write!(f, " rule {rule_id}")?;
        } else if let Some(field_id) = &self.field_id {
            write!(f, " field {field_id}")?;
        }
        write!(f, ": {}", self.kind)
    }
}

/// All issues found in one form definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Issues in discovery order.
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    /// Whether nothing at all was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether any issue blocks saving.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Error-severity issues.
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Warning-severity issues.
    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Turn the report into a save decision.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FormInvalid`] if any issue has error severity.
    pub fn into_result(self, form_id: &str) -> Result<Vec<Issue>> {
        let count = self.errors().count();
        if count > 0 {
            return Err(Error::FormInvalid {
                form_id: form_id.to_string(),
                count,
            });
        }
        Ok(self.issues)
    }
}

/// Check a form definition for problems worth surfacing before it is saved.
#[must_use]
pub fn validate_form(form: &FormDefinition) -> ValidationReport {
    let mut issues = Vec::new();

    let mut seen_fields = HashSet::new();
    for field in &form.fields {
        if !seen_fields.insert(field.id.as_str()) {
            issues.push(Issue::field(&field.id, IssueKind::DuplicateFieldId));
        }
        if field.is_select() && field.options.is_empty() {
            issues.push(Issue::field(&field.id, IssueKind::SelectWithoutOptions));
        }
    }

    let mut seen_rules = HashSet::new();
    for field in &form.fields {
        for rule in &field.conditional_rules {
            if !seen_rules.insert(rule.id.as_str()) {
                issues.push(Issue::rule(rule, IssueKind::DuplicateRuleId));
            }
            if rule.target_field_id != field.id {
                issues.push(Issue::rule(
                    rule,
                    IssueKind::MisplacedRule {
                        stored_under: field.id.clone(),
                    },
                ));
            }
            check_rule(form, rule, &mut issues);
        }
    }

    for path in value_cycles(form) {
        issues.push(Issue {
            severity: Severity::Warning,
            rule_id: None,
            field_id: path.first().cloned(),
            kind: IssueKind::ValueCycle { path },
        });
    }

    ValidationReport { issues }
}

/// Issues for a single rule checked against `form`, whether or not the rule
/// is stored in it yet.
pub(crate) fn rule_issues(form: &FormDefinition, rule: &StoredRule) -> Vec<Issue> {
    let mut issues = Vec::new();
    check_rule(form, rule, &mut issues);
    issues
}

fn check_rule(form: &FormDefinition, rule: &StoredRule, issues: &mut Vec<Issue>) {
    let trigger = form.field(&rule.field_id);
    let target = form.field(&rule.target_field_id);

    if trigger.is_none() {
        issues.push(Issue::rule(
            rule,
            IssueKind::UnknownTrigger {
                missing: rule.field_id.clone(),
            },
        ));
    }
    if target.is_none() {
        issues.push(Issue::rule(
            rule,
            IssueKind::UnknownTarget {
                missing: rule.target_field_id.clone(),
            },
        ));
    }
    if rule.field_id == rule.target_field_id {
        issues.push(Issue::rule(rule, IssueKind::SelfReference));
    }

    let operand = rule.value.as_ref().filter(|v| !v.is_null());
    if rule.operator.needs_operand() {
        match operand {
            None => issues.push(Issue::rule(rule, IssueKind::MissingOperand)),
            Some(value) => {
                let numeric_trigger =
                    trigger.is_some_and(|f| f.field_type == FieldType::Number);
                let substring = matches!(rule.operator, Operator::Contains | Operator::NotContains);
                let wants_number = rule.operator.is_numeric() || (numeric_trigger && !substring);
                if wants_number && numeric_operand(value).is_none() {
                    issues.push(Issue::rule(rule, IssueKind::NonNumericOperand));
                }
            }
        }
    }

    let target_type = target.map(|f| f.field_type);
    let payload_ok = match rule.action {
        ActionKind::SetValue => rule
            .target_value
            .as_ref()
            .and_then(|v| scalar_payload(v, target_type))
            .is_some(),
        ActionKind::SetOptions => rule
            .target_value
            .as_ref()
            .and_then(options_payload)
            .is_some_and(|opts| !opts.is_empty()),
        _ => true,
    };
    if !payload_ok {
        issues.push(Issue::rule(rule, IssueKind::InvalidTargetValue));
    }

    if rule.action.requires_select_target() && target.is_some_and(|f| !f.is_select()) {
        issues.push(Issue::rule(rule, IssueKind::SetOptionsOnNonSelect));
    }
}

/// Find cycles in the trigger -> target graph of value-changing rules.
fn value_cycles(form: &FormDefinition) -> Vec<Vec<String>> {
    let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for rule in form.rules().filter(|r| r.action.changes_value()) {
        let targets = edges.entry(rule.field_id.as_str()).or_default();
        if !targets.contains(&rule.target_field_id.as_str()) {
            targets.push(rule.target_field_id.as_str());
        }
    }

    let mut cycles = Vec::new();
    let mut done: HashSet<&str> = HashSet::new();
    for &start in edges.keys() {
        let mut stack = Vec::new();
        walk(start, &edges, &mut stack, &mut done, &mut cycles);
    }
    cycles
}

fn walk<'a>(
    node: &'a str,
    edges: &BTreeMap<&'a str, Vec<&'a str>>,
    stack: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    if done.contains(node) {
        return;
    }
    if let Some(pos) = stack.iter().position(|n| *n == node) {
        let mut path: Vec<String> = stack[pos..].iter().map(|n| (*n).to_string()).collect();
        path.push(node.to_string());
        cycles.push(path);
        return;
    }
    stack.push(node);
    if let Some(targets) = edges.get(node) {
        for &next in targets {
            walk(next, edges, stack, done, cycles);
        }
    }
    stack.pop();
    done.insert(node);
}
