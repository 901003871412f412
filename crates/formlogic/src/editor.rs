//! Rule editing, scoped to one target field.
//!
//! The editor backs the rule builder UI. It enforces the constraints the UI
//! offers choices for (the trigger must be another existing field, and
//! `set_options` is only offered on `select` targets) and refuses any edit
//! that would give the rule an error-severity issue. Form-wide checks such as
//! duplicate ids still belong to
//! [`validate_form`](crate::validation::validate_form), which runs before the
//! form is saved.

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::form::{FormDefinition, FormField};
use crate::rule::{ActionKind, Operator, StoredRule};
use crate::validation::{rule_issues, Severity};

/// A rule to be added; the editor assigns the id and the target.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDraft {
    /// Trigger field id.
    pub field_id: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Comparison operand.
    pub value: Option<Value>,
    /// Action to apply.
    pub action: ActionKind,
    /// Action payload.
    pub target_value: Option<Value>,
}

impl RuleDraft {
    /// Create a draft without operand or payload.
    #[must_use]
    pub fn new(field_id: impl Into<String>, operator: Operator, action: ActionKind) -> Self {
        Self {
            field_id: field_id.into(),
            operator,
            value: None,
            action,
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

/// A partial update; `None` leaves the attribute unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulePatch {
    /// New trigger field id.
    pub field_id: Option<String>,
    /// New operator.
    pub operator: Option<Operator>,
    /// New operand; `Some(None)` clears it.
    pub value: Option<Option<Value>>,
    /// New action.
    pub action: Option<ActionKind>,
    /// New payload; `Some(None)` clears it.
    pub target_value: Option<Option<Value>>,
}

impl RulePatch {
    fn apply(self, rule: &mut StoredRule) {
        if let Some(field_id) = self.field_id {
            rule.field_id = field_id;
        }
        if let Some(operator) = self.operator {
            rule.operator = operator;
        }
        if let Some(value) = self.value {
            rule.value = value;
        }
        if let Some(action) = self.action {
            rule.action = action;
        }
        if let Some(target_value) = self.target_value {
            rule.target_value = target_value;
        }
    }
}

/// CRUD over the rules that target one field of a form.
#[derive(Debug)]
pub struct RuleEditor<'a> {
    form: &'a mut FormDefinition,
    target: usize,
}

impl<'a> RuleEditor<'a> {
    /// Open the editor for the given target field.
    ///
    /// # Errors
    ///
    /// Returns an error if the form has no such field.
    pub fn open(form: &'a mut FormDefinition, target_field_id: &str) -> Result<Self> {
        let target = form
            .fields
            .iter()
            .position(|f| f.id == target_field_id)
            .ok_or_else(|| Error::field_not_found(target_field_id))?;
        Ok(Self { form, target })
    }

    /// The field the rules apply to.
    #[must_use]
    pub fn target(&self) -> &FormField {
        &self.form.fields[self.target]
    }

    /// Rules targeting this field, in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[StoredRule] {
        &self.target().conditional_rules
    }

    /// Fields that may act as the trigger: every field except the target.
    #[must_use]
    pub fn available_triggers(&self) -> Vec<&str> {
        let target_id = &self.target().id;
        self.form
            .fields
            .iter()
            .filter(|f| &f.id != target_id)
            .map(|f| f.id.as_str())
            .collect()
    }

    /// Actions the builder may offer for this target.
    #[must_use]
    pub fn available_actions(&self) -> Vec<ActionKind> {
        let is_select = self.target().is_select();
        ActionKind::ALL
            .into_iter()
            .filter(|a| is_select || !a.requires_select_target())
            .collect()
    }

    /// Add a rule and return its generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the trigger is unknown or is the target itself, if
    /// the operator needs an operand and none is given, if the operand or
    /// payload is malformed, or if the action is not available for this
    /// target.
    pub fn add(&mut self, draft: RuleDraft) -> Result<String> {
        let rule = StoredRule {
            id: Uuid::new_v4().to_string(),
            field_id: draft.field_id,
            operator: draft.operator,
            value: draft.value,
            action: draft.action,
            target_value: draft.target_value,
            target_field_id: self.target().id.clone(),
        };
        self.check(&rule)?;

        let id = rule.id.clone();
        debug!(rule = %id, target = %rule.target_field_id, "Rule added");
        self.target_mut().conditional_rules.push(rule);
        Ok(id)
    }

    /// Update any subset of a rule's attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule does not exist or the updated rule fails
    /// the same checks as [`RuleEditor::add`]. A rejected update leaves the
    /// rule unchanged.
    pub fn update(&mut self, rule_id: &str, patch: RulePatch) -> Result<()> {
        let index = self.index_of(rule_id)?;
        let mut updated = self.rules()[index].clone();
        patch.apply(&mut updated);
        self.check(&updated)?;

        debug!(rule = %rule_id, "Rule updated");
        self.target_mut().conditional_rules[index] = updated;
        Ok(())
    }

    /// Remove a rule, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule does not exist.
    pub fn remove(&mut self, rule_id: &str) -> Result<StoredRule> {
        let index = self.index_of(rule_id)?;
        debug!(rule = %rule_id, "Rule removed");
        Ok(self.target_mut().conditional_rules.remove(index))
    }

    fn target_mut(&mut self) -> &mut FormField {
        &mut self.form.fields[self.target]
    }

    fn index_of(&self, rule_id: &str) -> Result<usize> {
        self.rules()
            .iter()
            .position(|r| r.id == rule_id)
            .ok_or_else(|| Error::rule_not_found(rule_id))
    }

    fn check(&self, rule: &StoredRule) -> Result<()> {
        if rule.field_id == rule.target_field_id {
            return Err(Error::invalid_rule("a field cannot trigger its own rules"));
        }
        if !self.form.has_field(&rule.field_id) {
            return Err(Error::field_not_found(&rule.field_id));
        }
        if rule.operator.needs_operand() && rule.value.as_ref().map_or(true, Value::is_null) {
            return Err(Error::invalid_rule(format!(
                "operator {} needs a value",
                rule.operator
            )));
        }
        if !self.available_actions().contains(&rule.action) {
            return Err(Error::invalid_rule(format!(
                "{} is only available on select fields",
                rule.action
            )));
        }
        if let Some(issue) = rule_issues(self.form, rule)
            .into_iter()
            .find(|i| i.severity == Severity::Error)
        {
            return Err(Error::invalid_rule(issue.kind.to_string()));
        }
        Ok(())
    }
}
