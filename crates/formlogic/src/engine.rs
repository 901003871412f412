//! Conditional rule engine.
//!
//! [`RuleEngine::evaluate`] is a pure function of the form's fields, its rules
//! and the current answers. Each pass folds every matched rule into a fresh
//! render state in rule-list order, last write wins. Values forced by
//! `set_value` (and values dropped by `set_options`) feed back into the answers
//! the next pass reads from; passes repeat until the effective answers settle
//! or the configured pass cap is reached.
//!
//! [`FormSession`] wraps the engine for interactive use: it owns the answers
//! of one form instance and re-evaluates on every change.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::form::{AnswerValue, Answers, FormDefinition, FormField};
use crate::render::{FieldRenderState, RenderState};
use crate::rule::{Action, ConditionalRule};

/// How an evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Effective answers stopped changing.
    Converged {
        /// Passes run, including the one that confirmed the fixed point.
        passes: usize,
    },
    /// The pass cap was hit before the answers settled, which points at a
    /// cycle of value-changing rules.
    CapReached {
        /// Passes run.
        passes: usize,
    },
}

impl Outcome {
    /// Number of passes run.
    #[must_use]
    pub fn passes(self) -> usize {
        match self {
            Self::Converged { passes } | Self::CapReached { passes } => passes,
        }
    }

    /// Whether the evaluation reached a fixed point.
    #[must_use]
    pub fn converged(self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Result of evaluating a form's rules against a set of answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// The computed render state.
    pub state: RenderState,
    /// How the evaluation ended.
    pub outcome: Outcome,
}

/// Rules of one form, resolved and ready to evaluate.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    form_id: String,
    fields: Vec<FormField>,
    rules: Vec<ConditionalRule>,
    // Targets of at least one `show` rule start out hidden.
    shown_by_rule: HashSet<String>,
    max_passes: usize,
}

impl RuleEngine {
    /// Resolve every rule of the form.
    #[must_use]
    pub fn new(form: &FormDefinition, config: &EngineConfig) -> Self {
        let rules: Vec<ConditionalRule> = form
            .rules()
            .map(|stored| ConditionalRule::resolve(stored, form))
            .collect();

        let shown_by_rule = rules
            .iter()
            .filter(|r| r.action == Action::Show)
            .map(|r| r.target.clone())
            .collect();

        debug!(
            form = %form.id,
            fields = form.fields.len(),
            rules = rules.len(),
            "Rule engine ready"
        );

        Self {
            form_id: form.id.clone(),
            fields: form.fields.clone(),
            rules,
            shown_by_rule,
            max_passes: config.max_passes.max(1),
        }
    }

    /// Id of the form this engine evaluates.
    #[must_use]
    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    /// Resolved rules in rule-list order.
    #[must_use]
    pub fn rules(&self) -> &[ConditionalRule] {
        &self.rules
    }

    /// Rules whose condition reads the given field.
    pub fn rules_triggered_by<'a>(
        &'a self,
        field_id: &'a str,
    ) -> impl Iterator<Item = &'a ConditionalRule> + 'a {
        self.rules.iter().filter(move |r| r.trigger == field_id)
    }

    /// Whether the form has a field with this id.
    #[must_use]
    pub fn has_field(&self, field_id: &str) -> bool {
        self.fields.iter().any(|f| f.id == field_id)
    }

    /// Compute the render state for the given answers.
    ///
    /// Answers for fields the form does not have are ignored.
    #[must_use]
    pub fn evaluate(&self, answers: &Answers) -> Evaluation {
        let user = self.known_answers(answers);
        let mut effective = user.clone();
        let mut passes = 0;

        loop {
            passes += 1;
            let state = self.run_pass(&user, &effective);
            let next = state.answers();
            trace!(form = %self.form_id, pass = passes, answers = next.len(), "Evaluation pass complete");

            if next == effective {
                debug!(form = %self.form_id, passes, "Rules converged");
                return Evaluation {
                    state,
                    outcome: Outcome::Converged { passes },
                };
            }
            if passes >= self.max_passes {
                warn!(
                    form = %self.form_id,
                    passes,
                    "Value rules did not settle, possible cycle; using last pass"
                );
                return Evaluation {
                    state,
                    outcome: Outcome::CapReached { passes },
                };
            }
            effective = next;
        }
    }

    fn known_answers(&self, answers: &Answers) -> Answers {
        answers
            .iter()
            .filter(|(id, _)| self.has_field(id))
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect()
    }

    // Values forced in earlier passes carry over, the way overwriting the
    // answer would; each evaluate() call still starts from the user's answers.
    fn base_state(&self, user: &Answers, effective: &Answers) -> RenderState {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                let value = effective.get(&f.id).cloned();
                let forced = value.is_some() && user.get(&f.id) != value.as_ref();
                FieldRenderState {
                    field_id: f.id.clone(),
                    visible: !self.shown_by_rule.contains(&f.id),
                    required: f.required,
                    options: f.options.clone(),
                    value,
                    forced,
                }
            })
            .collect();
        RenderState {
            fields,
            skip_to: None,
        }
    }

    /// One pass: conditions read the effective answers of the previous pass.
    fn run_pass(&self, user: &Answers, effective: &Answers) -> RenderState {
        let mut state = self.base_state(user, effective);
        let mut reoptioned: HashSet<&str> = HashSet::new();

        for rule in &self.rules {
            if !rule.condition.is_met(effective.get(&rule.trigger)) {
                continue;
            }
            trace!(rule = %rule.id, target = %rule.target, "Rule matched");

            if rule.action == Action::SkipTo {
                state.skip_to = Some(rule.target.clone());
                continue;
            }

            let Some(target) = state.field_mut(&rule.target) else {
                trace!(rule = %rule.id, target = %rule.target, "Rule target not in form, skipping");
                continue;
            };
            match &rule.action {
                Action::Show => target.visible = true,
                Action::Hide => target.visible = false,
                Action::Require => target.required = true,
                Action::Optional => target.required = false,
                Action::SetValue(value) => {
                    target.value = Some(value.clone());
                    target.forced = true;
                }
                Action::SetOptions(options) => {
                    target.options.clone_from(options);
                    reoptioned.insert(rule.target.as_str());
                }
                Action::SkipTo | Action::Noop => {}
            }
        }

        for field in &mut state.fields {
            if !reoptioned.contains(field.field_id.as_str()) {
                continue;
            }
            let stale = field
                .value
                .as_ref()
                .is_some_and(|v| !field.options.contains(&v.as_text()));
            if stale {
                trace!(field = %field.field_id, "Value not in replaced options, unsetting");
                field.value = None;
                field.forced = false;
            }
        }

        state
    }
}

/// Answers and render state of one form instance being filled.
#[derive(Debug, Clone)]
pub struct FormSession {
    engine: RuleEngine,
    answers: Answers,
    evaluation: Evaluation,
}

impl FormSession {
    /// Start a session with no answers.
    #[must_use]
    pub fn new(engine: RuleEngine) -> Self {
        Self::with_answers(engine, Answers::new())
    }

    /// Start a session from existing answers.
    #[must_use]
    pub fn with_answers(engine: RuleEngine, answers: Answers) -> Self {
        let evaluation = engine.evaluate(&answers);
        Self {
            engine,
            answers,
            evaluation,
        }
    }

    /// Set a field's answer and re-evaluate.
    ///
    /// Returns the ids of fields whose render state changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the form has no such field.
    pub fn set_answer(
        &mut self,
        field_id: &str,
        value: impl Into<AnswerValue>,
    ) -> Result<Vec<String>> {
        if !self.engine.has_field(field_id) {
            return Err(Error::field_not_found(field_id));
        }
        self.answers.set(field_id, value);
        Ok(self.reevaluate(field_id))
    }

    /// Unset a field's answer and re-evaluate.
    ///
    /// Returns the ids of fields whose render state changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the form has no such field.
    pub fn clear_answer(&mut self, field_id: &str) -> Result<Vec<String>> {
        if !self.engine.has_field(field_id) {
            return Err(Error::field_not_found(field_id));
        }
        self.answers.remove(field_id);
        Ok(self.reevaluate(field_id))
    }

    fn reevaluate(&mut self, changed_field: &str) -> Vec<String> {
        let dependents = self.engine.rules_triggered_by(changed_field).count();
        let next = self.engine.evaluate(&self.answers);
        let changed = self.evaluation.state.diff(&next.state);
        debug!(
            field = %changed_field,
            dependents,
            changed = changed.len(),
            "Answer changed"
        );
        self.evaluation = next;
        changed
    }

    /// The user's answers (without rule-forced values).
    #[must_use]
    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    /// Current render state.
    #[must_use]
    pub fn state(&self) -> &RenderState {
        &self.evaluation.state
    }

    /// Outcome of the latest evaluation.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.evaluation.outcome
    }

    /// The engine backing this session.
    #[must_use]
    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{FieldType, FormField};
    use crate::rule::{ActionKind, Operator, StoredRule};
    use serde_json::json;

    fn engine(form: &FormDefinition) -> RuleEngine {
        RuleEngine::new(form, &EngineConfig::default())
    }

    fn answers(pairs: &[(&str, AnswerValue)]) -> Answers {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn country_form() -> FormDefinition {
        FormDefinition::new("shipping", "Shipping")
            .with_field(
                FormField::new("country", "Country", FieldType::Select)
                    .with_options(["USA", "Other"]),
            )
            .with_field(
                FormField::new("state", "State", FieldType::Text).with_rule(
                    StoredRule::new("R1", "country", Operator::Equals, ActionKind::Show, "state")
                        .with_value("USA"),
                ),
            )
    }

    fn budget_form() -> FormDefinition {
        FormDefinition::new("quote", "Quote")
            .with_field(FormField::new("budget", "Budget", FieldType::Number))
            .with_field(
                FormField::new("approval_code", "Approval code", FieldType::Text).with_rule(
                    StoredRule::new(
                        "R2",
                        "budget",
                        Operator::GreaterThan,
                        ActionKind::Require,
                        "approval_code",
                    )
                    .with_value(1000),
                ),
            )
    }

    #[test]
    fn test_show_rule_follows_country() {
        let engine = engine(&country_form());

        let usa = engine.evaluate(&answers(&[("country", "USA".into())]));
        assert!(usa.state.is_visible("state"));

        let other = engine.evaluate(&answers(&[("country", "Other".into())]));
        assert!(!other.state.is_visible("state"));

        let unset = engine.evaluate(&Answers::new());
        assert!(!unset.state.is_visible("state"));
        assert!(unset.state.is_visible("country"));
    }

    #[test]
    fn test_require_rule_follows_budget() {
        let engine = engine(&budget_form());

        let high = engine.evaluate(&answers(&[("budget", 1500.0.into())]));
        assert!(high.state.is_required("approval_code"));

        let low = engine.evaluate(&answers(&[("budget", 500.0.into())]));
        assert!(!low.state.is_required("approval_code"));
    }

    #[test]
    fn test_equals_toggles_between_answers() {
        let mut session = FormSession::new(engine(&country_form()));
        session.set_answer("country", "USA").unwrap();
        assert!(session.state().is_visible("state"));
        let changed = session.set_answer("country", "Other").unwrap();
        assert!(!session.state().is_visible("state"));
        assert!(changed.contains(&"state".to_string()));
        assert!(changed.contains(&"country".to_string()));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let form = country_form();
        let engine = engine(&form);
        let input = answers(&[("country", "USA".into()), ("state", "Ohio".into())]);

        let first = engine.evaluate(&input);
        let second = engine.evaluate(&input);
        assert_eq!(first, second);
    }

    #[test]
    fn test_last_rule_wins_for_visibility() {
        let show_then_hide = FormDefinition::new("f", "F")
            .with_field(FormField::new("a", "A", FieldType::Text))
            .with_field(
                FormField::new("b", "B", FieldType::Text)
                    .with_rule(StoredRule::new("r1", "a", Operator::IsNotEmpty, ActionKind::Show, "b"))
                    .with_rule(StoredRule::new("r2", "a", Operator::IsNotEmpty, ActionKind::Hide, "b")),
            );
        let state = engine(&show_then_hide)
            .evaluate(&answers(&[("a", "x".into())]))
            .state;
        assert!(!state.is_visible("b"));

        let hide_then_show = FormDefinition::new("f", "F")
            .with_field(FormField::new("a", "A", FieldType::Text))
            .with_field(
                FormField::new("b", "B", FieldType::Text)
                    .with_rule(StoredRule::new("r1", "a", Operator::IsNotEmpty, ActionKind::Hide, "b"))
                    .with_rule(StoredRule::new("r2", "a", Operator::IsNotEmpty, ActionKind::Show, "b")),
            );
        let state = engine(&hide_then_show)
            .evaluate(&answers(&[("a", "x".into())]))
            .state;
        assert!(state.is_visible("b"));
    }

    #[test]
    fn test_hide_rule_keeps_field_visible_by_default() {
        let form = FormDefinition::new("f", "F")
            .with_field(FormField::new("agree", "Agree", FieldType::Checkbox))
            .with_field(
                FormField::new("reason", "Reason", FieldType::Textarea).with_rule(
                    StoredRule::new("r1", "agree", Operator::Equals, ActionKind::Hide, "reason")
                        .with_value(true),
                ),
            );
        let engine = engine(&form);
        assert!(engine.evaluate(&Answers::new()).state.is_visible("reason"));
        assert!(!engine
            .evaluate(&answers(&[("agree", true.into())]))
            .state
            .is_visible("reason"));
    }

    #[test]
    fn test_optional_overrides_static_required() {
        let form = FormDefinition::new("f", "F")
            .with_field(FormField::new("member", "Member", FieldType::Checkbox))
            .with_field(
                FormField::new("phone", "Phone", FieldType::Text)
                    .required()
                    .with_rule(
                        StoredRule::new("r1", "member", Operator::IsNotEmpty, ActionKind::Optional, "phone"),
                    ),
            );
        let engine = engine(&form);
        assert!(engine.evaluate(&Answers::new()).state.is_required("phone"));
        assert!(!engine
            .evaluate(&answers(&[("member", true.into())]))
            .state
            .is_required("phone"));
    }

    #[test]
    fn test_set_options_unsets_missing_value() {
        let form = FormDefinition::new("f", "F")
            .with_field(
                FormField::new("tier", "Tier", FieldType::Select).with_options(["basic", "pro"]),
            )
            .with_field(
                FormField::new("addon", "Add-on", FieldType::Select)
                    .with_options(["none", "support", "sla"])
                    .with_rule(
                        StoredRule::new("r1", "tier", Operator::Equals, ActionKind::SetOptions, "addon")
                            .with_value("basic")
                            .with_target_value(json!(["none", "support"])),
                    ),
            );
        let engine = engine(&form);

        let state = engine
            .evaluate(&answers(&[("tier", "basic".into()), ("addon", "sla".into())]))
            .state;
        let addon = state.field("addon").unwrap();
        assert_eq!(addon.options, vec!["none".to_string(), "support".to_string()]);
        assert!(addon.value.is_none());

        let state = engine
            .evaluate(&answers(&[("tier", "basic".into()), ("addon", "support".into())]))
            .state;
        assert_eq!(state.value("addon"), Some(&AnswerValue::from("support")));

        let state = engine
            .evaluate(&answers(&[("tier", "pro".into()), ("addon", "sla".into())]))
            .state;
        assert_eq!(state.value("addon"), Some(&AnswerValue::from("sla")));
        assert_eq!(state.field("addon").unwrap().options.len(), 3);
    }

    #[test]
    fn test_set_value_chains_into_other_rules() {
        let form = FormDefinition::new("f", "F")
            .with_field(FormField::new("plan", "Plan", FieldType::Text))
            .with_field(
                FormField::new("seats", "Seats", FieldType::Number).with_rule(
                    StoredRule::new("r1", "plan", Operator::Equals, ActionKind::SetValue, "seats")
                        .with_value("team")
                        .with_target_value(25),
                ),
            )
            .with_field(
                FormField::new("invoice", "Invoice", FieldType::Checkbox).with_rule(
                    StoredRule::new("r2", "seats", Operator::GreaterThan, ActionKind::Show, "invoice")
                        .with_value(10),
                ),
            );
        let evaluation = engine(&form).evaluate(&answers(&[("plan", "team".into())]));

        let seats = evaluation.state.field("seats").unwrap();
        assert_eq!(seats.value, Some(AnswerValue::Number(25.0)));
        assert!(seats.forced);
        assert!(evaluation.state.is_visible("invoice"));
        assert_eq!(evaluation.outcome, Outcome::Converged { passes: 2 });
    }

    #[test]
    fn test_no_rules_converges_in_one_pass() {
        let form = FormDefinition::new("f", "F")
            .with_field(FormField::new("a", "A", FieldType::Text));
        let evaluation = engine(&form).evaluate(&answers(&[("a", "x".into())]));
        assert_eq!(evaluation.outcome, Outcome::Converged { passes: 1 });
        assert!(evaluation.outcome.converged());
    }

    #[test]
    fn test_oscillating_rules_hit_the_cap() {
        crate::logging::init_test_logging();
        // a empty -> set a to "x"; a == "x" -> set a to "".
        let form = FormDefinition::new("f", "F").with_field(
            FormField::new("a", "A", FieldType::Text)
                .with_rule(
                    StoredRule::new("r1", "a", Operator::IsEmpty, ActionKind::SetValue, "a")
                        .with_target_value("x"),
                )
                .with_rule(
                    StoredRule::new("r2", "a", Operator::Equals, ActionKind::SetValue, "a")
                        .with_value("x")
                        .with_target_value(""),
                ),
        );
        let config = EngineConfig { max_passes: 4 };
        let engine = RuleEngine::new(&form, &config);

        let first = engine.evaluate(&Answers::new());
        assert_eq!(first.outcome, Outcome::CapReached { passes: 4 });
        assert!(!first.outcome.converged());
        // Still deterministic.
        assert_eq!(first, engine.evaluate(&Answers::new()));
    }

    #[test]
    fn test_self_reference_that_settles() {
        // Filling in a default for itself is fine once the value sticks.
        let form = FormDefinition::new("f", "F").with_field(
            FormField::new("size", "Size", FieldType::Text).with_rule(
                StoredRule::new("r1", "size", Operator::IsEmpty, ActionKind::SetValue, "size")
                    .with_target_value("M"),
            ),
        );
        let evaluation = engine(&form).evaluate(&Answers::new());
        assert_eq!(evaluation.state.value("size"), Some(&AnswerValue::from("M")));
        assert!(evaluation.outcome.converged());
    }

    #[test]
    fn test_unknown_trigger_reads_as_empty() {
        let form = FormDefinition::new("f", "F").with_field(
            FormField::new("b", "B", FieldType::Text).with_rule(StoredRule::new(
                "r1",
                "ghost",
                Operator::IsEmpty,
                ActionKind::Require,
                "b",
            )),
        );
        // An answer keyed by the unknown id is ignored.
        let state = engine(&form)
            .evaluate(&answers(&[("ghost", "boo".into())]))
            .state;
        assert!(state.is_required("b"));
        assert!(state.field("ghost").is_none());
    }

    #[test]
    fn test_unknown_target_is_noop() {
        let form = FormDefinition::new("f", "F")
            .with_field(FormField::new("a", "A", FieldType::Text))
            .with_field(
                FormField::new("b", "B", FieldType::Text).with_rule(StoredRule::new(
                    "r1",
                    "a",
                    Operator::IsEmpty,
                    ActionKind::Hide,
                    "ghost",
                )),
            );
        let state = engine(&form).evaluate(&Answers::new()).state;
        assert!(state.is_visible("a"));
        assert!(state.is_visible("b"));
        assert_eq!(state.fields.len(), 2);
    }

    #[test]
    fn test_type_mismatch_degrades_to_false() {
        let engine = engine(&budget_form());
        let state = engine
            .evaluate(&answers(&[("budget", "a lot".into())]))
            .state;
        assert!(!state.is_required("approval_code"));
    }

    #[test]
    fn test_skip_to_is_reported() {
        let form = FormDefinition::new("f", "F")
            .with_field(FormField::new("eligible", "Eligible", FieldType::Checkbox))
            .with_field(
                FormField::new("thanks", "Thanks", FieldType::Text).with_rule(
                    StoredRule::new("r1", "eligible", Operator::Equals, ActionKind::SkipTo, "thanks")
                        .with_value(false),
                ),
            );
        let engine = engine(&form);
        assert_eq!(
            engine.evaluate(&Answers::new()).state.skip_to.as_deref(),
            Some("thanks")
        );
        assert!(engine
            .evaluate(&answers(&[("eligible", true.into())]))
            .state
            .skip_to
            .is_none());
    }

    #[test]
    fn test_rules_triggered_by() {
        let engine = engine(&country_form());
        assert_eq!(engine.rules_triggered_by("country").count(), 1);
        assert_eq!(engine.rules_triggered_by("state").count(), 0);
        assert_eq!(engine.form_id(), "shipping");
        assert_eq!(engine.rules().len(), 1);
    }

    #[test]
    fn test_session_rejects_unknown_field() {
        let mut session = FormSession::new(engine(&country_form()));
        let err = session.set_answer("ghost", "x").unwrap_err();
        assert!(err.is_not_found());
        assert!(session.clear_answer("ghost").is_err());
    }

    #[test]
    fn test_session_clear_answer() {
        let mut session = FormSession::new(engine(&country_form()));
        session.set_answer("country", "USA").unwrap();
        assert!(session.state().is_visible("state"));

        let changed = session.clear_answer("country").unwrap();
        assert!(!session.state().is_visible("state"));
        assert!(changed.contains(&"state".to_string()));
        assert!(session.answers().is_empty());
        assert!(session.outcome().converged());
    }

    #[test]
    fn test_session_forced_values_stay_out_of_answers() {
        let form = FormDefinition::new("f", "F")
            .with_field(FormField::new("plan", "Plan", FieldType::Text))
            .with_field(
                FormField::new("seats", "Seats", FieldType::Number).with_rule(
                    StoredRule::new("r1", "plan", Operator::Equals, ActionKind::SetValue, "seats")
                        .with_value("team")
                        .with_target_value(25),
                ),
            );
        let mut session = FormSession::new(engine(&form));
        session.set_answer("plan", "team").unwrap();
        assert_eq!(session.answers().len(), 1);
        assert_eq!(session.state().value("seats"), Some(&AnswerValue::Number(25.0)));

        session.set_answer("plan", "solo").unwrap();
        assert!(session.state().value("seats").is_none());
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(Outcome::CapReached { passes: 10 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "cap_reached", "passes": 10}));
    }
}
