//! Condition evaluation.
//!
//! Decides whether a rule's condition holds for the trigger field's current
//! answer. An unset answer is treated as empty; type mismatches make the
//! comparison false. Evaluation never fails.

use crate::form::AnswerValue;
use crate::rule::{Condition, Operand};

impl Condition {
    /// Check the condition against the trigger field's current answer.
    #[must_use]
    pub fn is_met(&self, answer: Option<&AnswerValue>) -> bool {
        match self {
            Self::Equals(operand) => equals(operand, answer),
            Self::NotEquals(operand) => !equals(operand, answer),
            Self::Contains(needle) => contains(needle, answer),
            Self::NotContains(needle) => !contains(needle, answer),
            Self::GreaterThan(bound) => number(answer).is_some_and(|n| n > *bound),
            Self::LessThan(bound) => number(answer).is_some_and(|n| n < *bound),
            Self::IsEmpty => is_empty(answer),
            Self::IsNotEmpty => !is_empty(answer),
            Self::Never => false,
        }
    }
}

fn is_empty(answer: Option<&AnswerValue>) -> bool {
    answer.map_or(true, AnswerValue::is_empty)
}

fn number(answer: Option<&AnswerValue>) -> Option<f64> {
    answer.and_then(AnswerValue::as_number)
}

#[allow(clippy::float_cmp)]
fn equals(operand: &Operand, answer: Option<&AnswerValue>) -> bool {
    match operand {
        Operand::Number(expected) => number(answer).is_some_and(|n| n == *expected),
        // An unset or blank checkbox reads as unchecked.
        Operand::Bool(expected) => match answer {
            None => !expected,
            Some(AnswerValue::Text(t)) if t.is_empty() => !expected,
            Some(a) => a.as_bool() == Some(*expected),
        },
        Operand::Text(expected) => match answer {
            None => expected.is_empty(),
            Some(a) => a.as_text() == *expected,
        },
    }
}

fn contains(needle: &str, answer: Option<&AnswerValue>) -> bool {
    answer.is_some_and(|a| a.as_text().contains(needle))
}
