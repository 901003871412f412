//! Per-field render state consumed by the rendering layer.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::form::{AnswerValue, Answers};

/// Effective state of one field after rules have been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRenderState {
    /// Field id.
    pub field_id: String,

    /// Whether the field is drawn.
    pub visible: bool,

    /// Requiredness after rule overrides.
    #[serde(rename = "effectiveRequired")]
    pub required: bool,

    /// Option list after rule overrides.
    #[serde(rename = "currentOptions", default)]
    pub options: Vec<String>,

    /// Current value: the user's answer or a rule-forced value.
    #[serde(rename = "currentValue", default)]
    pub value: Option<AnswerValue>,

    /// Whether `value` was forced by a `set_value` rule.
    #[serde(default)]
    pub forced: bool,
}

/// Render state of a whole form, in field display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderState {
    /// Per-field state.
    pub fields: Vec<FieldRenderState>,

    /// Navigation target requested by the last matched `skip_to` rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to: Option<String>,
}

impl RenderState {
    /// State of one field.
    #[must_use]
    pub fn field(&self, field_id: &str) -> Option<&FieldRenderState> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    pub(crate) fn field_mut(&mut self, field_id: &str) -> Option<&mut FieldRenderState> {
        self.fields.iter_mut().find(|f| f.field_id == field_id)
    }

    /// Whether a field is visible. Unknown fields are not.
    #[must_use]
    pub fn is_visible(&self, field_id: &str) -> bool {
        self.field(field_id).is_some_and(|f| f.visible)
    }

    /// Whether a field is effectively required. Unknown fields are not.
    #[must_use]
    pub fn is_required(&self, field_id: &str) -> bool {
        self.field(field_id).is_some_and(|f| f.required)
    }

    /// Effective value of a field.
    #[must_use]
    pub fn value(&self, field_id: &str) -> Option<&AnswerValue> {
        self.field(field_id).and_then(|f| f.value.as_ref())
    }

    /// Fields that should be drawn.
    pub fn visible_fields(&self) -> impl Iterator<Item = &FieldRenderState> {
        self.fields.iter().filter(|f| f.visible)
    }

    /// Effective values of all fields as an answer map.
    #[must_use]
    pub fn answers(&self) -> Answers {
        self.fields
            .iter()
            .filter_map(|f| f.value.clone().map(|v| (f.field_id.clone(), v)))
            .collect()
    }

    /// Ids of fields whose state differs between `self` and `other`.
    ///
    /// Fields present in only one of the two states are included.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<String> {
        let mut changed: Vec<String> = self
            .fields
            .iter()
            .filter(|f| other.field(&f.field_id) != Some(*f))
            .map(|f| f.field_id.clone())
            .collect();
        changed.extend(
            other
                .fields
                .iter()
                .filter(|f| self.field(&f.field_id).is_none())
                .map(|f| f.field_id.clone()),
        );
        changed
    }

    /// Serialize the render state as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
