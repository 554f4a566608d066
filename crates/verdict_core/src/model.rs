use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field of a structured classifier payload that carries the verdict text.
pub const VERDICT_FIELD: &str = "lijie";

/// Ground-truth or derived classification of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Qualified,
    Unqualified,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Label::Qualified => "qualified",
            Label::Unqualified => "unqualified",
        })
    }
}

/// Coarse per-item status, derived from [`ItemState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Succeeded | ItemStatus::Failed)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InFlight => "in-flight",
            ItemStatus::Succeeded => "succeeded",
            ItemStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Classifier result, resolved once from the raw response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// A JSON object carrying a textual verdict in [`VERDICT_FIELD`].
    Structured { verdict: String, payload: Value },
    /// A bare string result.
    Text(String),
    /// Anything else; the verdict text is the compact JSON rendering.
    Raw(Value),
}

impl Outcome {
    pub fn from_payload(payload: Value) -> Self {
        match payload {
            Value::String(text) => Outcome::Text(text),
            Value::Object(fields) => {
                let verdict = fields
                    .get(VERDICT_FIELD)
                    .and_then(Value::as_str)
                    .filter(|verdict| !verdict.is_empty())
                    .map(str::to_string);
                let payload = Value::Object(fields);
                match verdict {
                    Some(verdict) => Outcome::Structured { verdict, payload },
                    None => Outcome::Raw(payload),
                }
            }
            other => Outcome::Raw(other),
        }
    }

    pub fn verdict_text(&self) -> Cow<'_, str> {
        match self {
            Outcome::Structured { verdict, .. } => Cow::Borrowed(verdict),
            Outcome::Text(text) => Cow::Borrowed(text),
            Outcome::Raw(value) => Cow::Owned(value.to_string()),
        }
    }
}

/// Accepted classifier result plus the accuracy fields derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub result: Outcome,
    pub derived: Label,
    pub matches_expected: Option<bool>,
}

/// Lifecycle state of one item. Terminal payloads live on the variant, so an
/// outcome without success or a reason without failure cannot be expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    InFlight,
    Succeeded { outcome: ItemOutcome },
    Failed { reason: String },
}

impl ItemState {
    pub fn status(&self) -> ItemStatus {
        match self {
            ItemState::Pending => ItemStatus::Pending,
            ItemState::InFlight => ItemStatus::InFlight,
            ItemState::Succeeded { .. } => ItemStatus::Succeeded,
            ItemState::Failed { .. } => ItemStatus::Failed,
        }
    }
}

/// One row/column cell produced by ingestion, before it enters the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub url: String,
    pub source_row: u32,
    pub source_column: String,
    pub expected_label: Option<Label>,
}

impl SourceItem {
    pub fn new(url: impl Into<String>, source_row: u32, source_column: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_row,
            source_column: source_column.into(),
            expected_label: None,
        }
    }

    pub fn with_expected(mut self, label: Label) -> Self {
        self.expected_label = Some(label);
        self
    }
}

/// A unit of work. Identity is its index in [`RunState::items`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub url: String,
    pub source_row: u32,
    pub source_column: String,
    pub expected_label: Option<Label>,
    pub(crate) state: ItemState,
}

impl WorkItem {
    pub fn status(&self) -> ItemStatus {
        self.state.status()
    }

    pub fn state(&self) -> &ItemState {
        &self.state
    }

    pub fn outcome(&self) -> Option<&ItemOutcome> {
        match &self.state {
            ItemState::Succeeded { outcome } => Some(outcome),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            ItemState::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn matches_expected(&self) -> Option<bool> {
        self.outcome().and_then(|outcome| outcome.matches_expected)
    }
}

impl From<SourceItem> for WorkItem {
    fn from(source: SourceItem) -> Self {
        Self {
            url: source.url,
            source_row: source.source_row,
            source_column: source.source_column,
            expected_label: source.expected_label,
            state: ItemState::Pending,
        }
    }
}

/// Run Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Cancelling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timing {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Timing {
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}

/// The whole durable run session. Only the store mutates it; everyone else
/// sees owned snapshots.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    pub(crate) items: Vec<WorkItem>,
    pub(crate) cursor: usize,
    pub(crate) phase: Phase,
    pub(crate) timing: Timing,
}

impl RunState {
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items
            .iter()
            .filter(|item| item.status() == status)
            .count()
    }

    /// First `Pending` index at or after `from`.
    pub fn first_pending_from(&self, from: usize) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, item)| item.status() == ItemStatus::Pending)
            .map(|(index, _)| index)
    }

    pub fn in_flight_indices(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status() == ItemStatus::InFlight)
            .map(|(index, _)| index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_payload_uses_verdict_field() {
        let outcome = Outcome::from_payload(json!({ "lijie": "合格", "score": 3 }));
        assert!(matches!(outcome, Outcome::Structured { .. }));
        assert_eq!(outcome.verdict_text(), "合格");
    }

    #[test]
    fn object_without_verdict_field_renders_as_json() {
        let outcome = Outcome::from_payload(json!({ "other": 1 }));
        assert_eq!(outcome, Outcome::Raw(json!({ "other": 1 })));
        assert_eq!(outcome.verdict_text(), r#"{"other":1}"#);
    }

    #[test]
    fn string_payload_is_text() {
        let outcome = Outcome::from_payload(json!("qualified"));
        assert_eq!(outcome, Outcome::Text("qualified".into()));
    }

    #[test]
    fn item_state_serializes_with_status_tag() {
        let value = serde_json::to_value(ItemState::InFlight).unwrap();
        assert_eq!(value, json!({ "status": "in_flight" }));
        let failed: ItemState =
            serde_json::from_value(json!({ "status": "failed", "reason": "boom" })).unwrap();
        assert_eq!(failed.status(), ItemStatus::Failed);
    }

    #[test]
    fn elapsed_requires_both_ends() {
        let start = Utc::now();
        let timing = Timing {
            started_at: Some(start),
            ended_at: None,
        };
        assert_eq!(timing.elapsed(), None);
        let timing = Timing {
            ended_at: Some(start + chrono::Duration::seconds(5)),
            ..timing
        };
        assert_eq!(timing.elapsed(), Some(chrono::Duration::seconds(5)));
    }
}
