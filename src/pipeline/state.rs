use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Field holding a record's display name. Required for every pipeline.
pub const NAME_FIELD: &str = "name";

/// Identity of a work item: its position in the submitted batch plus its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemKey {
    pub index: usize,
    pub name: String,
}

impl ItemKey {
    /// Identity for a record that could not be turned into a work item.
    pub fn for_record(index: usize, fields: &serde_json::Map<String, serde_json::Value>) -> Self {
        let name = fields
            .get(NAME_FIELD)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| format!("record #{index}"), str::to_string);
        Self { index, name }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.index, self.name)
    }
}

/// One company record to enrich. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    key: ItemKey,
    fields: BTreeMap<String, String>,
}

impl WorkItem {
    /// Build and validate an item. `required` lists fields beyond the display
    /// name that must be present and non-blank.
    pub fn new(index: usize, fields: BTreeMap<String, String>, required: &[&str]) -> Result<Self> {
        let missing: Vec<&str> = std::iter::once(NAME_FIELD)
            .chain(required.iter().copied())
            .filter(|field| {
                fields
                    .get(*field)
                    .map_or(true, |value| value.trim().is_empty())
            })
            .collect();

        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "record #{index} is missing required field(s): {}",
                missing.join(", ")
            )));
        }

        let name = fields[NAME_FIELD].trim().to_string();
        Ok(Self {
            key: ItemKey { index, name },
            fields,
        })
    }

    /// Build an item from a loosely-typed JSON record.
    ///
    /// Strings are kept as-is, other scalars are stringified, nulls are dropped and
    /// nested values are kept as compact JSON text.
    pub fn from_record(
        index: usize,
        record: &serde_json::Map<String, serde_json::Value>,
        required: &[&str],
    ) -> Result<Self> {
        let fields = record
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    serde_json::Value::Null => return None,
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Number(n) => n.to_string(),
                    other => other.to_string(),
                };
                Some((key.clone(), text))
            })
            .collect();

        Self::new(index, fields, required)
    }

    pub fn key(&self) -> &ItemKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// One piece of text returned by the search service, with the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub query: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
}

impl TranscriptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-item accumulator threaded through a pipeline's stages.
///
/// Owned by a single runner; never shared between items.
#[derive(Debug, Clone)]
pub struct PipelineState {
    item: WorkItem,
    evidence: Vec<Evidence>,
    synthesis: Option<String>,
    transcript: Vec<TranscriptMessage>,
}

impl PipelineState {
    pub fn new(item: WorkItem) -> Self {
        Self {
            item,
            evidence: Vec::new(),
            synthesis: None,
            transcript: Vec::new(),
        }
    }

    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn push_evidence(&mut self, evidence: Evidence) {
        self.evidence.push(evidence);
    }

    /// All evidence text in collection order, separated by blank lines.
    pub fn evidence_text(&self) -> String {
        self.evidence
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn synthesis(&self) -> Option<&str> {
        self.synthesis.as_deref()
    }

    pub fn set_synthesis(&mut self, text: String) {
        self.synthesis = Some(text);
    }

    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    pub fn append_transcript(&mut self, message: TranscriptMessage) {
        self.transcript.push(message);
    }

    pub fn into_parts(self) -> (WorkItem, Option<String>) {
        (self.item, self.synthesis)
    }
}
