use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{AppError, ErrorKind};
use crate::pipeline::state::ItemKey;
use crate::synthesis::IcpProfile;

/// Why an item failed, detailed enough to tell one failed company from a failed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Terminal result for one submitted item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Success {
        key: ItemKey,
        /// Original fields plus the pipeline's output field.
        record: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        profile: Option<IcpProfile>,
    },
    Failure {
        key: ItemKey,
        error: ErrorDetail,
    },
}

impl ItemOutcome {
    pub fn failure(key: ItemKey, error: &AppError, stage: Option<&str>) -> Self {
        ItemOutcome::Failure {
            key,
            error: ErrorDetail {
                kind: error.kind(),
                message: error.to_string(),
                stage: stage.map(str::to_string),
            },
        }
    }

    pub fn key(&self) -> &ItemKey {
        match self {
            ItemOutcome::Success { key, .. } | ItemOutcome::Failure { key, .. } => key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ItemOutcome::Success { .. } => None,
            ItemOutcome::Failure { error, .. } => Some(error.kind),
        }
    }
}

/// Outcomes for a whole batch, in submission order: position `i` holds the
/// outcome of the `i`-th submitted record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BatchResult {
    outcomes: Vec<ItemOutcome>,
}

impl BatchResult {
    pub(crate) fn new(outcomes: Vec<ItemOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<ItemOutcome> {
        self.outcomes
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}
