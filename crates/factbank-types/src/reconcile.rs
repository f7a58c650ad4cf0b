//! Reconciliation types: merge actions and the request/response shapes
//! exchanged with the extraction and decision services.
//!
//! Candidates are shown to the decision service under dense temporary
//! integers rather than persisted ids; see `CandidateMemory`.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryId, Metadata};

/// The kind of store mutation a merge action requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ActionKind {
    #[serde(rename = "ADD", alias = "add")]
    Add,
    #[serde(rename = "UPDATE", alias = "update")]
    Update,
    #[serde(rename = "DELETE", alias = "delete")]
    Delete,
    /// Leave the store untouched.
    #[serde(rename = "NONE", alias = "none")]
    Noop,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Add => write!(f, "ADD"),
            ActionKind::Update => write!(f, "UPDATE"),
            ActionKind::Delete => write!(f, "DELETE"),
            ActionKind::Noop => write!(f, "NONE"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADD" => Ok(ActionKind::Add),
            "UPDATE" => Ok(ActionKind::Update),
            "DELETE" => Ok(ActionKind::Delete),
            "NONE" => Ok(ActionKind::Noop),
            other => Err(format!("invalid action kind: '{other}'")),
        }
    }
}

/// One merge action returned by the decision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MergeAction {
    /// Temporary id of the targeted candidate. Required for UPDATE/DELETE,
    /// ignored for ADD/NONE.
    #[serde(default)]
    pub reference: Option<i64>,
    /// The fact text to store (ADD/UPDATE).
    #[serde(default)]
    pub text: String,
    #[serde(rename = "action")]
    pub kind: ActionKind,
}

impl MergeAction {
    pub fn add(text: impl Into<String>) -> Self {
        Self {
            reference: None,
            text: text.into(),
            kind: ActionKind::Add,
        }
    }

    pub fn update(reference: i64, text: impl Into<String>) -> Self {
        Self {
            reference: Some(reference),
            text: text.into(),
            kind: ActionKind::Update,
        }
    }

    pub fn delete(reference: i64) -> Self {
        Self {
            reference: Some(reference),
            text: String::new(),
            kind: ActionKind::Delete,
        }
    }

    pub fn noop(text: impl Into<String>) -> Self {
        Self {
            reference: None,
            text: text.into(),
            kind: ActionKind::Noop,
        }
    }
}

/// Request body sent to the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub content: String,
}

/// Structured response expected from the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResponse {
    /// Atomic facts, in extraction order.
    pub facts: Vec<String>,
}

/// An existing memory as presented to the decision service.
///
/// `id` is the temporary identifier, never the persisted one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMemory {
    pub id: u32,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Request body sent to the decision service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub new_facts: Vec<String>,
    pub old_memory: Vec<CandidateMemory>,
}

/// Structured response expected from the decision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionResponse {
    pub actions: Vec<MergeAction>,
}

/// A merge action that was committed to the store during one `add` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAction {
    /// Position of the action in the decision service's list.
    pub index: usize,
    pub kind: ActionKind,
    /// The created, updated or deleted record. `None` for NONE.
    pub memory_id: Option<MemoryId>,
}

/// A reference the engine could not resolve while applying actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UnresolvedReference {
    /// UPDATE/DELETE without any reference.
    Missing,
    /// A temporary id that was never issued in this call.
    Temporary(i64),
    /// A mapped record the store no longer holds.
    Persisted(MemoryId),
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReference::Missing => write!(f, "missing reference"),
            UnresolvedReference::Temporary(id) => write!(f, "temporary id {id}"),
            UnresolvedReference::Persisted(id) => write!(f, "memory '{id}'"),
        }
    }
}
