//! Memory types for factbank.
//!
//! A memory is a short factual statement persisted by the similarity store
//! together with its embedding. `MemoryRecord` is the store-side shape;
//! `Memory` is what callers of `add`/`search`/`list` receive.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Open, string-keyed metadata attached to a memory.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Default number of results returned by a similarity search.
pub const DEFAULT_TOP_K: usize = 5;

/// Default maximum cosine distance for a search hit.
///
/// Cosine distance of 0.6 corresponds to 40% similarity.
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.6;

/// Default page size for `list`.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Store-assigned memory identifier.
///
/// Opaque to the engine. The bundled stores mint UUIDv7 strings, so ordering
/// by identifier is also ordering by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub String);

impl MemoryId {
    /// Mint a new time-sortable identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A memory as persisted by the similarity store, embedding included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    /// Set only when the record has been mutated after creation.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating a memory. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// A memory as returned to callers (no embedding, epoch-millisecond timestamps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: MemoryId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<MemoryRecord> for Memory {
    fn from(record: MemoryRecord) -> Self {
        Self {
            id: record.id,
            content: record.content,
            metadata: record.metadata,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// A search hit with its cosine distance from the query embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMemory {
    pub record: MemoryRecord,
    /// Cosine distance (0.0 = identical direction). Lower is more relevant.
    pub distance: f32,
}

/// Parameters for a similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of hits to return.
    pub top_k: usize,
    /// Maximum cosine distance for a hit to be included.
    pub threshold: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            threshold: DEFAULT_SEARCH_THRESHOLD,
        }
    }
}

/// Parameters for paginated listing. Results are ordered by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Return only records whose id sorts strictly after this one.
    #[serde(default)]
    pub cursor: Option<MemoryId>,
    /// Records to skip after the cursor is applied.
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            cursor: None,
            offset: 0,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}
