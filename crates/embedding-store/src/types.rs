use chrono::{DateTime, NaiveDate, Utc};
use pantry_protocol::{EmbeddingId, EmbeddingOwner};
use serde::{Deserialize, Serialize};

/// Fixed dimensionality of every stored vector.
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Denormalized item attributes carried alongside each vector.
///
/// Upserts write these with the vector so that search results and the
/// offer-scoped reconciliation filters never need a second lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<NaiveDate>,
}

impl RecordMeta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            unit_type: None,
            expiration_date: None,
        }
    }
}

/// A persisted embedding, at most one per distinct owner key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: EmbeddingId,
    pub owner: EmbeddingOwner,
    pub vector: Vec<f32>,
    pub meta: RecordMeta,
    pub updated_at: DateTime<Utc>,
}
