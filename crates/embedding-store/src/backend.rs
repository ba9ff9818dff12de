use crate::error::{EmbeddingStoreError, Result};
use crate::types::{EmbeddingRecord, RecordMeta};
use async_trait::async_trait;
use chrono::Utc;
use pantry_protocol::{DonorOfferId, EmbeddingId, EmbeddingOwner, GeneralItemId, OwnerKind, WishlistId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

/// A ranked nearest-neighbor hit.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub record: EmbeddingRecord,
    pub distance: f32,
}

/// Metadata restrictions for nearest-neighbor retrieval.
///
/// Every field is a bound value, never interpolated into a query string.
/// `offer_allowlist` gates records through their owning donor offer:
/// records carrying an offer id must appear in the set, records without
/// one pass untouched.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub owner_kind: Option<OwnerKind>,
    pub general_items: Option<Vec<GeneralItemId>>,
    pub wishlists: Option<Vec<WishlistId>>,
    pub donor_offers: Option<Vec<DonorOfferId>>,
    pub offer_allowlist: Option<HashSet<DonorOfferId>>,
}

impl SearchFilter {
    pub fn matches(&self, record: &EmbeddingRecord) -> bool {
        if let Some(kind) = self.owner_kind {
            if record.owner.kind() != kind {
                return false;
            }
        }
        if let Some(items) = &self.general_items {
            match record.owner.general_item_id() {
                Some(id) if items.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(wishlists) = &self.wishlists {
            match record.owner.wishlist_id() {
                Some(id) if wishlists.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(offers) = &self.donor_offers {
            match record.owner.donor_offer_id() {
                Some(id) if offers.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(allowed) = &self.offer_allowlist {
            if let Some(offer) = record.owner.donor_offer_id() {
                if !allowed.contains(&offer) {
                    return false;
                }
            }
        }
        true
    }
}

/// Access patterns the core requires from a vector-capable store.
///
/// `upsert` must be atomic per owner key so concurrent writers targeting
/// the same owner cannot create duplicate records.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Insert-or-update by owner key, returning the stored record.
    async fn upsert(
        &self,
        owner: EmbeddingOwner,
        vector: Vec<f32>,
        meta: RecordMeta,
    ) -> Result<EmbeddingRecord>;

    /// Deletes the given records, returning how many existed.
    async fn delete(&self, ids: &[EmbeddingId]) -> Result<usize>;

    async fn get(&self, id: EmbeddingId) -> Result<Option<EmbeddingRecord>>;

    async fn find_by_owner(&self, owner_key: &str) -> Result<Option<EmbeddingRecord>>;

    /// Ranked by ascending cosine distance, truncated to `k`.
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<Neighbor>>;

    /// All general-item records tied to one donor offer.
    async fn records_for_offer(&self, offer: DonorOfferId) -> Result<Vec<EmbeddingRecord>>;
}

/// Cosine distance in [0, 2]; lower is more similar.
///
/// A zero-norm operand has no direction, so the pair is treated as
/// unrelated (distance 1).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    (1.0 - similarity).clamp(0.0, 2.0)
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, EmbeddingRecord>,
    keys_by_id: HashMap<EmbeddingId, String>,
    next_id: i64,
}

/// In-memory reference backend with JSON-file persistence.
///
/// The trait seam is where a pgvector or Qdrant adapter would plug in; this
/// implementation does an exact cosine scan, which is plenty for catalog
/// sizes in the low tens of thousands.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref()).await?;
        let records: Vec<EmbeddingRecord> = serde_json::from_str(&data)?;
        let mut state = MemoryState::default();
        for record in records {
            state.next_id = state.next_id.max(record.id.0 + 1);
            let key = record.owner.owner_key();
            state.keys_by_id.insert(record.id, key.clone());
            state.records.insert(key, record);
        }
        log::info!(
            "loaded {} embedding records from {:?}",
            state.records.len(),
            path.as_ref()
        );
        Ok(Self {
            inner: RwLock::new(state),
        })
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = {
            let state = self.read()?;
            let mut records: Vec<EmbeddingRecord> = state.records.values().cloned().collect();
            records.sort_by_key(|r| r.id);
            serde_json::to_string_pretty(&records)?
        };
        tokio::fs::write(path.as_ref(), data).await?;
        log::info!("saved embedding records to {:?}", path.as_ref());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.inner
            .read()
            .map_err(|_| EmbeddingStoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.inner
            .write()
            .map_err(|_| EmbeddingStoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn upsert(
        &self,
        owner: EmbeddingOwner,
        vector: Vec<f32>,
        meta: RecordMeta,
    ) -> Result<EmbeddingRecord> {
        let key = owner.owner_key();
        // conditional insert-or-update under one write lock: atomic per owner
        let mut state = self.write()?;
        let id = match state.records.get(&key) {
            Some(existing) => existing.id,
            None => {
                let id = EmbeddingId(state.next_id);
                state.next_id += 1;
                id
            }
        };
        let record = EmbeddingRecord {
            id,
            owner,
            vector,
            meta,
            updated_at: Utc::now(),
        };
        state.keys_by_id.insert(id, key.clone());
        state.records.insert(key, record.clone());
        Ok(record)
    }

    async fn delete(&self, ids: &[EmbeddingId]) -> Result<usize> {
        let mut state = self.write()?;
        let mut removed = 0usize;
        for id in ids {
            if let Some(key) = state.keys_by_id.remove(id) {
                if state.records.remove(&key).is_some() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn get(&self, id: EmbeddingId) -> Result<Option<EmbeddingRecord>> {
        let state = self.read()?;
        Ok(state
            .keys_by_id
            .get(&id)
            .and_then(|key| state.records.get(key))
            .cloned())
    }

    async fn find_by_owner(&self, owner_key: &str) -> Result<Option<EmbeddingRecord>> {
        let state = self.read()?;
        Ok(state.records.get(owner_key).cloned())
    }

    async fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<Neighbor>> {
        let state = self.read()?;
        let mut hits: Vec<Neighbor> = state
            .records
            .values()
            .filter(|record| filter.matches(record))
            .map(|record| Neighbor {
                distance: cosine_distance(query, &record.vector),
                record: record.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn records_for_offer(&self, offer: DonorOfferId) -> Result<Vec<EmbeddingRecord>> {
        let state = self.read()?;
        let mut records: Vec<EmbeddingRecord> = state
            .records
            .values()
            .filter(|record| record.owner.donor_offer_id() == Some(offer))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str) -> RecordMeta {
        RecordMeta::titled(title)
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_owner() {
        let backend = MemoryBackend::new();
        let owner = EmbeddingOwner::general_item(GeneralItemId(1), Some(DonorOfferId(10)));

        let first = backend
            .upsert(owner, vec![1.0, 0.0], meta("rice"))
            .await
            .unwrap();
        let second = backend
            .upsert(owner, vec![0.0, 1.0], meta("white rice"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(backend.len(), 1);
        let stored = backend.get(first.id).await.unwrap().unwrap();
        assert_eq!(stored.meta.title, "white rice");
        assert_eq!(stored.vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn neighbors_rank_by_distance_and_respect_filters() {
        let backend = MemoryBackend::new();
        backend
            .upsert(
                EmbeddingOwner::general_item(GeneralItemId(1), Some(DonorOfferId(10))),
                vec![1.0, 0.0],
                meta("rice"),
            )
            .await
            .unwrap();
        backend
            .upsert(
                EmbeddingOwner::general_item(GeneralItemId(2), Some(DonorOfferId(11))),
                vec![0.6, 0.8],
                meta("beans"),
            )
            .await
            .unwrap();
        backend
            .upsert(
                EmbeddingOwner::wishlist(WishlistId(3)),
                vec![1.0, 0.0],
                meta("rice wish"),
            )
            .await
            .unwrap();

        let filter = SearchFilter {
            owner_kind: Some(OwnerKind::GeneralItem),
            ..Default::default()
        };
        let hits = backend
            .nearest_neighbors(&[1.0, 0.0], 10, &filter)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.owner.general_item_id(), Some(GeneralItemId(1)));
        assert!(hits[0].distance < hits[1].distance);

        let gated = SearchFilter {
            owner_kind: Some(OwnerKind::GeneralItem),
            offer_allowlist: Some([DonorOfferId(11)].into_iter().collect()),
            ..Default::default()
        };
        let hits = backend
            .nearest_neighbors(&[1.0, 0.0], 10, &gated)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.owner.general_item_id(), Some(GeneralItemId(2)));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let backend = MemoryBackend::new();
        backend
            .upsert(
                EmbeddingOwner::general_item(GeneralItemId(1), None),
                vec![0.5, 0.5],
                meta("pasta"),
            )
            .await
            .unwrap();
        backend.save(&path).await.unwrap();

        let reloaded = MemoryBackend::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        let record = reloaded
            .find_by_owner("general_item:1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.meta.title, "pasta");
    }

    #[test]
    fn cosine_distance_basics() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
