use crate::backend::VectorBackend;
use crate::embedder::{sanitize_vector, Embedder};
use crate::error::{EmbeddingStoreError, Result};
use crate::types::RecordMeta;
use chrono::NaiveDate;
use pantry_protocol::{
    DonorOfferId, EmbeddingId, EmbeddingOwner, GeneralItemId, OwnerKind, WishlistId,
};
use std::sync::Arc;

/// A record to embed and upsert. Owner ids arrive raw from the CRUD layer
/// and are validated here.
#[derive(Debug, Clone, Default)]
pub struct EmbedItem {
    pub general_item: Option<GeneralItemId>,
    pub wishlist: Option<WishlistId>,
    pub donor_offer: Option<DonorOfferId>,
    pub title: String,
    pub unit_type: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

/// A partial update. `title: Some(..)` with non-empty text triggers
/// re-embedding; `donor_offer`, `unit_type`, and `expiration_date` update
/// independently of the title and keep their stored value when `None`.
#[derive(Debug, Clone, Default)]
pub struct ModifyItem {
    pub general_item: Option<GeneralItemId>,
    pub wishlist: Option<WishlistId>,
    pub donor_offer: Option<DonorOfferId>,
    pub title: Option<String>,
    pub unit_type: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

/// Deletion targets: embedding ids and/or wishlist owner ids.
#[derive(Debug, Clone, Default)]
pub struct RemoveParams {
    pub embedding_ids: Vec<EmbeddingId>,
    pub wishlist_ids: Vec<WishlistId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddOutcome {
    pub indexed: usize,
    pub skipped: usize,
}

/// Owner-keyed embedding lifecycle over an [`Embedder`] and a
/// [`VectorBackend`].
///
/// Ownership violations and dimension mismatches are rejected before any
/// service or backend call is made.
pub struct EmbeddingStore {
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorBackend>,
}

impl EmbeddingStore {
    pub fn new(embedder: Arc<dyn Embedder>, backend: Arc<dyn VectorBackend>) -> Self {
        Self { embedder, backend }
    }

    pub fn backend(&self) -> Arc<dyn VectorBackend> {
        Arc::clone(&self.backend)
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Embeds and upserts each titled item; blank titles are skipped.
    ///
    /// All owner ids are validated up front, then the surviving titles go
    /// to the embedding service in a single batch call.
    pub async fn add(&self, items: &[EmbedItem]) -> Result<AddOutcome> {
        let mut pending: Vec<(EmbeddingOwner, &EmbedItem)> = Vec::new();
        let mut skipped = 0usize;
        for item in items {
            let owner =
                EmbeddingOwner::from_parts(item.general_item, item.wishlist, item.donor_offer)?;
            if item.title.trim().is_empty() {
                log::debug!("skipping untitled item for owner {}", owner.owner_key());
                skipped += 1;
                continue;
            }
            pending.push((owner, item));
        }
        if pending.is_empty() {
            return Ok(AddOutcome { indexed: 0, skipped });
        }

        let titles: Vec<&str> = pending.iter().map(|(_, item)| item.title.trim()).collect();
        let vectors = self.embedder.embed_batch(&titles).await?;
        if vectors.len() != pending.len() {
            return Err(EmbeddingStoreError::Embedding(format!(
                "embedder returned {} vectors for {} inputs",
                vectors.len(),
                pending.len()
            )));
        }

        let mut indexed = 0usize;
        for ((owner, item), vector) in pending.into_iter().zip(vectors) {
            let vector = sanitize_vector(vector, self.embedder.dimension())?;
            let meta = RecordMeta {
                title: item.title.trim().to_string(),
                unit_type: item.unit_type.clone(),
                expiration_date: item.expiration_date,
            };
            self.backend.upsert(owner, vector, meta).await?;
            indexed += 1;
        }
        log::info!("indexed {indexed} embeddings ({skipped} skipped)");
        Ok(AddOutcome { indexed, skipped })
    }

    /// Applies partial updates.
    ///
    /// A record that does not exist yet is created when the update carries
    /// a usable title; otherwise that item is a no-op.
    pub async fn modify(&self, items: &[ModifyItem]) -> Result<()> {
        let mut resolved: Vec<(EmbeddingOwner, &ModifyItem)> = Vec::new();
        for item in items {
            let owner =
                EmbeddingOwner::from_parts(item.general_item, item.wishlist, item.donor_offer)?;
            resolved.push((owner, item));
        }

        for (owner, item) in resolved {
            let existing = self.backend.find_by_owner(&owner.owner_key()).await?;
            let new_title = item
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty());

            match (existing, new_title) {
                (Some(record), maybe_title) => {
                    let (vector, title) = match maybe_title {
                        Some(title) => {
                            let vector = self.embedder.embed(title).await?;
                            let vector = sanitize_vector(vector, self.embedder.dimension())?;
                            (vector, title.to_string())
                        }
                        None => (record.vector.clone(), record.meta.title.clone()),
                    };
                    let donor_offer = item.donor_offer.or(record.owner.donor_offer_id());
                    let owner = record.owner.with_donor_offer(donor_offer);
                    let meta = RecordMeta {
                        title,
                        unit_type: item.unit_type.clone().or(record.meta.unit_type),
                        expiration_date: item.expiration_date.or(record.meta.expiration_date),
                    };
                    self.backend.upsert(owner, vector, meta).await?;
                }
                (None, Some(title)) => {
                    let vector = self.embedder.embed(title).await?;
                    let vector = sanitize_vector(vector, self.embedder.dimension())?;
                    let meta = RecordMeta {
                        title: title.to_string(),
                        unit_type: item.unit_type.clone(),
                        expiration_date: item.expiration_date,
                    };
                    self.backend.upsert(owner, vector, meta).await?;
                }
                (None, None) => {
                    log::debug!(
                        "modify: no stored embedding and no title for {}",
                        owner.owner_key()
                    );
                }
            }
        }
        Ok(())
    }

    /// Deletes wishlist-owned embeddings.
    ///
    /// Any id resolving to a general-item-owned record fails the whole call
    /// before anything is deleted; general-item embeddings only go away
    /// when their owner is deleted upstream. Unknown ids are skipped.
    pub async fn remove(&self, params: &RemoveParams) -> Result<usize> {
        if params.embedding_ids.is_empty() && params.wishlist_ids.is_empty() {
            return Err(EmbeddingStoreError::InvalidArguments(
                "remove requires at least one embedding id or wishlist id".to_string(),
            ));
        }

        let mut doomed: Vec<EmbeddingId> = Vec::new();
        for id in &params.embedding_ids {
            match self.backend.get(*id).await? {
                Some(record) => {
                    if record.owner.kind() == OwnerKind::GeneralItem {
                        return Err(EmbeddingStoreError::DeletionRestricted(*id));
                    }
                    doomed.push(*id);
                }
                None => log::debug!("remove: embedding {id} not found"),
            }
        }
        for wishlist in &params.wishlist_ids {
            let key = EmbeddingOwner::wishlist(*wishlist).owner_key();
            if let Some(record) = self.backend.find_by_owner(&key).await? {
                doomed.push(record.id);
            } else {
                log::debug!("remove: no embedding for wishlist {wishlist}");
            }
        }

        doomed.sort();
        doomed.dedup();
        self.backend.delete(&doomed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::embedder::StubEmbedder;
    use pantry_protocol::OwnerError;

    fn store_with_dim(dim: usize) -> (EmbeddingStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = EmbeddingStore::new(
            Arc::new(StubEmbedder::new(dim)),
            Arc::clone(&backend) as Arc<dyn VectorBackend>,
        );
        (store, backend)
    }

    fn item_for(general_item: i64, title: &str) -> EmbedItem {
        EmbedItem {
            general_item: Some(GeneralItemId(general_item)),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_skips_blank_titles_silently() {
        let (store, backend) = store_with_dim(8);
        let outcome = store
            .add(&[item_for(1, "rice"), item_for(2, "   "), item_for(3, "")])
            .await
            .unwrap();
        assert_eq!(outcome, AddOutcome { indexed: 1, skipped: 2 });
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn add_rejects_ambiguous_owner_before_indexing() {
        let (store, backend) = store_with_dim(8);
        let bad = EmbedItem {
            general_item: Some(GeneralItemId(1)),
            wishlist: Some(WishlistId(1)),
            title: "rice".to_string(),
            ..Default::default()
        };
        let out = store.add(&[item_for(1, "rice"), bad]).await;
        assert!(matches!(
            out,
            Err(EmbeddingStoreError::Owner(OwnerError::AmbiguousOwner))
        ));
        // validation happens before any embedding or upsert
        assert_eq!(backend.len(), 0);
    }

    #[tokio::test]
    async fn add_upserts_by_owner() {
        let (store, backend) = store_with_dim(8);
        store.add(&[item_for(1, "rice")]).await.unwrap();
        store.add(&[item_for(1, "brown rice")]).await.unwrap();
        assert_eq!(backend.len(), 1);
        let record = backend
            .find_by_owner("general_item:1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.meta.title, "brown rice");
    }

    #[tokio::test]
    async fn modify_reembeds_only_on_new_title() {
        let (store, backend) = store_with_dim(8);
        store.add(&[item_for(1, "rice")]).await.unwrap();
        let before = backend
            .find_by_owner("general_item:1")
            .await
            .unwrap()
            .unwrap();

        // offer update without a title keeps the vector
        store
            .modify(&[ModifyItem {
                general_item: Some(GeneralItemId(1)),
                donor_offer: Some(DonorOfferId(9)),
                ..Default::default()
            }])
            .await
            .unwrap();
        let after = backend
            .find_by_owner("general_item:1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.vector, before.vector);
        assert_eq!(after.owner.donor_offer_id(), Some(DonorOfferId(9)));

        // a new title recomputes the vector
        store
            .modify(&[ModifyItem {
                general_item: Some(GeneralItemId(1)),
                title: Some("jasmine rice".to_string()),
                ..Default::default()
            }])
            .await
            .unwrap();
        let retitled = backend
            .find_by_owner("general_item:1")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(retitled.vector, before.vector);
        assert_eq!(retitled.meta.title, "jasmine rice");
        // the independent offer update survives
        assert_eq!(retitled.owner.donor_offer_id(), Some(DonorOfferId(9)));
    }

    #[tokio::test]
    async fn remove_requires_a_target() {
        let (store, _) = store_with_dim(8);
        let out = store.remove(&RemoveParams::default()).await;
        assert!(matches!(out, Err(EmbeddingStoreError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn remove_refuses_general_item_embeddings() {
        let (store, backend) = store_with_dim(8);
        store.add(&[item_for(1, "rice")]).await.unwrap();
        let record = backend
            .find_by_owner("general_item:1")
            .await
            .unwrap()
            .unwrap();

        let out = store
            .remove(&RemoveParams {
                embedding_ids: vec![record.id],
                ..Default::default()
            })
            .await;
        assert!(matches!(
            out,
            Err(EmbeddingStoreError::DeletionRestricted(id)) if id == record.id
        ));
        // refused, not silently ignored; the record is still present
        assert!(backend.get(record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_deletes_wishlist_embeddings_by_either_id() {
        let (store, backend) = store_with_dim(8);
        store
            .add(&[
                EmbedItem {
                    wishlist: Some(WishlistId(5)),
                    title: "canned soup".to_string(),
                    ..Default::default()
                },
                EmbedItem {
                    wishlist: Some(WishlistId(6)),
                    title: "cereal".to_string(),
                    ..Default::default()
                },
            ])
            .await
            .unwrap();
        let by_id = backend
            .find_by_owner("wishlist:5")
            .await
            .unwrap()
            .unwrap();

        let removed = store
            .remove(&RemoveParams {
                embedding_ids: vec![by_id.id],
                wishlist_ids: vec![WishlistId(6)],
            })
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.len(), 0);
    }
}
