use crate::error::Result;
use crate::offer_gate::OfferDirectory;
use pantry_embedding_store::{Embedder, SearchFilter, VectorBackend};
use pantry_protocol::{DonorOfferId, EmbeddingId, GeneralItemId, OwnerKind};
use std::sync::Arc;

pub const DEFAULT_DISTANCE_CUTOFF: f32 = 0.5;
pub const DEFAULT_HARD_CUTOFF: f32 = 0.3;

/// How confident a match is, by the hard-cutoff threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrength {
    Hard,
    Soft,
}

/// One search hit. Ephemeral, computed per query.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub general_item: GeneralItemId,
    pub embedding_id: EmbeddingId,
    pub donor_offer: Option<DonorOfferId>,
    pub title: String,
    pub distance: f32,
    pub similarity: f32,
    pub strength: MatchStrength,
}

#[derive(Debug, Clone)]
pub struct MatchParams {
    pub k: usize,
    pub distance_cutoff: f32,
    pub hard_cutoff: f32,
    pub filter: SearchFilter,
}

impl MatchParams {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            distance_cutoff: DEFAULT_DISTANCE_CUTOFF,
            hard_cutoff: DEFAULT_HARD_CUTOFF,
            filter: SearchFilter::default(),
        }
    }
}

/// Discovery search over general-item embeddings.
pub struct MatchEngine {
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorBackend>,
    offers: Arc<dyn OfferDirectory>,
}

impl MatchEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn VectorBackend>,
        offers: Arc<dyn OfferDirectory>,
    ) -> Self {
        Self {
            embedder,
            backend,
            offers,
        }
    }

    /// Top-k matches for a batch of queries, 1:1 with the input.
    ///
    /// Blank queries yield an empty list without error and are never sent
    /// to the embedding service. Targets are always general-item
    /// embeddings whose owning donor offer is still matchable; wishlist
    /// embeddings are never search targets.
    pub async fn top_k_matches(
        &self,
        queries: &[&str],
        params: &MatchParams,
    ) -> Result<Vec<Vec<MatchResult>>> {
        let live: Vec<(usize, &str)> = queries
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.trim().is_empty())
            .map(|(i, q)| (i, q.trim()))
            .collect();

        let mut results: Vec<Vec<MatchResult>> = vec![Vec::new(); queries.len()];
        if live.is_empty() {
            return Ok(results);
        }

        let texts: Vec<&str> = live.iter().map(|(_, q)| *q).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let mut filter = params.filter.clone();
        filter.owner_kind = Some(OwnerKind::GeneralItem);
        filter.offer_allowlist = Some(self.offers.matchable_offers().await?);

        for ((slot, query), vector) in live.into_iter().zip(vectors) {
            let neighbors = self
                .backend
                .nearest_neighbors(&vector, params.k, &filter)
                .await?;
            let matches: Vec<MatchResult> = neighbors
                .into_iter()
                .filter(|n| n.distance <= params.distance_cutoff)
                .filter_map(|n| {
                    let general_item = n.record.owner.general_item_id()?;
                    Some(MatchResult {
                        general_item,
                        embedding_id: n.record.id,
                        donor_offer: n.record.owner.donor_offer_id(),
                        title: n.record.meta.title.clone(),
                        distance: n.distance,
                        similarity: 1.0 - n.distance,
                        strength: if n.distance <= params.hard_cutoff {
                            MatchStrength::Hard
                        } else {
                            MatchStrength::Soft
                        },
                    })
                })
                .collect();
            log::debug!("query '{query}': {} matches", matches.len());
            results[slot] = matches;
        }
        Ok(results)
    }

    /// Single-query convenience over [`Self::top_k_matches`].
    pub async fn matches_for(&self, query: &str, params: &MatchParams) -> Result<Vec<MatchResult>> {
        let mut batches = self.top_k_matches(&[query], params).await?;
        Ok(batches.pop().unwrap_or_default())
    }
}
