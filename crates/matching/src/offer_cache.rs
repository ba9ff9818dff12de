use crate::error::Result;
use chrono::NaiveDate;
use pantry_embedding_store::{cosine_distance, Embedder, EmbeddingRecord, VectorBackend};
use pantry_protocol::DonorOfferId;
use std::collections::HashMap;

pub const DEFAULT_CACHE_CUTOFF: f32 = 0.15;
pub const DEFAULT_EXPIRATION_TOLERANCE_DAYS: i64 = 1;

/// General-item embeddings batched per donor offer for one bulk
/// reconciliation pass.
///
/// Not a concurrent structure: callers serialize reconciliation runs per
/// offer.
#[derive(Default)]
pub struct OfferEmbeddingCache {
    offers: HashMap<DonorOfferId, Vec<EmbeddingRecord>>,
}

impl OfferEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn candidates(&self, offer: DonorOfferId) -> Option<&[EmbeddingRecord]> {
        self.offers.get(&offer).map(Vec::as_slice)
    }

    pub fn is_loaded(&self, offer: DonorOfferId) -> bool {
        self.offers.contains_key(&offer)
    }
}

/// A reconciliation row to match against the cache.
#[derive(Debug, Clone)]
pub struct CacheQuery {
    pub text: String,
    pub unit_type: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct CacheMatchParams {
    pub distance_cutoff: f32,
    pub expiration_tolerance_days: i64,
}

impl Default for CacheMatchParams {
    fn default() -> Self {
        Self {
            distance_cutoff: DEFAULT_CACHE_CUTOFF,
            expiration_tolerance_days: DEFAULT_EXPIRATION_TOLERANCE_DAYS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheMatch {
    pub record: EmbeddingRecord,
    pub distance: f32,
}

/// Bulk-fetches an offer's embeddings into the cache; a no-op when that
/// offer is already loaded.
pub async fn load_donor_offer_embeddings(
    backend: &dyn VectorBackend,
    offer: DonorOfferId,
    cache: &mut OfferEmbeddingCache,
) -> Result<()> {
    if cache.is_loaded(offer) {
        return Ok(());
    }
    let records = backend.records_for_offer(offer).await?;
    log::debug!("cached {} embeddings for offer {offer}", records.len());
    cache.offers.insert(offer, records);
    Ok(())
}

/// Strict single-best match for exact reconciliation.
///
/// Candidates must share the row's normalized unit type and sit within the
/// expiration tolerance; the best cosine distance among survivors wins only
/// when it clears the cutoff. Narrower than discovery search on purpose.
pub async fn find_similar_from_cache(
    embedder: &dyn Embedder,
    offer: DonorOfferId,
    query: &CacheQuery,
    cache: &OfferEmbeddingCache,
    params: &CacheMatchParams,
) -> Result<Option<CacheMatch>> {
    let Some(candidates) = cache.candidates(offer) else {
        log::debug!("offer {offer} not loaded in cache");
        return Ok(None);
    };

    let query_unit = query.unit_type.as_deref().map(normalize_unit);
    let survivors: Vec<&EmbeddingRecord> = candidates
        .iter()
        .filter(|record| {
            let record_unit = record.meta.unit_type.as_deref().map(normalize_unit);
            record_unit == query_unit
        })
        .filter(|record| {
            expiration_within(
                query.expiration_date,
                record.meta.expiration_date,
                params.expiration_tolerance_days,
            )
        })
        .collect();
    if survivors.is_empty() {
        return Ok(None);
    }

    let query_vector = embedder.embed(query.text.trim()).await?;
    let best = survivors
        .into_iter()
        .map(|record| CacheMatch {
            distance: cosine_distance(&query_vector, &record.vector),
            record: record.clone(),
        })
        .min_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

    Ok(best.filter(|m| m.distance <= params.distance_cutoff))
}

fn normalize_unit(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Both dates absent counts as a match; one absent never does.
fn expiration_within(a: Option<NaiveDate>, b: Option<NaiveDate>, tolerance_days: i64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).num_days().abs() <= tolerance_days,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_normalization_ignores_case_and_whitespace() {
        assert_eq!(normalize_unit("  Case  of 12 "), "case of 12");
        assert_eq!(normalize_unit("CASE OF 12"), "case of 12");
        assert_ne!(normalize_unit("case"), normalize_unit("pallet"));
    }

    #[test]
    fn expiration_proximity_rules() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        assert!(expiration_within(None, None, 1));
        assert!(expiration_within(Some(d(10)), Some(d(11)), 1));
        assert!(expiration_within(Some(d(11)), Some(d(10)), 1));
        assert!(!expiration_within(Some(d(10)), Some(d(12)), 1));
        assert!(!expiration_within(Some(d(10)), None, 1));
        assert!(!expiration_within(None, Some(d(10)), 1));
    }
}
