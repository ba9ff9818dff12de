use crate::error::{MatchingError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use pantry_protocol::{DonorOfferId, OfferState};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// The slice of a donor offer the matchability rule needs.
#[derive(Debug, Clone)]
pub struct OfferRecord {
    pub id: DonorOfferId,
    pub state: OfferState,
    pub deadline: Option<NaiveDate>,
    pub unallocated_items: u32,
}

/// An offer stays a search target while it is unfinalized and its deadline
/// has not passed, or once archived while any line item is still
/// unallocated. Finalized offers are never matched against.
pub fn offer_is_matchable(offer: &OfferRecord, today: NaiveDate) -> bool {
    match offer.state {
        OfferState::Unfinalized => offer.deadline.map_or(true, |deadline| deadline >= today),
        OfferState::Archived => offer.unallocated_items > 0,
        OfferState::Finalized => false,
    }
}

/// Resolves the set of donor offers search may currently surface.
#[async_trait]
pub trait OfferDirectory: Send + Sync {
    async fn matchable_offers(&self) -> Result<HashSet<DonorOfferId>>;
}

/// In-memory offer directory; reference implementation and test double for
/// the CRUD layer that owns offer records in production.
#[derive(Default)]
pub struct MemoryOfferDirectory {
    offers: RwLock<HashMap<DonorOfferId, OfferRecord>>,
}

impl MemoryOfferDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, offer: OfferRecord) {
        if let Ok(mut offers) = self.offers.write() {
            offers.insert(offer.id, offer);
        }
    }
}

#[async_trait]
impl OfferDirectory for MemoryOfferDirectory {
    async fn matchable_offers(&self) -> Result<HashSet<DonorOfferId>> {
        let today = Utc::now().date_naive();
        let offers = self
            .offers
            .read()
            .map_err(|_| MatchingError::Directory("lock poisoned".to_string()))?;
        Ok(offers
            .values()
            .filter(|offer| offer_is_matchable(offer, today))
            .map(|offer| offer.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn offer(state: OfferState, deadline: Option<NaiveDate>, unallocated: u32) -> OfferRecord {
        OfferRecord {
            id: DonorOfferId(1),
            state,
            deadline,
            unallocated_items: unallocated,
        }
    }

    #[test]
    fn unfinalized_without_deadline_is_matchable() {
        let today = date(2026, 6, 1);
        assert!(offer_is_matchable(
            &offer(OfferState::Unfinalized, None, 0),
            today
        ));
    }

    #[test]
    fn unfinalized_deadline_gates_on_today() {
        let today = date(2026, 6, 1);
        assert!(offer_is_matchable(
            &offer(OfferState::Unfinalized, Some(date(2026, 6, 1)), 0),
            today
        ));
        assert!(!offer_is_matchable(
            &offer(OfferState::Unfinalized, Some(date(2026, 5, 31)), 0),
            today
        ));
    }

    #[test]
    fn archived_needs_unallocated_items() {
        let today = date(2026, 6, 1);
        assert!(offer_is_matchable(
            &offer(OfferState::Archived, None, 3),
            today
        ));
        assert!(!offer_is_matchable(
            &offer(OfferState::Archived, None, 0),
            today
        ));
    }

    #[test]
    fn finalized_is_never_matchable() {
        let today = date(2026, 6, 1);
        assert!(!offer_is_matchable(
            &offer(OfferState::Finalized, None, 5),
            today
        ));
    }
}
