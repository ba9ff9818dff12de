use anyhow::{Context, Result};
use chrono::NaiveDate;
use pantry_allocation::AllocationItem;
use pantry_embedding_store::EmbedItem;
use pantry_matching::OfferRecord;
use pantry_protocol::{
    DonorOfferId, GeneralItemId, OfferState, PartnerId, PartnerRequest, WishlistId,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Operator-maintained catalog file: donor offers, their items, wish-list
/// rows, and partner requests.
#[derive(Debug, Deserialize, Default)]
pub struct Catalog {
    #[serde(default)]
    pub offers: Vec<OfferEntry>,
    #[serde(default)]
    pub items: Vec<ItemEntry>,
    #[serde(default)]
    pub wishlist: Vec<WishlistEntry>,
    #[serde(default)]
    pub requests: Vec<RequestEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OfferEntry {
    pub id: i64,
    pub state: OfferState,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub unallocated_items: u32,
}

#[derive(Debug, Deserialize)]
pub struct ItemEntry {
    pub id: i64,
    #[serde(default)]
    pub offer: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub unit_type: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct WishlistEntry {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestEntry {
    pub item: i64,
    pub partner: i64,
    pub quantity: u32,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub population: Option<u32>,
    #[serde(default)]
    pub priority: Option<u32>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid catalog {}", path.display()))
    }

    pub fn embed_items(&self) -> Vec<EmbedItem> {
        let mut out: Vec<EmbedItem> = self
            .items
            .iter()
            .map(|item| EmbedItem {
                general_item: Some(GeneralItemId(item.id)),
                wishlist: None,
                donor_offer: item.offer.map(DonorOfferId),
                title: item.title.clone(),
                unit_type: item.unit_type.clone(),
                expiration_date: item.expiration_date,
            })
            .collect();
        out.extend(self.wishlist.iter().map(|entry| EmbedItem {
            general_item: None,
            wishlist: Some(WishlistId(entry.id)),
            donor_offer: None,
            title: entry.title.clone(),
            unit_type: None,
            expiration_date: None,
        }));
        out
    }

    pub fn offer_records(&self) -> Vec<OfferRecord> {
        self.offers
            .iter()
            .map(|offer| OfferRecord {
                id: DonorOfferId(offer.id),
                state: offer.state,
                deadline: offer.deadline,
                unallocated_items: offer.unallocated_items,
            })
            .collect()
    }

    /// Items with their requests, ready for the allocation refiner. Items
    /// nobody requested are skipped.
    pub fn allocation_items(&self) -> Vec<AllocationItem> {
        let mut requests_by_item: BTreeMap<i64, Vec<PartnerRequest>> = BTreeMap::new();
        for request in &self.requests {
            requests_by_item
                .entry(request.item)
                .or_default()
                .push(PartnerRequest {
                    partner: PartnerId(request.partner),
                    quantity: request.quantity,
                    tier: request.tier.clone(),
                    population: request.population,
                    priority: request.priority,
                });
        }
        self.items
            .iter()
            .filter_map(|item| {
                let requests = requests_by_item.remove(&item.id)?;
                Some(AllocationItem {
                    general_item: GeneralItemId(item.id),
                    title: item.title.clone(),
                    unit_type: item.unit_type.clone(),
                    total_quantity: item.total_quantity,
                    requests,
                })
            })
            .collect()
    }
}
