use pantry_protocol::{AllocationShare, GeneralItemId, PartnerRequest};
use serde::{Deserialize, Serialize};

/// One general item with a supply ceiling and the partner requests
/// competing for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationItem {
    pub general_item: GeneralItemId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
    pub total_quantity: u32,
    pub requests: Vec<PartnerRequest>,
}

/// Final shares for one item; Σ quantity == the item's total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAllocation {
    pub general_item: GeneralItemId,
    pub shares: Vec<AllocationShare>,
}

/// Baseline/final share pairing for a diffable review UI. `before` is
/// always the deterministic baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAllocationDiff {
    pub general_item: GeneralItemId,
    pub before: Vec<AllocationShare>,
    pub after: Vec<AllocationShare>,
}
