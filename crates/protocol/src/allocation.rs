use crate::ids::PartnerId;
use serde::{Deserialize, Serialize};

/// One partner's request against a general item.
///
/// The optional fields feed the reasoning rubric; a bare request with only
/// a quantity is valid and common.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerRequest {
    pub partner: PartnerId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl PartnerRequest {
    pub fn new(partner: PartnerId, quantity: u32) -> Self {
        Self {
            partner,
            quantity,
            tier: None,
            population: None,
            priority: None,
        }
    }
}

/// One partner's final whole-unit share of a general item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationShare {
    pub partner: PartnerId,
    pub quantity: u32,
}
