//! # Pantry Allocation
//!
//! Fair whole-unit apportionment of a finite donated supply.
//!
//! [`apportion`] is the exact-sum largest-remainder primitive; the
//! [`AllocationRefiner`] layers an optional reasoning-service adjustment on
//! top of it and re-normalizes whatever comes back, so the sum invariant
//! holds no matter what the external service produces. With no reasoning
//! client configured the refiner is fully deterministic.

mod context;
mod error;
mod normalizer;
mod reasoning;
mod refiner;
mod types;

pub use context::{partner_global_context, PartnerGlobalContext};
pub use error::{AllocationError, Result};
pub use normalizer::apportion;
pub use reasoning::{
    reasoner_from_env, AdjustmentPayload, AdjustmentResponse, AnthropicReasoner, PayloadItem,
    PayloadRequest, ReasoningClient, ResponseItem, ResponseRequest,
};
pub use refiner::AllocationRefiner;
pub use types::{AllocationItem, ItemAllocation, ItemAllocationDiff};
