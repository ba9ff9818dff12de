//! Shared domain types for the pantry workspace.
//!
//! Typed identifiers, the embedding ownership model, the donor offer
//! lifecycle, and the partner request/share types exchanged between the
//! matching and allocation crates.

mod allocation;
mod ids;
mod offer;
mod owner;

pub use allocation::{AllocationShare, PartnerRequest};
pub use ids::{
    DistributionId, DonorOfferId, EmbeddingId, GeneralItemId, LineItemId, PartnerId, WishlistId,
};
pub use offer::OfferState;
pub use owner::{EmbeddingOwner, OwnerError, OwnerKind};
