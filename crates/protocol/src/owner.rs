use crate::ids::{DonorOfferId, GeneralItemId, WishlistId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnerError {
    #[error("an embedding owner requires exactly one of general item id or wishlist id")]
    MissingOwner,

    #[error("general item id and wishlist id are mutually exclusive")]
    AmbiguousOwner,

    #[error("a donor offer id is only valid together with a general item id")]
    OfferWithoutItem,
}

/// Which table an embedding record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    GeneralItem,
    Wishlist,
}

/// The owning entity of an embedding record.
///
/// Exactly one owner exists per record, and a donor offer reference is only
/// carried on the general-item arm, so the illegal id combinations the
/// upstream callers could produce are unrepresentable once validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbeddingOwner {
    GeneralItem {
        item: GeneralItemId,
        #[serde(skip_serializing_if = "Option::is_none")]
        donor_offer: Option<DonorOfferId>,
    },
    Wishlist { wishlist: WishlistId },
}

impl EmbeddingOwner {
    pub fn general_item(item: GeneralItemId, donor_offer: Option<DonorOfferId>) -> Self {
        Self::GeneralItem { item, donor_offer }
    }

    pub fn wishlist(wishlist: WishlistId) -> Self {
        Self::Wishlist { wishlist }
    }

    /// Validates the raw optional ids external callers supply.
    ///
    /// Exactly one of `general_item`/`wishlist` must be present, and
    /// `donor_offer` is rejected unless it accompanies a general item.
    pub fn from_parts(
        general_item: Option<GeneralItemId>,
        wishlist: Option<WishlistId>,
        donor_offer: Option<DonorOfferId>,
    ) -> Result<Self, OwnerError> {
        match (general_item, wishlist) {
            (Some(_), Some(_)) => Err(OwnerError::AmbiguousOwner),
            (Some(item), None) => Ok(Self::GeneralItem { item, donor_offer }),
            (None, Some(wishlist)) => {
                if donor_offer.is_some() {
                    Err(OwnerError::OfferWithoutItem)
                } else {
                    Ok(Self::Wishlist { wishlist })
                }
            }
            (None, None) => Err(OwnerError::MissingOwner),
        }
    }

    /// Uniqueness key for upsert-by-owner: at most one embedding record
    /// exists per distinct key.
    pub fn owner_key(&self) -> String {
        match self {
            Self::GeneralItem { item, .. } => format!("general_item:{item}"),
            Self::Wishlist { wishlist } => format!("wishlist:{wishlist}"),
        }
    }

    pub fn kind(&self) -> OwnerKind {
        match self {
            Self::GeneralItem { .. } => OwnerKind::GeneralItem,
            Self::Wishlist { .. } => OwnerKind::Wishlist,
        }
    }

    pub fn general_item_id(&self) -> Option<GeneralItemId> {
        match self {
            Self::GeneralItem { item, .. } => Some(*item),
            Self::Wishlist { .. } => None,
        }
    }

    pub fn wishlist_id(&self) -> Option<WishlistId> {
        match self {
            Self::GeneralItem { .. } => None,
            Self::Wishlist { wishlist } => Some(*wishlist),
        }
    }

    pub fn donor_offer_id(&self) -> Option<DonorOfferId> {
        match self {
            Self::GeneralItem { donor_offer, .. } => *donor_offer,
            Self::Wishlist { .. } => None,
        }
    }

    /// Replaces the donor offer reference; a no-op for wishlist owners.
    pub fn with_donor_offer(self, donor_offer: Option<DonorOfferId>) -> Self {
        match self {
            Self::GeneralItem { item, .. } => Self::GeneralItem { item, donor_offer },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serde_tags_the_owner_kind() {
        let owner = EmbeddingOwner::general_item(GeneralItemId(1), Some(DonorOfferId(3)));
        let json = serde_json::to_value(&owner).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "general_item", "item": 1, "donor_offer": 3})
        );
        let back: EmbeddingOwner = serde_json::from_value(json).unwrap();
        assert_eq!(back, owner);
    }

    #[test]
    fn rejects_missing_owner() {
        let out = EmbeddingOwner::from_parts(None, None, None);
        assert_eq!(out, Err(OwnerError::MissingOwner));
    }

    #[test]
    fn rejects_both_owners() {
        let out = EmbeddingOwner::from_parts(
            Some(GeneralItemId(1)),
            Some(WishlistId(2)),
            None,
        );
        assert_eq!(out, Err(OwnerError::AmbiguousOwner));
    }

    #[test]
    fn rejects_offer_without_item() {
        let out =
            EmbeddingOwner::from_parts(None, Some(WishlistId(2)), Some(DonorOfferId(3)));
        assert_eq!(out, Err(OwnerError::OfferWithoutItem));
    }

    #[test]
    fn accepts_item_with_offer() {
        let owner = EmbeddingOwner::from_parts(
            Some(GeneralItemId(1)),
            None,
            Some(DonorOfferId(3)),
        )
        .unwrap();
        assert_eq!(owner.general_item_id(), Some(GeneralItemId(1)));
        assert_eq!(owner.donor_offer_id(), Some(DonorOfferId(3)));
        assert_eq!(owner.owner_key(), "general_item:1");
    }

    #[test]
    fn wishlist_owner_key_is_distinct() {
        let a = EmbeddingOwner::wishlist(WishlistId(7));
        let b = EmbeddingOwner::general_item(GeneralItemId(7), None);
        assert_ne!(a.owner_key(), b.owner_key());
    }
}
