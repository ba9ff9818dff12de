use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

define_id!(
    /// A catalog entry describing a bulk quantity of one item type.
    GeneralItemId
);
define_id!(
    /// A partner wish-list entry.
    WishlistId
);
define_id!(
    /// The donor offer a general item belongs to.
    DonorOfferId
);
define_id!(
    /// A partner organization competing for supply.
    PartnerId
);
define_id!(
    /// One physical unit of a general item, allocatable to one partner.
    LineItemId
);
define_id!(
    /// An in-progress bundle of allocations earmarked for one partner.
    DistributionId
);
define_id!(
    /// A persisted embedding record.
    EmbeddingId
);
