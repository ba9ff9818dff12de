use serde::{Deserialize, Serialize};

/// Donor offer lifecycle.
///
/// Offers start unfinalized while the donor's spreadsheet is still being
/// reconciled, move to finalized once every line is confirmed, and are
/// archived when the distribution round closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferState {
    Unfinalized,
    Finalized,
    Archived,
}
