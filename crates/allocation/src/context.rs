use crate::types::AllocationItem;
use pantry_protocol::PartnerId;
use std::collections::BTreeMap;

/// Per-partner aggregate across a whole allocation batch.
///
/// `normalized_share` sums each item's baseline share divided by that
/// item's total, so a partner holding half of two items carries 1.0.
/// Ephemeral; feeds the cross-item fairness terms of the reasoning rubric.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartnerGlobalContext {
    pub normalized_share: f64,
    pub request_count: u32,
}

pub fn partner_global_context(
    items: &[AllocationItem],
    baselines: &[Vec<u32>],
) -> BTreeMap<PartnerId, PartnerGlobalContext> {
    let mut context: BTreeMap<PartnerId, PartnerGlobalContext> = BTreeMap::new();
    for (item, shares) in items.iter().zip(baselines) {
        for (request, &share) in item.requests.iter().zip(shares) {
            let entry = context.entry(request.partner).or_default();
            entry.request_count += 1;
            if item.total_quantity > 0 {
                entry.normalized_share += f64::from(share) / f64::from(item.total_quantity);
            }
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_protocol::{GeneralItemId, PartnerRequest};

    fn item(id: i64, total: u32, partners: &[(i64, u32)]) -> AllocationItem {
        AllocationItem {
            general_item: GeneralItemId(id),
            title: format!("item {id}"),
            unit_type: None,
            total_quantity: total,
            requests: partners
                .iter()
                .map(|&(p, q)| PartnerRequest::new(PartnerId(p), q))
                .collect(),
        }
    }

    #[test]
    fn sums_normalized_shares_across_items() {
        let items = vec![
            item(1, 10, &[(1, 5), (2, 5)]),
            item(2, 4, &[(1, 4)]),
        ];
        let baselines = vec![vec![5, 5], vec![4]];
        let context = partner_global_context(&items, &baselines);

        let p1 = context[&PartnerId(1)];
        assert!((p1.normalized_share - 1.5).abs() < 1e-9);
        assert_eq!(p1.request_count, 2);

        let p2 = context[&PartnerId(2)];
        assert!((p2.normalized_share - 0.5).abs() < 1e-9);
        assert_eq!(p2.request_count, 1);
    }

    #[test]
    fn zero_total_items_count_requests_but_no_share() {
        let items = vec![item(1, 0, &[(1, 3)])];
        let baselines = vec![vec![0]];
        let context = partner_global_context(&items, &baselines);
        let p1 = context[&PartnerId(1)];
        assert_eq!(p1.normalized_share, 0.0);
        assert_eq!(p1.request_count, 1);
    }
}
