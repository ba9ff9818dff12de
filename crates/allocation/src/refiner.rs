use crate::context::partner_global_context;
use crate::error::Result;
use crate::normalizer::apportion;
use crate::reasoning::{AdjustmentPayload, ReasoningClient, ResponseItem};
use crate::types::{AllocationItem, ItemAllocation, ItemAllocationDiff};
use pantry_protocol::AllocationShare;
use std::sync::Arc;

/// Allocation suggestions: a deterministic largest-remainder baseline,
/// optionally rebalanced by the reasoning service.
///
/// Whatever the service returns, the final shares are re-normalized so each
/// item's quantities sum exactly to its total; with no client configured
/// the baseline is the suggestion.
pub struct AllocationRefiner {
    reasoning: Option<Arc<dyn ReasoningClient>>,
}

impl AllocationRefiner {
    pub fn new(reasoning: Option<Arc<dyn ReasoningClient>>) -> Self {
        Self { reasoning }
    }

    pub fn deterministic() -> Self {
        Self { reasoning: None }
    }

    /// Final per-item, per-partner integers.
    pub async fn suggest(&self, items: &[AllocationItem]) -> Result<Vec<ItemAllocation>> {
        let (_, finals) = self.refine(items).await?;
        Ok(items
            .iter()
            .zip(finals)
            .map(|(item, shares)| ItemAllocation {
                general_item: item.general_item,
                shares: to_shares(item, &shares),
            })
            .collect())
    }

    /// Baseline/final pairs per item; `before` is always the deterministic
    /// baseline.
    pub async fn suggest_detailed(&self, items: &[AllocationItem]) -> Result<Vec<ItemAllocationDiff>> {
        let (baselines, finals) = self.refine(items).await?;
        Ok(items
            .iter()
            .zip(baselines.iter().zip(finals))
            .map(|(item, (before, after))| ItemAllocationDiff {
                general_item: item.general_item,
                before: to_shares(item, before),
                after: to_shares(item, &after),
            })
            .collect())
    }

    async fn refine(&self, items: &[AllocationItem]) -> Result<(Vec<Vec<u32>>, Vec<Vec<u32>>)> {
        let baselines = baseline_shares(items)?;

        let Some(client) = &self.reasoning else {
            return Ok((baselines.clone(), baselines));
        };

        let context = partner_global_context(items, &baselines);
        let payload = AdjustmentPayload::build(items, &baselines, &context);
        let response = match client.adjust(&payload).await {
            Ok(response) => response,
            Err(err) => {
                // transport and schema failures alike degrade to the
                // deterministic baseline; a suggestion batch never fails
                // because the reasoning service is down
                log::warn!("reasoning adjustment unavailable, keeping baseline: {err}");
                return Ok((baselines.clone(), baselines));
            }
        };

        let mut finals = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let adjusted = merge_adjustments(item, &baselines[index], response.items.get(index));
            let sum: u64 = adjusted.iter().map(|&q| u64::from(q)).sum();
            let shares = if sum == u64::from(item.total_quantity) {
                adjusted
            } else {
                // the service broke the sum invariant; its values become
                // weights for a fresh exact-sum apportionment
                let weights: Vec<f64> = adjusted.iter().map(|&q| f64::from(q)).collect();
                apportion(item.total_quantity, &weights, None)?
            };
            finals.push(shares);
        }
        Ok((baselines, finals))
    }
}

fn baseline_shares(items: &[AllocationItem]) -> Result<Vec<Vec<u32>>> {
    items
        .iter()
        .map(|item| {
            let weights: Vec<f64> = item
                .requests
                .iter()
                .map(|request| f64::from(request.quantity))
                .collect();
            apportion(item.total_quantity, &weights, None)
        })
        .collect()
}

/// Folds a reply item onto the baseline: a partner missing from the reply,
/// or with a non-numeric quantity, keeps its baseline; numeric values are
/// rounded to the nearest integer and clamped to non-negative.
fn merge_adjustments(
    item: &AllocationItem,
    baseline: &[u32],
    reply: Option<&ResponseItem>,
) -> Vec<u32> {
    let Some(reply) = reply else {
        return baseline.to_vec();
    };
    item.requests
        .iter()
        .zip(baseline)
        .map(|(request, &fallback)| {
            reply
                .requests
                .iter()
                .find(|r| r.partner_id == Some(request.partner.0))
                .and_then(|r| r.quantity.as_f64())
                .map(|q| q.round().max(0.0).min(f64::from(u32::MAX)) as u32)
                .unwrap_or(fallback)
        })
        .collect()
}

fn to_shares(item: &AllocationItem, quantities: &[u32]) -> Vec<AllocationShare> {
    item.requests
        .iter()
        .zip(quantities)
        .map(|(request, &quantity)| AllocationShare {
            partner: request.partner,
            quantity,
        })
        .collect()
}
