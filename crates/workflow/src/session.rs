use crate::backend::{AllocationBackend, LineAssignment};
use crate::error::{Result, WorkflowError};
use pantry_allocation::{AllocationItem, AllocationRefiner, ItemAllocation};
use pantry_protocol::{DonorOfferId, GeneralItemId, LineItemId, PartnerId};
use std::collections::HashMap;
use std::sync::Arc;

/// One staged (line item, partner) suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionPair {
    pub line_item: LineItemId,
    pub general_item: GeneralItemId,
    pub partner: PartnerId,
    pub previous: Option<PartnerId>,
}

impl SuggestionPair {
    /// Whether keeping this pair changes persisted state.
    pub fn is_change(&self) -> bool {
        self.previous != Some(self.partner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFailure {
    pub index: usize,
    pub error: String,
}

/// Result of a keep: how many changed pairs were committed, and where the
/// sequence stopped if it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub applied: usize,
    pub failure: Option<CommitFailure>,
}

struct Preview {
    snapshot: Vec<LineAssignment>,
    staged: Vec<SuggestionPair>,
}

enum SessionState {
    Idle,
    Previewing(Preview),
}

/// Preview/keep/undo controller over refined allocation suggestions.
///
/// While previewing, the staged view is session-local; storage is touched
/// only by [`SuggestionSession::keep`], sequentially and best-effort.
pub struct SuggestionSession {
    backend: Arc<dyn AllocationBackend>,
    refiner: AllocationRefiner,
    state: SessionState,
}

impl SuggestionSession {
    pub fn new(backend: Arc<dyn AllocationBackend>, refiner: AllocationRefiner) -> Self {
        Self {
            backend,
            refiner,
            state: SessionState::Idle,
        }
    }

    pub fn is_previewing(&self) -> bool {
        matches!(self.state, SessionState::Previewing(_))
    }

    /// Snapshots current assignments, computes refined suggestions, and
    /// stages them. No storage mutation.
    pub async fn preview(
        &mut self,
        scope: DonorOfferId,
        items: &[AllocationItem],
    ) -> Result<&[SuggestionPair]> {
        if self.is_previewing() {
            return Err(WorkflowError::InvalidState(
                "preview requested while already previewing",
            ));
        }
        let snapshot = self.backend.current_assignments(scope).await?;
        let suggestions = self.refiner.suggest(items).await?;
        let staged = plan_line_assignments(&snapshot, &suggestions);
        log::info!(
            "staged {} suggestions for offer {scope} ({} changes)",
            staged.len(),
            staged.iter().filter(|p| p.is_change()).count()
        );
        self.state = SessionState::Previewing(Preview { snapshot, staged });
        match &self.state {
            SessionState::Previewing(preview) => Ok(&preview.staged),
            SessionState::Idle => unreachable!("state set above"),
        }
    }

    /// The staged view, while previewing.
    pub fn staged(&self) -> Option<&[SuggestionPair]> {
        match &self.state {
            SessionState::Previewing(preview) => Some(&preview.staged),
            SessionState::Idle => None,
        }
    }

    /// Discards the staged view and returns to idle. Storage was never
    /// touched, so discarding the overlay is the whole restore.
    pub fn undo(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Previewing(preview) => {
                log::info!("discarded {} staged suggestions", preview.staged.len());
                Ok(())
            }
            SessionState::Idle => Err(WorkflowError::InvalidState("undo requested while idle")),
        }
    }

    /// Commits every changed pair, one at a time: release the conflicting
    /// allocation if present, ensure the partner's pending distribution,
    /// create the new allocation.
    ///
    /// Not transactional. A failure stops the sequence and the outcome
    /// reports how many pairs were applied before it, so the operator can
    /// reconcile or retry only the remainder.
    pub async fn keep(&mut self) -> Result<CommitOutcome> {
        let preview = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Previewing(preview) => preview,
            SessionState::Idle => {
                return Err(WorkflowError::InvalidState("keep requested while idle"))
            }
        };

        let changes: Vec<&SuggestionPair> =
            preview.staged.iter().filter(|p| p.is_change()).collect();
        let mut applied = 0usize;
        for (index, pair) in changes.into_iter().enumerate() {
            if let Err(error) = self.commit_pair(pair).await {
                log::warn!(
                    "commit stopped at pair {index} (line item {}): {error}",
                    pair.line_item
                );
                return Ok(CommitOutcome {
                    applied,
                    failure: Some(CommitFailure {
                        index,
                        error: error.to_string(),
                    }),
                });
            }
            applied += 1;
        }
        Ok(CommitOutcome {
            applied,
            failure: None,
        })
    }

    async fn commit_pair(&self, pair: &SuggestionPair) -> Result<()> {
        if pair.previous.is_some() {
            self.backend.release_allocation(pair.line_item).await?;
        }
        let distribution = self
            .backend
            .ensure_pending_distribution(pair.partner)
            .await?;
        self.backend
            .create_allocation(pair.line_item, pair.partner, distribution)
            .await
    }
}

/// Expands per-item partner quantities onto concrete line items.
///
/// Line items already carrying a partner that still holds a share keep
/// that partner; the remaining line items are filled in share order. Any
/// lines beyond the suggested quantities stay unstaged.
fn plan_line_assignments(
    current: &[LineAssignment],
    suggestions: &[ItemAllocation],
) -> Vec<SuggestionPair> {
    let mut lines_by_item: HashMap<GeneralItemId, Vec<&LineAssignment>> = HashMap::new();
    for line in current {
        lines_by_item.entry(line.general_item).or_default().push(line);
    }

    let mut staged = Vec::new();
    for allocation in suggestions {
        let Some(lines) = lines_by_item.get(&allocation.general_item) else {
            continue;
        };
        let mut remaining: Vec<(PartnerId, u32)> = allocation
            .shares
            .iter()
            .filter(|share| share.quantity > 0)
            .map(|share| (share.partner, share.quantity))
            .collect();

        // first pass: keep lines whose current partner still holds a share
        let mut unplaced: Vec<&LineAssignment> = Vec::new();
        for line in lines.iter().copied() {
            let kept = line.partner.and_then(|partner| {
                remaining
                    .iter_mut()
                    .find(|(p, quantity)| *p == partner && *quantity > 0)
                    .map(|slot| {
                        slot.1 -= 1;
                        partner
                    })
            });
            match kept {
                Some(partner) => staged.push(SuggestionPair {
                    line_item: line.line_item,
                    general_item: line.general_item,
                    partner,
                    previous: line.partner,
                }),
                None => unplaced.push(line),
            }
        }

        // second pass: fill the rest in share order
        for line in unplaced {
            let Some(slot) = remaining.iter_mut().find(|(_, quantity)| *quantity > 0) else {
                log::debug!("line item {} left unstaged", line.line_item);
                continue;
            };
            slot.1 -= 1;
            staged.push(SuggestionPair {
                line_item: line.line_item,
                general_item: line.general_item,
                partner: slot.0,
                previous: line.partner,
            });
        }
    }
    staged.sort_by_key(|pair| pair.line_item);
    staged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_protocol::AllocationShare;

    fn line(id: i64, item: i64, partner: Option<i64>) -> LineAssignment {
        LineAssignment {
            line_item: LineItemId(id),
            general_item: GeneralItemId(item),
            partner: partner.map(PartnerId),
        }
    }

    fn allocation(item: i64, shares: &[(i64, u32)]) -> ItemAllocation {
        ItemAllocation {
            general_item: GeneralItemId(item),
            shares: shares
                .iter()
                .map(|&(partner, quantity)| AllocationShare {
                    partner: PartnerId(partner),
                    quantity,
                })
                .collect(),
        }
    }

    #[test]
    fn existing_assignments_are_kept_in_place() {
        let current = vec![line(1, 1, Some(7)), line(2, 1, None)];
        let staged = plan_line_assignments(&current, &[allocation(1, &[(7, 1), (8, 1)])]);

        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0].partner, PartnerId(7));
        assert!(!staged[0].is_change());
        assert_eq!(staged[1].partner, PartnerId(8));
        assert!(staged[1].is_change());
    }

    #[test]
    fn displaced_partner_is_marked_as_change() {
        let current = vec![line(1, 1, Some(7))];
        let staged = plan_line_assignments(&current, &[allocation(1, &[(8, 1)])]);

        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].partner, PartnerId(8));
        assert_eq!(staged[0].previous, Some(PartnerId(7)));
        assert!(staged[0].is_change());
    }

    #[test]
    fn surplus_lines_stay_unstaged() {
        let current = vec![line(1, 1, None), line(2, 1, None), line(3, 1, None)];
        let staged = plan_line_assignments(&current, &[allocation(1, &[(7, 2)])]);
        assert_eq!(staged.len(), 2);
    }

    #[test]
    fn zero_quantity_shares_place_nothing() {
        let current = vec![line(1, 1, None)];
        let staged = plan_line_assignments(&current, &[allocation(1, &[(7, 0), (8, 1)])]);
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].partner, PartnerId(8));
    }
}
