use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use pantry_protocol::{DistributionId, DonorOfferId, GeneralItemId, LineItemId, PartnerId};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// One line item's persisted allocation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAssignment {
    pub line_item: LineItemId,
    pub general_item: GeneralItemId,
    pub partner: Option<PartnerId>,
}

/// Remote commit surface the keep phase drives.
///
/// `release_allocation` and `ensure_pending_distribution` are idempotent;
/// `create_allocation` is not and must never be blindly retried.
#[async_trait]
pub trait AllocationBackend: Send + Sync {
    /// Current assignments for every line item in the scope, in stable
    /// line-item order.
    async fn current_assignments(&self, scope: DonorOfferId) -> Result<Vec<LineAssignment>>;

    /// Clears a line item's allocation. Releasing the last allocation of a
    /// distribution reclaims the now-empty distribution record.
    async fn release_allocation(&self, line_item: LineItemId) -> Result<()>;

    /// Returns the partner's open pending distribution, creating one if
    /// absent.
    async fn ensure_pending_distribution(&self, partner: PartnerId) -> Result<DistributionId>;

    /// Creates a new allocation against an existing pending distribution.
    async fn create_allocation(
        &self,
        line_item: LineItemId,
        partner: PartnerId,
        distribution: DistributionId,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
struct LineState {
    offer: DonorOfferId,
    general_item: GeneralItemId,
    partner: Option<PartnerId>,
    distribution: Option<DistributionId>,
}

#[derive(Debug, Clone)]
struct DistributionState {
    partner: PartnerId,
    allocations: usize,
}

#[derive(Default)]
struct BackendState {
    lines: BTreeMap<LineItemId, LineState>,
    distributions: HashMap<DistributionId, DistributionState>,
    pending: HashMap<PartnerId, DistributionId>,
    next_distribution: i64,
    creates: usize,
    fail_create_after: Option<usize>,
}

/// In-memory reference backend.
///
/// `fail_creates_after` injects a failure on the (n+1)-th allocation
/// creation, which is how the partial-commit reporting path gets
/// exercised.
#[derive(Default)]
pub struct MemoryAllocationBackend {
    inner: RwLock<BackendState>,
}

impl MemoryAllocationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_line(&self, offer: DonorOfferId, line_item: LineItemId, general_item: GeneralItemId) {
        if let Ok(mut state) = self.inner.write() {
            state.lines.insert(
                line_item,
                LineState {
                    offer,
                    general_item,
                    partner: None,
                    distribution: None,
                },
            );
        }
    }

    pub fn fail_creates_after(&self, successes: usize) {
        if let Ok(mut state) = self.inner.write() {
            state.fail_create_after = Some(successes);
        }
    }

    /// (distribution, partner, allocation count) triples, in id order.
    pub fn distributions(&self) -> Vec<(DistributionId, PartnerId, usize)> {
        let Ok(state) = self.inner.read() else {
            return Vec::new();
        };
        let mut out: Vec<_> = state
            .distributions
            .iter()
            .map(|(&id, d)| (id, d.partner, d.allocations))
            .collect();
        out.sort_by_key(|&(id, _, _)| id);
        out
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BackendState>> {
        self.inner
            .write()
            .map_err(|_| WorkflowError::Backend("lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BackendState>> {
        self.inner
            .read()
            .map_err(|_| WorkflowError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl AllocationBackend for MemoryAllocationBackend {
    async fn current_assignments(&self, scope: DonorOfferId) -> Result<Vec<LineAssignment>> {
        let state = self.read()?;
        Ok(state
            .lines
            .iter()
            .filter(|(_, line)| line.offer == scope)
            .map(|(&line_item, line)| LineAssignment {
                line_item,
                general_item: line.general_item,
                partner: line.partner,
            })
            .collect())
    }

    async fn release_allocation(&self, line_item: LineItemId) -> Result<()> {
        let mut state = self.write()?;
        let line = state
            .lines
            .get_mut(&line_item)
            .ok_or_else(|| WorkflowError::Backend(format!("unknown line item {line_item}")))?;
        line.partner = None;
        let released = line.distribution.take();

        if let Some(distribution) = released {
            let emptied = match state.distributions.get_mut(&distribution) {
                Some(d) => {
                    d.allocations = d.allocations.saturating_sub(1);
                    d.allocations == 0
                }
                None => false,
            };
            if emptied {
                // last allocation gone: reclaim the empty distribution
                if let Some(d) = state.distributions.remove(&distribution) {
                    state.pending.remove(&d.partner);
                    log::debug!("reclaimed empty distribution {distribution}");
                }
            }
        }
        Ok(())
    }

    async fn ensure_pending_distribution(&self, partner: PartnerId) -> Result<DistributionId> {
        let mut state = self.write()?;
        if let Some(&existing) = state.pending.get(&partner) {
            return Ok(existing);
        }
        let id = DistributionId(state.next_distribution);
        state.next_distribution += 1;
        state.distributions.insert(
            id,
            DistributionState {
                partner,
                allocations: 0,
            },
        );
        state.pending.insert(partner, id);
        Ok(id)
    }

    async fn create_allocation(
        &self,
        line_item: LineItemId,
        partner: PartnerId,
        distribution: DistributionId,
    ) -> Result<()> {
        let mut state = self.write()?;
        if let Some(limit) = state.fail_create_after {
            if state.creates >= limit {
                return Err(WorkflowError::Backend(
                    "injected allocation failure".to_string(),
                ));
            }
        }
        match state.distributions.get(&distribution) {
            Some(d) if d.partner == partner => {}
            Some(_) => {
                return Err(WorkflowError::Backend(format!(
                    "distribution {distribution} belongs to another partner"
                )))
            }
            None => {
                return Err(WorkflowError::Backend(format!(
                    "unknown distribution {distribution}"
                )))
            }
        }
        let line = state
            .lines
            .get_mut(&line_item)
            .ok_or_else(|| WorkflowError::Backend(format!("unknown line item {line_item}")))?;
        if line.partner.is_some() {
            return Err(WorkflowError::Backend(format!(
                "line item {line_item} is already allocated"
            )));
        }
        line.partner = Some(partner);
        line.distribution = Some(distribution);
        if let Some(d) = state.distributions.get_mut(&distribution) {
            d.allocations += 1;
        }
        state.creates += 1;
        Ok(())
    }
}
