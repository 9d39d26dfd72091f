use crate::{Leader, SyncMetrics};
use clusterset_controller_core::{
    AccessLevel, BindingStore, BindingSubject, Grants, Inventory, MemberKey, Memberships,
    SubjectList,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
};
use tokio::time;

/// Converges the stored binding of every target with the grants of the target's ClusterSets.
#[derive(Debug)]
pub struct BindingSyncer<I, S> {
    scope: Scope,
    inventory: I,
    store: S,
    memberships: Memberships,
    grants: Grants,
    metrics: SyncMetrics,
}

/// The kind of target a syncer writes bindings for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Cluster,
    Namespace,
}

/// How a target's stored binding compares with its desired binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BindingState {
    /// Nothing is granted and nothing is stored.
    Absent,
    Converged,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
}

/// Summarizes the outcome of a single reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tick {
    pub absent: usize,
    pub converged: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

// === impl BindingSyncer ===

impl<I, S> BindingSyncer<I, S>
where
    I: Inventory,
    S: BindingStore,
{
    pub fn new(
        scope: Scope,
        inventory: I,
        store: S,
        memberships: Memberships,
        grants: Grants,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            scope,
            inventory,
            store,
            memberships,
            grants,
            metrics,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Reconciles every target on each tick of `interval` while `leader` holds the write lease,
    /// until `shutdown` is signaled.
    ///
    /// A reconciliation that is in progress when shutdown is signaled runs to completion.
    pub async fn run(self, interval: time::Duration, leader: Leader, shutdown: drain::Watch) {
        run_ticks(interval, leader, shutdown, &self.metrics, || self.reconcile()).await
    }

    /// Converges the binding of every known target once.
    ///
    /// Targets are drawn from the inventory and from the store, so that bindings of targets that
    /// no longer exist are removed. A failure on one target is logged and counted; the remaining
    /// targets are still reconciled.
    pub async fn reconcile(&self) -> Tick {
        let mut tick = Tick::default();

        let mut targets = BTreeMap::<String, Vec<MemberKey>>::new();
        for target in self.inventory.targets() {
            targets.entry(target.name).or_default().extend(target.members);
        }
        match self.store.list().await {
            Ok(stored) => {
                for name in stored {
                    targets.entry(name).or_default();
                }
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to list stored bindings");
                self.metrics.failed("list");
                tick.failed += 1;
            }
        }

        for (target, members) in targets {
            let desired = self.desired(&members);
            match self.sync(&target, &desired).await {
                Ok(state) => tick.record(state),
                Err((op, error)) => {
                    tracing::warn!(scope = ?self.scope, %target, op, %error, "Failed to sync binding");
                    self.metrics.failed(op);
                    tick.failed += 1;
                }
            }
        }

        tick
    }

    /// Unions the admin and view subjects of every ClusterSet that a member belongs to.
    pub fn desired(&self, members: &[MemberKey]) -> SubjectList {
        let cluster_sets = members
            .iter()
            .flat_map(|member| self.memberships.cluster_sets_of(member))
            .collect::<BTreeSet<_>>();

        let mut subjects = Vec::new();
        for cluster_set in &cluster_sets {
            for level in AccessLevel::ALL {
                let granted = self.grants.lookup(level).subjects(cluster_set);
                subjects.extend(
                    granted
                        .into_iter()
                        .map(|subject| BindingSubject::new(subject, level)),
                );
            }
        }
        subjects.into_iter().collect()
    }

    async fn sync(
        &self,
        target: &str,
        desired: &SubjectList,
    ) -> Result<BindingState, (&'static str, anyhow::Error)> {
        let actual = self.store.get(target).await.map_err(|e| ("get", e))?;
        let state = BindingState::plan(desired, actual.as_ref());
        match state {
            BindingState::Absent | BindingState::Converged => {}
            BindingState::PendingCreate => {
                self.store
                    .create(target, desired)
                    .await
                    .map_err(|e| ("create", e))?;
                tracing::debug!(scope = ?self.scope, %target, subjects = %desired, "Created binding");
            }
            BindingState::PendingUpdate => {
                self.store
                    .update(target, desired)
                    .await
                    .map_err(|e| ("update", e))?;
                tracing::debug!(scope = ?self.scope, %target, subjects = %desired, "Updated binding");
            }
            BindingState::PendingDelete => {
                self.store.delete(target).await.map_err(|e| ("delete", e))?;
                tracing::debug!(scope = ?self.scope, %target, "Deleted binding");
            }
        }
        Ok(state)
    }
}

/// Drives `reconcile` on each tick of `interval` while `leader` holds the write lease, until
/// `shutdown` is signaled.
pub(crate) async fn run_ticks<F, R>(
    interval: time::Duration,
    leader: Leader,
    shutdown: drain::Watch,
    metrics: &SyncMetrics,
    mut reconcile: F,
) where
    F: FnMut() -> R,
    R: Future<Output = Tick>,
{
    let mut ticks = time::interval(interval);
    ticks.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    let shutdown = shutdown.signaled();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::debug!("Shutting down");
                return;
            }
            _ = ticks.tick() => {}
        }

        if !leader.is_leader() {
            tracing::trace!(claimant = %leader.claimant(), "Not the leader; skipping");
            metrics.skipped();
            continue;
        }

        let start = time::Instant::now();
        let tick = reconcile().await;
        metrics.record_tick(&tick, start.elapsed());
        if tick.writes() + tick.failed > 0 {
            tracing::info!(?tick, "Reconciled");
        } else {
            tracing::trace!(?tick, "Reconciled");
        }
    }
}

// === impl BindingState ===

impl BindingState {
    /// Decides what must be written for the stored binding to match the desired one.
    pub fn plan(desired: &SubjectList, actual: Option<&SubjectList>) -> Self {
        match actual {
            None if desired.is_empty() => Self::Absent,
            None => Self::PendingCreate,
            Some(_) if desired.is_empty() => Self::PendingDelete,
            Some(actual) if actual == desired => Self::Converged,
            Some(_) => Self::PendingUpdate,
        }
    }
}

// === impl Tick ===

impl Tick {
    pub(crate) fn record(&mut self, state: BindingState) {
        match state {
            BindingState::Absent => self.absent += 1,
            BindingState::Converged => self.converged += 1,
            BindingState::PendingCreate => self.created += 1,
            BindingState::PendingUpdate => self.updated += 1,
            BindingState::PendingDelete => self.deleted += 1,
        }
    }

    /// The number of stored bindings that were written or deleted.
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}
