//! Per-cluster ClusterRoles.
//!
//! Each managed cluster's ClusterRoleBindings refer to one ClusterRole per access level that
//! grants that level on the `ManagedCluster` object itself. A [`RoleSyncer`] keeps those roles in
//! step with the set of managed clusters: roles are written for new clusters and deleted once their
//! cluster is gone.

use crate::{
    store::delete_ignoring_missing, syncer::run_ticks, BindingState, Leader, SyncMetrics, Tick,
};
use anyhow::Result;
use clusterset_controller_core::{
    AccessLevel, Inventory, RoleStore, CLUSTER_API_GROUP, FIELD_MANAGER,
};
use clusterset_controller_k8s_api::{self as k8s, labels, rbac, ClusterRole, ObjectMeta, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use tokio::time;

const REGISTER_API_GROUP: &str = "register.open-cluster-management.io";

/// Converges the stored ClusterRoles of every managed cluster.
#[derive(Debug)]
pub struct RoleSyncer<I, S> {
    inventory: I,
    store: S,
    metrics: SyncMetrics,
}

/// Stores a managed cluster's roles as cluster-scoped ClusterRoles.
#[derive(Clone)]
pub struct ClusterRoles {
    client: k8s::Client,
}

// === impl RoleSyncer ===

impl<I, S> RoleSyncer<I, S>
where
    I: Inventory,
    S: RoleStore,
{
    pub fn new(inventory: I, store: S, metrics: SyncMetrics) -> Self {
        Self {
            inventory,
            store,
            metrics,
        }
    }

    /// Reconciles the roles of every cluster on each tick of `interval` while `leader` holds the
    /// write lease, until `shutdown` is signaled.
    pub async fn run(self, interval: time::Duration, leader: Leader, shutdown: drain::Watch) {
        run_ticks(interval, leader, shutdown, &self.metrics, || self.reconcile()).await
    }

    /// Converges the roles of every known cluster once.
    ///
    /// Without a listing of stored roles nothing can be pruned or skipped, so a failed list fails
    /// the whole tick.
    pub async fn reconcile(&self) -> Tick {
        let mut tick = Tick::default();

        let stored = match self.store.list().await {
            Ok(stored) => stored,
            Err(error) => {
                tracing::warn!(%error, "Failed to list stored roles");
                self.metrics.failed("list");
                tick.failed += 1;
                return tick;
            }
        };
        let clusters = self
            .inventory
            .targets()
            .into_iter()
            .map(|target| target.name)
            .collect::<BTreeSet<_>>();

        let all = clusters.iter().chain(stored.keys()).collect::<BTreeSet<_>>();
        for cluster in all {
            let state = plan(clusters.contains(cluster), stored.get(cluster));
            let res = match state {
                BindingState::Absent | BindingState::Converged => Ok(()),
                BindingState::PendingCreate | BindingState::PendingUpdate => self
                    .store
                    .apply(cluster)
                    .await
                    .map_err(|e| ("apply", e)),
                BindingState::PendingDelete => {
                    self.store.delete(cluster).await.map_err(|e| ("delete", e))
                }
            };
            match res {
                Ok(()) => {
                    tracing::debug!(%cluster, ?state, "Synced roles");
                    tick.record(state);
                }
                Err((op, error)) => {
                    tracing::warn!(%cluster, op, %error, "Failed to sync roles");
                    self.metrics.failed(op);
                    tick.failed += 1;
                }
            }
        }

        tick
    }
}

/// Decides what must be written for a cluster's stored roles.
///
/// Roles are complete when every access level is stored.
fn plan(exists: bool, stored: Option<&BTreeSet<AccessLevel>>) -> BindingState {
    match stored {
        None if !exists => BindingState::Absent,
        None => BindingState::PendingCreate,
        Some(_) if !exists => BindingState::PendingDelete,
        Some(levels) if AccessLevel::ALL.iter().all(|l| levels.contains(l)) => {
            BindingState::Converged
        }
        Some(_) => BindingState::PendingUpdate,
    }
}

// === impl ClusterRoles ===

impl ClusterRoles {
    pub fn new(client: k8s::Client) -> Self {
        Self { client }
    }

    /// The name of the ClusterRole granting `level` on `cluster`.
    pub fn name(level: AccessLevel, cluster: &str) -> String {
        format!("open-cluster-management:{level}:{cluster}")
    }

    fn api(&self) -> k8s::Api<ClusterRole> {
        k8s::Api::all(self.client.clone())
    }
}

impl std::fmt::Debug for ClusterRoles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRoles").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl RoleStore for ClusterRoles {
    async fn list(&self) -> Result<BTreeMap<String, BTreeSet<AccessLevel>>> {
        let roles = self
            .api()
            .list(&k8s::ListParams::default().labels(labels::ROLE_CLUSTER))
            .await?;
        Ok(stored_levels(roles.items.iter().map(ResourceExt::labels)))
    }

    async fn apply(&self, cluster: &str) -> Result<()> {
        let api = self.api();
        for level in AccessLevel::ALL {
            let role = cluster_role(level, cluster);
            api.patch(
                &Self::name(level, cluster),
                &k8s::PatchParams::apply(FIELD_MANAGER),
                &k8s::Patch::Apply(role),
            )
            .await?;
        }
        Ok(())
    }

    async fn delete(&self, cluster: &str) -> Result<()> {
        let api = self.api();
        for level in AccessLevel::ALL {
            delete_ignoring_missing(&api, &Self::name(level, cluster)).await?;
        }
        Ok(())
    }
}

/// Builds the ClusterRole granting `level` on the `ManagedCluster` named `cluster`.
///
/// Admins may also accept the cluster's registration.
pub fn cluster_role(level: AccessLevel, cluster: &str) -> ClusterRole {
    let rule = |group: &str, resource: &str, verbs: &[&str]| rbac::PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(vec![resource.to_string()]),
        resource_names: Some(vec![cluster.to_string()]),
        verbs: verbs.iter().map(ToString::to_string).collect(),
        ..Default::default()
    };
    let rules = match level {
        AccessLevel::Admin => vec![
            rule(
                CLUSTER_API_GROUP,
                "managedclusters",
                &["get", "list", "watch", "update", "patch", "delete"],
            ),
            rule(REGISTER_API_GROUP, "managedclusters/accept", &["update"]),
        ],
        AccessLevel::View => vec![rule(
            CLUSTER_API_GROUP,
            "managedclusters",
            &["get", "list", "watch"],
        )],
    };

    ClusterRole {
        metadata: ObjectMeta {
            name: Some(ClusterRoles::name(level, cluster)),
            labels: Some(BTreeMap::from([
                (labels::ROLE_CLUSTER.to_string(), cluster.to_string()),
                (labels::ACCESS_LEVEL.to_string(), level.to_string()),
            ])),
            ..Default::default()
        },
        rules: Some(rules),
        ..Default::default()
    }
}

fn stored_levels<'l>(
    label_sets: impl Iterator<Item = &'l BTreeMap<String, String>>,
) -> BTreeMap<String, BTreeSet<AccessLevel>> {
    let mut stored = BTreeMap::<String, BTreeSet<AccessLevel>>::new();
    for l in label_sets {
        let Some(cluster) = l.get(labels::ROLE_CLUSTER).filter(|c| !c.is_empty()) else {
            continue;
        };
        let levels = stored.entry(cluster.clone()).or_default();
        if let Some(level) = l.get(labels::ACCESS_LEVEL).and_then(|v| v.parse().ok()) {
            levels.insert(level);
        }
    }
    stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::{btreemap, btreeset};
    use pretty_assertions::assert_eq;

    #[test]
    fn plans_role_states() {
        let all = btreeset! { AccessLevel::Admin, AccessLevel::View };
        let partial = btreeset! { AccessLevel::View };

        assert_eq!(plan(false, None), BindingState::Absent);
        assert_eq!(plan(true, None), BindingState::PendingCreate);
        assert_eq!(plan(true, Some(&all)), BindingState::Converged);
        assert_eq!(plan(true, Some(&partial)), BindingState::PendingUpdate);
        assert_eq!(plan(false, Some(&all)), BindingState::PendingDelete);
    }

    #[test]
    fn admin_role_grants_the_cluster() {
        let role = cluster_role(AccessLevel::Admin, "c1");
        assert_eq!(
            role.metadata.name.as_deref(),
            Some("open-cluster-management:admin:c1")
        );
        assert_eq!(
            role.metadata.labels,
            Some(btreemap! {
                labels::ROLE_CLUSTER.to_string() => "c1".to_string(),
                labels::ACCESS_LEVEL.to_string() => "admin".to_string(),
            })
        );

        let rules = role.rules.unwrap_or_default();
        assert_eq!(rules.len(), 2);
        assert!(rules
            .iter()
            .all(|r| r.resource_names == Some(vec!["c1".to_string()])));
        assert!(rules[0].verbs.contains(&"delete".to_string()));
        assert_eq!(
            rules[1].resources,
            Some(vec!["managedclusters/accept".to_string()])
        );
    }

    #[test]
    fn view_role_is_read_only() {
        let rules = cluster_role(AccessLevel::View, "c1")
            .rules
            .unwrap_or_default();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].verbs, vec!["get", "list", "watch"]);
        assert_eq!(rules[0].resources, Some(vec!["managedclusters".to_string()]));
    }

    #[test]
    fn lists_stored_levels() {
        let label_sets = [
            btreemap! {
                labels::ROLE_CLUSTER.to_string() => "c1".to_string(),
                labels::ACCESS_LEVEL.to_string() => "admin".to_string(),
            },
            btreemap! {
                labels::ROLE_CLUSTER.to_string() => "c1".to_string(),
                labels::ACCESS_LEVEL.to_string() => "view".to_string(),
            },
            btreemap! {
                labels::ROLE_CLUSTER.to_string() => "c2".to_string(),
                labels::ACCESS_LEVEL.to_string() => "bogus".to_string(),
            },
            btreemap! { labels::ROLE_CLUSTER.to_string() => String::new() },
        ];
        assert_eq!(
            stored_levels(label_sets.iter()),
            btreemap! {
                "c1".to_string() => btreeset! { AccessLevel::Admin, AccessLevel::View },
                "c2".to_string() => btreeset! {},
            }
        );
    }
}
