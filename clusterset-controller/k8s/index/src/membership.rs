//! Maps clusters and provisioning resources into ClusterSets.
//!
//! Membership is declared by the `cluster.open-cluster-management.io/clusterset` label on each
//! member. The index remembers every member's label so that, whenever a member or a ClusterSet
//! changes, it can publish the complete membership of the affected ClusterSets. Members that name
//! a ClusterSet that does not exist are remembered but not published until the ClusterSet is
//! created.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use clusterset_controller_core::{Inventory, MemberKey, Memberships, ResourceKind, Target};
use clusterset_controller_k8s_api::{
    labels, ClusterClaim, ClusterDeployment, ClusterPool, ManagedCluster, ManagedClusterSet,
    Resource, ResourceExt,
};
use parking_lot::RwLock;
use std::{collections::BTreeMap, hash::Hash, sync::Arc};

pub type SharedMembership = Arc<RwLock<MembershipIndex>>;

#[derive(Debug)]
pub struct MembershipIndex {
    memberships: Memberships,

    /// Names of the ClusterSets that currently exist.
    cluster_sets: HashSet<String>,

    clusters: Assignments<String>,
    resources: Assignments<MemberKey>,
}

/// Lists one target per managed cluster.
#[derive(Clone, Debug)]
pub struct ClusterTargets(SharedMembership);

/// Lists one target per namespace that holds a cluster or provisioning resource.
#[derive(Clone, Debug)]
pub struct NamespaceTargets(SharedMembership);

/// Tracks the ClusterSet that each member's label names.
#[derive(Debug)]
struct Assignments<K> {
    by_member: HashMap<K, Option<String>>,
    by_set: HashMap<String, HashSet<K>>,
}

// === impl MembershipIndex ===

impl MembershipIndex {
    pub fn shared(memberships: Memberships) -> SharedMembership {
        Arc::new(RwLock::new(Self {
            memberships,
            cluster_sets: HashSet::default(),
            clusters: Assignments::default(),
            resources: Assignments::default(),
        }))
    }

    fn apply_cluster(&mut self, name: String, cluster_set: Option<String>) {
        for set in self.clusters.assign(name, cluster_set) {
            self.publish(&set);
        }
    }

    fn apply_resource<T>(&mut self, kind: ResourceKind, resource: &T)
    where
        T: ResourceExt,
    {
        let Some(namespace) = resource.namespace() else {
            tracing::warn!(%kind, name = %resource.name_any(), "Ignoring resource without a namespace");
            return;
        };
        let key = MemberKey::namespaced(kind, namespace, resource.name_unchecked());
        let cluster_set = labels::cluster_set(resource.meta()).map(ToString::to_string);
        for set in self.resources.assign(key, cluster_set) {
            self.publish(&set);
        }
    }

    fn delete_resource(&mut self, kind: ResourceKind, namespace: String, name: String) {
        let key = MemberKey::namespaced(kind, namespace, name);
        if let Some(set) = self.resources.remove(&key) {
            self.publish(&set);
        }
    }

    /// Replaces the published membership of `cluster_set` with the members currently labeled for
    /// it, or removes it if the ClusterSet does not exist.
    fn publish(&self, cluster_set: &str) {
        if !self.cluster_sets.contains(cluster_set) {
            self.memberships.clusters.delete_cluster_set(cluster_set);
            self.memberships.namespaced.delete_cluster_set(cluster_set);
            return;
        }

        let clusters = self.clusters.members(cluster_set).cloned();
        self.memberships
            .clusters
            .update_cluster_set_by_objects(cluster_set, clusters);

        let resources = self.resources.members(cluster_set).map(ToString::to_string);
        self.memberships
            .namespaced
            .update_cluster_set_by_objects(cluster_set, resources);

        tracing::debug!(
            cluster_set,
            clusters = self.memberships.clusters.objects_of_cluster_set(cluster_set).len(),
            resources = self.memberships.namespaced.objects_of_cluster_set(cluster_set).len(),
            "Published membership",
        );
    }
}

impl kubert::index::IndexClusterResource<ManagedClusterSet> for MembershipIndex {
    fn apply(&mut self, cluster_set: ManagedClusterSet) {
        let name = cluster_set.name_unchecked();
        self.cluster_sets.insert(name.clone());
        self.publish(&name);
    }

    fn delete(&mut self, name: String) {
        self.cluster_sets.remove(&name);
        self.publish(&name);
    }
}

impl kubert::index::IndexClusterResource<ManagedCluster> for MembershipIndex {
    fn apply(&mut self, cluster: ManagedCluster) {
        let cluster_set = labels::cluster_set(cluster.meta()).map(ToString::to_string);
        self.apply_cluster(cluster.name_unchecked(), cluster_set);
    }

    fn delete(&mut self, name: String) {
        if let Some(set) = self.clusters.remove(&name) {
            self.publish(&set);
        }
    }
}

impl kubert::index::IndexNamespacedResource<ClusterDeployment> for MembershipIndex {
    fn apply(&mut self, resource: ClusterDeployment) {
        self.apply_resource(ResourceKind::ClusterDeployment, &resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_resource(ResourceKind::ClusterDeployment, namespace, name);
    }
}

impl kubert::index::IndexNamespacedResource<ClusterPool> for MembershipIndex {
    fn apply(&mut self, resource: ClusterPool) {
        self.apply_resource(ResourceKind::ClusterPool, &resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_resource(ResourceKind::ClusterPool, namespace, name);
    }
}

impl kubert::index::IndexNamespacedResource<ClusterClaim> for MembershipIndex {
    fn apply(&mut self, resource: ClusterClaim) {
        self.apply_resource(ResourceKind::ClusterClaim, &resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_resource(ResourceKind::ClusterClaim, namespace, name);
    }
}

// === impl Assignments ===

impl<K> Default for Assignments<K> {
    fn default() -> Self {
        Self {
            by_member: HashMap::default(),
            by_set: HashMap::default(),
        }
    }
}

impl<K: Clone + Eq + Hash> Assignments<K> {
    /// Records `member`'s ClusterSet and returns the ClusterSets whose membership changed.
    fn assign(&mut self, member: K, cluster_set: Option<String>) -> Vec<String> {
        let prior = self
            .by_member
            .insert(member.clone(), cluster_set.clone())
            .flatten();
        if prior == cluster_set {
            return vec![];
        }

        let mut changed = Vec::with_capacity(2);
        if let Some(prior) = prior {
            self.unassign(&member, &prior);
            changed.push(prior);
        }
        if let Some(set) = cluster_set {
            self.by_set.entry(set.clone()).or_default().insert(member);
            changed.push(set);
        }
        changed
    }

    /// Forgets `member` and returns the ClusterSet it belonged to.
    fn remove(&mut self, member: &K) -> Option<String> {
        let prior = self.by_member.remove(member).flatten()?;
        self.unassign(member, &prior);
        Some(prior)
    }

    fn unassign(&mut self, member: &K, cluster_set: &str) {
        if let Some(members) = self.by_set.get_mut(cluster_set) {
            members.remove(member);
            if members.is_empty() {
                self.by_set.remove(cluster_set);
            }
        }
    }

    fn members(&self, cluster_set: &str) -> impl Iterator<Item = &K> + '_ {
        self.by_set.get(cluster_set).into_iter().flatten()
    }
}

// === impl ClusterTargets ===

impl ClusterTargets {
    pub fn new(index: SharedMembership) -> Self {
        Self(index)
    }
}

impl Inventory for ClusterTargets {
    fn targets(&self) -> Vec<Target> {
        let index = self.0.read();
        index
            .clusters
            .by_member
            .keys()
            .map(|name| Target::new(name, [MemberKey::cluster(name)]))
            .collect()
    }
}

// === impl NamespaceTargets ===

impl NamespaceTargets {
    pub fn new(index: SharedMembership) -> Self {
        Self(index)
    }
}

impl Inventory for NamespaceTargets {
    fn targets(&self) -> Vec<Target> {
        let index = self.0.read();
        let mut by_ns = BTreeMap::<String, Vec<MemberKey>>::new();
        let clusters = index.clusters.by_member.keys().map(MemberKey::cluster);
        let resources = index.resources.by_member.keys().cloned();
        for member in clusters.chain(resources) {
            by_ns
                .entry(member.namespace().to_string())
                .or_default()
                .push(member);
        }
        by_ns
            .into_iter()
            .map(|(ns, members)| Target::new(ns, members))
            .collect()
    }
}
