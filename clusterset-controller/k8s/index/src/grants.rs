//! Derives the subjects granted one access level on each ClusterSet.
//!
//! The cache indexes the raw `ManagedClusterSet`, `ClusterRole` and `ClusterRoleBinding` resources
//! as they are observed. [`AccessGrantCache::run`] periodically rebuilds the complete
//! ClusterSet-to-subjects map from those resources and replaces the published map in one step;
//! this rebuild is authoritative and heals any drift. Between rebuilds, applied roles and bindings
//! add their grants to the published map immediately, while revocations wait for the next rebuild.
//!
//! Bindings may reference roles that are later deleted or retargeted at other ClusterSets, so the
//! rebuild re-resolves every binding through its role rather than patching the map incrementally.

use crate::{CacheMetrics, ClusterSetSelection, ExtractGrant};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use clusterset_controller_core::{AccessLevel, GrantLookup, Subject};
use clusterset_controller_k8s_api::{
    ClusterRole, ClusterRoleBinding, ManagedClusterSet, ResourceExt,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::time;

pub type SharedCache<E> = Arc<RwLock<AccessGrantCache<E>>>;

pub struct AccessGrantCache<E> {
    level: AccessLevel,
    extract: E,

    /// Names of the ClusterSets that currently exist.
    cluster_sets: HashSet<String>,

    /// ClusterRoles by name.
    roles: HashMap<String, ClusterRole>,

    /// ClusterRoleBindings that reference a ClusterRole, by name.
    bindings: HashMap<String, PolicyBinding>,

    published: GrantsReader,
    metrics: CacheMetrics,
}

/// A read handle on the most recently published grants.
///
/// Every read observes a complete rebuild (plus any fast-path additions); reads never block on a
/// rebuild in progress for longer than the swap itself.
#[derive(Clone, Debug, Default)]
pub struct GrantsReader(Arc<RwLock<GrantMap>>);

type GrantMap = HashMap<String, BTreeSet<Subject>>;

/// The important parts of a `ClusterRoleBinding`.
#[derive(Clone, Debug, PartialEq)]
struct PolicyBinding {
    role: String,
    subjects: Vec<Subject>,
}

/// Summarizes a single rebuild.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rebuild {
    pub cluster_sets: usize,
    pub skipped_roles: usize,
}

// === impl AccessGrantCache ===

impl<E: ExtractGrant> AccessGrantCache<E> {
    pub fn shared(
        level: AccessLevel,
        extract: E,
        metrics: CacheMetrics,
    ) -> (GrantsReader, SharedCache<E>) {
        let published = GrantsReader::default();
        let cache = Self {
            level,
            extract,
            cluster_sets: HashSet::default(),
            roles: HashMap::default(),
            bindings: HashMap::default(),
            published: published.clone(),
            metrics,
        };
        (published, Arc::new(RwLock::new(cache)))
    }

    pub fn level(&self) -> AccessLevel {
        self.level
    }

    pub fn reader(&self) -> GrantsReader {
        self.published.clone()
    }

    /// Rebuilds the published grants on every tick of `interval` until `shutdown` is signaled.
    pub async fn run(cache: SharedCache<E>, interval: time::Duration, shutdown: drain::Watch) {
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

            let Rebuild {
                cluster_sets,
                skipped_roles,
            } = cache.read().rebuild();
            tracing::trace!(cluster_sets, skipped_roles, "Rebuilt grants");
        }
    }

    /// Recomputes every ClusterSet's subjects from the indexed resources and publishes the result.
    ///
    /// Roles that the extractor reports as malformed are skipped.
    pub fn rebuild(&self) -> Rebuild {
        let mut skipped_roles = 0;
        let mut sets_by_role = HashMap::<&str, Vec<&str>>::default();
        for (name, role) in &self.roles {
            match self.role_cluster_sets(name, role) {
                Some(sets) if !sets.is_empty() => {
                    sets_by_role.insert(name.as_str(), sets);
                }
                Some(_) => {}
                None => skipped_roles += 1,
            }
        }

        let mut grants = GrantMap::default();
        for binding in self.bindings.values() {
            let Some(sets) = sets_by_role.get(binding.role.as_str()) else {
                continue;
            };
            for set in sets {
                grants
                    .entry(set.to_string())
                    .or_default()
                    .extend(binding.subjects.iter().cloned());
            }
        }

        let rebuild = Rebuild {
            cluster_sets: grants.len(),
            skipped_roles,
        };
        *self.published.0.write() = grants;
        self.metrics.record_rebuild(&rebuild);
        rebuild
    }

    /// Returns the existing ClusterSets on which `role` grants this cache's level, or `None` if
    /// the role is malformed.
    fn role_cluster_sets(&self, name: &str, role: &ClusterRole) -> Option<Vec<&str>> {
        let grant = match self.extract.extract(role) {
            Ok(Some(grant)) if grant.level == self.level => grant,
            Ok(_) => return Some(vec![]),
            Err(error) => {
                tracing::info!(clusterrole = %name, %error, "Skipping malformed ClusterRole");
                return None;
            }
        };

        let sets = match grant.cluster_sets {
            ClusterSetSelection::All => self.cluster_sets.iter().map(String::as_str).collect(),
            ClusterSetSelection::Named(names) => self
                .cluster_sets
                .iter()
                .filter(|set| names.contains(set.as_str()))
                .map(String::as_str)
                .collect(),
        };
        Some(sets)
    }

    /// Publishes the grants of `binding` through `role` without waiting for a rebuild.
    fn grant(&self, role: &ClusterRole, binding: &PolicyBinding) {
        let Some(sets) = self.role_cluster_sets(&binding.role, role) else {
            return;
        };
        if sets.is_empty() || binding.subjects.is_empty() {
            return;
        }

        let mut published = self.published.0.write();
        for set in sets {
            published
                .entry(set.to_string())
                .or_default()
                .extend(binding.subjects.iter().cloned());
        }
    }
}

impl<E: ExtractGrant> kubert::index::IndexClusterResource<ManagedClusterSet>
    for AccessGrantCache<E>
{
    fn apply(&mut self, cluster_set: ManagedClusterSet) {
        // Grants on a new ClusterSet are picked up by the next rebuild.
        self.cluster_sets.insert(cluster_set.name_unchecked());
    }

    fn delete(&mut self, name: String) {
        self.published.0.write().remove(&name);
        self.cluster_sets.remove(&name);
    }
}

impl<E: ExtractGrant> kubert::index::IndexClusterResource<ClusterRole> for AccessGrantCache<E> {
    fn apply(&mut self, role: ClusterRole) {
        let name = role.name_unchecked();
        if self.roles.get(&name) == Some(&role) {
            tracing::trace!(clusterrole = %name, "No changes");
            return;
        }

        for binding in self.bindings.values().filter(|b| b.role == name) {
            self.grant(&role, binding);
        }
        self.roles.insert(name, role);
    }

    fn delete(&mut self, name: String) {
        tracing::debug!(clusterrole = %name, "Deleted; grants are revoked on the next rebuild");
        self.roles.remove(&name);
    }
}

impl<E: ExtractGrant> kubert::index::IndexClusterResource<ClusterRoleBinding>
    for AccessGrantCache<E>
{
    fn apply(&mut self, binding: ClusterRoleBinding) {
        let name = binding.name_unchecked();

        if binding.role_ref.kind != "ClusterRole" {
            tracing::trace!(clusterrolebinding = %name, kind = %binding.role_ref.kind, "Ignoring");
            self.bindings.remove(&name);
            return;
        }

        let subjects = binding
            .subjects
            .iter()
            .flatten()
            .filter_map(|subject| match Subject::try_from(subject) {
                Ok(subject) => Some(subject),
                Err(error) => {
                    tracing::debug!(clusterrolebinding = %name, %error, "Ignoring subject");
                    None
                }
            })
            .collect::<Vec<_>>();
        let policy = PolicyBinding {
            role: binding.role_ref.name,
            subjects,
        };
        if self.bindings.get(&name) == Some(&policy) {
            tracing::trace!(clusterrolebinding = %name, "No changes");
            return;
        }

        if let Some(role) = self.roles.get(&policy.role) {
            self.grant(role, &policy);
        }
        self.bindings.insert(name, policy);
    }

    fn delete(&mut self, name: String) {
        tracing::debug!(clusterrolebinding = %name, "Deleted; grants are revoked on the next rebuild");
        self.bindings.remove(&name);
    }
}

// === impl GrantsReader ===

impl GrantsReader {
    /// Returns the ClusterSets on which `subject` holds this level of access.
    pub fn cluster_sets_for(&self, subject: &Subject) -> BTreeSet<String> {
        self.0
            .read()
            .iter()
            .filter(|(_, subjects)| subjects.contains(subject))
            .map(|(set, _)| set.clone())
            .collect()
    }

    /// Returns a copy of the complete published map.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<Subject>> {
        self.0
            .read()
            .iter()
            .map(|(set, subjects)| (set.clone(), subjects.clone()))
            .collect()
    }

    pub(crate) fn sizes(&self) -> (usize, usize) {
        let grants = self.0.read();
        (grants.len(), grants.values().map(BTreeSet::len).sum())
    }
}

impl GrantLookup for GrantsReader {
    fn subjects(&self, cluster_set: &str) -> BTreeSet<Subject> {
        self.0.read().get(cluster_set).cloned().unwrap_or_default()
    }
}
