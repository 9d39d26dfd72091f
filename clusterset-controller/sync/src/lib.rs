//! Binding synchronization
//!
//! A [`BindingSyncer`] periodically converges one binding per target (a managed cluster or a
//! namespace) with the subjects granted on the ClusterSets that the target's members belong to.
//! Each tick is stateless: desired bindings are recomputed from the shared membership mappers and
//! grant caches, compared against the stored binding, and only differences are written.
//!
//! Cluster bindings refer to per-cluster ClusterRoles, which a [`RoleSyncer`] creates for every
//! managed cluster and removes once the cluster is deleted.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod leader;
mod metrics;
mod roles;
mod store;
mod syncer;


pub use self::{
    leader::Leader,
    metrics::SyncMetrics,
    roles::{cluster_role, ClusterRoles, RoleSyncer},
    store::{ClusterRoleBindings, RoleBindings},
    syncer::{BindingState, BindingSyncer, Scope, Tick},
};
use clusterset_controller_k8s_index::{ClusterTargets, NamespaceTargets};

/// Converges one set of ClusterRoleBindings per managed cluster.
pub type ClusterBindingSyncer = BindingSyncer<ClusterTargets, ClusterRoleBindings>;

/// Converges one set of RoleBindings per namespace that holds ClusterSet members.
pub type NamespaceBindingSyncer = BindingSyncer<NamespaceTargets, RoleBindings>;

/// Converges the per-level ClusterRoles of every managed cluster.
pub type ClusterRoleSyncer = RoleSyncer<ClusterTargets, ClusterRoles>;
