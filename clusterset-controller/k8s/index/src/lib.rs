//! ClusterSet indexes
//!
//! These indexes are fed by `kubert::index` watches and hold everything the binding syncers need to
//! decide what a target's bindings should look like:
//!
//! - [`grants::AccessGrantCache`] watches `ManagedClusterSet`, `ClusterRole` and
//!   `ClusterRoleBinding` resources and derives, for a single access level, the subjects granted
//!   that level on each ClusterSet. One cache is run per access level; the [`ExtractGrant`]
//!   strategy it is built with decides which roles grant its level.
//! - [`membership::MembershipIndex`] watches `ManagedCluster`s and Hive provisioning resources,
//!   tracks their `cluster.open-cluster-management.io/clusterset` labels, and publishes the
//!   membership of every existing ClusterSet into the shared [`ClusterSetMapper`]s. It also serves
//!   as the inventory of binding targets.
//!
//! ```text
//! [ ClusterRoleBinding ] -> [ ClusterRole ] -> [ ManagedClusterSet ] <- [ ManagedCluster ]
//!                                                                    <- [ ClusterDeployment ]
//! ```
//!
//! [`ClusterSetMapper`]: clusterset_controller_core::ClusterSetMapper

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod extract;
pub mod grants;
pub mod membership;
pub mod metrics;

#[cfg(test)]
mod tests;

pub use self::{
    extract::{ClusterSetSelection, ExtractGrant, Grant, MalformedPolicy, RuleExtractor},
    grants::{AccessGrantCache, GrantsReader},
    membership::{ClusterTargets, MembershipIndex, NamespaceTargets},
    metrics::CacheMetrics,
};
