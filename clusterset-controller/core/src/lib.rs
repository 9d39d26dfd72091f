//! ClusterSet access propagation
//!
//! Administrators grant admin or view rights on a `ManagedClusterSet`. Those grants must be
//! projected onto concrete RBAC bindings for every cluster (and every namespace holding a
//! cluster-scoped resource) that belongs to the set. This crate holds the transport-independent
//! pieces of that projection:
//!
//! - [`ClusterSetMapper`] tracks which member keys belong to which ClusterSet, in both directions.
//! - [`Subject`], [`AccessLevel`] and [`SubjectList`] describe what a binding grants, with a single
//!   canonical ordering so that equal grants always compare (and serialize) equally.
//! - [`BindingStore`], [`Inventory`] and [`GrantLookup`] are the seams through which the binding
//!   syncers read targets and grants and write bindings. [`RoleStore`] writes the per-cluster
//!   roles those bindings refer to.
//!
//! ```text
//! [ ClusterSet ] <- [ member key ] <- [ Target ]
//!       ^
//!       +-- [ policy ] <- [ policy binding ] <- [ Subject ]
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod binding;
mod mapper;
mod member;
mod subject;

pub use self::{
    binding::{BindingStore, GrantLookup, Grants, Inventory, RoleStore, Target},
    mapper::{ClusterSetMapper, Memberships},
    member::{InvalidMemberKey, MemberKey, ResourceKind},
    subject::{AccessLevel, BindingSubject, InvalidSubject, Subject, SubjectKind, SubjectList},
};

/// The API group that owns `ManagedClusterSet` resources.
pub const CLUSTER_API_GROUP: &str = "cluster.open-cluster-management.io";

/// The field manager used for all writes issued by the controller.
pub const FIELD_MANAGER: &str = "clusterset-controller";
