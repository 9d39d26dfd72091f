#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cluster;
pub mod hive;
pub mod labels;

pub use self::{
    cluster::{ManagedCluster, ManagedClusterSet},
    hive::{ClusterClaim, ClusterDeployment, ClusterPool},
};
pub use k8s_openapi::api::{
    self,
    core::v1::Namespace,
    rbac::v1::{self as rbac, ClusterRole, ClusterRoleBinding, RoleBinding},
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, ResourceExt},
    error::ErrorResponse,
    runtime::watcher,
    Client, Error, Resource,
};

/// Returns true if the error is an API `NotFound` response.
pub fn is_not_found(error: &Error) -> bool {
    matches!(error, Error::Api(ErrorResponse { code: 404, .. }))
}
