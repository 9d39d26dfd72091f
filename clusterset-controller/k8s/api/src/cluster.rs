use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// A cluster registered with the hub.
///
/// Each managed cluster owns a hub namespace with the same name.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1",
    kind = "ManagedCluster",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    #[serde(default)]
    pub hub_accepts_client: bool,

    pub lease_duration_seconds: Option<i32>,
}

/// A named group of clusters and cluster-provisioning resources that share access grants.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1beta2",
    kind = "ManagedClusterSet",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSetSpec {
    pub cluster_selector: Option<ClusterSelector>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSelector {
    /// Either `ExclusiveClusterSetLabel` (the default) or `LabelSelector`.
    pub selector_type: Option<String>,
}
