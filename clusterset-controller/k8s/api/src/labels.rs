use kube::api::ObjectMeta;

/// Assigns a cluster or provisioning resource to a ClusterSet.
pub const CLUSTER_SET: &str = "cluster.open-cluster-management.io/clusterset";

/// Names the target a controller-managed binding was written for.
pub const BINDING_TARGET: &str = "clusterset.open-cluster-management.io/binding-target";

/// Names the managed cluster a controller-managed ClusterRole was written for.
pub const ROLE_CLUSTER: &str = "clusterset.open-cluster-management.io/role-cluster";

/// Names the access level a controller-managed binding or role grants.
pub const ACCESS_LEVEL: &str = "clusterset.open-cluster-management.io/access-level";

/// Returns the ClusterSet an object is assigned to, if any.
///
/// An empty label value is treated as unassigned.
pub fn cluster_set(meta: &ObjectMeta) -> Option<&str> {
    meta.labels
        .as_ref()?
        .get(CLUSTER_SET)
        .map(String::as_str)
        .filter(|set| !set.is_empty())
}
