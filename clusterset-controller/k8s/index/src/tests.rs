use clusterset_controller_core::Subject;
use clusterset_controller_k8s_api::{
    labels, rbac, ClusterDeployment, ClusterRole, ClusterRoleBinding, ManagedCluster,
    ManagedClusterSet, ObjectMeta,
};
use maplit::btreemap;

mod membership;

pub(crate) fn mk_cluster_set(name: impl ToString) -> ManagedClusterSet {
    ManagedClusterSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Default::default(),
    }
}

pub(crate) fn mk_cluster(name: impl ToString, cluster_set: Option<&str>) -> ManagedCluster {
    ManagedCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: cluster_set.map(|set| {
                btreemap! { labels::CLUSTER_SET.to_string() => set.to_string() }
            }),
            ..Default::default()
        },
        spec: Default::default(),
    }
}

pub(crate) fn mk_deployment(
    ns: impl ToString,
    name: impl ToString,
    cluster_set: Option<&str>,
) -> ClusterDeployment {
    ClusterDeployment {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            labels: cluster_set.map(|set| {
                btreemap! { labels::CLUSTER_SET.to_string() => set.to_string() }
            }),
            ..Default::default()
        },
        spec: Default::default(),
    }
}

pub(crate) fn mk_rule(
    api_groups: &[&str],
    resources: &[&str],
    verbs: &[&str],
    names: &[&str],
) -> rbac::PolicyRule {
    let strings = |values: &[&str]| values.iter().map(ToString::to_string).collect::<Vec<_>>();
    rbac::PolicyRule {
        api_groups: Some(strings(api_groups)),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        resource_names: if names.is_empty() {
            None
        } else {
            Some(strings(names))
        },
        ..Default::default()
    }
}

pub(crate) fn mk_role(name: impl ToString, rules: Vec<rbac::PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        rules: Some(rules),
        ..Default::default()
    }
}

/// A role granting `create` on `managedclustersets/join` for the named sets.
pub(crate) fn mk_admin_role(name: impl ToString, sets: &[&str]) -> ClusterRole {
    mk_role(
        name,
        vec![mk_rule(
            &["cluster.open-cluster-management.io"],
            &["managedclustersets/join"],
            &["create"],
            sets,
        )],
    )
}

/// A role granting `get` on `managedclustersets` for the named sets.
pub(crate) fn mk_view_role(name: impl ToString, sets: &[&str]) -> ClusterRole {
    mk_role(
        name,
        vec![mk_rule(
            &["cluster.open-cluster-management.io"],
            &["managedclustersets"],
            &["get", "list", "watch"],
            sets,
        )],
    )
}

pub(crate) fn mk_binding(
    name: impl ToString,
    role: impl ToString,
    subjects: impl IntoIterator<Item = Subject>,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        role_ref: rbac::RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role.to_string(),
        },
        subjects: Some(subjects.into_iter().map(|s| rbac::Subject::from(&s)).collect()),
    }
}
