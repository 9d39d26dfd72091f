use super::*;
use crate::{ClusterTargets, MembershipIndex, NamespaceTargets};
use clusterset_controller_core::{Inventory, MemberKey, Memberships, ResourceKind, Target};
use clusterset_controller_k8s_api::{ClusterClaim, ClusterPool};
use kubert::index::IndexClusterResource;
use maplit::btreeset;
use pretty_assertions::assert_eq;

fn mk_pool(ns: &str, name: &str, cluster_set: &str) -> ClusterPool {
    let mut pool = ClusterPool::new(name, Default::default());
    pool.metadata.namespace = Some(ns.to_string());
    pool.metadata.labels = Some(btreemap! {
        labels::CLUSTER_SET.to_string() => cluster_set.to_string(),
    });
    pool
}

/// The index is both a cluster-scoped and a namespaced index, so namespaced resources are applied
/// through the fully-qualified trait.
fn apply_namespaced<T>(idx: &mut MembershipIndex, resource: T)
where
    MembershipIndex: kubert::index::IndexNamespacedResource<T>,
{
    <MembershipIndex as kubert::index::IndexNamespacedResource<T>>::apply(idx, resource);
}

#[test]
fn publishes_members_of_existing_sets() {
    let memberships = Memberships::default();
    let index = MembershipIndex::shared(memberships.clone());
    let mut idx = index.write();

    idx.apply(mk_cluster("c1", Some("prod")));
    apply_namespaced(&mut idx, mk_deployment("c2", "c2", Some("prod")));
    // Not published until the set exists.
    assert!(memberships.clusters.is_empty());
    assert!(memberships.namespaced.is_empty());

    idx.apply(mk_cluster_set("prod"));
    assert_eq!(
        memberships.clusters.objects_of_cluster_set("prod"),
        btreeset! { "c1".to_string() }
    );
    assert_eq!(
        memberships.namespaced.objects_of_cluster_set("prod"),
        btreeset! { "clusterdeployments/c2/c2".to_string() }
    );
    assert_eq!(
        memberships.cluster_sets_of(&MemberKey::namespaced(
            ResourceKind::ClusterDeployment,
            "c2",
            "c2"
        )),
        btreeset! { "prod".to_string() }
    );

    <MembershipIndex as IndexClusterResource<ManagedClusterSet>>::delete(
        &mut idx,
        "prod".to_string(),
    );
    assert!(memberships.clusters.is_empty());
    assert!(memberships.namespaced.is_empty());
}

#[test]
fn relabeled_members_move_between_sets() {
    let memberships = Memberships::default();
    let index = MembershipIndex::shared(memberships.clone());
    {
        let mut idx = index.write();
        idx.apply(mk_cluster_set("prod"));
        idx.apply(mk_cluster_set("staging"));

        idx.apply(mk_cluster("c1", Some("prod")));
        idx.apply(mk_cluster("c2", Some("prod")));
        idx.apply(mk_cluster("c1", Some("staging")));
    }
    assert_eq!(
        memberships.clusters.cluster_set_to_objects(),
        btreemap! {
            "prod".to_string() => btreeset! { "c2".to_string() },
            "staging".to_string() => btreeset! { "c1".to_string() },
        }
    );

    // Dropping the label removes the member without forgetting the cluster.
    index.write().apply(mk_cluster("c2", None));
    assert!(memberships.clusters.objects_of_cluster_set("prod").is_empty());
    assert_eq!(
        ClusterTargets::new(index.clone())
            .targets()
            .into_iter()
            .map(|t| t.name)
            .collect::<std::collections::BTreeSet<_>>(),
        btreeset! { "c1".to_string(), "c2".to_string() }
    );

    <MembershipIndex as IndexClusterResource<ManagedCluster>>::delete(
        &mut index.write(),
        "c1".to_string(),
    );
    assert!(memberships.clusters.is_empty());
}

#[test]
fn namespaced_resources() {
    let memberships = Memberships::default();
    let index = MembershipIndex::shared(memberships.clone());
    {
        let mut idx = index.write();
        idx.apply(mk_cluster_set("prod"));
        apply_namespaced(&mut idx, mk_pool("pools", "small", "prod"));
        apply_namespaced(&mut idx, ClusterClaim::new("orphan", Default::default()));

        let mut claim = ClusterClaim::new("claim", Default::default());
        claim.metadata.namespace = Some("pools".to_string());
        apply_namespaced(&mut idx, claim);
    }
    assert_eq!(
        memberships.namespaced.objects_of_cluster_set("prod"),
        btreeset! { "clusterpools/pools/small".to_string() }
    );

    let mut targets = NamespaceTargets::new(index.clone()).targets();
    for target in &mut targets {
        target.members.sort();
    }
    assert_eq!(
        targets,
        vec![Target::new(
            "pools",
            [
                MemberKey::namespaced(ResourceKind::ClusterClaim, "pools", "claim"),
                MemberKey::namespaced(ResourceKind::ClusterPool, "pools", "small"),
            ]
        )]
    );

    <MembershipIndex as kubert::index::IndexNamespacedResource<ClusterPool>>::delete(
        &mut index.write(),
        "pools".to_string(),
        "small".to_string(),
    );
    assert!(memberships.namespaced.is_empty());
}

#[test]
fn namespace_targets_include_cluster_namespaces() {
    let index = MembershipIndex::shared(Memberships::default());
    {
        let mut idx = index.write();
        idx.apply(mk_cluster("c1", None));
        apply_namespaced(&mut idx, mk_deployment("c1", "c1", None));
        apply_namespaced(&mut idx, mk_deployment("hive", "d1", None));
    }

    let targets = NamespaceTargets::new(index).targets();
    assert_eq!(
        targets
            .iter()
            .map(|t| (t.name.as_str(), t.members.len()))
            .collect::<Vec<_>>(),
        vec![("c1", 2), ("hive", 1)]
    );
    assert!(targets[0].members.contains(&MemberKey::cluster("c1")));
}
