use crate::MemberKey;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// A bidirectional multimap from ClusterSet names to opaque member keys.
///
/// Both directions are guarded by a single lock so that readers never observe a member in one
/// direction without the other.
#[derive(Debug, Default)]
pub struct ClusterSetMapper {
    inner: RwLock<Maps>,
}

/// Resolves member keys to ClusterSets, routing each key to the mapper that tracks its kind.
#[derive(Clone, Debug, Default)]
pub struct Memberships {
    /// Maps ClusterSets to cluster names.
    pub clusters: Arc<ClusterSetMapper>,

    /// Maps ClusterSets to `<resource>/<namespace>/<name>` keys.
    pub namespaced: Arc<ClusterSetMapper>,
}

#[derive(Debug, Default)]
struct Maps {
    objects_by_set: HashMap<String, HashSet<String>>,
    sets_by_object: HashMap<String, HashSet<String>>,
}

// === impl ClusterSetMapper ===

impl ClusterSetMapper {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replaces the complete membership of `cluster_set`.
    ///
    /// Members not in `objects` are removed from the set; new members are added. An empty
    /// `objects` removes the ClusterSet entirely.
    pub fn update_cluster_set_by_objects<I>(&self, cluster_set: &str, objects: I)
    where
        I: IntoIterator<Item = String>,
    {
        let objects = objects.into_iter().collect::<HashSet<_>>();

        let mut maps = self.inner.write();
        let prior = maps.objects_by_set.remove(cluster_set).unwrap_or_default();
        for removed in prior.difference(&objects) {
            maps.unlink(removed, cluster_set);
        }
        for added in objects.difference(&prior) {
            maps.sets_by_object
                .entry(added.clone())
                .or_default()
                .insert(cluster_set.to_string());
        }
        if !objects.is_empty() {
            maps.objects_by_set.insert(cluster_set.to_string(), objects);
        }
    }

    /// Moves `object` into `cluster_set`, removing it from any other ClusterSet.
    pub fn update_object_in_cluster_set(&self, object: &str, cluster_set: &str) {
        let mut maps = self.inner.write();
        maps.remove_object(object);
        maps.objects_by_set
            .entry(cluster_set.to_string())
            .or_default()
            .insert(object.to_string());
        maps.sets_by_object
            .entry(object.to_string())
            .or_default()
            .insert(cluster_set.to_string());
    }

    /// Removes `object` from every ClusterSet.
    pub fn delete_object(&self, object: &str) {
        self.inner.write().remove_object(object);
    }

    pub fn delete_cluster_set(&self, cluster_set: &str) {
        let mut maps = self.inner.write();
        if let Some(objects) = maps.objects_by_set.remove(cluster_set) {
            for object in &objects {
                maps.unlink(object, cluster_set);
            }
        }
    }

    pub fn objects_of_cluster_set(&self, cluster_set: &str) -> BTreeSet<String> {
        self.inner
            .read()
            .objects_by_set
            .get(cluster_set)
            .map(|objects| objects.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn cluster_sets_of_object(&self, object: &str) -> BTreeSet<String> {
        self.inner
            .read()
            .sets_by_object
            .get(object)
            .map(|sets| sets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns a copy of the complete ClusterSet-to-members map.
    pub fn cluster_set_to_objects(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.inner
            .read()
            .objects_by_set
            .iter()
            .map(|(set, objects)| (set.clone(), objects.iter().cloned().collect()))
            .collect()
    }

    /// The number of ClusterSets with at least one member.
    pub fn len(&self) -> usize {
        self.inner.read().objects_by_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().objects_by_set.is_empty()
    }

    /// The number of distinct members across all ClusterSets.
    pub fn object_count(&self) -> usize {
        self.inner.read().sets_by_object.len()
    }
}

impl Maps {
    /// Removes `cluster_set` from the inverse entry for `object`.
    fn unlink(&mut self, object: &str, cluster_set: &str) {
        if let Some(sets) = self.sets_by_object.get_mut(object) {
            sets.remove(cluster_set);
            if sets.is_empty() {
                self.sets_by_object.remove(object);
            }
        }
    }

    fn remove_object(&mut self, object: &str) {
        let Some(sets) = self.sets_by_object.remove(object) else {
            return;
        };
        for set in &sets {
            if let Some(objects) = self.objects_by_set.get_mut(set) {
                objects.remove(object);
                if objects.is_empty() {
                    self.objects_by_set.remove(set);
                }
            }
        }
    }
}

// === impl Memberships ===

impl Memberships {
    /// Returns every ClusterSet that `member` currently belongs to.
    pub fn cluster_sets_of(&self, member: &MemberKey) -> BTreeSet<String> {
        match member {
            MemberKey::Cluster(name) => self.clusters.cluster_sets_of_object(name),
            MemberKey::Namespaced { .. } => {
                self.namespaced.cluster_sets_of_object(&member.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceKind;
    use maplit::{btreemap, btreeset};
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Asserts that the forward and inverse maps describe exactly the same relation.
    fn assert_inverse(mapper: &ClusterSetMapper) {
        let maps = mapper.inner.read();
        let mut forward = BTreeSet::new();
        for (set, objects) in &maps.objects_by_set {
            assert!(!objects.is_empty(), "{set} must not be kept empty");
            for object in objects {
                forward.insert((set.clone(), object.clone()));
            }
        }
        let mut inverse = BTreeSet::new();
        for (object, sets) in &maps.sets_by_object {
            assert!(!sets.is_empty(), "{object} must not be kept empty");
            for set in sets {
                inverse.insert((set.clone(), object.clone()));
            }
        }
        assert_eq!(forward, inverse);
    }

    #[test]
    fn replaces_membership() {
        let mapper = ClusterSetMapper::default();
        mapper.update_cluster_set_by_objects("prod", set(&["c1", "c2"]));
        mapper.update_cluster_set_by_objects("staging", set(&["c2", "c3"]));
        assert_inverse(&mapper);

        assert_eq!(mapper.objects_of_cluster_set("prod"), btreeset! {"c1".into(), "c2".into()});
        assert_eq!(
            mapper.cluster_sets_of_object("c2"),
            btreeset! {"prod".into(), "staging".into()}
        );

        mapper.update_cluster_set_by_objects("prod", set(&["c2", "c4"]));
        assert_inverse(&mapper);
        assert!(mapper.cluster_sets_of_object("c1").is_empty());
        assert_eq!(mapper.cluster_sets_of_object("c4"), btreeset! {"prod".into()});
        assert_eq!(
            mapper.cluster_set_to_objects(),
            btreemap! {
                "prod".to_string() => btreeset! {"c2".into(), "c4".into()},
                "staging".to_string() => btreeset! {"c2".into(), "c3".into()},
            }
        );

        mapper.update_cluster_set_by_objects("staging", Vec::new());
        assert_inverse(&mapper);
        assert_eq!(mapper.len(), 1);
        assert_eq!(mapper.cluster_sets_of_object("c3"), BTreeSet::new());
    }

    #[test]
    fn membership_update_is_idempotent() {
        let mapper = ClusterSetMapper::default();
        mapper.update_cluster_set_by_objects("prod", set(&["c1", "c2"]));
        let before = mapper.cluster_set_to_objects();
        let inverse = mapper.cluster_sets_of_object("c1");

        mapper.update_cluster_set_by_objects("prod", set(&["c2", "c1"]));
        assert_inverse(&mapper);
        assert_eq!(mapper.cluster_set_to_objects(), before);
        assert_eq!(mapper.cluster_sets_of_object("c1"), inverse);
        assert_eq!(mapper.object_count(), 2);
    }

    #[test]
    fn inverse_tracks_latest_membership() {
        // Each step replaces one set's membership; the inverse lookup must always reflect the most
        // recent membership of every set.
        let steps: &[(&str, &[&str])] = &[
            ("a", &["x", "y"]),
            ("b", &["y", "z"]),
            ("a", &["z"]),
            ("c", &["x", "y", "z"]),
            ("b", &[]),
            ("c", &["x"]),
            ("a", &["x", "y", "z"]),
        ];

        let mapper = ClusterSetMapper::default();
        let mut latest = BTreeMap::<&str, BTreeSet<&str>>::new();
        for (cluster_set, objects) in steps {
            mapper.update_cluster_set_by_objects(cluster_set, set(objects));
            latest.insert(*cluster_set, objects.iter().copied().collect());
            assert_inverse(&mapper);

            for object in ["x", "y", "z"] {
                let expected = latest
                    .iter()
                    .filter(|(_, objects)| objects.contains(object))
                    .map(|(set, _)| set.to_string())
                    .collect::<BTreeSet<_>>();
                assert_eq!(mapper.cluster_sets_of_object(object), expected, "{object}");
            }
        }
    }

    #[test]
    fn delete_cluster_set_removes_inverse_entries() {
        let mapper = ClusterSetMapper::default();
        mapper.update_cluster_set_by_objects("prod", set(&["c1", "c2"]));
        mapper.update_cluster_set_by_objects("staging", set(&["c2"]));

        mapper.delete_cluster_set("prod");
        assert_inverse(&mapper);
        assert!(mapper.objects_of_cluster_set("prod").is_empty());
        assert!(mapper.cluster_sets_of_object("c1").is_empty());
        assert_eq!(mapper.cluster_sets_of_object("c2"), btreeset! {"staging".into()});

        // Deleting an unknown set is a no-op.
        mapper.delete_cluster_set("prod");
        assert_inverse(&mapper);
    }

    #[test]
    fn moves_single_objects() {
        let mapper = ClusterSetMapper::default();
        mapper.update_cluster_set_by_objects("prod", set(&["c1", "c2"]));
        mapper.update_cluster_set_by_objects("staging", set(&["c1"]));

        mapper.update_object_in_cluster_set("c1", "dev");
        assert_inverse(&mapper);
        assert_eq!(mapper.cluster_sets_of_object("c1"), btreeset! {"dev".into()});
        assert_eq!(mapper.objects_of_cluster_set("prod"), btreeset! {"c2".into()});
        assert!(mapper.objects_of_cluster_set("staging").is_empty());

        mapper.delete_object("c2");
        assert_inverse(&mapper);
        assert!(mapper.objects_of_cluster_set("prod").is_empty());
        assert_eq!(mapper.len(), 1);
    }

    #[test]
    fn memberships_route_by_kind() {
        let memberships = Memberships::default();
        let cd = MemberKey::namespaced(ResourceKind::ClusterDeployment, "team-a", "c1");
        memberships
            .clusters
            .update_cluster_set_by_objects("prod", set(&["c1"]));
        memberships
            .namespaced
            .update_cluster_set_by_objects("staging", vec![cd.to_string()]);

        assert_eq!(
            memberships.cluster_sets_of(&MemberKey::cluster("c1")),
            btreeset! {"prod".into()}
        );
        assert_eq!(memberships.cluster_sets_of(&cd), btreeset! {"staging".into()});
    }
}
