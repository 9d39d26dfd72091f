//! Kubernetes-backed binding stores.
//!
//! Each target is backed by one RBAC binding per access level. A level without subjects has no
//! object. Objects are labeled with the target and level they were written for so that the store
//! can enumerate every target it has written, and they are written with server-side apply under
//! the controller's field manager.

use crate::ClusterRoles;
use anyhow::Result;
use clusterset_controller_core::{
    AccessLevel, BindingSubject, Subject, SubjectList, FIELD_MANAGER,
};
use clusterset_controller_k8s_api::{
    self as k8s, is_not_found, labels, rbac, ClusterRoleBinding, ObjectMeta, ResourceExt,
    RoleBinding,
};
use std::collections::{BTreeMap, BTreeSet};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Stores a managed cluster's binding as ClusterRoleBindings to the cluster's per-level
/// ClusterRole, which [`crate::RoleSyncer`] maintains.
#[derive(Clone)]
pub struct ClusterRoleBindings {
    client: k8s::Client,
}

/// Stores a namespace's binding as RoleBindings to the built-in `admin` and `view` ClusterRoles.
#[derive(Clone)]
pub struct RoleBindings {
    client: k8s::Client,
}

// === impl ClusterRoleBindings ===

impl ClusterRoleBindings {
    pub fn new(client: k8s::Client) -> Self {
        Self { client }
    }

    pub fn binding_name(level: AccessLevel, cluster: &str) -> String {
        format!("open-cluster-management:managedclusterset:{level}:{cluster}")
    }

    fn api(&self) -> k8s::Api<ClusterRoleBinding> {
        k8s::Api::all(self.client.clone())
    }

    async fn apply(&self, cluster: &str, subjects: &SubjectList) -> Result<()> {
        let api = self.api();
        for level in AccessLevel::ALL {
            let name = Self::binding_name(level, cluster);
            let Some(subjects) = to_rbac(subjects, level) else {
                delete_ignoring_missing(&api, &name).await?;
                continue;
            };
            let binding = ClusterRoleBinding {
                metadata: binding_meta(&name, None, cluster, level),
                role_ref: cluster_role_ref(ClusterRoles::name(level, cluster)),
                subjects: Some(subjects),
            };
            api.patch(
                &name,
                &k8s::PatchParams::apply(FIELD_MANAGER),
                &k8s::Patch::Apply(binding),
            )
            .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClusterRoleBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRoleBindings").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl clusterset_controller_core::BindingStore for ClusterRoleBindings {
    async fn list(&self) -> Result<Vec<String>> {
        let bindings = self
            .api()
            .list(&k8s::ListParams::default().labels(labels::BINDING_TARGET))
            .await?;
        Ok(targets(bindings.items.iter().map(ResourceExt::labels)))
    }

    async fn get(&self, cluster: &str) -> Result<Option<SubjectList>> {
        let api = self.api();
        let mut found = false;
        let mut subjects = Vec::new();
        for level in AccessLevel::ALL {
            if let Some(binding) = api.get_opt(&Self::binding_name(level, cluster)).await? {
                found = true;
                subjects.extend(from_rbac(binding.subjects.as_deref(), level));
            }
        }
        Ok(found.then(|| subjects.into_iter().collect()))
    }

    async fn create(&self, cluster: &str, subjects: &SubjectList) -> Result<()> {
        self.apply(cluster, subjects).await
    }

    async fn update(&self, cluster: &str, subjects: &SubjectList) -> Result<()> {
        self.apply(cluster, subjects).await
    }

    async fn delete(&self, cluster: &str) -> Result<()> {
        let api = self.api();
        for level in AccessLevel::ALL {
            delete_ignoring_missing(&api, &Self::binding_name(level, cluster)).await?;
        }
        Ok(())
    }
}

// === impl RoleBindings ===

impl RoleBindings {
    pub fn new(client: k8s::Client) -> Self {
        Self { client }
    }

    pub fn binding_name(level: AccessLevel) -> String {
        format!("open-cluster-management:managedclusterset:{level}")
    }

    fn api(&self, namespace: &str) -> k8s::Api<RoleBinding> {
        k8s::Api::namespaced(self.client.clone(), namespace)
    }

    async fn apply(&self, namespace: &str, subjects: &SubjectList) -> Result<()> {
        let api = self.api(namespace);
        for level in AccessLevel::ALL {
            let name = Self::binding_name(level);
            let Some(subjects) = to_rbac(subjects, level) else {
                delete_ignoring_missing(&api, &name).await?;
                continue;
            };
            let binding = RoleBinding {
                metadata: binding_meta(&name, Some(namespace), namespace, level),
                role_ref: cluster_role_ref(level.to_string()),
                subjects: Some(subjects),
            };
            api.patch(
                &name,
                &k8s::PatchParams::apply(FIELD_MANAGER),
                &k8s::Patch::Apply(binding),
            )
            .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RoleBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleBindings").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl clusterset_controller_core::BindingStore for RoleBindings {
    async fn list(&self) -> Result<Vec<String>> {
        let bindings = k8s::Api::<RoleBinding>::all(self.client.clone())
            .list(&k8s::ListParams::default().labels(labels::BINDING_TARGET))
            .await?;
        Ok(targets(bindings.items.iter().map(ResourceExt::labels)))
    }

    async fn get(&self, namespace: &str) -> Result<Option<SubjectList>> {
        let api = self.api(namespace);
        let mut found = false;
        let mut subjects = Vec::new();
        for level in AccessLevel::ALL {
            if let Some(binding) = api.get_opt(&Self::binding_name(level)).await? {
                found = true;
                subjects.extend(from_rbac(binding.subjects.as_deref(), level));
            }
        }
        Ok(found.then(|| subjects.into_iter().collect()))
    }

    async fn create(&self, namespace: &str, subjects: &SubjectList) -> Result<()> {
        self.apply(namespace, subjects).await
    }

    async fn update(&self, namespace: &str, subjects: &SubjectList) -> Result<()> {
        self.apply(namespace, subjects).await
    }

    async fn delete(&self, namespace: &str) -> Result<()> {
        let api = self.api(namespace);
        for level in AccessLevel::ALL {
            delete_ignoring_missing(&api, &Self::binding_name(level)).await?;
        }
        Ok(())
    }
}

// === helpers ===

fn binding_meta(
    name: &str,
    namespace: Option<&str>,
    target: &str,
    level: AccessLevel,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(ToString::to_string),
        labels: Some(BTreeMap::from([
            (labels::BINDING_TARGET.to_string(), target.to_string()),
            (labels::ACCESS_LEVEL.to_string(), level.to_string()),
        ])),
        ..Default::default()
    }
}

fn cluster_role_ref(name: String) -> rbac::RoleRef {
    rbac::RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: "ClusterRole".to_string(),
        name,
    }
}

/// Returns the RBAC subjects granted `level`, or `None` if there are none.
fn to_rbac(subjects: &SubjectList, level: AccessLevel) -> Option<Vec<rbac::Subject>> {
    let subjects = subjects
        .of_level(level)
        .map(rbac::Subject::from)
        .collect::<Vec<_>>();
    (!subjects.is_empty()).then_some(subjects)
}

fn from_rbac(
    subjects: Option<&[rbac::Subject]>,
    level: AccessLevel,
) -> impl Iterator<Item = BindingSubject> + '_ {
    subjects
        .into_iter()
        .flatten()
        .filter_map(move |subject| match Subject::try_from(subject) {
            Ok(subject) => Some(BindingSubject::new(subject, level)),
            Err(error) => {
                tracing::debug!(%error, "Ignoring stored subject");
                None
            }
        })
}

fn targets<'l>(label_sets: impl Iterator<Item = &'l BTreeMap<String, String>>) -> Vec<String> {
    label_sets
        .filter_map(|l| l.get(labels::BINDING_TARGET))
        .filter(|target| !target.is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) async fn delete_ignoring_missing<K>(api: &k8s::Api<K>, name: &str) -> Result<()>
where
    K: k8s::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    match api.delete(name, &k8s::DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(error) if is_not_found(&error) => Ok(()),
        Err(error) => Err(error.into()),
    }
}
