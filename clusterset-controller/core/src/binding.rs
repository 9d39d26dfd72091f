use crate::{AccessLevel, MemberKey, Subject, SubjectList};
use anyhow::Result;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// Persists one binding object per target.
///
/// Implementations translate a target's [`SubjectList`] into whatever concrete objects back it;
/// callers always pass canonically ordered lists.
#[async_trait::async_trait]
pub trait BindingStore: Send + Sync {
    /// Lists every target that currently has a stored binding.
    async fn list(&self) -> Result<Vec<String>>;

    async fn get(&self, target: &str) -> Result<Option<SubjectList>>;

    async fn create(&self, target: &str, subjects: &SubjectList) -> Result<()>;

    async fn update(&self, target: &str, subjects: &SubjectList) -> Result<()>;

    async fn delete(&self, target: &str) -> Result<()>;
}

/// Persists the per-level ClusterRoles that a managed cluster's bindings refer to.
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// Lists every cluster that has stored roles, with the levels stored for it.
    async fn list(&self) -> Result<BTreeMap<String, BTreeSet<AccessLevel>>>;

    /// Writes the roles of every level for `cluster`.
    async fn apply(&self, cluster: &str) -> Result<()>;

    async fn delete(&self, cluster: &str) -> Result<()>;
}

/// Enumerates the targets that may hold bindings.
pub trait Inventory: Send + Sync {
    fn targets(&self) -> Vec<Target>;
}

/// A binding target and the ClusterSet members that it is composed of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub members: Vec<MemberKey>,
}

/// Looks up the subjects granted a fixed access level on a ClusterSet.
pub trait GrantLookup: Send + Sync {
    fn subjects(&self, cluster_set: &str) -> BTreeSet<Subject>;
}

/// The admin and view grant sources consulted by a syncer.
#[derive(Clone)]
pub struct Grants {
    pub admin: Arc<dyn GrantLookup>,
    pub view: Arc<dyn GrantLookup>,
}

// === impl Target ===

impl Target {
    pub fn new(name: impl ToString, members: impl IntoIterator<Item = MemberKey>) -> Self {
        Self {
            name: name.to_string(),
            members: members.into_iter().collect(),
        }
    }
}

// === impl Grants ===

impl Grants {
    pub fn new(admin: Arc<dyn GrantLookup>, view: Arc<dyn GrantLookup>) -> Self {
        Self { admin, view }
    }

    pub fn lookup(&self, level: AccessLevel) -> &dyn GrantLookup {
        match level {
            AccessLevel::Admin => &*self.admin,
            AccessLevel::View => &*self.view,
        }
    }
}

impl std::fmt::Debug for Grants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grants").finish_non_exhaustive()
    }
}
