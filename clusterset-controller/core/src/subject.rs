use clusterset_controller_k8s_api::rbac;
use std::{collections::BTreeSet, fmt, str::FromStr};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// An identity that may be granted access to a ClusterSet.
///
/// The derived ordering (kind, then name, then namespace) is the canonical order used for all
/// binding comparisons and writes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,

    /// Only set for service accounts.
    pub namespace: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubjectKind {
    User,
    Group,
    ServiceAccount,
}

/// The level of access a subject holds on a ClusterSet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessLevel {
    Admin,
    View,
}

/// A subject tagged with the access level it is granted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingSubject {
    pub subject: Subject,
    pub level: AccessLevel,
}

/// A canonically sorted, de-duplicated list of granted subjects.
///
/// Two lists built from the same set of grants are always equal, regardless of the order in which
/// the grants were discovered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubjectList(Vec<BindingSubject>);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidSubject {
    #[error("unsupported subject kind: {0}")]
    UnsupportedKind(String),

    #[error("subject name must not be empty")]
    EmptyName,

    #[error("service account {0} must specify a namespace")]
    MissingNamespace(String),
}

// === impl Subject ===

impl Subject {
    pub fn user(name: impl ToString) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.to_string(),
            namespace: None,
        }
    }

    pub fn group(name: impl ToString) -> Self {
        Self {
            kind: SubjectKind::Group,
            name: name.to_string(),
            namespace: None,
        }
    }

    pub fn service_account(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            kind: SubjectKind::ServiceAccount,
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}:{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}:{}", self.kind, self.name),
        }
    }
}

impl TryFrom<&rbac::Subject> for Subject {
    type Error = InvalidSubject;

    fn try_from(subject: &rbac::Subject) -> Result<Self, Self::Error> {
        if subject.name.is_empty() {
            return Err(InvalidSubject::EmptyName);
        }

        let kind = subject.kind.parse::<SubjectKind>()?;
        let namespace = match kind {
            SubjectKind::ServiceAccount => match subject.namespace.as_deref() {
                Some(ns) if !ns.is_empty() => Some(ns.to_string()),
                _ => return Err(InvalidSubject::MissingNamespace(subject.name.clone())),
            },
            // Namespaces are meaningless for users and groups.
            SubjectKind::User | SubjectKind::Group => None,
        };

        Ok(Self {
            kind,
            name: subject.name.clone(),
            namespace,
        })
    }
}

impl From<&Subject> for rbac::Subject {
    fn from(subject: &Subject) -> Self {
        let api_group = match subject.kind {
            SubjectKind::User | SubjectKind::Group => Some(RBAC_API_GROUP.to_string()),
            SubjectKind::ServiceAccount => None,
        };
        rbac::Subject {
            api_group,
            kind: subject.kind.to_string(),
            name: subject.name.clone(),
            namespace: subject.namespace.clone(),
        }
    }
}

// === impl SubjectKind ===

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Group => "Group",
            Self::ServiceAccount => "ServiceAccount",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = InvalidSubject;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Self::User),
            "Group" => Ok(Self::Group),
            "ServiceAccount" => Ok(Self::ServiceAccount),
            kind => Err(InvalidSubject::UnsupportedKind(kind.to_string())),
        }
    }
}

// === impl AccessLevel ===

impl AccessLevel {
    pub const ALL: [AccessLevel; 2] = [AccessLevel::Admin, AccessLevel::View];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::View => "view",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "view" => Ok(Self::View),
            level => anyhow::bail!("unknown access level: {level}"),
        }
    }
}

// === impl BindingSubject ===

impl BindingSubject {
    pub fn new(subject: Subject, level: AccessLevel) -> Self {
        Self { subject, level }
    }
}

impl fmt::Display for BindingSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.subject, self.level)
    }
}

// === impl SubjectList ===

impl SubjectList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BindingSubject> {
        self.0.iter()
    }

    /// Returns the subjects granted exactly `level`, in canonical order.
    pub fn of_level(&self, level: AccessLevel) -> impl Iterator<Item = &Subject> + '_ {
        self.0
            .iter()
            .filter(move |bs| bs.level == level)
            .map(|bs| &bs.subject)
    }
}

impl FromIterator<BindingSubject> for SubjectList {
    fn from_iter<T: IntoIterator<Item = BindingSubject>>(iter: T) -> Self {
        let sorted = iter.into_iter().collect::<BTreeSet<_>>();
        Self(sorted.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SubjectList {
    type Item = &'a BindingSubject;
    type IntoIter = std::slice::Iter<'a, BindingSubject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for SubjectList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, bs) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            bs.fmt(f)?;
        }
        f.write_str("]")
    }
}
