use std::{fmt, str::FromStr};

/// Identifies a member of a ClusterSet.
///
/// Clusters are identified by their name. Namespaced resources are identified by
/// `<resource>/<namespace>/<name>`, e.g. `clusterdeployments/team-a/prod-1`. The mapper treats the
/// rendered key as an opaque string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberKey {
    Cluster(String),
    Namespaced {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
}

/// The namespaced resource types that may join a ClusterSet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ClusterClaim,
    ClusterDeployment,
    ClusterPool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidMemberKey {
    #[error("member key must not be empty")]
    Empty,

    #[error("unknown resource type: {0}")]
    UnknownResource(String),

    #[error("malformed member key: {0}")]
    Malformed(String),
}

// === impl MemberKey ===

impl MemberKey {
    pub fn cluster(name: impl ToString) -> Self {
        Self::Cluster(name.to_string())
    }

    pub fn namespaced(kind: ResourceKind, namespace: impl ToString, name: impl ToString) -> Self {
        Self::Namespaced {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// The namespace in which this member's bindings live.
    ///
    /// Every managed cluster owns a namespace of the same name on the hub.
    pub fn namespace(&self) -> &str {
        match self {
            Self::Cluster(name) => name,
            Self::Namespaced { namespace, .. } => namespace,
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster(name) => f.write_str(name),
            Self::Namespaced {
                kind,
                namespace,
                name,
            } => write!(f, "{kind}/{namespace}/{name}"),
        }
    }
}

impl FromStr for MemberKey {
    type Err = InvalidMemberKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(InvalidMemberKey::Empty);
        }

        let parts = s.split('/').collect::<Vec<_>>();
        match parts.as_slice() {
            [name] => Ok(Self::cluster(name)),
            [kind, namespace, name] if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::namespaced(kind.parse()?, namespace, name))
            }
            _ => Err(InvalidMemberKey::Malformed(s.to_string())),
        }
    }
}

// === impl ResourceKind ===

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::ClusterClaim,
        ResourceKind::ClusterDeployment,
        ResourceKind::ClusterPool,
    ];

    /// The plural resource name, as used in member keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterClaim => "clusterclaims",
            Self::ClusterDeployment => "clusterdeployments",
            Self::ClusterPool => "clusterpools",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = InvalidMemberKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| InvalidMemberKey::UnknownResource(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rendered_keys() {
        for key in [
            MemberKey::cluster("c1"),
            MemberKey::namespaced(ResourceKind::ClusterDeployment, "team-a", "prod-1"),
            MemberKey::namespaced(ResourceKind::ClusterPool, "pools", "small"),
            MemberKey::namespaced(ResourceKind::ClusterClaim, "pools", "claim-0"),
        ] {
            assert_eq!(key.to_string().parse::<MemberKey>(), Ok(key));
        }
        assert_eq!(
            MemberKey::namespaced(ResourceKind::ClusterDeployment, "team-a", "prod-1").to_string(),
            "clusterdeployments/team-a/prod-1"
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!("".parse::<MemberKey>(), Err(InvalidMemberKey::Empty));
        assert_eq!(
            "pods/ns/name".parse::<MemberKey>(),
            Err(InvalidMemberKey::UnknownResource("pods".to_string()))
        );
        assert_eq!(
            "clusterpools/ns".parse::<MemberKey>(),
            Err(InvalidMemberKey::Malformed("clusterpools/ns".to_string()))
        );
        assert_eq!(
            "clusterpools//name".parse::<MemberKey>(),
            Err(InvalidMemberKey::Malformed("clusterpools//name".to_string()))
        );
    }

    #[test]
    fn binding_namespace() {
        assert_eq!(MemberKey::cluster("c1").namespace(), "c1");
        assert_eq!(
            MemberKey::namespaced(ResourceKind::ClusterClaim, "pools", "claim-0").namespace(),
            "pools"
        );
    }
}
