use clusterset_controller_core::{AccessLevel, CLUSTER_API_GROUP};
use clusterset_controller_k8s_api::{rbac::PolicyRule, ClusterRole};
use std::collections::BTreeSet;

const WILDCARD: &str = "*";

/// Decides whether a `ClusterRole` grants some access level on ClusterSets.
///
/// A cache is built with one extractor, so that admin and view caches differ only in how they
/// read roles.
pub trait ExtractGrant: Send + Sync + 'static {
    fn extract(&self, role: &ClusterRole) -> Result<Option<Grant>, MalformedPolicy>;
}

/// The access a single `ClusterRole` grants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    pub level: AccessLevel,
    pub cluster_sets: ClusterSetSelection,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterSetSelection {
    /// Every ClusterSet that exists.
    All,
    Named(BTreeSet<String>),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MalformedPolicy {
    #[error("rule {rule} names an empty ClusterSet")]
    EmptyName { rule: usize },

    #[error("rule {rule} names an invalid ClusterSet: {name:?}")]
    InvalidName { rule: usize, name: String },
}

/// Extracts grants from role rules, following the hub's RBAC conventions:
///
/// - admin is `create` on `managedclustersets/join`;
/// - view is `get` on `managedclustersets`.
///
/// `resourceNames` restrict the grant to specific ClusterSets; a matching rule without resource
/// names grants the level on every ClusterSet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleExtractor {
    level: AccessLevel,
    resource: &'static str,
    verb: &'static str,
}

impl<F> ExtractGrant for F
where
    F: Fn(&ClusterRole) -> Result<Option<Grant>, MalformedPolicy> + Send + Sync + 'static,
{
    fn extract(&self, role: &ClusterRole) -> Result<Option<Grant>, MalformedPolicy> {
        (self)(role)
    }
}

// === impl RuleExtractor ===

impl RuleExtractor {
    pub fn admin() -> Self {
        Self {
            level: AccessLevel::Admin,
            resource: "managedclustersets/join",
            verb: "create",
        }
    }

    pub fn view() -> Self {
        Self {
            level: AccessLevel::View,
            resource: "managedclustersets",
            verb: "get",
        }
    }

    pub fn for_level(level: AccessLevel) -> Self {
        match level {
            AccessLevel::Admin => Self::admin(),
            AccessLevel::View => Self::view(),
        }
    }

    fn matches(&self, rule: &PolicyRule) -> bool {
        let api_groups = rule.api_groups.as_deref().unwrap_or_default();
        let resources = rule.resources.as_deref().unwrap_or_default();
        contains(api_groups, CLUSTER_API_GROUP)
            && contains(resources, self.resource)
            && contains(&rule.verbs, self.verb)
    }
}

impl ExtractGrant for RuleExtractor {
    fn extract(&self, role: &ClusterRole) -> Result<Option<Grant>, MalformedPolicy> {
        let mut all = false;
        let mut names = BTreeSet::new();
        let mut matched = false;

        for (rule_idx, rule) in role.rules.iter().flatten().enumerate() {
            if !self.matches(rule) {
                continue;
            }
            matched = true;

            let resource_names = rule.resource_names.as_deref().unwrap_or_default();
            if resource_names.is_empty() {
                all = true;
                continue;
            }
            for name in resource_names {
                if name.is_empty() {
                    return Err(MalformedPolicy::EmptyName { rule: rule_idx });
                }
                if !is_dns_subdomain(name) {
                    return Err(MalformedPolicy::InvalidName {
                        rule: rule_idx,
                        name: name.clone(),
                    });
                }
                names.insert(name.clone());
            }
        }

        if !matched {
            return Ok(None);
        }
        let cluster_sets = if all {
            ClusterSetSelection::All
        } else {
            ClusterSetSelection::Named(names)
        };
        Ok(Some(Grant {
            level: self.level,
            cluster_sets,
        }))
    }
}

fn contains(values: &[String], value: &str) -> bool {
    values.iter().any(|v| v == value || v == WILDCARD)
}

/// ClusterSet names are object names and must be DNS-1123 subdomains.
fn is_dns_subdomain(name: &str) -> bool {
    name.len() <= 253
        && name.split('.').all(|label| {
            let bytes = label.as_bytes();
            !bytes.is_empty()
                && bytes[0].is_ascii_alphanumeric()
                && bytes[bytes.len() - 1].is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{mk_role, mk_rule};
    use maplit::btreeset;

    #[test]
    fn admin_requires_join() {
        let role = mk_role(
            "set-admin",
            vec![mk_rule(
                &["cluster.open-cluster-management.io"],
                &["managedclustersets/join"],
                &["create"],
                &["prod", "staging"],
            )],
        );
        assert_eq!(
            RuleExtractor::admin().extract(&role),
            Ok(Some(Grant {
                level: AccessLevel::Admin,
                cluster_sets: ClusterSetSelection::Named(btreeset! {
                    "prod".to_string(),
                    "staging".to_string(),
                }),
            }))
        );
        assert_eq!(RuleExtractor::view().extract(&role), Ok(None));
    }

    #[test]
    fn view_requires_get() {
        let role = mk_role(
            "set-view",
            vec![mk_rule(
                &["cluster.open-cluster-management.io"],
                &["managedclustersets"],
                &["get", "list", "watch"],
                &["prod"],
            )],
        );
        assert_eq!(
            RuleExtractor::view().extract(&role),
            Ok(Some(Grant {
                level: AccessLevel::View,
                cluster_sets: ClusterSetSelection::Named(btreeset! {"prod".to_string()}),
            }))
        );
        assert_eq!(RuleExtractor::admin().extract(&role), Ok(None));
    }

    #[test]
    fn wildcards_grant_all_sets() {
        let role = mk_role("cluster-admin", vec![mk_rule(&["*"], &["*"], &["*"], &[])]);
        for level in AccessLevel::ALL {
            assert_eq!(
                RuleExtractor::for_level(level).extract(&role),
                Ok(Some(Grant {
                    level,
                    cluster_sets: ClusterSetSelection::All,
                }))
            );
        }

        // A wildcard rule absorbs any named rules.
        let role = mk_role(
            "mixed",
            vec![
                mk_rule(&["*"], &["managedclustersets"], &["get"], &["prod"]),
                mk_rule(&["*"], &["managedclustersets"], &["get"], &[]),
            ],
        );
        assert_eq!(
            RuleExtractor::view().extract(&role).map(|g| g.map(|g| g.cluster_sets)),
            Ok(Some(ClusterSetSelection::All))
        );
    }

    #[test]
    fn unrelated_rules_grant_nothing() {
        let role = mk_role(
            "pods",
            vec![mk_rule(&[""], &["pods"], &["get"], &[])],
        );
        assert_eq!(RuleExtractor::view().extract(&role), Ok(None));
        assert_eq!(RuleExtractor::admin().extract(&mk_role("empty", vec![])), Ok(None));
    }

    #[test]
    fn invalid_names_are_malformed() {
        let role = mk_role(
            "bad",
            vec![
                mk_rule(&["rbac.authorization.k8s.io"], &["roles"], &["get"], &[]),
                mk_rule(&["*"], &["managedclustersets"], &["get"], &["Prod_1"]),
            ],
        );
        assert_eq!(
            RuleExtractor::view().extract(&role),
            Err(MalformedPolicy::InvalidName {
                rule: 1,
                name: "Prod_1".to_string()
            })
        );

        let role = mk_role(
            "empty-name",
            vec![mk_rule(&["*"], &["managedclustersets"], &["get"], &[""])],
        );
        assert_eq!(
            RuleExtractor::view().extract(&role),
            Err(MalformedPolicy::EmptyName { rule: 0 })
        );
    }

    #[test]
    fn dns_subdomains() {
        assert!(is_dns_subdomain("prod"));
        assert!(is_dns_subdomain("prod-1.example"));
        assert!(!is_dns_subdomain("-prod"));
        assert!(!is_dns_subdomain("prod."));
        assert!(!is_dns_subdomain("Prod"));
        assert!(!is_dns_subdomain(&"a".repeat(254)));
    }
}
