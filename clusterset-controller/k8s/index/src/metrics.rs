use crate::{grants::Rebuild, GrantsReader};
use clusterset_controller_core::Memberships;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{counter::Counter, gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    rebuilds: Counter,
    malformed_roles: Counter,
}

#[derive(Debug)]
struct GrantsSize(GrantsReader);

#[derive(Debug)]
struct MembershipSize(Memberships);

pub fn register_grants(reg: &mut Registry, grants: GrantsReader) {
    reg.register_collector(Box::new(GrantsSize(grants)));
}

pub fn register_memberships(reg: &mut Registry, memberships: Memberships) {
    reg.register_collector(Box::new(MembershipSize(memberships)));
}

// === impl CacheMetrics ===

impl CacheMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let rebuilds = Counter::default();
        reg.register(
            "rebuilds",
            "Total number of full grant rebuilds",
            rebuilds.clone(),
        );

        let malformed_roles = Counter::default();
        reg.register(
            "malformed_roles",
            "Total number of ClusterRoles skipped by rebuilds because they were malformed",
            malformed_roles.clone(),
        );

        Self {
            rebuilds,
            malformed_roles,
        }
    }

    pub(crate) fn record_rebuild(&self, rebuild: &Rebuild) {
        self.rebuilds.inc();
        self.malformed_roles.inc_by(rebuild.skipped_roles as u64);
    }
}

impl Collector for GrantsSize {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let (cluster_sets, subjects) = self.0.sizes();

        let cluster_sets_encoder = encoder.encode_descriptor(
            "cluster_sets",
            "The number of ClusterSets with at least one granted subject",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(cluster_sets as i64).encode(cluster_sets_encoder)?;

        let subjects_encoder = encoder.encode_descriptor(
            "subjects",
            "The number of ClusterSet-subject grants",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(subjects as i64).encode(subjects_encoder)?;
        Ok(())
    }
}

impl Collector for MembershipSize {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let mut sets_encoder = encoder.encode_descriptor(
            "cluster_sets",
            "The number of ClusterSets with at least one member",
            None,
            MetricType::Gauge,
        )?;
        for (kind, mapper) in [
            ("cluster", &self.0.clusters),
            ("namespaced", &self.0.namespaced),
        ] {
            let labels = [("member_kind", kind)];
            let sets = ConstGauge::new(mapper.len() as i64);
            sets.encode(sets_encoder.encode_family(&labels)?)?;
        }

        let mut members_encoder = encoder.encode_descriptor(
            "members",
            "The number of resources that belong to at least one ClusterSet",
            None,
            MetricType::Gauge,
        )?;
        for (kind, mapper) in [
            ("cluster", &self.0.clusters),
            ("namespaced", &self.0.namespaced),
        ] {
            let labels = [("member_kind", kind)];
            let members = ConstGauge::new(mapper.object_count() as i64);
            members.encode(members_encoder.encode_family(&labels)?)?;
        }
        Ok(())
    }
}
