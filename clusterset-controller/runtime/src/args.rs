use crate::{
    core::{AccessLevel, Grants, Memberships},
    index::{
        self, AccessGrantCache, CacheMetrics, ClusterTargets, MembershipIndex, NamespaceTargets,
        RuleExtractor,
    },
    index_list::IndexList,
    k8s::{self, Client, Resource},
    lease,
    sync::{self, BindingSyncer, Leader, RoleSyncer, Scope, SyncMetrics},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "clusterset-controller",
    about = "Propagates ClusterSet access grants to cluster and namespace bindings"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "clusterset=info,warn",
        env = "CLUSTERSET_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// How often cluster roles and cluster and namespace bindings are reconciled.
    #[clap(long, default_value = "5s", value_parser = parse_duration)]
    sync_interval: Duration,

    /// How often the admin and view grants are rebuilt from scratch.
    #[clap(long, default_value = "5s", value_parser = parse_duration)]
    cache_interval: Duration,

    #[clap(long, default_value = "open-cluster-management")]
    controller_namespace: String,

    #[clap(long, default_value = "clusterset-controller")]
    controller_deployment_name: String,

    /// Writes bindings without claiming the write lease. Only one replica may run.
    #[clap(long)]
    leader_election_disabled: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            sync_interval,
            cache_interval,
            controller_namespace,
            controller_deployment_name,
            leader_election_disabled,
        } = self;

        // Build the indexes that hold ClusterSet membership and grants.
        let memberships = Memberships::default();
        let membership_index = MembershipIndex::shared(memberships.clone());

        let mut prom = <Registry>::default();

        let admin_reg = prom.sub_registry_with_prefix("admin_grants");
        let (admin_grants, admin_cache) = AccessGrantCache::shared(
            AccessLevel::Admin,
            RuleExtractor::admin(),
            CacheMetrics::register(admin_reg),
        );
        index::metrics::register_grants(admin_reg, admin_grants.clone());

        let view_reg = prom.sub_registry_with_prefix("view_grants");
        let (view_grants, view_cache) = AccessGrantCache::shared(
            AccessLevel::View,
            RuleExtractor::view(),
            CacheMetrics::register(view_reg),
        );
        index::metrics::register_grants(view_reg, view_grants.clone());

        index::metrics::register_memberships(
            prom.sub_registry_with_prefix("membership_index"),
            memberships.clone(),
        );
        let cluster_sync_metrics =
            SyncMetrics::register(prom.sub_registry_with_prefix("cluster_bindings"));
        let namespace_sync_metrics =
            SyncMetrics::register(prom.sub_registry_with_prefix("namespace_bindings"));
        let role_sync_metrics =
            SyncMetrics::register(prom.sub_registry_with_prefix("cluster_roles"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let leader = if leader_election_disabled {
            let hostname = std::env::var("HOSTNAME")
                .unwrap_or_else(|_| controller_deployment_name.clone());
            info!(%hostname, "Leader election disabled");
            Leader::local(hostname)
        } else {
            let hostname = std::env::var("HOSTNAME")
                .context("Failed to fetch `HOSTNAME` environment variable")?;
            let claims = lease::init(
                &runtime,
                &controller_namespace,
                &controller_deployment_name,
                &hostname,
            )
            .await?;
            Leader::new(claims, hostname)
        };

        // Spawn resource watches.

        let cluster_sets = runtime.watch_all::<k8s::ManagedClusterSet>(watcher::Config::default());
        let cluster_sets_indexes = IndexList::new(membership_index.clone())
            .push(admin_cache.clone())
            .push(view_cache.clone())
            .shared();
        tokio::spawn(
            kubert::index::cluster(cluster_sets_indexes, cluster_sets)
                .instrument(info_span!("managedclustersets")),
        );

        let roles = runtime.watch_all::<k8s::ClusterRole>(watcher::Config::default());
        let roles_indexes = IndexList::new(admin_cache.clone())
            .push(view_cache.clone())
            .shared();
        tokio::spawn(
            kubert::index::cluster(roles_indexes, roles).instrument(info_span!("clusterroles")),
        );

        let role_bindings =
            runtime.watch_all::<k8s::ClusterRoleBinding>(watcher::Config::default());
        let role_bindings_indexes = IndexList::new(admin_cache.clone())
            .push(view_cache.clone())
            .shared();
        tokio::spawn(
            kubert::index::cluster(role_bindings_indexes, role_bindings)
                .instrument(info_span!("clusterrolebindings")),
        );

        let clusters = runtime.watch_all::<k8s::ManagedCluster>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(membership_index.clone(), clusters)
                .instrument(info_span!("managedclusters")),
        );

        if api_resource_exists::<k8s::ClusterDeployment>(&runtime.client()).await {
            let deployments =
                runtime.watch_all::<k8s::ClusterDeployment>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(membership_index.clone(), deployments)
                    .instrument(info_span!("clusterdeployments")),
            );
        } else {
            tracing::warn!(
                "clusterdeployments.hive.openshift.io resource kind not found, skipping watches"
            );
        }

        if api_resource_exists::<k8s::ClusterPool>(&runtime.client()).await {
            let pools = runtime.watch_all::<k8s::ClusterPool>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(membership_index.clone(), pools)
                    .instrument(info_span!("clusterpools")),
            );
        } else {
            tracing::warn!(
                "clusterpools.hive.openshift.io resource kind not found, skipping watches"
            );
        }

        if api_resource_exists::<k8s::ClusterClaim>(&runtime.client()).await {
            let claims = runtime.watch_all::<k8s::ClusterClaim>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(membership_index.clone(), claims)
                    .instrument(info_span!("clusterclaims")),
            );
        } else {
            tracing::warn!(
                "clusterclaims.hive.openshift.io resource kind not found, skipping watches"
            );
        }

        // Spawn the grant rebuilds.
        tokio::spawn(
            AccessGrantCache::run(admin_cache, cache_interval, runtime.shutdown_handle())
                .instrument(info_span!("grants", level = %AccessLevel::Admin)),
        );
        tokio::spawn(
            AccessGrantCache::run(view_cache, cache_interval, runtime.shutdown_handle())
                .instrument(info_span!("grants", level = %AccessLevel::View)),
        );

        // Spawn the syncers.
        let role_syncer: sync::ClusterRoleSyncer = RoleSyncer::new(
            ClusterTargets::new(membership_index.clone()),
            sync::ClusterRoles::new(runtime.client()),
            role_sync_metrics,
        );
        tokio::spawn(
            role_syncer
                .run(sync_interval, leader.clone(), runtime.shutdown_handle())
                .instrument(info_span!("cluster_roles")),
        );

        let grants = Grants::new(Arc::new(admin_grants), Arc::new(view_grants));

        let cluster_syncer: sync::ClusterBindingSyncer = BindingSyncer::new(
            Scope::Cluster,
            ClusterTargets::new(membership_index.clone()),
            sync::ClusterRoleBindings::new(runtime.client()),
            memberships.clone(),
            grants.clone(),
            cluster_sync_metrics,
        );
        tokio::spawn(
            cluster_syncer
                .run(sync_interval, leader.clone(), runtime.shutdown_handle())
                .instrument(info_span!("cluster_bindings")),
        );

        let namespace_syncer: sync::NamespaceBindingSyncer = BindingSyncer::new(
            Scope::Namespace,
            NamespaceTargets::new(membership_index),
            sync::RoleBindings::new(runtime.client()),
            memberships,
            grants,
            namespace_sync_metrics,
        );
        tokio::spawn(
            namespace_syncer
                .run(sync_interval, leader, runtime.shutdown_handle())
                .instrument(info_span!("namespace_bindings")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Parses durations like `500ms`, `5s`, `1m` or `1h`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing duration unit: {s:?}"))?;
    let (num, unit) = s.split_at(split);
    let num = num
        .parse::<u64>()
        .map_err(|_| format!("invalid duration: {s:?}"))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 60 * 60),
        _ => return Err(format!("invalid duration unit: {unit:?}")),
    };
    if duration.is_zero() {
        return Err("duration must be positive".to_string());
    }
    Ok(duration)
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
