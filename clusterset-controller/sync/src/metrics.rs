use crate::Tick;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

#[derive(Clone, Debug)]
pub struct SyncMetrics {
    ticks: Counter,
    skipped_ticks: Counter,
    tick_duration: Histogram,
    writes: Family<OpLabels, Counter>,
    failures: Family<OpLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct OpLabels {
    op: &'static str,
}

impl SyncMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let ticks = Counter::default();
        reg.register(
            "ticks",
            "Total number of reconciliation ticks run by the leader",
            ticks.clone(),
        );

        let skipped_ticks = Counter::default();
        reg.register(
            "skipped_ticks",
            "Total number of reconciliation ticks skipped because this replica is not the leader",
            skipped_ticks.clone(),
        );

        let tick_duration = Histogram::new([0.01, 0.1, 1.0, 10.0, 60.0].into_iter());
        reg.register_with_unit(
            "tick_duration",
            "Histogram of the time taken to reconcile every target",
            Unit::Seconds,
            tick_duration.clone(),
        );

        let writes = Family::<OpLabels, Counter>::default();
        reg.register(
            "writes",
            "Total number of object writes, by operation",
            writes.clone(),
        );

        let failures = Family::<OpLabels, Counter>::default();
        reg.register(
            "failures",
            "Total number of failed store operations, by operation",
            failures.clone(),
        );

        Self {
            ticks,
            skipped_ticks,
            tick_duration,
            writes,
            failures,
        }
    }

    pub(crate) fn skipped(&self) {
        self.skipped_ticks.inc();
    }

    pub(crate) fn failed(&self, op: &'static str) {
        self.failures.get_or_create(&OpLabels { op }).inc();
    }

    pub(crate) fn record_tick(&self, tick: &Tick, elapsed: time::Duration) {
        self.ticks.inc();
        self.tick_duration.observe(elapsed.as_secs_f64());
        for (op, n) in [
            ("create", tick.created),
            ("update", tick.updated),
            ("delete", tick.deleted),
        ] {
            if n > 0 {
                self.writes.get_or_create(&OpLabels { op }).inc_by(n as u64);
            }
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}
