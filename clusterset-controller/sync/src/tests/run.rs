use super::*;
use crate::Leader;
use chrono::{DateTime, Utc};
use kubert::lease::Claim;
use tokio::{sync::watch, time};

const INTERVAL: time::Duration = time::Duration::from_secs(5);

fn seeded() -> Harness {
    let h = Harness::new();
    h.cluster_set("prod");
    h.cluster("c1", Some("prod"));
    h.grant("alice", AccessLevel::Admin, "prod", Subject::user("alice"));
    h.rebuild();
    h
}

#[tokio::test(start_paused = true)]
async fn leader_converges_until_shutdown() {
    let h = seeded();
    let (signal, shutdown) = drain::channel();
    let task = tokio::spawn(h.cluster_syncer().run(
        INTERVAL,
        Leader::local("pod-0"),
        shutdown,
    ));

    time::sleep(time::Duration::from_millis(1)).await;
    assert_eq!(h.store.bindings().len(), 1);

    h.revoke("alice");
    h.rebuild();
    time::sleep(INTERVAL).await;
    assert!(h.store.bindings().is_empty());

    signal.drain().await;
    task.await.expect("syncer task must not panic");
}

#[tokio::test(start_paused = true)]
async fn followers_do_not_write() {
    let h = seeded();
    let (claims_tx, claims) = watch::channel(Arc::new(Claim {
        holder: "pod-1".to_string(),
        expiry: DateTime::<Utc>::MAX_UTC,
    }));
    let leader = Leader::new(claims, "pod-0");
    assert!(!leader.is_leader());

    let (signal, shutdown) = drain::channel();
    let task = tokio::spawn(h.cluster_syncer().run(INTERVAL, leader, shutdown));

    time::sleep(INTERVAL * 2 + time::Duration::from_millis(1)).await;
    assert_eq!(h.store.writes(), 0);

    // Taking over the lease starts writes on the next tick.
    claims_tx
        .send(Arc::new(Claim {
            holder: "pod-0".to_string(),
            expiry: DateTime::<Utc>::MAX_UTC,
        }))
        .expect("receiver must be held by the syncer");
    time::sleep(INTERVAL).await;
    assert_eq!(h.store.writes(), 1);

    signal.drain().await;
    task.await.expect("syncer task must not panic");
}
