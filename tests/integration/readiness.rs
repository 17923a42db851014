use crate::*;

use chordcast_core::message::Role;

#[tokio::test]
async fn readiness_needs_the_whole_ring() {
    let cluster = Cluster::start(THREE).await.unwrap();
    let t1 = cluster.topic_owned_by("dht1");
    let t2 = cluster.topic_owned_by("dht2");

    let mut far = cluster.client("dht3").await.unwrap();
    assert!(!far.is_ready().await.unwrap());

    let mut c1 = cluster.client("dht1").await.unwrap();
    c1.register(Role::Publisher, registrant("pub1", 7001), vec![t1])
        .await
        .unwrap();
    // Each node on its own sees at most one side of the quorum.
    assert!(!far.is_ready().await.unwrap());

    let mut c2 = cluster.client("dht2").await.unwrap();
    c2.register(Role::Subscriber, registrant("sub1", 7002), vec![t2])
        .await
        .unwrap();
    assert!(far.is_ready().await.unwrap());

    for (id, handle) in &cluster.nodes {
        assert!(!handle.snapshot().local_quorum_met, "{id} alone should not meet the quorum");
    }
    assert!(cluster.node("dht3").snapshot().ready);

    cluster.shutdown().await;
}

#[tokio::test]
async fn wait_ready_polls_until_quorum() {
    let cluster = Cluster::start(THREE).await.unwrap();
    let t3 = cluster.topic_owned_by("dht3");

    let mut waiter = cluster.client("dht2").await.unwrap();
    assert!(!waiter.wait_ready(3).await.unwrap());

    let mut c = cluster.client("dht1").await.unwrap();
    c.register(Role::Publisher, registrant("pub1", 7001), vec![t3.clone()])
        .await
        .unwrap();
    c.register(Role::Subscriber, registrant("sub1", 7002), vec![t3])
        .await
        .unwrap();
    assert!(waiter.wait_ready(3).await.unwrap());

    cluster.shutdown().await;
}

#[tokio::test]
async fn concurrent_checks_on_every_node_agree() {
    let cluster = Cluster::start_with(THREE, &[], |c| c.network.peer_timeout_ms = 3000)
        .await
        .unwrap();
    let t1 = cluster.topic_owned_by("dht1");
    let t2 = cluster.topic_owned_by("dht2");

    let mut c = cluster.client("dht1").await.unwrap();
    c.register(Role::Publisher, registrant("pub1", 7001), vec![t1])
        .await
        .unwrap();
    c.register(Role::Subscriber, registrant("sub1", 7002), vec![t2])
        .await
        .unwrap();

    let mut a = cluster.client("dht1").await.unwrap();
    let mut b = cluster.client("dht2").await.unwrap();
    let mut d = cluster.client("dht3").await.unwrap();
    let started = std::time::Instant::now();
    // Three censuses cross on every peer link at once.
    let (ra, rb, rd) = tokio::join!(a.is_ready(), b.is_ready(), d.is_ready());
    let elapsed = started.elapsed();

    assert!(ra.unwrap() && rb.unwrap() && rd.unwrap());
    assert!(elapsed < std::time::Duration::from_secs(2), "censuses took {elapsed:?}");

    cluster.shutdown().await;
}
