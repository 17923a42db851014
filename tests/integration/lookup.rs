use crate::*;

use chordcast_core::message::{Dissemination, Role, Status};

#[tokio::test]
async fn lookup_waits_for_readiness_then_finds_publishers() {
    let cluster = Cluster::start(THREE).await.unwrap();
    let t1 = cluster.topic_owned_by("dht1");
    let t2 = cluster.topic_owned_by("dht2");

    let mut c1 = cluster.client("dht1").await.unwrap();
    c1.register(Role::Publisher, registrant("pub1", 7001), vec![t1.clone()])
        .await
        .unwrap();
    c1.register(Role::Publisher, registrant("pub2", 7002), vec![t2.clone()])
        .await
        .unwrap();

    let mut c3 = cluster.client("dht3").await.unwrap();
    let early = c3.lookup(vec![t1.clone()]).await.unwrap();
    assert_eq!(early.status, Status::CheckAgain);
    assert!(early.publishers.is_empty());

    c3.register(Role::Subscriber, registrant("sub1", 7003), vec![t1.clone()])
        .await
        .unwrap();

    let found = c3.lookup_when_ready(vec![t1], 20).await.unwrap();
    assert_eq!(found.status, Status::Success);
    assert_eq!(found.publishers, vec![registrant("pub1", 7001)]);

    let none = c3.lookup(vec!["nobody-publishes-this".into()]).await.unwrap();
    assert_eq!(none.status, Status::Success);
    assert!(none.publishers.is_empty());

    cluster.shutdown().await;
}

#[tokio::test]
async fn lookup_all_collects_every_publisher() {
    let cluster = Cluster::start(THREE).await.unwrap();
    let topics: Vec<String> = ["dht1", "dht2", "dht3"]
        .iter()
        .map(|id| cluster.topic_owned_by(id))
        .collect();

    let mut c = cluster.client("dht2").await.unwrap();
    for (i, topic) in topics.iter().enumerate() {
        let id = format!("pub{}", i + 1);
        c.register(Role::Publisher, registrant(&id, 7000 + i as u16), vec![topic.clone()])
            .await
            .unwrap();
    }
    // A publisher split over two owners is still one publisher.
    c.register(Role::Publisher, registrant("pub1", 7000), topics.clone())
        .await
        .unwrap();
    c.register(Role::Subscriber, registrant("sub1", 7100), vec![topics[0].clone()])
        .await
        .unwrap();

    let all = cluster.client("dht1").await.unwrap().lookup_all().await.unwrap();
    assert_eq!(all.status, Status::Success);
    let mut ids: Vec<_> = all.publishers.iter().map(|p| p.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["pub1", "pub2", "pub3"]);

    cluster.shutdown().await;
}

#[tokio::test]
async fn broker_dissemination_hands_out_brokers() {
    let cluster = Cluster::start_with(THREE, &[], |c| c.dissemination = Dissemination::Broker)
        .await
        .unwrap();
    let t1 = cluster.topic_owned_by("dht1");

    let mut c = cluster.client("dht2").await.unwrap();
    c.register(Role::Publisher, registrant("pub1", 7001), vec![t1.clone()])
        .await
        .unwrap();
    c.register(Role::Subscriber, registrant("sub1", 7002), vec![t1.clone()])
        .await
        .unwrap();

    let mut c3 = cluster.client("dht3").await.unwrap();
    // Publishers and subscribers alone do not satisfy a broker quorum.
    assert!(!c3.is_ready().await.unwrap());

    c3.register(Role::Broker, registrant("broker1", 7500), vec![])
        .await
        .unwrap();
    assert!(c3.is_ready().await.unwrap());

    let resp = cluster.client("dht1").await.unwrap().lookup(vec![t1]).await.unwrap();
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.publishers, vec![registrant("broker1", 7500)]);

    cluster.shutdown().await;
}
