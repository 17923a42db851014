use crate::*;

use chordcast_core::message::{RegisterRequest, Request, Response, Role, Status};

#[tokio::test]
async fn registration_is_split_across_topic_owners() {
    let cluster = Cluster::start(THREE).await.unwrap();
    let t1 = cluster.topic_owned_by("dht1");
    let t2 = cluster.topic_owned_by("dht2");
    let t3 = cluster.topic_owned_by("dht3");

    let mut client = cluster.client("dht1").await.unwrap();
    let resp = client
        .register(
            Role::Publisher,
            registrant("pub1", 7001),
            vec![t1.clone(), t2.clone(), t3.clone()],
        )
        .await
        .unwrap();
    assert_eq!(resp.status, Status::Success);

    assert_eq!(stored(&cluster, "dht1"), vec![("pub1".to_string(), vec![t1])]);
    assert_eq!(stored(&cluster, "dht2"), vec![("pub1".to_string(), vec![t2])]);
    assert_eq!(stored(&cluster, "dht3"), vec![("pub1".to_string(), vec![t3])]);

    cluster.shutdown().await;
}

#[tokio::test]
async fn entry_node_does_not_need_to_own_the_topic() {
    let cluster = Cluster::start(THREE).await.unwrap();
    let t3 = cluster.topic_owned_by("dht3");

    let mut client = cluster.client("dht2").await.unwrap();
    let resp = client
        .register(Role::Subscriber, registrant("sub1", 7002), vec![t3.clone()])
        .await
        .unwrap();
    assert_eq!(resp.status, Status::Success);

    assert!(stored(&cluster, "dht2").is_empty());
    assert_eq!(stored(&cluster, "dht3"), vec![("sub1".to_string(), vec![t3])]);
    assert_eq!(cluster.node("dht3").snapshot().subscribers, 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn capacity_limit_is_reported_to_the_registrant() {
    let cluster = Cluster::start_with(THREE, &[], |c| c.capacity.max_publishers = 1)
        .await
        .unwrap();
    let t2 = cluster.topic_owned_by("dht2");

    let mut client = cluster.client("dht1").await.unwrap();
    let first = client
        .register(Role::Publisher, registrant("pub1", 7001), vec![t2.clone()])
        .await
        .unwrap();
    assert_eq!(first.status, Status::Success);

    let second = client
        .register(Role::Publisher, registrant("pub2", 7002), vec![t2])
        .await
        .unwrap();
    assert_eq!(second.status, Status::Failure);
    assert_eq!(
        second.reason.as_deref(),
        Some("Max publishers already reached on this node")
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn unknown_role_is_refused() {
    let cluster = Cluster::start(THREE).await.unwrap();
    let mut client = cluster.client("dht1").await.unwrap();

    let mut req = RegisterRequest::new(Role::Publisher, registrant("odd", 7000), vec!["x".into()]);
    req.role = 9;
    match client.request(Request::Register(req)).await.unwrap() {
        Response::Register(r) => assert_eq!(r.status, Status::Failure),
        other => panic!("unexpected reply {other:?}"),
    }
    for (id, _) in &cluster.nodes {
        assert!(stored(&cluster, id).is_empty());
    }

    cluster.shutdown().await;
}
