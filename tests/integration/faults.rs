use crate::*;

use chordcast_core::message::{Role, Status};

#[tokio::test]
async fn unreachable_owner_fails_the_registration() {
    let cluster = Cluster::start_with(THREE, &["dht3"], |c| c.network.peer_timeout_ms = 300)
        .await
        .unwrap();
    let t2 = cluster.topic_owned_by("dht2");
    let t3 = cluster.topic_owned_by("dht3");

    let mut c = cluster.client("dht1").await.unwrap();
    let resp = c
        .register(Role::Publisher, registrant("pub1", 7001), vec![t2.clone(), t3])
        .await
        .unwrap();
    assert_eq!(resp.status, Status::Failure);
    assert!(resp.reason.unwrap().contains("dht3"));

    // The reachable part of the registration still took effect.
    assert_eq!(stored(&cluster, "dht2"), vec![("pub1".to_string(), vec![t2])]);
    assert_eq!(cluster.node("dht1").snapshot().pending_forwards, 0);

    cluster.shutdown().await;
}

#[tokio::test]
async fn census_past_a_dead_node_counts_what_it_reached() {
    let cluster = Cluster::start_with(THREE, &["dht3"], |c| c.network.peer_timeout_ms = 300)
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

    assert!(c.is_ready().await.unwrap());

    cluster.shutdown().await;
}

#[tokio::test]
async fn a_node_survives_a_client_hanging_up_mid_request() {
    let cluster = Cluster::start(THREE).await.unwrap();
    let addr = cluster.node("dht1").local_addr();

    {
        use tokio::io::AsyncWriteExt;
        let mut raw = tokio::net::TcpStream::connect(addr).await.unwrap();
        // A header promising a payload that never arrives.
        raw.write_all(&[0x01, 0x01, 0x00, 0x00]).await.unwrap();
    }

    let mut c = cluster.client("dht1").await.unwrap();
    assert!(!c.is_ready().await.unwrap());

    cluster.shutdown().await;
}
