//! Client, connection and invocation behaviour against a mock member.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use gridlink_client::codec::map;
use gridlink_client::{ConnectionEvent, GridClient, GridError, LifecycleEvent};
use tokio::sync::broadcast;

use crate::common::{eventually, init_tracing, unique_name, MockMember, MockOptions};

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_connect_and_discover_cluster() {
    init_tracing();
    let member = MockMember::start().await;
    let client = member.client().await;

    assert!(client.is_running());
    assert_eq!(client.connection_count(), 1);
    eventually("the member list", || client.member_count() == 1).await;
    assert_eq!(client.members()[0].uuid(), member.uuid());
    assert_eq!(client.partition_service().partition_count(), common::PARTITION_COUNT);
    eventually("the partition table", || {
        client.partition_service().owner_of(0) == Some(member.uuid())
    })
    .await;

    client.shutdown().await.unwrap();
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_wrong_cluster_name_is_rejected() {
    let member = MockMember::start_with(MockOptions {
        cluster_name: "prod".to_string(),
        ..Default::default()
    })
    .await;

    let result = GridClient::new(member.config_builder().build().unwrap()).await;
    assert!(matches!(result, Err(GridError::Authentication(_))));
}

#[tokio::test]
async fn test_map_operations() {
    let member = MockMember::start().await;
    let client = member.client().await;
    let map = client.get_map::<String, i64>(&unique_name("ops")).await.unwrap();

    assert_eq!(map.put("a".to_string(), 1).await.unwrap(), None);
    assert_eq!(map.put("a".to_string(), 2).await.unwrap(), Some(1));
    assert_eq!(map.put_if_absent("a".to_string(), 3).await.unwrap(), Some(2));
    assert_eq!(map.put_if_absent("b".to_string(), 4).await.unwrap(), None);
    assert_eq!(map.replace("c".to_string(), 5).await.unwrap(), None);
    assert_eq!(map.replace("b".to_string(), 6).await.unwrap(), Some(4));
    map.set("c".to_string(), 7).await.unwrap();
    assert_eq!(map.size().await.unwrap(), 3);

    assert!(map.contains_key(&"c".to_string()).await.unwrap());
    assert!(map.evict(&"c".to_string()).await.unwrap());
    assert!(!map.contains_key(&"c".to_string()).await.unwrap());

    assert_eq!(map.remove(&"a".to_string()).await.unwrap(), Some(2));
    map.delete(&"b".to_string()).await.unwrap();
    assert_eq!(map.get(&"b".to_string()).await.unwrap(), None);

    map.put("d".to_string(), 8).await.unwrap();
    map.evict_all().await.unwrap();
    assert_eq!(map.size().await.unwrap(), 0);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bulk_and_conditional_operations() {
    let member = MockMember::start().await;
    let client = member.client().await;
    let map = client.get_map::<String, i64>(&unique_name("bulk")).await.unwrap();

    let entries: HashMap<String, i64> = (0..20).map(|i| (format!("k{i}"), i)).collect();
    map.put_all(entries.clone()).await.unwrap();
    assert_eq!(map.size().await.unwrap(), 20);
    let keys: Vec<String> = entries.keys().cloned().chain(["absent".to_string()]).collect();
    assert_eq!(map.get_all(&keys).await.unwrap(), entries);
    assert!(map.get_all(&[]).await.unwrap().is_empty());

    map.set_all(HashMap::from([("k0".to_string(), 100)])).await.unwrap();
    assert!(!map.replace_if_same(&"k0".to_string(), &0, 1).await.unwrap());
    assert!(map.replace_if_same(&"k0".to_string(), &100, 1).await.unwrap());
    assert_eq!(map.get(&"k0".to_string()).await.unwrap(), Some(1));

    assert!(map.try_put("k1".to_string(), 11, Duration::from_millis(100)).await.unwrap());
    assert_eq!(map.get(&"k1".to_string()).await.unwrap(), Some(11));
    assert!(map.try_remove(&"k1".to_string(), Duration::from_millis(100)).await.unwrap());
    assert!(!map.contains_key(&"k1".to_string()).await.unwrap());

    map.put_transient("t".to_string(), 7, Some(Duration::from_secs(60))).await.unwrap();
    assert_eq!(map.get(&"t".to_string()).await.unwrap(), Some(7));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_large_message_is_fragmented() {
    let member = MockMember::start_with(MockOptions {
        max_fragment_size: Some(128),
        ..Default::default()
    })
    .await;
    let config = member
        .config_builder()
        .network(|n| n.max_fragment_size(128))
        .build()
        .unwrap();
    let client = GridClient::new(config).await.unwrap();
    let map = client.get_map::<String, Vec<u8>>(&unique_name("frag")).await.unwrap();

    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    map.put("blob".to_string(), payload.clone()).await.unwrap();
    assert_eq!(map.get(&"blob".to_string()).await.unwrap(), Some(payload));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retryable_invocation_survives_connection_loss() {
    init_tracing();
    let member = MockMember::start().await;
    let client = member.client().await;
    let mut lifecycle = client.subscribe_lifecycle();
    let map = client.get_map::<String, String>(&unique_name("reconnect")).await.unwrap();
    map.put("k".to_string(), "v".to_string()).await.unwrap();

    member.hold_responses(map::get::REQUEST_MESSAGE_TYPE);
    let reader = map.clone();
    let pending = tokio::spawn(async move { reader.get(&"k".to_string()).await });
    member.wait_for_requests(map::get::REQUEST_MESSAGE_TYPE, 1).await;

    member.stop_holding();
    member.drop_connections();

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("invocation did not complete")
        .unwrap();
    assert_eq!(result.unwrap().as_deref(), Some("v"));
    assert!(member.request_count(map::get::REQUEST_MESSAGE_TYPE) >= 2);
    assert_eq!(client.invocation_service().outstanding_count(), 0);

    let events = drain(&mut lifecycle);
    assert!(events.contains(&LifecycleEvent::ClientDisconnected));
    assert!(events.contains(&LifecycleEvent::ClientConnected));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_retryable_invocation_fails_on_connection_loss() {
    let member = MockMember::start().await;
    let client = member.client().await;
    let map = client.get_map::<String, String>(&unique_name("no-retry")).await.unwrap();

    member.hold_responses(map::put::REQUEST_MESSAGE_TYPE);
    let writer = map.clone();
    let pending = tokio::spawn(async move { writer.put("k".to_string(), "v".to_string()).await });
    member.wait_for_requests(map::put::REQUEST_MESSAGE_TYPE, 1).await;
    member.stop_holding();
    member.drop_connections();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(GridError::TargetDisconnected(_))));
    assert_eq!(member.request_count(map::put::REQUEST_MESSAGE_TYPE), 1);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_late_response_after_timeout_is_dropped() {
    let member = MockMember::start().await;
    let config = member
        .config_builder()
        .invocation(|i| i.timeout(Duration::from_millis(300)).retry_pause(Duration::from_millis(20)))
        .build()
        .unwrap();
    let client = GridClient::new(config).await.unwrap();
    let map = client.get_map::<String, String>(&unique_name("late")).await.unwrap();
    map.put("k".to_string(), "v1".to_string()).await.unwrap();

    member.hold_responses(map::get::REQUEST_MESSAGE_TYPE);
    let result = map.get(&"k".to_string()).await;
    assert!(matches!(result, Err(GridError::Timeout(_))));

    member.stop_holding();
    map.put("k".to_string(), "v2".to_string()).await.unwrap();
    member.release_held();

    assert_eq!(map.get(&"k".to_string()).await.unwrap().as_deref(), Some("v2"));
    assert_eq!(client.invocation_service().outstanding_count(), 0);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_listener_reregistered_after_reconnect() {
    let member = MockMember::start().await;
    let name = unique_name("relisten");
    let client = member.near_cached_client(&name).await;
    let map = client.get_map::<String, String>(&name).await.unwrap();
    assert_eq!(member.subscriber_count(&name), 1);

    member.drop_connections();
    eventually("the listener to be registered again", || member.subscriber_count(&name) == 1).await;

    map.put("k".to_string(), "v".to_string()).await.unwrap();
    assert_eq!(map.get(&"k".to_string()).await.unwrap().as_deref(), Some("v"));
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_fails_pending_invocations() {
    let member = MockMember::start().await;
    let client = member.client().await;
    let map = client.get_map::<String, String>(&unique_name("shutdown")).await.unwrap();

    member.hold_responses(map::get::REQUEST_MESSAGE_TYPE);
    let reader = map.clone();
    let pending = tokio::spawn(async move { reader.get(&"k".to_string()).await });
    member.wait_for_requests(map::get::REQUEST_MESSAGE_TYPE, 1).await;

    client.shutdown().await.unwrap();
    let result = pending.await.unwrap();
    assert!(matches!(
        result,
        Err(GridError::ClientShutdown(_)) | Err(GridError::TargetDisconnected(_))
    ));
    assert!(matches!(
        map.get(&"k".to_string()).await,
        Err(GridError::ClientShutdown(_))
    ));
}

#[tokio::test]
async fn test_lifecycle_events_on_shutdown() {
    let member = MockMember::start().await;
    let client = member.client().await;
    let mut lifecycle = client.subscribe_lifecycle();

    client.shutdown().await.unwrap();
    client.shutdown().await.unwrap();

    assert_eq!(
        drain(&mut lifecycle),
        vec![LifecycleEvent::ShuttingDown, LifecycleEvent::Shutdown]
    );
}

#[tokio::test]
async fn test_client_shuts_down_when_cluster_is_gone() {
    let member = MockMember::start().await;
    let config = member
        .config_builder()
        .retry(|r| {
            r.initial_backoff(Duration::from_millis(10))
                .max_backoff(Duration::from_millis(20))
                .cluster_connect_timeout(Duration::from_millis(200))
        })
        .build()
        .unwrap();
    let client = GridClient::new(config).await.unwrap();

    drop(member);
    eventually("the client to shut down", || !client.is_running()).await;
}

#[tokio::test]
async fn test_silent_member_connection_is_closed_by_heartbeat() {
    let member = MockMember::start_with(MockOptions {
        ignore_pings: true,
        ..Default::default()
    })
    .await;
    let config = member
        .config_builder()
        .network(|n| {
            n.heartbeat_interval(Duration::from_millis(50))
                .heartbeat_timeout(Duration::from_millis(300))
        })
        .build()
        .unwrap();
    let client = GridClient::new(config).await.unwrap();
    let mut events = client.subscribe_connection_events();

    let reason = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Disconnected { error, .. }) => break error,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("connection was not closed");

    assert!(reason.unwrap_or_default().contains("heartbeat"));
    assert!(member.request_count(gridlink_client::codec::client::ping::REQUEST_MESSAGE_TYPE) > 0);
    client.shutdown().await.unwrap();
}
