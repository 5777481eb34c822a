//! Client stack against a real server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use broadcaster::BroadcastHub;
use counter_client::{Callbacks, ClientConfig, ClientError, SyncClient};
use counter_core::Counter;
use counter_server::AppState;
use database::Database;

async fn start() -> (String, BroadcastHub) {
    let db = Database::in_memory().await.unwrap();
    let hub = BroadcastHub::default();
    let state = AppState::new(db, hub.clone());
    let addr = counter_server::spawn(SocketAddr::from(([127, 0, 0, 1], 0)), state)
        .await
        .unwrap();
    (format!("http://{}", addr), hub)
}

async fn client(base: &str) -> SyncClient {
    SyncClient::connect(ClientConfig::new(base)).await.unwrap()
}

async fn wait_for_connections(hub: &BroadcastHub, expected: usize) {
    for _ in 0..300 {
        if hub.connection_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never reached {} connections", expected);
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn recorder() -> (Arc<Mutex<Vec<Counter>>>, impl Fn(Counter) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |counter: Counter| sink.lock().unwrap().push(counter))
}

#[tokio::test]
async fn test_offline_increments_arrive_as_one_delta() {
    let (base, hub) = start().await;
    let writer = client(&base).await;
    let created = writer.engine().create("Laps", None).await.unwrap();
    let id = created.counter.unwrap().id;

    let observer = client(&base).await;
    let (seen, record) = recorder();
    observer.listen(Callbacks::new().on_incremented(record));
    wait_for_connections(&hub, 2).await;

    writer.engine().monitor().set_offline();
    for _ in 0..3 {
        assert!(writer.engine().increment(&id).await.unwrap().queued);
    }
    assert_eq!(writer.engine().counter(&id).unwrap().value, 3);
    assert_eq!(writer.engine().pending_count(), 1);
    // Nothing reached the server yet
    assert_eq!(writer.api().get(&id).await.unwrap().value, 0);

    let report = writer.probe().await.unwrap();
    assert_eq!(report.replayed, 1);
    assert!(report.resynced);
    assert_eq!(writer.engine().pending_count(), 0);
    assert_eq!(writer.api().get(&id).await.unwrap().value, 3);

    eventually("observer sees the delta", || !seen.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].value, 3);
    assert_eq!(observer.engine().counter(&id).unwrap().value, 3);
}

#[tokio::test]
async fn test_changes_reach_other_clients() {
    let (base, hub) = start().await;
    let a = client(&base).await;
    let b = client(&base).await;
    let (created_seen, record) = recorder();
    b.listen(Callbacks::new().on_created(record));
    wait_for_connections(&hub, 2).await;

    let counter = a.engine().create("Shared", Some(3)).await.unwrap().counter.unwrap();
    a.engine().increment(&counter.id).await.unwrap();

    eventually("b has the counter at 1", || {
        b.engine().counter(&counter.id).map(|c| c.value) == Some(1)
    })
    .await;
    assert_eq!(created_seen.lock().unwrap()[0].name, "Shared");

    a.engine().delete(&counter.id).await.unwrap();
    eventually("b drops the counter", || b.engine().counter(&counter.id).is_none()).await;
}

#[tokio::test]
async fn test_unparseable_message_is_dropped() {
    let (base, hub) = start().await;
    let a = client(&base).await;
    let (seen, record) = recorder();
    a.listen(Callbacks::new().on_incremented(record));
    wait_for_connections(&hub, 1).await;

    hub.publish_raw(Arc::from("not json")).await;

    let counter = a.engine().create("Still here", None).await.unwrap().counter.unwrap();
    a.api().increment(&counter.id).await.unwrap();

    eventually("increment after bad message", || !seen.lock().unwrap().is_empty()).await;
    assert!(a.subscriber().is_connected());
    assert_eq!(hub.connection_count().await, 1);
}

#[tokio::test]
async fn test_colors_are_unique() {
    let (base, _hub) = start().await;
    let a = client(&base).await;
    let b = client(&base).await;

    let alice = a.colors().assign("alice", "#FF0000").await.unwrap();
    assert_eq!(alice.color, "#ff0000");
    assert_eq!(a.colors().cached("alice").as_deref(), Some("#ff0000"));

    let taken = b.colors().assign("bob", "ff0000").await.unwrap_err();
    assert!(taken.is_conflict());

    assert!(matches!(
        b.colors().assign("bob", "#12345").await,
        Err(ClientError::Validation(_))
    ));

    assert_eq!(
        b.colors().color_for("alice").await.unwrap().as_deref(),
        Some("#ff0000")
    );
    assert_eq!(b.colors().color_for("nobody").await.unwrap(), None);

    a.colors().release("alice").await.unwrap();
    b.colors().assign("bob", "#ff0000").await.unwrap();
    assert_eq!(b.colors().refresh().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_queue_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let queue_path = dir.path().join("queue.json");

    // Nothing listens on port 1
    let offline = ClientConfig::new("http://127.0.0.1:1").with_queue_path(&queue_path);
    let first = SyncClient::connect(offline).await.unwrap();
    assert!(!first.engine().monitor().is_online());

    let created = first.engine().create("Saved", Some(2)).await.unwrap();
    assert!(created.queued);
    assert_eq!(first.engine().pending_count(), 1);
    drop(first);

    let (base, _hub) = start().await;
    let second = SyncClient::connect(ClientConfig::new(&base).with_queue_path(&queue_path))
        .await
        .unwrap();

    assert_eq!(second.engine().pending_count(), 0);
    let names: Vec<String> = second
        .engine()
        .counters()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Saved"]);

    // Same id the offline client generated
    let id = created.counter.unwrap().id;
    assert_eq!(second.api().get(&id).await.unwrap().daily_goal, Some(2));
}
