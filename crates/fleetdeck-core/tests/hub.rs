use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_api::events::WsEvent;
use fleetdeck_core::*;

/// Push subscriber that records what it was sent
struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PushSubscriber for Recorder {
    async fn push(&mut self, text: &str) -> Result<(), PushError> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct Broken;

#[async_trait]
impl PushSubscriber for Broken {
    async fn push(&mut self, _text: &str) -> Result<(), PushError> {
        Err(PushError("socket closed".into()))
    }
}

struct Stalled;

#[async_trait]
impl PushSubscriber for Stalled {
    async fn push(&mut self, _text: &str) -> Result<(), PushError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

fn log(line: &str) -> WsEvent {
    WsEvent::Log(line.to_string())
}

#[tokio::test]
async fn test_full_subscriber_does_not_hold_back_others() {
    let hub = HubHandle::spawn(HubActorArgs::default());
    let mut slow = hub.subscribe(1).await.unwrap();
    let mut fast = hub.subscribe(1).await.unwrap();

    let report = hub.publish(log("one")).await.unwrap();
    assert_eq!(report.delivered, 2);

    assert!(fast.receiver.recv().await.is_some());
    let report = hub.publish(log("two")).await.unwrap();
    assert_eq!(
        report,
        BroadcastReport {
            delivered: 1,
            dropped: 1,
            removed: 0,
        }
    );

    let second = fast.receiver.recv().await.unwrap();
    assert_eq!(&*second, r#"{"type":"log","data":"two"}"#);

    // the slow subscriber kept its first envelope and lost the second
    let first = slow.receiver.recv().await.unwrap();
    assert_eq!(&*first, r#"{"type":"log","data":"one"}"#);
    assert!(slow.receiver.try_recv().is_err());
    assert_eq!(hub.subscriber_count().await.unwrap(), 2);

    hub.stop().await;
}

#[tokio::test]
async fn test_closed_receiver_is_removed() {
    let hub = HubHandle::spawn(HubActorArgs::default());
    let gone = hub.subscribe(4).await.unwrap();
    let _kept = hub.subscribe(4).await.unwrap();
    drop(gone);

    let report = hub.publish(log("x")).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(hub.subscriber_count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_push_subscribers_receive_text_and_failures_are_dropped() {
    let hub = HubHandle::spawn(HubActorArgs::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    hub.register_push(Box::new(Recorder { seen: seen.clone() }))
        .await
        .unwrap();
    hub.register_push(Box::new(Broken)).await.unwrap();

    let report = hub.publish(log("hello")).await.unwrap();
    assert_eq!(report.delivered, 2);
    tokio::time::sleep(Duration::from_millis(10)).await;

    // the broken writer has given up; its queue is closed now
    let report = hub.publish(log("again")).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.removed, 1);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![
            r#"{"type":"log","data":"hello"}"#.to_string(),
            r#"{"type":"log","data":"again"}"#.to_string(),
        ]
    );
    assert_eq!(hub.subscriber_count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_push_subscriber_is_removed_after_timeout() {
    let hub = HubHandle::spawn(HubActorArgs {
        push_timeout: Duration::from_secs(5),
        push_queue: 2,
    });
    hub.register_push(Box::new(Stalled)).await.unwrap();
    let mut pull = hub.subscribe(4).await.unwrap();

    let report = hub.publish(log("tick")).await.unwrap();
    assert_eq!(report.delivered, 2);
    assert!(pull.receiver.recv().await.is_some());

    tokio::time::sleep(Duration::from_secs(6)).await;
    let report = hub.publish(log("tock")).await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(hub.subscriber_count().await.unwrap(), 1);
}

struct Hanging;

#[async_trait]
impl PushSubscriber for Hanging {
    async fn push(&mut self, _text: &str) -> Result<(), PushError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_hanging_push_subscriber_does_not_delay_broadcast() {
    let hub = HubHandle::spawn(HubActorArgs {
        push_timeout: Duration::from_secs(3600),
        push_queue: 1,
    });
    hub.register_push(Box::new(Hanging)).await.unwrap();
    let mut pull = hub.subscribe(8).await.unwrap();

    let publish_all = async {
        let mut reports = Vec::new();
        for i in 0..4 {
            reports.push(hub.publish(log(&i.to_string())).await.unwrap());
        }
        reports
    };
    let reports = tokio::time::timeout(Duration::from_secs(1), publish_all)
        .await
        .expect("broadcasts were held up by a hanging subscriber");

    // at most the writer's in-flight envelope and one queued one got through
    let dropped: usize = reports.iter().map(|r| r.dropped).sum();
    assert!((2..=3).contains(&dropped), "dropped {dropped}");
    for _ in 0..4 {
        assert!(pull.receiver.recv().await.is_some());
    }
    assert_eq!(hub.subscriber_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_unsubscribe() {
    let hub = HubHandle::spawn(HubActorArgs::default());
    let sub = hub.subscribe(4).await.unwrap();
    assert!(hub.unsubscribe(sub.id).await.unwrap());
    assert!(!hub.unsubscribe(sub.id).await.unwrap());
    assert_eq!(hub.subscriber_count().await.unwrap(), 0);
}
