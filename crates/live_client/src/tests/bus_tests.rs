use std::sync::Mutex;

use futures::StreamExt;
use shared::protocol::FrameKind;

use super::*;

fn recorder(bus: &FrameBus, label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscription {
    let log = Arc::clone(log);
    bus.subscribe(move |frame| {
        log.lock()
            .expect("log")
            .push(format!("{label}:{:?}", frame.kind));
    })
}

#[test]
fn handlers_run_in_registration_order() {
    let bus = FrameBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let _a = recorder(&bus, "a", &log);
    let _b = recorder(&bus, "b", &log);
    let _c = recorder(&bus, "c", &log);

    assert_eq!(bus.publish(&Frame::new(FrameKind::Pong)), 3);
    assert_eq!(
        *log.lock().expect("log"),
        vec!["a:Pong", "b:Pong", "c:Pong"]
    );
}

#[test]
fn dropping_or_unsubscribing_removes_only_that_handler() {
    let bus = FrameBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = recorder(&bus, "a", &log);
    let b = recorder(&bus, "b", &log);
    let _c = recorder(&bus, "c", &log);
    assert_ne!(a.id(), b.id());

    drop(a);
    b.unsubscribe();
    bus.publish(&Frame::new(FrameKind::Connected));

    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(*log.lock().expect("log"), vec!["c:Connected"]);
}

#[test]
fn publish_without_subscribers_is_a_no_op() {
    let bus = FrameBus::new();
    assert_eq!(bus.publish(&Frame::new(FrameKind::MetricsUpdate)), 0);
}

#[test]
fn handler_may_unsubscribe_itself_while_dispatching() {
    let bus = FrameBus::new();
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let calls = Arc::new(Mutex::new(0usize));

    let own_slot = Arc::clone(&slot);
    let own_calls = Arc::clone(&calls);
    let subscription = bus.subscribe(move |_| {
        *own_calls.lock().expect("calls") += 1;
        own_slot.lock().expect("slot").take();
    });
    *slot.lock().expect("slot") = Some(subscription);

    bus.publish(&Frame::new(FrameKind::Pong));
    bus.publish(&Frame::new(FrameKind::Pong));

    assert_eq!(*calls.lock().expect("calls"), 1);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn subscription_outliving_the_bus_drops_quietly() {
    let bus = FrameBus::new();
    let subscription = bus.subscribe(|_| {});
    drop(bus);
    drop(subscription);
}

#[tokio::test]
async fn stream_yields_frames_until_dropped() {
    let bus = FrameBus::new();
    let mut frames = bus.stream();
    assert_eq!(bus.subscriber_count(), 1);

    bus.publish(&Frame::new(FrameKind::TransactionNew));
    bus.publish(&Frame::new(FrameKind::MetricsUpdate));

    assert_eq!(frames.next().await.map(|f| f.kind), Some(FrameKind::TransactionNew));
    assert_eq!(frames.next().await.map(|f| f.kind), Some(FrameKind::MetricsUpdate));

    drop(frames);
    assert_eq!(bus.subscriber_count(), 0);
}
