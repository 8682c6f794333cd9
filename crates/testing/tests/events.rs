//! Event subsystem: queue waits, handler dispatch, panic containment

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use instr_testing::park;
use instrctl::constants::{EventMechanism, EventType};
use instrctl::error::Error;
use instrctl::event::EventHandler;
use instrctl::resource::{Resource, ResourceOps};
use instrctl::rm::OpenOptions;

const NAME: &str = "GPIB0::7::INSTR";

fn open(rm: &instrctl::rm::ResourceManager) -> Resource {
    rm.open_resource(NAME, OpenOptions::default()).unwrap()
}

#[test]
fn queued_event_is_delivered_with_snapshot() {
    let (rm, backend) = park(&[NAME]);
    let resource = open(&rm);
    let ops = resource.ops();
    let session = ops.session().unwrap();

    ops.enable_event(EventType::ServiceRequest, EventMechanism::QUEUE)
        .unwrap();
    backend.fire_event(session, EventType::ServiceRequest);

    let response = ops.wait_on_event(EventType::ServiceRequest, 100).unwrap();
    assert!(!response.timed_out);
    assert_eq!(response.event.event_type, EventType::ServiceRequest);
    assert!(!response.event.timed_out);
}

#[test]
fn enable_is_idempotent_and_disable_restores() {
    let (rm, backend) = park(&[NAME]);
    let resource = open(&rm);
    let ops = resource.ops();
    let session = ops.session().unwrap();

    ops.enable_event(EventType::ServiceRequest, EventMechanism::QUEUE)
        .unwrap();
    // Second enable of the same pair is a no-op.
    ops.enable_event(EventType::ServiceRequest, EventMechanism::QUEUE)
        .unwrap();

    ops.disable_event(EventType::ServiceRequest, EventMechanism::QUEUE)
        .unwrap();
    // Back to the pre-enable state: fired events go nowhere.
    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(backend.queued_events(session), 0);
}

#[test]
fn discard_empties_the_queue_but_keeps_enablement() {
    let (rm, backend) = park(&[NAME]);
    let resource = open(&rm);
    let ops = resource.ops();
    let session = ops.session().unwrap();

    ops.enable_event(EventType::ServiceRequest, EventMechanism::QUEUE)
        .unwrap();
    backend.fire_event(session, EventType::ServiceRequest);
    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(backend.queued_events(session), 2);

    ops.discard_events(EventType::ServiceRequest, EventMechanism::QUEUE)
        .unwrap();
    assert_eq!(backend.queued_events(session), 0);

    // Still enabled: the next event queues again.
    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(backend.queued_events(session), 1);
}

#[test]
fn handler_receives_resource_event_and_user_handle() {
    let (rm, backend) = park(&[NAME]);
    let resource = open(&rm);
    let ops = resource.ops();
    let session = ops.session().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(0));
    let handler: EventHandler = {
        let calls = Arc::clone(&calls);
        let seen = Arc::clone(&seen);
        Arc::new(move |core, event, user_handle| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(core.resource_name(), NAME);
            assert_eq!(event.event_type, EventType::ServiceRequest);
            seen.store(user_handle.unwrap_or(0) as usize, Ordering::SeqCst);
        })
    };

    ops.enable_event(EventType::ServiceRequest, EventMechanism::HANDLER)
        .unwrap();
    let handle = ops
        .install_handler(EventType::ServiceRequest, handler, Some(42))
        .unwrap();

    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 42);

    ops.uninstall_handler(EventType::ServiceRequest, handle).unwrap();
    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "uninstalled handler stays quiet");
}

#[test]
fn installing_the_same_callable_twice_yields_distinct_handles() {
    let (rm, backend) = park(&[NAME]);
    let resource = open(&rm);
    let ops = resource.ops();
    let session = ops.session().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let handler: EventHandler = {
        let calls = Arc::clone(&calls);
        Arc::new(move |_, _, _| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    };

    ops.enable_event(EventType::ServiceRequest, EventMechanism::HANDLER)
        .unwrap();
    let first = ops
        .install_handler(EventType::ServiceRequest, handler.clone(), None)
        .unwrap();
    let second = ops
        .install_handler(EventType::ServiceRequest, handler, Some(7))
        .unwrap();
    assert_ne!(first, second);

    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    ops.uninstall_handler(EventType::ServiceRequest, first).unwrap();
    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // A stale handle cannot uninstall twice.
    assert!(matches!(
        ops.uninstall_handler(EventType::ServiceRequest, first),
        Err(Error::Io { .. })
    ));
}

#[test]
fn handler_panic_is_contained() {
    let (rm, backend) = park(&[NAME]);
    let resource = open(&rm);
    let ops = resource.ops();
    let session = ops.session().unwrap();

    let after = Arc::new(AtomicUsize::new(0));
    let panicking: EventHandler = Arc::new(|_, _, _| panic!("handler bug"));
    let counting: EventHandler = {
        let after = Arc::clone(&after);
        Arc::new(move |_, _, _| {
            after.fetch_add(1, Ordering::SeqCst);
        })
    };

    ops.enable_event(EventType::ServiceRequest, EventMechanism::HANDLER)
        .unwrap();
    ops.install_handler(EventType::ServiceRequest, panicking, None)
        .unwrap();
    ops.install_handler(EventType::ServiceRequest, counting, None)
        .unwrap();

    // The panic is swallowed at the dispatch boundary; later handlers and
    // the dispatching thread keep running.
    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[test]
fn close_resets_event_state() {
    let (rm, backend) = park(&[NAME]);
    let resource = open(&rm);
    let ops = resource.ops();
    let session = ops.session().unwrap();

    ops.enable_event(EventType::ServiceRequest, EventMechanism::QUEUE)
        .unwrap();
    ops.close().unwrap();

    // The session is gone; waiting is now an invalid-session error.
    assert!(matches!(
        ops.wait_on_event(EventType::ServiceRequest, 10),
        Err(Error::InvalidSession)
    ));
    // And the backend no longer has anywhere to queue into.
    backend.fire_event(session, EventType::ServiceRequest);
    assert_eq!(backend.queued_events(session), 0);
}
