//! Session lifecycle: idempotent close, scoped release, manager teardown

use std::panic::{catch_unwind, AssertUnwindSafe};

use instr_testing::park;
use instrctl::constants::LockKind;
use instrctl::error::Error;
use instrctl::resource::{Messaging, Resource, ResourceOps};
use instrctl::rm::OpenOptions;

const NAME: &str = "GPIB0::7::INSTR";

#[test]
fn close_is_idempotent_and_operations_fail_after() {
    let (rm, _backend) = park(&[NAME]);
    let resource = rm.open_resource(NAME, OpenOptions::default()).unwrap();
    let ops = resource.ops();

    ops.close().expect("first close succeeds");
    ops.close().expect("second close is a no-op");

    let err = ops.session().unwrap_err();
    assert!(matches!(err, Error::InvalidSession));
    if let Resource::Gpib(instrument) = &resource {
        assert!(matches!(instrument.write("*RST"), Err(Error::InvalidSession)));
        assert!(matches!(instrument.read(), Err(Error::InvalidSession)));
    }
}

#[test]
fn dropping_a_resource_releases_its_session() {
    let (rm, backend) = park(&[NAME]);
    let session = {
        let resource = rm.open_resource(NAME, OpenOptions::default()).unwrap();
        resource.ops().session().unwrap()
        // The only strong reference dies here.
    };
    assert!(matches!(
        instrctl::backend::Backend::read(backend.as_ref(), session, 1),
        Err(Error::InvalidSession)
    ));
    assert!(rm.list_opened_resources().is_empty());
}

#[test]
fn manager_close_closes_children_first() {
    let (rm, _backend) = park(&[NAME]);
    let resource = rm.open_resource(NAME, OpenOptions::default()).unwrap();
    assert_eq!(rm.list_opened_resources().len(), 1);

    rm.close().expect("manager close");
    rm.close().expect("manager close is idempotent");

    assert!(matches!(resource.ops().session(), Err(Error::InvalidSession)));
    assert!(matches!(rm.session(), Err(Error::InvalidSession)));
    assert!(rm.list_opened_resources().is_empty());
}

#[test]
fn lock_context_releases_on_normal_exit() {
    let (rm, backend) = park(&[NAME]);
    let resource = rm.open_resource(NAME, OpenOptions::default()).unwrap();
    let session = resource.ops().session().unwrap();

    {
        let guard = resource
            .ops()
            .lock_context(LockKind::Shared, 100, Some("TEAM_KEY"))
            .expect("lock granted");
        assert_eq!(guard.key(), Some("TEAM_KEY"));
        assert!(backend.is_locked(session));
    }
    assert!(!backend.is_locked(session));
}

#[test]
fn lock_context_releases_on_panic() {
    let (rm, backend) = park(&[NAME]);
    let resource = rm.open_resource(NAME, OpenOptions::default()).unwrap();
    let session = resource.ops().session().unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _guard = resource
            .ops()
            .lock_context(LockKind::Exclusive, 100, None)
            .expect("lock granted");
        assert!(backend.is_locked(session));
        panic!("boom");
    }));
    assert!(outcome.is_err());
    assert!(!backend.is_locked(session), "lock must release on unwind");
}

#[test]
fn lock_context_releases_on_error_return() {
    let (rm, backend) = park(&[NAME]);
    let resource = rm.open_resource(NAME, OpenOptions::default()).unwrap();
    let session = resource.ops().session().unwrap();

    fn failing_op(resource: &Resource, session: instrctl::backend::Session, backend: &instr_testing::LoopbackBackend) -> instrctl::error::Result<String> {
        let _guard = resource
            .ops()
            .lock_context(LockKind::Exclusive, 100, None)?;
        assert!(backend.is_locked(session));
        // Nothing queued, so this read times out and the guard unwinds.
        match &resource {
            Resource::Gpib(instrument) => instrument.read(),
            _ => unreachable!(),
        }
    }

    assert!(failing_op(&resource, session, &backend).is_err());
    assert!(!backend.is_locked(session), "lock must release on error exit");
}

#[test]
fn open_missing_resource_fails_cleanly() {
    let (rm, _backend) = park(&[NAME]);
    let err = rm
        .open_resource("GPIB0::9::INSTR", OpenOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::ResourceNotFound));
    assert!(rm.list_opened_resources().is_empty());
}

#[test]
fn attribute_override_failure_rolls_back_the_open() {
    let (rm, _backend) = park(&[NAME]);
    let options = OpenOptions {
        // Read-only attribute: the override must fail and close the
        // half-open session.
        attributes: vec![(
            instrctl::attributes::attr::MANF_ID,
            instrctl::attributes::AttrValue::Scalar(1),
        )],
        ..OpenOptions::default()
    };
    assert!(rm.open_resource(NAME, options).is_err());
    assert!(rm.list_opened_resources().is_empty());
}

#[test]
fn timeout_zero_means_immediate_failure() {
    let (rm, _backend) = park(&[NAME]);
    let Resource::Gpib(instrument) = rm.open_resource(NAME, OpenOptions::default()).unwrap() else {
        panic!("expected gpib");
    };
    instrument
        .set_timeout(instrctl::constants::Timeout::Immediate)
        .unwrap();
    assert_eq!(
        instrument.timeout().unwrap(),
        instrctl::constants::Timeout::Immediate
    );
    let err = instrument.read().unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 0, .. }));
}
