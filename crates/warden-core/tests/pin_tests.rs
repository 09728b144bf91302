//! PIN gate lifecycle: sessions, lockout, delayed removal.

use chrono::{Duration, Utc};
use warden_core::audit::{Actor, AuditLog};
use warden_core::pin::{PinGate, VerifyOutcome, PIN_MAX_ATTEMPTS};
use warden_core::unlock::{UnlockKind, UnlockStore};

// Real iteration counts are too slow for the suite; the KDF itself is
// covered by the salted-derivation unit test.
const TEST_ITERATIONS: u32 = 1_000;

fn gate() -> (tempfile::TempDir, PinGate) {
    let dir = tempfile::TempDir::new().unwrap();
    let gate = PinGate::with_iterations(dir.path(), TEST_ITERATIONS);
    (dir, gate)
}

#[test]
fn no_pin_means_open_gate() {
    let (_dir, gate) = gate();
    let now = Utc::now();
    assert!(!gate.is_enabled());
    assert!(gate.session_valid(now).unwrap());
    assert!(gate.require_session("unblock", now).is_ok());
}

#[test]
fn set_and_verify_opens_session() {
    let (_dir, gate) = gate();
    let now = Utc::now();

    gate.set("4321").unwrap();
    assert!(gate.is_enabled());
    assert!(!gate.session_valid(now).unwrap());
    assert!(gate.require_session("unblock", now).is_err());

    match gate.verify("4321", now).unwrap() {
        VerifyOutcome::Verified { session_until } => {
            assert_eq!(session_until, now + Duration::minutes(30));
        }
        other => panic!("expected verification, got {other:?}"),
    }

    assert!(gate.session_valid(now + Duration::minutes(29)).unwrap());
    assert!(!gate.session_valid(now + Duration::minutes(31)).unwrap());
    assert!(gate.require_session("unblock", now + Duration::minutes(10)).is_ok());
}

#[test]
fn pin_length_bounds() {
    let (_dir, gate) = gate();
    assert!(gate.set("123").is_err());
    assert!(gate.set(&"9".repeat(33)).is_err());
    assert!(gate.set("1234").is_ok());
    assert!(gate.set(&"9".repeat(32)).is_ok());
}

#[test]
fn lockout_after_exactly_three_failures() {
    let (_dir, gate) = gate();
    let now = Utc::now();
    gate.set("4321").unwrap();

    for attempt in 1..PIN_MAX_ATTEMPTS {
        match gate.verify("0000", now).unwrap() {
            VerifyOutcome::Incorrect { failures } => assert_eq!(failures, attempt),
            other => panic!("expected failure #{attempt}, got {other:?}"),
        }
    }

    // Third failure fills the window...
    assert!(matches!(
        gate.verify("0000", now).unwrap(),
        VerifyOutcome::Incorrect { failures: 3 }
    ));
    // ...and even the correct PIN is refused while locked out.
    assert!(matches!(
        gate.verify("4321", now).unwrap(),
        VerifyOutcome::LockedOut { .. }
    ));
    assert!(gate.require_session("pause", now).is_err());

    // The sliding window releases after 15 minutes.
    let later = now + Duration::minutes(16);
    assert!(matches!(
        gate.verify("4321", later).unwrap(),
        VerifyOutcome::Verified { .. }
    ));
}

#[test]
fn success_clears_failure_window() {
    let (_dir, gate) = gate();
    let now = Utc::now();
    gate.set("4321").unwrap();

    gate.verify("0000", now).unwrap();
    gate.verify("0000", now).unwrap();
    assert!(matches!(
        gate.verify("4321", now).unwrap(),
        VerifyOutcome::Verified { .. }
    ));
    assert_eq!(gate.failed_attempts(now).unwrap(), 0);
}

#[test]
fn removal_goes_through_delayed_unlock_request() {
    let dir = tempfile::TempDir::new().unwrap();
    let gate = PinGate::with_iterations(dir.path(), TEST_ITERATIONS);
    let unlock = UnlockStore::new(dir.path());
    let audit = AuditLog::new(dir.path(), Actor::User);
    let now = Utc::now();

    gate.set("4321").unwrap();

    let request = unlock
        .create(UnlockKind::Pin, "protection", 24, Some("PIN removal requested".into()), now)
        .unwrap();
    assert_eq!(request.execute_at, now + Duration::hours(24));
    assert!(unlock.pin_removal(now).unwrap().is_some());

    // During the delay the PIN keeps gating and the request is
    // cancellable.
    assert!(gate.is_enabled());
    assert!(unlock.cancel(&request.id, now).unwrap().is_some());
    assert!(unlock.pin_removal(now).unwrap().is_none());

    // File it again and let it mature: execution removes the hash.
    let request = unlock
        .create(UnlockKind::Pin, "protection", 24, None, now)
        .unwrap();
    let matured = now + Duration::hours(25);
    assert!(!unlock
        .execute(&request.id, &dir.path().join("policy.json"), &gate, &audit, now)
        .unwrap());
    assert!(unlock
        .execute(&request.id, &dir.path().join("policy.json"), &gate, &audit, matured)
        .unwrap());
    assert!(!gate.is_enabled());
}

#[test]
fn unlock_delay_floor_is_enforced() {
    let dir = tempfile::TempDir::new().unwrap();
    let unlock = UnlockStore::new(dir.path());
    let now = Utc::now();

    let request = unlock
        .create(UnlockKind::Category, "gambling", 1, None, now)
        .unwrap();
    assert_eq!(request.delay_hours, 24);
    assert_eq!(request.execute_at, now + Duration::hours(24));
}
