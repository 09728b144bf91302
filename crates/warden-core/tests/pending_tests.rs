//! File-backed pending store behavior.

use chrono::{Duration, TimeZone, Utc};
use warden_core::duration::Delay;
use warden_core::pending::{CreateOutcome, PendingStatus, PendingStore, Target};

fn store() -> (tempfile::TempDir, PendingStore) {
    let dir = tempfile::TempDir::new().unwrap();
    let store = PendingStore::new(dir.path());
    (dir, store)
}

#[test]
fn create_produces_well_formed_record() {
    let (_dir, store) = store();
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();

    let outcome = store
        .create(Target::domain("bumble.com"), &Delay::parse("24h").unwrap(), now, "cli")
        .unwrap();
    let CreateOutcome::Created(action) = outcome else {
        panic!("expected a new record");
    };

    let id_pattern = regex::Regex::new(r"^pnd_\d{8}_\d{6}_[a-z0-9]{6}$").unwrap();
    assert!(id_pattern.is_match(&action.id), "bad id {}", action.id);
    assert_eq!(action.execute_at, now + Duration::hours(24));
    assert_eq!(action.delay, "24h");
    assert_eq!(action.status, PendingStatus::Pending);
    assert_eq!(action.requested_by, "cli");
}

#[test]
fn instant_delay_bypasses_the_queue() {
    let (_dir, store) = store();
    let outcome = store
        .create(Target::domain("x.com"), &Delay::Instant, Utc::now(), "cli")
        .unwrap();
    assert!(matches!(outcome, CreateOutcome::Immediate));
    assert!(store.list(true, Utc::now()).unwrap().is_empty());
}

#[test]
fn never_delay_is_refused() {
    let (_dir, store) = store();
    let err = store
        .create(Target::domain("gambling.com"), &Delay::Never, Utc::now(), "cli")
        .unwrap_err();
    assert!(err.to_string().contains("protected"));
    assert!(store.list(true, Utc::now()).unwrap().is_empty());
}

#[test]
fn duplicate_target_returns_existing() {
    let (_dir, store) = store();
    let now = Utc::now();
    let delay = Delay::parse("4h").unwrap();

    let CreateOutcome::Created(first) = store
        .create(Target::domain("a.com"), &delay, now, "cli")
        .unwrap()
    else {
        panic!("expected creation");
    };
    let CreateOutcome::Existing(second) = store
        .create(Target::domain("a.com"), &delay, now + Duration::minutes(5), "cli")
        .unwrap()
    else {
        panic!("expected coalescing");
    };
    assert_eq!(first.id, second.id);
    assert_eq!(store.list(false, now).unwrap().len(), 1);
}

#[test]
fn cancel_pending_then_terminal_noop() {
    let (_dir, store) = store();
    let now = Utc::now();
    let delay = Delay::parse("30m").unwrap();

    let CreateOutcome::Created(action) = store
        .create(Target::domain("a.com"), &delay, now, "cli")
        .unwrap()
    else {
        panic!();
    };

    let cancelled = store.cancel(&action.id, now).unwrap();
    assert!(cancelled.is_some());
    // A second cancel on the now-terminal record is a no-op.
    assert!(store.cancel(&action.id, now).unwrap().is_none());
    assert!(store.cancel("pnd_unknown", now).unwrap().is_none());
}

#[test]
fn due_actions_respect_execute_at() {
    let (_dir, store) = store();
    let now = Utc::now();

    store
        .create(Target::domain("soon.com"), &Delay::parse("30m").unwrap(), now, "cli")
        .unwrap();
    store
        .create(Target::domain("later.com"), &Delay::parse("24h").unwrap(), now, "cli")
        .unwrap();

    assert!(store.due_actions(now).unwrap().is_empty());

    let due = store.due_actions(now + Duration::hours(1)).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].target, Target::domain("soon.com"));

    let all_due = store.due_actions(now + Duration::hours(25)).unwrap();
    assert_eq!(all_due.len(), 2);
}

#[test]
fn mark_executed_keeps_record_for_history() {
    let (_dir, store) = store();
    let now = Utc::now();

    let CreateOutcome::Created(action) = store
        .create(Target::domain("a.com"), &Delay::parse("30m").unwrap(), now, "sync")
        .unwrap()
    else {
        panic!();
    };

    let later = now + Duration::hours(1);
    assert!(store.mark_executed(&action.id, "unblocked", later).unwrap());
    assert!(!store.mark_executed(&action.id, "again", later).unwrap());

    assert!(store.list(false, later).unwrap().is_empty());
    let history = store.list(true, later).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PendingStatus::Executed);
    assert_eq!(history[0].outcome.as_deref(), Some("unblocked"));
}

#[test]
fn gc_removes_only_old_terminal_records() {
    let (_dir, store) = store();
    let now = Utc::now();

    let CreateOutcome::Created(old) = store
        .create(Target::domain("old.com"), &Delay::parse("30m").unwrap(), now, "cli")
        .unwrap()
    else {
        panic!();
    };
    store
        .create(Target::domain("young.com"), &Delay::parse("30m").unwrap(), now, "cli")
        .unwrap();

    store.mark_executed(&old.id, "done", now + Duration::hours(1)).unwrap();

    // One day later: executed record is inside retention, stays.
    assert_eq!(store.gc(now + Duration::days(1)).unwrap(), 0);

    // Nine days later: past the 7-day retention, removed; the still-
    // pending record survives.
    assert_eq!(store.gc(now + Duration::days(9)).unwrap(), 1);
    let remaining = store.list(true, now + Duration::days(9)).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].target, Target::domain("young.com"));
}

#[test]
fn store_survives_write_then_read() {
    let (dir, store) = store();
    let now = Utc::now();
    store
        .create(Target::service("youtube"), &Delay::parse("4h").unwrap(), now, "cli")
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join("pending.json")).unwrap();
    let reopened = PendingStore::new(dir.path());
    let actions = reopened.list(true, now).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].target, Target::service("youtube"));

    // Byte-for-byte stable after a no-op reload cycle.
    let raw_again = std::fs::read_to_string(dir.path().join("pending.json")).unwrap();
    assert_eq!(raw, raw_again);
}

#[test]
fn corrupt_store_is_quarantined_not_fatal() {
    let (dir, store) = store();
    std::fs::write(dir.path().join("pending.json"), "{broken").unwrap();

    let actions = store.list(true, Utc::now()).unwrap();
    assert!(actions.is_empty());
    assert!(std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e
            .file_name()
            .to_string_lossy()
            .starts_with("pending.json.bak.")));
}
