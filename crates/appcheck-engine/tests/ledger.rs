use appcheck_core::models::app::AppKey;
use appcheck_engine::Ledger;

#[test]
fn unknown_app_is_processed() {
    let ledger = Ledger::new();
    assert!(ledger.should_process(&AppKey::new("giantswarm", "a"), 1));
}

#[test]
fn revisions_at_or_below_record_are_skipped() {
    let ledger = Ledger::new();
    let key = AppKey::new("giantswarm", "a");
    ledger.record(&key, 10);

    assert!(!ledger.should_process(&key, 9));
    assert!(!ledger.should_process(&key, 10));
    assert!(ledger.should_process(&key, 11));
}

#[test]
fn record_never_moves_backwards() {
    let ledger = Ledger::new();
    let key = AppKey::new("giantswarm", "a");
    ledger.record(&key, 10);
    ledger.record(&key, 4);

    assert_eq!(ledger.get(&key), Some(10));
    assert_eq!(ledger.len(), 1);

    ledger.remove(&key);
    assert!(ledger.is_empty());
    assert!(ledger.should_process(&key, 4));
}

#[test]
fn claim_lasts_until_every_guard_is_dropped() {
    let ledger = Ledger::new();
    let key = AppKey::new("giantswarm", "a");

    let first = ledger.claim(&key);
    let second = ledger.claim(&key);
    assert!(ledger.is_in_flight(&key));

    drop(first);
    assert!(ledger.is_in_flight(&key));

    drop(second);
    assert!(!ledger.is_in_flight(&key));
}
