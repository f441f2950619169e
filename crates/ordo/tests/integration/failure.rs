use ordo::config::FailurePolicy;
use ordo::core::{CommandEnvelope, EnvelopeStatus};
use ordo::test_utils::poll_until;
use ordo::{KeySpace, PartitionedStore, StoreKey};

use crate::fixtures::gate::{Release, gate};
use crate::fixtures::ops::{Op, append, hold};
use crate::fixtures::rig::{Rig, WAIT, test_config};

fn dead_letters(rig: &Rig) -> Vec<CommandEnvelope<Op>> {
    rig.store
        .scan_keys(KeySpace::DeadLetters, &|_| true)
        .expect("scan")
        .into_iter()
        .filter_map(|key: StoreKey| {
            ordo::store::load(rig.store.as_ref(), KeySpace::DeadLetters, &key).expect("load")
        })
        .collect()
}

#[test]
fn failing_command_is_dead_lettered_and_the_batch_goes_on() {
    let rig = Rig::new();
    let id = rig.create("failures");

    let bad = rig.registry.accept(&id, Op::Fail("bad".to_string()));
    rig.registry.accept(&id, Op::Panic("worse".to_string()));
    rig.registry.accept(&id, append("after"));
    assert!(rig.wait_committed(&id, 3));

    let record = rig.record(&id);
    assert_eq!(record.payload.applied, vec!["after"]);
    assert_eq!(record.counters.total_commands_failed, 2);
    assert_eq!(record.counters.total_commands_executed, 1);
    let bad_ticket = bad.key().expect("accepted").ticket;
    assert!(record.marks.covers(&bad_ticket));

    assert!(poll_until(WAIT, || dead_letters(&rig).len() == 2));
    let letters = dead_letters(&rig);
    assert!(letters.iter().all(|e| e.status == EnvelopeStatus::Failed));
    let reasons: Vec<_> = letters.iter().filter_map(|e| e.failure.clone()).collect();
    assert!(reasons.iter().any(|r| r.contains("bad refused")));
    assert!(reasons.iter().any(|r| r.contains("worse exploded")));
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
    assert!(poll_until(WAIT, || rig.stats(&id).is_some_and(|s| s.failed == 2)));
}

#[test]
fn drop_policy_discards_failed_envelopes() {
    let mut config = test_config();
    config.coordinator.failure_policy = FailurePolicy::Drop;
    let rig = Rig::with_config(config);
    let id = rig.create("dropping");

    rig.registry.accept(&id, Op::Fail("bad".to_string()));
    rig.registry.accept(&id, append("after"));
    assert!(rig.wait_committed(&id, 2));

    assert_eq!(rig.ledger(&id).applied, vec!["after"]);
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
    assert!(dead_letters(&rig).is_empty());
}

#[test]
fn undecodable_envelope_moves_to_dead_letters_and_survives_recovery() {
    let rig = Rig::new();
    let id = rig.create("garbled");

    let gate = gate("failure-garbled");
    rig.registry.accept(&id, hold("hold", "failure-garbled"));
    let b = rig.registry.accept(&id, append("b"));
    rig.registry.accept(&id, append("c"));
    assert!(gate.wait_entered());

    let space = KeySpace::envelopes(b.placement().expect("b accepted"));
    let key = StoreKey::Envelope(b.key().expect("b accepted").clone());
    rig.store
        .put(space, key.clone(), b"{garbage".to_vec())
        .expect("overwrite envelope");
    gate.release(Release::Proceed);

    assert!(rig.wait_committed(&id, 2));
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
    assert_eq!(rig.ledger(&id).applied, vec!["hold", "c"]);
    assert_eq!(rig.store.get(space, &key).expect("get"), None);
    assert_eq!(
        rig.store.get(KeySpace::DeadLetters, &key).expect("get"),
        Some(b"{garbage".to_vec())
    );

    // A leftover the execution marks already cover is dead-lettered on
    // recovery too, not deleted.
    rig.registry.stop_coordinator(&id, "test");
    rig.store
        .put(space, key.clone(), b"{leftover".to_vec())
        .expect("plant leftover");
    assert!(rig.record(&id).marks.covers(&b.key().expect("b accepted").ticket));
    assert!(rig.registry.start_coordinator(&id).expect("restart"));
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
    assert_eq!(
        rig.store.get(KeySpace::DeadLetters, &key).expect("get"),
        Some(b"{leftover".to_vec())
    );
    assert_eq!(rig.ledger(&id).applied, vec!["hold", "c"]);
}
