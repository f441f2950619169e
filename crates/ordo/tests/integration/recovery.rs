use ordo::core::{
    CommandEnvelope, ContextConfig, ContextRecord, EnvelopeKey, IssuerId, Ticket,
};
use ordo::coordinator::scan_backlog;
use ordo::store;
use ordo::test_utils::poll_until;
use ordo::{CoordinatorState, KeySpace, Ownership, StoreKey};

use crate::fixtures::gate::{Release, gate};
use crate::fixtures::ops::{Ledger, append, hold};
use crate::fixtures::rig::{Rig, WAIT, ctx};

#[test]
fn version_bump_mid_batch_stops_and_next_owner_recovers_the_rest() {
    let rig = Rig::new();
    let id = rig.create("handoff");

    let gate = gate("recovery-handoff");
    let a = rig.registry.accept(&id, hold("a", "recovery-handoff"));
    rig.registry.accept(&id, append("b"));
    rig.registry.accept(&id, append("c"));
    assert!(gate.wait_entered());
    let issuer = a.key().expect("a accepted").ticket.issuer();

    assert_eq!(rig.bump_version(&id), 2);
    gate.release(Release::Proceed);
    assert!(rig.wait_stopped(&id));

    // Nothing committed; all three tickets are left as one backlog.
    let record = rig.record(&id);
    assert!(record.payload.applied.is_empty());
    assert_eq!(record.counters.total_commands_executed, 0);
    let backlog = scan_backlog(rig.store.as_ref(), &id).expect("scan");
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].issuer(), issuer);
    assert_eq!((backlog[0].from(), backlog[0].to()), (0, 3));

    assert!(rig.registry.start_coordinator(&id).expect("restart"));
    assert!(rig.wait_committed(&id, 3));

    let record = rig.record(&id);
    assert_eq!(record.version, 3);
    assert_eq!(record.payload.applied, vec!["a", "b", "c"]);
    assert_eq!(record.payload.replayed, vec!["a", "b", "c"]);
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
}

#[test]
fn recovered_backlog_runs_before_new_submissions() {
    let rig = Rig::new();
    let id = rig.create("backlog");

    let gate = gate("recovery-backlog");
    rig.registry.accept(&id, hold("old-1", "recovery-backlog"));
    rig.registry.accept(&id, append("old-2"));
    assert!(gate.wait_entered());
    rig.bump_version(&id);
    gate.release(Release::Proceed);
    assert!(rig.wait_stopped(&id));

    // Hold the restart in Starting so the new submission arrives before the
    // backlog has been touched.
    rig.oracle.set(id.clone(), Ownership::InDoubt);
    rig.registry.start_coordinator(&id).expect("restart");
    assert!(poll_until(WAIT, || {
        rig.registry.state(&id) == Some(CoordinatorState::Starting)
    }));
    rig.oracle.set(id.clone(), Ownership::Owned);
    rig.registry.accept(&id, append("new"));
    assert!(rig.wait_committed(&id, 3));

    assert_eq!(rig.ledger(&id).applied, vec!["old-1", "old-2", "new"]);
}

#[test]
fn ownership_doubt_parks_the_batch_until_it_clears() {
    let rig = Rig::new();
    let id = rig.create("doubt");

    let gate = gate("recovery-doubt");
    rig.registry.accept(&id, hold("first", "recovery-doubt"));
    rig.registry.accept(&id, append("second"));
    rig.registry.accept(&id, append("third"));
    assert!(gate.wait_entered());

    rig.oracle.set(id.clone(), Ownership::InDoubt);
    gate.release(Release::Proceed);
    assert!(rig.wait_committed(&id, 1));
    std::thread::sleep(std::time::Duration::from_millis(100));
    assert_eq!(rig.ledger(&id).applied, vec!["first"]);
    assert!(rig.registry.state(&id).is_some());

    rig.oracle.set(id.clone(), Ownership::Owned);
    assert!(rig.wait_committed(&id, 3));
    let record = rig.record(&id);
    assert_eq!(record.payload.applied, vec!["first", "second", "third"]);
    assert_eq!(record.version, 1);
}

#[test]
fn claim_waits_out_ownership_doubt() {
    let rig = Rig::new();
    let id = ctx("late-owner");
    rig.oracle.set(id.clone(), Ownership::InDoubt);
    rig.registry
        .create_context(&id, ContextConfig::default(), Ledger::default())
        .expect("create");

    assert!(poll_until(WAIT, || {
        rig.registry.state(&id) == Some(CoordinatorState::Starting)
    }));
    std::thread::sleep(std::time::Duration::from_millis(60));
    assert_eq!(rig.record(&id).version, 0);

    rig.oracle.set(id.clone(), Ownership::Owned);
    assert!(rig.wait_claimed(&id));
    assert_eq!(rig.record(&id).version, 1);
}

#[test]
fn envelope_already_under_the_mark_is_removed_not_replayed() {
    let rig = Rig::new();
    let id = ctx("marked");
    let issuer = IssuerId::configured(40);
    let space = KeySpace::ColocatedEnvelopes;

    let committed = Ticket::new(issuer, 0);
    let pending = Ticket::new(issuer, 1);
    for (ticket, label) in [(committed, "done-before"), (pending, "left-over")] {
        let key = EnvelopeKey::new(id.clone(), ticket);
        let mut envelope = CommandEnvelope::new(key.clone(), append(label), 0);
        if ticket == committed {
            envelope.start();
        }
        store::insert(rig.store.as_ref(), space, StoreKey::Envelope(key), &envelope)
            .expect("park envelope");
    }

    let mut record = ContextRecord::new(id.clone(), ContextConfig::default(), Ledger::default());
    record.marks.record(&committed);
    record.counters.total_commands_executed = 1;
    store::insert(rig.store.as_ref(), KeySpace::Contexts, StoreKey::Context(id.clone()), &record)
        .expect("insert record");

    assert!(rig.wait_committed(&id, 2));
    assert_eq!(rig.ledger(&id).applied, vec!["left-over"]);
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
    assert!(poll_until(WAIT, || {
        rig.stats(&id)
            .is_some_and(|s| s.executed == 1 && s.skipped == 1)
    }));
}
