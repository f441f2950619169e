use std::time::Duration;

use ordo::test_utils::poll_until;
use ordo::{AcceptOutcome, LifecycleEvent};

use crate::fixtures::gate::{Release, gate};
use crate::fixtures::ops::{append, hold};
use crate::fixtures::rig::{Rig, WAIT};

#[test]
fn departure_stops_and_arrival_reclaims() {
    let rig = Rig::new();
    let id = rig.create("roaming");
    rig.registry.accept(&id, append("before"));
    assert!(rig.wait_committed(&id, 1));

    rig.lifecycle.handle(LifecycleEvent::Departed(id.clone()));
    assert!(rig.registry.state(&id).is_none());
    assert_eq!(
        rig.registry.accept(&id, append("refused")),
        AcceptOutcome::UnknownContext
    );

    rig.lifecycle.handle(LifecycleEvent::Arrived(id.clone()));
    assert!(rig.wait_claimed(&id));
    assert_eq!(rig.record(&id).version, 2);

    rig.registry.accept(&id, append("after"));
    assert!(rig.wait_committed(&id, 2));
    assert_eq!(rig.ledger(&id).applied, vec!["before", "after"]);
}

#[test]
fn store_insert_notification_starts_the_coordinator() {
    let rig = Rig::new();
    let id = rig.create("notified");
    let stats = rig.stats(&id).expect("coordinator");
    assert_eq!(stats.version_seen, Some(1));
    assert!(!stats.issuer.is_provisional());
}

#[test]
fn removal_stops_the_coordinator() {
    let rig = Rig::new();
    let id = rig.create("removed");
    rig.lifecycle.handle(LifecycleEvent::Removed(id.clone()));
    assert!(poll_until(WAIT, || rig.registry.state(&id).is_none()));
    assert_eq!(rig.registry.coordinator_count(), 0);
}

#[test]
fn repeated_arrival_keeps_one_coordinator() {
    let rig = Rig::new();
    let id = rig.create("twice");
    rig.lifecycle.handle(LifecycleEvent::Arrived(id.clone()));
    rig.lifecycle.handle(LifecycleEvent::Inserted(id.clone()));
    assert_eq!(rig.registry.coordinator_count(), 1);
    assert_eq!(rig.record(&id).version, 1);
}

#[test]
fn stopped_coordinator_runs_nothing_after_its_current_ticket() {
    let rig = Rig::new();
    let id = rig.create("halted");

    let gate = gate("lifecycle-halted");
    rig.registry.accept(&id, hold("hold", "lifecycle-halted"));
    rig.registry.accept(&id, append("b"));
    rig.registry.accept(&id, append("c"));
    assert!(gate.wait_entered());

    assert!(rig.registry.stop_coordinator(&id, "test"));
    assert!(rig.registry.state(&id).is_none());
    gate.release(Release::Proceed);

    // The ticket already executing may still commit; nothing after it runs.
    assert!(rig.wait_committed(&id, 1));
    std::thread::sleep(Duration::from_millis(300));
    let record = rig.record(&id);
    assert_eq!(record.payload.applied, vec!["hold"]);
    assert_eq!(record.counters.total_commands_executed, 1);
    assert_eq!(rig.envelope_count(), 2);

    assert!(rig.registry.start_coordinator(&id).expect("restart"));
    assert!(rig.wait_committed(&id, 3));
    assert_eq!(rig.ledger(&id).applied, vec!["hold", "b", "c"]);
    assert_eq!(rig.record(&id).version, 2);
}
