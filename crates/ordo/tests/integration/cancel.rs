use ordo::core::{CancelOutcome, EnvelopeKey, EnvelopeStatus, PlacementStrategy, Ticket};
use ordo::test_utils::poll_until;

use crate::fixtures::gate::{Release, gate};
use crate::fixtures::ops::{append, hold};
use crate::fixtures::rig::{Rig, WAIT};

#[test]
fn canceled_pending_envelope_never_runs() {
    let rig = Rig::new();
    let id = rig.create("cancel-pending");

    let gate = gate("cancel-pending");
    rig.registry.accept(&id, hold("hold", "cancel-pending"));
    assert!(gate.wait_entered());
    let doomed = rig.registry.accept(&id, append("doomed"));
    rig.registry.accept(&id, append("kept"));

    let key = doomed.key().expect("accepted").clone();
    let placement = doomed.placement().expect("accepted");
    assert_eq!(rig.registry.cancel(&key, placement).unwrap(), CancelOutcome::Canceled);
    assert_eq!(
        rig.registry.cancel(&key, placement).unwrap(),
        CancelOutcome::AlreadyCanceled
    );
    assert_eq!(
        rig.envelope(&key, placement).map(|e| e.status),
        Some(EnvelopeStatus::Canceled)
    );

    gate.release(Release::Proceed);
    assert!(rig.wait_committed(&id, 2));
    assert!(poll_until(WAIT, || rig.stats(&id).is_some_and(|s| s.canceled == 1)));

    let record = rig.record(&id);
    assert_eq!(record.payload.applied, vec!["hold", "kept"]);
    assert_eq!(record.counters.total_commands_executed, 2);
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
}

#[test]
fn cancel_after_start_is_a_no_op() {
    let rig = Rig::new();
    let id = rig.create("cancel-started");

    let gate = gate("cancel-started");
    let running = rig.registry.accept(&id, hold("running", "cancel-started"));
    assert!(gate.wait_entered());

    let key = running.key().expect("accepted").clone();
    let placement = running.placement().expect("accepted");
    assert_eq!(
        rig.registry.cancel(&key, placement).unwrap(),
        CancelOutcome::AlreadyStarted
    );

    gate.release(Release::Proceed);
    assert!(rig.wait_committed(&id, 1));
    assert_eq!(rig.ledger(&id).applied, vec!["running"]);
}

#[test]
fn cancel_of_unknown_envelope_is_not_found() {
    let rig = Rig::new();
    let id = rig.create("cancel-missing");
    let issuer = rig.stats(&id).expect("coordinator").issuer;
    let key = EnvelopeKey::new(id, Ticket::new(issuer, 99));
    assert_eq!(
        rig.registry
            .cancel(&key, PlacementStrategy::Colocated)
            .unwrap(),
        CancelOutcome::NotFound
    );
}
