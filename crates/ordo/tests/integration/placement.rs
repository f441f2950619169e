use ordo::core::{ContextConfig, PlacementStrategy};
use ordo::test_utils::poll_until;
use ordo::{AcceptOutcome, KeySpace, SubmitOptions};

use crate::fixtures::ops::append;
use crate::fixtures::rig::{Rig, WAIT, ctx, test_config};

#[test]
fn submissions_before_creation_use_provisional_colocated_tickets() {
    let rig = Rig::new();
    let id = ctx("early");

    let early = rig
        .registry
        .accept_with(&id, append("early"), SubmitOptions::allow_absent());
    let AcceptOutcome::Accepted { key, placement } = early else {
        panic!("early submission refused: {early:?}");
    };
    assert_eq!(placement, PlacementStrategy::Colocated);
    assert!(key.ticket.is_provisional());
    assert_eq!(rig.store.len(KeySpace::ColocatedEnvelopes), 1);

    rig.registry
        .create_context(&id, ContextConfig::distributed(), Default::default())
        .expect("create");
    assert!(rig.wait_claimed(&id));

    let late = rig.registry.accept(&id, append("late"));
    assert_eq!(late.placement(), Some(PlacementStrategy::Distributed));
    assert!(late.key().is_some_and(|k| !k.ticket.is_provisional()));

    assert!(rig.wait_committed(&id, 2));
    assert_eq!(rig.ledger(&id).applied, vec!["early", "late"]);
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
}

#[test]
fn absent_context_is_unknown_without_opt_in() {
    let rig = Rig::new();
    let id = ctx("absent");
    assert_eq!(
        rig.registry.accept(&id, append("nope")),
        AcceptOutcome::UnknownContext
    );
    assert_eq!(rig.store.len(KeySpace::ColocatedEnvelopes), 0);
}

#[test]
fn accept_if_absent_config_applies_by_default() {
    let mut config = test_config();
    config.submission.accept_if_absent = true;
    let rig = Rig::with_config(config);
    let id = ctx("configured-early");
    assert!(rig.registry.accept(&id, append("early")).is_accepted());
    assert_eq!(
        rig.registry.state(&id),
        Some(ordo::CoordinatorState::New)
    );
}
