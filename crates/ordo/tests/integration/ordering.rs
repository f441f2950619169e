use std::sync::Arc;

use ordo::test_utils::poll_until;
use ordo::{AcceptOutcome, SubmitOptions};

use crate::fixtures::gate::{Release, gate};
use crate::fixtures::ops::{append, hold, urgent};
use crate::fixtures::rig::{Rig, WAIT, test_config};

#[test]
fn priority_submission_overtakes_pending_ordinary() {
    let rig = Rig::new();
    let id = rig.create("orders");

    let gate = gate("ordering-priority");
    assert!(rig.registry.accept(&id, hold("hold", "ordering-priority")).is_accepted());
    assert!(gate.wait_entered());

    let a = rig.registry.accept(&id, append("A"));
    let b = rig.registry.accept(&id, urgent("B"));
    let a_ticket = a.key().expect("A accepted").ticket;
    let b_ticket = b.key().expect("B accepted").ticket;
    assert!(!a_ticket.is_priority());
    assert!(b_ticket.is_priority());
    assert_eq!(b_ticket.issuer().get(), -a_ticket.issuer().get());
    assert!(!a_ticket.is_provisional());

    gate.release(Release::Proceed);
    assert!(rig.wait_committed(&id, 3));

    let record = rig.record(&id);
    assert_eq!(record.payload.applied, vec!["hold", "B", "A"]);
    assert_eq!(record.version, 1);
    assert_eq!(record.last_executed_ticket, Some(a_ticket));
    assert_eq!(record.counters.total_commands_executed, 3);
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
}

#[test]
fn priority_runs_first_and_only_the_two_submissions_count() {
    // One lane: a held command on another context keeps it busy while both
    // submissions land.
    let mut config = test_config();
    config.lanes.parallelism = 1;
    let rig = Rig::with_config(config);
    let blocker = rig.create("blocker");
    let id = rig.create("pair");

    let gate = gate("ordering-pair");
    rig.registry.accept(&blocker, hold("busy", "ordering-pair"));
    assert!(gate.wait_entered());

    let a = rig.registry.accept(&id, append("A"));
    let b = rig.registry.accept(&id, urgent("B"));
    let a_ticket = a.key().expect("A accepted").ticket;
    assert!(b.key().expect("B accepted").ticket.is_priority());

    gate.release(Release::Proceed);
    assert!(rig.wait_committed(&id, 2));

    let record = rig.record(&id);
    assert_eq!(record.payload.applied, vec!["B", "A"]);
    assert_eq!(record.version, 1);
    assert_eq!(record.last_executed_ticket, Some(a_ticket));
    assert_eq!(record.counters.total_commands_executed, 2);
    assert!(poll_until(WAIT, || rig.envelope_count() == 0));
}

#[test]
fn submit_options_can_force_priority() {
    let rig = Rig::new();
    let id = rig.create("forced");

    let gate = gate("ordering-forced");
    rig.registry.accept(&id, hold("hold", "ordering-forced"));
    assert!(gate.wait_entered());
    rig.registry.accept(&id, append("plain"));
    let forced = rig
        .registry
        .accept_with(&id, append("forced"), SubmitOptions::priority());
    assert!(forced.key().is_some_and(|k| k.ticket.is_priority()));

    gate.release(Release::Proceed);
    assert!(rig.wait_committed(&id, 3));
    assert_eq!(rig.ledger(&id).applied, vec!["hold", "forced", "plain"]);
}

#[test]
fn each_class_runs_in_submission_order() {
    let rig = Rig::new();
    let id = rig.create("mixed");

    let mut ordinary = Vec::new();
    let mut priority = Vec::new();
    for i in 0..40 {
        if i % 3 == 0 {
            let label = format!("p{i}");
            assert!(rig.registry.accept(&id, urgent(&label)).is_accepted());
            priority.push(label);
        } else {
            let label = format!("o{i}");
            assert!(rig.registry.accept(&id, append(&label)).is_accepted());
            ordinary.push(label);
        }
    }
    assert!(rig.wait_committed(&id, 40));

    let applied = rig.ledger(&id).applied;
    let ran_ordinary: Vec<_> = applied.iter().filter(|l| l.starts_with('o')).cloned().collect();
    let ran_priority: Vec<_> = applied.iter().filter(|l| l.starts_with('p')).cloned().collect();
    assert_eq!(ran_ordinary, ordinary);
    assert_eq!(ran_priority, priority);
}

#[test]
fn concurrent_submitters_keep_their_own_order() {
    let rig = Rig::new();
    let id = rig.create("shared");
    let registry = Arc::clone(&rig.registry);

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    let outcome = registry.accept(&id, append(&format!("t{t}-{i:02}")));
                    assert!(matches!(outcome, AcceptOutcome::Accepted { .. }));
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().expect("submitter panicked");
    }
    assert!(rig.wait_committed(&id, 100));

    let applied = rig.ledger(&id).applied;
    assert_eq!(applied.len(), 100);
    for t in 0..4 {
        let prefix = format!("t{t}-");
        let mine: Vec<_> = applied.iter().filter(|l| l.starts_with(&prefix)).cloned().collect();
        let expected: Vec<_> = (0..25).map(|i| format!("t{t}-{i:02}")).collect();
        assert_eq!(mine, expected);
    }
    assert_eq!(rig.record(&id).version, 1);
}
