use ordo::core::EnvelopeStatus;
use ordo::test_utils::poll_until;

use crate::fixtures::gate::{Release, gate};
use crate::fixtures::ops::Op;
use crate::fixtures::rig::{Rig, WAIT};

#[test]
fn next_owner_resumes_from_the_saved_checkpoint() {
    let rig = Rig::new();
    let id = rig.create("staged");

    let gate = gate("checkpoint-staged");
    let outcome = rig.registry.accept(
        &id,
        Op::Staged {
            label: "import".to_string(),
            steps: 5,
            pause_at: 3,
            gate: "checkpoint-staged".to_string(),
        },
    );
    let key = outcome.key().expect("accepted").clone();
    let placement = outcome.placement().expect("accepted");
    assert!(gate.wait_entered());

    // The checkpoint is already durable in the envelope.
    let parked = rig.envelope(&key, placement).expect("envelope");
    assert_eq!(parked.status, EnvelopeStatus::Started);
    assert_eq!(
        parked.checkpoint.expect("checkpoint").decode::<u32>().unwrap(),
        3
    );

    // A takeover lands while the step is in progress; the interrupted run's
    // failure can no longer be committed.
    rig.bump_version(&id);
    gate.release(Release::Abort);
    assert!(rig.wait_stopped(&id));
    assert_eq!(rig.record(&id).counters.total_commands_failed, 0);

    assert!(rig.registry.start_coordinator(&id).expect("restart"));
    assert!(rig.wait_committed(&id, 1));

    let record = rig.record(&id);
    assert_eq!(record.payload.applied, vec!["import from 3"]);
    assert_eq!(record.payload.replayed, vec!["import from 3"]);
    assert_eq!(record.counters.total_commands_executed, 1);
    assert!(poll_until(WAIT, || rig.envelope(&key, placement).is_none()));
}
