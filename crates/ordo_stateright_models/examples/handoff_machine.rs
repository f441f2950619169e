//! Model: a context's backlog handed from one coordinator instance to the next.
//!
//! One issuer's tickets `0..tickets` are stored as envelopes. The first owner
//! drains them one at a time through three cut points:
//! - begin: version check, then Pending -> Started
//! - commit: versioned write of the result plus the execution mark
//! - remove: delete the envelope, advance the cursor
//!
//! A takeover bumps the record version and starts a new owner at the lowest
//! stored envelope, which is what the recovery scan does. Old owners keep
//! running until their next version check. Any owner can crash at any point.
//!
//! With `use_marks = false` the commit ignores execution marks; the checker
//! then finds the duplicate commit a takeover between commit and remove
//! produces.

use ordo_stateright_models::envelope::{Slot, backlog_start, covered};
use stateright::{Checker, Model, Property, report::WriteReporter};
use std::time::Duration;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Executed(usize),
    Committed(usize),
    Stopped,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Owner {
    pub seen: u8,
    pub cursor: usize,
    pub phase: Phase,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct State {
    pub slots: Vec<Slot>,
    pub version: u8,
    pub mark: Option<usize>,
    /// Commits landed per ticket.
    pub applied: Vec<u8>,
    pub owners: Vec<Owner>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Action {
    Begin(usize),
    Commit(usize),
    Remove(usize),
    Crash(usize),
    Takeover,
}

#[derive(Clone, Debug)]
pub struct HandoffModel {
    pub tickets: usize,
    pub max_owners: usize,
    pub use_marks: bool,
}

impl HandoffModel {
    pub fn new(use_marks: bool) -> Self {
        Self {
            tickets: 3,
            max_owners: 3,
            use_marks,
        }
    }
}

impl Model for HandoffModel {
    type State = State;
    type Action = Action;

    fn init_states(&self) -> Vec<Self::State> {
        vec![State {
            slots: vec![Slot::Pending; self.tickets],
            version: 1,
            mark: None,
            applied: vec![0; self.tickets],
            owners: vec![Owner {
                seen: 1,
                cursor: 0,
                phase: Phase::Idle,
            }],
        }]
    }

    fn actions(&self, s: &Self::State, actions: &mut Vec<Self::Action>) {
        for (i, owner) in s.owners.iter().enumerate() {
            match owner.phase {
                Phase::Stopped => continue,
                Phase::Idle if owner.cursor < self.tickets => actions.push(Action::Begin(i)),
                Phase::Idle => {}
                Phase::Executed(_) => actions.push(Action::Commit(i)),
                Phase::Committed(_) => actions.push(Action::Remove(i)),
            }
            actions.push(Action::Crash(i));
        }
        if s.owners.len() < self.max_owners {
            actions.push(Action::Takeover);
        }
    }

    fn next_state(&self, s: &Self::State, a: Self::Action) -> Option<Self::State> {
        let mut n = s.clone();
        match a {
            Action::Begin(i) => {
                let owner = &mut n.owners[i];
                let t = owner.cursor;
                if n.version != owner.seen {
                    owner.phase = Phase::Stopped;
                } else if self.use_marks && covered(n.mark, t) {
                    n.slots[t] = Slot::Gone;
                    owner.cursor += 1;
                } else if n.slots[t] == Slot::Gone {
                    owner.cursor += 1;
                } else {
                    n.slots[t] = Slot::Started;
                    owner.phase = Phase::Executed(t);
                }
            }
            Action::Commit(i) => {
                let owner = &mut n.owners[i];
                let Phase::Executed(t) = owner.phase else {
                    return None;
                };
                if n.version != owner.seen {
                    owner.phase = Phase::Stopped;
                } else if self.use_marks && covered(n.mark, t) {
                    owner.phase = Phase::Committed(t);
                } else {
                    n.applied[t] = n.applied[t].saturating_add(1);
                    n.mark = Some(n.mark.map_or(t, |m| m.max(t)));
                    owner.phase = Phase::Committed(t);
                }
            }
            Action::Remove(i) => {
                let owner = &mut n.owners[i];
                let Phase::Committed(t) = owner.phase else {
                    return None;
                };
                n.slots[t] = Slot::Gone;
                owner.cursor = t + 1;
                owner.phase = Phase::Idle;
            }
            Action::Crash(i) => n.owners[i].phase = Phase::Stopped,
            Action::Takeover => {
                n.version += 1;
                n.owners.push(Owner {
                    seen: n.version,
                    cursor: backlog_start(&n.slots),
                    phase: Phase::Idle,
                });
            }
        }
        Some(n)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("no duplicated commit", |_, s: &State| {
                s.applied.iter().all(|n| *n <= 1)
            }),
            Property::always("commits land in ticket order", |_, s: &State| {
                s.applied
                    .windows(2)
                    .all(|pair| pair[0] > 0 || pair[1] == 0)
            }),
            Property::always("settled owner left nothing behind", |m, s: &State| {
                let settled = s.owners.last().is_some_and(|owner| {
                    owner.seen == s.version
                        && owner.phase == Phase::Idle
                        && owner.cursor == m.tickets
                });
                !settled
                    || (s.applied.iter().all(|n| *n >= 1)
                        && s.slots.iter().all(|slot| *slot == Slot::Gone))
            }),
            Property::sometimes("every ticket committed", |_, s: &State| {
                s.applied.iter().all(|n| *n == 1)
            }),
        ]
    }
}

#[allow(dead_code)]
fn main() -> Result<(), pico_args::Error> {
    env_logger::init();

    let mut args = pico_args::Arguments::from_env();
    let use_marks = !args.contains("--without-marks");
    match args.subcommand()?.as_deref() {
        Some("explore") => {
            let address = args
                .opt_free_from_str()?
                .unwrap_or("localhost:3000".to_string());
            println!("Exploring coordinator hand-off on {address}.");
            HandoffModel::new(use_marks)
                .checker()
                .threads(num_cpus::get())
                .timeout(Duration::from_secs(20))
                .serve(address);
        }
        Some("check") | None => {
            println!("Model checking coordinator hand-off (marks: {use_marks}).");
            HandoffModel::new(use_marks)
                .checker()
                .threads(num_cpus::get())
                .timeout(Duration::from_secs(20))
                .spawn_dfs()
                .report(&mut WriteReporter::new(&mut std::io::stdout()));
        }
        _ => {
            println!("USAGE:");
            println!("  handoff_machine check [--without-marks]");
            println!("  handoff_machine explore [ADDRESS] [--without-marks]");
        }
    }

    Ok(())
}
