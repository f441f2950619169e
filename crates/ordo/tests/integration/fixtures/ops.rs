//! Recording commands. Every command that succeeds appends its label to the
//! context's ledger, so execution order is read back from the record.

use serde::{Deserialize, Serialize};

use ordo::{Command, CommandError, Environment};

use super::gate::{Release, gate};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub applied: Vec<String>,
    /// Labels that ran as a recovery replay.
    pub replayed: Vec<String>,
}

impl Ledger {
    fn record(&mut self, label: impl Into<String>, recovering: bool) {
        let label = label.into();
        if recovering {
            self.replayed.push(label.clone());
        }
        self.applied.push(label);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Op {
    Append(String),
    /// Priority by its own flag.
    Urgent(String),
    /// Waits on the named gate; an aborted gate fails the command.
    Hold { label: String, gate: String },
    Fail(String),
    Panic(String),
    /// Counts to `steps`, checkpointing each step. Holds on `gate` after
    /// checkpointing `pause_at` the first time through.
    Staged {
        label: String,
        steps: u32,
        pause_at: u32,
        gate: String,
    },
}

pub fn append(label: &str) -> Op {
    Op::Append(label.to_string())
}

pub fn urgent(label: &str) -> Op {
    Op::Urgent(label.to_string())
}

pub fn hold(label: &str, gate: &str) -> Op {
    Op::Hold {
        label: label.to_string(),
        gate: gate.to_string(),
    }
}

impl Command for Op {
    type Context = Ledger;

    fn execute(&self, env: &mut Environment<'_, Ledger>) -> Result<(), CommandError> {
        let recovering = env.is_recovering();
        match self {
            Op::Append(label) | Op::Urgent(label) => {
                env.payload_mut().record(label.as_str(), recovering);
                Ok(())
            }
            Op::Hold { label, gate: name } => match gate(name).wait() {
                Release::Proceed => {
                    env.payload_mut().record(label.as_str(), recovering);
                    Ok(())
                }
                Release::Abort => Err(CommandError::failed(format!("{label} aborted"))),
            },
            Op::Fail(label) => Err(CommandError::failed(format!("{label} refused"))),
            Op::Panic(label) => panic!("{label} exploded"),
            Op::Staged {
                label,
                steps,
                pause_at,
                gate: name,
            } => {
                let start: u32 = env.load_checkpoint()?.unwrap_or(0);
                for step in start..*steps {
                    env.save_checkpoint(&step)?;
                    if step == *pause_at
                        && start == 0
                        && gate(name).wait() == Release::Abort
                    {
                        return Err(CommandError::failed(format!("{label} interrupted")));
                    }
                }
                env.payload_mut()
                    .record(format!("{label} from {start}"), recovering);
                Ok(())
            }
        }
    }

    fn is_priority(&self) -> bool {
        matches!(self, Op::Urgent(_))
    }
}
