//! Commands and the environment they execute in.

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use ordo_core::{Checkpoint, ContextId, Ticket};

use crate::store::{KeySpace, StoreError};

/// A serializable unit of work executed against one context's payload.
///
/// Implement this on a closed enum of the commands an application submits.
pub trait Command:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    /// Payload type of the contexts this command runs against.
    type Context: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static;

    fn execute(&self, env: &mut Environment<'_, Self::Context>) -> Result<(), CommandError>;

    /// Priority commands run ahead of ordinary ones.
    fn is_priority(&self) -> bool {
        false
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandError {
    #[error("command failed: {0}")]
    Failed(String),
    #[error("checkpoint i/o failed: {0}")]
    Checkpoint(#[from] StoreError),
    #[error("command panicked: {0}")]
    Panicked(String),
}

impl CommandError {
    pub fn failed(reason: impl Into<String>) -> Self {
        CommandError::Failed(reason.into())
    }
}

/// Write-through access to the checkpoint of the envelope being executed.
pub trait CheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, StoreError>;
    fn save(&self, checkpoint: Option<Checkpoint>) -> Result<(), StoreError>;
}

/// What a command sees while it runs.
pub struct Environment<'a, P> {
    context_id: &'a ContextId,
    ticket: Ticket,
    recovering: bool,
    payload: P,
    dirty: bool,
    checkpoints: &'a dyn CheckpointStore,
}

impl<'a, P> Environment<'a, P> {
    pub fn new(
        context_id: &'a ContextId,
        ticket: Ticket,
        recovering: bool,
        payload: P,
        checkpoints: &'a dyn CheckpointStore,
    ) -> Self {
        Self {
            context_id,
            ticket,
            recovering,
            payload,
            dirty: false,
            checkpoints,
        }
    }

    pub fn context_id(&self) -> &ContextId {
        self.context_id
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// True when this ticket was submitted to an earlier coordinator instance
    /// or its envelope had already been started.
    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut P {
        self.dirty = true;
        &mut self.payload
    }

    pub fn replace_payload(&mut self, payload: P) -> P {
        self.dirty = true;
        std::mem::replace(&mut self.payload, payload)
    }

    pub fn load_checkpoint<T: DeserializeOwned>(&self) -> Result<Option<T>, CommandError> {
        let Some(checkpoint) = self.checkpoints.load()? else {
            return Ok(None);
        };
        checkpoint
            .decode()
            .map(Some)
            .map_err(|source| CommandError::Checkpoint(codec_error(source)))
    }

    pub fn save_checkpoint<T: Serialize>(&self, state: &T) -> Result<(), CommandError> {
        let checkpoint =
            Checkpoint::encode(state).map_err(|source| CommandError::Checkpoint(codec_error(source)))?;
        self.checkpoints.save(Some(checkpoint))?;
        Ok(())
    }

    pub fn clear_checkpoint(&self) -> Result<(), CommandError> {
        self.checkpoints.save(None)?;
        Ok(())
    }

    /// The payload, if the command touched it.
    pub fn into_changed_payload(self) -> Option<P> {
        self.dirty.then_some(self.payload)
    }
}

fn codec_error(source: serde_json::Error) -> StoreError {
    StoreError::Codec {
        space: KeySpace::ColocatedEnvelopes,
        source,
    }
}
