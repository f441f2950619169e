use thiserror::Error;

use ordo_core::{CoreError, Effect, Transience};

use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors surfaced by the ordo runtime outside the submission path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(err) => err.transience(),
            Error::Store(err) => err.transience(),
            Error::Config(_) => Transience::Permanent,
            Error::Io(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Core(err) => err.effect(),
            Error::Store(err) => err.effect(),
            Error::Config(ConfigError::Write { .. }) | Error::Io(_) => Effect::Unknown,
            Error::Config(_) => Effect::None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
