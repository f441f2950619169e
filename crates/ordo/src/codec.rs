//! JSON encoding of stored values.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::{KeySpace, StoreError};

pub fn encode<T: Serialize + ?Sized>(space: KeySpace, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|source| StoreError::Codec { space, source })
}

pub fn decode<T: DeserializeOwned>(space: KeySpace, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Codec { space, source })
}
