//! Lenient decoding for collection responses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// A JSON array whose undecodable elements are dropped instead of failing
/// the whole response.
#[derive(Debug, Clone, PartialEq)]
pub struct FailableVec<T>(pub Vec<T>);

impl<T> FailableVec<T> {
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for FailableVec<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
        let items = raw
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    debug!(index, error = %e, "dropping undecodable element");
                    None
                }
            })
            .collect();
        Ok(Self(items))
    }
}
