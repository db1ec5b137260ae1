use std::ops::Deref;

use crate::error::BridgeError;
use crate::value::{GenericMap, GenericValue};

/// Named arguments for a UI call. Always map-shaped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentBag(GenericMap);

impl ArgumentBag {
    /// Coerce `value` into an argument bag.
    ///
    /// Only map-shaped values are accepted. There is no empty-bag fallback:
    /// a call whose arguments cannot be built must not reach the UI manager.
    pub fn build(value: GenericValue) -> Result<Self, BridgeError> {
        match value {
            GenericValue::Object(map) => Ok(Self(map)),
            other => Err(BridgeError::ArgumentCoercion {
                found: other.kind(),
            }),
        }
    }

    pub fn into_inner(self) -> GenericMap {
        self.0
    }

    pub fn to_value(&self) -> GenericValue {
        GenericValue::Object(self.0.clone())
    }
}

impl Deref for ArgumentBag {
    type Target = GenericMap;

    fn deref(&self) -> &GenericMap {
        &self.0
    }
}
