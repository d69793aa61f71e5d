//! Positional parameter list with typed accessors.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::RpcError;

/// Positional arguments passed to a handler, in call order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(Vec<Value>);

impl Params {
    /// Wrap a list of values.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Deserialize the argument at `index`, failing if it is absent or mistyped.
    pub fn required<T: DeserializeOwned>(&self, index: usize) -> Result<T, RpcError> {
        let value = self.0.get(index).ok_or_else(|| {
            RpcError::invalid_params(format!("Missing required parameter at position {index}"))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            RpcError::invalid_params(format!("Invalid parameter at position {index}: {e}"))
        })
    }

    /// Deserialize the argument at `index`, treating absence and `null` as `None`.
    pub fn optional<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, RpcError> {
        match self.0.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                RpcError::invalid_params(format!("Invalid parameter at position {index}: {e}"))
            }),
        }
    }

    /// Raw argument at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments were passed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow all arguments.
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    /// Unwrap into the underlying list.
    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}
