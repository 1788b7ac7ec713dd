//! Request and response records

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// Correlation id chosen by the client
///
/// Any JSON integer is accepted, including ones past `i64::MAX`, and it is
/// written back exactly as it was read. Non-integral numbers are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CallId(Number);

impl From<i64> for CallId {
    fn from(id: i64) -> Self {
        Self(Number::from(id))
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for CallId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = Number::deserialize(deserializer)?;
        if id.is_f64() {
            return Err(de::Error::custom(format!(
                "correlation id must be an integer, got {}",
                id
            )));
        }
        Ok(Self(id))
    }
}

/// An inbound procedure call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Correlation id chosen by the client, echoed back untouched
    pub uuid: CallId,
    /// Address the request was routed to
    pub address: String,
    /// Positional arguments
    pub arguments: Vec<String>,
}

impl Request {
    pub fn new(
        uuid: impl Into<CallId>,
        address: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            address: address.into(),
            arguments,
        }
    }
}

/// JSON body of a request; the address travels outside it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RequestBody {
    pub uuid: CallId,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Reply to a [`Request`]
///
/// A successful call returning `null` and a faulted call both carry
/// `response: null`; only `fault` tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the triggering request
    pub uuid: CallId,
    /// Return value, `null` on failure
    #[serde(default)]
    pub response: Value,
    /// Human-readable error, set iff the call failed
    #[serde(default)]
    pub fault: Option<String>,
}

impl Response {
    pub fn success(uuid: impl Into<CallId>, response: Value) -> Self {
        Self {
            uuid: uuid.into(),
            response,
            fault: None,
        }
    }

    pub fn fault(uuid: impl Into<CallId>, fault: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            response: Value::Null,
            fault: Some(fault.into()),
        }
    }

    /// Check if the call faulted
    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }
}
