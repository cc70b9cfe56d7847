// File: testing-framework/src/rpc/mod.rs
//
// JSON-RPC plumbing shared by the node handles
//
// Two transports implement `RpcTransport`: one HTTP POST per call (coin
// node, and the payment node's `/oneoff` endpoint) and a persistent
// websocket where every call sends one frame and reads the next one back
// (payment node `/ws`). Both build the same envelope and decode responses
// the same way.

/// One-shot HTTP transport
pub mod http;
/// Persistent websocket transport
pub mod websocket;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::debug;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HarnessError, Result};

pub use http::HttpRpcClient;
pub use websocket::WebSocketRpcClient;

/// Request ids wrap around at this bound
pub const REQUEST_ID_BOUND: u64 = 10_000;

/// Namespace the payment node registers its methods under
pub const LIT_NAMESPACE: &str = "LitRPC";

/// Parameters of one call: nothing, positional values or named values
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RpcParams {
    /// No parameters
    #[default]
    None,
    /// Ordered arguments
    Positional(Vec<Value>),
    /// Keyword arguments
    Named(Map<String, Value>),
}

impl RpcParams {
    /// Positional arguments
    pub fn positional(values: Vec<Value>) -> Self {
        if values.is_empty() {
            Self::None
        } else {
            Self::Positional(values)
        }
    }

    /// Named arguments from a JSON object (`null` means no parameters)
    pub fn named(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::None),
            Value::Object(map) if map.is_empty() => Ok(Self::None),
            Value::Object(map) => Ok(Self::Named(map)),
            other => Err(HarnessError::InvalidInvocation(format!(
                "named parameters must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Combine call-site arguments, refusing a mix of both kinds
    pub fn from_parts(positional: Vec<Value>, named: Map<String, Value>) -> Result<Self> {
        match (positional.is_empty(), named.is_empty()) {
            (false, false) => Err(HarnessError::InvalidInvocation(
                "RPCs must not use a mix of positional and named arguments".to_string(),
            )),
            (false, true) => Ok(Self::Positional(positional)),
            (true, false) => Ok(Self::Named(named)),
            (true, true) => Ok(Self::None),
        }
    }

    /// Encode for the wire according to the transport's convention
    pub fn to_wire(&self, style: ParamStyle) -> Result<Value> {
        match style {
            ParamStyle::Direct => Ok(match self {
                Self::None => Value::Array(Vec::new()),
                Self::Positional(values) => Value::Array(values.clone()),
                Self::Named(map) => Value::Object(map.clone()),
            }),
            ParamStyle::Wrapped => match self {
                Self::None => Ok(Value::Array(vec![Value::Object(Map::new())])),
                Self::Named(map) => Ok(Value::Array(vec![Value::Object(map.clone())])),
                Self::Positional(_) => Err(HarnessError::InvalidInvocation(
                    "payment node RPCs take named parameters only".to_string(),
                )),
            },
        }
    }
}

/// How parameters are laid out in the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `params` is the argument list or object itself (bitcoind)
    Direct,
    /// `params` is a one-element list holding the argument object (lit)
    Wrapped,
}

/// Per-connection request id counter
///
/// Ids increase by one per call and wrap at the bound, so they are unique
/// within any window of `bound` consecutive calls.
#[derive(Debug)]
pub struct RequestIds {
    next: AtomicU64,
    bound: u64,
}

impl RequestIds {
    /// Start at `start % bound`
    pub fn starting_at(start: u64, bound: u64) -> Self {
        let bound = bound.max(1);
        Self {
            next: AtomicU64::new(start % bound),
            bound,
        }
    }

    /// Start at a random point below `bound`
    pub fn random(bound: u64) -> Self {
        let bound = bound.max(1);
        Self::starting_at(rand::thread_rng().gen_range(0..bound), bound)
    }

    /// Take the next id
    pub fn next_id(&self) -> u64 {
        let bound = self.bound;
        // fetch_update with Some always succeeds
        match self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| Some((id + 1) % bound))
        {
            Ok(id) | Err(id) => id,
        }
    }

    /// Wraparound bound
    pub fn bound(&self) -> u64 {
        self.bound
    }
}

/// Request envelope
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    /// Fully qualified method name
    pub method: String,
    /// Encoded parameters
    pub params: Value,
    /// Always "2.0"
    pub jsonrpc: &'static str,
    /// Correlation id
    pub id: String,
}

impl RpcRequest {
    /// Build an envelope, qualifying the method with `namespace` when given
    pub fn new(
        namespace: Option<&str>,
        method: &str,
        params: &RpcParams,
        style: ParamStyle,
        id: u64,
    ) -> Result<Self> {
        let method = match namespace {
            Some(ns) => format!("{}.{}", ns, method),
            None => method.to_string(),
        };
        Ok(Self {
            method,
            params: params.to_wire(style)?,
            jsonrpc: "2.0",
            id: id.to_string(),
        })
    }
}

/// Response envelope
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    /// Call result when successful
    #[serde(default)]
    pub result: Option<Value>,
    /// Error string (lit) or `{code, message}` object (bitcoind)
    #[serde(default)]
    pub error: Option<Value>,
    /// Echo of the request id
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcResponse {
    /// Turn the envelope into the call result
    ///
    /// A non-null `error` becomes `RemoteError`; an id that does not match
    /// the request becomes `Protocol`.
    pub fn into_result(self, method: &str, expected_id: &str) -> Result<Value> {
        if let Some(error) = self.error.filter(|e| !e.is_null()) {
            let (code, message) = split_remote_error(&error);
            return Err(HarnessError::RemoteError {
                method: method.to_string(),
                code,
                message,
            });
        }

        match &self.id {
            None | Some(Value::Null) => {}
            Some(id) if id_matches(id, expected_id) => {}
            Some(id) => {
                return Err(HarnessError::Protocol(format!(
                    "response id {} does not match request id {} for {}",
                    id, expected_id, method
                )))
            }
        }

        Ok(self.result.unwrap_or(Value::Null))
    }
}

fn id_matches(id: &Value, expected: &str) -> bool {
    match id {
        Value::String(s) => s == expected,
        Value::Number(n) => n.to_string() == expected,
        _ => false,
    }
}

fn split_remote_error(error: &Value) -> (Option<i64>, String) {
    match error {
        Value::String(message) => (None, message.clone()),
        Value::Object(obj) => {
            let code = obj.get("code").and_then(Value::as_i64);
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            (code, message)
        }
        other => (None, other.to_string()),
    }
}

/// A connection able to perform JSON-RPC calls
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Call `method` and return the raw `result`
    async fn call(&self, method: &str, params: RpcParams) -> Result<Value>;

    /// Where the transport points, for diagnostics (never contains credentials)
    fn endpoint(&self) -> String;

    /// Release the connection; later calls fail with a transport error
    async fn close(&self) {}
}

/// Call and decode the result into `T`
pub async fn call_typed<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: RpcParams,
) -> Result<T> {
    let value = transport.call(method, params).await?;
    debug!("{} -> {}", method, value);
    serde_json::from_value(value).map_err(|e| {
        HarnessError::Protocol(format!("unexpected result shape for {}: {}", method, e))
    })
}
