// File: testing-framework/src/error.rs
//
// Harness error taxonomy
//
// Every layer below the scenario boundary returns `HarnessError`. Scenario
// bodies use `anyhow` and the runner converts whatever they return into a
// named failure record.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Result alias used by the harness internals
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors raised by process supervision, RPC transports, node handles and waiters
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Required executable could not be resolved
    #[error("binary '{binary}' not found (searched: {})", display_paths(.searched))]
    BinaryNotFound {
        /// Name or path that was requested
        binary: String,
        /// Locations that were tried
        searched: Vec<PathBuf>,
    },

    /// Remote node answered with a non-null error field
    #[error("remote error from {method}: {message}{}", display_code(.code))]
    RemoteError {
        /// Method that failed
        method: String,
        /// Numeric error code when the remote supplies one
        code: Option<i64>,
        /// Remote error text
        message: String,
    },

    /// Caller built an RPC invocation the transport cannot express
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),

    /// A polled condition never became true
    #[error("timed out after {attempts} attempt(s) in {elapsed:?}: {message}")]
    WaitTimeout {
        /// Diagnostic naming the awaited condition
        message: String,
        /// Number of predicate evaluations performed
        attempts: u32,
        /// Time spent waiting
        elapsed: Duration,
    },

    /// Connect RPC reported an error envelope
    #[error("failed to connect to peer {peer}: {message}")]
    PeerConnect {
        /// Address we tried to reach
        peer: String,
        /// Remote error text
        message: String,
    },

    /// Peer identity is not present in the local peer mapping
    #[error("unknown peer '{0}', connect to it first")]
    UnknownPeer(String),

    /// Node reported no balance entry for the coin type
    #[error("no balance entry for coin type {0}")]
    UnknownCoinType(u32),

    /// Connection level failure (refused, reset, timed out)
    #[error("transport error talking to {endpoint}: {message}")]
    Transport {
        /// URL or address of the remote end
        endpoint: String,
        /// Underlying failure
        message: String,
    },

    /// Endpoint refused the credentials (HTTP 401 or 403)
    #[error("{endpoint} rejected the RPC credentials (HTTP {status})")]
    Unauthorized {
        /// URL of the remote end
        endpoint: String,
        /// HTTP status code
        status: u16,
    },

    /// Response envelope could not be interpreted
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Node process terminated while we were waiting on it
    #[error("process '{name}' exited unexpectedly ({status})")]
    ProcessExited {
        /// Node name
        name: String,
        /// Exit status description
        status: String,
    },

    /// Coin node is older than the harness supports
    #[error("{binary} version {found} is older than required {required}")]
    VersionTooOld {
        /// Binary name
        binary: String,
        /// Reported version
        found: u64,
        /// Minimum version
        required: u64,
    },

    /// Invalid configuration or scenario manifest
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or process IO failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error(transparent)]
    Json(#[from] SerdeError),
}

impl HarnessError {
    /// Build a transport error for the given endpoint
    pub fn transport(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Remote error code, if this is a `RemoteError` carrying one
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::RemoteError { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether the error happened below the RPC layer (nothing was answered)
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "PATH".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_code(code: &Option<i64>) -> String {
    match code {
        Some(code) => format!(" (code {})", code),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display_includes_code() {
        let err = HarnessError::RemoteError {
            method: "getnetworkinfo".to_string(),
            code: Some(-28),
            message: "Loading block index...".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "remote error from getnetworkinfo: Loading block index... (code -28)"
        );
        assert_eq!(err.remote_code(), Some(-28));
    }

    #[test]
    fn test_binary_not_found_lists_paths() {
        let err = HarnessError::BinaryNotFound {
            binary: "lit".to_string(),
            searched: vec![PathBuf::from("/usr/bin"), PathBuf::from("/opt/bin")],
        };
        assert!(err.to_string().contains("/usr/bin, /opt/bin"));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_unauthorized_is_not_transport() {
        let err = HarnessError::Unauthorized {
            endpoint: "http://127.0.0.1:18443/".to_string(),
            status: 401,
        };
        assert_eq!(
            err.to_string(),
            "http://127.0.0.1:18443/ rejected the RPC credentials (HTTP 401)"
        );
        assert!(!err.is_transport());
    }
}
