//! Broker wire schema.
//!
//! Requests and responses are JSON objects. Every request carries a
//! unique `id` echoed by exactly one response. An unknown `type`, a
//! missing field or an undeclared extra field fails deserialization as a
//! whole; a partially-valid request is never acted on.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use sentra_core::RequestId;
use sentra_policy::ActionMode;

/// Minimum accepted handshake token length.
pub const MIN_TOKEN_LEN: usize = 16;

/// Generate a fresh handshake token for provisioning at spawn time.
#[must_use]
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Handshake payload. Must be the first request on a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelloRequest {
    /// Request id.
    pub id: RequestId,
    /// Pre-shared token provisioned at spawn time.
    pub token: String,
}

/// Command execution payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecuteRequest {
    /// Request id.
    pub id: RequestId,
    /// Program to run.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Exec or shell interpretation.
    pub mode: ActionMode,
    /// Working directory.
    pub cwd: PathBuf,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Kill the process after this many milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// File read payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadFileRequest {
    /// Request id.
    pub id: RequestId,
    /// File to read.
    pub path: PathBuf,
}

/// File write payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteFileRequest {
    /// Request id.
    pub id: RequestId,
    /// File to write.
    pub path: PathBuf,
    /// New content.
    pub content: String,
    /// Create missing parent directories first.
    #[serde(default)]
    pub create_dirs: bool,
}

/// Directory listing payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListDirRequest {
    /// Request id.
    pub id: RequestId,
    /// Directory to list.
    pub path: PathBuf,
}

/// Liveness probe payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PingRequest {
    /// Request id.
    pub id: RequestId,
}

/// Cancellation payload. No-op if the target already completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CancelRequest {
    /// Request id.
    pub id: RequestId,
    /// The request to cancel.
    pub target_id: RequestId,
}

/// A request from the unprivileged side.
///
/// The payload structs deny unknown fields, so an envelope carrying
/// anything beyond its declared schema fails validation as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BrokerRequest {
    /// Handshake.
    Hello(HelloRequest),
    /// Execute a command.
    Execute(ExecuteRequest),
    /// Read a file.
    ReadFile(ReadFileRequest),
    /// Write a file.
    WriteFile(WriteFileRequest),
    /// List a directory.
    ListDir(ListDirRequest),
    /// Liveness probe.
    Ping(PingRequest),
    /// Cancel an in-flight request.
    Cancel(CancelRequest),
}

impl BrokerRequest {
    /// The envelope id of this request.
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Hello(HelloRequest { id, .. })
            | Self::Execute(ExecuteRequest { id, .. })
            | Self::ReadFile(ReadFileRequest { id, .. })
            | Self::WriteFile(WriteFileRequest { id, .. })
            | Self::ListDir(ListDirRequest { id, .. })
            | Self::Ping(PingRequest { id })
            | Self::Cancel(CancelRequest { id, .. }) => *id,
        }
    }

    /// Whether this request mutates state and must be serialized.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Execute(_) | Self::WriteFile(_))
    }
}

/// Stable error codes returned to the unprivileged side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerErrorCode {
    /// The message failed schema validation.
    InvalidRequest,
    /// A request arrived before a successful handshake.
    HandshakeRequired,
    /// The handshake token was wrong; the connection is closed.
    HandshakeFailed,
    /// The platform antimalware interface blocked the content.
    AmsiBlocked,
    /// The policy engine classified the action as DENY.
    PolicyDenied,
    /// The approval service refused the action.
    ApprovalDenied,
    /// The action itself failed.
    ExecutionError,
}

impl fmt::Display for BrokerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::HandshakeRequired => "HANDSHAKE_REQUIRED",
            Self::HandshakeFailed => "HANDSHAKE_FAILED",
            Self::AmsiBlocked => "AMSI_BLOCKED",
            Self::PolicyDenied => "POLICY_DENIED",
            Self::ApprovalDenied => "APPROVAL_DENIED",
            Self::ExecutionError => "EXECUTION_ERROR",
        };
        write!(f, "{code}")
    }
}

/// Result of an executed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    /// Process exit code; -1 when terminated by signal or timeout.
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Whether the timeout fired.
    pub timed_out: bool,
}

/// A response to one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerResponse {
    /// Id of the request this answers.
    pub id: RequestId,
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Human-readable error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<BrokerErrorCode>,
}

impl BrokerResponse {
    /// Success response.
    #[must_use]
    pub fn ok(id: RequestId, data: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    /// Failure response.
    #[must_use]
    pub fn err(id: RequestId, code: BrokerErrorCode, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }
}
