//! Broker client.
//!
//! Connects to the broker socket, performs the handshake, and exposes
//! typed request methods. Requests are pipelined: each carries a unique
//! id and a background read task routes responses back to their callers,
//! so concurrent requests on one channel are fine.
//!
//! Nothing survives a disconnect. A dropped connection fails all pending
//! requests and a new client must handshake from scratch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use sentra_core::RequestId;
use sentra_policy::ActionMode;

use crate::framing::{read_frame, write_frame, FrameError};
use crate::protocol::{
    BrokerErrorCode, BrokerRequest, BrokerResponse, CancelRequest, ExecuteRequest, ExecuteResult,
    HelloRequest, ListDirRequest, PingRequest, ReadFileRequest, WriteFileRequest,
};

/// Client-side errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting to the socket failed.
    #[error("broker connect error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel codec failed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A message could not be serialized or parsed.
    #[error("broker serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection closed with the request still pending.
    #[error("broker connection closed")]
    ConnectionClosed,

    /// The broker refused the request.
    #[error("broker refused ({code}): {message}")]
    Refused {
        /// Stable error code.
        code: BrokerErrorCode,
        /// Broker-supplied reason.
        message: String,
    },

    /// The broker answered with an unexpected payload shape.
    #[error("unexpected broker response payload")]
    UnexpectedPayload,
}

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<BrokerResponse>>>>;

/// Handle to one broker connection.
pub struct BrokerClient {
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    reader_task: JoinHandle<()>,
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient").finish_non_exhaustive()
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl BrokerClient {
    /// Connect and handshake. Fails if the broker rejects the token.
    pub async fn connect(
        socket_path: impl AsRef<Path>,
        token: &str,
    ) -> Result<Self, ClientError> {
        let socket_path: PathBuf = socket_path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&socket_path).await?;
        let (reader, writer) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader_task = tokio::spawn(dispatch_responses(reader, Arc::clone(&pending)));

        let client = Self {
            writer: Mutex::new(writer),
            pending,
            reader_task,
        };

        let id = RequestId::new();
        let response = client
            .call(BrokerRequest::Hello(HelloRequest {
                id,
                token: token.to_string(),
            }))
            .await?;
        if !response.success {
            return Err(ClientError::Refused {
                code: response.code.unwrap_or(BrokerErrorCode::HandshakeFailed),
                message: response
                    .error
                    .unwrap_or_else(|| "handshake rejected".to_string()),
            });
        }
        debug!(path = %socket_path.display(), "broker handshake complete");
        Ok(client)
    }

    /// Send one request and await its response.
    pub async fn call(&self, request: BrokerRequest) -> Result<BrokerResponse, ClientError> {
        let id = request.id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let payload = serde_json::to_vec(&request)?;
        {
            let mut writer = self.writer.lock().await;
            if let Err(error) = write_frame(&mut *writer, &payload).await {
                self.pending.lock().await.remove(&id);
                return Err(error.into());
            }
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let response = self
            .call(BrokerRequest::Ping(PingRequest {
                id: RequestId::new(),
            }))
            .await?;
        expect_success(response).map(|_| ())
    }

    /// Execute a command under broker governance.
    pub async fn execute(
        &self,
        command: impl Into<String>,
        args: Vec<String>,
        mode: ActionMode,
        cwd: impl Into<PathBuf>,
        timeout_ms: Option<u64>,
    ) -> Result<ExecuteResult, ClientError> {
        let response = self
            .call(BrokerRequest::Execute(ExecuteRequest {
                id: RequestId::new(),
                command: command.into(),
                args,
                mode,
                cwd: cwd.into(),
                env: HashMap::new(),
                timeout_ms,
            }))
            .await?;
        let data = expect_success(response)?;
        Ok(serde_json::from_value(data)?)
    }

    /// Read a file through the broker.
    pub async fn read_file(&self, path: impl Into<PathBuf>) -> Result<String, ClientError> {
        let response = self
            .call(BrokerRequest::ReadFile(ReadFileRequest {
                id: RequestId::new(),
                path: path.into(),
            }))
            .await?;
        let data = expect_success(response)?;
        data.get("contents")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or(ClientError::UnexpectedPayload)
    }

    /// Write a file through the broker.
    pub async fn write_file(
        &self,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.write_file_opts(path, content, false).await
    }

    /// Write a file, optionally creating missing parent directories.
    pub async fn write_file_opts(
        &self,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        create_dirs: bool,
    ) -> Result<(), ClientError> {
        let response = self
            .call(BrokerRequest::WriteFile(WriteFileRequest {
                id: RequestId::new(),
                path: path.into(),
                content: content.into(),
                create_dirs,
            }))
            .await?;
        expect_success(response).map(|_| ())
    }

    /// List a directory through the broker.
    pub async fn list_dir(&self, path: impl Into<PathBuf>) -> Result<Vec<String>, ClientError> {
        let response = self
            .call(BrokerRequest::ListDir(ListDirRequest {
                id: RequestId::new(),
                path: path.into(),
            }))
            .await?;
        let data = expect_success(response)?;
        data.get("entries")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or(ClientError::UnexpectedPayload)
    }

    /// Cancel an in-flight request. Returns whether anything was cancelled.
    pub async fn cancel(&self, target_id: RequestId) -> Result<bool, ClientError> {
        let response = self
            .call(BrokerRequest::Cancel(CancelRequest {
                id: RequestId::new(),
                target_id,
            }))
            .await?;
        let data = expect_success(response)?;
        data.get("cancelled")
            .and_then(serde_json::Value::as_bool)
            .ok_or(ClientError::UnexpectedPayload)
    }
}

fn expect_success(response: BrokerResponse) -> Result<serde_json::Value, ClientError> {
    if response.success {
        Ok(response.data.unwrap_or(serde_json::Value::Null))
    } else {
        Err(ClientError::Refused {
            code: response.code.unwrap_or(BrokerErrorCode::ExecutionError),
            message: response.error.unwrap_or_else(|| "request failed".to_string()),
        })
    }
}

async fn dispatch_responses(mut reader: OwnedReadHalf, pending: Pending) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                let response: BrokerResponse = match serde_json::from_slice(&frame) {
                    Ok(response) => response,
                    Err(error) => {
                        warn!(%error, "dropping unparseable broker response");
                        continue;
                    },
                };
                if let Some(tx) = pending.lock().await.remove(&response.id) {
                    let _ = tx.send(response);
                } else {
                    debug!(id = %response.id, "response without a pending request");
                }
            },
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "broker channel read failed");
                break;
            },
        }
    }
    // Dropping the senders fails every pending request with ConnectionClosed.
    pending.lock().await.clear();
}
