//! Broker server.
//!
//! Listens on a Unix domain socket. Each connection must complete the
//! token handshake before anything else; every action request is then
//! classified by the policy engine from scratch, checked against the
//! approval service, audited, and only then executed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error, info, warn};

use sentra_audit::{AuditAction, AuditEntry, AuditSink};
use sentra_core::{RequestId, SessionId, Timestamp};
use sentra_events::{EventReceiver, SessionBus, SessionEvent};
use sentra_policy::{
    ActionClassification, ActionContext, ActionMode, ApprovalLevel, ApprovalService, PolicyEngine,
    ZoneRoots,
};

use crate::framing::{read_frame, write_frame, FrameError};
use crate::protocol::{
    BrokerErrorCode, BrokerRequest, BrokerResponse, CancelRequest, ExecuteRequest, ExecuteResult,
    HelloRequest, ListDirRequest, PingRequest, ReadFileRequest, WriteFileRequest, MIN_TOKEN_LEN,
};

/// Server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or accepting on the socket failed.
    #[error("broker socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Static broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Path of the Unix socket to listen on.
    pub socket_path: PathBuf,
    /// Pre-shared handshake token, provisioned out-of-band.
    pub token: String,
    /// Zone roots used to classify action targets.
    pub roots: ZoneRoots,
}

/// The privileged broker.
pub struct BrokerServer {
    config: BrokerConfig,
    engine: PolicyEngine,
    approval: ApprovalService,
    audit: Arc<dyn AuditSink>,
    bus: SessionBus,
    session_id: SessionId,
    // Serializes state-mutating actions across all connections.
    mutate_lock: Mutex<()>,
}

impl std::fmt::Debug for BrokerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerServer")
            .field("socket_path", &self.config.socket_path)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

type Running = Arc<Mutex<HashMap<RequestId, Arc<Notify>>>>;

impl BrokerServer {
    /// Create a server.
    #[must_use]
    pub fn new(
        config: BrokerConfig,
        engine: PolicyEngine,
        approval: ApprovalService,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            engine,
            approval,
            audit,
            bus: SessionBus::new(),
            session_id: SessionId::new(),
            mutate_lock: Mutex::new(()),
        }
    }

    /// Subscribe to governance events this broker publishes.
    #[must_use]
    pub fn events(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    /// Bind the socket and serve connections until the task is aborted.
    pub async fn run(self: Arc<Self>) -> Result<(), ServerError> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }
        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!(path = %self.config.socket_path.display(), "broker listening");

        loop {
            let (stream, _addr) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(error) = server.handle_connection(stream).await {
                    warn!(%error, "broker connection ended with error");
                }
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: UnixStream) -> Result<(), FrameError> {
        let (mut reader, writer) = stream.into_split();

        let (tx, rx) = mpsc::channel::<BrokerResponse>(64);
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let running: Running = Arc::new(Mutex::new(HashMap::new()));
        let mut handshaken = false;

        while let Some(frame) = read_frame(&mut reader).await? {
            let request: BrokerRequest = match serde_json::from_slice(&frame) {
                Ok(request) => request,
                Err(error) => {
                    debug!(%error, "rejecting malformed request");
                    // No trustworthy id to echo; a fresh one keeps the
                    // response well-formed without correlating to anything.
                    let _ = tx
                        .send(BrokerResponse::err(
                            RequestId::new(),
                            BrokerErrorCode::InvalidRequest,
                            "request failed schema validation",
                        ))
                        .await;
                    continue;
                },
            };

            if let BrokerRequest::Hello(HelloRequest { id, token }) = &request {
                if self.check_token(token) {
                    handshaken = true;
                    let _ = tx
                        .send(BrokerResponse::ok(*id, serde_json::json!({"protocol": 1})))
                        .await;
                } else {
                    warn!("handshake failed, closing connection");
                    let _ = tx
                        .send(BrokerResponse::err(
                            *id,
                            BrokerErrorCode::HandshakeFailed,
                            "handshake token rejected",
                        ))
                        .await;
                    break;
                }
                continue;
            }

            if !handshaken {
                let _ = tx
                    .send(BrokerResponse::err(
                        request.id(),
                        BrokerErrorCode::HandshakeRequired,
                        "handshake must complete before requests are accepted",
                    ))
                    .await;
                continue;
            }

            if let BrokerRequest::Cancel(CancelRequest { id, target_id }) = request {
                let cancelled = {
                    let running = running.lock().await;
                    running.get(&target_id).map(|notify| notify.notify_one())
                };
                // Already-completed targets make cancellation a no-op.
                let _ = tx
                    .send(BrokerResponse::ok(
                        id,
                        serde_json::json!({"cancelled": cancelled.is_some()}),
                    ))
                    .await;
                continue;
            }

            let id = request.id();
            let cancel = Arc::new(Notify::new());
            running.lock().await.insert(id, Arc::clone(&cancel));

            let server = Arc::clone(&self);
            let tx = tx.clone();
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                let response = server.handle_request(request, &cancel).await;
                running.lock().await.remove(&id);
                let _ = tx.send(response).await;
            });
        }

        drop(tx);
        let _ = writer_task.await;
        Ok(())
    }

    fn check_token(&self, presented: &str) -> bool {
        if presented.len() < MIN_TOKEN_LEN {
            return false;
        }
        presented
            .as_bytes()
            .ct_eq(self.config.token.as_bytes())
            .into()
    }

    async fn handle_request(&self, request: BrokerRequest, cancel: &Notify) -> BrokerResponse {
        let id = request.id();
        let mutating = request.is_mutating();

        match request {
            BrokerRequest::Ping(PingRequest { id }) => {
                BrokerResponse::ok(id, serde_json::json!({"pong": true}))
            },
            BrokerRequest::Execute(ExecuteRequest {
                id,
                command,
                args,
                mode,
                cwd,
                env,
                timeout_ms,
            }) => {
                let mut zone = self.config.roots.classify(&cwd);
                let mut target_paths = Vec::new();
                // A script named in the arguments is as much the action's
                // target as the cwd; the more restrictive zone of the two
                // wins, so a workspace cwd cannot launder a secrets script.
                if let Some(script) = script_argument(&args) {
                    let script = if script.is_absolute() {
                        script
                    } else {
                        cwd.join(script)
                    };
                    zone = zone.escalate(self.config.roots.classify(&script));
                    target_paths.push(script);
                }
                let context = ActionContext::new(&command, mode, zone)
                    .with_args(args.clone())
                    .with_cwd(&cwd)
                    .with_target_paths(target_paths);
                if let Some(refusal) = self.authorize(id, &context).await {
                    return refusal;
                }

                let _guard = if mutating {
                    Some(self.mutate_lock.lock().await)
                } else {
                    None
                };
                self.run_command(id, &command, &args, mode, &cwd, &env, timeout_ms, cancel)
                    .await
            },
            BrokerRequest::ReadFile(ReadFileRequest { id, path }) => {
                let context = ActionContext::new(
                    "readFile",
                    ActionMode::Exec,
                    self.config.roots.classify(&path),
                )
                .with_target_paths(vec![path.clone()]);
                if let Some(refusal) = self.authorize(id, &context).await {
                    return refusal;
                }
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => {
                        BrokerResponse::ok(id, serde_json::json!({"contents": contents}))
                    },
                    Err(error) => execution_error(id, &error.to_string()),
                }
            },
            BrokerRequest::WriteFile(WriteFileRequest {
                id,
                path,
                content,
                create_dirs,
            }) => {
                let context = ActionContext::new(
                    "writeFile",
                    ActionMode::Exec,
                    self.config.roots.classify(&path),
                )
                .with_target_paths(vec![path.clone()]);
                if let Some(refusal) = self.authorize(id, &context).await {
                    return refusal;
                }
                let _guard = self.mutate_lock.lock().await;
                if create_dirs {
                    if let Some(parent) = path.parent() {
                        if let Err(error) = tokio::fs::create_dir_all(parent).await {
                            return execution_error(id, &error.to_string());
                        }
                    }
                }
                match tokio::fs::write(&path, content).await {
                    Ok(()) => BrokerResponse::ok(id, serde_json::json!({"written": true})),
                    Err(error) => execution_error(id, &error.to_string()),
                }
            },
            BrokerRequest::ListDir(ListDirRequest { id, path }) => {
                let context = ActionContext::new(
                    "listDir",
                    ActionMode::Exec,
                    self.config.roots.classify(&path),
                )
                .with_target_paths(vec![path.clone()]);
                if let Some(refusal) = self.authorize(id, &context).await {
                    return refusal;
                }
                match list_dir(&path).await {
                    Ok(names) => BrokerResponse::ok(id, serde_json::json!({"entries": names})),
                    Err(error) => execution_error(id, &error.to_string()),
                }
            },
            // Hello and Cancel are handled on the connection loop.
            BrokerRequest::Hello(_) | BrokerRequest::Cancel(_) => BrokerResponse::err(
                id,
                BrokerErrorCode::InvalidRequest,
                "request not valid at this stage",
            ),
        }
    }

    /// Classify and approve, recording the audit trail. `Some` is a refusal.
    async fn authorize(
        &self,
        id: RequestId,
        context: &ActionContext,
    ) -> Option<BrokerResponse> {
        let classification = self.engine.classify_action(context);
        self.audit_classification(&context.command, &classification);

        if classification.level == ApprovalLevel::Deny {
            self.audit_refusal(BrokerErrorCode::PolicyDenied, &classification.reason);
            return Some(BrokerResponse::err(
                id,
                BrokerErrorCode::PolicyDenied,
                classification.reason,
            ));
        }

        let decision = self.approval.decide(&classification).await;
        if let sentra_policy::ApprovalDecision::Refused { reason } = decision {
            self.audit_refusal(BrokerErrorCode::ApprovalDenied, &reason);
            return Some(BrokerResponse::err(
                id,
                BrokerErrorCode::ApprovalDenied,
                reason,
            ));
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_command(
        &self,
        id: RequestId,
        command: &str,
        args: &[String],
        mode: ActionMode,
        cwd: &Path,
        env: &HashMap<String, String>,
        timeout_ms: Option<u64>,
        cancel: &Notify,
    ) -> BrokerResponse {
        let mut cmd = match mode {
            ActionMode::Exec => {
                let mut cmd = Command::new(command);
                cmd.args(args);
                cmd
            },
            ActionMode::Shell => {
                let mut line = command.to_string();
                for arg in args {
                    line.push(' ');
                    line.push_str(arg);
                }
                let mut cmd = Command::new("/bin/sh");
                cmd.arg("-c").arg(line);
                cmd
            },
        };
        cmd.current_dir(cwd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output();
        // No explicit timeout still gets a generous upper bound so an
        // abandoned process cannot pin the broker forever.
        let timeout = timeout_ms.map_or(Duration::from_secs(86_400), Duration::from_millis);

        let result = tokio::select! {
            outcome = tokio::time::timeout(timeout, output) => outcome,
            () = cancel.notified() => {
                debug!(%id, "execution cancelled");
                return execution_error(id, "cancelled by request");
            },
        };

        match result {
            Ok(Ok(output)) => {
                let result = ExecuteResult {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    timed_out: false,
                };
                match serde_json::to_value(&result) {
                    Ok(value) => BrokerResponse::ok(id, value),
                    Err(error) => execution_error(id, &error.to_string()),
                }
            },
            Ok(Err(error)) => {
                // Spawn failures stay terse; no internal detail crosses the channel.
                warn!(%id, %error, "command failed to run");
                execution_error(id, "command failed to run")
            },
            Err(_) => {
                let result = ExecuteResult {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    timed_out: true,
                };
                match serde_json::to_value(&result) {
                    Ok(value) => BrokerResponse::ok(id, value),
                    Err(error) => execution_error(id, &error.to_string()),
                }
            },
        }
    }

    fn audit_classification(&self, command: &str, classification: &ActionClassification) {
        self.bus.publish(SessionEvent::Classification {
            session_id: self.session_id,
            command: command.to_string(),
            level: classification.level.to_string(),
            approved: classification.approved,
            reason: classification.reason.clone(),
            timestamp: Timestamp::now(),
        });
        let entry = AuditEntry::new(
            self.session_id,
            AuditAction::Classification {
                command: command.to_string(),
                classification: classification.clone(),
            },
        );
        if let Err(error) = self.audit.record(&entry) {
            error!(%error, "failed to record audit entry");
        }
    }

    fn audit_refusal(&self, code: BrokerErrorCode, reason: &str) {
        let entry = AuditEntry::new(
            self.session_id,
            AuditAction::BrokerRefusal {
                code: code.to_string(),
                reason: reason.to_string(),
            },
        );
        if let Err(error) = self.audit.record(&entry) {
            error!(%error, "failed to record audit entry");
        }
    }
}

async fn write_responses(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<BrokerResponse>) {
    while let Some(response) = rx.recv().await {
        let Ok(payload) = serde_json::to_vec(&response) else {
            error!("failed to serialize response");
            continue;
        };
        if let Err(error) = write_frame(&mut writer, &payload).await {
            warn!(%error, "failed to write response frame");
            break;
        }
    }
}

/// Extensions treated as executable scripts when they appear in arguments.
const SCRIPT_EXTENSIONS: &[&str] = &["ps1", "bat", "cmd", "js", "py", "vbs", "psm1", "psd1", "sh"];

fn script_argument(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .find(|arg| {
            Path::new(arg)
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    SCRIPT_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                })
        })
        .map(PathBuf::from)
}

async fn list_dir(path: &Path) -> std::io::Result<Vec<String>> {
    let mut dir = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn execution_error(id: RequestId, detail: &str) -> BrokerResponse {
    BrokerResponse::err(id, BrokerErrorCode::ExecutionError, detail)
}
