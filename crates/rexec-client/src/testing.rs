//! In-memory server and signer used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures_util::{stream, StreamExt};
use rexec_core::{
    AuthProof, CallMetadata, KeyLoadReason, MetadataKey, RexecError, RexecResult, RpcCode,
    RpcError, TransferFrame, TransferOp,
};

use crate::auth::{AuthContext, AuthenticatedChannel};
use crate::credentials::KeyCandidate;
use crate::session::SessionHandle;
use crate::signer::ChallengeSigner;
use crate::transport::{
    ChannelConnector, CommandOutput, ConnectReply, InboundFrames, OutboundFrames, RpcChannel,
};

/// Download chunking used by the mock server.
pub(crate) const SERVER_CHUNK: usize = 64 * 1024;

/// How the server answers a handshake presenting a given fingerprint.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Accept,
    /// `Connect` returns `success = false`.
    Refuse,
    /// `PermissionDenied`.
    Deny,
    /// Any other failure.
    Fail(RpcCode),
}

#[derive(Default)]
struct ServerState {
    outcomes: HashMap<String, Outcome>,
    unreachable: bool,
    /// Break transfer reply streams after this many data frames.
    stream_fault: Option<usize>,
    opens: usize,
    handshakes: Vec<CallMetadata>,
    calls: Vec<CallMetadata>,
    commands: Vec<String>,
    received: Vec<TransferFrame>,
    files: HashMap<String, Vec<u8>>,
    closes: usize,
}

/// Shared state behind every channel the mock hands out.
#[derive(Clone, Default)]
pub(crate) struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

/// Keyless handshakes are looked up under this fingerprint.
const KEYLESS: &str = "";

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_outcome(&self, fingerprint: &str, outcome: Outcome) {
        self.with(|s| s.outcomes.insert(fingerprint.to_string(), outcome));
    }

    pub fn accept_keyless(&self) {
        self.set_outcome(KEYLESS, Outcome::Accept);
    }

    pub fn set_unreachable(&self) {
        self.with(|s| s.unreachable = true);
    }

    /// Reply streams end with an error after `data_frames` data frames.
    pub fn fail_stream_after(&self, data_frames: usize) {
        self.with(|s| s.stream_fault = Some(data_frames));
    }

    pub fn put_file(&self, path: &str, data: Vec<u8>) {
        self.with(|s| s.files.insert(path.to_string(), data));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.with(|s| s.files.get(path).cloned())
    }

    pub fn opens(&self) -> usize {
        self.with(|s| s.opens)
    }

    pub fn handshakes(&self) -> Vec<CallMetadata> {
        self.with(|s| s.handshakes.clone())
    }

    /// Metadata of every post-handshake call.
    pub fn calls(&self) -> Vec<CallMetadata> {
        self.with(|s| s.calls.clone())
    }

    pub fn commands(&self) -> Vec<String> {
        self.with(|s| s.commands.clone())
    }

    /// Frames the client sent on the most recent transfer.
    pub fn received_frames(&self) -> Vec<TransferFrame> {
        self.with(|s| s.received.clone())
    }

    pub fn closes(&self) -> usize {
        self.with(|s| s.closes)
    }

    pub fn channel(&self) -> MockChannel {
        MockChannel {
            server: self.clone(),
        }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            server: self.clone(),
        }
    }

    fn outcome_for(&self, metadata: &CallMetadata) -> Outcome {
        let fingerprint = metadata
            .get(MetadataKey::PubKeyFingerprint)
            .unwrap_or(KEYLESS);
        self.with(|s| s.outcomes.get(fingerprint).cloned())
            .unwrap_or(Outcome::Deny)
    }
}

pub(crate) struct MockConnector {
    server: MockServer,
}

impl ChannelConnector for MockConnector {
    type Channel = MockChannel;

    async fn open(&self, host: &str, port: u16) -> Result<MockChannel, RpcError> {
        if self.server.with(|s| s.unreachable) {
            return Err(RpcError::unavailable(format!(
                "cannot reach {host}:{port}: connection refused"
            )));
        }
        self.server.with(|s| s.opens += 1);
        Ok(self.server.channel())
    }
}

pub(crate) struct MockChannel {
    server: MockServer,
}

impl RpcChannel for MockChannel {
    async fn connect(&mut self, metadata: CallMetadata) -> Result<ConnectReply, RpcError> {
        let outcome = self.server.outcome_for(&metadata);
        self.server.with(|s| s.handshakes.push(metadata));
        match outcome {
            Outcome::Accept => Ok(ConnectReply {
                success: true,
                message: "welcome".into(),
            }),
            Outcome::Refuse => Ok(ConnectReply {
                success: false,
                message: "key not authorized".into(),
            }),
            Outcome::Deny => Err(RpcError::new(
                RpcCode::PermissionDenied,
                "authentication failure",
            )),
            Outcome::Fail(code) => Err(RpcError::new(code, "server exploded")),
        }
    }

    async fn exec_command(
        &mut self,
        metadata: CallMetadata,
        command: String,
    ) -> Result<CommandOutput, RpcError> {
        self.server.with(|s| {
            s.calls.push(metadata);
            s.commands.push(command.clone());
        });
        let output = match command.as_str() {
            "true" => CommandOutput {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
            "false" => CommandOutput {
                exit_code: 1,
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
            cmd if cmd.starts_with("echo ") => CommandOutput {
                exit_code: 0,
                stdout: format!("{}\n", &cmd[5..]).into_bytes(),
                stderr: Vec::new(),
            },
            cmd => CommandOutput {
                exit_code: 127,
                stdout: Vec::new(),
                stderr: format!("sh: {cmd}: command not found\n").into_bytes(),
            },
        };
        Ok(output)
    }

    async fn transfer_file(
        &mut self,
        metadata: CallMetadata,
        outbound: OutboundFrames,
    ) -> Result<InboundFrames, RpcError> {
        let frames: Vec<TransferFrame> = outbound.collect().await;
        self.server.with(|s| {
            s.calls.push(metadata);
            s.received = frames.clone();
        });

        let mut frames = frames.into_iter();
        let Some(TransferFrame::Control(control)) = frames.next() else {
            return Err(RpcError::new(
                RpcCode::InvalidArgument,
                "first frame must be a control frame",
            ));
        };

        let replies = match control.operation {
            TransferOp::Upload => {
                let mut contents = Vec::new();
                for frame in frames {
                    match frame {
                        TransferFrame::Data(data) => contents.extend_from_slice(&data),
                        TransferFrame::Control(_) => {
                            return Err(RpcError::new(
                                RpcCode::InvalidArgument,
                                "unexpected control frame",
                            ))
                        }
                    }
                }
                let size = contents.len() as u64;
                self.server
                    .with(|s| s.files.insert(control.remote_path.clone(), contents));
                vec![TransferFrame::upload(
                    control.local_path,
                    control.remote_path,
                    size,
                )]
            }
            TransferOp::Download => {
                let Some(contents) = self.server.file(&control.remote_path) else {
                    return Err(RpcError::new(
                        RpcCode::NotFound,
                        format!("{} does not exist", control.remote_path),
                    ));
                };
                let mut replies = vec![TransferFrame::Control(rexec_core::ControlInfo {
                    operation: TransferOp::Download,
                    local_path: String::new(),
                    remote_path: control.remote_path,
                    file_size: contents.len() as u64,
                })];
                replies.extend(
                    contents
                        .chunks(SERVER_CHUNK)
                        .map(|chunk| TransferFrame::Data(chunk.to_vec())),
                );
                replies
            }
        };

        let mut replies: Vec<Result<TransferFrame, RpcError>> =
            replies.into_iter().map(Ok).collect();
        if let Some(after) = self.server.with(|s| s.stream_fault) {
            // Control frame first, then `after` data frames.
            replies.truncate(after + 1);
            replies.push(Err(RpcError::new(
                RpcCode::Unavailable,
                "connection reset mid-stream",
            )));
        }
        Ok(stream::iter(replies).boxed())
    }

    async fn close(&mut self, metadata: CallMetadata) -> Result<(), RpcError> {
        self.server.with(|s| {
            s.calls.push(metadata);
            s.closes += 1;
        });
        Ok(())
    }
}

/// Signs any candidate with a fingerprint derived from its file name.
///
/// Candidates named in `broken` fail to load, those in `encrypted` need a
/// passphrase. Every invocation is recorded.
#[derive(Clone, Default)]
pub(crate) struct FakeSigner {
    invocations: Arc<Mutex<Vec<String>>>,
    broken: HashSet<String>,
    encrypted: HashSet<String>,
}

impl FakeSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn ChallengeSigner> {
        Arc::new(Self::new())
    }

    pub fn broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    pub fn encrypted(mut self, name: &str) -> Self {
        self.encrypted.insert(name.to_string());
        self
    }

    /// Names of the candidates signed so far, in order.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    fn name(candidate: &KeyCandidate) -> String {
        match candidate {
            KeyCandidate::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            KeyCandidate::Memory { label, .. } => label.clone(),
        }
    }
}

impl ChallengeSigner for FakeSigner {
    fn sign(&self, candidate: &KeyCandidate, identity: &str) -> RexecResult<AuthProof> {
        let name = Self::name(candidate);
        self.invocations.lock().unwrap().push(name.clone());

        if self.encrypted.contains(&name) {
            return Err(RexecError::KeyLoad {
                candidate: candidate.label(),
                reason: KeyLoadReason::PassphraseRequired,
            });
        }
        if self.broken.contains(&name) {
            return Err(RexecError::KeyLoad {
                candidate: candidate.label(),
                reason: KeyLoadReason::Unsupported("garbage".into()),
            });
        }
        Ok(AuthProof {
            algorithm: "fake".into(),
            fingerprint: format!("fp-{name}"),
            signed_payload: identity.as_bytes().to_vec(),
        })
    }
}

/// A session on `server` that authenticates without a key.
pub(crate) fn keyless_session(server: &MockServer) -> SessionHandle<MockChannel> {
    let auth = AuthContext::new("alice", None, None, FakeSigner::shared());
    SessionHandle::new(AuthenticatedChannel::new(server.channel(), auth))
}
