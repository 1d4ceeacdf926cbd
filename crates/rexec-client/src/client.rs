//! Connection establishment and the session-level operations.
//!
//! [`Connector`] walks the candidate keys in order, opening a fresh channel
//! per attempt, and binds the first key the server accepts. Auth rejections
//! fall through to the next candidate; any other failure aborts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rexec_core::{RexecError, RexecResult};
use tracing::Instrument;

use crate::auth::{AuthContext, AuthenticatedChannel};
use crate::credentials::{CredentialSource, KeyCandidate};
use crate::session::{SessionHandle, SessionState};
use crate::signer::{ChallengeSigner, SshKeySigner};
use crate::transport::grpc::DEFAULT_CONNECT_TIMEOUT;
use crate::transport::{ChannelConnector, CommandOutput, GrpcConnector};
use crate::{exec, file_transfer};

/// Configuration for connecting to a server.
#[derive(Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    /// Remote identity; also the local account whose keys are scanned.
    pub user: String,
    /// Sent on every call when non-empty.
    pub password: Option<String>,
    /// Use only this key instead of scanning the key directory.
    pub private_key: Option<KeyCandidate>,
    /// Scan this directory instead of `~<user>/.ssh`.
    pub key_dir: Option<PathBuf>,
    /// Time allowed to dial the server.
    pub connect_timeout: Duration,
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: None,
            private_key: None,
            key_dir: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    fn credential_source(&self) -> CredentialSource {
        match &self.key_dir {
            Some(dir) => CredentialSource::with_key_dir(dir),
            None => CredentialSource::new(),
        }
    }
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("key_dir", &self.key_dir)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// A connector to one server.
///
/// Operations take `&mut self`, so a connector serves one caller at a time.
pub struct Connector<K: ChannelConnector = GrpcConnector> {
    config: ConnectConfig,
    transport: K,
    signer: Arc<dyn ChallengeSigner>,
    state: SessionState,
    session: Option<SessionHandle<K::Channel>>,
    span: tracing::Span,
}

impl Connector<GrpcConnector> {
    /// A connector using the gRPC transport and on-disk SSH keys.
    pub fn new(config: ConnectConfig) -> Self {
        let transport = GrpcConnector::new(config.connect_timeout);
        Self::with_transport(config, transport)
    }
}

impl<K: ChannelConnector> Connector<K> {
    pub fn with_transport(config: ConnectConfig, transport: K) -> Self {
        let span = tracing::info_span!(
            "connector",
            host = %config.host,
            port = config.port,
            user = %config.user
        );
        Self {
            config,
            transport,
            signer: Arc::new(SshKeySigner),
            state: SessionState::Unestablished,
            session: None,
            span,
        }
    }

    /// Replace the default SSH key signer.
    pub fn with_signer(mut self, signer: Arc<dyn ChallengeSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// The key bound by the last successful handshake.
    pub fn credential(&self) -> Option<&KeyCandidate> {
        self.session.as_ref().and_then(|s| s.credential())
    }

    /// Authenticate, trying each candidate key in order.
    ///
    /// Does nothing if already established. A closed connector may be
    /// established again.
    pub async fn establish(&mut self) -> RexecResult<()> {
        let span = self.span.clone();
        async {
            if self.state == SessionState::Established {
                tracing::debug!("already established");
                return Ok(());
            }

            self.state = SessionState::Establishing;
            match self.handshake().await {
                Ok(session) => {
                    tracing::info!(
                        "established session as {} using {}",
                        session.user(),
                        session
                            .credential()
                            .map_or_else(|| "no key".to_string(), |c| c.label())
                    );
                    self.session = Some(session);
                    self.state = SessionState::Established;
                    Ok(())
                }
                Err(e) => {
                    tracing::debug!("establishment failed: {e}");
                    self.state = SessionState::Closed;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handshake(&self) -> RexecResult<SessionHandle<K::Channel>> {
        let config = &self.config;
        let candidates = config
            .credential_source()
            .enumerate(&config.user, config.private_key.as_ref())?;

        let attempts: Vec<Option<KeyCandidate>> = if candidates.is_empty() {
            tracing::debug!("no candidate keys, attempting without a key");
            vec![None]
        } else {
            candidates.into_iter().map(Some).collect()
        };
        let tried = attempts.len();
        let mut passphrase_protected = Vec::new();

        for candidate in attempts {
            let label = candidate
                .as_ref()
                .map_or_else(|| "<no key>".to_string(), |c| c.label());
            let auth = AuthContext::new(
                config.user.clone(),
                config.password.clone(),
                candidate,
                self.signer.clone(),
            );

            let metadata = match auth.metadata() {
                Ok(metadata) => metadata,
                Err(e) if e.is_passphrase_required() => {
                    tracing::warn!("skipping {label}: {e}");
                    passphrase_protected.push(label);
                    continue;
                }
                Err(e) if e.is_per_candidate() => {
                    tracing::debug!("skipping {label}: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let channel = self
                .transport
                .open(&config.host, config.port)
                .await
                .map_err(|e| RexecError::Rpc(e.context(format!("handshake using {label}"))))?;
            let mut channel = AuthenticatedChannel::new(channel, auth);

            match channel.handshake(metadata).await {
                Ok(reply) if reply.success => {
                    tracing::debug!("{label} accepted: {}", reply.message);
                    return Ok(SessionHandle::new(channel));
                }
                Ok(reply) => {
                    tracing::debug!("{label} refused: {}", reply.message);
                }
                Err(e) if e.is_auth_rejection() => {
                    tracing::debug!("{label} rejected: {e}");
                }
                Err(e) => {
                    return Err(RexecError::Rpc(e.context(format!("handshake using {label}"))));
                }
            }
        }

        Err(RexecError::NoValidCredential {
            tried,
            passphrase_protected,
        })
    }

    fn session_mut(&mut self) -> RexecResult<&mut SessionHandle<K::Channel>> {
        match (self.state, self.session.as_mut()) {
            (SessionState::Established, Some(session)) => Ok(session),
            _ => Err(RexecError::NotConnected),
        }
    }

    /// Run a command on the server. Non-zero exits are returned, not raised.
    pub async fn exec(&mut self, command: &str) -> RexecResult<CommandOutput> {
        let span = self.span.clone();
        let session = self.session_mut()?;
        exec::exec(session, command).instrument(span).await
    }

    /// Upload `local_path` to `remote_path`. Returns the bytes sent.
    pub async fn upload(&mut self, local_path: &Path, remote_path: &str) -> RexecResult<u64> {
        self.upload_with_progress(local_path, remote_path, |_, _| {})
            .await
    }

    pub async fn upload_with_progress<F>(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        on_progress: F,
    ) -> RexecResult<u64>
    where
        F: FnMut(u64, u64) + Send + 'static,
    {
        let span = self.span.clone();
        let session = self.session_mut()?;
        file_transfer::upload(session, local_path, remote_path, on_progress)
            .instrument(span)
            .await
    }

    /// Download `remote_path` into `local_path`. Returns the bytes written.
    pub async fn download(&mut self, remote_path: &str, local_path: &Path) -> RexecResult<u64> {
        self.download_with_progress(remote_path, local_path, |_, _| {})
            .await
    }

    pub async fn download_with_progress<F>(
        &mut self,
        remote_path: &str,
        local_path: &Path,
        on_progress: F,
    ) -> RexecResult<u64>
    where
        F: FnMut(u64, u64),
    {
        let span = self.span.clone();
        let session = self.session_mut()?;
        file_transfer::download(session, remote_path, local_path, on_progress)
            .instrument(span)
            .await
    }

    /// Release the session. Closing twice, or before establishing, is a no-op.
    pub async fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let span = self.span.clone();
        async {
            if let Err(e) = session.channel_mut().close().await {
                tracing::debug!("close notification failed: {e}");
            }
            self.state = SessionState::Closed;
            tracing::info!("session closed");
        }
        .instrument(span)
        .await
    }
}
