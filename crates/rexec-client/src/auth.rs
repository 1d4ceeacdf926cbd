//! Per-call authentication.
//!
//! [`AuthenticatedChannel`] wraps an [`RpcChannel`] and attaches freshly
//! built [`CallMetadata`] to every outbound call: user, optional password,
//! and a new proof from the bound key candidate.

use std::fmt;
use std::sync::Arc;

use rexec_core::{CallMetadata, RexecResult, RpcError};

use crate::credentials::KeyCandidate;
use crate::signer::ChallengeSigner;
use crate::transport::{CommandOutput, ConnectReply, InboundFrames, OutboundFrames, RpcChannel};

/// Everything needed to authenticate one call.
#[derive(Clone)]
pub struct AuthContext {
    user: String,
    password: Option<String>,
    credential: Option<KeyCandidate>,
    signer: Arc<dyn ChallengeSigner>,
}

impl AuthContext {
    pub fn new(
        user: impl Into<String>,
        password: Option<String>,
        credential: Option<KeyCandidate>,
        signer: Arc<dyn ChallengeSigner>,
    ) -> Self {
        Self {
            user: user.into(),
            password,
            credential,
            signer,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn credential(&self) -> Option<&KeyCandidate> {
        self.credential.as_ref()
    }

    /// Build metadata for one call, signing with the bound candidate.
    pub fn metadata(&self) -> RexecResult<CallMetadata> {
        let proof = match &self.credential {
            Some(candidate) => Some(self.signer.sign(candidate, &self.user)?),
            None => None,
        };
        Ok(CallMetadata::build(
            &self.user,
            self.password.as_deref(),
            proof.as_ref(),
        ))
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("credential", &self.credential)
            .finish()
    }
}

/// A channel whose every call is authenticated.
pub struct AuthenticatedChannel<C> {
    inner: C,
    auth: AuthContext,
}

impl<C: RpcChannel> AuthenticatedChannel<C> {
    pub fn new(inner: C, auth: AuthContext) -> Self {
        Self { inner, auth }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Run the `Connect` handshake with metadata the caller already built.
    pub async fn handshake(&mut self, metadata: CallMetadata) -> Result<ConnectReply, RpcError> {
        self.inner.connect(metadata).await
    }

    pub async fn exec_command(&mut self, command: &str) -> RexecResult<CommandOutput> {
        let metadata = self.auth.metadata()?;
        Ok(self.inner.exec_command(metadata, command.to_string()).await?)
    }

    pub async fn transfer_file(&mut self, outbound: OutboundFrames) -> RexecResult<InboundFrames> {
        let metadata = self.auth.metadata()?;
        Ok(self.inner.transfer_file(metadata, outbound).await?)
    }

    pub async fn close(&mut self) -> RexecResult<()> {
        let metadata = self.auth.metadata()?;
        Ok(self.inner.close(metadata).await?)
    }
}
