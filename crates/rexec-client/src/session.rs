//! An established, authenticated session.

use std::time::Instant;

use crate::auth::AuthenticatedChannel;
use crate::credentials::KeyCandidate;
use crate::transport::RpcChannel;

/// Lifecycle of a connector's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handshake has been attempted yet.
    Unestablished,
    /// Candidates are being tried.
    Establishing,
    /// A candidate was accepted; calls may be made.
    Established,
    /// Closed by the caller, or establishment failed fatally.
    Closed,
}

/// The channel and credential a successful handshake produced.
///
/// Every call made through the handle re-signs with the bound credential.
pub struct SessionHandle<C> {
    channel: AuthenticatedChannel<C>,
    established_at: Instant,
}

impl<C: RpcChannel> SessionHandle<C> {
    pub fn new(channel: AuthenticatedChannel<C>) -> Self {
        Self {
            channel,
            established_at: Instant::now(),
        }
    }

    /// The key the server accepted, or `None` for a keyless session.
    pub fn credential(&self) -> Option<&KeyCandidate> {
        self.channel.auth().credential()
    }

    pub fn user(&self) -> &str {
        self.channel.auth().user()
    }

    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    pub(crate) fn channel_mut(&mut self) -> &mut AuthenticatedChannel<C> {
        &mut self.channel
    }
}
