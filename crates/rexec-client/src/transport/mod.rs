//! Transport seam for the rexec connector.
//!
//! A [`ChannelConnector`] dials a host and yields an [`RpcChannel`] that can
//! issue the four service calls. Every call takes its [`CallMetadata`]
//! explicitly; attaching credentials is the caller's job.

pub mod grpc;
#[cfg(test)]
mod test_server;

pub use grpc::{GrpcChannel, GrpcConnector};

use futures_util::stream::BoxStream;
use rexec_core::{CallMetadata, RpcError, TransferFrame};

/// Frames sent to the server during a transfer.
pub type OutboundFrames = BoxStream<'static, TransferFrame>;

/// Frames received from the server during a transfer.
pub type InboundFrames = BoxStream<'static, Result<TransferFrame, RpcError>>;

/// Server verdict on a `Connect` handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    pub success: bool,
    pub message: String,
}

/// Result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// An open channel to one server.
#[allow(async_fn_in_trait)]
pub trait RpcChannel: Send {
    /// Authentication handshake.
    async fn connect(&mut self, metadata: CallMetadata) -> Result<ConnectReply, RpcError>;

    /// Run one command to completion.
    async fn exec_command(
        &mut self,
        metadata: CallMetadata,
        command: String,
    ) -> Result<CommandOutput, RpcError>;

    /// Open the bidirectional transfer stream.
    ///
    /// Returns once the server has accepted the call; `outbound` is drained
    /// concurrently with reading the returned stream.
    async fn transfer_file(
        &mut self,
        metadata: CallMetadata,
        outbound: OutboundFrames,
    ) -> Result<InboundFrames, RpcError>;

    /// Tell the server the session is ending.
    async fn close(&mut self, metadata: CallMetadata) -> Result<(), RpcError>;
}

/// Opens channels to a host.
#[allow(async_fn_in_trait)]
pub trait ChannelConnector {
    type Channel: RpcChannel;

    async fn open(&self, host: &str, port: u16) -> Result<Self::Channel, RpcError>;
}
