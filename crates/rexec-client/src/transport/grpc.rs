//! gRPC transport over tonic.
//!
//! Calls `connection.ConnectionService` on a plaintext HTTP/2 channel. One
//! [`GrpcChannel`] wraps one underlying connection.

use std::time::Duration;

use futures_util::StreamExt;
use rexec_core::messages::{
    CloseRequest, CloseResponse, CommandRequest, CommandResponse, ConnectRequest,
    ConnectResponse, FileTransferMessage, CLOSE_PATH, CONNECT_PATH, EXEC_COMMAND_PATH,
    TRANSFER_FILE_PATH,
};
use rexec_core::{CallMetadata, RpcCode, RpcError, TransferFrame};
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, trace};

use super::{ChannelConnector, CommandOutput, ConnectReply, InboundFrames, OutboundFrames, RpcChannel};

/// Default time allowed for the TCP + HTTP/2 setup.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dials plaintext gRPC channels.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl ChannelConnector for GrpcConnector {
    type Channel = GrpcChannel;

    async fn open(&self, host: &str, port: u16) -> Result<GrpcChannel, RpcError> {
        let uri = endpoint_uri(host, port);
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| RpcError::new(RpcCode::InvalidArgument, format!("invalid endpoint {uri}: {e}")))?
            .connect_timeout(self.connect_timeout);

        debug!(%uri, "dialing");
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| RpcError::unavailable(format!("cannot reach {host}:{port}: {e}")))?;

        Ok(GrpcChannel {
            inner: tonic::client::Grpc::new(channel),
        })
    }
}

/// Format `http://host:port`, bracketing bare IPv6 literals.
fn endpoint_uri(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

/// One connection to a `ConnectionService`.
#[derive(Debug, Clone)]
pub struct GrpcChannel {
    inner: tonic::client::Grpc<Channel>,
}

impl GrpcChannel {
    async fn ready(&mut self) -> Result<(), RpcError> {
        self.inner
            .ready()
            .await
            .map_err(|e| RpcError::unavailable(format!("service was not ready: {e}")))
    }

    async fn unary<Req, Resp>(
        &mut self,
        path: &'static str,
        metadata: &CallMetadata,
        message: Req,
    ) -> Result<Resp, RpcError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        self.ready().await?;
        let mut request = tonic::Request::new(message);
        apply_metadata(&mut request, metadata)?;
        trace!(path, "unary call");

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = self
            .inner
            .unary(request, PathAndQuery::from_static(path), codec)
            .await
            .map_err(from_status)?;
        Ok(response.into_inner())
    }
}

impl RpcChannel for GrpcChannel {
    async fn connect(&mut self, metadata: CallMetadata) -> Result<ConnectReply, RpcError> {
        let response: ConnectResponse = self
            .unary(CONNECT_PATH, &metadata, ConnectRequest {})
            .await?;
        Ok(ConnectReply {
            success: response.success,
            message: response.message,
        })
    }

    async fn exec_command(
        &mut self,
        metadata: CallMetadata,
        command: String,
    ) -> Result<CommandOutput, RpcError> {
        let response: CommandResponse = self
            .unary(EXEC_COMMAND_PATH, &metadata, CommandRequest { command })
            .await?;
        Ok(CommandOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
        })
    }

    async fn transfer_file(
        &mut self,
        metadata: CallMetadata,
        outbound: OutboundFrames,
    ) -> Result<InboundFrames, RpcError> {
        self.ready().await?;
        let mut request = tonic::Request::new(outbound.map(FileTransferMessage::from));
        apply_metadata(&mut request, &metadata)?;

        let codec: ProstCodec<FileTransferMessage, FileTransferMessage> = ProstCodec::default();
        let response = self
            .inner
            .streaming(request, PathAndQuery::from_static(TRANSFER_FILE_PATH), codec)
            .await
            .map_err(from_status)?;

        let inbound = response.into_inner().map(|item| {
            item.map_err(from_status)
                .and_then(TransferFrame::try_from)
        });
        Ok(inbound.boxed())
    }

    async fn close(&mut self, metadata: CallMetadata) -> Result<(), RpcError> {
        let response: CloseResponse = self.unary(CLOSE_PATH, &metadata, CloseRequest {}).await?;
        if !response.success {
            debug!(message = %response.message, "server reported unclean close");
        }
        Ok(())
    }
}

/// Copy call metadata onto the request headers.
fn apply_metadata<T>(request: &mut tonic::Request<T>, metadata: &CallMetadata) -> Result<(), RpcError> {
    for (key, value) in metadata.iter() {
        let value = AsciiMetadataValue::try_from(value).map_err(|_| {
            RpcError::new(
                RpcCode::InvalidArgument,
                format!("metadata '{}' is not a valid header value", key.as_str()),
            )
        })?;
        request.metadata_mut().insert(key.as_str(), value);
    }
    Ok(())
}

fn from_status(status: tonic::Status) -> RpcError {
    let code = match status.code() {
        tonic::Code::PermissionDenied => RpcCode::PermissionDenied,
        tonic::Code::Unauthenticated => RpcCode::Unauthenticated,
        tonic::Code::Unavailable => RpcCode::Unavailable,
        tonic::Code::DeadlineExceeded => RpcCode::DeadlineExceeded,
        tonic::Code::NotFound => RpcCode::NotFound,
        tonic::Code::InvalidArgument => RpcCode::InvalidArgument,
        tonic::Code::DataLoss => RpcCode::DataLoss,
        tonic::Code::Internal => RpcCode::Internal,
        tonic::Code::Unimplemented => RpcCode::Unimplemented,
        _ => RpcCode::Unknown,
    };
    RpcError::new(code, status.message())
}
