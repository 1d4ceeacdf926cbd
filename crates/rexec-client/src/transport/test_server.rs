//! In-process `ConnectionService` served by tonic, for driving
//! [`GrpcChannel`](super::GrpcChannel) over a real HTTP/2 connection.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use rexec_core::messages::{
    CloseRequest, CloseResponse, CommandRequest, CommandResponse, ConnectRequest,
    ConnectResponse, FileTransferMessage, CLOSE_PATH, CONNECT_PATH, EXEC_COMMAND_PATH,
    SERVICE_NAME, TRANSFER_FILE_PATH,
};
use rexec_core::{ControlInfo, TransferFrame, TransferOp};
use tonic::body::BoxBody;
use tonic::codec::ProstCodec;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::metadata::MetadataMap;
use tonic::server::{Grpc, NamedService, StreamingService, UnaryService};
use tonic::{Request, Response, Status, Streaming};

const REPLY_CHUNK: usize = 100 * 1024;

#[derive(Default)]
struct Store {
    files: HashMap<String, Vec<u8>>,
    users: Vec<String>,
    closes: usize,
}

/// Accepts `user`/`password` pairs it was built with, runs `echo`, stores files.
#[derive(Clone)]
pub(crate) struct TestService {
    user: String,
    password: String,
    store: Arc<Mutex<Store>>,
}

impl TestService {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
            store: Arc::default(),
        }
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.store.lock().unwrap().files.get(path).cloned()
    }

    /// `user` header of every call, in arrival order.
    pub fn users(&self) -> Vec<String> {
        self.store.lock().unwrap().users.clone()
    }

    pub fn closes(&self) -> usize {
        self.store.lock().unwrap().closes
    }

    fn record(&self, metadata: &MetadataMap) {
        let user = header(metadata, "user").unwrap_or_default();
        self.store.lock().unwrap().users.push(user);
    }

    fn connect(&self, request: Request<ConnectRequest>) -> Result<ConnectResponse, Status> {
        self.record(request.metadata());
        let user = header(request.metadata(), "user");
        let password = header(request.metadata(), "password");
        if user.as_deref() != Some(self.user.as_str())
            || password.as_deref() != Some(self.password.as_str())
        {
            return Err(Status::permission_denied("authentication failure"));
        }
        Ok(ConnectResponse {
            success: true,
            message: "welcome".into(),
        })
    }

    fn exec(&self, request: Request<CommandRequest>) -> Result<CommandResponse, Status> {
        self.record(request.metadata());
        let command = request.into_inner().command;
        Ok(match command.strip_prefix("echo ") {
            Some(rest) => CommandResponse {
                exit_code: 0,
                stdout: format!("{rest}\n").into_bytes(),
                stderr: Vec::new(),
            },
            None => CommandResponse {
                exit_code: 127,
                stdout: Vec::new(),
                stderr: format!("sh: {command}: command not found\n").into_bytes(),
            },
        })
    }

    fn close(&self, request: Request<CloseRequest>) -> Result<CloseResponse, Status> {
        self.record(request.metadata());
        self.store.lock().unwrap().closes += 1;
        Ok(CloseResponse {
            success: true,
            message: String::new(),
        })
    }

    async fn transfer(
        &self,
        request: Request<Streaming<FileTransferMessage>>,
    ) -> Result<Vec<TransferFrame>, Status> {
        self.record(request.metadata());
        let mut inbound = request.into_inner();
        let frame = |msg: FileTransferMessage| {
            TransferFrame::try_from(msg).map_err(|e| Status::invalid_argument(e.message))
        };

        let Some(first) = inbound.message().await? else {
            return Err(Status::invalid_argument("empty transfer stream"));
        };
        let TransferFrame::Control(control) = frame(first)? else {
            return Err(Status::invalid_argument("first frame must be a control frame"));
        };

        match control.operation {
            TransferOp::Upload => {
                let mut contents = Vec::new();
                while let Some(msg) = inbound.message().await? {
                    match frame(msg)? {
                        TransferFrame::Data(data) => contents.extend_from_slice(&data),
                        TransferFrame::Control(_) => {
                            return Err(Status::invalid_argument("unexpected control frame"))
                        }
                    }
                }
                let size = contents.len() as u64;
                self.store
                    .lock()
                    .unwrap()
                    .files
                    .insert(control.remote_path.clone(), contents);
                Ok(vec![TransferFrame::upload(
                    control.local_path,
                    control.remote_path,
                    size,
                )])
            }
            TransferOp::Download => {
                let Some(contents) = self.file(&control.remote_path) else {
                    return Err(Status::not_found(format!(
                        "{} does not exist",
                        control.remote_path
                    )));
                };
                let mut replies = vec![TransferFrame::Control(ControlInfo {
                    operation: TransferOp::Download,
                    local_path: String::new(),
                    remote_path: control.remote_path,
                    file_size: contents.len() as u64,
                })];
                replies.extend(
                    contents
                        .chunks(REPLY_CHUNK)
                        .map(|chunk| TransferFrame::Data(chunk.to_vec())),
                );
                Ok(replies)
            }
        }
    }
}

fn header(metadata: &MetadataMap, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Adapts a synchronous handler to tonic's unary service shape.
struct Unary<F>(F);

impl<Req, Resp, F> UnaryService<Req> for Unary<F>
where
    F: FnMut(Request<Req>) -> Result<Resp, Status>,
{
    type Response = Resp;
    type Future = std::future::Ready<Result<Response<Resp>, Status>>;

    fn call(&mut self, request: Request<Req>) -> Self::Future {
        std::future::ready((self.0)(request).map(Response::new))
    }
}

struct Transfer(TestService);

impl StreamingService<FileTransferMessage> for Transfer {
    type Response = FileTransferMessage;
    type ResponseStream = BoxStream<'static, Result<FileTransferMessage, Status>>;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<Streaming<FileTransferMessage>>) -> Self::Future {
        let service = self.0.clone();
        Box::pin(async move {
            let replies = service.transfer(request).await?;
            let stream = stream::iter(
                replies
                    .into_iter()
                    .map(|frame| Ok(FileTransferMessage::from(frame))),
            );
            Ok(Response::new(stream.boxed()))
        })
    }
}

impl NamedService for TestService {
    const NAME: &'static str = SERVICE_NAME;
}

impl<B> Service<http::Request<B>> for TestService
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let service = self.clone();
        match req.uri().path() {
            CONNECT_PATH => Box::pin(async move {
                let mut grpc = Grpc::new(ProstCodec::<ConnectResponse, ConnectRequest>::default());
                Ok(grpc.unary(Unary(move |r| service.connect(r)), req).await)
            }),
            EXEC_COMMAND_PATH => Box::pin(async move {
                let mut grpc = Grpc::new(ProstCodec::<CommandResponse, CommandRequest>::default());
                Ok(grpc.unary(Unary(move |r| service.exec(r)), req).await)
            }),
            CLOSE_PATH => Box::pin(async move {
                let mut grpc = Grpc::new(ProstCodec::<CloseResponse, CloseRequest>::default());
                Ok(grpc.unary(Unary(move |r| service.close(r)), req).await)
            }),
            TRANSFER_FILE_PATH => Box::pin(async move {
                let mut grpc = Grpc::new(
                    ProstCodec::<FileTransferMessage, FileTransferMessage>::default(),
                );
                Ok(grpc.streaming(Transfer(service), req).await)
            }),
            _ => Box::pin(async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("grpc-status", "12")
                    .header("content-type", "application/grpc")
                    .body(empty_body())
                    .unwrap())
            }),
        }
    }
}

/// Serve `service` on an ephemeral loopback port.
pub(crate) async fn spawn(service: TestService) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await.map(|(socket, _)| socket);
        Some((accepted, listener))
    })
    .boxed();

    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming(incoming),
    );
    addr
}
