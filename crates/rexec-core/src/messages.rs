//! Wire messages for the `connection.ConnectionService` gRPC service.
//!
//! Declared by hand with prost derives, field-for-field with the server's
//! protobuf definitions.

/// Fully-qualified service name.
pub const SERVICE_NAME: &str = "connection.ConnectionService";

pub const CONNECT_PATH: &str = "/connection.ConnectionService/Connect";
pub const EXEC_COMMAND_PATH: &str = "/connection.ConnectionService/ExecCommand";
pub const TRANSFER_FILE_PATH: &str = "/connection.ConnectionService/TransferFile";
pub const CLOSE_PATH: &str = "/connection.ConnectionService/Close";

#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CloseRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CloseResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CommandRequest {
    #[prost(string, tag = "1")]
    pub command: String,
}

/// `stdout`/`stderr` are `string` on the server; `bytes` shares the same
/// wire encoding and does not force UTF-8 on command output.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CommandResponse {
    #[prost(int32, tag = "1")]
    pub exit_code: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub stdout: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub stderr: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileInfo {
    #[prost(string, tag = "1")]
    pub local_path: String,
    #[prost(string, tag = "2")]
    pub remote_path: String,
    #[prost(int64, tag = "3")]
    pub file_size: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ControlMessage {
    #[prost(enumeration = "control_message::Operation", tag = "1")]
    pub operation: i32,
    #[prost(message, optional, tag = "2")]
    pub info: Option<FileInfo>,
}

pub mod control_message {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Operation {
        Upload = 0,
        Download = 1,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileData {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileTransferMessage {
    #[prost(oneof = "file_transfer_message::Payload", tags = "1, 2")]
    pub payload: Option<file_transfer_message::Payload>,
}

pub mod file_transfer_message {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Control(super::ControlMessage),
        #[prost(message, tag = "2")]
        Data(super::FileData),
    }
}
