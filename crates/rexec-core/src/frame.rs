//! Transfer frames: the unit of the `TransferFile` stream.
//!
//! A transfer is one leading `Control` frame followed by zero or more
//! `Data` frames, terminated by stream closure.

use crate::error::{RpcCode, RpcError};
use crate::messages::control_message::Operation;
use crate::messages::file_transfer_message::Payload;
use crate::messages::{ControlMessage, FileData, FileInfo, FileTransferMessage};

/// Direction of a transfer, from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOp {
    Upload,
    Download,
}

/// Header carried by a `Control` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    pub operation: TransferOp,
    pub local_path: String,
    pub remote_path: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferFrame {
    Control(ControlInfo),
    Data(Vec<u8>),
}

impl TransferFrame {
    pub fn upload(local_path: impl Into<String>, remote_path: impl Into<String>, file_size: u64) -> Self {
        Self::Control(ControlInfo {
            operation: TransferOp::Upload,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            file_size,
        })
    }

    pub fn download(remote_path: impl Into<String>) -> Self {
        Self::Control(ControlInfo {
            operation: TransferOp::Download,
            local_path: String::new(),
            remote_path: remote_path.into(),
            file_size: 0,
        })
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Control(_))
    }
}

impl From<TransferFrame> for FileTransferMessage {
    fn from(frame: TransferFrame) -> Self {
        let payload = match frame {
            TransferFrame::Control(info) => {
                let operation = match info.operation {
                    TransferOp::Upload => Operation::Upload,
                    TransferOp::Download => Operation::Download,
                };
                Payload::Control(ControlMessage {
                    operation: operation as i32,
                    info: Some(FileInfo {
                        local_path: info.local_path,
                        remote_path: info.remote_path,
                        file_size: i64::try_from(info.file_size).unwrap_or(i64::MAX),
                    }),
                })
            }
            TransferFrame::Data(data) => Payload::Data(FileData { data }),
        };
        FileTransferMessage {
            payload: Some(payload),
        }
    }
}

impl TryFrom<FileTransferMessage> for TransferFrame {
    type Error = RpcError;

    fn try_from(msg: FileTransferMessage) -> Result<Self, Self::Error> {
        match msg.payload {
            Some(Payload::Data(data)) => Ok(TransferFrame::Data(data.data)),
            Some(Payload::Control(control)) => {
                let operation = match Operation::try_from(control.operation) {
                    Ok(Operation::Upload) => TransferOp::Upload,
                    Ok(Operation::Download) => TransferOp::Download,
                    Err(_) => {
                        return Err(RpcError::new(
                            RpcCode::InvalidArgument,
                            format!("unknown transfer operation {}", control.operation),
                        ))
                    }
                };
                let info = control.info.unwrap_or_default();
                Ok(TransferFrame::Control(ControlInfo {
                    operation,
                    local_path: info.local_path,
                    remote_path: info.remote_path,
                    file_size: u64::try_from(info.file_size).unwrap_or(0),
                }))
            }
            None => Err(RpcError::new(
                RpcCode::InvalidArgument,
                "transfer message without payload",
            )),
        }
    }
}
