//! rexec-core: Shared protocol library for the rexec connector.
//!
//! Provides the gRPC wire messages, transfer frames, per-call
//! authentication metadata and the error taxonomy.

pub mod error;
pub mod frame;
pub mod messages;
pub mod metadata;

// Re-export commonly used items at crate root.
pub use error::{KeyLoadReason, RexecError, RexecResult, RpcCode, RpcError};
pub use frame::{ControlInfo, TransferFrame, TransferOp};
pub use metadata::{AuthProof, CallMetadata, MetadataKey};
