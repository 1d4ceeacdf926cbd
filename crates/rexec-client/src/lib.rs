//! rexec-client: Rust client library for the rexec remote execution service.
//!
//! Authenticates by trying the local user's SSH keys in turn until the
//! server accepts one, then runs commands and transfers files over gRPC.
//! Every call carries freshly signed credentials.
//!
//! # Quick Start
//!
//! ```no_run
//! use rexec_client::{ConnectConfig, Connector};
//!
//! # async fn example() -> rexec_core::RexecResult<()> {
//! let mut connector = Connector::new(ConnectConfig::new("build-01", 50051, "alice"));
//! connector.establish().await?;
//!
//! let out = connector.exec("uname -a").await?;
//! println!("{} (exit {})", out.stdout_lossy(), out.exit_code);
//!
//! connector
//!     .upload(std::path::Path::new("dist.tar.gz"), "/tmp/dist.tar.gz")
//!     .await?;
//! connector.close().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod credentials;
pub mod exec;
pub mod file_transfer;
pub mod session;
pub mod signer;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export primary public types.
pub use auth::{AuthContext, AuthenticatedChannel};
pub use client::{ConnectConfig, Connector};
pub use credentials::{CredentialSource, KeyCandidate};
pub use file_transfer::CHUNK_SIZE;
pub use session::{SessionHandle, SessionState};
pub use signer::{ChallengeSigner, SshKeySigner};
pub use transport::{ChannelConnector, CommandOutput, ConnectReply, GrpcConnector, RpcChannel};

// Re-export rexec-core error types for convenience.
pub use rexec_core::{RexecError, RexecResult};
