use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the rexec connector.
#[derive(Debug, Error)]
pub enum RexecError {
    #[error("cannot resolve local user '{0}'")]
    IdentityResolution(String),

    #[error("key directory {} does not exist or is not a directory", .0.display())]
    KeyStoreUnavailable(PathBuf),

    #[error("failed to load key {candidate}: {reason}")]
    KeyLoad {
        candidate: String,
        reason: KeyLoadReason,
    },

    #[error("failed to sign with key {candidate}: {reason}")]
    Signing { candidate: String, reason: String },

    #[error("rpc failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("no valid credential: {}", describe_exhausted(.tried, .passphrase_protected))]
    NoValidCredential {
        tried: usize,
        passphrase_protected: Vec<String>,
    },

    #[error("not connected")]
    NotConnected,

    #[error("local file {} does not exist", .0.display())]
    LocalFileNotFound(PathBuf),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RexecError {
    /// Whether this error only disqualifies one candidate key, so the
    /// handshake loop may move on to the next one.
    pub fn is_per_candidate(&self) -> bool {
        matches!(self, Self::KeyLoad { .. } | Self::Signing { .. })
    }

    /// Whether this is a key that could not be used without a passphrase.
    pub fn is_passphrase_required(&self) -> bool {
        matches!(
            self,
            Self::KeyLoad {
                reason: KeyLoadReason::PassphraseRequired,
                ..
            }
        )
    }
}

fn describe_exhausted(tried: &usize, passphrase_protected: &[String]) -> String {
    let mut msg = match *tried {
        0 => "no candidate keys were available".to_string(),
        1 => "the only candidate was rejected".to_string(),
        n => format!("all {n} candidates were rejected"),
    };
    if !passphrase_protected.is_empty() {
        msg.push_str(&format!(
            " ({} skipped because they require a passphrase: {})",
            passphrase_protected.len(),
            passphrase_protected.join(", ")
        ));
    }
    msg
}

/// Why a candidate key could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLoadReason {
    /// The key is encrypted. Usually an operator misconfiguration.
    PassphraseRequired,
    /// No supported format recognised the key material.
    Unsupported(String),
    /// The key file could not be read.
    Io(String),
}

impl fmt::Display for KeyLoadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PassphraseRequired => f.write_str("key requires a passphrase"),
            Self::Unsupported(detail) => write!(f, "unsupported or corrupt key format ({detail})"),
            Self::Io(detail) => write!(f, "cannot read key ({detail})"),
        }
    }
}

/// Transport-neutral status codes, mirroring the gRPC code set we act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    PermissionDenied,
    Unauthenticated,
    Unavailable,
    DeadlineExceeded,
    NotFound,
    InvalidArgument,
    DataLoss,
    Internal,
    Unimplemented,
    Unknown,
}

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission denied",
            Self::Unauthenticated => "unauthenticated",
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::NotFound => "not found",
            Self::InvalidArgument => "invalid argument",
            Self::DataLoss => "data loss",
            Self::Internal => "internal",
            Self::Unimplemented => "unimplemented",
            Self::Unknown => "unknown",
        }
    }
}

/// A failed remote call, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} ({})", .message, .code.as_str())]
pub struct RpcError {
    pub code: RpcCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unavailable, message)
    }

    /// Prefix the message, keeping the code.
    pub fn context(self, context: impl fmt::Display) -> Self {
        Self {
            code: self.code,
            message: format!("{context}: {}", self.message),
        }
    }

    /// The server rejected the presented credentials. Only these failures
    /// let the handshake fall back to the next candidate.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self.code,
            RpcCode::PermissionDenied | RpcCode::Unauthenticated
        )
    }
}

pub type RexecResult<T> = Result<T, RexecError>;
