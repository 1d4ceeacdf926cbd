//! Candidate identity keys for the handshake.
//!
//! Keys come from an explicit candidate supplied by the caller, or from a
//! scan of `<home>/.ssh` for files named `id_*` that are not `*.pub`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::User;
use rexec_core::{KeyLoadReason, RexecError, RexecResult};
use tracing::debug;

/// One potential identity key.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyCandidate {
    /// A private key file on disk.
    Path(PathBuf),
    /// Key material held in memory, labelled for diagnostics.
    Memory { label: String, contents: Vec<u8> },
}

impl KeyCandidate {
    pub fn memory(label: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self::Memory {
            label: label.into(),
            contents: contents.into(),
        }
    }

    /// Short name used in logs and error messages.
    pub fn label(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Memory { label, .. } => format!("<memory:{label}>"),
        }
    }

    /// Read the raw key material.
    pub fn read(&self) -> RexecResult<Vec<u8>> {
        match self {
            Self::Path(path) => fs::read(path).map_err(|e| RexecError::KeyLoad {
                candidate: self.label(),
                reason: KeyLoadReason::Io(e.to_string()),
            }),
            Self::Memory { contents, .. } => Ok(contents.clone()),
        }
    }
}

impl fmt::Display for KeyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// Key material stays out of debug output.
impl fmt::Debug for KeyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Memory { label, contents } => f
                .debug_struct("Memory")
                .field("label", label)
                .field("len", &contents.len())
                .finish(),
        }
    }
}

/// Enumerates candidate keys for a local user.
#[derive(Debug, Clone, Default)]
pub struct CredentialSource {
    /// Overrides `<home>/.ssh` when set.
    key_dir: Option<PathBuf>,
}

impl CredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` instead of the identity's `~/.ssh`.
    pub fn with_key_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: Some(dir.into()),
        }
    }

    /// Candidate keys for `identity`, in the order they should be tried.
    ///
    /// An explicit candidate short-circuits enumeration entirely.
    pub fn enumerate(
        &self,
        identity: &str,
        explicit: Option<&KeyCandidate>,
    ) -> RexecResult<Vec<KeyCandidate>> {
        if let Some(candidate) = explicit {
            debug!(candidate = %candidate, "using explicit key");
            return Ok(vec![candidate.clone()]);
        }

        let dir = match &self.key_dir {
            Some(dir) => dir.clone(),
            None => resolve_home(identity)?.join(".ssh"),
        };
        scan_key_dir(&dir)
    }
}

/// Home directory of a local account.
pub fn resolve_home(identity: &str) -> RexecResult<PathBuf> {
    match User::from_name(identity) {
        Ok(Some(user)) => Ok(user.dir),
        Ok(None) => Err(RexecError::IdentityResolution(identity.to_string())),
        Err(e) => {
            debug!(identity, error = %e, "passwd lookup failed");
            Err(RexecError::IdentityResolution(identity.to_string()))
        }
    }
}

/// Every regular `id_*` file in `dir` that is not a `.pub`, sorted by name.
pub fn scan_key_dir(dir: &Path) -> RexecResult<Vec<KeyCandidate>> {
    if !dir.is_dir() {
        return Err(RexecError::KeyStoreUnavailable(dir.to_path_buf()));
    }

    let mut keys = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_private_key_name(name) {
            continue;
        }
        let path = entry.path();
        if path.is_file() {
            debug!(key = %path.display(), "adding candidate key");
            keys.push(path);
        }
    }

    keys.sort();
    Ok(keys.into_iter().map(KeyCandidate::Path).collect())
}

fn is_private_key_name(name: &str) -> bool {
    name.starts_with("id_") && !name.ends_with(".pub")
}
