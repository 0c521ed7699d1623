use std::{io, path::PathBuf, time::Duration};

/// Errors surfaced by every operation. All of them are fatal for the
/// invocation that hit them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Precondition errors.
    #[error("server not initialized: {} is missing (start the server or run `init` first)", .0.display())]
    NotInitialized(PathBuf),
    #[error("client '{0}' already exists")]
    ClientExists(String),
    #[error("invalid client name '{0}': use 1-64 characters of [A-Za-z0-9_.-], not starting with '.'")]
    InvalidClientName(String),
    #[error("client '{name}' not found: {} does not exist", .path.display())]
    ClientNotFound { name: String, path: PathBuf },

    // Integrity errors.
    #[error("invalid {what} length: {got} (expected {expected})")]
    InvalidKeyLength { what: &'static str, got: usize, expected: usize },
    #[error("invalid {what} encoding: not base64 of a 32-byte key")]
    InvalidKeyEncoding { what: &'static str },
    #[error("cannot parse VPN network from '{0}'")]
    UnparsableSubnet(String),
    #[error("{field} not found in {}", .path.display())]
    MissingField { field: &'static str, path: PathBuf },
    #[error("no free address left in {0}.0/24")]
    AddressPoolExhausted(String),
    #[error("server.keys contains an invalid public key ({got} chars); run `repair-keys`")]
    MalformedServerPublicKey { got: usize },

    // Subprocess errors.
    #[error("command failed: {command}: {stderr}")]
    Subprocess { command: String, stderr: String },
    #[error("failed to run {command}: {source}")]
    Spawn { command: String, #[source] source: io::Error },

    #[error("timed out after {waited:?} waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },
    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, #[source] source: io::Error },
    #[error("invalid settings: {0}")]
    Settings(String),
    #[error("qr encoding failed: {0}")]
    Qr(String),
    #[error("cannot install signal handler: {0}")]
    Signal(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
