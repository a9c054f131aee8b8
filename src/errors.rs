//! Top-level error hierarchy for the lobby server.
//!
//! Every fallible path in this crate returns [`Error`]. Sub-systems that want
//! their own vocabulary (buffer bounds, SRP, the DB pool) define a narrow
//! enum and fold it into this one via `#[from]`, mirroring how a production
//! pooler keeps one `Error` type at the crate boundary instead of leaking
//! library-specific error types into handler code.

use thiserror::Error;

/// Buffer-level bounds violation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer underflow: tried to read past the end of the buffer")]
    Underflow,
    #[error("buffer overflow: write would exceed the 1 MiB buffer limit")]
    Overflow,
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
}

/// Wire-protocol violations detected while framing or dispatching packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty packet body")]
    EmptyPacket,
    #[error("frame length {0} exceeds the 1 MiB limit")]
    OversizeFrame(u32),
    #[error("opcode {opcode:#04x} is not valid in state {state}")]
    UnexpectedOpcode { opcode: u8, state: &'static str },
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
}

/// SRP-6 handshake failures. Never distinguishes "unknown user" from "bad
/// password" in its `Display` output, matching the indistinguishability
/// requirement on the wire.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("SRP authentication failed")]
    ProofMismatch,
    #[error("SRP arithmetic precondition violated (A mod N == 0)")]
    InvalidPublicValue,
}

/// Top-level error type threaded through sessions, handlers, and the pool.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    ProtocolError(#[from] ProtocolError),

    #[error(transparent)]
    Underflow(BufferError),

    #[error(transparent)]
    Overflow(BufferError),

    #[error(transparent)]
    InvalidUtf8(BufferError),

    #[error("authentication failed: {0}")]
    AuthFailed(#[from] AuthError),

    #[error("sql error: {0}")]
    Sql(#[from] tokio_postgres::Error),

    #[error("database connection lost")]
    ConnectionLost,

    #[error("timed out")]
    Timeout,

    #[error("aborted")]
    Aborted,
}

impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::Underflow => Error::Underflow(e),
            BufferError::Overflow => Error::Overflow(e),
            BufferError::InvalidUtf8 => Error::InvalidUtf8(e),
        }
    }
}

impl Error {
    /// `Aborted` is expected during graceful shutdown and must never be
    /// logged at error severity.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
