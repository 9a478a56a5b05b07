//! Crate-wide error type.
//!
//! Logical failures and RPC failures are kept as distinct variants (see
//! `spec.md` §7): an RPC failure may have been observed *after* the peer
//! durably committed a change, so only it is allowed to schedule mastership
//! recovery. Every other variant corresponds one-to-one with an error code
//! from `spec.md` §6.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by repository operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Object or pathname component does not exist.
    #[error("not found")]
    NotFound,
    /// Caller lacks the access-control permission required for this op.
    #[error("no permission")]
    NoPermission,
    /// An arc name is already in use within its parent directory.
    #[error("name in use")]
    NameInUse,
    /// The operation does not make sense for the object's type.
    #[error("inappropriate operation")]
    InappropriateOp,
    /// An arc name exceeds the maximum arc length.
    #[error("name too long")]
    NameTooLong,
    /// A remote call failed to complete; the peer's durable state after
    /// the call is unknown. Only this variant schedules mastership
    /// recovery.
    #[error("rpc failure: {0}")]
    RpcFailure(String),
    /// The object is not a directory where one was required.
    #[error("not a directory")]
    NotADirectory,
    /// The object is a directory where one was not allowed.
    #[error("is a directory")]
    IsADirectory,
    /// A supplied argument failed validation.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    /// Local storage is full.
    #[error("out of space")]
    OutOfSpace,
    /// The operation required the local replica to be master, but it
    /// is not (or the remote replica claimed is not master).
    #[error("not master")]
    NotMaster,
    /// A `LongId` would exceed the maximum encoded length (32 bytes).
    #[error("long id overflow")]
    LongIdOverflow,
}

impl Error {
    /// True for the single variant that should schedule recovery rather
    /// than running `finm` and returning immediately (`spec.md` §4.2, §9).
    pub fn is_rpc_failure(&self) -> bool {
        matches!(self, Error::RpcFailure(_))
    }
}
