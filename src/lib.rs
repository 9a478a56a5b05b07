//! Vesta repository core: content fingerprints, mastership transfer, and
//! replication for a distributed, replicated source-code repository.
//!
//! This crate implements the three subsystems that together guarantee the
//! agreement invariant across replicas of a Vesta repository tree: the
//! Rabin fingerprint engine ([`fp`]), the mastership transfer protocol
//! ([`mastership`]), and the replication engine ([`replication`]). A
//! queued readers/writers lock ([`rwlock`]) serializes repository
//! mutations, and a unique-ID generator ([`uniqueid`]) supplies the
//! entropy that makes mastership transfer identifiers globally
//! distinguishable.

pub mod config;
pub mod error;
pub mod fp;
pub mod journal;
pub mod mastership;
pub mod model;
pub mod peer;
pub mod replication;
pub mod rwlock;
pub mod uniqueid;

pub use error::{Error, Result};

/// Current wall-clock time in seconds since the epoch, used throughout the
/// crate wherever `spec.md` calls for "now" (attribute timestamps, request
/// generation times, etc).
pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
