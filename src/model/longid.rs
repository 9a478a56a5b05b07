//! Variable-length byte identifiers naming a position in the repository
//! tree (`spec.md` §3).

use crate::error::{Error, Result};

/// Maximum encoded length of a [`LongId`], in bytes.
pub const LONGID_MAX_LEN: usize = 32;

const CONTINUATION: u8 = 0x80;
const GROUP_MASK: u8 = 0x7f;

/// A path from the repository root to an object, encoded as a chain of
/// 7-bit-per-byte child indices. The root is the single-byte identifier
/// [`LongId::ROOT_BYTE`]; every other `LongId` is some ancestor's bytes
/// followed by one child-index group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LongId(Vec<u8>);

impl LongId {
    /// The single byte a bare root identifier is made of.
    const ROOT_BYTE: u8 = 0x00;

    /// The repository root. Length 1, per `spec.md` §3.
    pub fn root() -> LongId {
        LongId(vec![Self::ROOT_BYTE])
    }

    /// Appends a child index, returning the child's `LongId`. Fails with
    /// [`Error::LongIdOverflow`] if the encoded result would exceed
    /// [`LONGID_MAX_LEN`] bytes.
    pub fn child(&self, index: u32) -> Result<LongId> {
        let mut bytes = self.0.clone();
        encode_index(index, &mut bytes);
        if bytes.len() > LONGID_MAX_LEN {
            return Err(Error::LongIdOverflow);
        }
        Ok(LongId(bytes))
    }

    /// The parent identifier, or `None` if `self` is the root.
    pub fn parent(&self) -> Option<LongId> {
        if self.0.len() <= 1 {
            return None;
        }
        let mut end = self.0.len() - 1;
        while end > 1 && self.0[end - 1] & CONTINUATION != 0 {
            end -= 1;
        }
        Some(LongId(self.0[..end].to_vec()))
    }

    /// `true` iff `self`'s bytes are a prefix of `other`'s (`spec.md` §3).
    /// Reflexive: every `LongId` is its own ancestor under this definition.
    pub fn is_ancestor_of(&self, other: &LongId) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Like [`LongId::is_ancestor_of`] but excludes `self == other`.
    pub fn is_strict_ancestor_of(&self, other: &LongId) -> bool {
        self != other && self.is_ancestor_of(other)
    }

    /// The raw encoded bytes, e.g. for use as a map key or wire payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for LongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

fn encode_index(index: u32, out: &mut Vec<u8>) {
    let mut groups = Vec::new();
    let mut v = index;
    loop {
        groups.push((v & GROUP_MASK as u32) as u8);
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    let last = groups.len() - 1;
    for (i, g) in groups.into_iter().enumerate() {
        out.push(if i < last { g | CONTINUATION } else { g });
    }
}
