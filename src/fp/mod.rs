//! Rabin fingerprints and fingerprint tags (`spec.md` §4.1).
//!
//! A fingerprint is the residue of a byte string viewed as a polynomial
//! over GF(2), modulo a fixed irreducible polynomial of degree 128. Raw
//! fingerprints support cheap extension but are not safe to fingerprint
//! again; permuting a raw fingerprint into a *tag* restores that safety,
//! so only tags are exposed outside this module as content-addressed
//! keys.

mod matrix;
mod perm_tables;
mod poly;
mod stream;
mod table;

pub use stream::FpStream;

use poly::{Poly, POLY_ONE};
use table::byte_mod_table;

/// An unpermuted raw fingerprint. Cheap to extend repeatedly; never
/// exposed as a content-addressed key (see module docs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawFp(Poly);

impl RawFp {
    /// The raw fingerprint of the empty string.
    pub const EMPTY: RawFp = RawFp(POLY_ONE);

    /// Extend this raw fingerprint by `data`, in place.
    pub fn extend(&mut self, data: &[u8]) {
        raw_extend(&mut self.0, data);
    }

    /// Extend this raw fingerprint by a single byte, in place.
    pub fn extend_byte(&mut self, c: u8) {
        extend_by_bytes(&mut self.0, &[c]);
    }

    /// Scramble this raw fingerprint into a safely re-fingerprintable tag.
    pub fn permute(self) -> Tag {
        Tag::permute(self.0)
    }
}

/// A 128-bit tag: a permuted fingerprint, safe to extend or to fingerprint
/// again. The content-addressed key used throughout the rest of the
/// crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tag {
    w: [u64; 2],
}

impl Tag {
    /// Number of bytes in the external (wire) representation of a tag.
    pub const BYTE_LEN: usize = 16;

    /// Computes the tag of `data` from scratch.
    pub fn new(data: &[u8]) -> Tag {
        let mut fp = POLY_ONE;
        raw_extend(&mut fp, data);
        Tag::permute(fp)
    }

    /// The tag of the empty byte string.
    pub fn empty() -> Tag {
        Tag::new(&[])
    }

    /// Destructively extends this tag by `data` and returns it.
    pub fn extend(&mut self, data: &[u8]) -> &mut Tag {
        let mut raw = self.unpermute_raw();
        raw_extend(&mut raw, data);
        *self = Tag::permute(raw);
        self
    }

    /// Destructively extends this tag by a single byte and returns it.
    pub fn extend_byte(&mut self, c: u8) -> &mut Tag {
        self.extend(&[c])
    }

    /// Destructively extends this tag by the bytes of another tag. Safe to
    /// combine the tags of two substrings this way (`spec.md` §4.1).
    pub fn extend_tag(&mut self, other: &Tag) -> &mut Tag {
        self.extend(&other.to_bytes())
    }

    /// Recovers the raw (unpermuted) fingerprint underlying this tag.
    /// Paired with [`RawFp::permute`], this lets a caller unpermute once,
    /// perform many cheap raw extensions, then permute once -- the
    /// "Unpermute (ExtendRaw)+ Permute" bracket described in `spec.md`
    /// §4.1. It is an unchecked error to call [`RawFp::permute`] on a raw
    /// fingerprint that did not originate from exactly one [`Tag::unpermute`].
    pub fn unpermute(&self) -> RawFp {
        RawFp(self.unpermute_raw())
    }

    fn unpermute_raw(&self) -> Poly {
        matrix::unpermute_matrix(self.w)
    }

    fn permute(fp: Poly) -> Tag {
        let w = matrix::permute_matrix(fp);
        Tag { w }
    }

    /// Serializes this tag to its 16-byte wire format: ascending word
    /// order, little-endian within each word (`spec.md` §6).
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut out = [0u8; Self::BYTE_LEN];
        out[0..8].copy_from_slice(&self.w[0].to_le_bytes());
        out[8..16].copy_from_slice(&self.w[1].to_le_bytes());
        out
    }

    /// Deserializes a tag from its 16-byte wire format. The exact inverse
    /// of [`Tag::to_bytes`].
    pub fn from_bytes(buf: &[u8; Self::BYTE_LEN]) -> Tag {
        let w0 = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let w1 = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        Tag { w: [w0, w1] }
    }

    /// A hash value suitable for use as a map key; not part of the wire
    /// format.
    pub fn hash_word(&self) -> u64 {
        self.w[0] ^ self.w[1]
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x} {:016x}", self.w[0], self.w[1])
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.w[0].cmp(&other.w[0]).then_with(|| self.w[1].cmp(&other.w[1]))
    }
}

/// Extends the fingerprint of a readable stream's full contents, per
/// `spec.md` §4.1 `FP::FileContents`.
pub fn extend_from_reader<R: std::io::Read>(tag: &mut Tag, mut reader: R) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        tag.extend(&buf[..n]);
    }
}

// -- Extension primitives, ported from `RawFPExtend`/`ExtendByBytes`/
// -- `ExtendByWords` in the original `FP.C`. The original splits its work
// -- to align with word boundaries in memory, purely for performance; the
// -- extension property (`spec.md` §8 property 1) guarantees any split of
// -- the input into whole-word and partial-word chunks yields the same
// -- result, so this port always processes from the start of the slice.

fn raw_extend(fp: &mut Poly, data: &[u8]) {
    let full_words = data.len() / 8;
    let split = full_words * 8;
    let (words, tail) = data.split_at(split);
    if full_words > 0 {
        extend_by_words(fp, words);
    }
    if !tail.is_empty() {
        extend_by_bytes(fp, tail);
    }
}

/// Extends `p` by `n` bytes, `1 <= n <= 7`.
fn extend_by_bytes(p: &mut Poly, source: &[u8]) {
    let n = source.len();
    debug_assert!((1..8).contains(&n));
    let table = byte_mod_table();
    let bits = 8 * n;

    let mut temp = Poly::ZERO;
    let mut mask = p.w[0];
    for i in 0..n {
        let c0 = mask as u8;
        temp.xor(&table[i + 8 - n][c0 as usize]);
        mask >>= 8;
    }

    let mut word_buf = [0u8; 8];
    word_buf[..n].copy_from_slice(source);
    let source_word = u64::from_le_bytes(word_buf);

    p.w[0] = (p.w[0] >> bits) | (p.w[1] << (64 - bits));
    p.w[1] = (p.w[1] >> bits) | (source_word << (64 - bits));
    p.xor(&temp);
}

/// Extends `p` by a whole number of 8-byte words.
fn extend_by_words(p: &mut Poly, source: &[u8]) {
    debug_assert_eq!(source.len() % 8, 0);
    let table = byte_mod_table();

    for chunk in source.chunks_exact(8) {
        let bytes = p.w[0].to_le_bytes();
        let mut temp = Poly::ZERO;
        for (i, &b) in bytes.iter().enumerate() {
            temp.xor(&table[i][b as usize]);
        }

        p.w[0] = p.w[1];
        p.w[1] = u64::from_le_bytes(chunk.try_into().unwrap());
        p.xor(&temp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tag_is_stable() {
        let a = Tag::empty();
        let b = Tag::new(b"");
        assert_eq!(a, b);
    }

    #[test]
    fn extension_property_holds_for_every_split() {
        let s = b"Hello, World";
        let whole = Tag::new(s);
        for split in 0..=s.len() {
            let (a, b) = s.split_at(split);
            let mut t = Tag::new(a);
            t.extend(b);
            assert_eq!(t, whole, "split at {split} disagreed");
        }
    }

    #[test]
    fn scenario_hello_world() {
        let mut t = Tag::new(b"Hello, ");
        t.extend(b"World");
        assert_eq!(t, Tag::new(b"Hello, World"));
    }

    #[test]
    fn permute_unpermute_roundtrip() {
        for seed in [b"", b"x", b"xy", b"a longer probe string"] {
            let tag = Tag::new(seed);
            let raw = tag.unpermute();
            let back = raw.permute();
            assert_eq!(tag, back);
        }
    }

    #[test]
    fn byte_roundtrip() {
        let t = Tag::new(b"round trip me");
        let bytes = t.to_bytes();
        assert_eq!(Tag::from_bytes(&bytes), t);
    }

    #[test]
    fn ordering_is_total_and_consistent_with_equality() {
        let a = Tag::new(b"aaa");
        let b = Tag::new(b"bbb");
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
        assert_eq!(a == b, a.cmp(&b) == std::cmp::Ordering::Equal);
    }

    #[test]
    fn alignment_invariance() {
        // The Rust port never reads raw memory at an offset -- it always
        // works from byte 0 of whatever slice it's given -- so feeding the
        // same logical bytes at different buffer offsets must agree.
        let payload = b"alignment probe payload 01234567";
        let reference = Tag::new(payload);
        for offset in 0..8 {
            let mut buf = vec![0xAAu8; offset];
            buf.extend_from_slice(payload);
            assert_eq!(Tag::new(&buf[offset..]), reference);
        }
    }

    #[test]
    fn extend_by_tag_matches_concatenated_bytes() {
        let a = Tag::new(b"first part ");
        let b = Tag::new(b"second part");
        let mut combined_by_tag = Tag::new(b"");
        combined_by_tag.extend_tag(&a);
        combined_by_tag.extend_tag(&b);

        let mut combined_by_bytes = Tag::new(b"");
        combined_by_bytes.extend(&a.to_bytes());
        combined_by_bytes.extend(&b.to_bytes());
        assert_eq!(combined_by_tag, combined_by_bytes);
    }

    #[test]
    fn self_extension_matches_concatenated_copy() {
        // Scenario S4 from `spec.md` §8.
        let payload: [u8; 19] = [
            0x00, 0x00, 0x00, 0x02, 0x01, b'N', 0x00, 0x00, 0x00, 0x03, b'N', 0x00, 0x05, b'E',
            0x00, 0x01, b'L', 0x00, 0x06,
        ];
        let mut extended = Tag::new(&payload);
        extended.extend(&payload);

        let mut doubled = Vec::from(payload);
        doubled.extend_from_slice(&payload);
        let concatenated = Tag::new(&doubled);

        assert_eq!(extended, concatenated);
    }
}
