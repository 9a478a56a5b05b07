//! The degree-128 irreducible modulus polynomial and the scrambling
//! matrices, carried over bit-for-bit from the original Vesta fingerprint
//! package (`libVestaFP.a/Poly.H`, `FP.C`).

/// A 128-bit value represented as two 64-bit words, word 0 holding the
/// low-order half of the polynomial's residue. Used both for raw
/// (unpermuted) fingerprints and, after permutation, for tags.
pub type Word = u64;

/// Two-word polynomial representation shared by raw fingerprints and the
/// byte-mod table entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Poly {
    pub w: [Word; 2],
}

impl Poly {
    pub const ZERO: Poly = Poly { w: [0, 0] };

    #[inline]
    pub fn xor(&mut self, other: &Poly) {
        self.w[0] ^= other.w[0];
        self.w[1] ^= other.w[1];
    }
}

/// The low bit of word 0 of `POLY_IRRED`; used by `times_x` to detect
/// overflow past degree 128.
pub const POLY_X63_W: Word = 0x1;

/// `X^127 mod P`, the high bit of word 1.
pub const POLY_ONE_W: Word = 0x8000_0000_0000_0000;

/// The fingerprint of the empty string: `X^{-1} mod P`.
pub const POLY_ONE: Poly = Poly { w: [0, POLY_ONE_W] };

/// The fixed irreducible polynomial of degree 128 used as the fingerprint
/// modulus.
pub const POLY_IRRED: Poly = Poly { w: [0x2b59_0719_937a_25c7, 0x97e0_5773_d6f3_b9bc] };

/// `this = this * X mod POLY_IRRED`.
pub fn times_x(p: &mut Poly) {
    let x127 = p.w[0] & POLY_X63_W;
    p.w[0] >>= 1;
    if p.w[1] & POLY_X63_W != 0 {
        p.w[0] |= POLY_ONE_W;
    }
    p.w[1] >>= 1;
    if x127 != 0 {
        p.xor(&POLY_IRRED);
    }
}
