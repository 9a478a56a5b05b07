//! The permute/unpermute scrambling step that turns a raw fingerprint into
//! a tag and back, carried over exactly from `libVestaFP.a/FP.C`: a fixed
//! byte substitution composed with a nonsingular 2×2 matrix multiply over
//! 64-bit integers mod 2^64.

use super::perm_tables::{PERM, PERM_INV};
use super::poly::Poly;

const A: [[u64; 2]; 2] =
    [[0xce36_f163_f737_a677, 0x431b_f4ec_c646_b337], [0x1960_326f_a38d_04d0, 0x1015_5f23_a2f0_24f9]];

const B: [[u64; 2]; 2] =
    [[0x9403_3a38_9a27_9d77, 0xd79f_3b15_5765_98a7], [0x67f2_d59b_2369_b1d0, 0x063e_096e_4228_c019]];

fn substitute(words: [u64; 2], table: &[u8; 256]) -> [u64; 2] {
    let mut bytes = [0u8; 16];
    bytes[0..8].copy_from_slice(&words[0].to_le_bytes());
    bytes[8..16].copy_from_slice(&words[1].to_le_bytes());
    for b in bytes.iter_mut() {
        *b = table[*b as usize];
    }
    let w0 = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let w1 = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    [w0, w1]
}

/// Byte-substitute then multiply by `A`: raw fingerprint -> tag.
pub(super) fn permute_matrix(fp: Poly) -> [u64; 2] {
    let substituted = substitute(fp.w, &PERM);
    [
        substituted[0].wrapping_mul(A[0][0]).wrapping_add(substituted[1].wrapping_mul(A[1][0])),
        substituted[0].wrapping_mul(A[0][1]).wrapping_add(substituted[1].wrapping_mul(A[1][1])),
    ]
}

/// Multiply by `B` then inverse-substitute: tag -> raw fingerprint.
pub(super) fn unpermute_matrix(tag: [u64; 2]) -> Poly {
    let multiplied = [
        tag[0].wrapping_mul(B[0][0]).wrapping_add(tag[1].wrapping_mul(B[1][0])),
        tag[0].wrapping_mul(B[0][1]).wrapping_add(tag[1].wrapping_mul(B[1][1])),
    ];
    Poly { w: substitute(multiplied, &PERM_INV) }
}
