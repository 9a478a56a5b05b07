//! `ByteModTable` — the 8×256 table of precomputed polynomial residues
//! used to fold one byte, at each of the 8 possible positions within a
//! word, into a running fingerprint. Built once behind a [`OnceLock`],
//! the idiomatic Rust analogue of the original `pthread_once`-guarded
//! `ByteModTableInit`.

use std::sync::OnceLock;

use super::poly::{times_x, Poly, POLY_ONE};

/// `ByteModTable[i][j]` is `PowerTable[191 - i*8 - k]` XORed in for each
/// set bit `k` of `j`, matching the original `ByteModTableInit_inner`.
pub(super) type Table = [[Poly; 256]; 8];

static TABLE: OnceLock<Table> = OnceLock::new();

fn build() -> Table {
    let mut power_table = [Poly::ZERO; 256];
    let mut p = POLY_ONE;
    for slot in power_table.iter_mut() {
        *slot = p;
        times_x(&mut p);
    }

    let mut table: Table = [[Poly::ZERO; 256]; 8];
    for i in 0..8 {
        for j in 0..256usize {
            let mut acc = Poly::ZERO;
            for k in 0..8 {
                if j & (1 << k) != 0 {
                    acc.xor(&power_table[191 - i * 8 - k]);
                }
            }
            table[i][j] = acc;
        }
    }
    table
}

/// Returns the lazily-initialized byte-mod table, building it on first
/// use. All subsequent callers observe the same initialized table.
pub(super) fn byte_mod_table() -> &'static Table {
    TABLE.get_or_init(build)
}
