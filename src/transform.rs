//! Coordinate transform algebra: bijections between the traversal orders a
//! partition's elements can be sorted in.
//!
//! All transforms take and return **1-based** `(row, col)` coordinates
//! (e.g. `BRk` subtracts 1 before dividing). Every transform is
//! branch-light and allocation-free.

use crate::element::Encoding;

/// A bijection `(r, c; rows, cols) -> (r', c')`.
pub type XformFn = fn(usize, usize, usize, usize) -> (usize, usize);

#[inline]
pub fn horiz(r: usize, c: usize, _rows: usize, _cols: usize) -> (usize, usize) {
    (r, c)
}

#[inline]
pub fn horiz_inv(r: usize, c: usize, rows: usize, cols: usize) -> (usize, usize) {
    horiz(r, c, rows, cols)
}

#[inline]
pub fn vert(r: usize, c: usize, _rows: usize, _cols: usize) -> (usize, usize) {
    (c, r)
}

#[inline]
pub fn vert_inv(r: usize, c: usize, rows: usize, cols: usize) -> (usize, usize) {
    vert(r, c, rows, cols)
}

/// `D(r,c) = (R + c - r, min(r,c))`.
#[inline]
pub fn diag(r: usize, c: usize, rows: usize, _cols: usize) -> (usize, usize) {
    let rp = (rows as isize + c as isize - r as isize) as usize;
    (rp, r.min(c))
}

/// Inverse of [`diag`]: given `(r', m)` recover `(r, c)`.
///
/// `r' = R + c - r`, `m = min(r, c)`. If `r <= c` then `m = r` and
/// `c = m + (r' - R)`, which requires `r' >= R`; otherwise `m = c` and
/// `r = m + (R - r')`, which requires `r' < R`. The two cases are mutually
/// exclusive and `r'` alone decides which applies.
#[inline]
pub fn diag_inv(rp: usize, m: usize, rows: usize, _cols: usize) -> (usize, usize) {
    if rp >= rows {
        (m, m + (rp - rows))
    } else {
        (m + (rows - rp), m)
    }
}

/// `AD(r,c) = (r+c-1, (r+c) <= C ? r : C - c + 1)`.
#[inline]
pub fn anti_diag(r: usize, c: usize, _rows: usize, cols: usize) -> (usize, usize) {
    let rp = r + c - 1;
    let cp = if r + c <= cols { r } else { cols - c + 1 };
    (rp, cp)
}

/// Inverse of [`anti_diag`]. `rp = r + c - 1`, so `S := r + c = rp + 1`.
/// The forward map's own branch condition `S <= C` is equivalent to
/// `rp < cols`, independent of `cp`, so the branch can be taken directly:
/// - `rp < cols`:  `cp = r`, hence `r = cp`, `c = S - cp`.
/// - `rp >= cols`: `cp = C - c + 1`, hence `c = C - cp + 1`, `r = S - c`.
#[inline]
pub fn anti_diag_inv(rp: usize, cp: usize, _rows: usize, cols: usize) -> (usize, usize) {
    let sum = rp + 1; // r + c
    if rp < cols {
        (cp, sum - cp)
    } else {
        let c = cols + 1 - cp;
        (sum - c, c)
    }
}

/// `BRk(r,c) = ((r-1)/k + 1, (r-1) mod k + k(c-1) + 1)`.
#[inline]
pub fn block_row_at(k: u8, r: usize, c: usize, _rows: usize, _cols: usize) -> (usize, usize) {
    let k = k as usize;
    let rp = (r - 1) / k + 1;
    let cp = (r - 1) % k + k * (c - 1) + 1;
    (rp, cp)
}

/// Returns a `fn` pointer specialized to block width `k`, for callers (the
/// kernel-specialization table) that want a plain function pointer rather
/// than a closure over `k`.
pub fn block_row(k: u8) -> XformFn {
    match k {
        2 => br2,
        3 => br3,
        4 => br4,
        5 => br5,
        6 => br6,
        7 => br7,
        8 => br8,
        _ => unreachable!("block width checked to be in [2,8]"),
    }
}

macro_rules! br_impl {
    ($name:ident, $k:literal) => {
        #[inline]
        fn $name(r: usize, c: usize, rows: usize, cols: usize) -> (usize, usize) {
            block_row_at($k, r, c, rows, cols)
        }
    };
}

br_impl!(br2, 2);
br_impl!(br3, 3);
br_impl!(br4, 4);
br_impl!(br5, 5);
br_impl!(br6, 6);
br_impl!(br7, 7);
br_impl!(br8, 8);

/// Inverse of `BRk`: `cp = (r-1) mod k + k*(c-1) + 1`, `rp = (r-1)/k + 1`.
/// So `(r-1) mod k = (cp - 1) mod k` and `(c - 1) = (cp - 1) / k`, then
/// `r - 1 = (rp - 1) * k + (cp - 1) mod k`.
pub fn block_row_inv(k: u8, rp: usize, cp: usize, _rows: usize, _cols: usize) -> (usize, usize) {
    let k = k as usize;
    let rem = (cp - 1) % k;
    let c = (cp - 1) / k + 1;
    let r = (rp - 1) * k + rem + 1;
    (r, c)
}

/// `BCk(r,c) = BRk(V(r,c))`.
pub fn block_col(k: u8, r: usize, c: usize, rows: usize, cols: usize) -> (usize, usize) {
    let (vr, vc) = vert(r, c, rows, cols);
    block_row(k)(vr, vc, cols, rows)
}

pub fn block_col_inv(k: u8, rp: usize, cp: usize, rows: usize, cols: usize) -> (usize, usize) {
    let (vr, vc) = block_row_inv(k, rp, cp, cols, rows);
    vert_inv(vr, vc, cols, rows)
}

/// Applies the forward transform for `enc`.
pub fn apply(enc: Encoding, r: usize, c: usize, rows: usize, cols: usize) -> (usize, usize) {
    match enc {
        Encoding::None | Encoding::Horiz => horiz(r, c, rows, cols),
        Encoding::Vert => vert(r, c, rows, cols),
        Encoding::Diag => diag(r, c, rows, cols),
        Encoding::AntiDiag => anti_diag(r, c, rows, cols),
        Encoding::BlockRow(k) => block_row(k)(r, c, rows, cols),
        Encoding::BlockCol(k) => block_col(k, r, c, rows, cols),
    }
}

/// Applies the inverse transform for `enc`, mapping back to Horizontal
/// (natural row-major) coordinates.
pub fn apply_inv(enc: Encoding, rp: usize, cp: usize, rows: usize, cols: usize) -> (usize, usize) {
    match enc {
        Encoding::None | Encoding::Horiz => horiz_inv(rp, cp, rows, cols),
        Encoding::Vert => vert_inv(rp, cp, rows, cols),
        Encoding::Diag => diag_inv(rp, cp, rows, cols),
        Encoding::AntiDiag => anti_diag_inv(rp, cp, rows, cols),
        Encoding::BlockRow(k) => block_row_inv(k, rp, cp, rows, cols),
        Encoding::BlockCol(k) => block_col_inv(k, rp, cp, rows, cols),
    }
}

/// The number of rows a partition has once sorted under `enc`, given its
/// Horizontal-order `(rows, cols)` extent. Needed to size `rowptr` after a
/// [`crate::partition::SparsePartition::transform`].
pub fn row_count(enc: Encoding, rows: usize, cols: usize) -> usize {
    match enc {
        Encoding::None | Encoding::Horiz => rows,
        Encoding::Vert => cols,
        Encoding::Diag => rows + cols - 1,
        Encoding::AntiDiag => rows + cols - 1,
        Encoding::BlockRow(k) => rows.div_ceil(k as usize),
        Encoding::BlockCol(k) => cols.div_ceil(k as usize),
    }
}

/// Composes through the canonical Horizontal basis: `T_a->b = T_b . T_a^-1`.
pub fn compose(from: Encoding, to: Encoding, r: usize, c: usize, rows: usize, cols: usize) -> (usize, usize) {
    let (hr, hc) = apply_inv(from, r, c, rows, cols);
    apply(to, hr, hc, rows, cols)
}

/// A `(from, to) -> transform` registry: returns a callable given a
/// `(from, to)` pair. Since block widths are runtime values, this returns a
/// boxed closure rather than a raw function pointer for block encodings.
pub struct TransformRegistry;

impl TransformRegistry {
    pub fn get(from: Encoding, to: Encoding) -> impl Fn(usize, usize, usize, usize) -> (usize, usize) {
        move |r, c, rows, cols| compose(from, to, r, c, rows, cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{BLOCK_MAX, BLOCK_MIN};

    fn roundtrip(enc: Encoding, rows: usize, cols: usize) {
        for r in 1..=rows {
            for c in 1..=cols {
                let (rp, cp) = apply(enc, r, c, rows, cols);
                let (r2, c2) = apply_inv(enc, rp, cp, rows, cols);
                assert_eq!((r, c), (r2, c2), "enc={enc:?} r={r} c={c} rows={rows} cols={cols}");
            }
        }
    }

    #[test]
    fn horiz_vert_roundtrip() {
        roundtrip(Encoding::Horiz, 5, 7);
        roundtrip(Encoding::Vert, 5, 7);
    }

    #[test]
    fn diag_roundtrip() {
        roundtrip(Encoding::Diag, 6, 6);
        roundtrip(Encoding::Diag, 4, 9);
    }

    #[test]
    fn anti_diag_roundtrip() {
        roundtrip(Encoding::AntiDiag, 6, 6);
        roundtrip(Encoding::AntiDiag, 5, 8);
    }

    #[test]
    fn block_row_col_roundtrip() {
        for k in 2..=8u8 {
            roundtrip(Encoding::BlockRow(k), 16, 5);
            roundtrip(Encoding::BlockCol(k), 5, 16);
        }
    }

    fn any_encoding() -> impl proptest::strategy::Strategy<Value = Encoding> {
        use proptest::prelude::*;
        prop_oneof![
            Just(Encoding::Horiz),
            Just(Encoding::Vert),
            Just(Encoding::Diag),
            Just(Encoding::AntiDiag),
            (BLOCK_MIN..=BLOCK_MAX).prop_map(Encoding::BlockRow),
            (BLOCK_MIN..=BLOCK_MAX).prop_map(Encoding::BlockCol),
        ]
    }

    proptest::proptest! {
        #[test]
        fn apply_then_apply_inv_is_identity(
            enc in any_encoding(),
            rows in 1usize..20,
            cols in 1usize..20,
            ri in 0usize..20,
            ci in 0usize..20,
        ) {
            let r = ri % rows + 1;
            let c = ci % cols + 1;
            let (rp, cp) = apply(enc, r, c, rows, cols);
            let (r2, c2) = apply_inv(enc, rp, cp, rows, cols);
            proptest::prop_assert_eq!((r, c), (r2, c2));
        }
    }
}
