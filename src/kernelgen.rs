//! Kernel specialization: a monomorphized runtime-dispatch table standing
//! in for true JIT code generation. Each [`Encoding`] gets its own tight
//! apply loop (no generic transform round-trip per element beyond the
//! closed-form needed to recover a pattern member's column), selected
//! once per unit by a `match` on [`crate::element::PatternId`] rather than
//! compiled and loaded at runtime.

use crate::csx::DecodedUnit;
use crate::element::Encoding;
use crate::transform;
use crate::Value;

/// Applies one decoded unit's contribution to `y`, i.e. `y[row] +=
/// value * x[col]` for every `(row, col, value)` the unit covers.
///
/// `unit.row`/`unit.col` are already 1-based Horizontal coordinates of the
/// unit's first element (the byte stream never stores anything else);
/// `rows`/`cols` are the full matrix extent, needed to invert block/
/// diagonal geometry.
pub fn apply_unit(y: &mut [Value], x: &[Value], rows: usize, cols: usize, unit: &DecodedUnit, values: &[Value]) {
    debug_assert_eq!(values.len(), unit.size);
    match unit.pattern.encoding {
        Encoding::None => apply_delta_unit(y, x, unit, values),
        Encoding::Horiz => apply_horiz(y, x, unit, values),
        Encoding::Vert => apply_vert(y, x, unit, values),
        Encoding::Diag => apply_geometric(y, x, rows, cols, unit, values, Encoding::Diag),
        Encoding::AntiDiag => apply_geometric(y, x, rows, cols, unit, values, Encoding::AntiDiag),
        Encoding::BlockRow(_) => apply_geometric(y, x, rows, cols, unit, values, unit.pattern.encoding),
        Encoding::BlockCol(_) => apply_geometric(y, x, rows, cols, unit, values, unit.pattern.encoding),
    }
}

#[inline]
fn apply_delta_unit(y: &mut [Value], x: &[Value], unit: &DecodedUnit, values: &[Value]) {
    let cols = unit.cols.as_ref().expect("delta unit must carry explicit columns");
    let row = unit.row - 1;
    let mut acc: Value = 0.0;
    for (i, &c) in cols.iter().enumerate() {
        acc += values[i] * x[c - 1];
    }
    y[row] += acc;
}

/// `Horiz` runs stay in one row with column stride `delta`: the common
/// case, and the one worth a dedicated tight loop.
#[inline]
fn apply_horiz(y: &mut [Value], x: &[Value], unit: &DecodedUnit, values: &[Value]) {
    let row = unit.row - 1;
    let delta = unit.pattern.delta.max(1) as usize;
    let mut acc: Value = 0.0;
    let mut col = unit.col;
    for &v in values {
        acc += v * x[col - 1];
        col += delta;
    }
    y[row] += acc;
}

/// `Vert` runs stay in one column with row stride `delta`: each element
/// contributes to a *different* row of `y`, so there's no single
/// accumulator.
#[inline]
fn apply_vert(y: &mut [Value], x: &[Value], unit: &DecodedUnit, values: &[Value]) {
    let col = unit.col;
    let delta = unit.pattern.delta.max(1) as usize;
    let mut row = unit.row;
    for &v in values {
        y[row - 1] += v * x[col - 1];
        row += delta;
    }
}

/// Diagonal, anti-diagonal, and block runs all move both row and column
/// per step; recovering each member's Horizontal coordinate needs the
/// transform registry rather than a flat stride.
#[inline]
fn apply_geometric(
    y: &mut [Value],
    x: &[Value],
    rows: usize,
    cols: usize,
    unit: &DecodedUnit,
    values: &[Value],
    enc: Encoding,
) {
    let (r0, c0) = transform::apply(enc, unit.row, unit.col, rows, cols);
    let delta = unit.pattern.delta.max(1);
    for (i, &v) in values.iter().enumerate() {
        let (rp, cp) = geometric_step(enc, r0, c0, i as u64 * delta);
        let (r, c) = transform::apply_inv(enc, rp, cp, rows, cols);
        y[r - 1] += v * x[c - 1];
    }
}

/// Advances a transformed-space coordinate `step` units along the axis
/// that varies for `enc`: the second (column) coordinate for 1-D
/// encodings, the row for block encodings (since `BRk`/`BCk` pack the
/// block's `k` sub-rows into consecutive transformed columns, not rows —
/// see [`transform::block_row_at`] — so this actually always advances the
/// transformed *column*).
#[inline]
fn geometric_step(_enc: Encoding, rp: usize, cp: usize, step: u64) -> (usize, usize) {
    (rp, cp + step as usize)
}

/// Recovers element `i`'s absolute `(row, col)` within a decoded unit,
/// covering every encoding (delta units included), for callers that need
/// both coordinates rather than a single accumulated `y` contribution.
pub fn unit_entry(unit: &DecodedUnit, rows: usize, cols: usize, i: usize) -> (usize, usize) {
    match unit.pattern.encoding {
        Encoding::None => {
            let c = unit.cols.as_ref().expect("delta unit must carry explicit columns")[i];
            (unit.row, c)
        }
        Encoding::Horiz => {
            let delta = unit.pattern.delta.max(1) as usize;
            (unit.row, unit.col + i * delta)
        }
        Encoding::Vert => {
            let delta = unit.pattern.delta.max(1) as usize;
            (unit.row + i * delta, unit.col)
        }
        enc => {
            let (r0, c0) = transform::apply(enc, unit.row, unit.col, rows, cols);
            let delta = unit.pattern.delta.max(1);
            let (rp, cp) = geometric_step(enc, r0, c0, i as u64 * delta);
            transform::apply_inv(enc, rp, cp, rows, cols)
        }
    }
}

/// Applies one decoded unit's contribution to both the owned row (`buf[row]
/// += v*x[col]`) and its transpose (`buf[col] += v*x[row]`), for the
/// symmetric kernel's strictly-lower-triangular partitions. Dispatches
/// through [`unit_entry`] so every encoding — not just delta units — is
/// supported.
///
/// `unit.row` is local to the partition (as decoded from its own CSX
/// stream); `row_offset` is the partition's 0-based global row start, so
/// `buf`/`x` (both full-length, global) are indexed consistently for
/// both the owned and transposed contribution.
pub fn apply_unit_symmetric(
    buf: &mut [Value],
    x: &[Value],
    rows: usize,
    cols: usize,
    row_offset: usize,
    unit: &DecodedUnit,
    values: &[Value],
) {
    debug_assert_eq!(values.len(), unit.size);
    for (i, &v) in values.iter().enumerate() {
        let (local_row, col) = unit_entry(unit, rows, cols, i);
        let row = row_offset + local_row;
        buf[row - 1] += v * x[col - 1];
        buf[col - 1] += v * x[row - 1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::PatternId;

    #[test]
    fn horiz_unit_sums_into_one_row() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let mut y = vec![0.0; 2];
        let unit = DecodedUnit {
            row: 1,
            col: 1,
            size: 3,
            pattern: PatternId::new(Encoding::Horiz, 1),
            value_offset: 0,
            cols: None,
        };
        let values = [1.0, 1.0, 1.0];
        apply_unit(&mut y, &x, 2, 4, &unit, &values);
        assert_eq!(y[0], 1.0 + 2.0 + 3.0);
    }

    #[test]
    fn vert_unit_spreads_across_rows() {
        let x = vec![2.0];
        let mut y = vec![0.0; 3];
        let unit = DecodedUnit {
            row: 1,
            col: 1,
            size: 3,
            pattern: PatternId::new(Encoding::Vert, 1),
            value_offset: 0,
            cols: None,
        };
        let values = [1.0, 1.0, 1.0];
        apply_unit(&mut y, &x, 3, 1, &unit, &values);
        assert_eq!(y, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn delta_unit_uses_explicit_columns() {
        let x = vec![1.0, 2.0, 3.0];
        let mut y = vec![0.0; 1];
        let unit = DecodedUnit {
            row: 1,
            col: 1,
            size: 2,
            pattern: PatternId::none(),
            value_offset: 0,
            cols: Some(vec![1, 3]),
        };
        let values = [1.0, 1.0];
        apply_unit(&mut y, &x, 1, 3, &unit, &values);
        assert_eq!(y[0], 1.0 + 3.0);
    }
}
