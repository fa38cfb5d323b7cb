//! CSX byte-stream construction: flattens an encoded [`SparsePartition`]
//! into the `ctl` control stream + `values` array pair, plus a
//! `row_ctl_offsets`/`row_value_offsets` index (the "rows_info" side
//! table) that lets the multi-threaded build locate any row's stream
//! without replaying the whole thing from the start.
//!
//! `ctl` unit layout, one record per run (either a pattern or a grouped
//! run of unrelated singletons, the "delta unit" with reserved id 0):
//!
//! ```text
//! header byte: bit7 = NEW_ROW, bits0..6 = encoding tag (0 = delta unit)
//! [uvarint row_jump]     -- only if NEW_ROW is set
//! uvarint col_jump       -- gap from the row's running column cursor
//! uvarint size           -- element count in this unit
//! if tag is block:  u8 block width
//! else if tag != 0: uvarint delta      -- uniform stride
//! else:             (size - 1) uvarint deltas, one per following element
//! ```
//!
//! Values are never interleaved into `ctl`; every unit's `size` values are
//! appended to `values` in emission order.

use crate::build::EncodeMode;
use crate::element::{Encoding, PatternId};
use crate::encode::{EncodeConfig, EncodingManager};
use crate::error::Error;
use crate::partition::SparsePartition;
use crate::Value;

fn write_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn read_uvarint(buf: &[u8], pos: &mut usize) -> u64 {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = buf[*pos];
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    result
}

const NEW_ROW: u8 = 0x80;

fn tag_of(enc: Encoding) -> u8 {
    match enc {
        Encoding::None => 0,
        Encoding::Horiz => 1,
        Encoding::Vert => 2,
        Encoding::Diag => 3,
        Encoding::AntiDiag => 4,
        Encoding::BlockRow(_) => 5,
        Encoding::BlockCol(_) => 6,
    }
}

fn encoding_of_tag(tag: u8, second: u8) -> Encoding {
    match tag {
        0 => Encoding::None,
        1 => Encoding::Horiz,
        2 => Encoding::Vert,
        3 => Encoding::Diag,
        4 => Encoding::AntiDiag,
        5 => Encoding::BlockRow(second),
        6 => Encoding::BlockCol(second),
        _ => unreachable!("ctl tag must be 0..=6"),
    }
}

/// One decoded ctl unit, ready for kernel dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUnit {
    /// 1-based Horizontal row.
    pub row: usize,
    /// 1-based Horizontal column of the unit's first element.
    pub col: usize,
    pub size: usize,
    pub pattern: PatternId,
    /// Offset into [`Csx::values`] where this unit's values start.
    pub value_offset: usize,
    /// Absolute column of every element, only populated for delta units
    /// ([`PatternId::is_none`]) where no uniform stride determines them;
    /// real patterns derive each member's column from `col`/`pattern`
    /// geometrically.
    pub cols: Option<Vec<usize>>,
}

/// The flattened CSX representation of one partition.
#[derive(Debug, Clone)]
pub struct Csx {
    pub nr_rows: usize,
    pub nr_cols: usize,
    pub ctl: Vec<u8>,
    pub values: Vec<Value>,
    /// `row_ctl_offsets[i]..row_ctl_offsets[i+1]` bounds row `i`'s
    /// units in `ctl`; length `nr_rows + 1`.
    pub row_ctl_offsets: Vec<usize>,
    /// `row_value_offsets[i]` is the index into `values` where row `i`'s
    /// first unit's values start; length `nr_rows + 1`, the per-row
    /// `{ctl_offset, val_offset}` side table.
    pub row_value_offsets: Vec<usize>,
}

impl Csx {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Builds a CSX stream from a partition that must already be in
    /// [`Encoding::Horiz`] order: the byte stream stores a `row_jump`
    /// between consecutive emitted rows, so emission order must match the
    /// natural row order.
    pub fn build(partition: &SparsePartition) -> Result<Self, Error> {
        if partition.encoding != Encoding::Horiz {
            return Err(Error::InvalidArgument("CSX build requires a Horizontal-ordered partition".into()));
        }
        let nr_rows = partition.row_count();
        let mut ctl = Vec::new();
        let mut values = Vec::new();
        let mut row_ctl_offsets = vec![0usize; nr_rows + 1];
        let mut row_value_offsets = vec![0usize; nr_rows + 1];
        let mut last_emitted_row: Option<usize> = None;

        for row in 0..nr_rows {
            row_ctl_offsets[row] = ctl.len();
            row_value_offsets[row] = values.len();
            let s = partition.row_begin(row);
            let e = partition.row_end(row);
            if s == e {
                continue;
            }
            let mut col_cursor = 0usize;
            let mut idx = s;
            let mut first_unit = true;
            let elements = partition.elements();
            while idx < e {
                let header_pos_row_jump = if first_unit {
                    let jump = row as u64 - last_emitted_row.map(|r| r as u64).unwrap_or(0);
                    last_emitted_row = Some(row);
                    Some(jump)
                } else {
                    None
                };

                if elements[idx].is_pattern() {
                    let el = &elements[idx];
                    let tag = tag_of(el.encoding());
                    let header = tag | if header_pos_row_jump.is_some() { NEW_ROW } else { 0 };
                    ctl.push(header);
                    if let Some(jump) = header_pos_row_jump {
                        write_uvarint(&mut ctl, jump);
                    }
                    write_uvarint(&mut ctl, (el.col - col_cursor) as u64);
                    write_uvarint(&mut ctl, el.size() as u64);
                    if el.encoding().is_block() {
                        let k = match el.encoding() {
                            Encoding::BlockRow(k) | Encoding::BlockCol(k) => k,
                            _ => unreachable!(),
                        };
                        ctl.push(k);
                    } else {
                        write_uvarint(&mut ctl, el.delta());
                    }
                    values.extend_from_slice(el.values());
                    col_cursor = if el.encoding().is_block() {
                        el.col + el.size() - 1
                    } else {
                        el.col + (el.size() - 1) * el.delta().max(1) as usize
                    };
                    idx += 1;
                } else {
                    let start = idx;
                    while idx < e && !elements[idx].is_pattern() {
                        idx += 1;
                    }
                    let run = &elements[start..idx];
                    let header = if header_pos_row_jump.is_some() { NEW_ROW } else { 0 };
                    ctl.push(header);
                    if let Some(jump) = header_pos_row_jump {
                        write_uvarint(&mut ctl, jump);
                    }
                    write_uvarint(&mut ctl, (run[0].col - col_cursor) as u64);
                    write_uvarint(&mut ctl, run.len() as u64);
                    let mut last = run[0].col;
                    for el in &run[1..] {
                        write_uvarint(&mut ctl, (el.col - last) as u64);
                        last = el.col;
                    }
                    for el in run {
                        values.extend_from_slice(el.values());
                    }
                    col_cursor = last;
                }
                first_unit = false;
            }
        }
        row_ctl_offsets[nr_rows] = ctl.len();
        row_value_offsets[nr_rows] = values.len();

        Ok(Self {
            nr_rows: partition.nr_rows,
            nr_cols: partition.nr_cols,
            ctl,
            values,
            row_ctl_offsets,
            row_value_offsets,
        })
    }

    /// Iterates the decoded units of row `row` (0-based local row), for
    /// callers that already located it via `row_ctl_offsets`.
    pub fn decode_row(&self, row: usize) -> RowUnits<'_> {
        RowUnits {
            csx: self,
            pos: self.row_ctl_offsets[row],
            end: self.row_ctl_offsets[row + 1],
            row: row + 1,
            col_cursor: 0,
            value_pos: self.row_value_offsets[row],
        }
    }
}

/// Iterator over one row's decoded units.
pub struct RowUnits<'a> {
    csx: &'a Csx,
    pos: usize,
    end: usize,
    row: usize,
    col_cursor: usize,
    value_pos: usize,
}

impl<'a> Iterator for RowUnits<'a> {
    type Item = DecodedUnit;

    fn next(&mut self) -> Option<DecodedUnit> {
        if self.pos >= self.end {
            return None;
        }
        let header = self.csx.ctl[self.pos];
        self.pos += 1;
        if header & NEW_ROW != 0 {
            let _jump = read_uvarint(&self.csx.ctl, &mut self.pos);
            self.col_cursor = 0;
        }
        let tag = header & 0x7f;
        let col_jump = read_uvarint(&self.csx.ctl, &mut self.pos) as usize;
        let size = read_uvarint(&self.csx.ctl, &mut self.pos) as usize;
        let col = self.col_cursor + col_jump;
        let mut cols = None;
        let pattern = if tag == 5 || tag == 6 {
            let k = self.csx.ctl[self.pos];
            self.pos += 1;
            self.col_cursor = col + size - 1;
            PatternId::new(encoding_of_tag(tag, k), 0)
        } else if tag != 0 {
            let delta = read_uvarint(&self.csx.ctl, &mut self.pos);
            self.col_cursor = col + (size - 1) * delta.max(1) as usize;
            PatternId::new(encoding_of_tag(tag, 0), delta)
        } else {
            let mut all = Vec::with_capacity(size);
            all.push(col);
            let mut last = col;
            for _ in 1..size {
                let d = read_uvarint(&self.csx.ctl, &mut self.pos);
                last += d as usize;
                all.push(last);
            }
            self.col_cursor = last;
            cols = Some(all);
            PatternId::none()
        };
        let unit = DecodedUnit { row: self.row, col, size, pattern, value_offset: self.value_pos, cols };
        self.value_pos += size;
        Some(unit)
    }
}

/// Symmetric storage: only the strictly-lower triangle is encoded as CSX;
/// the diagonal is kept as a separate dense array and the SpMV kernel
/// reconstructs the upper triangle's contribution by also scattering into
/// `y[col]` for every `(row, col)` below the diagonal.
#[derive(Debug, Clone)]
pub struct CsxSym {
    /// Strictly lower-triangular part (`row > col`, 1-based).
    pub lower: Csx,
    /// `diag[i]` is `A[i+1][i+1]`, length `nr_rows`.
    pub diag: Vec<Value>,
}

impl CsxSym {
    /// Splits a Horizontal-ordered partition into its strictly
    /// lower-triangular part and its diagonal, then runs the same
    /// pattern-discovery step the general build does over the
    /// lower-triangular part before flattening it to CSX.
    pub fn build(partition: &SparsePartition, mode: &EncodeMode, encode_cfg: EncodeConfig) -> Result<Self, Error> {
        if partition.encoding != Encoding::Horiz {
            return Err(Error::InvalidArgument("CSX build requires a Horizontal-ordered partition".into()));
        }
        let mut diag = vec![0.0; partition.nr_rows];
        let mut lower = SparsePartition::new(partition.nr_rows, partition.nr_cols, partition.row_start);
        let mut lower_triples = Vec::new();
        for row in 0..partition.row_count() {
            let s = partition.row_begin(row);
            let e = partition.row_end(row);
            for el in &partition.elements()[s..e] {
                if el.is_pattern() {
                    return Err(Error::InvalidArgument(
                        "symmetric split must run before pattern discovery".into(),
                    ));
                }
                let global_row = partition.row_start + row;
                if el.col == global_row {
                    diag[row] = el.values()[0];
                } else if el.col < global_row {
                    lower_triples.push((row + 1, el.col, el.values()[0]));
                }
                // col > global_row entries are the transpose of another
                // row's already-recorded lower entry; dropped here.
            }
        }
        let mut iter = lower_triples.into_iter();
        lower.set_elements(&mut iter, usize::MAX)?;

        let mut manager = EncodingManager::new(&mut lower, encode_cfg);
        match mode {
            EncodeMode::Explicit(seq) => manager.encode_explicit(seq)?,
            EncodeMode::Auto(candidates) => manager.encode_auto(candidates)?,
        }

        Ok(Self { lower: Csx::build(&lower)?, diag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Encoding;

    fn build_partition() -> SparsePartition {
        let mut p = SparsePartition::new(2, 8, 1);
        let triples =
            vec![(1, 1, 1.0), (1, 2, 1.0), (1, 3, 1.0), (1, 4, 1.0), (1, 7, 9.0), (2, 2, 5.0)];
        let mut it = triples.into_iter();
        p.set_elements(&mut it, usize::MAX).unwrap();
        p
    }

    #[test]
    fn build_preserves_nnz() {
        let p = build_partition();
        let csx = Csx::build(&p).unwrap();
        assert_eq!(csx.nnz(), 6);
        assert_eq!(csx.row_ctl_offsets.len(), 3);
    }

    #[test]
    fn decode_row_recovers_columns() {
        let mut p = build_partition();
        let mut mgr = crate::encode::EncodingManager::new(&mut p, crate::encode::EncodeConfig::default());
        let seq = crate::element::EncodingSeq::parse("h").unwrap();
        mgr.encode_explicit(&seq).unwrap();
        let csx = Csx::build(&p).unwrap();
        let cols: Vec<_> = csx.decode_row(0).map(|u| u.col).collect();
        assert_eq!(cols, vec![1, 7]);
        let cols_row2: Vec<_> = csx.decode_row(1).map(|u| u.col).collect();
        assert_eq!(cols_row2, vec![2]);
        assert!(csx.decode_row(0).any(|u| u.pattern.encoding == Encoding::Horiz && u.size == 4));
    }
}
