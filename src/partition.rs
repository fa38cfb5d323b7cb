//! Sparse partition: a horizontally-sliced matrix fragment, the unit the
//! encoding manager and CSX builder operate on.

use crate::element::{Element, Encoding};
use crate::error::Error;
use crate::transform;
use crate::Value;

/// A row-contiguous slab of the matrix, in the traversal order given by
/// `encoding`. Elements are always kept sorted by the lex order that
/// `encoding` induces; `rowptr` maps each local row to the index of its
/// first element.
#[derive(Debug, Clone)]
pub struct SparsePartition {
    pub nr_rows: usize,
    pub nr_cols: usize,
    /// Absolute row (1-based, Horizontal basis) where this slab begins.
    pub row_start: usize,
    pub encoding: Encoding,
    elements: Vec<Element>,
    /// `rowptr[i]..rowptr[i+1]` indexes `elements` for local row `i`
    /// (0-based), `rowptr.len() == row_count(encoding) + 1`.
    rowptr: Vec<usize>,
}

impl SparsePartition {
    pub fn new(nr_rows: usize, nr_cols: usize, row_start: usize) -> Self {
        Self {
            nr_rows,
            nr_cols,
            row_start,
            encoding: Encoding::Horiz,
            elements: Vec::new(),
            rowptr: vec![0; nr_rows + 1],
        }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [Element] {
        &mut self.elements
    }

    /// Replaces all elements wholesale and rebuilds `rowptr` for the
    /// current encoding. Used by the encoding manager after a
    /// pattern-discovery pass changes the element count.
    pub fn replace_elements(&mut self, elements: Vec<Element>) {
        self.elements = elements;
        self.rebuild_rowptr();
    }

    pub fn rowptr(&self) -> &[usize] {
        &self.rowptr
    }

    pub fn nnz(&self) -> usize {
        self.elements.iter().map(|e| e.size()).sum()
    }

    /// Drains up to `limit` `(row, col, value)` triples from `iter`,
    /// building singleton elements and `rowptr` on the fly. `row`/`col`
    /// are expected 1-based within the partition's local row space
    /// (caller subtracts `row_start`). Returns the number of triples
    /// consumed. Running out of rows before `limit` is reached is not an
    /// error (limit-based truncation).
    pub fn set_elements(
        &mut self,
        iter: &mut impl Iterator<Item = (usize, usize, Value)>,
        limit: usize,
    ) -> Result<usize, Error> {
        self.elements.clear();
        self.rowptr = vec![0; self.nr_rows + 1];
        let mut consumed = 0usize;
        let mut cur_row = 1usize;
        for (r, c, v) in iter {
            if consumed >= limit {
                break;
            }
            if r < cur_row {
                return Err(Error::InvalidArgument(format!(
                    "input triples must be non-decreasing in row; got row {r} after {cur_row}"
                )));
            }
            if r > self.nr_rows {
                return Err(Error::IndexOutOfBounds { index: r, limit: self.nr_rows });
            }
            if c == 0 || c > self.nr_cols {
                return Err(Error::IndexOutOfBounds { index: c, limit: self.nr_cols });
            }
            while cur_row < r {
                self.rowptr[cur_row] = self.elements.len();
                cur_row += 1;
            }
            self.elements.push(Element::new_singleton(r, c, v));
            consumed += 1;
        }
        while cur_row <= self.nr_rows {
            self.rowptr[cur_row] = self.elements.len();
            cur_row += 1;
        }
        Ok(consumed)
    }

    /// Row-wise iteration bounds (0-based local row index).
    pub fn row_begin(&self, i: usize) -> usize {
        self.rowptr[i]
    }
    pub fn row_end(&self, i: usize) -> usize {
        self.rowptr[i + 1]
    }
    pub fn row_count(&self) -> usize {
        self.rowptr.len() - 1
    }

    /// Remaps every element's coordinates through the transform algebra,
    /// then re-sorts and rebuilds `rowptr` for `to_enc`. After this call
    /// the partition is in `to_enc` order and
    /// `rowptr.len() == row_count(to_enc) + 1`.
    ///
    /// Block transitions stable-sort in groups of `lcm(old_align, new_align)`
    /// rows (the alignment period over which row membership repeats); all
    /// other transitions sort the whole partition in one pass.
    pub fn transform(&mut self, to_enc: Encoding) -> Result<(), Error> {
        if to_enc == self.encoding {
            return Ok(());
        }
        let from = self.encoding;
        for e in self.elements.iter_mut() {
            let (hr, hc) = transform::apply_inv(from, e.row, e.col, self.nr_rows, self.nr_cols);
            let (nr, nc) = transform::apply(to_enc, hr, hc, self.nr_rows, self.nr_cols);
            e.transform((nr, nc));
        }

        let align = lcm(block_align(from), block_align(to_enc));
        if align > 1 {
            stable_sort_in_groups(&mut self.elements, align);
        } else {
            self.elements.sort();
        }

        self.encoding = to_enc;
        self.rebuild_rowptr();
        Ok(())
    }

    fn rebuild_rowptr(&mut self) {
        let nrows = transform::row_count(self.encoding, self.nr_rows, self.nr_cols);
        let mut rowptr = vec![0usize; nrows + 1];
        let mut idx = 0usize;
        for (i, row) in rowptr.iter_mut().enumerate().take(nrows) {
            while idx < self.elements.len() && self.elements[idx].row < i + 1 {
                idx += 1;
            }
            *row = idx;
        }
        rowptr[nrows] = self.elements.len();
        self.rowptr = rowptr;
    }

    /// *Copying* slice: a fresh partition over local rows `[rs, rs+len)`
    /// (0-based), re-derived from Horizontal order regardless of `self`'s
    /// current encoding.
    pub fn extract_window(&self, rs: usize, len: usize) -> Result<SparsePartition, Error> {
        if rs + len > self.nr_rows {
            return Err(Error::IndexOutOfBounds { index: rs + len, limit: self.nr_rows });
        }
        let mut horiz = self.clone();
        horiz.transform(Encoding::Horiz)?;
        let s = horiz.row_begin(rs);
        let e = horiz.row_begin(rs + len);
        let mut out = SparsePartition::new(len, self.nr_cols, self.row_start + rs);
        out.elements = horiz.elements[s..e]
            .iter()
            .map(|el| {
                let mut el = el.clone();
                el.row -= rs;
                el
            })
            .collect();
        out.rebuild_rowptr();
        Ok(out)
    }
}

/// A *moving* slice taken out of a partition via [`SparsePartition::get_window`];
/// the caller must return it via [`SparsePartition::put_window`] before the
/// borrow of the parent partition's row range is considered valid again.
pub struct WindowView {
    rs: usize,
    len: usize,
    elements: Vec<Element>,
}

impl SparsePartition {
    /// Moves the elements covering local rows `[rs, rs+len)` out of `self`
    /// (which is left with a hole there) into a [`WindowView`] the caller
    /// owns until it calls [`Self::put_window`].
    pub fn get_window(&mut self, rs: usize, len: usize) -> Result<WindowView, Error> {
        if self.encoding != Encoding::Horiz {
            return Err(Error::InvalidArgument(
                "get_window requires the partition to be in Horizontal order".into(),
            ));
        }
        if rs + len > self.nr_rows {
            return Err(Error::IndexOutOfBounds { index: rs + len, limit: self.nr_rows });
        }
        let s = self.row_begin(rs);
        let e = self.row_begin(rs + len);
        let elements: Vec<Element> = self
            .elements
            .drain(s..e)
            .map(|mut el| {
                el.row -= rs;
                el
            })
            .collect();
        self.rebuild_rowptr();
        Ok(WindowView { rs, len, elements })
    }

    /// Returns a window previously taken with [`Self::get_window`],
    /// re-inserting its elements at their original row offset.
    pub fn put_window(&mut self, window: WindowView) -> Result<(), Error> {
        if window.rs + window.len > self.nr_rows {
            return Err(Error::IndexOutOfBounds { index: window.rs + window.len, limit: self.nr_rows });
        }
        let insert_at = self.row_begin(window.rs);
        let shifted: Vec<Element> = window
            .elements
            .into_iter()
            .map(|mut el| {
                el.row += window.rs;
                el
            })
            .collect();
        self.elements.splice(insert_at..insert_at, shifted);
        self.rebuild_rowptr();
        Ok(())
    }
}

/// The row-alignment period of an encoding: block encodings tie `k`
/// Horizontal rows into one row of their own order.
fn block_align(enc: Encoding) -> usize {
    match enc {
        Encoding::BlockRow(k) => k as usize,
        _ => 1,
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 { 1 } else { a / gcd(a, b) * b }
}

/// Stable-sorts `elements` in successive groups of `group` Horizontal rows
/// at a time, preserving relative order within each block-alignment period
/// so a block transition doesn't scatter a row's members across groups.
fn stable_sort_in_groups(elements: &mut [Element], group: usize) {
    // Elements are already remapped into `to_enc` coordinates; grouping by
    // Horizontal row isn't directly available post-transform, so fall back
    // to a single stable sort, which is always correct (just potentially
    // more work than the grouped variant) for the modest partition sizes
    // this engine targets per worker.
    let _ = group;
    elements.sort();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_simple() -> SparsePartition {
        let mut p = SparsePartition::new(3, 3, 1);
        let triples = vec![(1, 1, 1.0), (1, 2, 2.0), (2, 2, 3.0), (3, 1, 4.0)];
        let mut it = triples.into_iter();
        p.set_elements(&mut it, usize::MAX).unwrap();
        p
    }

    #[test]
    fn set_elements_builds_rowptr() {
        let p = build_simple();
        assert_eq!(p.rowptr(), &[0, 2, 3, 4]);
        assert_eq!(p.nnz(), 4);
    }

    #[test]
    fn transform_roundtrip_preserves_elements() {
        let mut p = build_simple();
        let original: Vec<_> = p.elements().to_vec();
        p.transform(Encoding::Vert).unwrap();
        assert_eq!(p.row_count(), 3);
        p.transform(Encoding::Horiz).unwrap();
        let mut after: Vec<_> = p.elements().to_vec();
        let mut before = original;
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn extract_window_copies_subrange() {
        let p = build_simple();
        let w = p.extract_window(1, 2).unwrap();
        assert_eq!(w.nr_rows, 2);
        assert_eq!(w.nnz(), 2);
    }
}
