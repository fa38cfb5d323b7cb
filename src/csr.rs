//! CSR ingestion: the plain compressed-sparse-row representation matrices
//! arrive in (via [`crate::mmf`] or a direct builder) before being split
//! into partitions and re-encoded as CSX.

use crate::error::Error;
use crate::Value;

#[derive(Debug, Clone)]
pub struct CsrMatrix {
    nr_rows: usize,
    nr_cols: usize,
    rowptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<Value>,
}

impl CsrMatrix {
    /// Builds from `(row, col, value)` triples, 1-based. Triples need not
    /// arrive sorted; duplicate `(row, col)` pairs are summed, matching
    /// Matrix Market's "general" coordinate format convention.
    pub fn from_triples(
        nr_rows: usize,
        nr_cols: usize,
        mut triples: Vec<(usize, usize, Value)>,
    ) -> Result<Self, Error> {
        for &(r, c, _) in &triples {
            if r == 0 || r > nr_rows {
                return Err(Error::IndexOutOfBounds { index: r, limit: nr_rows });
            }
            if c == 0 || c > nr_cols {
                return Err(Error::IndexOutOfBounds { index: c, limit: nr_cols });
            }
        }
        triples.sort_by_key(|&(r, c, _)| (r, c));

        let mut rowptr = vec![0usize; nr_rows + 1];
        let mut col_idx = Vec::with_capacity(triples.len());
        let mut values = Vec::with_capacity(triples.len());
        let mut row = 1usize;
        let mut i = 0usize;
        while i < triples.len() {
            let (r, c, _) = triples[i];
            while row < r {
                rowptr[row] = col_idx.len();
                row += 1;
            }
            let mut sum = 0.0;
            let mut j = i;
            while j < triples.len() && triples[j].0 == r && triples[j].1 == c {
                sum += triples[j].2;
                j += 1;
            }
            col_idx.push(c);
            values.push(sum);
            i = j;
        }
        while row <= nr_rows {
            rowptr[row] = col_idx.len();
            row += 1;
        }

        Ok(Self { nr_rows, nr_cols, rowptr, col_idx, values })
    }

    pub fn nr_rows(&self) -> usize {
        self.nr_rows
    }

    pub fn nr_cols(&self) -> usize {
        self.nr_cols
    }

    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    pub fn rowptr(&self) -> &[usize] {
        &self.rowptr
    }

    pub fn row(&self, r: usize) -> (&[usize], &[Value]) {
        let s = self.rowptr[r];
        let e = self.rowptr[r + 1];
        (&self.col_idx[s..e], &self.values[s..e])
    }

    /// Dense reference SpMV (`y = A*x`), used by tests and the CLI's
    /// `--verify` flag to check the CSX kernel path against ground truth.
    pub fn spmv_reference(&self, x: &[Value]) -> Vec<Value> {
        let mut y = vec![0.0; self.nr_rows];
        for r in 0..self.nr_rows {
            let (cols, vals) = self.row(r);
            let mut acc: Value = 0.0;
            for (&c, &v) in cols.iter().zip(vals) {
                acc += v * x[c - 1];
            }
            y[r] = acc;
        }
        y
    }

    /// 0-based row range `[row_lo, row_hi)` as `(row, col, value)` triples
    /// with `row` renumbered 1-based *local* to the range (for handing one
    /// thread's slice to [`crate::partition::SparsePartition`]).
    pub fn triples_in_range(&self, row_lo: usize, row_hi: usize) -> Vec<(usize, usize, Value)> {
        let mut out = Vec::with_capacity(self.rowptr[row_hi] - self.rowptr[row_lo]);
        for r in row_lo..row_hi {
            let (cols, vals) = self.row(r);
            for (&c, &v) in cols.iter().zip(vals) {
                out.push((r - row_lo + 1, c, v));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_triples_sums_duplicates() {
        let csr = CsrMatrix::from_triples(2, 2, vec![(1, 1, 1.0), (1, 1, 2.0), (2, 2, 3.0)]).unwrap();
        assert_eq!(csr.nnz(), 2);
        let (cols, vals) = csr.row(0);
        assert_eq!(cols, &[1]);
        assert_eq!(vals, &[3.0]);
    }

    #[test]
    fn spmv_reference_matches_hand_computation() {
        let csr = CsrMatrix::from_triples(2, 2, vec![(1, 1, 2.0), (1, 2, 3.0), (2, 2, 4.0)]).unwrap();
        let y = csr.spmv_reference(&[1.0, 1.0]);
        assert_eq!(y, vec![5.0, 4.0]);
    }

    #[test]
    fn triples_in_range_renumbers_locally() {
        let csr = CsrMatrix::from_triples(3, 2, vec![(1, 1, 1.0), (2, 2, 2.0), (3, 1, 3.0)]).unwrap();
        let t = csr.triples_in_range(1, 3);
        assert_eq!(t, vec![(1, 2, 2.0), (2, 1, 3.0)]);
    }
}
