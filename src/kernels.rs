//! SpMV kernels: parallel dispatch of the per-partition decode/apply loop
//! over a persistent [`WorkerPool`], plus the symmetric variant's
//! local-buffer + reduction scheme.

use crate::build::BuildResult;
use crate::csx::{Csx, CsxSym};
use crate::error::Error;
use crate::kernelgen::{apply_unit, apply_unit_symmetric};
use crate::runtime::{CorePlan, WorkerPool};
use crate::vector::Vector;
use crate::Value;

/// Runs the decode/apply loop for every row of `csx`, writing into `y`
/// (already sized/offset to `csx`'s own row range).
fn run_partition(csx: &Csx, x: &[Value], y: &mut [Value]) {
    for row in 0..csx.nr_rows {
        for unit in csx.decode_row(row) {
            let values = &csx.values[unit.value_offset..unit.value_offset + unit.size];
            apply_unit(y, x, csx.nr_rows, csx.nr_cols, &unit, values);
        }
    }
}

/// General (non-symmetric) multi-threaded SpMV engine: one CSX partition
/// per worker, each owning a disjoint row range of `y`.
pub struct SpmvEngine {
    pool: WorkerPool,
    build: BuildResult,
    nr_rows: usize,
    nr_cols: usize,
    affinity: Option<CorePlan>,
}

impl SpmvEngine {
    pub fn new(build: BuildResult, nr_rows: usize, nr_cols: usize, affinity: Option<CorePlan>) -> Result<Self, Error> {
        let pool = WorkerPool::new(build.partitions.len(), affinity.clone())?;
        Ok(Self { pool, build, nr_rows, nr_cols, affinity })
    }

    pub fn nr_rows(&self) -> usize {
        self.nr_rows
    }

    pub fn nr_cols(&self) -> usize {
        self.nr_cols
    }

    pub fn build(&self) -> &BuildResult {
        &self.build
    }

    /// The affinity plan workers were pinned with, if any, so the archive
    /// can record each worker's OS core id.
    pub fn affinity(&self) -> Option<&CorePlan> {
        self.affinity.as_ref()
    }

    /// `y = A * x`. `y` is zeroed first; each worker's row range is
    /// written exactly once and never read by another worker, so the
    /// disjoint raw-pointer split below never aliases.
    pub fn multiply(&self, x: &Vector, y: &mut Vector) -> Result<(), Error> {
        if x.len() != self.nr_cols {
            return Err(Error::DimensionMismatch { expected: self.nr_cols, got: x.len() });
        }
        if y.len() != self.nr_rows {
            return Err(Error::DimensionMismatch { expected: self.nr_rows, got: y.len() });
        }
        y.fill(0.0)?;

        let x_ptr: *const Value = x.as_slice().as_ptr();
        let x_len = x.len();
        let y_ptr: *mut Value = y.as_mut_slice()?.as_mut_ptr();
        let row_starts = self.build.row_starts.clone();
        let partitions: *const Csx = self.build.partitions.as_ptr();

        self.pool.dispatch(move |worker| {
            // SAFETY: `x_ptr`/`x_len` outlive this call (borrowed from `x`
            // for the duration of `dispatch`, which blocks until every
            // worker returns); `partitions` likewise borrowed from
            // `self.build`. Each worker's `y` slice is
            // `[row_starts[w]-1, row_starts[w+1]-1)`, disjoint from every
            // other worker's slice, so the concurrent mutable pointers
            // never alias.
            unsafe {
                let x_slice = std::slice::from_raw_parts(x_ptr, x_len);
                let csx = &*partitions.add(worker);
                let lo = row_starts[worker] - 1;
                let hi = row_starts[worker + 1] - 1;
                let y_slice = std::slice::from_raw_parts_mut(y_ptr.add(lo), hi - lo);
                run_partition(csx, x_slice, y_slice);
            }
        });
        Ok(())
    }
}

/// Symmetric SpMV engine: each partition's strictly-lower-triangular
/// CSX contributes to both its own row range (`A[r][c]*x[c]`) and,
/// symmetrically, to row `c` (`A[c][r]*x[r] == A[r][c]*x[r]`) which may
/// fall in another worker's range. Every worker accumulates into a
/// full-length local buffer to avoid cross-thread write contention, and a
/// final reduction pass sums the buffers into `y`.
pub struct SymmetricSpmvEngine {
    pool: WorkerPool,
    partitions: Vec<CsxSym>,
    row_starts: Vec<usize>,
    n: usize,
    affinity: Option<CorePlan>,
}

impl SymmetricSpmvEngine {
    pub fn new(partitions: Vec<CsxSym>, row_starts: Vec<usize>, n: usize, affinity: Option<CorePlan>) -> Result<Self, Error> {
        let pool = WorkerPool::new(partitions.len(), affinity.clone())?;
        Ok(Self { pool, partitions, row_starts, n, affinity })
    }

    pub fn partitions(&self) -> &[CsxSym] {
        &self.partitions
    }

    pub fn row_starts(&self) -> &[usize] {
        &self.row_starts
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// The affinity plan workers were pinned with, if any, so the archive
    /// can record each worker's OS core id.
    pub fn affinity(&self) -> Option<&CorePlan> {
        self.affinity.as_ref()
    }

    pub fn multiply(&self, x: &Vector, y: &mut Vector) -> Result<(), Error> {
        if x.len() != self.n || y.len() != self.n {
            return Err(Error::DimensionMismatch { expected: self.n, got: x.len().min(y.len()) });
        }
        let nr_threads = self.pool.nr_threads();
        let local_buffers: Vec<std::sync::Mutex<Vec<Value>>> =
            (0..nr_threads).map(|_| std::sync::Mutex::new(vec![0.0; self.n])).collect();
        let local_buffers = std::sync::Arc::new(local_buffers);

        let x_ptr: *const Value = x.as_slice().as_ptr();
        let x_len = x.len();
        let partitions: *const CsxSym = self.partitions.as_ptr();
        let row_starts = self.row_starts.clone();
        let n = self.n;

        {
            let local_buffers = std::sync::Arc::clone(&local_buffers);
            self.pool.dispatch(move |worker| {
                // SAFETY: see `SpmvEngine::multiply`; `partitions`/`x_ptr`
                // are borrowed for the duration of this blocking dispatch.
                let (csx, diag) = unsafe {
                    let p = &*partitions.add(worker);
                    (&p.lower, &p.diag)
                };
                let x_slice = unsafe { std::slice::from_raw_parts(x_ptr, x_len) };
                let mut buf = local_buffers[worker].lock().expect("reduction buffer poisoned");
                debug_assert_eq!(buf.len(), n);
                let row_base = row_starts[worker] - 1;
                for (i, &d) in diag.iter().enumerate() {
                    buf[row_base + i] += d * x_slice[row_base + i];
                }
                for row in 0..csx.nr_rows {
                    for unit in csx.decode_row(row) {
                        let values = &csx.values[unit.value_offset..unit.value_offset + unit.size];
                        apply_unit_symmetric(&mut buf, x_slice, csx.nr_rows, csx.nr_cols, row_base, &unit, values);
                    }
                }
            });
        }

        let y_slice = y.as_mut_slice()?;
        y_slice.iter_mut().for_each(|v| *v = 0.0);
        for buf in local_buffers.iter() {
            let buf = buf.lock().expect("reduction buffer poisoned");
            for (acc, &v) in y_slice.iter_mut().zip(buf.iter()) {
                *acc += v;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build, BuildConfig};
    use crate::csr::CsrMatrix;
    use crate::element::Encoding;

    #[test]
    fn general_engine_matches_dense_reference() {
        let csr = CsrMatrix::from_triples(
            4,
            4,
            vec![
                (1, 1, 2.0),
                (1, 2, 1.0),
                (2, 2, 3.0),
                (3, 3, 1.0),
                (3, 4, 2.0),
                (4, 1, 5.0),
            ],
        )
        .unwrap();
        let config = BuildConfig { nr_threads: 2, encode: Default::default(), mode: crate::build::EncodeMode::Auto(vec![Encoding::Horiz]) };
        let result = build(&csr, &config).unwrap();
        let engine = SpmvEngine::new(result, 4, 4, None).unwrap();
        let x = Vector::from_vec(vec![1.0, 1.0, 1.0, 1.0]);
        let mut y = Vector::zeros(4);
        engine.multiply(&x, &mut y).unwrap();
        let expected = csr.spmv_reference(&[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(y.as_slice(), expected.as_slice());
    }
}
