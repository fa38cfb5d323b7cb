//! Multi-threaded build: splits a CSR matrix into row-contiguous
//! partitions balanced by nonzero count, then runs pattern discovery and
//! CSX emission for each partition concurrently.
//!
//! One-shot fan-out (build happens once per matrix, not in SpMV's hot
//! loop), so this uses `std::thread::scope` directly rather than the
//! persistent [`crate::runtime::WorkerPool`] the SpMV path uses for
//! repeated dispatch — the same shape the kinship-matrix build in the
//! reference genetics pipeline uses for its own one-shot per-chunk
//! fan-out.

use crate::csr::CsrMatrix;
use crate::csx::Csx;
use crate::element::{Encoding, EncodingSeq};
use crate::encode::{EncodeConfig, EncodingManager};
use crate::error::Error;
use crate::partition::SparsePartition;
use crate::Value;

/// Which encoding-selection strategy the build uses for every partition.
#[derive(Debug, Clone)]
pub enum EncodeMode {
    Explicit(EncodingSeq),
    Auto(Vec<Encoding>),
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub nr_threads: usize,
    pub encode: EncodeConfig,
    pub mode: EncodeMode,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { nr_threads: 1, encode: EncodeConfig::default(), mode: EncodeMode::Auto(Encoding::all_atoms()) }
    }
}

pub struct BuildResult {
    /// One CSX stream per thread, in row order.
    pub partitions: Vec<Csx>,
    /// `row_starts[i]..row_starts[i+1]` (1-based, Horizontal) is the row
    /// range owned by `partitions[i]`; length `nr_threads + 1`.
    pub row_starts: Vec<usize>,
}

/// Splits `[0, nr_rows)` into `nr_parts` contiguous ranges whose nnz
/// counts (from `rowptr`) are as close to equal as greedy accumulation
/// allows, so every build worker gets roughly the same amount of work.
pub fn split_rows_by_nnz(rowptr: &[usize], nr_parts: usize) -> Vec<usize> {
    let nr_rows = rowptr.len() - 1;
    let nnz = rowptr[nr_rows];
    if nr_parts <= 1 || nnz == 0 {
        return vec![0, nr_rows];
    }
    let target = nnz.div_ceil(nr_parts);
    let mut splits = vec![0usize];
    let mut part_start_nnz = 0usize;
    for row in 0..nr_rows {
        if rowptr[row] - part_start_nnz >= target && splits.len() < nr_parts {
            splits.push(row);
            part_start_nnz = rowptr[row];
        }
    }
    splits.push(nr_rows);
    splits.dedup();
    splits
}

/// Builds one CSX partition per thread from `csr`, running pattern
/// discovery in parallel.
pub fn build(csr: &CsrMatrix, config: &BuildConfig) -> Result<BuildResult, Error> {
    let splits = split_rows_by_nnz(csr.rowptr(), config.nr_threads);
    let nr_parts = splits.len() - 1;

    let triples_per_part: Vec<Vec<(usize, usize, Value)>> =
        (0..nr_parts).map(|i| csr.triples_in_range(splits[i], splits[i + 1])).collect();

    let results: Vec<Result<Csx, Error>> = std::thread::scope(|scope| {
        let handles: Vec<_> = triples_per_part
            .iter()
            .enumerate()
            .map(|(i, triples)| {
                let mode = config.mode.clone();
                let encode_cfg = config.encode;
                let nr_rows = splits[i + 1] - splits[i];
                let nr_cols = csr.nr_cols();
                scope.spawn(move || build_one_partition(triples, nr_rows, nr_cols, splits[i] + 1, &mode, encode_cfg))
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("build worker panicked")).collect()
    });

    let partitions = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    let row_starts = splits.iter().map(|&r| r + 1).collect();
    Ok(BuildResult { partitions, row_starts })
}

fn build_one_partition(
    triples: &[(usize, usize, Value)],
    nr_rows: usize,
    nr_cols: usize,
    row_start: usize,
    mode: &EncodeMode,
    encode_cfg: EncodeConfig,
) -> Result<Csx, Error> {
    let mut partition = SparsePartition::new(nr_rows, nr_cols, row_start);
    let mut iter = triples.iter().map(|&(r, c, v)| (r, c, v));
    partition.set_elements(&mut iter, usize::MAX)?;

    let mut manager = EncodingManager::new(&mut partition, encode_cfg);
    match mode {
        EncodeMode::Explicit(seq) => manager.encode_explicit(seq)?,
        EncodeMode::Auto(candidates) => manager.encode_auto(candidates)?,
    }

    Csx::build(&partition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_rows_balances_nnz() {
        // rows 0..5 with nnz counts 10,10,10,10,10 (rowptr cumulative)
        let rowptr = vec![0, 10, 20, 30, 40, 50];
        let splits = split_rows_by_nnz(&rowptr, 2);
        assert_eq!(splits.first(), Some(&0));
        assert_eq!(splits.last(), Some(&5));
        assert!(splits.len() <= 3);
    }

    #[test]
    fn build_produces_one_partition_per_thread() {
        let csr = CsrMatrix::from_triples(
            3,
            3,
            vec![(1, 1, 1.0), (1, 2, 2.0), (2, 2, 3.0), (3, 3, 4.0)],
        )
        .unwrap();
        let config = BuildConfig { nr_threads: 2, ..Default::default() };
        let result = build(&csr, &config).unwrap();
        assert_eq!(result.partitions.len(), result.row_starts.len() - 1);
        let total_nnz: usize = result.partitions.iter().map(|p| p.nnz()).sum();
        assert_eq!(total_nnz, 4);
    }
}
