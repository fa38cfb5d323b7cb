//! Public facade: the one entry point most callers need. Wraps ingestion,
//! build, and the SpMV engine behind a single opaque handle, configured
//! through the dotted-name [`Config`] registry.

use std::path::Path;

use crate::archive;
use crate::build::{build, BuildConfig, EncodeMode};
use crate::config::Config;
use crate::csr::CsrMatrix;
use crate::csx::CsxSym;
use crate::element::{Encoding, EncodingSeq};
use crate::encode::EncodeConfig;
use crate::error::Error;
use crate::kernels::{SpmvEngine, SymmetricSpmvEngine};
use crate::mmf;
use crate::partition::SparsePartition;
use crate::runtime::CorePlan;
use crate::vector::Vector;

enum Engine {
    General(SpmvEngine),
    Symmetric(SymmetricSpmvEngine),
}

/// A built, ready-to-multiply sparse matrix. Opaque by design: callers
/// never see partitions, CSX internals, or the encoding search.
pub struct Matrix {
    engine: Engine,
    nr_rows: usize,
    nr_cols: usize,
}

fn resolve_encode_config(config: &Config) -> Result<EncodeConfig, Error> {
    Ok(EncodeConfig {
        min_unit_size: config.get_int("matrix.preproc.min_unit_size", 4)? as usize,
        max_unit_size: config.get_int("matrix.preproc.max_unit_size", 255)? as usize,
        min_coverage: config.get_float("matrix.preproc.min_coverage", 0.1)?,
        split_blocks: config.get_bool("matrix.preproc.split_blocks", false)?,
        sampling: crate::encode::Sampling::None,
    })
}

fn resolve_mode(config: &Config) -> Result<EncodeMode, Error> {
    match config.get_str("matrix.preproc.xform", "")? {
        "" => Ok(EncodeMode::Auto(Encoding::all_atoms())),
        seq => Ok(EncodeMode::Explicit(EncodingSeq::parse(seq)?)),
    }
}

fn resolve_affinity(config: &Config, nr_threads: usize) -> Result<Option<CorePlan>, Error> {
    match config.get_str("affinity.cores", "")? {
        "" => Ok(None),
        spec => {
            let ids: Vec<usize> = spec
                .split(',')
                .map(|s| s.trim().parse::<usize>())
                .collect::<Result<_, _>>()
                .map_err(|_| Error::InvalidConfig(format!("bad affinity.cores list {spec:?}")))?;
            if ids.len() != nr_threads {
                return Err(Error::InvalidConfig(format!(
                    "affinity.cores lists {} cores but runtime.nr_threads is {nr_threads}",
                    ids.len()
                )));
            }
            Ok(Some(CorePlan::explicit(&ids)))
        }
    }
}

impl Matrix {
    /// Reads a Matrix Market file, partitions it, runs pattern discovery
    /// (per `matrix.preproc.*` options), and assembles the SpMV engine.
    pub fn from_mmf(path: &Path, config: &Config) -> Result<Self, Error> {
        let csr = mmf::read_file(path)?;
        Self::from_csr(csr, config)
    }

    pub fn from_csr(csr: CsrMatrix, config: &Config) -> Result<Self, Error> {
        let nr_rows = csr.nr_rows();
        let nr_cols = csr.nr_cols();
        let nr_threads = (config.get_int("runtime.nr_threads", 1)? as usize).max(1);
        let affinity = resolve_affinity(config, nr_threads)?;
        let symmetric = config.get_bool("matrix.symmetric", false)?;

        let encode_cfg = resolve_encode_config(config)?;
        let mode = resolve_mode(config)?;

        if symmetric {
            if nr_rows != nr_cols {
                return Err(Error::InvalidArgument("symmetric matrices must be square".into()));
            }
            let splits = crate::build::split_rows_by_nnz(csr.rowptr(), nr_threads);
            let nr_parts = splits.len() - 1;
            let mut partitions = Vec::with_capacity(nr_parts);
            for i in 0..nr_parts {
                let triples = csr.triples_in_range(splits[i], splits[i + 1]);
                let mut partition = SparsePartition::new(splits[i + 1] - splits[i], nr_cols, splits[i] + 1);
                let mut iter = triples.into_iter();
                partition.set_elements(&mut iter, usize::MAX)?;
                partitions.push(CsxSym::build(&partition, &mode, encode_cfg)?);
            }
            let row_starts: Vec<usize> = splits.iter().map(|&r| r + 1).collect();
            let engine = SymmetricSpmvEngine::new(partitions, row_starts, nr_rows, affinity)?;
            return Ok(Self { engine: Engine::Symmetric(engine), nr_rows, nr_cols });
        }

        let build_cfg = BuildConfig { nr_threads, encode: encode_cfg, mode };
        let result = build(&csr, &build_cfg)?;
        let engine = SpmvEngine::new(result, nr_rows, nr_cols, affinity)?;
        Ok(Self { engine: Engine::General(engine), nr_rows, nr_cols })
    }

    pub fn nr_rows(&self) -> usize {
        self.nr_rows
    }

    pub fn nr_cols(&self) -> usize {
        self.nr_cols
    }

    pub fn multiply(&self, x: &Vector, y: &mut Vector) -> Result<(), Error> {
        match &self.engine {
            Engine::General(e) => e.multiply(x, y),
            Engine::Symmetric(e) => e.multiply(x, y),
        }
    }

    /// Persists the built representation for reuse, so a pattern-discovery
    /// pass doesn't have to be repeated for the same matrix next time.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        match &self.engine {
            Engine::General(e) => archive::save(e.build(), self.nr_rows, self.nr_cols, e.affinity(), path),
            Engine::Symmetric(e) => {
                archive::save_symmetric(e.partitions(), e.row_starts(), e.n(), e.affinity(), path)
            }
        }
    }

    pub fn load(path: &Path, config: &Config) -> Result<Self, Error> {
        match archive::load(path)? {
            archive::Loaded::General(result, nr_rows, nr_cols) => {
                let nr_threads = result.partitions.len();
                let affinity = resolve_affinity(config, nr_threads)?;
                let engine = SpmvEngine::new(result, nr_rows, nr_cols, affinity)?;
                Ok(Self { engine: Engine::General(engine), nr_rows, nr_cols })
            }
            archive::Loaded::Symmetric(partitions, row_starts, n) => {
                let nr_threads = partitions.len();
                let affinity = resolve_affinity(config, nr_threads)?;
                let engine = SymmetricSpmvEngine::new(partitions, row_starts, n, affinity)?;
                Ok(Self { engine: Engine::Symmetric(engine), nr_rows: n, nr_cols: n })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionValue;

    fn small_csr() -> CsrMatrix {
        CsrMatrix::from_triples(3, 3, vec![(1, 1, 2.0), (2, 2, 3.0), (3, 1, 1.0), (3, 3, 4.0)]).unwrap()
    }

    #[test]
    fn general_matrix_matches_reference() {
        let csr = small_csr();
        let reference = csr.spmv_reference(&[1.0, 2.0, 3.0]);
        let mut config = Config::default();
        config.set("runtime.nr_threads", OptionValue::Int(2));
        let matrix = Matrix::from_csr(csr, &config).unwrap();
        let x = Vector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut y = Vector::zeros(3);
        matrix.multiply(&x, &mut y).unwrap();
        assert_eq!(y.as_slice(), reference.as_slice());
    }

    #[test]
    fn symmetric_matrix_reflects_lower_triangle() {
        let csr = CsrMatrix::from_triples(2, 2, vec![(1, 1, 2.0), (2, 1, 1.0), (1, 2, 1.0), (2, 2, 3.0)]).unwrap();
        let mut config = Config::default();
        config.set("matrix.symmetric", OptionValue::Bool(true));
        config.set("runtime.nr_threads", OptionValue::Int(1));
        let matrix = Matrix::from_csr(csr, &config).unwrap();
        let x = Vector::from_vec(vec![1.0, 1.0]);
        let mut y = Vector::zeros(2);
        matrix.multiply(&x, &mut y).unwrap();
        assert_eq!(y.as_slice(), &[3.0, 4.0]);
    }
}
