//! Save/restore: a deterministic little-endian binary archive for a built
//! matrix (general or symmetric), so a pattern-discovery pass doesn't have
//! to be repeated for the same matrix on the next run.
//!
//! Hand-rolled with [`byteorder`] rather than a generic `serde` derive:
//! the format needs an exact, documented byte layout (a 16-byte
//! magic+version prefix, fixed-width fields) independent of whatever a
//! derive macro would happen to emit, so the archive stays readable by a
//! future version of this crate even if its in-memory types change shape.
//!
//! Layout, after the magic+version prefix:
//!
//! ```text
//! nr_rows: u64, nr_cols: u64
//! symmetric: u8, reordered: u8
//! permutation_len: u64, permutation[permutation_len]: u64   -- empty unless reordered
//! row_starts_len: u64, row_starts[row_starts_len]: u64
//! nr_partitions: u64
//! per partition:
//!   cpu: i64, id: u64, node: i64   -- worker descriptor; -1 where unknown
//!   nr_rows: u64, nr_cols: u64
//!   ctl_len: u64, ctl[ctl_len]: u8
//!   values_len: u64, values[values_len]: Value
//!   row_ctl_offsets_len: u64, row_ctl_offsets[...]: u64
//!   row_value_offsets_len: u64, row_value_offsets[...]: u64
//!   if symmetric: diag_len: u64, diag[diag_len]: Value
//! reduction_map_len: u64, reduction_map[...]: u64   -- always empty
//! ```

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::build::BuildResult;
use crate::csx::{Csx, CsxSym};
use crate::error::Error;
use crate::runtime::CorePlan;
use crate::Value;

const MAGIC: &[u8; 12] = b"CSXARCHIVE\0\0";
const VERSION: u32 = 1;

#[cfg(not(feature = "f64"))]
fn write_value<W: Write>(w: &mut W, v: Value) -> std::io::Result<()> {
    w.write_f32::<LittleEndian>(v)
}
#[cfg(feature = "f64")]
fn write_value<W: Write>(w: &mut W, v: Value) -> std::io::Result<()> {
    w.write_f64::<LittleEndian>(v)
}

#[cfg(not(feature = "f64"))]
fn read_value<R: Read>(r: &mut R) -> std::io::Result<Value> {
    r.read_f32::<LittleEndian>()
}
#[cfg(feature = "f64")]
fn read_value<R: Read>(r: &mut R) -> std::io::Result<Value> {
    r.read_f64::<LittleEndian>()
}

fn io_err(path: &str, e: std::io::Error, writing: bool) -> Error {
    if writing {
        Error::FileWrite { path: path.to_string(), source: e }
    } else {
        Error::FileRead { path: path.to_string(), source: e }
    }
}

/// The in-memory shape this module serializes/deserializes, common to the
/// general and symmetric engines.
struct Archive {
    nr_rows: usize,
    nr_cols: usize,
    symmetric: bool,
    row_starts: Vec<usize>,
    partitions: Vec<Csx>,
    /// `diag[i]` is partition `i`'s diagonal; empty unless `symmetric`.
    diag: Vec<Vec<Value>>,
    worker_cpu: Vec<i64>,
    worker_node: Vec<i64>,
}

fn worker_descriptors(nr_workers: usize, affinity: Option<&CorePlan>) -> (Vec<i64>, Vec<i64>) {
    let cpu = (0..nr_workers)
        .map(|w| affinity.and_then(|a| a.core_id(w)).map(|id| id as i64).unwrap_or(-1))
        .collect();
    // NUMA node placement is only tracked for `Vector` allocations in this
    // crate, never for CSX byte-stream placement, so this is always
    // unknown.
    let node = vec![-1i64; nr_workers];
    (cpu, node)
}

pub fn save(build: &BuildResult, nr_rows: usize, nr_cols: usize, affinity: Option<&CorePlan>, path: &std::path::Path) -> Result<(), Error> {
    let (worker_cpu, worker_node) = worker_descriptors(build.partitions.len(), affinity);
    let archive = Archive {
        nr_rows,
        nr_cols,
        symmetric: false,
        row_starts: build.row_starts.clone(),
        partitions: build.partitions.clone(),
        diag: Vec::new(),
        worker_cpu,
        worker_node,
    };
    write_to_path(&archive, path)
}

pub fn save_symmetric(
    partitions: &[CsxSym],
    row_starts: &[usize],
    n: usize,
    affinity: Option<&CorePlan>,
    path: &std::path::Path,
) -> Result<(), Error> {
    let (worker_cpu, worker_node) = worker_descriptors(partitions.len(), affinity);
    let archive = Archive {
        nr_rows: n,
        nr_cols: n,
        symmetric: true,
        row_starts: row_starts.to_vec(),
        partitions: partitions.iter().map(|p| p.lower.clone()).collect(),
        diag: partitions.iter().map(|p| p.diag.clone()).collect(),
        worker_cpu,
        worker_node,
    };
    write_to_path(&archive, path)
}

fn write_to_path(archive: &Archive, path: &std::path::Path) -> Result<(), Error> {
    let path_str = path.display().to_string();
    let mut file = std::fs::File::create(path).map_err(|e| Error::FileOpen { path: path_str.clone(), source: e })?;
    write_archive(&mut file, archive).map_err(|e| io_err(&path_str, e, true))
}

fn write_archive<W: Write>(w: &mut W, archive: &Archive) -> std::io::Result<()> {
    w.write_all(MAGIC)?;
    w.write_u32::<LittleEndian>(VERSION)?;
    w.write_u64::<LittleEndian>(archive.nr_rows as u64)?;
    w.write_u64::<LittleEndian>(archive.nr_cols as u64)?;
    w.write_u8(archive.symmetric as u8)?;
    // Reordering isn't implemented by this crate's build path, so the
    // permutation is always empty and this flag always false.
    w.write_u8(0)?;
    w.write_u64::<LittleEndian>(0)?;

    w.write_u64::<LittleEndian>(archive.row_starts.len() as u64)?;
    for &rs in &archive.row_starts {
        w.write_u64::<LittleEndian>(rs as u64)?;
    }

    w.write_u64::<LittleEndian>(archive.partitions.len() as u64)?;
    for (i, csx) in archive.partitions.iter().enumerate() {
        w.write_i64::<LittleEndian>(archive.worker_cpu[i])?;
        w.write_u64::<LittleEndian>(i as u64)?;
        w.write_i64::<LittleEndian>(archive.worker_node[i])?;

        w.write_u64::<LittleEndian>(csx.nr_rows as u64)?;
        w.write_u64::<LittleEndian>(csx.nr_cols as u64)?;
        w.write_u64::<LittleEndian>(csx.ctl.len() as u64)?;
        w.write_all(&csx.ctl)?;
        w.write_u64::<LittleEndian>(csx.values.len() as u64)?;
        for &v in &csx.values {
            write_value(w, v)?;
        }
        w.write_u64::<LittleEndian>(csx.row_ctl_offsets.len() as u64)?;
        for &off in &csx.row_ctl_offsets {
            w.write_u64::<LittleEndian>(off as u64)?;
        }
        w.write_u64::<LittleEndian>(csx.row_value_offsets.len() as u64)?;
        for &off in &csx.row_value_offsets {
            w.write_u64::<LittleEndian>(off as u64)?;
        }

        if archive.symmetric {
            let diag = &archive.diag[i];
            w.write_u64::<LittleEndian>(diag.len() as u64)?;
            for &d in diag {
                write_value(w, d)?;
            }
        }
    }

    // No partition-local accumulator needs a cross-worker reduction map:
    // the symmetric kernel reduces full-length local buffers sequentially
    // instead.
    w.write_u64::<LittleEndian>(0)?;
    Ok(())
}

pub enum Loaded {
    General(BuildResult, usize, usize),
    Symmetric(Vec<CsxSym>, Vec<usize>, usize),
}

pub fn load(path: &std::path::Path) -> Result<Loaded, Error> {
    let path_str = path.display().to_string();
    let mut file = std::fs::File::open(path).map_err(|e| Error::FileOpen { path: path_str.clone(), source: e })?;
    let archive = read_archive(&mut file).map_err(|e| io_err(&path_str, e, false))?;
    if archive.symmetric {
        let partitions = archive
            .partitions
            .into_iter()
            .zip(archive.diag)
            .map(|(lower, diag)| CsxSym { lower, diag })
            .collect();
        Ok(Loaded::Symmetric(partitions, archive.row_starts, archive.nr_rows))
    } else {
        let result = BuildResult { partitions: archive.partitions, row_starts: archive.row_starts };
        Ok(Loaded::General(result, archive.nr_rows, archive.nr_cols))
    }
}

fn read_archive<R: Read>(r: &mut R) -> std::io::Result<Archive> {
    let mut magic = [0u8; 12];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad archive magic"));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported archive version {version}"),
        ));
    }
    let nr_rows = r.read_u64::<LittleEndian>()? as usize;
    let nr_cols = r.read_u64::<LittleEndian>()? as usize;
    let symmetric = r.read_u8()? != 0;
    let _reordered = r.read_u8()? != 0;
    let permutation_len = r.read_u64::<LittleEndian>()? as usize;
    for _ in 0..permutation_len {
        let _ = r.read_u64::<LittleEndian>()?;
    }

    let nr_row_starts = r.read_u64::<LittleEndian>()? as usize;
    let mut row_starts = Vec::with_capacity(nr_row_starts);
    for _ in 0..nr_row_starts {
        row_starts.push(r.read_u64::<LittleEndian>()? as usize);
    }

    let nr_partitions = r.read_u64::<LittleEndian>()? as usize;
    let mut partitions = Vec::with_capacity(nr_partitions);
    let mut worker_cpu = Vec::with_capacity(nr_partitions);
    let mut worker_node = Vec::with_capacity(nr_partitions);
    let mut diag = Vec::with_capacity(nr_partitions);
    for _ in 0..nr_partitions {
        let cpu = r.read_i64::<LittleEndian>()?;
        let _id = r.read_u64::<LittleEndian>()?;
        let node = r.read_i64::<LittleEndian>()?;
        worker_cpu.push(cpu);
        worker_node.push(node);

        let part_nr_rows = r.read_u64::<LittleEndian>()? as usize;
        let part_nr_cols = r.read_u64::<LittleEndian>()? as usize;
        let ctl_len = r.read_u64::<LittleEndian>()? as usize;
        let mut ctl = vec![0u8; ctl_len];
        r.read_exact(&mut ctl)?;
        let values_len = r.read_u64::<LittleEndian>()? as usize;
        let mut values = Vec::with_capacity(values_len);
        for _ in 0..values_len {
            values.push(read_value(r)?);
        }
        let offsets_len = r.read_u64::<LittleEndian>()? as usize;
        let mut row_ctl_offsets = Vec::with_capacity(offsets_len);
        for _ in 0..offsets_len {
            row_ctl_offsets.push(r.read_u64::<LittleEndian>()? as usize);
        }
        let value_offsets_len = r.read_u64::<LittleEndian>()? as usize;
        let mut row_value_offsets = Vec::with_capacity(value_offsets_len);
        for _ in 0..value_offsets_len {
            row_value_offsets.push(r.read_u64::<LittleEndian>()? as usize);
        }

        if symmetric {
            let diag_len = r.read_u64::<LittleEndian>()? as usize;
            let mut d = Vec::with_capacity(diag_len);
            for _ in 0..diag_len {
                d.push(read_value(r)?);
            }
            diag.push(d);
        }

        partitions.push(Csx {
            nr_rows: part_nr_rows,
            nr_cols: part_nr_cols,
            ctl,
            values,
            row_ctl_offsets,
            row_value_offsets,
        });
    }

    let reduction_map_len = r.read_u64::<LittleEndian>()? as usize;
    for _ in 0..reduction_map_len {
        let _ = r.read_u64::<LittleEndian>()?;
    }

    Ok(Archive { nr_rows, nr_cols, symmetric, row_starts, partitions, diag, worker_cpu, worker_node })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{build, BuildConfig};
    use crate::csr::CsrMatrix;

    #[test]
    fn round_trips_through_bytes() {
        let csr = CsrMatrix::from_triples(3, 3, vec![(1, 1, 1.0), (2, 2, 2.0), (3, 3, 3.0)]).unwrap();
        let config = BuildConfig { nr_threads: 1, ..Default::default() };
        let built = build(&csr, &config).unwrap();
        let (worker_cpu, worker_node) = worker_descriptors(built.partitions.len(), None);
        let archive = Archive {
            nr_rows: 3,
            nr_cols: 3,
            symmetric: false,
            row_starts: built.row_starts.clone(),
            partitions: built.partitions.clone(),
            diag: Vec::new(),
            worker_cpu,
            worker_node,
        };

        let mut bytes = Vec::new();
        write_archive(&mut bytes, &archive).unwrap();
        let restored = read_archive(&mut std::io::Cursor::new(bytes)).unwrap();

        assert_eq!(restored.nr_rows, 3);
        assert_eq!(restored.nr_cols, 3);
        assert!(!restored.symmetric);
        assert_eq!(restored.row_starts, built.row_starts);
        assert_eq!(restored.partitions.len(), built.partitions.len());
        assert_eq!(restored.partitions[0].values, built.partitions[0].values);
        assert_eq!(restored.partitions[0].ctl, built.partitions[0].ctl);
        assert_eq!(restored.partitions[0].row_value_offsets, built.partitions[0].row_value_offsets);
    }

    #[test]
    fn round_trips_symmetric() {
        let csr = CsrMatrix::from_triples(3, 3, vec![(1, 1, 1.0), (2, 1, 2.0), (1, 2, 2.0), (3, 3, 3.0)]).unwrap();
        let mut partition = crate::partition::SparsePartition::new(3, 3, 1);
        let triples = csr.triples_in_range(0, 3);
        let mut iter = triples.into_iter();
        partition.set_elements(&mut iter, usize::MAX).unwrap();
        let sym = CsxSym::build(
            &partition,
            &crate::build::EncodeMode::Auto(vec![crate::element::Encoding::Horiz]),
            crate::encode::EncodeConfig::default(),
        )
        .unwrap();

        let dir = std::env::temp_dir();
        let path = dir.join(format!("csx-archive-test-{}.bin", std::process::id()));
        save_symmetric(std::slice::from_ref(&sym), &[1, 4], 3, None, &path).unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        match loaded {
            Loaded::Symmetric(partitions, row_starts, n) => {
                assert_eq!(n, 3);
                assert_eq!(row_starts, vec![1, 4]);
                assert_eq!(partitions.len(), 1);
                assert_eq!(partitions[0].diag, sym.diag);
                assert_eq!(partitions[0].lower.values, sym.lower.values);
            }
            Loaded::General(..) => panic!("expected a symmetric archive"),
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 32];
        assert!(read_archive(&mut std::io::Cursor::new(bytes)).is_err());
    }
}
