//! Encoding manager: pattern discovery and selection.
//!
//! Owns a partition by mutable borrow and a [`Stats`] snapshot; never owns
//! the partition outright (the builder consumes it once encoding is
//! done).

use rand::Rng;

use crate::element::{Element, Encoding, EncodingSeq};
use crate::error::Error;
use crate::partition::SparsePartition;
use crate::stats::{Manipulator, Stats, StatsData};

/// Tunable knobs for the encoding manager, mirroring the `matrix.*`
/// option-registry keys.
#[derive(Debug, Clone, Copy)]
pub struct EncodeConfig {
    pub min_unit_size: usize,
    pub max_unit_size: usize,
    pub min_coverage: f64,
    pub split_blocks: bool,
    pub sampling: Sampling,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            min_unit_size: 4,
            max_unit_size: 255,
            min_coverage: 0.1,
            split_blocks: false,
            sampling: Sampling::None,
        }
    }
}

/// `preproc.sampling`: statistics are collected from a sample of
/// row-windows rather than the whole partition. Never mutates the
/// partition; only the collected counts are scaled.
#[derive(Debug, Clone, Copy)]
pub enum Sampling {
    None,
    Window { nr_samples: usize, window_size: usize },
    Portion { nr_samples: usize, portion: f64 },
}

/// One maximal run of constant column-stride, non-pattern elements within
/// a single transformed row.
struct Run {
    start: usize,
    len: usize,
    delta: u64,
}

fn scan_row_runs(
    elements: &[Element],
    s: usize,
    e: usize,
    min_unit: usize,
    filter: Option<&[u64]>,
    enc: Encoding,
) -> Vec<Run> {
    let min_len = min_unit.max(2);
    let mut runs = Vec::new();
    let mut i = s;
    while i < e {
        if elements[i].is_pattern() {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        let mut len = 1usize;
        let mut delta = 0u64;
        while j < e && !elements[j].is_pattern() {
            let d = (elements[j].col - elements[j - 1].col) as u64;
            if len == 1 {
                delta = d;
            } else if d != delta {
                break;
            }
            // Block patterns can only be serialized/decoded at unit stride;
            // a non-1 stride under a block encoding must not extend past
            // its first element.
            if enc.is_block() && delta != 1 {
                break;
            }
            len += 1;
            j += 1;
        }
        if len >= min_len && filter.is_none_or(|ds| ds.contains(&delta)) {
            runs.push(Run { start: i, len, delta });
            i = j;
        } else {
            i += 1;
        }
    }
    runs
}

/// Borrows a partition mutably and drives pattern discovery/selection
/// over it.
pub struct EncodingManager<'a> {
    partition: &'a mut SparsePartition,
    config: EncodeConfig,
}

impl<'a> EncodingManager<'a> {
    pub fn new(partition: &'a mut SparsePartition, config: EncodeConfig) -> Self {
        Self { partition, config }
    }

    /// Explicit-sequence mode: transforms through each item of `seq` in
    /// order, encoding maximal runs as it goes, then transforms back to
    /// Horizontal for emission.
    pub fn encode_explicit(&mut self, seq: &EncodingSeq) -> Result<(), Error> {
        for item in &seq.items {
            for (enc, deltas) in item.expand() {
                self.partition.transform(enc)?;
                let filter = if deltas.is_empty() { None } else { Some(deltas.as_slice()) };
                self.encode_pass(enc, filter);
            }
        }
        self.partition.transform(Encoding::Horiz)?;
        Ok(())
    }

    /// Automatic search mode: repeats the scan/select/encode cycle over
    /// `candidates` until no candidate improves coverage by at least
    /// `min_coverage`.
    pub fn encode_auto(&mut self, candidates: &[Encoding]) -> Result<(), Error> {
        loop {
            let nnz = self.partition.nnz() as u64;
            if nnz == 0 {
                break;
            }
            let round_stats = self.collect_stats(candidates)?;
            let round_stats = self.post_process(round_stats, nnz);

            let mut best: Option<(Encoding, u64, StatsData)> = None;
            for (enc, delta, data) in round_stats.iter() {
                best = Some(match best {
                    None => (enc, delta, data),
                    Some(cur) => {
                        if is_better(data, enc, delta, cur.2, cur.0, cur.1) {
                            (enc, delta, data)
                        } else {
                            cur
                        }
                    }
                });
            }

            let Some((enc, delta, data)) = best else { break };
            let coverage = data.nr_encoded_nonzeros as f64 / nnz as f64;
            if coverage < self.config.min_coverage {
                break;
            }

            self.partition.transform(enc)?;
            self.encode_pass(enc, Some(std::slice::from_ref(&delta)));
        }
        self.partition.transform(Encoding::Horiz)?;
        Ok(())
    }

    fn collect_stats(&mut self, candidates: &[Encoding]) -> Result<Stats, Error> {
        match self.config.sampling {
            Sampling::None => {
                let mut stats = Stats::new();
                for &enc in candidates {
                    self.partition.transform(enc)?;
                    self.stats_pass(enc, &mut stats, 0, self.partition.row_count());
                }
                Ok(stats)
            }
            Sampling::Window { nr_samples, window_size } => {
                let mut stats = Stats::new();
                let mut rng = rand::thread_rng();
                for &enc in candidates {
                    self.partition.transform(enc)?;
                    let nrows = self.partition.row_count();
                    if nrows == 0 {
                        continue;
                    }
                    let window_size = window_size.min(nrows).max(1);
                    let mut sampled = Stats::new();
                    let mut sampled_rows = 0usize;
                    for _ in 0..nr_samples {
                        let start = rng.gen_range(0..=(nrows - window_size));
                        self.stats_pass(enc, &mut sampled, start, start + window_size);
                        sampled_rows += window_size;
                    }
                    let factor = if sampled_rows > 0 { nrows as f64 / sampled_rows as f64 } else { 1.0 };
                    sampled.manipulate(Manipulator::Scaler { factor });
                    for (e, d, data) in sampled.iter() {
                        stats.append(e, d, data);
                    }
                }
                Ok(stats)
            }
            Sampling::Portion { nr_samples, portion } => {
                let mut stats = Stats::new();
                let mut rng = rand::thread_rng();
                for &enc in candidates {
                    self.partition.transform(enc)?;
                    let nrows = self.partition.row_count();
                    if nrows == 0 {
                        continue;
                    }
                    let total_window_rows = ((nrows as f64 * portion).round() as usize).max(1);
                    let window_size = (total_window_rows / nr_samples.max(1)).max(1);
                    let mut sampled = Stats::new();
                    let mut sampled_rows = 0usize;
                    for _ in 0..nr_samples {
                        let w = window_size.min(nrows);
                        let start = rng.gen_range(0..=(nrows - w));
                        self.stats_pass(enc, &mut sampled, start, start + w);
                        sampled_rows += w;
                    }
                    let fraction = (sampled_rows as f64 / nrows as f64).max(1e-9);
                    sampled.manipulate(Manipulator::Scaler { factor: 1.0 / fraction });
                    for (e, d, data) in sampled.iter() {
                        stats.append(e, d, data);
                    }
                }
                Ok(stats)
            }
        }
    }

    fn post_process(&self, mut stats: Stats, nnz: u64) -> Stats {
        if self.config.split_blocks {
            stats.manipulate(Manipulator::BlockSplitter {
                max_unit: self.config.max_unit_size as u64,
                nnz,
                min_coverage: self.config.min_coverage,
            });
        }
        stats.manipulate(Manipulator::CoverageFilter { nnz, min_coverage: self.config.min_coverage });
        stats
    }

    /// Read-only statistics scan over local rows `[row_lo, row_hi)` of the
    /// already-transformed partition, under the assumption the partition
    /// is currently in `enc` order.
    fn stats_pass(&self, enc: Encoding, stats: &mut Stats, row_lo: usize, row_hi: usize) {
        let elements = self.partition.elements();
        let rowptr = self.partition.rowptr();
        for row in row_lo..row_hi {
            let s = rowptr[row];
            let e = rowptr[row + 1];
            for run in scan_row_runs(elements, s, e, self.config.min_unit_size, None, enc) {
                stats.append(
                    enc,
                    run.delta,
                    StatsData { nr_encoded_nonzeros: run.len as u64, nr_patterns: 1, nr_deltas: 1 },
                );
            }
        }
    }

    /// Rewrites maximal matching runs of the already-transformed
    /// partition (assumed in `enc` order) into pattern elements.
    fn encode_pass(&mut self, enc: Encoding, filter: Option<&[u64]>) {
        let min_unit = self.config.min_unit_size;
        let rowptr = self.partition.rowptr().to_vec();
        let mut new_elements: Vec<Element> = Vec::with_capacity(self.partition.elements().len());
        for row in 0..rowptr.len() - 1 {
            let s = rowptr[row];
            let e = rowptr[row + 1];
            let elements = self.partition.elements();
            let runs = scan_row_runs(elements, s, e, min_unit, filter, enc);
            let mut idx = s;
            let mut run_iter = runs.into_iter().peekable();
            while idx < e {
                if let Some(run) = run_iter.peek() {
                    if run.start == idx {
                        let run = run_iter.next().unwrap();
                        let slice = &self.partition.elements()[run.start..run.start + run.len];
                        let row0 = slice[0].row;
                        let col0 = slice[0].col;
                        let values: Vec<_> = slice.iter().flat_map(|e| e.values().to_vec()).collect();
                        new_elements.push(Element::new_pattern(row0, col0, values, enc, run.delta));
                        idx = run.start + run.len;
                        continue;
                    }
                }
                new_elements.push(self.partition.elements()[idx].clone());
                idx += 1;
            }
        }
        self.partition.replace_elements(new_elements);
    }
}

#[allow(clippy::too_many_arguments)]
fn is_better(
    cand_data: StatsData,
    cand_enc: Encoding,
    cand_delta: u64,
    cur_data: StatsData,
    cur_enc: Encoding,
    cur_delta: u64,
) -> bool {
    if cand_data.nr_encoded_nonzeros != cur_data.nr_encoded_nonzeros {
        return cand_data.nr_encoded_nonzeros > cur_data.nr_encoded_nonzeros;
    }
    if cand_enc != cur_enc {
        return cand_enc < cur_enc;
    }
    cand_delta < cur_delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_row_with_run() -> SparsePartition {
        let mut p = SparsePartition::new(1, 10, 1);
        let triples = vec![(1, 1, 1.0), (1, 2, 1.0), (1, 3, 1.0), (1, 4, 1.0), (1, 8, 5.0)];
        let mut it = triples.into_iter();
        p.set_elements(&mut it, usize::MAX).unwrap();
        p
    }

    #[test]
    fn encode_explicit_replaces_run_with_pattern() {
        let mut p = build_row_with_run();
        let mut mgr = EncodingManager::new(&mut p, EncodeConfig { min_unit_size: 4, ..Default::default() });
        let seq = EncodingSeq::parse("h").unwrap();
        mgr.encode_explicit(&seq).unwrap();
        let patterns: Vec<_> = p.elements().iter().filter(|e| e.is_pattern()).collect();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].size(), 4);
        assert_eq!(patterns[0].encoding(), Encoding::Horiz);
        let singles = p.elements().iter().filter(|e| !e.is_pattern()).count();
        assert_eq!(singles, 1);
    }

    #[test]
    fn encode_auto_finds_horizontal_run() {
        let mut p = build_row_with_run();
        let mut mgr = EncodingManager::new(
            &mut p,
            EncodeConfig { min_unit_size: 4, min_coverage: 0.1, ..Default::default() },
        );
        mgr.encode_auto(&[Encoding::Horiz, Encoding::Vert]).unwrap();
        assert!(p.elements().iter().any(|e| e.is_pattern() && e.encoding() == Encoding::Horiz));
    }
}
