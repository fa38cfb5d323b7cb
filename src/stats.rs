//! Statistics collection: histograms of candidate patterns, used by the
//! encoding manager to score and select encodings.

use std::collections::BTreeMap;

use crate::element::Encoding;

/// Counts for one `(encoding, delta)` bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsData {
    pub nr_encoded_nonzeros: u64,
    pub nr_patterns: u64,
    pub nr_deltas: u64,
}

impl StatsData {
    pub fn merge(&mut self, other: StatsData) {
        self.nr_encoded_nonzeros += other.nr_encoded_nonzeros;
        self.nr_patterns += other.nr_patterns;
        self.nr_deltas += other.nr_deltas;
    }

    pub fn scale(&mut self, factor: f64) {
        self.nr_encoded_nonzeros = (self.nr_encoded_nonzeros as f64 * factor).round() as u64;
        self.nr_patterns = (self.nr_patterns as f64 * factor).round() as u64;
        self.nr_deltas = (self.nr_deltas as f64 * factor).round() as u64;
    }
}

/// Two-level map `encoding -> delta -> StatsData`.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    table: BTreeMap<Encoding, BTreeMap<u64, StatsData>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, enc: Encoding, delta: u64, data: StatsData) {
        self.table.entry(enc).or_default().entry(delta).or_default().merge(data);
    }

    pub fn instance(&self, enc: Encoding, delta: u64) -> StatsData {
        self.table.get(&enc).and_then(|m| m.get(&delta)).copied().unwrap_or_default()
    }

    pub fn type_total(&self, enc: Encoding) -> StatsData {
        let mut total = StatsData::default();
        if let Some(m) = self.table.get(&enc) {
            for d in m.values() {
                total.merge(*d);
            }
        }
        total
    }

    pub fn global_total(&self) -> StatsData {
        let mut total = StatsData::default();
        for m in self.table.values() {
            for d in m.values() {
                total.merge(*d);
            }
        }
        total
    }

    /// Iterates every `(encoding, delta, data)` triple, for the selection
    /// loop in C5.
    pub fn iter(&self) -> impl Iterator<Item = (Encoding, u64, StatsData)> + '_ {
        self.table
            .iter()
            .flat_map(|(&enc, m)| m.iter().map(move |(&delta, &data)| (enc, delta, data)))
    }

    pub fn manipulate(&mut self, m: Manipulator) {
        match m {
            Manipulator::CoverageFilter { nnz, min_coverage } => self.coverage_filter(nnz, min_coverage),
            Manipulator::BlockSplitter { max_unit, nnz, min_coverage } => {
                self.block_splitter(max_unit, nnz, min_coverage)
            }
            Manipulator::Scaler { factor } => self.scaler(factor),
        }
    }

    fn coverage_filter(&mut self, nnz: u64, min_coverage: f64) {
        if nnz == 0 {
            return;
        }
        for m in self.table.values_mut() {
            m.retain(|_, data| (data.nr_encoded_nonzeros as f64 / nnz as f64) >= min_coverage);
        }
        self.table.retain(|_, m| !m.is_empty());
    }

    /// For block encodings whose variable dimension `d` exceeds
    /// `max_unit / align`, replaces their single bucket with
    /// `floor(d / max)` max-sized sub-blocks plus a remainder `>= 2`,
    /// then merges any resulting sub-block bucket below `min_coverage`
    /// upward into the next surviving (larger) bucket.
    fn block_splitter(&mut self, max_unit: u64, nnz: u64, min_coverage: f64) {
        let block_keys: Vec<Encoding> = self
            .table
            .keys()
            .copied()
            .filter(|e| e.is_block())
            .collect();
        for enc in block_keys {
            let align = match enc {
                Encoding::BlockRow(k) | Encoding::BlockCol(k) => k as u64,
                _ => 1,
            };
            let max = (max_unit / align.max(1)).max(1);
            let Some(buckets) = self.table.get_mut(&enc) else { continue };
            let mut replacement: BTreeMap<u64, StatsData> = BTreeMap::new();
            for (&d, &data) in buckets.iter() {
                if d <= max {
                    replacement.entry(d).or_default().merge(data);
                    continue;
                }
                let full = d / max;
                let rem = d % max;
                if full > 0 {
                    let frac = full as f64 / (full + if rem > 0 { 1 } else { 0 }).max(1) as f64;
                    let mut sub = data;
                    sub.scale(frac);
                    replacement.entry(max).or_default().merge(sub);
                }
                if rem >= 2 {
                    let frac = 1.0 - full as f64 / (full + 1) as f64;
                    let mut sub = data;
                    sub.scale(frac);
                    replacement.entry(rem).or_default().merge(sub);
                }
            }
            // Merge low-coverage sub-blocks upward into the next larger
            // surviving dimension.
            let dims: Vec<u64> = replacement.keys().copied().collect();
            let mut merged: BTreeMap<u64, StatsData> = BTreeMap::new();
            let mut carry: Option<StatsData> = None;
            for d in dims {
                let mut data = replacement[&d];
                if let Some(c) = carry.take() {
                    data.merge(c);
                }
                let coverage = if nnz > 0 { data.nr_encoded_nonzeros as f64 / nnz as f64 } else { 0.0 };
                if coverage < min_coverage {
                    carry = Some(data);
                } else {
                    merged.insert(d, data);
                }
            }
            *buckets = merged;
        }
        self.table.retain(|_, m| !m.is_empty());
    }

    fn scaler(&mut self, factor: f64) {
        for m in self.table.values_mut() {
            for d in m.values_mut() {
                d.scale(factor);
            }
        }
    }
}

/// Operations that rewrite a [`Stats`] table in place.
pub enum Manipulator {
    CoverageFilter { nnz: u64, min_coverage: f64 },
    BlockSplitter { max_unit: u64, nnz: u64, min_coverage: f64 },
    Scaler { factor: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_merges_into_same_bucket() {
        let mut s = Stats::new();
        s.append(Encoding::Horiz, 1, StatsData { nr_encoded_nonzeros: 10, nr_patterns: 2, nr_deltas: 1 });
        s.append(Encoding::Horiz, 1, StatsData { nr_encoded_nonzeros: 5, nr_patterns: 1, nr_deltas: 0 });
        let got = s.instance(Encoding::Horiz, 1);
        assert_eq!(got.nr_encoded_nonzeros, 15);
        assert_eq!(got.nr_patterns, 3);
    }

    #[test]
    fn coverage_filter_drops_low_coverage_buckets() {
        let mut s = Stats::new();
        s.append(Encoding::Horiz, 1, StatsData { nr_encoded_nonzeros: 1, nr_patterns: 1, nr_deltas: 0 });
        s.append(Encoding::Vert, 1, StatsData { nr_encoded_nonzeros: 90, nr_patterns: 9, nr_deltas: 0 });
        s.manipulate(Manipulator::CoverageFilter { nnz: 100, min_coverage: 0.1 });
        assert_eq!(s.instance(Encoding::Horiz, 1), StatsData::default());
        assert_eq!(s.instance(Encoding::Vert, 1).nr_encoded_nonzeros, 90);
    }

    #[test]
    fn scaler_multiplies_counts() {
        let mut s = Stats::new();
        s.append(Encoding::Horiz, 1, StatsData { nr_encoded_nonzeros: 10, nr_patterns: 2, nr_deltas: 1 });
        s.manipulate(Manipulator::Scaler { factor: 2.0 });
        assert_eq!(s.instance(Encoding::Horiz, 1).nr_encoded_nonzeros, 20);
    }
}
