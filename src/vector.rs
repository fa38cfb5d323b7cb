//! Vector abstraction: the `x`/`y` operands of SpMV, with pluggable
//! backing allocation and ownership.

use std::sync::Arc;

use rand::Rng;

use crate::error::Error;
use crate::runtime::numa::{self, NumaBuffer};
use crate::Value;

/// How a [`Vector`]'s storage was allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    /// Plain heap allocation, no NUMA placement.
    Std,
    /// Allocated on a single NUMA node.
    NumaLocal { node: i32 },
    /// Pages round-robin across all nodes the runtime detected.
    Interleaved,
    /// Storage the caller owns; this crate never frees it.
    UserBuffer,
}

/// Whether a [`Vector`] owns its storage or shares a caller-supplied
/// buffer.
enum Storage {
    Owned(Vec<Value>),
    Numa(NumaBuffer),
    Shared(Arc<[Value]>),
    External { ptr: *mut Value, len: usize },
}

/// Dense vector, the `x`/`y` operand of SpMV.
pub struct Vector {
    storage: Storage,
    kind: AllocKind,
}

// SAFETY: `External` only wraps a raw pointer the caller promised to keep
// alive and not alias mutably elsewhere for the vector's lifetime (the
// "user buffer" contract of `from_raw_parts`); the other variants are
// plain Rust types that are already `Send`/`Sync` when `Value: Send +
// Sync`, which it is (`f32`/`f64`).
unsafe impl Send for Vector {}
unsafe impl Sync for Vector {}

impl Vector {
    pub fn zeros(len: usize) -> Self {
        Self { storage: Storage::Owned(vec![0.0; len]), kind: AllocKind::Std }
    }

    pub fn from_vec(data: Vec<Value>) -> Self {
        Self { storage: Storage::Owned(data), kind: AllocKind::Std }
    }

    /// Copies `buf` into a freshly owned vector. Unlike [`Vector::from_raw_parts`],
    /// this never aliases the caller's buffer after returning.
    pub fn create_from_buff(buf: &[Value]) -> Self {
        Self::from_vec(buf.to_vec())
    }

    /// Allocates `len` elements on NUMA node `node`, falling back to a
    /// plain allocation with [`AllocKind::Std`] if NUMA placement isn't
    /// available on this platform.
    pub fn numa_local(len: usize, node: i32) -> Result<Self, Error> {
        match numa::alloc_on_node(len, node) {
            Ok(data) => Ok(Self { storage: Storage::Numa(data), kind: AllocKind::NumaLocal { node } }),
            Err(_) => Ok(Self { storage: Storage::Owned(vec![0.0; len]), kind: AllocKind::Std }),
        }
    }

    /// Allocates `len` elements interleaved across every node the runtime
    /// detected, falling back to [`AllocKind::Std`] if unavailable.
    pub fn interleaved(len: usize) -> Result<Self, Error> {
        match numa::alloc_interleaved(len) {
            Ok(data) => Ok(Self { storage: Storage::Numa(data), kind: AllocKind::Interleaved }),
            Err(_) => Ok(Self { storage: Storage::Owned(vec![0.0; len]), kind: AllocKind::Std }),
        }
    }

    /// Allocates `len` elements spread across an explicit interleaving
    /// plan: `parts[i]` elements go on `nodes[i]`, each part rounded up to
    /// a whole NUMA allocation (so `parts.iter().sum() == len` is the
    /// caller's contract, not silently enforced element-by-element).
    pub fn create_interleaved_parts(len: usize, parts: &[usize], nodes: &[i32]) -> Result<Self, Error> {
        if parts.len() != nodes.len() {
            return Err(Error::InvalidArgument("parts and nodes must have the same length".into()));
        }
        if parts.iter().sum::<usize>() != len {
            return Err(Error::InvalidArgument("interleaved parts must sum to the vector length".into()));
        }
        let mut data = Vec::with_capacity(len);
        for (&count, &node) in parts.iter().zip(nodes) {
            match numa::alloc_on_node(count, node) {
                Ok(buf) => data.extend_from_slice(buf.as_slice()),
                Err(_) => data.extend(std::iter::repeat(0.0).take(count)),
            }
        }
        Ok(Self { storage: Storage::Owned(data), kind: AllocKind::Interleaved })
    }

    /// Fills a freshly zeroed vector with uniform random values in
    /// `[0, 1)`, for tuning and benchmark inputs that don't need
    /// reproducibility.
    pub fn create_random(len: usize) -> Self {
        let mut rng = rand::thread_rng();
        let data: Vec<Value> = (0..len).map(|_| rng.gen::<Value>()).collect();
        Self { storage: Storage::Owned(data), kind: AllocKind::Std }
    }

    /// Wraps a caller-owned buffer without copying. `ptr` must remain
    /// valid and exclusively borrowed for the lifetime of the returned
    /// `Vector`.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` consecutive
    /// `Value`s, and the caller must not access the buffer through any
    /// other pointer while this `Vector` is alive.
    pub unsafe fn from_raw_parts(ptr: *mut Value, len: usize) -> Self {
        Self { storage: Storage::External { ptr, len }, kind: AllocKind::UserBuffer }
    }

    /// Wraps an `Arc<[Value]>` for the "Shared" copy mode: multiple
    /// `Vector`s may read the same backing storage, but none may mutate
    /// it through this handle.
    pub fn shared(data: Arc<[Value]>) -> Self {
        Self { storage: Storage::Shared(data), kind: AllocKind::Std }
    }

    pub fn kind(&self) -> AllocKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Owned(v) => v.len(),
            Storage::Numa(v) => v.len(),
            Storage::Shared(v) => v.len(),
            Storage::External { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[Value] {
        match &self.storage {
            Storage::Owned(v) => v,
            Storage::Numa(v) => v.as_slice(),
            Storage::Shared(v) => v,
            // SAFETY: contract of `from_raw_parts`.
            Storage::External { ptr, len } => unsafe { std::slice::from_raw_parts(*ptr, *len) },
        }
    }

    /// Mutable access. Returns [`Error::InvalidArgument`] for [`Storage::Shared`]
    /// storage, which is read-only by construction.
    pub fn as_mut_slice(&mut self) -> Result<&mut [Value], Error> {
        match &mut self.storage {
            Storage::Owned(v) => Ok(v),
            Storage::Numa(v) => Ok(v.as_mut_slice()),
            Storage::Shared(_) => Err(Error::InvalidArgument("shared vector storage is read-only".into())),
            // SAFETY: contract of `from_raw_parts`.
            Storage::External { ptr, len } => Ok(unsafe { std::slice::from_raw_parts_mut(*ptr, *len) }),
        }
    }

    pub fn fill(&mut self, value: Value) -> Result<(), Error> {
        self.as_mut_slice()?.iter_mut().for_each(|x| *x = value);
        Ok(())
    }

    /// Overwrites every element from `v`. `v.len()` must equal `self.len()`.
    pub fn init(&mut self, v: &[Value]) -> Result<(), Error> {
        if v.len() != self.len() {
            return Err(Error::DimensionMismatch { expected: self.len(), got: v.len() });
        }
        self.as_mut_slice()?.copy_from_slice(v);
        Ok(())
    }

    /// Overwrites the half-open range `[start, end)` from `v`, which must
    /// have exactly `end - start` elements.
    pub fn init_part(&mut self, v: &[Value], start: usize, end: usize) -> Result<(), Error> {
        if start > end || end > self.len() {
            return Err(Error::IndexOutOfBounds { index: end, limit: self.len() });
        }
        if v.len() != end - start {
            return Err(Error::DimensionMismatch { expected: end - start, got: v.len() });
        }
        self.as_mut_slice()?[start..end].copy_from_slice(v);
        Ok(())
    }

    /// Scatters `v[i]` to `self[map[i]]` for every `i`. `v` and `map` must
    /// have equal length, and every `map[i]` must be in bounds.
    pub fn init_from_map(&mut self, v: &[Value], map: &[usize]) -> Result<(), Error> {
        if v.len() != map.len() {
            return Err(Error::DimensionMismatch { expected: map.len(), got: v.len() });
        }
        let len = self.len();
        let dst = self.as_mut_slice()?;
        for (&idx, &val) in map.iter().zip(v) {
            if idx >= len {
                return Err(Error::IndexOutOfBounds { index: idx, limit: len });
            }
            dst[idx] = val;
        }
        Ok(())
    }

    /// `self[i] *= alpha` for every `i`.
    pub fn scale(&mut self, alpha: Value) -> Result<(), Error> {
        self.as_mut_slice()?.iter_mut().for_each(|x| *x *= alpha);
        Ok(())
    }

    /// `self[i] += other[i]` for every `i`.
    pub fn add(&mut self, other: &Vector) -> Result<(), Error> {
        if other.len() != self.len() {
            return Err(Error::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        let rhs = other.as_slice();
        self.as_mut_slice()?.iter_mut().zip(rhs).for_each(|(a, &b)| *a += b);
        Ok(())
    }

    /// `self[i] -= other[i]` for every `i`.
    pub fn sub(&mut self, other: &Vector) -> Result<(), Error> {
        if other.len() != self.len() {
            return Err(Error::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        let rhs = other.as_slice();
        self.as_mut_slice()?.iter_mut().zip(rhs).for_each(|(a, &b)| *a -= b);
        Ok(())
    }

    /// `sum(self[i] * other[i])`.
    pub fn dot(&self, other: &Vector) -> Result<Value, Error> {
        if other.len() != self.len() {
            return Err(Error::DimensionMismatch { expected: self.len(), got: other.len() });
        }
        Ok(self.as_slice().iter().zip(other.as_slice()).map(|(&a, &b)| a * b).sum())
    }

    /// `self[i] = alpha * x[i] + self[i]` (axpy), in place.
    pub fn scale_add(&mut self, alpha: Value, x: &Vector) -> Result<(), Error> {
        if x.len() != self.len() {
            return Err(Error::DimensionMismatch { expected: self.len(), got: x.len() });
        }
        let rhs = x.as_slice();
        self.as_mut_slice()?.iter_mut().zip(rhs).for_each(|(y, &xi)| *y += alpha * xi);
        Ok(())
    }

    /// Elementwise comparison within absolute tolerance `eps`. `false` if
    /// lengths differ.
    pub fn compare(&self, other: &Vector, eps: Value) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.as_slice().iter().zip(other.as_slice()).all(|(&a, &b)| (a - b).abs() <= eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_has_requested_length() {
        let v = Vector::zeros(8);
        assert_eq!(v.len(), 8);
        assert!(v.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn shared_storage_rejects_mutation() {
        let data: Arc<[Value]> = Arc::from(vec![1.0, 2.0, 3.0]);
        let mut v = Vector::shared(data);
        assert!(v.as_mut_slice().is_err());
    }

    #[test]
    fn raw_parts_round_trips_through_as_slice() {
        let mut backing = vec![1.0f32 as Value, 2.0, 3.0];
        let v = unsafe { Vector::from_raw_parts(backing.as_mut_ptr(), backing.len()) };
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn create_from_buff_copies_rather_than_aliases() {
        let backing = vec![1.0, 2.0, 3.0];
        let mut v = Vector::create_from_buff(&backing);
        v.scale(2.0).unwrap();
        assert_eq!(backing, vec![1.0, 2.0, 3.0]);
        assert_eq!(v.as_slice(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn create_random_fills_unit_interval() {
        let v = Vector::create_random(64);
        assert_eq!(v.len(), 64);
        assert!(v.as_slice().iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn init_overwrites_full_vector() {
        let mut v = Vector::zeros(3);
        v.init(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
        assert!(v.init(&[1.0]).is_err());
    }

    #[test]
    fn init_part_overwrites_a_slice() {
        let mut v = Vector::zeros(5);
        v.init_part(&[1.0, 2.0], 1, 3).unwrap();
        assert_eq!(v.as_slice(), &[0.0, 1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn init_from_map_scatters_values() {
        let mut v = Vector::zeros(4);
        v.init_from_map(&[9.0, 7.0], &[3, 0]).unwrap();
        assert_eq!(v.as_slice(), &[7.0, 0.0, 0.0, 9.0]);
        assert!(v.init_from_map(&[1.0], &[10]).is_err());
    }

    #[test]
    fn arithmetic_ops_match_expectations() {
        let mut a = Vector::from_vec(vec![1.0, 2.0, 3.0]);
        let b = Vector::from_vec(vec![4.0, 5.0, 6.0]);
        assert_eq!(a.dot(&b).unwrap(), 32.0);

        a.add(&b).unwrap();
        assert_eq!(a.as_slice(), &[5.0, 7.0, 9.0]);

        a.sub(&b).unwrap();
        assert_eq!(a.as_slice(), &[1.0, 2.0, 3.0]);

        a.scale(2.0).unwrap();
        assert_eq!(a.as_slice(), &[2.0, 4.0, 6.0]);

        a.scale_add(1.0, &b).unwrap();
        assert_eq!(a.as_slice(), &[6.0, 9.0, 12.0]);
    }

    #[test]
    fn compare_respects_tolerance_and_length() {
        let a = Vector::from_vec(vec![1.0, 2.0]);
        let b = Vector::from_vec(vec![1.0001, 2.0]);
        assert!(a.compare(&b, 0.001));
        assert!(!a.compare(&b, 0.0));
        let c = Vector::from_vec(vec![1.0]);
        assert!(!a.compare(&c, 1.0));
    }
}
