//! NUMA-aware allocation: page-granularity placement of vector/partition
//! storage via Linux's `mbind(2)`. A no-op stub on other platforms, since
//! NUMA placement has no portable equivalent.

use crate::error::Error;
use crate::Value;

/// A `Value` buffer allocated with a page-aligned [`std::alloc::Layout`]
/// that a plain `Vec<Value>` cannot represent (its alignment usually
/// exceeds `align_of::<Value>()`). Owns its memory and deallocates with
/// the exact layout it was allocated with, so the allocation and
/// deallocation layouts can never drift out of sync the way handing the
/// pointer to `Vec::from_raw_parts` would.
pub struct NumaBuffer {
    ptr: *mut Value,
    len: usize,
    layout: std::alloc::Layout,
}

// SAFETY: `NumaBuffer` exclusively owns the memory behind `ptr`; no other
// handle to it exists, so sending/sharing it is as sound as for `Vec<Value>`.
unsafe impl Send for NumaBuffer {}
unsafe impl Sync for NumaBuffer {}

impl NumaBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[Value] {
        // SAFETY: `ptr` is valid for `len` initialized `Value`s for the
        // lifetime of `self` (`Drop` only runs after the last borrow).
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [Value] {
        // SAFETY: see `as_slice`; `&mut self` proves exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for NumaBuffer {
    fn drop(&mut self) {
        // SAFETY: `self.layout` is the exact layout `alloc_zeroed` used to
        // produce `self.ptr`, as `dealloc` requires.
        unsafe { std::alloc::dealloc(self.ptr as *mut u8, self.layout) }
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use std::alloc::{alloc_zeroed, Layout};

    const MPOL_BIND: libc::c_ulong = 2;
    const MPOL_INTERLEAVE: libc::c_ulong = 3;
    const MPOL_MF_STRICT: libc::c_uint = 1;
    const MPOL_MF_MOVE: libc::c_uint = 1 << 1;

    fn page_size() -> usize {
        // SAFETY: `sysconf` with a valid name is always sound.
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    fn page_aligned_layout(len: usize) -> Layout {
        let bytes = len * std::mem::size_of::<Value>();
        let align = page_size().max(std::mem::align_of::<Value>());
        Layout::from_size_align(bytes.max(align), align).expect("layout overflow")
    }

    /// Number of NUMA nodes currently available to this process, per
    /// `get_mempolicy(MPOL_F_MEMS_ALLOWED)`.
    pub fn nr_nodes() -> usize {
        let mut nodemask = [0u64; 16]; // supports up to 1024 nodes
        let maxnode = (nodemask.len() * 64) as libc::c_ulong;
        // SAFETY: `nodemask` is sized per `maxnode` as required by the syscall.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_get_mempolicy,
                std::ptr::null_mut::<libc::c_long>(),
                nodemask.as_mut_ptr(),
                maxnode,
                std::ptr::null::<libc::c_void>(),
                libc::MPOL_F_MEMS_ALLOWED,
            )
        };
        if rc != 0 {
            return 1;
        }
        nodemask.iter().map(|w| w.count_ones() as usize).sum::<usize>().max(1)
    }

    fn mbind_range(ptr: *mut u8, len_bytes: usize, mode: libc::c_ulong, mask: u64) -> Result<(), Error> {
        let nodemask = [mask];
        // SAFETY: `ptr..ptr+len_bytes` is a just-allocated, page-aligned
        // region this call owns exclusively; `nodemask` is sized for the
        // one `c_ulong` of node bits this crate targets (<=64 nodes).
        let rc = unsafe {
            libc::syscall(
                libc::SYS_mbind,
                ptr as *mut libc::c_void,
                len_bytes,
                mode,
                nodemask.as_ptr(),
                (nodemask.len() * 64) as libc::c_ulong,
                (MPOL_MF_STRICT | MPOL_MF_MOVE) as libc::c_ulong,
            )
        };
        if rc != 0 {
            return Err(Error::MemoryAllocation(format!(
                "mbind failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn alloc_zeroed_buffer(len: usize, mode: libc::c_ulong, mask: u64) -> Result<NumaBuffer, Error> {
        let layout = page_aligned_layout(len);
        // SAFETY: `layout` has nonzero size (enforced by `page_aligned_layout`).
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::MemoryAllocation("allocation failed".into()));
        }
        if let Err(e) = mbind_range(ptr, layout.size(), mode, mask) {
            // SAFETY: `layout` is exactly what produced `ptr`.
            unsafe { std::alloc::dealloc(ptr, layout) };
            return Err(e);
        }
        Ok(NumaBuffer { ptr: ptr as *mut Value, len, layout })
    }

    pub fn alloc_on_node(len: usize, node: i32) -> Result<NumaBuffer, Error> {
        if node < 0 {
            return Err(Error::InvalidArgument(format!("invalid NUMA node {node}")));
        }
        alloc_zeroed_buffer(len, MPOL_BIND, 1u64 << node)
    }

    pub fn alloc_interleaved(len: usize) -> Result<NumaBuffer, Error> {
        let nodes = nr_nodes();
        let mask = if nodes >= 64 { u64::MAX } else { (1u64 << nodes) - 1 };
        alloc_zeroed_buffer(len, MPOL_INTERLEAVE, mask)
    }
}

#[cfg(target_os = "linux")]
pub use linux::{alloc_interleaved, alloc_on_node, nr_nodes};

#[cfg(not(target_os = "linux"))]
pub fn nr_nodes() -> usize {
    1
}

#[cfg(not(target_os = "linux"))]
pub fn alloc_on_node(_len: usize, _node: i32) -> Result<NumaBuffer, Error> {
    Err(Error::MemoryAllocation("NUMA placement is only supported on Linux".into()))
}

#[cfg(not(target_os = "linux"))]
pub fn alloc_interleaved(_len: usize) -> Result<NumaBuffer, Error> {
    Err(Error::MemoryAllocation("NUMA placement is only supported on Linux".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nr_nodes_is_at_least_one() {
        assert!(nr_nodes() >= 1);
    }
}
