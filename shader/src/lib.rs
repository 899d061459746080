#![no_std]

//! Compute and display entry points of the path tracer.
//!
//! Every kernel bounds-checks against the lengths in its push constants; bound buffers are
//! allowed to be larger than their live contents.

pub mod bvh;
pub mod display;
pub mod reduce;
pub mod sort;
pub mod trace;

use spirv_std::memory::{Scope, Semantics};

/// Device scoped read-modify-write semantics on storage buffers.
pub(crate) const DEVICE: u32 = Scope::Device as u32;
pub(crate) const ACQUIRE_RELEASE: u32 = Semantics::UNIFORM_MEMORY.bits() | Semantics::ACQUIRE_RELEASE.bits();

#[allow(unused_unsafe)]
#[inline]
pub(crate) fn barrier() {
    unsafe {
        spirv_std::arch::workgroup_memory_barrier_with_group_sync();
    }
}
