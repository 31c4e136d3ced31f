//! The backing memory provider.
//!
//! The arena never calls the global allocator directly for slab storage; it
//! goes through an injectable function so callers can supply arena-backed
//! memory, mmap'd regions, test doubles that fail on demand, etc. This is
//! explicitly an external collaborator (see spec §1) — the arena only
//! specifies the contract, not an implementation of it beyond the default.

/// Requests `len` bytes, returning `None` on failure.
///
/// A real implementation must return a region of exactly `len` bytes on
/// success. The default (used when `Arena::new` is given `None`) returns a
/// zero-initialized `Vec<u8>`.
pub type BackingAllocator = Box<dyn FnMut(usize) -> Option<Vec<u8>>>;

pub fn default_backing_allocator() -> BackingAllocator {
    Box::new(|len: usize| Some(vec![0u8; len]))
}
