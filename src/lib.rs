//! A slab allocator for reference-counted, chainable byte buffers.
//!
//! An [`Arena`] carves large backing allocations ("slabs") into fixed-size
//! chunks, grouped into geometrically-growing size classes, and hands out
//! [`SlabBuf`] handles against them. Handles are refcounted and can be
//! linked into singly-linked chains so that a logical record spanning
//! several chunks can be released as a unit.
//!
//! The arena is not thread-safe; share one behind a `Mutex` if needed from
//! multiple threads.

mod arena;
mod backing;
mod chunk;
mod error;
mod loc;
mod slab;
mod slab_buf;
mod slab_class;
mod stats;

pub use arena::Arena;
pub use backing::{default_backing_allocator, BackingAllocator};
pub use error::ArenaConfigError;
pub use loc::Loc;
pub use slab_buf::SlabBuf;
