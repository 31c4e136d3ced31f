//! Logical chunk handles.
//!
//! A [`Loc`] names a chunk by its coordinates in the arena (which slab class,
//! which slab within that class, which chunk within that slab) plus the
//! logical length the chunk is currently standing in for. It never borrows
//! from the arena, so it can be copied, stored in a free-list link, or
//! handed out as a chain pointer without touching a lifetime.

/// A 4-tuple handle: `(slab_class, slab, chunk, chunk_size)`.
///
/// `chunk_size` records the *logical* length of the buffer this handle
/// stands for, which may be less than the physical size of the chunk it
/// occupies. For free-list links and a chunk's own self-`Loc` it equals the
/// class's physical chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Loc {
    pub slab_class: i32,
    pub slab: i32,
    pub chunk: i32,
    pub chunk_size: i32,
}

impl Loc {
    /// The distinguished "no chunk" value: every field set to `-1`.
    ///
    /// Used both as the free-list terminator and as the "no successor"
    /// marker on a chained buffer.
    pub const NIL: Loc = Loc {
        slab_class: -1,
        slab: -1,
        chunk: -1,
        chunk_size: -1,
    };

    pub fn new(slab_class: usize, slab: usize, chunk: usize, chunk_size: usize) -> Self {
        Loc {
            slab_class: slab_class as i32,
            slab: slab as i32,
            chunk: chunk as i32,
            chunk_size: chunk_size as i32,
        }
    }

    pub fn is_nil(self) -> bool {
        self == Loc::NIL
    }

    /// `self` with `chunk_size` replaced; used when a `Loc` is reused to
    /// stand for a shorter logical length (e.g. linking a chain successor).
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Loc {
            chunk_size: chunk_size as i32,
            ..self
        }
    }

    pub fn slab_class_idx(self) -> usize {
        debug_assert!(!self.is_nil());
        self.slab_class as usize
    }

    pub fn slab_idx(self) -> usize {
        debug_assert!(!self.is_nil());
        self.slab as usize
    }

    pub fn chunk_idx(self) -> usize {
        debug_assert!(!self.is_nil());
        self.chunk as usize
    }

    pub fn len(self) -> usize {
        debug_assert!(!self.is_nil());
        self.chunk_size as usize
    }
}

impl Default for Loc {
    fn default() -> Self {
        Loc::NIL
    }
}
