//! Per-chunk metadata.

use crate::loc::Loc;

/// Metadata tracked beside (not inside) a chunk's raw bytes.
///
/// `next` is overloaded: while `refcount == 0` it is a free-list link; while
/// `refcount >= 1` it is a chain pointer to a successor buffer. The two uses
/// never overlap because a chunk is either on the free-list or in use, never
/// both (`refcount == 0` iff on the free-list is an invariant maintained by
/// [`crate::slab_class::SlabClass`]).
#[derive(Debug, Clone, Copy)]
pub struct Chunk {
    pub refcount: i64,
    pub self_loc: Loc,
    pub next: Loc,
}

impl Chunk {
    pub fn new(self_loc: Loc) -> Self {
        Chunk {
            refcount: 0,
            self_loc,
            next: Loc::NIL,
        }
    }

    pub fn is_free(&self) -> bool {
        self.refcount == 0
    }
}
