//! A set of slabs sharing one chunk size, with a per-class intrusive
//! free-list.

use crate::backing::BackingAllocator;
use crate::chunk::Chunk;
use crate::loc::Loc;
use crate::slab::Slab;

pub struct SlabClass {
    pub chunk_size: usize,
    pub slabs: Vec<Slab>,
    pub free_head: Loc,
    pub num_chunks: i64,
    pub num_chunks_free: i64,
}

impl SlabClass {
    pub fn new(chunk_size: usize) -> Self {
        SlabClass {
            chunk_size,
            slabs: Vec::new(),
            free_head: Loc::NIL,
            num_chunks: 0,
            num_chunks_free: 0,
        }
    }

    pub fn chunk(&self, loc: Loc) -> &Chunk {
        &self.slabs[loc.slab_idx()].chunks[loc.chunk_idx()]
    }

    pub fn chunk_mut(&mut self, loc: Loc) -> &mut Chunk {
        &mut self.slabs[loc.slab_idx()].chunks[loc.chunk_idx()]
    }

    pub fn num_chunks_in_use(&self) -> i64 {
        self.num_chunks - self.num_chunks_free
    }

    /// Carves a new slab from `backing` and threads all its chunks onto the
    /// free-list in order, so that popping produces them in reverse (LIFO).
    /// Returns `false` (installing no partial state) if the backing
    /// allocator fails.
    pub fn add_slab(&mut self, slab_class_idx: usize, slab_size: usize, magic: u32, backing: &mut BackingAllocator) -> bool {
        let slab_idx = self.slabs.len();
        let slab = match Slab::new(slab_class_idx, slab_idx, self.chunk_size, slab_size, magic, backing) {
            Some(s) => s,
            None => return false,
        };

        let chunks_per_slab = slab.chunks_per_slab();
        self.slabs.push(slab);
        self.num_chunks += chunks_per_slab as i64;

        for i in 0..chunks_per_slab {
            let loc = Loc::new(slab_class_idx, slab_idx, i, self.chunk_size);
            self.push_free(loc);
        }

        true
    }

    /// Pushes a free chunk onto the head of the free-list.
    ///
    /// Fatal if the chunk's refcount is non-zero: pushing an in-use chunk
    /// would corrupt the free-list/chain dual-use invariant.
    pub fn push_free(&mut self, loc: Loc) {
        let old_head = self.free_head;
        let chunk = self.chunk_mut(loc);
        if chunk.refcount != 0 {
            panic!(
                "slaballoc: pushing chunk {:?} with refcount {} onto the free-list",
                loc, chunk.refcount
            );
        }
        chunk.next = old_head;
        self.free_head = loc;
        self.num_chunks_free += 1;
    }

    /// Pops the head of the free-list, setting its refcount to 1.
    ///
    /// Returns `None` if the free-list is empty; this is the capacity path
    /// (`Arena::alloc` must add a slab first), not itself an error.
    pub fn pop_free(&mut self) -> Option<Loc> {
        if self.free_head.is_nil() {
            return None;
        }
        let loc = self.free_head;
        let next = {
            let chunk = self.chunk_mut(loc);
            if chunk.refcount != 0 {
                panic!(
                    "slaballoc: free-list head {:?} has non-zero refcount {}",
                    loc, chunk.refcount
                );
            }
            chunk.refcount = 1;
            let next = chunk.next;
            chunk.next = Loc::NIL;
            next
        };
        self.free_head = next;
        self.num_chunks_free -= 1;
        if self.num_chunks_free < 0 {
            panic!("slaballoc: free chunk count went negative for chunk size {}", self.chunk_size);
        }
        Some(loc)
    }

    /// Walks the free-list from head to `Nil`, for invariant checks and
    /// tests.
    pub fn free_list(&self) -> Vec<Loc> {
        let mut out = Vec::new();
        let mut cur = self.free_head;
        while !cur.is_nil() {
            out.push(cur);
            cur = self.chunk(cur).next;
        }
        out
    }
}
