//! A single contiguous byte region carved into equal-size chunks, plus its
//! 12-byte trailer.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backing::BackingAllocator;
use crate::chunk::Chunk;
use crate::loc::Loc;

/// Trailer length in bytes: three big-endian `u32` words (class index, slab
/// index, arena magic).
pub const FOOTER_LEN: usize = 12;

pub struct Slab {
    /// `chunks_per_slab * chunk_size + FOOTER_LEN` bytes: the usable area
    /// followed immediately by the trailer. Shared (via `Rc<RefCell<_>>`)
    /// with every `SlabBuf` handed out against this slab, so a buffer can
    /// be read and written without holding a borrow of the `Arena` itself.
    pub data: Rc<RefCell<Vec<u8>>>,
    pub chunks: Vec<Chunk>,
    pub chunk_size: usize,
}

impl Slab {
    /// Carves a new slab for `slab_class_idx`, indexed `slab_idx` within
    /// that class, requesting `chunks_per_slab * chunk_size + FOOTER_LEN`
    /// bytes from `backing`. Returns `None` (without installing any state)
    /// if the backing allocator fails.
    pub fn new(
        slab_class_idx: usize,
        slab_idx: usize,
        chunk_size: usize,
        slab_size: usize,
        magic: u32,
        backing: &mut BackingAllocator,
    ) -> Option<Slab> {
        let chunks_per_slab = (slab_size / chunk_size).max(1);
        let total_len = chunks_per_slab * chunk_size + FOOTER_LEN;

        let mut data = backing(total_len)?;
        debug_assert_eq!(data.len(), total_len);

        let trailer_off = total_len - FOOTER_LEN;
        data[trailer_off..trailer_off + 4].copy_from_slice(&(slab_class_idx as u32).to_be_bytes());
        data[trailer_off + 4..trailer_off + 8].copy_from_slice(&(slab_idx as u32).to_be_bytes());
        data[trailer_off + 8..trailer_off + 12].copy_from_slice(&magic.to_be_bytes());

        let chunks = (0..chunks_per_slab)
            .map(|i| Chunk::new(Loc::new(slab_class_idx, slab_idx, i, chunk_size)))
            .collect();

        Some(Slab {
            data: Rc::new(RefCell::new(data)),
            chunks,
            chunk_size,
        })
    }

    pub fn chunks_per_slab(&self) -> usize {
        self.chunks.len()
    }

    /// Reads the trailer as `(slab_class_idx, slab_idx, magic)`.
    pub fn read_trailer(&self) -> (u32, u32, u32) {
        let data = self.data.borrow();
        let trailer_off = data.len() - FOOTER_LEN;
        let t = &data[trailer_off..];
        let class_idx = u32::from_be_bytes(t[0..4].try_into().unwrap());
        let slab_idx = u32::from_be_bytes(t[4..8].try_into().unwrap());
        let magic = u32::from_be_bytes(t[8..12].try_into().unwrap());
        (class_idx, slab_idx, magic)
    }

    /// The raw back-reference arithmetic from spec §4.5: given the
    /// *capacity* of a byte region (distance from its base to the end of
    /// the slab region, footer included) and the class's layout, recovers
    /// which chunk that region must be a prefix of.
    ///
    /// `SlabBuf` carries its `Loc` directly rather than a bare capacity
    /// (see `SPEC_FULL.md` §9), so this isn't on the hot path of
    /// `Arena::resolve_from_footer`, but it is the exact formula the spec
    /// calls the hard engineering, and `Arena::resolve_from_footer`
    /// cross-checks every resolved `Loc` against it.
    pub fn footer_chunk_index(capacity: usize, chunks_per_slab: usize, chunk_size: usize) -> Option<usize> {
        if capacity <= FOOTER_LEN {
            return None;
        }
        let footer_distance = capacity - FOOTER_LEN;
        if footer_distance % chunk_size != 0 {
            return None;
        }
        let chunks_after = footer_distance / chunk_size;
        if chunks_after > chunks_per_slab {
            return None;
        }
        Some(chunks_per_slab - chunks_after)
    }

    /// The capacity (§4.5 sense) of the region a chunk at `chunk_idx` would
    /// be handed out as: the distance from that chunk's base to the end of
    /// the slab region, footer included.
    pub fn capacity_of(chunk_idx: usize, chunks_per_slab: usize, chunk_size: usize) -> usize {
        (chunks_per_slab - chunk_idx) * chunk_size + FOOTER_LEN
    }
}
