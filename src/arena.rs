//! The top-level allocator.

use std::collections::HashMap;
use std::rc::Rc;

use rand::Rng;

use crate::backing::{default_backing_allocator, BackingAllocator};
use crate::error::ArenaConfigError;
use crate::loc::Loc;
use crate::slab_buf::SlabBuf;
use crate::slab_class::SlabClass;
use crate::stats::Counters;

/// The slab allocator. Owns every [`crate::slab::Slab`] it has ever carved
/// and the per-class free-lists that recycle their chunks.
///
/// Not `Send`/`Sync`: per spec, the arena is single-threaded and a caller
/// needing shared access wraps it in `std::sync::Mutex<Arena>` (or shards
/// one arena per worker). `SlabBuf`'s internal `Rc` would make sharing it
/// across threads unsound anyway, which is exactly the point.
pub struct Arena {
    classes: Vec<SlabClass>,
    backing: BackingAllocator,
    slab_size: usize,
    growth_factor: f64,
    magic: u32,
    counters: Counters,
}

impl Arena {
    /// Creates a new arena. `start_chunk_size` and `slab_size` must be
    /// positive; `growth_factor` must be `> 1.0` and must, applied to
    /// `start_chunk_size`, eventually grow the chunk-size sequence (this is
    /// checked lazily as classes are created, but an obviously-broken
    /// factor is rejected up front).
    pub fn new(
        start_chunk_size: usize,
        slab_size: usize,
        growth_factor: f64,
        backing_allocator: Option<BackingAllocator>,
    ) -> Result<Arena, ArenaConfigError> {
        if start_chunk_size == 0 {
            return Err(ArenaConfigError::InvalidStartChunkSize(start_chunk_size));
        }
        if slab_size == 0 {
            return Err(ArenaConfigError::InvalidSlabSize(slab_size));
        }
        if !(growth_factor > 1.0) {
            return Err(ArenaConfigError::InvalidGrowthFactor(growth_factor));
        }
        let grown = grow_chunk_size(start_chunk_size, growth_factor);
        if grown <= start_chunk_size {
            return Err(ArenaConfigError::NonMonotonicGrowth {
                from: start_chunk_size,
                to: grown,
                growth_factor,
            });
        }

        let magic: u32 = rand::thread_rng().gen();
        log::debug!(
            "slaballoc: new arena start_chunk_size={} slab_size={} growth_factor={} magic=0x{:08x}",
            start_chunk_size,
            slab_size,
            growth_factor,
            magic
        );

        Ok(Arena {
            classes: vec![SlabClass::new(start_chunk_size)],
            backing: backing_allocator.unwrap_or_else(default_backing_allocator),
            slab_size,
            growth_factor,
            magic,
            counters: Counters::default(),
        })
    }

    // ---- size-class table -------------------------------------------------

    /// Index of the smallest class with `chunk_size >= size`, creating new
    /// classes (via the geometric growth rule) until one fits. `size == 0`
    /// always maps to class 0. Classes are sorted by `chunk_size` by
    /// construction, so a partition-point search finds the right one
    /// without scanning classes already known to be too small.
    fn find_class(&mut self, size: usize) -> usize {
        loop {
            let idx = self.classes.partition_point(|c| c.chunk_size < size);
            if idx < self.classes.len() {
                return idx;
            }
            let last = self.classes.last().unwrap().chunk_size;
            let next_size = grow_chunk_size(last, self.growth_factor);
            debug_assert!(next_size > last, "growth factor must strictly increase chunk size");
            self.classes.push(SlabClass::new(next_size));
        }
    }

    // ---- allocation --------------------------------------------------------

    /// Returns a byte region of exactly `size` bytes, owned by the caller
    /// with refcount 1, or `None` on any recoverable failure.
    pub fn alloc(&mut self, size: usize) -> Option<SlabBuf> {
        let loc = self.alloc_loc(size)?;
        Some(self.buf_for(loc))
    }

    /// As [`Arena::alloc`] but returns the chunk's [`Loc`] instead of a
    /// [`SlabBuf`]; `None` on any recoverable failure (too-big, allocator
    /// failure) — the `Option` plays the role spec §6's `Loc::NIL` sentinel
    /// plays in the literal spec text.
    pub fn alloc_loc(&mut self, size: usize) -> Option<Loc> {
        if size > self.slab_size {
            log::warn!("slaballoc: alloc({}) exceeds slab_size {}", size, self.slab_size);
            self.counters.num_too_big_errs += 1;
            return None;
        }

        let class_idx = self.find_class(size);

        if self.classes[class_idx].free_head.is_nil() {
            if !self.add_slab(class_idx) {
                return None;
            }
        }

        let loc = match self.classes[class_idx].pop_free() {
            Some(loc) => loc,
            None => {
                // add_slab reported success but left the free-list empty;
                // this is an invariant breach, not a capacity issue.
                log::error!(
                    "slaballoc: class {} free-list empty immediately after a successful add_slab",
                    class_idx
                );
                self.counters.num_pop_free_chunk_errs += 1;
                return None;
            }
        };

        self.counters.num_allocs += 1;
        Some(loc.with_chunk_size(size))
    }

    fn add_slab(&mut self, class_idx: usize) -> bool {
        let chunk_size = self.classes[class_idx].chunk_size;
        log::debug!(
            "slaballoc: adding slab to class {} (chunk_size={}, slab_size={})",
            class_idx,
            chunk_size,
            self.slab_size
        );
        self.counters.num_mallocs += 1;
        let ok = self.classes[class_idx].add_slab(class_idx, self.slab_size, self.magic, &mut self.backing);
        if !ok {
            log::warn!("slaballoc: backing allocator failed while growing class {}", class_idx);
            self.counters.num_malloc_errs += 1;
            self.counters.num_add_slab_errs += 1;
        }
        ok
    }

    fn buf_for(&self, loc: Loc) -> SlabBuf {
        let class = &self.classes[loc.slab_class_idx()];
        let slab = &class.slabs[loc.slab_idx()];
        SlabBuf::new(loc, Rc::clone(&slab.data), class.chunk_size)
    }

    // ---- reverse lookup -----------------------------------------------------

    /// Resolves `buf` to the `Loc` the arena actually owns it under, or
    /// `None` if `buf` is foreign (wrong magic, indices out of range, or a
    /// handle from a different arena that happens to share index space).
    fn resolve_from_footer(&self, buf: &SlabBuf) -> Option<Loc> {
        let loc = buf.loc;
        if loc.is_nil() {
            return None;
        }
        let class_idx = loc.slab_class_idx();
        let class = self.classes.get(class_idx)?;
        let slab_idx = loc.slab_idx();
        let slab = class.slabs.get(slab_idx)?;
        let chunk_idx = loc.chunk_idx();
        if chunk_idx >= slab.chunks.len() {
            return None;
        }
        if !Rc::ptr_eq(&buf.data, &slab.data) {
            return None;
        }

        let (trailer_class, trailer_slab, trailer_magic) = slab.read_trailer();
        if trailer_magic != self.magic {
            return None;
        }
        if trailer_class != class_idx as u32 || trailer_slab != slab_idx as u32 {
            return None;
        }

        // Exercise the capacity-based back-reference formula from spec
        // §4.5 as a consistency check: the capacity a real SlabBuf for
        // this chunk would carry must round-trip to the same chunk index.
        let cap = crate::slab::Slab::capacity_of(chunk_idx, slab.chunks_per_slab(), slab.chunk_size);
        debug_assert_eq!(
            crate::slab::Slab::footer_chunk_index(cap, slab.chunks_per_slab(), slab.chunk_size),
            Some(chunk_idx)
        );

        Some(loc)
    }

    /// Whether `buf` was produced by this arena.
    pub fn owns(&self, buf: &SlabBuf) -> bool {
        self.resolve_from_footer(buf).is_some()
    }

    // ---- refcounting & chaining --------------------------------------------

    /// Increments `buf`'s refcount and returns a second owned handle
    /// standing for the new reference. Fatal if `buf` is foreign.
    pub fn add_ref(&mut self, buf: &SlabBuf) -> SlabBuf {
        let loc = self.resolve_from_footer(buf).unwrap_or_else(|| {
            panic!("slaballoc: add_ref called with a buffer not owned by this arena: {:?}", buf.loc())
        });
        self.counters.num_add_refs += 1;
        let class = &mut self.classes[loc.slab_class_idx()];
        let chunk = class.chunk_mut(loc);
        chunk.refcount += 1;
        if chunk.refcount < 2 {
            panic!(
                "slaballoc: add_ref left refcount {} <= 1 for chunk {:?}; caller had no reference to begin with",
                chunk.refcount, loc
            );
        }
        self.buf_for(loc)
    }

    /// Decrements `buf`'s refcount, consuming the handle. Returns `true`
    /// iff the refcount reached 0 on this call, in which case the chunk
    /// (and, recursively, the rest of its chain) was returned to its
    /// class's free-list.
    pub fn dec_ref(&mut self, buf: SlabBuf) -> bool {
        let loc = self.resolve_from_footer(&buf).unwrap_or_else(|| {
            panic!("slaballoc: dec_ref called with a buffer not owned by this arena: {:?}", buf.loc())
        });
        self.counters.num_dec_refs += 1;
        self.dec_ref_loc(loc)
    }

    /// Iterative chain release: decrements `loc`'s refcount and, each time
    /// a chunk's count reaches zero, pushes its successor (if any) onto a
    /// work-list instead of recursing, per the spec's note for constrained
    /// stacks. Returns whether `loc` itself reached 0.
    fn dec_ref_loc(&mut self, loc: Loc) -> bool {
        let mut work = vec![loc];
        let mut head_freed = false;
        let mut first = true;

        while let Some(loc) = work.pop() {
            let class_idx = loc.slab_class_idx();
            let (new_refcount, next) = {
                let chunk = self.classes[class_idx].chunk_mut(loc);
                if chunk.refcount <= 0 {
                    panic!(
                        "slaballoc: dec_ref would drive refcount below 0 for chunk {:?} (currently {})",
                        loc, chunk.refcount
                    );
                }
                chunk.refcount -= 1;
                (chunk.refcount, chunk.next)
            };

            if new_refcount == 0 {
                if first {
                    head_freed = true;
                }
                if !next.is_nil() {
                    work.push(next);
                }
                self.classes[class_idx].chunk_mut(loc).next = Loc::NIL;
                self.classes[class_idx].push_free(loc);
            }
            first = false;
        }

        head_freed
    }

    /// Returns the chain successor of `buf` with a fresh refcount, or
    /// `None` if there is no successor. The caller owns the returned
    /// handle and must `dec_ref` it.
    pub fn get_next(&mut self, buf: &SlabBuf) -> Option<SlabBuf> {
        let loc = self.resolve_from_footer(buf).unwrap_or_else(|| {
            panic!("slaballoc: get_next called with a buffer not owned by this arena: {:?}", buf.loc())
        });
        self.counters.num_get_nexts += 1;
        let chunk = self.classes[loc.slab_class_idx()].chunk(loc);
        if chunk.refcount <= 0 {
            panic!("slaballoc: get_next called on a chunk with refcount <= 0: {:?}", loc);
        }
        let next = chunk.next;
        if next.is_nil() {
            return None;
        }
        // Bump the successor's refcount directly rather than routing through
        // `add_ref`: that path increments `num_add_refs`, which is reserved
        // for caller-invoked `add_ref` and is a distinct key from
        // `numGetNexts` in the stats contract (spec §4.7).
        let succ_class = &mut self.classes[next.slab_class_idx()];
        let succ_chunk = succ_class.chunk_mut(next);
        succ_chunk.refcount += 1;
        if succ_chunk.refcount < 2 {
            panic!(
                "slaballoc: get_next left successor refcount {} <= 1 for chunk {:?}",
                succ_chunk.refcount, next
            );
        }
        Some(self.buf_for(next))
    }

    /// Installs (or clears, if `successor` is `None`) `buf`'s chain link.
    /// Any previous successor is released (its chain refcount dropped);
    /// any new successor has its refcount bumped to cover the new link.
    /// Consumes `successor` — the arena now owns its refcount on the
    /// predecessor's behalf.
    pub fn set_next(&mut self, buf: &SlabBuf, successor: Option<SlabBuf>) {
        let loc = self.resolve_from_footer(buf).unwrap_or_else(|| {
            panic!("slaballoc: set_next called with a buffer not owned by this arena: {:?}", buf.loc())
        });
        self.counters.num_set_nexts += 1;
        let class_idx = loc.slab_class_idx();
        {
            let chunk = self.classes[class_idx].chunk(loc);
            if chunk.refcount <= 0 {
                panic!("slaballoc: set_next called on a chunk with refcount <= 0: {:?}", loc);
            }
        }

        let old_next = self.classes[class_idx].chunk(loc).next;
        if !old_next.is_nil() {
            self.classes[class_idx].chunk_mut(loc).next = Loc::NIL;
            self.dec_ref_loc(old_next);
        }

        match successor {
            None => {
                self.classes[class_idx].chunk_mut(loc).next = Loc::NIL;
            }
            Some(succ_buf) => {
                let succ_loc = self
                    .resolve_from_footer(&succ_buf)
                    .unwrap_or_else(|| panic!("slaballoc: set_next successor not owned by this arena: {:?}", succ_buf.loc()));
                let link = succ_loc.with_chunk_size(succ_buf.len());
                // succ_buf is consumed here; the reference it represented
                // now lives on as the chain link rather than as a live
                // handle, so no refcount change is needed for it. Only the
                // predecessor's own bookkeeping (the link field) changes.
                drop(succ_buf);
                self.classes[class_idx].chunk_mut(loc).next = link;
            }
        }
    }

    // ---- statistics ---------------------------------------------------------

    /// Fills `out` with the global counters and, per class, the fields
    /// named in spec §4.7 under key prefix `slabClass-NNNNNN-`.
    pub fn stats(&self, out: &mut HashMap<String, i64>) {
        out.insert("numSlabClasses".to_string(), self.classes.len() as i64);
        out.insert("numAllocs".to_string(), self.counters.num_allocs);
        out.insert("numAddRefs".to_string(), self.counters.num_add_refs);
        out.insert("numDecRefs".to_string(), self.counters.num_dec_refs);
        out.insert("numGetNexts".to_string(), self.counters.num_get_nexts);
        out.insert("numSetNexts".to_string(), self.counters.num_set_nexts);
        out.insert("numMallocs".to_string(), self.counters.num_mallocs);
        out.insert("numMallocErrs".to_string(), self.counters.num_malloc_errs);
        out.insert("numTooBigErrs".to_string(), self.counters.num_too_big_errs);
        out.insert("numAddSlabErrs".to_string(), self.counters.num_add_slab_errs);
        out.insert(
            "numPopFreeChunkErrs".to_string(),
            self.counters.num_pop_free_chunk_errs,
        );

        for (idx, class) in self.classes.iter().enumerate() {
            let prefix = format!("slabClass-{:06}-", idx);
            out.insert(format!("{}numSlabs", prefix), class.slabs.len() as i64);
            out.insert(format!("{}chunkSize", prefix), class.chunk_size as i64);
            out.insert(format!("{}numChunks", prefix), class.num_chunks);
            out.insert(format!("{}numChunksFree", prefix), class.num_chunks_free);
            out.insert(format!("{}numChunksInUse", prefix), class.num_chunks_in_use());
        }
    }
}

/// `ceil(size as f64 * growth_factor)`, the geometric growth rule from
/// spec §3/§4.1.
fn grow_chunk_size(size: usize, growth_factor: f64) -> usize {
    (size as f64 * growth_factor).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(start: usize, slab_size: usize, growth: f64) -> Arena {
        Arena::new(start, slab_size, growth, None).unwrap()
    }

    #[test]
    fn rejects_invalid_construction_params() {
        assert!(Arena::new(0, 16, 2.0, None).is_err());
        assert!(Arena::new(1, 0, 2.0, None).is_err());
        assert!(Arena::new(1, 16, 1.0, None).is_err());
        assert!(Arena::new(1, 16, 0.5, None).is_err());
    }

    #[test]
    fn basic_reuse() {
        let mut a = arena(1, 8, 2.0);
        let buf_a = a.alloc(1).unwrap();
        let loc_a = buf_a.loc();
        assert!(a.dec_ref(buf_a));
        let buf_b = a.alloc(1).unwrap();
        assert_eq!(buf_b.loc().chunk_idx(), loc_a.chunk_idx());

        let mut stats = HashMap::new();
        a.stats(&mut stats);
        assert_eq!(stats["numAllocs"], 2);
        assert_eq!(stats["slabClass-000000-numChunksFree"], 7);
    }

    #[test]
    fn chain_release_drops_whole_chain() {
        let mut a = arena(1, 8, 2.0);
        let buf_a = a.alloc(1).unwrap();
        let buf_b = a.alloc(1).unwrap();
        a.set_next(&buf_a, Some(buf_b));

        let mut stats = HashMap::new();
        a.stats(&mut stats);
        let free_before_release = stats["slabClass-000000-numChunksFree"];

        assert!(a.dec_ref(buf_a));

        let mut stats = HashMap::new();
        a.stats(&mut stats);
        assert_eq!(stats["slabClass-000000-numChunksFree"], free_before_release + 2);
    }

    #[test]
    fn cross_class_allocation() {
        let mut a = arena(1, 1024, 2.0);
        let b1 = a.alloc(1).unwrap();
        assert_eq!(b1.loc().slab_class_idx(), 0);
        let b3 = a.alloc(3).unwrap();
        assert!(b3.loc().slab_class_idx() > 0);
    }

    #[test]
    fn foreign_buffer_is_rejected() {
        let mut a1 = arena(1, 8, 2.0);
        let a2 = arena(1, 8, 2.0);
        let foreign = a1.alloc(1).unwrap();
        assert!(!a2.owns(&foreign));
    }

    #[test]
    #[should_panic]
    fn add_ref_on_foreign_buffer_is_fatal() {
        let mut a1 = arena(1, 8, 2.0);
        let mut a2 = arena(1, 8, 2.0);
        let foreign = a1.alloc(1).unwrap();
        a2.add_ref(&foreign);
    }

    #[test]
    fn alloc_loc_returns_a_usable_loc_on_success() {
        let mut a = arena(1, 16, 2.0);
        let loc = a.alloc_loc(4).expect("allocation should succeed");
        assert!(!loc.is_nil());
        assert_eq!(loc.len(), 4);
        assert_eq!(loc.slab_class_idx(), 0);
    }

    #[test]
    fn alloc_loc_is_none_when_too_big() {
        let mut a = arena(1, 16, 2.0);
        assert!(a.alloc_loc(17).is_none());
        let mut stats = HashMap::new();
        a.stats(&mut stats);
        assert_eq!(stats["numTooBigErrs"], 1);
    }

    #[test]
    fn too_big_is_recoverable() {
        let mut a = arena(1, 16, 2.0);
        assert!(a.alloc(17).is_none());
        let mut stats = HashMap::new();
        a.stats(&mut stats);
        assert_eq!(stats["numTooBigErrs"], 1);
    }

    #[test]
    fn backing_allocator_failure_is_recoverable_and_counted() {
        let mut calls = 0;
        let backing: BackingAllocator = Box::new(move |len| {
            calls += 1;
            if calls == 2 {
                None
            } else {
                Some(vec![0u8; len])
            }
        });
        let mut a = Arena::new(1, 8, 2.0, Some(backing)).unwrap();
        assert!(a.alloc(1).is_some()); // first slab in class 0 succeeds
        for _ in 0..7 {
            a.alloc(1).unwrap();
        }
        // class 0 now exhausted (8 chunks given out); next alloc needs a
        // second slab, whose backing call is the failing one.
        assert!(a.alloc(1).is_none());

        let mut stats = HashMap::new();
        a.stats(&mut stats);
        assert_eq!(stats["numAddSlabErrs"], 1);
        assert_eq!(stats["numMallocErrs"], 1);
    }

    #[test]
    fn alloc_zero_is_ours_and_empty() {
        let mut a = arena(1, 8, 2.0);
        let buf = a.alloc(0).unwrap();
        assert_eq!(buf.len(), 0);
        assert!(a.owns(&buf));
    }

    #[test]
    fn alloc_exactly_slab_size_succeeds_and_one_more_fails() {
        let mut a = arena(4, 16, 2.0);
        assert!(a.alloc(16).is_some());
        assert!(a.alloc(17).is_none());
    }

    #[test]
    fn growth_factor_two_doubles() {
        let mut a = arena(1, 4096, 2.0);
        let sizes: Vec<usize> = (0..5)
            .map(|i| {
                let s = 1usize << i;
                let buf = a.alloc(s).unwrap();
                a.classes[buf.loc().slab_class_idx()].chunk_size
            })
            .collect();
        assert_eq!(sizes, vec![1, 2, 4, 8, 16]);
    }
}
