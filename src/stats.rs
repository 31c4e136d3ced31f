//! Global allocator counters.
//!
//! Counters are monotonically increasing and diagnostic only; nothing reads
//! them to make allocation decisions.

#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub num_allocs: i64,
    pub num_add_refs: i64,
    pub num_dec_refs: i64,
    pub num_get_nexts: i64,
    pub num_set_nexts: i64,
    pub num_mallocs: i64,
    pub num_malloc_errs: i64,
    pub num_too_big_errs: i64,
    pub num_add_slab_errs: i64,
    pub num_pop_free_chunk_errs: i64,
}
