//! Construction-time error type.
//!
//! Everything past construction either succeeds, reports a recoverable
//! failure through `Option`/`bool` and a counter (see
//! [`crate::stats`]), or is a programming error and aborts via `panic!`
//! with the offending chunk state formatted in. Only parameter validation
//! at `Arena::new` goes through an ordinary `Result`, since there is no
//! Arena yet whose invariants could be corrupted.
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ArenaConfigError {
    #[error("start_chunk_size must be > 0, got {0}")]
    InvalidStartChunkSize(usize),

    #[error("slab_size must be > 0, got {0}")]
    InvalidSlabSize(usize),

    #[error("growth_factor must be > 1.0, got {0}")]
    InvalidGrowthFactor(f64),

    #[error(
        "growth_factor {growth_factor} applied to chunk size {from} does not yield a strictly \
         larger integer chunk size (got {to})"
    )]
    NonMonotonicGrowth {
        from: usize,
        to: usize,
        growth_factor: f64,
    },
}
