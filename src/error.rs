//! Typed error kinds for the engine.
//!
//! `OutOfBounds` exists here because `Chunk::get_block`/`set_block` need
//! *some* `Result::Err` to return, but per spec it is local: the residency
//! manager's world-space accessors swallow it with `.ok()`/`.is_ok()` and
//! degrade to "air"/`false`, never propagating past that boundary.
//! `NonResident` has no separate representation for the same reason — a
//! missing chunk at the world accessor already falls through to the same
//! air/false degradation. `BudgetExhausted` is internal to the composer and
//! likewise never constructed here.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("local coordinate ({lx}, {ly}, {lz}) is out of bounds")]
    OutOfBounds { lx: i32, ly: i32, lz: i32 },

    #[error("world '{0}' already exists")]
    WorldAlreadyExists(String),

    #[error("seed mismatch: world '{name}' was created with seed {on_disk}, but {requested} was requested")]
    SeedMismatch { name: String, on_disk: i64, requested: i64 },

    #[error("invalid world name: {0}")]
    InvalidWorldName(String),

    #[error("world '{0}' was not found under {1}")]
    WorldNotFound(String, PathBuf),

    #[error("corrupt region data at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("RON decode failure: {0}")]
    RonDecode(#[from] ron::error::SpannedError),

    #[error("RON encode failure: {0}")]
    RonEncode(#[from] ron::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
