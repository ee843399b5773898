// src/cache/mod.rs

//! Change detection for forward actions.
//!
//! - [`hash`] computes a content digest of a dependency's directory.
//! - [`store`] remembers, per dependency ID, the digest recorded after the
//!   last successful run.

pub mod hash;
pub mod store;

pub use hash::{compute_file_hash, hash_directory, HashExcludes, ALWAYS_EXCLUDED_DIRS};
pub use store::{
    open_store, FileHashStore, HashStore, MemoryHashStore, SharedHashStore, CACHE_FILE_PATH,
};
