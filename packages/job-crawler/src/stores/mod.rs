//! Cache store implementations.
//!
//! Available backends:
//! - `MemoryCache` - In-memory storage for tests and single-process runs
//! - `FileCache` - One JSON file per fingerprint under a directory

pub mod file;
pub mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;
