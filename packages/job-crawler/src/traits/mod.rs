//! Core trait abstractions for the crawler.
//!
//! These traits define the interfaces that job boards and cache backends
//! implement to plug into the orchestrator.

pub mod source;
pub mod store;
