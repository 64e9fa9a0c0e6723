//! Data types shared across the crawler.

pub mod config;
pub mod fingerprint;
pub mod job;
pub mod report;
