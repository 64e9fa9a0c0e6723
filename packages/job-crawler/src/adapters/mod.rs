//! Source adapters for real job boards.
//!
//! Available adapters:
//! - `HttpBoard` - plain HTTP listing scraper driven by a `BoardDefinition`
//!   of CSS selectors, with optional posting-page reads
//!
//! Use `testing::MockBoard` in tests instead of network adapters.

pub mod boards;
pub mod http;

pub use boards::{BoardDefinition, FieldLayout, FieldRule};
pub use http::HttpBoard;
