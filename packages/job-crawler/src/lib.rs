//! Multi-Board Job Crawler
//!
//! Crawls several job boards for a set of keywords, waits out anti-bot
//! challenges, retries transient failures, memoizes each board's result for
//! the day, and merges everything into one deduplicated record set with a
//! per-board report.
//!
//! # Design
//!
//! - Boards plug in through [`SourceAdapter`]; the orchestrator never branches on board
//! - A board failing degrades the run, it never aborts it
//! - Every wait is bounded and cancellable
//! - The cache is an explicit handle passed into each run
//!
//! # Usage
//!
//! ```rust,ignore
//! use job_crawler::{CrawlConfig, MemoryCache, Orchestrator};
//! use job_crawler::testing::MockBoard;
//!
//! let orchestrator = Orchestrator::new()
//!     .with_adapter(Arc::new(MockBoard::new(JobSource::Fuzu)));
//!
//! let config = CrawlConfig::new()
//!     .with_keywords(["data analyst"])
//!     .with_sources([JobSource::Fuzu]);
//!
//! let output = orchestrator
//!     .run(&config, &MemoryCache::new(), CancellationToken::new())
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (SourceAdapter, JobListing, CacheStore)
//! - [`types`] - Records, configuration, fingerprints and reports
//! - [`orchestrator`] - The run driver
//! - [`challenge`] - Challenge detection and bounded waiting
//! - [`retry`] - Attempt budget and backoff schedule
//! - [`dedup`] - Link-keyed merging
//! - [`normalize`] - Raw entry cleanup and date parsing
//! - [`stores`] - Cache implementations (MemoryCache, FileCache)
//! - [`adapters`] - HTTP board adapters
//! - [`sinks`] - JSON and CSV output
//! - [`testing`] - Mock implementations for testing

pub mod adapters;
pub mod challenge;
pub mod config;
pub mod dedup;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod retry;
pub mod sinks;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{CacheError, ConfigError, FetchError, FetchErrorKind, LayoutError, SinkError};
pub use traits::{
    source::{JobListing, ListingPage, SourceAdapter},
    store::{CacheEntry, CacheStore},
};
pub use types::{
    config::{CachePolicy, ChallengeConfig, CrawlConfig, SCHEMA_VERSION},
    fingerprint::Fingerprint,
    job::{JobRecord, JobSource, RawEntry},
    report::{ErrorTally, RunReport, SourceReport, SourceStatus},
};

pub use challenge::{
    ChallengeDetector, ChallengeHandler, ChallengeOutcome, ChallengeState, MarkerDetector,
    NoChallenge,
};
pub use dedup::{merge, normalize_link, JobSet};
pub use orchestrator::{Orchestrator, RunOutput};
pub use retry::{AttemptOutcome, Backoff, FetchAttempt, RetryDecision, RetryPolicy};

// Re-export implementations
pub use adapters::{BoardDefinition, FieldLayout, FieldRule, HttpBoard};
pub use config::AppConfig;
pub use sinks::{CsvFileSink, JsonFileSink, OutputSink};
pub use stores::{FileCache, MemoryCache};
