//! Configuration types for a crawl run.

use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::types::job::JobSource;

/// Bumped whenever the record layout or extraction rules change, which
/// invalidates every cached result.
pub const SCHEMA_VERSION: &str = "19.0";

/// Default search keywords.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "data",
    "officer",
    "monitoring",
    "data analyst",
    "data analysis",
    "data science",
    "data scientist",
    "data engineer",
    "data analytics",
    "business intelligence",
    "statistics",
    "statistician",
];

/// Title terms that make a listing relevant regardless of the keyword that found it.
pub const DEFAULT_RELEVANCE_TERMS: &[&str] = &[
    "data analyst",
    "data analysis",
    "statistics",
    "statistician",
    "business intelligence",
    "data analytics",
    "analytics",
    "data science",
    "data scientist",
    "quantitative",
    "research analyst",
    "economic analyst",
    "monitoring and evaluation",
    "m&e",
    "data engineer",
    "sql",
    "python",
    "tableau",
    "power bi",
    "spss",
    "database",
    "data warehousing",
    "etl",
    "big data",
    "data visualization",
    "dashboard",
    "reporting",
    "machine learning",
    "predictive modeling",
    "data mining",
    "financial modeling",
    "healthcare analytics",
    "clinical data management",
];

/// Default recency window: postings older than this many days are cut off.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// How the orchestrator uses the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Serve valid entries and write fresh results through.
    #[default]
    ReadWrite,
    /// Ignore existing entries but still write fresh results through.
    Refresh,
    /// Never read or write.
    Disabled,
}

impl CachePolicy {
    pub fn reads(&self) -> bool {
        matches!(self, CachePolicy::ReadWrite)
    }

    pub fn writes(&self) -> bool {
        !matches!(self, CachePolicy::Disabled)
    }
}

/// Bounds for waiting out an anti-automation challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Delay between re-reads of a challenged page.
    pub poll_interval: Duration,

    /// Total time to wait for a challenge to clear before giving up.
    pub max_wait: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_wait: Duration::from_secs(45),
        }
    }
}

impl ChallengeConfig {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }

    /// Both bounds must be positive and a poll must fit inside the wait.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                reason: "challenge poll_interval must be positive".to_string(),
            });
        }
        if self.max_wait.is_zero() {
            return Err(ConfigError::Invalid {
                reason: "challenge max_wait must be positive".to_string(),
            });
        }
        if self.poll_interval > self.max_wait {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "challenge poll_interval {:?} exceeds max_wait {:?}",
                    self.poll_interval, self.max_wait
                ),
            });
        }
        Ok(())
    }
}

/// Everything that shapes one crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Search keywords, normalized to trimmed lowercase.
    pub keywords: BTreeSet<String>,

    /// Boards to crawl, in report order.
    pub sources: Vec<JobSource>,

    pub cache_policy: CachePolicy,

    pub retry: RetryPolicy,

    pub challenge: ChallengeConfig,

    /// The run's calendar date (cache validity and relative dates).
    pub today: NaiveDate,

    /// Postings dated before this are not collected, and pagination stops
    /// at the first page whose newest posting is older.
    pub cutoff: NaiveDate,

    pub schema_version: String,

    /// Safety limit on pages per (source, keyword) stream.
    pub max_pages: u32,

    /// Sources crawled at the same time.
    pub concurrency: usize,

    /// Overall deadline; reaching it cancels the run.
    pub run_timeout: Option<Duration>,

    /// Title terms for the relevance filter. Empty disables the filter.
    #[serde(default)]
    pub relevance_terms: Vec<String>,

    /// Drop postings whose deadline is before `today`.
    pub drop_expired: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let today = Local::now().date_naive();
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            sources: JobSource::ALL.to_vec(),
            cache_policy: CachePolicy::default(),
            retry: RetryPolicy::default(),
            challenge: ChallengeConfig::default(),
            today,
            cutoff: today - ChronoDuration::days(DEFAULT_WINDOW_DAYS),
            schema_version: SCHEMA_VERSION.to_string(),
            max_pages: 5,
            concurrency: 2,
            run_timeout: None,
            relevance_terms: DEFAULT_RELEVANCE_TERMS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            drop_expired: true,
        }
    }
}

impl CrawlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the keyword set.
    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.into().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    /// Replace the source list. Duplicates are dropped, first occurrence wins.
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = JobSource>) -> Self {
        let mut seen = BTreeSet::new();
        self.sources = sources.into_iter().filter(|s| seen.insert(*s)).collect();
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_challenge(mut self, challenge: ChallengeConfig) -> Self {
        self.challenge = challenge;
        self
    }

    /// Set the run date, keeping the cutoff the same number of days back.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        let window = self.today - self.cutoff;
        self.today = today;
        self.cutoff = today - window;
        self
    }

    pub fn with_cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Set the cutoff as a window of days before `today`.
    pub fn with_window_days(mut self, days: i64) -> Self {
        self.cutoff = self.today - ChronoDuration::days(days);
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_relevance_terms(
        mut self,
        terms: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.relevance_terms = terms.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    /// Turn off the relevance filter.
    pub fn without_relevance_filter(mut self) -> Self {
        self.relevance_terms.clear();
        self
    }

    pub fn with_drop_expired(mut self, drop_expired: bool) -> Self {
        self.drop_expired = drop_expired;
        self
    }

    /// Reject configurations the orchestrator cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keywords.is_empty() {
            return Err(ConfigError::EmptyKeywords);
        }
        if self.sources.is_empty() {
            return Err(ConfigError::EmptySources);
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_pages must be at least 1".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                reason: "concurrency must be at least 1".to_string(),
            });
        }
        if self.cutoff > self.today {
            return Err(ConfigError::Invalid {
                reason: format!("cutoff {} is after today {}", self.cutoff, self.today),
            });
        }
        self.retry.validate()?;
        self.challenge.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CrawlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 5);
        assert_eq!(config.today - config.cutoff, ChronoDuration::days(7));
        assert_eq!(config.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_keywords_are_normalized() {
        let config = CrawlConfig::new().with_keywords(["  Data Analyst", "DATA analyst", ""]);
        assert_eq!(config.keywords.len(), 1);
        assert!(config.keywords.contains("data analyst"));
    }

    #[test]
    fn test_empty_sets_rejected() {
        let no_keywords = CrawlConfig::new().with_keywords(Vec::<String>::new());
        assert!(matches!(no_keywords.validate(), Err(ConfigError::EmptyKeywords)));

        let no_sources = CrawlConfig::new().with_sources([]);
        assert!(matches!(no_sources.validate(), Err(ConfigError::EmptySources)));
    }

    #[test]
    fn test_duplicate_sources_dropped() {
        let config =
            CrawlConfig::new().with_sources([JobSource::Fuzu, JobSource::MyJobMag, JobSource::Fuzu]);
        assert_eq!(config.sources, vec![JobSource::Fuzu, JobSource::MyJobMag]);
    }

    #[test]
    fn test_with_today_keeps_window() {
        let config = CrawlConfig::new()
            .with_today(date(2025, 7, 28))
            .with_window_days(3);
        assert_eq!(config.cutoff, date(2025, 7, 25));

        let moved = config.with_today(date(2025, 8, 1));
        assert_eq!(moved.cutoff, date(2025, 7, 29));
    }

    #[test]
    fn test_cutoff_after_today_rejected() {
        let config = CrawlConfig::new()
            .with_today(date(2025, 7, 28))
            .with_cutoff(date(2025, 7, 29));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_challenge_bounds_validated() {
        let config = |poll: u64, max: u64| {
            CrawlConfig::new().with_challenge(ChallengeConfig::new(
                Duration::from_millis(poll),
                Duration::from_millis(max),
            ))
        };

        assert!(config(2_000, 30_000).validate().is_ok());
        assert!(config(30_000, 30_000).validate().is_ok());
        assert!(matches!(config(0, 200).validate(), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(1_000, 0).validate(), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(5_000, 4_000).validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_cache_policy_flags() {
        assert!(CachePolicy::ReadWrite.reads() && CachePolicy::ReadWrite.writes());
        assert!(!CachePolicy::Refresh.reads() && CachePolicy::Refresh.writes());
        assert!(!CachePolicy::Disabled.reads() && !CachePolicy::Disabled.writes());
    }
}
