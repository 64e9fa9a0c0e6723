use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::config::{CrawlConfig, DEFAULT_WINDOW_DAYS};
use crate::types::job::JobSource;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub keywords: Option<Vec<String>>,
    pub sources: Option<Vec<JobSource>>,
    pub window_days: i64,
    pub run_timeout: Option<Duration>,
    pub requests_per_second: NonZeroU32,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            output_dir: lookup("JOB_CRAWLER_OUTPUT_DIR")
                .unwrap_or_else(|| "output".to_string())
                .into(),
            cache_dir: lookup("JOB_CRAWLER_CACHE_DIR")
                .unwrap_or_else(|| ".job-cache".to_string())
                .into(),
            keywords: lookup("JOB_CRAWLER_KEYWORDS").map(|v| split_list(&v)),
            sources: lookup("JOB_CRAWLER_SOURCES")
                .map(|v| parse_sources(&v))
                .transpose()
                .context("JOB_CRAWLER_SOURCES must list known boards")?,
            window_days: lookup("JOB_CRAWLER_WINDOW_DAYS")
                .map(|v| v.trim().parse::<i64>())
                .transpose()
                .context("JOB_CRAWLER_WINDOW_DAYS must be a whole number of days")?
                .unwrap_or(DEFAULT_WINDOW_DAYS),
            run_timeout: lookup("JOB_CRAWLER_RUN_TIMEOUT_SECS")
                .map(|v| v.trim().parse::<u64>().map(Duration::from_secs))
                .transpose()
                .context("JOB_CRAWLER_RUN_TIMEOUT_SECS must be a number of seconds")?,
            requests_per_second: lookup("JOB_CRAWLER_REQUESTS_PER_SECOND")
                .map(|v| v.trim().parse::<NonZeroU32>())
                .transpose()
                .context("JOB_CRAWLER_REQUESTS_PER_SECOND must be a positive number")?
                .unwrap_or(NonZeroU32::MIN),
        })
    }

    /// The crawl configuration these settings describe, on top of the defaults.
    pub fn crawl_config(&self) -> CrawlConfig {
        let mut config = CrawlConfig::default().with_window_days(self.window_days);
        if let Some(keywords) = &self.keywords {
            config = config.with_keywords(keywords.iter().cloned());
        }
        if let Some(sources) = &self.sources {
            config = config.with_sources(sources.iter().copied());
        }
        if let Some(timeout) = self.run_timeout {
            config = config.with_run_timeout(timeout);
        }
        config
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn parse_sources(value: &str) -> Result<Vec<JobSource>> {
    split_list(value)
        .iter()
        .map(|s| s.parse::<JobSource>().map_err(anyhow::Error::from))
        .collect()
}
