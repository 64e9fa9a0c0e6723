//! Crawl orchestration.
//!
//! For every configured source the orchestrator computes the cache
//! fingerprint, serves a same-day hit straight from the [`CacheStore`], and
//! otherwise walks each keyword's listing page by page through the challenge
//! handler and the retry policy. Sources run concurrently up to
//! `CrawlConfig::concurrency`; pages within one keyword stream are strictly
//! sequential. One source failing never stops the others.
//!
//! # Example
//!
//! ```rust,ignore
//! use job_crawler::{Orchestrator, CrawlConfig, MemoryCache};
//! use tokio_util::sync::CancellationToken;
//!
//! let orchestrator = Orchestrator::new().with_adapter(Arc::new(board));
//! let output = orchestrator
//!     .run(&CrawlConfig::default(), &MemoryCache::new(), CancellationToken::new())
//!     .await?;
//!
//! for source in &output.report.sources {
//!     println!("{}: {:?}", source.source, source.status);
//! }
//! ```

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::challenge::{ChallengeDetector, ChallengeHandler, ChallengeOutcome};
use crate::dedup::{self, JobSet};
use crate::error::{ConfigError, FetchError, FetchErrorKind};
use crate::normalize::{self, Recency};
use crate::retry::{backoff_sleep, AttemptOutcome, FetchAttempt, RetryDecision};
use crate::traits::source::{JobListing, ListingPage, SourceAdapter};
use crate::traits::store::{CacheEntry, CacheStore};
use crate::types::{
    config::CrawlConfig,
    fingerprint::Fingerprint,
    job::{JobRecord, JobSource, RawEntry},
    report::{RunReport, SourceReport, SourceStatus},
};

/// The deduplicated records of a run and its report.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub records: JobSet,
    pub report: RunReport,
}

/// Drives sources, cache and dedup for one run at a time.
#[derive(Default)]
pub struct Orchestrator {
    adapters: HashMap<JobSource, Arc<dyn SourceAdapter>>,
}

/// How one keyword stream ended.
enum StreamEnd {
    /// Ran out of pages, hit the cutoff or the page limit.
    Completed,
    /// A retryable failure used up the attempt budget, or an unclassified error.
    Failed(FetchErrorKind),
    /// The source refused service.
    Fatal(FetchError),
    Cancelled,
}

/// How one page fetch ended after retries.
enum PageFetch {
    Page(ListingPage),
    /// Parse error: skip the page and move on.
    Skip(FetchError),
    Failed(FetchErrorKind),
    Fatal(FetchError),
    Cancelled,
}

struct SourceRun {
    report: SourceReport,
    records: Vec<JobRecord>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. A later adapter for the same source replaces the earlier one.
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.source(), adapter);
        self
    }

    pub fn with_adapters(self, adapters: impl IntoIterator<Item = Arc<dyn SourceAdapter>>) -> Self {
        adapters.into_iter().fold(self, Self::with_adapter)
    }

    /// Run every configured source and merge the results.
    ///
    /// Only an invalid configuration is an error. Source failures, cache
    /// failures and cancellation all end in a report.
    pub async fn run(
        &self,
        config: &CrawlConfig,
        cache: &dyn CacheStore,
        cancel: CancellationToken,
    ) -> Result<RunOutput, ConfigError> {
        config.validate()?;
        let mut selected = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            match self.adapters.get(source) {
                Some(adapter) => selected.push(adapter.clone()),
                None => {
                    return Err(ConfigError::Invalid {
                        reason: format!("no adapter registered for source {source}"),
                    })
                }
            }
        }

        let cancel = cancel.child_token();
        let timer = config.run_timeout.map(|timeout| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        warn!(timeout_secs = timeout.as_secs(), "Run timeout reached, cancelling");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let mut report = RunReport::new(config.today);
        let handler = ChallengeHandler::new(config.challenge.clone());

        info!(
            run_id = %report.run_id,
            sources = config.sources.len(),
            keywords = config.keywords.len(),
            cutoff = %config.cutoff,
            cache_policy = ?config.cache_policy,
            "Starting crawl run"
        );

        let handler = &handler;
        let cancel_ref = &cancel;
        let mut runs: Vec<(usize, SourceRun)> = stream::iter(selected.iter().enumerate())
            .map(|(index, adapter)| async move {
                let run = self
                    .run_source(adapter.as_ref(), config, cache, handler, cancel_ref)
                    .await;
                (index, run)
            })
            .buffer_unordered(config.concurrency)
            .collect()
            .await;

        if let Some(timer) = timer {
            timer.abort();
        }

        runs.sort_by_key(|(index, _)| *index);

        let mut all_records = Vec::new();
        for (_, run) in runs {
            all_records.extend(run.records);
            report.sources.push(run.report);
        }

        let records = dedup::merge(all_records);
        report.total_records = records.len();
        report.duplicates_merged = records.duplicates_merged();
        report.cancelled = report
            .sources
            .iter()
            .any(|s| s.last_error_kind == Some(FetchErrorKind::Cancelled));
        report.finished_at = Utc::now();

        info!(
            run_id = %report.run_id,
            total_records = report.total_records,
            duplicates_merged = report.duplicates_merged,
            statuses = ?report.status_counts(),
            cancelled = report.cancelled,
            "Crawl run finished"
        );

        Ok(RunOutput { records, report })
    }

    async fn run_source(
        &self,
        adapter: &dyn SourceAdapter,
        config: &CrawlConfig,
        cache: &dyn CacheStore,
        handler: &ChallengeHandler,
        cancel: &CancellationToken,
    ) -> SourceRun {
        let source = adapter.source();
        let mut report = SourceReport::new(source);

        if cancel.is_cancelled() {
            report.status = SourceStatus::Failed;
            report.last_error_kind = Some(FetchErrorKind::Cancelled);
            return SourceRun {
                report,
                records: Vec::new(),
            };
        }

        let fingerprint =
            Fingerprint::compute(&config.keywords, source, &config.schema_version, config.today);

        if config.cache_policy.reads() {
            if let Some(records) = lookup_cache(cache, &fingerprint, config, source).await {
                return SourceRun {
                    report: SourceReport::from_cache(source, records.len()),
                    records,
                };
            }
        }

        info!(source = %source, fingerprint = %fingerprint.short(), "Fetching source");

        let detector = adapter.detector();
        let mut gathered = JobSet::new();
        let mut fatal = false;
        let mut cancelled = false;

        for keyword in &config.keywords {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let end = self
                .run_keyword(
                    adapter,
                    detector.as_ref(),
                    keyword,
                    config,
                    handler,
                    cancel,
                    &mut report,
                    &mut gathered,
                )
                .await;

            match end {
                StreamEnd::Completed => {
                    report.keywords_completed += 1;
                }
                StreamEnd::Failed(kind) => {
                    warn!(source = %source, keyword = %keyword, kind = %kind, "Keyword stream failed");
                    report.keywords_failed += 1;
                    report.last_error_kind = Some(kind);
                }
                StreamEnd::Fatal(e) => {
                    error!(source = %source, keyword = %keyword, error = %e, "Source failed, skipping its remaining keywords");
                    report.keywords_failed += 1;
                    report.last_error_kind = Some(FetchErrorKind::Fatal);
                    fatal = true;
                    break;
                }
                StreamEnd::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
        }

        let records = gathered.into_records();
        report.record_count = records.len();
        report.status = if cancelled {
            report.last_error_kind = Some(FetchErrorKind::Cancelled);
            if records.is_empty() {
                SourceStatus::Failed
            } else {
                SourceStatus::Partial
            }
        } else if fatal {
            SourceStatus::Failed
        } else if report.keywords_failed == 0 {
            SourceStatus::Success
        } else if report.keywords_completed > 0 {
            SourceStatus::Partial
        } else {
            SourceStatus::Failed
        };

        if report.status == SourceStatus::Success && config.cache_policy.writes() {
            let entry = CacheEntry::new(fingerprint.clone(), config.today, records.clone());
            match cache.save(&fingerprint, &entry).await {
                Ok(()) => report.cache_written = true,
                Err(e) => {
                    warn!(source = %source, fingerprint = %fingerprint.short(), error = %e, "Cache write failed");
                }
            }
        }

        info!(
            source = %source,
            status = ?report.status,
            records = report.record_count,
            pages = report.pages_fetched,
            retries = report.errors.retries,
            challenges = report.errors.challenges,
            "Source finished"
        );

        SourceRun { report, records }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_keyword(
        &self,
        adapter: &dyn SourceAdapter,
        detector: &dyn ChallengeDetector,
        keyword: &str,
        config: &CrawlConfig,
        handler: &ChallengeHandler,
        cancel: &CancellationToken,
        report: &mut SourceReport,
        gathered: &mut JobSet,
    ) -> StreamEnd {
        let source = adapter.source();
        let mut listing = match adapter.open(keyword) {
            Ok(listing) => listing,
            Err(e) if e.kind() == FetchErrorKind::Fatal => return StreamEnd::Fatal(e),
            Err(e) => {
                warn!(source = %source, keyword = %keyword, error = %e, "Could not open listing");
                return StreamEnd::Failed(e.kind());
            }
        };

        let mut kept = 0usize;
        loop {
            let page_number = listing.page_number();
            if page_number > config.max_pages {
                debug!(source = %source, keyword = %keyword, max_pages = config.max_pages, "Page limit reached");
                break;
            }
            if cancel.is_cancelled() {
                return StreamEnd::Cancelled;
            }

            let page = match fetch_page(listing.as_mut(), detector, config, handler, cancel, report).await {
                PageFetch::Page(page) => page,
                PageFetch::Skip(e) => {
                    warn!(source = %source, keyword = %keyword, page = page_number, error = %e, "Skipping unreadable page");
                    report.errors.pages_skipped += 1;
                    listing.advance();
                    continue;
                }
                PageFetch::Failed(kind) => return StreamEnd::Failed(kind),
                PageFetch::Fatal(e) => return StreamEnd::Fatal(e),
                PageFetch::Cancelled => return StreamEnd::Cancelled,
            };
            report.pages_fetched += 1;

            let mut records = Vec::with_capacity(page.entries.len());
            for entry in &page.entries {
                match normalize::to_record(entry, source, &page.url, config.today) {
                    Ok(record) => records.push((entry, record)),
                    Err(e) => {
                        debug!(source = %source, page = page_number, error = %e, "Skipping entry");
                        report.errors.records_skipped += 1;
                    }
                }
            }

            let newest = records.iter().filter_map(|(_, r)| r.date_posted).max();
            if let Some(newest) = newest.filter(|newest| *newest < config.cutoff) {
                debug!(
                    source = %source,
                    keyword = %keyword,
                    page = page_number,
                    newest = %newest,
                    "Page older than cutoff, stopping pagination"
                );
                break;
            }

            let found = records.len();
            for (entry, mut record) in records {
                if !normalize::is_relevant(&record.title, keyword, &config.relevance_terms) {
                    continue;
                }
                if normalize::recency(&record, config.cutoff, config.today, config.drop_expired)
                    != Recency::Keep
                {
                    continue;
                }
                if !gathered.contains_link(&record.link) {
                    let filled = read_detail(
                        adapter, detector, entry, record, config, handler, cancel, report,
                    )
                    .await;
                    record = match filled {
                        Ok(record) => record,
                        Err(end) => return end,
                    };
                    // The posting page may carry the first real date.
                    if normalize::recency(&record, config.cutoff, config.today, config.drop_expired)
                        != Recency::Keep
                    {
                        continue;
                    }
                }
                gathered.insert(record);
                kept += 1;
            }

            debug!(
                source = %source,
                keyword = %keyword,
                page = page_number,
                found,
                has_next = page.has_next,
                "Page processed"
            );

            if !page.has_next {
                break;
            }
            listing.advance();
        }

        info!(source = %source, keyword = %keyword, kept, "Keyword stream complete");
        StreamEnd::Completed
    }
}

/// Consult the cache. Any read problem counts as a miss.
async fn lookup_cache(
    cache: &dyn CacheStore,
    fingerprint: &Fingerprint,
    config: &CrawlConfig,
    source: JobSource,
) -> Option<Vec<JobRecord>> {
    match cache.load(fingerprint).await {
        Ok(Some(entry)) if entry.is_valid_for(fingerprint, config.today) => {
            info!(
                source = %source,
                fingerprint = %fingerprint.short(),
                records = entry.records.len(),
                "Cache hit"
            );
            Some(entry.records)
        }
        Ok(Some(entry)) => {
            debug!(
                source = %source,
                captured_on = %entry.captured_on,
                "Cached entry does not match this run"
            );
            None
        }
        Ok(None) => {
            debug!(source = %source, fingerprint = %fingerprint.short(), "Cache miss");
            None
        }
        Err(e) => {
            warn!(source = %source, error = %e, "Cache read failed, fetching instead");
            None
        }
    }
}

/// Fill a record from its posting page when the board has one.
///
/// A posting page that cannot be read leaves the record as the result page
/// showed it. Only a fatal error or cancellation ends the keyword stream.
#[allow(clippy::too_many_arguments)]
async fn read_detail(
    adapter: &dyn SourceAdapter,
    detector: &dyn ChallengeDetector,
    entry: &RawEntry,
    record: JobRecord,
    config: &CrawlConfig,
    handler: &ChallengeHandler,
    cancel: &CancellationToken,
    report: &mut SourceReport,
) -> Result<JobRecord, StreamEnd> {
    let mut entry = entry.clone();
    entry.link = record.link.clone();
    let Some(mut listing) = adapter.open_detail(&entry) else {
        return Ok(record);
    };

    let source = record.source;
    match fetch_page(listing.as_mut(), detector, config, handler, cancel, report).await {
        PageFetch::Page(page) => {
            report.details_fetched += 1;
            let filled = page
                .entries
                .first()
                .map(|filled| normalize::to_record(filled, source, &record.link, config.today));
            match filled {
                Some(Ok(filled)) => Ok(filled),
                Some(Err(e)) => {
                    debug!(source = %source, link = %record.link, error = %e, "Posting page unusable");
                    report.errors.details_skipped += 1;
                    Ok(record)
                }
                None => {
                    debug!(source = %source, link = %record.link, "Posting page had no entry");
                    report.errors.details_skipped += 1;
                    Ok(record)
                }
            }
        }
        PageFetch::Skip(e) => {
            debug!(source = %source, link = %record.link, error = %e, "Posting page unreadable, keeping result card");
            report.errors.details_skipped += 1;
            Ok(record)
        }
        PageFetch::Failed(kind) => {
            warn!(source = %source, link = %record.link, kind = %kind, "Posting page failed, keeping result card");
            report.errors.details_skipped += 1;
            Ok(record)
        }
        PageFetch::Fatal(e) => Err(StreamEnd::Fatal(e)),
        PageFetch::Cancelled => Err(StreamEnd::Cancelled),
    }
}

/// Fetch the listing's current page under the challenge guard and retry policy.
async fn fetch_page(
    listing: &mut dyn JobListing,
    detector: &dyn ChallengeDetector,
    config: &CrawlConfig,
    handler: &ChallengeHandler,
    cancel: &CancellationToken,
    report: &mut SourceReport,
) -> PageFetch {
    let mut attempts: Vec<FetchAttempt> = Vec::new();

    loop {
        let number = attempts.len() as u32 + 1;
        let started = Instant::now();
        let guarded = handler
            .fetch_with_challenge_guard(listing, detector, cancel)
            .await;
        if guarded.challenged {
            report.errors.challenges += 1;
        }

        let (outcome, kind, failure) = match guarded.outcome {
            ChallengeOutcome::Resolved(page) => return PageFetch::Page(page),
            ChallengeOutcome::Cancelled => return PageFetch::Cancelled,
            ChallengeOutcome::TimedOut => (
                AttemptOutcome::ChallengeTimeout,
                FetchErrorKind::ChallengeTimeout,
                None,
            ),
            ChallengeOutcome::Error(e) => {
                let kind = e.kind();
                match AttemptOutcome::from_kind(kind) {
                    Some(outcome) => (outcome, kind, Some(e)),
                    None if kind == FetchErrorKind::Parse => return PageFetch::Skip(e),
                    None => {
                        warn!(page = listing.page_number(), error = %e, "Unclassified fetch error");
                        return PageFetch::Failed(kind);
                    }
                }
            }
        };

        let attempt = FetchAttempt::new(number, outcome, started.elapsed());
        attempts.push(attempt);

        match config.retry.decide(&attempt) {
            // Only a successful attempt is done, and those return above.
            RetryDecision::Done => return PageFetch::Failed(kind),
            RetryDecision::RetryAfter(delay) => {
                report.errors.retries += 1;
                warn!(
                    page = listing.page_number(),
                    attempt = number,
                    kind = %kind,
                    delay_ms = delay.as_millis() as u64,
                    "Fetch attempt failed, retrying"
                );
                if !backoff_sleep(delay, cancel).await {
                    return PageFetch::Cancelled;
                }
            }
            RetryDecision::Exhausted => {
                let waited: std::time::Duration = attempts.iter().map(|a| a.elapsed).sum();
                warn!(
                    page = listing.page_number(),
                    attempts = attempts.len(),
                    kind = %kind,
                    elapsed_ms = waited.as_millis() as u64,
                    "Retry budget exhausted"
                );
                return PageFetch::Failed(kind);
            }
            RetryDecision::Abort => {
                return PageFetch::Fatal(
                    failure.unwrap_or_else(|| FetchError::fatal(format!("{kind} failure"))),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::stores::MemoryCache;
    use crate::testing::{page_of, MockBoard, ScriptStep};
    use crate::types::config::{CachePolicy, ChallengeConfig};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 28).unwrap()
    }

    fn config(sources: &[JobSource]) -> CrawlConfig {
        CrawlConfig::new()
            .with_keywords(["data"])
            .with_sources(sources.iter().copied())
            .with_today(today())
            .with_cutoff(NaiveDate::from_ymd_opt(2025, 7, 25).unwrap())
            .without_relevance_filter()
            .with_retry(
                RetryPolicy::new(3)
                    .with_base_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(4)),
            )
            .with_challenge(ChallengeConfig::new(
                Duration::from_secs(2),
                Duration::from_secs(10),
            ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_then_succeeds() {
        let board = Arc::new(MockBoard::new(JobSource::Fuzu).with_steps(
            "data",
            1,
            vec![
                ScriptStep::Fail(FetchErrorKind::Network),
                ScriptStep::Fail(FetchErrorKind::Network),
                ScriptStep::Page(page_of("https://fuzu.example", &[("Data Analyst", "2025-07-27")])),
            ],
        ));
        let orchestrator = Orchestrator::new().with_adapter(board.clone());

        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert_eq!(report.status, SourceStatus::Success);
        assert_eq!(report.errors.retries, 2);
        assert_eq!(output.records.len(), 1);
        assert_eq!(board.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_source() {
        let board = Arc::new(MockBoard::new(JobSource::Fuzu).failing_with(FetchErrorKind::Network));
        let orchestrator = Orchestrator::new().with_adapter(board.clone());

        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert_eq!(report.status, SourceStatus::Failed);
        assert_eq!(report.last_error_kind, Some(FetchErrorKind::Network));
        assert_eq!(board.fetch_count(), 3);
        assert!(!report.cache_written);
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_timeout_is_retried() {
        let board = Arc::new(MockBoard::new(JobSource::Fuzu).with_steps(
            "data",
            1,
            vec![ScriptStep::Challenge],
        ));
        let orchestrator = Orchestrator::new().with_adapter(board);

        let started = Instant::now();
        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert_eq!(report.status, SourceStatus::Failed);
        assert_eq!(report.last_error_kind, Some(FetchErrorKind::ChallengeTimeout));
        assert_eq!(report.errors.challenges, 3);
        // Three 10s waits plus 1s and 2s of backoff.
        assert_eq!(started.elapsed(), Duration::from_secs(33));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_error_skips_page() {
        let board = Arc::new(
            MockBoard::new(JobSource::Fuzu)
                .with_steps("data", 1, vec![ScriptStep::Fail(FetchErrorKind::Parse)])
                .with_steps(
                    "data",
                    2,
                    vec![ScriptStep::Page(page_of(
                        "https://fuzu.example",
                        &[("Data Engineer", "2025-07-26")],
                    ))],
                ),
        );
        let orchestrator = Orchestrator::new().with_adapter(board.clone());

        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert_eq!(report.status, SourceStatus::Success);
        assert_eq!(report.errors.pages_skipped, 1);
        assert_eq!(report.errors.retries, 0);
        assert_eq!(output.records.len(), 1);
    }

    #[tokio::test]
    async fn test_posting_pages_fill_record_fields() {
        let link = "https://fuzu.example/job/data-analyst";
        let board = Arc::new(
            MockBoard::new(JobSource::Fuzu)
                .with_page("data", page_of("https://fuzu.example", &[("Data Analyst", "2025-07-27")]))
                .with_detail(
                    link,
                    RawEntry::default()
                        .with_date_expires("2025-08-12")
                        .with_qualification("BSc Statistics")
                        .with_experience("3 years")
                        .with_location("Nairobi"),
                ),
        );
        let orchestrator = Orchestrator::new().with_adapter(board.clone());

        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        let record = output.records.get(link).unwrap();
        assert_eq!(record.date_posted, NaiveDate::from_ymd_opt(2025, 7, 27));
        assert_eq!(record.date_expires, NaiveDate::from_ymd_opt(2025, 8, 12));
        assert_eq!(record.qualification.as_deref(), Some("BSc Statistics"));
        assert_eq!(record.years_of_experience.as_deref(), Some("3 years"));
        assert_eq!(record.location.as_deref(), Some("Nairobi"));

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert_eq!(report.details_fetched, 1);
        assert_eq!(board.detail_fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_posting_page_challenge_is_waited_out() {
        let link = "https://fuzu.example/job/data-analyst";
        let board = Arc::new(
            MockBoard::new(JobSource::Fuzu)
                .with_page("data", page_of("https://fuzu.example", &[("Data Analyst", "2025-07-27")]))
                .with_detail_steps(
                    link,
                    vec![
                        ScriptStep::Challenge,
                        ScriptStep::Challenge,
                        ScriptStep::Page(
                            ListingPage::new(link, 1)
                                .with_status(200)
                                .with_body("<article></article>")
                                .with_entry(RawEntry::default().with_location("Kisumu")),
                        ),
                    ],
                ),
        );
        let orchestrator = Orchestrator::new().with_adapter(board.clone());

        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert_eq!(report.status, SourceStatus::Success);
        assert_eq!(report.errors.challenges, 1);
        assert_eq!(report.errors.retries, 0);
        assert_eq!(board.detail_fetch_count(), 3);
        assert_eq!(output.records.get(link).unwrap().location.as_deref(), Some("Kisumu"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_posting_page_keeps_result_card() {
        let link = "https://fuzu.example/job/data-analyst";
        let board = Arc::new(
            MockBoard::new(JobSource::Fuzu)
                .with_page("data", page_of("https://fuzu.example", &[("Data Analyst", "2025-07-27")]))
                .with_detail_steps(link, vec![ScriptStep::Fail(FetchErrorKind::Network)]),
        );
        let orchestrator = Orchestrator::new().with_adapter(board.clone());

        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert_eq!(report.status, SourceStatus::Success);
        assert_eq!(report.errors.details_skipped, 1);
        assert_eq!(report.errors.retries, 2);
        assert_eq!(board.detail_fetch_count(), 3);

        let record = output.records.get(link).unwrap();
        assert_eq!(record.date_posted, NaiveDate::from_ymd_opt(2025, 7, 27));
        assert!(record.location.is_none());
    }

    #[tokio::test]
    async fn test_posting_pages_skipped_past_cutoff() {
        let board = Arc::new(
            MockBoard::new(JobSource::Fuzu)
                .with_page("data", page_of("https://fuzu.example", &[("Data Analyst", "2025-07-01")]))
                .with_detail(
                    "https://fuzu.example/job/data-analyst",
                    RawEntry::default().with_location("Nairobi"),
                ),
        );
        let orchestrator = Orchestrator::new().with_adapter(board.clone());

        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        assert!(output.records.is_empty());
        assert_eq!(board.detail_fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let pages = (0..8)
            .map(|i| page_of("https://fuzu.example", &[(&*format!("Data Role {i}"), "2025-07-28")]))
            .collect();
        let board = Arc::new(MockBoard::new(JobSource::Fuzu).with_listing("data", pages));
        let orchestrator = Orchestrator::new().with_adapter(board.clone());

        let output = orchestrator
            .run(
                &config(&[JobSource::Fuzu]).with_max_pages(3),
                &MemoryCache::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(output.records.len(), 3);
        assert_eq!(board.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_relevance_and_expiry_filters() {
        let page = page_of(
            "https://fuzu.example",
            &[("Data Analyst", "2025-07-28"), ("Sales Executive", "2025-07-28")],
        );
        let mut expired = page_of("https://fuzu.example", &[("Statistician", "2025-07-27")]);
        expired.entries[0].date_expires = Some("2025-07-27".to_string());
        let mut page = page;
        page.entries.extend(expired.entries);

        let board = Arc::new(MockBoard::new(JobSource::Fuzu).with_page("data", page));
        let orchestrator = Orchestrator::new().with_adapter(board);

        let config = config(&[JobSource::Fuzu]).with_relevance_terms(["statistician"]);
        let output = orchestrator
            .run(&config, &MemoryCache::new(), CancellationToken::new())
            .await
            .unwrap();

        let titles: Vec<_> = output.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Data Analyst"]);
    }

    #[tokio::test]
    async fn test_missing_adapter_rejected() {
        let orchestrator = Orchestrator::new();
        let result = orchestrator
            .run(&config(&[JobSource::Fuzu]), &MemoryCache::new(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_rejected_before_fetching() {
        let board = Arc::new(MockBoard::new(JobSource::Fuzu).with_steps(
            "data",
            1,
            vec![ScriptStep::Challenge],
        ));
        let orchestrator = Orchestrator::new().with_adapter(board.clone());
        let config = config(&[JobSource::Fuzu]).with_challenge(ChallengeConfig::new(
            Duration::ZERO,
            Duration::from_millis(200),
        ));

        let result = orchestrator
            .run(&config, &MemoryCache::new(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        assert_eq!(board.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_policy_ignores_cache_but_writes() {
        let board = Arc::new(MockBoard::new(JobSource::Fuzu).with_page(
            "data",
            page_of("https://fuzu.example", &[("Data Analyst", "2025-07-28")]),
        ));
        let orchestrator = Orchestrator::new().with_adapter(board.clone());
        let cache = MemoryCache::new();
        let config = config(&[JobSource::Fuzu]);

        orchestrator.run(&config, &cache, CancellationToken::new()).await.unwrap();
        let refreshed = config.clone().with_cache_policy(CachePolicy::Refresh);
        let output = orchestrator.run(&refreshed, &cache, CancellationToken::new()).await.unwrap();

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert!(!report.cache_hit);
        assert!(report.cache_written);
        assert_eq!(board.fetch_count(), 2);
        assert_eq!(cache.save_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_fail_source() {
        let board = Arc::new(MockBoard::new(JobSource::Fuzu).with_page(
            "data",
            page_of("https://fuzu.example", &[("Data Analyst", "2025-07-28")]),
        ));
        let orchestrator = Orchestrator::new().with_adapter(board);
        let cache = MemoryCache::new().with_failing_saves();

        let output = orchestrator
            .run(&config(&[JobSource::Fuzu]), &cache, CancellationToken::new())
            .await
            .unwrap();

        let report = output.report.source(JobSource::Fuzu).unwrap();
        assert_eq!(report.status, SourceStatus::Success);
        assert!(!report.cache_written);
        assert_eq!(output.records.len(), 1);
    }
}
