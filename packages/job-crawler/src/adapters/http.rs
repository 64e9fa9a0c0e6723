//! HTTP listing scraper.
//!
//! Fetches a board's search result pages with `reqwest`, rate-limited with
//! `governor`, and reads postings out of the markup with the board's
//! [`BoardDefinition`] selectors. Boards with a detail layout also get a
//! one-page listing per posting. Boards that only render results with
//! JavaScript need a browser-backed adapter instead.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::boards::BoardDefinition;
use crate::challenge::{ChallengeDetector, MarkerDetector};
use crate::error::{FetchError, FetchResult};
use crate::traits::source::{JobListing, ListingPage, SourceAdapter};
use crate::types::job::{JobSource, RawEntry};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// A board scraped over plain HTTP.
///
/// # Example
///
/// ```rust,ignore
/// use job_crawler::adapters::{BoardDefinition, HttpBoard};
///
/// let board = HttpBoard::new(BoardDefinition::for_source(JobSource::Fuzu)?)?
///     .with_requests_per_second(NonZeroU32::new(1).unwrap());
/// let mut listing = board.open("data analyst")?;
/// let page = listing.fetch().await?;
/// ```
pub struct HttpBoard {
    definition: Arc<BoardDefinition>,
    fetcher: Fetcher,
    detector: Arc<MarkerDetector>,
}

impl HttpBoard {
    /// Create a board with a 30s request timeout and one request per second.
    pub fn new(definition: BoardDefinition) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Unknown(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            definition: Arc::new(definition),
            fetcher: Fetcher {
                client,
                limiter: Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::MIN))),
                user_agent: Arc::from(DEFAULT_USER_AGENT),
            },
            detector: Arc::new(MarkerDetector::new()),
        })
    }

    /// Built-in board for a source.
    pub fn for_source(source: JobSource) -> FetchResult<Self> {
        let definition = BoardDefinition::for_source(source)
            .map_err(|e| FetchError::Unknown(format!("invalid {source} layout: {e}")))?;
        Self::new(definition)
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.fetcher.client = client;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.fetcher.user_agent = Arc::from(user_agent.into());
        self
    }

    /// Requests per second shared by result pages and posting pages.
    pub fn with_requests_per_second(mut self, requests_per_second: NonZeroU32) -> Self {
        self.fetcher.limiter = Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second)));
        self
    }

    pub fn with_detector(mut self, detector: MarkerDetector) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    pub fn definition(&self) -> &BoardDefinition {
        &self.definition
    }
}

#[async_trait]
impl SourceAdapter for HttpBoard {
    fn source(&self) -> JobSource {
        self.definition.source
    }

    fn detector(&self) -> Arc<dyn ChallengeDetector> {
        self.detector.clone()
    }

    fn open(&self, keyword: &str) -> FetchResult<Box<dyn JobListing>> {
        if keyword.trim().is_empty() {
            return Err(FetchError::Unknown("empty search keyword".to_string()));
        }

        Ok(Box::new(HttpListing {
            definition: self.definition.clone(),
            fetcher: self.fetcher.clone(),
            detector: self.detector.clone(),
            keyword: keyword.to_string(),
            page: 1,
        }))
    }

    fn open_detail(&self, entry: &RawEntry) -> Option<Box<dyn JobListing>> {
        self.definition.detail_fields.as_ref()?;

        Some(Box::new(DetailListing {
            definition: self.definition.clone(),
            fetcher: self.fetcher.clone(),
            detector: self.detector.clone(),
            entry: entry.clone(),
        }))
    }
}

/// Rate-limited GET shared by every listing of a board.
#[derive(Clone)]
struct Fetcher {
    client: reqwest::Client,
    limiter: Arc<DefaultRateLimiter>,
    user_agent: Arc<str>,
}

impl Fetcher {
    /// GET `url`, returning the final URL, status and body.
    async fn get(&self, source: JobSource, url: &str) -> FetchResult<(String, u16, String)> {
        self.limiter.until_ready().await;

        debug!(source = %source, url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.user_agent.as_ref())
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                FetchError::Network(Box::new(e))
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(Box::new(e)))?;

        Ok((final_url, status, body))
    }
}

struct HttpListing {
    definition: Arc<BoardDefinition>,
    fetcher: Fetcher,
    detector: Arc<MarkerDetector>,
    keyword: String,
    page: u32,
}

#[async_trait]
impl JobListing for HttpListing {
    fn page_number(&self) -> u32 {
        self.page
    }

    async fn fetch(&mut self) -> FetchResult<ListingPage> {
        let url = self.definition.search_url(&self.keyword, self.page);
        let (final_url, status, body) = self.fetcher.get(self.definition.source, &url).await?;

        let mut page = ListingPage::new(final_url, self.page)
            .with_status(status)
            .with_body(body);

        match classify_status(status, self.detector.is_challenge(&page), self.page > 1) {
            StatusClass::Content => {
                page.entries = self.definition.extract_entries(&page.body, &page.url);
                page.has_next = !page.entries.is_empty();
                Ok(page)
            }
            StatusClass::Challenge => Ok(page),
            StatusClass::EndOfListing => Ok(ListingPage::new(page.url, self.page).with_status(status)),
            StatusClass::Transient => Err(FetchError::network(format!("HTTP {status} from {url}"))),
            StatusClass::Fatal => Err(FetchError::fatal(format!("HTTP {status} from {url}"))),
            StatusClass::Unexpected => Err(FetchError::Unknown(format!("HTTP {status} from {url}"))),
        }
    }

    fn advance(&mut self) {
        self.page += 1;
    }
}

/// A posting's own page, read as a one-page listing so it goes through the
/// same challenge guard and retry policy as result pages.
struct DetailListing {
    definition: Arc<BoardDefinition>,
    fetcher: Fetcher,
    detector: Arc<MarkerDetector>,
    entry: RawEntry,
}

#[async_trait]
impl JobListing for DetailListing {
    fn page_number(&self) -> u32 {
        1
    }

    async fn fetch(&mut self) -> FetchResult<ListingPage> {
        let url = self.entry.link.clone();
        let (final_url, status, body) = self.fetcher.get(self.definition.source, &url).await?;

        let page = ListingPage::new(final_url, 1).with_status(status).with_body(body);

        // A posting that is gone is not a reason to stop the board.
        match classify_status(status, self.detector.is_challenge(&page), true) {
            StatusClass::Content => {
                let entry = self.definition.read_detail(&page.body, self.entry.clone());
                Ok(page.with_entry(entry))
            }
            StatusClass::Challenge => Ok(page),
            StatusClass::EndOfListing => Err(FetchError::parse(format!("posting gone: HTTP {status} from {url}"))),
            StatusClass::Transient => Err(FetchError::network(format!("HTTP {status} from {url}"))),
            StatusClass::Fatal => Err(FetchError::fatal(format!("HTTP {status} from {url}"))),
            StatusClass::Unexpected => Err(FetchError::Unknown(format!("HTTP {status} from {url}"))),
        }
    }

    fn advance(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Content,
    Challenge,
    /// A page that no longer exists
    EndOfListing,
    Transient,
    Fatal,
    Unexpected,
}

/// `missing_is_end` turns 404/410 into the end of the listing instead of a
/// fatal error.
fn classify_status(status: u16, challenge: bool, missing_is_end: bool) -> StatusClass {
    match status {
        200..=299 => StatusClass::Content,
        403 | 429 | 503 if challenge => StatusClass::Challenge,
        429 | 500..=599 => StatusClass::Transient,
        404 | 410 if missing_is_end => StatusClass::EndOfListing,
        401 | 403 | 404 | 410 | 451 => StatusClass::Fatal,
        _ => StatusClass::Unexpected,
    }
}
