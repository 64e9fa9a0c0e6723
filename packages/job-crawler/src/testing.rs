//! Testing utilities including a scripted job board.
//!
//! [`MockBoard`] answers fetches from a script instead of the network, so the
//! orchestrator, challenge handling and retry behavior can be exercised
//! deterministically (combine with `#[tokio::test(start_paused = true)]` to
//! skip real waiting).

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::challenge::{ChallengeDetector, MarkerDetector};
use crate::error::{FetchError, FetchErrorKind, FetchResult};
use crate::traits::source::{JobListing, ListingPage, SourceAdapter};
use crate::types::job::{JobSource, RawEntry};

/// Markup served for a scripted challenge.
pub const CHALLENGE_BODY: &str =
    "<title>Just a moment...</title><p>Verifying you are human. This may take a few seconds.</p>";

/// One scripted response.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Serve this page.
    Page(ListingPage),
    /// Serve a challenge interstitial.
    Challenge,
    /// Fail with an error of this kind.
    Fail(FetchErrorKind),
}

/// Record of a call made to the mock board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBoardCall {
    Open { keyword: String },
    Fetch { keyword: String, page: u32 },
    Detail { link: String },
}

type ScriptKey = (String, u32);

/// A scripted [`SourceAdapter`].
///
/// Each (keyword, page) has a queue of steps. Every fetch consumes the front
/// step; the last step repeats forever. Unscripted pages are empty final pages.
///
/// Posting pages are scripted per link with [`MockBoard::with_detail`]; a
/// `Page` step's first entry holds the fields the posting page adds. Links
/// without a script have no posting page.
pub struct MockBoard {
    source: JobSource,

    detector: Arc<dyn ChallengeDetector>,

    /// Scripted steps by (keyword, page)
    scripts: Arc<RwLock<HashMap<ScriptKey, VecDeque<ScriptStep>>>>,

    /// Scripted posting pages by link
    details: Arc<RwLock<HashMap<String, VecDeque<ScriptStep>>>>,

    /// Every fetch fails with this kind
    fail_all: Option<FetchErrorKind>,

    /// Simulated latency per fetch
    fetch_delay: Option<Duration>,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockBoardCall>>>,
}

impl MockBoard {
    /// Create a mock board with the default marker detector.
    pub fn new(source: JobSource) -> Self {
        Self {
            source,
            detector: Arc::new(MarkerDetector::new()),
            scripts: Arc::new(RwLock::new(HashMap::new())),
            details: Arc::new(RwLock::new(HashMap::new())),
            fail_all: None,
            fetch_delay: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn ChallengeDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Serve a single page for a keyword at the page's own number.
    pub fn with_page(self, keyword: &str, page: ListingPage) -> Self {
        let number = page.page_number.max(1);
        self.with_steps(keyword, number, vec![ScriptStep::Page(page)])
    }

    /// Serve a sequence of pages for a keyword.
    ///
    /// Pages are renumbered from 1 and every page but the last gets `has_next`.
    pub fn with_listing(mut self, keyword: &str, pages: Vec<ListingPage>) -> Self {
        let count = pages.len();
        for (index, mut page) in pages.into_iter().enumerate() {
            page.page_number = index as u32 + 1;
            page.has_next = index + 1 < count;
            self = self.with_page(keyword, page);
        }
        self
    }

    /// Script the responses for one (keyword, page).
    pub fn with_steps(self, keyword: &str, page: u32, steps: Vec<ScriptStep>) -> Self {
        self.scripts
            .write()
            .unwrap()
            .insert((script_keyword(keyword), page), steps.into());
        self
    }

    /// Serve a posting page for `link` that adds `fields` to its entry.
    pub fn with_detail(self, link: &str, fields: RawEntry) -> Self {
        let page = ListingPage::new(link, 1)
            .with_status(200)
            .with_body("<article class=\"job-description\"></article>")
            .with_entry(fields);
        self.with_detail_steps(link, vec![ScriptStep::Page(page)])
    }

    /// Script the responses for one posting page.
    pub fn with_detail_steps(self, link: &str, steps: Vec<ScriptStep>) -> Self {
        self.details
            .write()
            .unwrap()
            .insert(link.to_string(), steps.into());
        self
    }

    /// Make every fetch fail.
    pub fn failing_with(mut self, kind: FetchErrorKind) -> Self {
        self.fail_all = Some(kind);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockBoardCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of fetches made so far.
    pub fn fetch_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockBoardCall::Fetch { .. }))
            .count()
    }

    /// Number of posting-page fetches made so far.
    pub fn detail_fetch_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockBoardCall::Detail { .. }))
            .count()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }
}

#[async_trait]
impl SourceAdapter for MockBoard {
    fn source(&self) -> JobSource {
        self.source
    }

    fn detector(&self) -> Arc<dyn ChallengeDetector> {
        self.detector.clone()
    }

    fn open(&self, keyword: &str) -> FetchResult<Box<dyn JobListing>> {
        self.calls.write().unwrap().push(MockBoardCall::Open {
            keyword: keyword.to_string(),
        });

        Ok(Box::new(MockListing {
            keyword: script_keyword(keyword),
            page: 1,
            source: self.source,
            scripts: self.scripts.clone(),
            fail_all: self.fail_all,
            fetch_delay: self.fetch_delay,
            calls: self.calls.clone(),
        }))
    }

    fn open_detail(&self, entry: &RawEntry) -> Option<Box<dyn JobListing>> {
        if !self.details.read().unwrap().contains_key(&entry.link) {
            return None;
        }

        Some(Box::new(MockDetailListing {
            entry: entry.clone(),
            details: self.details.clone(),
            fail_all: self.fail_all,
            fetch_delay: self.fetch_delay,
            calls: self.calls.clone(),
        }))
    }
}

struct MockListing {
    keyword: String,
    page: u32,
    source: JobSource,
    scripts: Arc<RwLock<HashMap<ScriptKey, VecDeque<ScriptStep>>>>,
    fail_all: Option<FetchErrorKind>,
    fetch_delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockBoardCall>>>,
}

impl MockListing {
    fn url(&self) -> String {
        format!(
            "https://{}.example/jobs?q={}&page={}",
            self.source.id(),
            self.keyword.replace(' ', "+"),
            self.page
        )
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let mut scripts = self.scripts.write().unwrap();
        let queue = scripts.get_mut(&(self.keyword.clone(), self.page))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl JobListing for MockListing {
    fn page_number(&self) -> u32 {
        self.page
    }

    async fn fetch(&mut self) -> FetchResult<ListingPage> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.write().unwrap().push(MockBoardCall::Fetch {
            keyword: self.keyword.clone(),
            page: self.page,
        });

        if let Some(kind) = self.fail_all {
            return Err(error_for(kind));
        }

        match self.next_step() {
            Some(ScriptStep::Page(mut page)) => {
                if page.url.is_empty() {
                    page.url = self.url();
                }
                page.page_number = self.page;
                Ok(page)
            }
            Some(ScriptStep::Challenge) => Ok(ListingPage::new(self.url(), self.page)
                .with_status(403)
                .with_body(CHALLENGE_BODY)),
            Some(ScriptStep::Fail(kind)) => Err(error_for(kind)),
            None => Ok(ListingPage::new(self.url(), self.page)),
        }
    }

    fn advance(&mut self) {
        self.page += 1;
    }
}

struct MockDetailListing {
    entry: RawEntry,
    details: Arc<RwLock<HashMap<String, VecDeque<ScriptStep>>>>,
    fail_all: Option<FetchErrorKind>,
    fetch_delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockBoardCall>>>,
}

#[async_trait]
impl JobListing for MockDetailListing {
    fn page_number(&self) -> u32 {
        1
    }

    async fn fetch(&mut self) -> FetchResult<ListingPage> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.write().unwrap().push(MockBoardCall::Detail {
            link: self.entry.link.clone(),
        });

        if let Some(kind) = self.fail_all {
            return Err(error_for(kind));
        }

        let step = {
            let mut details = self.details.write().unwrap();
            details.get_mut(&self.entry.link).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        match step {
            Some(ScriptStep::Page(page)) => {
                let mut entry = self.entry.clone();
                if let Some(fields) = page.entries.first() {
                    entry.fill_from(fields);
                }
                let mut served = ListingPage::new(self.entry.link.clone(), 1).with_body(page.body);
                served.status = page.status;
                Ok(served.with_entry(entry))
            }
            Some(ScriptStep::Challenge) => Ok(ListingPage::new(self.entry.link.clone(), 1)
                .with_status(403)
                .with_body(CHALLENGE_BODY)),
            Some(ScriptStep::Fail(kind)) => Err(error_for(kind)),
            None => Err(FetchError::parse("mock posting page missing")),
        }
    }

    fn advance(&mut self) {}
}

fn script_keyword(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

/// A representative error of the given kind.
pub fn error_for(kind: FetchErrorKind) -> FetchError {
    match kind {
        FetchErrorKind::Network => FetchError::network("mock connection reset"),
        FetchErrorKind::Parse => FetchError::parse("mock page layout changed"),
        FetchErrorKind::Fatal => FetchError::fatal("mock source blocked"),
        other => FetchError::Unknown(format!("mock {other} failure")),
    }
}

/// A results page with one entry per `(title, date_posted)`, links derived from titles.
pub fn page_of(base: &str, entries: &[(&str, &str)]) -> ListingPage {
    let entries = entries.iter().map(|(title, date)| {
        let slug = title.to_lowercase().replace(' ', "-");
        RawEntry::new(*title, format!("{}/job/{}", base.trim_end_matches('/'), slug))
            .with_date_posted(*date)
    });
    ListingPage::new("", 1)
        .with_body("<ul class=\"job-list\"></ul>")
        .with_entries(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_walks_script() {
        let board = MockBoard::new(JobSource::Fuzu).with_listing(
            "Data",
            vec![
                page_of("https://fuzu.example", &[("Data Analyst", "2025-07-28")]),
                page_of("https://fuzu.example", &[("Data Engineer", "2025-07-27")]),
            ],
        );

        let mut listing = board.open("data").unwrap();
        let first = listing.fetch().await.unwrap();
        assert!(first.has_next);
        assert_eq!(first.entries[0].title, "Data Analyst");

        listing.advance();
        let second = listing.fetch().await.unwrap();
        assert!(!second.has_next);
        assert_eq!(second.page_number, 2);

        listing.advance();
        let beyond = listing.fetch().await.unwrap();
        assert!(!beyond.has_content());

        assert_eq!(board.fetch_count(), 3);
        assert_eq!(
            board.calls()[0],
            MockBoardCall::Open {
                keyword: "data".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_last_step_repeats() {
        let board = MockBoard::new(JobSource::Fuzu).with_steps(
            "data",
            1,
            vec![ScriptStep::Fail(FetchErrorKind::Network), ScriptStep::Challenge],
        );
        let mut listing = board.open("data").unwrap();

        assert!(listing.fetch().await.is_err());
        let challenge = listing.fetch().await.unwrap();
        assert!(challenge.body.contains("Verifying you are human"));
        assert!(listing.fetch().await.unwrap().body.contains("Just a moment"));
    }

    #[tokio::test]
    async fn test_detail_fills_entry() {
        let link = "https://fuzu.example/job/data-analyst";
        let board = MockBoard::new(JobSource::Fuzu)
            .with_detail(link, RawEntry::default().with_location("Nairobi").with_date_posted("ignored"));

        let card = RawEntry::new("Data Analyst", link).with_date_posted("2025-07-28");
        let mut detail = board.open_detail(&card).expect("scripted posting page");
        let page = detail.fetch().await.unwrap();

        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].location.as_deref(), Some("Nairobi"));
        assert_eq!(page.entries[0].date_posted.as_deref(), Some("2025-07-28"));
        assert_eq!(board.detail_fetch_count(), 1);
        assert_eq!(board.fetch_count(), 0);

        let other = RawEntry::new("Data Engineer", "https://fuzu.example/job/data-engineer");
        assert!(board.open_detail(&other).is_none());
    }

    #[tokio::test]
    async fn test_failing_board() {
        let board = MockBoard::new(JobSource::Fuzu).failing_with(FetchErrorKind::Fatal);
        let mut listing = board.open("data").unwrap();
        let err = listing.fetch().await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Fatal);
    }
}
