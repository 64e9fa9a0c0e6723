//! Source adapter traits for pluggable job boards.
//!
//! Every board implements [`SourceAdapter`]. The orchestrator never branches
//! on which board it is talking to: it opens a [`JobListing`] per keyword and
//! walks it forward page by page.
//!
//! # Usage
//!
//! ```rust,ignore
//! use job_crawler::traits::source::SourceAdapter;
//!
//! let mut listing = adapter.open("data analyst")?;
//! loop {
//!     let page = listing.fetch().await?;
//!     // ...
//!     if !page.has_next {
//!         break;
//!     }
//!     listing.advance();
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::challenge::ChallengeDetector;
use crate::error::FetchResult;
use crate::types::job::{JobSource, RawEntry};

/// One page of search results as returned by a board.
///
/// A challenge interstitial is also a `ListingPage`: it carries the
/// interstitial's markup in `body` and usually no entries. Telling the two
/// apart is the job of the source's [`ChallengeDetector`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    /// Final URL after redirects
    pub url: String,

    /// 1-based page number within the keyword's result stream
    pub page_number: u32,

    /// HTTP status if the transport has one
    pub status: Option<u16>,

    /// Raw markup or text, kept for challenge detection
    pub body: String,

    /// Entries scraped from the page, newest first
    pub entries: Vec<RawEntry>,

    /// The board shows a further page after this one
    pub has_next: bool,
}

impl ListingPage {
    pub fn new(url: impl Into<String>, page_number: u32) -> Self {
        Self {
            url: url.into(),
            page_number,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_entry(mut self, entry: RawEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_entries(mut self, entries: impl IntoIterator<Item = RawEntry>) -> Self {
        self.entries.extend(entries);
        self
    }

    /// Mark that a further page exists.
    pub fn with_next(mut self) -> Self {
        self.has_next = true;
        self
    }

    /// Check if the page carries anything beyond an empty shell.
    pub fn has_content(&self) -> bool {
        !self.entries.is_empty() || !self.body.trim().is_empty()
    }
}

/// A forward-only cursor over one keyword's result pages.
#[async_trait]
pub trait JobListing: Send {
    /// 1-based number of the page `fetch` reads.
    fn page_number(&self) -> u32;

    /// Read the current page.
    ///
    /// Calling this again without `advance` re-reads the same page; the
    /// challenge handler relies on that to poll a page while a challenge clears.
    async fn fetch(&mut self) -> FetchResult<ListingPage>;

    /// Move to the next page. There is no way back.
    fn advance(&mut self);
}

/// A job board.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which board this adapter serves.
    fn source(&self) -> JobSource;

    /// Predicate recognising this board's challenge pages.
    fn detector(&self) -> Arc<dyn ChallengeDetector>;

    /// Open a lazy result stream for a keyword, positioned at page 1.
    ///
    /// No I/O happens here; the first request is made by the first `fetch`.
    fn open(&self, keyword: &str) -> FetchResult<Box<dyn JobListing>>;

    /// A single-page listing over a posting's own page, for boards whose
    /// result pages leave out deadline, qualification or location.
    ///
    /// The page it returns carries one entry: `entry` with the fields the
    /// posting page adds. `None` means the result page is all there is.
    fn open_detail(&self, _entry: &RawEntry) -> Option<Box<dyn JobListing>> {
        None
    }
}
