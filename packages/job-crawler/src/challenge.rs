//! Anti-automation challenge detection and bounded waiting.
//!
//! A board may answer a request with an interstitial ("Verifying you are
//! human", "Just a moment...") instead of results. [`ChallengeHandler`] wraps a
//! single page fetch in a small state machine:
//!
//! ```text
//! Idle ──fetch──► content ─────────────────────────────► Resolved
//!   │
//!   └──challenge──► Detected ──► Waiting ──poll: clear──► Resolved
//!                                  │
//!                                  └──budget spent──────► TimedOut
//! ```
//!
//! Any fetch error ends the machine immediately with that error, whatever the
//! state. The machine lives for one call and keeps nothing between calls.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::traits::source::{JobListing, ListingPage};
use crate::types::config::ChallengeConfig;

/// Recognises a board's challenge pages.
pub trait ChallengeDetector: Send + Sync {
    /// The page is an interstitial rather than results.
    fn is_challenge(&self, page: &ListingPage) -> bool;

    /// The page is usable content once the challenge has cleared.
    fn looks_valid(&self, page: &ListingPage) -> bool {
        page.has_content()
    }
}

/// Detector for boards that never challenge.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChallenge;

impl ChallengeDetector for NoChallenge {
    fn is_challenge(&self, _page: &ListingPage) -> bool {
        false
    }
}

/// Detects challenges by case-insensitive markers in the body or final URL.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    body_markers: Vec<String>,
    url_markers: Vec<String>,
}

impl Default for MarkerDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerDetector {
    /// Markers for the common vendor interstitials.
    pub fn new() -> Self {
        Self {
            body_markers: [
                "verifying you are human",
                "just a moment",
                "checking your browser",
                "cf-challenge",
                "captcha",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            url_markers: ["challenge", "verify"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// A detector with no markers at all.
    pub fn empty() -> Self {
        Self {
            body_markers: Vec::new(),
            url_markers: Vec::new(),
        }
    }

    pub fn with_body_marker(mut self, marker: impl Into<String>) -> Self {
        self.body_markers.push(marker.into().to_lowercase());
        self
    }

    pub fn with_url_marker(mut self, marker: impl Into<String>) -> Self {
        self.url_markers.push(marker.into().to_lowercase());
        self
    }
}

impl ChallengeDetector for MarkerDetector {
    fn is_challenge(&self, page: &ListingPage) -> bool {
        let url = page.url.to_lowercase();
        if self.url_markers.iter().any(|m| url.contains(m.as_str())) {
            return true;
        }

        let body = page.body.to_lowercase();
        self.body_markers.iter().any(|m| body.contains(m.as_str()))
    }
}

/// Where a guarded fetch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Idle,
    Detected,
    Waiting,
    Resolved,
    TimedOut,
}

/// Result of one guarded fetch.
#[derive(Debug)]
pub enum ChallengeOutcome {
    /// Content was obtained, possibly after waiting out a challenge.
    Resolved(ListingPage),
    /// The challenge was still present when the wait budget ran out.
    TimedOut,
    /// The fetch itself failed.
    Error(FetchError),
    /// The run was cancelled mid-fetch or mid-wait.
    Cancelled,
}

/// A [`ChallengeOutcome`] plus what happened on the way there.
#[derive(Debug)]
pub struct GuardedFetch {
    pub outcome: ChallengeOutcome,

    /// A challenge page was seen at some point
    pub challenged: bool,

    /// Re-reads made while waiting
    pub polls: u32,

    /// State the machine ended in
    pub final_state: ChallengeState,
}

/// Runs fetches through the challenge state machine.
#[derive(Debug, Clone, Default)]
pub struct ChallengeHandler {
    config: ChallengeConfig,
}

impl ChallengeHandler {
    pub fn new(config: ChallengeConfig) -> Self {
        Self { config }
    }

    /// Fetch the listing's current page, waiting out a challenge if one appears.
    pub async fn fetch_with_challenge_guard(
        &self,
        listing: &mut dyn JobListing,
        detector: &dyn ChallengeDetector,
        cancel: &CancellationToken,
    ) -> GuardedFetch {
        let mut state = ChallengeState::Idle;
        let mut challenged = false;
        let mut polls = 0u32;
        let mut deadline = Instant::now();
        let page_number = listing.page_number();

        loop {
            match state {
                ChallengeState::Idle => {
                    let page = match fetch_or_cancel(listing, cancel).await {
                        Ok(page) => page,
                        Err(outcome) => return finish(outcome, state, challenged, polls),
                    };

                    if !detector.is_challenge(&page) {
                        state = ChallengeState::Resolved;
                        return finish(ChallengeOutcome::Resolved(page), state, challenged, polls);
                    }

                    state = ChallengeState::Detected;
                }
                ChallengeState::Detected => {
                    challenged = true;
                    info!(
                        page = page_number,
                        max_wait_secs = self.config.max_wait.as_secs(),
                        "Challenge page detected, waiting for it to clear"
                    );
                    deadline = Instant::now() + self.config.max_wait;
                    state = ChallengeState::Waiting;
                }
                ChallengeState::Waiting => {
                    let now = Instant::now();
                    if now >= deadline {
                        state = ChallengeState::TimedOut;
                        continue;
                    }

                    let pause = self.config.poll_interval.min(deadline - now);
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = cancel.cancelled() => {
                            return finish(ChallengeOutcome::Cancelled, state, challenged, polls);
                        }
                    }

                    polls += 1;
                    let page = match fetch_or_cancel(listing, cancel).await {
                        Ok(page) => page,
                        Err(outcome) => return finish(outcome, state, challenged, polls),
                    };

                    if !detector.is_challenge(&page) && detector.looks_valid(&page) {
                        debug!(page = page_number, polls, "Challenge cleared");
                        state = ChallengeState::Resolved;
                        return finish(ChallengeOutcome::Resolved(page), state, challenged, polls);
                    }

                    debug!(page = page_number, polls, "Challenge still present");
                }
                ChallengeState::TimedOut => {
                    warn!(
                        page = page_number,
                        polls,
                        waited_secs = self.config.max_wait.as_secs(),
                        "Challenge did not clear within wait budget"
                    );
                    return finish(ChallengeOutcome::TimedOut, state, challenged, polls);
                }
                ChallengeState::Resolved => {
                    // Resolved always returns with its page above.
                    return finish(
                        ChallengeOutcome::Error(FetchError::Unknown(
                            "challenge machine resolved without a page".to_string(),
                        )),
                        state,
                        challenged,
                        polls,
                    );
                }
            }
        }
    }
}

async fn fetch_or_cancel(
    listing: &mut dyn JobListing,
    cancel: &CancellationToken,
) -> Result<ListingPage, ChallengeOutcome> {
    tokio::select! {
        result = listing.fetch() => result.map_err(ChallengeOutcome::Error),
        _ = cancel.cancelled() => Err(ChallengeOutcome::Cancelled),
    }
}

fn finish(
    outcome: ChallengeOutcome,
    final_state: ChallengeState,
    challenged: bool,
    polls: u32,
) -> GuardedFetch {
    GuardedFetch {
        outcome,
        challenged,
        polls,
        final_state,
    }
}
