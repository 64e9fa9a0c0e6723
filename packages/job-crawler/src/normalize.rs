//! Raw entry normalization.
//!
//! Turns the strings a board shows into a typed [`JobRecord`]: placeholder
//! values become `None`, relative and absolute dates become calendar dates,
//! and relative links are resolved against the page they were found on.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::types::job::{JobRecord, JobSource, RawEntry};

/// Placeholder values boards use for "no data".
const SENTINELS: &[&str] = &["not specified", "unknown", "n/a", "na", "none", "-"];

/// Absolute date layouts, tried in order. Day-first wins over month-first.
const DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%b %d, %Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d %B %Y",
    "%d %b %Y",
];

static RE_RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*\+?\s*(minute|min|hour|hr|day|week|month)s?\s+ago").unwrap()
});
static RE_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap());
static RE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(posted|published|deadline|closing date|expires|expiry date)\s*(on)?\s*:?\s*")
        .unwrap()
});
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collapse whitespace and map placeholders to `None`.
pub fn clean_text(raw: &str) -> Option<String> {
    let collapsed = RE_SPACES.replace_all(raw.trim(), " ");
    if collapsed.is_empty() || SENTINELS.contains(&collapsed.to_lowercase().as_str()) {
        return None;
    }
    Some(collapsed.into_owned())
}

fn clean_field(raw: &Option<String>) -> Option<String> {
    raw.as_deref().and_then(clean_text)
}

/// Parse a board's date string relative to `today`.
///
/// Returns `None` for placeholders and for anything unrecognised.
pub fn parse_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = clean_text(raw)?;
    let text = RE_LABEL.replace(&text, "");
    let lower = text.to_lowercase();

    match lower.as_str() {
        "today" | "just now" | "new" => return Some(today),
        "yesterday" => return Some(today - Duration::days(1)),
        _ => {}
    }

    if let Some(caps) = RE_RELATIVE.captures(&lower) {
        let amount: i64 = caps[1].parse().ok()?;
        let back = match &caps[2] {
            "minute" | "min" | "hour" | "hr" => Duration::zero(),
            "day" => Duration::days(amount),
            "week" => Duration::weeks(amount),
            "month" => Duration::days(amount.checked_mul(30)?),
            _ => return None,
        };
        return today.checked_sub_signed(back);
    }

    let text = RE_ORDINAL.replace_all(&text, "$1");
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&text, format).ok())
}

/// Resolve a possibly relative link against the page URL. Absolute links pass through.
pub fn resolve_link(link: &str, page_url: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }

    match Url::parse(link) {
        Ok(url) => Some(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(page_url)
            .ok()
            .and_then(|base| base.join(link).ok())
            .map(|url| url.to_string()),
        Err(_) => None,
    }
}

/// Convert a raw entry into a record.
///
/// A missing title or unusable link is a record-scoped parse error.
pub fn to_record(
    entry: &RawEntry,
    source: JobSource,
    page_url: &str,
    today: NaiveDate,
) -> FetchResult<JobRecord> {
    let title = clean_text(&entry.title)
        .ok_or_else(|| FetchError::parse(format!("entry without title: {:?}", entry.link)))?;
    let link = resolve_link(&entry.link, page_url)
        .ok_or_else(|| FetchError::parse(format!("entry without usable link: {title}")))?;

    Ok(JobRecord {
        title,
        link,
        date_posted: entry
            .date_posted
            .as_deref()
            .and_then(|d| parse_date(d, today)),
        date_expires: entry
            .date_expires
            .as_deref()
            .and_then(|d| parse_date(d, today)),
        qualification: clean_field(&entry.qualification),
        years_of_experience: clean_field(&entry.years_of_experience),
        location: clean_field(&entry.location),
        source,
    })
}

/// Title filter: the title must mention one of `terms` or the keyword that
/// found it. An empty term list accepts everything.
pub fn is_relevant(title: &str, keyword: &str, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }

    let title = title.to_lowercase();
    let keyword = keyword.trim().to_lowercase();
    (!keyword.is_empty() && title.contains(&keyword))
        || terms.iter().any(|term| title.contains(&term.to_lowercase()))
}

/// Whether a record falls inside the run's date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    Keep,
    /// Posted before the cutoff
    TooOld,
    /// Deadline already passed
    Expired,
}

pub fn recency(
    record: &JobRecord,
    cutoff: NaiveDate,
    today: NaiveDate,
    drop_expired: bool,
) -> Recency {
    if record.date_posted.is_some_and(|posted| posted < cutoff) {
        return Recency::TooOld;
    }
    if drop_expired && record.date_expires.is_some_and(|expires| expires < today) {
        return Recency::Expired;
    }
    Recency::Keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 28).unwrap()
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Nairobi,\n  Kenya "), Some("Nairobi, Kenya".to_string()));
        assert_eq!(clean_text("Not specified"), None);
        assert_eq!(clean_text("UNKNOWN"), None);
        assert_eq!(clean_text("   "), None);
    }

    #[test]
    fn test_relative_dates() {
        assert_eq!(parse_date("3 days ago", today()), Some(date(7, 25)));
        assert_eq!(parse_date("1 day ago", today()), Some(date(7, 27)));
        assert_eq!(parse_date("2 weeks ago", today()), Some(date(7, 14)));
        assert_eq!(parse_date("5 hours ago", today()), Some(today()));
        assert_eq!(parse_date("Posted 30+ days ago", today()), Some(date(6, 28)));
        assert_eq!(parse_date("Today", today()), Some(today()));
        assert_eq!(parse_date("yesterday", today()), Some(date(7, 27)));
    }

    #[test]
    fn test_absolute_dates() {
        assert_eq!(parse_date("July 28, 2025", today()), Some(date(7, 28)));
        assert_eq!(parse_date("Jul 20, 2025", today()), Some(date(7, 20)));
        assert_eq!(parse_date("2025-07-15", today()), Some(date(7, 15)));
        assert_eq!(parse_date("25/07/2025", today()), Some(date(7, 25)));
        assert_eq!(parse_date("07/25/2025", today()), Some(date(7, 25)));
        assert_eq!(parse_date("25-07-2025", today()), Some(date(7, 25)));
        assert_eq!(parse_date("4 August 2025", today()), Some(date(8, 4)));
        assert_eq!(parse_date("4 Aug 2025", today()), Some(date(8, 4)));
        assert_eq!(parse_date("Deadline: 1st August 2025", today()), Some(date(8, 1)));
    }

    #[test]
    fn test_unparseable_dates() {
        assert_eq!(parse_date("Not specified", today()), None);
        assert_eq!(parse_date("soon", today()), None);
        assert_eq!(parse_date("", today()), None);
    }

    #[test]
    fn test_resolve_link() {
        let page = "https://www.myjobmag.co.ke/search/jobs?q=data";
        assert_eq!(
            resolve_link("/job/data-analyst-123", page),
            Some("https://www.myjobmag.co.ke/job/data-analyst-123".to_string())
        );
        assert_eq!(
            resolve_link("https://fuzu.com/kenya/job/1", page),
            Some("https://fuzu.com/kenya/job/1".to_string())
        );
        assert_eq!(resolve_link("  ", page), None);
    }

    #[test]
    fn test_to_record() {
        let entry = RawEntry::new(" Data Analyst ", "/job/1")
            .with_date_posted("2 days ago")
            .with_date_expires("Not specified")
            .with_location("Nairobi")
            .with_qualification("unknown");

        let record = to_record(&entry, JobSource::MyJobMag, "https://x.co.ke/jobs", today()).unwrap();
        assert_eq!(record.title, "Data Analyst");
        assert_eq!(record.link, "https://x.co.ke/job/1");
        assert_eq!(record.date_posted, Some(date(7, 26)));
        assert_eq!(record.date_expires, None);
        assert_eq!(record.qualification, None);
        assert_eq!(record.location.as_deref(), Some("Nairobi"));
        assert_eq!(record.source, JobSource::MyJobMag);
    }

    #[test]
    fn test_to_record_requires_title() {
        let entry = RawEntry::new("  ", "/job/1");
        let err = to_record(&entry, JobSource::Fuzu, "https://x.co.ke/jobs", today()).unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[test]
    fn test_relevance() {
        let terms = vec!["statistics".to_string(), "power bi".to_string()];
        assert!(is_relevant("Senior Statistics Officer", "officer", &terms));
        assert!(is_relevant("M&E Officer", "officer", &terms));
        assert!(is_relevant("Power BI Developer", "data", &terms));
        assert!(!is_relevant("Sales Executive", "data", &terms));
        assert!(is_relevant("Sales Executive", "data", &[]));
    }

    #[test]
    fn test_recency() {
        let cutoff = date(7, 21);
        let fresh = JobRecord::new("A", "https://x/1", JobSource::Fuzu).with_date_posted(date(7, 25));
        let old = JobRecord::new("B", "https://x/2", JobSource::Fuzu).with_date_posted(date(7, 20));
        let expired = JobRecord::new("C", "https://x/3", JobSource::Fuzu)
            .with_date_posted(date(7, 25))
            .with_date_expires(date(7, 27));
        let undated = JobRecord::new("D", "https://x/4", JobSource::Fuzu);

        assert_eq!(recency(&fresh, cutoff, today(), true), Recency::Keep);
        assert_eq!(recency(&old, cutoff, today(), true), Recency::TooOld);
        assert_eq!(recency(&expired, cutoff, today(), true), Recency::Expired);
        assert_eq!(recency(&expired, cutoff, today(), false), Recency::Keep);
        assert_eq!(recency(&undated, cutoff, today(), true), Recency::Keep);
    }
}
