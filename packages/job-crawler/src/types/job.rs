//! Job types - raw listing entries and normalized job records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ConfigError;

/// The job boards the crawler knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    BrighterMonday,
    MyJobMag,
    Fuzu,
    CareerPointKenya,
    MyJobsInKenya,
}

impl JobSource {
    /// Every known board, in the order a default run visits them.
    pub const ALL: [JobSource; 5] = [
        JobSource::MyJobMag,
        JobSource::BrighterMonday,
        JobSource::Fuzu,
        JobSource::CareerPointKenya,
        JobSource::MyJobsInKenya,
    ];

    /// Stable identifier used in fingerprints, cache keys and config.
    pub fn id(&self) -> &'static str {
        match self {
            JobSource::BrighterMonday => "brightermonday",
            JobSource::MyJobMag => "myjobmag",
            JobSource::Fuzu => "fuzu",
            JobSource::CareerPointKenya => "careerpointkenya",
            JobSource::MyJobsInKenya => "myjobsinkenya",
        }
    }

    /// Human-readable board name.
    pub fn display_name(&self) -> &'static str {
        match self {
            JobSource::BrighterMonday => "BrighterMonday",
            JobSource::MyJobMag => "MyJobMag Kenya",
            JobSource::Fuzu => "Fuzu",
            JobSource::CareerPointKenya => "CareerPoint Kenya",
            JobSource::MyJobsInKenya => "MyJobsInKenya",
        }
    }
}

impl std::fmt::Display for JobSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for JobSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace([' ', '-', '_'], "");
        JobSource::ALL
            .into_iter()
            .find(|source| source.id() == wanted)
            .ok_or_else(|| ConfigError::UnknownSource(s.to_string()))
    }
}

/// One unparsed entry as scraped from a listing page.
///
/// Every field is the raw string the board showed; normalization into a
/// [`JobRecord`] happens in [`crate::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub date_posted: Option<String>,
    pub date_expires: Option<String>,
    pub qualification: Option<String>,
    pub years_of_experience: Option<String>,
    pub location: Option<String>,

    /// Board-specific extras (e.g. company, salary band)
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl RawEntry {
    /// Create an entry with the two required fields.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            ..Default::default()
        }
    }

    pub fn with_date_posted(mut self, date: impl Into<String>) -> Self {
        self.date_posted = Some(date.into());
        self
    }

    pub fn with_date_expires(mut self, date: impl Into<String>) -> Self {
        self.date_expires = Some(date.into());
        self
    }

    pub fn with_qualification(mut self, qualification: impl Into<String>) -> Self {
        self.qualification = Some(qualification.into());
        self
    }

    pub fn with_experience(mut self, years: impl Into<String>) -> Self {
        self.years_of_experience = Some(years.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Fill every missing field from `other`. Present fields are never overwritten.
    pub fn fill_from(&mut self, other: &RawEntry) {
        fill(&mut self.date_posted, &other.date_posted);
        fill(&mut self.date_expires, &other.date_expires);
        fill(&mut self.qualification, &other.qualification);
        fill(&mut self.years_of_experience, &other.years_of_experience);
        fill(&mut self.location, &other.location);
        for (key, value) in &other.extra {
            self.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// One observed job posting. `link` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub title: String,
    pub link: String,
    pub date_posted: Option<NaiveDate>,
    pub date_expires: Option<NaiveDate>,
    pub qualification: Option<String>,
    pub years_of_experience: Option<String>,
    pub location: Option<String>,
    pub source: JobSource,
}

impl JobRecord {
    pub fn new(title: impl Into<String>, link: impl Into<String>, source: JobSource) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            date_posted: None,
            date_expires: None,
            qualification: None,
            years_of_experience: None,
            location: None,
            source,
        }
    }

    pub fn with_date_posted(mut self, date: NaiveDate) -> Self {
        self.date_posted = Some(date);
        self
    }

    pub fn with_date_expires(mut self, date: NaiveDate) -> Self {
        self.date_expires = Some(date);
        self
    }

    pub fn with_qualification(mut self, qualification: impl Into<String>) -> Self {
        self.qualification = Some(qualification.into());
        self
    }

    pub fn with_experience(mut self, years: impl Into<String>) -> Self {
        self.years_of_experience = Some(years.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Fill every missing field from `other`. Present fields are never overwritten.
    pub fn fill_from(&mut self, other: &JobRecord) {
        fill(&mut self.date_posted, &other.date_posted);
        fill(&mut self.date_expires, &other.date_expires);
        fill(&mut self.qualification, &other.qualification);
        fill(&mut self.years_of_experience, &other.years_of_experience);
        fill(&mut self.location, &other.location);
    }

    /// Number of optional fields that carry a value.
    pub fn filled_fields(&self) -> usize {
        [
            self.date_posted.is_some(),
            self.date_expires.is_some(),
            self.qualification.is_some(),
            self.years_of_experience.is_some(),
            self.location.is_some(),
        ]
        .into_iter()
        .filter(|filled| *filled)
        .count()
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, candidate: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_str() {
        assert_eq!("fuzu".parse::<JobSource>().unwrap(), JobSource::Fuzu);
        assert_eq!(
            "CareerPoint-Kenya".parse::<JobSource>().unwrap(),
            JobSource::CareerPointKenya
        );
        assert_eq!(
            "My Jobs In Kenya".parse::<JobSource>().unwrap(),
            JobSource::MyJobsInKenya
        );
        assert!("indeed".parse::<JobSource>().is_err());
    }

    #[test]
    fn test_source_ids_are_unique() {
        let mut ids: Vec<_> = JobSource::ALL.iter().map(|s| s.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), JobSource::ALL.len());
    }

    #[test]
    fn test_raw_entry_builder() {
        let entry = RawEntry::new("Data Analyst", "https://example.com/job/1")
            .with_date_posted("2 days ago")
            .with_location("Nairobi")
            .with_extra("company", "Acme");

        assert_eq!(entry.title, "Data Analyst");
        assert_eq!(entry.date_posted.as_deref(), Some("2 days ago"));
        assert_eq!(entry.location.as_deref(), Some("Nairobi"));
        assert_eq!(entry.extra.get("company"), Some(&"Acme".to_string()));
        assert!(entry.qualification.is_none());
    }

    #[test]
    fn test_raw_entry_fill_from() {
        let mut listed = RawEntry::new("Data Analyst", "https://example.com/job/1")
            .with_date_posted("2 days ago");
        let detail = RawEntry::new("Data Analyst (Acme)", "https://example.com/job/1")
            .with_date_posted("July 20, 2025")
            .with_date_expires("Aug 10, 2025")
            .with_location("Nairobi");

        listed.fill_from(&detail);
        assert_eq!(listed.title, "Data Analyst");
        assert_eq!(listed.date_posted.as_deref(), Some("2 days ago"));
        assert_eq!(listed.date_expires.as_deref(), Some("Aug 10, 2025"));
        assert_eq!(listed.location.as_deref(), Some("Nairobi"));
    }

    #[test]
    fn test_fill_from_never_overwrites() {
        let mut first = JobRecord::new("Analyst", "https://x/job/1", JobSource::Fuzu)
            .with_location("Nairobi");
        let second = JobRecord::new("Analyst II", "https://x/job/1", JobSource::MyJobMag)
            .with_location("Mombasa")
            .with_qualification("BSc");

        first.fill_from(&second);

        assert_eq!(first.location.as_deref(), Some("Nairobi"));
        assert_eq!(first.qualification.as_deref(), Some("BSc"));
        assert_eq!(first.title, "Analyst");
        assert_eq!(first.source, JobSource::Fuzu);
        assert_eq!(first.filled_fields(), 2);
    }
}
