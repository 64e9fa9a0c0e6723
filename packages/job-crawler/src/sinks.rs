//! Output sinks for finished runs.
//!
//! Sinks receive the merged record set and the run report once the
//! orchestrator is done; they never see partial state. A second run on the
//! same day should hand them [`JsonFileSink::merge_today`]'s result so the
//! day's files keep what the earlier run found.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::dedup::{self, JobSet};
use crate::error::SinkResult;
use crate::types::job::JobRecord;
use crate::types::report::RunReport;

/// Placeholder written for missing values in human-facing exports.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Something that persists a finished run.
#[async_trait]
pub trait OutputSink: Send + Sync {
    fn name(&self) -> &str;

    /// Write the run's output, returning the files created.
    async fn write(&self, records: &JobSet, report: &RunReport) -> SinkResult<Vec<PathBuf>>;
}

/// Writes `kenya_jobs_<date>.json` with the records and
/// `run_report_<date>.json` with the report.
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn records_path(&self, report: &RunReport) -> PathBuf {
        self.dir
            .join(format!("kenya_jobs_{}.json", report.run_date.format("%Y-%m-%d")))
    }

    pub fn report_path(&self, report: &RunReport) -> PathBuf {
        self.dir
            .join(format!("run_report_{}.json", report.run_date.format("%Y-%m-%d")))
    }

    /// Records already written for the report's day. No file means none.
    pub async fn load_today(&self, report: &RunReport) -> SinkResult<Vec<JobRecord>> {
        let path = self.records_path(report);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// This run's records merged with the day's earlier output.
    ///
    /// Fresh records come first, so their values win and earlier runs only
    /// fill gaps or add postings this run did not see.
    pub async fn merge_today(&self, records: &JobSet, report: &RunReport) -> SinkResult<JobSet> {
        let earlier = self.load_today(report).await?;
        debug!(earlier = earlier.len(), fresh = records.len(), "Merging with today's output");
        Ok(dedup::merge(records.iter().cloned().chain(earlier)))
    }
}

#[async_trait]
impl OutputSink for JsonFileSink {
    fn name(&self) -> &str {
        "json"
    }

    async fn write(&self, records: &JobSet, report: &RunReport) -> SinkResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let records_path = self.records_path(report);
        let list: Vec<&JobRecord> = records.iter().collect();
        write_json(&records_path, &list).await?;

        let report_path = self.report_path(report);
        write_json(&report_path, report).await?;

        info!(
            path = %records_path.display(),
            records = list.len(),
            "Wrote JSON output"
        );
        Ok(vec![records_path, report_path])
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> SinkResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Writes `jobs_<date>.csv`, one row per record.
pub struct CsvFileSink {
    dir: PathBuf,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    link: &'a str,
    date_posted: String,
    date_expires: String,
    qualification: &'a str,
    years_of_experience: &'a str,
    location: &'a str,
    source: &'a str,
}

impl<'a> From<&'a JobRecord> for CsvRow<'a> {
    fn from(record: &'a JobRecord) -> Self {
        let date = |d: Option<chrono::NaiveDate>| {
            d.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| NOT_SPECIFIED.to_string())
        };
        let text = |t: &'a Option<String>| t.as_deref().unwrap_or(NOT_SPECIFIED);

        Self {
            title: &record.title,
            link: &record.link,
            date_posted: date(record.date_posted),
            date_expires: date(record.date_expires),
            qualification: text(&record.qualification),
            years_of_experience: text(&record.years_of_experience),
            location: text(&record.location),
            source: record.source.display_name(),
        }
    }
}

impl CsvFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, report: &RunReport) -> PathBuf {
        self.dir
            .join(format!("jobs_{}.csv", report.run_date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl OutputSink for CsvFileSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn write(&self, records: &JobSet, report: &RunReport) -> SinkResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records.iter() {
            writer.serialize(CsvRow::from(record))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let path = self.path(report);
        tokio::fs::write(&path, bytes).await?;

        info!(path = %path.display(), rows = records.len(), "Wrote CSV output");
        Ok(vec![path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::merge;
    use crate::types::job::JobSource;
    use crate::types::report::SourceReport;
    use chrono::NaiveDate;

    fn sample() -> (JobSet, RunReport) {
        let day = NaiveDate::from_ymd_opt(2025, 7, 28).unwrap();
        let records = merge(vec![
            JobRecord::new("Data Analyst", "https://x/job/1", JobSource::Fuzu)
                .with_date_posted(day)
                .with_location("Nairobi"),
            JobRecord::new("Statistician, Senior", "https://x/job/2", JobSource::MyJobMag),
        ]);
        let mut report = RunReport::new(day);
        report.sources.push(SourceReport::new(JobSource::Fuzu));
        report.total_records = records.len();
        (records, report)
    }

    #[tokio::test]
    async fn test_json_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (records, report) = sample();

        let paths = JsonFileSink::new(dir.path()).write(&records, &report).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("kenya_jobs_2025-07-28.json"));

        let written: Vec<JobRecord> =
            serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].location.as_deref(), Some("Nairobi"));

        let report_back: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&paths[1]).unwrap()).unwrap();
        assert_eq!(report_back.run_id, report.run_id);
    }

    #[tokio::test]
    async fn test_second_write_keeps_earlier_records() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let (first, report) = sample();
        sink.write(&first, &report).await.unwrap();

        // A later run the same day sees one old posting again and one new one.
        let second = merge(vec![
            JobRecord::new("Data Analyst", "https://x/job/1", JobSource::Fuzu)
                .with_location("Nairobi CBD"),
            JobRecord::new("Data Engineer", "https://x/job/3", JobSource::Fuzu),
        ]);
        let merged = sink.merge_today(&second, &report).await.unwrap();
        sink.write(&merged, &report).await.unwrap();

        let written = sink.load_today(&report).await.unwrap();
        let links: Vec<_> = written.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(links, vec!["https://x/job/1", "https://x/job/2", "https://x/job/3"]);

        let analyst = &written[0];
        assert_eq!(analyst.location.as_deref(), Some("Nairobi CBD"));
        assert_eq!(analyst.date_posted, NaiveDate::from_ymd_opt(2025, 7, 28));
    }

    #[tokio::test]
    async fn test_merge_today_without_earlier_output() {
        let dir = tempfile::tempdir().unwrap();
        let (records, report) = sample();

        let merged = JsonFileSink::new(dir.path().join("missing"))
            .merge_today(&records, &report)
            .await
            .unwrap();
        assert_eq!(merged.len(), records.len());
    }

    #[tokio::test]
    async fn test_csv_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (records, report) = sample();

        let paths = CsvFileSink::new(dir.path()).write(&records, &report).await.unwrap();
        assert!(paths[0].ends_with("jobs_2025-07-28.csv"));

        let mut reader = csv::Reader::from_path(&paths[0]).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec![
                "title",
                "link",
                "date_posted",
                "date_expires",
                "qualification",
                "years_of_experience",
                "location",
                "source"
            ]
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "2025-07-28");
        assert_eq!(&rows[0][7], "Fuzu");
        assert_eq!(&rows[1][0], "Statistician, Senior");
        assert_eq!(&rows[1][6], NOT_SPECIFIED);
    }
}
