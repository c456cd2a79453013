//! Report service: the narrow interface transport handlers call
//!
//! All mutation goes persist-first, aggregate-second: the in-memory store is
//! only touched after SQLite accepts the change, so a storage failure never
//! leaves the aggregate out of step with the persisted rows.

use crate::models::{DailyReport, RegionAggregate};
use crate::repo::{RepoError, ReportRepository};
use crate::stats::{round2, RegionalStats};
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;

/// Oldest date a historical listing may request.
const MAX_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug)]
pub enum ServiceError {
    /// Malformed or out-of-range date parameter.
    InvalidDate(String),
    Repo(RepoError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::InvalidDate(msg) => write!(f, "invalid date parameter: {}", msg),
            ServiceError::Repo(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        ServiceError::Repo(err)
    }
}

pub struct ReportService {
    repo: Arc<dyn ReportRepository>,
    stats: Arc<RegionalStats>,
}

impl ReportService {
    pub fn new(repo: Arc<dyn ReportRepository>, stats: Arc<RegionalStats>) -> Self {
        Self { repo, stats }
    }

    /// Accept a new daily report: compute the fact - plan differences,
    /// persist, then fold it into the region aggregate.
    pub async fn submit(&self, mut report: DailyReport) -> Result<i64, ServiceError> {
        fill_differences(&mut report);

        let id = self.repo.create(&report).await?;
        self.stats.add(report.region_id, &report);

        log::info!(
            "report accepted: region {} submitter {} date {}",
            report.region_id,
            report.submitter,
            report.date
        );
        Ok(id)
    }

    /// Correct an existing report. The repository hands back the prior
    /// values, which are subtracted from the aggregate before the new ones
    /// are added, so the correction replaces the old plan/fact/counter
    /// contribution.
    ///
    /// The prior row's stored difference fields are NOT subtracted: a
    /// correction adds its full recomputed difference on top of whatever
    /// the region already accumulated. Summed differences can therefore
    /// exceed summed fact - summed plan until the next retention reset.
    pub async fn patch(
        &self,
        region_id: u32,
        submitter: &str,
        mut report: DailyReport,
    ) -> Result<(), ServiceError> {
        fill_differences(&mut report);

        let mut old = self.repo.update(region_id, submitter, &report).await?;
        old.seed_dif = 0.0;
        old.pumpkin_dif = 0.0;
        old.peanut_dif = 0.0;
        self.stats.update(region_id, &old, &report);

        log::info!(
            "report corrected: region {} submitter {} date {}",
            region_id,
            submitter,
            report.date
        );
        Ok(())
    }

    /// Today's reports for a region.
    pub async fn reports_today(&self, region_id: u32) -> Result<Vec<DailyReport>, ServiceError> {
        let today = Local::now().date_naive();
        Ok(self.repo.reports_for_date(region_id, today).await?)
    }

    /// Today's report(s) for one submitter in a region.
    pub async fn reports_today_by_submitter(
        &self,
        region_id: u32,
        submitter: &str,
    ) -> Result<Vec<DailyReport>, ServiceError> {
        let today = Local::now().date_naive();
        Ok(self
            .repo
            .reports_for_date_by_submitter(region_id, submitter, today)
            .await?)
    }

    /// Historical listing for a region on a given `YYYY-MM-DD` date, capped
    /// at 30 days back.
    pub async fn reports_for_date(
        &self,
        region_id: u32,
        date: &str,
    ) -> Result<Vec<DailyReport>, ServiceError> {
        let date = parse_lookback_date(date)?;
        Ok(self.repo.reports_for_date(region_id, date).await?)
    }

    /// Historical listing for one submitter on a given date.
    pub async fn reports_for_date_by_submitter(
        &self,
        region_id: u32,
        submitter: &str,
        date: &str,
    ) -> Result<Vec<DailyReport>, ServiceError> {
        let date = parse_lookback_date(date)?;
        Ok(self
            .repo
            .reports_for_date_by_submitter(region_id, submitter, date)
            .await?)
    }

    pub fn region_summary(&self, region_id: u32) -> (RegionAggregate, u64) {
        self.stats.get_for_region(region_id)
    }

    pub fn all_summaries(&self) -> HashMap<u32, RegionAggregate> {
        self.stats.get_all()
    }

    pub fn all_counts(&self) -> HashMap<u32, u64> {
        self.stats.get_all_counts()
    }

    pub fn network_total(&self) -> (RegionAggregate, u64) {
        self.stats.total()
    }
}

fn fill_differences(report: &mut DailyReport) {
    report.seed_dif = round2(report.seed_fact - report.seed_plan);
    report.pumpkin_dif = round2(report.pumpkin_fact - report.pumpkin_plan);
    report.peanut_dif = round2(report.peanut_fact - report.peanut_plan);
}

fn parse_lookback_date(date: &str) -> Result<NaiveDate, ServiceError> {
    if date.is_empty() {
        return Err(ServiceError::InvalidDate(
            "date parameter is required (format: YYYY-MM-DD)".to_string(),
        ));
    }

    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ServiceError::InvalidDate("expected format YYYY-MM-DD".to_string()))?;

    let oldest = Local::now().date_naive() - chrono::Duration::days(MAX_LOOKBACK_DAYS);
    if parsed < oldest {
        return Err(ServiceError::InvalidDate(format!(
            "requested date is older than {} days",
            MAX_LOOKBACK_DAYS
        )));
    }

    Ok(parsed)
}
