//! Report persistence boundary
//!
//! `ReportRepository` is the seam the service layer and the retention task
//! talk to; `SqliteReportRepository` is the production implementation. The
//! schema lives in the constructor so a fresh database file is usable
//! immediately.

use crate::models::DailyReport;
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug)]
pub enum RepoError {
    /// A report already exists for the (region, submitter, date) key.
    Duplicate,
    /// No record matched the query.
    NotFound,
    /// Underlying SQLite failure.
    Storage(String),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::Duplicate => write!(f, "report already exists for this submitter and date"),
            RepoError::NotFound => write!(f, "record not found"),
            RepoError::Storage(msg) => write!(f, "database operation failed: {}", msg),
        }
    }
}

impl std::error::Error for RepoError {}

impl From<rusqlite::Error> for RepoError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RepoError::Duplicate
            }
            rusqlite::Error::QueryReturnedNoRows => RepoError::NotFound,
            _ => RepoError::Storage(err.to_string()),
        }
    }
}

/// Persistence operations the core depends on.
///
/// The mutation methods return enough information for the caller to keep the
/// in-memory aggregate consistent: `update` hands back the prior row so the
/// subtract/add delta can be applied, and `delete_older_than` reports how
/// many rows were trimmed.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Persist one report. `RepoError::Duplicate` when the
    /// (region, submitter, date) uniqueness constraint is violated.
    async fn create(&self, report: &DailyReport) -> Result<i64, RepoError>;

    /// Apply `new`'s numeric values to the existing report for
    /// (region, submitter, new.date), returning the pre-update row.
    /// `RepoError::NotFound` if no such report exists.
    async fn update(
        &self,
        region_id: u32,
        submitter: &str,
        new: &DailyReport,
    ) -> Result<DailyReport, RepoError>;

    /// Bulk-delete every report dated strictly before `cutoff`. Returns the
    /// number of deleted rows.
    async fn delete_older_than(&self, cutoff: NaiveDate) -> Result<usize, RepoError>;

    /// All reports for a region on one date. `NotFound` on an empty result.
    async fn reports_for_date(
        &self,
        region_id: u32,
        date: NaiveDate,
    ) -> Result<Vec<DailyReport>, RepoError>;

    /// Same as `reports_for_date`, filtered to one submitter.
    async fn reports_for_date_by_submitter(
        &self,
        region_id: u32,
        submitter: &str,
        date: NaiveDate,
    ) -> Result<Vec<DailyReport>, RepoError>;
}

pub struct SqliteReportRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReportRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, RepoError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RepoError::Storage(format!(
                        "failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS daily_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                region_id INTEGER NOT NULL,
                submitter TEXT NOT NULL,
                date TEXT NOT NULL,
                seed_plan REAL NOT NULL,
                seed_fact REAL NOT NULL,
                seed_dif REAL NOT NULL,
                pumpkin_plan REAL NOT NULL,
                pumpkin_fact REAL NOT NULL,
                pumpkin_dif REAL NOT NULL,
                peanut_plan REAL NOT NULL,
                peanut_fact REAL NOT NULL,
                peanut_dif REAL NOT NULL,
                akb1 INTEGER NOT NULL,
                akb2 INTEGER NOT NULL,
                new_tt INTEGER NOT NULL,
                mix INTEGER NOT NULL,
                np_one INTEGER NOT NULL,
                set_shelving INTEGER NOT NULL,
                dmp INTEGER NOT NULL,
                top_five INTEGER NOT NULL,
                news INTEGER NOT NULL,
                UNIQUE(region_id, submitter, date)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reports_region_date
             ON daily_reports(region_id, date)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reports_date ON daily_reports(date)",
            [],
        )?;

        log::info!("report database initialized with WAL mode");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<DailyReport> {
    let date_str: String = row.get("date")?;
    let date = NaiveDate::parse_from_str(&date_str, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DailyReport {
        id: Some(row.get("id")?),
        region_id: row.get("region_id")?,
        submitter: row.get("submitter")?,
        date,
        seed_plan: row.get("seed_plan")?,
        seed_fact: row.get("seed_fact")?,
        seed_dif: row.get("seed_dif")?,
        pumpkin_plan: row.get("pumpkin_plan")?,
        pumpkin_fact: row.get("pumpkin_fact")?,
        pumpkin_dif: row.get("pumpkin_dif")?,
        peanut_plan: row.get("peanut_plan")?,
        peanut_fact: row.get("peanut_fact")?,
        peanut_dif: row.get("peanut_dif")?,
        akb1: row.get("akb1")?,
        akb2: row.get("akb2")?,
        new_tt: row.get("new_tt")?,
        mix: row.get("mix")?,
        np_one: row.get("np_one")?,
        set_shelving: row.get("set_shelving")?,
        dmp: row.get("dmp")?,
        top_five: row.get("top_five")?,
        news: row.get("news")?,
    })
}

fn query_reports(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<DailyReport>, RepoError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_report)?;
    let reports = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    if reports.is_empty() {
        return Err(RepoError::NotFound);
    }
    Ok(reports)
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn create(&self, report: &DailyReport) -> Result<i64, RepoError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO daily_reports
             (region_id, submitter, date,
              seed_plan, seed_fact, seed_dif,
              pumpkin_plan, pumpkin_fact, pumpkin_dif,
              peanut_plan, peanut_fact, peanut_dif,
              akb1, akb2, new_tt, mix, np_one, set_shelving, dmp, top_five, news)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                report.region_id,
                report.submitter,
                report.date.format(DATE_FMT).to_string(),
                report.seed_plan,
                report.seed_fact,
                report.seed_dif,
                report.pumpkin_plan,
                report.pumpkin_fact,
                report.pumpkin_dif,
                report.peanut_plan,
                report.peanut_fact,
                report.peanut_dif,
                report.akb1,
                report.akb2,
                report.new_tt,
                report.mix,
                report.np_one,
                report.set_shelving,
                report.dmp,
                report.top_five,
                report.news,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update(
        &self,
        region_id: u32,
        submitter: &str,
        new: &DailyReport,
    ) -> Result<DailyReport, RepoError> {
        let conn = self.lock();
        let date_str = new.date.format(DATE_FMT).to_string();

        // Fetch prior values first so the caller can rebalance the aggregate.
        let old = conn.query_row(
            "SELECT * FROM daily_reports
             WHERE region_id = ?1 AND submitter = ?2 AND date = ?3",
            params![region_id, submitter, date_str],
            row_to_report,
        )?;

        let changed = conn.execute(
            "UPDATE daily_reports SET
                seed_plan = ?1, seed_fact = ?2, seed_dif = ?3,
                pumpkin_plan = ?4, pumpkin_fact = ?5, pumpkin_dif = ?6,
                peanut_plan = ?7, peanut_fact = ?8, peanut_dif = ?9,
                akb1 = ?10, akb2 = ?11, new_tt = ?12, mix = ?13, np_one = ?14,
                set_shelving = ?15, dmp = ?16, top_five = ?17, news = ?18
             WHERE region_id = ?19 AND submitter = ?20 AND date = ?21",
            params![
                new.seed_plan,
                new.seed_fact,
                new.seed_dif,
                new.pumpkin_plan,
                new.pumpkin_fact,
                new.pumpkin_dif,
                new.peanut_plan,
                new.peanut_fact,
                new.peanut_dif,
                new.akb1,
                new.akb2,
                new.new_tt,
                new.mix,
                new.np_one,
                new.set_shelving,
                new.dmp,
                new.top_five,
                new.news,
                region_id,
                submitter,
                date_str,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(old)
    }

    async fn delete_older_than(&self, cutoff: NaiveDate) -> Result<usize, RepoError> {
        let conn = self.lock();
        let deleted = conn.execute(
            "DELETE FROM daily_reports WHERE date < ?1",
            params![cutoff.format(DATE_FMT).to_string()],
        )?;
        Ok(deleted)
    }

    async fn reports_for_date(
        &self,
        region_id: u32,
        date: NaiveDate,
    ) -> Result<Vec<DailyReport>, RepoError> {
        let conn = self.lock();
        query_reports(
            &conn,
            "SELECT * FROM daily_reports
             WHERE region_id = ?1 AND date = ?2
             ORDER BY submitter",
            &[&region_id, &date.format(DATE_FMT).to_string()],
        )
    }

    async fn reports_for_date_by_submitter(
        &self,
        region_id: u32,
        submitter: &str,
        date: NaiveDate,
    ) -> Result<Vec<DailyReport>, RepoError> {
        let conn = self.lock();
        query_reports(
            &conn,
            "SELECT * FROM daily_reports
             WHERE region_id = ?1 AND submitter = ?2 AND date = ?3",
            &[
                &region_id,
                &submitter.to_string(),
                &date.format(DATE_FMT).to_string(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn report(region_id: u32, submitter: &str, d: NaiveDate) -> DailyReport {
        let mut r = DailyReport::new(region_id, submitter, d);
        r.seed_plan = 10.0;
        r.seed_fact = 12.0;
        r.seed_dif = 2.0;
        r.akb1 = 3;
        r
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let dir = tempdir().unwrap();
        let repo = SqliteReportRepository::new(dir.path().join("reports.db")).unwrap();

        let d = date(2025, 6, 1);
        let id = repo.create(&report(1, "ivanov", d)).await.unwrap();
        assert!(id > 0);

        let found = repo.reports_for_date(1, d).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].submitter, "ivanov");
        assert_eq!(found[0].seed_fact, 12.0);
        assert_eq!(found[0].id, Some(id));
    }

    #[tokio::test]
    async fn test_duplicate_key_is_distinguished() {
        let dir = tempdir().unwrap();
        let repo = SqliteReportRepository::new(dir.path().join("reports.db")).unwrap();

        let d = date(2025, 6, 1);
        repo.create(&report(1, "ivanov", d)).await.unwrap();

        let err = repo.create(&report(1, "ivanov", d)).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate));

        // Same submitter, different day or region is fine.
        repo.create(&report(1, "ivanov", date(2025, 6, 2))).await.unwrap();
        repo.create(&report(2, "ivanov", d)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_returns_prior_values() {
        let dir = tempdir().unwrap();
        let repo = SqliteReportRepository::new(dir.path().join("reports.db")).unwrap();

        let d = date(2025, 6, 1);
        repo.create(&report(1, "ivanov", d)).await.unwrap();

        let mut corrected = report(1, "ivanov", d);
        corrected.seed_fact = 20.0;
        corrected.seed_dif = 10.0;

        let old = repo.update(1, "ivanov", &corrected).await.unwrap();
        assert_eq!(old.seed_fact, 12.0);

        let found = repo.reports_for_date_by_submitter(1, "ivanov", d).await.unwrap();
        assert_eq!(found[0].seed_fact, 20.0);
        assert_eq!(found[0].seed_dif, 10.0);
    }

    #[tokio::test]
    async fn test_update_missing_report_is_not_found() {
        let dir = tempdir().unwrap();
        let repo = SqliteReportRepository::new(dir.path().join("reports.db")).unwrap();

        let err = repo
            .update(1, "nobody", &report(1, "nobody", date(2025, 6, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn test_empty_read_is_not_found() {
        let dir = tempdir().unwrap();
        let repo = SqliteReportRepository::new(dir.path().join("reports.db")).unwrap();

        let err = repo.reports_for_date(1, date(2025, 6, 1)).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_older_than_is_strict() {
        let dir = tempdir().unwrap();
        let repo = SqliteReportRepository::new(dir.path().join("reports.db")).unwrap();

        repo.create(&report(1, "a", date(2025, 5, 29))).await.unwrap();
        repo.create(&report(1, "b", date(2025, 5, 30))).await.unwrap();
        repo.create(&report(1, "c", date(2025, 6, 1))).await.unwrap();

        let deleted = repo.delete_older_than(date(2025, 5, 30)).await.unwrap();
        assert_eq!(deleted, 1);

        // The cutoff date itself survives.
        let kept = repo.reports_for_date(1, date(2025, 5, 30)).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert!(matches!(
            repo.reports_for_date(1, date(2025, 5, 29)).await.unwrap_err(),
            RepoError::NotFound
        ));
    }
}
