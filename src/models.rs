//! Data model for daily crop-sales reports and their regional aggregates

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily submission from a regional submitter.
///
/// Uniqueness: at most one report per (region_id, submitter, date). The
/// `*_dif` fields are fact - plan, computed by the service layer before the
/// report reaches storage or the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub region_id: u32,
    pub submitter: String,
    pub date: NaiveDate,

    pub seed_plan: f64,
    pub seed_fact: f64,
    pub seed_dif: f64,

    pub pumpkin_plan: f64,
    pub pumpkin_fact: f64,
    pub pumpkin_dif: f64,

    pub peanut_plan: f64,
    pub peanut_fact: f64,
    pub peanut_dif: f64,

    pub akb1: i64,
    pub akb2: i64,
    pub new_tt: i64,
    pub mix: i64,
    pub np_one: i64,
    pub set_shelving: i64,
    pub dmp: i64,
    pub top_five: i64,
    pub news: i64,
}

impl DailyReport {
    pub fn new(region_id: u32, submitter: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: None,
            region_id,
            submitter: submitter.into(),
            date,
            seed_plan: 0.0,
            seed_fact: 0.0,
            seed_dif: 0.0,
            pumpkin_plan: 0.0,
            pumpkin_fact: 0.0,
            pumpkin_dif: 0.0,
            peanut_plan: 0.0,
            peanut_fact: 0.0,
            peanut_dif: 0.0,
            akb1: 0,
            akb2: 0,
            new_tt: 0,
            mix: 0,
            np_one: 0,
            set_shelving: 0,
            dmp: 0,
            top_five: 0,
            news: 0,
        }
    }
}

/// Running elementwise sum of all reports for one region.
///
/// Derived state: rebuildable from the persisted reports, held only in
/// memory, handed out by value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionAggregate {
    pub seed_plan: f64,
    pub seed_fact: f64,
    pub seed_dif: f64,

    pub pumpkin_plan: f64,
    pub pumpkin_fact: f64,
    pub pumpkin_dif: f64,

    pub peanut_plan: f64,
    pub peanut_fact: f64,
    pub peanut_dif: f64,

    pub akb1: i64,
    pub akb2: i64,
    pub new_tt: i64,
    pub mix: i64,
    pub np_one: i64,
    pub set_shelving: i64,
    pub dmp: i64,
    pub top_five: i64,
    pub news: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsaved_report_serializes_without_id() {
        let report = DailyReport::new(1, "ivanov", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let json = serde_json::to_value(&report).unwrap();

        assert!(json.get("id").is_none());
        assert_eq!(json["region_id"], 1);
        assert_eq!(json["date"], "2025-06-01");
    }

    #[test]
    fn test_saved_report_keeps_id() {
        let mut report =
            DailyReport::new(1, "ivanov", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        report.id = Some(42);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["id"], 42);
    }
}
