//! In-memory per-region aggregation of daily reports
//!
//! `RegionalStats` mirrors the summed numeric fields of every persisted
//! report, keyed by region. It is a convenience cache: the SQLite store is
//! the source of truth and the map is rebuilt implicitly as new reports
//! arrive after a retention reset.

use crate::models::{DailyReport, RegionAggregate};
use std::collections::HashMap;
use std::sync::RwLock;

/// Round to 2 decimal places at the formatted-string level.
///
/// Formatting then reparsing keeps repeated add/subtract cycles from
/// accumulating binary floating-point noise (0.1 + 0.2 stays 0.30).
pub fn round2(val: f64) -> f64 {
    format!("{:.2}", val).parse().unwrap_or(val)
}

impl RegionAggregate {
    fn add_report(&mut self, r: &DailyReport) {
        self.seed_plan = round2(self.seed_plan + r.seed_plan);
        self.seed_fact = round2(self.seed_fact + r.seed_fact);
        self.seed_dif = round2(self.seed_dif + r.seed_dif);
        self.pumpkin_plan = round2(self.pumpkin_plan + r.pumpkin_plan);
        self.pumpkin_fact = round2(self.pumpkin_fact + r.pumpkin_fact);
        self.pumpkin_dif = round2(self.pumpkin_dif + r.pumpkin_dif);
        self.peanut_plan = round2(self.peanut_plan + r.peanut_plan);
        self.peanut_fact = round2(self.peanut_fact + r.peanut_fact);
        self.peanut_dif = round2(self.peanut_dif + r.peanut_dif);
        self.akb1 += r.akb1;
        self.akb2 += r.akb2;
        self.new_tt += r.new_tt;
        self.mix += r.mix;
        self.np_one += r.np_one;
        self.set_shelving += r.set_shelving;
        self.dmp += r.dmp;
        self.top_five += r.top_five;
        self.news += r.news;
    }

    fn subtract_report(&mut self, r: &DailyReport) {
        self.seed_plan = round2(self.seed_plan - r.seed_plan);
        self.seed_fact = round2(self.seed_fact - r.seed_fact);
        self.seed_dif = round2(self.seed_dif - r.seed_dif);
        self.pumpkin_plan = round2(self.pumpkin_plan - r.pumpkin_plan);
        self.pumpkin_fact = round2(self.pumpkin_fact - r.pumpkin_fact);
        self.pumpkin_dif = round2(self.pumpkin_dif - r.pumpkin_dif);
        self.peanut_plan = round2(self.peanut_plan - r.peanut_plan);
        self.peanut_fact = round2(self.peanut_fact - r.peanut_fact);
        self.peanut_dif = round2(self.peanut_dif - r.peanut_dif);
        self.akb1 -= r.akb1;
        self.akb2 -= r.akb2;
        self.new_tt -= r.new_tt;
        self.mix -= r.mix;
        self.np_one -= r.np_one;
        self.set_shelving -= r.set_shelving;
        self.dmp -= r.dmp;
        self.top_five -= r.top_five;
        self.news -= r.news;
    }

    fn merge(&mut self, other: &RegionAggregate) {
        self.seed_plan = round2(self.seed_plan + other.seed_plan);
        self.seed_fact = round2(self.seed_fact + other.seed_fact);
        self.seed_dif = round2(self.seed_dif + other.seed_dif);
        self.pumpkin_plan = round2(self.pumpkin_plan + other.pumpkin_plan);
        self.pumpkin_fact = round2(self.pumpkin_fact + other.pumpkin_fact);
        self.pumpkin_dif = round2(self.pumpkin_dif + other.pumpkin_dif);
        self.peanut_plan = round2(self.peanut_plan + other.peanut_plan);
        self.peanut_fact = round2(self.peanut_fact + other.peanut_fact);
        self.peanut_dif = round2(self.peanut_dif + other.peanut_dif);
        self.akb1 += other.akb1;
        self.akb2 += other.akb2;
        self.new_tt += other.new_tt;
        self.mix += other.mix;
        self.np_one += other.np_one;
        self.set_shelving += other.set_shelving;
        self.dmp += other.dmp;
        self.top_five += other.top_five;
        self.news += other.news;
    }
}

#[derive(Default)]
struct Inner {
    /// region_id -> aggregated numeric fields
    sums: HashMap<u32, RegionAggregate>,
    /// region_id -> number of reports added since the last reset
    counts: HashMap<u32, u64>,
}

/// Per-region aggregate store.
///
/// One exclusive lock guards every mutation; reads take the shared lock and
/// return value copies, so the lock is never held while a caller inspects or
/// serializes the result. No method holds the lock across an await point and
/// no method acquires it twice, so individual operations are atomic with
/// respect to concurrent readers.
pub struct RegionalStats {
    inner: RwLock<Inner>,
}

impl RegionalStats {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Fold a newly persisted report into its region's sums and bump the
    /// report count. Missing regions start from a zero-valued aggregate.
    pub fn add(&self, region_id: u32, report: &DailyReport) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .sums
            .entry(region_id)
            .or_default()
            .add_report(report);
        *inner.counts.entry(region_id).or_insert(0) += 1;
        log::debug!("added report to region {} aggregate", region_id);
    }

    /// Replace a corrected report's contribution: subtract `old`, add `new`.
    /// The report count is unchanged.
    ///
    /// The store does not verify that `old` was ever added; passing stale
    /// prior values silently desynchronizes the aggregate from the true sum
    /// until the next retention reset. Callers must source `old` from the
    /// repository's update path.
    pub fn update(&self, region_id: u32, old: &DailyReport, new: &DailyReport) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let agg = inner.sums.entry(region_id).or_default();
        agg.subtract_report(old);
        agg.add_report(new);
        log::debug!("updated report in region {} aggregate", region_id);
    }

    /// Current sums and report count for one region; zero values if the
    /// region has no recorded activity.
    pub fn get_for_region(&self, region_id: u32) -> (RegionAggregate, u64) {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let agg = inner.sums.get(&region_id).cloned().unwrap_or_default();
        let count = inner.counts.get(&region_id).copied().unwrap_or(0);
        (agg, count)
    }

    /// Snapshot of every region's sums.
    pub fn get_all(&self) -> HashMap<u32, RegionAggregate> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.sums.clone()
    }

    /// Snapshot of every region's report count.
    pub fn get_all_counts(&self) -> HashMap<u32, u64> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.counts.clone()
    }

    /// Network-wide totals: elementwise sum across all regions plus the
    /// total report count.
    pub fn total(&self) -> (RegionAggregate, u64) {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut total = RegionAggregate::default();
        for agg in inner.sums.values() {
            total.merge(agg);
        }
        let count = inner.counts.values().sum();
        (total, count)
    }

    /// Drop one region's entry entirely; subsequent reads see zero state.
    pub fn clear_region(&self, region_id: u32) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.sums.remove(&region_id);
        inner.counts.remove(&region_id);
    }

    /// Reset the whole store. Used by the retention task after a successful
    /// bulk delete.
    pub fn clear_all(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.sums = HashMap::new();
        inner.counts = HashMap::new();
    }
}

impl Default for RegionalStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn report(region_id: u32, seed_plan: f64, seed_fact: f64) -> DailyReport {
        let mut r = DailyReport::new(
            region_id,
            "tester",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        r.seed_plan = seed_plan;
        r.seed_fact = seed_fact;
        r.seed_dif = round2(seed_fact - seed_plan);
        r.akb1 = 1;
        r
    }

    #[test]
    fn test_add_accumulates_and_counts() {
        let stats = RegionalStats::new();

        stats.add(1, &report(1, 10.0, 12.0));
        stats.add(1, &report(1, 5.0, 5.0));

        let (agg, count) = stats.get_for_region(1);
        assert_eq!(count, 2);
        assert_eq!(agg.seed_plan, 15.0);
        assert_eq!(agg.seed_fact, 17.0);
        assert_eq!(agg.seed_dif, 2.0);
        assert_eq!(agg.akb1, 2);
    }

    #[test]
    fn test_update_replaces_contribution() {
        let stats = RegionalStats::new();
        let a = report(1, 10.0, 12.0);
        let b = report(1, 10.0, 20.0);

        stats.add(1, &a);
        stats.update(1, &a, &b);

        let (agg, count) = stats.get_for_region(1);
        assert_eq!(count, 1);
        assert_eq!(agg.seed_plan, b.seed_plan);
        assert_eq!(agg.seed_fact, b.seed_fact);
        assert_eq!(agg.seed_dif, b.seed_dif);
    }

    #[test]
    fn test_region_isolation() {
        let stats = RegionalStats::new();
        stats.add(1, &report(1, 10.0, 12.0));
        stats.add(2, &report(2, 3.0, 4.0));

        stats.clear_region(1);

        let (agg1, count1) = stats.get_for_region(1);
        assert_eq!(count1, 0);
        assert_eq!(agg1, RegionAggregate::default());

        let (agg2, count2) = stats.get_for_region(2);
        assert_eq!(count2, 1);
        assert_eq!(agg2.seed_fact, 4.0);
    }

    #[test]
    fn test_missing_region_reads_zero() {
        let stats = RegionalStats::new();
        let (agg, count) = stats.get_for_region(99);
        assert_eq!(count, 0);
        assert_eq!(agg, RegionAggregate::default());
        assert!(stats.get_all().is_empty());
        assert!(stats.get_all_counts().is_empty());
    }

    #[test]
    fn test_clear_all_resets_everything() {
        let stats = RegionalStats::new();
        stats.add(1, &report(1, 10.0, 12.0));
        stats.add(2, &report(2, 3.0, 4.0));

        stats.clear_all();

        assert!(stats.get_all().is_empty());
        assert!(stats.get_all_counts().is_empty());
        let (agg, count) = stats.get_for_region(1);
        assert_eq!(count, 0);
        assert_eq!(agg, RegionAggregate::default());
    }

    #[test]
    fn test_rounding_stays_at_two_decimals() {
        let stats = RegionalStats::new();
        let r = report(1, 0.0, 0.1);

        stats.add(1, &r);
        stats.add(1, &r);
        stats.add(1, &r);

        let (agg, _) = stats.get_for_region(1);
        // 0.1 + 0.1 + 0.1 must be exactly 0.3, not 0.30000000000000004
        assert_eq!(agg.seed_fact, 0.3);
    }

    #[test]
    fn test_total_across_regions() {
        let stats = RegionalStats::new();
        stats.add(1, &report(1, 10.0, 12.0));
        stats.add(2, &report(2, 5.0, 5.0));
        stats.add(2, &report(2, 1.0, 2.0));

        let (total, count) = stats.total();
        assert_eq!(count, 3);
        assert_eq!(total.seed_plan, 16.0);
        assert_eq!(total.seed_fact, 19.0);
        assert_eq!(total.akb1, 3);
    }

    #[test]
    fn test_concurrent_adds_lose_nothing() {
        let stats = Arc::new(RegionalStats::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    stats.add(1, &report(1, 1.0, 1.0));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let (agg, count) = stats.get_for_region(1);
        assert_eq!(count, 800);
        assert_eq!(agg.seed_plan, 800.0);
        assert_eq!(agg.akb1, 800);
    }

    #[test]
    fn test_round2_half_cases() {
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(1.005_000_1), 1.01);
        assert_eq!(round2(-0.125 - 0.125), -0.25);
        assert_eq!(round2(5.0), 5.0);
    }
}
