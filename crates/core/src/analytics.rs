//! Dashboard aggregates: severity distribution and growth series.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::severity::SeverityClass;
use crate::types::Timestamp;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Patients per latest-finding bucket, in chart order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub no_dr: i64,
    pub mild_moderate: i64,
    pub severe_proliferative: i64,
}

impl Distribution {
    pub fn as_array(&self) -> [i64; 3] {
        [self.no_dr, self.mild_moderate, self.severe_proliferative]
    }
}

/// Count patients by the bucket of their latest diagnosis. Patients with no
/// diagnosis are not counted.
pub fn distribution<I>(latest: I) -> Distribution
where
    I: IntoIterator<Item = Option<SeverityClass>>,
{
    let mut dist = Distribution::default();
    for class in latest.into_iter().flatten() {
        match class.distribution_bucket() {
            0 => dist.no_dr += 1,
            1 => dist.mild_moderate += 1,
            _ => dist.severe_proliferative += 1,
        }
    }
    dist
}

// ---------------------------------------------------------------------------
// Growth series
// ---------------------------------------------------------------------------

/// Time window for the growth chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthMode {
    /// Every month with data, labelled `YYYY-MM`.
    All,
    /// The twelve months of one year.
    Year(i32),
    /// Each day of one month.
    Month { year: i32, month: u32 },
}

impl GrowthMode {
    /// Parse chart query parameters. Malformed year or month values fall back
    /// to the period containing `today`.
    pub fn parse(
        mode: Option<&str>,
        year: Option<&str>,
        month: Option<&str>,
        today: NaiveDate,
    ) -> Self {
        match mode.unwrap_or("all") {
            "year" => GrowthMode::Year(
                year.and_then(|y| y.trim().parse().ok())
                    .unwrap_or(today.year()),
            ),
            "month" => month
                .and_then(parse_year_month)
                .map(|(year, month)| GrowthMode::Month { year, month })
                .unwrap_or(GrowthMode::Month {
                    year: today.year(),
                    month: today.month(),
                }),
            _ => GrowthMode::All,
        }
    }
}

fn parse_year_month(value: &str) -> Option<(i32, u32)> {
    let (y, m) = value.trim().split_once('-')?;
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1).map(|_| (year, month))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(30, |d| d.day())
}

/// Labels plus new-patient and new-diagnosis counts per label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrowthSeries {
    pub labels: Vec<String>,
    pub patients: Vec<i64>,
    pub diagnoses: Vec<i64>,
}

/// Bucket creation timestamps into the periods of `mode`.
pub fn growth_series(
    mode: GrowthMode,
    patient_created: &[Timestamp],
    diagnosis_created: &[Timestamp],
    today: NaiveDate,
) -> GrowthSeries {
    match mode {
        GrowthMode::All => {
            let key = |t: &Timestamp| t.format("%Y-%m").to_string();
            let mut p_map: BTreeMap<String, i64> = BTreeMap::new();
            let mut d_map: BTreeMap<String, i64> = BTreeMap::new();
            for t in patient_created {
                *p_map.entry(key(t)).or_default() += 1;
            }
            for t in diagnosis_created {
                *d_map.entry(key(t)).or_default() += 1;
            }

            let mut labels: Vec<String> = p_map.keys().chain(d_map.keys()).cloned().collect();
            labels.sort();
            labels.dedup();
            if labels.is_empty() {
                labels.push(today.format("%Y-%m").to_string());
            }

            GrowthSeries {
                patients: labels.iter().map(|l| p_map.get(l).copied().unwrap_or(0)).collect(),
                diagnoses: labels.iter().map(|l| d_map.get(l).copied().unwrap_or(0)).collect(),
                labels,
            }
        }
        GrowthMode::Year(year) => {
            let count = |ts: &[Timestamp]| {
                let mut counts = vec![0i64; 12];
                for t in ts.iter().filter(|t| t.year() == year) {
                    counts[t.month0() as usize] += 1;
                }
                counts
            };
            GrowthSeries {
                labels: MONTH_LABELS.iter().map(|m| m.to_string()).collect(),
                patients: count(patient_created),
                diagnoses: count(diagnosis_created),
            }
        }
        GrowthMode::Month { year, month } => {
            let days = days_in_month(year, month) as usize;
            let count = |ts: &[Timestamp]| {
                let mut counts = vec![0i64; days];
                for t in ts.iter().filter(|t| t.year() == year && t.month() == month) {
                    counts[t.day0() as usize] += 1;
                }
                counts
            };
            GrowthSeries {
                labels: (1..=days).map(|d| d.to_string()).collect(),
                patients: count(patient_created),
                diagnoses: count(diagnosis_created),
            }
        }
    }
}
