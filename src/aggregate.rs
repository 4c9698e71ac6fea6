use chrono::{Datelike, Duration, Months, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TimeUnit {
    Year,
    Month,
    Week,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Year => write!(f, "year"),
            TimeUnit::Month => write!(f, "month"),
            TimeUnit::Week => write!(f, "week"),
        }
    }
}

impl TimeUnit {
    /// First day of the calendar period containing `date`. Weeks are ISO
    /// weeks, starting on Monday.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
            TimeUnit::Month => {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
            }
            TimeUnit::Week => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
        }
    }

    pub fn label(&self, start: NaiveDate) -> String {
        match self {
            TimeUnit::Year => format!("{}", start.year()),
            TimeUnit::Month => start.format("%Y-%m").to_string(),
            TimeUnit::Week => {
                let week = start.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
        }
    }

    fn next_start(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            TimeUnit::Year => start.checked_add_months(Months::new(12)),
            TimeUnit::Month => start.checked_add_months(Months::new(1)),
            TimeUnit::Week => start.checked_add_signed(Duration::weeks(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPoint {
    pub label: String,
    pub start: NaiveDate,
    pub count: u32,
    pub cumulative: u32,
}

#[derive(Debug, Clone)]
pub struct BucketedSeries {
    pub unit: TimeUnit,
    pub points: Vec<BucketPoint>,
    /// Records dropped because their date field was missing or unparseable.
    pub dropped_dates: u32,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

impl BucketedSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Final cumulative count, i.e. the number of valid records.
    pub fn total(&self) -> u32 {
        self.points.last().map(|p| p.cumulative).unwrap_or(0)
    }
}

/// Group records by the calendar period containing their date and derive the
/// running cumulative count, ordered by bucket start ascending.
///
/// Records whose `date_field` is missing or unparseable are dropped and
/// counted in `dropped_dates`. With `include_empty_buckets` set, periods
/// with zero records between the first and last occupied bucket are emitted
/// with a count of 0; otherwise they are omitted.
pub fn bucket(
    table: &Table,
    date_field: &str,
    unit: TimeUnit,
    include_empty_buckets: bool,
) -> BucketedSeries {
    let start_time = Instant::now();

    let mut counts: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    let mut dropped = 0u32;
    let mut first_date: Option<NaiveDate> = None;
    let mut last_date: Option<NaiveDate> = None;

    for record in &table.records {
        let date = record.get(date_field).and_then(|v| v.as_date());
        match date {
            Some(date) => {
                first_date = Some(first_date.map_or(date, |d| d.min(date)));
                last_date = Some(last_date.map_or(date, |d| d.max(date)));
                *counts.entry(unit.bucket_start(date)).or_insert(0) += 1;
            }
            None => {
                debug!(
                    component = "bucketing",
                    field = date_field,
                    "Record dropped: missing or unparseable date"
                );
                dropped += 1;
            }
        }
    }

    if include_empty_buckets {
        fill_empty_buckets(&mut counts, unit);
    }

    let mut points = Vec::with_capacity(counts.len());
    let mut cumulative = 0u32;
    for (start, count) in counts {
        cumulative += count;
        points.push(BucketPoint {
            label: unit.label(start),
            start,
            count,
            cumulative,
        });
    }

    info!(
        action = "complete",
        component = "bucketing",
        unit = %unit,
        bucket_count = points.len(),
        valid_records = points.last().map(|p| p.cumulative).unwrap_or(0),
        dropped_records = dropped,
        duration_ms = start_time.elapsed().as_millis(),
        "Bucketing completed"
    );

    BucketedSeries {
        unit,
        points,
        dropped_dates: dropped,
        first_date,
        last_date,
    }
}

fn fill_empty_buckets(counts: &mut BTreeMap<NaiveDate, u32>, unit: TimeUnit) {
    let (Some(&first), Some(&last)) = (
        counts.keys().next(),
        counts.keys().next_back(),
    ) else {
        return;
    };

    let mut cursor = first;
    while cursor < last {
        match unit.next_start(cursor) {
            Some(next) => {
                counts.entry(next).or_insert(0);
                cursor = next;
            }
            None => break,
        }
    }
}

#[derive(Debug, Default)]
pub struct CategoryPartition {
    pub groups: BTreeMap<String, Table>,
    /// Records dropped because their category field was missing or blank.
    pub dropped: u32,
}

/// Split a table into one sub-table per distinct value of `category_field`.
/// Records with a missing or blank category are dropped and counted.
pub fn partition_by_category(table: &Table, category_field: &str) -> CategoryPartition {
    let mut partition = CategoryPartition::default();

    for record in &table.records {
        let category = record
            .get(category_field)
            .filter(|v| !v.is_empty())
            .map(|v| v.display());
        match category {
            Some(category) => {
                partition
                    .groups
                    .entry(category)
                    .or_insert_with(|| Table::new(table.headers.clone()))
                    .push(record.clone());
            }
            None => partition.dropped += 1,
        }
    }

    info!(
        action = "complete",
        component = "partition",
        field = category_field,
        category_count = partition.groups.len(),
        dropped_records = partition.dropped,
        "Category partition completed"
    );

    partition
}
