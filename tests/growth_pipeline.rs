//! End-to-end exercise of the growth pipeline below the loader: build a
//! table in memory, partition it by category, bucket each sub-table, fit a
//! growth model, and extrapolate past the observed range.

use patentee::aggregate::{bucket, partition_by_category, TimeUnit};
use patentee::fit::{fit, fit_points, predict, FitError, GrowthModelKind, GrowthParams};
use patentee::table::{Record, Table, Value};

fn logistic(x: f64, capacity: f64, rate: f64, midpoint: f64) -> f64 {
    capacity / (1.0 + (-rate * (x - midpoint)).exp())
}

/// A yearly table whose per-category cumulative counts follow a logistic
/// curve: the count for year index i is the rounded increment of the curve.
fn synthetic_table(categories: &[(&str, f64, f64, f64)], years: usize) -> Table {
    let mut table = Table::new(vec!["application_date".into(), "cpc".into()]);
    for &(category, capacity, rate, midpoint) in categories {
        let mut previous = 0u32;
        for i in 0..years {
            let target = logistic(i as f64, capacity, rate, midpoint).round() as u32;
            for _ in previous..target {
                let mut record = Record::new();
                record.set(
                    "application_date",
                    Value::Text(format!("{}-07-01", 1990 + i)),
                );
                record.set("cpc", Value::Text(category.to_string()));
                table.push(record);
            }
            previous = target;
        }
    }
    table
}

#[test]
fn partitioned_series_fit_and_extrapolate() {
    let table = synthetic_table(&[("AI", 400.0, 0.45, 9.0), ("Laser", 250.0, 0.35, 11.0)], 22);

    let partition = partition_by_category(&table, "cpc");
    assert_eq!(partition.dropped, 0);
    assert_eq!(partition.groups.len(), 2);

    let grouped: usize = partition.groups.values().map(|t| t.len()).sum();
    assert_eq!(grouped, table.len());

    for (category, sub_table) in &partition.groups {
        let series = bucket(sub_table, "application_date", TimeUnit::Year, false);
        assert_eq!(series.dropped_dates, 0);
        assert_eq!(series.total() as usize, sub_table.len());

        let outcome = fit(&series, GrowthModelKind::Logistic)
            .unwrap_or_else(|e| panic!("{} fit failed: {}", category, e));
        assert!(outcome.r_squared > 0.99, "{} r² = {}", category, outcome.r_squared);

        let GrowthParams::Logistic { capacity, .. } = outcome.params else {
            panic!("expected logistic parameters");
        };

        // Extrapolation far past the observed range approaches the capacity
        let far = predict(&outcome.params, &[(series.len() + 40) as f64])[0];
        assert!((far - capacity).abs() < 0.05 * capacity.abs());
    }
}

#[test]
fn drops_are_counted_not_fatal() {
    let mut table = synthetic_table(&[("AI", 120.0, 0.5, 6.0)], 14);
    // One record with a bad date, one with no category
    let mut bad_date = Record::new();
    bad_date.set("application_date", Value::Text("N/A".into()));
    bad_date.set("cpc", Value::Text("AI".into()));
    table.push(bad_date);
    let mut no_category = Record::new();
    no_category.set("application_date", Value::Text("2001-01-01".into()));
    table.push(no_category);

    let partition = partition_by_category(&table, "cpc");
    assert_eq!(partition.dropped, 1);

    let ai = &partition.groups["AI"];
    let series = bucket(ai, "application_date", TimeUnit::Year, false);
    assert_eq!(series.dropped_dates, 1);
    assert_eq!(
        series.total() as usize + 1,
        ai.len(),
        "valid records plus the dropped one account for the sub-table"
    );
}

#[test]
fn an_under_determined_series_is_skipped_not_crashed() {
    let result = fit_points(&[0.0, 1.0], &[1.0, 2.0], GrowthModelKind::Gompertz);
    match result {
        Err(FitError::DidNotConverge { .. }) => {}
        other => panic!("expected DidNotConverge, got {:?}", other.map(|o| o.params)),
    }
}
