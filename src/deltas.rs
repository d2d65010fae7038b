use crate::models::{DeltaPoint, OverallStats, StatChange, TimeBucket};

/// Annotate each point of a chronological series with its change
/// versus the immediately preceding point. Pure; run this before any
/// display truncation so deltas reflect true neighbors.
pub fn annotate_deltas(series: &[TimeBucket]) -> Vec<DeltaPoint> {
    series
        .iter()
        .enumerate()
        .map(|(index, bucket)| {
            let previous_count = index.checked_sub(1).map(|i| series[i].count);
            let (absolute_delta, percent_delta) = change_from(bucket.count, previous_count);
            DeltaPoint {
                bucket: bucket.clone(),
                previous_count,
                absolute_delta,
                percent_delta,
            }
        })
        .collect()
}

/// Compare the current headline stats against a previous snapshot.
/// The snapshot is supplied by the caller; persisting it between runs
/// is the caller's concern.
pub fn compare_snapshots(current: &OverallStats, previous: Option<&OverallStats>) -> Vec<StatChange> {
    let pairs = [
        ("total users", current.total_users, previous.map(|p| p.total_users)),
        ("active users", current.active_users, previous.map(|p| p.active_users)),
        ("published courses", current.total_courses, previous.map(|p| p.total_courses)),
        ("course completions", current.total_completions, previous.map(|p| p.total_completions)),
    ];

    pairs
        .into_iter()
        .map(|(metric, value, prior)| {
            let (absolute_delta, percent_delta) = change_from(value, prior);
            StatChange {
                metric,
                current: value,
                previous: prior,
                absolute_delta,
                percent_delta,
            }
        })
        .collect()
}

fn change_from(current: i64, previous: Option<i64>) -> (Option<i64>, Option<f64>) {
    match previous {
        None => (None, None),
        Some(prior) => {
            let absolute = current - prior;
            let percent = if prior != 0 {
                Some(round1(absolute as f64 / prior as f64 * 100.0))
            } else {
                None
            };
            (Some(absolute), percent)
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
