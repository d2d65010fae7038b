use std::fmt::Write;

use crate::models::{CourseCompletion, DeltaPoint, Granularity, OverallStats, StatChange};

const MAX_BAR_WIDTH: usize = 40;

/// Integer with an explicit sign. Zero counts as non-negative and
/// renders as "+0".
pub fn format_signed(value: i64) -> String {
    format!("{value:+}")
}

/// Change suffix for one series point, e.g. "+5 (+50.0%) vs previous
/// week". None for the first point of a series. When the previous
/// count was zero the percentage is omitted and the baseline shown
/// instead.
pub fn format_change(point: &DeltaPoint, granularity: Granularity) -> Option<String> {
    let previous = point.previous_count?;
    let absolute = point.absolute_delta?;
    let change = match point.percent_delta {
        Some(percent) => format!("{} ({:+.1}%)", format_signed(absolute), percent),
        None => format!("{} (from {})", format_signed(absolute), previous),
    };
    Some(format!("{change} vs previous {}", granularity.label()))
}

pub fn format_stat_change(change: &StatChange) -> String {
    match (change.previous, change.absolute_delta, change.percent_delta) {
        (Some(previous), Some(absolute), Some(percent)) => format!(
            "- {}: {} ({}, {:+.1}% vs {} last snapshot)",
            change.metric,
            change.current,
            format_signed(absolute),
            percent,
            previous
        ),
        (Some(previous), Some(absolute), None) => format!(
            "- {}: {} ({} vs {} last snapshot)",
            change.metric,
            change.current,
            format_signed(absolute),
            previous
        ),
        _ => format!("- {}: {}", change.metric, change.current),
    }
}

/// Text bar chart over an annotated series. Only the most recent
/// `max_points` are drawn; the deltas were computed over the full
/// series beforehand, so the first drawn bar still compares against
/// its true predecessor.
pub fn render_series(points: &[DeltaPoint], granularity: Granularity, max_points: usize) -> String {
    if points.is_empty() {
        return String::from("No data available\n");
    }

    let start = points.len().saturating_sub(max_points);
    let shown = &points[start..];
    let max_count = shown.iter().map(|p| p.bucket.count).max().unwrap_or(0).max(1);

    let mut output = String::new();
    for point in shown {
        let scaled =
            (point.bucket.count as f64 / max_count as f64 * MAX_BAR_WIDTH as f64).round() as usize;
        let bar = "#".repeat(scaled.max(usize::from(point.bucket.count > 0)));
        let change = match format_change(point, granularity) {
            Some(text) => format!("  ({text})"),
            None => String::new(),
        };
        let _ = writeln!(
            output,
            "{}  {:<width$}  {}{}",
            point.bucket.period_start,
            bar,
            point.bucket.count,
            change,
            width = MAX_BAR_WIDTH
        );
    }
    output
}

pub fn build_report(
    window_days: i64,
    granularity: Granularity,
    stats: &OverallStats,
    series: &[DeltaPoint],
    completions: &[CourseCompletion],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Back-Office Analytics Report");
    let _ = writeln!(
        output,
        "New-user series covers the last {window_days} days, bucketed per {}.",
        granularity.label()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Metrics");
    let _ = writeln!(output, "- Total users: {}", stats.total_users);
    let _ = writeln!(output, "- Active users (30d): {}", stats.active_users);
    let _ = writeln!(output, "- Published courses: {}", stats.total_courses);
    let _ = writeln!(output, "- Course completions: {}", stats.total_completions);

    let _ = writeln!(output);
    let _ = writeln!(output, "## New Users");

    if series.is_empty() {
        let _ = writeln!(output, "No signups recorded for this window.");
    } else {
        for point in series.iter() {
            let change = match format_change(point, granularity) {
                Some(text) => format!(" ({text})"),
                None => String::new(),
            };
            let _ = writeln!(
                output,
                "- {}: {}{}",
                point.bucket.period_start, point.bucket.count, change
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Completion");

    if completions.is_empty() {
        let _ = writeln!(output, "No completion data available.");
    } else {
        for course in completions.iter() {
            let _ = writeln!(
                output,
                "- {}: {}/{} completed ({:.2}%)",
                course.course_title,
                course.stat.completed_count,
                course.stat.enrolled_count,
                course.stat.completion_rate
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deltas::annotate_deltas;
    use crate::models::TimeBucket;
    use chrono::NaiveDate;

    fn bucket(day: u32, count: i64) -> TimeBucket {
        TimeBucket {
            period_start: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            count,
        }
    }

    #[test]
    fn zero_delta_still_gets_plus_prefix() {
        assert_eq!(format_signed(0), "+0");

        let points = annotate_deltas(&[bucket(1, 5), bucket(2, 5)]);
        let change = format_change(&points[1], Granularity::Day).unwrap();
        assert!(change.contains("+0 (+0.0%)"), "got: {change}");
    }

    #[test]
    fn first_point_has_no_change_suffix() {
        let points = annotate_deltas(&[bucket(1, 5)]);
        assert_eq!(format_change(&points[0], Granularity::Week), None);
    }

    #[test]
    fn zero_baseline_shows_origin_instead_of_percent() {
        let points = annotate_deltas(&[bucket(1, 0), bucket(2, 5)]);
        let change = format_change(&points[1], Granularity::Day).unwrap();
        assert!(change.contains("+5 (from 0)"), "got: {change}");
    }

    #[test]
    fn truncation_keeps_deltas_against_dropped_neighbors() {
        let points = annotate_deltas(&[bucket(1, 1), bucket(2, 10), bucket(3, 20)]);
        let chart = render_series(&points, Granularity::Day, 2);

        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines.len(), 2);
        // The first drawn bar still compares against the dropped point.
        assert!(lines[0].contains("+9"), "got: {}", lines[0]);
    }

    #[test]
    fn empty_series_renders_placeholder() {
        assert_eq!(render_series(&[], Granularity::Week, 30), "No data available\n");
    }

    #[test]
    fn report_covers_all_sections() {
        let stats = OverallStats {
            total_users: 10,
            active_users: 4,
            total_courses: 2,
            total_completions: 1,
        };
        let report = build_report(90, Granularity::Week, &stats, &[], &[]);

        assert!(report.contains("## Key Metrics"));
        assert!(report.contains("No signups recorded for this window."));
        assert!(report.contains("No completion data available."));
    }
}
