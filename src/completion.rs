use std::collections::hash_map::Entry;
use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{CompletionMode, CourseCompletionStat, ProgressRecord};

/// Fold raw progress rows for one course into an enrollment and
/// completion stat. Rows are revisioned, so only the latest
/// `updated_at` per (user, lesson) counts; ties keep the earlier row
/// in input order, which makes the result order-invariant.
pub fn compute_completion_rate(
    course_id: Uuid,
    records: &[ProgressRecord],
    total_lessons: i64,
    mode: CompletionMode,
) -> CourseCompletionStat {
    let mut latest: HashMap<(Uuid, Option<Uuid>), &ProgressRecord> = HashMap::new();
    for record in records.iter().filter(|r| r.course_id == course_id) {
        match latest.entry((record.user_id, record.lesson_id)) {
            Entry::Occupied(mut slot) => {
                if record.updated_at > slot.get().updated_at {
                    slot.insert(record);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }

    // Per user: count of completed lessons, plus whether any surviving
    // legacy row stores a 100% percentage.
    let mut per_user: HashMap<Uuid, (i64, bool)> = HashMap::new();
    for record in latest.values() {
        let entry = per_user.entry(record.user_id).or_insert((0, false));
        if record.lesson_id.is_some() && record.completed_at.is_some() {
            entry.0 += 1;
        }
        if record.progress_percentage == Some(100) {
            entry.1 = true;
        }
    }

    let enrolled_count = per_user.len() as i64;
    let completed_count = per_user
        .values()
        .filter(|(lessons_done, stored_done)| match mode {
            CompletionMode::PerLesson => progress_percent(*lessons_done, total_lessons) == 100,
            CompletionMode::StoredPercentage => *stored_done,
        })
        .count() as i64;

    let completion_rate = if enrolled_count > 0 {
        round2(completed_count as f64 / enrolled_count as f64 * 100.0)
    } else {
        0.0
    };

    CourseCompletionStat {
        course_id,
        enrolled_count,
        completed_count,
        completion_rate,
    }
}

/// Per-user progress as a whole percentage, 0 when the course has no
/// lessons.
pub fn progress_percent(completed_lessons: i64, total_lessons: i64) -> i64 {
    if total_lessons <= 0 {
        return 0;
    }
    let percent = (completed_lessons as f64 / total_lessons as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as i64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn course() -> Uuid {
        Uuid::from_u128(1)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn lesson_row(user: u128, lesson: u128, completed: bool, hour: u32) -> ProgressRecord {
        ProgressRecord {
            user_id: Uuid::from_u128(user),
            course_id: course(),
            lesson_id: Some(Uuid::from_u128(100 + lesson)),
            completed_at: completed.then(|| at(hour)),
            progress_percentage: None,
            updated_at: at(hour),
        }
    }

    fn legacy_row(user: u128, percentage: i32, hour: u32) -> ProgressRecord {
        ProgressRecord {
            user_id: Uuid::from_u128(user),
            course_id: course(),
            lesson_id: None,
            completed_at: None,
            progress_percentage: Some(percentage),
            updated_at: at(hour),
        }
    }

    #[test]
    fn full_completion_requires_every_lesson() {
        let mut records = Vec::new();
        for lesson in 1..=4 {
            records.push(lesson_row(1, lesson, true, 9));
        }
        records.push(lesson_row(2, 1, true, 9));
        records.push(lesson_row(2, 2, true, 9));

        let stat = compute_completion_rate(course(), &records, 4, CompletionMode::PerLesson);
        assert_eq!(stat.enrolled_count, 2);
        assert_eq!(stat.completed_count, 1);
        assert_eq!(stat.completion_rate, 50.0);
    }

    #[test]
    fn zero_lessons_never_divides_by_zero() {
        let records = vec![lesson_row(1, 1, true, 9), lesson_row(2, 1, false, 9)];
        let stat = compute_completion_rate(course(), &records, 0, CompletionMode::PerLesson);

        assert_eq!(stat.enrolled_count, 2);
        assert_eq!(stat.completed_count, 0);
        assert_eq!(stat.completion_rate, 0.0);
    }

    #[test]
    fn empty_records_yield_zero_stat() {
        let stat = compute_completion_rate(course(), &[], 4, CompletionMode::PerLesson);
        assert_eq!(stat.enrolled_count, 0);
        assert_eq!(stat.completed_count, 0);
        assert_eq!(stat.completion_rate, 0.0);
    }

    #[test]
    fn dedup_keeps_latest_revision_regardless_of_order() {
        // Lesson marked complete at 09:00 then reopened at 10:00.
        let records = vec![lesson_row(1, 1, true, 9), lesson_row(1, 1, false, 10)];
        let forward = compute_completion_rate(course(), &records, 1, CompletionMode::PerLesson);

        let reversed: Vec<ProgressRecord> = records.into_iter().rev().collect();
        let backward = compute_completion_rate(course(), &reversed, 1, CompletionMode::PerLesson);

        assert_eq!(forward, backward);
        assert_eq!(forward.enrolled_count, 1);
        assert_eq!(forward.completed_count, 0);
    }

    #[test]
    fn stored_percentage_mode_counts_users_not_rows() {
        let records = vec![
            legacy_row(1, 100, 9),
            // Later revision drops user 1 back below 100.
            legacy_row(1, 90, 10),
            legacy_row(2, 100, 9),
            legacy_row(3, 40, 9),
        ];
        let stat = compute_completion_rate(course(), &records, 0, CompletionMode::StoredPercentage);

        assert_eq!(stat.enrolled_count, 3);
        assert_eq!(stat.completed_count, 1);
        assert_eq!(stat.completion_rate, 33.33);
    }

    #[test]
    fn rate_is_reported_at_two_decimals() {
        let records = vec![
            lesson_row(1, 1, true, 9),
            lesson_row(2, 1, false, 9),
            lesson_row(3, 1, false, 9),
        ];
        let stat = compute_completion_rate(course(), &records, 1, CompletionMode::PerLesson);
        assert_eq!(stat.completion_rate, 33.33);
    }

    #[test]
    fn progress_percent_rounds_to_whole_numbers() {
        assert_eq!(progress_percent(0, 4), 0);
        assert_eq!(progress_percent(2, 4), 50);
        assert_eq!(progress_percent(3, 4), 75);
        assert_eq!(progress_percent(4, 4), 100);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(5, 0), 0);
    }
}
