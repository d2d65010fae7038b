use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One signup, as fetched from `profiles.created_at`.
#[derive(Debug, Clone)]
pub struct SignupEvent {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Bucket size for the new-user series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Granularity {
    #[value(alias = "daily")]
    Day,
    #[value(alias = "weekly")]
    Week,
}

impl Granularity {
    /// Also the truncation level understood by the SQL rollup.
    pub fn label(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBucket {
    pub period_start: NaiveDate,
    pub count: i64,
}

/// Which of the two progress schemas drives completion counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionMode {
    /// Derive completion from per-lesson `completed_at` timestamps.
    PerLesson,
    /// Legacy schema: trust the stored `progress_percentage` column.
    StoredPercentage,
}

/// A progress row. `lesson_id` is NULL for legacy per-course rows.
/// Rows are revisioned; only the latest `updated_at` per
/// (user, lesson) counts.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress_percentage: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseCompletionStat {
    pub course_id: Uuid,
    pub enrolled_count: i64,
    pub completed_count: i64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone)]
pub struct CourseCompletion {
    pub course_title: String,
    pub stat: CourseCompletionStat,
}

/// A series point annotated with the change versus its chronological
/// predecessor. The derived fields are None for the first point;
/// `percent_delta` is also None when the previous count was zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaPoint {
    pub bucket: TimeBucket,
    pub previous_count: Option<i64>,
    pub absolute_delta: Option<i64>,
    pub percent_delta: Option<f64>,
}

/// Dashboard headline numbers, persisted between runs as a JSON
/// snapshot for period-over-period comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_users: i64,
    pub active_users: i64,
    pub total_courses: i64,
    pub total_completions: i64,
}

#[derive(Debug, Clone)]
pub struct StatChange {
    pub metric: &'static str,
    pub current: i64,
    pub previous: Option<i64>,
    pub absolute_delta: Option<i64>,
    pub percent_delta: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
