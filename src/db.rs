use anyhow::Context;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::buckets;
use crate::completion;
use crate::models::{
    CompletionMode, CourseCompletion, CourseCompletionStat, Granularity, OverallStats,
    ProgressRecord, SignupEvent, TimeBucket, UserProfile,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn ts(year: i32, month: u32, day: u32, hour: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .context("invalid timestamp")
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let profiles = vec![
        ("avery.lee@example.com", "Avery Lee", "student", ts(2026, 1, 5, 9)?),
        ("jules.moreno@example.com", "Jules Moreno", "student", ts(2026, 1, 6, 14)?),
        ("kiara.patel@example.com", "Kiara Patel", "student", ts(2026, 1, 12, 10)?),
        ("tomas.rivera@example.com", "Tomas Rivera", "student", ts(2026, 1, 21, 16)?),
        // A Sunday signup, to exercise week bucketing against live data.
        ("mei.tanaka@example.com", "Mei Tanaka", "student", ts(2026, 2, 1, 8)?),
        ("dana.okafor@example.com", "Dana Okafor", "admin", ts(2026, 1, 5, 11)?),
    ];

    for (email, full_name, role, created_at) in profiles {
        sqlx::query(
            r#"
            INSERT INTO backoffice.profiles (id, full_name, email, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, role = EXCLUDED.role
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(full_name)
        .bind(email)
        .bind(role)
        .bind(created_at)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        ("data-literacy", "Foundations of Data Literacy", true),
        ("spreadsheet-essentials", "Spreadsheet Essentials", true),
        ("instructor-onboarding", "Instructor Onboarding", false),
    ];

    for (slug, title, is_published) in courses {
        sqlx::query(
            r#"
            INSERT INTO backoffice.courses (id, title, slug, is_published)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO UPDATE
            SET title = EXCLUDED.title, is_published = EXCLUDED.is_published
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(slug)
        .bind(is_published)
        .execute(pool)
        .await?;
    }

    let lessons = vec![
        ("data-literacy", "Reading Tables", 1),
        ("data-literacy", "Averages and Medians", 2),
        ("data-literacy", "Charts That Lie", 3),
        ("data-literacy", "Telling the Story", 4),
        ("spreadsheet-essentials", "Formulas", 1),
        ("spreadsheet-essentials", "Pivot Tables", 2),
    ];

    for (slug, title, position) in lessons {
        let course = course_id_by_slug(pool, slug).await?;
        sqlx::query(
            r#"
            INSERT INTO backoffice.lessons (id, course_id, title, position)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (course_id, position) DO UPDATE SET title = EXCLUDED.title
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course)
        .bind(title)
        .bind(position)
        .execute(pool)
        .await?;
    }

    // (source_key, email, course slug, lesson position, completed_at,
    // stored percentage, updated_at). seed-106/107 are two revisions of
    // the same lesson; the later one wins.
    let progress: Vec<(
        &str,
        &str,
        &str,
        Option<i32>,
        Option<DateTime<Utc>>,
        Option<i32>,
        DateTime<Utc>,
    )> = vec![
        ("seed-101", "avery.lee@example.com", "data-literacy", Some(1), Some(ts(2026, 1, 7, 9)?), None, ts(2026, 1, 7, 9)?),
        ("seed-102", "avery.lee@example.com", "data-literacy", Some(2), Some(ts(2026, 1, 9, 9)?), None, ts(2026, 1, 9, 9)?),
        ("seed-103", "avery.lee@example.com", "data-literacy", Some(3), Some(ts(2026, 1, 14, 9)?), None, ts(2026, 1, 14, 9)?),
        ("seed-104", "avery.lee@example.com", "data-literacy", Some(4), Some(ts(2026, 1, 16, 9)?), None, ts(2026, 1, 16, 9)?),
        ("seed-105", "jules.moreno@example.com", "data-literacy", Some(1), Some(ts(2026, 1, 12, 19)?), None, ts(2026, 1, 12, 19)?),
        ("seed-106", "jules.moreno@example.com", "data-literacy", Some(2), None, None, ts(2026, 1, 20, 19)?),
        ("seed-107", "jules.moreno@example.com", "data-literacy", Some(2), Some(ts(2026, 1, 22, 19)?), None, ts(2026, 1, 22, 19)?),
        ("seed-108", "jules.moreno@example.com", "data-literacy", Some(3), None, None, ts(2026, 1, 25, 19)?),
        ("seed-109", "kiara.patel@example.com", "spreadsheet-essentials", Some(1), Some(ts(2026, 1, 15, 12)?), None, ts(2026, 1, 15, 12)?),
        ("seed-110", "kiara.patel@example.com", "spreadsheet-essentials", Some(2), Some(ts(2026, 1, 18, 12)?), None, ts(2026, 1, 18, 12)?),
        ("seed-111", "tomas.rivera@example.com", "spreadsheet-essentials", Some(1), None, None, ts(2026, 1, 23, 17)?),
        // Legacy rows with a stored percentage and no lesson id.
        ("seed-120", "avery.lee@example.com", "data-literacy", None, None, Some(100), ts(2026, 1, 16, 10)?),
        ("seed-121", "jules.moreno@example.com", "data-literacy", None, None, Some(50), ts(2026, 1, 25, 20)?),
        ("seed-122", "kiara.patel@example.com", "spreadsheet-essentials", None, None, Some(100), ts(2026, 1, 18, 13)?),
        ("seed-123", "tomas.rivera@example.com", "spreadsheet-essentials", None, None, Some(25), ts(2026, 1, 23, 18)?),
    ];

    for (source_key, email, slug, position, completed_at, percentage, updated_at) in progress {
        let user = profile_id_by_email(pool, email).await?;
        let course = course_id_by_slug(pool, slug).await?;
        let lesson = match position {
            Some(position) => Some(lesson_id_by_position(pool, course, position).await?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO backoffice.lesson_progress
            (id, user_id, course_id, lesson_id, completed_at, progress_percentage, updated_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(course)
        .bind(lesson)
        .bind(completed_at)
        .bind(percentage)
        .bind(updated_at)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn profile_id_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM backoffice.profiles WHERE email = $1")
        .bind(email)
        .fetch_one(pool)
        .await
        .with_context(|| format!("no profile for {email}"))?;
    Ok(row.get("id"))
}

async fn course_id_by_slug(pool: &PgPool, slug: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM backoffice.courses WHERE slug = $1")
        .bind(slug)
        .fetch_one(pool)
        .await
        .with_context(|| format!("no course for slug {slug}"))?;
    Ok(row.get("id"))
}

async fn lesson_id_by_position(pool: &PgPool, course_id: Uuid, position: i32) -> anyhow::Result<Uuid> {
    let row = sqlx::query(
        "SELECT id FROM backoffice.lessons WHERE course_id = $1 AND position = $2",
    )
    .bind(course_id)
    .bind(position)
    .fetch_one(pool)
    .await
    .with_context(|| format!("no lesson at position {position}"))?;
    Ok(row.get("id"))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        role: String,
        created_at: DateTime<Utc>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let outcome = sqlx::query(
            r#"
            INSERT INTO backoffice.profiles (id, full_name, email, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(&row.role)
        .bind(row.created_at)
        .execute(pool)
        .await?;

        if outcome.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_signup_events(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<SignupEvent>> {
    let rows = sqlx::query(
        "SELECT id, created_at FROM backoffice.profiles \
         WHERE created_at >= $1 ORDER BY created_at",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SignupEvent {
            user_id: row.get("id"),
            created_at: row.get("created_at"),
        })
        .collect())
}

async fn fetch_bucketed_series(
    pool: &PgPool,
    granularity: Granularity,
) -> Result<Vec<TimeBucket>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT period_start, new_users_count FROM backoffice.new_users_over_time($1)",
    )
    .bind(granularity.label())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| TimeBucket {
            period_start: row.get("period_start"),
            count: row.get("new_users_count"),
        })
        .collect())
}

/// New-user series, preferring the server-side rollup and falling
/// back to a client-side pass over raw signup timestamps. The window
/// constrains the fallback only; a precomputed series is used
/// verbatim.
pub async fn new_user_series(
    pool: &PgPool,
    granularity: Granularity,
    window_days: i64,
) -> anyhow::Result<Vec<TimeBucket>> {
    match fetch_bucketed_series(pool, granularity).await {
        Ok(mut series) => {
            // The rollup returns most-recent-first; callers expect
            // chronological order.
            series.reverse();
            Ok(series)
        }
        Err(err) => {
            eprintln!("server-side rollup unavailable ({err}); aggregating locally");
            let since = Utc::now() - Duration::days(window_days.max(1));
            let events = fetch_signup_events(pool, since).await?;
            Ok(buckets::aggregate_new_users(&events, granularity, window_days))
        }
    }
}

pub async fn overall_stats(pool: &PgPool, active_days: i64) -> anyhow::Result<OverallStats> {
    let cutoff = Utc::now() - Duration::days(active_days.max(1));

    let total_users: i64 = sqlx::query_scalar("SELECT count(*) FROM backoffice.profiles")
        .fetch_one(pool)
        .await?;
    let active_users: i64 = sqlx::query_scalar(
        "SELECT count(DISTINCT user_id) FROM backoffice.lesson_progress WHERE updated_at >= $1",
    )
    .bind(cutoff)
    .fetch_one(pool)
    .await?;
    let total_courses: i64 =
        sqlx::query_scalar("SELECT count(*) FROM backoffice.courses WHERE is_published")
            .fetch_one(pool)
            .await?;
    let total_completions: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM backoffice.lesson_progress WHERE progress_percentage = 100",
    )
    .fetch_one(pool)
    .await?;

    Ok(OverallStats {
        total_users,
        active_users,
        total_courses,
        total_completions,
    })
}

async fn fetch_published_courses(pool: &PgPool) -> anyhow::Result<Vec<(Uuid, String)>> {
    let rows = sqlx::query(
        "SELECT id, title FROM backoffice.courses WHERE is_published ORDER BY title",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("id"), row.get("title")))
        .collect())
}

pub async fn fetch_progress_records(
    pool: &PgPool,
    course_id: Uuid,
) -> anyhow::Result<Vec<ProgressRecord>> {
    let rows = sqlx::query(
        "SELECT user_id, course_id, lesson_id, completed_at, progress_percentage, updated_at \
         FROM backoffice.lesson_progress WHERE course_id = $1",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ProgressRecord {
            user_id: row.get("user_id"),
            course_id: row.get("course_id"),
            lesson_id: row.get("lesson_id"),
            completed_at: row.get("completed_at"),
            progress_percentage: row.get("progress_percentage"),
            updated_at: row.get("updated_at"),
        })
        .collect())
}

pub async fn fetch_lesson_count(pool: &PgPool, course_id: Uuid) -> anyhow::Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT count(*) FROM backoffice.lessons WHERE course_id = $1")
            .bind(course_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

async fn fetch_completion_rollup(pool: &PgPool) -> Result<Vec<CourseCompletion>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT course_id, course_title, total_enrollments, completed_count, completion_rate \
         FROM backoffice.course_completion_rates()",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CourseCompletion {
            course_title: row.get("course_title"),
            stat: CourseCompletionStat {
                course_id: row.get("course_id"),
                enrolled_count: row.get("total_enrollments"),
                completed_count: row.get("completed_count"),
                completion_rate: row.get("completion_rate"),
            },
        })
        .collect())
}

/// Completion rates for all published courses, sorted descending by
/// rate. Stored-percentage mode prefers the SQL rollup when installed;
/// per-lesson mode always folds the raw rows client-side.
pub async fn course_completion_rates(
    pool: &PgPool,
    mode: CompletionMode,
) -> anyhow::Result<Vec<CourseCompletion>> {
    if mode == CompletionMode::StoredPercentage {
        match fetch_completion_rollup(pool).await {
            Ok(rollup) => return Ok(rollup),
            Err(err) => {
                eprintln!("completion rollup unavailable ({err}); computing locally");
            }
        }
    }

    let mut rates = Vec::new();
    for (course_id, course_title) in fetch_published_courses(pool).await? {
        let records = fetch_progress_records(pool, course_id).await?;
        let total_lessons = fetch_lesson_count(pool, course_id).await?;
        let stat = completion::compute_completion_rate(course_id, &records, total_lessons, mode);
        rates.push(CourseCompletion { course_title, stat });
    }

    rates.sort_by(|a, b| {
        b.stat
            .completion_rate
            .partial_cmp(&a.stat.completion_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(rates)
}

/// Name/email search over profiles, newest first. Terms shorter than
/// two characters match nothing.
pub async fn search_users(
    pool: &PgPool,
    term: &str,
    limit: i64,
) -> anyhow::Result<Vec<UserProfile>> {
    let clean = term.trim();
    if clean.len() < 2 {
        return Ok(Vec::new());
    }
    let pattern = format!("%{clean}%");

    let rows = sqlx::query(
        "SELECT id, full_name, email, role, created_at, updated_at \
         FROM backoffice.profiles \
         WHERE full_name ILIKE $1 OR email ILIKE $1 \
         ORDER BY created_at DESC \
         LIMIT $2",
    )
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| UserProfile {
            id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
            role: row.get("role"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
        .collect())
}
