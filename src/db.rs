use anyhow::Context;
use sqlx::postgres::{PgPoolOptions, PgQueryResult, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregate::{AssignmentFeed, FeedError};
use crate::config::AppConfig;
use crate::import::AssignmentImportRow;
use crate::models::{
    AssignmentRecord, AssignmentSource, CourseKey, CourseProfile, CourseSummary, GradeBreakdown,
    GradePreferences,
};
use crate::profile::StudentProfile;
use crate::store::{CourseProfileStore, StoreError};

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = config.database_url()?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created,
    AlreadyExists,
}

/// Registers a signed-in user. Existing users are left untouched.
pub async fn create_user(
    pool: &PgPool,
    user_id: &str,
    email: &str,
) -> anyhow::Result<CreateUserOutcome> {
    let result = sqlx::query(
        r#"
        INSERT INTO syllo.users (user_id, email)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(email)
    .execute(pool)
    .await
    .context("failed to create user")?;

    Ok(if result.rows_affected() > 0 {
        CreateUserOutcome::Created
    } else {
        CreateUserOutcome::AlreadyExists
    })
}

/// Stores the onboarding answers once they pass validation.
pub async fn save_student_profile(
    pool: &PgPool,
    user_id: &str,
    profile: &StudentProfile,
) -> anyhow::Result<()> {
    profile.validate()?;

    let result = sqlx::query(
        r#"
        UPDATE syllo.users
        SET first_name = $2, last_name = $3, profile_image = $4, majors = $5,
            departments = $6, gpa = $7, graduation_year = $8, bcourses_token = $9,
            updated_at = now()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(profile.first_name.trim())
    .bind(profile.last_name.trim())
    .bind(&profile.profile_image)
    .bind(&profile.majors)
    .bind(&profile.departments)
    .bind(&profile.gpa)
    .bind(&profile.graduation_year)
    .bind(&profile.bcourses_token)
    .execute(pool)
    .await
    .context("failed to save student profile")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("user {user_id} does not exist; create it first");
    }
    Ok(())
}

pub async fn fetch_user_courses(pool: &PgPool, user_id: &str) -> anyhow::Result<Vec<CourseSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT course, course_name, grade_style, predicted_grade
        FROM syllo.courses
        WHERE user_id = $1
        ORDER BY course
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut courses = Vec::new();
    for row in rows {
        let grade_style: String = row.get("grade_style");
        courses.push(CourseSummary {
            course: row.get("course"),
            course_name: row.get("course_name"),
            grade_style: grade_style.parse()?,
            predicted_grade: row.get("predicted_grade"),
        });
    }
    Ok(courses)
}

/// A re-imported `source_key` takes every column from the new row, owner
/// and platform included.
const UPSERT_ASSIGNMENT: &str = r#"
    INSERT INTO syllo.assignments
    (id, user_id, course, source, name, score, points_possible, source_key)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (source_key) DO UPDATE
    SET user_id = EXCLUDED.user_id, course = EXCLUDED.course,
        source = EXCLUDED.source, name = EXCLUDED.name, score = EXCLUDED.score,
        points_possible = EXCLUDED.points_possible, imported_at = now()
"#;

/// Inserts or refreshes imported assignments. Rows without a source key get
/// a generated one, so re-importing them creates duplicates.
pub async fn import_assignments(pool: &PgPool, rows: &[AssignmentImportRow]) -> anyhow::Result<usize> {
    let mut written = 0usize;

    for row in rows {
        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(UPSERT_ASSIGNMENT)
        .bind(Uuid::new_v4())
        .bind(&row.key.user_id)
        .bind(&row.key.course)
        .bind(row.record.source.as_str())
        .bind(&row.record.name)
        .bind(row.record.score)
        .bind(row.record.points_possible)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            written += 1;
        }
    }

    info!(rows = rows.len(), written, "imported assignments");
    Ok(written)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let user_id = "demo-student";
    create_user(pool, user_id, "avery.lee@berkeley.edu").await?;
    save_student_profile(
        pool,
        user_id,
        &StudentProfile {
            first_name: "Avery".to_string(),
            last_name: "Lee".to_string(),
            profile_image: Some("https://example.com/avery.png".to_string()),
            majors: vec!["Computer Science".to_string()],
            departments: vec!["EECS".to_string()],
            gpa: Some("3.6".to_string()),
            graduation_year: Some("2027".to_string()),
            bcourses_token: None,
        },
    )
    .await?;

    let key = CourseKey::new(user_id, "COMPSCI_61A");
    let breakdown: GradeBreakdown = [
        ("homework", "20%"),
        ("quizzes", "10%"),
        ("midterm_1", "15%"),
        ("midterm_2", "15%"),
        ("final", "40%"),
    ]
    .into_iter()
    .collect();
    let course = CourseProfile {
        course_name: "COMPSCI 61A: Structure and Interpretation of Computer Programs".to_string(),
        emails: serde_json::json!({ "instructor": "denero@berkeley.edu" }),
        grade_breakdown: Some(breakdown),
        important_dates: serde_json::json!({ "midterm_1": "2025-02-20", "final": "2025-05-13" }),
        office_hours: serde_json::json!({ "monday": "2-4pm Soda 271" }),
        ..CourseProfile::default()
    };
    let store = PgStore::new(pool.clone());
    store.save_course(&key, &course).await?;

    let assignments = vec![
        ("seed-hw-1", AssignmentSource::Canvas, "Homework 1", Some(9.0), 10.0),
        ("seed-hw-2", AssignmentSource::Gradescope, "HW 2", Some(8.5), 10.0),
        ("seed-quiz-1", AssignmentSource::Canvas, "Quiz 1", Some(4.0), 5.0),
        ("seed-mt-1", AssignmentSource::Gradescope, "Midterm 1", Some(41.0), 50.0),
        ("seed-mt-2", AssignmentSource::Gradescope, "Midterm 2", None, 50.0),
        ("seed-lab-1", AssignmentSource::Canvas, "Lab 1", Some(2.0), 2.0),
    ];
    let rows: Vec<AssignmentImportRow> = assignments
        .into_iter()
        .map(|(source_key, source, name, score, points_possible)| AssignmentImportRow {
            key: key.clone(),
            record: AssignmentRecord {
                name: name.to_string(),
                score,
                points_possible: Some(points_possible),
                source,
            },
            source_key: Some(source_key.to_string()),
        })
        .collect();
    import_assignments(pool, &rows).await?;

    Ok(())
}

/// Postgres-backed course profiles and imported assignment feeds.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_breakdown(&self, key: &CourseKey) -> Result<GradeBreakdown, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT category, weight
            FROM syllo.grade_breakdown_entries
            WHERE user_id = $1 AND course = $2
            ORDER BY position
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.course)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<String, _>("category"),
                    row.get::<String, _>("weight"),
                )
            })
            .collect())
    }
}

fn require_row(key: &CourseKey, result: PgQueryResult) -> Result<(), StoreError> {
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(key.clone()));
    }
    Ok(())
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(column);
    raw.parse()
        .map_err(|err: T::Err| StoreError::InvalidData(format!("{column}: {err}")))
}

impl CourseProfileStore for PgStore {
    async fn fetch_course(&self, key: &CourseKey) -> Result<Option<CourseProfile>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT course_name, emails, important_dates, office_hours, has_breakdown,
                   grade_style, grade_platform, predicted_grade, updated_at
            FROM syllo.courses
            WHERE user_id = $1 AND course = $2
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.course)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let grade_breakdown = if row.get::<bool, _>("has_breakdown") {
            Some(self.fetch_breakdown(key).await?)
        } else {
            None
        };

        Ok(Some(CourseProfile {
            course_name: row.get("course_name"),
            emails: row.get("emails"),
            grade_breakdown,
            important_dates: row.get("important_dates"),
            office_hours: row.get("office_hours"),
            grade_style: parse_column(&row, "grade_style")?,
            grade_platform: parse_column(&row, "grade_platform")?,
            predicted_grade: row.get("predicted_grade"),
            updated_at: Some(row.get("updated_at")),
        }))
    }

    async fn save_course(&self, key: &CourseKey, profile: &CourseProfile) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO syllo.courses
            (user_id, course, course_name, emails, important_dates, office_hours,
             has_breakdown, grade_style, grade_platform, predicted_grade, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
            ON CONFLICT (user_id, course) DO UPDATE
            SET course_name = EXCLUDED.course_name, emails = EXCLUDED.emails,
                important_dates = EXCLUDED.important_dates,
                office_hours = EXCLUDED.office_hours,
                has_breakdown = EXCLUDED.has_breakdown,
                grade_style = EXCLUDED.grade_style,
                grade_platform = EXCLUDED.grade_platform,
                predicted_grade = EXCLUDED.predicted_grade,
                updated_at = now()
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.course)
        .bind(&profile.course_name)
        .bind(&profile.emails)
        .bind(&profile.important_dates)
        .bind(&profile.office_hours)
        .bind(profile.grade_breakdown.is_some())
        .bind(profile.grade_style.as_str())
        .bind(profile.grade_platform.as_str())
        .bind(profile.predicted_grade)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM syllo.grade_breakdown_entries WHERE user_id = $1 AND course = $2")
            .bind(&key.user_id)
            .bind(&key.course)
            .execute(&mut *tx)
            .await?;

        if let Some(breakdown) = &profile.grade_breakdown {
            for (position, (category, weight)) in breakdown.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO syllo.grade_breakdown_entries
                    (user_id, course, position, category, weight)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(&key.user_id)
                .bind(&key.course)
                .bind(position as i32)
                .bind(category)
                .bind(weight)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!(course = %key, "saved course profile");
        Ok(())
    }

    async fn update_preferences(
        &self,
        key: &CourseKey,
        preferences: GradePreferences,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE syllo.courses
            SET grade_style = $3, grade_platform = $4, updated_at = now()
            WHERE user_id = $1 AND course = $2
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.course)
        .bind(preferences.style.as_str())
        .bind(preferences.platform.as_str())
        .execute(&self.pool)
        .await?;
        require_row(key, result)
    }

    async fn set_predicted_grade(&self, key: &CourseKey, grade: Option<f64>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE syllo.courses
            SET predicted_grade = $3, updated_at = now()
            WHERE user_id = $1 AND course = $2
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.course)
        .bind(grade)
        .execute(&self.pool)
        .await?;
        require_row(key, result)
    }
}

impl AssignmentFeed for PgStore {
    async fn fetch(
        &self,
        source: AssignmentSource,
        key: &CourseKey,
    ) -> Result<Vec<AssignmentRecord>, FeedError> {
        let rows = sqlx::query(
            r#"
            SELECT name, score, points_possible
            FROM syllo.assignments
            WHERE user_id = $1 AND course = $2 AND source = $3
            ORDER BY imported_at, name
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.course)
        .bind(source.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AssignmentRecord {
                name: row.get("name"),
                score: row.get("score"),
                points_possible: row.get("points_possible"),
                source,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reimport_overwrites_every_imported_column() {
        let (_, updates) = UPSERT_ASSIGNMENT
            .split_once("DO UPDATE")
            .expect("upsert clause");
        let updates: String = updates.split_whitespace().collect::<Vec<_>>().join(" ");
        for column in [
            "user_id",
            "course",
            "source",
            "name",
            "score",
            "points_possible",
        ] {
            assert!(
                updates.contains(&format!("{column} = EXCLUDED.{column}")),
                "{column} is not refreshed on re-import"
            );
        }
        assert!(updates.contains("imported_at = now()"));
    }
}
