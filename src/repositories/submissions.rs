use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::{Submission, SCHEMA_VERSION};

use super::NewSubmission;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, student_name, submitted_at, answers, score, \
    total_auto_graded, total_questions, question_snapshot, schema_version";

pub(crate) async fn exists(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM submissions WHERE exam_id = $1 AND student_id = $2)",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_one(pool)
    .await
}

/// `submitted_at` is taken from the database clock, never from the caller.
pub(crate) async fn create(
    pool: &PgPool,
    id: &str,
    submission: &NewSubmission,
) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions (
            id, exam_id, student_id, student_name, answers, score,
            total_auto_graded, total_questions, question_snapshot, schema_version
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(&submission.exam_id)
    .bind(&submission.student_id)
    .bind(&submission.student_name)
    .bind(Json(&submission.answers))
    .bind(submission.score)
    .bind(submission.total_auto_graded)
    .bind(submission.total_questions)
    .bind(submission.question_snapshot.as_ref().map(Json))
    .bind(SCHEMA_VERSION)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE exam_id = $1 ORDER BY submitted_at DESC, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE student_id = $1 ORDER BY submitted_at DESC, id"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn delete_by_exam(pool: &PgPool, exam_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM submissions WHERE exam_id = $1")
        .bind(exam_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions ORDER BY submitted_at DESC, id LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT count(*) FROM submissions").fetch_one(pool).await
}
