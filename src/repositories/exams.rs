use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::Exam;
use crate::db::types::ExamStatus;

pub(crate) const COLUMNS: &str = "\
    id, title, description, duration_minutes, scheduled_date, status, \
    assigned_student_ids, question_assignments, created_by, created_at, updated_at, \
    schema_version";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list(
    pool: &PgPool,
    status: Option<ExamStatus>,
) -> Result<Vec<Exam>, sqlx::Error> {
    match status {
        Some(status) => {
            sqlx::query_as::<_, Exam>(&format!(
                "SELECT {COLUMNS} FROM exams WHERE status = $1 ORDER BY scheduled_date, id"
            ))
            .bind(status)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Exam>(&format!(
                "SELECT {COLUMNS} FROM exams ORDER BY scheduled_date, id"
            ))
            .fetch_all(pool)
            .await
        }
    }
}

pub(crate) async fn list_for_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {COLUMNS} FROM exams
         WHERE assigned_student_ids @> jsonb_build_array($1::text)
           AND status IN ($2, $3)
         ORDER BY scheduled_date, id"
    ))
    .bind(student_id)
    .bind(ExamStatus::Published)
    .bind(ExamStatus::Ongoing)
    .fetch_all(pool)
    .await
}

pub(crate) async fn insert(conn: &mut PgConnection, exam: &Exam) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO exams ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(&exam.id)
    .bind(&exam.title)
    .bind(&exam.description)
    .bind(exam.duration_minutes)
    .bind(exam.scheduled_date)
    .bind(exam.status)
    .bind(Json(&exam.assigned_student_ids.0))
    .bind(Json(&exam.question_assignments.0))
    .bind(&exam.created_by)
    .bind(exam.created_at)
    .bind(exam.updated_at)
    .bind(exam.schema_version)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn update(conn: &mut PgConnection, exam: &Exam) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams
         SET title = $1,
             description = $2,
             duration_minutes = $3,
             scheduled_date = $4,
             status = $5,
             assigned_student_ids = $6,
             question_assignments = $7,
             updated_at = $8
         WHERE id = $9",
    )
    .bind(&exam.title)
    .bind(&exam.description)
    .bind(exam.duration_minutes)
    .bind(exam.scheduled_date)
    .bind(exam.status)
    .bind(Json(&exam.assigned_student_ids.0))
    .bind(Json(&exam.question_assignments.0))
    .bind(exam.updated_at)
    .bind(&exam.id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_status(
    pool: &PgPool,
    id: &str,
    status: ExamStatus,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE exams SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn count_by_status(pool: &PgPool) -> Result<Vec<(ExamStatus, i64)>, sqlx::Error> {
    sqlx::query_as("SELECT status, count(*) FROM exams GROUP BY status").fetch_all(pool).await
}
