use sqlx::PgPool;

use crate::db::models::Student;
use crate::db::types::StudentStatus;

pub(crate) const COLUMNS: &str = "\
    id, name, email, student_number, status, joined_at, updated_at, schema_version";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!("SELECT {COLUMNS} FROM students WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_many(pool: &PgPool, ids: &[String]) -> Result<Vec<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!(
        "SELECT {COLUMNS} FROM students WHERE id = ANY($1) ORDER BY name, id"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    status: Option<StudentStatus>,
) -> Result<Vec<Student>, sqlx::Error> {
    match status {
        Some(status) => {
            sqlx::query_as::<_, Student>(&format!(
                "SELECT {COLUMNS} FROM students WHERE status = $1 ORDER BY name, id"
            ))
            .bind(status)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Student>(&format!(
                "SELECT {COLUMNS} FROM students ORDER BY name, id"
            ))
            .fetch_all(pool)
            .await
        }
    }
}

pub(crate) async fn insert(pool: &PgPool, student: &Student) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO students ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    ))
    .bind(&student.id)
    .bind(&student.name)
    .bind(&student.email)
    .bind(&student.student_number)
    .bind(student.status)
    .bind(student.joined_at)
    .bind(student.updated_at)
    .bind(student.schema_version)
    .execute(pool)
    .await?;
    Ok(())
}

/// Email and join date are fixed once the student is on the roster.
pub(crate) async fn update(pool: &PgPool, student: &Student) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE students
         SET name = $1,
             student_number = $2,
             status = $3,
             updated_at = $4
         WHERE id = $5",
    )
    .bind(&student.name)
    .bind(&student.student_number)
    .bind(student.status)
    .bind(student.updated_at)
    .bind(&student.id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns `(all, active)`.
pub(crate) async fn count(pool: &PgPool) -> Result<(i64, i64), sqlx::Error> {
    sqlx::query_as(
        "SELECT count(*), count(*) FILTER (WHERE status = 'active') FROM students",
    )
    .fetch_one(pool)
    .await
}
