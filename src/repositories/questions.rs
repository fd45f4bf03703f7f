use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::db::models::Question;

pub(crate) const COLUMNS: &str =
    "id, exam_id, kind, prompt, canonical_answer, options, position, schema_version";

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY position, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn insert_many(
    conn: &mut PgConnection,
    questions: &[Question],
) -> Result<(), sqlx::Error> {
    if questions.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(format!("INSERT INTO questions ({COLUMNS}) "));
    builder.push_values(questions, |mut row, question| {
        row.push_bind(&question.id)
            .push_bind(&question.exam_id)
            .push_bind(question.kind)
            .push_bind(&question.prompt)
            .push_bind(&question.canonical_answer)
            .push_bind(question.options.as_ref().map(|options| Json(options.0.clone())))
            .push_bind(question.position)
            .push_bind(question.schema_version);
    });
    builder.build().execute(conn).await?;
    Ok(())
}

pub(crate) async fn delete_by_exam_in(
    conn: &mut PgConnection,
    exam_id: &str,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM questions WHERE exam_id = $1").bind(exam_id).execute(conn).await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_by_exam(pool: &PgPool, exam_id: &str) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM questions WHERE exam_id = $1").bind(exam_id).execute(pool).await?;
    Ok(result.rows_affected())
}
