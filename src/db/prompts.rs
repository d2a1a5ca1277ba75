use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use crate::db::models::NewPrompt;
use crate::error::Result;

/// Audit one LLM round that produced a final workout document. Returns the row id.
pub async fn create_prompt(conn: &mut SqliteConnection, new: &NewPrompt) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO prompts (user_id, prompt, response, thread_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )
    .bind(new.user_id)
    .bind(&new.prompt)
    .bind(&new.response)
    .bind(&new.thread_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Conversation thread that produced a workout, via its prompt back-reference.
pub async fn thread_id_for_workout(
    conn: &mut SqliteConnection,
    workout_id: i64,
) -> Result<Option<String>> {
    let row = sqlx::query(
        r"
        SELECT p.thread_id
        FROM workouts w
        JOIN prompts p ON p.id = w.prompt_id
        WHERE w.id = ?1
        ",
    )
    .bind(workout_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(match row {
        Some(row) => Some(row.try_get("thread_id")?),
        None => None,
    })
}
