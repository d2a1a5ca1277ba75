use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

pub mod exercises;
pub mod models;
pub mod profiles;
pub mod prompts;
pub mod workouts;

#[cfg(test)]
pub mod test_utils;

pub type DbPool = SqlitePool;

/// Open the connection pool and apply embedded migrations.
pub async fn initialize_db(database_url: &str) -> crate::error::Result<DbPool> {
    tracing::info!(%database_url, "db.initializing");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("db.ready");
    Ok(pool)
}

/// Decode a JSON text column holding a string array. NULL and blank decode to empty.
pub(crate) fn decode_string_list(raw: Option<String>) -> crate::error::Result<Vec<String>> {
    match raw {
        Some(text) if !text.trim().is_empty() => Ok(serde_json::from_str(&text)?),
        _ => Ok(Vec::new()),
    }
}

pub(crate) fn encode_string_list(values: &[String]) -> crate::error::Result<String> {
    Ok(serde_json::to_string(values)?)
}
