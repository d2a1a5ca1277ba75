use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::clients::models::requests::ExerciseSearchRequest;
use crate::db::encode_string_list;
use crate::db::models::{Exercise, ExerciseMetadata, NewExercise};
use crate::error::Result;

pub const DEFAULT_SEARCH_LIMIT: u32 = 50;

const EXERCISE_COLUMNS: &str =
    "id, name, description, muscle_groups, equipment, difficulty, instructions, link, tag";

/// Case-insensitive substring lookup.
///
/// Several names can contain the query; an exact match wins, then the shortest
/// name, then the oldest row, so the result is stable for a given catalog.
pub async fn resolve_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Exercise>> {
    let needle = name.trim();
    if needle.is_empty() {
        return Ok(None);
    }

    let sql = format!(
        r"
        SELECT {}
        FROM exercises
        WHERE instr(LOWER(name), LOWER(?1)) > 0
        ORDER BY (LOWER(name) = LOWER(?1)) DESC, LENGTH(name) ASC, id ASC
        LIMIT 1
        ",
        EXERCISE_COLUMNS
    );

    let row = sqlx::query(&sql)
        .bind(needle)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref()
        .map(|row| Exercise::from_row(row, ""))
        .transpose()
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Exercise>> {
    let sql = format!("SELECT {} FROM exercises WHERE id = ?1", EXERCISE_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;

    row.as_ref()
        .map(|row| Exercise::from_row(row, ""))
        .transpose()
}

/// Return the catalog row matching `new.name`, inserting it only when nothing matches.
pub async fn create_if_absent(conn: &mut SqliteConnection, new: &NewExercise) -> Result<Exercise> {
    if let Some(existing) = resolve_by_name(conn, &new.name).await? {
        tracing::debug!(name = %new.name, exercise_id = existing.id, "exercise.already_exists");
        return Ok(existing);
    }

    let equipment = if new.equipment.is_empty() {
        None
    } else {
        Some(encode_string_list(&new.equipment)?)
    };

    let result = sqlx::query(
        r"
        INSERT INTO exercises (
            name, description, muscle_groups, equipment, difficulty,
            instructions, link, tag, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ",
    )
    .bind(new.name.trim())
    .bind(&new.description)
    .bind(encode_string_list(&new.muscle_groups)?)
    .bind(equipment)
    .bind(&new.difficulty)
    .bind(&new.instructions)
    .bind(&new.link)
    .bind(&new.tag)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    tracing::info!(name = %new.name, exercise_id = id, "exercise.created");

    find_by_id(conn, id)
        .await?
        .ok_or(sqlx::Error::RowNotFound.into())
}

/// Filter the catalog for a model-issued search request.
///
/// Every filter list is optional and matched case-insensitively. An equipment
/// filter of `bodyweight_only` (or `bodyweight`) accepts exercises with no
/// recorded equipment as well as those listing `bodyweight`.
pub async fn search(
    conn: &mut SqliteConnection,
    request: &ExerciseSearchRequest,
) -> Result<Vec<ExerciseMetadata>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM exercises e WHERE 1 = 1",
        EXERCISE_COLUMNS
    ));

    let muscle_groups = lowered(&request.muscle_groups);
    if !muscle_groups.is_empty() {
        builder.push(
            " AND EXISTS (SELECT 1 FROM json_each(e.muscle_groups) mg WHERE LOWER(mg.value) IN (",
        );
        push_list(&mut builder, &muscle_groups);
        builder.push("))");
    }

    let equipment = lowered(&request.equipment);
    if !equipment.is_empty() {
        let (bodyweight, named): (Vec<String>, Vec<String>) = equipment
            .into_iter()
            .partition(|value| is_bodyweight_filter(value));

        builder.push(" AND (");
        let mut has_clause = false;
        if !bodyweight.is_empty() {
            builder.push(
                "(e.equipment IS NULL OR json_array_length(e.equipment) = 0 \
                 OR EXISTS (SELECT 1 FROM json_each(e.equipment) eq WHERE LOWER(eq.value) = 'bodyweight'))",
            );
            has_clause = true;
        }
        if !named.is_empty() {
            if has_clause {
                builder.push(" OR ");
            }
            builder.push(
                "EXISTS (SELECT 1 FROM json_each(COALESCE(e.equipment, '[]')) eq WHERE LOWER(eq.value) IN (",
            );
            push_list(&mut builder, &named);
            builder.push("))");
        }
        builder.push(")");
    }

    let difficulty = lowered(&request.difficulty);
    if !difficulty.is_empty() {
        builder.push(" AND LOWER(e.difficulty) IN (");
        push_list(&mut builder, &difficulty);
        builder.push(")");
    }

    let styles = lowered(&request.styles);
    if !styles.is_empty() {
        builder.push(" AND LOWER(e.tag) IN (");
        push_list(&mut builder, &styles);
        builder.push(")");
    }

    let limit = request.limit.filter(|limit| *limit > 0).unwrap_or(DEFAULT_SEARCH_LIMIT);
    builder.push(" ORDER BY e.name ASC, e.id ASC LIMIT ");
    builder.push_bind(i64::from(limit));

    let rows = builder.build().fetch_all(&mut *conn).await?;

    let mut results = Vec::with_capacity(rows.len());
    for row in &rows {
        results.push(ExerciseMetadata::from(Exercise::from_row(row, "")?));
    }

    tracing::debug!(
        muscle_groups = ?request.muscle_groups,
        equipment = ?request.equipment,
        result_count = results.len(),
        "exercise.search"
    );

    Ok(results)
}

fn is_bodyweight_filter(value: &str) -> bool {
    value == "bodyweight_only" || value == "bodyweight"
}

fn lowered(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

fn push_list(builder: &mut QueryBuilder<Sqlite>, values: &[String]) {
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.clone());
    }
}
