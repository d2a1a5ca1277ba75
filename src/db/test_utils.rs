//! Test fixtures: in-memory database, seeded profiles and catalog rows.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::models::{Profile, ProfileData};
use crate::db::profiles;

/// In-memory SQLite with migrations applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Monday/Wednesday, 30 minutes, home gym with dumbbells.
pub fn sample_profile_data() -> ProfileData {
    ProfileData {
        age: Some(34),
        height: Some(178.0),
        weight: Some(80.5),
        gender: Some("female".to_string()),
        goals: Some(vec!["build_strength".to_string()]),
        limitations: Some(vec!["lower back".to_string()]),
        fitness_level: Some("intermediate".to_string()),
        environment: Some("home_gym".to_string()),
        equipment: Some(vec!["dumbbells".to_string(), "bench".to_string()]),
        other_equipment: Some("resistance bands".to_string()),
        preferred_styles: Some(vec!["strength".to_string(), "hiit".to_string()]),
        available_days: Some(vec!["monday".to_string(), "wednesday".to_string()]),
        workout_duration: Some(30),
        intensity_level: Some("moderate".to_string()),
        include_warmup: Some(true),
        include_cooldown: Some(false),
    }
}

pub async fn seed_profile(conn: &mut SqliteConnection, user_id: i64, data: &ProfileData) -> Profile {
    profiles::create_or_update_profile(conn, user_id, data)
        .await
        .expect("Failed to seed profile")
}

/// Insert a catalog row directly. `equipment: None` stores NULL, `Some(&[])` stores `[]`.
pub async fn seed_exercise(
    conn: &mut SqliteConnection,
    name: &str,
    muscle_groups: &[&str],
    equipment: Option<&[&str]>,
    difficulty: &str,
    tag: &str,
) -> i64 {
    let muscle_groups = serde_json::to_string(muscle_groups).expect("encode muscle groups");
    let equipment = equipment.map(|items| serde_json::to_string(items).expect("encode equipment"));

    sqlx::query(
        r"
        INSERT INTO exercises (name, muscle_groups, equipment, difficulty, tag, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
    )
    .bind(name)
    .bind(muscle_groups)
    .bind(equipment)
    .bind(difficulty)
    .bind(tag)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .expect("Failed to seed exercise")
    .last_insert_rowid()
}

/// Record a completed set against a plan day exercise, as the logging side would.
pub async fn seed_exercise_log(conn: &mut SqliteConnection, plan_day_exercise_id: i64) -> i64 {
    sqlx::query(
        r"
        INSERT INTO exercise_logs (plan_day_exercise_id, sets_completed, reps_completed, created_at)
        VALUES (?1, 3, 10, ?2)
        ",
    )
    .bind(plan_day_exercise_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .expect("Failed to seed exercise log")
    .last_insert_rowid()
}
