use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db::encode_string_list;
use crate::db::models::{Profile, ProfileData};
use crate::error::Result;

const PROFILE_COLUMNS: &str = r"
    id, user_id, age, height, weight, gender, goals, limitations, fitness_level,
    environment, equipment, other_equipment, preferred_styles, available_days,
    workout_duration, intensity_level, include_warmup, include_cooldown,
    created_at, updated_at
";

pub async fn get_profile_by_user_id(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles WHERE user_id = ?1", PROFILE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(Profile::from_row).transpose()
}

/// Insert a profile or merge the supplied fields into the stored one.
pub async fn create_or_update_profile(
    conn: &mut SqliteConnection,
    user_id: i64,
    data: &ProfileData,
) -> Result<Profile> {
    let existing = get_profile_by_user_id(conn, user_id).await?;
    let now = Utc::now();

    let merged = merge(existing.as_ref(), data);

    sqlx::query(
        r"
        INSERT INTO profiles (
            user_id, age, height, weight, gender, goals, limitations, fitness_level,
            environment, equipment, other_equipment, preferred_styles, available_days,
            workout_duration, intensity_level, include_warmup, include_cooldown,
            created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
        ON CONFLICT(user_id) DO UPDATE SET
            age = excluded.age,
            height = excluded.height,
            weight = excluded.weight,
            gender = excluded.gender,
            goals = excluded.goals,
            limitations = excluded.limitations,
            fitness_level = excluded.fitness_level,
            environment = excluded.environment,
            equipment = excluded.equipment,
            other_equipment = excluded.other_equipment,
            preferred_styles = excluded.preferred_styles,
            available_days = excluded.available_days,
            workout_duration = excluded.workout_duration,
            intensity_level = excluded.intensity_level,
            include_warmup = excluded.include_warmup,
            include_cooldown = excluded.include_cooldown,
            updated_at = excluded.updated_at
        ",
    )
    .bind(user_id)
    .bind(merged.age)
    .bind(merged.height)
    .bind(merged.weight)
    .bind(&merged.gender)
    .bind(encode_string_list(&merged.goals)?)
    .bind(encode_string_list(&merged.limitations)?)
    .bind(&merged.fitness_level)
    .bind(&merged.environment)
    .bind(encode_string_list(&merged.equipment)?)
    .bind(&merged.other_equipment)
    .bind(encode_string_list(&merged.preferred_styles)?)
    .bind(encode_string_list(&merged.available_days)?)
    .bind(merged.workout_duration)
    .bind(&merged.intensity_level)
    .bind(merged.include_warmup)
    .bind(merged.include_cooldown)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    tracing::info!(user_id, "profile.saved");

    get_profile_by_user_id(conn, user_id)
        .await?
        .ok_or(crate::error::PlannerError::ProfileNotFound(user_id))
}

struct MergedProfile {
    age: Option<i64>,
    height: Option<f64>,
    weight: Option<f64>,
    gender: Option<String>,
    goals: Vec<String>,
    limitations: Vec<String>,
    fitness_level: Option<String>,
    environment: Option<String>,
    equipment: Vec<String>,
    other_equipment: Option<String>,
    preferred_styles: Vec<String>,
    available_days: Vec<String>,
    workout_duration: Option<i64>,
    intensity_level: Option<String>,
    include_warmup: bool,
    include_cooldown: bool,
}

fn merge(existing: Option<&Profile>, data: &ProfileData) -> MergedProfile {
    fn pick<T: Clone>(new: &Option<T>, old: Option<&T>) -> Option<T> {
        new.clone().or_else(|| old.cloned())
    }

    fn pick_list(new: &Option<Vec<String>>, old: Option<&Vec<String>>) -> Vec<String> {
        new.clone()
            .or_else(|| old.cloned())
            .unwrap_or_default()
    }

    MergedProfile {
        age: pick(&data.age, existing.and_then(|p| p.age.as_ref())),
        height: pick(&data.height, existing.and_then(|p| p.height.as_ref())),
        weight: pick(&data.weight, existing.and_then(|p| p.weight.as_ref())),
        gender: pick(&data.gender, existing.and_then(|p| p.gender.as_ref())),
        goals: pick_list(&data.goals, existing.map(|p| &p.goals)),
        limitations: pick_list(&data.limitations, existing.map(|p| &p.limitations)),
        fitness_level: pick(
            &data.fitness_level,
            existing.and_then(|p| p.fitness_level.as_ref()),
        ),
        environment: pick(
            &data.environment,
            existing.and_then(|p| p.environment.as_ref()),
        ),
        equipment: pick_list(&data.equipment, existing.map(|p| &p.equipment)),
        other_equipment: pick(
            &data.other_equipment,
            existing.and_then(|p| p.other_equipment.as_ref()),
        ),
        preferred_styles: pick_list(&data.preferred_styles, existing.map(|p| &p.preferred_styles)),
        available_days: pick_list(&data.available_days, existing.map(|p| &p.available_days)),
        workout_duration: pick(
            &data.workout_duration,
            existing.and_then(|p| p.workout_duration.as_ref()),
        ),
        intensity_level: pick(
            &data.intensity_level,
            existing.and_then(|p| p.intensity_level.as_ref()),
        ),
        include_warmup: data
            .include_warmup
            .or(existing.map(|p| p.include_warmup))
            .unwrap_or(true),
        include_cooldown: data
            .include_cooldown
            .or(existing.map(|p| p.include_cooldown))
            .unwrap_or(true),
    }
}
