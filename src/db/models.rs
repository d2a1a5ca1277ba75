use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::db::decode_string_list;
use crate::error::Result;

/// Training environment as stored on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    CommercialGym,
    HomeGym,
    BodyweightOnly,
    Other,
}

impl Environment {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_lowercase()).as_deref() {
            Some("commercial_gym") => Self::CommercialGym,
            Some("home_gym") => Self::HomeGym,
            Some("bodyweight_only") => Self::BodyweightOnly,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub age: Option<i64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub gender: Option<String>,
    pub goals: Vec<String>,
    pub limitations: Vec<String>,
    pub fitness_level: Option<String>,
    pub environment: Option<String>,
    pub equipment: Vec<String>,
    pub other_equipment: Option<String>,
    pub preferred_styles: Vec<String>,
    pub available_days: Vec<String>,
    pub workout_duration: Option<i64>,
    pub intensity_level: Option<String>,
    pub include_warmup: bool,
    pub include_cooldown: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            age: row.try_get("age")?,
            height: row.try_get("height")?,
            weight: row.try_get("weight")?,
            gender: row.try_get("gender")?,
            goals: decode_string_list(row.try_get("goals")?)?,
            limitations: decode_string_list(row.try_get("limitations")?)?,
            fitness_level: row.try_get("fitness_level")?,
            environment: row.try_get("environment")?,
            equipment: decode_string_list(row.try_get("equipment")?)?,
            other_equipment: row.try_get("other_equipment")?,
            preferred_styles: decode_string_list(row.try_get("preferred_styles")?)?,
            available_days: decode_string_list(row.try_get("available_days")?)?,
            workout_duration: row.try_get("workout_duration")?,
            intensity_level: row.try_get("intensity_level")?,
            include_warmup: row.try_get("include_warmup")?,
            include_cooldown: row.try_get("include_cooldown")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub fn environment(&self) -> Environment {
        Environment::parse(self.environment.as_deref())
    }

    /// Session length in minutes. Callers validate presence before generation.
    pub fn target_duration(&self) -> u32 {
        self.workout_duration
            .and_then(|minutes| u32::try_from(minutes).ok())
            .unwrap_or(0)
    }
}

/// Profile fields accepted by `create_or_update_profile`. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub age: Option<i64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub gender: Option<String>,
    pub goals: Option<Vec<String>>,
    pub limitations: Option<Vec<String>>,
    pub fitness_level: Option<String>,
    pub environment: Option<String>,
    pub equipment: Option<Vec<String>>,
    pub other_equipment: Option<String>,
    pub preferred_styles: Option<Vec<String>>,
    pub available_days: Option<Vec<String>>,
    pub workout_duration: Option<i64>,
    pub intensity_level: Option<String>,
    pub include_warmup: Option<bool>,
    pub include_cooldown: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub muscle_groups: Vec<String>,
    pub equipment: Option<Vec<String>>,
    pub difficulty: Option<String>,
    pub instructions: Option<String>,
    pub link: Option<String>,
    pub tag: Option<String>,
}

impl Exercise {
    /// Decode an exercise whose columns are aliased with `prefix` (empty for plain selects).
    pub(crate) fn from_row(row: &SqliteRow, prefix: &str) -> Result<Self> {
        let column = |name: &str| format!("{}{}", prefix, name);
        let equipment: Option<String> = row.try_get(column("equipment").as_str())?;

        Ok(Self {
            id: row.try_get(column("id").as_str())?,
            name: row.try_get(column("name").as_str())?,
            description: row.try_get(column("description").as_str())?,
            muscle_groups: decode_string_list(row.try_get(column("muscle_groups").as_str())?)?,
            equipment: match equipment {
                Some(raw) => Some(decode_string_list(Some(raw))?),
                None => None,
            },
            difficulty: row.try_get(column("difficulty").as_str())?,
            instructions: row.try_get(column("instructions").as_str())?,
            link: row.try_get(column("link").as_str())?,
            tag: row.try_get(column("tag").as_str())?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewExercise {
    pub name: String,
    pub description: Option<String>,
    pub muscle_groups: Vec<String>,
    pub equipment: Vec<String>,
    pub difficulty: Option<String>,
    pub instructions: Option<String>,
    pub link: Option<String>,
    pub tag: Option<String>,
}

/// The slice of an exercise handed back to the model during a search round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseMetadata {
    pub name: String,
    pub equipment: Vec<String>,
    pub muscle_groups: Vec<String>,
    pub difficulty: Option<String>,
}

impl From<Exercise> for ExerciseMetadata {
    fn from(exercise: Exercise) -> Self {
        Self {
            name: exercise.name,
            equipment: exercise.equipment.unwrap_or_default(),
            muscle_groups: exercise.muscle_groups,
            difficulty: exercise.difficulty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workout {
    pub id: i64,
    pub user_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub prompt_id: Option<i64>,
    pub is_active: bool,
    pub completed: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workout {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            prompt_id: row.try_get("prompt_id")?,
            is_active: row.try_get("is_active")?,
            completed: row.try_get("completed")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewWorkout {
    pub user_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub prompt_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct PlanDay {
    pub id: i64,
    pub workout_id: i64,
    pub date: String,
    pub day_number: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub is_complete: Option<bool>,
}

impl PlanDay {
    pub(crate) fn from_row(row: &SqliteRow, prefix: &str) -> Result<Self> {
        let column = |name: &str| format!("{}{}", prefix, name);
        Ok(Self {
            id: row.try_get(column("id").as_str())?,
            workout_id: row.try_get(column("workout_id").as_str())?,
            date: row.try_get(column("date").as_str())?,
            day_number: row.try_get(column("day_number").as_str())?,
            name: row.try_get(column("name").as_str())?,
            description: row.try_get(column("description").as_str())?,
            instructions: row.try_get(column("instructions").as_str())?,
            is_complete: row.try_get(column("is_complete").as_str())?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPlanDay {
    pub workout_id: i64,
    pub date: String,
    pub day_number: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlanDayUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkoutBlock {
    pub id: i64,
    pub plan_day_id: i64,
    pub block_type: String,
    pub block_name: Option<String>,
    pub block_duration_minutes: Option<i64>,
    pub time_cap_minutes: Option<i64>,
    pub rounds: Option<i64>,
    pub instructions: Option<String>,
    pub order: i64,
}

impl WorkoutBlock {
    pub(crate) fn from_row(row: &SqliteRow, prefix: &str) -> Result<Self> {
        let column = |name: &str| format!("{}{}", prefix, name);
        Ok(Self {
            id: row.try_get(column("id").as_str())?,
            plan_day_id: row.try_get(column("plan_day_id").as_str())?,
            block_type: row.try_get(column("block_type").as_str())?,
            block_name: row.try_get(column("block_name").as_str())?,
            block_duration_minutes: row.try_get(column("block_duration_minutes").as_str())?,
            time_cap_minutes: row.try_get(column("time_cap_minutes").as_str())?,
            rounds: row.try_get(column("rounds").as_str())?,
            instructions: row.try_get(column("instructions").as_str())?,
            order: row.try_get(column("block_order").as_str())?,
        })
    }
}

/// Block fields written on insert and on in-place update.
#[derive(Debug, Clone)]
pub struct WorkoutBlockValues {
    pub block_type: String,
    pub block_name: Option<String>,
    pub block_duration_minutes: Option<i64>,
    pub time_cap_minutes: Option<i64>,
    pub rounds: Option<i64>,
    pub instructions: Option<String>,
    pub order: i64,
}

#[derive(Debug, Clone)]
pub struct PlanDayExercise {
    pub id: i64,
    pub workout_block_id: i64,
    pub exercise_id: i64,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub duration: Option<i64>,
    pub rest_time: Option<i64>,
    pub notes: Option<String>,
    pub order: i64,
    pub completed: Option<bool>,
}

impl PlanDayExercise {
    pub(crate) fn from_row(row: &SqliteRow, prefix: &str) -> Result<Self> {
        let column = |name: &str| format!("{}{}", prefix, name);
        Ok(Self {
            id: row.try_get(column("id").as_str())?,
            workout_block_id: row.try_get(column("workout_block_id").as_str())?,
            exercise_id: row.try_get(column("exercise_id").as_str())?,
            sets: row.try_get(column("sets").as_str())?,
            reps: row.try_get(column("reps").as_str())?,
            weight: row.try_get(column("weight").as_str())?,
            duration: row.try_get(column("duration").as_str())?,
            rest_time: row.try_get(column("rest_time").as_str())?,
            notes: row.try_get(column("notes").as_str())?,
            order: row.try_get(column("exercise_order").as_str())?,
            completed: row.try_get(column("completed").as_str())?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPlanDayExercise {
    pub workout_block_id: i64,
    pub exercise_id: i64,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub duration: Option<i64>,
    pub rest_time: Option<i64>,
    pub notes: Option<String>,
    pub order: i64,
}

#[derive(Debug, Clone)]
pub struct NewPrompt {
    pub user_id: i64,
    pub prompt: String,
    pub response: String,
    pub thread_id: String,
}

// Nested read shapes produced by the workout join.

#[derive(Debug, Clone)]
pub struct WorkoutRecord {
    pub workout: Workout,
    pub plan_days: Vec<PlanDayRecord>,
}

#[derive(Debug, Clone)]
pub struct PlanDayRecord {
    pub plan_day: PlanDay,
    pub blocks: Vec<WorkoutBlockRecord>,
}

#[derive(Debug, Clone)]
pub struct WorkoutBlockRecord {
    pub block: WorkoutBlock,
    pub exercises: Vec<PlanDayExerciseRecord>,
}

#[derive(Debug, Clone)]
pub struct PlanDayExerciseRecord {
    pub plan_day_exercise: PlanDayExercise,
    pub exercise: Option<Exercise>,
}

impl PlanDayRecord {
    pub fn exercise_count(&self) -> usize {
        self.blocks.iter().map(|block| block.exercises.len()).sum()
    }
}
