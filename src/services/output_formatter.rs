use serde::Serialize;

use crate::db::models::{
    PlanDayExerciseRecord, PlanDayRecord, WorkoutBlockRecord, WorkoutRecord,
};

pub const DEFAULT_WORKOUT_NAME: &str = "Workout Plan";
pub const UNKNOWN_EXERCISE_NAME: &str = "Unknown exercise";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutWithDetails {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
    pub prompt_id: Option<i64>,
    pub is_active: bool,
    pub completed: bool,
    pub plan_days: Vec<PlanDayWithExercises>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDayWithExercises {
    pub id: i64,
    pub workout_id: i64,
    pub date: String,
    pub day_number: i64,
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub is_complete: bool,
    pub blocks: Vec<WorkoutBlockWithExercises>,
    /// Every prescribed exercise of the day across blocks, in block order.
    pub exercises: Vec<PlanDayExerciseDetails>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutBlockWithExercises {
    pub id: i64,
    pub block_type: String,
    pub block_name: String,
    pub block_duration_minutes: i64,
    pub time_cap_minutes: Option<i64>,
    pub rounds: i64,
    pub instructions: String,
    pub order: i64,
    pub exercises: Vec<PlanDayExerciseDetails>,
}

/// Prescription fields stay `null` when the plan does not prescribe them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDayExerciseDetails {
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
    pub completed: bool,
    pub exercise: ExerciseDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDetails {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub muscle_groups: Vec<String>,
    pub equipment: Vec<String>,
    pub difficulty: Option<String>,
    pub link: Option<String>,
}

pub fn transform_workout(record: &WorkoutRecord) -> WorkoutWithDetails {
    let workout = &record.workout;
    WorkoutWithDetails {
        id: workout.id,
        user_id: workout.user_id,
        name: workout
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_WORKOUT_NAME.to_string()),
        description: workout.description.clone().unwrap_or_default(),
        start_date: workout.start_date.format("%Y-%m-%d").to_string(),
        end_date: workout.end_date.format("%Y-%m-%d").to_string(),
        prompt_id: workout.prompt_id,
        is_active: workout.is_active,
        completed: workout.completed.unwrap_or(false),
        plan_days: record
            .plan_days
            .iter()
            .enumerate()
            .map(|(index, day)| transform_plan_day(day, index))
            .collect(),
    }
}

/// `index` is the day's position in its workout, used for name and number defaults.
pub fn transform_plan_day(record: &PlanDayRecord, index: usize) -> PlanDayWithExercises {
    let day = &record.plan_day;
    let blocks: Vec<WorkoutBlockWithExercises> = record
        .blocks
        .iter()
        .enumerate()
        .map(|(block_index, block)| transform_block(block, block_index))
        .collect();
    let exercises = blocks
        .iter()
        .flat_map(|block| block.exercises.iter().cloned())
        .collect();

    PlanDayWithExercises {
        id: day.id,
        workout_id: day.workout_id,
        date: day.date.clone(),
        day_number: day.day_number.unwrap_or(index as i64 + 1),
        name: day
            .name
            .clone()
            .unwrap_or_else(|| format!("Day {}", index + 1)),
        description: day.description.clone().unwrap_or_default(),
        instructions: day.instructions.clone().unwrap_or_default(),
        is_complete: day.is_complete.unwrap_or(false),
        blocks,
        exercises,
    }
}

fn transform_block(record: &WorkoutBlockRecord, index: usize) -> WorkoutBlockWithExercises {
    let block = &record.block;
    WorkoutBlockWithExercises {
        id: block.id,
        block_type: block.block_type.clone(),
        block_name: block
            .block_name
            .clone()
            .unwrap_or_else(|| format!("Block {}", index + 1)),
        block_duration_minutes: block.block_duration_minutes.unwrap_or(0),
        time_cap_minutes: block.time_cap_minutes,
        rounds: block.rounds.unwrap_or(1),
        instructions: block.instructions.clone().unwrap_or_default(),
        order: block.order,
        exercises: record.exercises.iter().map(transform_exercise).collect(),
    }
}

fn transform_exercise(record: &PlanDayExerciseRecord) -> PlanDayExerciseDetails {
    let pde = &record.plan_day_exercise;
    let exercise = match &record.exercise {
        Some(exercise) => ExerciseDetails {
            name: exercise.name.clone(),
            description: exercise.description.clone().unwrap_or_default(),
            instructions: exercise.instructions.clone().unwrap_or_default(),
            muscle_groups: exercise.muscle_groups.clone(),
            equipment: exercise.equipment.clone().unwrap_or_default(),
            difficulty: exercise.difficulty.clone(),
            link: exercise.link.clone(),
        },
        None => ExerciseDetails {
            name: UNKNOWN_EXERCISE_NAME.to_string(),
            description: String::new(),
            instructions: String::new(),
            muscle_groups: Vec::new(),
            equipment: Vec::new(),
            difficulty: None,
            link: None,
        },
    };

    PlanDayExerciseDetails {
        id: pde.id,
        workout_block_id: pde.workout_block_id,
        exercise_id: pde.exercise_id,
        sets: pde.sets,
        reps: pde.reps,
        weight: pde.weight,
        duration: pde.duration,
        rest_time: pde.rest_time,
        notes: pde.notes.clone(),
        order: pde.order,
        completed: pde.completed.unwrap_or(false),
        exercise,
    }
}
