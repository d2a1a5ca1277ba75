use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::db::models::{
    Exercise, NewPlanDay, NewPlanDayExercise, NewWorkout, PlanDay, PlanDayExercise,
    PlanDayExerciseRecord, PlanDayRecord, PlanDayUpdate, Workout, WorkoutBlock,
    WorkoutBlockRecord, WorkoutBlockValues, WorkoutRecord,
};
use crate::error::{PlannerError, Result};

const WORKOUT_COLUMNS: &str = r"
    id, user_id, name, description, start_date, end_date, prompt_id,
    is_active, completed, created_at, updated_at
";

const PLAN_DAY_COLUMNS: &str = r"
    pd.id AS pd_id, pd.workout_id AS pd_workout_id, pd.date AS pd_date,
    pd.day_number AS pd_day_number, pd.name AS pd_name, pd.description AS pd_description,
    pd.instructions AS pd_instructions, pd.is_complete AS pd_is_complete
";

const BLOCK_COLUMNS: &str = r"
    wb.id AS wb_id, wb.plan_day_id AS wb_plan_day_id, wb.block_type AS wb_block_type,
    wb.block_name AS wb_block_name, wb.block_duration_minutes AS wb_block_duration_minutes,
    wb.time_cap_minutes AS wb_time_cap_minutes, wb.rounds AS wb_rounds,
    wb.instructions AS wb_instructions, wb.block_order AS wb_block_order
";

const PLAN_DAY_EXERCISE_COLUMNS: &str = r"
    pde.id AS pde_id, pde.workout_block_id AS pde_workout_block_id,
    pde.exercise_id AS pde_exercise_id, pde.sets AS pde_sets, pde.reps AS pde_reps,
    pde.weight AS pde_weight, pde.duration AS pde_duration, pde.rest_time AS pde_rest_time,
    pde.notes AS pde_notes, pde.exercise_order AS pde_exercise_order,
    pde.completed AS pde_completed
";

const JOINED_EXERCISE_COLUMNS: &str = r"
    e.id AS e_id, e.name AS e_name, e.description AS e_description,
    e.muscle_groups AS e_muscle_groups, e.equipment AS e_equipment,
    e.difficulty AS e_difficulty, e.instructions AS e_instructions, e.link AS e_link,
    e.tag AS e_tag
";

const PLAN_DAY_TREE_ORDER: &str = r"
    ORDER BY pd.day_number ASC, pd.id ASC, wb.block_order ASC, wb.id ASC,
             pde.exercise_order ASC, pde.id ASC
";

fn plan_day_tree_sql(filter: &str) -> String {
    format!(
        r"
        SELECT {}, {}, {}, {}
        FROM plan_days pd
        LEFT JOIN workout_blocks wb ON wb.plan_day_id = pd.id
        LEFT JOIN plan_day_exercises pde ON pde.workout_block_id = wb.id
        LEFT JOIN exercises e ON e.id = pde.exercise_id
        WHERE {}
        {}
        ",
        PLAN_DAY_COLUMNS,
        BLOCK_COLUMNS,
        PLAN_DAY_EXERCISE_COLUMNS,
        JOINED_EXERCISE_COLUMNS,
        filter,
        PLAN_DAY_TREE_ORDER
    )
}

/// Mark every active workout of the user inactive. Returns the number of rows changed.
pub async fn deactivate_active_workouts(conn: &mut SqliteConnection, user_id: i64) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE workouts SET is_active = 0, updated_at = ?2 WHERE user_id = ?1 AND is_active = 1",
    )
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn find_active_workout(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Option<Workout>> {
    let sql = format!(
        "SELECT {} FROM workouts WHERE user_id = ?1 AND is_active = 1 ORDER BY id DESC LIMIT 1",
        WORKOUT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(Workout::from_row).transpose()
}

pub async fn find_workout(conn: &mut SqliteConnection, workout_id: i64) -> Result<Option<Workout>> {
    let sql = format!("SELECT {} FROM workouts WHERE id = ?1", WORKOUT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(workout_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(Workout::from_row).transpose()
}

/// Insert an active workout and return it fully hydrated.
///
/// Fails with `ActiveWorkoutConflict` when the user still has an active workout.
pub async fn create_workout(conn: &mut SqliteConnection, new: &NewWorkout) -> Result<WorkoutRecord> {
    let now = Utc::now();
    let result = sqlx::query(
        r"
        INSERT INTO workouts (
            user_id, name, description, start_date, end_date, prompt_id,
            is_active, completed, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, ?7, ?7)
        ",
    )
    .bind(new.user_id)
    .bind(&new.name)
    .bind(&new.description)
    .bind(new.start_date)
    .bind(new.end_date)
    .bind(new.prompt_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            PlannerError::ActiveWorkoutConflict(new.user_id)
        }
        other => PlannerError::Database(other),
    })?;

    let workout_id = result.last_insert_rowid();
    tracing::debug!(workout_id, user_id = new.user_id, "workout.created");

    find_workout_with_details(conn, workout_id)
        .await?
        .ok_or(PlannerError::Database(sqlx::Error::RowNotFound))
}

/// Workout with plan days, blocks, prescribed exercises and their catalog rows.
pub async fn find_workout_with_details(
    conn: &mut SqliteConnection,
    workout_id: i64,
) -> Result<Option<WorkoutRecord>> {
    let Some(workout) = find_workout(conn, workout_id).await? else {
        return Ok(None);
    };

    let rows = sqlx::query(&plan_day_tree_sql("pd.workout_id = ?1"))
        .bind(workout_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Some(WorkoutRecord {
        workout,
        plan_days: fold_plan_days(&rows)?,
    }))
}

pub async fn find_plan_day_with_details(
    conn: &mut SqliteConnection,
    plan_day_id: i64,
) -> Result<Option<PlanDayRecord>> {
    let rows = sqlx::query(&plan_day_tree_sql("pd.id = ?1"))
        .bind(plan_day_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(fold_plan_days(&rows)?.into_iter().next())
}

pub async fn create_plan_day(conn: &mut SqliteConnection, new: &NewPlanDay) -> Result<PlanDay> {
    let now = Utc::now();
    let result = sqlx::query(
        r"
        INSERT INTO plan_days (
            workout_id, date, day_number, name, description, instructions,
            is_complete, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
        ",
    )
    .bind(new.workout_id)
    .bind(&new.date)
    .bind(new.day_number)
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.instructions)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(PlanDay {
        id: result.last_insert_rowid(),
        workout_id: new.workout_id,
        date: new.date.clone(),
        day_number: Some(new.day_number),
        name: new.name.clone(),
        description: new.description.clone(),
        instructions: new.instructions.clone(),
        is_complete: Some(false),
    })
}

/// Rewrite a plan day's content in place. The row id and workout link are untouched.
///
/// Fields are overwritten, so `None` clears the stored text.
pub async fn update_plan_day(
    conn: &mut SqliteConnection,
    plan_day_id: i64,
    update: &PlanDayUpdate,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE plan_days
        SET name = ?2,
            description = ?3,
            instructions = ?4,
            is_complete = 0,
            updated_at = ?5
        WHERE id = ?1
        ",
    )
    .bind(plan_day_id)
    .bind(&update.name)
    .bind(&update.description)
    .bind(&update.instructions)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn create_workout_block(
    conn: &mut SqliteConnection,
    plan_day_id: i64,
    values: &WorkoutBlockValues,
) -> Result<WorkoutBlock> {
    let now = Utc::now();
    let result = sqlx::query(
        r"
        INSERT INTO workout_blocks (
            plan_day_id, block_type, block_name, block_duration_minutes,
            time_cap_minutes, rounds, instructions, block_order, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        ",
    )
    .bind(plan_day_id)
    .bind(&values.block_type)
    .bind(&values.block_name)
    .bind(values.block_duration_minutes)
    .bind(values.time_cap_minutes)
    .bind(values.rounds)
    .bind(&values.instructions)
    .bind(values.order)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(WorkoutBlock {
        id: result.last_insert_rowid(),
        plan_day_id,
        block_type: values.block_type.clone(),
        block_name: values.block_name.clone(),
        block_duration_minutes: values.block_duration_minutes,
        time_cap_minutes: values.time_cap_minutes,
        rounds: values.rounds,
        instructions: values.instructions.clone(),
        order: values.order,
    })
}

pub async fn update_workout_block(
    conn: &mut SqliteConnection,
    block_id: i64,
    values: &WorkoutBlockValues,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE workout_blocks
        SET block_type = ?2,
            block_name = ?3,
            block_duration_minutes = ?4,
            time_cap_minutes = ?5,
            rounds = ?6,
            instructions = ?7,
            block_order = ?8,
            updated_at = ?9
        WHERE id = ?1
        ",
    )
    .bind(block_id)
    .bind(&values.block_type)
    .bind(&values.block_name)
    .bind(values.block_duration_minutes)
    .bind(values.time_cap_minutes)
    .bind(values.rounds)
    .bind(&values.instructions)
    .bind(values.order)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn delete_workout_block(conn: &mut SqliteConnection, block_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM workout_blocks WHERE id = ?1")
        .bind(block_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert a prescribed exercise and return it with its catalog row attached.
pub async fn create_plan_day_exercise(
    conn: &mut SqliteConnection,
    new: &NewPlanDayExercise,
) -> Result<PlanDayExerciseRecord> {
    let result = sqlx::query(
        r"
        INSERT INTO plan_day_exercises (
            workout_block_id, exercise_id, sets, reps, weight, duration,
            rest_time, notes, exercise_order, completed, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
        ",
    )
    .bind(new.workout_block_id)
    .bind(new.exercise_id)
    .bind(new.sets)
    .bind(new.reps)
    .bind(new.weight)
    .bind(new.duration)
    .bind(new.rest_time)
    .bind(&new.notes)
    .bind(new.order)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let sql = format!(
        r"
        SELECT {}, {}
        FROM plan_day_exercises pde
        LEFT JOIN exercises e ON e.id = pde.exercise_id
        WHERE pde.id = ?1
        ",
        PLAN_DAY_EXERCISE_COLUMNS, JOINED_EXERCISE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(result.last_insert_rowid())
        .fetch_one(&mut *conn)
        .await?;

    Ok(PlanDayExerciseRecord {
        plan_day_exercise: PlanDayExercise::from_row(&row, "pde_")?,
        exercise: joined_exercise(&row)?,
    })
}

/// Remove log rows that reference the block's prescribed exercises.
pub async fn delete_exercise_logs_for_block(conn: &mut SqliteConnection, block_id: i64) -> Result<u64> {
    let result = sqlx::query(
        r"
        DELETE FROM exercise_logs
        WHERE plan_day_exercise_id IN (
            SELECT id FROM plan_day_exercises WHERE workout_block_id = ?1
        )
        ",
    )
    .bind(block_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn delete_plan_day_exercises_for_block(
    conn: &mut SqliteConnection,
    block_id: i64,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM plan_day_exercises WHERE workout_block_id = ?1")
        .bind(block_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

fn joined_exercise(row: &SqliteRow) -> Result<Option<Exercise>> {
    let exercise_id: Option<i64> = row.try_get("e_id")?;
    match exercise_id {
        Some(_) => Ok(Some(Exercise::from_row(row, "e_")?)),
        None => Ok(None),
    }
}

/// Fold the flat LEFT JOIN rows (ordered by day, block, exercise) into the nested shape.
fn fold_plan_days(rows: &[SqliteRow]) -> Result<Vec<PlanDayRecord>> {
    let mut days: Vec<PlanDayRecord> = Vec::new();

    for row in rows {
        let plan_day_id: i64 = row.try_get("pd_id")?;
        if days.last().map(|day| day.plan_day.id) != Some(plan_day_id) {
            days.push(PlanDayRecord {
                plan_day: PlanDay::from_row(row, "pd_")?,
                blocks: Vec::new(),
            });
        }
        let Some(day) = days.last_mut() else {
            continue;
        };

        let Some(block_id) = row.try_get::<Option<i64>, _>("wb_id")? else {
            continue;
        };
        if day.blocks.last().map(|block| block.block.id) != Some(block_id) {
            day.blocks.push(WorkoutBlockRecord {
                block: WorkoutBlock::from_row(row, "wb_")?,
                exercises: Vec::new(),
            });
        }
        let Some(block) = day.blocks.last_mut() else {
            continue;
        };

        if row.try_get::<Option<i64>, _>("pde_id")?.is_none() {
            continue;
        }
        block.exercises.push(PlanDayExerciseRecord {
            plan_day_exercise: PlanDayExercise::from_row(row, "pde_")?,
            exercise: joined_exercise(row)?,
        });
    }

    Ok(days)
}
