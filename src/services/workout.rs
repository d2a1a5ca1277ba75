use chrono::{Datelike, NaiveDate};
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clients::models::common::{ExerciseToAdd, GeneratedExercise};
use crate::clients::models::requests::LlmMessage;
use crate::clients::models::responses::{DayDocument, PlanDocument, TokenUsage};
use crate::db::models::{
    NewExercise, NewPlanDay, NewPlanDayExercise, NewPrompt, NewWorkout, PlanDayRecord,
    PlanDayUpdate, Profile, ProfileData, WorkoutRecord,
};
use crate::db::{DbPool, exercises, profiles, prompts, workouts};
use crate::error::{PlannerError, Result};
use crate::services::ai_prompt::{self, CompiledPrompt, PromptContext, PromptScope};
use crate::services::day_scheduler::{self, BlockDefaults};
use crate::services::output_formatter::{self, PlanDayWithExercises, WorkoutWithDetails};
use crate::services::workout_agent::{AgentRequest, WorkoutAgent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationState {
    Idle,
    Generating,
    Scheduling,
    Complete,
    Failed,
}

impl GenerationState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Scheduling => "scheduling",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

fn trace_state(user_id: i64, state: GenerationState) {
    tracing::info!(user_id, state = state.as_str(), "generation.state");
}

/// Everything the model produced for a full plan, before it is scheduled.
#[derive(Debug)]
struct GeneratedPlan {
    name: Option<String>,
    description: Option<String>,
    days: Vec<DayDocument>,
    exercises_to_add: Vec<ExerciseToAdd>,
    audits: Vec<NewPrompt>,
    usage: TokenUsage,
    /// Thread messages to record once the plan is stored.
    exchange: Vec<LlmMessage>,
}

/// Longest session a profile may ask for, in minutes.
pub const MAX_WORKOUT_DURATION_MINUTES: i64 = 600;

/// Fields a profile must carry before anything can be generated from it.
pub fn validate_profile(profile: &Profile) -> Result<()> {
    let mut missing = Vec::new();
    if profile.available_days.is_empty() {
        missing.push("availableDays");
    }
    if profile.preferred_styles.is_empty() {
        missing.push("preferredStyles");
    }
    if profile.workout_duration.is_none_or(|minutes| minutes <= 0) {
        missing.push("workoutDuration");
    }
    if profile
        .environment
        .as_deref()
        .is_none_or(|environment| environment.trim().is_empty())
    {
        missing.push("environment");
    }

    if !missing.is_empty() {
        return Err(PlannerError::ProfileIncomplete(missing));
    }

    match profile.workout_duration {
        Some(minutes) if minutes > MAX_WORKOUT_DURATION_MINUTES => {
            Err(PlannerError::invalid_param(format!(
                "workoutDuration must be between 1 and {} minutes, got {}",
                MAX_WORKOUT_DURATION_MINUTES, minutes
            )))
        }
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct WorkoutService {
    pool: DbPool,
    agent: WorkoutAgent,
}

impl WorkoutService {
    pub fn new(pool: DbPool, agent: WorkoutAgent) -> Self {
        Self { pool, agent }
    }

    pub async fn create_or_update_profile(
        &self,
        user_id: i64,
        data: &ProfileData,
    ) -> Result<Profile> {
        let mut conn = self.pool.acquire().await?;
        profiles::create_or_update_profile(&mut conn, user_id, data).await
    }

    /// Generate and persist a new active plan for the user, starting today in `timezone`.
    pub async fn generate_workout_plan(
        &self,
        user_id: i64,
        custom_feedback: Option<&str>,
        timezone: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<WorkoutWithDetails> {
        let today = day_scheduler::today_in(timezone);
        self.generate_from(user_id, custom_feedback, today, None, cancel)
            .await
    }

    /// Replace the active plan, continuing the old plan's conversation thread.
    ///
    /// The previous plan stays active until the new one is written.
    pub async fn regenerate_workout_plan(
        &self,
        user_id: i64,
        custom_feedback: Option<&str>,
        profile_data: Option<&ProfileData>,
        timezone: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<WorkoutWithDetails> {
        let thread_id = {
            let mut conn = self.pool.acquire().await?;
            if let Some(data) = profile_data {
                profiles::create_or_update_profile(&mut conn, user_id, data).await?;
                tracing::info!(user_id, "profile.updated_before_regeneration");
            }
            match workouts::find_active_workout(&mut conn, user_id).await? {
                Some(previous) => prompts::thread_id_for_workout(&mut conn, previous.id).await?,
                None => None,
            }
        };

        tracing::info!(
            user_id,
            continues_thread = thread_id.is_some(),
            "generation.regenerating_plan"
        );

        let today = day_scheduler::today_in(timezone);
        self.generate_from(user_id, custom_feedback, today, thread_id, cancel)
            .await
    }

    pub(crate) async fn generate_from(
        &self,
        user_id: i64,
        custom_feedback: Option<&str>,
        today: NaiveDate,
        thread_id: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<WorkoutWithDetails> {
        trace_state(user_id, GenerationState::Idle);

        let result = self
            .run_generation(user_id, custom_feedback, today, thread_id, cancel)
            .await;

        match &result {
            Ok(workout) => {
                trace_state(user_id, GenerationState::Complete);
                tracing::info!(
                    user_id,
                    workout_id = workout.id,
                    plan_days = workout.plan_days.len(),
                    "generation.completed"
                );
            }
            Err(e) => {
                trace_state(user_id, GenerationState::Failed);
                tracing::error!(user_id, error = %e, "generation.failed");
            }
        }
        result
    }

    async fn run_generation(
        &self,
        user_id: i64,
        custom_feedback: Option<&str>,
        today: NaiveDate,
        thread_id: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<WorkoutWithDetails> {
        let profile = self.load_profile(user_id).await?;
        validate_profile(&profile)?;

        let cycle = day_scheduler::weekday_cycle(&profile.available_days, today);
        let dates = day_scheduler::assign_dates(&cycle, today, cycle.len());
        let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        tracing::info!(
            user_id,
            %today,
            day_count = dates.len(),
            thread_id = %thread_id,
            "generation.started"
        );

        trace_state(user_id, GenerationState::Generating);
        let mut plan = match self
            .generate_chunked(&profile, custom_feedback, dates.len(), &thread_id, cancel)
            .await
        {
            Ok(plan) => plan,
            Err(PlannerError::Cancelled) => return Err(PlannerError::Cancelled),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "generation.fallback_to_single_shot");
                self.generate_single_shot(&profile, custom_feedback, dates.len(), &thread_id, cancel)
                    .await?
            }
        };

        tracing::info!(
            user_id,
            prompt_tokens = plan.usage.prompt_tokens,
            completion_tokens = plan.usage.completion_tokens,
            total_tokens = plan.usage.total_tokens,
            "generation.usage"
        );

        trace_state(user_id, GenerationState::Scheduling);
        let exchange = std::mem::take(&mut plan.exchange);
        let record = self.persist_plan(&profile, plan, &dates).await?;
        self.agent.record(&thread_id, exchange).await;
        Ok(output_formatter::transform_workout(&record))
    }

    /// One daily-scope exchange per plan day on the shared thread.
    async fn generate_chunked(
        &self,
        profile: &Profile,
        custom_feedback: Option<&str>,
        day_count: usize,
        thread_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GeneratedPlan> {
        let mut plan = GeneratedPlan {
            name: Some(format!("{}-Day Training Plan", day_count)),
            description: None,
            days: Vec::with_capacity(day_count),
            exercises_to_add: Vec::new(),
            audits: Vec::with_capacity(day_count),
            usage: TokenUsage::default(),
            exchange: Vec::with_capacity(day_count * 2),
        };

        for index in 0..day_count {
            let mut context = PromptContext::new(profile, PromptScope::Daily, day_count);
            context.day_number = Some(index + 1);
            context.custom_feedback = custom_feedback;
            let compiled = ai_prompt::build_prompt(&context);

            // Earlier days ride along as staged context but stay off the thread
            // until the whole plan is stored.
            let outcome = self
                .agent
                .run::<DayDocument>(&agent_request(&compiled, thread_id), &plan.exchange, cancel)
                .await?;

            check_duration(&outcome.document, profile.target_duration(), index);
            plan.exchange.extend(outcome.exchange);
            plan.usage += outcome.usage;
            plan.audits.push(audit(profile.user_id, &compiled, &outcome.raw_response, thread_id));
            plan.exercises_to_add
                .extend(outcome.document.exercises_to_add.iter().cloned());
            plan.days.push(outcome.document);

            tracing::debug!(day = index + 1, day_count, "generation.day_generated");
        }

        Ok(plan)
    }

    /// One weekly-scope exchange returning every day at once.
    async fn generate_single_shot(
        &self,
        profile: &Profile,
        custom_feedback: Option<&str>,
        day_count: usize,
        thread_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GeneratedPlan> {
        let mut context = PromptContext::new(profile, PromptScope::Weekly, day_count);
        context.custom_feedback = custom_feedback;
        let compiled = ai_prompt::build_prompt(&context);

        let outcome = self
            .agent
            .run::<PlanDocument>(&agent_request(&compiled, thread_id), &[], cancel)
            .await?;
        let mut document = outcome.document;

        if document.days.len() < day_count {
            return Err(PlannerError::parse(format!(
                "expected {} days, got {}",
                day_count,
                document.days.len()
            )));
        }
        if document.days.len() > day_count {
            tracing::warn!(
                expected = day_count,
                received = document.days.len(),
                "generation.extra_days_dropped"
            );
            document.days.truncate(day_count);
        }

        for (index, day) in document.days.iter().enumerate() {
            check_duration(day, profile.target_duration(), index);
        }

        let mut exercises_to_add = document.exercises_to_add;
        for day in &document.days {
            exercises_to_add.extend(day.exercises_to_add.iter().cloned());
        }

        Ok(GeneratedPlan {
            name: document.name,
            description: document.description,
            days: document.days,
            exercises_to_add,
            audits: vec![audit(profile.user_id, &compiled, &outcome.raw_response, thread_id)],
            usage: outcome.usage,
            exchange: outcome.exchange,
        })
    }

    /// Write the plan in one transaction: audits, new catalog rows, then the workout tree.
    async fn persist_plan(
        &self,
        profile: &Profile,
        plan: GeneratedPlan,
        dates: &[NaiveDate],
    ) -> Result<WorkoutRecord> {
        let (Some(start_date), Some(end_date)) = (dates.first(), dates.last()) else {
            return Err(PlannerError::parse("plan has no scheduled days"));
        };
        let user_id = profile.user_id;
        let defaults = BlockDefaults::derive(&profile.preferred_styles, profile.target_duration());

        let mut tx = self.pool.begin().await?;

        let mut prompt_id = None;
        for entry in &plan.audits {
            let id = prompts::create_prompt(&mut tx, entry).await?;
            prompt_id.get_or_insert(id);
        }

        add_missing_exercises(&mut tx, &plan.exercises_to_add).await?;

        let deactivated = workouts::deactivate_active_workouts(&mut tx, user_id).await?;
        if deactivated > 0 {
            tracing::info!(user_id, deactivated, "workout.deactivated");
        }

        let workout = workouts::create_workout(
            &mut tx,
            &NewWorkout {
                user_id,
                name: plan.name.clone(),
                description: plan.description.clone(),
                start_date: *start_date,
                end_date: *end_date,
                prompt_id,
            },
        )
        .await?;
        let workout_id = workout.workout.id;

        for (index, (day, date)) in plan.days.iter().zip(dates).enumerate() {
            let plan_day = workouts::create_plan_day(
                &mut tx,
                &NewPlanDay {
                    workout_id,
                    date: date.format("%Y-%m-%d").to_string(),
                    day_number: index as i64 + 1,
                    name: day.name.clone(),
                    description: day.description.clone(),
                    instructions: day.instructions.clone(),
                },
            )
            .await?;

            for (position, block) in day.blocks.iter().enumerate() {
                let values = day_scheduler::resolve_block(block, position, &defaults);
                let created = workouts::create_workout_block(&mut tx, plan_day.id, &values).await?;
                insert_block_exercises(&mut tx, created.id, &block.exercises).await?;
            }
        }

        let record = workouts::find_workout_with_details(&mut tx, workout_id)
            .await?
            .ok_or(PlannerError::Database(sqlx::Error::RowNotFound))?;
        tx.commit().await?;

        tracing::info!(
            user_id,
            workout_id,
            %start_date,
            %end_date,
            "workout.persisted"
        );
        Ok(record)
    }

    /// Redesign one plan day in place, keeping its id, its workout and its first block.
    pub async fn regenerate_daily_workout(
        &self,
        user_id: i64,
        plan_day_id: i64,
        regeneration_reason: &str,
        styles: Option<&[String]>,
        thread_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PlanDayWithExercises> {
        trace_state(user_id, GenerationState::Idle);
        let result = self
            .run_daily_regeneration(user_id, plan_day_id, regeneration_reason, styles, thread_id, cancel)
            .await;

        match &result {
            Ok(day) => {
                trace_state(user_id, GenerationState::Complete);
                tracing::info!(
                    user_id,
                    plan_day_id,
                    exercises = day.exercises.len(),
                    "generation.day_regenerated"
                );
            }
            Err(e) => {
                trace_state(user_id, GenerationState::Failed);
                tracing::error!(user_id, plan_day_id, error = %e, "generation.day_regeneration_failed");
            }
        }
        result
    }

    async fn run_daily_regeneration(
        &self,
        user_id: i64,
        plan_day_id: i64,
        regeneration_reason: &str,
        styles: Option<&[String]>,
        thread_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PlanDayWithExercises> {
        let profile = self.load_profile(user_id).await?;
        validate_profile(&profile)?;

        let (existing, day_index, day_count, stored_thread) = {
            let mut conn = self.pool.acquire().await?;
            let existing = workouts::find_plan_day_with_details(&mut conn, plan_day_id)
                .await?
                .ok_or(PlannerError::PlanDayNotFound(plan_day_id))?;
            let workout = workouts::find_workout_with_details(&mut conn, existing.plan_day.workout_id)
                .await?
                .filter(|record| record.workout.user_id == user_id)
                .ok_or(PlannerError::PlanDayNotFound(plan_day_id))?;
            let day_index = workout
                .plan_days
                .iter()
                .position(|day| day.plan_day.id == plan_day_id)
                .unwrap_or(0);
            let stored_thread = prompts::thread_id_for_workout(&mut conn, workout.workout.id).await?;
            (existing, day_index, workout.plan_days.len(), stored_thread)
        };

        let thread_id = thread_id
            .map(str::to_string)
            .or(stored_thread)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let styles: &[String] = match styles {
            Some(styles) if !styles.is_empty() => styles,
            _ => &profile.preferred_styles,
        };
        let defaults = BlockDefaults::derive(styles, profile.target_duration());
        tracing::info!(
            user_id,
            plan_day_id,
            thread_id = %thread_id,
            previous_exercises = existing.exercise_count(),
            "generation.day_regeneration_started"
        );

        trace_state(user_id, GenerationState::Generating);
        let mut context = PromptContext::new(&profile, PromptScope::Daily, day_count);
        context.day_number = Some(day_index + 1);
        context.is_rest_day = is_rest_day(&existing.plan_day.date, &profile.available_days);
        context.styles = styles;
        context.regeneration_reason = Some(regeneration_reason);
        context.previous_workout = Some(ai_prompt::format_plan_day_for_prompt(&existing));
        let compiled = ai_prompt::build_prompt(&context);

        let outcome = self
            .agent
            .run::<DayDocument>(&agent_request(&compiled, &thread_id), &[], cancel)
            .await?;
        check_duration(&outcome.document, profile.target_duration(), day_index);

        trace_state(user_id, GenerationState::Scheduling);
        let mut tx = self.pool.begin().await?;

        prompts::create_prompt(
            &mut tx,
            &audit(user_id, &compiled, &outcome.raw_response, &thread_id),
        )
        .await?;
        add_missing_exercises(&mut tx, &outcome.document.exercises_to_add).await?;
        replace_plan_day_content(&mut tx, &existing, &outcome.document, &defaults).await?;

        let record = workouts::find_plan_day_with_details(&mut tx, plan_day_id)
            .await?
            .ok_or(PlannerError::PlanDayNotFound(plan_day_id))?;
        tx.commit().await?;
        self.agent.record(&thread_id, outcome.exchange).await;

        Ok(output_formatter::transform_plan_day(&record, day_index))
    }

    async fn load_profile(&self, user_id: i64) -> Result<Profile> {
        let mut conn = self.pool.acquire().await?;
        profiles::get_profile_by_user_id(&mut conn, user_id)
            .await?
            .ok_or(PlannerError::ProfileNotFound(user_id))
    }
}

fn agent_request(compiled: &CompiledPrompt, thread_id: &str) -> AgentRequest {
    AgentRequest {
        system: compiled.system.clone(),
        user: compiled.user.clone(),
        thread_id: thread_id.to_string(),
    }
}

fn audit(user_id: i64, compiled: &CompiledPrompt, response: &str, thread_id: &str) -> NewPrompt {
    NewPrompt {
        user_id,
        prompt: format!("{}\n\n{}", compiled.system, compiled.user),
        response: response.to_string(),
        thread_id: thread_id.to_string(),
    }
}

fn check_duration(day: &DayDocument, target: u32, index: usize) {
    let declared = day.declared_minutes();
    if !day_scheduler::duration_within_tolerance(declared, target) {
        tracing::warn!(
            day = index + 1,
            declared_minutes = declared,
            target_minutes = target,
            "generation.duration_out_of_range"
        );
    }
}

/// A date whose weekday the user did not mark as available.
fn is_rest_day(date: &str, available_days: &[String]) -> bool {
    let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return false;
    };
    let available: Vec<_> = available_days
        .iter()
        .filter_map(|name| day_scheduler::parse_weekday(name))
        .collect();
    !available.is_empty() && !available.contains(&date.weekday())
}

fn new_exercise(entry: &ExerciseToAdd) -> NewExercise {
    NewExercise {
        name: entry.name.trim().to_string(),
        description: entry.description.clone(),
        muscle_groups: entry.muscle_groups.clone(),
        equipment: entry.equipment.clone(),
        difficulty: entry.difficulty.clone(),
        instructions: entry.instructions.clone(),
        link: entry.link.clone(),
        tag: entry.tag.clone(),
    }
}

async fn add_missing_exercises(conn: &mut SqliteConnection, entries: &[ExerciseToAdd]) -> Result<()> {
    for entry in entries {
        exercises::create_if_absent(conn, &new_exercise(entry)).await?;
    }
    Ok(())
}

/// Insert the block's exercises in order. Names missing from the catalog are skipped.
async fn insert_block_exercises(
    conn: &mut SqliteConnection,
    block_id: i64,
    generated: &[GeneratedExercise],
) -> Result<usize> {
    let mut inserted = 0;
    for (position, exercise) in generated.iter().enumerate() {
        let Some(catalog) = exercises::resolve_by_name(conn, &exercise.name).await? else {
            let err = PlannerError::ExerciseNotFound(exercise.name.clone());
            tracing::warn!(block_id, error = %err, "generation.exercise_skipped");
            continue;
        };

        workouts::create_plan_day_exercise(
            conn,
            &NewPlanDayExercise {
                workout_block_id: block_id,
                exercise_id: catalog.id,
                sets: exercise.sets.map(i64::from),
                reps: exercise.reps.map(i64::from),
                weight: exercise.weight,
                duration: exercise.duration.map(i64::from),
                rest_time: exercise.rest_time.map(i64::from),
                notes: exercise.notes.clone(),
                order: position as i64,
            },
        )
        .await?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Swap a plan day's blocks and exercises for a freshly generated day.
async fn replace_plan_day_content(
    conn: &mut SqliteConnection,
    existing: &PlanDayRecord,
    day: &DayDocument,
    defaults: &BlockDefaults,
) -> Result<()> {
    let plan_day_id = existing.plan_day.id;

    let mut removed_logs = 0;
    let mut removed_exercises = 0;
    for block in &existing.blocks {
        removed_logs += workouts::delete_exercise_logs_for_block(conn, block.block.id).await?;
        removed_exercises += workouts::delete_plan_day_exercises_for_block(conn, block.block.id).await?;
    }
    tracing::debug!(plan_day_id, removed_logs, removed_exercises, "plan_day.cleared");

    let mut generated = day.blocks.iter();
    let mut position = 0;

    if let Some(first_existing) = existing.blocks.first()
        && let Some(first_generated) = generated.next()
    {
        let values = day_scheduler::resolve_block(first_generated, position, defaults);
        workouts::update_workout_block(conn, first_existing.block.id, &values).await?;
        insert_block_exercises(conn, first_existing.block.id, &first_generated.exercises).await?;
        position += 1;

        for stale in existing.blocks.iter().skip(1) {
            workouts::delete_workout_block(conn, stale.block.id).await?;
        }
    }

    for block in generated {
        let values = day_scheduler::resolve_block(block, position, defaults);
        let created = workouts::create_workout_block(conn, plan_day_id, &values).await?;
        insert_block_exercises(conn, created.id, &block.exercises).await?;
        position += 1;
    }

    workouts::update_plan_day(
        conn,
        plan_day_id,
        &PlanDayUpdate {
            name: day.name.clone(),
            description: day.description.clone(),
            instructions: day.instructions.clone(),
        },
    )
    .await
}
