use crate::db::models::{Environment, PlanDayRecord, Profile};
use crate::services::ai_parser::SEARCH_REQUEST_MARKER;

/// Whether the model designs one plan day or the whole plan in one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptScope {
    Weekly,
    Daily,
}

#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub profile: &'a Profile,
    pub scope: PromptScope,
    /// Number of plan days in the program.
    pub day_count: usize,
    /// 1-based position of the day being designed (daily scope only).
    pub day_number: Option<usize>,
    pub is_rest_day: bool,
    /// Styles for this request; falls back to the profile's preferred styles when empty.
    pub styles: &'a [String],
    pub regeneration_reason: Option<&'a str>,
    pub custom_feedback: Option<&'a str>,
    pub previous_workout: Option<String>,
}

impl<'a> PromptContext<'a> {
    pub fn new(profile: &'a Profile, scope: PromptScope, day_count: usize) -> Self {
        Self {
            profile,
            scope,
            day_count,
            day_number: None,
            is_rest_day: false,
            styles: &[],
            regeneration_reason: None,
            custom_feedback: None,
            previous_workout: None,
        }
    }

    fn effective_styles(&self) -> &'a [String] {
        if self.styles.is_empty() {
            &self.profile.preferred_styles
        } else {
            self.styles
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPrompt {
    pub system: String,
    pub user: String,
}

const COMMERCIAL_GYM_EQUIPMENT: &str = "Full commercial gym: barbells, squat racks, benches, \
dumbbells across a full weight range, kettlebells, cable stations, selectorized machines, \
pull-up bars, rowers, bikes, treadmills, boxes, medicine balls and resistance bands.";

const BODYWEIGHT_ONLY_EQUIPMENT: &str = "No equipment available (bodyweight only). \
Do NOT program any exercise that needs equipment of any kind; every movement must be \
performed with bodyweight alone.";

const GENERIC_EQUIPMENT: &str = "Equipment not specified. Prefer bodyweight movements and \
common light equipment such as dumbbells or resistance bands.";

/// Programming philosophy per training style. Block types line up with the
/// fallback precedence used when the model omits block metadata.
const STYLE_GUIDANCE: [(&str, &str); 10] = [
    (
        "hiit",
        "HIIT: use tabata blocks (20s work / 10s rest x 8 rounds) and short intervals; \
prescribe exercises by duration in seconds, keep rest minimal, peak heart rate high.",
    ),
    (
        "strength",
        "Strength: use traditional blocks of compound lifts, 3-5 sets of 4-8 reps, \
90-180s rest, progressive loads; accessories 2-3 sets of 8-12.",
    ),
    (
        "cardio",
        "Cardio: use circuit blocks of cyclical or locomotive movements with sustained effort, \
prescribe work by duration, 30-60s transitions, repeat for rounds.",
    ),
    (
        "rehab",
        "Rehab: use traditional blocks with light loads, slow controlled tempo, 2-3 sets of \
12-15 reps, generous rest; respect every listed limitation.",
    ),
    (
        "crossfit",
        "CrossFit: use amrap, emom or for_time blocks with an explicit timeCapMinutes, \
mixed modal work combining gymnastics, weightlifting and monostructural conditioning.",
    ),
    (
        "functional",
        "Functional: use circuit blocks of multi-joint, multi-planar movements (carries, \
hinges, rotations, lunges) for 3-4 rounds with short rest.",
    ),
    (
        "pilates",
        "Pilates: use flow blocks focused on core control and alignment, 8-12 slow precise \
repetitions, minimal rest between movements.",
    ),
    (
        "yoga",
        "Yoga: use flow blocks of linked poses held for a duration in seconds, breath-led \
transitions, no rest prescription needed.",
    ),
    (
        "balance",
        "Balance: use traditional blocks of unilateral and stability work, 2-3 sets of \
8-12 reps or 20-40s holds per side.",
    ),
    (
        "mobility",
        "Mobility: use flow blocks of controlled joint rotations and dynamic stretches, \
prescribe by duration, move through full pain-free range.",
    ),
];

/// Equipment paragraph for the profile's training environment.
pub fn equipment_description(profile: &Profile) -> String {
    match profile.environment() {
        Environment::CommercialGym => COMMERCIAL_GYM_EQUIPMENT.to_string(),
        Environment::BodyweightOnly => BODYWEIGHT_ONLY_EQUIPMENT.to_string(),
        Environment::HomeGym => {
            let mut items: Vec<String> = profile.equipment.clone();
            if let Some(other) = profile
                .other_equipment
                .as_deref()
                .map(str::trim)
                .filter(|other| !other.is_empty())
            {
                items.push(other.to_string());
            }
            if items.is_empty() {
                "Home gym with no equipment listed; favour bodyweight movements.".to_string()
            } else {
                format!(
                    "Home gym. Use ONLY this equipment (or bodyweight): {}.",
                    items.join(", ")
                )
            }
        }
        Environment::Other => GENERIC_EQUIPMENT.to_string(),
    }
}

/// Guidance lines for every known style in `styles`, in table order.
pub fn style_guidance(styles: &[String]) -> String {
    let lowered: Vec<String> = styles.iter().map(|s| s.trim().to_lowercase()).collect();
    let lines: Vec<&str> = STYLE_GUIDANCE
        .iter()
        .filter(|(style, _)| lowered.iter().any(|s| s == style))
        .map(|(_, guidance)| *guidance)
        .collect();

    if lines.is_empty() {
        "General fitness: balance strength and conditioning using traditional blocks.".to_string()
    } else {
        lines
            .iter()
            .map(|line| format!("- {}", line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Minimum number of blocks for a session of `duration` minutes.
pub fn min_block_count(duration: u32, include_warmup: bool, include_cooldown: bool) -> usize {
    let core = match duration {
        0..30 => 2,
        30..45 => 3,
        _ => 4,
    };
    core + usize::from(include_warmup) + usize::from(include_cooldown)
}

fn duration_requirements(profile: &Profile) -> String {
    let target = profile.target_duration();
    let minimum_blocks = min_block_count(target, profile.include_warmup, profile.include_cooldown);
    let mut text = format!(
        r#"DURATION REQUIREMENTS:
- Target session length: {target} minutes. The sum of blockDurationMinutes across all blocks MUST be between {low} and {high} minutes.
- Every block MUST declare "blockDurationMinutes".
- Use at least {minimum_blocks} blocks per training day."#,
        target = target,
        low = target.saturating_sub(5),
        high = target.saturating_add(5),
        minimum_blocks = minimum_blocks,
    );
    if profile.include_warmup {
        text.push_str("\n- Start every day with a block of type \"warmup\".");
    }
    if profile.include_cooldown {
        text.push_str("\n- Finish every day with a block of type \"cooldown\".");
    }
    if target >= 45 {
        text.push_str("\n- Sessions of 45 minutes or more use 4-6 blocks in total.");
    }
    text
}

fn tool_instructions() -> String {
    format!(
        r#"EXERCISE SEARCH:
You do not have the exercise catalog. Before writing the workout you may look up candidate exercises by writing one or more lines of the form:
{marker} {{"muscleGroups": ["legs"], "equipment": ["dumbbells"], "difficulty": ["beginner"], "styles": ["strength"], "limit": 20}}
All fields are optional. Use "bodyweight_only" in equipment to find exercises needing no equipment.
If you issue any search request, respond with ONLY the search requests; results are returned in the next message and you then answer with the final JSON.
If you already know suitable exercises, skip the search and answer with the final JSON directly.
Any exercise you use that may not exist in the catalog MUST be listed in "exercisesToAdd"."#,
        marker = SEARCH_REQUEST_MARKER
    )
}

const DAY_SCHEMA: &str = r#"{
    "day": 1,
    "name": "Day name",
    "description": "Short description of the session",
    "instructions": "General instructions for the session",
    "blocks": [
        {
            "blockType": "traditional | amrap | emom | for_time | circuit | flow | tabata | warmup | cooldown",
            "blockName": "Block name",
            "blockDurationMinutes": 10,
            "timeCapMinutes": null,
            "rounds": 1,
            "instructions": "How to perform the block",
            "order": 1,
            "exercises": [
                {
                    "name": "Exercise name",
                    "sets": 3,
                    "reps": 10,
                    "weight": null,
                    "duration": null,
                    "restTime": 60,
                    "notes": "Coaching cue",
                    "order": 1
                }
            ]
        }
    ]
}"#;

const EXERCISE_TO_ADD_SCHEMA: &str = r#"{
    "name": "Exercise name",
    "description": "What the exercise is",
    "equipment": ["dumbbells"],
    "muscleGroups": ["legs"],
    "difficulty": "beginner | intermediate | advanced",
    "instructions": "Step by step",
    "link": null,
    "tag": "strength"
}"#;

fn output_format(scope: PromptScope, day_count: usize) -> String {
    let shape = match scope {
        PromptScope::Daily => format!(
            "Return ONLY a JSON object for a single day with this exact structure:\n{}\nplus a top-level \"exercisesToAdd\" array of:\n{}",
            DAY_SCHEMA, EXERCISE_TO_ADD_SCHEMA
        ),
        PromptScope::Weekly => format!(
            r#"Return ONLY a JSON object with this exact structure:
{{
    "name": "Program name",
    "description": "Program description",
    "days": [ /* exactly {day_count} day objects, "day" numbered 1 to {day_count} */ ],
    "exercisesToAdd": [ /* catalog entries */ ]
}}
Each day object:
{day}
Each exercisesToAdd entry:
{add}"#,
            day_count = day_count,
            day = DAY_SCHEMA,
            add = EXERCISE_TO_ADD_SCHEMA
        ),
    };

    format!(
        "OUTPUT FORMAT:\n{}\nRules:\n- timeCapMinutes only for amrap, emom and for_time blocks; otherwise null.\n- weight in kg, duration and restTime in seconds.\n- For any field without a meaningful value use null, never \"N/A\" or empty strings.",
        shape
    )
}

fn profile_summary(profile: &Profile) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(", ")
        }
    };
    let text = |value: &Option<String>| value.clone().unwrap_or_else(|| "not specified".to_string());

    let mut output = String::from("CLIENT PROFILE:\n");
    if let Some(age) = profile.age {
        output.push_str(&format!("- Age: {}\n", age));
    }
    if let Some(gender) = &profile.gender {
        output.push_str(&format!("- Gender: {}\n", gender));
    }
    if let Some(height) = profile.height {
        output.push_str(&format!("- Height: {:.0} cm\n", height));
    }
    if let Some(weight) = profile.weight {
        output.push_str(&format!("- Weight: {:.1} kg\n", weight));
    }
    output.push_str(&format!("- Fitness level: {}\n", text(&profile.fitness_level)));
    output.push_str(&format!("- Intensity: {}\n", text(&profile.intensity_level)));
    output.push_str(&format!("- Goals: {}\n", list(&profile.goals)));
    output.push_str(&format!("- Limitations: {}\n", list(&profile.limitations)));
    output
}

/// Build the system and user messages for one generation request.
pub fn build_prompt(context: &PromptContext<'_>) -> CompiledPrompt {
    let profile = context.profile;
    let styles = context.effective_styles();

    let recovery = if context.is_rest_day {
        "\n\nACTIVE RECOVERY DAY:\nThis is a rest day. Program low-intensity active recovery only: flow and mobility blocks, light breathing work and gentle stretching. No heavy loading, no high heart-rate intervals."
    } else {
        ""
    };

    let system = format!(
        r#"You are an expert personal trainer and strength and conditioning coach designing safe, effective, personalised workouts.

{profile}
EQUIPMENT:
{equipment}

TRAINING STYLES:
{styles}

{duration}{recovery}

{tools}

{output}"#,
        profile = profile_summary(profile),
        equipment = equipment_description(profile),
        styles = style_guidance(styles),
        duration = duration_requirements(profile),
        recovery = recovery,
        tools = tool_instructions(),
        output = output_format(context.scope, context.day_count),
    );

    let mut user = match (context.scope, context.day_number) {
        (PromptScope::Daily, Some(day_number)) => format!(
            "Design day {} of a {}-day training program.",
            day_number, context.day_count
        ),
        (PromptScope::Daily, None) => "Design a single training day.".to_string(),
        (PromptScope::Weekly, _) => format!(
            "Design a complete {}-day training program.",
            context.day_count
        ),
    };
    if !styles.is_empty() {
        user.push_str(&format!(" Focus styles: {}.", styles.join(", ")));
    }
    if let Some(reason) = context.regeneration_reason.filter(|r| !r.trim().is_empty()) {
        user.push_str(&format!("\n\nREGENERATION REASON:\n{}", reason.trim()));
    }
    if let Some(feedback) = context.custom_feedback.filter(|f| !f.trim().is_empty()) {
        user.push_str(&format!("\n\nCLIENT FEEDBACK:\n{}", feedback.trim()));
    }
    if let Some(previous) = context.previous_workout.as_deref() {
        user.push_str(&format!(
            "\n\nPREVIOUS WORKOUT (replace it with something different that respects the reason above):\n{}",
            previous
        ));
    }

    CompiledPrompt { system, user }
}

/// Plain-text summary of a stored plan day for the regeneration prompt.
pub fn format_plan_day_for_prompt(record: &PlanDayRecord) -> String {
    let day = &record.plan_day;
    let mut output = format!(
        "Day: {}\n",
        day.name.as_deref().unwrap_or("Unnamed day")
    );
    if let Some(description) = day.description.as_deref().filter(|d| !d.is_empty()) {
        output.push_str(&format!("Description: {}\n", description));
    }

    for block in &record.blocks {
        output.push_str(&format!(
            "\n[{}] {}\n",
            block.block.block_type,
            block.block.block_name.as_deref().unwrap_or("Block")
        ));
        for entry in &block.exercises {
            let pde = &entry.plan_day_exercise;
            let name = entry
                .exercise
                .as_ref()
                .map(|exercise| exercise.name.as_str())
                .unwrap_or("Unknown exercise");
            output.push_str(&format!(
                "- {}: {} sets x {} reps, {}, duration {}, rest {}",
                name,
                format_count(pde.sets),
                format_count(pde.reps),
                format_weight(pde.weight),
                format_seconds(pde.duration),
                format_seconds(pde.rest_time),
            ));
            if let Some(notes) = pde.notes.as_deref().filter(|n| !n.is_empty()) {
                output.push_str(&format!(" ({})", notes));
            }
            output.push('\n');
        }
    }
    output
}

fn format_weight(weight: Option<f64>) -> String {
    match weight {
        Some(value) if value.fract().abs() > f64::EPSILON => format!("{:.1}kg", value),
        Some(value) => format!("{:.0}kg", value),
        None => "BW".to_string(),
    }
}

fn format_count(value: Option<i64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn format_seconds(value: Option<i64>) -> String {
    value
        .map(|v| format!("{}s", v))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        Exercise, PlanDay, PlanDayExercise, PlanDayExerciseRecord, WorkoutBlock,
        WorkoutBlockRecord,
    };
    use chrono::Utc;

    fn profile(environment: &str) -> Profile {
        Profile {
            id: 1,
            user_id: 1,
            age: Some(30),
            height: None,
            weight: None,
            gender: None,
            goals: vec!["lose fat".to_string()],
            limitations: vec![],
            fitness_level: Some("beginner".to_string()),
            environment: Some(environment.to_string()),
            equipment: vec!["dumbbells".to_string()],
            other_equipment: Some("kettlebell".to_string()),
            preferred_styles: vec!["crossfit".to_string(), "yoga".to_string()],
            available_days: vec!["monday".to_string()],
            workout_duration: Some(45),
            intensity_level: None,
            include_warmup: true,
            include_cooldown: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_equipment_description_branches() {
        assert!(equipment_description(&profile("commercial_gym")).contains("barbells"));
        assert!(equipment_description(&profile("bodyweight_only")).contains("Do NOT program"));

        let home = equipment_description(&profile("home_gym"));
        assert!(home.contains("dumbbells"));
        assert!(home.contains("kettlebell"));

        assert_eq!(equipment_description(&profile("garage")), GENERIC_EQUIPMENT);
    }

    #[test]
    fn test_min_block_count() {
        assert_eq!(min_block_count(20, false, false), 2);
        assert_eq!(min_block_count(30, false, false), 3);
        assert_eq!(min_block_count(44, true, false), 4);
        assert_eq!(min_block_count(45, true, true), 6);
        assert_eq!(min_block_count(60, false, false), 4);
    }

    #[test]
    fn test_style_guidance_covers_every_style() {
        for (style, guidance) in STYLE_GUIDANCE {
            assert_eq!(style_guidance(&[style.to_uppercase()]), format!("- {}", guidance));
        }
        assert!(style_guidance(&["zumba".to_string()]).starts_with("General fitness"));
    }

    #[test]
    fn test_weekly_prompt_shape() {
        let profile = profile("home_gym");
        let prompt = build_prompt(&PromptContext::new(&profile, PromptScope::Weekly, 3));

        assert!(prompt.system.contains(SEARCH_REQUEST_MARKER));
        assert!(prompt.system.contains("\"days\""));
        assert!(prompt.system.contains("exactly 3 day objects"));
        assert!(prompt.system.contains("between 40 and 50 minutes"));
        assert!(prompt.system.contains("at least 6 blocks"));
        assert!(prompt.system.contains("CrossFit"));
        assert!(!prompt.system.contains("ACTIVE RECOVERY"));
        assert!(prompt.user.starts_with("Design a complete 3-day training program."));
    }

    #[test]
    fn test_daily_prompt_appends_context() {
        let profile = profile("commercial_gym");
        let styles = vec!["mobility".to_string()];
        let mut context = PromptContext::new(&profile, PromptScope::Daily, 4);
        context.day_number = Some(2);
        context.is_rest_day = true;
        context.styles = &styles;
        context.regeneration_reason = Some("knee feels sore");
        context.previous_workout = Some("Day: Legs".to_string());

        let prompt = build_prompt(&context);

        assert!(prompt.system.contains("ACTIVE RECOVERY DAY"));
        assert!(prompt.system.contains("Mobility:"));
        assert!(!prompt.system.contains("CrossFit"));
        assert!(!prompt.system.contains("\"days\""));
        assert!(prompt.user.contains("Design day 2 of a 4-day"));
        assert!(prompt.user.contains("knee feels sore"));
        assert!(prompt.user.contains("PREVIOUS WORKOUT"));
    }

    #[test]
    fn test_huge_duration_saturates_range() {
        let mut long = profile("home_gym");
        long.workout_duration = Some(i64::from(u32::MAX));

        let text = duration_requirements(&long);
        assert!(text.contains("between 4294967290 and 4294967295 minutes"));
    }

    #[test]
    fn test_format_plan_day_for_prompt() {
        let record = PlanDayRecord {
            plan_day: PlanDay {
                id: 1,
                workout_id: 1,
                date: "2026-10-21".to_string(),
                day_number: Some(1),
                name: Some("Upper".to_string()),
                description: None,
                instructions: None,
                is_complete: Some(false),
            },
            blocks: vec![WorkoutBlockRecord {
                block: WorkoutBlock {
                    id: 1,
                    plan_day_id: 1,
                    block_type: "traditional".to_string(),
                    block_name: Some("Main".to_string()),
                    block_duration_minutes: Some(20),
                    time_cap_minutes: None,
                    rounds: Some(1),
                    instructions: None,
                    order: 0,
                },
                exercises: vec![PlanDayExerciseRecord {
                    plan_day_exercise: PlanDayExercise {
                        id: 1,
                        workout_block_id: 1,
                        exercise_id: 1,
                        sets: Some(3),
                        reps: Some(8),
                        weight: Some(22.5),
                        duration: None,
                        rest_time: Some(90),
                        notes: Some("RPE 8".to_string()),
                        order: 0,
                        completed: Some(false),
                    },
                    exercise: Some(Exercise {
                        id: 1,
                        name: "Dumbbell Bench Press".to_string(),
                        description: None,
                        muscle_groups: vec![],
                        equipment: None,
                        difficulty: None,
                        instructions: None,
                        link: None,
                        tag: None,
                    }),
                }],
            }],
        };

        let summary = format_plan_day_for_prompt(&record);
        assert!(summary.starts_with("Day: Upper\n"));
        assert!(summary.contains("[traditional] Main"));
        assert!(summary.contains(
            "- Dumbbell Bench Press: 3 sets x 8 reps, 22.5kg, duration N/A, rest 90s (RPE 8)"
        ));
    }
}
