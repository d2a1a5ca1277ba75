use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::clients::models::common::{BlockType, GeneratedBlock};
use crate::db::models::WorkoutBlockValues;

pub const DURATION_TOLERANCE_MINUTES: u32 = 5;

/// Fallback block type by style; earlier entries win when several styles are set.
const STYLE_PRECEDENCE: [(&str, BlockType); 10] = [
    ("crossfit", BlockType::Amrap),
    ("hiit", BlockType::Tabata),
    ("functional", BlockType::Circuit),
    ("cardio", BlockType::Circuit),
    ("yoga", BlockType::Flow),
    ("pilates", BlockType::Flow),
    ("mobility", BlockType::Flow),
    ("strength", BlockType::Traditional),
    ("balance", BlockType::Traditional),
    ("rehab", BlockType::Traditional),
];

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Accepts full or abbreviated English weekday names in any case.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    name.trim().parse::<Weekday>().ok()
}

/// Today's calendar date in the caller's IANA timezone, UTC when absent or unknown.
pub fn today_in(timezone: Option<&str>) -> NaiveDate {
    let now = Utc::now();
    match timezone.map(str::trim).filter(|tz| !tz.is_empty()) {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => now.with_timezone(&tz).date_naive(),
            Err(_) => {
                tracing::warn!(timezone = %name, "schedule.unknown_timezone");
                now.date_naive()
            }
        },
        None => now.date_naive(),
    }
}

/// Available weekdays sorted Monday first, then rotated to start at the first one on or after `today`.
///
/// Unknown names are ignored; an empty result means every weekday.
pub fn weekday_cycle(available_days: &[String], today: NaiveDate) -> Vec<Weekday> {
    let mut days: Vec<Weekday> = available_days
        .iter()
        .filter_map(|name| {
            let parsed = parse_weekday(name);
            if parsed.is_none() {
                tracing::debug!(day = %name, "schedule.unknown_weekday");
            }
            parsed
        })
        .collect();
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();

    if days.is_empty() {
        days = ALL_WEEKDAYS.to_vec();
    }

    let today_index = today.weekday().num_days_from_monday();
    let start = days
        .iter()
        .position(|day| day.num_days_from_monday() >= today_index)
        .unwrap_or(0);
    days.rotate_left(start);
    days
}

/// One strictly increasing date per generated day, following the weekday cycle from today.
pub fn assign_dates(cycle: &[Weekday], today: NaiveDate, count: usize) -> Vec<NaiveDate> {
    if cycle.is_empty() {
        return Vec::new();
    }

    let mut dates = Vec::with_capacity(count);
    let mut next_candidate = today;
    for index in 0..count {
        let target = cycle[index % cycle.len()];
        let offset = (7 + target.num_days_from_monday()
            - next_candidate.weekday().num_days_from_monday())
            % 7;
        let date = next_candidate + Days::new(u64::from(offset));
        dates.push(date);
        next_candidate = date + Days::new(1);
    }
    dates
}

/// Block metadata used when the model leaves fields out.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDefaults {
    pub block_type: BlockType,
    pub style_label: String,
    pub target_duration: u32,
}

impl BlockDefaults {
    pub fn derive(styles: &[String], target_duration: u32) -> Self {
        let lowered: Vec<String> = styles.iter().map(|s| s.trim().to_lowercase()).collect();
        let matched = STYLE_PRECEDENCE
            .iter()
            .find(|(style, _)| lowered.iter().any(|s| s == style));

        let (block_type, style_label) = match matched {
            Some((style, block_type)) => (*block_type, capitalize(style)),
            None => (BlockType::Traditional, "General".to_string()),
        };

        Self {
            block_type,
            style_label,
            target_duration,
        }
    }

    pub fn block_name(&self, block_type: BlockType) -> String {
        match block_type {
            BlockType::Warmup => "Warm-up".to_string(),
            BlockType::Cooldown => "Cool-down".to_string(),
            other => format!("{} {}", self.style_label, block_type_label(other)),
        }
    }

    /// Clock for timed formats: the session minus warm-up and cool-down allowance.
    pub fn time_cap_minutes(&self, block_type: BlockType) -> Option<u32> {
        block_type
            .is_timed()
            .then(|| self.target_duration.saturating_sub(10).max(5))
    }

    pub fn rounds(&self, block_type: BlockType) -> Option<u32> {
        match block_type {
            BlockType::Tabata => Some(8),
            block_type if block_type.is_round_based() => {
                Some((self.target_duration / 10).clamp(2, 5))
            }
            _ => None,
        }
    }
}

/// Persistable block values with any missing metadata filled from `defaults`.
///
/// Time caps are kept only for timed formats; `order` is the block's position.
pub fn resolve_block(
    block: &GeneratedBlock,
    position: usize,
    defaults: &BlockDefaults,
) -> WorkoutBlockValues {
    let block_type = block.block_type.unwrap_or(defaults.block_type);
    let block_name = block
        .block_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| defaults.block_name(block_type));

    let time_cap_minutes = if block_type.is_timed() {
        block
            .time_cap_minutes
            .or(block.block_duration_minutes)
            .or_else(|| defaults.time_cap_minutes(block_type))
    } else {
        None
    };
    let rounds = block.rounds.or_else(|| defaults.rounds(block_type));

    WorkoutBlockValues {
        block_type: block_type.as_str().to_string(),
        block_name: Some(block_name),
        block_duration_minutes: block.block_duration_minutes.map(i64::from),
        time_cap_minutes: time_cap_minutes.map(i64::from),
        rounds: rounds.map(i64::from),
        instructions: block.instructions.clone(),
        order: position as i64,
    }
}

/// Whether the declared block minutes land within the tolerance around the target.
pub fn duration_within_tolerance(declared: u32, target: u32) -> bool {
    declared.abs_diff(target) <= DURATION_TOLERANCE_MINUTES
}

fn block_type_label(block_type: BlockType) -> &'static str {
    match block_type {
        BlockType::Traditional => "Strength Sets",
        BlockType::Amrap => "AMRAP",
        BlockType::Emom => "EMOM",
        BlockType::ForTime => "For Time",
        BlockType::Circuit => "Circuit",
        BlockType::Flow => "Flow",
        BlockType::Tabata => "Tabata",
        BlockType::Warmup => "Warm-up",
        BlockType::Cooldown => "Cool-down",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::models::common::GeneratedExercise;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn days(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("Monday"), Some(Weekday::Mon));
        assert_eq!(parse_weekday(" wed "), Some(Weekday::Wed));
        assert_eq!(parse_weekday("someday"), None);
    }

    #[test]
    fn test_cycle_rotates_to_next_available_day() {
        let tuesday = date(2026, 10, 20);
        let cycle = weekday_cycle(&days(&["monday", "wednesday"]), tuesday);
        assert_eq!(cycle, vec![Weekday::Wed, Weekday::Mon]);
    }

    #[test]
    fn test_cycle_wraps_when_nothing_left_this_week() {
        let saturday = date(2026, 10, 24);
        let cycle = weekday_cycle(&days(&["friday", "tuesday", "Tuesday"]), saturday);
        assert_eq!(cycle, vec![Weekday::Tue, Weekday::Fri]);
    }

    #[test]
    fn test_empty_or_unknown_days_mean_every_day() {
        let monday = date(2026, 10, 19);
        assert_eq!(weekday_cycle(&[], monday).len(), 7);
        assert_eq!(weekday_cycle(&days(&["funday"]), monday), ALL_WEEKDAYS.to_vec());
    }

    #[test]
    fn test_assign_dates_monday_wednesday_from_tuesday() {
        let tuesday = date(2026, 10, 20);
        let cycle = weekday_cycle(&days(&["monday", "wednesday"]), tuesday);
        let dates = assign_dates(&cycle, tuesday, cycle.len());

        assert_eq!(dates, vec![date(2026, 10, 21), date(2026, 10, 26)]);
    }

    #[test]
    fn test_first_date_may_be_today() {
        let monday = date(2026, 10, 19);
        let cycle = weekday_cycle(&days(&["monday", "thursday"]), monday);
        let dates = assign_dates(&cycle, monday, 2);

        assert_eq!(dates, vec![date(2026, 10, 19), date(2026, 10, 22)]);
    }

    #[test]
    fn test_assigned_dates_strictly_increase() {
        let today = date(2026, 12, 30);
        let cycle = weekday_cycle(&[], today);
        let dates = assign_dates(&cycle, today, 10);

        assert_eq!(dates.len(), 10);
        assert_eq!(dates[0], today);
        assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(dates[9], date(2027, 1, 8));
    }

    #[test]
    fn test_today_in_unknown_timezone_falls_back_to_utc() {
        assert_eq!(today_in(Some("Mars/Olympus")), Utc::now().date_naive());
        assert_eq!(today_in(None), Utc::now().date_naive());
    }

    #[test]
    fn test_style_precedence() {
        let pick = |styles: &[&str]| BlockDefaults::derive(&days(styles), 30).block_type;

        assert_eq!(pick(&["strength", "crossfit"]), BlockType::Amrap);
        assert_eq!(pick(&["yoga", "hiit"]), BlockType::Tabata);
        assert_eq!(pick(&["cardio"]), BlockType::Circuit);
        assert_eq!(pick(&["Mobility", "rehab"]), BlockType::Flow);
        assert_eq!(pick(&["balance"]), BlockType::Traditional);
        assert_eq!(pick(&[]), BlockType::Traditional);
    }

    #[test]
    fn test_resolve_block_fills_missing_metadata() {
        let defaults = BlockDefaults::derive(&days(&["crossfit"]), 40);
        let block = GeneratedBlock {
            exercises: vec![GeneratedExercise {
                name: "Thruster".to_string(),
                ..GeneratedExercise::default()
            }],
            ..GeneratedBlock::default()
        };

        let values = resolve_block(&block, 2, &defaults);
        assert_eq!(values.block_type, "amrap");
        assert_eq!(values.block_name.as_deref(), Some("Crossfit AMRAP"));
        assert_eq!(values.time_cap_minutes, Some(30));
        assert_eq!(values.rounds, None);
        assert_eq!(values.order, 2);
    }

    #[test]
    fn test_resolve_block_drops_time_cap_on_untimed_block() {
        let defaults = BlockDefaults::derive(&days(&["pilates"]), 30);
        let block = GeneratedBlock {
            block_type: Some(BlockType::Traditional),
            block_name: Some("Core".to_string()),
            time_cap_minutes: Some(12),
            block_duration_minutes: Some(15),
            ..GeneratedBlock::default()
        };

        let values = resolve_block(&block, 0, &defaults);
        assert_eq!(values.block_type, "traditional");
        assert_eq!(values.block_name.as_deref(), Some("Core"));
        assert_eq!(values.time_cap_minutes, None);
        assert_eq!(values.block_duration_minutes, Some(15));
    }

    #[test]
    fn test_round_based_defaults() {
        let defaults = BlockDefaults::derive(&days(&["yoga"]), 45);
        assert_eq!(defaults.rounds(BlockType::Flow), Some(4));
        assert_eq!(defaults.rounds(BlockType::Tabata), Some(8));
        assert_eq!(defaults.rounds(BlockType::Circuit), Some(4));
        assert_eq!(defaults.rounds(BlockType::Traditional), None);
        assert_eq!(defaults.rounds(BlockType::Amrap), None);
        assert_eq!(defaults.block_name(BlockType::Warmup), "Warm-up");
    }

    #[test]
    fn test_duration_tolerance() {
        assert!(duration_within_tolerance(30, 30));
        assert!(duration_within_tolerance(35, 30));
        assert!(duration_within_tolerance(25, 30));
        assert!(!duration_within_tolerance(36, 30));
        assert!(!duration_within_tolerance(0, 30));
    }
}
