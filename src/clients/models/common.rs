use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

/// Structural format of a workout block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Traditional,
    Amrap,
    Emom,
    ForTime,
    Circuit,
    Flow,
    Tabata,
    Warmup,
    Cooldown,
}

impl BlockType {
    pub const ALL: [BlockType; 9] = [
        Self::Traditional,
        Self::Amrap,
        Self::Emom,
        Self::ForTime,
        Self::Circuit,
        Self::Flow,
        Self::Tabata,
        Self::Warmup,
        Self::Cooldown,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Traditional => "traditional",
            Self::Amrap => "amrap",
            Self::Emom => "emom",
            Self::ForTime => "for_time",
            Self::Circuit => "circuit",
            Self::Flow => "flow",
            Self::Tabata => "tabata",
            Self::Warmup => "warmup",
            Self::Cooldown => "cooldown",
        }
    }

    /// Accepts the canonical names plus common spellings ("AMRAP", "for-time", "warm up").
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "traditional" | "straight_sets" => Some(Self::Traditional),
            "amrap" => Some(Self::Amrap),
            "emom" => Some(Self::Emom),
            "for_time" | "fortime" => Some(Self::ForTime),
            "circuit" => Some(Self::Circuit),
            "flow" => Some(Self::Flow),
            "tabata" => Some(Self::Tabata),
            "warmup" | "warm_up" => Some(Self::Warmup),
            "cooldown" | "cool_down" => Some(Self::Cooldown),
            _ => None,
        }
    }

    /// Formats run against a clock: these carry a time cap.
    pub const fn is_timed(&self) -> bool {
        matches!(self, Self::Amrap | Self::Emom | Self::ForTime)
    }

    /// Formats repeated for a number of rounds.
    pub const fn is_round_based(&self) -> bool {
        matches!(self, Self::Circuit | Self::Flow | Self::Tabata)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| D::Error::custom(format!("unknown block type '{}'", raw)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratedExercise {
    pub name: String,
    #[serde(deserialize_with = "flexible_u32")]
    pub sets: Option<u32>,
    #[serde(deserialize_with = "flexible_u32")]
    pub reps: Option<u32>,
    #[serde(deserialize_with = "flexible_f64")]
    pub weight: Option<f64>,
    /// Seconds.
    #[serde(deserialize_with = "flexible_u32")]
    pub duration: Option<u32>,
    /// Seconds.
    #[serde(deserialize_with = "flexible_u32")]
    pub rest_time: Option<u32>,
    pub notes: Option<String>,
    #[serde(deserialize_with = "flexible_u32")]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratedBlock {
    pub block_type: Option<BlockType>,
    pub block_name: Option<String>,
    #[serde(deserialize_with = "flexible_u32")]
    pub block_duration_minutes: Option<u32>,
    #[serde(deserialize_with = "flexible_u32")]
    pub time_cap_minutes: Option<u32>,
    #[serde(deserialize_with = "flexible_u32")]
    pub rounds: Option<u32>,
    pub instructions: Option<String>,
    #[serde(deserialize_with = "flexible_u32")]
    pub order: Option<u32>,
    pub exercises: Vec<GeneratedExercise>,
}

impl GeneratedBlock {
    pub fn validate(&self, index: usize) -> Result<(), String> {
        let label = self
            .block_name
            .clone()
            .unwrap_or_else(|| format!("block {}", index + 1));

        if self.exercises.is_empty() {
            return Err(format!("{} has no exercises", label));
        }
        if let Some(position) = self.exercises.iter().position(|e| e.name.trim().is_empty()) {
            return Err(format!("{} exercise {} has no name", label, position + 1));
        }
        if self.rounds == Some(0) {
            return Err(format!("{} declares zero rounds", label));
        }
        if self.block_duration_minutes == Some(0) {
            return Err(format!("{} declares a zero-minute duration", label));
        }
        if let Some(block_type) = self.block_type
            && block_type.is_timed()
            && self.time_cap_minutes.is_none()
            && self.block_duration_minutes.is_none()
        {
            return Err(format!(
                "{} is {} but has neither timeCapMinutes nor blockDurationMinutes",
                label, block_type
            ));
        }
        Ok(())
    }
}

/// A catalog entry the model invented and wants created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExerciseToAdd {
    pub name: String,
    pub description: Option<String>,
    pub equipment: Vec<String>,
    pub muscle_groups: Vec<String>,
    pub difficulty: Option<String>,
    pub instructions: Option<String>,
    pub link: Option<String>,
    pub tag: Option<String>,
}

fn leading_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => LEADING_NUMBER
            .find(text)
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
    .filter(|number: &f64| number.is_finite() && *number >= 0.0)
}

/// Numbers the model may send as `12`, `12.0`, `"12"` or `"8-12 reps"` (first number wins).
fn flexible_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(leading_number)
        .map(|number| number.round().min(f64::from(u32::MAX)) as u32))
}

fn flexible_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(leading_number))
}
