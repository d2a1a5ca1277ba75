use thiserror::Error;

/// SQLite primary result codes that indicate contention rather than a bad query.
const RETRIABLE_SQLITE_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Message fragments that mark a store error as transient.
const RETRIABLE_MESSAGES: &[&str] = &[
    "database is locked",
    "database table is locked",
    "connection reset",
    "connection refused",
    "timed out",
    "broken pipe",
];

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Profile not found for user {0}")]
    ProfileNotFound(i64),

    #[error("Profile is incomplete, missing: {}", .0.join(", "))]
    ProfileIncomplete(Vec<&'static str>),

    #[error("Failed to parse generated workout: {0}")]
    GenerationParse(String),

    #[error("Exercise not found in catalog: {0}")]
    ExerciseNotFound(String),

    #[error("Plan day {0} not found")]
    PlanDayNotFound(i64),

    #[error("User {0} already has an active workout")]
    ActiveWorkoutConflict(i64),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlannerError>;

impl PlannerError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::GenerationParse(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Whether a job runner may retry the operation that produced this error.
    ///
    /// Only store errors are classified; everything the pipeline itself raises
    /// (parse failures, incomplete profiles, cancellation) is final.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Database(err) => is_retriable_sqlx(err),
            _ => false,
        }
    }
}

fn is_retriable_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            let code_matches = db_err
                .code()
                .is_some_and(|code| RETRIABLE_SQLITE_CODES.contains(&&*code));
            code_matches || message_is_retriable(db_err.message())
        }
        other => message_is_retriable(&other.to_string()),
    }
}

fn message_is_retriable(message: &str) -> bool {
    let lowered = message.to_lowercase();
    RETRIABLE_MESSAGES
        .iter()
        .any(|fragment| lowered.contains(fragment))
}
