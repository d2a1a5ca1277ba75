use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub database_url: String,
    pub port: String,
    pub conversation_ttl_minutes: i64,
    pub conversation_max_messages: usize,
    pub job_delay_seconds: u64,
    pub job_max_attempts: u32,
    pub job_retention_minutes: u64,
    /// Comma-separated origins, or `*` for any.
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")?;
        let port = env::var("PORT")?;
        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://workouts.db?mode=rwc".to_string());

        Ok(Self {
            gemini_api_key,
            gemini_model,
            database_url,
            port,
            conversation_ttl_minutes: parse_or("CONVERSATION_TTL_MINUTES", 120)?,
            conversation_max_messages: parse_or("CONVERSATION_MAX_MESSAGES", 40)?,
            job_delay_seconds: parse_or("JOB_DELAY_SECONDS", 0)?,
            job_max_attempts: parse_or("JOB_MAX_ATTEMPTS", 3)?,
            job_retention_minutes: parse_or("JOB_RETENTION_MINUTES", 60)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}
