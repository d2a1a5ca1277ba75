pub mod ai_parser;
pub mod ai_prompt;
pub mod conversation;
pub mod day_scheduler;
pub mod jobs;
pub mod output_formatter;
pub mod workout;
pub mod workout_agent;

#[cfg(test)]
pub mod test_utils;
