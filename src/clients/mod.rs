pub mod gemini;
pub mod models;
