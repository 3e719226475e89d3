use std::env;
use std::path::PathBuf;

/// Runtime configuration, read once at startup. Every knob has a default
/// so the server boots with an empty environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port for the HTTP/WebSocket listener
    pub port: u16,
    /// Quiz definition loaded at startup and after every admin reset
    pub quiz_path: PathBuf,
    /// Directory for the file-backed room store (None = in-memory only)
    pub data_dir: Option<PathBuf>,
    /// Answer window per question, in milliseconds
    pub time_limit_ms: u64,
    /// How many questions are drawn from the bank per game
    pub question_count: usize,
    /// Feedback window between a completed round and the next question
    pub grading_delay_ms: u64,
    /// Slack added to the answer window before the round is force-advanced
    pub round_grace_ms: u64,
    /// Shared secret required to claim the admin role (None = open)
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: parse_var("PORT", 55005),
            quiz_path: env::var("QUIZ_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("quizzes/default.json")),
            data_dir: env::var("DATA_DIR").ok().map(PathBuf::from),
            time_limit_ms: parse_var("TIME_LIMIT_MS", 30_000),
            question_count: parse_var("QUESTION_COUNT", 15),
            grading_delay_ms: parse_var("GRADING_DELAY_MS", 8_000),
            round_grace_ms: parse_var("ROUND_GRACE_MS", 2_000),
            admin_token: env::var("ADMIN_TOKEN")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 55005,
            quiz_path: PathBuf::from("quizzes/default.json"),
            data_dir: None,
            time_limit_ms: 30_000,
            question_count: 15,
            grading_delay_ms: 8_000,
            round_grace_ms: 2_000,
            admin_token: None,
        }
    }
}

fn parse_var<T: std::str::FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "unparsable value, using default {default}");
            default
        }),
        Err(_) => default,
    }
}
