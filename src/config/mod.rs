use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub oracle: OracleConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub search: SearchConfig,
    pub artifacts: ArtifactConfig,
}

/// Reasoning oracle (chat-completions endpoint) configuration
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used for candidate generation, evaluation and reflection.
    pub model: String,
    /// Cheaper model used for rescue cycles.
    pub fast_model: String,
    pub temperature: f64,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Whether a human operator confirms answers and tool failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Autonomous,
    Interactive,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "autonomous" | "auto" => Ok(RunMode::Autonomous),
            "interactive" => Ok(RunMode::Interactive),
            _ => Err(format!("Unknown run mode: {}", s)),
        }
    }
}

/// Tree search thresholds
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Depth ceiling for nodes, also the outer iteration budget.
    pub depth_threshold: usize,
    /// Candidates sampled per expansion and concurrent observation bound.
    pub branch_count: usize,
    /// Maximum greedy steps in one rollout.
    pub rollout_threshold: usize,
    /// Maximum attempts per rescue cycle.
    pub rescue_threshold: u32,
    pub run_mode: RunMode,
    /// Timeout applied to each tool invocation.
    pub tool_timeout_ms: u64,
}

/// Artifact directory configuration
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub run_dir: PathBuf,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let oracle = OracleConfig {
            api_key: env::var("ORACLE_API_KEY").map_err(|_| AppError::Config {
                message: "ORACLE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("ORACLE_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            model: env::var("ORACLE_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            fast_model: env::var("ORACLE_FAST_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: env_parse("ORACLE_TEMPERATURE", 1.0),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/lats.db".to_string()),
            ),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MAX_RETRIES", 3),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 1000),
        };

        let run_mode = match env::var("RUN_MODE") {
            Ok(raw) => raw
                .parse::<RunMode>()
                .map_err(|message| AppError::Config { message })?,
            Err(_) => RunMode::Autonomous,
        };

        let search = SearchConfig {
            depth_threshold: env_parse("DEPTH_THRESHOLD", 10),
            branch_count: env_parse::<usize>("BRANCH_CNT", 3).max(1),
            rollout_threshold: env_parse("ROLLOUT_THRESHOLD", 5),
            rescue_threshold: env_parse("RESCUE_THRESHOLD", 3),
            run_mode,
            tool_timeout_ms: request.timeout_ms,
        };

        let artifacts = ArtifactConfig {
            run_dir: PathBuf::from(env::var("RUN_DIR").unwrap_or_else(|_| "./run".to_string())),
        };

        Ok(Config {
            oracle,
            database,
            logging,
            request,
            search,
            artifacts,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth_threshold: 10,
            branch_count: 3,
            rollout_threshold: 5,
            rescue_threshold: 3,
            run_mode: RunMode::Autonomous,
            tool_timeout_ms: 30000,
        }
    }
}
