use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::jobs::JobRetention;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub analysis: AnalysisConfig,
    pub frameworks: FrameworkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub max_parallelism: usize,
    pub timeout_secs: u64,
    pub max_paths_per_pair: usize,
    pub default_impact: f64,
    pub step_rules_path: Option<String>,
    /// Seconds a finished background job stays pollable
    pub job_retention_secs: u64,
    /// Upper bound on finished background jobs kept in memory
    pub max_finished_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfig {
    pub seed_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            max_parallelism: 4,
            timeout_secs: 60,
            max_paths_per_pair: 256,
            default_impact: 5.0,
            step_rules_path: None,
            job_retention_secs: 3600,
            max_finished_jobs: 1000,
        }
    }
}

impl AnalysisConfig {
    pub fn job_retention(&self) -> JobRetention {
        // chrono durations hold at most i64::MAX milliseconds
        let secs = i64::try_from(self.job_retention_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        JobRetention {
            ttl: chrono::Duration::seconds(secs),
            max_finished: self.max_finished_jobs,
        }
    }
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        // Load .env.local first (local overrides), then .env
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();

        let defaults = AnalysisConfig::default();
        let max_parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(defaults.max_parallelism);

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed_or("PORT", 8080),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            },
            database: DatabaseConfig {
                database_path: env::var("DATABASE_PATH")
                    .unwrap_or_else(|_| "./data/tara.db".to_string()),
            },
            analysis: AnalysisConfig {
                max_parallelism: parsed_or("ANALYSIS_MAX_PARALLELISM", max_parallelism).max(1),
                timeout_secs: parsed_or("ANALYSIS_TIMEOUT_SECS", defaults.timeout_secs),
                max_paths_per_pair: parsed_or(
                    "ANALYSIS_MAX_PATHS_PER_PAIR",
                    defaults.max_paths_per_pair,
                ),
                default_impact: parsed_or("ANALYSIS_DEFAULT_IMPACT", defaults.default_impact)
                    .clamp(0.0, 10.0),
                step_rules_path: env::var("STEP_RULES_PATH").ok(),
                job_retention_secs: parsed_or("JOB_RETENTION_SECS", defaults.job_retention_secs),
                max_finished_jobs: parsed_or("MAX_FINISHED_JOBS", defaults.max_finished_jobs),
            },
            frameworks: FrameworkConfig {
                seed_path: env::var("RISK_FRAMEWORK_SEED_PATH").ok(),
            },
            logging: LoggingConfig {
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
        })
    }
}
