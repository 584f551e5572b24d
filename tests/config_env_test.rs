//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use lats_engine::config::{Config, LogFormat, RunMode};
use serial_test::serial;
use std::env;

fn with_api_key() {
    env::set_var("ORACLE_API_KEY", "test-key");
}

#[test]
#[serial]
fn test_config_requires_api_key() {
    env::remove_var("ORACLE_API_KEY");

    let result = Config::from_env();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("ORACLE_API_KEY"));
}

#[test]
#[serial]
fn test_config_defaults() {
    with_api_key();
    for key in [
        "ORACLE_BASE_URL",
        "DEPTH_THRESHOLD",
        "BRANCH_CNT",
        "ROLLOUT_THRESHOLD",
        "RESCUE_THRESHOLD",
        "RUN_MODE",
        "RUN_DIR",
    ] {
        env::remove_var(key);
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.oracle.api_key, "test-key");
    assert_eq!(config.oracle.base_url, "https://api.openai.com");
    assert_eq!(config.search.depth_threshold, 10);
    assert_eq!(config.search.branch_count, 3);
    assert_eq!(config.search.rollout_threshold, 5);
    assert_eq!(config.search.rescue_threshold, 3);
    assert_eq!(config.search.run_mode, RunMode::Autonomous);
    assert_eq!(config.artifacts.run_dir.to_str().unwrap(), "./run");
}

#[test]
#[serial]
fn test_config_from_env_custom_oracle() {
    with_api_key();
    env::set_var("ORACLE_BASE_URL", "https://custom.api.com");
    env::set_var("ORACLE_MODEL", "deep-model");
    env::set_var("ORACLE_FAST_MODEL", "quick-model");

    let config = Config::from_env().unwrap();
    assert_eq!(config.oracle.base_url, "https://custom.api.com");
    assert_eq!(config.oracle.model, "deep-model");
    assert_eq!(config.oracle.fast_model, "quick-model");

    env::remove_var("ORACLE_BASE_URL");
    env::remove_var("ORACLE_MODEL");
    env::remove_var("ORACLE_FAST_MODEL");
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    with_api_key();
    env::set_var("DATABASE_PATH", "/custom/path.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/path.db");
    assert_eq!(config.database.max_connections, 10);

    env::remove_var("DATABASE_PATH");
    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    with_api_key();
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_config_search_thresholds() {
    with_api_key();
    env::set_var("DEPTH_THRESHOLD", "4");
    env::set_var("BRANCH_CNT", "0");
    env::set_var("ROLLOUT_THRESHOLD", "2");
    env::set_var("RESCUE_THRESHOLD", "not-a-number");
    env::set_var("REQUEST_TIMEOUT_MS", "1500");

    let config = Config::from_env().unwrap();
    assert_eq!(config.search.depth_threshold, 4);
    // At least one candidate is always requested.
    assert_eq!(config.search.branch_count, 1);
    assert_eq!(config.search.rollout_threshold, 2);
    assert_eq!(config.search.rescue_threshold, 3);
    assert_eq!(config.search.tool_timeout_ms, 1500);
    assert_eq!(config.request.timeout_ms, 1500);

    for key in [
        "DEPTH_THRESHOLD",
        "BRANCH_CNT",
        "ROLLOUT_THRESHOLD",
        "RESCUE_THRESHOLD",
        "REQUEST_TIMEOUT_MS",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_run_mode() {
    with_api_key();
    env::set_var("RUN_MODE", "Interactive");
    assert_eq!(Config::from_env().unwrap().search.run_mode, RunMode::Interactive);

    env::set_var("RUN_MODE", "sometimes");
    assert!(Config::from_env().is_err());

    env::remove_var("RUN_MODE");
}
