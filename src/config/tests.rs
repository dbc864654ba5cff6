use super::*;
use serial_test::serial;
use std::collections::HashMap;
use tempfile::TempDir;

fn overlay(vars: &[(&str, &str)]) -> Result<Config, MedicError> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut config = Config::default();
    apply_env_overlay(&mut config, |key| map.get(key).cloned())?;
    Ok(config)
}

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_secs, 60);
    assert!(config.retry.exponential_backoff);
    assert_eq!(config.retry.max_inline_wait_secs, 0);
    assert_eq!(config.github.lookback_hours, 24);
    assert_eq!(config.github.conclusions, vec!["failure", "timed_out"]);
    assert_eq!(config.ai.provider, AiProvider::OpenAi);
    assert_eq!(config.ai.effective_model(), "gpt-4");
    assert!((config.ai.ai_fix_min_confidence - 0.7).abs() < f64::EPSILON);
    assert!(config.notify.create_issues);
    assert_eq!(config.notify.label, "workflow-failure");
    assert_eq!(config.commit.branch_prefix, "medic/");
    assert_eq!(config.safety.max_files, 5);
    assert_eq!(config.safety.max_file_bytes, 256 * 1024);
    assert_eq!(config.dashboard.port, 5000);
    assert_eq!(config.state_dir, PathBuf::from(".medic"));
}

#[test]
fn test_parse_partial_file() {
    let toml_str = r#"
        state_dir = "/var/lib/medic"
        log_format = "json"

        [github]
        repositories = ["octo/app", "octo/lib"]
        deny = ["octo/archive-*"]

        [ai]
        provider = "anthropic"

        [retry]
        max_attempts = 5
        exponential_backoff = false

        [commit]
        mode = "local"

        [commit.local]
        push = false
        checkouts = { "octo/app" = "/src/app" }
    "#;

    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.state_dir, PathBuf::from("/var/lib/medic"));
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(config.github.repositories.len(), 2);
    assert_eq!(config.github.repositories[1].full_name(), "octo/lib");
    assert_eq!(config.github.api_url, "https://api.github.com");
    assert_eq!(config.ai.provider, AiProvider::Anthropic);
    assert_eq!(config.ai.effective_model(), "claude-sonnet-4-5");
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.base_delay_secs, 60);
    assert!(!config.retry.exponential_backoff);
    assert_eq!(config.commit.mode, CommitMode::Local);
    assert_eq!(config.commit.local.remote, "origin");
    assert!(!config.commit.local.push);
    assert_eq!(
        config.commit.local.checkouts.get("octo/app"),
        Some(&PathBuf::from("/src/app"))
    );
}

#[test]
fn test_invalid_repository_in_file_is_rejected() {
    let toml_str = r#"
        [github]
        repositories = ["not a repo"]
    "#;
    assert!(toml::from_str::<Config>(toml_str).is_err());
}

#[test]
fn test_env_overlay() {
    let config = overlay(&[
        ("GITHUB_TOKEN", "ghp_test"),
        ("GITHUB_REPOS", "octo/app, octo/lib ,"),
        ("AI_PROVIDER", "anthropic"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
        ("AI_MODEL", "claude-custom"),
        ("MAX_RETRIES", "4"),
        ("RETRY_DELAY_SECONDS", "30"),
        ("EXPONENTIAL_BACKOFF", "false"),
        ("CREATE_ISSUES", "False"),
        ("ISSUE_ASSIGNEES", "alice, bob"),
        ("LOOKBACK_HOURS", "48"),
        ("DASHBOARD_PORT", "8080"),
        ("MEDIC_LOG_FORMAT", "json"),
    ])
    .unwrap();

    assert_eq!(config.credentials.github_token.as_deref(), Some("ghp_test"));
    assert_eq!(config.github.repositories.len(), 2);
    assert_eq!(config.ai.provider, AiProvider::Anthropic);
    assert_eq!(config.ai.effective_model(), "claude-custom");
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.base_delay_secs, 30);
    assert!(!config.retry.exponential_backoff);
    assert!(!config.notify.create_issues);
    assert_eq!(config.notify.assignees, vec!["alice", "bob"]);
    assert_eq!(config.github.lookback_hours, 48);
    assert_eq!(config.dashboard.port, 8080);
    assert_eq!(config.log_format, LogFormat::Json);
}

#[test]
fn test_env_overlay_rejects_bad_values() {
    assert!(overlay(&[("MAX_RETRIES", "three")]).is_err());
    assert!(overlay(&[("AI_PROVIDER", "cohere")]).is_err());
    assert!(overlay(&[("CREATE_ISSUES", "maybe")]).is_err());
    assert!(overlay(&[("GITHUB_REPOS", "octo")]).is_err());
    assert!(overlay(&[("MEDIC_LOG_FORMAT", "xml")]).is_err());
}

#[test]
fn test_blank_env_values_are_ignored() {
    let config = overlay(&[("GITHUB_TOKEN", "   "), ("AI_MODEL", "")]).unwrap();
    assert_eq!(config.credentials.github_token, None);
    assert_eq!(config.ai.model, None);
}

#[test]
fn test_validate_for_monitor_lists_every_missing_credential() {
    let config = Config::default();
    let problems = config.problems_for(CommandKind::Monitor);
    assert!(problems.iter().any(|p| p.contains("GITHUB_TOKEN")));
    assert!(problems.iter().any(|p| p.contains("OPENAI_API_KEY")));

    let err = config.validate_for(CommandKind::Monitor).unwrap_err();
    assert!(matches!(err, MedicError::MissingConfig(_)));
}

#[test]
fn test_validate_for_scan_needs_only_github() {
    let config = overlay(&[("GITHUB_TOKEN", "ghp_test")]).unwrap();
    assert!(config.validate_for(CommandKind::Scan).is_ok());
    assert!(config.validate_for(CommandKind::Monitor).is_err());
}

#[test]
fn test_validate_for_dashboard_and_status_need_nothing() {
    let config = Config::default();
    assert!(config.validate_for(CommandKind::Dashboard).is_ok());
    assert!(config.validate_for(CommandKind::Status).is_ok());
    assert!(config.validate_for(CommandKind::Completions).is_ok());
}

#[test]
fn test_validate_for_reports_invalid_settings() {
    let mut config = overlay(&[("GITHUB_TOKEN", "t"), ("OPENAI_API_KEY", "k")]).unwrap();
    config.retry.max_attempts = 0;
    config.ai.ai_fix_min_confidence = 1.5;
    config.safety.allowed_paths.push("[".to_string());

    let problems = config.problems_for(CommandKind::Monitor);
    assert_eq!(problems.len(), 3, "{problems:?}");
    assert!(matches!(
        config.validate_for(CommandKind::Monitor),
        Err(MedicError::InvalidConfig(_))
    ));
}

#[test]
fn test_credentials_debug_is_redacted() {
    let config = overlay(&[("GITHUB_TOKEN", "ghp_secret")]).unwrap();
    let debug = format!("{:?}", config.credentials);
    assert!(!debug.contains("ghp_secret"));
    assert!(debug.contains("<set>"));
}

#[test]
#[serial]
fn test_load_explicit_file_with_process_env() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("custom.toml");
    fs::write(&path, "[retry]\nmax_attempts = 7\n").unwrap();

    std::env::set_var("MAX_RETRIES", "2");
    let loaded = Config::load(Some(&path));
    std::env::remove_var("MAX_RETRIES");

    let config = loaded.unwrap();
    assert_eq!(config.retry.max_attempts, 2);
}

#[test]
#[serial]
fn test_load_missing_explicit_file_fails() {
    let temp = TempDir::new().unwrap();
    let err = Config::load(Some(&temp.path().join("nope.toml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}
