//! Configuration and CLI Tests
//!
//! Config files on disk through to a wired controller.

use std::io::Write;

use promoter::cli::{build_controller, resolve_report, run_command, CliErrorCode, Command};
use promoter::config::{ConfigError, PromoterConfig};
use promoter::promotion::{BuildEvent, EnvironmentTarget, Registration};
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const VALID: &str = r#"{
    "server": {"host": "127.0.0.1", "port": 8123},
    "branches": {"develop": "staging", "release/*": "production"},
    "required_gates": {
        "staging": ["tests"],
        "production": ["tests", "manual-approval"]
    },
    "gate_timeout_secs": 900,
    "retention_secs": 86400,
    "sweep_interval_secs": 2
}"#;

#[test]
fn test_valid_file_builds_controller() {
    let file = write_config(VALID);
    let config = PromoterConfig::load(file.path()).unwrap();

    assert_eq!(config.sweep_interval().as_secs(), 2);

    let controller = build_controller(&config).unwrap();
    let registration = controller
        .register_build(BuildEvent::new("r1", "release/1.0"))
        .unwrap();
    assert!(matches!(registration, Registration::Registered { .. }));

    let status = controller.build_status(registration.build_id()).unwrap();
    assert_eq!(status.environment, EnvironmentTarget::Production);
    assert_eq!(status.gates.required.len(), 2);
}

#[test]
fn test_missing_retention_is_rejected() {
    let file = write_config(
        r#"{"branches": {"main": "production"},
            "required_gates": {"production": ["tests"]},
            "gate_timeout_secs": 60}"#,
    );
    let err = PromoterConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(err.to_string().contains("retention_secs"));
}

#[test]
fn test_mapped_environment_without_gates_is_rejected() {
    let file = write_config(
        r#"{"branches": {"main": "production"},
            "required_gates": {},
            "gate_timeout_secs": 60,
            "retention_secs": 60}"#,
    );
    let err = PromoterConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_resolve_report_from_file() {
    let file = write_config(VALID);
    let config = PromoterConfig::load(file.path()).unwrap();

    let report = resolve_report(&config, "develop").unwrap();
    assert_eq!(report["environment"], "staging");
    assert_eq!(report["required_gates"], serde_json::json!(["tests"]));
}

#[test]
fn test_check_config_command() {
    let file = write_config(VALID);
    run_command(Command::CheckConfig {
        config: file.path().to_path_buf(),
    })
    .unwrap();
}

#[test]
fn test_command_with_missing_file_is_config_error() {
    let err = run_command(Command::Resolve {
        config: "/nonexistent/promoter.json".into(),
        branch: "main".into(),
    })
    .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
}
