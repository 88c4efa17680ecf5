//! Table-driven tests for configuration loading and validation.

mod common;

use std::path::PathBuf;

use common::{ScriptedChannel, TestHarness};
use tokio_util::sync::CancellationToken;
use tripwire::config::{load_config, load_config_from_str};
use tripwire::decision::FlagDecision;
use tripwire::interview::{AgentEvent, Verdict};
use tripwire::model::ModificationKind;

struct ConfigTestCase {
    name: &'static str,
    config_json: &'static str,
    should_succeed: bool,
    expected_error: Option<&'static str>,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_http_suggestion",
        config_json: r#"{
            "version": "1.0",
            "suggestion": {
                "endpoint": "https://suggest.example.edu/v1/mutate",
                "api_key_env_var": "TRIPWIRE_SUGGEST_KEY",
                "timeout_secs": 10
            }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_zero_weight",
        config_json: r#"{
            "version": "1.0",
            "detection": { "weights": { "punctuation": 0 } }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "missing_version",
        config_json: r#"{ "detection": { "threshold": 0.5 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "wrong_version",
        config_json: r#"{ "version": "2.0" }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "threshold_out_of_range",
        config_json: r#"{ "version": "1.0", "detection": { "threshold": 1.5 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "negative_weight",
        config_json: r#"{ "version": "1.0", "detection": { "weights": { "word": -0.1 } } }"#,
        should_succeed: false,
        expected_error: None,
    },
    ConfigTestCase {
        name: "unknown_section",
        config_json: r#"{ "version": "1.0", "ocr": { "enabled": true } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_font_size",
        config_json: r#"{ "version": "1.0", "encoder": { "font_size": 0 } }"#,
        should_succeed: false,
        expected_error: None,
    },
    ConfigTestCase {
        name: "non_http_endpoint",
        config_json: r#"{ "version": "1.0", "suggestion": { "endpoint": "file:///etc/passwd" } }"#,
        should_succeed: false,
        expected_error: Some("endpoint"),
    },
    ConfigTestCase {
        name: "valid_stage_lease",
        config_json: r#"{ "version": "1.0", "pipeline": { "stage_lease_secs": 120 } }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "stage_lease_shorter_than_suggestion_timeout",
        config_json: r#"{
            "version": "1.0",
            "suggestion": { "timeout_secs": 90 },
            "pipeline": { "stage_lease_secs": 60 }
        }"#,
        should_succeed: false,
        expected_error: Some("stage_lease_secs"),
    },
    ConfigTestCase {
        name: "not_json",
        config_json: "version = 1.0",
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for test_case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(test_case.config_json);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}': Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Test '{}': Expected error but got success",
                test_case.name
            );

            if let Some(expected_error) = test_case.expected_error {
                let error_msg = result.err().unwrap().to_string();
                assert!(
                    error_msg.contains(expected_error),
                    "Test '{}': Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected_error,
                    error_msg
                );
            }
        }
    }
}

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn test_fixture_values() {
    let config = load_config(fixtures_path().join("configs/tripwire.json")).unwrap();

    assert_eq!(config.detection.threshold, 0.4);
    assert_eq!(config.detection.weights.punctuation, 0.0);
    assert_eq!(config.diff.max_cells, 1_000_000);
    assert_eq!(config.encoder.font_size, 11.0);
    assert_eq!(config.suggestion.max_traps, 4);
    assert_eq!(config.interview.verdict_marker, "RESULT:");
}

#[test]
fn test_missing_file() {
    let err = load_config(fixtures_path().join("configs/absent.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[tokio::test]
async fn test_configured_threshold_and_marker_drive_pipeline() {
    let config = load_config(fixtures_path().join("configs/tripwire.json")).unwrap();
    let h = TestHarness::with_config(config, "Use 11 apples; then stop.");
    let id = h.publish("Use 6 apples, then stop.").await;

    let mods = h.assignments.modifications(&id).unwrap();
    assert_eq!(mods.len(), 2);
    assert!(mods.iter().any(|m| m.kind == ModificationKind::Punctuation));

    // Punctuation weighs nothing here, so the number trap alone scores 1.0.
    let receipt = h.submissions.submit_text(&id, "s1", "I used 11 apples.").unwrap();
    assert_eq!(receipt.score, Some(1.0));

    let mut channel = ScriptedChannel::new(vec![
        AgentEvent::agent("VERDICT: LEGITIMATE is not my marker"),
        AgentEvent::student("Ok."),
        AgentEvent::agent("RESULT: LIKELY_CHEATED"),
    ]);
    let outcome = h
        .submissions
        .run_interview(&receipt.submission_id, &mut channel, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.decision, FlagDecision::Flagged);
    assert_eq!(
        h.submissions.get(&receipt.submission_id).unwrap().verdict,
        Some(Verdict::LikelyCheated)
    );
}
