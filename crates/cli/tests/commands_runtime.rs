use std::env;
use std::io::Cursor;
use std::sync::{Mutex, OnceLock};

use boulanger_cli::commands::chat::{self, ChatOptions};
use boulanger_cli::commands::{config, doctor, migrate};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_applies_schema_then_reports_up_to_date() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("orders.db").display());

    with_env(&[("BOULANGER_DATABASE_URL", &url)], || {
        let first = migrate::run();
        assert_eq!(first.exit_code, 0, "expected successful migrate run");
        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "applied 2 pending migrations");

        let second = migrate::run();
        assert_eq!(second.exit_code, 0);
        assert_eq!(parse_payload(&second.output)["message"], "schema already up to date");
    });
}

#[test]
fn migrate_returns_config_failure_for_unsupported_database() {
    with_env(&[("BOULANGER_DATABASE_URL", "postgres://localhost/orders")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_redacts_endpoint_key_and_attributes_env_sources() {
    with_env(
        &[
            ("LuisAppId", "bakery-app"),
            ("BOULANGER_NLU_ENDPOINT_KEY", "very-secret-key"),
            ("BOULANGER_NLU_ENDPOINT", "https://bakery.cognitiveservices.azure.com"),
        ],
        || {
            let output = config::run();

            assert!(!output.contains("very-secret-key"), "endpoint key must never be printed");
            assert!(output.contains(
                "- nlu.endpoint_key = <redacted> (source: env (BOULANGER_NLU_ENDPOINT_KEY))"
            ));
            assert!(output.contains("- nlu.application_id = bakery-app (source: env (LuisAppId))"));
            assert!(output.contains("- database.url = sqlite://boulanger.db (source: default)"));
            assert!(output.ends_with("language service: configured"));
        },
    );
}

#[test]
fn config_reports_degraded_language_service_when_unset() {
    with_env(&[], || {
        let output = config::run();
        assert!(output.contains("- nlu.endpoint_key = <unset> (source: default)"));
        assert!(output.contains("language service: degraded (missing"));
    });
}

#[test]
fn doctor_reports_degraded_without_language_service() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("doctor.db").display());

    with_env(&[("BOULANGER_DATABASE_URL", &url)], || {
        assert_eq!(migrate::run().exit_code, 0);

        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "degraded");

        let checks = report["checks"].as_array().expect("checks array");
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("language_service"), "degraded");
        assert_eq!(status_of("database"), "pass");
    });
}

#[test]
fn doctor_fails_when_migrations_are_pending() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("fresh.db").display());

    with_env(&[("BOULANGER_DATABASE_URL", &url)], || {
        let output = doctor::run(false);
        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] database:"));
        assert!(output.contains("pending migrations"));
        assert!(output.contains("- [warn] language_service:"));
    });
}

#[test]
fn ephemeral_chat_places_an_order_without_language_service() {
    with_env(&[], || {
        let mut input = Cursor::new("Bread\n2\nsmall\nBrown\nyes\nexit\n");
        let mut output = Vec::new();

        let result = chat::run(
            ChatOptions { conversation_id: Some("console-test".to_string()), ephemeral: true },
            &mut input,
            &mut output,
        );
        assert_eq!(result.exit_code, 0, "unexpected failure: {}", result.output);

        let transcript = String::from_utf8(output).expect("utf-8 transcript");
        assert!(transcript.contains("How many units do you need today?"));
        assert!(transcript.contains("  options: small | medium | large"));
        assert!(transcript.contains("Thank you! We received your order for Bread"));

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "chat");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.ends_with("with 1 orders placed")));
    });
}

#[test]
fn chat_cancel_keyword_abandons_the_order() {
    with_env(&[], || {
        let mut input = Cursor::new("Cake\ncancel\n");
        let mut output = Vec::new();

        let result =
            chat::run(ChatOptions { conversation_id: None, ephemeral: true }, &mut input, &mut output);
        assert_eq!(result.exit_code, 0);

        let transcript = String::from_utf8(output).expect("utf-8 transcript");
        assert!(transcript.contains("Cancelling your order."));
        assert!(!transcript.contains("Thank you!"));
        assert!(parse_payload(&result.output)["message"]
            .as_str()
            .is_some_and(|message| message.ends_with("with 0 orders placed")));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "BOULANGER_NLU_APPLICATION_ID",
        "BOULANGER_NLU_ENDPOINT_KEY",
        "BOULANGER_NLU_ENDPOINT",
        "BOULANGER_NLU_TIMEOUT_SECS",
        "LuisAppId",
        "LuisAPIKey",
        "LuisAPIHostName",
        "BOULANGER_DATABASE_URL",
        "BOULANGER_DATABASE_MAX_CONNECTIONS",
        "BOULANGER_DATABASE_TIMEOUT_SECS",
        "BOULANGER_SERVER_BIND_ADDRESS",
        "BOULANGER_SERVER_PORT",
        "BOULANGER_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "BOULANGER_LOGGING_LEVEL",
        "BOULANGER_LOGGING_FORMAT",
        "BOULANGER_LOG_LEVEL",
        "BOULANGER_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
