use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use boulanger_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    let mode = if config.nlu.is_configured() {
        "language service: configured".to_string()
    } else {
        format!(
            "language service: degraded (missing {})",
            config.nlu.missing_settings().join(", ")
        )
    };
    lines.push(mode);

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key: "nlu.application_id",
            value: config.nlu.application_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["BOULANGER_NLU_APPLICATION_ID", "LuisAppId"],
        },
        Field {
            key: "nlu.endpoint_key",
            value: if config.nlu.endpoint_key.is_some() { "<redacted>" } else { "<unset>" }
                .to_string(),
            env_keys: &["BOULANGER_NLU_ENDPOINT_KEY", "LuisAPIKey"],
        },
        Field {
            key: "nlu.endpoint",
            value: config.nlu.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["BOULANGER_NLU_ENDPOINT", "LuisAPIHostName"],
        },
        Field {
            key: "nlu.timeout_secs",
            value: config.nlu.timeout_secs.to_string(),
            env_keys: &["BOULANGER_NLU_TIMEOUT_SECS"],
        },
        Field {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["BOULANGER_DATABASE_URL"],
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["BOULANGER_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["BOULANGER_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["BOULANGER_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["BOULANGER_SERVER_PORT"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["BOULANGER_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["BOULANGER_LOGGING_LEVEL", "BOULANGER_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["BOULANGER_LOGGING_FORMAT", "BOULANGER_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("boulanger.toml"), PathBuf::from("config/boulanger.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
