use boulanger_core::config::{AppConfig, LoadOptions};
use boulanger_db::{connect_with_settings, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Degraded,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_language_service(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["language_service", "database"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let degraded = checks.iter().any(|check| check.status == CheckStatus::Degraded);
    let (overall_status, summary) = match (failed, degraded) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => {
            (CheckStatus::Degraded, "doctor: ready, running without intent recognition")
        }
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

/// Missing settings are a supported mode, not a failure.
fn check_language_service(config: &AppConfig) -> DoctorCheck {
    let missing = config.nlu.missing_settings();
    if missing.is_empty() {
        DoctorCheck {
            name: "language_service",
            status: CheckStatus::Pass,
            details: format!(
                "configured for `{}`",
                config.nlu.endpoint_url().unwrap_or_else(|| "<unset>".to_string())
            ),
        }
    } else {
        DoctorCheck {
            name: "language_service",
            status: CheckStatus::Degraded,
            details: format!("not configured; missing {}", missing.join(", ")),
        }
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let pending = migrations::pending_count(&pool)
            .await
            .map_err(|error| format!("failed to read migration history: {error}"));
        pool.close().await;
        pending
    });

    match result {
        Ok(0) => DoctorCheck {
            name: "database",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; schema up to date", config.database.url),
        },
        Ok(pending) => DoctorCheck {
            name: "database",
            status: CheckStatus::Fail,
            details: format!(
                "connected using `{}`; {pending} pending migrations (run `boulanger migrate`)",
                config.database.url
            ),
        },
        Err(error) => DoctorCheck { name: "database", status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Degraded => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
