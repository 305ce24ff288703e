use hark_core::config::{AppConfig, LoadOptions};
use hark_db::connect_with_settings;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_owned(),
        }
    }
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
            let detail = error.to_string().replace('\\', "\\\\").replace('"', "\\\"");
            format!("{{\"overall_status\":\"fail\",\"summary\":\"report serialization failed: {detail}\"}}")
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            DoctorCheck::pass(
                "slack_token_readiness",
                "bot token format validated by config contract",
            ),
            DoctorCheck::pass(
                "llm_provider",
                format!(
                    "provider `{:?}` with model `{}` configured",
                    config.llm.provider, config.llm.model
                ),
            ),
            check_database_connectivity(&config),
        ],
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail("config_validation", error.to_string())];
            checks.extend(
                ["slack_token_readiness", "llm_provider", "database_connectivity"]
                    .map(DoctorCheck::skipped),
            );
            checks
        }
    };

    let passed = checks.iter().filter(|check| check.status == CheckStatus::Pass).count();
    let all_pass = passed == checks.len();
    DoctorReport {
        overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: format!("doctor: {passed}/{} readiness checks passed", checks.len()),
        checks,
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let probe = crate::commands::current_thread_runtime().and_then(|runtime| {
        runtime.block_on(async {
            let database = &config.database;
            let pool =
                connect_with_settings(&database.url, database.max_connections, database.timeout_secs)
                    .await
                    .map_err(|error| format!("failed to connect to database: {error}"))?;
            pool.close().await;
            Ok(())
        })
    });

    match probe {
        Ok(()) => DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        ),
        Err(details) => DoctorCheck::fail("database_connectivity", details),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let rendered: Vec<String> = report
        .checks
        .iter()
        .map(|check| {
            let marker = match check.status {
                CheckStatus::Pass => "pass",
                CheckStatus::Fail => "FAIL",
                CheckStatus::Skipped => "skip",
            };
            format!("  {marker}  {} ({})", check.name, check.details)
        })
        .collect();

    format!("{}\n{}", report.summary, rendered.join("\n"))
}
