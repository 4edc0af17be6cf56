use altura_core::config::{AppConfig, LoadOptions};
use altura_db::{migrations, CatalogSeed, DbPool};
use serde::Serialize;

use crate::commands::{connect, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
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
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Warnings (a missing LLM key, no PDF converter) degrade the bot but do not fail the report.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()));
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config: Result<AppConfig, altura_core::config::ConfigError>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_telegram_token(&config));
            checks.push(check_llm_key(&config));
            checks.push(check_renderer(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in
                ["telegram_token", "llm_api_key", "quotation_renderer", "database_connectivity", "equipment_catalog"]
            {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let failed = checks.iter().any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_telegram_token(config: &AppConfig) -> DoctorCheck {
    if config.telegram.has_token() {
        DoctorCheck::new("telegram_token", CheckStatus::Pass, "bot token present")
    } else {
        DoctorCheck::new(
            "telegram_token",
            CheckStatus::Fail,
            "telegram.bot_token is empty; set ALTURA_TELEGRAM_BOT_TOKEN",
        )
    }
}

fn check_llm_key(config: &AppConfig) -> DoctorCheck {
    let provider = config.llm.provider.as_str();
    if config.llm.has_api_key() {
        DoctorCheck::new("llm_api_key", CheckStatus::Pass, format!("{provider} key present"))
    } else {
        DoctorCheck::new(
            "llm_api_key",
            CheckStatus::Warn,
            format!("no {provider} api key; intent routing and document checks will degrade"),
        )
    }
}

fn check_renderer(config: &AppConfig) -> DoctorCheck {
    let converter = config.rendering.wkhtmltopdf_path.clone().or_else(|| which::which("wkhtmltopdf").ok());
    match converter {
        Some(path) => DoctorCheck::new(
            "quotation_renderer",
            CheckStatus::Pass,
            format!("pdf output via {}", path.display()),
        ),
        None => DoctorCheck::new(
            "quotation_renderer",
            CheckStatus::Warn,
            "wkhtmltopdf not found; quotations will be sent as html",
        ),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            )];
        }
    };

    runtime.block_on(async {
        let pool = match connect(config).await {
            Ok(pool) => pool,
            Err((_, error, _)) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::new("equipment_catalog", CheckStatus::Skipped, "skipped without a database"),
                ];
            }
        };

        let checks = vec![
            DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Pass,
                format!("connected using `{}`", config.database.url),
            ),
            check_catalog(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_catalog(pool: &DbPool) -> DoctorCheck {
    let applied = migrations::applied_count(pool).await.unwrap_or(0);
    if applied == 0 {
        return DoctorCheck::new(
            "equipment_catalog",
            CheckStatus::Warn,
            "schema not migrated yet; the server migrates and seeds on start",
        );
    }

    match CatalogSeed::verify(pool).await {
        Ok(verification) if verification.all_present => DoctorCheck::new(
            "equipment_catalog",
            CheckStatus::Pass,
            format!("{} standard items present", CatalogSeed::item_count()),
        ),
        Ok(verification) => DoctorCheck::new(
            "equipment_catalog",
            CheckStatus::Warn,
            format!("missing standard items: {}", verification.missing().join(", ")),
        ),
        Err(error) => DoctorCheck::new("equipment_catalog", CheckStatus::Fail, error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
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
