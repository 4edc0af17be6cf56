use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use altura_core::config::AppConfig;
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// Effective configuration with the source of every value. Secrets are redacted.
pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in entries(&config) {
        lines.push(render_line(key, &value, source(key, env_key)));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn entries(config: &AppConfig) -> Vec<(&'static str, String, &'static str)> {
    vec![
        ("database.url", config.database.url.clone(), "ALTURA_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "ALTURA_DATABASE_MAX_CONNECTIONS",
        ),
        ("database.timeout_secs", config.database.timeout_secs.to_string(), "ALTURA_DATABASE_TIMEOUT_SECS"),
        ("telegram.bot_token", redact_token(config.telegram.bot_token.expose_secret()), "ALTURA_TELEGRAM_BOT_TOKEN"),
        ("telegram.api_base_url", config.telegram.api_base_url.clone(), "ALTURA_TELEGRAM_API_BASE_URL"),
        (
            "telegram.poll_timeout_secs",
            config.telegram.poll_timeout_secs.to_string(),
            "ALTURA_TELEGRAM_POLL_TIMEOUT_SECS",
        ),
        (
            "telegram.documents_dir",
            config.telegram.documents_dir.display().to_string(),
            "ALTURA_TELEGRAM_DOCUMENTS_DIR",
        ),
        ("llm.provider", config.llm.provider.as_str().to_string(), "ALTURA_LLM_PROVIDER"),
        ("llm.model", config.llm.model.clone(), "ALTURA_LLM_MODEL"),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "ALTURA_LLM_BASE_URL",
        ),
        ("llm.api_key", redact_optional(config.llm.api_key.as_ref()), "ALTURA_LLM_API_KEY"),
        ("llm.max_retries", config.llm.max_retries.to_string(), "ALTURA_LLM_MAX_RETRIES"),
        ("company.name", config.company.name.clone(), "ALTURA_COMPANY_NAME"),
        ("company.email", config.company.email.clone(), "ALTURA_COMPANY_EMAIL"),
        ("company.website", config.company.website.clone(), "ALTURA_COMPANY_WEBSITE"),
        ("pricing.tax_rate", config.pricing.tax_rate.to_string(), "ALTURA_PRICING_TAX_RATE"),
        ("conversation.max_hops", config.conversation.max_hops.to_string(), "ALTURA_CONVERSATION_MAX_HOPS"),
        (
            "conversation.floor_height_m",
            config.conversation.floor_height_m.to_string(),
            "ALTURA_CONVERSATION_FLOOR_HEIGHT_M",
        ),
        (
            "conversation.max_height_m",
            config.conversation.max_height_m.to_string(),
            "ALTURA_CONVERSATION_MAX_HEIGHT_M",
        ),
        (
            "rendering.output_dir",
            config.rendering.output_dir.display().to_string(),
            "ALTURA_RENDERING_OUTPUT_DIR",
        ),
        (
            "rendering.wkhtmltopdf_path",
            config
                .rendering
                .wkhtmltopdf_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<search PATH>".to_string()),
            "ALTURA_RENDERING_WKHTMLTOPDF_PATH",
        ),
        ("notification.enabled", config.notification.enabled.to_string(), "ALTURA_NOTIFICATION_ENABLED"),
        (
            "notification.resend_api_key",
            redact_optional(config.notification.resend_api_key.as_ref()),
            "ALTURA_NOTIFICATION_RESEND_API_KEY",
        ),
        ("notification.sales_address", config.sales_address().to_string(), "ALTURA_NOTIFICATION_SALES_ADDRESS"),
        ("server.bind_address", config.server.bind_address.clone(), "ALTURA_SERVER_BIND_ADDRESS"),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "ALTURA_SERVER_HEALTH_CHECK_PORT",
        ),
        ("logging.level", config.logging.level.clone(), "ALTURA_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "ALTURA_LOGGING_FORMAT"),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("altura.toml"), PathBuf::from("config/altura.toml")].into_iter().find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Bot tokens keep their numeric bot id, which is public anyway.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "<redacted>".to_string(),
        _ => "<unset>".to_string(),
    }
}
