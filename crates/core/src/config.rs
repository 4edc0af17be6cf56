use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub company: CompanyConfig,
    pub pricing: PricingConfig,
    pub conversation: ConversationConfig,
    pub rendering: RenderingConfig,
    pub notification: NotificationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
    pub documents_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

/// Company facts quoted back to customers and printed on quotation documents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompanyConfig {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub currency: String,
    pub service_city: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    /// Decimal places kept when rounding tax. Zero for currencies without minor units.
    pub tax_scale: u32,
    pub quote_validity_days: u32,
}

/// Business thresholds for the dialogue controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationConfig {
    pub max_hops: u32,
    pub history_window: u32,
    pub floor_height_m: Decimal,
    pub min_height_m: Decimal,
    pub max_height_m: Decimal,
    pub default_rental_days: u32,
    pub max_document_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct RenderingConfig {
    pub output_dir: PathBuf,
    pub template_dir: Option<PathBuf>,
    pub wkhtmltopdf_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub resend_api_key: Option<SecretString>,
    pub api_base_url: String,
    pub sales_address: Option<String>,
    pub from_address: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub max_hops: Option<u32>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://altura.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
                documents_dir: PathBuf::from("data/documents"),
            },
            llm: LlmConfig {
                provider: LlmProvider::Gemini,
                api_key: None,
                base_url: None,
                model: "gemini-1.5-flash".to_string(),
                temperature: 0.3,
                max_tokens: 300,
                timeout_secs: 30,
                max_retries: 3,
                retry_base_delay_ms: 800,
                retry_max_delay_ms: 60_000,
            },
            company: CompanyConfig {
                name: "EquiposUp".to_string(),
                email: "ventas@equiposup.com".to_string(),
                phone: "+57 300 000 0000".to_string(),
                website: "https://equiposup.com".to_string(),
                currency: "COP".to_string(),
                service_city: "Bogotá".to_string(),
            },
            pricing: PricingConfig {
                tax_rate: Decimal::new(19, 2),
                tax_scale: 0,
                quote_validity_days: 15,
            },
            conversation: ConversationConfig {
                max_hops: 12,
                history_window: 20,
                floor_height_m: Decimal::from(3),
                min_height_m: Decimal::ONE,
                max_height_m: Decimal::from(100),
                default_rental_days: 7,
                max_document_attempts: 3,
            },
            rendering: RenderingConfig {
                output_dir: PathBuf::from("data/quotations"),
                template_dir: None,
                wkhtmltopdf_path: None,
            },
            notification: NotificationConfig {
                enabled: true,
                resend_api_key: None,
                api_base_url: "https://api.resend.com".to_string(),
                sales_address: None,
                from_address: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected gemini|openai|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl TelegramConfig {
    pub fn has_token(&self) -> bool {
        !self.bot_token.expose_secret().trim().is_empty()
    }
}

impl LlmConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().map(|key| !key.expose_secret().trim().is_empty()).unwrap_or(false)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("altura.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Internal mailbox that receives commercial notifications.
    pub fn sales_address(&self) -> &str {
        self.notification.sales_address.as_deref().unwrap_or(&self.company.email)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(bot_token_value) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token_value);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
            if let Some(documents_dir) = telegram.documents_dir {
                self.telegram.documents_dir = documents_dir;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(retry_base_delay_ms) = llm.retry_base_delay_ms {
                self.llm.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(retry_max_delay_ms) = llm.retry_max_delay_ms {
                self.llm.retry_max_delay_ms = retry_max_delay_ms;
            }
        }

        if let Some(company) = patch.company {
            if let Some(name) = company.name {
                self.company.name = name;
            }
            if let Some(email) = company.email {
                self.company.email = email;
            }
            if let Some(phone) = company.phone {
                self.company.phone = phone;
            }
            if let Some(website) = company.website {
                self.company.website = website;
            }
            if let Some(currency) = company.currency {
                self.company.currency = currency;
            }
            if let Some(service_city) = company.service_city {
                self.company.service_city = service_city;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(tax_rate) = pricing.tax_rate {
                self.pricing.tax_rate = tax_rate;
            }
            if let Some(tax_scale) = pricing.tax_scale {
                self.pricing.tax_scale = tax_scale;
            }
            if let Some(quote_validity_days) = pricing.quote_validity_days {
                self.pricing.quote_validity_days = quote_validity_days;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(max_hops) = conversation.max_hops {
                self.conversation.max_hops = max_hops;
            }
            if let Some(history_window) = conversation.history_window {
                self.conversation.history_window = history_window;
            }
            if let Some(floor_height_m) = conversation.floor_height_m {
                self.conversation.floor_height_m = floor_height_m;
            }
            if let Some(min_height_m) = conversation.min_height_m {
                self.conversation.min_height_m = min_height_m;
            }
            if let Some(max_height_m) = conversation.max_height_m {
                self.conversation.max_height_m = max_height_m;
            }
            if let Some(default_rental_days) = conversation.default_rental_days {
                self.conversation.default_rental_days = default_rental_days;
            }
            if let Some(max_document_attempts) = conversation.max_document_attempts {
                self.conversation.max_document_attempts = max_document_attempts;
            }
        }

        if let Some(rendering) = patch.rendering {
            if let Some(output_dir) = rendering.output_dir {
                self.rendering.output_dir = output_dir;
            }
            if let Some(template_dir) = rendering.template_dir {
                self.rendering.template_dir = Some(template_dir);
            }
            if let Some(wkhtmltopdf_path) = rendering.wkhtmltopdf_path {
                self.rendering.wkhtmltopdf_path = Some(wkhtmltopdf_path);
            }
        }

        if let Some(notification) = patch.notification {
            if let Some(enabled) = notification.enabled {
                self.notification.enabled = enabled;
            }
            if let Some(resend_api_key_value) = notification.resend_api_key {
                self.notification.resend_api_key = Some(secret_value(resend_api_key_value));
            }
            if let Some(api_base_url) = notification.api_base_url {
                self.notification.api_base_url = api_base_url;
            }
            if let Some(sales_address) = notification.sales_address {
                self.notification.sales_address = Some(sales_address);
            }
            if let Some(from_address) = notification.from_address {
                self.notification.from_address = Some(from_address);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ALTURA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ALTURA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("ALTURA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ALTURA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("ALTURA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ALTURA_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("ALTURA_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("ALTURA_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_env("ALTURA_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ALTURA_TELEGRAM_DOCUMENTS_DIR") {
            self.telegram.documents_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("ALTURA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("ALTURA_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ALTURA_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("ALTURA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ALTURA_LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("ALTURA_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("ALTURA_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("ALTURA_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("ALTURA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("ALTURA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ALTURA_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("ALTURA_LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("ALTURA_LLM_RETRY_BASE_DELAY_MS") {
            self.llm.retry_base_delay_ms = parse_env("ALTURA_LLM_RETRY_BASE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("ALTURA_COMPANY_NAME") {
            self.company.name = value;
        }
        if let Some(value) = read_env("ALTURA_COMPANY_EMAIL") {
            self.company.email = value;
        }
        if let Some(value) = read_env("ALTURA_COMPANY_PHONE") {
            self.company.phone = value;
        }
        if let Some(value) = read_env("ALTURA_COMPANY_WEBSITE") {
            self.company.website = value;
        }

        if let Some(value) = read_env("ALTURA_PRICING_TAX_RATE") {
            self.pricing.tax_rate = parse_env("ALTURA_PRICING_TAX_RATE", &value)?;
        }

        if let Some(value) = read_env("ALTURA_CONVERSATION_MAX_HOPS") {
            self.conversation.max_hops = parse_env("ALTURA_CONVERSATION_MAX_HOPS", &value)?;
        }
        if let Some(value) = read_env("ALTURA_CONVERSATION_MAX_HEIGHT_M") {
            self.conversation.max_height_m =
                parse_env("ALTURA_CONVERSATION_MAX_HEIGHT_M", &value)?;
        }
        if let Some(value) = read_env("ALTURA_CONVERSATION_FLOOR_HEIGHT_M") {
            self.conversation.floor_height_m =
                parse_env("ALTURA_CONVERSATION_FLOOR_HEIGHT_M", &value)?;
        }

        if let Some(value) = read_env("ALTURA_RENDERING_OUTPUT_DIR") {
            self.rendering.output_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("ALTURA_RENDERING_WKHTMLTOPDF_PATH") {
            self.rendering.wkhtmltopdf_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("ALTURA_NOTIFICATION_ENABLED") {
            self.notification.enabled = parse_env("ALTURA_NOTIFICATION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ALTURA_NOTIFICATION_RESEND_API_KEY") {
            self.notification.resend_api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ALTURA_NOTIFICATION_SALES_ADDRESS") {
            self.notification.sales_address = Some(value);
        }

        if let Some(value) = read_env("ALTURA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ALTURA_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_env("ALTURA_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("ALTURA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("ALTURA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("ALTURA_LOGGING_LEVEL").or_else(|| read_env("ALTURA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ALTURA_LOGGING_FORMAT").or_else(|| read_env("ALTURA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(bot_token);
        }
        if let Some(max_hops) = overrides.max_hops {
            self.conversation.max_hops = max_hops;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.rendering.output_dir = output_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_telegram(&self.telegram)?;
        validate_llm(&self.llm)?;
        validate_company(&self.company)?;
        validate_pricing(&self.pricing)?;
        validate_conversation(&self.conversation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("altura.toml"), PathBuf::from("config/altura.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let token = telegram.bot_token.expose_secret().trim();
    if !token.is_empty() {
        let well_formed = match token.split_once(':') {
            Some((bot_id, secret)) => {
                !bot_id.is_empty()
                    && bot_id.chars().all(|ch| ch.is_ascii_digit())
                    && !secret.is_empty()
            }
            None => false,
        };
        if !well_formed {
            return Err(ConfigError::Validation(
                "telegram.bot_token must look like `<bot id>:<secret>`. Get it from @BotFather"
                    .to_string(),
            ));
        }
    }

    if !telegram.api_base_url.starts_with("http://") && !telegram.api_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "telegram.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if telegram.poll_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 0..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_retries > 10 {
        return Err(ConfigError::Validation("llm.max_retries must be at most 10".to_string()));
    }

    if llm.retry_base_delay_ms > llm.retry_max_delay_ms {
        return Err(ConfigError::Validation(
            "llm.retry_base_delay_ms must not exceed llm.retry_max_delay_ms".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    match llm.provider {
        // Hosted providers may load without a key so offline commands keep working.
        // `LlmConfig::has_api_key` is checked by the server before it starts polling.
        LlmProvider::Gemini | LlmProvider::OpenAi => {}
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_company(company: &CompanyConfig) -> Result<(), ConfigError> {
    if company.name.trim().is_empty() {
        return Err(ConfigError::Validation("company.name must not be empty".to_string()));
    }
    if !company.email.contains('@') {
        return Err(ConfigError::Validation(
            "company.email must be an email address".to_string(),
        ));
    }
    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.tax_rate < Decimal::ZERO || pricing.tax_rate > Decimal::ONE {
        return Err(ConfigError::Validation(
            "pricing.tax_rate must be in range 0..=1".to_string(),
        ));
    }
    if pricing.tax_scale > 4 {
        return Err(ConfigError::Validation("pricing.tax_scale must be at most 4".to_string()));
    }
    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.max_hops == 0 || conversation.max_hops > 50 {
        return Err(ConfigError::Validation(
            "conversation.max_hops must be in range 1..=50".to_string(),
        ));
    }

    if conversation.min_height_m <= Decimal::ZERO
        || conversation.min_height_m >= conversation.max_height_m
    {
        return Err(ConfigError::Validation(
            "conversation.min_height_m must be positive and below conversation.max_height_m"
                .to_string(),
        ));
    }

    if conversation.floor_height_m <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "conversation.floor_height_m must be greater than zero".to_string(),
        ));
    }

    if conversation.default_rental_days == 0 {
        return Err(ConfigError::Validation(
            "conversation.default_rental_days must be greater than zero".to_string(),
        ));
    }

    if conversation.max_document_attempts == 0 {
        return Err(ConfigError::Validation(
            "conversation.max_document_attempts must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    telegram: Option<TelegramPatch>,
    llm: Option<LlmPatch>,
    company: Option<CompanyPatch>,
    pricing: Option<PricingPatch>,
    conversation: Option<ConversationPatch>,
    rendering: Option<RenderingPatch>,
    notification: Option<NotificationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
    documents_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CompanyPatch {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    website: Option<String>,
    currency: Option<String>,
    service_city: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    tax_rate: Option<Decimal>,
    tax_scale: Option<u32>,
    quote_validity_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    max_hops: Option<u32>,
    history_window: Option<u32>,
    floor_height_m: Option<Decimal>,
    min_height_m: Option<Decimal>,
    max_height_m: Option<Decimal>,
    default_rental_days: Option<u32>,
    max_document_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderingPatch {
    output_dir: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    wkhtmltopdf_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    enabled: Option<bool>,
    resend_api_key: Option<String>,
    api_base_url: Option<String>,
    sales_address: Option<String>,
    from_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
