use std::sync::Arc;

use altura_agent::{
    AgentRuntime, CommercialNotifier, ExtractionLimits, FieldExtractor, HttpLlmClient, LlmClient,
    LlmDocumentOracle, NotifyError, OracleError, QuoteRenderer, RenderError, RetryPolicy,
    RetryingLlmClient, Router, SessionStore, StageContext, TracingAuditSink,
};
use altura_chat::{
    EventDispatcher, PollingRunner, ReconnectPolicy, TelegramClient, TelegramTransport,
    TransportError,
};
use altura_core::audit::AuditSink;
use altura_core::config::{AppConfig, ConfigError};
use altura_core::cpq::{Catalog, TieredPricingEngine};
use altura_core::flows::RoutingRules;
use altura_db::repositories::{
    SqlConversationRepository, SqlEquipmentRepository, SqlQuotationRepository,
};
use altura_db::{
    connect_with_settings, migrations, CatalogSeed, ConversationRepository, DbPool,
    EquipmentRepository, QuotationRepository, RepositoryError,
};
use thiserror::Error;
use tracing::info;

use crate::notify::ResendNotifier;
use crate::render::TeraQuoteRenderer;
use crate::service::ConversationHandler;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
    pub runner: PollingRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("telegram.bot_token is required to start the bot")]
    MissingTelegramToken,
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("equipment catalog unavailable: {0}")]
    Catalog(#[source] RepositoryError),
    #[error("language model client: {0}")]
    Oracle(#[from] OracleError),
    #[error("quotation renderer: {0}")]
    Renderer(#[from] RenderError),
    #[error("commercial notifier: {0}")]
    Notifier(#[from] NotifyError),
    #[error("chat transport: {0}")]
    Transport(#[from] TransportError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");
    if !config.telegram.has_token() {
        return Err(BootstrapError::MissingTelegramToken);
    }

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let seeded = CatalogSeed::load(&db_pool).await.map_err(BootstrapError::Catalog)?;
    let items = SqlEquipmentRepository::new(db_pool.clone()).list_all().await.map_err(BootstrapError::Catalog)?;
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        correlation_id = "bootstrap",
        inserted = seeded.inserted,
        items = items.len(),
        "equipment catalog loaded"
    );

    let llm = language_model(&config)?;
    let runtime = Arc::new(build_runtime(
        &config,
        llm,
        Arc::new(SqlConversationRepository::new(db_pool.clone())),
        Arc::new(SqlQuotationRepository::new(db_pool.clone())),
        Arc::new(TeraQuoteRenderer::from_config(&config)?),
        Arc::new(ResendNotifier::from_config(&config)?),
        Catalog::new(items),
    ));

    let client = TelegramClient::new(&config.telegram)?;
    let transport = Arc::new(TelegramTransport::new(client.clone(), config.telegram.poll_timeout_secs));
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register_shared(
        Arc::new(ConversationHandler::new(runtime.clone(), Arc::new(client))),
        &ConversationHandler::EVENT_TYPES,
    );
    let runner = PollingRunner::new(transport, dispatcher, ReconnectPolicy::default());

    Ok(Application { config, db_pool, runtime, runner })
}

/// The configured provider behind the timeout and rate-limit retry policy.
pub fn language_model(config: &AppConfig) -> Result<Arc<dyn LlmClient>, BootstrapError> {
    let client = HttpLlmClient::from_config(&config.llm)?;
    info!(provider = client.provider().as_str(), model = %config.llm.model, "language model configured");
    Ok(Arc::new(RetryingLlmClient::new(client, RetryPolicy::from(&config.llm))))
}

pub fn build_runtime(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    conversations: Arc<dyn ConversationRepository>,
    quotations: Arc<dyn QuotationRepository>,
    renderer: Arc<dyn QuoteRenderer>,
    notifier: Arc<dyn CommercialNotifier>,
    catalog: Catalog,
) -> AgentRuntime {
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let stages = StageContext {
        catalog: Arc::new(catalog),
        pricing: Arc::new(TieredPricingEngine::new(
            config.pricing.tax_rate,
            config.pricing.tax_scale,
            config.company.currency.clone(),
        )),
        llm: llm.clone(),
        extractor: FieldExtractor::new(ExtractionLimits::from(&config.conversation)),
        documents: Arc::new(LlmDocumentOracle::new(llm.clone())),
        renderer,
        notifier,
        quotations,
        company: config.company.clone(),
        pricing_config: config.pricing.clone(),
        conversation: config.conversation.clone(),
    };
    let router = Router::new(
        RoutingRules::new(config.conversation.max_document_attempts),
        llm,
        audit.clone(),
    );
    let sessions = SessionStore::new(conversations, config.conversation.history_window);
    AgentRuntime::new(sessions, router, stages, audit, config.conversation.max_hops)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use altura_agent::{AgentRuntime, LlmClient, OracleError};
    use altura_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use altura_core::cpq::Catalog;
    use altura_db::repositories::{InMemoryConversationRepository, InMemoryQuotationRepository};

    use super::{bootstrap_with_config, build_runtime, BootstrapError};
    use crate::notify::ResendNotifier;
    use crate::render::TeraQuoteRenderer;

    struct OfflineLlm;

    #[async_trait]
    impl LlmClient for OfflineLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("offline".to_owned()))
        }
    }

    /// A runtime over in-memory storage whose oracle is always unavailable.
    pub(crate) fn offline_runtime() -> (AgentRuntime, Arc<InMemoryConversationRepository>) {
        let config = AppConfig::default();
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let runtime = build_runtime(
            &config,
            Arc::new(OfflineLlm),
            conversations.clone(),
            Arc::new(InMemoryQuotationRepository::default()),
            Arc::new(TeraQuoteRenderer::from_config(&config).expect("renderer")),
            Arc::new(ResendNotifier::from_config(&config).expect("notifier")),
            Catalog::default(),
        );
        (runtime, conversations)
    }

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_owned();
        // one connection, one in-memory database
        config.database.max_connections = 1;
        config
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_telegram_token() {
        let result = bootstrap_with_config(memory_config()).await;
        assert!(matches!(result, Err(BootstrapError::MissingTelegramToken)));
    }

    #[test]
    fn malformed_token_is_rejected_before_bootstrap() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_owned()),
                telegram_bot_token: Some("not-a-token".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = BootstrapError::from(result.expect_err("invalid token")).to_string();
        assert!(message.contains("telegram.bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_seeds_the_catalog() {
        let mut config = memory_config();
        config.telegram.bot_token = "123456:ABC-test".to_owned().into();

        let app = bootstrap_with_config(config).await.expect("bootstrap");

        let (items,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM equipment").fetch_one(&app.db_pool).await.expect("count");
        assert_eq!(items, 16);
        assert_eq!(app.runtime.active_users(), 0);
        app.db_pool.close().await;
    }
}
