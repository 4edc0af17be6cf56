#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use altura_agent::{
    AgentRuntime, CommercialNotifier, CompanyIdentity, DealSummary, DocumentOracle,
    ExtractionLimits, FieldExtractor, Inbound, InboundMessage, LlmClient, NotifyError,
    OracleError, QuoteRenderer, RenderError, RenderRequest, Router, SessionStore, StageContext,
};
use altura_core::audit::InMemoryAuditSink;
use altura_core::config::AppConfig;
use altura_core::cpq::{Catalog, TieredPricingEngine};
use altura_core::domain::conversation::{DocumentRecord, UserId};
use altura_core::domain::equipment::{Equipment, EquipmentId};
use altura_core::domain::quotation::DocumentReference;
use altura_core::flows::RoutingRules;
use altura_db::repositories::{InMemoryConversationRepository, InMemoryQuotationRepository};

const ROUTER_MARKER: &str = "Eres Sebastián";
const EXTRACTION_MARKER: &str = "Analiza este mensaje";

/// Answers routing prompts from a queue of labels, then with a default label.
pub struct ScriptedLlm {
    labels: Mutex<VecDeque<String>>,
    default_label: Option<String>,
    extraction: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn routing_to(label: &str) -> Self {
        Self {
            labels: Mutex::new(VecDeque::new()),
            default_label: Some(label.to_owned()),
            extraction: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn offline() -> Self {
        Self {
            labels: Mutex::new(VecDeque::new()),
            default_label: None,
            extraction: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn then_label(self, label: &str) -> Self {
        self.labels.lock().expect("labels").push_back(label.to_owned());
        self
    }

    pub fn extracting(mut self, reply: &str) -> Self {
        self.extraction = Some(reply.to_owned());
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().expect("prompts").push(prompt.to_owned());
        let reply = if prompt.contains(ROUTER_MARKER) {
            self.labels.lock().expect("labels").pop_front().or_else(|| self.default_label.clone())
        } else if prompt.contains(EXTRACTION_MARKER) {
            self.extraction.clone()
        } else {
            None
        };
        reply.ok_or_else(|| OracleError::Unavailable("scripted oracle has no answer".to_owned()))
    }
}

pub struct ScriptedDocuments(pub Result<CompanyIdentity, OracleError>);

impl ScriptedDocuments {
    pub fn andes() -> Self {
        Self(Ok(CompanyIdentity {
            company_name: Some("Constructora Andes SAS".to_owned()),
            tax_id: Some("900123456-7".to_owned()),
            address: Some("Calle 80 # 10-20, Bogotá".to_owned()),
            email: None,
        }))
    }

    pub fn unreadable() -> Self {
        Self(Err(OracleError::InvalidResponse("documento ilegible".to_owned())))
    }
}

#[async_trait]
impl DocumentOracle for ScriptedDocuments {
    async fn extract_identity(&self, _document: &DocumentRecord) -> Result<CompanyIdentity, OracleError> {
        self.0.clone()
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    pub requests: Mutex<Vec<RenderRequest>>,
}

#[async_trait]
impl QuoteRenderer for FakeRenderer {
    async fn render_quote(&self, request: &RenderRequest) -> Result<DocumentReference, RenderError> {
        self.requests.lock().expect("requests").push(request.clone());
        Ok(DocumentReference {
            file_name: format!("cotizacion_{}.pdf", request.user_id),
            path: format!("data/quotations/cotizacion_{}.pdf", request.user_id),
        })
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub deals: Mutex<Vec<DealSummary>>,
}

#[async_trait]
impl CommercialNotifier for FakeNotifier {
    async fn notify(&self, deal: &DealSummary) -> Result<(), NotifyError> {
        self.deals.lock().expect("deals").push(deal.clone());
        Ok(())
    }
}

pub fn equipment(id: i64, name: &str, category: &str, height: i64, daily: i64, weekly: i64, monthly: i64) -> Equipment {
    Equipment {
        id: EquipmentId(id),
        name: name.to_owned(),
        category: category.to_owned(),
        description: format!("{name} certificado"),
        max_height: Decimal::from(height),
        daily_price: Decimal::from(daily),
        weekly_price: Some(Decimal::from(weekly)),
        monthly_price: Some(Decimal::from(monthly)),
        specifications: BTreeMap::from([("material".to_owned(), "acero galvanizado".to_owned())]),
        use_cases: vec!["construcción".to_owned(), "mantenimiento".to_owned()],
        safety_requirements: Some("Arnés de seguridad obligatorio".to_owned()),
        available: true,
    }
}

pub fn standard_catalog() -> Catalog {
    Catalog::new(vec![
        equipment(1, "Escalera Tijera 3m", "escaleras", 3, 15_000, 90_000, 300_000),
        equipment(5, "Andamio Tubular 4m", "andamios", 4, 35_000, 210_000, 700_000),
        equipment(6, "Andamio Multidireccional 6m", "andamios", 6, 45_000, 270_000, 900_000),
        equipment(7, "Andamio Colgante 8m", "andamios", 8, 60_000, 360_000, 1_200_000),
        equipment(9, "Elevador Tijera 10m", "elevadores", 10, 150_000, 900_000, 3_000_000),
        equipment(10, "Brazo Articulado 16m", "elevadores", 16, 280_000, 1_680_000, 5_600_000),
    ])
}

pub struct Harness {
    pub runtime: AgentRuntime,
    pub conversations: Arc<InMemoryConversationRepository>,
    pub quotations: Arc<InMemoryQuotationRepository>,
    pub renderer: Arc<FakeRenderer>,
    pub notifier: Arc<FakeNotifier>,
    pub llm: Arc<ScriptedLlm>,
    pub audit: InMemoryAuditSink,
}

pub fn harness(llm: ScriptedLlm, documents: ScriptedDocuments, catalog: Catalog) -> Harness {
    harness_with_hops(llm, documents, catalog, AppConfig::default().conversation.max_hops)
}

pub fn harness_with_hops(
    llm: ScriptedLlm,
    documents: ScriptedDocuments,
    catalog: Catalog,
    max_hops: u32,
) -> Harness {
    let config = AppConfig::default();
    let llm = Arc::new(llm);
    let conversations = Arc::new(InMemoryConversationRepository::default());
    let quotations = Arc::new(InMemoryQuotationRepository::default());
    let renderer = Arc::new(FakeRenderer::default());
    let notifier = Arc::new(FakeNotifier::default());
    let audit = InMemoryAuditSink::default();

    let stages = StageContext {
        catalog: Arc::new(catalog),
        pricing: Arc::new(TieredPricingEngine::new(
            config.pricing.tax_rate,
            config.pricing.tax_scale,
            config.company.currency.clone(),
        )),
        llm: llm.clone(),
        extractor: FieldExtractor::new(ExtractionLimits::from(&config.conversation)),
        documents: Arc::new(documents),
        renderer: renderer.clone(),
        notifier: notifier.clone(),
        quotations: quotations.clone(),
        company: config.company.clone(),
        pricing_config: config.pricing.clone(),
        conversation: config.conversation.clone(),
    };
    let router = Router::new(
        RoutingRules::new(config.conversation.max_document_attempts),
        llm.clone(),
        Arc::new(audit.clone()),
    );
    let sessions = SessionStore::new(conversations.clone(), config.conversation.history_window);
    let runtime = AgentRuntime::new(sessions, router, stages, Arc::new(audit.clone()), max_hops);

    Harness { runtime, conversations, quotations, renderer, notifier, llm, audit }
}

pub fn user() -> UserId {
    UserId("tg-4242".to_owned())
}

pub fn text(message: &str) -> Inbound {
    Inbound {
        user_id: user(),
        display_name: Some("Ana".to_owned()),
        message: InboundMessage::from_text(message),
    }
}

pub fn upload(file_name: &str) -> Inbound {
    Inbound {
        user_id: user(),
        display_name: Some("Ana".to_owned()),
        message: InboundMessage::Document {
            file_name: file_name.to_owned(),
            path: format!("data/documents/{file_name}"),
        },
    }
}
