//! Stage handlers. Each one reads and mutates the conversation state and reports what the turn
//! loop should do next. A handler sets `state.stage` only after its own work succeeded.

use std::sync::Arc;

use altura_core::config::{CompanyConfig, ConversationConfig, PricingConfig};
use altura_core::cpq::{Catalog, PricingEngine};
use altura_core::domain::conversation::ConversationState;
use altura_core::flows::{Stage, StageOutcome};
use altura_db::QuotationRepository;

use crate::collaborators::{CommercialNotifier, QuoteRenderer};
use crate::extractor::FieldExtractor;
use crate::llm::LlmClient;
use crate::oracle::DocumentOracle;

mod documents;
mod intake;
mod quotation;
mod recommend;

/// Collaborators shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct StageContext {
    pub catalog: Arc<Catalog>,
    pub pricing: Arc<dyn PricingEngine>,
    pub llm: Arc<dyn LlmClient>,
    pub extractor: FieldExtractor,
    pub documents: Arc<dyn DocumentOracle>,
    pub renderer: Arc<dyn QuoteRenderer>,
    pub notifier: Arc<dyn CommercialNotifier>,
    pub quotations: Arc<dyn QuotationRepository>,
    pub company: CompanyConfig,
    pub pricing_config: PricingConfig,
    pub conversation: ConversationConfig,
}

pub async fn run(stage: Stage, state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    match stage {
        Stage::Greeting => intake::greeting(state, ctx),
        Stage::Consultation => intake::consultation(state, ctx).await,
        Stage::CompanyInformation => intake::company_information(state, ctx),
        Stage::Analysis => recommend::analysis(state, ctx),
        Stage::Recommendation => recommend::recommendation(state),
        Stage::EquipmentDetail => recommend::equipment_detail(state, ctx),
        Stage::DocumentCollection => documents::collection(state),
        Stage::DocumentProcessing => documents::processing(state, ctx).await,
        Stage::QuotationGeneration => quotation::generation(state, ctx).await,
        Stage::QuotationDelivery => quotation::delivery(state, ctx).await,
        Stage::CommercialNotification => quotation::notification(state, ctx).await,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use altura_core::config::AppConfig;
    use altura_core::cpq::{Catalog, TieredPricingEngine};
    use altura_core::domain::conversation::{ConversationState, DocumentRecord, UserId};
    use altura_core::domain::equipment::{Equipment, EquipmentId};
    use altura_core::domain::quotation::DocumentReference;
    use altura_db::repositories::InMemoryQuotationRepository;

    use crate::collaborators::{
        CommercialNotifier, DealSummary, NotifyError, QuoteRenderer, RenderError, RenderRequest,
    };
    use crate::extractor::{ExtractionLimits, FieldExtractor};
    use crate::llm::{LlmClient, OracleError};
    use crate::oracle::{CompanyIdentity, DocumentOracle};

    use super::StageContext;

    pub struct Silent;

    #[async_trait]
    impl LlmClient for Silent {
        async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
            Err(OracleError::Unavailable("offline".to_owned()))
        }
    }

    pub struct FixedIdentity(pub Result<CompanyIdentity, OracleError>);

    #[async_trait]
    impl DocumentOracle for FixedIdentity {
        async fn extract_identity(&self, _document: &DocumentRecord) -> Result<CompanyIdentity, OracleError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    pub struct RecordingRenderer {
        pub fail: bool,
        pub calls: Mutex<u32>,
    }

    #[async_trait]
    impl QuoteRenderer for RecordingRenderer {
        async fn render_quote(&self, request: &RenderRequest) -> Result<DocumentReference, RenderError> {
            *self.calls.lock().expect("calls") += 1;
            if self.fail {
                return Err(RenderError::Converter("wkhtmltopdf exited with 1".to_owned()));
            }
            Ok(DocumentReference {
                file_name: format!("cotizacion_{}.pdf", request.user_id),
                path: format!("/tmp/cotizacion_{}.pdf", request.user_id),
            })
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub fail: bool,
        pub deals: Mutex<Vec<DealSummary>>,
    }

    #[async_trait]
    impl CommercialNotifier for RecordingNotifier {
        async fn notify(&self, deal: &DealSummary) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Transport("connection refused".to_owned()));
            }
            self.deals.lock().expect("deals").push(deal.clone());
            Ok(())
        }
    }

    pub fn item(id: i64, name: &str, category: &str, height: i64, daily: i64) -> Equipment {
        Equipment {
            id: EquipmentId(id),
            name: name.to_owned(),
            category: category.to_owned(),
            description: format!("{name} para trabajo en altura"),
            max_height: Decimal::from(height),
            daily_price: Decimal::from(daily),
            weekly_price: Some(Decimal::from(daily * 6)),
            monthly_price: Some(Decimal::from(daily * 20)),
            specifications: BTreeMap::from([("capacidad_carga".to_owned(), "150kg".to_owned())]),
            use_cases: vec!["mantenimiento".to_owned()],
            safety_requirements: Some("Arnés obligatorio".to_owned()),
            available: true,
        }
    }

    pub fn catalog() -> Catalog {
        Catalog::new(vec![
            item(1, "Escalera Tijera 3m", "escaleras", 3, 15_000),
            item(2, "Andamio Tubular 4m", "andamios", 4, 35_000),
            item(3, "Andamio Multidireccional 6m", "andamios", 6, 45_000),
            item(4, "Andamio Colgante 8m", "andamios", 8, 60_000),
            item(5, "Andamio Certificado 10m", "andamios", 10, 80_000),
            item(6, "Elevador Tijera 12m", "elevadores", 12, 180_000),
        ])
    }

    pub fn context(
        catalog: Catalog,
        documents: FixedIdentity,
        renderer: Arc<RecordingRenderer>,
        notifier: Arc<RecordingNotifier>,
    ) -> StageContext {
        let config = AppConfig::default();
        StageContext {
            catalog: Arc::new(catalog),
            pricing: Arc::new(TieredPricingEngine::default()),
            llm: Arc::new(Silent),
            extractor: FieldExtractor::new(ExtractionLimits::from(&config.conversation)),
            documents: Arc::new(documents),
            renderer,
            notifier,
            quotations: Arc::new(InMemoryQuotationRepository::default()),
            company: config.company,
            pricing_config: config.pricing,
            conversation: config.conversation,
        }
    }

    pub fn default_context() -> StageContext {
        context(
            catalog(),
            FixedIdentity(Err(OracleError::InvalidResponse("no es un RUT".to_owned()))),
            Arc::new(RecordingRenderer::default()),
            Arc::new(RecordingNotifier::default()),
        )
    }

    pub fn state(message: &str) -> ConversationState {
        let mut state = ConversationState::new(UserId("tg-900".to_owned()), Some("Ana".to_owned()));
        state.record_user_message(message);
        state
    }

    pub fn texts(state: &ConversationState) -> Vec<String> {
        state.turn_output.iter().map(|reply| reply.log_text().to_owned()).collect()
    }
}
