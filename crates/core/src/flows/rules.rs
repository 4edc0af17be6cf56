use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::conversation::ConversationState;
use crate::flows::states::Stage;
use crate::text::{contains_any, fold};

const PRICING_KEYWORDS: &[&str] =
    &["cotiz", "precio", "cuanto", "cuesta", "valor", "presupuesto", "tarifa", "quote", "price"];

/// Outcome of the deterministic routing rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleDecision {
    Wait,
    Run(Stage),
    /// No rule matched; intent classification decides.
    Classify,
}

/// Ordered routing rules over conversation state. Pure: same state, same decision.
#[derive(Clone, Debug)]
pub struct RoutingRules {
    max_document_attempts: u32,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RoutingRules {
    pub fn new(max_document_attempts: u32) -> Self {
        Self { max_document_attempts }
    }

    pub fn evaluate(&self, state: &ConversationState) -> RuleDecision {
        let Some(latest) = state.pending_user_text() else {
            return RuleDecision::Wait;
        };

        if state.pending_tax_document(self.max_document_attempts).is_some() {
            return RuleDecision::Run(Stage::DocumentProcessing);
        }

        if state.quotation_awaiting_delivery() {
            return RuleDecision::Run(Stage::QuotationDelivery);
        }

        if state.needs_analysis() {
            return RuleDecision::Run(Stage::Analysis);
        }

        let wants_quote =
            has_pricing_intent(latest) || (state.quote_requested && !state.quotation_sent);
        if wants_quote && !state.recommended_equipment.is_empty() {
            if state.missing_quote_requirements().is_empty() {
                return RuleDecision::Run(Stage::QuotationGeneration);
            }
            return RuleDecision::Run(Stage::DocumentCollection);
        }

        RuleDecision::Classify
    }

    pub fn evaluate_with_audit<S>(
        &self,
        state: &ConversationState,
        sink: &S,
        audit: &AuditContext,
    ) -> RuleDecision
    where
        S: AuditSink + ?Sized,
    {
        let decision = self.evaluate(state);
        let (label, stage) = match decision {
            RuleDecision::Wait => ("wait", None),
            RuleDecision::Run(stage) => ("run", Some(stage)),
            RuleDecision::Classify => ("classify", None),
        };
        let mut event = audit
            .event("routing.rule_decided", AuditCategory::Routing, AuditOutcome::Success)
            .with_metadata("decision", label)
            .with_metadata("from_stage", state.stage.as_str());
        if let Some(stage) = stage {
            event = event.with_metadata("stage", stage.as_str());
        }
        sink.emit(event);
        decision
    }
}

pub fn has_pricing_intent(text: &str) -> bool {
    contains_any(&fold(text), PRICING_KEYWORDS)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::conversation::{
        ConversationState, DocumentKind, DocumentRecord, DurationUnit, ProjectDetails,
        RentalDuration, UserId,
    };
    use crate::domain::equipment::{Equipment, EquipmentId};
    use crate::domain::quotation::DocumentReference;
    use crate::flows::states::Stage;

    use super::{has_pricing_intent, RoutingRules, RuleDecision};

    fn scaffold() -> Equipment {
        Equipment {
            id: EquipmentId(1),
            name: "Andamio Multidireccional 6m".to_owned(),
            category: "andamios".to_owned(),
            description: String::new(),
            max_height: Decimal::from(6),
            daily_price: Decimal::from(45_000),
            weekly_price: Some(Decimal::from(270_000)),
            monthly_price: Some(Decimal::from(900_000)),
            specifications: BTreeMap::new(),
            use_cases: Vec::new(),
            safety_requirements: None,
            available: true,
        }
    }

    fn complete_project() -> ProjectDetails {
        ProjectDetails {
            height: Some(Decimal::from(6)),
            work_type: Some("mantenimiento".to_owned()),
            duration: Some(RentalDuration::new(2, DurationUnit::Weeks)),
        }
    }

    fn recommended_state() -> ConversationState {
        let mut state = ConversationState::new(UserId("tg-7".to_owned()), None);
        state.project = complete_project();
        state.analyzed_project = Some(complete_project());
        state.recommended_equipment = vec![scaffold()];
        state.contact.phone = Some("+573001234567".to_owned());
        state.contact.email = Some("compras@obra.co".to_owned());
        state
    }

    #[test]
    fn waits_when_assistant_spoke_last_or_log_is_empty() {
        let rules = RoutingRules::default();
        let mut state = ConversationState::new(UserId("tg-1".to_owned()), None);
        assert_eq!(rules.evaluate(&state), RuleDecision::Wait);

        state.record_user_message("hola");
        state.say("¡Hola!");
        state.flush_replies();
        assert_eq!(rules.evaluate(&state), RuleDecision::Wait);
    }

    #[test]
    fn pending_identity_document_wins_over_everything_else() {
        let rules = RoutingRules::new(3);
        let mut state = recommended_state();
        state.register_document(DocumentRecord::uploaded(DocumentKind::TaxId, "rut.pdf", "/tmp/rut.pdf"));
        state.record_user_message("Documento enviado: rut.pdf");

        assert_eq!(rules.evaluate(&state), RuleDecision::Run(Stage::DocumentProcessing));

        if let Some(doc) = state.documents.get_mut("rut") {
            doc.attempts = 3;
        }
        assert_ne!(rules.evaluate(&state), RuleDecision::Run(Stage::DocumentProcessing));
    }

    #[test]
    fn failed_upload_does_not_capture_later_messages() {
        let rules = RoutingRules::new(3);
        let mut state = ConversationState::new(UserId("tg-3".to_owned()), None);
        state.register_document(DocumentRecord::uploaded(DocumentKind::TaxId, "rut.pdf", "/tmp/rut.pdf"));
        if let Some(doc) = state.documents.get_mut("rut") {
            doc.attempts = 1;
            doc.fresh_upload = false;
        }
        state.record_user_message("¿dónde están ubicados?");

        assert_eq!(rules.evaluate(&state), RuleDecision::Classify);
    }

    #[test]
    fn undelivered_quotation_goes_to_delivery() {
        let rules = RoutingRules::default();
        let mut state = recommended_state();
        state.quotation_document = Some(DocumentReference {
            file_name: "cotizacion.pdf".to_owned(),
            path: "/tmp/cotizacion.pdf".to_owned(),
        });
        state.record_user_message("ok");
        assert_eq!(rules.evaluate(&state), RuleDecision::Run(Stage::QuotationDelivery));
    }

    #[test]
    fn complete_project_without_analysis_goes_to_analysis() {
        let rules = RoutingRules::default();
        let mut state = ConversationState::new(UserId("tg-2".to_owned()), None);
        state.project = complete_project();
        state.record_user_message("por 2 semanas");
        assert_eq!(rules.evaluate(&state), RuleDecision::Run(Stage::Analysis));
    }

    #[test]
    fn pricing_intent_without_tax_id_goes_to_document_collection() {
        let rules = RoutingRules::default();
        let mut state = recommended_state();
        state.record_user_message("quiero cotizar");
        assert_eq!(rules.evaluate(&state), RuleDecision::Run(Stage::DocumentCollection));
    }

    #[test]
    fn pricing_intent_with_everything_goes_to_generation() {
        let rules = RoutingRules::default();
        let mut state = recommended_state();
        state.register_document(DocumentRecord::typed(DocumentKind::TaxId, "900123456-7"));
        state.record_user_message("¿Cuánto me sale?");
        assert_eq!(rules.evaluate(&state), RuleDecision::Run(Stage::QuotationGeneration));
    }

    #[test]
    fn earlier_quote_request_keeps_collection_going() {
        let rules = RoutingRules::default();
        let mut state = recommended_state();
        state.contact.email = None;
        state.quote_requested = true;
        state.record_user_message("mi correo es compras@obra.co");
        assert_eq!(rules.evaluate(&state), RuleDecision::Run(Stage::DocumentCollection));
    }

    #[test]
    fn pricing_intent_without_recommendations_is_classified() {
        let rules = RoutingRules::default();
        let mut state = ConversationState::new(UserId("tg-3".to_owned()), None);
        state.record_user_message("cuánto cuesta un andamio");
        assert_eq!(rules.evaluate(&state), RuleDecision::Classify);
    }

    #[test]
    fn evaluation_is_deterministic_for_identical_state() {
        let rules = RoutingRules::default();
        let mut state = recommended_state();
        state.record_user_message("quiero cotizar");
        let first = rules.evaluate(&state);
        let second = rules.evaluate(&state.clone());
        assert_eq!(first, second);
    }

    #[test]
    fn audited_evaluation_records_decision() {
        let rules = RoutingRules::default();
        let sink = InMemoryAuditSink::default();
        let mut state = recommended_state();
        state.record_user_message("quiero cotizar");

        let decision = rules.evaluate_with_audit(
            &state,
            &sink,
            &AuditContext::new(Some(state.user_id.clone()), "turn-9", "router"),
        );

        assert_eq!(decision, RuleDecision::Run(Stage::DocumentCollection));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.get("stage").map(String::as_str), Some("document_collection"));
    }

    #[test]
    fn pricing_intent_is_accent_insensitive() {
        assert!(has_pricing_intent("¿CUÁNTO vale?"));
        assert!(has_pricing_intent("Necesito una cotización"));
        assert!(!has_pricing_intent("hola, necesito un andamio"));
    }
}
