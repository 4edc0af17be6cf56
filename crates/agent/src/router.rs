use std::sync::Arc;

use tracing::{debug, warn};

use altura_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use altura_core::domain::conversation::{ConversationState, Sender};
use altura_core::flows::{Route, RoutingRules, RuleDecision, Stage};

use crate::llm::LlmClient;
use crate::replies::{meters, project_summary};

const CONTEXT_ENTRIES: usize = 6;

/// Maps an oracle label onto the stages classification may choose.
const LABELS: &[(&str, Stage)] = &[
    ("company_info", Stage::CompanyInformation),
    ("company_information", Stage::CompanyInformation),
    ("equipment_detail", Stage::EquipmentDetail),
    ("consultation", Stage::Consultation),
];

/// Deterministic rules first; the oracle only breaks ties among the open-ended stages.
pub struct Router {
    rules: RoutingRules,
    llm: Arc<dyn LlmClient>,
    audit: Arc<dyn AuditSink>,
}

impl Router {
    pub fn new(rules: RoutingRules, llm: Arc<dyn LlmClient>, audit: Arc<dyn AuditSink>) -> Self {
        Self { rules, llm, audit }
    }

    pub async fn route(&self, state: &ConversationState, audit: &AuditContext) -> Route {
        match self.rules.evaluate_with_audit(state, self.audit.as_ref(), audit) {
            RuleDecision::Wait => Route::Wait,
            RuleDecision::Run(stage) => Route::Run(stage),
            RuleDecision::Classify => Route::Run(self.classify(state, audit).await),
        }
    }

    async fn classify(&self, state: &ConversationState, audit: &AuditContext) -> Stage {
        let (stage, outcome, source) = match self.llm.complete(&classification_prompt(state)).await {
            Ok(reply) => match parse_label(&reply) {
                Some(stage) => (stage, AuditOutcome::Success, "oracle"),
                None => {
                    debug!(user_id = %state.user_id, reply = %reply.trim(), "unrecognised routing label");
                    (Stage::Consultation, AuditOutcome::Rejected, "default")
                }
            },
            Err(error) => {
                warn!(user_id = %state.user_id, error = %error, "routing oracle failed, defaulting to consultation");
                (Stage::Consultation, AuditOutcome::Failed, "default")
            }
        };

        self.audit.emit(
            audit
                .event("routing.classified", AuditCategory::Routing, outcome)
                .with_metadata("stage", stage.as_str())
                .with_metadata("source", source),
        );
        stage
    }
}

/// First token of the reply, lowercased and stripped of quoting and punctuation.
pub fn parse_label(reply: &str) -> Option<Stage> {
    let cleaned: String = reply
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '_' || ch.is_whitespace() { ch } else { ' ' })
        .collect();
    let token = cleaned.split_whitespace().next()?;
    LABELS.iter().find(|(label, _)| *label == token).map(|(_, stage)| *stage)
}

fn classification_prompt(state: &ConversationState) -> String {
    let start = state.message_log.len().saturating_sub(CONTEXT_ENTRIES);
    let history: Vec<String> = state.message_log[start..]
        .iter()
        .map(|entry| {
            let speaker = match entry.sender {
                Sender::User => "Cliente",
                Sender::Assistant => "Asistente",
            };
            format!("{speaker}: {}", entry.text)
        })
        .collect();

    let project = project_summary(&state.project);
    let recommended: Vec<String> = state
        .recommended_equipment
        .iter()
        .map(|item| format!("{} ({}m)", item.name, meters(item.max_height)))
        .collect();

    format!(
        r#"Eres Sebastián, el enrutador de un asistente de ventas de alquiler de equipos para trabajo en altura.
Decide qué debe hacer el asistente con el último mensaje del cliente.

Opciones:
- company_info: el cliente pregunta por la empresa, sus servicios, contacto o cobertura.
- equipment_detail: el cliente pregunta por un equipo concreto o una de las opciones recomendadas.
- consultation: cualquier otra cosa; el cliente describe su proyecto o conversa.

Estado actual:
- Etapa: {stage}
- Proyecto: {project}
- Equipos recomendados: {recommended}

Conversación reciente:
{history}

Responde SOLO con una de las opciones, sin explicación."#,
        stage = state.stage.as_str(),
        project = if project.is_empty() { "sin datos".to_string() } else { project },
        recommended = if recommended.is_empty() { "ninguno".to_string() } else { recommended.join(", ") },
        history = history.join("\n"),
    )
}
