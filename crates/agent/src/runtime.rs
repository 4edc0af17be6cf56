//! Turn loop: load the conversation, ingest the inbound message, then alternate router and
//! stage handlers until the router waits or the hop ceiling is reached.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use altura_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use altura_core::domain::conversation::{
    ConversationState, DocumentKind, DocumentRecord, OutboundReply, UserId,
};
use altura_core::flows::{Route, Stage, StageOutcome};
use altura_core::gate::{TurnGate, TurnTicket};
use altura_core::text::{contains_any, fold};

use crate::replies;
use crate::router::Router;
use crate::session::SessionStore;
use crate::stages::{self, StageContext};

const START_COMMAND: &str = "/start";
const TAX_DOCUMENT_HINTS: &[&str] = &["rut", "nit"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    /// The greeting trigger.
    Start,
    Text(String),
    /// A file already stored locally by the transport.
    Document { file_name: String, path: String },
}

impl InboundMessage {
    /// Maps raw message text, recognising the greeting command.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        let command = trimmed.split_whitespace().next().unwrap_or_default();
        if command == START_COMMAND || command.starts_with("/start@") {
            Self::Start
        } else {
            Self::Text(trimmed.to_string())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub message: InboundMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnResult {
    /// Replies to deliver, in order. Empty for superseded turns.
    pub replies: Vec<OutboundReply>,
    pub superseded: bool,
    pub hops: u32,
    pub stage: Stage,
}

pub struct AgentRuntime {
    gate: TurnGate,
    sessions: SessionStore,
    router: Router,
    stages: StageContext,
    audit: Arc<dyn AuditSink>,
    max_hops: u32,
}

impl AgentRuntime {
    pub fn new(
        sessions: SessionStore,
        router: Router,
        stages: StageContext,
        audit: Arc<dyn AuditSink>,
        max_hops: u32,
    ) -> Self {
        Self { gate: TurnGate::new(), sessions, router, stages, audit, max_hops }
    }

    /// Reserves the user's next turn. Take the ticket when the message arrives.
    pub fn admit(&self, user_id: &UserId) -> TurnTicket {
        self.gate.admit(&user_id.0)
    }

    /// Users with a turn queued or running.
    pub fn active_users(&self) -> usize {
        self.gate.active_lanes()
    }

    pub async fn handle(&self, inbound: Inbound) -> TurnResult {
        let ticket = self.admit(&inbound.user_id);
        self.handle_turn(ticket, inbound).await
    }

    /// Runs one turn once every earlier turn of the same user finished. The state is always
    /// persisted; the replies are withheld when a newer message arrived in the meantime.
    pub async fn handle_turn(&self, mut ticket: TurnTicket, inbound: Inbound) -> TurnResult {
        ticket.wait_turn().await;

        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(Some(inbound.user_id.clone()), correlation_id.as_str(), "agent");
        let mut session = self.sessions.load_or_create(&inbound.user_id, inbound.display_name.clone()).await;
        self.audit.emit(
            audit
                .event("turn.received", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("kind", message_kind(&inbound.message))
                .with_metadata("new_conversation", session.is_new().to_string()),
        );

        let first = self.ingest(&mut session.state, inbound.message);
        let hops = self.drive(&mut session.state, first, &audit).await;
        session.state.flush_replies();

        if let Err(err) = self.sessions.save(&mut session).await {
            error!(
                user_id = %inbound.user_id,
                correlation_id = %correlation_id,
                error = %err,
                "failed to persist conversation"
            );
            self.audit.emit(
                audit
                    .event("conversation.persisted", AuditCategory::Persistence, AuditOutcome::Failed)
                    .with_metadata("error", err.to_string()),
            );
        }

        let superseded = ticket.is_superseded();
        let mut replies = session.state.take_turn_output();
        if superseded {
            info!(
                user_id = %inbound.user_id,
                correlation_id = %correlation_id,
                withheld = replies.len(),
                "turn superseded by a newer message"
            );
            replies.clear();
        }

        let stage = session.state.stage;
        info!(
            event_name = "agent.turn.completed",
            user_id = %inbound.user_id,
            correlation_id = %correlation_id,
            hops,
            stage = stage.as_str(),
            replies = replies.len(),
            superseded,
            "turn completed"
        );
        TurnResult { replies, superseded, hops, stage }
    }

    /// Appends the inbound message to the log and applies deterministic contact extraction.
    /// Returns the stage to run before consulting the router, if any.
    fn ingest(&self, state: &mut ConversationState, message: InboundMessage) -> Option<Stage> {
        match message {
            InboundMessage::Start => {
                state.record_user_message(START_COMMAND);
                Some(Stage::Greeting)
            }
            InboundMessage::Text(text) => {
                let contact = self.stages.extractor.extract_contact(&text);
                if let Some(tax_id) = contact.tax_id.clone() {
                    let pending_upload = state.tax_document().is_some_and(|doc| doc.fresh_upload);
                    if !pending_upload {
                        state.register_document(DocumentRecord::typed(DocumentKind::TaxId, tax_id));
                    }
                }
                state.contact.absorb(contact);
                state.record_user_message(text);
                None
            }
            InboundMessage::Document { file_name, path } => {
                let kind = document_kind(&file_name, state);
                state.record_user_message(format!("Documento enviado: {file_name}"));
                state.register_document(DocumentRecord::uploaded(kind, file_name, path));
                None
            }
        }
    }

    /// Router and handlers alternate until the router waits. More than `max_hops` handler runs
    /// abort the chain with the stuck fallback.
    async fn drive(&self, state: &mut ConversationState, first: Option<Stage>, audit: &AuditContext) -> u32 {
        let mut hops = 0;
        let mut next = first;
        loop {
            let stage = match next.take() {
                Some(stage) => stage,
                None => match self.router.route(state, audit).await {
                    Route::Wait => break,
                    Route::Run(stage) => stage,
                },
            };

            if hops >= self.max_hops {
                warn!(user_id = %state.user_id, hop = hops, stage = stage.as_str(), "hop ceiling reached");
                self.audit.emit(
                    audit
                        .event("turn.hop_ceiling", AuditCategory::Routing, AuditOutcome::Failed)
                        .with_metadata("stage", stage.as_str()),
                );
                state.say(replies::STUCK);
                state.flush_replies();
                break;
            }
            hops += 1;

            let outcome = stages::run(stage, state, &self.stages).await;
            self.audit.emit(
                audit
                    .event("stage.completed", AuditCategory::Stage, AuditOutcome::Success)
                    .with_metadata("stage", stage.as_str())
                    .with_metadata("hop", hops.to_string()),
            );
            match outcome {
                StageOutcome::Reply => {
                    state.flush_replies();
                }
                StageOutcome::Chain(following) => next = Some(following),
                StageOutcome::Reroute => {}
            }
        }
        hops
    }
}

fn message_kind(message: &InboundMessage) -> &'static str {
    match message {
        InboundMessage::Start => "start",
        InboundMessage::Text(_) => "text",
        InboundMessage::Document { .. } => "document",
    }
}

/// Uploads are treated as the identity document when the name says so, or while no tax id is
/// known yet.
fn document_kind(file_name: &str, state: &ConversationState) -> DocumentKind {
    if contains_any(&fold(file_name), TAX_DOCUMENT_HINTS) || !state.has_tax_id() {
        DocumentKind::TaxId
    } else {
        DocumentKind::Other
    }
}
