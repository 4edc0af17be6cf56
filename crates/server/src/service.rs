//! Bridges chat events to agent turns and delivers the replies.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use altura_agent::{replies, AgentRuntime, Inbound, InboundMessage};
use altura_chat::{
    ChatEnvelope, ChatEvent, ChatEventType, ChatOutbound, EventContext, EventHandler,
    EventHandlerError, HandlerResult,
};
use altura_core::domain::conversation::{OutboundReply, UserId};
use altura_core::gate::TurnTicket;

/// Handles text and document events. The turn ticket is taken while the runner is still
/// dispatching, so a user's messages run in arrival order even though turns are spawned.
pub struct ConversationHandler {
    runtime: Arc<AgentRuntime>,
    outbound: Arc<dyn ChatOutbound>,
}

impl ConversationHandler {
    pub fn new(runtime: Arc<AgentRuntime>, outbound: Arc<dyn ChatOutbound>) -> Self {
        Self { runtime, outbound }
    }

    pub const EVENT_TYPES: [ChatEventType; 2] = [ChatEventType::Text, ChatEventType::Document];
}

pub fn user_id(platform_id: i64) -> UserId {
    UserId(format!("tg-{platform_id}"))
}

#[async_trait]
impl EventHandler for ConversationHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::Text
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(user) = envelope.event.user() else {
            return Ok(HandlerResult::Ignored);
        };
        let user_id = user_id(user.id);
        let ticket = self.runtime.admit(&user_id);

        let runtime = self.runtime.clone();
        let outbound = self.outbound.clone();
        let event = envelope.event.clone();
        let correlation_id = ctx.correlation_id.clone();
        tokio::spawn(async move {
            run_turn(&runtime, outbound.as_ref(), ticket, user_id, event, &correlation_id).await;
        });

        Ok(HandlerResult::Accepted)
    }
}

pub async fn run_turn(
    runtime: &AgentRuntime,
    outbound: &dyn ChatOutbound,
    mut ticket: TurnTicket,
    user_id: UserId,
    event: ChatEvent,
    correlation_id: &str,
) {
    let (chat_id, display_name, message) = match event {
        ChatEvent::Text(text) => (text.chat_id, text.user.display_name, InboundMessage::from_text(&text.text)),
        ChatEvent::Document(document) => match outbound.download(&document).await {
            Ok(path) => (
                document.chat_id,
                document.user.display_name.clone(),
                InboundMessage::Document {
                    file_name: document.file_name.clone(),
                    path: path.to_string_lossy().into_owned(),
                },
            ),
            Err(download_error) => {
                warn!(
                    user_id = %user_id,
                    correlation_id,
                    error = %download_error,
                    "document download failed"
                );
                ticket.wait_turn().await;
                deliver(outbound, document.chat_id, &[OutboundReply::Text(replies::DOWNLOAD_FAILED.to_string())])
                    .await;
                return;
            }
        },
        ChatEvent::Unsupported { .. } => return,
    };

    let result = runtime.handle_turn(ticket, Inbound { user_id: user_id.clone(), display_name, message }).await;
    if result.superseded {
        info!(user_id = %user_id, correlation_id, "stale turn not delivered");
        return;
    }
    deliver(outbound, chat_id, &result.replies).await;
}

/// Sends replies in order. A failed send is logged and does not stop the rest.
pub async fn deliver(outbound: &dyn ChatOutbound, chat_id: i64, replies: &[OutboundReply]) {
    for reply in replies {
        let sent = match reply {
            OutboundReply::Text(text) => outbound.send_text(chat_id, text).await,
            OutboundReply::Document { document, caption } => {
                outbound.send_document(chat_id, Path::new(&document.path), &document.file_name, caption).await
            }
        };
        if let Err(send_error) = sent {
            error!(
                event_name = "egress.chat.send_failed",
                chat_id,
                error = %send_error,
                "failed to deliver reply"
            );
        }
    }
}
