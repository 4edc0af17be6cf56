use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    #[error("message delivery failed: {0}")]
    Send(String),
    #[error("file download failed: {0}")]
    Download(String),
}

/// Sender of an inbound message, as reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatUser {
    pub id: i64,
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub chat_id: i64,
    pub user: ChatUser,
    pub text: String,
}

/// A file upload; the content stays on the platform until downloaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentMessage {
    pub chat_id: i64,
    pub user: ChatUser,
    pub file_id: String,
    pub file_name: String,
    pub file_size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Text(TextMessage),
    Document(DocumentMessage),
    Unsupported { kind: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    Text,
    Document,
    Unsupported,
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::Text(_) => ChatEventType::Text,
            Self::Document(_) => ChatEventType::Document,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    pub fn user(&self) -> Option<&ChatUser> {
        match self {
            Self::Text(message) => Some(&message.user),
            Self::Document(message) => Some(&message.user),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub update_id: i64,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// The turn was handed off; replies are delivered asynchronously.
    Accepted,
    Ignored,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("message handler failure: {0}")]
    Message(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    /// Registers one handler instance for several event types.
    pub fn register_shared(&mut self, handler: Arc<dyn EventHandler>, event_types: &[ChatEventType]) {
        for event_type in event_types {
            self.handlers.insert(*event_type, handler.clone());
        }
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Outbound side of the transport: replies and file retrieval.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TransportError>;
    /// Stores the uploaded file locally and returns its path.
    async fn download(&self, document: &DocumentMessage) -> Result<PathBuf, TransportError>;
}
