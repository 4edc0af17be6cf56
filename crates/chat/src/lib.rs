//! Messaging transport for the rental assistant.
//!
//! - **Events** (`events`): inbound chat model, handlers and the dispatcher
//! - **Runner** (`runner`): long-polling loop with reconnect backoff
//! - **Telegram** (`telegram`): Bot API transport and outbound delivery
//!
//! ```text
//! Telegram getUpdates → PollingRunner → EventDispatcher → handler → agent runtime
//!                                                            ↓
//!                                  sendMessage / sendDocument ← ChatOutbound
//! ```

pub mod events;
pub mod runner;
pub mod telegram;

pub use events::{
    ChatEnvelope, ChatEvent, ChatEventType, ChatOutbound, ChatUser, DispatchError,
    DocumentMessage, EventContext, EventDispatcher, EventHandler, EventHandlerError,
    HandlerResult, TextMessage, TransportError,
};
pub use runner::{PollingRunner, ReconnectPolicy, UpdateTransport};
pub use telegram::{TelegramClient, TelegramTransport};
