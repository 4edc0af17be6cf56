//! Conversation controller for the rental sales assistant.
//!
//! Each inbound message runs one turn: the session is loaded, the deterministic routing rules
//! pick the next stage (falling back to oracle classification), and stage handlers run until
//! the router waits. Oracles only translate text; prices, catalog choices and routing rules are
//! deterministic and live in `altura-core`.

pub mod audit;
pub mod collaborators;
pub mod extractor;
pub mod llm;
pub mod oracle;
pub mod providers;
pub mod replies;
pub mod router;
pub mod runtime;
pub mod session;
pub mod stages;

pub use audit::TracingAuditSink;
pub use collaborators::{
    CommercialNotifier, DealSummary, NotifyError, QuoteRenderer, RenderError, RenderRequest,
};
pub use extractor::{Extraction, ExtractionLimits, FieldExtractor};
pub use llm::{Attachment, LlmClient, OracleError, RetryPolicy, RetryingLlmClient};
pub use oracle::{CompanyIdentity, DocumentOracle, LlmDocumentOracle};
pub use providers::HttpLlmClient;
pub use router::Router;
pub use runtime::{AgentRuntime, Inbound, InboundMessage, TurnResult};
pub use session::{Session, SessionStore};
pub use stages::StageContext;
