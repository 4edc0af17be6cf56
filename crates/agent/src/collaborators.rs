//! Outbound collaborators the stage handlers depend on. Implementations live in the server.

use async_trait::async_trait;
use thiserror::Error;

use altura_core::domain::conversation::{Contact, ProjectDetails, UserId};
use altura_core::domain::quotation::{DocumentReference, Quotation};

/// Everything printed on a quotation document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderRequest {
    pub user_id: UserId,
    pub contact: Contact,
    pub project: ProjectDetails,
    pub quotation: Quotation,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(String),
    #[error("document converter failed: {0}")]
    Converter(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait QuoteRenderer: Send + Sync {
    async fn render_quote(&self, request: &RenderRequest) -> Result<DocumentReference, RenderError>;
}

/// Deal handed to the commercial team once a quotation reached the customer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DealSummary {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub contact: Contact,
    pub project: ProjectDetails,
    pub quotation: Quotation,
    pub document: Option<DocumentReference>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification template failed: {0}")]
    Template(String),
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait CommercialNotifier: Send + Sync {
    async fn notify(&self, deal: &DealSummary) -> Result<(), NotifyError>;
}
