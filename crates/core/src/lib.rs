pub mod audit;
pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod gate;
pub mod text;

pub use domain::conversation::{
    Contact, ConversationState, DocumentKind, DocumentRecord, DurationUnit, LogEntry,
    OutboundReply, ProjectDetails, QuoteRequirement, RentalDuration, Sender, UserId,
};
pub use domain::equipment::{Equipment, EquipmentId};
pub use domain::quotation::{
    DocumentReference, Quotation, QuotationId, QuotationLine, RateTier,
};
pub use errors::DomainError;
pub use flows::{Route, Stage, StageOutcome};
pub use gate::{TurnGate, TurnTicket};
