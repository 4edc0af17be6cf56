use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::equipment::Equipment;
use crate::domain::quotation::{DocumentReference, Quotation};
use crate::flows::states::Stage;

/// Stable transport-level identifier of the end user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sender: Sender,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self { sender, text: text.into(), at: Utc::now() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
}

impl Contact {
    /// New non-null values replace old ones; nulls never clear a field.
    pub fn absorb(&mut self, update: Contact) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
                *slot = Some(value);
            }
        }
        take(&mut self.name, update.name);
        take(&mut self.company, update.company);
        take(&mut self.phone, update.phone);
        take(&mut self.email, update.email);
        take(&mut self.tax_id, update.tax_id);
        take(&mut self.address, update.address);
    }

    pub fn is_empty(&self) -> bool {
        *self == Contact::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl DurationUnit {
    pub fn days(self) -> u32 {
        match self {
            Self::Days => 1,
            Self::Weeks => 7,
            Self::Months => 30,
            Self::Years => 365,
        }
    }

    fn label(self, plural: bool) -> &'static str {
        match (self, plural) {
            (Self::Days, false) => "día",
            (Self::Days, true) => "días",
            (Self::Weeks, false) => "semana",
            (Self::Weeks, true) => "semanas",
            (Self::Months, false) => "mes",
            (Self::Months, true) => "meses",
            (Self::Years, false) => "año",
            (Self::Years, true) => "años",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalDuration {
    pub amount: u32,
    pub unit: DurationUnit,
}

impl RentalDuration {
    pub fn new(amount: u32, unit: DurationUnit) -> Self {
        Self { amount, unit }
    }

    pub fn to_days(self) -> u32 {
        self.amount.saturating_mul(self.unit.days())
    }
}

impl fmt::Display for RentalDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit.label(self.amount != 1))
    }
}

/// Day count for pricing; missing or zero durations fall back to `default_days`.
pub fn rental_days(duration: Option<RentalDuration>, default_days: u32) -> u32 {
    match duration.map(RentalDuration::to_days) {
        Some(days) if days > 0 => days,
        _ => default_days,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub height: Option<Decimal>,
    pub work_type: Option<String>,
    pub duration: Option<RentalDuration>,
}

impl ProjectDetails {
    pub fn is_complete(&self) -> bool {
        self.height.is_some() && self.work_type.is_some() && self.duration.is_some()
    }

    /// Fills missing fields from `update`. With `overwrite`, non-null values replace existing
    /// ones as well. Returns true when anything changed.
    pub fn merge(&mut self, update: ProjectDetails, overwrite: bool) -> bool {
        let before = self.clone();
        if let Some(height) = update.height {
            if overwrite || self.height.is_none() {
                self.height = Some(height);
            }
        }
        if let Some(work_type) = update.work_type.filter(|value| !value.trim().is_empty()) {
            if overwrite || self.work_type.is_none() {
                self.work_type = Some(work_type);
            }
        }
        if let Some(duration) = update.duration {
            if overwrite || self.duration.is_none() {
                self.duration = Some(duration);
            }
        }
        *self != before
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Company tax identity (RUT/NIT) required before quoting.
    TaxId,
    Other,
}

impl DocumentKind {
    pub fn key(self) -> &'static str {
        match self {
            Self::TaxId => "rut",
            Self::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub kind: DocumentKind,
    pub file_name: Option<String>,
    pub location: Option<String>,
    pub text: Option<String>,
    pub received: bool,
    pub processed: bool,
    pub attempts: u32,
    /// Set when the file arrives, cleared by the next extraction attempt.
    #[serde(default)]
    pub fresh_upload: bool,
}

impl DocumentRecord {
    pub fn uploaded(kind: DocumentKind, file_name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            kind,
            file_name: Some(file_name.into()),
            location: Some(location.into()),
            text: None,
            received: true,
            processed: false,
            attempts: 0,
            fresh_upload: true,
        }
    }

    pub fn typed(kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            file_name: None,
            location: None,
            text: Some(text.into()),
            received: true,
            processed: true,
            attempts: 0,
            fresh_upload: false,
        }
    }

    pub fn awaiting_processing(&self) -> bool {
        self.received && !self.processed && self.location.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuoteRequirement {
    Phone,
    Email,
    TaxId,
}

/// One outbound message produced during a turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundReply {
    Text(String),
    Document { document: DocumentReference, caption: String },
}

impl OutboundReply {
    pub fn log_text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Document { caption, .. } => caption,
        }
    }
}

/// Everything accumulated for one end user across turns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub stage: Stage,
    pub contact: Contact,
    pub project: ProjectDetails,
    /// Project fields the last analysis ran with.
    pub analyzed_project: Option<ProjectDetails>,
    pub recommended_equipment: Vec<Equipment>,
    pub documents: BTreeMap<String, DocumentRecord>,
    pub quotation: Option<Quotation>,
    pub quotation_document: Option<DocumentReference>,
    pub quote_requested: bool,
    pub quotation_sent: bool,
    pub commercial_notified: bool,
    pub message_log: Vec<LogEntry>,
    #[serde(skip)]
    pub turn_output: Vec<OutboundReply>,
    #[serde(skip)]
    logged_outputs: usize,
}

impl ConversationState {
    pub fn new(user_id: UserId, display_name: Option<String>) -> Self {
        Self {
            user_id,
            display_name,
            stage: Stage::default(),
            contact: Contact::default(),
            project: ProjectDetails::default(),
            analyzed_project: None,
            recommended_equipment: Vec::new(),
            documents: BTreeMap::new(),
            quotation: None,
            quotation_document: None,
            quote_requested: false,
            quotation_sent: false,
            commercial_notified: false,
            message_log: Vec::new(),
            turn_output: Vec::new(),
            logged_outputs: 0,
        }
    }

    pub fn last_entry(&self) -> Option<&LogEntry> {
        self.message_log.last()
    }

    /// Text of the newest log entry when it came from the user.
    pub fn pending_user_text(&self) -> Option<&str> {
        self.last_entry().filter(|entry| entry.sender == Sender::User).map(|entry| entry.text.as_str())
    }

    pub fn record_user_message(&mut self, text: impl Into<String>) {
        self.message_log.push(LogEntry::new(Sender::User, text));
    }

    pub fn emit(&mut self, reply: OutboundReply) {
        self.turn_output.push(reply);
    }

    pub fn say(&mut self, text: impl Into<String>) {
        self.emit(OutboundReply::Text(text.into()));
    }

    /// Appends replies emitted since the last flush to the log as assistant entries.
    pub fn flush_replies(&mut self) -> usize {
        let fresh: Vec<LogEntry> = self.turn_output[self.logged_outputs..]
            .iter()
            .map(|reply| LogEntry::new(Sender::Assistant, reply.log_text()))
            .collect();
        let count = fresh.len();
        self.message_log.extend(fresh);
        self.logged_outputs = self.turn_output.len();
        count
    }

    pub fn take_turn_output(&mut self) -> Vec<OutboundReply> {
        self.logged_outputs = 0;
        std::mem::take(&mut self.turn_output)
    }

    pub fn tax_document(&self) -> Option<&DocumentRecord> {
        self.documents.get(DocumentKind::TaxId.key())
    }

    pub fn has_tax_id(&self) -> bool {
        self.contact.tax_id.is_some() || self.tax_document().is_some_and(|doc| doc.processed)
    }

    pub fn missing_quote_requirements(&self) -> Vec<QuoteRequirement> {
        let mut missing = Vec::new();
        if self.contact.phone.is_none() {
            missing.push(QuoteRequirement::Phone);
        }
        if self.contact.email.is_none() {
            missing.push(QuoteRequirement::Email);
        }
        if !self.has_tax_id() {
            missing.push(QuoteRequirement::TaxId);
        }
        missing
    }

    /// The identity document uploaded in the pending user turn and not yet tried, while
    /// attempts remain.
    pub fn pending_tax_document(&self, max_attempts: u32) -> Option<&DocumentRecord> {
        self.tax_document()
            .filter(|doc| doc.fresh_upload && doc.awaiting_processing() && doc.attempts < max_attempts)
    }

    pub fn needs_analysis(&self) -> bool {
        self.project.is_complete() && self.analyzed_project.as_ref() != Some(&self.project)
    }

    pub fn quotation_awaiting_delivery(&self) -> bool {
        self.quotation_document.is_some() && !self.quotation_sent
    }

    pub fn register_document(&mut self, record: DocumentRecord) {
        self.documents.insert(record.kind.key().to_string(), record);
    }

    /// Restarts requirements gathering. Contact data and documents survive.
    pub fn restart(&mut self) {
        self.project = ProjectDetails::default();
        self.analyzed_project = None;
        self.recommended_equipment.clear();
        self.quotation = None;
        self.quotation_document = None;
        self.quote_requested = false;
        self.quotation_sent = false;
        self.commercial_notified = false;
    }
}
