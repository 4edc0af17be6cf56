use async_trait::async_trait;
use thiserror::Error;

use altura_core::domain::conversation::{ConversationState, LogEntry, UserId};
use altura_core::domain::equipment::{Equipment, EquipmentId};
use altura_core::domain::quotation::{DocumentReference, Quotation};

pub mod conversation;
pub mod equipment;
pub mod memory;
pub mod quotation;

pub use conversation::SqlConversationRepository;
pub use equipment::SqlEquipmentRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryEquipmentRepository, InMemoryQuotationRepository,
};
pub use quotation::SqlQuotationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Loads the stored conversation with at most `history_limit` of its newest log entries.
    async fn find(
        &self,
        user_id: &UserId,
        history_limit: u32,
    ) -> Result<Option<ConversationState>, RepositoryError>;

    /// Upserts the conversation record and appends `new_entries` to its log atomically.
    async fn save_turn(
        &self,
        state: &ConversationState,
        new_entries: &[LogEntry],
    ) -> Result<(), RepositoryError>;

    async fn recent_messages(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<LogEntry>, RepositoryError>;
}

#[async_trait]
pub trait EquipmentRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Equipment>, RepositoryError>;

    /// Items in the order requested. Any unknown id is an error.
    async fn find_many(&self, ids: &[EquipmentId]) -> Result<Vec<Equipment>, RepositoryError>;

    async fn save(&self, item: Equipment) -> Result<(), RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;
}

/// Durable record of a delivered quotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotationRecord {
    pub user_id: UserId,
    pub quotation: Quotation,
    pub document: Option<DocumentReference>,
}

#[async_trait]
pub trait QuotationRepository: Send + Sync {
    async fn save(&self, record: QuotationRecord) -> Result<(), RepositoryError>;

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<QuotationRecord>, RepositoryError>;
}

pub(crate) fn column<T>(row: &sqlx::sqlite::SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    use sqlx::Row;
    row.try_get(name).map_err(|error| RepositoryError::Decode(format!("{name}: {error}")))
}

pub(crate) fn encode_json<T: serde::Serialize>(
    field: &str,
    value: &T,
) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Encode(format!("{field}: {error}")))
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    field: &str,
    raw: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn decode_decimal(
    field: &str,
    raw: &str,
) -> Result<rust_decimal::Decimal, RepositoryError> {
    raw.parse()
        .map_err(|error| RepositoryError::Decode(format!("{field} `{raw}`: {error}")))
}

pub(crate) fn decode_timestamp(
    field: &str,
    raw: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&chrono::Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field} `{raw}`: {error}")))
}
