use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use altura_core::domain::conversation::{Contact, ConversationState, LogEntry, Sender, UserId};
use altura_core::flows::Stage;

use super::{
    column, decode_json, decode_timestamp, encode_json, ConversationRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_state(row: &SqliteRow) -> Result<ConversationState, RepositoryError> {
    let user_id: String = column(row, "user_id")?;
    let stage: String = column(row, "stage")?;
    let analyzed_project: Option<String> = column(row, "analyzed_project_json")?;
    let quotation: Option<String> = column(row, "quotation_json")?;
    let quotation_document: Option<String> = column(row, "quotation_document_json")?;

    let mut state = ConversationState::new(UserId(user_id), column(row, "display_name")?);
    state.stage = stage.parse::<Stage>().map_err(|error| RepositoryError::Decode(error.to_string()))?;
    state.contact = Contact {
        name: column(row, "contact_name")?,
        company: column(row, "company_name")?,
        phone: column(row, "phone")?,
        email: column(row, "email")?,
        tax_id: column(row, "tax_id")?,
        address: column(row, "address")?,
    };
    state.project = decode_json("project_json", &column::<String>(row, "project_json")?)?;
    state.analyzed_project = analyzed_project
        .map(|raw| decode_json("analyzed_project_json", &raw))
        .transpose()?;
    state.recommended_equipment = decode_json(
        "recommended_equipment_json",
        &column::<String>(row, "recommended_equipment_json")?,
    )?;
    state.documents = decode_json("documents_json", &column::<String>(row, "documents_json")?)?;
    state.quotation = quotation.map(|raw| decode_json("quotation_json", &raw)).transpose()?;
    state.quotation_document = quotation_document
        .map(|raw| decode_json("quotation_document_json", &raw))
        .transpose()?;
    state.quote_requested = column(row, "quote_requested")?;
    state.quotation_sent = column(row, "quotation_sent")?;
    state.commercial_notified = column(row, "commercial_notified")?;
    Ok(state)
}

fn parse_sender(raw: &str) -> Result<Sender, RepositoryError> {
    match raw {
        "user" => Ok(Sender::User),
        "assistant" => Ok(Sender::Assistant),
        other => Err(RepositoryError::Decode(format!("unknown message sender `{other}`"))),
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find(
        &self,
        user_id: &UserId,
        history_limit: u32,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, display_name, stage, contact_name, company_name, phone, email,
                    tax_id, address, project_json, analyzed_project_json,
                    recommended_equipment_json, documents_json, quotation_json,
                    quotation_document_json, quote_requested, quotation_sent,
                    commercial_notified
             FROM conversation WHERE user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut state = row_to_state(&row)?;
        state.message_log = self.recent_messages(user_id, history_limit).await?;
        Ok(Some(state))
    }

    async fn save_turn(
        &self,
        state: &ConversationState,
        new_entries: &[LogEntry],
    ) -> Result<(), RepositoryError> {
        let project = encode_json("project", &state.project)?;
        let analyzed_project = state
            .analyzed_project
            .as_ref()
            .map(|project| encode_json("analyzed_project", project))
            .transpose()?;
        let recommended = encode_json("recommended_equipment", &state.recommended_equipment)?;
        let documents = encode_json("documents", &state.documents)?;
        let quotation =
            state.quotation.as_ref().map(|quotation| encode_json("quotation", quotation)).transpose()?;
        let quotation_document = state
            .quotation_document
            .as_ref()
            .map(|document| encode_json("quotation_document", document))
            .transpose()?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO conversation (user_id, display_name, stage, contact_name, company_name,
                                       phone, email, tax_id, address, project_json,
                                       analyzed_project_json, recommended_equipment_json,
                                       documents_json, quotation_json, quotation_document_json,
                                       quote_requested, quotation_sent, commercial_notified,
                                       created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = COALESCE(excluded.display_name, conversation.display_name),
                 stage = excluded.stage,
                 contact_name = excluded.contact_name,
                 company_name = excluded.company_name,
                 phone = excluded.phone,
                 email = excluded.email,
                 tax_id = excluded.tax_id,
                 address = excluded.address,
                 project_json = excluded.project_json,
                 analyzed_project_json = excluded.analyzed_project_json,
                 recommended_equipment_json = excluded.recommended_equipment_json,
                 documents_json = excluded.documents_json,
                 quotation_json = excluded.quotation_json,
                 quotation_document_json = excluded.quotation_document_json,
                 quote_requested = excluded.quote_requested,
                 quotation_sent = excluded.quotation_sent,
                 commercial_notified = excluded.commercial_notified,
                 updated_at = excluded.updated_at",
        )
        .bind(&state.user_id.0)
        .bind(&state.display_name)
        .bind(state.stage.as_str())
        .bind(&state.contact.name)
        .bind(&state.contact.company)
        .bind(&state.contact.phone)
        .bind(&state.contact.email)
        .bind(&state.contact.tax_id)
        .bind(&state.contact.address)
        .bind(&project)
        .bind(&analyzed_project)
        .bind(&recommended)
        .bind(&documents)
        .bind(&quotation)
        .bind(&quotation_document)
        .bind(state.quote_requested)
        .bind(state.quotation_sent)
        .bind(state.commercial_notified)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for entry in new_entries {
            sqlx::query(
                "INSERT INTO conversation_message (user_id, sender, body, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&state.user_id.0)
            .bind(entry.sender.as_str())
            .bind(&entry.text)
            .bind(entry.at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<LogEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT sender, body, created_at FROM conversation_message
             WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(&user_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows
            .iter()
            .map(|row| -> Result<LogEntry, RepositoryError> {
                let sender: String = column(row, "sender")?;
                let created_at: String = column(row, "created_at")?;
                Ok(LogEntry {
                    sender: parse_sender(&sender)?,
                    text: column(row, "body")?,
                    at: decode_timestamp("created_at", &created_at)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use altura_core::domain::conversation::{
        ConversationState, DocumentKind, DocumentRecord, DurationUnit, LogEntry, ProjectDetails,
        RentalDuration, Sender, UserId,
    };
    use altura_core::flows::Stage;

    use super::SqlConversationRepository;
    use crate::repositories::ConversationRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_state() -> ConversationState {
        let mut state = ConversationState::new(UserId("tg-55".to_owned()), Some("Ana".to_owned()));
        state.stage = Stage::Recommendation;
        state.contact.phone = Some("+573001234567".to_owned());
        state.contact.company = Some("Obras Andinas".to_owned());
        state.project = ProjectDetails {
            height: Some(Decimal::new(45, 1)),
            work_type: Some("pintura".to_owned()),
            duration: Some(RentalDuration::new(2, DurationUnit::Weeks)),
        };
        state.analyzed_project = Some(state.project.clone());
        state.register_document(DocumentRecord::typed(DocumentKind::TaxId, "900123456-7"));
        state.quote_requested = true;
        state
    }

    #[tokio::test]
    async fn save_turn_round_trips_state_and_log() {
        let repo = SqlConversationRepository::new(pool().await);
        let state = sample_state();
        let entries = vec![
            LogEntry::new(Sender::User, "necesito un andamio"),
            LogEntry::new(Sender::Assistant, "¿A qué altura?"),
        ];

        repo.save_turn(&state, &entries).await.expect("save");
        let loaded = repo.find(&state.user_id, 20).await.expect("find").expect("stored");

        assert_eq!(loaded.stage, Stage::Recommendation);
        assert_eq!(loaded.contact, state.contact);
        assert_eq!(loaded.project, state.project);
        assert_eq!(loaded.analyzed_project, state.analyzed_project);
        assert!(loaded.has_tax_id());
        assert!(loaded.quote_requested);
        assert_eq!(loaded.message_log.len(), 2);
        assert_eq!(loaded.message_log[1].sender, Sender::Assistant);
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let repo = SqlConversationRepository::new(pool().await);
        let found = repo.find(&UserId("tg-404".to_owned()), 20).await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn log_is_append_only_and_history_is_windowed() {
        let repo = SqlConversationRepository::new(pool().await);
        let state = sample_state();

        for index in 0..5 {
            repo.save_turn(&state, &[LogEntry::new(Sender::User, format!("mensaje {index}"))])
                .await
                .expect("save");
        }

        let recent = repo.recent_messages(&state.user_id, 3).await.expect("recent");
        let texts: Vec<&str> = recent.iter().map(|entry| entry.text.as_str()).collect();
        assert_eq!(texts, vec!["mensaje 2", "mensaje 3", "mensaje 4"]);

        let loaded = repo.find(&state.user_id, 2).await.expect("find").expect("stored");
        assert_eq!(loaded.message_log.len(), 2);
        assert_eq!(loaded.pending_user_text(), Some("mensaje 4"));
    }

    #[tokio::test]
    async fn upsert_keeps_display_name_when_missing() {
        let repo = SqlConversationRepository::new(pool().await);
        let mut state = sample_state();
        repo.save_turn(&state, &[]).await.expect("first save");

        state.display_name = None;
        state.stage = Stage::DocumentCollection;
        repo.save_turn(&state, &[]).await.expect("second save");

        let loaded = repo.find(&state.user_id, 20).await.expect("find").expect("stored");
        assert_eq!(loaded.display_name.as_deref(), Some("Ana"));
        assert_eq!(loaded.stage, Stage::DocumentCollection);
    }
}
