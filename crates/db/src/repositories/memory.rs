use std::collections::HashMap;

use tokio::sync::RwLock;

use altura_core::domain::conversation::{ConversationState, LogEntry, UserId};
use altura_core::domain::equipment::{Equipment, EquipmentId};

use super::{
    ConversationRepository, EquipmentRepository, QuotationRecord, QuotationRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, ConversationState>>,
    messages: RwLock<HashMap<String, Vec<LogEntry>>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find(
        &self,
        user_id: &UserId,
        history_limit: u32,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let stored = self.conversations.read().await.get(&user_id.0).cloned();
        let Some(mut state) = stored else {
            return Ok(None);
        };
        state.message_log = self.recent_messages(user_id, history_limit).await?;
        Ok(Some(state))
    }

    async fn save_turn(
        &self,
        state: &ConversationState,
        new_entries: &[LogEntry],
    ) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let mut messages = self.messages.write().await;

        let mut stored = state.clone();
        stored.message_log.clear();
        stored.take_turn_output();
        if stored.display_name.is_none() {
            stored.display_name =
                conversations.get(&state.user_id.0).and_then(|previous| previous.display_name.clone());
        }
        conversations.insert(state.user_id.0.clone(), stored);
        messages.entry(state.user_id.0.clone()).or_default().extend_from_slice(new_entries);
        Ok(())
    }

    async fn recent_messages(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<LogEntry>, RepositoryError> {
        let messages = self.messages.read().await;
        let log = messages.get(&user_id.0).map(Vec::as_slice).unwrap_or_default();
        let skip = log.len().saturating_sub(limit as usize);
        Ok(log[skip..].to_vec())
    }
}

#[derive(Default)]
pub struct InMemoryEquipmentRepository {
    items: RwLock<HashMap<i64, Equipment>>,
}

impl InMemoryEquipmentRepository {
    pub fn with_items(items: impl IntoIterator<Item = Equipment>) -> Self {
        Self { items: RwLock::new(items.into_iter().map(|item| (item.id.0, item)).collect()) }
    }
}

#[async_trait::async_trait]
impl EquipmentRepository for InMemoryEquipmentRepository {
    async fn list_all(&self) -> Result<Vec<Equipment>, RepositoryError> {
        let mut items: Vec<Equipment> = self.items.read().await.values().cloned().collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    async fn find_many(&self, ids: &[EquipmentId]) -> Result<Vec<Equipment>, RepositoryError> {
        let items = self.items.read().await;
        ids.iter()
            .map(|id| {
                items.get(&id.0).cloned().ok_or_else(|| RepositoryError::NotFound {
                    entity: "equipment",
                    id: id.to_string(),
                })
            })
            .collect()
    }

    async fn save(&self, item: Equipment) -> Result<(), RepositoryError> {
        self.items.write().await.insert(item.id.0, item);
        Ok(())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(self.items.read().await.len() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryQuotationRepository {
    records: RwLock<Vec<QuotationRecord>>,
}

#[async_trait::async_trait]
impl QuotationRepository for InMemoryQuotationRepository {
    async fn save(&self, record: QuotationRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|existing| existing.quotation.id == record.quotation.id) {
            Some(existing) => existing.document = record.document,
            None => records.push(record),
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<QuotationRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|record| &record.user_id == user_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use altura_core::domain::conversation::{ConversationState, LogEntry, Sender, UserId};

    use crate::repositories::{ConversationRepository, InMemoryConversationRepository};

    #[tokio::test]
    async fn in_memory_conversation_repo_round_trip() {
        let repo = InMemoryConversationRepository::default();
        let mut state = ConversationState::new(UserId("tg-1".to_owned()), Some("Luis".to_owned()));
        state.contact.email = Some("luis@obra.co".to_owned());
        state.say("transient");

        repo.save_turn(&state, &[LogEntry::new(Sender::User, "hola")]).await.expect("save");
        let found = repo.find(&state.user_id, 10).await.expect("find").expect("stored");

        assert_eq!(found.contact, state.contact);
        assert_eq!(found.message_log.len(), 1);
        assert!(found.turn_output.is_empty());
    }

    #[tokio::test]
    async fn in_memory_history_window_keeps_newest_entries() {
        let repo = InMemoryConversationRepository::default();
        let state = ConversationState::new(UserId("tg-2".to_owned()), None);
        let entries: Vec<LogEntry> =
            (0..4).map(|index| LogEntry::new(Sender::User, format!("m{index}"))).collect();
        repo.save_turn(&state, &entries).await.expect("save");

        let recent = repo.recent_messages(&state.user_id, 2).await.expect("recent");
        assert_eq!(recent.iter().map(|entry| entry.text.as_str()).collect::<Vec<_>>(), vec!["m2", "m3"]);
    }
}
