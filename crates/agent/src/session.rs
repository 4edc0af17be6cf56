use std::sync::Arc;

use tracing::{debug, warn};

use altura_core::domain::conversation::{ConversationState, UserId};
use altura_db::{ConversationRepository, RepositoryError};

/// A conversation loaded for one turn, with the size of its log when it was read.
#[derive(Clone, Debug)]
pub struct Session {
    pub state: ConversationState,
    persisted_len: usize,
    /// The stored row could not be read; this state must never overwrite it.
    load_failed: bool,
}

impl Session {
    pub fn fresh(user_id: UserId, display_name: Option<String>) -> Self {
        Self { state: ConversationState::new(user_id, display_name), persisted_len: 0, load_failed: false }
    }

    pub fn is_new(&self) -> bool {
        self.persisted_len == 0 && !self.load_failed
    }

    pub fn load_failed(&self) -> bool {
        self.load_failed
    }
}

/// Get-or-create and save over the conversation repository.
#[derive(Clone)]
pub struct SessionStore {
    conversations: Arc<dyn ConversationRepository>,
    history_window: u32,
}

impl SessionStore {
    pub fn new(conversations: Arc<dyn ConversationRepository>, history_window: u32) -> Self {
        Self { conversations, history_window }
    }

    /// Loads the stored conversation or starts a new one. A failed read falls back to a fresh
    /// state so the customer still gets an answer; that state is never saved.
    pub async fn load_or_create(&self, user_id: &UserId, display_name: Option<String>) -> Session {
        match self.conversations.find(user_id, self.history_window).await {
            Ok(Some(mut state)) => {
                if display_name.is_some() {
                    state.display_name = display_name;
                }
                let persisted_len = state.message_log.len();
                Session { state, persisted_len, load_failed: false }
            }
            Ok(None) => {
                debug!(user_id = %user_id, "starting new conversation");
                Session::fresh(user_id.clone(), display_name)
            }
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "conversation load failed, starting fresh");
                Session { load_failed: true, ..Session::fresh(user_id.clone(), display_name) }
            }
        }
    }

    /// Writes the state and the log entries appended since the session was loaded. Sessions
    /// whose load failed are skipped so the stored conversation stays intact.
    pub async fn save(&self, session: &mut Session) -> Result<(), RepositoryError> {
        if session.load_failed {
            warn!(
                event_name = "agent.session.save_skipped",
                user_id = %session.state.user_id,
                "conversation was not loaded; keeping the stored state"
            );
            return Ok(());
        }
        let start = session.persisted_len.min(session.state.message_log.len());
        let fresh = &session.state.message_log[start..];
        self.conversations.save_turn(&session.state, fresh).await?;
        session.persisted_len = session.state.message_log.len();
        Ok(())
    }
}
