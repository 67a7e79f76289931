//! In-memory session storage for conversation context.
//!
//! Sessions are keyed by Telegram user id and message logs by session id.
//! `DashMap` shards give per-key locking: two calls for the same user are
//! serialized, calls for different users do not wait on each other.
//!
//! Lock order is sessions → logs → owners. No method holds a guard of a
//! later map while taking one of an earlier map.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

use super::types::{MessageRole, Session, StoreError, Turn};
use crate::i18n::Language;

/// Process-wide owner of all sessions and message logs.
pub struct SessionStore {
    sessions: DashMap<i64, Session>,
    logs: DashMap<String, Vec<Turn>>,
    owners: DashMap<String, i64>,
    max_context_messages: usize,
    default_language: Language,
}

impl SessionStore {
    pub fn new(max_context_messages: usize, default_language: Language) -> Self {
        Self {
            sessions: DashMap::new(),
            logs: DashMap::new(),
            owners: DashMap::new(),
            max_context_messages,
            default_language,
        }
    }

    pub fn max_context_messages(&self) -> usize {
        self.max_context_messages
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    /// Return the user's session, creating it on first contact.
    ///
    /// A recognized `language_hint` that differs from the stored language
    /// replaces it. Unrecognized hints never overwrite an existing choice.
    pub fn get_or_create_session(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        language_hint: Option<&str>,
    ) -> Session {
        let hint = language_hint.and_then(Language::parse);

        match self.sessions.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                if let Some(language) = hint.filter(|l| *l != session.language) {
                    tracing::debug!(
                        user_id,
                        from = %session.language,
                        to = %language,
                        "Session language updated"
                    );
                    session.language = language;
                    session.updated_at = Utc::now();
                }
                session.clone()
            }
            Entry::Vacant(entry) => {
                let now = Utc::now();
                let session = Session {
                    id: new_session_id(),
                    user_id,
                    username: username.map(str::to_string),
                    first_name: first_name.map(str::to_string),
                    language: hint.unwrap_or(self.default_language),
                    context: HashMap::new(),
                    created_at: now,
                    updated_at: now,
                };
                self.logs.insert(session.id.clone(), Vec::new());
                self.owners.insert(session.id.clone(), user_id);
                entry.insert(session.clone());

                tracing::info!(
                    user_id,
                    session_id = %session.id,
                    language = %session.language,
                    "Session created"
                );
                session
            }
        }
    }

    /// Append one turn to the session's log.
    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut log = self
            .logs
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        log.push(Turn::new(role, content));

        tracing::debug!(
            session_id,
            role = role.as_str(),
            total = log.len(),
            "Message appended"
        );
        Ok(())
    }

    /// Most recent turns within the configured context window, oldest first.
    pub fn get_history(&self, session_id: &str) -> Vec<Turn> {
        self.get_history_with_limit(session_id, self.max_context_messages)
    }

    /// Most recent `limit` turns, oldest first. Unknown ids yield no turns.
    pub fn get_history_with_limit(&self, session_id: &str, limit: usize) -> Vec<Turn> {
        let Some(log) = self.logs.get(session_id) else {
            return Vec::new();
        };
        let start = log.len().saturating_sub(limit);
        log[start..].to_vec()
    }

    /// Number of stored turns for a session.
    pub fn message_count(&self, session_id: &str) -> usize {
        self.logs.get(session_id).map_or(0, |log| log.len())
    }

    /// Clear the user's history and context, keeping the session id.
    ///
    /// A user without a session is a no-op.
    pub fn reset_conversation(&self, user_id: i64) -> Result<(), StoreError> {
        let Some(mut session) = self.sessions.get_mut(&user_id) else {
            tracing::debug!(user_id, "Reset requested before any session existed");
            return Ok(());
        };
        session.context.clear();
        session.updated_at = Utc::now();

        let cleared = match self.logs.get_mut(&session.id) {
            Some(mut log) => {
                let cleared = log.len();
                log.clear();
                cleared
            }
            None => {
                self.logs.insert(session.id.clone(), Vec::new());
                tracing::error!(
                    user_id,
                    session_id = %session.id,
                    "Session had no message log; recreated"
                );
                return Err(StoreError::Inconsistent(format!(
                    "missing log for session {}",
                    session.id
                )));
            }
        };

        tracing::info!(user_id, session_id = %session.id, cleared, "Conversation reset");
        Ok(())
    }

    /// Stored language of the user's session, or the default.
    pub fn get_user_language(&self, user_id: i64) -> Language {
        self.sessions
            .get(&user_id)
            .map_or(self.default_language, |session| session.language)
    }

    /// Replace the context map of a session.
    ///
    /// Unknown session ids are logged and otherwise ignored. Returns whether
    /// a session was updated.
    pub fn update_context(
        &self,
        session_id: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> bool {
        let owner = self.owners.get(session_id).map(|user_id| *user_id);
        let updated = owner
            .and_then(|user_id| self.sessions.get_mut(&user_id))
            .map(|mut session| {
                session.context = context;
                session.updated_at = Utc::now();
            })
            .is_some();

        if !updated {
            tracing::warn!(session_id, "Context update for unknown session");
        }
        updated
    }

    /// Snapshot of a user's session, if any.
    pub fn session_for_user(&self, user_id: i64) -> Option<Session> {
        self.sessions.get(&user_id).map(|session| session.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn new_session_id() -> String {
    format!("sess_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> SessionStore {
        SessionStore::new(10, Language::Ru)
    }

    #[test]
    fn test_same_user_gets_same_session() {
        let store = store();
        let first = store.get_or_create_session(42, Some("ada"), Some("Ada"), Some("en"));
        let second = store.get_or_create_session(42, None, None, None);

        assert_eq!(first.id, second.id);
        assert_eq!(second.username.as_deref(), Some("ada"));
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_different_users_get_different_sessions() {
        let store = store();
        let a = store.get_or_create_session(1, None, None, None);
        let b = store.get_or_create_session(2, None, None, None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_language_defaults_and_refreshes() {
        let store = store();
        let session = store.get_or_create_session(7, None, None, Some("de"));
        assert_eq!(session.language, Language::Ru);

        let session = store.get_or_create_session(7, None, None, Some("en-GB"));
        assert_eq!(session.language, Language::En);
        assert_eq!(store.get_user_language(7), Language::En);

        // Garbage hints keep the stored choice.
        store.get_or_create_session(7, None, None, Some("xx"));
        assert_eq!(store.get_user_language(7), Language::En);
    }

    #[test]
    fn test_unknown_user_language_is_default() {
        let store = SessionStore::new(10, Language::En);
        assert_eq!(store.get_user_language(999), Language::En);
    }

    #[test]
    fn test_append_and_history_order() {
        let store = store();
        let session = store.get_or_create_session(1, None, None, None);

        store
            .append_message(&session.id, MessageRole::User, "Hello")
            .unwrap();
        store
            .append_message(&session.id, MessageRole::Assistant, "Hi there!")
            .unwrap();

        let history = store.get_history(&session.id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[1].role, MessageRole::Assistant);
    }

    #[test]
    fn test_append_to_unknown_session_fails() {
        let err = store()
            .append_message("sess_missing", MessageRole::User, "hi")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_history_window_keeps_most_recent_in_order() {
        let store = store();
        let session = store.get_or_create_session(1, None, None, None);
        for i in 0..15 {
            store
                .append_message(&session.id, MessageRole::User, &format!("msg {i}"))
                .unwrap();
        }

        let window = store.get_history_with_limit(&session.id, 4);
        let contents: Vec<&str> = window.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 11", "msg 12", "msg 13", "msg 14"]);

        assert_eq!(store.get_history(&session.id).len(), 10);
        assert_eq!(store.message_count(&session.id), 15);
        assert!(store.get_history_with_limit(&session.id, 0).is_empty());
    }

    #[test]
    fn test_history_of_unknown_session_is_empty() {
        assert!(store().get_history("sess_nope").is_empty());
    }

    #[test]
    fn test_reset_keeps_id_and_clears_history() {
        let store = store();
        let session = store.get_or_create_session(5, None, None, None);
        store
            .append_message(&session.id, MessageRole::User, "remember me")
            .unwrap();
        let mut context = HashMap::new();
        context.insert("topic".to_string(), serde_json::json!("rust"));
        assert!(store.update_context(&session.id, context));

        store.reset_conversation(5).unwrap();

        let after = store.get_or_create_session(5, None, None, None);
        assert_eq!(after.id, session.id);
        assert!(after.context.is_empty());
        assert!(store.get_history(&session.id).is_empty());
    }

    #[test]
    fn test_reset_without_session_is_noop() {
        let store = store();
        assert!(store.reset_conversation(404).is_ok());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_update_context_unknown_session_is_ignored() {
        assert!(!store().update_context("sess_ghost", HashMap::new()));
    }

    #[test]
    fn test_returned_session_is_a_snapshot() {
        let store = store();
        let mut session = store.get_or_create_session(3, None, None, None);
        session.language = Language::En;
        session.context.insert("k".into(), serde_json::json!(1));

        let stored = store.session_for_user(3).unwrap();
        assert_eq!(stored.language, Language::Ru);
        assert!(stored.context.is_empty());
    }

    #[test]
    fn test_concurrent_creation_yields_one_session() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.get_or_create_session(77, None, None, None).id)
            })
            .collect();

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_across_users() {
        let store = Arc::new(store());
        let mut tasks = Vec::new();
        for user_id in 0..8_i64 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let session = store.get_or_create_session(user_id, None, None, None);
                for i in 0..20 {
                    store
                        .append_message(&session.id, MessageRole::User, &format!("{i}"))
                        .unwrap();
                }
                session.id
            }));
        }

        for task in tasks {
            let id = task.await.unwrap();
            assert_eq!(store.message_count(&id), 20);
            let last = store.get_history_with_limit(&id, 1);
            assert_eq!(last[0].content, "19");
        }
    }
}
