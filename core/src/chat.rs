//! One conversation with the assistant, one reconciliation pass at a time.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, watch};

use crate::interpret::interpret;
use crate::issue::Issue;
use crate::reconcile::{ReconcileReport, Reconciler, ReconcilerConfig};
use crate::remote::{RemoteClient, RemoteError};
use crate::session::{Session, SharedDatabase, lock};

const CONVERSATION_KEY: &str = "conversation_id";
const ISSUE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub message: String,
    pub conversation_id: Option<String>,
    pub model_used: Option<String>,
    pub report: ReconcileReport,
}

pub struct ChatSession {
    db: SharedDatabase,
    remote: Arc<dyn RemoteClient>,
    reconciler: Reconciler,
    session: Session,
    /// Held for a whole turn; also guards the conversation id.
    gate: Mutex<Option<String>>,
    processing: watch::Sender<bool>,
    issues: broadcast::Sender<Issue>,
}

/// Clears the processing flag however the turn ends.
struct Processing<'a>(&'a watch::Sender<bool>);

impl<'a> Processing<'a> {
    fn start(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl ChatSession {
    pub fn new(db: SharedDatabase, remote: Arc<dyn RemoteClient>, session: Session) -> Self {
        Self::with_config(db, remote, session, ReconcilerConfig::default())
    }

    /// Resumes the conversation persisted in the store, if any.
    pub fn with_config(
        db: SharedDatabase,
        remote: Arc<dyn RemoteClient>,
        session: Session,
        config: ReconcilerConfig,
    ) -> Self {
        let conversation_id = match lock(&db).and_then(|db| db.get_setting(CONVERSATION_KEY)) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "could not load conversation id");
                None
            }
        };
        let (processing, _) = watch::channel(false);
        let (issues, _) = broadcast::channel(ISSUE_CHANNEL_CAPACITY);
        Self {
            reconciler: Reconciler::with_config(db.clone(), remote.clone(), config),
            db,
            remote,
            session,
            gate: Mutex::new(conversation_id),
            processing,
            issues,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn processing(&self) -> watch::Receiver<bool> {
        self.processing.subscribe()
    }

    pub fn subscribe_issues(&self) -> broadcast::Receiver<Issue> {
        self.issues.subscribe()
    }

    pub async fn conversation_id(&self) -> Option<String> {
        self.gate.lock().await.clone()
    }

    /// Start a fresh conversation on the next turn.
    pub async fn reset_conversation(&self) -> anyhow::Result<()> {
        let mut conversation = self.gate.lock().await;
        *conversation = None;
        lock(&self.db)?.set_setting(CONVERSATION_KEY, "")?;
        Ok(())
    }

    /// Send `text`, then interpret and reconcile the reply. A new turn waits
    /// until the previous pass has finished.
    pub async fn send(&self, text: &str) -> Result<ChatTurn, RemoteError> {
        let mut conversation = self.gate.lock().await;
        let _processing = Processing::start(&self.processing);

        let reply = match self
            .remote
            .send_chat_message(text, conversation.as_deref())
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, "chat message failed");
                self.publish(Issue::Fetch {
                    kind: "chat",
                    remote_id: None,
                    source: err.clone(),
                });
                return Err(err);
            }
        };

        let interpretation = interpret(&reply);
        let mut report = self
            .reconciler
            .apply(&self.session, &interpretation.commands)
            .await;
        let mut issues = interpretation.issues;
        issues.append(&mut report.issues);
        report.issues = issues;
        for issue in &report.issues {
            self.publish(issue.clone());
        }

        if let Some(id) = reply.conversation_id.as_deref().filter(|id| !id.is_empty()) {
            if conversation.as_deref() != Some(id) {
                if let Err(e) = lock(&self.db).and_then(|db| db.set_setting(CONVERSATION_KEY, id)) {
                    tracing::warn!(error = %format!("{e:#}"), "could not persist conversation id");
                }
            }
            *conversation = Some(id.to_string());
        }

        Ok(ChatTurn {
            message: reply.message,
            conversation_id: conversation.clone(),
            model_used: reply.model_used,
            report,
        })
    }

    fn publish(&self, issue: Issue) {
        // No subscribers is fine.
        let _ = self.issues.send(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::issue::IssueClass;
    use crate::reconcile::Outcome;
    use crate::remote::AssistantReply;
    use crate::session::shared;
    use crate::testing::ScriptedRemote;
    use serde_json::json;
    use std::time::Duration;

    fn reply(value: serde_json::Value) -> AssistantReply {
        serde_json::from_value(value).unwrap()
    }

    fn chat(remote: ScriptedRemote) -> (ChatSession, Arc<ScriptedRemote>, SharedDatabase) {
        let db = shared(Database::open_in_memory().unwrap());
        let session = Session::load(&db.lock().unwrap()).unwrap();
        let remote = Arc::new(remote);
        (ChatSession::new(db.clone(), remote.clone(), session), remote, db)
    }

    #[tokio::test]
    async fn test_turn_reconciles_and_remembers_conversation() {
        let (chat, remote, db) = chat(ScriptedRemote::new()
            .with_reply(Ok(reply(json!({
                "message": "Logged 500 ml of water.",
                "created_entries": [{"type": "add_water", "data": {"entry_id": "w-1", "amount_ml": 500}}],
                "conversation_id": "c-1"
            }))))
            .with_reply(Ok(reply(json!({"message": "Anything else?"})))));

        let first = chat.send("I drank 500ml").await.unwrap();
        assert_eq!(first.message, "Logged 500 ml of water.");
        assert!(matches!(first.report.outcomes[0].outcome, Outcome::Inserted { .. }));
        assert_eq!(first.conversation_id.as_deref(), Some("c-1"));
        assert_eq!(
            db.lock().unwrap().get_setting(CONVERSATION_KEY).unwrap().as_deref(),
            Some("c-1")
        );

        let second = chat.send("thanks").await.unwrap();
        assert_eq!(second.conversation_id.as_deref(), Some("c-1"));
        assert_eq!(remote.calls()[1], "send_chat_message:thanks:c-1");
    }

    #[tokio::test]
    async fn test_conversation_resumes_from_store() {
        let db = shared(Database::open_in_memory().unwrap());
        db.lock().unwrap().set_setting(CONVERSATION_KEY, "c-9").unwrap();
        let session = Session::load(&db.lock().unwrap()).unwrap();
        let remote = Arc::new(ScriptedRemote::new());
        let chat = ChatSession::new(db, remote.clone(), session);
        chat.send("hi").await.unwrap();
        assert_eq!(remote.calls(), vec!["send_chat_message:hi:c-9"]);
    }

    #[tokio::test]
    async fn test_unauthorized_send_is_returned_and_processing_resets() {
        let (chat, _remote, _db) =
            chat(ScriptedRemote::new().with_reply(Err(RemoteError::Unauthorized)));
        let processing = chat.processing();
        let mut issues = chat.subscribe_issues();

        let err = chat.send("hello").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!*processing.borrow());
        let published = issues.recv().await.unwrap();
        assert!(published.is_unauthorized());
    }

    #[tokio::test]
    async fn test_parse_and_reconcile_issues_are_published() {
        let (chat, _remote, _db) = chat(ScriptedRemote::new().with_reply(Ok(reply(json!({
            "message": "ok",
            "created_entries": [
                {"kind": "create_water_entry", "amount_ml": "plenty"},
            ]
        })))));
        let mut issues = chat.subscribe_issues();
        let turn = chat.send("water").await.unwrap();

        let classes: Vec<_> = turn.report.issues.iter().map(Issue::class).collect();
        assert_eq!(classes, vec![IssueClass::Parse, IssueClass::Drop]);
        assert_eq!(issues.recv().await.unwrap().class(), IssueClass::Parse);
        assert_eq!(issues.recv().await.unwrap().class(), IssueClass::Drop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_turn_waits_for_first_pass() {
        let (chat, remote, _db) = chat(ScriptedRemote::new()
            .with_delay(Duration::from_secs(1))
            .with_reply(Ok(reply(json!({
                "message": "Logged.",
                "created_entries": [{"kind": "create_meal", "meal_id": "m-1", "name": "Oats"}],
                "conversation_id": "c-1"
            }))))
            .with_reply(Ok(reply(json!({"message": "Done."})))));
        let mut processing = chat.processing();

        let (first, second) = tokio::join!(chat.send("first"), chat.send("second"));
        first.unwrap();
        second.unwrap();

        assert_eq!(
            remote.calls(),
            vec![
                "send_chat_message:first:-",
                "fetch_meal:m-1",
                "send_chat_message:second:c-1",
            ]
        );
        assert!(processing.has_changed().unwrap());
        assert!(!*processing.borrow_and_update());
    }
}
