use std::collections::HashMap;
use std::sync::Arc;

use founderhub_domain::DomainResult;
use founderhub_domain::error::DomainError;
use founderhub_domain::messaging::{Chat, ChatKind, Message, direct_chat_key};
use founderhub_domain::ports::BoxFuture;
use founderhub_domain::ports::messaging::MessageRepository;
use founderhub_domain::util::push_unique;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::surreal_support::{
    SurrealClient, check_response, decode_count, decode_rows, map_surreal_error,
    parse_datetime_ms, take_rows, to_rfc3339,
};

#[derive(Default)]
struct MessagingState {
    chats: HashMap<String, Chat>,
    direct: HashMap<String, String>,
    messages: HashMap<String, Vec<Message>>,
}

#[derive(Clone, Default)]
pub struct InMemoryMessageRepository {
    state: Arc<RwLock<MessagingState>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn chronological(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.created_at_ms
            .cmp(&b.created_at_ms)
            .then_with(|| a.message_id.cmp(&b.message_id))
    });
}

impl MessageRepository for InMemoryMessageRepository {
    fn create_chat(&self, chat: &Chat) -> BoxFuture<'_, DomainResult<Chat>> {
        let chat = chat.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.chats.contains_key(&chat.chat_id) {
                return Err(DomainError::Conflict);
            }
            if let Some(key) = chat.direct_key() {
                if state.direct.contains_key(&key) {
                    return Err(DomainError::Conflict);
                }
                state.direct.insert(key, chat.chat_id.clone());
            }
            state.chats.insert(chat.chat_id.clone(), chat.clone());
            Ok(chat)
        })
    }

    fn get_chat(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let chat_id = chat_id.to_string();
        Box::pin(async move { Ok(self.state.read().await.chats.get(&chat_id).cloned()) })
    }

    fn find_direct_chat(&self, user_a: &str, user_b: &str) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let key = direct_chat_key(user_a, user_b);
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .direct
                .get(&key)
                .and_then(|chat_id| state.chats.get(chat_id))
                .cloned())
        })
    }

    fn add_member(&self, chat_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<Chat>> {
        let chat_id = chat_id.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let chat = state.chats.get_mut(&chat_id).ok_or(DomainError::NotFound)?;
            push_unique(&mut chat.member_ids, &user_id);
            Ok(chat.clone())
        })
    }

    fn list_chats_for_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<Chat>>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            let mut chats: Vec<Chat> = state
                .chats
                .values()
                .filter(|chat| chat.is_member(&user_id))
                .cloned()
                .collect();
            chats.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
            Ok(chats)
        })
    }

    fn create_message(&self, message: &Message) -> BoxFuture<'_, DomainResult<Message>> {
        let message = message.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            if !state.chats.contains_key(&message.chat_id) {
                return Err(DomainError::NotFound);
            }
            state
                .messages
                .entry(message.chat_id.clone())
                .or_default()
                .push(message.clone());
            Ok(message)
        })
    }

    fn list_visible(&self, chat_id: &str, viewer_id: &str) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let chat_id = chat_id.to_string();
        let viewer_id = viewer_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            let mut messages: Vec<Message> = state
                .messages
                .get(&chat_id)
                .map(|messages| {
                    messages
                        .iter()
                        .filter(|message| message.is_visible_to(&viewer_id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            chronological(&mut messages);
            Ok(messages)
        })
    }

    fn last_visible(&self, chat_id: &str, viewer_id: &str) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let chat_id = chat_id.to_string();
        let viewer_id = viewer_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state.messages.get(&chat_id).and_then(|messages| {
                messages
                    .iter()
                    .filter(|message| message.is_visible_to(&viewer_id))
                    .max_by(|a, b| {
                        a.created_at_ms
                            .cmp(&b.created_at_ms)
                            .then_with(|| a.message_id.cmp(&b.message_id))
                    })
                    .cloned()
            }))
        })
    }

    fn mark_read(
        &self,
        chat_id: &str,
        viewer_id: &str,
        kind: ChatKind,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let chat_id = chat_id.to_string();
        let viewer_id = viewer_id.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            Ok(state
                .messages
                .get_mut(&chat_id)
                .map(|messages| {
                    messages
                        .iter_mut()
                        .map(|message| message.mark_read_by(&viewer_id, kind))
                        .filter(|changed| *changed)
                        .count()
                })
                .unwrap_or_default())
        })
    }

    fn count_unread(
        &self,
        chat_id: &str,
        viewer_id: &str,
        kind: ChatKind,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let chat_id = chat_id.to_string();
        let viewer_id = viewer_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .messages
                .get(&chat_id)
                .map(|messages| {
                    messages
                        .iter()
                        .filter(|message| message.is_unread_for(&viewer_id, kind))
                        .count()
                })
                .unwrap_or_default())
        })
    }

    fn hide_all_for(&self, chat_id: &str, viewer_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let chat_id = chat_id.to_string();
        let viewer_id = viewer_id.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            Ok(state
                .messages
                .get_mut(&chat_id)
                .map(|messages| {
                    messages
                        .iter_mut()
                        .map(|message| push_unique(&mut message.deleted_by, &viewer_id))
                        .filter(|changed| *changed)
                        .count()
                })
                .unwrap_or_default())
        })
    }

    fn delete_all_messages(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let chat_id = chat_id.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            Ok(state
                .messages
                .remove(&chat_id)
                .map(|messages| messages.len())
                .unwrap_or_default())
        })
    }
}

const CHAT_FIELDS: &str =
    "chat_id, kind, name, member_ids, created_by, <string>created_at AS created_at";

const MESSAGE_FIELDS: &str = "message_id, chat_id, sender_id, body, attachment_url, is_read, \
     read_by, deleted_by, <string>created_at AS created_at";

/// Predicate shared by the unread count and the mark-read update.
fn unread_clause(kind: ChatKind) -> &'static str {
    match kind {
        ChatKind::Direct => {
            "chat_id = $chat_id AND sender_id != $viewer_id AND is_read = false \
             AND deleted_by CONTAINSNOT $viewer_id"
        }
        ChatKind::Community => {
            "chat_id = $chat_id AND sender_id != $viewer_id AND read_by CONTAINSNOT $viewer_id \
             AND deleted_by CONTAINSNOT $viewer_id"
        }
    }
}

#[derive(Debug, Deserialize)]
struct SurrealChatRow {
    chat_id: String,
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    member_ids: Vec<String>,
    created_by: String,
    created_at: String,
}

impl SurrealChatRow {
    fn into_chat(self) -> DomainResult<Chat> {
        Ok(Chat {
            kind: ChatKind::parse(&self.kind)
                .ok_or_else(|| DomainError::Storage(format!("unknown chat kind '{}'", self.kind)))?,
            created_at_ms: parse_datetime_ms(&self.created_at)?,
            chat_id: self.chat_id,
            name: self.name,
            member_ids: self.member_ids,
            created_by: self.created_by,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SurrealMessageRow {
    message_id: String,
    chat_id: String,
    sender_id: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    attachment_url: Option<String>,
    #[serde(default)]
    is_read: bool,
    #[serde(default)]
    read_by: Vec<String>,
    #[serde(default)]
    deleted_by: Vec<String>,
    created_at: String,
}

impl SurrealMessageRow {
    fn into_message(self) -> DomainResult<Message> {
        Ok(Message {
            created_at_ms: parse_datetime_ms(&self.created_at)?,
            message_id: self.message_id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            body: self.body,
            attachment_url: self.attachment_url,
            read: self.is_read,
            read_by: self.read_by,
            deleted_by: self.deleted_by,
        })
    }
}

#[derive(Clone)]
pub struct SurrealMessageRepository {
    client: SurrealClient,
}

impl SurrealMessageRepository {
    pub fn with_client(client: SurrealClient) -> Self {
        Self { client }
    }

    fn decode_chats(rows: Vec<Value>) -> DomainResult<Vec<Chat>> {
        decode_rows::<SurrealChatRow>(rows, "chat")?
            .into_iter()
            .map(SurrealChatRow::into_chat)
            .collect()
    }

    fn decode_messages(rows: Vec<Value>) -> DomainResult<Vec<Message>> {
        decode_rows::<SurrealMessageRow>(rows, "message")?
            .into_iter()
            .map(SurrealMessageRow::into_message)
            .collect()
    }

    /// Runs `sql` and decodes chats from statement `index`.
    async fn chats_at(&self, sql: String, params: Value, index: usize) -> DomainResult<Vec<Chat>> {
        let response = self
            .client
            .query(sql)
            .bind(params)
            .await
            .map_err(map_surreal_error)?;
        let mut response = check_response(response)?;
        Self::decode_chats(take_rows(&mut response, index)?)
    }

    async fn messages(&self, sql: String, params: Value) -> DomainResult<Vec<Message>> {
        let mut response = self
            .client
            .query(sql)
            .bind(params)
            .await
            .map_err(map_surreal_error)?;
        Self::decode_messages(take_rows(&mut response, 0)?)
    }

    async fn changed_ids(&self, sql: String, params: Value) -> DomainResult<usize> {
        let response = self
            .client
            .query(sql)
            .bind(params)
            .await
            .map_err(map_surreal_error)?;
        let mut response = check_response(response)?;
        let ids: Vec<String> = response.take(0).map_err(map_surreal_error)?;
        Ok(ids.len())
    }
}

impl MessageRepository for SurrealMessageRepository {
    fn create_chat(&self, chat: &Chat) -> BoxFuture<'_, DomainResult<Chat>> {
        let chat = chat.clone();
        Box::pin(async move {
            let direct_key = chat.direct_key();
            let create = "CREATE type::thing('chat', $chat_id) CONTENT { \
                 chat_id: $chat_id, kind: $kind, name: $name, member_ids: $member_ids, \
                 created_by: $created_by, created_at: <datetime>$created_at } RETURN NONE;";
            let sql = match direct_key {
                Some(_) => format!(
                    "BEGIN TRANSACTION;\n\
                     CREATE type::thing('chat_direct', $direct_key) CONTENT {{ chat_id: $chat_id }} RETURN NONE;\n\
                     {create}\n\
                     COMMIT TRANSACTION;"
                ),
                None => create.to_string(),
            };
            let response = self
                .client
                .query(sql)
                .bind(json!({
                    "chat_id": chat.chat_id,
                    "kind": chat.kind.as_str(),
                    "name": chat.name,
                    "member_ids": chat.member_ids,
                    "created_by": chat.created_by,
                    "created_at": to_rfc3339(chat.created_at_ms)?,
                    "direct_key": direct_key,
                }))
                .await
                .map_err(map_surreal_error)?;
            check_response(response)?;
            Ok(chat)
        })
    }

    fn get_chat(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let params = json!({ "chat_id": chat_id });
        Box::pin(async move {
            let mut chats = self
                .chats_at(
                    format!("SELECT {CHAT_FIELDS} FROM type::thing('chat', $chat_id)"),
                    params,
                    0,
                )
                .await?;
            Ok(chats.pop())
        })
    }

    fn find_direct_chat(&self, user_a: &str, user_b: &str) -> BoxFuture<'_, DomainResult<Option<Chat>>> {
        let params = json!({ "direct_key": direct_chat_key(user_a, user_b) });
        Box::pin(async move {
            let mut chats = self
                .chats_at(
                    format!(
                        "LET $linked = (SELECT VALUE chat_id FROM type::thing('chat_direct', $direct_key));\n\
                         SELECT {CHAT_FIELDS} FROM chat WHERE chat_id IN $linked;"
                    ),
                    params,
                    1,
                )
                .await?;
            Ok(chats.pop())
        })
    }

    fn add_member(&self, chat_id: &str, user_id: &str) -> BoxFuture<'_, DomainResult<Chat>> {
        let params = json!({ "chat_id": chat_id, "user_id": user_id });
        Box::pin(async move {
            let mut chats = self
                .chats_at(
                    format!(
                        "UPDATE type::thing('chat', $chat_id) \
                         SET member_ids = array::union(member_ids, [$user_id]) RETURN NONE;\n\
                         SELECT {CHAT_FIELDS} FROM type::thing('chat', $chat_id);"
                    ),
                    params,
                    1,
                )
                .await?;
            chats.pop().ok_or(DomainError::NotFound)
        })
    }

    fn list_chats_for_user(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<Chat>>> {
        let params = json!({ "user_id": user_id });
        Box::pin(async move {
            self.chats_at(
                format!(
                    "SELECT {CHAT_FIELDS} FROM chat WHERE member_ids CONTAINS $user_id \
                     ORDER BY created_at DESC"
                ),
                params,
                0,
            )
            .await
        })
    }

    fn create_message(&self, message: &Message) -> BoxFuture<'_, DomainResult<Message>> {
        let message = message.clone();
        Box::pin(async move {
            let response = self
                .client
                .query(
                    "CREATE type::thing('message', $message_id) CONTENT { \
                     message_id: $message_id, chat_id: $chat_id, sender_id: $sender_id, \
                     body: $body, attachment_url: $attachment_url, is_read: false, \
                     read_by: [], deleted_by: [], created_at: <datetime>$created_at \
                     } RETURN NONE",
                )
                .bind(json!({
                    "message_id": message.message_id,
                    "chat_id": message.chat_id,
                    "sender_id": message.sender_id,
                    "body": message.body,
                    "attachment_url": message.attachment_url,
                    "created_at": to_rfc3339(message.created_at_ms)?,
                }))
                .await
                .map_err(map_surreal_error)?;
            check_response(response)?;
            Ok(message)
        })
    }

    fn list_visible(&self, chat_id: &str, viewer_id: &str) -> BoxFuture<'_, DomainResult<Vec<Message>>> {
        let params = json!({ "chat_id": chat_id, "viewer_id": viewer_id });
        Box::pin(async move {
            self.messages(
                format!(
                    "SELECT {MESSAGE_FIELDS} FROM message \
                     WHERE chat_id = $chat_id AND deleted_by CONTAINSNOT $viewer_id \
                     ORDER BY created_at ASC, message_id ASC"
                ),
                params,
            )
            .await
        })
    }

    fn last_visible(&self, chat_id: &str, viewer_id: &str) -> BoxFuture<'_, DomainResult<Option<Message>>> {
        let params = json!({ "chat_id": chat_id, "viewer_id": viewer_id });
        Box::pin(async move {
            let mut messages = self
                .messages(
                    format!(
                        "SELECT {MESSAGE_FIELDS} FROM message \
                         WHERE chat_id = $chat_id AND deleted_by CONTAINSNOT $viewer_id \
                         ORDER BY created_at DESC, message_id DESC LIMIT 1"
                    ),
                    params,
                )
                .await?;
            Ok(messages.pop())
        })
    }

    fn mark_read(
        &self,
        chat_id: &str,
        viewer_id: &str,
        kind: ChatKind,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let params = json!({ "chat_id": chat_id, "viewer_id": viewer_id });
        let assignment = match kind {
            ChatKind::Direct => "is_read = true",
            ChatKind::Community => "read_by = array::union(read_by, [$viewer_id])",
        };
        Box::pin(async move {
            self.changed_ids(
                format!(
                    "UPDATE message SET {assignment} WHERE {} RETURN VALUE message_id",
                    unread_clause(kind)
                ),
                params,
            )
            .await
        })
    }

    fn count_unread(
        &self,
        chat_id: &str,
        viewer_id: &str,
        kind: ChatKind,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let params = json!({ "chat_id": chat_id, "viewer_id": viewer_id });
        Box::pin(async move {
            let mut response = self
                .client
                .query(format!(
                    "SELECT count() AS total FROM message WHERE {} GROUP ALL",
                    unread_clause(kind)
                ))
                .bind(params)
                .await
                .map_err(map_surreal_error)?;
            decode_count(take_rows(&mut response, 0)?, "total")
        })
    }

    fn hide_all_for(&self, chat_id: &str, viewer_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let params = json!({ "chat_id": chat_id, "viewer_id": viewer_id });
        Box::pin(async move {
            self.changed_ids(
                "UPDATE message SET deleted_by = array::union(deleted_by, [$viewer_id]) \
                 WHERE chat_id = $chat_id AND deleted_by CONTAINSNOT $viewer_id \
                 RETURN VALUE message_id"
                    .to_string(),
                params,
            )
            .await
        })
    }

    fn delete_all_messages(&self, chat_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let params = json!({ "chat_id": chat_id });
        Box::pin(async move {
            let response = self
                .client
                .query(
                    "LET $gone = (SELECT VALUE message_id FROM message WHERE chat_id = $chat_id);\n\
                     DELETE message WHERE chat_id = $chat_id RETURN NONE;\n\
                     RETURN array::len($gone);",
                )
                .bind(params)
                .await
                .map_err(map_surreal_error)?;
            let mut response = check_response(response)?;
            let removed: Option<i64> = response.take(2).map_err(map_surreal_error)?;
            Ok(removed.unwrap_or_default().max(0) as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(chat_id: &str, kind: ChatKind, members: &[&str]) -> Chat {
        Chat {
            chat_id: chat_id.to_string(),
            kind,
            name: None,
            member_ids: members.iter().map(|m| m.to_string()).collect(),
            created_by: members[0].to_string(),
            created_at_ms: 1,
        }
    }

    fn message(message_id: &str, chat_id: &str, sender: &str, at: i64) -> Message {
        Message {
            message_id: message_id.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender.to_string(),
            body: Some("hello".to_string()),
            attachment_url: None,
            read: false,
            read_by: vec![],
            deleted_by: vec![],
            created_at_ms: at,
        }
    }

    #[tokio::test]
    async fn direct_chat_pair_is_unique() {
        let repo = InMemoryMessageRepository::new();
        repo.create_chat(&chat("c-1", ChatKind::Direct, &["alice", "bob"]))
            .await
            .unwrap();
        let err = repo
            .create_chat(&chat("c-2", ChatKind::Direct, &["bob", "alice"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict));
        let found = repo.find_direct_chat("bob", "alice").await.unwrap().unwrap();
        assert_eq!(found.chat_id, "c-1");
    }

    #[tokio::test]
    async fn messages_are_ordered_by_time_then_id() {
        let repo = InMemoryMessageRepository::new();
        repo.create_chat(&chat("c-1", ChatKind::Direct, &["alice", "bob"]))
            .await
            .unwrap();
        for (id, at) in [("m-b", 5), ("m-a", 5), ("m-c", 1)] {
            repo.create_message(&message(id, "c-1", "alice", at)).await.unwrap();
        }
        let ids: Vec<_> = repo
            .list_visible("c-1", "bob")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec!["m-c", "m-a", "m-b"]);
        let last = repo.last_visible("c-1", "bob").await.unwrap().unwrap();
        assert_eq!(last.message_id, "m-b");
    }

    #[tokio::test]
    async fn clear_for_user_keeps_history_for_others() {
        let repo = InMemoryMessageRepository::new();
        repo.create_chat(&chat("c-1", ChatKind::Direct, &["alice", "bob"]))
            .await
            .unwrap();
        repo.create_message(&message("m-1", "c-1", "alice", 1)).await.unwrap();

        assert_eq!(repo.hide_all_for("c-1", "bob").await.unwrap(), 1);
        assert_eq!(repo.hide_all_for("c-1", "bob").await.unwrap(), 0);
        assert!(repo.list_visible("c-1", "bob").await.unwrap().is_empty());
        assert_eq!(repo.list_visible("c-1", "alice").await.unwrap().len(), 1);
        assert_eq!(repo.count_unread("c-1", "bob", ChatKind::Direct).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn community_read_markers_are_per_viewer() {
        let repo = InMemoryMessageRepository::new();
        repo.create_chat(&chat("c-1", ChatKind::Community, &["alice", "bob", "carol"]))
            .await
            .unwrap();
        repo.create_message(&message("m-1", "c-1", "alice", 1)).await.unwrap();
        repo.create_message(&message("m-2", "c-1", "bob", 2)).await.unwrap();

        assert_eq!(repo.count_unread("c-1", "carol", ChatKind::Community).await.unwrap(), 2);
        assert_eq!(repo.mark_read("c-1", "bob", ChatKind::Community).await.unwrap(), 1);
        assert_eq!(repo.count_unread("c-1", "bob", ChatKind::Community).await.unwrap(), 0);
        assert_eq!(repo.count_unread("c-1", "carol", ChatKind::Community).await.unwrap(), 2);
        assert_eq!(repo.delete_all_messages("c-1").await.unwrap(), 2);
        assert!(repo.last_visible("c-1", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn direct_mark_read_counts_only_peer_messages() {
        let repo = InMemoryMessageRepository::new();
        repo.create_chat(&chat("c-1", ChatKind::Direct, &["alice", "bob"]))
            .await
            .unwrap();
        repo.create_message(&message("m-1", "c-1", "alice", 1)).await.unwrap();
        repo.create_message(&message("m-2", "c-1", "alice", 2)).await.unwrap();
        repo.create_message(&message("m-3", "c-1", "bob", 3)).await.unwrap();

        assert_eq!(repo.count_unread("c-1", "bob", ChatKind::Direct).await.unwrap(), 2);
        assert_eq!(repo.mark_read("c-1", "bob", ChatKind::Direct).await.unwrap(), 2);
        assert_eq!(repo.mark_read("c-1", "bob", ChatKind::Direct).await.unwrap(), 0);
        assert_eq!(repo.count_unread("c-1", "bob", ChatKind::Direct).await.unwrap(), 0);
        assert_eq!(repo.count_unread("c-1", "alice", ChatKind::Direct).await.unwrap(), 1);
        assert_eq!(repo.mark_read("c-9", "bob", ChatKind::Direct).await.unwrap(), 0);
    }

    #[test]
    fn unread_clause_differs_by_chat_kind() {
        assert!(unread_clause(ChatKind::Direct).contains("is_read = false"));
        assert!(unread_clause(ChatKind::Community).contains("read_by CONTAINSNOT $viewer_id"));
    }
}
