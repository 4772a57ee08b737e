use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::messaging::MessageRepository;
use crate::ports::storage::{ObjectMetadata, ObjectStorage};
use crate::ports::users::UserRepository;
use crate::util::{content_digest, now_ms, pair_key, push_unique, uuid_v7_without_dashes};

const MAX_MESSAGE_LENGTH: usize = 4000;
const MAX_COMMUNITY_NAME_LENGTH: usize = 120;
pub const DEFAULT_ATTACHMENT_MAX_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Direct,
    Community,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Community => "community",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(Self::Direct),
            "community" => Some(Self::Community),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub chat_id: String,
    pub kind: ChatKind,
    pub name: Option<String>,
    pub member_ids: Vec<String>,
    pub created_by: String,
    pub created_at_ms: i64,
}

impl Chat {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|member| member == user_id)
    }

    /// Pair key for direct chats; `None` for communities.
    pub fn direct_key(&self) -> Option<String> {
        match (self.kind, self.member_ids.as_slice()) {
            (ChatKind::Direct, [a, b]) => Some(direct_chat_key(a, b)),
            _ => None,
        }
    }
}

pub fn direct_chat_key(user_a: &str, user_b: &str) -> String {
    pair_key(user_a, user_b)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub attachment_url: Option<String>,
    pub read: bool,
    pub read_by: Vec<String>,
    pub deleted_by: Vec<String>,
    pub created_at_ms: i64,
}

impl Message {
    pub fn is_visible_to(&self, viewer_id: &str) -> bool {
        !self.deleted_by.iter().any(|user| user == viewer_id)
    }

    /// Direct chats track a single `read` flag; communities track `read_by`.
    pub fn is_unread_for(&self, viewer_id: &str, kind: ChatKind) -> bool {
        if self.sender_id == viewer_id || !self.is_visible_to(viewer_id) {
            return false;
        }
        match kind {
            ChatKind::Direct => !self.read,
            ChatKind::Community => !self.read_by.iter().any(|user| user == viewer_id),
        }
    }

    /// Flips the read marker for `viewer`. Returns whether anything changed.
    pub fn mark_read_by(&mut self, viewer_id: &str, kind: ChatKind) -> bool {
        if !self.is_unread_for(viewer_id, kind) {
            return false;
        }
        match kind {
            ChatKind::Direct => {
                self.read = true;
                true
            }
            ChatKind::Community => push_unique(&mut self.read_by, viewer_id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct SendMessageInput {
    pub body: Option<String>,
    pub attachment: Option<AttachmentUpload>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatOverview {
    pub chat: Chat,
    pub last_message: Option<Message>,
    pub unread_count: usize,
}

#[derive(Clone)]
pub struct MessagingService {
    repository: Arc<dyn MessageRepository>,
    users: Arc<dyn UserRepository>,
    storage: Arc<dyn ObjectStorage>,
    attachment_max_bytes: usize,
}

impl MessagingService {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        users: Arc<dyn UserRepository>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            repository,
            users,
            storage,
            attachment_max_bytes: DEFAULT_ATTACHMENT_MAX_BYTES,
        }
    }

    pub fn with_attachment_limit(mut self, max_bytes: usize) -> Self {
        self.attachment_max_bytes = max_bytes;
        self
    }

    pub async fn open_direct_chat(&self, actor: &ActorIdentity, peer_id: &str) -> DomainResult<Chat> {
        if actor.is(peer_id) {
            return Err(DomainError::Validation(
                "cannot open a direct chat with yourself".into(),
            ));
        }
        self.users
            .get(peer_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if let Some(chat) = self
            .repository
            .find_direct_chat(&actor.user_id, peer_id)
            .await?
        {
            return Ok(chat);
        }

        let chat = Chat {
            chat_id: uuid_v7_without_dashes(),
            kind: ChatKind::Direct,
            name: None,
            member_ids: vec![actor.user_id.clone(), peer_id.to_string()],
            created_by: actor.user_id.clone(),
            created_at_ms: now_ms(),
        };
        match self.repository.create_chat(&chat).await {
            Ok(chat) => Ok(chat),
            Err(DomainError::Conflict) => self
                .repository
                .find_direct_chat(&actor.user_id, peer_id)
                .await?
                .ok_or(DomainError::Conflict),
            Err(err) => Err(err),
        }
    }

    pub async fn create_community(
        &self,
        actor: &ActorIdentity,
        name: &str,
        member_ids: &[String],
    ) -> DomainResult<Chat> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("name is required".into()));
        }
        if name.chars().count() > MAX_COMMUNITY_NAME_LENGTH {
            return Err(DomainError::Validation(format!(
                "name exceeds max length of {MAX_COMMUNITY_NAME_LENGTH}"
            )));
        }

        let mut members = vec![actor.user_id.clone()];
        for member in member_ids {
            push_unique(&mut members, member.trim());
        }
        let known = self.users.list_by_ids(&members[1..]).await?;
        if known.len() != members.len() - 1 {
            return Err(DomainError::NotFound);
        }

        let chat = Chat {
            chat_id: uuid_v7_without_dashes(),
            kind: ChatKind::Community,
            name: Some(name.to_string()),
            member_ids: members,
            created_by: actor.user_id.clone(),
            created_at_ms: now_ms(),
        };
        let chat = self.repository.create_chat(&chat).await?;
        tracing::info!(chat_id = %chat.chat_id, members = chat.member_ids.len(), "community created");
        Ok(chat)
    }

    pub async fn add_community_member(
        &self,
        actor: &ActorIdentity,
        chat_id: &str,
        user_id: &str,
    ) -> DomainResult<Chat> {
        let chat = self.member_chat(actor, chat_id).await?;
        if chat.kind != ChatKind::Community {
            return Err(DomainError::Validation(
                "members can only be added to community chats".into(),
            ));
        }
        self.users
            .get(user_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if chat.is_member(user_id) {
            return Ok(chat);
        }
        self.repository.add_member(chat_id, user_id).await
    }

    /// Uploads the attachment, if any, before the message is stored.
    pub async fn send(
        &self,
        actor: &ActorIdentity,
        chat_id: &str,
        input: SendMessageInput,
    ) -> DomainResult<Message> {
        let chat = self.member_chat(actor, chat_id).await?;
        let body = validate_body(input.body)?;
        if body.is_none() && input.attachment.is_none() {
            return Err(DomainError::Validation(
                "message requires a body or an attachment".into(),
            ));
        }

        let attachment_url = match input.attachment {
            Some(attachment) => Some(self.upload_attachment(&chat, attachment).await?),
            None => None,
        };

        let message = Message {
            message_id: uuid_v7_without_dashes(),
            chat_id: chat.chat_id.clone(),
            sender_id: actor.user_id.clone(),
            body,
            attachment_url,
            read: false,
            read_by: Vec::new(),
            deleted_by: Vec::new(),
            created_at_ms: now_ms(),
        };
        self.repository.create_message(&message).await
    }

    pub async fn mark_read(&self, actor: &ActorIdentity, chat_id: &str) -> DomainResult<usize> {
        let chat = self.member_chat(actor, chat_id).await?;
        self.repository
            .mark_read(&chat.chat_id, &actor.user_id, chat.kind)
            .await
    }

    pub async fn unread_count(&self, actor: &ActorIdentity, chat_id: &str) -> DomainResult<usize> {
        let chat = self.member_chat(actor, chat_id).await?;
        self.repository
            .count_unread(&chat.chat_id, &actor.user_id, chat.kind)
            .await
    }

    /// Hides the history for the actor only; other members keep it.
    pub async fn clear_for_user(&self, actor: &ActorIdentity, chat_id: &str) -> DomainResult<usize> {
        let chat = self.member_chat(actor, chat_id).await?;
        self.repository
            .hide_all_for(&chat.chat_id, &actor.user_id)
            .await
    }

    pub async fn get_messages(
        &self,
        actor: &ActorIdentity,
        chat_id: &str,
    ) -> DomainResult<Vec<Message>> {
        let chat = self.member_chat(actor, chat_id).await?;
        self.repository
            .list_visible(&chat.chat_id, &actor.user_id)
            .await
    }

    /// Hard-deletes the whole history.
    pub async fn clear_chat(&self, actor: &ActorIdentity, chat_id: &str) -> DomainResult<usize> {
        let chat = self.member_chat(actor, chat_id).await?;
        let allowed = match chat.kind {
            ChatKind::Direct => true,
            ChatKind::Community => actor.is(&chat.created_by) || actor.role.is_admin(),
        };
        if !allowed {
            return Err(DomainError::Forbidden(
                "only the community creator may clear its history".into(),
            ));
        }
        let removed = self.repository.delete_all_messages(&chat.chat_id).await?;
        tracing::info!(chat_id = %chat.chat_id, removed, "chat history cleared");
        Ok(removed)
    }

    pub async fn list_chats(&self, actor: &ActorIdentity) -> DomainResult<Vec<ChatOverview>> {
        let chats = self.repository.list_chats_for_user(&actor.user_id).await?;
        let viewer = actor.user_id.as_str();
        let mut overviews = try_join_all(chats.into_iter().map(|chat| async move {
            let (last_message, unread_count) = futures_util::try_join!(
                self.repository.last_visible(&chat.chat_id, viewer),
                self.repository.count_unread(&chat.chat_id, viewer, chat.kind),
            )?;
            Ok::<_, DomainError>(ChatOverview {
                chat,
                last_message,
                unread_count,
            })
        }))
        .await?;
        overviews.sort_by(|a, b| last_activity(b).cmp(&last_activity(a)));
        Ok(overviews)
    }

    async fn member_chat(&self, actor: &ActorIdentity, chat_id: &str) -> DomainResult<Chat> {
        let chat = self
            .repository
            .get_chat(chat_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if !chat.is_member(&actor.user_id) {
            return Err(DomainError::Forbidden("not a member of this chat".into()));
        }
        Ok(chat)
    }

    async fn upload_attachment(
        &self,
        chat: &Chat,
        attachment: AttachmentUpload,
    ) -> DomainResult<String> {
        if attachment.bytes.is_empty() {
            return Err(DomainError::Validation("attachment is empty".into()));
        }
        if attachment.bytes.len() > self.attachment_max_bytes {
            return Err(DomainError::Validation(format!(
                "attachment exceeds {} bytes",
                self.attachment_max_bytes
            )));
        }
        let file_name = sanitize_file_name(&attachment.file_name);
        let metadata = ObjectMetadata {
            object_key: format!(
                "chats/{}/{}/{}",
                chat.chat_id,
                content_digest(&attachment.bytes),
                file_name
            ),
            file_name,
            content_type: attachment.content_type,
            size_bytes: attachment.bytes.len(),
        };
        self.storage.upload(&attachment.bytes, &metadata).await
    }
}

fn last_activity(overview: &ChatOverview) -> (i64, &str) {
    match &overview.last_message {
        Some(message) => (message.created_at_ms, message.message_id.as_str()),
        None => (overview.chat.created_at_ms, overview.chat.chat_id.as_str()),
    }
}

fn validate_body(body: Option<String>) -> DomainResult<Option<String>> {
    let Some(body) = body else {
        return Ok(None);
    };
    let body = body.trim().to_string();
    if body.is_empty() {
        return Ok(None);
    }
    if body.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(DomainError::Validation(format!(
            "message exceeds max length of {MAX_MESSAGE_LENGTH}"
        )));
    }
    Ok(Some(body))
}

fn sanitize_file_name(value: &str) -> String {
    let cleaned: String = value
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}
