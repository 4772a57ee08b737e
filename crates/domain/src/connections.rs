use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::notifications::{
    NotificationDraft, NotificationMatch, NotificationService, NotificationSubject,
    NotificationType, RecipientRef,
};
use crate::ports::connections::ConnectionRepository;
use crate::ports::users::UserRepository;
use crate::users::{RelationshipList, UserProfile, UserSummary};
use crate::util::{now_ms, pair_key, pull_all, push_unique, uuid_v7_without_dashes};

pub const FIRST_CONNECTION_ACHIEVEMENT: &str = "first_connection";

const MAX_RECOMMENDATIONS: usize = 50;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionAction {
    Accept,
    Reject,
    Cancel,
}

impl ConnectionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }

    fn allowed_for(&self, actor: &ActorIdentity, connection: &Connection) -> bool {
        match self {
            Self::Accept | Self::Reject => actor.is(&connection.receiver_id),
            Self::Cancel => actor.is(&connection.sender_id),
        }
    }
}

/// Resolves the status after `action`. `None` means the record is deleted.
pub fn next_status(
    current: ConnectionStatus,
    action: ConnectionAction,
) -> DomainResult<Option<ConnectionStatus>> {
    match (current, action) {
        (ConnectionStatus::Pending, ConnectionAction::Accept) => {
            Ok(Some(ConnectionStatus::Accepted))
        }
        (ConnectionStatus::Pending, ConnectionAction::Reject) => {
            Ok(Some(ConnectionStatus::Rejected))
        }
        (ConnectionStatus::Pending, ConnectionAction::Cancel) => Ok(None),
        (ConnectionStatus::Accepted | ConnectionStatus::Rejected, _) => Err(DomainError::Conflict),
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingDirection {
    Received,
    Sent,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub connection_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: ConnectionStatus,
    pub created_at_ms: i64,
    pub responded_at_ms: Option<i64>,
}

impl Connection {
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.sender_id == user_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    pub fn pending_key(&self) -> String {
        pending_pair_key(&self.sender_id, &self.receiver_id)
    }
}

/// Key shared by both directions of a pair. At most one pending record may
/// hold it at a time.
pub fn pending_pair_key(user_a: &str, user_b: &str) -> String {
    pair_key(user_a, user_b)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionWrite {
    Create(Connection),
    SetStatus {
        connection_id: String,
        expected: ConnectionStatus,
        status: ConnectionStatus,
        responded_at_ms: i64,
    },
    DeletePending {
        connection_id: String,
    },
    DeleteAll {
        connection_ids: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListOp {
    Add,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipEdit {
    pub user_id: String,
    pub list: RelationshipList,
    pub counterpart_id: String,
    pub op: ListOp,
}

impl RelationshipEdit {
    pub fn add(user_id: &str, list: RelationshipList, counterpart_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            list,
            counterpart_id: counterpart_id.to_string(),
            op: ListOp::Add,
        }
    }

    pub fn remove(user_id: &str, list: RelationshipList, counterpart_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            list,
            counterpart_id: counterpart_id.to_string(),
            op: ListOp::Remove,
        }
    }

    /// Set semantics: adding twice keeps one entry, removing strips all.
    pub fn apply(&self, profile: &mut UserProfile) -> bool {
        let list = profile.list_mut(self.list);
        match self.op {
            ListOp::Add => push_unique(list, &self.counterpart_id),
            ListOp::Remove => pull_all(list, &self.counterpart_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AchievementAward {
    pub user_id: String,
    pub achievement: String,
}

/// One atomic mutation of the social graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionChange {
    pub writes: Vec<ConnectionWrite>,
    pub edits: Vec<RelationshipEdit>,
    pub awards: Vec<AchievementAward>,
    pub updated_at_ms: i64,
}

impl ConnectionChange {
    fn new(updated_at_ms: i64) -> Self {
        Self {
            writes: Vec::new(),
            edits: Vec::new(),
            awards: Vec::new(),
            updated_at_ms,
        }
    }

    /// Every user the change touches, deduplicated in first-seen order.
    pub fn touched_users(&self) -> Vec<String> {
        let mut users = Vec::new();
        for edit in &self.edits {
            push_unique(&mut users, &edit.user_id);
        }
        for award in &self.awards {
            push_unique(&mut users, &award.user_id);
        }
        users
    }

    fn clear_pending(&mut self, connection: &Connection) {
        self.edits.push(RelationshipEdit::remove(
            &connection.sender_id,
            RelationshipList::Sent,
            &connection.receiver_id,
        ));
        self.edits.push(RelationshipEdit::remove(
            &connection.receiver_id,
            RelationshipList::Received,
            &connection.sender_id,
        ));
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingConnection {
    pub connection: Connection,
    pub counterpart: UserSummary,
}

#[derive(Clone)]
pub struct ConnectionService {
    users: Arc<dyn UserRepository>,
    connections: Arc<dyn ConnectionRepository>,
    notifications: NotificationService,
}

impl ConnectionService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        connections: Arc<dyn ConnectionRepository>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            users,
            connections,
            notifications,
        }
    }

    pub async fn send_request(
        &self,
        actor: &ActorIdentity,
        receiver_id: &str,
    ) -> DomainResult<Connection> {
        let receiver_id = receiver_id.trim();
        if receiver_id.is_empty() {
            return Err(DomainError::Validation("receiver_id is required".into()));
        }
        if actor.is(receiver_id) {
            return Err(DomainError::Validation(
                "cannot send a connection request to yourself".into(),
            ));
        }

        let sender = self.active_user(&actor.user_id).await?;
        let receiver = self.active_user(receiver_id).await?;
        if sender.is_connected_to(&receiver.user_id) {
            return Err(DomainError::Conflict);
        }
        if sender.is_pending_with(&receiver.user_id)
            || self
                .connections
                .find_pending_between(&sender.user_id, &receiver.user_id)
                .await?
                .is_some()
        {
            return Err(DomainError::Conflict);
        }

        let now = now_ms();
        let connection = Connection {
            connection_id: uuid_v7_without_dashes(),
            sender_id: sender.user_id.clone(),
            receiver_id: receiver.user_id.clone(),
            status: ConnectionStatus::Pending,
            created_at_ms: now,
            responded_at_ms: None,
        };
        let mut change = ConnectionChange::new(now);
        change.writes.push(ConnectionWrite::Create(connection.clone()));
        change.edits.push(RelationshipEdit::add(
            &sender.user_id,
            RelationshipList::Sent,
            &receiver.user_id,
        ));
        change.edits.push(RelationshipEdit::add(
            &receiver.user_id,
            RelationshipList::Received,
            &sender.user_id,
        ));
        self.connections.commit(&change).await?;

        tracing::info!(
            connection_id = %connection.connection_id,
            sender_id = %connection.sender_id,
            receiver_id = %connection.receiver_id,
            "connection requested"
        );
        self.notify(NotificationDraft {
            recipient: RecipientRef::UserId(connection.receiver_id.clone()),
            sender_id: connection.sender_id.clone(),
            notification_type: NotificationType::ConnectionRequest,
            subject: Some(NotificationSubject::connection(&connection.connection_id)),
        })
        .await;
        Ok(connection)
    }

    pub async fn accept(
        &self,
        actor: &ActorIdentity,
        connection_id: &str,
    ) -> DomainResult<Connection> {
        let connection = self
            .authorized(actor, connection_id, ConnectionAction::Accept)
            .await?;
        let status = next_status(connection.status, ConnectionAction::Accept)?
            .ok_or(DomainError::Conflict)?;

        let sender = self.existing_user(&connection.sender_id).await?;
        let receiver = self.existing_user(&connection.receiver_id).await?;

        let now = now_ms();
        let mut change = ConnectionChange::new(now);
        change.writes.push(ConnectionWrite::SetStatus {
            connection_id: connection.connection_id.clone(),
            expected: ConnectionStatus::Pending,
            status,
            responded_at_ms: now,
        });
        change.clear_pending(&connection);
        change.edits.push(RelationshipEdit::add(
            &sender.user_id,
            RelationshipList::Connections,
            &receiver.user_id,
        ));
        change.edits.push(RelationshipEdit::add(
            &receiver.user_id,
            RelationshipList::Connections,
            &sender.user_id,
        ));
        for party in [&sender, &receiver] {
            if earns_first_connection(party) {
                change.awards.push(AchievementAward {
                    user_id: party.user_id.clone(),
                    achievement: FIRST_CONNECTION_ACHIEVEMENT.to_string(),
                });
            }
        }
        self.connections.commit(&change).await?;

        tracing::info!(
            connection_id = %connection.connection_id,
            action = ConnectionAction::Accept.as_str(),
            "connection transitioned"
        );
        for award in &change.awards {
            let counterpart = if award.user_id == sender.user_id {
                &receiver.user_id
            } else {
                &sender.user_id
            };
            self.notify(NotificationDraft {
                recipient: RecipientRef::UserId(award.user_id.clone()),
                sender_id: counterpart.clone(),
                notification_type: NotificationType::AchievementCompleted,
                subject: Some(NotificationSubject::achievement(&award.achievement)),
            })
            .await;
        }
        self.notify(NotificationDraft {
            recipient: RecipientRef::UserId(connection.sender_id.clone()),
            sender_id: connection.receiver_id.clone(),
            notification_type: NotificationType::ConnectionAccepted,
            subject: Some(NotificationSubject::connection(&connection.connection_id)),
        })
        .await;

        Ok(Connection {
            status,
            responded_at_ms: Some(now),
            ..connection
        })
    }

    pub async fn reject(
        &self,
        actor: &ActorIdentity,
        connection_id: &str,
    ) -> DomainResult<Connection> {
        let connection = self
            .authorized(actor, connection_id, ConnectionAction::Reject)
            .await?;
        let status = next_status(connection.status, ConnectionAction::Reject)?
            .ok_or(DomainError::Conflict)?;

        let now = now_ms();
        let mut change = ConnectionChange::new(now);
        change.writes.push(ConnectionWrite::SetStatus {
            connection_id: connection.connection_id.clone(),
            expected: ConnectionStatus::Pending,
            status,
            responded_at_ms: now,
        });
        change.clear_pending(&connection);
        self.connections.commit(&change).await?;

        tracing::info!(
            connection_id = %connection.connection_id,
            action = ConnectionAction::Reject.as_str(),
            "connection transitioned"
        );
        self.retract_request(&connection).await;
        Ok(Connection {
            status,
            responded_at_ms: Some(now),
            ..connection
        })
    }

    pub async fn cancel(&self, actor: &ActorIdentity, connection_id: &str) -> DomainResult<()> {
        let connection = self
            .authorized(actor, connection_id, ConnectionAction::Cancel)
            .await?;
        if next_status(connection.status, ConnectionAction::Cancel)?.is_some() {
            return Err(DomainError::Conflict);
        }

        let mut change = ConnectionChange::new(now_ms());
        change.writes.push(ConnectionWrite::DeletePending {
            connection_id: connection.connection_id.clone(),
        });
        change.clear_pending(&connection);
        self.connections.commit(&change).await?;

        tracing::info!(
            connection_id = %connection.connection_id,
            action = ConnectionAction::Cancel.as_str(),
            "connection transitioned"
        );
        self.retract_request(&connection).await;
        Ok(())
    }

    /// Drops every record and list entry between the actor and
    /// `counterpart_id`. Returns the number of connection records deleted.
    pub async fn remove(&self, actor: &ActorIdentity, counterpart_id: &str) -> DomainResult<usize> {
        if actor.is(counterpart_id) {
            return Err(DomainError::Validation(
                "cannot remove a connection with yourself".into(),
            ));
        }
        let me = self.existing_user(&actor.user_id).await?;
        let counterpart = self.existing_user(counterpart_id).await?;
        let records = self
            .connections
            .list_between(&me.user_id, &counterpart.user_id)
            .await?;
        let linked = me.is_connected_to(&counterpart.user_id)
            || me.is_pending_with(&counterpart.user_id)
            || counterpart.is_connected_to(&me.user_id)
            || counterpart.is_pending_with(&me.user_id);
        if records.is_empty() && !linked {
            return Err(DomainError::NotFound);
        }

        let mut change = ConnectionChange::new(now_ms());
        if !records.is_empty() {
            change.writes.push(ConnectionWrite::DeleteAll {
                connection_ids: records
                    .iter()
                    .map(|record| record.connection_id.clone())
                    .collect(),
            });
        }
        for (owner, other) in [(&me, &counterpart), (&counterpart, &me)] {
            for list in [
                RelationshipList::Connections,
                RelationshipList::Sent,
                RelationshipList::Received,
            ] {
                change
                    .edits
                    .push(RelationshipEdit::remove(&owner.user_id, list, &other.user_id));
            }
        }
        self.connections.commit(&change).await?;

        tracing::info!(
            user_id = %me.user_id,
            counterpart_id = %counterpart.user_id,
            removed = records.len(),
            "connection removed"
        );
        Ok(records.len())
    }

    pub async fn list_received(&self, user_id: &str) -> DomainResult<Vec<PendingConnection>> {
        self.list_pending(user_id, PendingDirection::Received).await
    }

    pub async fn list_sent(&self, user_id: &str) -> DomainResult<Vec<PendingConnection>> {
        self.list_pending(user_id, PendingDirection::Sent).await
    }

    pub async fn list_connections(&self, user_id: &str) -> DomainResult<Vec<UserSummary>> {
        let me = self.existing_user(user_id).await?;
        let profiles = self.users.list_by_ids(&me.connections).await?;
        Ok(profiles.iter().map(UserProfile::summary).collect())
    }

    /// Friends of friends first, in discovery order. Falls back to any
    /// eligible active user when the graph yields nothing.
    pub async fn recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<UserSummary>> {
        let limit = limit.clamp(1, MAX_RECOMMENDATIONS);
        let me = self.existing_user(user_id).await?;

        let mut excluded: HashSet<&str> = HashSet::new();
        excluded.insert(me.user_id.as_str());
        excluded.extend(me.connections.iter().map(String::as_str));
        excluded.extend(me.connections_sent.iter().map(String::as_str));
        excluded.extend(me.connections_received.iter().map(String::as_str));

        let friends = self.users.list_by_ids(&me.connections).await?;
        let mut candidates = Vec::new();
        for friend in &friends {
            for candidate in &friend.connections {
                if !excluded.contains(candidate.as_str()) {
                    push_unique(&mut candidates, candidate);
                }
            }
        }

        let mut picks: Vec<UserSummary> = self
            .users
            .list_by_ids(&candidates)
            .await?
            .iter()
            .filter(|profile| profile.is_active())
            .take(limit)
            .map(UserProfile::summary)
            .collect();

        if picks.is_empty() {
            picks = self
                .users
                .list_active(limit + excluded.len())
                .await?
                .iter()
                .filter(|profile| !excluded.contains(profile.user_id.as_str()))
                .take(limit)
                .map(UserProfile::summary)
                .collect();
        }
        Ok(picks)
    }

    async fn list_pending(
        &self,
        user_id: &str,
        direction: PendingDirection,
    ) -> DomainResult<Vec<PendingConnection>> {
        let connections = self.connections.list_pending(user_id, direction).await?;
        let counterpart_ids: Vec<String> = connections
            .iter()
            .map(|connection| connection.counterpart_of(user_id).to_string())
            .collect();
        let profiles = self.users.list_by_ids(&counterpart_ids).await?;

        Ok(connections
            .into_iter()
            .filter_map(|connection| {
                let counterpart = profiles
                    .iter()
                    .find(|profile| profile.user_id == connection.counterpart_of(user_id))?
                    .summary();
                Some(PendingConnection {
                    connection,
                    counterpart,
                })
            })
            .collect())
    }

    async fn authorized(
        &self,
        actor: &ActorIdentity,
        connection_id: &str,
        action: ConnectionAction,
    ) -> DomainResult<Connection> {
        let connection = self
            .connections
            .get(connection_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if !action.allowed_for(actor, &connection) {
            return Err(DomainError::Forbidden(format!(
                "only the {} may {} this connection",
                match action {
                    ConnectionAction::Accept | ConnectionAction::Reject => "receiver",
                    ConnectionAction::Cancel => "sender",
                },
                action.as_str()
            )));
        }
        Ok(connection)
    }

    async fn existing_user(&self, user_id: &str) -> DomainResult<UserProfile> {
        self.users.get(user_id).await?.ok_or(DomainError::NotFound)
    }

    async fn active_user(&self, user_id: &str) -> DomainResult<UserProfile> {
        let profile = self.existing_user(user_id).await?;
        if !profile.is_active() {
            return Err(DomainError::NotFound);
        }
        Ok(profile)
    }

    async fn retract_request(&self, connection: &Connection) {
        let matching = NotificationMatch {
            recipient_id: connection.receiver_id.clone(),
            sender_id: connection.sender_id.clone(),
            notification_type: NotificationType::ConnectionRequest,
            subject_id: connection.connection_id.clone(),
            item_id: None,
        };
        if let Err(err) = self.notifications.delete(&matching).await {
            tracing::warn!(
                connection_id = %connection.connection_id,
                error = %err,
                "failed to retract connection request notification"
            );
        }
    }

    async fn notify(&self, draft: NotificationDraft) {
        let notification_type = draft.notification_type;
        if let Err(err) = self.notifications.add(draft).await {
            tracing::warn!(
                notification_type = notification_type.as_str(),
                error = %err,
                "failed to emit notification"
            );
        }
    }
}

fn earns_first_connection(profile: &UserProfile) -> bool {
    profile.connections.is_empty()
        && !profile
            .achievements
            .iter()
            .any(|code| code == FIRST_CONNECTION_ACHIEVEMENT)
}
