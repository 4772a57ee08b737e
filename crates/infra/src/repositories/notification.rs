use std::collections::HashMap;
use std::sync::Arc;

use founderhub_domain::DomainResult;
use founderhub_domain::error::DomainError;
use founderhub_domain::notifications::{
    Notification, NotificationMatch, NotificationSubject, NotificationType, SubjectKind, is_visible,
};
use founderhub_domain::ports::BoxFuture;
use founderhub_domain::ports::notifications::{
    NotificationRepository, NotificationRepositoryListQuery,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::surreal_support::{
    SurrealClient, check_response, decode_count, decode_rows, map_surreal_error,
    parse_datetime_ms, take_rows, to_rfc3339,
};

#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    store: Arc<RwLock<HashMap<String, Notification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn before_cursor(notification: &Notification, query: &NotificationRepositoryListQuery) -> bool {
    match (query.cursor_created_at_ms, query.cursor_notification_id.as_deref()) {
        (Some(at), Some(id)) => {
            (notification.created_at_ms, notification.notification_id.as_str()) < (at, id)
        }
        _ => true,
    }
}

impl NotificationRepository for InMemoryNotificationRepository {
    fn create(&self, notification: &Notification) -> BoxFuture<'_, DomainResult<Notification>> {
        let notification = notification.clone();
        Box::pin(async move {
            let mut store = self.store.write().await;
            if store.contains_key(&notification.notification_id) {
                return Err(DomainError::Conflict);
            }
            store.insert(notification.notification_id.clone(), notification.clone());
            Ok(notification)
        })
    }

    fn delete_matching(&self, matching: &NotificationMatch) -> BoxFuture<'_, DomainResult<usize>> {
        let matching = matching.clone();
        Box::pin(async move {
            let mut store = self.store.write().await;
            let before = store.len();
            store.retain(|_, notification| !matching.matches(notification));
            Ok(before - store.len())
        })
    }

    fn delete_by_subject(
        &self,
        kind: SubjectKind,
        subject_id: &str,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let subject_id = subject_id.to_string();
        Box::pin(async move {
            let mut store = self.store.write().await;
            let before = store.len();
            store.retain(|_, notification| {
                !notification
                    .subject
                    .as_ref()
                    .is_some_and(|subject| subject.kind == kind && subject.id == subject_id)
            });
            Ok(before - store.len())
        })
    }

    fn list_visible(
        &self,
        query: &NotificationRepositoryListQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>> {
        let query = query.clone();
        Box::pin(async move {
            let store = self.store.read().await;
            let mut items: Vec<Notification> = store
                .values()
                .filter(|n| n.recipient_id == query.user_id && is_visible(n))
                .filter(|n| before_cursor(n, &query))
                .cloned()
                .collect();
            items.sort_by(|a, b| {
                b.created_at_ms
                    .cmp(&a.created_at_ms)
                    .then_with(|| b.notification_id.cmp(&a.notification_id))
            });
            items.truncate(query.limit);
            Ok(items)
        })
    }

    fn count_unread_visible(&self, user_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            Ok(self
                .store
                .read()
                .await
                .values()
                .filter(|n| n.recipient_id == user_id && !n.is_read && is_visible(n))
                .count())
        })
    }

    fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> BoxFuture<'_, DomainResult<Notification>> {
        let user_id = user_id.to_string();
        let notification_id = notification_id.to_string();
        Box::pin(async move {
            let mut store = self.store.write().await;
            let notification = store
                .get_mut(&notification_id)
                .ok_or(DomainError::NotFound)?;
            if notification.recipient_id != user_id {
                return Err(DomainError::Forbidden(
                    "notification belongs to another user".into(),
                ));
            }
            notification.is_read = true;
            Ok(notification.clone())
        })
    }

    fn mark_all_read(&self, user_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let mut store = self.store.write().await;
            let mut changed = 0;
            for notification in store.values_mut() {
                if notification.recipient_id == user_id && !notification.is_read {
                    notification.is_read = true;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }
}

const NOTIFICATION_FIELDS: &str = "notification_id, recipient_id, sender_id, notification_type, \
     subject_kind, subject_id, subject_item_id, is_read, <string>created_at AS created_at";

#[derive(Debug, Deserialize)]
struct SurrealNotificationRow {
    notification_id: String,
    recipient_id: String,
    sender_id: String,
    notification_type: String,
    #[serde(default)]
    subject_kind: Option<String>,
    #[serde(default)]
    subject_id: Option<String>,
    #[serde(default)]
    subject_item_id: Option<String>,
    is_read: bool,
    created_at: String,
}

impl SurrealNotificationRow {
    fn into_notification(self) -> DomainResult<Notification> {
        let notification_type = NotificationType::parse(&self.notification_type).ok_or_else(|| {
            DomainError::Storage(format!(
                "unknown notification type '{}'",
                self.notification_type
            ))
        })?;
        let subject = match (self.subject_kind, self.subject_id) {
            (Some(kind), Some(id)) => Some(NotificationSubject {
                kind: SubjectKind::parse(&kind)
                    .ok_or_else(|| DomainError::Storage(format!("unknown subject kind '{kind}'")))?,
                id,
                item_id: self.subject_item_id,
            }),
            _ => None,
        };
        Ok(Notification {
            notification_id: self.notification_id,
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            notification_type,
            subject,
            is_read: self.is_read,
            created_at_ms: parse_datetime_ms(&self.created_at)?,
        })
    }
}

#[derive(Clone)]
pub struct SurrealNotificationRepository {
    client: SurrealClient,
}

impl SurrealNotificationRepository {
    pub fn with_client(client: SurrealClient) -> Self {
        Self { client }
    }

    /// Runs a LET/DELETE/RETURN script and reads the count from the RETURN.
    async fn delete_counted(&self, sql: String, params: Value) -> DomainResult<usize> {
        let response = self
            .client
            .query(sql)
            .bind(params)
            .await
            .map_err(map_surreal_error)?;
        let mut response = check_response(response)?;
        let removed: Option<i64> = response.take(2).map_err(map_surreal_error)?;
        Ok(removed.unwrap_or_default().max(0) as usize)
    }

    fn decode(rows: Vec<Value>) -> DomainResult<Vec<Notification>> {
        decode_rows::<SurrealNotificationRow>(rows, "notification")?
            .into_iter()
            .map(SurrealNotificationRow::into_notification)
            .collect()
    }
}

impl NotificationRepository for SurrealNotificationRepository {
    fn create(&self, notification: &Notification) -> BoxFuture<'_, DomainResult<Notification>> {
        let notification = notification.clone();
        Box::pin(async move {
            let params = json!({
                "notification_id": notification.notification_id,
                "recipient_id": notification.recipient_id,
                "sender_id": notification.sender_id,
                "notification_type": notification.notification_type.as_str(),
                "subject_kind": notification.subject.as_ref().map(|s| s.kind.as_str()),
                "subject_id": notification.subject.as_ref().map(|s| s.id.clone()),
                "subject_item_id": notification.subject.as_ref().and_then(|s| s.item_id.clone()),
                "has_subject": is_visible(&notification),
                "is_read": notification.is_read,
                "created_at": to_rfc3339(notification.created_at_ms)?,
            });
            let response = self
                .client
                .query(
                    "CREATE type::thing('notification', $notification_id) CONTENT { \
                     notification_id: $notification_id, recipient_id: $recipient_id, \
                     sender_id: $sender_id, notification_type: $notification_type, \
                     subject_kind: $subject_kind, subject_id: $subject_id, \
                     subject_item_id: $subject_item_id, has_subject: $has_subject, \
                     is_read: $is_read, created_at: <datetime>$created_at \
                     } RETURN NONE",
                )
                .bind(params)
                .await
                .map_err(map_surreal_error)?;
            check_response(response)?;
            Ok(notification)
        })
    }

    fn delete_matching(&self, matching: &NotificationMatch) -> BoxFuture<'_, DomainResult<usize>> {
        let item_clause = if matching.item_id.is_some() {
            "AND subject_item_id = $item_id"
        } else {
            ""
        };
        let sql = format!(
            "LET $matched = (SELECT VALUE notification_id FROM notification \
             WHERE recipient_id = $recipient_id AND sender_id = $sender_id \
             AND notification_type = $notification_type AND subject_id = $subject_id {item_clause});\n\
             DELETE notification WHERE notification_id IN $matched RETURN NONE;\n\
             RETURN array::len($matched);"
        );
        let params = json!({
            "recipient_id": matching.recipient_id,
            "sender_id": matching.sender_id,
            "notification_type": matching.notification_type.as_str(),
            "subject_id": matching.subject_id,
            "item_id": matching.item_id,
        });
        Box::pin(async move { self.delete_counted(sql, params).await })
    }

    fn delete_by_subject(
        &self,
        kind: SubjectKind,
        subject_id: &str,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let params = json!({ "subject_kind": kind.as_str(), "subject_id": subject_id });
        Box::pin(async move {
            self.delete_counted(
                "LET $matched = (SELECT VALUE notification_id FROM notification \
                 WHERE subject_kind = $subject_kind AND subject_id = $subject_id);\n\
                 DELETE notification WHERE notification_id IN $matched RETURN NONE;\n\
                 RETURN array::len($matched);"
                    .to_string(),
                params,
            )
            .await
        })
    }

    fn list_visible(
        &self,
        query: &NotificationRepositoryListQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>> {
        let query = query.clone();
        Box::pin(async move {
            let cursor = match (query.cursor_created_at_ms, query.cursor_notification_id.as_deref()) {
                (Some(at), Some(id)) => Some((to_rfc3339(at)?, id.to_string())),
                _ => None,
            };
            let cursor_clause = if cursor.is_some() {
                "AND (created_at < <datetime>$cursor_at \
                 OR (created_at = <datetime>$cursor_at AND notification_id < $cursor_id))"
            } else {
                ""
            };
            let (cursor_at, cursor_id) = cursor.unzip();
            let mut response = self
                .client
                .query(format!(
                    "SELECT {NOTIFICATION_FIELDS} FROM notification \
                     WHERE recipient_id = $user_id AND has_subject = true {cursor_clause} \
                     ORDER BY created_at DESC, notification_id DESC LIMIT $limit"
                ))
                .bind(json!({
                    "user_id": query.user_id,
                    "cursor_at": cursor_at,
                    "cursor_id": cursor_id,
                    "limit": query.limit,
                }))
                .await
                .map_err(map_surreal_error)?;
            Self::decode(take_rows(&mut response, 0)?)
        })
    }

    fn count_unread_visible(&self, user_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let mut response = self
                .client
                .query(
                    "SELECT count() AS total FROM notification \
                     WHERE recipient_id = $user_id AND is_read = false AND has_subject = true \
                     GROUP ALL",
                )
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            decode_count(take_rows(&mut response, 0)?, "total")
        })
    }

    fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> BoxFuture<'_, DomainResult<Notification>> {
        let params = json!({ "user_id": user_id, "notification_id": notification_id });
        Box::pin(async move {
            let response = self
                .client
                .query(format!(
                    "LET $row = (SELECT recipient_id FROM type::thing('notification', $notification_id));\n\
                     IF array::len($row) = 0 {{ THROW 'not_found:notification ' + $notification_id; }};\n\
                     IF $row[0].recipient_id != $user_id {{ THROW 'forbidden:notification belongs to another user'; }};\n\
                     UPDATE type::thing('notification', $notification_id) SET is_read = true RETURN NONE;\n\
                     SELECT {NOTIFICATION_FIELDS} FROM type::thing('notification', $notification_id);"
                ))
                .bind(params)
                .await
                .map_err(map_surreal_error)?;
            let mut response = check_response(response)?;
            Self::decode(take_rows(&mut response, 4)?)?
                .pop()
                .ok_or(DomainError::NotFound)
        })
    }

    fn mark_all_read(&self, user_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let mut response = self
                .client
                .query(
                    "UPDATE notification SET is_read = true \
                     WHERE recipient_id = $user_id AND is_read = false RETURN VALUE notification_id",
                )
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let changed: Vec<String> = response.take(0).map_err(map_surreal_error)?;
            Ok(changed.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(id: &str, recipient: &str, at: i64, subject: Option<NotificationSubject>) -> Notification {
        Notification {
            notification_id: id.to_string(),
            recipient_id: recipient.to_string(),
            sender_id: "bob".to_string(),
            notification_type: NotificationType::PostLiked,
            subject,
            is_read: false,
            created_at_ms: at,
        }
    }

    async fn seeded() -> InMemoryNotificationRepository {
        let repo = InMemoryNotificationRepository::new();
        for (id, at) in [("n-1", 10), ("n-2", 20), ("n-3", 20), ("n-4", 30)] {
            repo.create(&notification(id, "alice", at, Some(NotificationSubject::post("p-1"))))
                .await
                .expect("seed");
        }
        repo.create(&notification("n-5", "alice", 40, None))
            .await
            .expect("seed subjectless");
        repo.create(&notification("n-6", "carol", 50, Some(NotificationSubject::post("p-1"))))
            .await
            .expect("seed other recipient");
        repo
    }

    fn page(cursor: Option<(i64, &str)>, limit: usize) -> NotificationRepositoryListQuery {
        NotificationRepositoryListQuery {
            user_id: "alice".to_string(),
            cursor_created_at_ms: cursor.map(|(at, _)| at),
            cursor_notification_id: cursor.map(|(_, id)| id.to_string()),
            limit,
        }
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_cursor_stable() {
        let repo = seeded().await;
        let first = repo.list_visible(&page(None, 2)).await.unwrap();
        let ids: Vec<_> = first.iter().map(|n| n.notification_id.as_str()).collect();
        assert_eq!(ids, vec!["n-4", "n-3"]);

        let rest = repo.list_visible(&page(Some((20, "n-3")), 10)).await.unwrap();
        let ids: Vec<_> = rest.iter().map(|n| n.notification_id.as_str()).collect();
        assert_eq!(ids, vec!["n-2", "n-1"]);
    }

    #[tokio::test]
    async fn unread_count_matches_visible_listing() {
        let repo = seeded().await;
        let visible = repo.list_visible(&page(None, 100)).await.unwrap();
        assert_eq!(repo.count_unread_visible("alice").await.unwrap(), visible.len());

        repo.mark_read("alice", "n-1").await.unwrap();
        assert_eq!(repo.count_unread_visible("alice").await.unwrap(), 3);
        assert_eq!(repo.mark_all_read("alice").await.unwrap(), 4);
        assert_eq!(repo.count_unread_visible("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_read_rejects_other_recipient() {
        let repo = seeded().await;
        let err = repo.mark_read("alice", "n-6").await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        let err = repo.mark_read("alice", "missing").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[tokio::test]
    async fn delete_matching_requires_subject_match() {
        let repo = seeded().await;
        let removed = repo
            .delete_matching(&NotificationMatch {
                recipient_id: "alice".to_string(),
                sender_id: "bob".to_string(),
                notification_type: NotificationType::PostLiked,
                subject_id: "p-2".to_string(),
                item_id: None,
            })
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = repo
            .delete_matching(&NotificationMatch {
                recipient_id: "alice".to_string(),
                sender_id: "bob".to_string(),
                notification_type: NotificationType::PostLiked,
                subject_id: "p-1".to_string(),
                item_id: None,
            })
            .await
            .unwrap();
        assert_eq!(removed, 4);
    }

    #[tokio::test]
    async fn delete_by_subject_clears_every_sender() {
        let repo = seeded().await;
        let subject = NotificationSubject::post("p-1").with_item("cm-1");
        let mut comment = notification("n-7", "alice", 60, Some(subject));
        comment.sender_id = "dave".to_string();
        comment.notification_type = NotificationType::PostCommented;
        repo.create(&comment).await.unwrap();
        repo.create(&notification("n-8", "alice", 70, Some(NotificationSubject::post("p-2"))))
            .await
            .unwrap();

        assert_eq!(repo.delete_by_subject(SubjectKind::Post, "p-1").await.unwrap(), 6);
        let left: Vec<_> = repo
            .list_visible(&page(None, 10))
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.notification_id)
            .collect();
        assert_eq!(left, vec!["n-8"]);
        assert_eq!(repo.count_unread_visible("alice").await.unwrap(), 1);
    }
}
