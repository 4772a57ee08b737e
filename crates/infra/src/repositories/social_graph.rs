use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use founderhub_domain::DomainResult;
use founderhub_domain::connections::{
    Connection, ConnectionChange, ConnectionStatus, ConnectionWrite, ListOp, PendingDirection,
    pending_pair_key,
};
use founderhub_domain::error::DomainError;
use founderhub_domain::ports::BoxFuture;
use founderhub_domain::ports::connections::ConnectionRepository;
use founderhub_domain::ports::users::UserRepository;
use founderhub_domain::users::{UserKind, UserProfile, UserStatus};
use founderhub_domain::util::push_unique;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;

use super::surreal_support::{
    SurrealClient, check_response, decode_rows, map_surreal_error, parse_datetime_ms,
    parse_optional_datetime_ms, take_rows, to_rfc3339,
};

#[derive(Default)]
struct GraphState {
    users: HashMap<String, UserProfile>,
    one_links: HashMap<String, String>,
    connections: HashMap<String, Connection>,
    pending: HashMap<String, String>,
}

/// Users and connections behind one lock so a `ConnectionChange` is applied
/// as a single step.
#[derive(Clone, Default)]
pub struct InMemorySocialGraph {
    state: Arc<RwLock<GraphState>>,
}

impl InMemorySocialGraph {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Fully computed result of a change, built without touching the state.
struct StagedChange {
    upserts: Vec<Connection>,
    deletes: Vec<String>,
    pending_insert: Vec<(String, String)>,
    pending_remove: Vec<String>,
    users: Vec<UserProfile>,
}

fn stage(state: &GraphState, change: &ConnectionChange) -> DomainResult<StagedChange> {
    let mut staged = StagedChange {
        upserts: Vec::new(),
        deletes: Vec::new(),
        pending_insert: Vec::new(),
        pending_remove: Vec::new(),
        users: Vec::new(),
    };

    for write in &change.writes {
        match write {
            ConnectionWrite::Create(connection) => {
                let key = connection.pending_key();
                if state.pending.contains_key(&key)
                    || staged.pending_insert.iter().any(|(staged_key, _)| *staged_key == key)
                {
                    return Err(DomainError::Conflict);
                }
                staged
                    .pending_insert
                    .push((key, connection.connection_id.clone()));
                staged.upserts.push(connection.clone());
            }
            ConnectionWrite::SetStatus {
                connection_id,
                expected,
                status,
                responded_at_ms,
            } => {
                let current = state
                    .connections
                    .get(connection_id)
                    .ok_or(DomainError::NotFound)?;
                if current.status != *expected {
                    return Err(DomainError::Conflict);
                }
                if current.status == ConnectionStatus::Pending && *status != ConnectionStatus::Pending {
                    staged.pending_remove.push(current.pending_key());
                }
                staged.upserts.push(Connection {
                    status: *status,
                    responded_at_ms: Some(*responded_at_ms),
                    ..current.clone()
                });
            }
            ConnectionWrite::DeletePending { connection_id } => {
                let current = state
                    .connections
                    .get(connection_id)
                    .ok_or(DomainError::NotFound)?;
                if current.status != ConnectionStatus::Pending {
                    return Err(DomainError::Conflict);
                }
                staged.pending_remove.push(current.pending_key());
                staged.deletes.push(connection_id.clone());
            }
            ConnectionWrite::DeleteAll { connection_ids } => {
                for connection_id in connection_ids {
                    if let Some(current) = state.connections.get(connection_id) {
                        if current.status == ConnectionStatus::Pending {
                            staged.pending_remove.push(current.pending_key());
                        }
                        staged.deletes.push(connection_id.clone());
                    }
                }
            }
        }
    }

    for user_id in change.touched_users() {
        let mut profile = state
            .users
            .get(&user_id)
            .cloned()
            .ok_or(DomainError::NotFound)?;
        for edit in change.edits.iter().filter(|edit| edit.user_id == user_id) {
            edit.apply(&mut profile);
        }
        for award in change.awards.iter().filter(|award| award.user_id == user_id) {
            push_unique(&mut profile.achievements, &award.achievement);
        }
        profile.updated_at_ms = change.updated_at_ms;
        staged.users.push(profile);
    }
    Ok(staged)
}

impl UserRepository for InMemorySocialGraph {
    fn create(&self, user: &UserProfile) -> BoxFuture<'_, DomainResult<UserProfile>> {
        let user = user.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.users.contains_key(&user.user_id) || state.one_links.contains_key(&user.one_link)
            {
                return Err(DomainError::Conflict);
            }
            state
                .one_links
                .insert(user.one_link.clone(), user.user_id.clone());
            state.users.insert(user.user_id.clone(), user.clone());
            Ok(user)
        })
    }

    fn get(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        Box::pin(async move { Ok(self.state.read().await.users.get(&user_id).cloned()) })
    }

    fn get_by_one_link(&self, one_link: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let one_link = one_link.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .one_links
                .get(&one_link)
                .and_then(|user_id| state.users.get(user_id))
                .cloned())
        })
    }

    fn list_by_ids(&self, user_ids: &[String]) -> BoxFuture<'_, DomainResult<Vec<UserProfile>>> {
        let user_ids = user_ids.to_vec();
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(user_ids
                .iter()
                .filter_map(|user_id| state.users.get(user_id).cloned())
                .collect())
        })
    }

    fn update_profile(&self, user: &UserProfile) -> BoxFuture<'_, DomainResult<UserProfile>> {
        let user = user.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let stored = state
                .users
                .get_mut(&user.user_id)
                .ok_or(DomainError::NotFound)?;
            stored.display_name = user.display_name;
            stored.headline = user.headline;
            stored.kind = user.kind;
            stored.status = user.status;
            stored.updated_at_ms = user.updated_at_ms;
            Ok(stored.clone())
        })
    }

    fn list_active(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<UserProfile>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut users: Vec<UserProfile> = state
                .users
                .values()
                .filter(|user| user.is_active())
                .cloned()
                .collect();
            users.sort_by(|a, b| {
                a.created_at_ms
                    .cmp(&b.created_at_ms)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            });
            users.truncate(limit);
            Ok(users)
        })
    }
}

impl ConnectionRepository for InMemorySocialGraph {
    fn get(&self, connection_id: &str) -> BoxFuture<'_, DomainResult<Option<Connection>>> {
        let connection_id = connection_id.to_string();
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .connections
                .get(&connection_id)
                .cloned())
        })
    }

    fn find_pending_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Connection>>> {
        let key = pending_pair_key(user_a, user_b);
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .pending
                .get(&key)
                .and_then(|connection_id| state.connections.get(connection_id))
                .cloned())
        })
    }

    fn list_between(&self, user_a: &str, user_b: &str) -> BoxFuture<'_, DomainResult<Vec<Connection>>> {
        let key = pending_pair_key(user_a, user_b);
        Box::pin(async move {
            let state = self.state.read().await;
            let mut records: Vec<Connection> = state
                .connections
                .values()
                .filter(|connection| connection.pending_key() == key)
                .cloned()
                .collect();
            records.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms));
            Ok(records)
        })
    }

    fn list_pending(
        &self,
        user_id: &str,
        direction: PendingDirection,
    ) -> BoxFuture<'_, DomainResult<Vec<Connection>>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            let mut records: Vec<Connection> = state
                .connections
                .values()
                .filter(|connection| connection.status == ConnectionStatus::Pending)
                .filter(|connection| match direction {
                    PendingDirection::Received => connection.receiver_id == user_id,
                    PendingDirection::Sent => connection.sender_id == user_id,
                })
                .cloned()
                .collect();
            records.sort_by(|a, b| {
                b.created_at_ms
                    .cmp(&a.created_at_ms)
                    .then_with(|| b.connection_id.cmp(&a.connection_id))
            });
            Ok(records)
        })
    }

    fn commit(&self, change: &ConnectionChange) -> BoxFuture<'_, DomainResult<()>> {
        let change = change.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let staged = stage(&state, &change)?;
            for key in staged.pending_remove {
                state.pending.remove(&key);
            }
            for connection_id in staged.deletes {
                state.connections.remove(&connection_id);
            }
            for (key, connection_id) in staged.pending_insert {
                state.pending.insert(key, connection_id);
            }
            for connection in staged.upserts {
                state
                    .connections
                    .insert(connection.connection_id.clone(), connection);
            }
            for profile in staged.users {
                state.users.insert(profile.user_id.clone(), profile);
            }
            Ok(())
        })
    }
}

const USER_FIELDS: &str = "user_id, one_link, display_name, headline, kind, status, \
     connections, connections_sent, connections_received, achievements, \
     <string>created_at AS created_at, <string>updated_at AS updated_at";

const CONNECTION_FIELDS: &str = "connection_id, sender_id, receiver_id, status, \
     <string>created_at AS created_at, \
     (IF responded_at != NONE THEN <string>responded_at ELSE NONE END) AS responded_at";

#[derive(Debug, Deserialize)]
struct SurrealUserRow {
    user_id: String,
    one_link: String,
    display_name: String,
    #[serde(default)]
    headline: Option<String>,
    kind: String,
    status: String,
    #[serde(default)]
    connections: Vec<String>,
    #[serde(default)]
    connections_sent: Vec<String>,
    #[serde(default)]
    connections_received: Vec<String>,
    #[serde(default)]
    achievements: Vec<String>,
    created_at: String,
    updated_at: String,
}

impl SurrealUserRow {
    fn into_profile(self) -> DomainResult<UserProfile> {
        Ok(UserProfile {
            kind: UserKind::parse(&self.kind)
                .ok_or_else(|| DomainError::Storage(format!("unknown user kind '{}'", self.kind)))?,
            status: UserStatus::parse(&self.status).ok_or_else(|| {
                DomainError::Storage(format!("unknown user status '{}'", self.status))
            })?,
            created_at_ms: parse_datetime_ms(&self.created_at)?,
            updated_at_ms: parse_datetime_ms(&self.updated_at)?,
            user_id: self.user_id,
            one_link: self.one_link,
            display_name: self.display_name,
            headline: self.headline,
            connections: self.connections,
            connections_sent: self.connections_sent,
            connections_received: self.connections_received,
            achievements: self.achievements,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SurrealConnectionRow {
    connection_id: String,
    sender_id: String,
    receiver_id: String,
    status: String,
    created_at: String,
    #[serde(default)]
    responded_at: Option<String>,
}

impl SurrealConnectionRow {
    fn into_connection(self) -> DomainResult<Connection> {
        Ok(Connection {
            status: ConnectionStatus::parse(&self.status).ok_or_else(|| {
                DomainError::Storage(format!("unknown connection status '{}'", self.status))
            })?,
            created_at_ms: parse_datetime_ms(&self.created_at)?,
            responded_at_ms: parse_optional_datetime_ms(self.responded_at.as_deref())?,
            connection_id: self.connection_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
        })
    }
}

#[derive(Clone)]
pub struct SurrealSocialGraph {
    client: SurrealClient,
}

impl SurrealSocialGraph {
    pub fn with_client(client: SurrealClient) -> Self {
        Self { client }
    }

    fn decode_users(rows: Vec<Value>) -> DomainResult<Vec<UserProfile>> {
        decode_rows::<SurrealUserRow>(rows, "user_profile")?
            .into_iter()
            .map(SurrealUserRow::into_profile)
            .collect()
    }

    fn decode_connections(rows: Vec<Value>) -> DomainResult<Vec<Connection>> {
        decode_rows::<SurrealConnectionRow>(rows, "connection")?
            .into_iter()
            .map(SurrealConnectionRow::into_connection)
            .collect()
    }

    async fn select_users(&self, sql: String, params: Value) -> DomainResult<Vec<UserProfile>> {
        let mut response = self
            .client
            .query(sql)
            .bind(params)
            .await
            .map_err(map_surreal_error)?;
        Self::decode_users(take_rows(&mut response, 0)?)
    }

    async fn select_connections(&self, sql: String, params: Value) -> DomainResult<Vec<Connection>> {
        let mut response = self
            .client
            .query(sql)
            .bind(params)
            .await
            .map_err(map_surreal_error)?;
        Self::decode_connections(take_rows(&mut response, 0)?)
    }
}

/// Renders a `ConnectionChange` as one SurrealQL transaction. Guards `THROW`
/// `not_found:`/`conflict:` so the whole transaction is cancelled.
pub(crate) fn transaction_script(change: &ConnectionChange) -> DomainResult<(String, Value)> {
    let mut sql = String::from("BEGIN TRANSACTION;\n");
    let mut params = Map::new();
    params.insert("updated_at".into(), json!(to_rfc3339(change.updated_at_ms)?));

    for (index, write) in change.writes.iter().enumerate() {
        let w = format!("w{index}");
        match write {
            ConnectionWrite::Create(connection) => {
                params.insert(format!("{w}_id"), json!(connection.connection_id));
                params.insert(format!("{w}_key"), json!(connection.pending_key()));
                params.insert(format!("{w}_sender"), json!(connection.sender_id));
                params.insert(format!("{w}_receiver"), json!(connection.receiver_id));
                params.insert(
                    format!("{w}_created_at"),
                    json!(to_rfc3339(connection.created_at_ms)?),
                );
                sql.push_str(&format!(
                    "CREATE type::thing('connection_pending', ${w}_key) CONTENT {{ connection_id: ${w}_id }} RETURN NONE;\n\
                     CREATE type::thing('connection', ${w}_id) CONTENT {{ \
                     connection_id: ${w}_id, sender_id: ${w}_sender, receiver_id: ${w}_receiver, \
                     pair_key: ${w}_key, status: 'pending', created_at: <datetime>${w}_created_at \
                     }} RETURN NONE;\n"
                ));
            }
            ConnectionWrite::SetStatus {
                connection_id,
                expected,
                status,
                responded_at_ms,
            } => {
                params.insert(format!("{w}_id"), json!(connection_id));
                params.insert(format!("{w}_expected"), json!(expected.as_str()));
                params.insert(format!("{w}_status"), json!(status.as_str()));
                params.insert(
                    format!("{w}_responded_at"),
                    json!(to_rfc3339(*responded_at_ms)?),
                );
                sql.push_str(&format!(
                    "LET ${w}_rows = (SELECT status, pair_key FROM type::thing('connection', ${w}_id));\n\
                     IF array::len(${w}_rows) = 0 {{ THROW 'not_found:connection ' + ${w}_id; }};\n\
                     IF ${w}_rows[0].status != ${w}_expected {{ THROW 'conflict:connection status changed'; }};\n\
                     UPDATE type::thing('connection', ${w}_id) SET status = ${w}_status, \
                     responded_at = <datetime>${w}_responded_at RETURN NONE;\n\
                     IF ${w}_expected = 'pending' {{ DELETE type::thing('connection_pending', ${w}_rows[0].pair_key); }};\n"
                ));
            }
            ConnectionWrite::DeletePending { connection_id } => {
                params.insert(format!("{w}_id"), json!(connection_id));
                sql.push_str(&format!(
                    "LET ${w}_rows = (SELECT status, pair_key FROM type::thing('connection', ${w}_id));\n\
                     IF array::len(${w}_rows) = 0 {{ THROW 'not_found:connection ' + ${w}_id; }};\n\
                     IF ${w}_rows[0].status != 'pending' {{ THROW 'conflict:connection is not pending'; }};\n\
                     DELETE type::thing('connection', ${w}_id);\n\
                     DELETE type::thing('connection_pending', ${w}_rows[0].pair_key);\n"
                ));
            }
            ConnectionWrite::DeleteAll { connection_ids } => {
                params.insert(format!("{w}_ids"), json!(connection_ids));
                sql.push_str(&format!(
                    "DELETE connection_pending WHERE connection_id IN ${w}_ids;\n\
                     DELETE connection WHERE connection_id IN ${w}_ids;\n"
                ));
            }
        }
    }

    for (index, user_id) in change.touched_users().iter().enumerate() {
        let u = format!("u{index}");
        params.insert(u.clone(), json!(user_id));
        sql.push_str(&format!(
            "IF array::len((SELECT user_id FROM type::thing('user_profile', ${u}))) = 0 \
             {{ THROW 'not_found:user ' + ${u}; }};\n"
        ));
        let mut assignments = Vec::new();
        for (edit_index, edit) in change
            .edits
            .iter()
            .filter(|edit| edit.user_id == *user_id)
            .enumerate()
        {
            let param = format!("{u}_e{edit_index}");
            params.insert(param.clone(), json!(edit.counterpart_id));
            let field = edit.list.field_name();
            assignments.push(match edit.op {
                ListOp::Add => format!("{field} = array::union({field} ?? [], [${param}])"),
                ListOp::Remove => format!("{field} = array::complement({field} ?? [], [${param}])"),
            });
        }
        for (award_index, award) in change
            .awards
            .iter()
            .filter(|award| award.user_id == *user_id)
            .enumerate()
        {
            let param = format!("{u}_a{award_index}");
            params.insert(param.clone(), json!(award.achievement));
            assignments.push(format!(
                "achievements = array::union(achievements ?? [], [${param}])"
            ));
        }
        assignments.push("updated_at = <datetime>$updated_at".to_string());
        // One UPDATE per assignment keeps repeated edits of the same list ordered.
        for assignment in assignments {
            sql.push_str(&format!(
                "UPDATE type::thing('user_profile', ${u}) SET {assignment} RETURN NONE;\n"
            ));
        }
    }

    sql.push_str("COMMIT TRANSACTION;");
    Ok((sql, Value::Object(params)))
}

impl UserRepository for SurrealSocialGraph {
    fn create(&self, user: &UserProfile) -> BoxFuture<'_, DomainResult<UserProfile>> {
        let user = user.clone();
        Box::pin(async move {
            let params = json!({
                "user_id": user.user_id,
                "one_link": user.one_link,
                "display_name": user.display_name,
                "headline": user.headline,
                "kind": user.kind.as_str(),
                "status": user.status.as_str(),
                "created_at": to_rfc3339(user.created_at_ms)?,
                "updated_at": to_rfc3339(user.updated_at_ms)?,
            });
            let response = self
                .client
                .query(
                    "CREATE type::thing('user_profile', $user_id) CONTENT { \
                     user_id: $user_id, one_link: $one_link, display_name: $display_name, \
                     headline: $headline, kind: $kind, status: $status, \
                     connections: [], connections_sent: [], connections_received: [], achievements: [], \
                     created_at: <datetime>$created_at, updated_at: <datetime>$updated_at \
                     } RETURN NONE",
                )
                .bind(params)
                .await
                .map_err(map_surreal_error)?;
            check_response(response)?;
            Ok(user)
        })
    }

    fn get(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let mut users = self
                .select_users(
                    format!("SELECT {USER_FIELDS} FROM type::thing('user_profile', $user_id)"),
                    json!({ "user_id": user_id }),
                )
                .await?;
            Ok(users.pop())
        })
    }

    fn get_by_one_link(&self, one_link: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let one_link = one_link.to_string();
        Box::pin(async move {
            let mut users = self
                .select_users(
                    format!("SELECT {USER_FIELDS} FROM user_profile WHERE one_link = $one_link LIMIT 1"),
                    json!({ "one_link": one_link }),
                )
                .await?;
            Ok(users.pop())
        })
    }

    fn list_by_ids(&self, user_ids: &[String]) -> BoxFuture<'_, DomainResult<Vec<UserProfile>>> {
        let user_ids = user_ids.to_vec();
        Box::pin(async move {
            if user_ids.is_empty() {
                return Ok(Vec::new());
            }
            let users = self
                .select_users(
                    format!("SELECT {USER_FIELDS} FROM user_profile WHERE user_id IN $user_ids"),
                    json!({ "user_ids": user_ids }),
                )
                .await?;
            let mut by_id: HashMap<String, UserProfile> = users
                .into_iter()
                .map(|user| (user.user_id.clone(), user))
                .collect();
            let mut seen = HashSet::new();
            Ok(user_ids
                .iter()
                .filter(|user_id| seen.insert(user_id.as_str()))
                .filter_map(|user_id| by_id.remove(user_id))
                .collect())
        })
    }

    fn update_profile(&self, user: &UserProfile) -> BoxFuture<'_, DomainResult<UserProfile>> {
        let user = user.clone();
        Box::pin(async move {
            let params = json!({
                "user_id": user.user_id,
                "display_name": user.display_name,
                "headline": user.headline,
                "kind": user.kind.as_str(),
                "status": user.status.as_str(),
                "updated_at": to_rfc3339(user.updated_at_ms)?,
            });
            let response = self
                .client
                .query(format!(
                    "UPDATE type::thing('user_profile', $user_id) SET \
                     display_name = $display_name, headline = $headline, kind = $kind, \
                     status = $status, updated_at = <datetime>$updated_at RETURN NONE;\n\
                     SELECT {USER_FIELDS} FROM type::thing('user_profile', $user_id);"
                ))
                .bind(params)
                .await
                .map_err(map_surreal_error)?;
            let mut response = check_response(response)?;
            let mut users = Self::decode_users(take_rows(&mut response, 1)?)?;
            users.pop().ok_or(DomainError::NotFound)
        })
    }

    fn list_active(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<UserProfile>>> {
        Box::pin(async move {
            self.select_users(
                format!(
                    "SELECT {USER_FIELDS} FROM user_profile WHERE status = 'active' \
                     ORDER BY created_at ASC, user_id ASC LIMIT $limit"
                ),
                json!({ "limit": limit }),
            )
            .await
        })
    }
}

impl ConnectionRepository for SurrealSocialGraph {
    fn get(&self, connection_id: &str) -> BoxFuture<'_, DomainResult<Option<Connection>>> {
        let connection_id = connection_id.to_string();
        Box::pin(async move {
            let mut rows = self
                .select_connections(
                    format!("SELECT {CONNECTION_FIELDS} FROM type::thing('connection', $connection_id)"),
                    json!({ "connection_id": connection_id }),
                )
                .await?;
            Ok(rows.pop())
        })
    }

    fn find_pending_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> BoxFuture<'_, DomainResult<Option<Connection>>> {
        let key = pending_pair_key(user_a, user_b);
        Box::pin(async move {
            let mut rows = self
                .select_connections(
                    format!(
                        "SELECT {CONNECTION_FIELDS} FROM connection \
                         WHERE pair_key = $key AND status = 'pending' LIMIT 1"
                    ),
                    json!({ "key": key }),
                )
                .await?;
            Ok(rows.pop())
        })
    }

    fn list_between(&self, user_a: &str, user_b: &str) -> BoxFuture<'_, DomainResult<Vec<Connection>>> {
        let key = pending_pair_key(user_a, user_b);
        Box::pin(async move {
            self.select_connections(
                format!(
                    "SELECT {CONNECTION_FIELDS} FROM connection WHERE pair_key = $key \
                     ORDER BY created_at ASC"
                ),
                json!({ "key": key }),
            )
            .await
        })
    }

    fn list_pending(
        &self,
        user_id: &str,
        direction: PendingDirection,
    ) -> BoxFuture<'_, DomainResult<Vec<Connection>>> {
        let user_id = user_id.to_string();
        let side = match direction {
            PendingDirection::Received => "receiver_id",
            PendingDirection::Sent => "sender_id",
        };
        Box::pin(async move {
            self.select_connections(
                format!(
                    "SELECT {CONNECTION_FIELDS} FROM connection \
                     WHERE {side} = $user_id AND status = 'pending' \
                     ORDER BY created_at DESC, connection_id DESC"
                ),
                json!({ "user_id": user_id }),
            )
            .await
        })
    }

    fn commit(&self, change: &ConnectionChange) -> BoxFuture<'_, DomainResult<()>> {
        let script = transaction_script(change);
        Box::pin(async move {
            let (sql, params) = script?;
            let response = self
                .client
                .query(sql)
                .bind(params)
                .await
                .map_err(map_surreal_error)?;
            check_response(response)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use founderhub_domain::connections::{AchievementAward, RelationshipEdit};
    use founderhub_domain::users::RelationshipList;

    fn profile(user_id: &str, created_at_ms: i64) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            one_link: format!("{user_id}-co"),
            display_name: user_id.to_string(),
            headline: None,
            kind: UserKind::Investor,
            status: UserStatus::Active,
            connections: vec![],
            connections_sent: vec![],
            connections_received: vec![],
            achievements: vec![],
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    fn pending(connection_id: &str, sender: &str, receiver: &str) -> Connection {
        Connection {
            connection_id: connection_id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            status: ConnectionStatus::Pending,
            created_at_ms: 10,
            responded_at_ms: None,
        }
    }

    fn request_change(connection: &Connection) -> ConnectionChange {
        ConnectionChange {
            writes: vec![ConnectionWrite::Create(connection.clone())],
            edits: vec![
                RelationshipEdit::add(&connection.sender_id, RelationshipList::Sent, &connection.receiver_id),
                RelationshipEdit::add(
                    &connection.receiver_id,
                    RelationshipList::Received,
                    &connection.sender_id,
                ),
            ],
            awards: vec![],
            updated_at_ms: 20,
        }
    }

    async fn seeded(users: &[&str]) -> InMemorySocialGraph {
        let graph = InMemorySocialGraph::new();
        for (index, user_id) in users.iter().enumerate() {
            UserRepository::create(&graph, &profile(user_id, index as i64))
                .await
                .expect("seed");
        }
        graph
    }

    #[tokio::test]
    async fn one_link_is_unique() {
        let graph = seeded(&["alice"]).await;
        let mut clash = profile("bob", 5);
        clash.one_link = "alice-co".to_string();
        let err = UserRepository::create(&graph, &clash).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict));
        let found = graph.get_by_one_link("alice-co").await.unwrap().expect("alice");
        assert_eq!(found.user_id, "alice");
    }

    #[tokio::test]
    async fn pending_pair_is_unique_in_either_direction() {
        let graph = seeded(&["alice", "bob"]).await;
        graph
            .commit(&request_change(&pending("c-1", "alice", "bob")))
            .await
            .expect("first");
        let err = graph
            .commit(&request_change(&pending("c-2", "bob", "alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict));
        let found = graph
            .find_pending_between("bob", "alice")
            .await
            .unwrap()
            .expect("pending");
        assert_eq!(found.connection_id, "c-1");
    }

    #[tokio::test]
    async fn pairs_with_separator_ids_stay_distinct() {
        let graph = seeded(&["a", "a__b", "c", "b__c"]).await;
        graph
            .commit(&request_change(&pending("c-1", "a__b", "c")))
            .await
            .expect("first pair");
        graph
            .commit(&request_change(&pending("c-2", "a", "b__c")))
            .await
            .expect("second pair");

        let between: Vec<_> = graph
            .list_between("a", "b__c")
            .await
            .unwrap()
            .into_iter()
            .map(|connection| connection.connection_id)
            .collect();
        assert_eq!(between, vec!["c-2"]);
        let other = graph
            .find_pending_between("c", "a__b")
            .await
            .unwrap()
            .expect("pending");
        assert_eq!(other.connection_id, "c-1");
    }

    #[tokio::test]
    async fn commit_with_missing_user_changes_nothing() {
        let graph = seeded(&["alice"]).await;
        let err = graph
            .commit(&request_change(&pending("c-1", "alice", "ghost")))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));

        let alice = UserRepository::get(&graph, "alice").await.unwrap().expect("alice");
        assert!(alice.connections_sent.is_empty());
        assert!(ConnectionRepository::get(&graph, "c-1").await.unwrap().is_none());
        assert!(graph.find_pending_between("alice", "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_write_is_compare_and_swap() {
        let graph = seeded(&["alice", "bob"]).await;
        graph
            .commit(&request_change(&pending("c-1", "alice", "bob")))
            .await
            .expect("request");
        let accept = ConnectionChange {
            writes: vec![ConnectionWrite::SetStatus {
                connection_id: "c-1".to_string(),
                expected: ConnectionStatus::Pending,
                status: ConnectionStatus::Accepted,
                responded_at_ms: 30,
            }],
            edits: vec![
                RelationshipEdit::add("alice", RelationshipList::Connections, "bob"),
                RelationshipEdit::add("bob", RelationshipList::Connections, "alice"),
            ],
            awards: vec![AchievementAward {
                user_id: "alice".to_string(),
                achievement: "first_connection".to_string(),
            }],
            updated_at_ms: 30,
        };
        graph.commit(&accept).await.expect("accept");
        let err = graph.commit(&accept).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict));

        let alice = UserRepository::get(&graph, "alice").await.unwrap().expect("alice");
        assert_eq!(alice.connections, vec!["bob"]);
        assert_eq!(alice.achievements, vec!["first_connection"]);
        assert_eq!(alice.updated_at_ms, 30);
        assert!(graph.find_pending_between("alice", "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_ids_preserves_request_order() {
        let graph = seeded(&["alice", "bob", "carol"]).await;
        let ids = vec!["carol".to_string(), "ghost".to_string(), "alice".to_string()];
        let users = graph.list_by_ids(&ids).await.unwrap();
        let names: Vec<_> = users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(names, vec!["carol", "alice"]);
    }

    #[tokio::test]
    async fn update_profile_leaves_relationship_lists_alone() {
        let graph = seeded(&["alice", "bob"]).await;
        graph
            .commit(&request_change(&pending("c-1", "alice", "bob")))
            .await
            .expect("request");
        let mut patch = profile("alice", 0);
        patch.display_name = "Alice A.".to_string();
        patch.status = UserStatus::Deactivated;
        let updated = graph.update_profile(&patch).await.unwrap();
        assert_eq!(updated.display_name, "Alice A.");
        assert_eq!(updated.connections_sent, vec!["bob"]);

        let active = graph.list_active(10).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, "bob");
    }

    #[test]
    fn transaction_script_guards_every_touched_user() {
        let change = request_change(&pending("c-1", "alice", "bob"));
        let (sql, params) = transaction_script(&change).unwrap();
        assert!(sql.starts_with("BEGIN TRANSACTION;"));
        assert!(sql.ends_with("COMMIT TRANSACTION;"));
        assert!(sql.contains("CREATE type::thing('connection_pending', $w0_key)"));
        assert_eq!(sql.matches("THROW 'not_found:user '").count(), 2);
        assert!(sql.contains("connections_sent = array::union(connections_sent ?? [], [$u0_e0])"));
        assert_eq!(params["w0_key"], json!("5:alice:bob"));
        assert_eq!(params["u1"], json!("bob"));
    }
}
