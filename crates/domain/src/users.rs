use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::users::UserRepository;
use crate::util::now_ms;

const MAX_DISPLAY_NAME_LENGTH: usize = 120;
const MAX_HEADLINE_LENGTH: usize = 280;
const ONE_LINK_MIN_LENGTH: usize = 3;
const ONE_LINK_MAX_LENGTH: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    Founder,
    Investor,
    Other,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Founder => "founder",
            Self::Investor => "investor",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "founder" => Some(Self::Founder),
            "investor" => Some(Self::Investor),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Deactivated,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deactivated => "deactivated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "deactivated" => Some(Self::Deactivated),
            _ => None,
        }
    }
}

/// The three per-user relationship lists kept in lockstep with connections.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipList {
    Connections,
    Sent,
    Received,
}

impl RelationshipList {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Connections => "connections",
            Self::Sent => "connections_sent",
            Self::Received => "connections_received",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub one_link: String,
    pub display_name: String,
    pub headline: Option<String>,
    pub kind: UserKind,
    pub status: UserStatus,
    pub connections: Vec<String>,
    pub connections_sent: Vec<String>,
    pub connections_received: Vec<String>,
    pub achievements: Vec<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl UserProfile {
    pub fn list_mut(&mut self, list: RelationshipList) -> &mut Vec<String> {
        match list {
            RelationshipList::Connections => &mut self.connections,
            RelationshipList::Sent => &mut self.connections_sent,
            RelationshipList::Received => &mut self.connections_received,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn is_connected_to(&self, user_id: &str) -> bool {
        self.connections.iter().any(|id| id == user_id)
    }

    pub fn is_pending_with(&self, user_id: &str) -> bool {
        self.connections_sent.iter().any(|id| id == user_id)
            || self.connections_received.iter().any(|id| id == user_id)
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_id: self.user_id.clone(),
            one_link: self.one_link.clone(),
            display_name: self.display_name.clone(),
            headline: self.headline.clone(),
            kind: self.kind.clone(),
        }
    }
}

/// Public projection used when populating counterpart profiles.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub user_id: String,
    pub one_link: String,
    pub display_name: String,
    pub headline: Option<String>,
    pub kind: UserKind,
}

#[derive(Clone, Debug)]
pub struct RegisterUserInput {
    pub one_link: String,
    pub display_name: String,
    pub headline: Option<String>,
    pub kind: UserKind,
}

#[derive(Clone, Debug, Default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    /// An empty string clears the headline.
    pub headline: Option<String>,
    pub kind: Option<UserKind>,
}

#[derive(Clone)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    pub async fn register(
        &self,
        actor: &ActorIdentity,
        input: RegisterUserInput,
    ) -> DomainResult<UserProfile> {
        let one_link = normalize_one_link(&input.one_link)?;
        let display_name = validate_display_name(&input.display_name)?;
        let headline = validate_headline(input.headline)?;

        if self.repository.get(&actor.user_id).await?.is_some() {
            return Err(DomainError::Conflict);
        }
        if self.repository.get_by_one_link(&one_link).await?.is_some() {
            return Err(DomainError::Conflict);
        }

        let now = now_ms();
        let profile = UserProfile {
            user_id: actor.user_id.clone(),
            one_link,
            display_name,
            headline,
            kind: input.kind,
            status: UserStatus::Active,
            connections: Vec::new(),
            connections_sent: Vec::new(),
            connections_received: Vec::new(),
            achievements: Vec::new(),
            created_at_ms: now,
            updated_at_ms: now,
        };
        let profile = self.repository.create(&profile).await?;
        tracing::info!(user_id = %profile.user_id, one_link = %profile.one_link, "user registered");
        Ok(profile)
    }

    pub async fn get(&self, user_id: &str) -> DomainResult<UserProfile> {
        self.repository
            .get(user_id)
            .await?
            .ok_or(DomainError::NotFound)
    }

    pub async fn resolve_one_link(&self, slug: &str) -> DomainResult<UserProfile> {
        let slug = normalize_one_link(slug)?;
        self.repository
            .get_by_one_link(&slug)
            .await?
            .ok_or(DomainError::NotFound)
    }

    pub async fn update_profile(
        &self,
        actor: &ActorIdentity,
        patch: ProfilePatch,
    ) -> DomainResult<UserProfile> {
        let mut profile = self.get(&actor.user_id).await?;
        if let Some(display_name) = patch.display_name {
            profile.display_name = validate_display_name(&display_name)?;
        }
        if let Some(headline) = patch.headline {
            profile.headline = validate_headline(Some(headline))?;
        }
        if let Some(kind) = patch.kind {
            profile.kind = kind;
        }
        profile.updated_at_ms = now_ms();
        self.repository.update_profile(&profile).await
    }

    pub async fn deactivate(&self, actor: &ActorIdentity) -> DomainResult<UserProfile> {
        let mut profile = self.get(&actor.user_id).await?;
        if profile.status == UserStatus::Deactivated {
            return Ok(profile);
        }
        profile.status = UserStatus::Deactivated;
        profile.updated_at_ms = now_ms();
        let profile = self.repository.update_profile(&profile).await?;
        tracing::info!(user_id = %profile.user_id, "user deactivated");
        Ok(profile)
    }

    pub async fn summaries(&self, user_ids: &[String]) -> DomainResult<Vec<UserSummary>> {
        let profiles = self.repository.list_by_ids(user_ids).await?;
        Ok(profiles.iter().map(UserProfile::summary).collect())
    }
}

pub fn normalize_one_link(value: &str) -> DomainResult<String> {
    let slug = value.trim().to_lowercase();
    let length = slug.chars().count();
    if !(ONE_LINK_MIN_LENGTH..=ONE_LINK_MAX_LENGTH).contains(&length) {
        return Err(DomainError::Validation(format!(
            "one_link must be between {ONE_LINK_MIN_LENGTH} and {ONE_LINK_MAX_LENGTH} characters"
        )));
    }
    if !slug
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
    {
        return Err(DomainError::Validation(
            "one_link may only contain a-z, 0-9 and '-'".into(),
        ));
    }
    Ok(slug)
}

fn validate_display_name(value: &str) -> DomainResult<String> {
    let name = value.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::Validation("display_name is required".into()));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "display_name exceeds max length of {MAX_DISPLAY_NAME_LENGTH}"
        )));
    }
    Ok(name)
}

fn validate_headline(value: Option<String>) -> DomainResult<Option<String>> {
    let Some(headline) = value else {
        return Ok(None);
    };
    let headline = headline.trim().to_string();
    if headline.is_empty() {
        return Ok(None);
    }
    if headline.chars().count() > MAX_HEADLINE_LENGTH {
        return Err(DomainError::Validation(format!(
            "headline exceeds max length of {MAX_HEADLINE_LENGTH}"
        )));
    }
    Ok(Some(headline))
}
