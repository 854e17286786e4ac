use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        CategoryId, ChannelId, ChannelKind, InviteId, JobId, JobKind, MemberId, MessageId, Role,
        ServerId, UserId,
    },
    error::{ApiError, ApiResult, ErrorCode},
};

pub const DEFAULT_CATEGORY_ID: &str = "default-cat";
pub const DEFAULT_CATEGORY_NAME: &str = "CHANNELS";

/// Emoji -> users who reacted with it, in reaction order.
///
/// A key is only present while at least one user holds that reaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(BTreeMap<String, Vec<UserId>>);

impl Reactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the user already holds the reaction.
    pub fn add(&mut self, emoji: &str, user_id: &UserId) -> bool {
        let users = self.0.entry(emoji.to_string()).or_default();
        if users.contains(user_id) {
            return false;
        }
        users.push(user_id.clone());
        true
    }

    /// Returns false when there was nothing to remove.
    pub fn remove(&mut self, emoji: &str, user_id: &UserId) -> bool {
        let Some(users) = self.0.get_mut(emoji) else {
            return false;
        };
        let before = users.len();
        users.retain(|id| id != user_id);
        let removed = users.len() != before;
        if users.is_empty() {
            self.0.remove(emoji);
        }
        removed
    }

    pub fn users(&self, emoji: &str) -> &[UserId] {
        self.0.get(emoji).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn count(&self, emoji: &str) -> usize {
        self.users(emoji).len()
    }

    pub fn has_reacted(&self, emoji: &str, user_id: &UserId) -> bool {
        self.users(emoji).contains(user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn emojis(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Drops empty entries that may arrive from loosely written documents.
    pub fn normalized(mut self) -> Self {
        self.0.retain(|_, users| !users.is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub reactions: Reactions,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: ServerId,
    pub name: String,
    pub owner_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: CategoryId,
    pub server_id: ServerId,
    pub name: String,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub server_id: ServerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub kind: ChannelKind,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Live-query result for one server's channel tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelDirectory {
    pub categories: Vec<CategoryRecord>,
    pub channels: Vec<ChannelRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMemberRecord {
    pub id: MemberId,
    pub server_id: ServerId,
    pub user_id: UserId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteRecord {
    pub id: InviteId,
    pub code: String,
    pub server_id: ServerId,
    pub server_name: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    pub uses: u32,
}

impl InviteRecord {
    /// A max-uses of zero is treated as unlimited.
    pub fn check_usable(&self, now: DateTime<Utc>) -> ApiResult<()> {
        if self.expires_at.is_some_and(|expires_at| expires_at < now) {
            return Err(ApiError::new(ErrorCode::Expired, "Invite expired"));
        }
        if let Some(max_uses) = self.max_uses.filter(|max| *max > 0) {
            if self.uses >= max_uses {
                return Err(ApiError::new(ErrorCode::MaxUses, "Invite limit reached"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvite {
    pub code: String,
    pub server_id: ServerId,
    pub server_name: String,
    pub created_by: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub email: String,
    pub nickname: String,
    pub avatar_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// `Some(None)` clears the stored photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_color: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none() && self.photo_url.is_none() && self.avatar_color.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    pub company: String,
    pub location: String,
    pub kind: JobKind,
    pub tags: Vec<String>,
    pub salary: String,
    pub description: String,
    pub posted_at: DateTime<Utc>,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub title: String,
    pub company: String,
    pub location: String,
    pub kind: JobKind,
    pub salary: String,
    pub description: String,
    pub contact: String,
    pub education_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub channels: Vec<Channel>,
}

/// Groups a channel directory into ordered categories.
///
/// Channels with no (or an unknown) category land in a trailing `CHANNELS`
/// category, which is omitted when empty.
pub fn arrange_categories(directory: &ChannelDirectory) -> Vec<Category> {
    let mut categories = directory.categories.clone();
    categories.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));

    let mut channels = directory.channels.clone();
    channels.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));

    let mut arranged: Vec<Category> = categories
        .iter()
        .map(|category| Category {
            id: category.id.clone(),
            name: category.name.clone(),
            channels: Vec::new(),
        })
        .collect();
    let mut uncategorized = Vec::new();

    for channel in channels {
        let view = Channel {
            id: channel.id.clone(),
            name: channel.name.clone(),
            kind: channel.kind,
            category_id: channel.category_id.clone(),
            position: channel.position,
        };
        let slot = channel
            .category_id
            .as_ref()
            .and_then(|category_id| arranged.iter_mut().find(|c| &c.id == category_id));
        match slot {
            Some(category) => category.channels.push(view),
            None => uncategorized.push(view),
        }
    }

    if !uncategorized.is_empty() {
        arranged.push(Category {
            id: CategoryId::new(DEFAULT_CATEGORY_ID),
            name: DEFAULT_CATEGORY_NAME.to_string(),
            channels: uncategorized,
        });
    }
    arranged
}

/// Two-letter badge shown when a server has no icon.
pub fn short_name(name: &str) -> String {
    name.trim().chars().take(2).collect::<String>().to_uppercase()
}
