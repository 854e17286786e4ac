use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{CategoryId, ChannelId, ChannelKind, MessageId, ServerId, UserId},
    error::ApiError,
    model::{short_name, Category, Channel, MessageRecord, Reactions, ServerRecord},
};

use crate::{optimistic::EntityState, selection::ActiveSelection};

pub const PLACEHOLDER_CATEGORY_NAME: &str = "GENERAL";
pub const PLACEHOLDER_CHANNEL_NAME: &str = "general";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub state: EntityState<MessageId>,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub reply_to_id: Option<MessageId>,
    pub reactions: Reactions,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn key(&self) -> &str {
        self.state.key()
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }
}

impl From<MessageRecord> for ChatMessage {
    fn from(record: MessageRecord) -> Self {
        Self {
            state: EntityState::Confirmed { id: record.id },
            channel_id: record.channel_id,
            user_id: record.user_id,
            username: record.username,
            content: record.content,
            reply_to_id: record.reply_to_id,
            reactions: record.reactions,
            created_at: record.created_at,
            edited_at: record.edited_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatServer {
    pub state: EntityState<ServerId>,
    pub name: String,
    pub short_name: String,
    pub owner_id: UserId,
    pub icon_url: Option<String>,
    pub categories: Vec<Category>,
}

impl ChatServer {
    /// Stable handle used by the selection; pending servers are addressed by their temp id.
    pub fn key(&self) -> ServerId {
        ServerId::new(self.state.key())
    }

    pub fn first_channel(&self) -> Option<&Channel> {
        self.categories.iter().flat_map(|c| c.channels.iter()).next()
    }

    /// Channel opened when the server is picked: the head of the first category only.
    pub fn default_channel(&self) -> Option<&Channel> {
        self.categories.first().and_then(|c| c.channels.first())
    }

    pub fn contains_channel(&self, channel_id: &ChannelId) -> bool {
        self.categories
            .iter()
            .flat_map(|c| c.channels.iter())
            .any(|c| &c.id == channel_id)
    }

    pub(crate) fn from_record(record: ServerRecord, categories: Vec<Category>) -> Self {
        Self {
            short_name: short_name(&record.name),
            state: EntityState::Confirmed { id: record.id },
            name: record.name,
            owner_id: record.owner_id,
            icon_url: record.icon_url,
            categories,
        }
    }

    /// Optimistic stand-in shown until the server document exists.
    pub(crate) fn placeholder(
        state: EntityState<ServerId>,
        name: &str,
        owner_id: &UserId,
        icon_url: Option<String>,
    ) -> Self {
        let key = state.key().to_string();
        let category_id = CategoryId::new(format!("{key}-cat"));
        Self {
            state,
            name: name.to_string(),
            short_name: short_name(name),
            owner_id: owner_id.clone(),
            icon_url,
            categories: vec![Category {
                id: category_id.clone(),
                name: PLACEHOLDER_CATEGORY_NAME.to_string(),
                channels: vec![Channel {
                    id: ChannelId::new(format!("{key}-general")),
                    name: PLACEHOLDER_CHANNEL_NAME.to_string(),
                    kind: ChannelKind::Text,
                    category_id: Some(category_id),
                    position: 0,
                }],
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    SendMessage,
    EditMessage,
    DeleteMessage,
    AddReaction,
    RemoveReaction,
    CreateServer,
    LeaveServer,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::SendMessage => "send_message",
            MutationKind::EditMessage => "edit_message",
            MutationKind::DeleteMessage => "delete_message",
            MutationKind::AddReaction => "add_reaction",
            MutationKind::RemoveReaction => "remove_reaction",
            MutationKind::CreateServer => "create_server",
            MutationKind::LeaveServer => "leave_server",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ServersChanged,
    SelectionChanged(ActiveSelection),
    MessagesChanged {
        channel_id: ChannelId,
    },
    MutationFailed {
        operation: MutationKind,
        error: ApiError,
    },
    SubscriptionError {
        label: String,
        error: ApiError,
    },
}
