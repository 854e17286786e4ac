use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{CategoryId, ChannelId, ChannelKind, InviteId, MemberId, MessageId, Role, ServerId, UserId},
    error::{ApiError, ApiResult, ErrorCode},
    model::{
        AuthUser, ChannelDirectory, InviteRecord, MessageRecord, NewInvite, NewMessage,
        ProfileUpdate, ServerMemberRecord, ServerRecord, UserProfile,
    },
};
use storage::{ReactionWrite, Storage};
use tracing::{debug, info};

mod offline;

pub use offline::OfflineDatabase;
pub use storage::{LiveQuery, SnapshotStream, SubscriptionHandle};

pub type SharedDatabase = Arc<dyn Database>;

/// Document-style persistence gateway consumed by the client store and services.
///
/// Subscriptions deliver the full result set after every relevant write and
/// stop delivering once their handle is released.
#[async_trait]
pub trait Database: Send + Sync {
    async fn health_check(&self) -> ApiResult<()>;

    async fn send_message(&self, message: &NewMessage) -> ApiResult<MessageId>;
    async fn update_message(&self, message_id: &MessageId, content: &str) -> ApiResult<()>;
    async fn delete_message(&self, message_id: &MessageId) -> ApiResult<()>;
    async fn add_reaction(&self, message_id: &MessageId, user_id: &UserId, emoji: &str) -> ApiResult<()>;
    async fn remove_reaction(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> ApiResult<()>;
    fn subscribe_channel_messages(&self, channel_id: &ChannelId) -> LiveQuery<Vec<MessageRecord>>;

    async fn create_server(&self, name: &str, owner_id: &UserId, icon_url: Option<&str>) -> ApiResult<ServerId>;
    async fn get_server(&self, server_id: &ServerId) -> ApiResult<ServerRecord>;
    async fn servers_owned_by(&self, owner_id: &UserId) -> ApiResult<Vec<ServerRecord>>;
    async fn create_category(&self, server_id: &ServerId, name: &str) -> ApiResult<CategoryId>;
    async fn create_channel(
        &self,
        server_id: &ServerId,
        name: &str,
        kind: ChannelKind,
        category_id: Option<&CategoryId>,
    ) -> ApiResult<ChannelId>;
    fn subscribe_user_servers(&self, user_id: &UserId) -> LiveQuery<Vec<ServerRecord>>;
    fn subscribe_server_channels(&self, server_id: &ServerId) -> LiveQuery<ChannelDirectory>;

    async fn add_member(&self, server_id: &ServerId, user_id: &UserId, role: Role) -> ApiResult<MemberId>;
    /// Succeeds when the membership is already gone.
    async fn remove_member(&self, server_id: &ServerId, user_id: &UserId) -> ApiResult<()>;
    async fn list_members(&self, server_id: &ServerId) -> ApiResult<Vec<ServerMemberRecord>>;

    async fn create_invite(&self, invite: &NewInvite) -> ApiResult<InviteRecord>;
    async fn find_invite(&self, code: &str) -> ApiResult<Option<InviteRecord>>;
    async fn record_invite_use(&self, invite_id: &InviteId) -> ApiResult<()>;

    async fn get_profile(&self, user_id: &UserId) -> ApiResult<Option<UserProfile>>;
    async fn create_profile(&self, profile: &UserProfile) -> ApiResult<()>;
    async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate) -> ApiResult<()>;
    async fn nickname_exists(&self, nickname: &str) -> ApiResult<bool>;

    async fn auth_user_by_email(&self, email: &str) -> ApiResult<Option<AuthUser>>;
    async fn create_auth_user(&self, user: &AuthUser) -> ApiResult<()>;
    async fn record_login(&self, user_id: &UserId, at: DateTime<Utc>) -> ApiResult<()>;
}

#[async_trait]
impl Database for Storage {
    async fn health_check(&self) -> ApiResult<()> {
        Storage::health_check(self)
            .await
            .map_err(|e| ApiError::new(ErrorCode::Unavailable, format!("{e:#}")))
    }

    async fn send_message(&self, message: &NewMessage) -> ApiResult<MessageId> {
        self.insert_message(message).await.map_err(internal)
    }

    async fn update_message(&self, message_id: &MessageId, content: &str) -> ApiResult<()> {
        let updated = self
            .update_message_content(message_id, content)
            .await
            .map_err(internal)?;
        found_or(updated, "Message not found")
    }

    async fn delete_message(&self, message_id: &MessageId) -> ApiResult<()> {
        let deleted = Storage::delete_message(self, message_id)
            .await
            .map_err(internal)?;
        found_or(deleted, "Message not found")
    }

    async fn add_reaction(&self, message_id: &MessageId, user_id: &UserId, emoji: &str) -> ApiResult<()> {
        let write = Storage::add_reaction(self, message_id, user_id, emoji)
            .await
            .map_err(internal)?;
        reaction_outcome(write)
    }

    async fn remove_reaction(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> ApiResult<()> {
        let write = Storage::remove_reaction(self, message_id, user_id, emoji)
            .await
            .map_err(internal)?;
        reaction_outcome(write)
    }

    fn subscribe_channel_messages(&self, channel_id: &ChannelId) -> LiveQuery<Vec<MessageRecord>> {
        self.watch_channel_messages(channel_id)
    }

    async fn create_server(&self, name: &str, owner_id: &UserId, icon_url: Option<&str>) -> ApiResult<ServerId> {
        let server_id = Storage::create_server(self, name, owner_id, icon_url)
            .await
            .map_err(internal)?;
        info!(%server_id, %owner_id, "server created");
        Ok(server_id)
    }

    async fn get_server(&self, server_id: &ServerId) -> ApiResult<ServerRecord> {
        self.server(server_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ApiError::not_found("Server not found"))
    }

    async fn servers_owned_by(&self, owner_id: &UserId) -> ApiResult<Vec<ServerRecord>> {
        Storage::servers_owned_by(self, owner_id).await.map_err(internal)
    }

    async fn create_category(&self, server_id: &ServerId, name: &str) -> ApiResult<CategoryId> {
        self.get_server(server_id).await?;
        Storage::create_category(self, server_id, name)
            .await
            .map_err(internal)
    }

    async fn create_channel(
        &self,
        server_id: &ServerId,
        name: &str,
        kind: ChannelKind,
        category_id: Option<&CategoryId>,
    ) -> ApiResult<ChannelId> {
        self.get_server(server_id).await?;
        Storage::create_channel(self, server_id, name, kind, category_id)
            .await
            .map_err(internal)
    }

    fn subscribe_user_servers(&self, user_id: &UserId) -> LiveQuery<Vec<ServerRecord>> {
        self.watch_member_servers(user_id)
    }

    fn subscribe_server_channels(&self, server_id: &ServerId) -> LiveQuery<ChannelDirectory> {
        self.watch_channel_directory(server_id)
    }

    async fn add_member(&self, server_id: &ServerId, user_id: &UserId, role: Role) -> ApiResult<MemberId> {
        self.get_server(server_id).await?;
        Storage::add_member(self, server_id, user_id, role)
            .await
            .map_err(internal)
    }

    async fn remove_member(&self, server_id: &ServerId, user_id: &UserId) -> ApiResult<()> {
        let removed = Storage::remove_member(self, server_id, user_id)
            .await
            .map_err(internal)?;
        if removed == 0 {
            debug!(%server_id, %user_id, "membership already gone");
        }
        Ok(())
    }

    async fn list_members(&self, server_id: &ServerId) -> ApiResult<Vec<ServerMemberRecord>> {
        Storage::list_members(self, server_id).await.map_err(internal)
    }

    async fn create_invite(&self, invite: &NewInvite) -> ApiResult<InviteRecord> {
        Storage::create_invite(self, invite).await.map_err(internal)
    }

    async fn find_invite(&self, code: &str) -> ApiResult<Option<InviteRecord>> {
        self.invite_by_code(code).await.map_err(internal)
    }

    async fn record_invite_use(&self, invite_id: &InviteId) -> ApiResult<()> {
        let recorded = self
            .increment_invite_uses(invite_id)
            .await
            .map_err(internal)?;
        found_or(recorded, "Invite not found")
    }

    async fn get_profile(&self, user_id: &UserId) -> ApiResult<Option<UserProfile>> {
        self.profile(user_id).await.map_err(internal)
    }

    async fn create_profile(&self, profile: &UserProfile) -> ApiResult<()> {
        self.put_profile(profile).await.map_err(internal)
    }

    async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate) -> ApiResult<()> {
        let updated = Storage::update_profile(self, user_id, update)
            .await
            .map_err(internal)?;
        found_or(updated, "Profile not found")
    }

    async fn nickname_exists(&self, nickname: &str) -> ApiResult<bool> {
        Storage::nickname_exists(self, nickname).await.map_err(internal)
    }

    async fn auth_user_by_email(&self, email: &str) -> ApiResult<Option<AuthUser>> {
        Storage::auth_user_by_email(self, email).await.map_err(internal)
    }

    async fn create_auth_user(&self, user: &AuthUser) -> ApiResult<()> {
        if Storage::auth_user_by_email(self, &user.email)
            .await
            .map_err(internal)?
            .is_some()
        {
            return Err(ApiError::new(ErrorCode::Conflict, "Email already registered"));
        }
        self.insert_auth_user(user).await.map_err(internal)
    }

    async fn record_login(&self, user_id: &UserId, at: DateTime<Utc>) -> ApiResult<()> {
        let recorded = Storage::record_login(self, user_id, at)
            .await
            .map_err(internal)?;
        found_or(recorded, "User not found")
    }
}

fn reaction_outcome(write: ReactionWrite) -> ApiResult<()> {
    match write {
        ReactionWrite::MissingMessage => Err(ApiError::not_found("Message not found")),
        ReactionWrite::Changed | ReactionWrite::Unchanged => Ok(()),
    }
}

fn found_or(found: bool, message: &str) -> ApiResult<()> {
    if found {
        Ok(())
    } else {
        Err(ApiError::not_found(message))
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}
