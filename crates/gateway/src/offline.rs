use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{CategoryId, ChannelId, ChannelKind, InviteId, MemberId, MessageId, Role, ServerId, UserId},
    error::{ApiError, ApiResult},
    model::{
        AuthUser, ChannelDirectory, InviteRecord, MessageRecord, NewInvite, NewMessage,
        ProfileUpdate, ServerMemberRecord, ServerRecord, UserProfile,
    },
};
use storage::LiveQuery;
use tracing::debug;

use crate::Database;

/// Stand-in used when no database is configured.
///
/// Writes succeed with generated ids and persist nothing; reads come back
/// empty and live queries never emit.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineDatabase;

impl OfflineDatabase {
    fn dropped(operation: &str) {
        debug!(operation, "offline database discarded write");
    }
}

#[async_trait]
impl Database for OfflineDatabase {
    async fn health_check(&self) -> ApiResult<()> {
        Ok(())
    }

    async fn send_message(&self, _message: &NewMessage) -> ApiResult<MessageId> {
        Self::dropped("send_message");
        Ok(MessageId::generate())
    }

    async fn update_message(&self, _message_id: &MessageId, _content: &str) -> ApiResult<()> {
        Self::dropped("update_message");
        Ok(())
    }

    async fn delete_message(&self, _message_id: &MessageId) -> ApiResult<()> {
        Self::dropped("delete_message");
        Ok(())
    }

    async fn add_reaction(&self, _message_id: &MessageId, _user_id: &UserId, _emoji: &str) -> ApiResult<()> {
        Self::dropped("add_reaction");
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _message_id: &MessageId,
        _user_id: &UserId,
        _emoji: &str,
    ) -> ApiResult<()> {
        Self::dropped("remove_reaction");
        Ok(())
    }

    fn subscribe_channel_messages(&self, channel_id: &ChannelId) -> LiveQuery<Vec<MessageRecord>> {
        LiveQuery::idle(format!("offline-messages:{channel_id}"))
    }

    async fn create_server(&self, _name: &str, _owner_id: &UserId, _icon_url: Option<&str>) -> ApiResult<ServerId> {
        Self::dropped("create_server");
        Ok(ServerId::generate())
    }

    async fn get_server(&self, _server_id: &ServerId) -> ApiResult<ServerRecord> {
        Err(ApiError::not_found("Server not found"))
    }

    async fn servers_owned_by(&self, _owner_id: &UserId) -> ApiResult<Vec<ServerRecord>> {
        Ok(Vec::new())
    }

    async fn create_category(&self, _server_id: &ServerId, _name: &str) -> ApiResult<CategoryId> {
        Self::dropped("create_category");
        Ok(CategoryId::generate())
    }

    async fn create_channel(
        &self,
        _server_id: &ServerId,
        _name: &str,
        _kind: ChannelKind,
        _category_id: Option<&CategoryId>,
    ) -> ApiResult<ChannelId> {
        Self::dropped("create_channel");
        Ok(ChannelId::generate())
    }

    fn subscribe_user_servers(&self, user_id: &UserId) -> LiveQuery<Vec<ServerRecord>> {
        LiveQuery::idle(format!("offline-servers:{user_id}"))
    }

    fn subscribe_server_channels(&self, server_id: &ServerId) -> LiveQuery<ChannelDirectory> {
        LiveQuery::idle(format!("offline-channels:{server_id}"))
    }

    async fn add_member(&self, _server_id: &ServerId, _user_id: &UserId, _role: Role) -> ApiResult<MemberId> {
        Self::dropped("add_member");
        Ok(MemberId::generate())
    }

    async fn remove_member(&self, _server_id: &ServerId, _user_id: &UserId) -> ApiResult<()> {
        Self::dropped("remove_member");
        Ok(())
    }

    async fn list_members(&self, _server_id: &ServerId) -> ApiResult<Vec<ServerMemberRecord>> {
        Ok(Vec::new())
    }

    async fn create_invite(&self, invite: &NewInvite) -> ApiResult<InviteRecord> {
        Self::dropped("create_invite");
        Ok(InviteRecord {
            id: InviteId::generate(),
            code: invite.code.to_uppercase(),
            server_id: invite.server_id.clone(),
            server_name: invite.server_name.clone(),
            created_by: invite.created_by.clone(),
            created_at: Utc::now(),
            expires_at: invite.expires_at,
            max_uses: invite.max_uses,
            uses: 0,
        })
    }

    async fn find_invite(&self, _code: &str) -> ApiResult<Option<InviteRecord>> {
        Ok(None)
    }

    async fn record_invite_use(&self, _invite_id: &InviteId) -> ApiResult<()> {
        Self::dropped("record_invite_use");
        Ok(())
    }

    async fn get_profile(&self, _user_id: &UserId) -> ApiResult<Option<UserProfile>> {
        Ok(None)
    }

    async fn create_profile(&self, _profile: &UserProfile) -> ApiResult<()> {
        Self::dropped("create_profile");
        Ok(())
    }

    async fn update_profile(&self, _user_id: &UserId, _update: &ProfileUpdate) -> ApiResult<()> {
        Self::dropped("update_profile");
        Ok(())
    }

    async fn nickname_exists(&self, _nickname: &str) -> ApiResult<bool> {
        Ok(false)
    }

    async fn auth_user_by_email(&self, _email: &str) -> ApiResult<Option<AuthUser>> {
        Ok(None)
    }

    async fn create_auth_user(&self, _user: &AuthUser) -> ApiResult<()> {
        Self::dropped("create_auth_user");
        Ok(())
    }

    async fn record_login(&self, _user_id: &UserId, _at: DateTime<Utc>) -> ApiResult<()> {
        Ok(())
    }
}
