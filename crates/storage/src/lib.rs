use std::{
    fs,
    future::Future,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use shared::{
    domain::{CategoryId, ChannelId, ChannelKind, InviteId, MemberId, MessageId, Role, ServerId, UserId},
    error::ApiError,
    model::{
        AuthUser, CategoryRecord, ChannelDirectory, ChannelRecord, InviteRecord, MessageRecord,
        NewInvite, NewMessage, ProfileUpdate, Reactions, ServerMemberRecord, ServerRecord,
        UserProfile,
    },
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

mod live;

pub use live::{Change, ChangeFeed, LiveQuery, SnapshotStream, SubscriptionHandle};

const SNAPSHOT_BUFFER: usize = 16;
pub const DEFAULT_CHANNEL_NAME: &str = "general";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    changes: ChangeFeed,
}

/// Outcome of a reaction write against one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionWrite {
    MissingMessage,
    Changed,
    Unchanged,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if is_memory_url(database_url) {
            // Every connection to `:memory:` is its own database; pin a single one.
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            changes: ChangeFeed::new(),
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_message(&self, message: &NewMessage) -> Result<MessageId> {
        let message_id = MessageId::generate();
        sqlx::query(
            "INSERT INTO messages (id, channel_id, user_id, username, content, reply_to_id, reactions, created_at)
             VALUES (?, ?, ?, ?, ?, ?, '{}', ?)",
        )
        .bind(message_id.as_str())
        .bind(message.channel_id.as_str())
        .bind(message.user_id.as_str())
        .bind(&message.username)
        .bind(&message.content)
        .bind(message.reply_to_id.as_ref().map(MessageId::as_str))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to insert message")?;

        self.changes.publish(Change::Messages {
            channel_id: message.channel_id.clone(),
        });
        Ok(message_id)
    }

    pub async fn message(&self, message_id: &MessageId) -> Result<Option<MessageRecord>> {
        let row = sqlx::query(
            "SELECT id, channel_id, user_id, username, content, reply_to_id, reactions, created_at, edited_at
             FROM messages WHERE id = ?",
        )
        .bind(message_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    /// Returns false when the message does not exist.
    pub async fn update_message_content(&self, message_id: &MessageId, content: &str) -> Result<bool> {
        let Some(channel_id) = self.channel_for_message(message_id).await? else {
            return Ok(false);
        };
        sqlx::query("UPDATE messages SET content = ?, edited_at = ? WHERE id = ?")
            .bind(content)
            .bind(Utc::now())
            .bind(message_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to update message")?;
        self.changes.publish(Change::Messages { channel_id });
        Ok(true)
    }

    /// Returns false when the message does not exist.
    pub async fn delete_message(&self, message_id: &MessageId) -> Result<bool> {
        let Some(channel_id) = self.channel_for_message(message_id).await? else {
            return Ok(false);
        };
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to delete message")?;
        self.changes.publish(Change::Messages { channel_id });
        Ok(true)
    }

    pub async fn add_reaction(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<ReactionWrite> {
        self.write_reactions(message_id, |reactions| reactions.add(emoji, user_id))
            .await
    }

    pub async fn remove_reaction(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<ReactionWrite> {
        self.write_reactions(message_id, |reactions| reactions.remove(emoji, user_id))
            .await
    }

    async fn write_reactions(
        &self,
        message_id: &MessageId,
        apply: impl FnOnce(&mut Reactions) -> bool,
    ) -> Result<ReactionWrite> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT channel_id, reactions FROM messages WHERE id = ?")
            .bind(message_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(ReactionWrite::MissingMessage);
        };
        let channel_id = ChannelId(row.try_get("channel_id")?);
        let raw: String = row.try_get("reactions")?;
        let mut reactions = parse_reactions(&raw)?;

        if !apply(&mut reactions) {
            return Ok(ReactionWrite::Unchanged);
        }

        sqlx::query("UPDATE messages SET reactions = ? WHERE id = ?")
            .bind(serde_json::to_string(&reactions)?)
            .bind(message_id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await.context("failed to commit reaction write")?;

        self.changes.publish(Change::Messages { channel_id });
        Ok(ReactionWrite::Changed)
    }

    async fn channel_for_message(&self, message_id: &MessageId) -> Result<Option<ChannelId>> {
        let row = sqlx::query("SELECT channel_id FROM messages WHERE id = ?")
            .bind(message_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<String, _>("channel_id").map(ChannelId))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn list_channel_messages(&self, channel_id: &ChannelId) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query(
            "SELECT id, channel_id, user_id, username, content, reply_to_id, reactions, created_at, edited_at
             FROM messages
             WHERE channel_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(channel_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    /// Creates the server with its `general` text channel and the owner membership.
    pub async fn create_server(
        &self,
        name: &str,
        owner_id: &UserId,
        icon_url: Option<&str>,
    ) -> Result<ServerId> {
        let server_id = ServerId::generate();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO servers (id, name, owner_id, icon_url, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(server_id.as_str())
            .bind(name)
            .bind(owner_id.as_str())
            .bind(icon_url)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("failed to insert server")?;

        sqlx::query(
            "INSERT INTO channels (id, server_id, category_id, name, kind, position, created_at)
             VALUES (?, ?, NULL, ?, 'text', 0, ?)",
        )
        .bind(ChannelId::generate().as_str())
        .bind(server_id.as_str())
        .bind(DEFAULT_CHANNEL_NAME)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("failed to insert default channel")?;

        sqlx::query(
            "INSERT INTO server_members (id, server_id, user_id, role, joined_at) VALUES (?, ?, ?, 'owner', ?)",
        )
        .bind(MemberId::generate().as_str())
        .bind(server_id.as_str())
        .bind(owner_id.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("failed to insert owner membership")?;

        tx.commit().await.context("failed to commit server creation")?;

        self.changes.publish(Change::Server {
            server_id: server_id.clone(),
        });
        self.changes.publish(Change::Channels {
            server_id: server_id.clone(),
        });
        self.changes.publish(Change::Members {
            server_id: server_id.clone(),
            user_id: owner_id.clone(),
        });
        Ok(server_id)
    }

    pub async fn server(&self, server_id: &ServerId) -> Result<Option<ServerRecord>> {
        let row = sqlx::query("SELECT id, name, owner_id, icon_url, created_at FROM servers WHERE id = ?")
            .bind(server_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(server_from_row).transpose()
    }

    pub async fn servers_owned_by(&self, owner_id: &UserId) -> Result<Vec<ServerRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, owner_id, icon_url, created_at FROM servers WHERE owner_id = ? ORDER BY created_at ASC",
        )
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(server_from_row).collect()
    }

    pub async fn servers_for_member(&self, user_id: &UserId) -> Result<Vec<ServerRecord>> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.owner_id, s.icon_url, s.created_at
             FROM servers s
             INNER JOIN server_members m ON m.server_id = s.id
             WHERE m.user_id = ?
             ORDER BY m.joined_at ASC, m.rowid ASC",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(server_from_row).collect()
    }

    pub async fn create_category(&self, server_id: &ServerId, name: &str) -> Result<CategoryId> {
        let category_id = CategoryId::generate();
        sqlx::query(
            "INSERT INTO categories (id, server_id, name, position)
             VALUES (?, ?, ?, (SELECT COUNT(*) FROM categories WHERE server_id = ?))",
        )
        .bind(category_id.as_str())
        .bind(server_id.as_str())
        .bind(name)
        .bind(server_id.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create category in server {server_id}"))?;
        self.changes.publish(Change::Channels {
            server_id: server_id.clone(),
        });
        Ok(category_id)
    }

    pub async fn create_channel(
        &self,
        server_id: &ServerId,
        name: &str,
        kind: ChannelKind,
        category_id: Option<&CategoryId>,
    ) -> Result<ChannelId> {
        let channel_id = ChannelId::generate();
        sqlx::query(
            "INSERT INTO channels (id, server_id, category_id, name, kind, position, created_at)
             VALUES (?, ?, ?, ?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM channels WHERE server_id = ?), ?)",
        )
        .bind(channel_id.as_str())
        .bind(server_id.as_str())
        .bind(category_id.map(CategoryId::as_str))
        .bind(name)
        .bind(kind.as_str())
        .bind(server_id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create channel in server {server_id}"))?;
        self.changes.publish(Change::Channels {
            server_id: server_id.clone(),
        });
        Ok(channel_id)
    }

    pub async fn channel_directory(&self, server_id: &ServerId) -> Result<ChannelDirectory> {
        let category_rows = sqlx::query(
            "SELECT id, server_id, name, position FROM categories WHERE server_id = ? ORDER BY position ASC",
        )
        .bind(server_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        let channel_rows = sqlx::query(
            "SELECT id, server_id, category_id, name, kind, position, created_at
             FROM channels WHERE server_id = ? ORDER BY position ASC, created_at ASC",
        )
        .bind(server_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ChannelDirectory {
            categories: category_rows
                .iter()
                .map(category_from_row)
                .collect::<Result<_>>()?,
            channels: channel_rows
                .iter()
                .map(channel_from_row)
                .collect::<Result<_>>()?,
        })
    }

    /// Idempotent: an existing membership keeps its id and role.
    pub async fn add_member(&self, server_id: &ServerId, user_id: &UserId, role: Role) -> Result<MemberId> {
        sqlx::query(
            "INSERT INTO server_members (id, server_id, user_id, role, joined_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(server_id, user_id) DO NOTHING",
        )
        .bind(MemberId::generate().as_str())
        .bind(server_id.as_str())
        .bind(user_id.as_str())
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to add member {user_id} to server {server_id}"))?;

        let member_id: String =
            sqlx::query_scalar("SELECT id FROM server_members WHERE server_id = ? AND user_id = ?")
                .bind(server_id.as_str())
                .bind(user_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        self.changes.publish(Change::Members {
            server_id: server_id.clone(),
            user_id: user_id.clone(),
        });
        Ok(MemberId(member_id))
    }

    /// Returns the number of membership rows removed.
    pub async fn remove_member(&self, server_id: &ServerId, user_id: &UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM server_members WHERE server_id = ? AND user_id = ?")
            .bind(server_id.as_str())
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;
        self.changes.publish(Change::Members {
            server_id: server_id.clone(),
            user_id: user_id.clone(),
        });
        Ok(result.rows_affected())
    }

    pub async fn list_members(&self, server_id: &ServerId) -> Result<Vec<ServerMemberRecord>> {
        let rows = sqlx::query(
            "SELECT id, server_id, user_id, role, joined_at
             FROM server_members WHERE server_id = ? ORDER BY joined_at ASC, rowid ASC",
        )
        .bind(server_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(member_from_row).collect()
    }

    pub async fn create_invite(&self, invite: &NewInvite) -> Result<InviteRecord> {
        let record = InviteRecord {
            id: InviteId::generate(),
            code: invite.code.to_uppercase(),
            server_id: invite.server_id.clone(),
            server_name: invite.server_name.clone(),
            created_by: invite.created_by.clone(),
            created_at: Utc::now(),
            expires_at: invite.expires_at,
            max_uses: invite.max_uses,
            uses: 0,
        };
        sqlx::query(
            "INSERT INTO invites (id, code, server_id, server_name, created_by, created_at, expires_at, max_uses, uses)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(record.id.as_str())
        .bind(&record.code)
        .bind(record.server_id.as_str())
        .bind(&record.server_name)
        .bind(record.created_by.as_str())
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.max_uses.map(i64::from))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create invite for server {}", record.server_id))?;

        self.changes.publish(Change::Invites {
            server_id: record.server_id.clone(),
        });
        Ok(record)
    }

    pub async fn invite_by_code(&self, code: &str) -> Result<Option<InviteRecord>> {
        let row = sqlx::query(
            "SELECT id, code, server_id, server_name, created_by, created_at, expires_at, max_uses, uses
             FROM invites WHERE code = ?",
        )
        .bind(code.trim().to_uppercase())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(invite_from_row).transpose()
    }

    /// Returns false when the invite does not exist.
    pub async fn increment_invite_uses(&self, invite_id: &InviteId) -> Result<bool> {
        let row = sqlx::query("UPDATE invites SET uses = uses + 1 WHERE id = ? RETURNING server_id")
            .bind(invite_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        self.changes.publish(Change::Invites {
            server_id: ServerId(row.try_get("server_id")?),
        });
        Ok(true)
    }

    pub async fn profile(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT id, email, nickname, avatar_color, photo_url, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    /// Writes the whole profile document, replacing any previous one.
    pub async fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, nickname, avatar_color, photo_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                nickname = excluded.nickname,
                avatar_color = excluded.avatar_color,
                photo_url = excluded.photo_url,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
        )
        .bind(profile.user_id.as_str())
        .bind(&profile.email)
        .bind(&profile.nickname)
        .bind(&profile.avatar_color)
        .bind(profile.photo_url.as_deref())
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write profile {}", profile.user_id))?;
        self.changes.publish(Change::Profile {
            user_id: profile.user_id.clone(),
        });
        Ok(())
    }

    /// Returns false when the profile does not exist.
    pub async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate) -> Result<bool> {
        let Some(mut profile) = self.profile(user_id).await? else {
            return Ok(false);
        };
        if let Some(nickname) = &update.nickname {
            profile.nickname = nickname.clone();
        }
        if let Some(photo_url) = &update.photo_url {
            profile.photo_url = photo_url.clone();
        }
        if let Some(avatar_color) = &update.avatar_color {
            profile.avatar_color = avatar_color.clone();
        }
        profile.updated_at = Some(Utc::now());
        self.put_profile(&profile).await?;
        Ok(true)
    }

    pub async fn nickname_exists(&self, nickname: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE nickname = ?")
            .bind(nickname)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn auth_user_by_email(&self, email: &str) -> Result<Option<AuthUser>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at, last_login FROM auth_users WHERE email = ?",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(auth_user_from_row).transpose()
    }

    pub async fn insert_auth_user(&self, user: &AuthUser) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_users (id, email, password_hash, created_at, last_login) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.as_str())
        .bind(user.email.trim().to_lowercase())
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.last_login)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert auth user {}", user.id))?;
        Ok(())
    }

    /// Returns false when the user does not exist.
    pub async fn record_login(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE auth_users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub fn watch_channel_messages(&self, channel_id: &ChannelId) -> LiveQuery<Vec<MessageRecord>> {
        let label = format!("messages:{channel_id}");
        let watched = channel_id.clone();
        let queried = channel_id.clone();
        self.watch(
            label,
            move |change| matches!(change, Change::Messages { channel_id } if *channel_id == watched),
            move |storage| {
                let channel_id = queried.clone();
                async move { storage.list_channel_messages(&channel_id).await }
            },
        )
    }

    pub fn watch_member_servers(&self, user_id: &UserId) -> LiveQuery<Vec<ServerRecord>> {
        let label = format!("servers:{user_id}");
        let watched = user_id.clone();
        let queried = user_id.clone();
        self.watch(
            label,
            move |change| match change {
                Change::Members { user_id, .. } => *user_id == watched,
                Change::Server { .. } => true,
                _ => false,
            },
            move |storage| {
                let user_id = queried.clone();
                async move { storage.servers_for_member(&user_id).await }
            },
        )
    }

    pub fn watch_channel_directory(&self, server_id: &ServerId) -> LiveQuery<ChannelDirectory> {
        let label = format!("channels:{server_id}");
        let watched = server_id.clone();
        let queried = server_id.clone();
        self.watch(
            label,
            move |change| matches!(change, Change::Channels { server_id } if *server_id == watched),
            move |storage| {
                let server_id = queried.clone();
                async move { storage.channel_directory(&server_id).await }
            },
        )
    }

    /// Runs `query` once up front and again after every relevant change.
    ///
    /// The change feed is subscribed before the first query so no write in
    /// between is missed; a lagged feed forces a re-query.
    fn watch<T, M, Q, Fut>(&self, label: String, is_relevant: M, query: Q) -> LiveQuery<T>
    where
        T: Send + 'static,
        M: Fn(&Change) -> bool + Send + 'static,
        Q: Fn(Storage) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let mut changes = BroadcastStream::new(self.changes.subscribe());
        let storage = self.clone();
        let task_label = label.clone();

        let producer = tokio::spawn(async move {
            loop {
                let snapshot = query(storage.clone()).await.map_err(ApiError::from);
                if let Err(error) = &snapshot {
                    tracing::warn!(label = %task_label, %error, "live query refresh failed");
                }
                if tx.send(snapshot).await.is_err() {
                    return;
                }

                loop {
                    match changes.next().await {
                        None => return,
                        Some(Ok(change)) if is_relevant(&change) => break,
                        Some(Ok(_)) => continue,
                        Some(Err(_lagged)) => break,
                    }
                }
            }
        });

        LiveQuery::new(SubscriptionHandle::new(label, Some(producer)), rx)
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn parse_reactions(raw: &str) -> Result<Reactions> {
    if raw.trim().is_empty() {
        return Ok(Reactions::new());
    }
    let reactions: Reactions =
        serde_json::from_str(raw).with_context(|| format!("malformed reactions document '{raw}'"))?;
    Ok(reactions.normalized())
}

fn message_from_row(row: &SqliteRow) -> Result<MessageRecord> {
    let reactions: String = row.try_get("reactions")?;
    let reply_to_id: Option<String> = row.try_get("reply_to_id")?;
    Ok(MessageRecord {
        id: MessageId(row.try_get("id")?),
        channel_id: ChannelId(row.try_get("channel_id")?),
        user_id: UserId(row.try_get("user_id")?),
        username: row.try_get("username")?,
        content: row.try_get("content")?,
        reply_to_id: reply_to_id.map(MessageId),
        reactions: parse_reactions(&reactions)?,
        created_at: row.try_get("created_at")?,
        edited_at: row.try_get("edited_at")?,
    })
}

fn server_from_row(row: &SqliteRow) -> Result<ServerRecord> {
    Ok(ServerRecord {
        id: ServerId(row.try_get("id")?),
        name: row.try_get("name")?,
        owner_id: UserId(row.try_get("owner_id")?),
        icon_url: row.try_get("icon_url")?,
        created_at: row.try_get("created_at")?,
    })
}

fn category_from_row(row: &SqliteRow) -> Result<CategoryRecord> {
    Ok(CategoryRecord {
        id: CategoryId(row.try_get("id")?),
        server_id: ServerId(row.try_get("server_id")?),
        name: row.try_get("name")?,
        position: row.try_get("position")?,
    })
}

fn channel_from_row(row: &SqliteRow) -> Result<ChannelRecord> {
    let kind: String = row.try_get("kind")?;
    let category_id: Option<String> = row.try_get("category_id")?;
    Ok(ChannelRecord {
        id: ChannelId(row.try_get("id")?),
        server_id: ServerId(row.try_get("server_id")?),
        category_id: category_id.map(CategoryId),
        name: row.try_get("name")?,
        kind: ChannelKind::from_str(&kind).map_err(|e| anyhow!(e))?,
        position: row.try_get("position")?,
        created_at: row.try_get("created_at")?,
    })
}

fn member_from_row(row: &SqliteRow) -> Result<ServerMemberRecord> {
    let role: String = row.try_get("role")?;
    Ok(ServerMemberRecord {
        id: MemberId(row.try_get("id")?),
        server_id: ServerId(row.try_get("server_id")?),
        user_id: UserId(row.try_get("user_id")?),
        role: Role::from_str(&role).map_err(|e| anyhow!(e))?,
        joined_at: row.try_get("joined_at")?,
    })
}

fn invite_from_row(row: &SqliteRow) -> Result<InviteRecord> {
    let max_uses: Option<i64> = row.try_get("max_uses")?;
    let uses: i64 = row.try_get("uses")?;
    Ok(InviteRecord {
        id: InviteId(row.try_get("id")?),
        code: row.try_get("code")?,
        server_id: ServerId(row.try_get("server_id")?),
        server_name: row.try_get("server_name")?,
        created_by: UserId(row.try_get("created_by")?),
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        max_uses: max_uses.map(u32::try_from).transpose()?,
        uses: u32::try_from(uses)?,
    })
}

fn profile_from_row(row: &SqliteRow) -> Result<UserProfile> {
    Ok(UserProfile {
        user_id: UserId(row.try_get("id")?),
        email: row.try_get("email")?,
        nickname: row.try_get("nickname")?,
        avatar_color: row.try_get("avatar_color")?,
        photo_url: row.try_get("photo_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn auth_user_from_row(row: &SqliteRow) -> Result<AuthUser> {
    Ok(AuthUser {
        id: UserId(row.try_get("id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        last_login: row.try_get("last_login")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
