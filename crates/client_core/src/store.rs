use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use gateway::{SharedDatabase, SnapshotStream, SubscriptionHandle};
use shared::{
    domain::{ChannelId, MessageId, ServerId, UserId},
    error::{ApiError, ApiResult, ErrorCode},
    model::{arrange_categories, ChannelDirectory, MessageRecord, NewMessage, Reactions, ServerRecord},
    validation::validate_server_name,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::{
    optimistic::{EntityState, RollbackPolicy, TempId},
    selection::ActiveSelection,
    types::{ChatMessage, ChatServer, MutationKind, StoreEvent},
};

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub rollback_policy: RollbackPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoreUser {
    id: UserId,
    username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Membership,
    Channels,
    Messages,
}

/// One live-query listener owned by the store.
struct Slot<K> {
    target: Option<K>,
    handle: Option<SubscriptionHandle>,
    forwarder: Option<JoinHandle<()>>,
    generation: u64,
}

impl<K> Default for Slot<K> {
    fn default() -> Self {
        Self {
            target: None,
            handle: None,
            forwarder: None,
            generation: 0,
        }
    }
}

impl<K> Slot<K> {
    /// Synchronous: no snapshot from the released listener is applied afterwards.
    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.target = None;
        self.generation += 1;
    }

    fn install(&mut self, target: K, handle: SubscriptionHandle, forwarder: JoinHandle<()>) {
        self.target = Some(target);
        self.handle = Some(handle);
        self.forwarder = Some(forwarder);
    }

    fn live_generation(&self) -> Option<u64> {
        self.handle.as_ref().map(|_| self.generation)
    }
}

#[derive(Default)]
struct StoreState {
    user: Option<StoreUser>,
    servers: Vec<ChatServer>,
    selection: ActiveSelection,
    messages: HashMap<ChannelId, Vec<ChatMessage>>,
    membership: Slot<UserId>,
    channels: Slot<ServerId>,
    message_feed: Slot<ChannelId>,
}

impl StoreState {
    fn live_generation(&self, kind: SlotKind) -> Option<u64> {
        match kind {
            SlotKind::Membership => self.membership.live_generation(),
            SlotKind::Channels => self.channels.live_generation(),
            SlotKind::Messages => self.message_feed.live_generation(),
        }
    }

    fn release_all(&mut self) {
        self.message_feed.release();
        self.channels.release();
        self.membership.release();
    }

    fn user(&self) -> ApiResult<StoreUser> {
        self.user
            .clone()
            .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "Chat store is not open"))
    }

    fn active_channel(&self) -> ApiResult<ChannelId> {
        self.selection
            .channel_id
            .clone()
            .ok_or_else(|| ApiError::validation("No channel selected"))
    }

    fn active_server(&self) -> Option<&ChatServer> {
        let key = self.selection.server_id.as_ref()?;
        self.servers.iter().find(|s| &s.key() == key)
    }

    /// Active channel for a message write; placeholder channels of a pending server are refused.
    fn writable_channel(&self) -> ApiResult<ChannelId> {
        let channel_id = self.active_channel()?;
        if self.active_server().is_some_and(|s| s.state.is_pending()) {
            return Err(ApiError::validation("Server is still being created"));
        }
        Ok(channel_id)
    }

    fn server_index(&self, server_id: &ServerId) -> Option<usize> {
        self.servers.iter().position(|s| &s.key() == server_id)
    }
}

enum MessageUndo {
    Content {
        content: String,
        edited_at: Option<chrono::DateTime<Utc>>,
    },
    Reactions(Reactions),
    Deleted {
        index: usize,
        message: ChatMessage,
    },
}

struct MessageMutation {
    channel_id: ChannelId,
    user_id: UserId,
    snapshot: Vec<ChatMessage>,
    undo: MessageUndo,
}

/// Client-side reactive cache over the persistence gateway.
///
/// Live-query snapshots replace the matching slice of state unconditionally;
/// mutations apply locally first and are reconciled or rolled back once the
/// gateway answers.
pub struct ChatStore {
    db: SharedDatabase,
    config: StoreConfig,
    inner: Mutex<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

impl ChatStore {
    pub fn new(db: SharedDatabase, config: StoreConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            db,
            config,
            inner: Mutex::new(StoreState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn rollback_policy(&self) -> RollbackPolicy {
        self.config.rollback_policy
    }

    /// Starts the session: the membership subscription lives until `close`.
    pub async fn open(self: &Arc<Self>, user_id: UserId, username: impl Into<String>) {
        let mut state = self.inner.lock().await;
        if state.user.is_some() {
            self.reset(&mut state);
        }
        state.user = Some(StoreUser {
            id: user_id.clone(),
            username: username.into(),
        });
        self.watch_membership(&mut state, &user_id);
        info!(%user_id, "chat store opened");
    }

    pub async fn close(&self) {
        let mut state = self.inner.lock().await;
        if let Some(user) = &state.user {
            info!(user_id = %user.id, "chat store closed");
        }
        self.reset(&mut state);
    }

    fn reset(&self, state: &mut StoreState) {
        state.release_all();
        state.user = None;
        state.servers.clear();
        state.messages.clear();
        state.selection.clear();
        self.emit(StoreEvent::ServersChanged);
        self.emit(StoreEvent::SelectionChanged(ActiveSelection::default()));
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.user.is_some()
    }

    pub async fn servers(&self) -> Vec<ChatServer> {
        self.inner.lock().await.servers.clone()
    }

    pub async fn selection(&self) -> ActiveSelection {
        self.inner.lock().await.selection.clone()
    }

    pub async fn active_server(&self) -> Option<ChatServer> {
        let state = self.inner.lock().await;
        let active = state.selection.server_id.as_ref()?;
        let server = state.servers.iter().find(|s| &s.key() == active).cloned();
        server
    }

    pub async fn messages(&self, channel_id: &ChannelId) -> Vec<ChatMessage> {
        self.inner
            .lock()
            .await
            .messages
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn active_messages(&self) -> Vec<ChatMessage> {
        let state = self.inner.lock().await;
        let messages = state
            .selection
            .channel_id
            .as_ref()
            .and_then(|channel_id| state.messages.get(channel_id))
            .cloned()
            .unwrap_or_default();
        messages
    }

    /// Returns false and changes nothing for an unknown server.
    pub async fn select_server(self: &Arc<Self>, server_id: &ServerId) -> bool {
        let mut state = self.inner.lock().await;
        let StoreState {
            selection, servers, ..
        } = &mut *state;
        if !selection.select_server(servers, server_id) {
            return false;
        }
        self.emit(StoreEvent::SelectionChanged(state.selection.clone()));
        self.sync_subscriptions(&mut state);
        true
    }

    pub async fn select_channel(self: &Arc<Self>, channel_id: &ChannelId) {
        let mut state = self.inner.lock().await;
        state.selection.select_channel(channel_id.clone());
        self.emit(StoreEvent::SelectionChanged(state.selection.clone()));
        self.sync_subscriptions(&mut state);
    }

    /// Blank content is ignored: nothing is cached and no request is issued.
    pub async fn send_message(
        &self,
        content: &str,
        reply_to_id: Option<MessageId>,
    ) -> ApiResult<Option<MessageId>> {
        if content.trim().is_empty() {
            return Ok(None);
        }

        let (temp_id, request, snapshot) = {
            let mut state = self.inner.lock().await;
            let user = state.user()?;
            let channel_id = state.writable_channel()?;
            let temp_id = TempId::generate();
            let messages = state.messages.entry(channel_id.clone()).or_default();
            let snapshot = messages.clone();
            messages.push(ChatMessage {
                state: EntityState::Pending {
                    temp_id: temp_id.clone(),
                },
                channel_id: channel_id.clone(),
                user_id: user.id.clone(),
                username: user.username.clone(),
                content: content.to_string(),
                reply_to_id: reply_to_id.clone(),
                reactions: Reactions::new(),
                created_at: Utc::now(),
                edited_at: None,
            });
            self.emit(StoreEvent::MessagesChanged {
                channel_id: channel_id.clone(),
            });
            let request = NewMessage {
                channel_id,
                user_id: user.id,
                username: user.username,
                content: content.to_string(),
                reply_to_id,
            };
            (temp_id, request, snapshot)
        };

        let result = self.db.send_message(&request).await;

        let mut state = self.inner.lock().await;
        let channel_id = request.channel_id;
        match result {
            Ok(message_id) => {
                let pending = state
                    .messages
                    .get_mut(&channel_id)
                    .and_then(|messages| messages.iter_mut().find(|m| m.state.is_temp(&temp_id)));
                if let Some(message) = pending {
                    message.state.confirm(message_id.clone());
                    self.emit(StoreEvent::MessagesChanged { channel_id });
                }
                Ok(Some(message_id))
            }
            Err(error) => {
                match self.config.rollback_policy {
                    RollbackPolicy::WholeCollection => {
                        state.messages.insert(channel_id.clone(), snapshot);
                    }
                    RollbackPolicy::SingleEntity => {
                        if let Some(messages) = state.messages.get_mut(&channel_id) {
                            messages.retain(|m| !m.state.is_temp(&temp_id));
                        }
                    }
                }
                self.emit(StoreEvent::MessagesChanged { channel_id });
                self.report_failure(MutationKind::SendMessage, &error);
                Err(error)
            }
        }
    }

    pub async fn edit_message(&self, message_id: &MessageId, content: &str) -> ApiResult<()> {
        if content.trim().is_empty() {
            return Err(ApiError::validation("Message must not be empty"));
        }
        let mutation = {
            let mut state = self.inner.lock().await;
            self.begin_message_mutation(&mut state, message_id, |message| {
                let undo = MessageUndo::Content {
                    content: message.content.clone(),
                    edited_at: message.edited_at,
                };
                message.content = content.to_string();
                message.edited_at = Some(Utc::now());
                undo
            })?
        };
        let result = self.db.update_message(message_id, content).await;
        self.settle_message_mutation(MutationKind::EditMessage, message_id, mutation, result)
            .await
    }

    pub async fn delete_message(&self, message_id: &MessageId) -> ApiResult<()> {
        let mutation = {
            let mut state = self.inner.lock().await;
            let user = state.user()?;
            let channel_id = state.active_channel()?;
            let messages = state.messages.entry(channel_id.clone()).or_default();
            let index = locate_message(messages, message_id)?;
            let snapshot = messages.clone();
            let message = messages.remove(index);
            self.emit(StoreEvent::MessagesChanged {
                channel_id: channel_id.clone(),
            });
            MessageMutation {
                channel_id,
                user_id: user.id,
                snapshot,
                undo: MessageUndo::Deleted { index, message },
            }
        };
        let result = self.db.delete_message(message_id).await;
        self.settle_message_mutation(MutationKind::DeleteMessage, message_id, mutation, result)
            .await
    }

    /// The request is issued even when the local state already holds the reaction.
    pub async fn add_reaction(&self, message_id: &MessageId, emoji: &str) -> ApiResult<()> {
        let mutation = {
            let mut state = self.inner.lock().await;
            let user_id = state.user()?.id;
            self.begin_message_mutation(&mut state, message_id, |message| {
                let undo = MessageUndo::Reactions(message.reactions.clone());
                message.reactions.add(emoji, &user_id);
                undo
            })?
        };
        let result = self
            .db
            .add_reaction(message_id, &mutation.user_id, emoji)
            .await;
        self.settle_message_mutation(MutationKind::AddReaction, message_id, mutation, result)
            .await
    }

    pub async fn remove_reaction(&self, message_id: &MessageId, emoji: &str) -> ApiResult<()> {
        let mutation = {
            let mut state = self.inner.lock().await;
            let user_id = state.user()?.id;
            self.begin_message_mutation(&mut state, message_id, |message| {
                let undo = MessageUndo::Reactions(message.reactions.clone());
                message.reactions.remove(emoji, &user_id);
                undo
            })?
        };
        let result = self
            .db
            .remove_reaction(message_id, &mutation.user_id, emoji)
            .await;
        self.settle_message_mutation(MutationKind::RemoveReaction, message_id, mutation, result)
            .await
    }

    pub async fn toggle_reaction(&self, message_id: &MessageId, emoji: &str) -> ApiResult<()> {
        let reacted = {
            let state = self.inner.lock().await;
            let user_id = state.user()?.id;
            let channel_id = state.active_channel()?;
            state
                .messages
                .get(&channel_id)
                .and_then(|messages| messages.iter().find(|m| m.key() == message_id.as_str()))
                .is_some_and(|m| m.reactions.has_reacted(emoji, &user_id))
        };
        if reacted {
            self.remove_reaction(message_id, emoji).await
        } else {
            self.add_reaction(message_id, emoji).await
        }
    }

    fn begin_message_mutation(
        &self,
        state: &mut StoreState,
        message_id: &MessageId,
        apply: impl FnOnce(&mut ChatMessage) -> MessageUndo,
    ) -> ApiResult<MessageMutation> {
        let user = state.user()?;
        let channel_id = state.writable_channel()?;
        let messages = state.messages.entry(channel_id.clone()).or_default();
        let index = locate_message(messages, message_id)?;
        let snapshot = messages.clone();
        let undo = apply(&mut messages[index]);
        self.emit(StoreEvent::MessagesChanged {
            channel_id: channel_id.clone(),
        });
        Ok(MessageMutation {
            channel_id,
            user_id: user.id,
            snapshot,
            undo,
        })
    }

    async fn settle_message_mutation(
        &self,
        operation: MutationKind,
        message_id: &MessageId,
        mutation: MessageMutation,
        result: ApiResult<()>,
    ) -> ApiResult<()> {
        let Err(error) = result else {
            return Ok(());
        };

        let mut state = self.inner.lock().await;
        let MessageMutation {
            channel_id,
            snapshot,
            undo,
            ..
        } = mutation;
        match self.config.rollback_policy {
            RollbackPolicy::WholeCollection => {
                state.messages.insert(channel_id.clone(), snapshot);
            }
            RollbackPolicy::SingleEntity => {
                let messages = state.messages.entry(channel_id.clone()).or_default();
                let current = messages.iter_mut().find(|m| m.key() == message_id.as_str());
                match (undo, current) {
                    (MessageUndo::Content { content, edited_at }, Some(message)) => {
                        message.content = content;
                        message.edited_at = edited_at;
                    }
                    (MessageUndo::Reactions(reactions), Some(message)) => {
                        message.reactions = reactions;
                    }
                    (MessageUndo::Deleted { index, message }, None) => {
                        let index = index.min(messages.len());
                        messages.insert(index, message);
                    }
                    _ => {}
                }
            }
        }
        self.emit(StoreEvent::MessagesChanged { channel_id });
        self.report_failure(operation, &error);
        Err(error)
    }

    /// The new server appears immediately as pending; the membership
    /// subscription later supplies the authoritative entry.
    pub async fn create_server(
        self: &Arc<Self>,
        name: &str,
        icon_url: Option<String>,
    ) -> ApiResult<ServerId> {
        let name = validate_server_name(name)?;
        let (temp_id, owner_id, snapshot) = {
            let mut state = self.inner.lock().await;
            let user = state.user()?;
            let temp_id = TempId::generate();
            let snapshot = state.servers.clone();
            state.servers.push(ChatServer::placeholder(
                EntityState::Pending {
                    temp_id: temp_id.clone(),
                },
                &name,
                &user.id,
                icon_url.clone(),
            ));
            self.emit(StoreEvent::ServersChanged);
            (temp_id, user.id, snapshot)
        };

        let result = self
            .db
            .create_server(&name, &owner_id, icon_url.as_deref())
            .await;

        let mut state = self.inner.lock().await;
        match result {
            Ok(server_id) => {
                let temp_key = ServerId::new(temp_id.as_str());
                let listed = state
                    .servers
                    .iter()
                    .any(|s| s.state.confirmed_id() == Some(&server_id));
                if listed {
                    state.servers.retain(|s| !s.state.is_temp(&temp_id));
                    self.emit(StoreEvent::ServersChanged);
                } else if let Some(server) =
                    state.servers.iter_mut().find(|s| s.state.is_temp(&temp_id))
                {
                    server.state.confirm(server_id.clone());
                    server.categories.clear();
                    self.emit(StoreEvent::ServersChanged);
                }
                if state.selection.rename_server(&temp_key, &server_id) {
                    self.emit(StoreEvent::SelectionChanged(state.selection.clone()));
                    self.sync_subscriptions(&mut state);
                }
                info!(%server_id, "server created");
                Ok(server_id)
            }
            Err(error) => {
                match self.config.rollback_policy {
                    RollbackPolicy::WholeCollection => state.servers = snapshot,
                    RollbackPolicy::SingleEntity => {
                        state.servers.retain(|s| !s.state.is_temp(&temp_id));
                    }
                }
                self.emit(StoreEvent::ServersChanged);
                self.report_failure(MutationKind::CreateServer, &error);
                Err(error)
            }
        }
    }

    /// Removes the server locally and moves the selection off it when it was active.
    pub async fn leave_server(self: &Arc<Self>, server_id: &ServerId) -> ApiResult<()> {
        let (user_id, snapshot, index, removed, previous) = {
            let mut state = self.inner.lock().await;
            let user = state.user()?;
            let index = state
                .server_index(server_id)
                .ok_or_else(|| ApiError::not_found("Server not found"))?;
            if state.servers[index].state.is_pending() {
                return Err(ApiError::validation("Server is still being created"));
            }
            let snapshot = state.servers.clone();
            let previous = state.selection.clone();
            let removed = state.servers.remove(index);
            self.emit(StoreEvent::ServersChanged);

            let StoreState {
                selection, servers, ..
            } = &mut *state;
            if selection.leave(servers, server_id) {
                self.emit(StoreEvent::SelectionChanged(state.selection.clone()));
                self.sync_subscriptions(&mut state);
            }
            (user.id, snapshot, index, removed, previous)
        };

        let Err(error) = self.db.remove_member(server_id, &user_id).await else {
            info!(%server_id, %user_id, "left server");
            return Ok(());
        };

        let mut state = self.inner.lock().await;
        match self.config.rollback_policy {
            RollbackPolicy::WholeCollection => state.servers = snapshot,
            RollbackPolicy::SingleEntity => {
                if state.server_index(server_id).is_none() {
                    let index = index.min(state.servers.len());
                    state.servers.insert(index, removed);
                }
            }
        }
        self.emit(StoreEvent::ServersChanged);
        if previous.server_id.as_ref() == Some(server_id) && state.selection != previous {
            state.selection = previous;
            self.emit(StoreEvent::SelectionChanged(state.selection.clone()));
            self.sync_subscriptions(&mut state);
        }
        self.report_failure(MutationKind::LeaveServer, &error);
        Err(error)
    }

    /// Brings the channel-directory and message slots in line with the selection.
    ///
    /// A slot whose target changed is released before its replacement is established.
    fn sync_subscriptions(self: &Arc<Self>, state: &mut StoreState) {
        let active = state.active_server();
        let placeholder = active.is_some_and(|s| s.state.is_pending());
        let desired_server = active.and_then(|s| s.state.confirmed_id().cloned());
        if state.channels.target != desired_server {
            state.channels.release();
            if let Some(server_id) = desired_server {
                self.watch_channels(state, &server_id);
            }
        }

        let desired_channel = state
            .selection
            .channel_id
            .clone()
            .filter(|_| !placeholder);
        if state.message_feed.target != desired_channel {
            state.message_feed.release();
            if let Some(channel_id) = desired_channel {
                self.watch_messages(state, &channel_id);
            }
        }
    }

    fn watch_membership(self: &Arc<Self>, state: &mut StoreState, user_id: &UserId) {
        state.membership.release();
        let (handle, stream) = self.db.subscribe_user_servers(user_id).split();
        info!(label = handle.label(), "subscribed");
        let forwarder = self.forward(
            SlotKind::Membership,
            state.membership.generation,
            handle.label().to_string(),
            stream,
            Self::apply_servers,
        );
        state.membership.install(user_id.clone(), handle, forwarder);
    }

    fn watch_channels(self: &Arc<Self>, state: &mut StoreState, server_id: &ServerId) {
        state.channels.release();
        let (handle, stream) = self.db.subscribe_server_channels(server_id).split();
        info!(label = handle.label(), "subscribed");
        let forwarder = self.forward(
            SlotKind::Channels,
            state.channels.generation,
            handle.label().to_string(),
            stream,
            Self::apply_directory,
        );
        state.channels.install(server_id.clone(), handle, forwarder);
    }

    fn watch_messages(self: &Arc<Self>, state: &mut StoreState, channel_id: &ChannelId) {
        state.message_feed.release();
        let (handle, stream) = self.db.subscribe_channel_messages(channel_id).split();
        info!(label = handle.label(), "subscribed");
        let forwarder = self.forward(
            SlotKind::Messages,
            state.message_feed.generation,
            handle.label().to_string(),
            stream,
            Self::apply_messages,
        );
        state.message_feed.install(channel_id.clone(), handle, forwarder);
    }

    /// Applies snapshots for as long as the slot still holds `generation`.
    fn forward<T: Send + 'static>(
        self: &Arc<Self>,
        kind: SlotKind,
        generation: u64,
        label: String,
        mut stream: SnapshotStream<T>,
        apply: fn(&Arc<Self>, &mut StoreState, T),
    ) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(snapshot) = stream.next().await {
                let Some(store) = store.upgrade() else {
                    return;
                };
                let mut state = store.inner.lock().await;
                if state.live_generation(kind) != Some(generation) {
                    return;
                }
                match snapshot {
                    Ok(value) => apply(&store, &mut *state, value),
                    Err(error) => {
                        error!(%label, %error, "live query failed");
                        store.emit(StoreEvent::SubscriptionError {
                            label: label.clone(),
                            error,
                        });
                    }
                }
            }
        })
    }

    fn apply_servers(self: &Arc<Self>, state: &mut StoreState, records: Vec<ServerRecord>) {
        let previous = std::mem::take(&mut state.servers);
        state.servers = records
            .into_iter()
            .map(|record| {
                let categories = previous
                    .iter()
                    .find(|s| s.state.confirmed_id() == Some(&record.id))
                    .map(|s| s.categories.clone())
                    .unwrap_or_default();
                ChatServer::from_record(record, categories)
            })
            .collect();
        state
            .servers
            .extend(previous.into_iter().filter(|s| s.state.is_pending()));
        self.emit(StoreEvent::ServersChanged);

        let StoreState {
            selection, servers, ..
        } = &mut *state;
        if selection.reconcile(servers) {
            self.emit(StoreEvent::SelectionChanged(state.selection.clone()));
        }
        self.sync_subscriptions(state);
    }

    fn apply_directory(self: &Arc<Self>, state: &mut StoreState, directory: ChannelDirectory) {
        let Some(server_id) = state.channels.target.clone() else {
            return;
        };
        let Some(server) = state
            .servers
            .iter_mut()
            .find(|s| s.state.confirmed_id() == Some(&server_id))
        else {
            return;
        };
        server.categories = arrange_categories(&directory);
        let first_channel = server.first_channel().map(|c| c.id.clone());
        let channel_known = state
            .selection
            .channel_id
            .as_ref()
            .is_some_and(|channel_id| server.contains_channel(channel_id));
        self.emit(StoreEvent::ServersChanged);

        if state.selection.server_id.as_ref() == Some(&server_id)
            && !channel_known
            && state.selection.channel_id != first_channel
        {
            state.selection.channel_id = first_channel;
            self.emit(StoreEvent::SelectionChanged(state.selection.clone()));
            self.sync_subscriptions(state);
        }
    }

    fn apply_messages(self: &Arc<Self>, state: &mut StoreState, records: Vec<MessageRecord>) {
        let Some(channel_id) = state.message_feed.target.clone() else {
            return;
        };
        state.messages.insert(
            channel_id.clone(),
            records.into_iter().map(ChatMessage::from).collect(),
        );
        self.emit(StoreEvent::MessagesChanged { channel_id });
    }

    fn report_failure(&self, operation: MutationKind, error: &ApiError) {
        warn!(operation = operation.as_str(), %error, "optimistic mutation rolled back");
        self.emit(StoreEvent::MutationFailed {
            operation,
            error: error.clone(),
        });
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}

fn locate_message(messages: &[ChatMessage], message_id: &MessageId) -> ApiResult<usize> {
    let index = messages
        .iter()
        .position(|m| m.key() == message_id.as_str())
        .ok_or_else(|| ApiError::not_found("Message not found"))?;
    if messages[index].is_pending() {
        return Err(ApiError::validation("Message is still being sent"));
    }
    Ok(index)
}
