use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use client_core::{ChatMessage, ChatStore, StoreConfig, StoreEvent};
use gateway::SharedDatabase;
use identity::IdentityService;
use shared::domain::{ChannelId, ServerId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
    time::{sleep, Duration},
};
use tracing::{info, warn};

use crate::config::Settings;

const SERVER_WAIT_ATTEMPTS: usize = 50;

pub struct ChatArgs {
    pub email: String,
    pub password: String,
    pub server_id: Option<ServerId>,
    pub channel_id: Option<ChannelId>,
}

pub async fn run(db: SharedDatabase, settings: &Settings, args: ChatArgs) -> Result<()> {
    let identity = IdentityService::new(Arc::clone(&db), settings.session_config());
    let session = identity
        .sign_in_with_credentials(&args.email, &args.password)
        .await
        .context("sign-in failed")?;
    let username = match db.get_profile(&session.user.id).await {
        Ok(Some(profile)) => profile.nickname,
        Ok(None) => fallback_username(&session.user.email),
        Err(error) => {
            warn!(%error, "profile unavailable");
            fallback_username(&session.user.email)
        }
    };

    let store = ChatStore::new(
        db,
        StoreConfig {
            rollback_policy: settings.rollback_policy,
        },
    );
    let printer = tokio::spawn(print_events(Arc::clone(&store)));
    store.open(session.user.id.clone(), username.clone()).await;
    info!(user_id = %session.user.id, %username, "chat session started");

    if let Some(server_id) = &args.server_id {
        select_when_listed(&store, server_id).await;
    }
    if let Some(channel_id) = &args.channel_id {
        store.select_channel(channel_id).await;
    }

    println!("type a message and press enter; /servers, /server <id>, /channel <id>, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/servers" => {
                for server in store.servers().await {
                    let channels: Vec<_> = server
                        .categories
                        .iter()
                        .flat_map(|c| c.channels.iter())
                        .map(|c| format!("#{} ({})", c.name, c.id))
                        .collect();
                    println!("{} [{}] {}", server.name, server.key(), channels.join(", "));
                }
            }
            command if command.starts_with("/server ") => {
                let server_id = ServerId::new(command["/server ".len()..].trim());
                if !store.select_server(&server_id).await {
                    println!("unknown server {server_id}");
                }
            }
            command if command.starts_with("/channel ") => {
                store
                    .select_channel(&ChannelId::new(command["/channel ".len()..].trim()))
                    .await;
            }
            _ => {
                if let Err(error) = store.send_message(&line, None).await {
                    println!("! {}", error.message);
                }
            }
        }
    }

    store.close().await;
    printer.abort();
    identity.sign_out().await;
    Ok(())
}

fn fallback_username(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

async fn select_when_listed(store: &Arc<ChatStore>, server_id: &ServerId) {
    for _ in 0..SERVER_WAIT_ATTEMPTS {
        if store.select_server(server_id).await {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    warn!(%server_id, "server not found among memberships");
}

async fn print_events(store: Arc<ChatStore>) {
    let mut events = store.subscribe_events();
    let mut printed = HashSet::new();
    loop {
        match events.recv().await {
            Ok(StoreEvent::MessagesChanged { channel_id }) => {
                if store.selection().await.channel_id.as_ref() != Some(&channel_id) {
                    continue;
                }
                for message in store.active_messages().await {
                    if !message.is_pending() && printed.insert(message.key().to_string()) {
                        print_message(&message);
                    }
                }
            }
            Ok(StoreEvent::SelectionChanged(selection)) => {
                if let Some(channel_id) = selection.channel_id {
                    println!("-- now in {channel_id}");
                }
            }
            Ok(StoreEvent::MutationFailed { operation, error }) => {
                println!("! {} failed: {}", operation.as_str(), error.message);
            }
            Ok(StoreEvent::SubscriptionError { label, error }) => {
                println!("! {label}: {}", error.message);
            }
            Ok(StoreEvent::ServersChanged) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
            Err(RecvError::Closed) => return,
        }
    }
}

fn print_message(message: &ChatMessage) {
    let edited = if message.edited_at.is_some() { " (edited)" } else { "" };
    println!(
        "[{}] {}: {}{}",
        message.created_at.format("%H:%M"),
        message.username,
        message.content,
        edited
    );
}
