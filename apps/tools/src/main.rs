use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use client_core::{invite_link, parse_invite_code, InviteOptions, InviteService};
use gateway::{OfflineDatabase, SharedDatabase};
use identity::IdentityService;
use serde::Serialize;
use shared::{
    domain::{CategoryId, ChannelId, ChannelKind, ServerId, UserId},
    error::{ApiError, ApiResult, Envelope},
    model::{InviteRecord, ServerRecord},
};
use storage::Storage;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod chat;
mod config;

use config::{load_settings, normalize_database_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "rangkul-tools", about = "Administration and chat client for Rangkul")]
struct Cli {
    /// Overrides the configured database URL; an empty value runs against the offline gateway.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Register {
        name: String,
        email: String,
        password: String,
    },
    CreateServer {
        owner_user_id: String,
        name: String,
        #[arg(long)]
        icon_url: Option<String>,
    },
    CreateChannel {
        server_id: String,
        name: String,
        #[arg(long, default_value = "text")]
        kind: String,
        #[arg(long)]
        category_id: Option<String>,
    },
    CreateInvite {
        server_id: String,
        created_by: String,
        #[arg(long)]
        max_uses: Option<u32>,
        #[arg(long)]
        expires_in_hours: Option<i64>,
    },
    /// Accepts a bare code or an invite link.
    ValidateInvite {
        code: String,
    },
    AcceptInvite {
        code: String,
        user_id: String,
    },
    /// Signs in and relays stdin lines into the active channel.
    Chat {
        email: String,
        password: String,
        #[arg(long)]
        server_id: Option<String>,
        #[arg(long)]
        channel_id: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct CreatedInvite {
    invite: InviteRecord,
    link: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(database_url) = &cli.database_url {
        settings.database_url = normalize_database_url(database_url);
    }
    let db = open_database(&settings).await?;

    match cli.command {
        Command::Register {
            name,
            email,
            password,
        } => {
            let identity = IdentityService::new(db, settings.session_config());
            print_envelope(identity.register(&name, &email, &password).await)
        }
        Command::CreateServer {
            owner_user_id,
            name,
            icon_url,
        } => print_envelope(
            create_server(&db, &UserId::new(owner_user_id), &name, icon_url.as_deref()).await,
        ),
        Command::CreateChannel {
            server_id,
            name,
            kind,
            category_id,
        } => {
            let result = match kind.parse::<ChannelKind>() {
                Ok(kind) => {
                    db.create_channel(
                        &ServerId::new(server_id),
                        &name,
                        kind,
                        category_id.map(CategoryId::new).as_ref(),
                    )
                    .await
                }
                Err(message) => Err(ApiError::validation(message)),
            };
            print_envelope(result)
        }
        Command::CreateInvite {
            server_id,
            created_by,
            max_uses,
            expires_in_hours,
        } => {
            let options = InviteOptions {
                expires_at: expires_in_hours.map(|hours| Utc::now() + Duration::hours(hours)),
                max_uses,
            };
            print_envelope(
                create_invite(
                    &db,
                    &settings,
                    &ServerId::new(server_id),
                    &UserId::new(created_by),
                    options,
                )
                .await,
            )
        }
        Command::ValidateInvite { code } => {
            let invites = InviteService::new(db);
            let result = match parse_invite_code(&code) {
                Some(code) => invites.validate(&code).await,
                None => Err(ApiError::validation("Invalid invite code")),
            };
            print_envelope(result)
        }
        Command::AcceptInvite { code, user_id } => {
            let invites = InviteService::new(db);
            let result = match parse_invite_code(&code) {
                Some(code) => invites.accept(&code, &UserId::new(user_id)).await,
                None => Err(ApiError::validation("Invalid invite code")),
            };
            print_envelope(result)
        }
        Command::Chat {
            email,
            password,
            server_id,
            channel_id,
        } => {
            chat::run(
                db,
                &settings,
                chat::ChatArgs {
                    email,
                    password,
                    server_id: server_id.map(ServerId::new),
                    channel_id: channel_id.map(ChannelId::new),
                },
            )
            .await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open_database(settings: &Settings) -> Result<SharedDatabase> {
    if settings.is_offline() {
        warn!("no database configured; running against the offline gateway");
        return Ok(Arc::new(OfflineDatabase));
    }
    let storage = Storage::new(&settings.database_url).await?;
    info!(database_url = %settings.database_url, "database ready");
    Ok(Arc::new(storage))
}

async fn create_server(
    db: &SharedDatabase,
    owner_id: &UserId,
    name: &str,
    icon_url: Option<&str>,
) -> ApiResult<ServerRecord> {
    let name = shared::validation::validate_server_name(name)?;
    let server_id = db.create_server(&name, owner_id, icon_url).await?;
    db.get_server(&server_id).await
}

async fn create_invite(
    db: &SharedDatabase,
    settings: &Settings,
    server_id: &ServerId,
    created_by: &UserId,
    options: InviteOptions,
) -> ApiResult<CreatedInvite> {
    let server = db.get_server(server_id).await?;
    let invite = InviteService::new(Arc::clone(db))
        .create_invite(server_id, &server.name, created_by, options)
        .await?;
    let link = invite_link(&settings.invite_base_url, &invite.code)?;
    Ok(CreatedInvite { invite, link })
}

fn print_envelope<T: Serialize>(result: ApiResult<T>) -> Result<ExitCode> {
    let envelope = Envelope::from(result);
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(if envelope.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
