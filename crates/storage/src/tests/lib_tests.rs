use std::time::Duration;

use shared::model::{ProfileUpdate, DEFAULT_CATEGORY_NAME};

use super::*;

async fn memory_storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

fn new_message(channel_id: &ChannelId, user: &str, content: &str) -> NewMessage {
    NewMessage {
        channel_id: channel_id.clone(),
        user_id: UserId::new(user),
        username: user.to_string(),
        content: content.to_string(),
        reply_to_id: None,
    }
}

async fn general_channel(storage: &Storage, server_id: &ServerId) -> ChannelId {
    let directory = storage.channel_directory(server_id).await.expect("directory");
    directory
        .channels
        .into_iter()
        .find(|c| c.name == DEFAULT_CHANNEL_NAME)
        .expect("general channel")
        .id
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = memory_storage().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("rangkul.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[test]
fn memory_urls_have_no_file_path() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(sqlite_path("sqlite://file:chat?mode=memory&cache=shared"), None);
    assert_eq!(
        sqlite_path("sqlite://data/rangkul.db?mode=rwc"),
        Some(PathBuf::from("data/rangkul.db"))
    );
}

#[tokio::test]
async fn create_server_seeds_general_channel_and_owner() {
    let storage = memory_storage().await;
    let owner = UserId::new("owner-1");
    let server_id = storage
        .create_server("Rangkul Dev", &owner, None)
        .await
        .expect("server");

    let directory = storage.channel_directory(&server_id).await.expect("directory");
    assert!(directory.categories.is_empty());
    assert_eq!(directory.channels.len(), 1);
    let general = &directory.channels[0];
    assert_eq!(general.name, DEFAULT_CHANNEL_NAME);
    assert_eq!(general.kind, ChannelKind::Text);
    assert_eq!(general.position, 0);
    assert_eq!(general.category_id, None);

    let members = storage.list_members(&server_id).await.expect("members");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, owner);
    assert_eq!(members[0].role, Role::Owner);

    let arranged = shared::model::arrange_categories(&directory);
    assert_eq!(arranged.len(), 1);
    assert_eq!(arranged[0].name, DEFAULT_CATEGORY_NAME);
}

#[tokio::test]
async fn channels_append_after_existing_positions() {
    let storage = memory_storage().await;
    let owner = UserId::new("owner-1");
    let server_id = storage.create_server("ops", &owner, None).await.expect("server");
    let voice = storage.create_category(&server_id, "VOICE").await.expect("category");
    storage
        .create_channel(&server_id, "lounge", ChannelKind::Voice, Some(&voice))
        .await
        .expect("voice channel");
    storage
        .create_channel(&server_id, "random", ChannelKind::Text, None)
        .await
        .expect("text channel");

    let directory = storage.channel_directory(&server_id).await.expect("directory");
    let positions: Vec<_> = directory
        .channels
        .iter()
        .map(|c| (c.name.as_str(), c.position))
        .collect();
    assert_eq!(positions, vec![("general", 0), ("lounge", 1), ("random", 2)]);
    assert_eq!(directory.categories.len(), 1);
    assert_eq!(directory.channels[1].category_id.as_ref(), Some(&voice));
}

#[tokio::test]
async fn membership_is_idempotent_and_removable() {
    let storage = memory_storage().await;
    let owner = UserId::new("owner-1");
    let guest = UserId::new("guest-1");
    let server_id = storage.create_server("ops", &owner, None).await.expect("server");

    let first = storage.add_member(&server_id, &guest, Role::Member).await.expect("add");
    let second = storage.add_member(&server_id, &guest, Role::Admin).await.expect("re-add");
    assert_eq!(first, second);

    let members = storage.list_members(&server_id).await.expect("members");
    assert_eq!(members.len(), 2);
    assert_eq!(members[1].role, Role::Member);

    let guest_servers = storage.servers_for_member(&guest).await.expect("servers");
    assert_eq!(guest_servers.len(), 1);
    assert_eq!(guest_servers[0].id, server_id);

    assert_eq!(storage.remove_member(&server_id, &guest).await.expect("remove"), 1);
    assert_eq!(storage.remove_member(&server_id, &guest).await.expect("remove again"), 0);
    assert!(storage.servers_for_member(&guest).await.expect("servers").is_empty());
}

#[tokio::test]
async fn messages_list_in_send_order_with_edits_and_deletes() {
    let storage = memory_storage().await;
    let channel_id = ChannelId::new("chan-1");

    let first = storage
        .insert_message(&new_message(&channel_id, "alice", "halo"))
        .await
        .expect("first");
    let second = storage
        .insert_message(&new_message(&channel_id, "bob", "apa kabar"))
        .await
        .expect("second");
    storage
        .insert_message(&new_message(&ChannelId::new("elsewhere"), "carol", "noise"))
        .await
        .expect("other channel");

    assert!(storage
        .update_message_content(&first, "halo semua")
        .await
        .expect("edit"));
    assert!(storage.delete_message(&second).await.expect("delete"));
    assert!(!storage.delete_message(&second).await.expect("delete twice"));
    assert!(!storage
        .update_message_content(&MessageId::new("missing"), "x")
        .await
        .expect("edit missing"));

    let messages = storage.list_channel_messages(&channel_id).await.expect("list");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "halo semua");
    assert!(messages[0].edited_at.is_some());
}

#[tokio::test]
async fn reactions_are_read_modify_written() {
    let storage = memory_storage().await;
    let channel_id = ChannelId::new("chan-1");
    let message_id = storage
        .insert_message(&new_message(&channel_id, "alice", "mantap"))
        .await
        .expect("message");
    let bob = UserId::new("bob");
    let carol = UserId::new("carol");

    assert_eq!(
        storage.add_reaction(&message_id, &bob, "👍").await.expect("bob"),
        ReactionWrite::Changed
    );
    assert_eq!(
        storage.add_reaction(&message_id, &bob, "👍").await.expect("bob again"),
        ReactionWrite::Unchanged
    );
    storage.add_reaction(&message_id, &carol, "👍").await.expect("carol");

    let message = storage.message(&message_id).await.expect("read").expect("exists");
    assert_eq!(message.reactions.users("👍"), &[bob.clone(), carol.clone()]);

    storage.remove_reaction(&message_id, &bob, "👍").await.expect("remove bob");
    storage.remove_reaction(&message_id, &carol, "👍").await.expect("remove carol");
    let message = storage.message(&message_id).await.expect("read").expect("exists");
    assert!(message.reactions.is_empty());

    assert_eq!(
        storage
            .add_reaction(&MessageId::new("missing"), &bob, "🔥")
            .await
            .expect("missing"),
        ReactionWrite::MissingMessage
    );
}

#[tokio::test]
async fn invites_are_looked_up_case_insensitively_and_count_uses() {
    let storage = memory_storage().await;
    let owner = UserId::new("owner-1");
    let server_id = storage.create_server("ops", &owner, None).await.expect("server");

    let invite = storage
        .create_invite(&NewInvite {
            code: "abc123xyz".into(),
            server_id: server_id.clone(),
            server_name: "ops".into(),
            created_by: owner.clone(),
            expires_at: None,
            max_uses: Some(2),
        })
        .await
        .expect("invite");
    assert_eq!(invite.code, "ABC123XYZ");

    let found = storage
        .invite_by_code(" abc123xyz ")
        .await
        .expect("lookup")
        .expect("exists");
    assert_eq!(found.id, invite.id);
    assert_eq!(found.uses, 0);

    assert!(storage.increment_invite_uses(&invite.id).await.expect("use"));
    let found = storage.invite_by_code("ABC123XYZ").await.expect("lookup").expect("exists");
    assert_eq!(found.uses, 1);
    assert_eq!(found.max_uses, Some(2));

    assert!(!storage
        .increment_invite_uses(&InviteId::new("missing"))
        .await
        .expect("missing"));
    assert!(storage.invite_by_code("NOPE").await.expect("lookup").is_none());
}

#[tokio::test]
async fn profile_updates_merge_fields() {
    let storage = memory_storage().await;
    let user_id = UserId::new("u-1");
    storage
        .put_profile(&UserProfile {
            user_id: user_id.clone(),
            email: "budi@rangkul.id".into(),
            nickname: "budi".into(),
            avatar_color: "bg-teal-500".into(),
            photo_url: Some("https://cdn/old.png".into()),
            created_at: Utc::now(),
            updated_at: None,
        })
        .await
        .expect("profile");

    assert!(storage.nickname_exists("budi").await.expect("exists"));
    assert!(!storage.nickname_exists("andi").await.expect("missing"));

    let update = ProfileUpdate {
        nickname: Some("budi_s".into()),
        photo_url: Some(None),
        avatar_color: None,
    };
    assert!(storage.update_profile(&user_id, &update).await.expect("update"));
    let profile = storage.profile(&user_id).await.expect("read").expect("exists");
    assert_eq!(profile.nickname, "budi_s");
    assert_eq!(profile.photo_url, None);
    assert_eq!(profile.avatar_color, "bg-teal-500");
    assert!(profile.updated_at.is_some());

    assert!(!storage
        .update_profile(&UserId::new("ghost"), &update)
        .await
        .expect("missing"));
}

#[tokio::test]
async fn auth_users_are_keyed_by_lowercase_email() {
    let storage = memory_storage().await;
    let user = AuthUser {
        id: UserId::new("u-1"),
        email: "Budi@Rangkul.ID".into(),
        password_hash: "hash".into(),
        created_at: Utc::now(),
        last_login: None,
    };
    storage.insert_auth_user(&user).await.expect("insert");
    assert!(storage.insert_auth_user(&user).await.is_err());

    let found = storage
        .auth_user_by_email("budi@rangkul.id")
        .await
        .expect("lookup")
        .expect("exists");
    assert_eq!(found.email, "budi@rangkul.id");
    assert!(found.last_login.is_none());

    assert!(storage.record_login(&user.id, Utc::now()).await.expect("login"));
    let found = storage
        .auth_user_by_email("BUDI@rangkul.id")
        .await
        .expect("lookup")
        .expect("exists");
    assert!(found.last_login.is_some());
}

#[tokio::test]
async fn message_watch_emits_initial_and_changed_snapshots() {
    let storage = memory_storage().await;
    let channel_id = ChannelId::new("chan-1");
    let mut query = storage.watch_channel_messages(&channel_id);

    let initial = query.next().await.expect("snapshot").expect("ok");
    assert!(initial.is_empty());

    storage
        .insert_message(&new_message(&ChannelId::new("other"), "bob", "ignored"))
        .await
        .expect("other");
    storage
        .insert_message(&new_message(&channel_id, "alice", "halo"))
        .await
        .expect("message");

    let snapshot = tokio::time::timeout(Duration::from_secs(2), query.next())
        .await
        .expect("timely snapshot")
        .expect("snapshot")
        .expect("ok");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].content, "halo");
}

#[tokio::test]
async fn released_watch_stops_delivering() {
    let storage = memory_storage().await;
    let owner = UserId::new("owner-1");
    let (handle, mut stream) = storage.watch_member_servers(&owner).split();

    assert!(stream.next().await.expect("snapshot").expect("ok").is_empty());
    drop(handle);

    storage.create_server("ops", &owner, None).await.expect("server");
    let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream closes");
    assert!(next.is_none());
}
