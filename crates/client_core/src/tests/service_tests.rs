use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gateway::{Database, SharedDatabase};
use shared::{
    domain::{Role, ServerId, UserId},
    error::{ApiResult, ErrorCode},
    model::NewInvite,
};
use storage::Storage;

use crate::{
    invites::{InviteOptions, InviteService},
    media::{MediaHost, MissingMediaHost, PhotoUpload},
    profiles::ProfileService,
};

async fn database() -> (Storage, SharedDatabase) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    (storage.clone(), Arc::new(storage))
}

async fn server(storage: &Storage) -> ServerId {
    storage
        .create_server("Rangkul", &UserId::new("owner"), None)
        .await
        .expect("server")
}

#[tokio::test]
async fn accepting_an_invite_joins_and_counts_the_use() {
    let (storage, db) = database().await;
    let server_id = server(&storage).await;
    let invites = InviteService::new(db.clone());

    let invite = invites
        .create_invite(
            &server_id,
            "Rangkul",
            &UserId::new("owner"),
            InviteOptions::default(),
        )
        .await
        .expect("invite");
    assert_eq!(invite.code.len(), 9);
    assert_eq!(invite.server_name, "Rangkul");

    let joined = invites
        .accept(&invite.code.to_lowercase(), &UserId::new("budi"))
        .await
        .expect("accept");
    assert_eq!(joined, server_id);

    let members = db.list_members(&server_id).await.expect("members");
    let budi = members
        .iter()
        .find(|m| m.user_id == UserId::new("budi"))
        .expect("budi joined");
    assert_eq!(budi.role, Role::Member);
    let stored = db
        .find_invite(&invite.code)
        .await
        .expect("find")
        .expect("invite");
    assert_eq!(stored.uses, 1);
}

#[tokio::test]
async fn exhausted_invite_reports_limit_reached() {
    let (storage, db) = database().await;
    let server_id = server(&storage).await;
    let invite = db
        .create_invite(&NewInvite {
            code: "ABC123XYZ".into(),
            server_id,
            server_name: "Rangkul".into(),
            created_by: UserId::new("owner"),
            expires_at: None,
            max_uses: Some(1),
        })
        .await
        .expect("invite");
    db.record_invite_use(&invite.id).await.expect("use");

    let invites = InviteService::new(db);
    let err = invites.validate("ABC123XYZ").await.expect_err("exhausted");
    assert_eq!(err.code, ErrorCode::MaxUses);
    assert_eq!(err.message, "Invite limit reached");

    let err = invites
        .accept("abc123xyz", &UserId::new("budi"))
        .await
        .expect_err("accept exhausted");
    assert_eq!(err.code, ErrorCode::MaxUses);
}

#[tokio::test]
async fn expired_and_unknown_invites_are_rejected() {
    let (storage, db) = database().await;
    let server_id = server(&storage).await;
    let invites = InviteService::new(db);
    let invite = invites
        .create_invite(
            &server_id,
            "Rangkul",
            &UserId::new("owner"),
            InviteOptions {
                expires_at: Some(Utc::now() - Duration::hours(1)),
                max_uses: None,
            },
        )
        .await
        .expect("invite");

    let err = invites.validate(&invite.code).await.expect_err("expired");
    assert_eq!(err.code, ErrorCode::Expired);
    assert_eq!(err.message, "Invite expired");

    let err = invites.validate("NOPE12345").await.expect_err("unknown");
    assert_eq!(err.code, ErrorCode::NotFound);
    assert_eq!(err.message, "Invite not found");
}

#[tokio::test]
async fn unlimited_invite_accepts_many_members() {
    let (storage, db) = database().await;
    let server_id = server(&storage).await;
    let invites = InviteService::new(db);
    let invite = invites
        .create_invite(
            &server_id,
            "Rangkul",
            &UserId::new("owner"),
            InviteOptions {
                expires_at: None,
                max_uses: Some(0),
            },
        )
        .await
        .expect("invite");

    for user in ["budi", "ayu", "dewi"] {
        invites
            .accept(&invite.code, &UserId::new(user))
            .await
            .expect("accept");
    }
    assert_eq!(invites.validate(&invite.code).await.expect("valid").uses, 3);
}

#[derive(Default)]
struct RecordingMediaHost {
    uploads: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MediaHost for RecordingMediaHost {
    async fn upload(&self, upload: PhotoUpload, folder: &str) -> ApiResult<String> {
        self.uploads
            .lock()
            .expect("uploads")
            .push((upload.filename.clone(), folder.to_string()));
        Ok(format!("https://media.test/{folder}/{}", upload.filename))
    }
}

fn photo(mime_type: &str, size: usize) -> PhotoUpload {
    PhotoUpload {
        filename: "avatar.png".into(),
        mime_type: mime_type.into(),
        bytes: vec![0; size],
    }
}

#[tokio::test]
async fn ensure_profile_creates_once() {
    let (_, db) = database().await;
    let profiles = ProfileService::new(db, Arc::new(MissingMediaHost));
    let user = UserId::new("sari");

    let created = profiles
        .ensure_profile(&user, "sari@rangkul.id", "Sari")
        .await
        .expect("create");
    let again = profiles
        .ensure_profile(&user, "sari@rangkul.id", "Lain")
        .await
        .expect("existing");

    assert_eq!(again.nickname, "Sari");
    assert_eq!(again.avatar_color, created.avatar_color);
    assert!(identity::AVATAR_COLORS.contains(&created.avatar_color.as_str()));
}

#[tokio::test]
async fn nickname_setup_enforces_length_and_trims() {
    let (_, db) = database().await;
    let profiles = ProfileService::new(db, Arc::new(MissingMediaHost));
    let user = UserId::new("sari");
    profiles
        .ensure_profile(&user, "sari@rangkul.id", "Sari")
        .await
        .expect("profile");

    let err = profiles
        .complete_nickname_setup(&user, "ab")
        .await
        .expect_err("short");
    assert_eq!(err.code, ErrorCode::Validation);

    let nickname = profiles
        .complete_nickname_setup(&user, "  sari_dev  ")
        .await
        .expect("setup");
    assert_eq!(nickname, "sari_dev");

    profiles
        .update_nickname(&user, " Sari Rahma ")
        .await
        .expect("update");
    let stored = profiles.load(&user).await.expect("load").expect("profile");
    assert_eq!(stored.nickname, "Sari Rahma");
    assert!(stored.updated_at.is_some());

    let err = profiles
        .update_nickname(&user, "   ")
        .await
        .expect_err("blank");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn photo_upload_validates_before_uploading() {
    let (_, db) = database().await;
    let media = Arc::new(RecordingMediaHost::default());
    let profiles = ProfileService::new(db, media.clone());
    let user = UserId::new("sari");
    profiles
        .ensure_profile(&user, "sari@rangkul.id", "Sari")
        .await
        .expect("profile");

    let err = profiles
        .upload_photo(&user, photo("application/pdf", 10))
        .await
        .expect_err("not an image");
    assert_eq!(err.message, "File must be an image");
    let err = profiles
        .upload_photo(&user, photo("image/png", 5 * 1024 * 1024 + 1))
        .await
        .expect_err("too large");
    assert_eq!(err.message, "File size must be less than 5MB");
    assert!(media.uploads.lock().expect("uploads").is_empty());

    let url = profiles
        .upload_photo(&user, photo("image/png", 512))
        .await
        .expect("upload");
    assert_eq!(url, "https://media.test/rangkul-users/sari/avatar.png");
    assert_eq!(
        media.uploads.lock().expect("uploads").as_slice(),
        &[("avatar.png".to_string(), "rangkul-users/sari".to_string())]
    );
    let stored = profiles.load(&user).await.expect("load").expect("profile");
    assert_eq!(stored.photo_url.as_deref(), Some(url.as_str()));

    profiles.remove_photo(&user).await.expect("remove");
    let stored = profiles.load(&user).await.expect("load").expect("profile");
    assert_eq!(stored.photo_url, None);
}

#[tokio::test]
async fn photo_upload_without_media_host_is_unavailable() {
    let (_, db) = database().await;
    let profiles = ProfileService::new(db, Arc::new(MissingMediaHost));
    let err = profiles
        .upload_photo(&UserId::new("sari"), photo("image/jpeg", 128))
        .await
        .expect_err("missing host");
    assert_eq!(err.code, ErrorCode::Unavailable);
}
