use std::sync::Arc;

use gateway::SharedDatabase;
use identity::new_profile;
use shared::{
    domain::UserId,
    error::{ApiError, ApiResult},
    model::{ProfileUpdate, UserProfile},
    validation::{validate_nickname, validate_photo_upload},
};
use tracing::info;

use crate::media::{MediaHost, PhotoUpload};

pub const PHOTO_FOLDER_PREFIX: &str = "rangkul-users";

pub fn photo_folder(user_id: &UserId) -> String {
    format!("{PHOTO_FOLDER_PREFIX}/{user_id}")
}

/// Public profile reads and edits for the signed-in user.
pub struct ProfileService {
    db: SharedDatabase,
    media: Arc<dyn MediaHost>,
}

impl ProfileService {
    pub fn new(db: SharedDatabase, media: Arc<dyn MediaHost>) -> Self {
        Self { db, media }
    }

    pub async fn load(&self, user_id: &UserId) -> ApiResult<Option<UserProfile>> {
        self.db.get_profile(user_id).await
    }

    /// Returns the stored profile, creating one from `nickname` when absent.
    pub async fn ensure_profile(
        &self,
        user_id: &UserId,
        email: &str,
        nickname: &str,
    ) -> ApiResult<UserProfile> {
        if let Some(profile) = self.db.get_profile(user_id).await? {
            return Ok(profile);
        }
        let profile = new_profile(user_id, email, nickname);
        self.db.create_profile(&profile).await?;
        info!(%user_id, "profile created");
        Ok(profile)
    }

    /// First-run nickname choice; the 3..=20 character rule applies.
    pub async fn complete_nickname_setup(&self, user_id: &UserId, nickname: &str) -> ApiResult<String> {
        let nickname = validate_nickname(nickname)?;
        self.write(
            user_id,
            ProfileUpdate {
                nickname: Some(nickname.clone()),
                ..ProfileUpdate::default()
            },
        )
        .await?;
        Ok(nickname)
    }

    pub async fn update_nickname(&self, user_id: &UserId, nickname: &str) -> ApiResult<String> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ApiError::validation("Nickname must not be empty"));
        }
        self.write(
            user_id,
            ProfileUpdate {
                nickname: Some(nickname.to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await?;
        Ok(nickname.to_string())
    }

    /// Validates the file, hands it to the media host, then stores the returned URL.
    pub async fn upload_photo(&self, user_id: &UserId, upload: PhotoUpload) -> ApiResult<String> {
        validate_photo_upload(&upload.mime_type, upload.bytes.len())?;
        let url = self.media.upload(upload, &photo_folder(user_id)).await?;
        self.write(
            user_id,
            ProfileUpdate {
                photo_url: Some(Some(url.clone())),
                ..ProfileUpdate::default()
            },
        )
        .await?;
        Ok(url)
    }

    /// Clears the profile reference only; the hosted file is left in place.
    pub async fn remove_photo(&self, user_id: &UserId) -> ApiResult<()> {
        self.write(
            user_id,
            ProfileUpdate {
                photo_url: Some(None),
                ..ProfileUpdate::default()
            },
        )
        .await
    }

    async fn write(&self, user_id: &UserId, update: ProfileUpdate) -> ApiResult<()> {
        self.db.update_profile(user_id, &update).await?;
        info!(%user_id, "profile updated");
        Ok(())
    }
}
