use chrono::{DateTime, Utc};
use gateway::SharedDatabase;
use rand::Rng;
use shared::{
    domain::{Role, ServerId, UserId},
    error::{ApiError, ApiResult},
    model::{InviteRecord, NewInvite},
};
use tracing::info;
use url::Url;

pub const INVITE_CODE_LEN: usize = 9;
const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const INVITE_PATH_SEGMENT: &str = "invite";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InviteOptions {
    pub expires_at: Option<DateTime<Utc>>,
    /// Zero or `None` means unlimited.
    pub max_uses: Option<u32>,
}

pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

/// `<origin>/invite/<code>`; any path or query on `base` is dropped.
pub fn invite_link(base: &str, code: &str) -> ApiResult<String> {
    let base = Url::parse(base)
        .map_err(|err| ApiError::validation(format!("Invalid base URL '{base}': {err}")))?;
    Ok(format!(
        "{}/{INVITE_PATH_SEGMENT}/{}",
        base.origin().ascii_serialization(),
        code.trim().to_uppercase()
    ))
}

/// Accepts either a bare code or a deep link and returns the upper-cased code.
pub fn parse_invite_code(link_or_code: &str) -> Option<String> {
    let input = link_or_code.trim();
    let code = match Url::parse(input) {
        Ok(url) => {
            let mut segments = url.path_segments()?;
            segments.find(|segment| *segment == INVITE_PATH_SEGMENT)?;
            segments.next()?.to_string()
        }
        Err(_) => input.trim_start_matches('/').trim_start_matches("invite/").to_string(),
    };
    let valid = !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| code.to_uppercase())
}

pub struct InviteService {
    db: SharedDatabase,
}

impl InviteService {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    pub async fn create_invite(
        &self,
        server_id: &ServerId,
        server_name: &str,
        created_by: &UserId,
        options: InviteOptions,
    ) -> ApiResult<InviteRecord> {
        let invite = self
            .db
            .create_invite(&NewInvite {
                code: generate_invite_code(),
                server_id: server_id.clone(),
                server_name: server_name.to_string(),
                created_by: created_by.clone(),
                expires_at: options.expires_at,
                max_uses: options.max_uses,
            })
            .await?;
        info!(%server_id, code = %invite.code, "invite created");
        Ok(invite)
    }

    /// Looks the code up case-insensitively and checks expiry and usage.
    pub async fn validate(&self, code: &str) -> ApiResult<InviteRecord> {
        let invite = self
            .db
            .find_invite(code)
            .await?
            .ok_or_else(|| ApiError::not_found("Invite not found"))?;
        invite.check_usable(Utc::now())?;
        Ok(invite)
    }

    /// Joins `user_id` to the invite's server and counts the use.
    pub async fn accept(&self, code: &str, user_id: &UserId) -> ApiResult<ServerId> {
        let invite = self.validate(code).await?;
        self.db
            .add_member(&invite.server_id, user_id, Role::Member)
            .await?;
        self.db.record_invite_use(&invite.id).await?;
        info!(server_id = %invite.server_id, %user_id, code = %invite.code, "invite accepted");
        Ok(invite.server_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_upper_alphanumeric() {
        for _ in 0..32 {
            let code = generate_invite_code();
            assert_eq!(code.len(), INVITE_CODE_LEN);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn invite_link_uses_origin_only() {
        let link = invite_link("https://rangkul.id/dashboard/community?x=1", "abc123xyz")
            .expect("link");
        assert_eq!(link, "https://rangkul.id/invite/ABC123XYZ");
        assert!(invite_link("not a url", "ABC").is_err());
    }

    #[test]
    fn parses_links_and_bare_codes() {
        assert_eq!(
            parse_invite_code("https://rangkul.id/invite/abc123xyz").as_deref(),
            Some("ABC123XYZ")
        );
        assert_eq!(parse_invite_code(" abc123xyz ").as_deref(), Some("ABC123XYZ"));
        assert_eq!(parse_invite_code("/invite/Q1W2E3R4T").as_deref(), Some("Q1W2E3R4T"));
        assert_eq!(parse_invite_code("https://rangkul.id/jobs"), None);
        assert_eq!(parse_invite_code(""), None);
        assert_eq!(parse_invite_code("bad code!"), None);
    }
}
