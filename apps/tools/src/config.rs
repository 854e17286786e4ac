use std::{collections::HashMap, fs};

use client_core::RollbackPolicy;
use identity::{SessionConfig, DEFAULT_SESSION_TTL_SECONDS};
use tracing::warn;

pub const CONFIG_FILE: &str = "rangkul.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Empty selects the offline gateway.
    pub database_url: String,
    pub session_secret: String,
    pub session_ttl_seconds: i64,
    pub media_upload_url: Option<String>,
    pub media_upload_preset: String,
    pub invite_base_url: String,
    pub rollback_policy: RollbackPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/rangkul.db".into(),
            session_secret: "dev-session-secret".into(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            media_upload_url: None,
            media_upload_preset: client_core::media::DEFAULT_UPLOAD_PRESET.into(),
            invite_base_url: "http://localhost:3000".into(),
            rollback_policy: RollbackPolicy::default(),
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.session_secret.clone());
        config.ttl_seconds = self.session_ttl_seconds;
        config
    }

    pub fn is_offline(&self) -> bool {
        self.database_url.trim().is_empty()
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(CONFIG_FILE).ok();
    resolve_settings(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the flat `rangkul.toml` table, then environment variables.
pub fn resolve_settings(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, String>>(raw) {
            Ok(file_cfg) => apply(&mut settings, |key| file_cfg.get(key).cloned()),
            Err(error) => warn!(%error, file = CONFIG_FILE, "ignoring malformed config file"),
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    apply(&mut settings, |key| env(&format!("APP__{}", key.to_ascii_uppercase())));

    settings.database_url = normalize_database_url(&settings.database_url);
    settings
}

fn apply(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("session_secret") {
        settings.session_secret = v;
    }
    if let Some(v) = lookup("session_ttl_seconds") {
        match v.parse::<i64>() {
            Ok(parsed) if parsed > 0 => settings.session_ttl_seconds = parsed,
            _ => warn!(value = %v, "ignoring invalid session_ttl_seconds"),
        }
    }
    if let Some(v) = lookup("media_upload_url") {
        settings.media_upload_url = Some(v).filter(|url| !url.trim().is_empty());
    }
    if let Some(v) = lookup("media_upload_preset") {
        settings.media_upload_preset = v;
    }
    if let Some(v) = lookup("invite_base_url") {
        settings.invite_base_url = v;
    }
    if let Some(v) = lookup("rollback_policy") {
        match v.parse::<RollbackPolicy>() {
            Ok(policy) => settings.rollback_policy = policy,
            Err(error) => warn!(%error, "ignoring invalid rollback_policy"),
        }
    }
}

/// Plain paths become `sqlite://` URLs; an empty value stays empty.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty()
        || raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(normalize_database_url("./data/test.db"), "sqlite://./data/test.db");
        assert_eq!(normalize_database_url("sqlite:data\\x.db"), "sqlite://data/x.db");
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_database_url("  "), "");
    }

    #[test]
    fn environment_overrides_file_which_overrides_defaults() {
        let file = r#"
database_url = "./file.db"
session_secret = "from-file"
rollback_policy = "single-entity"
"#;
        let settings = resolve_settings(
            Some(file),
            env_of(&[
                ("APP__SESSION_SECRET", "from-env"),
                ("APP__SESSION_TTL_SECONDS", "60"),
                ("APP__MEDIA_UPLOAD_URL", "https://media.test/upload"),
            ]),
        );

        assert_eq!(settings.database_url, "sqlite://./file.db");
        assert_eq!(settings.session_secret, "from-env");
        assert_eq!(settings.session_config().ttl_seconds, 60);
        assert_eq!(settings.rollback_policy, RollbackPolicy::SingleEntity);
        assert_eq!(
            settings.media_upload_url.as_deref(),
            Some("https://media.test/upload")
        );
        assert_eq!(settings.media_upload_preset, "RANGKUL");
    }

    #[test]
    fn app_database_url_wins_over_plain_and_empty_means_offline() {
        let settings = resolve_settings(
            None,
            env_of(&[("DATABASE_URL", "./plain.db"), ("APP__DATABASE_URL", "")]),
        );
        assert!(settings.is_offline());

        let settings = resolve_settings(None, env_of(&[("DATABASE_URL", "./plain.db")]));
        assert_eq!(settings.database_url, "sqlite://./plain.db");
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let settings = resolve_settings(
            Some("not = [valid"),
            env_of(&[
                ("APP__SESSION_TTL_SECONDS", "soon"),
                ("APP__ROLLBACK_POLICY", "partial"),
            ]),
        );
        assert_eq!(settings, Settings::default());
    }
}
