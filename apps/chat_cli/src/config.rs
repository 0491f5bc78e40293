use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub auth_token: Option<String>,
    pub user_id: String,
    pub display_name: String,
    pub handle: String,
    pub avatar_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            auth_token: None,
            user_id: "dev".into(),
            display_name: "Dev User".into(),
            handle: "dev".into(),
            avatar_url: String::new(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("client.toml") {
        apply_file_overrides(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("CHAT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("CHAT_AUTH_TOKEN") {
        settings.auth_token = Some(v);
    }
    if let Ok(v) = std::env::var("CHAT_USER_ID") {
        settings.user_id = v;
    }
    if let Ok(v) = std::env::var("CHAT_DISPLAY_NAME") {
        settings.display_name = v;
    }
    if let Ok(v) = std::env::var("CHAT_HANDLE") {
        settings.handle = v;
    }
    if let Ok(v) = std::env::var("CHAT_AVATAR_URL") {
        settings.avatar_url = v;
    }

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("server_url") {
        settings.server_url = v.clone();
    }
    if let Some(v) = file_cfg.get("auth_token") {
        settings.auth_token = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("user_id") {
        settings.user_id = v.clone();
    }
    if let Some(v) = file_cfg.get("display_name") {
        settings.display_name = v.clone();
    }
    if let Some(v) = file_cfg.get("handle") {
        settings.handle = v.clone();
    }
    if let Some(v) = file_cfg.get("avatar_url") {
        settings.avatar_url = v.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_replace_only_named_keys() {
        let mut settings = Settings::default();
        apply_file_overrides(
            &mut settings,
            r#"
                server_url = "https://chat.example.com"
                user_id = "u42"
                auth_token = "secret"
            "#,
        );

        assert_eq!(settings.server_url, "https://chat.example.com");
        assert_eq!(settings.user_id, "u42");
        assert_eq!(settings.auth_token.as_deref(), Some("secret"));
        assert_eq!(settings.display_name, "Dev User");
    }

    #[test]
    fn invalid_toml_leaves_defaults_untouched() {
        let mut settings = Settings::default();
        apply_file_overrides(&mut settings, "not = [valid");
        assert_eq!(settings.server_url, Settings::default().server_url);
    }
}
