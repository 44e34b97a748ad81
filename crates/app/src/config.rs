//! Settings persisted in the key-value store

use anyhow::{bail, Result};
use services::storage::{KeyValueStore, StoreExt};
use shared::settings::AppSettings;

pub const SETTINGS_KEY: &str = "settings";

/// Load settings, returning whether they were found in the store.
pub fn load_settings_or_default(store: &dyn KeyValueStore) -> Result<(AppSettings, bool)> {
    match store.get_as::<AppSettings>(SETTINGS_KEY)? {
        Some(settings) => Ok((settings, true)),
        None => Ok((AppSettings::default(), false)),
    }
}

pub fn save_settings(store: &dyn KeyValueStore, settings: &AppSettings) -> Result<()> {
    store.set_as(SETTINGS_KEY, settings)?;
    Ok(())
}

/// Show only the last four characters of a key.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// Human-readable summary for `config show`.
pub fn describe(settings: &AppSettings) -> String {
    let key = match (&settings.model.openai_auth.api_key, settings.api_key()) {
        (Some(_), Some(k)) => format!("{} (settings)", mask_key(&k)),
        (None, Some(k)) => format!("{} (OPENAI_API_KEY)", mask_key(&k)),
        (_, None) => "not set (using proxy)".to_string(),
    };
    let mut out = String::new();
    out.push_str(&format!("model:          {}\n", settings.model.openai_model));
    out.push_str(&format!("api key:        {}\n", key));
    out.push_str(&format!("proxy url:      {}\n", settings.proxy_url()));
    if let Some(base) = &settings.model.openai_base_url {
        out.push_str(&format!("vendor url:     {}\n", base));
    }
    out.push_str(&format!(
        "game socket:    {}\n",
        settings.game.websocket_url.as_deref().unwrap_or("not set (host)")
    ));
    out.push_str(&format!("max tool depth: {}\n", settings.max_tool_depth));
    out.push_str(&format!("history limit:  {}", settings.history_limit));
    out
}

pub fn check_url(url: &str, schemes: &[&str]) -> Result<String> {
    let parsed = url::Url::parse(url.trim())?;
    if !schemes.contains(&parsed.scheme()) {
        bail!("expected a {} URL, got '{}'", schemes.join("/"), url);
    }
    Ok(url.trim().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::storage::MemoryStore;

    #[test]
    fn test_roundtrip_through_store() {
        let store = MemoryStore::new();
        let (settings, found) = load_settings_or_default(&store).unwrap();
        assert!(!found);
        assert_eq!(settings.max_tool_depth, 5);

        let mut settings = settings;
        settings.model.openai_model = "gpt-4o".into();
        save_settings(&store, &settings).unwrap();

        let (loaded, found) = load_settings_or_default(&store).unwrap();
        assert!(found);
        assert_eq!(loaded.model.openai_model, "gpt-4o");
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijkl"), "****ijkl");
        assert_eq!(mask_key("short"), "****");
    }

    #[test]
    fn test_check_url() {
        assert_eq!(
            check_url("http://localhost:8787/", &["http", "https"]).unwrap(),
            "http://localhost:8787"
        );
        assert!(check_url("ws://game:9001", &["http", "https"]).is_err());
        assert!(check_url("not a url", &["ws", "wss"]).is_err());
    }

    #[test]
    fn test_describe_mentions_model_and_proxy() {
        let mut settings = AppSettings::default();
        settings.model.openai_auth.api_key = Some("sk-1234567890".into());
        let text = describe(&settings);
        assert!(text.contains("gpt-4o-mini"));
        assert!(text.contains("****7890 (settings)"));
        assert!(text.contains("http://127.0.0.1:8787"));
    }
}
