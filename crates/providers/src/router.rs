use crate::openai::{OpenAIClient, DEFAULT_BASE_URL};
use anyhow::Result;
use shared::settings::{AppSettings, ProviderAuth};

/// Which endpoint a chat turn goes to.
///
/// With an API key the client talks to the vendor directly and may use tools.
/// Without one it falls back to plain streaming through the proxy, which
/// holds the key server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRoute {
    Direct {
        model: String,
        api_key: String,
        base_url: String,
    },
    Proxy {
        model: String,
        proxy_url: String,
    },
}

impl ChatRoute {
    pub fn select(settings: &AppSettings) -> Self {
        let model = settings.model.openai_model.clone();
        match settings.api_key() {
            Some(api_key) => ChatRoute::Direct {
                model,
                api_key,
                base_url: settings
                    .model
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            },
            None => ChatRoute::Proxy {
                model,
                proxy_url: settings.proxy_url().to_string(),
            },
        }
    }

    /// Tool definitions are only sent on the direct route.
    pub fn supports_tools(&self) -> bool {
        matches!(self, ChatRoute::Direct { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChatRoute::Direct { .. } => "direct",
            ChatRoute::Proxy { .. } => "proxy",
        }
    }

    pub fn client(&self) -> Result<OpenAIClient> {
        match self {
            ChatRoute::Direct {
                model,
                api_key,
                base_url,
            } => OpenAIClient::from_auth(
                model,
                &ProviderAuth {
                    api_key: Some(api_key.clone()),
                },
                Some(base_url),
            ),
            ChatRoute::Proxy { model, proxy_url } => Ok(OpenAIClient::via_proxy(model, proxy_url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_selects_direct_route() {
        let mut settings = AppSettings::default();
        settings.model.openai_auth.api_key = Some("sk-abc".into());
        settings.model.openai_base_url = Some("http://localhost:1234".into());

        let route = ChatRoute::select(&settings);
        assert!(route.supports_tools());
        assert_eq!(route.label(), "direct");
        let client = route.client().unwrap();
        assert_eq!(client.endpoint(), "http://localhost:1234/v1/chat/completions");
        assert!(client.has_key());
    }

    #[test]
    fn test_proxy_route_has_no_tools() {
        let route = ChatRoute::Proxy {
            model: "gpt-4o-mini".into(),
            proxy_url: "http://127.0.0.1:8787".into(),
        };
        assert!(!route.supports_tools());
        let client = route.client().unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:8787/api/chat");
        assert!(!client.has_key());
    }
}
