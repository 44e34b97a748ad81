//! Chat proxy - forwards chat completions with a server-side API key
//!
//! Clients without a key POST their request to `/api/chat`; the proxy fills in
//! a default model, attaches the bearer key and relays the vendor's response.
//! Streaming responses are piped through as they arrive.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, info, warn};

pub const CHAT_PATH: &str = "/api/chat";
pub const HEALTH_PATH: &str = "/health";
pub const UPSTREAM_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_UPSTREAM: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

type BoxedResponse = Response<Box<dyn Read + Send>>;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind: String,
    pub api_key: Option<String>,
    pub upstream_base_url: String,
    pub default_model: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            api_key: None,
            upstream_base_url: DEFAULT_UPSTREAM.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl ProxyConfig {
    pub fn upstream_endpoint(&self) -> String {
        format!(
            "{}{}",
            self.upstream_base_url.trim_end_matches('/'),
            UPSTREAM_COMPLETIONS_PATH
        )
    }

    /// Blank keys count as missing.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.upstream_base_url)
            .with_context(|| format!("invalid upstream URL: {}", self.upstream_base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("upstream URL must be http or https: {}", self.upstream_base_url);
        }
        Ok(())
    }
}

pub struct ProxyServer {
    server: Server,
    config: Arc<ProxyConfig>,
    client: Client,
}

impl ProxyServer {
    pub fn bind(config: ProxyConfig) -> Result<Self> {
        config.validate()?;
        let server = Server::http(&config.bind)
            .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", config.bind, e))?;
        // No overall timeout: streamed completions can run for minutes
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None)
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self {
            server,
            config: Arc::new(config),
            client,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serve forever, one thread per request so a long stream never blocks others.
    pub fn run(self) {
        if self.config.api_key().is_none() {
            warn!("no upstream API key configured; chat requests will fail with 500");
        }
        info!(
            addr = ?self.local_addr(),
            upstream = %self.config.upstream_endpoint(),
            "proxy listening"
        );
        for request in self.server.incoming_requests() {
            let config = self.config.clone();
            let client = self.client.clone();
            thread::spawn(move || handle(request, &config, &client));
        }
    }
}

fn handle(mut request: Request, config: &ProxyConfig, client: &Client) {
    let method = request.method().clone();
    let path = request.url().split('?').next().unwrap_or("").to_string();

    let response = match (&method, path.as_str()) {
        (Method::Options, _) => Response::empty(StatusCode(204)).boxed(),
        (Method::Get, HEALTH_PATH) => text_response(200, "ok"),
        (Method::Post, CHAT_PATH) => forward_chat(&mut request, config, client),
        _ => json_error(404, &format!("no route for {} {}", method, path)),
    };
    let response = with_cors(response);

    info!(method = %method, path = %path, status = response.status_code().0, "request");
    if let Err(e) = request.respond(response) {
        debug!(error = %e, "client went away before the response finished");
    }
}

fn forward_chat(request: &mut Request, config: &ProxyConfig, client: &Client) -> BoxedResponse {
    let Some(key) = config.api_key() else {
        return json_error(500, "proxy has no upstream API key configured");
    };

    let body = match read_body(request) {
        Ok(Some(body)) => body,
        Ok(None) => return json_error(413, "request body exceeds 1 MiB"),
        Err(e) => return json_error(400, &format!("failed to read request body: {}", e)),
    };

    let mut payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return json_error(400, &format!("invalid JSON: {}", e)),
    };
    let Some(fields) = payload.as_object_mut() else {
        return json_error(400, "request body must be a JSON object");
    };
    let has_model = fields
        .get("model")
        .and_then(Value::as_str)
        .is_some_and(|m| !m.trim().is_empty());
    if !has_model {
        fields.insert("model".into(), Value::String(config.default_model.clone()));
    }
    let stream = fields.get("stream").and_then(Value::as_bool) == Some(true);

    let upstream = match client
        .post(config.upstream_endpoint())
        .bearer_auth(key)
        .json(&payload)
        .send()
    {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "upstream request failed");
            return json_error(502, &format!("upstream unreachable: {}", e));
        }
    };

    let status = upstream.status().as_u16();
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    debug!(status, stream, content_type = %content_type, "upstream responded");

    let response = if stream {
        // Unknown length: tiny_http sends it chunked as the vendor produces it
        Response::new(StatusCode(status), Vec::new(), upstream, None, None).boxed()
    } else {
        match upstream.bytes() {
            Ok(bytes) => Response::from_data(bytes.to_vec())
                .with_status_code(StatusCode(status))
                .boxed(),
            Err(e) => return json_error(502, &format!("upstream body failed: {}", e)),
        }
    };
    with_header(response, "Content-Type", &content_type)
}

/// `Ok(None)` when the body is larger than `MAX_BODY_BYTES`.
fn read_body(request: &mut Request) -> std::io::Result<Option<Vec<u8>>> {
    if request.body_length().is_some_and(|len| len > MAX_BODY_BYTES) {
        return Ok(None);
    }
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES as u64 + 1)
        .read_to_end(&mut body)?;
    if body.len() > MAX_BODY_BYTES {
        return Ok(None);
    }
    Ok(Some(body))
}

fn text_response(status: u16, text: &str) -> BoxedResponse {
    let response = Response::new(
        StatusCode(status),
        Vec::new(),
        Cursor::new(text.as_bytes().to_vec()),
        Some(text.len()),
        None,
    )
    .boxed();
    with_header(response, "Content-Type", "text/plain; charset=utf-8")
}

fn json_error(status: u16, message: &str) -> BoxedResponse {
    let body = serde_json::json!({ "error": message }).to_string();
    let response = Response::from_data(body.into_bytes())
        .with_status_code(StatusCode(status))
        .boxed();
    with_header(response, "Content-Type", "application/json")
}

fn with_header(response: BoxedResponse, name: &str, value: &str) -> BoxedResponse {
    match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
        Ok(header) => response.with_header(header).boxed(),
        Err(()) => response,
    }
}

fn with_cors(response: BoxedResponse) -> BoxedResponse {
    let response = with_header(response, "Access-Control-Allow-Origin", "*");
    let response = with_header(response, "Access-Control-Allow-Methods", "GET, POST, OPTIONS");
    with_header(
        response,
        "Access-Control-Allow-Headers",
        "Content-Type, Authorization",
    )
}
