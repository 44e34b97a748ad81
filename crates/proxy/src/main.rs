use anyhow::Result;
use clap::Parser;
use proxy::{ProxyConfig, ProxyServer, DEFAULT_BIND, DEFAULT_MODEL, DEFAULT_UPSTREAM};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "npc-proxy")]
#[command(
    about = "Forwards NPC Helper chat requests to the model vendor with a server-side key",
    long_about = None
)]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PROXY_BIND", default_value = DEFAULT_BIND)]
    bind: String,

    /// Vendor API key attached to every forwarded request
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Vendor base URL
    #[arg(long, env = "UPSTREAM_BASE_URL", default_value = DEFAULT_UPSTREAM)]
    upstream: String,

    /// Model used when a request does not name one
    #[arg(long, env = "DEFAULT_MODEL", default_value = DEFAULT_MODEL)]
    default_model: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let server = ProxyServer::bind(ProxyConfig {
        bind: args.bind,
        api_key: args.api_key,
        upstream_base_url: args.upstream,
        default_model: args.default_model,
    })?;
    server.run();
    Ok(())
}
