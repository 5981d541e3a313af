use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;

#[derive(Parser, Debug, Clone)]
#[command(name = "quill-stats", about = "Blog backend with dashboard analytics")]
pub struct Args {
    #[arg(long, env = "QUILL_LISTEN", default_value = ":7070")]
    pub listen: String,
    #[arg(long, env = "QUILL_DB_PATH", default_value = "quill_stats.duckdb")]
    pub db_path: String,
    /// Bearer token for admin routes. Admin routes reject every request when unset.
    #[arg(long, env = "QUILL_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,
    #[arg(long, env = "QUILL_MAX_PAGE_SIZE", default_value_t = 50)]
    pub max_page_size: i64,
    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, env = "QUILL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

pub fn normalize_listen_addr(listen: &str) -> Result<SocketAddr, anyhow::Error> {
    if listen.starts_with(':') {
        let normalized = format!("0.0.0.0{}", listen);
        return normalized
            .parse()
            .with_context(|| format!("invalid listen address {}", listen));
    }
    listen
        .parse()
        .with_context(|| format!("invalid listen address {}", listen))
}
