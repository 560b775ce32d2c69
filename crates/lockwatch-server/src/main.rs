use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use lockwatch_core::tracing_init::init_tracing;
use lockwatch_server::auth::JwtManager;
use lockwatch_server::probe::ProbeConfig;
use lockwatch_server::server::{AppState, router};
use lockwatch_server::storage::ServerDatabase;

#[derive(Parser, Debug)]
#[command(name = "lockwatch-server", about = "Lockwatch presence and control server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "LOCKWATCH_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Path to the SQLite database file. Defaults to ~/.lockwatch/server.db.
    #[arg(long, env = "LOCKWATCH_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Secret used to sign session tokens.
    #[arg(long, env = "LOCKWATCH_JWT_SECRET", default_value = "dev-secret-change-me")]
    jwt_secret: String,

    /// Access token lifetime in seconds.
    #[arg(long, env = "LOCKWATCH_ACCESS_TTL", default_value_t = 3600)]
    access_ttl_secs: i64,

    /// Refresh token lifetime in seconds.
    #[arg(long, env = "LOCKWATCH_REFRESH_TTL", default_value_t = 604_800)]
    refresh_ttl_secs: i64,

    /// Emit JSON log lines instead of the human-readable format.
    #[arg(long, env = "LOCKWATCH_LOG_JSON")]
    log_json: bool,
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".lockwatch").join("server.db"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("lockwatch_server=info,lockwatch_core=info", args.log_json);

    let db_path = match args.db_path {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(db_path = %db_path.display(), "Opening database");
    let db = ServerDatabase::open(&db_path).await?;

    let jwt = Arc::new(JwtManager::new(
        args.jwt_secret.as_bytes(),
        args.access_ttl_secs,
        args.refresh_ttl_secs,
    ));

    let state = AppState::new(db, jwt, ProbeConfig::default());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("Could not bind {}", args.addr))?;
    info!(addr = %args.addr, "Lockwatch server listening");

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tokio::select! {
        result = serve => result.context("Server error")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
