use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use webpilot::chrome::ChromeEngine;
use webpilot::plugins::{ExecPlugin, FsPlugin};
use webpilot::server::{self, AppState};
use webpilot::{
    Config, CookieJar, DispatchLimits, Dispatcher, Plugin, PluginRegistry, SessionManager,
    SqliteStore, StateStore,
};

#[derive(Parser)]
#[command(name = "webpilot", about = "Planner-driven browser automation service")]
struct Cli {
    #[arg(long, default_value_t = 4321)]
    port: u16,
    /// Force headless mode regardless of the HEADLESS env var.
    #[arg(long)]
    headless: bool,
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if cli.headless {
        config.headless = true;
    }
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    init_tracing(config.debug);
    tracing::debug!(?config, "starting up");

    let store: Arc<dyn StateStore> = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let engine = Arc::new(ChromeEngine::new(&config));
    let sessions = Arc::new(SessionManager::new(
        engine,
        CookieJar::new(config.cookies_file.clone()),
    ));
    let registry = Arc::new(PluginRegistry::new(vec![
        Arc::new(ExecPlugin::new(config.shell.clone())) as Arc<dyn Plugin>,
        Arc::new(FsPlugin::new(config.files_root.clone())) as Arc<dyn Plugin>,
    ]));
    let dispatcher = Arc::new(Dispatcher::new(
        sessions,
        Arc::clone(&registry),
        Arc::clone(&store),
        DispatchLimits {
            max_snapshot_chars: config.max_snapshot_chars,
            ..DispatchLimits::default()
        },
    ));

    let app = server::router(AppState {
        dispatcher,
        registry,
        store,
    });

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", cli.port)).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(debug: bool) {
    let default = if debug { "webpilot=debug" } else { "webpilot=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}
