use std::env;
use std::path::PathBuf;

use crate::reduce::DEFAULT_MAX_CHARS;

/// Environment-level configuration. Consumed, not owned, by the core;
/// `dotenvy` loads a local `.env` before this is read.
#[derive(Debug, Clone)]
pub struct Config {
    /// HEADLESS: run the browser without a window.
    pub headless: bool,
    /// DEBUG / DEBUG_BROWSER: verbose diagnostic logging.
    pub debug: bool,
    /// DATABASE_URL for the state store.
    pub database_url: String,
    /// COOKIES_FILE: durable cookie jar for persistent sessions.
    pub cookies_file: PathBuf,
    /// FS_BASE_PATH: working-directory root for filesystem plugin actions.
    pub files_root: PathBuf,
    /// SHELL used by the exec plugin.
    pub shell: String,
    /// SNAPSHOT_MAX_CHARS: hard cap on captured page HTML.
    pub max_snapshot_chars: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            headless: env_flag("HEADLESS"),
            debug: env_flag("DEBUG") || env_flag("DEBUG_BROWSER"),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://webpilot.db".into()),
            cookies_file: env::var("COOKIES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".cookies.json")),
            files_root: env::var("FS_BASE_PATH").map(PathBuf::from).unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("webpilot-files")
            }),
            shell: env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into()),
            max_snapshot_chars: env::var("SNAPSHOT_MAX_CHARS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(DEFAULT_MAX_CHARS),
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE")
    )
}
