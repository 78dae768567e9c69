//! webpilot: planner-driven browser automation.
//!
//! An external planner (an LLM or a human) issues one typed action at a time;
//! the engine executes it against a real browser session, reduces the
//! resulting DOM into a compact textual snapshot, and persists it so a
//! stateless caller can poll the page state between steps.

pub mod action;
pub mod chrome;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod plugin;
pub mod plugins;
pub mod reduce;
pub mod server;
pub mod session;
pub mod store;

pub use action::{ActionStep, PageState, PersistedAction};
pub use config::Config;
pub use dispatch::{DispatchLimits, Dispatcher};
pub use error::{EngineError, InteractionFailure, PluginFailure, StoreError};
pub use plugin::{ActionSpec, Plugin, PluginRegistry};
pub use session::{BrowserEngine, CookieJar, EngineSession, PageDriver, SessionManager};
pub use store::{MemoryStore, SqliteStore, StateStore};
