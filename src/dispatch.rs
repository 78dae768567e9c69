//! Action dispatcher: classify one planner action, execute it against a
//! session or a plugin, capture the reduced page state, and persist it.
//!
//! Per call the order is strict: primitive, settle delay, best-effort idle
//! wait, reduce, persist. No two browser primitives ever run concurrently
//! against the same page; the browser segment runs inside `spawn_blocking`
//! because the engine API is synchronous.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::action::{ActionStep, PersistedAction};
use crate::error::{EngineError, InteractionFailure, InteractionKind};
use crate::normalize::{normalize_selector, normalize_url};
use crate::plugin::PluginRegistry;
use crate::reduce::{Reduction, reduce};
use crate::session::{PageDriver, SessionManager};
use crate::store::StateStore;

#[derive(Debug, Clone)]
pub struct DispatchLimits {
    /// Fixed pause after a browser primitive, before the idle wait.
    pub settle_delay: Duration,
    /// Bound on the best-effort idle wait; timing out is not an error.
    pub idle_timeout: Duration,
    pub max_snapshot_chars: usize,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(1),
            max_snapshot_chars: crate::reduce::DEFAULT_MAX_CHARS,
        }
    }
}

pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    registry: Arc<PluginRegistry>,
    store: Arc<dyn StateStore>,
    limits: DispatchLimits,
}

/// The browser-domain primitives, after normalization.
enum BrowserCommand {
    Navigate { url: String },
    Click { selector: String },
    Input { selector: String, text: String },
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionManager>,
        registry: Arc<PluginRegistry>,
        store: Arc<dyn StateStore>,
        limits: DispatchLimits,
    ) -> Self {
        Self {
            sessions,
            registry,
            store,
            limits,
        }
    }

    /// Execute one action. Classification is total: every tag either matches
    /// a browser primitive, a registered plugin action, an interactive signal
    /// (`ask`/`terminate`, passed through unexecuted), or fails with
    /// `UnknownAction` before any session is touched.
    pub async fn execute(
        &self,
        action: &PersistedAction,
        persist: bool,
    ) -> Result<Option<String>, EngineError> {
        debug!(tag = action.data.tag(), persist, "dispatching action");
        match &action.data {
            ActionStep::Plugin { name, args } => {
                let plugin = self
                    .registry
                    .plugin_for(name)
                    .ok_or_else(|| EngineError::UnknownAction(name.clone()))?;
                let result = match plugin.handle(name, args).await {
                    Ok(result) => result,
                    Err(failure) => {
                        // Handler failure is data for the planner, not an
                        // error for the caller.
                        warn!(action = %name, "plugin handler failed: {failure}");
                        Some(format!("error: {failure}"))
                    }
                };
                self.store
                    .record_result(action.id, result.as_deref().unwrap_or(""))
                    .await?;
                Ok(result)
            }
            ActionStep::Ask { .. } | ActionStep::Terminate { .. } => Ok(None),
            ActionStep::Navigate { url } => {
                self.run_browser(
                    BrowserCommand::Navigate {
                        url: normalize_url(url),
                    },
                    persist,
                )
                .await
            }
            ActionStep::Click { selector } => {
                self.run_browser(
                    BrowserCommand::Click {
                        selector: normalize_selector(selector),
                    },
                    persist,
                )
                .await
            }
            ActionStep::Input { selector, text } => {
                self.run_browser(
                    BrowserCommand::Input {
                        selector: normalize_selector(selector),
                        text: text.clone(),
                    },
                    persist,
                )
                .await
            }
        }
    }

    async fn run_browser(
        &self,
        command: BrowserCommand,
        persist: bool,
    ) -> Result<Option<String>, EngineError> {
        let sessions = Arc::clone(&self.sessions);
        let limits = self.limits.clone();
        let reduction = tokio::task::spawn_blocking(move || {
            run_browser_command(&sessions, &command, persist, &limits)
        })
        .await
        .map_err(|err| EngineError::Internal(anyhow!("browser task panicked: {err}")))??;

        info!(url = %reduction.url, chars = reduction.html.len(), "captured page state");
        self.store
            .upsert_browser_state(&reduction.url, &reduction.html)
            .await?;
        Ok(None)
    }
}

fn run_browser_command(
    sessions: &SessionManager,
    command: &BrowserCommand,
    persist: bool,
    limits: &DispatchLimits,
) -> Result<Reduction, EngineError> {
    let session = sessions.acquire(persist)?;
    let page = session.handle.page();
    let outcome = drive(page.as_ref(), command, limits);
    sessions.release(session);
    outcome
}

fn drive(
    page: &dyn PageDriver,
    command: &BrowserCommand,
    limits: &DispatchLimits,
) -> Result<Reduction, EngineError> {
    match command {
        BrowserCommand::Navigate { url } => {
            page.navigate(url).map_err(|source| EngineError::Navigation {
                url: url.clone(),
                source,
            })?;
        }
        BrowserCommand::Click { selector } => {
            // Partial progress should still be observable: a click that never
            // landed leaves the page unchanged, and the capture says so.
            if let Err(failure) = click_with_fallback(page, selector) {
                warn!("{failure}; continuing to state capture");
            }
        }
        BrowserCommand::Input { selector, text } => {
            if let Err(failure) = type_text(page, selector, text) {
                warn!("{failure}; continuing to state capture");
            }
        }
    }

    thread::sleep(limits.settle_delay);
    if let Err(err) = page.wait_for_idle(limits.idle_timeout) {
        debug!("idle wait did not settle ({err:#}); proceeding");
    }

    reduce(page, limits.max_snapshot_chars)
}

/// Native click, then an in-page programmatic click for elements hidden from
/// hit-testing (zero-opacity overlays and the like).
fn click_with_fallback(page: &dyn PageDriver, selector: &str) -> Result<(), InteractionFailure> {
    match page.click(selector) {
        Ok(()) => Ok(()),
        Err(native) => {
            debug!(%selector, "native click failed ({native:#}), trying in-page click");
            page.click_in_page(selector)
                .map_err(|err| InteractionFailure {
                    kind: InteractionKind::Click,
                    target: selector.to_owned(),
                    message: format!("{err:#}"),
                })
        }
    }
}

/// A stale selector should not abort the step; the planner sees the unchanged
/// page state and self-corrects.
fn type_text(page: &dyn PageDriver, selector: &str, text: &str) -> Result<(), InteractionFailure> {
    page.type_text(selector, text)
        .map_err(|err| InteractionFailure {
            kind: InteractionKind::Type,
            target: selector.to_owned(),
            message: format!("{err:#}"),
        })
}
