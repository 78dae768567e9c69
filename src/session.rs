//! Browser session lifecycle. The manager owns at most one cached engine at a
//! time; the `persist` flag supplied per call decides whether a session is
//! reused process-wide or torn down after the state capture.
//!
//! Callers must serialize concurrent `persist=true` calls themselves: the
//! cached handle is shared and the core takes no per-action lock.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Operations against one live page. Implemented by the Chrome adapter and by
/// the fake engine in tests; all calls are blocking.
pub trait PageDriver: Send + Sync {
    fn navigate(&self, url: &str) -> Result<()>;
    fn click(&self, selector: &str) -> Result<()>;
    /// Programmatic in-page click, used when native hit-testing misses the
    /// element (zero-opacity overlays and the like).
    fn click_in_page(&self, selector: &str) -> Result<()>;
    fn type_text(&self, selector: &str, text: &str) -> Result<()>;
    fn evaluate(&self, expression: &str) -> Result<Value>;
    /// Bounded wait for the page to quiesce after an interaction. A timeout
    /// here is reported as an error but treated as best-effort by callers.
    fn wait_for_idle(&self, timeout: Duration) -> Result<()>;
    fn set_user_agent(&self, user_agent: &str) -> Result<()>;
    fn set_viewport(&self, width: u32, height: u32) -> Result<()>;
    fn cookies(&self) -> Result<Vec<Value>>;
    fn set_cookies(&self, cookies: &[Value]) -> Result<()>;
    fn close(&self);
}

/// One live browser engine process. `page()` always resolves to the most
/// recently created tab, so selector primitives keep working when the target
/// site opens secondary tabs mid-flow.
pub trait EngineSession: Send + Sync {
    fn page(&self) -> Arc<dyn PageDriver>;
    fn close(&self);
}

pub trait BrowserEngine: Send + Sync {
    fn launch(&self) -> Result<Arc<dyn EngineSession>>;
}

/// A checked-out session. Cheap to clone the inner handle; `disposable`
/// records whether [`SessionManager::release`] should tear it down.
pub struct Session {
    pub handle: Arc<dyn EngineSession>,
    disposable: bool,
}

impl Session {
    pub fn is_disposable(&self) -> bool {
        self.disposable
    }
}

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36";
const VIEWPORT: (u32, u32) = (1080, 1024);

pub struct SessionManager {
    engine: Arc<dyn BrowserEngine>,
    cookie_jar: CookieJar,
    cached: Mutex<Option<Arc<dyn EngineSession>>>,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn BrowserEngine>, cookie_jar: CookieJar) -> Self {
        Self {
            engine,
            cookie_jar,
            cached: Mutex::new(None),
        }
    }

    /// Acquire a session. With `persist`, the cached handle is returned
    /// unchanged when present; otherwise a new engine is launched, set up
    /// once, and cached. Without `persist`, a fresh disposable engine is
    /// launched regardless of the cache.
    pub fn acquire(&self, persist: bool) -> Result<Session, EngineError> {
        if !persist {
            let handle = self.launch_configured()?;
            return Ok(Session {
                handle,
                disposable: true,
            });
        }

        let mut cached = self.cached.lock().expect("session cache poisoned");
        if let Some(handle) = cached.as_ref() {
            debug!("reusing cached browser session");
            return Ok(Session {
                handle: Arc::clone(handle),
                disposable: false,
            });
        }

        let handle = self.launch_configured()?;
        match self.cookie_jar.load() {
            Ok(cookies) if !cookies.is_empty() => {
                if let Err(err) = handle.page().set_cookies(&cookies) {
                    warn!("failed to restore cookie jar: {err:#}");
                }
            }
            Ok(_) => {}
            Err(err) => warn!("failed to read cookie jar: {err:#}"),
        }
        *cached = Some(Arc::clone(&handle));
        Ok(Session {
            handle,
            disposable: false,
        })
    }

    /// Return a session after a call. Disposable sessions are closed (page,
    /// then engine); persistent ones stay alive but flush their cookies to
    /// durable storage so credentials survive process restarts.
    pub fn release(&self, session: Session) {
        if session.disposable {
            session.handle.page().close();
            session.handle.close();
            return;
        }
        match session.handle.page().cookies() {
            Ok(cookies) => {
                if let Err(err) = self.cookie_jar.save(&cookies) {
                    warn!("failed to persist cookie jar: {err:#}");
                }
            }
            Err(err) => warn!("failed to read cookies from page: {err:#}"),
        }
    }

    /// Launch failure is fatal to the call: no automation is possible
    /// without a browser process.
    fn launch_configured(&self) -> Result<Arc<dyn EngineSession>, EngineError> {
        let handle = self.engine.launch().map_err(EngineError::SessionLaunch)?;
        let page = handle.page();
        page.set_user_agent(USER_AGENT)
            .map_err(EngineError::SessionLaunch)?;
        page.set_viewport(VIEWPORT.0, VIEWPORT.1)
            .map_err(EngineError::SessionLaunch)?;
        Ok(handle)
    }
}

/// Durable cookie storage: a JSON file of the engine's cookie objects,
/// written on release of a persistent session and restored on the next
/// launch.
pub struct CookieJar {
    path: PathBuf,
}

impl CookieJar {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<Vec<Value>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading cookie jar {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing cookie jar {}", self.path.display()))
    }

    pub fn save(&self, cookies: &[Value]) -> Result<()> {
        let raw = serde_json::to_string(cookies).context("serializing cookie jar")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("writing cookie jar {}", self.path.display()))
    }
}
