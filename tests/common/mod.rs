#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use webpilot::plugin::{ActionSpec, Plugin, required_str};
use webpilot::{
    BrowserEngine, CookieJar, DispatchLimits, Dispatcher, EngineSession, MemoryStore, PageDriver,
    PluginFailure, PluginRegistry, SessionManager, StateStore,
};

/// In-memory stand-in for the browser engine. Records every call so tests
/// can assert on launch counts, teardown, and the selectors that reached the
/// page.
#[derive(Default)]
pub struct FakeEngine {
    pub launches: AtomicUsize,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeEngine {
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl BrowserEngine for FakeEngine {
    fn launch(&self) -> Result<Arc<dyn EngineSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(FakeSession {
            page: Arc::new(FakePage::default()),
            closed: AtomicBool::new(false),
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session)
    }
}

pub struct FakeSession {
    pub page: Arc<FakePage>,
    pub closed: AtomicBool,
}

impl EngineSession for FakeSession {
    fn page(&self) -> Arc<dyn PageDriver> {
        Arc::clone(&self.page) as Arc<dyn PageDriver>
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePage {
    pub url: Mutex<String>,
    pub calls: Mutex<Vec<String>>,
    pub cookies: Mutex<Vec<Value>>,
    pub closed: AtomicBool,
}

impl FakePage {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageDriver for FakePage {
    fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate {url}"));
        *self.url.lock().unwrap() = url.to_owned();
        Ok(())
    }

    fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click {selector}"));
        if selector.contains("#missing") {
            bail!("no element matches `{selector}`");
        }
        Ok(())
    }

    fn click_in_page(&self, selector: &str) -> Result<()> {
        self.record(format!("click_in_page {selector}"));
        if selector.contains("#missing") {
            bail!("no element matches `{selector}`");
        }
        Ok(())
    }

    fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.record(format!("type {selector} {text}"));
        if selector.contains("#missing") {
            bail!("no element matches `{selector}`");
        }
        Ok(())
    }

    fn evaluate(&self, expression: &str) -> Result<Value> {
        if expression.contains("JSON.stringify") {
            let url = self.url.lock().unwrap().clone();
            let payload = json!({
                "html": "<h1>Example Domain</h1> <a href^=\"/more\">More</a>",
                "url": if url.is_empty() { "about:blank".into() } else { url },
            });
            return Ok(Value::String(payload.to_string()));
        }
        Ok(Value::Null)
    }

    fn wait_for_idle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn set_user_agent(&self, _user_agent: &str) -> Result<()> {
        self.record("set_user_agent".into());
        Ok(())
    }

    fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.record(format!("set_viewport {width}x{height}"));
        Ok(())
    }

    fn cookies(&self) -> Result<Vec<Value>> {
        Ok(self.cookies.lock().unwrap().clone())
    }

    fn set_cookies(&self, cookies: &[Value]) -> Result<()> {
        self.record(format!("set_cookies {}", cookies.len()));
        self.cookies.lock().unwrap().extend_from_slice(cookies);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Test plugin with one succeeding and one failing action.
pub struct EchoPlugin;

#[async_trait]
impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        "echo"
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec {
                name: "echo.say".into(),
                description: "Echo the given text".into(),
                example_args: Some(json!({"text": "hello"})),
            },
            ActionSpec {
                name: "echo.fail".into(),
                description: "Always fails".into(),
                example_args: None,
            },
        ]
    }

    async fn handle(
        &self,
        action: &str,
        args: &Map<String, Value>,
    ) -> Result<Option<String>, PluginFailure> {
        match action {
            "echo.say" => Ok(Some(required_str(args, "text")?.to_owned())),
            "echo.fail" => Err(PluginFailure("echo broke".into())),
            other => Err(PluginFailure(format!("no action `{other}`"))),
        }
    }
}

pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<PluginRegistry>,
    pub cookie_path: std::path::PathBuf,
    _cookie_dir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    let cookie_dir = tempfile::tempdir().unwrap();
    let cookie_path = cookie_dir.path().join("cookies.json");
    let engine = Arc::new(FakeEngine::default());
    let store = Arc::new(MemoryStore::default());
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&engine) as Arc<dyn BrowserEngine>,
        CookieJar::new(cookie_path.clone()),
    ));
    let registry = Arc::new(PluginRegistry::new(vec![
        Arc::new(EchoPlugin) as Arc<dyn Plugin>
    ]));
    let dispatcher = Arc::new(Dispatcher::new(
        sessions,
        Arc::clone(&registry),
        Arc::clone(&store) as Arc<dyn StateStore>,
        DispatchLimits {
            settle_delay: Duration::from_millis(1),
            idle_timeout: Duration::from_millis(10),
            ..DispatchLimits::default()
        },
    ));
    Harness {
        engine,
        store,
        dispatcher,
        registry,
        cookie_path,
        _cookie_dir: cookie_dir,
    }
}
