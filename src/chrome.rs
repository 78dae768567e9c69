//! `headless_chrome` implementation of the session traits. Everything here is
//! blocking; the dispatcher runs it inside `spawn_blocking`.

use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::session::{BrowserEngine, EngineSession, PageDriver};

pub struct ChromeEngine {
    headless: bool,
}

impl ChromeEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            headless: config.headless,
        }
    }
}

impl BrowserEngine for ChromeEngine {
    fn launch(&self) -> Result<Arc<dyn EngineSession>> {
        let options = LaunchOptions {
            headless: self.headless,
            // Persistent sessions outlive any single call; don't let the
            // default idle reaper kill the process between them.
            idle_browser_timeout: Duration::from_secs(3600),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
            ],
            ..Default::default()
        };

        let browser = Browser::new(options).context("browser launch failed")?;
        let initial = browser.new_tab().context("failed to open initial tab")?;
        debug!("chrome ready");
        Ok(Arc::new(ChromeSession { browser, initial }))
    }
}

struct ChromeSession {
    browser: Browser,
    initial: Arc<Tab>,
}

impl EngineSession for ChromeSession {
    /// The transport keeps the tab list current as the site spawns targets
    /// (e.g. `target=_blank`), so the newest entry is the active page.
    fn page(&self) -> Arc<dyn PageDriver> {
        let tab = {
            let tabs = self.browser.get_tabs().lock().unwrap();
            tabs.last().cloned()
        }
        .unwrap_or_else(|| Arc::clone(&self.initial));
        Arc::new(ChromeTab { tab })
    }

    fn close(&self) {
        let tabs: Vec<Arc<Tab>> = self.browser.get_tabs().lock().unwrap().clone();
        for tab in tabs {
            let _ = tab.close(false);
        }
        // Dropping the last Browser handle kills the child process.
    }
}

struct ChromeTab {
    tab: Arc<Tab>,
}

impl PageDriver for ChromeTab {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .with_context(|| format!("goto {url}"))?;
        self.tab
            .wait_until_navigated()
            .context("navigation did not settle")?;
        Ok(())
    }

    fn click(&self, selector: &str) -> Result<()> {
        self.tab
            .find_element(selector)
            .with_context(|| format!("no element matches `{selector}`"))?
            .click()
            .with_context(|| format!("native click on `{selector}`"))?;
        Ok(())
    }

    fn click_in_page(&self, selector: &str) -> Result<()> {
        let selector_js = serde_json::json!(selector).to_string();
        let expr = format!(
            "(() => {{ const el = document.querySelector({selector_js}); \
             if (el) {{ el.click(); return true; }} return false; }})()"
        );
        let clicked = self
            .tab
            .evaluate(&expr, false)?
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !clicked {
            bail!("no element matches `{selector}`");
        }
        Ok(())
    }

    fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.tab
            .find_element(selector)
            .with_context(|| format!("no element matches `{selector}`"))?
            .type_into(text)
            .with_context(|| format!("typing into `{selector}`"))?;
        Ok(())
    }

    fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self.tab.evaluate(expression, false)?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn wait_for_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self
                .tab
                .evaluate("document.readyState", false)?
                .value
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            if state == "complete" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("page did not settle within {timeout:?}");
            }
            thread::sleep(Duration::from_millis(100));
        }
    }

    fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.tab
            .set_user_agent(user_agent, None, None)
            .context("setting user agent")
    }

    fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        let params: Emulation::SetDeviceMetricsOverride = serde_json::from_value(
            serde_json::json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1.0,
                "mobile": false,
            }),
        )
        .context("building viewport override")?;
        self.tab
            .call_method(params)
            .context("setting viewport size")?;
        Ok(())
    }

    fn cookies(&self) -> Result<Vec<Value>> {
        let cookies = self.tab.get_cookies().context("reading cookies")?;
        cookies
            .into_iter()
            .map(|cookie| serde_json::to_value(cookie).context("serializing cookie"))
            .collect()
    }

    fn set_cookies(&self, cookies: &[Value]) -> Result<()> {
        let params: Vec<CookieParam> = cookies
            .iter()
            .filter_map(|value| match serde_json::from_value(value.clone()) {
                Ok(param) => Some(param),
                Err(err) => {
                    warn!("skipping malformed stored cookie: {err}");
                    None
                }
            })
            .collect();
        if params.is_empty() {
            return Ok(());
        }
        self.tab.set_cookies(params).context("restoring cookies")
    }

    fn close(&self) {
        let _ = self.tab.close(false);
    }
}
