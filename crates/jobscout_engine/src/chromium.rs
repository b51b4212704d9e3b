//! Headless Chromium backend over the DevTools protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use engine_logging::{engine_info, engine_warn};
use futures_util::StreamExt;
use serde_json::Value;

use crate::{BrowserError, BrowserErrorKind, BrowserPage};

const WINDOW_SIZE: (u32, u32) = (1920, 1080);

const IS_VISIBLE_JS: &str = "function() {
    const style = window.getComputedStyle(this);
    const rect = this.getBoundingClientRect();
    return style.display !== 'none' && style.visibility !== 'hidden'
        && rect.width > 0 && rect.height > 0;
}";

const HIDE_JS: &str = "function() { this.style.setProperty('display', 'none', 'important'); }";

/// A launched browser process plus the task pumping its event stream.
pub struct ChromiumBrowser {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl ChromiumBrowser {
    pub async fn launch(headless: bool, user_agent: &str) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(WINDOW_SIZE.0, WINDOW_SIZE.1)
            .arg(format!("--user-agent={user_agent}"))
            .arg("--disable-blink-features=AutomationControlled");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|err| BrowserError::new(BrowserErrorKind::Navigation, err))?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::new(BrowserErrorKind::Navigation, err.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));
        engine_info!("Chromium launched ({})", if headless { "headless" } else { "headful" });
        Ok(Self {
            browser,
            handler_task,
            closed,
        })
    }

    pub async fn new_page(&self) -> Result<ChromiumPage, BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::closed("browser has been closed"));
        }
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|err| cdp_error(err, &self.closed))?;
        Ok(ChromiumPage {
            page,
            closed: Arc::clone(&self.closed),
        })
    }

    pub async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            engine_warn!("Closing Chromium failed: {}", err);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

fn spawn_handler_task(
    mut handler: chromiumoxide::Handler,
    closed: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                engine_warn!("Chromium handler event error: {}", err);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

fn cdp_error(err: CdpError, closed: &AtomicBool) -> BrowserError {
    if closed.load(Ordering::SeqCst) {
        return BrowserError::closed(err.to_string());
    }
    let kind = match err {
        CdpError::Timeout => BrowserErrorKind::Timeout,
        _ => BrowserErrorKind::Script,
    };
    BrowserError::new(kind, err.to_string())
}

pub struct ChromiumPage {
    page: Page,
    closed: Arc<AtomicBool>,
}

impl ChromiumPage {
    fn fail(&self, err: CdpError) -> BrowserError {
        cdp_error(err, &self.closed)
    }

    fn timed_out(what: &str, timeout: Duration) -> BrowserError {
        BrowserError::new(
            BrowserErrorKind::Timeout,
            format!("{what} took longer than {timeout:?}"),
        )
    }

    async fn call_on(&self, element: &Element, function: &str) -> Result<Option<Value>, BrowserError> {
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(|err| self.fail(err))?;
        Ok(returns.result.value)
    }

    pub async fn close(self) {
        if let Err(err) = self.page.close().await {
            engine_warn!("Closing page failed: {}", err);
        }
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    type Element = Element;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(BrowserError::new(
                if self.closed.load(Ordering::SeqCst) {
                    BrowserErrorKind::Closed
                } else {
                    BrowserErrorKind::Navigation
                },
                err.to_string(),
            )),
            Err(_) => Err(Self::timed_out(&format!("loading {url}"), timeout)),
        }
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let url = self.page.url().await.map_err(|err| self.fail(err))?;
        Ok(url.unwrap_or_default())
    }

    async fn go_back(&self, timeout: Duration) -> Result<(), BrowserError> {
        self.page
            .evaluate("history.back()")
            .await
            .map_err(|err| self.fail(err))?;
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(self.fail(err)),
            Err(_) => Err(Self::timed_out("going back", timeout)),
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Element>, BrowserError> {
        match self.page.find_elements(selector).await {
            Ok(found) => Ok(found),
            // DOM.querySelectorAll reports no match as an error on some builds.
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn query_within(&self, scope: &Element, selector: &str) -> Result<Vec<Element>, BrowserError> {
        match scope.find_elements(selector).await {
            Ok(found) => Ok(found),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn inner_text(&self, element: &Element) -> Result<String, BrowserError> {
        let text = element.inner_text().await.map_err(|err| self.fail(err))?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>, BrowserError> {
        element.attribute(name).await.map_err(|err| self.fail(err))
    }

    async fn is_visible(&self, element: &Element) -> Result<bool, BrowserError> {
        let value = self.call_on(element, IS_VISIBLE_JS).await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn click(&self, element: &Element) -> Result<(), BrowserError> {
        element.click().await.map_err(|err| self.fail(err))?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<(), BrowserError> {
        element
            .scroll_into_view()
            .await
            .map_err(|err| self.fail(err))?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(|err| self.fail(err))?;
        Ok(())
    }

    async fn hide(&self, element: &Element) -> Result<(), BrowserError> {
        self.call_on(element, HIDE_JS).await.map(|_| ())
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
