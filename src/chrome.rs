//! [`LoginBrowser`] implementation over a locally-installed Chrome.
//!
//! The window is launched headful: the dashboard occasionally raises
//! verification challenges that only a human can clear, and the login flow
//! waits for the URL to leave the sign-in pages either way.

use crate::browser::{BrowserCookie, InterceptedResponse, LoginBrowser, AJAX_PREFIX};
use anyhow::{Context, Result};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long to wait for a sign-in form element before concluding it is not
/// part of the current page.
const ELEMENT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ChromeBrowser {
    // Held so the browser process outlives the tab.
    _browser: Browser,
    tab: Arc<Tab>,
    captured: Arc<Mutex<Vec<InterceptedResponse>>>,
}

impl ChromeBrowser {
    /// Launches Chrome and arms the AJAX interceptor on a fresh tab, before
    /// any navigation happens.
    pub fn launch() -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(false)
            .window_size(Some((1280, 900)))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to assemble browser launch options: {}", e))?;
        let browser =
            Browser::new(options).context("Failed to launch Chrome; is it installed?")?;
        let tab = browser.new_tab().context("Failed to open a browser tab")?;

        let captured: Arc<Mutex<Vec<InterceptedResponse>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        tab.register_response_handling(
            "ajax-capture",
            Box::new(move |params, fetch_body| {
                let url = params.response.url.clone();
                if !url.contains(AJAX_PREFIX) {
                    return;
                }
                let Ok(raw) = fetch_body() else {
                    return;
                };
                if raw.base_64_encoded {
                    return;
                }
                // Non-JSON ajax responses are not interesting.
                let Ok(body) = serde_json::from_str::<serde_json::Value>(&raw.body) else {
                    return;
                };
                if let Ok(mut responses) = sink.lock() {
                    responses.push(InterceptedResponse {
                        url,
                        status: params.response.status as u16,
                        body,
                    });
                }
            }),
        )
        .context("Failed to register the response interceptor")?;

        Ok(Self {
            _browser: browser,
            tab,
            captured,
        })
    }
}

impl LoginBrowser for ChromeBrowser {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .with_context(|| format!("Failed to navigate to {}", url))?;
        self.tab
            .wait_until_navigated()
            .context("Navigation did not settle")?;
        Ok(())
    }

    fn current_url(&mut self) -> String {
        self.tab.get_url()
    }

    fn fill(&mut self, selector: &str, text: &str) -> Result<bool> {
        let Ok(element) = self
            .tab
            .wait_for_element_with_custom_timeout(selector, ELEMENT_TIMEOUT)
        else {
            return Ok(false);
        };
        element
            .click()
            .with_context(|| format!("Failed to focus {}", selector))?;
        element
            .type_into(text)
            .with_context(|| format!("Failed to type into {}", selector))?;
        Ok(true)
    }

    fn click(&mut self, selector: &str) -> Result<bool> {
        let Ok(element) = self
            .tab
            .wait_for_element_with_custom_timeout(selector, ELEMENT_TIMEOUT)
        else {
            return Ok(false);
        };
        element
            .click()
            .with_context(|| format!("Failed to click {}", selector))?;
        // The click may or may not trigger a navigation.
        let _ = self.tab.wait_until_navigated();
        Ok(true)
    }

    fn is_visible(&mut self, selector: &str) -> bool {
        self.tab
            .wait_for_element_with_custom_timeout(selector, ELEMENT_TIMEOUT)
            .is_ok()
    }

    fn wait_millis(&mut self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }

    fn cookies(&mut self) -> Result<Vec<BrowserCookie>> {
        let cookies = self
            .tab
            .get_cookies()
            .context("Failed to read browser cookies")?;
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
            })
            .collect())
    }

    fn screenshot(&mut self, path: &Path) -> Result<()> {
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .context("Failed to capture screenshot")?;
        std::fs::write(path, png)
            .with_context(|| format!("Failed to write screenshot: {}", path.display()))?;
        Ok(())
    }

    fn drain_responses(&mut self) -> Vec<InterceptedResponse> {
        match self.captured.lock() {
            Ok(mut responses) => responses.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}
