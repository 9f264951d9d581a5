//! The login-automation boundary.
//!
//! Session establishment drives a browser through this trait and never talks
//! to a real browser directly, so the whole login/harvest flow is testable
//! with an in-memory fake. The one implementation lives in [`crate::chrome`].
//!
//! Response interception is armed when the implementation is constructed,
//! strictly before the first `navigate` call: the household-membership
//! response can fire at any point during the login sequence, and a listener
//! attached afterwards would race it.

use anyhow::Result;
use std::path::Path;

/// URL fragment identifying dashboard AJAX traffic worth capturing.
pub const AJAX_PREFIX: &str = "/parentdashboard/ajax/";

/// A captured AJAX response: URL, HTTP status, parsed JSON body.
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub url: String,
    pub status: u16,
    pub body: serde_json::Value,
}

/// A cookie visible to the current browser session.
#[derive(Debug, Clone)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
}

/// Minimal browser surface the login flow needs.
pub trait LoginBrowser {
    /// Navigates and waits for the load to settle.
    fn navigate(&mut self, url: &str) -> Result<()>;

    fn current_url(&mut self) -> String;

    /// Clicks into the element and types `text` keystroke-by-keystroke (the
    /// dashboard's sign-in form validates on key events, not value sets).
    /// Returns `false` if the element never became visible.
    fn fill(&mut self, selector: &str, text: &str) -> Result<bool>;

    /// Returns `false` if the element never became visible.
    fn click(&mut self, selector: &str) -> Result<bool>;

    /// Whether the element becomes visible within the implementation's
    /// element timeout.
    fn is_visible(&mut self, selector: &str) -> bool;

    fn wait_millis(&mut self, millis: u64);

    fn cookies(&mut self) -> Result<Vec<BrowserCookie>>;

    fn screenshot(&mut self, path: &Path) -> Result<()>;

    /// Takes every AJAX response intercepted since the last drain.
    fn drain_responses(&mut self) -> Vec<InterceptedResponse>;
}
