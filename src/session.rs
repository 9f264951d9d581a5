//! Session establishment: drive the browser login, then harvest child
//! identities and the CSRF token/cookie pair from the traffic it produced.
//!
//! The household-membership response is observed passively; this module
//! never submits that request itself. The CSRF token comes from the
//! `ft-panda-csrf-token` cookie, not from any response body.

use crate::browser::{InterceptedResponse, LoginBrowser};
use crate::credentials::CredentialProvider;
use crate::error::RunError;
use crate::paths;
use anyhow::Result;
use std::collections::BTreeMap;

pub const DASHBOARD_URL: &str =
    "https://www.amazon.com/parentdashboard/activities/household-summary";

const CSRF_COOKIE: &str = "ft-panda-csrf-token";
const SIGNIN_PATH_MARKER: &str = "/ap/";
const LOGIN_TIMEOUT_SECS: u64 = 120;
/// Grace period for the dashboard's initial AJAX burst after landing.
const INITIAL_TRAFFIC_GRACE_MS: u64 = 3000;
const FORM_SETTLE_MS: u64 = 500;

/// An authenticated API session, harvested once per run.
///
/// Immutable, owned by the fetcher for the run's lifetime, never persisted.
#[derive(Debug, Clone)]
pub struct Session {
    /// Child directed-id → first name (name is for progress output only).
    pub children: BTreeMap<String, String>,
    pub csrf_token: String,
    /// All session cookies serialized into a single `Cookie:` header value.
    pub cookie_header: String,
}

/// Drives the login automation to completion and harvests a [`Session`].
///
/// Fails with [`RunError::Auth`] when the login never reaches the dashboard,
/// and with [`RunError::Session`] when it does but no child with a CHILD role
/// or no CSRF cookie can be found.
pub fn establish(
    browser: &mut dyn LoginBrowser,
    credentials: &dyn CredentialProvider,
    debug: bool,
) -> Result<Session> {
    eprintln!("[kindle-stats] Navigating to the parent dashboard...");
    browser.navigate(DASHBOARD_URL)?;

    if is_signin_url(&browser.current_url()) {
        eprintln!("[kindle-stats] Sign-in required...");
        run_login_flow(browser, credentials, debug)?;
    }

    let landed = browser.current_url();
    tracing::info!("landed on {}", landed);

    // Let the dashboard's own API calls fire before draining the capture.
    browser.wait_millis(INITIAL_TRAFFIC_GRACE_MS);

    if debug {
        let shot = paths::debug_dir()?.join("debug_landing.png");
        browser.screenshot(&shot)?;
        eprintln!("[kindle-stats] Screenshot saved to {}", shot.display());
    }

    let responses = browser.drain_responses();
    if debug {
        eprintln!(
            "[kindle-stats] Captured {} AJAX responses:",
            responses.len()
        );
        for response in &responses {
            eprintln!("  {} {}", response.status, response.url);
        }
    }

    let children = find_child_ids(&responses);
    if children.is_empty() {
        return Err(RunError::session(
            "no child with a CHILD role found in the household-membership response",
        )
        .into());
    }

    let cookies = browser.cookies()?;
    let Some(csrf_token) = cookies
        .iter()
        .find(|c| c.name == CSRF_COOKIE)
        .map(|c| c.value.clone())
    else {
        if debug {
            eprintln!("[kindle-stats] Cookies present:");
            for cookie in &cookies {
                eprintln!("  {}", cookie.name);
            }
        }
        return Err(RunError::session(format!(
            "no {} cookie found after login",
            CSRF_COOKIE
        ))
        .into());
    };

    let cookie_header = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");

    Ok(Session {
        children,
        csrf_token,
        cookie_header,
    })
}

/// Handles the sign-in sequence: email → continue → password → submit →
/// OTP if prompted, then waits for the dashboard.
fn run_login_flow(
    browser: &mut dyn LoginBrowser,
    credentials: &dyn CredentialProvider,
    debug: bool,
) -> Result<()> {
    let email = credentials.email()?;
    let password = credentials.password()?;

    if browser.fill("#ap_email", &email)? {
        browser.wait_millis(FORM_SETTLE_MS);
        // Some sign-in variants show email and password on one page; a
        // missing continue button is not an error.
        browser.click("#continue")?;
        tracing::debug!("after email: {}", browser.current_url());
    }

    if browser.fill("#ap_password", &password)? {
        browser.wait_millis(FORM_SETTLE_MS);
        if debug {
            browser.screenshot(&paths::debug_dir()?.join("debug_pre_submit.png"))?;
        }
        if !browser.click("#signInSubmit")? {
            return Err(RunError::auth("password form has no submit button").into());
        }
        tracing::debug!("after password: {}", browser.current_url());
        if debug {
            browser.screenshot(&paths::debug_dir()?.join("debug_post_password.png"))?;
        }
    }

    if browser.is_visible("#auth-mfa-otpcode") {
        let Some(otp) = credentials.otp()? else {
            return Err(RunError::auth(
                "sign-in asked for a one-time code but none is available",
            )
            .into());
        };
        eprintln!("[kindle-stats] Filling OTP from 1Password...");
        browser.fill("#auth-mfa-otpcode", &otp)?;
        browser.wait_millis(FORM_SETTLE_MS);
        browser.click("#auth-signin-button")?;
    }

    if is_signin_url(&browser.current_url()) {
        wait_for_dashboard(browser)?;
    }
    Ok(())
}

/// Polls until the page has navigated away from sign-in to the dashboard.
/// Manual challenge completion in the browser window counts.
fn wait_for_dashboard(browser: &mut dyn LoginBrowser) -> Result<()> {
    eprintln!(
        "[kindle-stats] Waiting up to {}s for login to complete...",
        LOGIN_TIMEOUT_SECS
    );
    eprintln!("[kindle-stats] Complete any verification in the browser window.");
    for _ in 0..LOGIN_TIMEOUT_SECS {
        let url = browser.current_url();
        if url.contains("parentdashboard") && !is_signin_url(&url) {
            eprintln!("[kindle-stats] Login successful!");
            return Ok(());
        }
        browser.wait_millis(1000);
    }
    Err(RunError::auth(format!(
        "login did not complete within {}s",
        LOGIN_TIMEOUT_SECS
    ))
    .into())
}

fn is_signin_url(url: &str) -> bool {
    url.contains(SIGNIN_PATH_MARKER)
}

/// Extracts child directed-ids from any captured response that carries a
/// household member list.
fn find_child_ids(responses: &[InterceptedResponse]) -> BTreeMap<String, String> {
    let mut children = BTreeMap::new();
    for response in responses {
        let Some(members) = response.body.get("members").and_then(|m| m.as_array()) else {
            continue;
        };
        for member in members {
            if member["role"].as_str() != Some("CHILD") {
                continue;
            }
            if let Some(id) = member["directedId"].as_str() {
                let name = member["firstName"].as_str().unwrap_or("Unknown");
                children.insert(id.to_string(), name.to_string());
            }
        }
    }
    children
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
