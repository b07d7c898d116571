//! Browser-automation session for bot-resistant vendors.
//!
//! The session is a scoped resource: acquired once per vendor pass,
//! reused across items, and torn down when dropped on every exit
//! path. Forced termination of a run bypasses Drop, so callers doing
//! hard kills must also kill the Chrome process themselves.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::time::Duration;

use crate::collector::fetch::{FetchError, FetchedPage, PageFetcher};
use crate::utils::error::AppError;

pub struct BrowserSession {
    browser: Browser,
}

impl BrowserSession {
    pub fn launch(chrome_path: Option<&str>) -> crate::Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .args(vec![
                std::ffi::OsStr::new("--no-sandbox"),
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-gpu"),
                std::ffi::OsStr::new("--disable-extensions"),
            ])
            .build()
            .map_err(|e| AppError::Scraping(format!("failed to create launch options: {e}")))?;

        if let Some(path) = chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Scraping(format!("failed to launch browser: {e}")))?;

        Ok(Self { browser })
    }
}

// The headless_chrome crate kills its Chrome process when Browser is
// dropped; no explicit shutdown call is needed here.

/// Fetches pages through a live browser session.
pub struct BrowserFetcher {
    session: BrowserSession,
    timeout: Duration,
}

impl BrowserFetcher {
    pub fn new(session: BrowserSession, timeout: Duration) -> Self {
        Self { session, timeout }
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(
        &self,
        url: &str,
        consent_selector: Option<&str>,
    ) -> std::result::Result<FetchedPage, FetchError> {
        let tab = self
            .session
            .browser
            .new_tab()
            .map_err(|e| FetchError::Transport(format!("failed to create tab: {e}")))?;

        // Close the tab on every path below; a leaked tab holds the
        // session's memory for the rest of the pass.
        let result = (|| {
            tab.navigate_to(url)
                .map_err(|e| FetchError::Transport(format!("navigation failed: {e}")))?;
            tab.wait_until_navigated()
                .map_err(|e| FetchError::Transport(format!("page load failed: {e}")))?;

            if let Some(selector) = consent_selector {
                // Best-effort: the interstitial may not be shown.
                if let Ok(element) = tab.wait_for_element_with_custom_timeout(
                    selector,
                    Duration::from_millis(self.timeout.as_millis().min(2_000) as u64),
                ) {
                    if element.click().is_ok() {
                        tracing::debug!(selector, "dismissed consent interstitial");
                    }
                }
            }

            let final_url = {
                let current = tab.get_url();
                if current.is_empty() {
                    url.to_string()
                } else {
                    current
                }
            };
            let html = tab
                .get_content()
                .map_err(|e| FetchError::Parse(format!("failed to get page content: {e}")))?;

            Ok(FetchedPage { url: final_url, html })
        })();

        let _ = tab.close(true);
        result
    }
}
