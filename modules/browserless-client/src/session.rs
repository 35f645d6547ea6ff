//! CDP session over a Browserless websocket.
//!
//! The chromiumoxide handler must be polled for the connection to make
//! progress; it runs on its own task for as long as the session lives and is
//! aborted when the session is closed or dropped.

use std::time::Duration;

use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{BrowserlessError, Result};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn connect(ws_endpoint: &str) -> Result<Self> {
        let (browser, mut handler) = Browser::connect(ws_endpoint).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler stopped");
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Open a new tab and wait for the initial navigation.
    pub async fn open(&self, url: &str) -> Result<BrowserPage> {
        let page = self.browser.new_page(url).await?;
        page.wait_for_navigation().await?;
        Ok(BrowserPage { page })
    }

    pub async fn close(mut self) -> Result<()> {
        let result = self.browser.close().await;
        self.handler.abort();
        if let Err(ref e) = result {
            warn!(error = %e, "Browser did not close cleanly");
        }
        result.map(|_| ()).map_err(Into::into)
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// One tab in a [`BrowserSession`].
pub struct BrowserPage {
    page: Page,
}

impl BrowserPage {
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }

    /// Evaluate a JavaScript expression and deserialize its value.
    pub async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self.page.evaluate(script).await?;
        result
            .into_value()
            .map_err(|e| BrowserlessError::Script(e.to_string()))
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserlessError::Script(format!("{selector}: {e}")))?;
        element.click().await?;
        Ok(())
    }

    pub async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserlessError::Script(format!("{selector}: {e}")))?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    /// Poll until `selector` matches an element or `timeout` elapses.
    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserlessError::Timeout(selector.to_string()));
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    pub async fn close(self) -> Result<()> {
        self.page.close().await?;
        Ok(())
    }
}
