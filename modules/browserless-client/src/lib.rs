pub mod error;
pub mod session;

pub use error::{BrowserlessError, Result};
pub use session::{BrowserPage, BrowserSession};

use std::time::Duration;

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// Fetch fully-rendered HTML content for a URL via Browserless /content endpoint.
    pub async fn content(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({ "url": url });

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// DevTools websocket endpoint for this Browserless instance.
    pub fn ws_endpoint(&self) -> Result<String> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| BrowserlessError::Endpoint(format!("{}: {e}", self.base_url)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(BrowserlessError::Endpoint(format!(
                    "unsupported scheme: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| BrowserlessError::Endpoint(self.base_url.clone()))?;

        if let Some(ref token) = self.token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.to_string())
    }

    /// Open a CDP browser session against this instance.
    pub async fn connect(&self) -> Result<BrowserSession> {
        let endpoint = self.ws_endpoint()?;
        BrowserSession::connect(&endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_base_becomes_wss_with_token() {
        let client = BrowserlessClient::new("https://chrome.example.com/", Some("abc")).unwrap();
        assert_eq!(
            client.ws_endpoint().unwrap(),
            "wss://chrome.example.com/?token=abc"
        );
    }

    #[test]
    fn http_base_without_token() {
        let client = BrowserlessClient::new("http://localhost:3000", None).unwrap();
        assert_eq!(client.ws_endpoint().unwrap(), "ws://localhost:3000/");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let client = BrowserlessClient::new("ftp://localhost", None).unwrap();
        assert!(matches!(
            client.ws_endpoint(),
            Err(BrowserlessError::Endpoint(_))
        ));
    }
}
