//! Feed transport that drives a real browser through Browserless.
//!
//! A batch is every post link currently in the profile grid, in DOM order.
//! Post metadata is read once per link from the post page and cached, since
//! each batch re-reads links already seen. Scrolling the grid is the advance;
//! a run of scrolls that load nothing new means the feed is exhausted.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use browserless_client::{BrowserPage, BrowserSession, BrowserlessClient};
use reelpulse_common::{Credentials, FeedItem, ItemRef, MediaKind, Result, ScrapeError, ScrapeTuning};

use super::from_browserless;
use crate::traits::{FeedTransport, ItemDetail};

const BASE_URL: &str = "https://www.instagram.com";
const LOGIN_PATH: &str = "/accounts/login/";
const UNAVAILABLE_MARKER: &str = "Sorry, this page isn't available";
const LOGIN_SETTLE: Duration = Duration::from_secs(5);

const COLLECT_LINKS_JS: &str = r#"(() => {
  const seen = new Set();
  const out = [];
  for (const a of document.querySelectorAll('a[href*="/p/"], a[href*="/reel/"]')) {
    const href = a.href.split('?')[0];
    if (!seen.has(href)) { seen.add(href); out.push(href); }
  }
  return out;
})()"#;

const POST_META_JS: &str = r#"(() => {
  const text = (el) => el ? el.textContent.trim() : null;
  const time = document.querySelector('time[datetime]');
  const likes = [...document.querySelectorAll('section span, section a')]
    .map((el) => el.textContent.trim())
    .find((t) => /likes?$/i.test(t));
  const views = [...document.querySelectorAll('span')]
    .map((el) => el.textContent.trim())
    .find((t) => /(views|plays)$/i.test(t));
  const caption = text(document.querySelector('h1'));
  return {
    datetime: time ? time.getAttribute('datetime') : null,
    likes: likes || null,
    views: views || null,
    caption: caption,
    video: !!document.querySelector('video'),
    carousel: !!document.querySelector('button[aria-label="Next"]'),
    unavailable: document.body.innerText.includes("Sorry, this page isn't available"),
  };
})()"#;

const COMMENTS_JS: &str = r#"(() => {
  const out = [];
  for (const li of document.querySelectorAll('ul ul li, ul > div > li')) {
    const span = li.querySelector('span[dir="auto"]');
    if (span && span.textContent.trim()) out.push(span.textContent.trim());
  }
  return out;
})()"#;

const LOAD_MORE_JS: &str = r#"(() => {
  const button = [...document.querySelectorAll('button, div[role="button"]')]
    .find((b) => /load more comments|view more comments/i.test(b.getAttribute('aria-label') || b.textContent));
  if (button) button.click();
  const list = document.querySelector('ul');
  if (list) list.scrollTop = list.scrollHeight;
  return !!button;
})()"#;

const SCROLL_JS: &str = "window.scrollTo(0, document.body.scrollHeight); true";

const LOGIN_USER_SELECTOR: &str = "input[name='username']";
const LOGIN_PASS_SELECTOR: &str = "input[name='password']";
const LOGIN_SUBMIT_SELECTOR: &str = "button[type='submit']";

/// Raw values scraped from a post page before parsing.
#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    datetime: Option<String>,
    likes: Option<String>,
    views: Option<String>,
    caption: Option<String>,
    #[serde(default)]
    video: bool,
    #[serde(default)]
    carousel: bool,
    #[serde(default)]
    unavailable: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct PostMeta {
    timestamp: Option<DateTime<Utc>>,
    like_count: Option<u64>,
    view_count: Option<u64>,
    caption: Option<String>,
    kind: MediaKind,
}

pub struct BrowserTransport {
    client: BrowserlessClient,
    credentials: Option<Credentials>,
    scroll_delay: Duration,
    stale_scroll_limit: u32,
    page_timeout: Duration,

    session: Option<BrowserSession>,
    profile: Option<BrowserPage>,
    detail: Option<(ItemRef, BrowserPage)>,
    meta: HashMap<String, PostMeta>,
    known_links: usize,
    stale_scrolls: u32,
    exhausted: bool,
}

impl BrowserTransport {
    pub fn new(client: BrowserlessClient, credentials: Option<Credentials>, tuning: &ScrapeTuning) -> Self {
        Self {
            client,
            credentials,
            scroll_delay: tuning.scroll_delay(),
            stale_scroll_limit: tuning.stale_scroll_limit.max(1),
            page_timeout: tuning.fetch_timeout(),
            session: None,
            profile: None,
            detail: None,
            meta: HashMap::new(),
            known_links: 0,
            stale_scrolls: 0,
            exhausted: false,
        }
    }

    fn session(&self) -> Result<&BrowserSession> {
        self.session
            .as_ref()
            .ok_or_else(|| ScrapeError::Fatal("browser session not open".into()))
    }

    fn profile(&self) -> Result<&BrowserPage> {
        self.profile
            .as_ref()
            .ok_or_else(|| ScrapeError::Fatal("profile page not open".into()))
    }

    async fn login(&self, credentials: &Credentials) -> Result<()> {
        let session = self.session()?;
        let page = session
            .open(&format!("{BASE_URL}{LOGIN_PATH}"))
            .await
            .map_err(from_browserless)?;

        let result = async {
            page.wait_for_selector(LOGIN_USER_SELECTOR, self.page_timeout)
                .await
                .map_err(from_browserless)?;
            page.type_into(LOGIN_USER_SELECTOR, &credentials.username)
                .await
                .map_err(from_browserless)?;
            page.type_into(LOGIN_PASS_SELECTOR, credentials.password.expose())
                .await
                .map_err(from_browserless)?;
            page.click(LOGIN_SUBMIT_SELECTOR)
                .await
                .map_err(from_browserless)?;
            tokio::time::sleep(LOGIN_SETTLE).await;

            let url = page.current_url().await.map_err(from_browserless)?;
            if still_on_login(url.as_deref()) {
                return Err(ScrapeError::AuthenticationFailure(
                    "login form still shown after submit".into(),
                ));
            }
            Ok(())
        }
        .await;

        if let Err(e) = page.close().await {
            debug!(error = %e, "Login page did not close cleanly");
        }
        if result.is_ok() {
            info!(username = %credentials.username, "Logged in");
        }
        result
    }

    async fn read_meta(&self, link: &str) -> Result<PostMeta> {
        let page = self.session()?.open(link).await.map_err(from_browserless)?;
        let raw = page.evaluate::<RawMeta>(POST_META_JS).await;
        if let Err(e) = page.close().await {
            debug!(link, error = %e, "Post page did not close cleanly");
        }
        Ok(parse_meta(link, raw.map_err(from_browserless)?))
    }

    async fn link_count(&self) -> Result<usize> {
        let links: Vec<String> = self
            .profile()?
            .evaluate(COLLECT_LINKS_JS)
            .await
            .map_err(from_browserless)?;
        Ok(links.len())
    }
}

fn still_on_login(url: Option<&str>) -> bool {
    url.is_some_and(|u| u.contains(LOGIN_PATH))
}

fn profile_url(account: &str) -> String {
    format!("{BASE_URL}/{}/", account.trim_start_matches('@'))
}

fn is_unavailable(html: &str) -> bool {
    html.contains(UNAVAILABLE_MARKER)
}

static RE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*([kmb])?").unwrap());

/// Parse display counts like `"1,234 likes"`, `"1.2K views"` or `"3M"`.
pub fn parse_count(text: &str) -> Option<u64> {
    let caps = RE_COUNT.captures(text)?;
    let number: f64 = caps[1].replace(',', "").parse().ok()?;
    let scale = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(ref s) if s == "k" => 1_000.0,
        Some(ref s) if s == "m" => 1_000_000.0,
        Some(ref s) if s == "b" => 1_000_000_000.0,
        _ => 1.0,
    };
    Some((number * scale).round() as u64)
}

fn parse_meta(link: &str, raw: RawMeta) -> PostMeta {
    if raw.unavailable {
        return PostMeta::default();
    }
    let kind = if link.contains("/reel/") || raw.video {
        MediaKind::Reel
    } else if raw.carousel {
        MediaKind::Carousel
    } else {
        MediaKind::Image
    };

    PostMeta {
        timestamp: raw
            .datetime
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc)),
        like_count: raw.likes.as_deref().and_then(parse_count),
        view_count: raw.views.as_deref().and_then(parse_count),
        caption: raw.caption.filter(|c| !c.trim().is_empty()),
        kind,
    }
}

fn to_feed_item(link: &str, meta: &PostMeta) -> FeedItem {
    FeedItem {
        timestamp: meta.timestamp,
        view_count: meta.view_count,
        like_count: meta.like_count,
        caption: meta.caption.clone(),
        kind: meta.kind,
        ..FeedItem::new(ItemRef::new(link))
    }
}

#[async_trait]
impl FeedTransport for BrowserTransport {
    async fn open(&mut self, account: &str) -> Result<()> {
        let url = profile_url(account);
        let html = self.client.content(&url).await.map_err(from_browserless)?;
        if is_unavailable(&html) {
            return Err(ScrapeError::AccountNotFound(account.to_string()));
        }

        let session = self.client.connect().await.map_err(from_browserless)?;
        self.session = Some(session);

        if let Some(credentials) = self.credentials.clone() {
            self.login(&credentials).await?;
        }

        let profile = self.session()?.open(&url).await.map_err(from_browserless)?;
        self.profile = Some(profile);
        self.meta.clear();
        self.known_links = 0;
        self.stale_scrolls = 0;
        self.exhausted = false;
        info!(account, "Profile page open");
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<FeedItem>>> {
        if self.exhausted {
            return Ok(None);
        }
        let links: Vec<String> = self
            .profile()?
            .evaluate(COLLECT_LINKS_JS)
            .await
            .map_err(from_browserless)?;
        self.known_links = links.len();

        let mut batch = Vec::with_capacity(links.len());
        for link in links {
            let cached = self.meta.get(&link).cloned();
            let meta = match cached {
                Some(meta) => meta,
                None => match self.read_meta(&link).await {
                    Ok(meta) => {
                        self.meta.insert(link.clone(), meta.clone());
                        meta
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(link, error = %e, "Post metadata unreadable");
                        PostMeta::default()
                    }
                },
            };
            batch.push(to_feed_item(&link, &meta));
        }
        Ok(Some(batch))
    }

    async fn advance(&mut self) -> Result<()> {
        let before = self.known_links;
        self.profile()?
            .evaluate::<bool>(SCROLL_JS)
            .await
            .map_err(from_browserless)?;
        tokio::time::sleep(self.scroll_delay).await;

        let after = self.link_count().await?;
        if after > before {
            self.stale_scrolls = 0;
        } else {
            self.stale_scrolls += 1;
            debug!(stale = self.stale_scrolls, links = after, "Scroll loaded no new posts");
            if self.stale_scrolls >= self.stale_scroll_limit {
                info!(links = after, "Feed exhausted");
                self.exhausted = true;
            }
        }
        Ok(())
    }

    async fn open_detail(&mut self, item: &FeedItem) -> Result<ItemDetail> {
        let page = self
            .session()?
            .open(item.item_ref.as_str())
            .await
            .map_err(from_browserless)?;
        let ready = page.wait_for_selector("article, main", self.page_timeout).await;
        self.detail = Some((item.item_ref.clone(), page));
        ready.map_err(from_browserless)?;

        let meta = self.meta.get(item.item_ref.as_str());
        Ok(ItemDetail {
            caption: meta.and_then(|m| m.caption.clone()),
            view_count: meta.and_then(|m| m.view_count),
            like_count: meta.and_then(|m| m.like_count),
        })
    }

    async fn revealed_comments(&mut self, item: &FeedItem) -> Result<Vec<String>> {
        match self.detail {
            Some((ref open, ref page)) if *open == item.item_ref => {
                page.evaluate(COMMENTS_JS).await.map_err(from_browserless)
            }
            _ => Err(ScrapeError::Transient(format!(
                "no detail page open for {}",
                item.item_ref
            ))),
        }
    }

    async fn reveal_more(&mut self, item: &FeedItem) -> Result<()> {
        match self.detail {
            Some((ref open, ref page)) if *open == item.item_ref => {
                let clicked: bool = page.evaluate(LOAD_MORE_JS).await.map_err(from_browserless)?;
                if !clicked {
                    debug!(item = %item.item_ref, "No load-more control");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn release_detail(&mut self, _item: &FeedItem) -> Result<()> {
        if let Some((item_ref, page)) = self.detail.take() {
            if let Err(e) = page.close().await {
                debug!(item = %item_ref, error = %e, "Detail page did not close cleanly");
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some((_, page)) = self.detail.take() {
            let _ = page.close().await;
        }
        if let Some(page) = self.profile.take() {
            let _ = page.close().await;
        }
        if let Some(session) = self.session.take() {
            session.close().await.map_err(from_browserless)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "browser"
    }
}
