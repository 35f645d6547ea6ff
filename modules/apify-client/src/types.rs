use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for the apify/instagram-post-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramScraperInput {
    pub username: Vec<String>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// Input for the apify/instagram-comment-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct CommentScraperInput {
    #[serde(rename = "directUrls")]
    pub direct_urls: Vec<String>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// A single Instagram post from the Apify dataset.
///
/// When the profile cannot be scraped the actor still writes one item, with
/// only `url`, `error` and `errorDescription` set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstagramPost {
    #[serde(default)]
    pub url: String,
    pub caption: Option<String>,
    #[serde(rename = "ownerUsername")]
    pub owner_username: Option<String>,
    #[serde(rename = "shortCode")]
    pub short_code: Option<String>,
    #[serde(rename = "likesCount")]
    pub likes_count: Option<i64>,
    #[serde(rename = "commentsCount")]
    pub comments_count: Option<i64>,
    #[serde(rename = "videoViewCount")]
    pub video_view_count: Option<i64>,
    #[serde(rename = "videoPlayCount")]
    pub video_play_count: Option<i64>,
    /// Kept as a string: malformed entries occasionally carry junk here.
    pub timestamp: Option<String>,
    /// "Video", "Image" or "Sidecar".
    #[serde(rename = "type")]
    pub post_type: Option<String>,
    /// "clips" for reels.
    #[serde(rename = "productType")]
    pub product_type: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "errorDescription")]
    pub error_description: Option<String>,
}

impl InstagramPost {
    /// Parsed publication time, `None` when absent or unparseable.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Best available view count. Reels report plays and views separately.
    pub fn views(&self) -> Option<i64> {
        self.video_view_count.or(self.video_play_count)
    }

    pub fn is_reel(&self) -> bool {
        self.product_type.as_deref() == Some("clips")
            || self.url.contains("/reel/")
            || self.post_type.as_deref() == Some("Video")
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A single comment from the instagram-comment-scraper dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct InstagramComment {
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "ownerUsername")]
    pub owner_username: Option<String>,
    pub timestamp: Option<String>,
    #[serde(rename = "likesCount")]
    pub likes_count: Option<i64>,
}

/// One page of dataset items plus the pagination headers Apify returned.
#[derive(Debug, Clone)]
pub struct DatasetPage<T> {
    pub items: Vec<T>,
    pub offset: u64,
    /// From `X-Apify-Pagination-Total`, when present.
    pub total: Option<u64>,
}

impl<T> DatasetPage<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Offset of the page following this one.
    pub fn next_offset(&self) -> u64 {
        self.offset + self.items.len() as u64
    }
}

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reel_post_parses_counts_and_timestamp() {
        let post: InstagramPost = serde_json::from_value(serde_json::json!({
            "url": "https://www.instagram.com/reel/C7abc/",
            "caption": "sunset run",
            "likesCount": 120,
            "videoPlayCount": 4000,
            "timestamp": "2024-05-08T17:42:00.000Z",
            "type": "Video",
            "productType": "clips"
        }))
        .unwrap();

        assert!(post.is_reel());
        assert!(!post.is_error());
        assert_eq!(post.views(), Some(4000));
        assert_eq!(
            post.published_at().unwrap().to_rfc3339(),
            "2024-05-08T17:42:00+00:00"
        );
    }

    #[test]
    fn junk_timestamp_is_unknown_not_an_error() {
        let post: InstagramPost = serde_json::from_value(serde_json::json!({
            "url": "https://www.instagram.com/p/C7xyz/",
            "timestamp": "yesterday",
            "type": "Image"
        }))
        .unwrap();

        assert_eq!(post.published_at(), None);
        assert!(!post.is_reel());
        assert_eq!(post.views(), None);
    }

    #[test]
    fn error_item_is_detected() {
        let post: InstagramPost = serde_json::from_value(serde_json::json!({
            "url": "https://www.instagram.com/nobody_here_123",
            "error": "not_found",
            "errorDescription": "Page not found"
        }))
        .unwrap();

        assert!(post.is_error());
    }

    #[test]
    fn dataset_page_next_offset_advances_by_item_count() {
        let page = DatasetPage {
            items: vec![1, 2, 3],
            offset: 20,
            total: Some(50),
        };
        assert_eq!(page.next_offset(), 23);
        assert!(!page.is_empty());
    }
}
