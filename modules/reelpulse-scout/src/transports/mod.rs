//! Feed transports: the Apify dataset API and a Browserless-driven browser.

pub mod api;
pub mod browser;

pub use api::ApiTransport;
pub use browser::BrowserTransport;

use reelpulse_common::ScrapeError;

/// Map an Apify client error onto the scrape taxonomy.
pub(crate) fn from_apify(err: apify_client::ApifyError) -> ScrapeError {
    if err.is_auth() {
        ScrapeError::AuthenticationFailure(err.to_string())
    } else if err.is_transient() {
        ScrapeError::Transient(err.to_string())
    } else {
        ScrapeError::Fatal(err.to_string())
    }
}

/// Map a Browserless/CDP error onto the scrape taxonomy.
pub(crate) fn from_browserless(err: browserless_client::BrowserlessError) -> ScrapeError {
    match err {
        browserless_client::BrowserlessError::Api { status: 401 | 403, .. } => {
            ScrapeError::AuthenticationFailure(err.to_string())
        }
        ref e if e.is_transient() => ScrapeError::Transient(err.to_string()),
        _ => ScrapeError::Fatal(err.to_string()),
    }
}

/// Negative counts are the scrapers' way of saying "hidden".
pub(crate) fn known_count(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apify_client::ApifyError;
    use browserless_client::BrowserlessError;

    #[test]
    fn apify_errors_map_by_kind() {
        let auth = ApifyError::Api {
            status: 401,
            message: "bad token".into(),
        };
        assert!(matches!(from_apify(auth), ScrapeError::AuthenticationFailure(_)));

        let busy = ApifyError::Api {
            status: 503,
            message: "busy".into(),
        };
        assert!(matches!(from_apify(busy), ScrapeError::Transient(_)));

        let failed = ApifyError::RunFailed("FAILED".into());
        assert!(matches!(from_apify(failed), ScrapeError::Fatal(_)));
    }

    #[test]
    fn browserless_errors_map_by_kind() {
        let auth = BrowserlessError::Api {
            status: 403,
            message: "token".into(),
        };
        assert!(matches!(from_browserless(auth), ScrapeError::AuthenticationFailure(_)));
        assert!(matches!(
            from_browserless(BrowserlessError::Script("element gone".into())),
            ScrapeError::Transient(_)
        ));
        assert!(matches!(
            from_browserless(BrowserlessError::Cdp("socket closed".into())),
            ScrapeError::Fatal(_)
        ));
    }

    #[test]
    fn hidden_counts_are_unknown() {
        assert_eq!(known_count(Some(-1)), None);
        assert_eq!(known_count(Some(0)), Some(0));
        assert_eq!(known_count(None), None);
    }
}
