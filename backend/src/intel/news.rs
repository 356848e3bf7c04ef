// =============================================================================
// News calendar — high-impact window checks
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{DependencyFailure, NewsCalendar, NewsCheck};

/// Calendar with no events: every check reports a clear window.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNewsCalendar;

#[async_trait]
impl NewsCalendar for NoNewsCalendar {
    async fn check_high_impact(&self, _instrument: &str) -> Result<NewsCheck> {
        Ok(NewsCheck::clear())
    }
}

/// Remote calendar: `GET {base_url}?symbol=..` returning
/// `{ "isHighImpact": bool, "events": [..] }`.
pub struct HttpNewsCalendar {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNewsCalendar {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build news HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl NewsCalendar for HttpNewsCalendar {
    async fn check_high_impact(&self, instrument: &str) -> Result<NewsCheck> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("symbol", instrument)])
            .send()
            .await
            .context("news request failed")?
            .error_for_status()
            .context("news API returned an error status")?;

        let check: NewsCheck = resp.json().await.context("failed to decode news response")?;
        debug!(instrument, high_impact = check.is_high_impact, events = check.events.len(), "news checked");
        Ok(check)
    }
}

/// Run a news check bounded by `timeout`.
///
/// Timeouts and errors resolve to a clear window; the failure is returned
/// alongside so the caller can record it.
pub async fn check_with_timeout(
    calendar: &dyn NewsCalendar,
    instrument: &str,
    timeout: Duration,
) -> (NewsCheck, Option<DependencyFailure>) {
    match tokio::time::timeout(timeout, calendar.check_high_impact(instrument)).await {
        Ok(Ok(check)) => (check, None),
        Ok(Err(e)) => {
            warn!(instrument, error = %e, "news check failed; assuming no high-impact event");
            (
                NewsCheck::clear(),
                Some(DependencyFailure::Error {
                    dependency: "news",
                    message: format!("{e:#}"),
                }),
            )
        }
        Err(_) => {
            let after_ms = timeout.as_millis() as u64;
            warn!(instrument, after_ms, "news check timed out; assuming no high-impact event");
            (
                NewsCheck::clear(),
                Some(DependencyFailure::Timeout {
                    dependency: "news",
                    after_ms,
                }),
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Calendar that always reports an active high-impact window.
    pub(crate) struct AlwaysHighImpact;

    #[async_trait]
    impl NewsCalendar for AlwaysHighImpact {
        async fn check_high_impact(&self, _instrument: &str) -> Result<NewsCheck> {
            Ok(NewsCheck {
                is_high_impact: true,
                events: vec![serde_json::json!({ "title": "NFP" })],
            })
        }
    }

    struct Hanging;

    #[async_trait]
    impl NewsCalendar for Hanging {
        async fn check_high_impact(&self, _instrument: &str) -> Result<NewsCheck> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(NewsCheck {
                is_high_impact: true,
                events: Vec::new(),
            })
        }
    }

    struct Failing;

    #[async_trait]
    impl NewsCalendar for Failing {
        async fn check_high_impact(&self, _instrument: &str) -> Result<NewsCheck> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn clear_calendar() {
        let (check, failure) = check_with_timeout(&NoNewsCalendar, "EUR/USD", Duration::from_secs(1)).await;
        assert!(!check.is_high_impact);
        assert!(failure.is_none());
    }

    #[tokio::test]
    async fn high_impact_passes_through() {
        let (check, failure) = check_with_timeout(&AlwaysHighImpact, "EUR/USD", Duration::from_secs(1)).await;
        assert!(check.is_high_impact);
        assert_eq!(check.events.len(), 1);
        assert!(failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_defaults_to_clear() {
        let (check, failure) = check_with_timeout(&Hanging, "EUR/USD", Duration::from_millis(1_500)).await;
        assert!(!check.is_high_impact);
        assert_eq!(
            failure,
            Some(DependencyFailure::Timeout {
                dependency: "news",
                after_ms: 1_500
            })
        );
    }

    #[tokio::test]
    async fn error_defaults_to_clear() {
        let (check, failure) = check_with_timeout(&Failing, "EUR/USD", Duration::from_secs(1)).await;
        assert!(!check.is_high_impact);
        assert!(matches!(failure, Some(DependencyFailure::Error { dependency: "news", .. })));
    }

    #[test]
    fn decodes_api_shape() {
        let check: NewsCheck = serde_json::from_str(r#"{"isHighImpact":true}"#).unwrap();
        assert!(check.is_high_impact);
        assert!(check.events.is_empty());
    }
}
