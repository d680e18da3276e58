//! Paginated JSON endpoint.
//!
//! Requests `GET <url>?page=N[&since=<rfc3339>]` starting at page 1. A page is
//! either a bare array of items or `{"items": [...], "has_more": bool}`. A bare
//! array ends the pass when it comes back empty.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use prospector_common::{RawRecord, SourceId};

use super::item::{is_since, parse_item};
use crate::source::{Fetch, SkipCounter, SourceAdapter, SourceError};
use crate::throttle::Throttle;

pub struct HttpJsonSource {
    id: SourceId,
    client: reqwest::Client,
    url: Url,
    page_limit: Option<u32>,
    throttle: Throttle,
}

impl HttpJsonSource {
    pub fn new(
        id: SourceId,
        client: reqwest::Client,
        url: Url,
        page_limit: Option<u32>,
        throttle: Throttle,
    ) -> Self {
        Self {
            id,
            client,
            url,
            page_limit,
            throttle,
        }
    }
}

/// Map an HTTP status to a source failure. `None` for success.
pub fn classify_status(status: StatusCode, retry_after: Option<&str>) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Some(SourceError::RateLimited { retry_after });
    }
    Some(SourceError::Unavailable(format!("HTTP {status}")))
}

struct Page {
    items: Vec<serde_json::Value>,
    has_more: bool,
}

fn parse_page(body: serde_json::Value) -> Result<Page, SourceError> {
    match body {
        serde_json::Value::Array(items) => {
            let has_more = !items.is_empty();
            Ok(Page { items, has_more })
        }
        serde_json::Value::Object(mut obj) => {
            let items = match obj.remove("items") {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    return Err(SourceError::Unavailable(
                        "page object has no items array".into(),
                    ))
                }
            };
            let has_more = obj
                .get("has_more")
                .and_then(|v| v.as_bool())
                .unwrap_or(!items.is_empty());
            Ok(Page { items, has_more })
        }
        _ => Err(SourceError::Unavailable("unexpected page shape".into())),
    }
}

/// Walks pages one at a time. Stops after the last page, the first failure,
/// or the page limit.
struct Pager {
    source: SourceId,
    client: reqwest::Client,
    url: Url,
    since: Option<DateTime<Utc>>,
    page: u32,
    page_limit: Option<u32>,
    throttle: Throttle,
    skipped: SkipCounter,
    done: bool,
}

type PageItems = Vec<Result<RawRecord, SourceError>>;

impl Pager {
    async fn next_page(mut self) -> Option<(PageItems, Self)> {
        if self.done {
            return None;
        }
        if self.page_limit.is_some_and(|limit| self.page > limit) {
            self.done = true;
            let reason = format!("page limit {} reached", self.page - 1);
            return Some((vec![Err(SourceError::Exhausted(reason))], self));
        }

        self.throttle.acquire().await;
        let page = match self.get_page().await {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Some((vec![Err(e)], self));
            }
        };

        let fetched_at = Utc::now();
        let mut records = Vec::with_capacity(page.items.len());
        for value in page.items {
            match parse_item(&self.source, value, fetched_at) {
                Some(record) if is_since(&record, self.since) => records.push(Ok(record)),
                Some(_) => {}
                None => {
                    warn!(source = %self.source, page = self.page, "Skipping malformed item");
                    self.skipped.incr();
                }
            }
        }
        debug!(source = %self.source, page = self.page, records = records.len(), "Page fetched");

        self.done = !page.has_more;
        self.page += 1;
        Some((records, self))
    }

    async fn get_page(&self) -> Result<Page, SourceError> {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &self.page.to_string());
            if let Some(since) = self.since {
                query.append_pair("since", &since.to_rfc3339());
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok());
        if let Some(err) = classify_status(response.status(), retry_after) {
            return Err(err);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceError::Unavailable(format!("invalid page body: {e}")))?;
        parse_page(body)
    }
}

#[async_trait]
impl SourceAdapter for HttpJsonSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Fetch, SourceError> {
        let skipped = SkipCounter::default();
        let pager = Pager {
            source: self.id.clone(),
            client: self.client.clone(),
            url: self.url.clone(),
            since,
            page: 1,
            page_limit: self.page_limit,
            throttle: self.throttle.clone(),
            skipped: skipped.clone(),
            done: false,
        };
        let records = stream::unfold(pager, Pager::next_page)
            .flat_map(stream::iter)
            .boxed();
        Ok(Fetch::new(records, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mapping() {
        assert_eq!(classify_status(StatusCode::OK, None), None);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some("120")),
            Some(SourceError::RateLimited {
                retry_after: Some(Duration::from_secs(120))
            })
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some("Wed, 21 Oct 2026 07:28:00 GMT")),
            Some(SourceError::RateLimited { retry_after: None })
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None),
            Some(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn page_shapes() {
        let page = parse_page(json!([{"name": "A"}])).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.has_more);

        let page = parse_page(json!([])).unwrap();
        assert!(!page.has_more);

        let page = parse_page(json!({"items": [{"name": "A"}], "has_more": false})).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_more);

        assert!(parse_page(json!({"results": []})).is_err());
        assert!(parse_page(json!("nope")).is_err());
    }

    #[tokio::test]
    async fn page_limit_exhausts_before_any_request() {
        let source = HttpJsonSource::new(
            SourceId::from("feed"),
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9/companies").unwrap(),
            Some(0),
            Throttle::unlimited(),
        );
        let fetch = source.fetch(None).await.unwrap();
        let items: Vec<_> = fetch.records.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SourceError::Exhausted(_))));
    }
}
