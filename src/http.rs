//! HTTP page fetcher for the list API.
//!
//! One [`HttpPageFetcher`] per resource family. Key dimensions are mapped to
//! the family's query parameters by [`Resource::query`]; the response is a
//! JSON envelope `{ "items": [...], "total": n }` (a few common aliases are
//! accepted for both fields).

use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::{PageFetcher, PageRequest};
use crate::key::SlotKey;
use crate::slot::{Identified, Page};
use chrono::{Days, NaiveDate};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors rejecting a configured base URL.
#[derive(Debug, Error)]
pub enum BaseUrlError {
    #[error("Invalid base URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP is only allowed against loopback hosts (tests, local mocks).
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    Insecure,
    #[error("Base URL cannot carry a path: {0}")]
    NotABase(String),
}

/// Validate a base URL: http(s) only, and HTTPS unless the host is loopback.
pub fn validate_base_url(base: &str) -> Result<Url, BaseUrlError> {
    let url = Url::parse(base)?;
    match url.scheme() {
        "https" => {}
        "http" => {
            let loopback = matches!(
                url.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("[::1]")
            );
            if !loopback {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS base URL");
                return Err(BaseUrlError::Insecure);
            }
            tracing::warn!(base_url = %base, "Using non-HTTPS base URL (localhost only)");
        }
        scheme => return Err(BaseUrlError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.cannot_be_a_base() {
        return Err(BaseUrlError::NotABase(base.to_owned()));
    }
    Ok(url)
}

/// The four list families served by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Open bet markets: `tab` → `status`, `sub_tab` → `visibility`.
    BetMarkets,
    /// Fixtures by day: `tab` → `sport`, `date` → `from`/`to` (UTC day bounds).
    Fixtures,
    /// The user's bets: `tab` → `status`, `sub_tab` → `side`.
    BetHistory,
    /// Wallet ledger: `tab` → `type` (`all` means no filter).
    Transactions,
}

impl Resource {
    pub fn path(self) -> &'static [&'static str] {
        match self {
            Resource::BetMarkets => &["bet-markets"],
            Resource::Fixtures => &["fixtures"],
            Resource::BetHistory => &["bets", "history"],
            Resource::Transactions => &["wallet", "transactions"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Resource::BetMarkets => "bet-markets",
            Resource::Fixtures => "fixtures",
            Resource::BetHistory => "bet-history",
            Resource::Transactions => "transactions",
        }
    }

    /// Query parameters for one page of `key`.
    ///
    /// Filter dimensions are passed through under their own names.
    pub fn query(self, key: &SlotKey, offset: usize, limit: usize) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let mut push = |name: &str, value: &str| params.push((name.to_string(), value.to_string()));

        match self {
            Resource::BetMarkets => {
                if let Some(tab) = key.tab() {
                    push("status", tab);
                }
                if let Some(sub_tab) = key.sub_tab() {
                    push("visibility", sub_tab);
                }
            }
            Resource::Fixtures => {
                if let Some(tab) = key.tab() {
                    push("sport", tab);
                }
                if let Some((from, to)) = key.date().and_then(day_bounds) {
                    push("from", &from);
                    push("to", &to);
                }
            }
            Resource::BetHistory => {
                if let Some(tab) = key.tab() {
                    push("status", tab);
                }
                if let Some(sub_tab) = key.sub_tab() {
                    push("side", sub_tab);
                }
            }
            Resource::Transactions => {
                if let Some(tab) = key.tab().filter(|t| *t != "all") {
                    push("type", tab);
                }
            }
        }
        for (name, value) in key.filters() {
            push(name, value);
        }
        push("offset", &offset.to_string());
        push("limit", &limit.to_string());
        params
    }
}

impl std::str::FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet-markets" => Ok(Resource::BetMarkets),
            "fixtures" => Ok(Resource::Fixtures),
            "bet-history" => Ok(Resource::BetHistory),
            "transactions" => Ok(Resource::Transactions),
            other => Err(format!("unknown resource: {other}")),
        }
    }
}

/// `[date 00:00Z, date+1 00:00Z)` as RFC 3339 strings.
fn day_bounds(date: NaiveDate) -> Option<(String, String)> {
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    let end = date.checked_add_days(Days::new(1))?.and_hms_opt(0, 0, 0)?.and_utc();
    Some((start.to_rfc3339(), end.to_rfc3339()))
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(alias = "data", alias = "results")]
    items: Vec<T>,
    #[serde(default, alias = "count", alias = "totalCount")]
    total: Option<usize>,
}

/// Fetches pages of `T` from one resource family over HTTP.
pub struct HttpPageFetcher<T> {
    client: reqwest::Client,
    endpoint: Url,
    resource: Resource,
    token: Option<SecretString>,
    timeout: Duration,
    max_body_bytes: usize,
    _item: PhantomData<fn() -> T>,
}

impl<T> HttpPageFetcher<T> {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        resource: Resource,
    ) -> Result<Self, BaseUrlError> {
        let mut endpoint = validate_base_url(base_url)?;
        endpoint
            .path_segments_mut()
            .map_err(|_| BaseUrlError::NotABase(base_url.to_owned()))?
            .pop_if_empty()
            .extend(resource.path());

        Ok(Self {
            client,
            endpoint,
            resource,
            token: None,
            timeout: Duration::from_secs(20),
            max_body_bytes: 5 * 1024 * 1024,
            _item: PhantomData,
        })
    }

    pub fn from_config(
        client: reqwest::Client,
        config: &Config,
        resource: Resource,
    ) -> Result<Self, BaseUrlError> {
        let mut fetcher = Self::new(client, &config.base_url, resource)?
            .with_timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .with_max_body_bytes(config.max_response_bytes);
        fetcher.token = config.api_token();
        Ok(fetcher)
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send the request and read the bounded body. Not itself time-limited.
    async fn fetch_body(&self, url: Url) -> Result<Vec<u8>, FetchError> {
        let mut builder = self.client.get(url);
        if let Some(token) = &self.token {
            tracing::trace!("API authentication configured");
            builder = builder.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        read_limited_bytes(response, self.max_body_bytes).await
    }

    fn page_url(&self, request: &PageRequest) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(
            self.resource
                .query(&request.key, request.offset, request.limit),
        );
        url
    }
}

impl<T> PageFetcher for HttpPageFetcher<T>
where
    T: DeserializeOwned + Identified + Clone + Send + Sync + 'static,
{
    type Item = T;

    async fn fetch_page(&self, request: PageRequest) -> Result<Page<T>, FetchError> {
        let url = self.page_url(&request);

        // One deadline covers the headers and the whole body, so a server that
        // stalls mid-response cannot hold the slot in flight.
        let body = tokio::time::timeout(self.timeout, self.fetch_body(url.clone()))
            .await
            .map_err(|_| {
                tracing::warn!(
                    url = %url,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Page request timed out"
                );
                FetchError::Timeout(self.timeout)
            })??;
        let envelope: Envelope<T> = serde_json::from_slice(&body)?;

        let received = envelope.items.len();
        // Without a reported total, a full page implies there may be more.
        let total = envelope.total.unwrap_or_else(|| {
            request.offset + received + usize::from(received >= request.limit)
        });
        tracing::debug!(
            resource = self.resource.name(),
            url = %url,
            received,
            total,
            "Fetched page"
        );
        Ok(Page::new(envelope.items, total))
    }
}

/// Read a response body, rejecting anything larger than `limit` bytes.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::Decode(format!(
                "response too large ({len} bytes, max {limit})"
            )));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::Decode(format!(
                "response exceeds {limit} bytes"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{resolve, Selection};
    use crate::models::{BetMarket, Fixture, Transaction};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(key: SlotKey, offset: usize, limit: usize) -> PageRequest {
        PageRequest { key, offset, limit }
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("https://api.example.com/v1").is_ok());
        assert!(validate_base_url("http://127.0.0.1:8080").is_ok());
        assert!(validate_base_url("http://localhost:3000").is_ok());
        assert!(matches!(
            validate_base_url("http://api.example.com"),
            Err(BaseUrlError::Insecure)
        ));
        assert!(matches!(
            validate_base_url("ftp://api.example.com"),
            Err(BaseUrlError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_base_url("not a url"),
            Err(BaseUrlError::Invalid(_))
        ));
    }

    #[test]
    fn test_endpoint_appends_resource_path() {
        let fetcher: HttpPageFetcher<BetMarket> = HttpPageFetcher::new(
            reqwest::Client::new(),
            "https://api.example.com/v2/",
            Resource::BetHistory,
        )
        .unwrap();
        assert_eq!(
            fetcher.endpoint().as_str(),
            "https://api.example.com/v2/bets/history"
        );
    }

    #[test]
    fn test_bet_market_query() {
        let key = resolve(&Selection::new().tab("pending").sub_tab("public"));
        let params = Resource::BetMarkets.query(&key, 20, 20);
        assert_eq!(
            params,
            vec![
                ("status".to_string(), "pending".to_string()),
                ("visibility".to_string(), "public".to_string()),
                ("offset".to_string(), "20".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn test_fixture_query_uses_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let key = resolve(&Selection::new().tab("soccer").date(date));
        let params = Resource::Fixtures.query(&key, 0, 10);
        assert!(params.contains(&("sport".to_string(), "soccer".to_string())));
        assert!(params.contains(&("from".to_string(), "2024-05-01T00:00:00+00:00".to_string())));
        assert!(params.contains(&("to".to_string(), "2024-05-02T00:00:00+00:00".to_string())));
    }

    #[test]
    fn test_transactions_all_tab_is_unfiltered() {
        let key = resolve(&Selection::new().tab("all").filter("currency", "USD"));
        let params = Resource::Transactions.query(&key, 0, 10);
        assert!(!params.iter().any(|(k, _)| k == "type"));
        assert!(params.contains(&("currency".to_string(), "USD".to_string())));
    }

    #[test]
    fn test_resource_from_str() {
        assert_eq!("fixtures".parse::<Resource>(), Ok(Resource::Fixtures));
        assert!("casino".parse::<Resource>().is_err());
    }

    #[tokio::test]
    async fn test_fetch_page_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bet-markets"))
            .and(query_param("status", "pending"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items":[{"id":"a","title":"A"},{"id":"b","title":"B"}],"total":5}"#,
            ))
            .mount(&server)
            .await;

        let fetcher: HttpPageFetcher<BetMarket> =
            HttpPageFetcher::new(reqwest::Client::new(), &server.uri(), Resource::BetMarkets)
                .unwrap();
        let key = resolve(&Selection::new().tab("pending"));
        let page = fetcher.fetch_page(request(key, 0, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        let ids: Vec<_> = page.items.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fetch_page_accepts_envelope_aliases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fixtures"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":[{"id":1},{"id":2}],"totalCount":2}"#,
            ))
            .mount(&server)
            .await;

        let fetcher: HttpPageFetcher<Fixture> =
            HttpPageFetcher::new(reqwest::Client::new(), &server.uri(), Resource::Fixtures)
                .unwrap();
        let page = fetcher
            .fetch_page(request(SlotKey::from_pairs([("tab", "soccer")]), 0, 20))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_missing_total_is_inferred() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"results":[{"id":"t1"},{"id":"t2"}]}"#),
            )
            .mount(&server)
            .await;

        let fetcher: HttpPageFetcher<Transaction> =
            HttpPageFetcher::new(reqwest::Client::new(), &server.uri(), Resource::Transactions)
                .unwrap();
        let key = SlotKey::from_pairs([("tab", "all")]);

        let full = fetcher.fetch_page(request(key.clone(), 40, 2)).await.unwrap();
        assert_eq!(full.total, 43);

        let short = fetcher.fetch_page(request(key, 40, 10)).await.unwrap();
        assert_eq!(short.total, 42);
    }

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items":[],"total":0}"#))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher: HttpPageFetcher<Transaction> =
            HttpPageFetcher::new(reqwest::Client::new(), &server.uri(), Resource::Transactions)
                .unwrap()
                .with_token(SecretString::from("sekrit"));
        let page = fetcher
            .fetch_page(request(SlotKey::from_pairs([("tab", "all")]), 0, 20))
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher: HttpPageFetcher<BetMarket> =
            HttpPageFetcher::new(reqwest::Client::new(), &server.uri(), Resource::BetMarkets)
                .unwrap();
        let err = fetcher
            .fetch_page(request(SlotKey::from_pairs([("tab", "pending")]), 0, 20))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(503));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"rows":[]}"#))
            .mount(&server)
            .await;

        let fetcher: HttpPageFetcher<BetMarket> =
            HttpPageFetcher::new(reqwest::Client::new(), &server.uri(), Resource::BetMarkets)
                .unwrap();
        let err = fetcher
            .fetch_page(request(SlotKey::from_pairs([("tab", "pending")]), 0, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = MockServer::start().await;
        let body = format!(r#"{{"items":[],"total":0,"pad":"{}"}}"#, "x".repeat(4096));
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let fetcher: HttpPageFetcher<BetMarket> =
            HttpPageFetcher::new(reqwest::Client::new(), &server.uri(), Resource::BetMarkets)
                .unwrap()
                .with_max_body_bytes(1024);
        let err = fetcher
            .fetch_page(request(SlotKey::from_pairs([("tab", "pending")]), 0, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(msg) if msg.contains("too large") || msg.contains("exceeds")));
    }
}
