//! Autotask REST transport
//!
//! A thin reqwest client for the three endpoints the governor and planner
//! need: threshold information (quota), query count, and paged query.
//!
//! Query pages past the first are reached through the `nextPageUrl` link
//! each page carries. Links are remembered per query, so reading pages in
//! order costs one request per page.
//!
//! Credentials are passed in already issued; this client only attaches them
//! as headers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::planner::{QueryFilter, RecordCounter};
use super::quota::{QuotaError, QuotaProbe, QuotaSnapshot};
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Quota endpoint, relative to the base URL
const THRESHOLD_PATH: &str = "ThresholdInformation";

/// Field used to express "no filter", since the API requires at least one
const MATCH_ALL_FIELD: &str = "id";

/// Distinct queries whose page links are kept before the store is reset
const MAX_CURSOR_QUERIES: usize = 32;

const USER_AGENT: &str = concat!("autotask-core/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Credentials
// ============================================================================

/// Pre-issued API credentials, sent as request headers
#[derive(Clone)]
pub struct AutotaskCredentials {
    pub username: String,
    pub secret: String,
    pub integration_code: String,
}

impl std::fmt::Debug for AutotaskCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutotaskCredentials")
            .field("username", &self.username)
            .field("secret", &"****")
            .field("integration_code", &"****")
            .finish()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Response from the threshold information endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThresholdResponse {
    /// Calls allowed per timeframe
    external_request_threshold: Option<u64>,
    /// Timeframe length in minutes
    request_threshold_timeframe: Option<u64>,
    /// Calls made in the current timeframe
    current_timeframe_request_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountResponse {
    query_count: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "pageDetails")]
    page_details: Option<PageDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageDetails {
    next_page_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CountRequest<'a> {
    filter: &'a [QueryFilter],
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    filter: &'a [QueryFilter],
    #[serde(rename = "MaxRecords")]
    max_records: usize,
}

// ============================================================================
// Page Links
// ============================================================================

/// `nextPageUrl` links seen so far, keyed by query then by the page they open
#[derive(Debug, Default)]
struct PageCursors {
    by_query: HashMap<String, BTreeMap<u32, String>>,
}

impl PageCursors {
    /// The known link closest to, but not past, `page`
    fn nearest(&self, key: &str, page: u32) -> Option<(u32, String)> {
        if page < 2 {
            return None;
        }
        self.by_query
            .get(key)?
            .range(2..=page)
            .next_back()
            .map(|(page, url)| (*page, url.clone()))
    }

    fn remember(&mut self, key: &str, page: u32, url: String) {
        if !self.by_query.contains_key(key) && self.by_query.len() >= MAX_CURSOR_QUERIES {
            self.by_query.clear();
        }
        self.by_query
            .entry(key.to_string())
            .or_default()
            .insert(page, url);
    }
}

fn cursor_key(entity: &str, filter: &[QueryFilter], page_size: usize) -> Result<String> {
    Ok(format!(
        "{}|{}|{}",
        entity,
        serde_json::to_string(filter)?,
        page_size
    ))
}

// ============================================================================
// AutotaskClient
// ============================================================================

/// HTTP client for the Autotask REST API
#[derive(Debug, Clone)]
pub struct AutotaskClient {
    client: Client,
    base_url: String,
    credentials: AutotaskCredentials,
    cursors: Arc<Mutex<PageCursors>>,
}

impl AutotaskClient {
    /// Create a client for `base_url` (e.g. `https://webservices2.autotask.net/atservicesrest/v1.0`)
    pub fn new(base_url: impl Into<String>, credentials: AutotaskCredentials) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("Autotask API URL is not set"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            credentials,
            cursors: Arc::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.authorized(self.client.request(method, self.url(path)))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("ApiIntegrationCode", &self.credentials.integration_code)
            .header("UserName", &self.credentials.username)
            .header("Secret", &self.credentials.secret)
            .header("Accept", "application/json")
    }

    /// Current quota usage
    pub async fn threshold_information(&self) -> std::result::Result<QuotaSnapshot, QuotaError> {
        log::debug!("[autotask] Fetching threshold information");

        let response = self.request(Method::GET, THRESHOLD_PATH).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(QuotaError::Unauthorized(format!(
                "Threshold endpoint rejected credentials (HTTP {})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuotaError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let body = response.text().await?;
        let parsed: ThresholdResponse = serde_json::from_str(&body)?;
        threshold_to_snapshot(parsed)
    }

    /// Number of `entity` records matching `filters`
    pub async fn count_records(&self, entity: &str, filters: &[QueryFilter]) -> Result<u64> {
        let filter = effective_filters(filters);
        let response = self
            .request(Method::POST, &format!("{}/query/count", entity))
            .json(&CountRequest { filter: &filter })
            .send()
            .await?;

        let parsed: CountResponse = read_json(response).await?;
        Ok(parsed.query_count)
    }

    fn cursors(&self) -> MutexGuard<'_, PageCursors> {
        self.cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate a page link before credentials are sent to it
    fn page_link(&self, link: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| Error::config(format!("Invalid Autotask API URL: {}", e)))?;
        let url = Url::parse(link)
            .map_err(|e| Error::api(format!("Invalid next page link '{}': {}", link, e)))?;

        if url.scheme() != base.scheme() || url.host_str() != base.host_str() {
            return Err(Error::api(format!(
                "Next page link points away from {}",
                base.host_str().unwrap_or_default()
            )));
        }
        Ok(url)
    }

    async fn follow_page<T: DeserializeOwned>(&self, link: &str) -> Result<QueryResponse<T>> {
        let url = self.page_link(link)?;
        let response = self.authorized(self.client.get(url)).send().await?;
        read_json(response).await
    }

    /// One page of `entity` records, pages numbered from 1
    ///
    /// The API may return more or fewer records than `page_size`. A page
    /// past the last one is empty.
    pub async fn query_page<T>(
        &self,
        entity: &str,
        filters: Vec<QueryFilter>,
        page_size: usize,
        page: Option<u32>,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let filter = effective_filters(&filters);
        let page = page.unwrap_or(1).max(1);
        let key = cursor_key(entity, &filter, page_size)?;
        log::debug!(
            "[autotask] Querying {} (page {}, {} per page, {} filters)",
            entity,
            page,
            page_size,
            filter.len()
        );

        let start = self.cursors().nearest(&key, page);
        let (mut reached, mut response) = match start {
            Some((reached, link)) => (reached, self.follow_page::<T>(&link).await?),
            None => {
                let response = self
                    .request(Method::POST, &format!("{}/query", entity))
                    .json(&QueryRequest {
                        filter: &filter,
                        max_records: page_size,
                    })
                    .send()
                    .await?;
                (1, read_json::<QueryResponse<T>>(response).await?)
            }
        };

        loop {
            let next = response
                .page_details
                .take()
                .and_then(|details| details.next_page_url);
            if let Some(link) = &next {
                self.cursors().remember(&key, reached + 1, link.clone());
            }
            if reached >= page {
                return Ok(response.items);
            }

            match next {
                Some(link) => {
                    log::debug!("[autotask] Following {} link to page {}", entity, reached + 1);
                    response = self.follow_page(&link).await?;
                    reached += 1;
                }
                None => return Ok(Vec::new()),
            }
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let url = response.url().path().to_string();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::api(format!("{} was rate limited (HTTP 429)", url)));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        log::error!("[autotask] {} returned HTTP {}: {}", url, status, body);
        return Err(Error::api(format!("{} returned HTTP {}: {}", url, status, body)));
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

fn effective_filters(filters: &[QueryFilter]) -> Vec<QueryFilter> {
    if filters.is_empty() {
        vec![QueryFilter::exist(MATCH_ALL_FIELD)]
    } else {
        filters.to_vec()
    }
}

fn threshold_to_snapshot(
    response: ThresholdResponse,
) -> std::result::Result<QuotaSnapshot, QuotaError> {
    let used = response.current_timeframe_request_count.ok_or_else(|| {
        QuotaError::ParseError("threshold response has no currentTimeframeRequestCount".to_string())
    })?;
    let limit = response.external_request_threshold.unwrap_or(0);
    let window = match response.request_threshold_timeframe {
        Some(minutes) => format!("within {} minutes", minutes),
        None => "at an unknown time".to_string(),
    };

    Ok(QuotaSnapshot::new(used, limit, window))
}

// ============================================================================
// Probe Implementations
// ============================================================================

#[async_trait]
impl QuotaProbe for AutotaskClient {
    async fn probe(&self) -> std::result::Result<QuotaSnapshot, QuotaError> {
        self.threshold_information().await
    }
}

#[async_trait]
impl RecordCounter for AutotaskClient {
    async fn count(&self, entity: &str, filters: &[QueryFilter]) -> Result<u64> {
        self.count_records(entity, filters).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials() -> AutotaskCredentials {
        AutotaskCredentials {
            username: "api@example.com".to_string(),
            secret: "s3cret".to_string(),
            integration_code: "CODE".to_string(),
        }
    }

    #[test]
    fn test_new_normalizes_base_url() {
        let client = AutotaskClient::new("https://example.test/v1.0/ ", credentials()).unwrap();
        assert_eq!(client.base_url(), "https://example.test/v1.0");
        assert_eq!(client.url("/Tickets/query"), "https://example.test/v1.0/Tickets/query");
    }

    #[test]
    fn test_new_rejects_empty_url() {
        let err = AutotaskClient::new("  ", credentials()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let debug = format!("{:?}", credentials());
        assert!(debug.contains("api@example.com"));
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("CODE"));
    }

    #[test]
    fn test_threshold_to_snapshot() {
        let response: ThresholdResponse = serde_json::from_value(json!({
            "externalRequestThreshold": 10000,
            "requestThresholdTimeframe": 60,
            "currentTimeframeRequestCount": 2500
        }))
        .unwrap();

        let snapshot = threshold_to_snapshot(response).unwrap();
        assert_eq!(snapshot.used, 2500);
        assert_eq!(snapshot.limit, 10000);
        assert_eq!(snapshot.percent_used, 25.0);
        assert_eq!(snapshot.window_remaining, "within 60 minutes");
    }

    #[test]
    fn test_threshold_without_usage_is_parse_error() {
        let response: ThresholdResponse =
            serde_json::from_value(json!({"externalRequestThreshold": 10000})).unwrap();
        assert!(matches!(
            threshold_to_snapshot(response),
            Err(QuotaError::ParseError(_))
        ));
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let filters = effective_filters(&[]);
        assert_eq!(filters, vec![QueryFilter::exist("id")]);

        let given = vec![QueryFilter::eq("status", 1)];
        assert_eq!(effective_filters(&given), given);
    }

    #[test]
    fn test_query_request_body() {
        let filter = vec![QueryFilter::eq("status", 1)];
        let body = serde_json::to_value(QueryRequest {
            filter: &filter,
            max_records: 500,
        })
        .unwrap();

        assert_eq!(
            body,
            json!({
                "filter": [{"op": "eq", "field": "status", "value": 1}],
                "MaxRecords": 500
            })
        );
    }

    #[test]
    fn test_query_response_tolerates_missing_items() {
        let parsed: QueryResponse<serde_json::Value> =
            serde_json::from_value(json!({"pageDetails": {"count": 0}})).unwrap();
        assert!(parsed.items.is_empty());
        assert!(parsed.page_details.unwrap().next_page_url.is_none());
    }

    #[test]
    fn test_query_response_reads_next_page_link() {
        let parsed: QueryResponse<serde_json::Value> = serde_json::from_value(json!({
            "items": [{"id": 1}, {"id": 2}],
            "pageDetails": {
                "count": 2,
                "requestCount": 2,
                "prevPageUrl": null,
                "nextPageUrl": "https://example.test/v1.0/Tickets/query/next?paging=abc"
            }
        }))
        .unwrap();

        assert_eq!(parsed.items.len(), 2);
        assert_eq!(
            parsed.page_details.unwrap().next_page_url.as_deref(),
            Some("https://example.test/v1.0/Tickets/query/next?paging=abc")
        );
    }

    #[test]
    fn test_page_cursors_resume_from_nearest_link() {
        let mut cursors = PageCursors::default();
        cursors.remember("Tickets|a|500", 2, "link-2".to_string());
        cursors.remember("Tickets|a|500", 3, "link-3".to_string());

        assert_eq!(
            cursors.nearest("Tickets|a|500", 5),
            Some((3, "link-3".to_string()))
        );
        assert_eq!(
            cursors.nearest("Tickets|a|500", 2),
            Some((2, "link-2".to_string()))
        );
        assert_eq!(cursors.nearest("Tickets|a|500", 1), None);
        assert_eq!(cursors.nearest("Tickets|b|500", 3), None);
    }

    #[test]
    fn test_page_cursors_are_bounded() {
        let mut cursors = PageCursors::default();
        for i in 0..MAX_CURSOR_QUERIES {
            cursors.remember(&format!("query-{}", i), 2, "link".to_string());
        }
        cursors.remember("query-0", 3, "link-3".to_string());
        assert_eq!(cursors.by_query.len(), MAX_CURSOR_QUERIES);

        cursors.remember("one-more", 2, "link".to_string());
        assert_eq!(cursors.by_query.len(), 1);
        assert!(cursors.nearest("query-0", 3).is_none());
    }

    #[test]
    fn test_cursor_key_separates_queries() {
        let open = vec![QueryFilter::eq("status", 1)];
        let closed = vec![QueryFilter::eq("status", 5)];

        assert_ne!(
            cursor_key("Tickets", &open, 500).unwrap(),
            cursor_key("Tickets", &closed, 500).unwrap()
        );
        assert_ne!(
            cursor_key("Tickets", &open, 500).unwrap(),
            cursor_key("Tickets", &open, 100).unwrap()
        );
    }

    #[test]
    fn test_page_link_stays_on_api_host() {
        let client = AutotaskClient::new("https://example.test/v1.0", credentials()).unwrap();

        let url = client
            .page_link("https://example.test/v1.0/Tickets/query/next?paging=abc")
            .unwrap();
        assert_eq!(url.query(), Some("paging=abc"));

        assert!(client.page_link("https://elsewhere.test/steal").is_err());
        assert!(client.page_link("http://example.test/v1.0/next").is_err());
        assert!(client.page_link("not a url").is_err());
    }
}
