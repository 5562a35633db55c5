//! HubSpot API client seam.
//!
//! [`CrmApi`] is the capability the engine needs from the remote system:
//! enumerate pipelines, read one pipeline's stages, page through deal search
//! results, and read one deal's property version history. [`HubSpotClient`]
//! is the production implementation over `ureq` with a bearer token.
//!
//! 429 and 5xx responses are retried with bounded exponential backoff before
//! surfacing as [`ApiError::Status`]. Everything else fails on the first
//! attempt.

use std::cell::Cell;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing::warn;

use crate::model::{Deal, Pipeline, PropertyVersion, SearchPage, Stage};

const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";
const MAX_ATTEMPTS: u32 = 4;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by remote collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The CRM rejected the bearer token (401/403).
    #[error("the CRM rejected the credential (HTTP {status}); check the token")]
    Auth { status: u16 },

    /// Non-2xx response that is not an auth failure, after retries.
    #[error("CRM request failed with HTTP {status}: {url}")]
    Status { status: u16, url: String },

    /// The request never produced an HTTP response.
    #[error("transport error talking to the CRM: {0}")]
    Transport(String),

    /// The response body was not the JSON shape we expected.
    #[error("failed to decode CRM response from {url}")]
    Decode {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// The deal id is unknown to the CRM.
    #[error("deal {0} is unknown to the CRM")]
    DealNotFound(String),

    /// The pipeline id is unknown to the CRM.
    #[error("pipeline {0} is unknown to the CRM")]
    PipelineNotFound(String),
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// Filter and shape of one deal-search request. The cursor is threaded
/// separately because it changes on every page.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Restrict results to one pipeline; `None` searches every pipeline.
    pub pipeline_id: Option<String>,
    /// Deal properties to include in each search hit.
    pub properties: Vec<String>,
    /// Fixed page size; never adapted from responses.
    pub page_size: u32,
}

/// What the extraction engine needs from the CRM.
pub trait CrmApi {
    /// Enumerate every deal pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the listing call fails or its response
    /// cannot be decoded.
    fn list_pipelines(&self) -> Result<Vec<Pipeline>, ApiError>;

    /// Read one pipeline's stages.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::PipelineNotFound`] if the id is unknown to the
    /// CRM, or another [`ApiError`] on transport or decode failure.
    fn pipeline_stages(&self, pipeline_id: &str) -> Result<Vec<Stage>, ApiError>;

    /// Fetch one page of deal search results.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the search call fails after retries or its
    /// response cannot be decoded.
    fn search_deals(&self, query: &SearchQuery, after: Option<&str>)
    -> Result<SearchPage, ApiError>;

    /// Read one deal's raw version history for `property`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::DealNotFound`] if the deal id is unknown, or
    /// another [`ApiError`] on transport or decode failure.
    fn property_history(
        &self,
        deal_id: &str,
        property: &str,
    ) -> Result<Vec<PropertyVersion>, ApiError>;
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PipelineListWire {
    #[serde(default)]
    results: Vec<PipelineWire>,
}

#[derive(Debug, Deserialize)]
struct PipelineWire {
    id: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct PipelineDetailWire {
    #[serde(default)]
    stages: Vec<StageWire>,
}

#[derive(Debug, Deserialize)]
struct StageWire {
    id: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct SearchWire {
    #[serde(default)]
    results: Vec<DealWire>,
    paging: Option<PagingWire>,
}

#[derive(Debug, Deserialize)]
struct DealWire {
    id: String,
    #[serde(default)]
    properties: DealPropsWire,
}

#[derive(Debug, Default, Deserialize)]
struct DealPropsWire {
    dealname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PagingWire {
    next: Option<NextPageWire>,
}

#[derive(Debug, Deserialize)]
struct NextPageWire {
    after: String,
}

#[derive(Debug, Deserialize)]
struct DealDetailWire {
    #[serde(default)]
    properties: HashMap<String, PropertyHistoryWire>,
}

#[derive(Debug, Default, Deserialize)]
struct PropertyHistoryWire {
    #[serde(default)]
    versions: Vec<VersionWire>,
}

#[derive(Debug, Deserialize)]
struct VersionWire {
    timestamp: i64,
    value: Option<String>,
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Bearer-authenticated `ureq` client against the HubSpot REST API.
pub struct HubSpotClient {
    base_url: String,
    token: String,
    requests: Cell<usize>,
}

impl HubSpotClient {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Point the client at a different host (local stub servers in tests).
    #[must_use]
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            requests: Cell::new(0),
        }
    }

    /// Total HTTP requests issued so far, retries included.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self.execute(url, || {
            let mut request = ureq::get(url).set("Authorization", &format!("Bearer {}", self.token));
            for (name, value) in query {
                request = request.query(name, value);
            }
            request.call()
        })?;

        response.into_json::<T>().map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    fn post_json<T: DeserializeOwned>(&self, url: &str, body: &JsonValue) -> Result<T, ApiError> {
        let response = self.execute(url, || {
            ureq::post(url)
                .set("Authorization", &format!("Bearer {}", self.token))
                .send_json(body.clone())
        })?;

        response.into_json::<T>().map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    fn execute(
        &self,
        url: &str,
        send: impl Fn() -> Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response, ApiError> {
        let mut attempt = 1_u32;

        loop {
            self.requests.set(self.requests.get() + 1);

            match send() {
                Ok(response) => return Ok(response),
                Err(ureq::Error::Status(status, _)) => {
                    if status == 401 || status == 403 {
                        return Err(ApiError::Auth { status });
                    }

                    if retryable(status) && attempt < MAX_ATTEMPTS {
                        let delay = BASE_BACKOFF * 2_u32.saturating_pow(attempt - 1);
                        warn!(status, attempt, ?delay, "retryable CRM status, backing off");
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }

                    return Err(ApiError::Status {
                        status,
                        url: url.to_string(),
                    });
                }
                Err(err) => return Err(ApiError::Transport(err.to_string())),
            }
        }
    }
}

impl CrmApi for HubSpotClient {
    fn list_pipelines(&self) -> Result<Vec<Pipeline>, ApiError> {
        let url = format!("{}/crm/v3/pipelines/deals", self.base_url);
        let wire: PipelineListWire = self.get_json(&url, &[])?;

        Ok(wire
            .results
            .into_iter()
            .map(|pipeline| Pipeline {
                id: pipeline.id,
                label: pipeline.label,
            })
            .collect())
    }

    fn pipeline_stages(&self, pipeline_id: &str) -> Result<Vec<Stage>, ApiError> {
        let url = format!("{}/crm/v3/pipelines/deals/{pipeline_id}", self.base_url);
        let wire: PipelineDetailWire = match self.get_json(&url, &[]) {
            Err(ApiError::Status { status: 404, .. }) => {
                return Err(ApiError::PipelineNotFound(pipeline_id.to_string()));
            }
            other => other?,
        };

        Ok(wire
            .stages
            .into_iter()
            .map(|stage| Stage {
                id: stage.id,
                label: stage.label,
            })
            .collect())
    }

    fn search_deals(
        &self,
        query: &SearchQuery,
        after: Option<&str>,
    ) -> Result<SearchPage, ApiError> {
        let url = format!("{}/crm/v3/objects/deals/search", self.base_url);
        let wire: SearchWire = self.post_json(&url, &search_body(query, after))?;

        Ok(SearchPage {
            deals: wire
                .results
                .into_iter()
                .map(|deal| Deal {
                    id: deal.id,
                    name: deal.properties.dealname.unwrap_or_default(),
                })
                .collect(),
            next_cursor: wire.paging.and_then(|paging| paging.next).map(|next| next.after),
        })
    }

    fn property_history(
        &self,
        deal_id: &str,
        property: &str,
    ) -> Result<Vec<PropertyVersion>, ApiError> {
        let url = format!("{}/deals/v1/deal/{deal_id}", self.base_url);
        let mut wire: DealDetailWire =
            match self.get_json(&url, &[("includePropertyVersions", "true")]) {
                Err(ApiError::Status { status: 404, .. }) => {
                    return Err(ApiError::DealNotFound(deal_id.to_string()));
                }
                other => other?,
            };

        // A deal that has never carried the property yields no versions.
        let history = wire.properties.remove(property).unwrap_or_default();

        Ok(history
            .versions
            .into_iter()
            .map(|version| PropertyVersion {
                timestamp: version.timestamp,
                value: version.value,
            })
            .collect())
    }
}

/// Build the deal-search request body: pipeline EQ filter when one pipeline
/// is selected, stable ascending create-date sort, fixed page size, and the
/// continuation token when resuming.
fn search_body(query: &SearchQuery, after: Option<&str>) -> JsonValue {
    let mut body = json!({
        "filterGroups": [],
        "properties": query.properties,
        "sort": [{"propertyName": "createdate", "direction": "ASCENDING"}],
        "limit": query.page_size,
    });

    if let Some(pipeline_id) = &query.pipeline_id {
        body["filterGroups"] = json!([{
            "filters": [{
                "propertyName": "pipeline",
                "operator": "EQ",
                "value": pipeline_id,
            }]
        }]);
    }

    if let Some(after) = after {
        body["after"] = json!(after);
    }

    body
}

const fn retryable(status: u16) -> bool {
    status == 429 || status >= 500
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pipeline_id: Option<&str>) -> SearchQuery {
        SearchQuery {
            pipeline_id: pipeline_id.map(ToString::to_string),
            properties: vec!["dealstage".to_string(), "dealname".to_string()],
            page_size: 20,
        }
    }

    #[test]
    fn search_body_without_filter_has_empty_filter_groups() {
        let body = search_body(&query(None), None);
        assert_eq!(body["filterGroups"], json!([]));
        assert_eq!(body["limit"], json!(20));
        assert!(body.get("after").is_none());
    }

    #[test]
    fn search_body_with_filter_targets_the_pipeline_property() {
        let body = search_body(&query(Some("77")), None);
        let filter = &body["filterGroups"][0]["filters"][0];
        assert_eq!(filter["propertyName"], "pipeline");
        assert_eq!(filter["operator"], "EQ");
        assert_eq!(filter["value"], "77");
    }

    #[test]
    fn search_body_threads_the_cursor() {
        let body = search_body(&query(None), Some("cursor-9"));
        assert_eq!(body["after"], json!("cursor-9"));
    }

    #[test]
    fn retryable_covers_rate_limits_and_server_errors_only() {
        assert!(retryable(429));
        assert!(retryable(500));
        assert!(retryable(503));
        assert!(!retryable(400));
        assert!(!retryable(404));
        assert!(!retryable(200));
    }

    #[test]
    fn search_wire_decodes_cursor_and_names() {
        let raw = json!({
            "results": [
                {"id": "1", "properties": {"dealname": "Acme expansion"}},
                {"id": "2", "properties": {}},
            ],
            "paging": {"next": {"after": "abc123"}},
        });

        let wire: SearchWire = serde_json::from_value(raw).expect("valid search payload");
        assert_eq!(wire.results.len(), 2);
        assert_eq!(wire.results[0].properties.dealname.as_deref(), Some("Acme expansion"));
        assert!(wire.results[1].properties.dealname.is_none());
        assert_eq!(
            wire.paging.and_then(|p| p.next).map(|n| n.after).as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn deal_detail_wire_tolerates_missing_property() {
        let raw = json!({"properties": {}});
        let mut wire: DealDetailWire = serde_json::from_value(raw).expect("valid deal payload");
        assert!(wire.properties.remove("dealstage").is_none());
    }
}
