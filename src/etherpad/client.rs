//! Etherpad HTTP API client.
//!
//! Every call is a `GET {url}/api/{version}/{method}` with the API key and
//! the method parameters in the query string. Responses share one envelope:
//!
//! ```json
//! {"code": 0, "message": "ok", "data": {"padIDs": ["a", "b"]}}
//! ```
//!
//! See: <https://etherpad.org/doc/v1.8.4/#index_http_api>

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};

use super::{EtherpadError, EtherpadResult, PadService};
use crate::config::EtherpadConfig;

/// API version the toolkit speaks.
pub const API_VERSION: &str = "1.2.14";

/// Internal response envelope shared by all API methods.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PadIdsData {
    #[serde(rename = "padIDs")]
    pad_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RevisionsData {
    revisions: u64,
}

#[derive(Debug, Deserialize)]
struct LastEditedData {
    #[serde(rename = "lastEdited")]
    last_edited: i64,
}

/// Client for the Etherpad HTTP API.
///
/// # Example
/// ```ignore
/// let client = EtherpadClient::new("http://localhost:9001", "secret")?;
/// let pads = client.list_all_pads().await?;
/// ```
#[derive(Clone)]
pub struct EtherpadClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl std::fmt::Debug for EtherpadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtherpadClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl EtherpadClient {
    /// Create a client with the default API version and a 30 second timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> EtherpadResult<Self> {
        Self::build(base_url.into(), api_key.into(), API_VERSION.to_string(), 30)
    }

    /// Create a client from the `[etherpad]` configuration section.
    pub fn from_config(config: &EtherpadConfig) -> EtherpadResult<Self> {
        Self::build(
            config.url.clone(),
            config.api_key.clone(),
            config.api_version.clone(),
            config.timeout_secs,
        )
    }

    fn build(
        mut base_url: String,
        api_key: String,
        api_version: String,
        timeout_secs: u64,
    ) -> EtherpadResult<Self> {
        // Remove trailing slash
        while base_url.ends_with('/') {
            base_url.pop();
        }
        reqwest::Url::parse(&base_url)
            .map_err(|e| EtherpadError::InvalidUrl(format!("{base_url}: {e}")))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            api_version,
        })
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Moves a pad. If `force` is true an existing destination is overwritten.
    ///
    /// See: <https://etherpad.org/doc/v1.8.4/#index_movepad_sourceid_destinationid_force_false>
    pub async fn move_pad(
        &self,
        source_id: &str,
        destination_id: &str,
        force: bool,
    ) -> EtherpadResult<()> {
        self.call::<serde_json::Value>(
            "movePad",
            &[
                ("sourceID", source_id),
                ("destinationID", destination_id),
                ("force", bool_param(force)),
            ],
        )
        .await?;
        Ok(())
    }

    /// Copies a pad with full history and chat. If `force` is true an
    /// existing destination is overwritten.
    ///
    /// See: <https://etherpad.org/doc/v1.8.4/#index_copypad_sourceid_destinationid_force_false>
    pub async fn copy_pad(
        &self,
        source_id: &str,
        destination_id: &str,
        force: bool,
    ) -> EtherpadResult<()> {
        self.call::<serde_json::Value>(
            "copyPad",
            &[
                ("sourceID", source_id),
                ("destinationID", destination_id),
                ("force", bool_param(force)),
            ],
        )
        .await?;
        Ok(())
    }

    /// Send one API request and unwrap the response envelope.
    ///
    /// Returns the `data` member, which is `null` for methods without a
    /// payload (delete, move, copy).
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> EtherpadResult<Option<T>> {
        let url = format!("{}/api/{}/{}", self.base_url, self.api_version, method);

        let response = self
            .http_client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Etherpad reports most failures inside the envelope, sometimes with a
        // 4xx status, so the body is decoded regardless of the status code.
        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            EtherpadError::InvalidResponse(format!("{method} (HTTP {status}): {e}"))
        })?;

        if envelope.code != 0 {
            return Err(EtherpadError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }

        tracing::trace!(method, "Etherpad API call succeeded");
        Ok(envelope.data)
    }

    async fn call_data<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> EtherpadResult<T> {
        self.call(method, params).await?.ok_or_else(|| {
            EtherpadError::InvalidResponse(format!("{method}: missing data in response"))
        })
    }
}

#[async_trait]
impl PadService for EtherpadClient {
    /// See: <https://etherpad.org/doc/v1.8.4/#index_listallpads>
    async fn list_all_pads(&self) -> EtherpadResult<Vec<String>> {
        let data: PadIdsData = self.call_data("listAllPads", &[]).await?;
        Ok(data.pad_ids)
    }

    /// See: <https://etherpad.org/doc/v1.8.4/#index_getrevisionscount_padid>
    async fn get_revisions_count(&self, pad_id: &str) -> EtherpadResult<u64> {
        let data: RevisionsData = self
            .call_data("getRevisionsCount", &[("padID", pad_id)])
            .await?;
        Ok(data.revisions)
    }

    /// See: <https://etherpad.org/doc/v1.8.4/#index_getlastedited_padid>
    async fn get_last_edited(&self, pad_id: &str) -> EtherpadResult<DateTime<Utc>> {
        let data: LastEditedData = self
            .call_data("getLastEdited", &[("padID", pad_id)])
            .await?;
        DateTime::from_timestamp_millis(data.last_edited).ok_or_else(|| {
            EtherpadError::InvalidResponse(format!(
                "getLastEdited: timestamp out of range: {}",
                data.last_edited
            ))
        })
    }

    /// See: <https://etherpad.org/doc/v1.8.4/#index_deletepad_padid>
    async fn delete_pad(&self, pad_id: &str) -> EtherpadResult<()> {
        self.call::<serde_json::Value>("deletePad", &[("padID", pad_id)])
            .await?;
        Ok(())
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    use super::*;

    async fn mock_client(server: &MockServer) -> EtherpadClient {
        EtherpadClient::new(server.uri(), "secret").unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = EtherpadClient::new("http://localhost:9001", "key").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9001");

        // With trailing slash
        let client = EtherpadClient::new("http://localhost:9001/", "key").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9001");
    }

    #[test]
    fn test_client_rejects_invalid_url() {
        let err = EtherpadClient::new("not a url", "key").unwrap_err();
        assert!(matches!(err, EtherpadError::InvalidUrl(_)));
    }

    #[test]
    fn test_parse_error_envelope() {
        let json = r#"{"code": 1, "message": "padID does not exist", "data": null}"#;
        let response: ApiResponse<RevisionsData> = serde_json::from_str(json).unwrap();
        assert_eq!(response.code, 1);
        assert_eq!(response.message, "padID does not exist");
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn test_list_all_pads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/listAllPads"))
            .and(query_param("apikey", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": {"padIDs": ["pad", "pad-temp", "pad-keep"]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let pads = client.list_all_pads().await.unwrap();
        assert_eq!(pads, vec!["pad", "pad-temp", "pad-keep"]);
    }

    #[tokio::test]
    async fn test_get_revisions_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/getRevisionsCount"))
            .and(query_param("padID", "pad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": {"revisions": 56}
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        assert_eq!(client.get_revisions_count("pad").await.unwrap(), 56);
    }

    #[tokio::test]
    async fn test_get_last_edited_converts_millis() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/getLastEdited"))
            .and(query_param("padID", "pad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": {"lastEdited": 1_340_815_946_602_i64}
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let last_edited = client.get_last_edited("pad").await.unwrap();
        assert_eq!(last_edited.timestamp_millis(), 1_340_815_946_602);
    }

    #[tokio::test]
    async fn test_delete_pad() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/deletePad"))
            .and(query_param("padID", "pad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        client.delete_pad("pad").await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_code_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/deletePad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 1,
                "message": "padID does not exist",
                "data": null
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let err = client.delete_pad("missing").await.unwrap_err();
        match err {
            EtherpadError::Api { code, message } => {
                assert_eq!(code, 1);
                assert_eq!(message, "padID does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_api_key_on_unauthorized_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/listAllPads"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": 4,
                "message": "no or wrong API Key",
                "data": null
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let err = client.list_all_pads().await.unwrap_err();
        assert!(err.is_api_error());
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/listAllPads"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let err = client.list_all_pads().await.unwrap_err();
        assert!(matches!(err, EtherpadError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_data_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/getRevisionsCount"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": null
            })))
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        let err = client.get_revisions_count("pad").await.unwrap_err();
        assert!(matches!(err, EtherpadError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_move_and_copy_pass_force_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/movePad"))
            .and(query_param("sourceID", "a"))
            .and(query_param("destinationID", "b"))
            .and(query_param("force", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0, "message": "ok", "data": null
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/1.2.14/copyPad"))
            .and(query_param("sourceID", "a"))
            .and(query_param("destinationID", "c"))
            .and(query_param("force", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0, "message": "ok", "data": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).await;
        client.move_pad("a", "b", true).await.unwrap();
        client.copy_pad("a", "c", false).await.unwrap();
    }
}
