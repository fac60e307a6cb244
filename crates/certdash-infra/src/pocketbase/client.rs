//! PocketBaseClient -- thin REST wrapper over a PocketBase server.
//!
//! Owns the `reqwest::Client`, the base URL and the optional auth token.
//! Plain request/response calls get the configured request timeout; the
//! realtime stream is opened without one.
//!
//! The token is wrapped in [`SecretString`] and only exposed when building
//! the `Authorization` header.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use certdash_types::config::BackendConfig;
use certdash_types::error::RepositoryError;

use super::types::{BatchItem, BatchRequest, BatchResult, ErrorBody, ListParams, ListResponse, record_path};

pub struct PocketBaseClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
    request_timeout: Duration,
}

impl PocketBaseClient {
    pub fn new(config: &BackendConfig) -> Result<Self, RepositoryError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RepositoryError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone().map(SecretString::from),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authorized request without a total timeout. Used for streams.
    pub fn stream_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.authorize(self.http.request(method, self.url(path)))
    }

    /// Authorized request bounded by the configured request timeout.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.stream_request(method, path).timeout(self.request_timeout)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, token.expose_secret()),
            None => builder,
        }
    }

    /// Send `builder` and decode a JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, RepositoryError> {
        let response = Self::send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    /// Send `builder` and discard the body.
    pub async fn send_empty(&self, builder: RequestBuilder) -> Result<(), RepositoryError> {
        Self::send(builder).await.map(drop)
    }

    async fn send(builder: RequestBuilder) -> Result<Response, RepositoryError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(RepositoryError::NotFound);
        }
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        Err(api_error(status.as_u16(), body.message))
    }

    pub async fn list_records<T: DeserializeOwned>(
        &self,
        collection: &str,
        params: &ListParams,
    ) -> Result<ListResponse<T>, RepositoryError> {
        let path = format!("/api/collections/{collection}/records");
        tracing::debug!(collection, page = params.page, per_page = params.per_page, "listing records");
        self.send_json(self.request(Method::GET, &path).query(&params.to_query()))
            .await
    }

    pub async fn get_record<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<T, RepositoryError> {
        self.send_json(self.request(Method::GET, &record_path(collection, id)))
            .await
    }

    pub async fn delete_record(&self, collection: &str, id: &str) -> Result<(), RepositoryError> {
        tracing::debug!(collection, id, "deleting record");
        self.send_empty(self.request(Method::DELETE, &record_path(collection, id)))
            .await
    }

    /// Delete several records in one `POST /api/batch` transaction.
    pub async fn delete_records(
        &self,
        collection: &str,
        ids: &[&str],
    ) -> Result<(), RepositoryError> {
        let body = BatchRequest {
            requests: ids
                .iter()
                .map(|id| BatchItem {
                    method: "DELETE",
                    url: record_path(collection, id),
                })
                .collect(),
        };
        tracing::debug!(collection, count = ids.len(), "batch deleting records");

        let results: Vec<BatchResult> = self
            .send_json(self.request(Method::POST, "/api/batch").json(&body))
            .await?;
        check_batch(&results)
    }
}

fn check_batch(results: &[BatchResult]) -> Result<(), RepositoryError> {
    match results.iter().find(|r| !(200..300).contains(&r.status)) {
        None => Ok(()),
        Some(failed) => {
            let message = failed
                .body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            Err(api_error(failed.status, message))
        }
    }
}

fn api_error(status: u16, message: String) -> RepositoryError {
    let message = if message.is_empty() {
        StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string()
    } else {
        message
    };
    RepositoryError::Api { status, message }
}

fn transport_error(err: reqwest::Error) -> RepositoryError {
    if err.is_timeout() {
        RepositoryError::Transport(format!("request timed out: {err}"))
    } else {
        RepositoryError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, token: Option<&str>) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            token: token.map(str::to_string),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn base_url_is_normalized() {
        let client = PocketBaseClient::new(&config("http://pb.local:8090/", None)).unwrap();
        assert_eq!(client.base_url(), "http://pb.local:8090");
        assert_eq!(
            client.url("/api/realtime"),
            "http://pb.local:8090/api/realtime"
        );
    }

    #[test]
    fn token_becomes_authorization_header() {
        let client = PocketBaseClient::new(&config("http://pb.local", Some("tok"))).unwrap();
        let request = client
            .request(Method::GET, "/api/health")
            .build()
            .unwrap();
        assert_eq!(request.headers()[reqwest::header::AUTHORIZATION], "tok");
        assert!(request.timeout().is_some());

        let anonymous = PocketBaseClient::new(&config("http://pb.local", None)).unwrap();
        let request = anonymous
            .stream_request(Method::GET, "/api/realtime")
            .build()
            .unwrap();
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
        assert!(request.timeout().is_none());
    }

    #[test]
    fn list_query_is_encoded() {
        let client = PocketBaseClient::new(&config("http://pb.local", None)).unwrap();
        let params = ListParams::new(3, 20).sort("-created");
        let request = client
            .request(Method::GET, "/api/collections/workflow_run/records")
            .query(&params.to_query())
            .build()
            .unwrap();
        assert_eq!(request.url().query(), Some("page=3&perPage=20&sort=-created"));
    }

    #[test]
    fn batch_failure_maps_to_api_error() {
        let results = vec![
            BatchResult {
                status: 204,
                body: serde_json::Value::Null,
            },
            BatchResult {
                status: 400,
                body: serde_json::json!({ "message": "run is still processing" }),
            },
        ];
        match check_batch(&results) {
            Err(RepositoryError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "run is still processing");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_api_message_falls_back_to_reason() {
        match api_error(403, String::new()) {
            RepositoryError::Api { message, .. } => assert_eq!(message, "Forbidden"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
