//! PocketBase wire types and query helpers.

use serde::{Deserialize, Serialize};

use certdash_types::error::RepositoryError;

/// Paginated list envelope returned by `GET /api/collections/<c>/records`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u64,
    pub items: Vec<T>,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Envelope of the backend's own (non-collection) routes: `code` is zero on
/// success and `data` carries the payload.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn into_data(self) -> Result<T, RepositoryError> {
        if self.code != 0 {
            return Err(RepositoryError::Api {
                status: u16::try_from(self.code).unwrap_or(500),
                message: self.msg,
            });
        }
        self.data
            .ok_or_else(|| RepositoryError::Decode("response carries no data".to_string()))
    }
}

/// Body of `POST /api/realtime`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest<'a> {
    pub client_id: &'a str,
    pub subscriptions: &'a [String],
}

/// Data of the `PB_CONNECT` event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectEvent {
    pub client_id: String,
}

/// Body of `POST /api/batch`.
#[derive(Debug, Serialize)]
pub struct BatchRequest {
    pub requests: Vec<BatchItem>,
}

#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub method: &'static str,
    pub url: String,
}

/// One entry of the `POST /api/batch` response array.
#[derive(Debug, Deserialize)]
pub struct BatchResult {
    pub status: u16,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Query parameters for a record list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub per_page: u32,
    pub sort: Option<String>,
    pub filter: Option<String>,
    /// Comma-separated relation fields to expand.
    pub expand: Option<String>,
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            sort: None,
            filter: None,
            expand: None,
        }
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn expand(mut self, relations: impl Into<String>) -> Self {
        self.expand = Some(relations.into());
        self
    }

    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("page", self.page.to_string()),
            ("perPage", self.per_page.to_string()),
        ];
        if let Some(sort) = &self.sort {
            query.push(("sort", sort.clone()));
        }
        if let Some(filter) = &self.filter {
            query.push(("filter", filter.clone()));
        }
        if let Some(expand) = &self.expand {
            query.push(("expand", expand.clone()));
        }
        query
    }
}

/// Build an equality filter expression, quoting and escaping `value`.
pub fn filter_eq(field: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{field}='{escaped}'")
}

/// Path of a single record in a collection.
pub fn record_path(collection: &str, id: &str) -> String {
    format!("/api/collections/{collection}/records/{id}")
}
