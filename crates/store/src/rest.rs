use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use id_review_core::{
    DecodeError, Decision, RequestId, RequestStatus, RequestStore, StoreError,
    VerificationRequest,
};

/// Client for a PostgREST-style record store holding verification requests.
#[derive(Clone)]
pub struct RestRequestStore {
    http: Client,
    base_url: Url,
    api_key: String,
    table: String,
}

impl RestRequestStore {
    /// Creates a client for `table` rooted at the REST endpoint (for example
    /// `.../rest/v1/`).
    pub fn new(
        api_key: impl Into<String>,
        base_url: Url,
        table: impl Into<String>,
        http: Client,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key: api_key.into(),
            table: table.into(),
        }
    }

    /// Fetches all rows ordered by creation time, newest first.
    pub async fn list_requests(&self) -> Result<Vec<VerificationRequest>, RestError> {
        let mut url = self.base_url.join(&self.table)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            query.append_pair("order", "created_at.desc");
        }

        let response = self
            .authorized_request(Method::GET, url)
            .send()
            .await?;

        let rows = parse_json::<Vec<RequestRow>>(response).await?;
        debug!(stage = "store", table = %self.table, count = rows.len(), "listed verification requests");
        rows.into_iter()
            .map(|row| VerificationRequest::try_from(row).map_err(RestError::from))
            .collect()
    }

    /// Issues a PATCH scoped to exactly the row matching `id`.
    ///
    /// Matching zero rows is reported as [`RestError::MissingTarget`].
    pub async fn update_request_status(
        &self,
        id: &RequestId,
        decision: &Decision,
    ) -> Result<(), RestError> {
        let mut url = self.base_url.join(&self.table)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("id", &format!("eq.{id}"));
            query.append_pair("select", "id");
        }

        let body = serde_json::json!({
            "status": decision.status().as_str(),
            "rejection_reason": decision.rejection_reason(),
        });
        let response = self
            .authorized_request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;

        let matched = parse_json::<Vec<Value>>(response).await?;
        debug!(stage = "store", request = %id, matched = matched.len(), "updated verification request");
        if matched.is_empty() {
            return Err(RestError::MissingTarget(id.clone()));
        }
        Ok(())
    }

    fn authorized_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[async_trait]
impl RequestStore for RestRequestStore {
    async fn list_all(&self) -> Result<Vec<VerificationRequest>, StoreError> {
        Ok(self.list_requests().await?)
    }

    async fn update_status(&self, id: &RequestId, decision: &Decision) -> Result<(), StoreError> {
        Ok(self.update_request_status(id, decision).await?)
    }
}

/// Row shape of the request collection as returned by the store.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RequestRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    pub status: String,
    pub id_image_path: Option<String>,
    pub selfie_image_path: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for VerificationRequest {
    type Error = DecodeError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status: RequestStatus = row.status.parse()?;
        let request = VerificationRequest::from_parts(
            RequestId::from(row.id),
            row.user_id,
            status,
            row.rejection_reason,
            row.created_at,
        )?;
        Ok(request.with_images(
            non_blank(row.id_image_path),
            non_blank(row.selfie_image_path),
        ))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(value) => value,
        Raw::Number(value) => value.to_string(),
    })
}

/// Errors produced by the REST store client.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid row: {0}")]
    Decode(#[from] DecodeError),
    #[error("no row matches id {0}")]
    MissingTarget(RequestId),
}

impl From<RestError> for StoreError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Decode(err) => Self::Decode(err),
            RestError::MissingTarget(id) => Self::MissingTarget(id),
            other => Self::backend(other),
        }
    }
}

async fn parse_json<T>(response: Response) -> Result<T, RestError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(RestError::Status { status, body });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|err| RestError::Decode(DecodeError::Malformed(err.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method;
    use serde_json::json;

    fn client(base_url: &Url) -> RestRequestStore {
        client_for_table(base_url, "id_upload_requests")
    }

    fn client_for_table(base_url: &Url, table: &str) -> RestRequestStore {
        RestRequestStore::new(
            "anon-key",
            base_url.clone(),
            table,
            Client::builder().build().expect("client"),
        )
    }

    fn base(server: &MockServer) -> Url {
        Url::parse(&server.url("/rest/v1/")).expect("url")
    }

    #[tokio::test]
    async fn list_requests_parses_rows_in_store_order() {
        let server = MockServer::start_async().await;
        let client = client(&base(&server));

        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/id_upload_requests")
                    .query_param("select", "*")
                    .query_param("order", "created_at.desc")
                    .header("apikey", "anon-key")
                    .header("Authorization", "Bearer anon-key");
                then.status(200).json_body(json!([
                    {
                        "id": "req-2",
                        "user_id": "user-2",
                        "status": "rejected",
                        "id_image_path": "ids/req-2.jpg",
                        "selfie_image_path": "",
                        "rejection_reason": "expired",
                        "created_at": "2024-02-02T10:00:00Z"
                    },
                    {
                        "id": 17,
                        "user_id": "user-1",
                        "status": "pending",
                        "id_image_path": null,
                        "selfie_image_path": "selfies/17.jpg",
                        "rejection_reason": null,
                        "created_at": "2024-02-01T10:00:00Z"
                    }
                ]));
            })
            .await;

        let requests = client.list_requests().await.expect("list requests");
        mock.assert_async().await;

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].id.as_str(), "req-2");
        assert_eq!(requests[0].rejection_reason(), Some("expired"));
        assert_eq!(requests[0].selfie_image_ref, None);
        assert_eq!(requests[1].id.as_str(), "17");
        assert_eq!(requests[1].status(), RequestStatus::Pending);
        assert_eq!(requests[1].selfie_image_ref.as_deref(), Some("selfies/17.jpg"));
    }

    #[tokio::test]
    async fn empty_collection_is_not_an_error() {
        let server = MockServer::start_async().await;
        let client = client(&base(&server));

        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/id_upload_requests");
                then.status(200).json_body(json!([]));
            })
            .await;

        let requests = client.list_requests().await.expect("list requests");
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn row_violating_reason_invariant_fails_decoding() {
        let server = MockServer::start_async().await;
        let client = client(&base(&server));

        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/id_upload_requests");
                then.status(200).json_body(json!([
                    {
                        "id": "req-1",
                        "user_id": "user-1",
                        "status": "approved",
                        "id_image_path": null,
                        "selfie_image_path": null,
                        "rejection_reason": "left over",
                        "created_at": "2024-02-01T10:00:00Z"
                    }
                ]));
            })
            .await;

        let err = client.list_requests().await.expect_err("invalid row");
        assert!(matches!(
            err,
            RestError::Decode(DecodeError::UnexpectedReason { .. })
        ));
        assert!(matches!(StoreError::from(err), StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn row_missing_required_column_is_a_decode_failure() {
        let server = MockServer::start_async().await;
        let client = client(&base(&server));

        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/id_upload_requests");
                then.status(200).json_body(json!([
                    {
                        "id": "req-1",
                        "user_id": "user-1",
                        "status": "pending",
                        "id_image_path": null,
                        "selfie_image_path": null,
                        "rejection_reason": null
                    }
                ]));
            })
            .await;

        let err = client.list_requests().await.expect_err("missing created_at");
        assert!(matches!(err, RestError::Decode(DecodeError::Malformed(_))));
        assert!(matches!(
            StoreError::from(err),
            StoreError::Decode(DecodeError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn non_json_update_reply_is_a_decode_failure() {
        let server = MockServer::start_async().await;
        let client = client(&base(&server));

        server
            .mock_async(|when, then| {
                when.method(Method::PATCH).path("/rest/v1/id_upload_requests");
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let err = client
            .update_request_status(&RequestId::from("req-1"), &Decision::Approve)
            .await
            .expect_err("not json");
        assert!(matches!(StoreError::from(err), StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn update_sends_scoped_patch_with_reason() {
        let server = MockServer::start_async().await;
        let client = client_for_table(&base(&server), "kyc_requests");

        let mock = server
            .mock_async(|when, then| {
                when.method(Method::PATCH)
                    .path("/rest/v1/kyc_requests")
                    .query_param("id", "eq.req-1")
                    .query_param("select", "id")
                    .header("Prefer", "return=representation")
                    .header("apikey", "anon-key")
                    .json_body(json!({ "status": "rejected", "rejection_reason": "fake ID" }));
                then.status(200).json_body(json!([{ "id": "req-1" }]));
            })
            .await;

        client
            .update_request_status(
                &RequestId::from("req-1"),
                &Decision::reject_with_draft(Some("  fake ID ")),
            )
            .await
            .expect("update request");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn approve_clears_reason_column() {
        let server = MockServer::start_async().await;
        let client = client(&base(&server));

        let mock = server
            .mock_async(|when, then| {
                when.method(Method::PATCH)
                    .path("/rest/v1/id_upload_requests")
                    .json_body(json!({ "status": "approved", "rejection_reason": null }));
                then.status(200).json_body(json!([{ "id": "req-1" }]));
            })
            .await;

        client
            .update_request_status(&RequestId::from("req-1"), &Decision::Approve)
            .await
            .expect("update request");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn update_matching_no_rows_is_missing_target() {
        let server = MockServer::start_async().await;
        let client = client(&base(&server));

        server
            .mock_async(|when, then| {
                when.method(Method::PATCH).path("/rest/v1/id_upload_requests");
                then.status(200).json_body(json!([]));
            })
            .await;

        let err = client
            .update_request_status(&RequestId::from("gone"), &Decision::Approve)
            .await
            .expect_err("no rows matched");
        assert!(matches!(err, RestError::MissingTarget(ref id) if id.as_str() == "gone"));
        assert!(matches!(StoreError::from(err), StoreError::MissingTarget(_)));
    }

    #[tokio::test]
    async fn error_status_returns_message() {
        let server = MockServer::start_async().await;
        let client = client(&base(&server));

        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/id_upload_requests");
                then.status(401).body("invalid api key");
            })
            .await;

        let err = client.list_requests().await.expect_err("should error");
        match err {
            RestError::Status { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
