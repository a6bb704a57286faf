//! Transport for the authentication API.
//!
//! Every outbound call goes through [`ApiClient::request`], which prefixes the
//! API route root, attaches a default JSON content type, and turns non-2xx
//! responses into [`ApiError`]s. Nothing else in the crate looks at HTTP status.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Route root the API is mounted under behind the reverse proxy
const API_ROUTE_ROOT: &str = "/api";

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Body of an outgoing request
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// Method, extra headers and body for [`ApiClient::request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Set a header, replacing any previous value for the same name
    pub fn header(mut self, name: header::HeaderName, value: &str) -> Result<Self, ApiError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::InvalidRequest(format!("header {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn bearer(self, token: &str) -> Result<Self, ApiError> {
        self.header(header::AUTHORIZATION, &format!("Bearer {}", token))
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("failed to serialize body: {}", e)))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        self
    }
}

/// The HTTP client could not be constructed; nothing was sent
fn setup_error(e: reqwest::Error) -> ApiError {
    ApiError::InvalidRequest(format!("failed to build HTTP client: {}", e))
}

/// API client for the authentication server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the API host at `base_url` with no request timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, None)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let base_url: String = base_url.into();
        Ok(Self {
            client: builder.build().map_err(setup_error)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}{}", self.base_url, API_ROUTE_ROOT, endpoint)
    }

    /// Send a request and return the parsed JSON body of a 2xx response.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Value, ApiError> {
        let RequestOptions {
            method,
            mut headers,
            body,
        } = options;

        // JSON unless the caller says otherwise, whatever the body
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }

        debug!(method = %method, endpoint, "Sending request");

        let mut builder = self
            .client
            .request(method.clone(), self.url(endpoint))
            .headers(headers);

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(value.to_string()),
            // Content type is already in the header map, so form() keeps it
            RequestBody::Form(pairs) => builder.form(&pairs),
        };

        let response = builder.send().await.map_err(|e| {
            warn!(method = %method, endpoint, error = %e, "Request could not be completed");
            ApiError::Network(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(method = %method, endpoint, status = status.as_u16(), "Request failed");
            return Err(ApiError::from_status(status, &body));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("{} returned malformed JSON: {}", endpoint, e))
        })
    }

    /// Deserialize a JSON body into a caller type
    pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("unexpected response shape: {}", e)))
    }

    // ===== Convenience wrappers =====

    pub async fn get(&self, endpoint: &str) -> Result<Value, ApiError> {
        self.request(endpoint, RequestOptions::new(Method::GET)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, data: &B) -> Result<Value, ApiError> {
        self.request(endpoint, RequestOptions::new(Method::POST).json(data)?)
            .await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, endpoint: &str, data: &B) -> Result<Value, ApiError> {
        self.request(endpoint, RequestOptions::new(Method::PUT).json(data)?)
            .await
    }

    /// POST form-url-encoded fields, as the OAuth2 password flow expects
    pub async fn login_post(&self, endpoint: &str, fields: &[(&str, &str)]) -> Result<Value, ApiError> {
        let options = RequestOptions::new(Method::POST)
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)?
            .form(fields);
        self.request(endpoint, options).await
    }

    /// GET with a bearer `Authorization` header built from `token`
    pub async fn auth_get(&self, endpoint: &str, token: &str) -> Result<Value, ApiError> {
        self.request(endpoint, RequestOptions::new(Method::GET).bearer(token)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_prefixes_route_root() {
        let client = ApiClient::new("http://localhost/").expect("client");
        assert_eq!(client.base_url(), "http://localhost");
        assert_eq!(client.url("/users/me/"), "http://localhost/api/users/me/");
    }

    #[test]
    fn test_invalid_bearer_token_is_rejected() {
        let err = RequestOptions::new(Method::GET)
            .bearer("bad\ntoken")
            .expect_err("newline is not a valid header value");
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_get_sends_json_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .and(header_eq("content-type", JSON_CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).expect("client");
        let body = client.get("/health").await.expect("request should succeed");
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_post_and_put_serialize_json() {
        let server = MockServer::start().await;
        let payload = json!({"username": "alice", "email": "alice@example.com"});

        Mock::given(method("POST"))
            .and(path("/api/register"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/items/1"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).expect("client");
        assert_eq!(client.post("/register", &payload).await.expect("post"), json!({"id": 1}));
        assert_eq!(client.put("/items/1", &payload).await.expect("put"), json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_login_post_overrides_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header_eq("content-type", FORM_CONTENT_TYPE))
            .and(body_string("username=alice&password=s3cret%21"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok", "token_type": "bearer"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).expect("client");
        let body = client
            .login_post("/token", &[("username", "alice"), ("password", "s3cret!")])
            .await
            .expect("login post should succeed");
        assert_eq!(body["access_token"], "tok");
    }

    #[tokio::test]
    async fn test_default_content_type_is_json_for_every_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header_eq("content-type", JSON_CONTENT_TYPE))
            .and(body_string("username=alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).expect("client");
        let options = RequestOptions::new(Method::POST).form(&[("username", "alice")]);
        client.request("/token", options).await.expect("request should succeed");
    }

    #[test]
    fn test_client_setup_failure_is_not_a_network_error() {
        let builder_err = Client::new()
            .get("not a url")
            .build()
            .expect_err("relative URL cannot be built");

        let err = setup_error(builder_err);
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert!(err.to_string().starts_with("Invalid request: failed to build HTTP client"));
    }

    #[tokio::test]
    async fn test_auth_get_sends_bearer_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me/"))
            .and(header_eq("authorization", "Bearer abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).expect("client");
        let body = client.auth_get("/users/me/", "abc123").await.expect("auth get");
        assert_eq!(body["id"], 7);
    }

    #[tokio::test]
    async fn test_error_status_uses_detail_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).expect("client");

        let err = client.auth_get("/users/me/", "abc123").await.expect_err("401");
        assert!(matches!(err, ApiError::Http(_)));
        assert_eq!(err.to_string(), "Invalid token");

        let err = client.get("/broken").await.expect_err("500");
        assert_eq!(err.to_string(), "HTTP error: 500");
    }

    #[tokio::test]
    async fn test_success_with_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).expect("client");
        let err = client.get("/users/me/").await.expect_err("malformed body");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 1 is reserved and nothing listens there
        let client = ApiClient::new("http://127.0.0.1:1").expect("client");
        let err = client.get("/users/me/").await.expect_err("connection refused");
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[test]
    fn test_decode_shape_mismatch() {
        #[derive(Debug, Deserialize)]
        struct Profile {
            id: i64,
        }

        let ok: Profile = ApiClient::decode(json!({"id": 3})).expect("decodes");
        assert_eq!(ok.id, 3);

        let err = ApiClient::decode::<Profile>(json!({"name": "x"})).expect_err("missing id");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }
}
