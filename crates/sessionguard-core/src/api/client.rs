//! HTTP client that attaches the stored credential to every request and
//! tears the session down when the server rejects it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{CredentialKind, CredentialStore};
use crate::navigator::Navigator;

use super::invalidation::{is_session_invalidation_error, ErrorPayload};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Hard-redirect target after a user session is invalidated
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Hard-redirect target after an admin session is invalidated
pub const DEFAULT_ADMIN_LOGIN_PATH: &str = "/admin/login";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Settings for `ApiClient`.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Prefix for relative request URLs
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub login_path: String,
    pub admin_login_path: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            admin_login_path: DEFAULT_ADMIN_LOGIN_PATH.to_string(),
        }
    }
}

impl ClientSettings {
    pub fn login_path(&self, kind: CredentialKind) -> &str {
        match kind {
            CredentialKind::User => &self.login_path,
            CredentialKind::Admin => &self.admin_login_path,
        }
    }
}

/// Per-request options. Headers given here are applied after the defaults
/// and replace them on conflict.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Credential-aware API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    settings: Arc<ClientSettings>,
}

impl ApiClient {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        settings: ClientSettings,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            store,
            navigator,
            settings: Arc::new(settings),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Send a request with the `kind` credential attached and return the
    /// parsed JSON body.
    pub async fn api_request(
        &self,
        url: &str,
        options: RequestOptions,
        kind: CredentialKind,
    ) -> Result<Value, ApiError> {
        let url = self.resolve_url(url);
        let headers = self.build_headers(kind, &options.headers)?;

        debug!(method = %options.method, url = %url, kind = %kind, "Sending API request");

        let mut request = self.client.request(options.method, &url).headers(headers);
        if let Some(body) = options.body {
            request = request.body(body.to_string());
        }
        let response = request.send().await?;

        self.handle_api_response(response, kind).await
    }

    /// `api_request`, deserialized into `T`
    pub async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
        kind: CredentialKind,
    ) -> Result<T, ApiError> {
        let value = self.api_request(url, options, kind).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected response shape: {}", e)))
    }

    /// Turn a response into its JSON body or a classified error.
    ///
    /// - 2xx: body returned as-is (`Null` when empty)
    /// - 401: session invalidated, body ignored
    /// - other: body parsed as an error payload; a payload that looks like
    ///   an invalidation is treated as one, anything else becomes `Http`
    pub async fn handle_api_response(
        &self,
        response: Response,
        kind: CredentialKind,
    ) -> Result<Value, ApiError> {
        let status = response.status();

        if status.is_success() {
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| {
                ApiError::InvalidResponse(format!(
                    "Failed to parse JSON response: {} ({})",
                    e,
                    ApiError::truncate_body(&text)
                ))
            });
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(self.invalidate(kind));
        }

        let body = response.text().await.unwrap_or_default();
        let Ok(value) = serde_json::from_str::<Value>(&body) else {
            debug!(status = %status, "Error response body is not JSON");
            return Err(ApiError::from_status(status));
        };

        let payload = ErrorPayload::from_value(&value);
        if is_session_invalidation_error(&payload) {
            return Err(self.invalidate(kind));
        }

        let message = payload
            .message
            .filter(|m| !m.is_empty())
            .map(|m| ApiError::truncate_body(&m))
            .unwrap_or_else(|| format!("HTTP Error: {}", status.as_u16()));
        Err(ApiError::Http { status, message })
    }

    /// Clear the `kind` credential and hard-redirect to its login page.
    pub fn handle_session_invalidation(&self, kind: CredentialKind) -> Result<(), ApiError> {
        self.store.clear(kind)?;
        warn!(kind = %kind, "Session has been invalidated. Please log in again.");
        self.navigator.hard_redirect(self.settings.login_path(kind));
        Ok(())
    }

    /// Run any API future and apply invalidation handling if its error
    /// looks like a dropped session.
    pub async fn with_session_handling<T, F>(
        &self,
        kind: CredentialKind,
        call: F,
    ) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match call.await {
            // Already handled by handle_api_response
            Err(ApiError::SessionInvalidated) => Err(ApiError::SessionInvalidated),
            Err(e) if is_session_invalidation_error(&e) => {
                debug!(error = %e, "Wrapped call failed with an invalidation error");
                Err(self.invalidate(kind))
            }
            other => other,
        }
    }

    fn invalidate(&self, kind: CredentialKind) -> ApiError {
        match self.handle_session_invalidation(kind) {
            Ok(()) => ApiError::SessionInvalidated,
            Err(e) => e,
        }
    }

    fn resolve_url(&self, url: &str) -> String {
        match &self.settings.base_url {
            Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
            }
            _ => url.to_string(),
        }
    }

    fn build_headers(
        &self,
        kind: CredentialKind,
        extra: &[(String, String)],
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

        if let Some(token) = self.store.token(kind)? {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| ApiError::InvalidHeader("stored credential".to_string()))?,
            );
        }

        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mockito::Matcher;

    use super::*;
    use crate::auth::MemoryStore;

    #[derive(Default)]
    struct RecordingNavigator {
        visits: Mutex<Vec<String>>,
    }

    impl RecordingNavigator {
        fn visits(&self) -> Vec<String> {
            self.visits.lock().unwrap().clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn hard_redirect(&self, location: &str) {
            self.visits.lock().unwrap().push(location.to_string());
        }
    }

    struct Fixture {
        server: mockito::ServerGuard,
        store: Arc<MemoryStore>,
        navigator: Arc<RecordingNavigator>,
        client: ApiClient,
    }

    async fn fixture() -> Fixture {
        let server = mockito::Server::new_async().await;
        let store = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let settings = ClientSettings {
            base_url: Some(server.url()),
            ..ClientSettings::default()
        };
        let client = ApiClient::new(store.clone(), navigator.clone(), settings).unwrap();
        Fixture {
            server,
            store,
            navigator,
            client,
        }
    }

    #[tokio::test]
    async fn test_attaches_bearer_and_json_content_type() {
        let mut fx = fixture().await;
        fx.store.set(CredentialKind::User, "abc").unwrap();
        let mock = fx
            .server
            .mock("GET", "/api/v1/auth/profile")
            .match_header("authorization", "Bearer abc")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"u1","email":"user@example.com"}"#)
            .create_async()
            .await;

        let body = fx
            .client
            .api_request("/api/v1/auth/profile", RequestOptions::get(), CredentialKind::User)
            .await
            .unwrap();

        assert_eq!(body["email"], "user@example.com");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_authorization_header_without_token() {
        let mut fx = fixture().await;
        let mock = fx
            .server
            .mock("GET", "/public")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let body = fx
            .client
            .api_request("/public", RequestOptions::get(), CredentialKind::User)
            .await
            .unwrap();

        assert_eq!(body, serde_json::json!([]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_admin_flag_selects_admin_token() {
        let mut fx = fixture().await;
        fx.store.set(CredentialKind::User, "user-token").unwrap();
        fx.store.set(CredentialKind::Admin, "admin-token").unwrap();
        let mock = fx
            .server
            .mock("GET", "/admin/users")
            .match_header("authorization", "Bearer admin-token")
            .with_status(200)
            .with_body(r#"{"users":[]}"#)
            .create_async()
            .await;

        fx.client
            .api_request(
                "/admin/users",
                RequestOptions::get(),
                CredentialKind::from_admin_flag(true),
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_caller_headers_override_defaults() {
        let mut fx = fixture().await;
        fx.store.set(CredentialKind::User, "abc").unwrap();
        let mock = fx
            .server
            .mock("POST", "/upload")
            .match_header("content-type", "text/plain")
            .match_header("authorization", "Bearer override")
            .match_header("x-request-id", "42")
            .match_body(r#"{"name":"report"}"#)
            .with_status(201)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let options = RequestOptions::post(serde_json::json!({"name": "report"}))
            .header("Content-Type", "text/plain")
            .header("Authorization", "Bearer override")
            .header("X-Request-Id", "42");
        let body = fx
            .client
            .api_request("/upload", options, CredentialKind::User)
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_clears_credential_and_redirects_once() {
        let mut fx = fixture().await;
        fx.store.set(CredentialKind::User, "stale").unwrap();
        fx.store.set(CredentialKind::Admin, "admin-token").unwrap();
        let mock = fx
            .server
            .mock("GET", "/profile")
            .with_status(401)
            .with_body(r#"{"message":"Token expired"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = fx
            .client
            .api_request("/profile", RequestOptions::get(), CredentialKind::User)
            .await
            .unwrap_err();

        assert!(err.is_session_invalidated());
        assert_eq!(err.to_string(), "Session invalidated. Please log in again.");
        assert_eq!(fx.store.get(CredentialKind::User).unwrap(), None);
        assert_eq!(fx.store.get(CredentialKind::Admin).unwrap().as_deref(), Some("admin-token"));
        assert_eq!(fx.navigator.visits(), vec!["/login".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_admin_401_redirects_to_admin_login() {
        let mut fx = fixture().await;
        fx.store.set(CredentialKind::User, "user-token").unwrap();
        fx.store.set(CredentialKind::Admin, "admin-token").unwrap();
        fx.server
            .mock("GET", "/admin/health")
            .with_status(401)
            .create_async()
            .await;

        let err = fx
            .client
            .api_request("/admin/health", RequestOptions::get(), CredentialKind::Admin)
            .await
            .unwrap_err();

        assert!(err.is_session_invalidated());
        assert_eq!(fx.store.get(CredentialKind::Admin).unwrap(), None);
        assert_eq!(fx.store.get(CredentialKind::User).unwrap().as_deref(), Some("user-token"));
        assert_eq!(fx.navigator.visits(), vec!["/admin/login".to_string()]);
    }

    #[tokio::test]
    async fn test_session_message_on_other_status_invalidates() {
        let mut fx = fixture().await;
        fx.store.set(CredentialKind::User, "abc").unwrap();
        fx.server
            .mock("GET", "/boards")
            .with_status(403)
            .with_body(r#"{"message":"Session not found"}"#)
            .create_async()
            .await;

        let err = fx
            .client
            .api_request("/boards", RequestOptions::get(), CredentialKind::User)
            .await
            .unwrap_err();

        assert!(err.is_session_invalidated());
        assert!(!fx.store.has(CredentialKind::User).unwrap());
        assert_eq!(fx.navigator.visits(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_generic_failure_keeps_session() {
        let mut fx = fixture().await;
        fx.store.set(CredentialKind::User, "abc").unwrap();
        fx.server
            .mock("POST", "/register")
            .with_status(500)
            .with_body(r#"{"message":"internal error"}"#)
            .create_async()
            .await;

        let err = fx
            .client
            .api_request(
                "/register",
                RequestOptions::post(serde_json::json!({})),
                CredentialKind::User,
            )
            .await
            .unwrap_err();

        match err {
            ApiError::Http { status, ref message } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "internal error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(fx.store.has(CredentialKind::User).unwrap());
        assert!(fx.navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_error_body_falls_back_to_status_text() {
        let mut fx = fixture().await;
        fx.server
            .mock("GET", "/flaky")
            .with_status(502)
            .with_body("<html>upstream down</html>")
            .create_async()
            .await;

        let err = fx
            .client
            .api_request("/flaky", RequestOptions::get(), CredentialKind::User)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "HTTP Error: 502 Bad Gateway");
        assert!(fx.navigator.visits().is_empty());
    }

    #[tokio::test]
    async fn test_error_payload_without_message_uses_status() {
        let mut fx = fixture().await;
        fx.server
            .mock("GET", "/thing")
            .with_status(404)
            .with_body(r#"{"error":"missing"}"#)
            .create_async()
            .await;

        let err = fx
            .client
            .api_request("/thing", RequestOptions::get(), CredentialKind::User)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "HTTP Error: 404");
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_success_bodies() {
        let mut fx = fixture().await;
        fx.server
            .mock("POST", "/logout")
            .with_status(204)
            .create_async()
            .await;
        fx.server
            .mock("GET", "/broken")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let body = fx
            .client
            .api_request(
                "/logout",
                RequestOptions::get().method(Method::POST),
                CredentialKind::User,
            )
            .await
            .unwrap();
        assert_eq!(body, Value::Null);

        let err = fx
            .client
            .api_request("/broken", RequestOptions::get(), CredentialKind::User)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_typed_request() {
        #[derive(serde::Deserialize)]
        struct Profile {
            id: String,
            email: String,
        }

        let mut fx = fixture().await;
        fx.server
            .mock("GET", "/profile")
            .with_status(200)
            .with_body(r#"{"id":"u1","email":"user@example.com","created_at":null}"#)
            .create_async()
            .await;

        let profile: Profile = fx
            .client
            .request("/profile", RequestOptions::get(), CredentialKind::User)
            .await
            .unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.email, "user@example.com");
    }

    #[tokio::test]
    async fn test_concurrent_401s_each_invalidate() {
        let mut fx = fixture().await;
        fx.store.set(CredentialKind::User, "stale").unwrap();
        let mock = fx
            .server
            .mock("GET", Matcher::Regex(r"^/items/\d+$".to_string()))
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let (first, second) = futures::join!(
            fx.client.api_request("/items/1", RequestOptions::get(), CredentialKind::User),
            fx.client.api_request("/items/2", RequestOptions::get(), CredentialKind::User),
        );

        assert!(first.unwrap_err().is_session_invalidated());
        assert!(second.unwrap_err().is_session_invalidated());
        assert_eq!(fx.store.get(CredentialKind::User).unwrap(), None);
        assert_eq!(
            fx.navigator.visits(),
            vec!["/login".to_string(), "/login".to_string()]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_with_session_handling() {
        let fx = fixture().await;
        fx.store.set(CredentialKind::User, "abc").unwrap();

        let ok = fx
            .client
            .with_session_handling(CredentialKind::User, async { Ok::<_, ApiError>(7) })
            .await
            .unwrap();
        assert_eq!(ok, 7);
        assert!(fx.navigator.visits().is_empty());

        let err = fx
            .client
            .with_session_handling(CredentialKind::User, async {
                Err::<(), _>(ApiError::Http {
                    status: StatusCode::BAD_REQUEST,
                    message: "Invalid token".to_string(),
                })
            })
            .await
            .unwrap_err();
        assert!(err.is_session_invalidated());
        assert!(!fx.store.has(CredentialKind::User).unwrap());
        assert_eq!(fx.navigator.visits(), vec!["/login".to_string()]);

        // Already-handled invalidations pass through untouched
        let err = fx
            .client
            .with_session_handling(CredentialKind::User, async {
                Err::<(), _>(ApiError::SessionInvalidated)
            })
            .await
            .unwrap_err();
        assert!(err.is_session_invalidated());
        assert_eq!(fx.navigator.visits().len(), 1);
    }

    #[test]
    fn test_resolve_url() {
        let store = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let settings = ClientSettings {
            base_url: Some("http://localhost:3000/".to_string()),
            ..ClientSettings::default()
        };
        let client = ApiClient::new(store, navigator, settings).unwrap();

        assert_eq!(
            client.resolve_url("/api/v1/auth/login"),
            "http://localhost:3000/api/v1/auth/login"
        );
        assert_eq!(client.resolve_url("https://other.example/x"), "https://other.example/x");
    }

    #[test]
    fn test_invalid_caller_header_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let client = ApiClient::new(store, navigator, ClientSettings::default()).unwrap();

        let err = client
            .build_headers(CredentialKind::User, &[("bad header".to_string(), "v".to_string())])
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidHeader(_)));
    }
}
