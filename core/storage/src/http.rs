//! HTTP client for the calendar server.
//!
//! Routes, relative to the configured base URL:
//! - `GET api/events`: the stored envelope record, or 404 before first save
//! - `POST api/events`: replace the stored envelope record
//! - `POST auth/login`: `{"password": ...}`, sets a session cookie
//! - `POST auth/logout`: clears the session
//!
//! The session is cookie-based, so one [`HttpStore`] must be used for both
//! the gateway and the store role.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::provider::{EventStore, SessionGateway};
use sealcal_common::{EnvelopeRecord, Error, Result};

const EVENTS_PATH: &str = "api/events";
const LOGIN_PATH: &str = "auth/login";
const LOGOUT_PATH: &str = "auth/logout";

/// Calendar server client.
pub struct HttpStore {
    http: Client,
    base: Url,
}

impl HttpStore {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    /// - `InvalidInput` if the URL does not parse
    /// - `Network` if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid server URL: {}", e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(concat!("sealcal/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, base })
    }

    /// Base URL all routes are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::InvalidInput(format!("Invalid route {}: {}", path, e)))
    }

    /// Read the body of a response, mapping error statuses.
    async fn read_body(response: Response, action: &str) -> Result<String> {
        let status = response.status();

        if status.is_success() {
            response
                .text()
                .await
                .map_err(|e| Error::Network(format!("Failed to read response: {}", e)))
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(Error::NotPermitted(format!(
                "Failed to {}: session rejected ({})",
                action, status
            )))
        } else {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Failed to {}: {} - {}", action, status, body);
            if is_final_rejection(status) {
                Err(Error::Rejected(message))
            } else {
                Err(Error::SyncFailed(message))
            }
        }
    }
}

#[async_trait]
impl EventStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> Result<Option<EnvelopeRecord>> {
        let response = self
            .http
            .get(self.url(EVENTS_PATH)?)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch events: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Server has no stored events");
            return Ok(None);
        }

        let body = Self::read_body(response, "fetch events").await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let record = EnvelopeRecord::from_json(&body)?;
        Ok(record.has_data().then_some(record))
    }

    async fn push(&self, record: &EnvelopeRecord) -> Result<()> {
        let response = self
            .http
            .post(self.url(EVENTS_PATH)?)
            .json(record)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to save events: {}", e)))?;

        Self::read_body(response, "save events").await?;
        debug!("Server accepted envelope");
        Ok(())
    }
}

#[async_trait]
impl SessionGateway for HttpStore {
    async fn login(&self, account_password: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH)?)
            .json(&serde_json::json!({ "password": account_password }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to log in: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                "Login failed".to_string()
            } else {
                body
            };
            return Err(Error::NotPermitted(message));
        }

        info!("Logged in to {}", self.base);
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        let response = self
            .http
            .post(self.url(LOGOUT_PATH)?)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to log out: {}", e)))?;

        Self::read_body(response, "log out").await?;
        info!("Logged out of {}", self.base);
        Ok(())
    }
}

/// Client errors that repeat identically on resend. Timeouts and rate limits
/// are left to the retry policy.
fn is_final_rejection(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{header, HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    const ACCOUNT_PASSWORD: &str = "letmein";

    #[derive(Clone, Default)]
    struct Server {
        record: Arc<Mutex<Option<Value>>>,
        write_status: Arc<Mutex<Option<(AxumStatus, &'static str)>>>,
    }

    fn has_session(headers: &HeaderMap) -> bool {
        headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|c| c.contains("session=abc"))
    }

    async fn login(Json(body): Json<Value>) -> AxumResponse {
        if body["password"] == ACCOUNT_PASSWORD {
            (
                AxumStatus::OK,
                [(header::SET_COOKIE, "session=abc; Path=/")],
            )
                .into_response()
        } else {
            (AxumStatus::UNAUTHORIZED, "Invalid password").into_response()
        }
    }

    async fn logout() -> AxumResponse {
        (
            AxumStatus::OK,
            [(header::SET_COOKIE, "session=; Path=/; Max-Age=0")],
        )
            .into_response()
    }

    async fn get_events(State(server): State<Server>, headers: HeaderMap) -> AxumResponse {
        if !has_session(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        match server.record.lock().unwrap().clone() {
            Some(record) => Json(record).into_response(),
            None => AxumStatus::NOT_FOUND.into_response(),
        }
    }

    async fn post_events(
        State(server): State<Server>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> AxumResponse {
        if !has_session(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        if let Some(failure) = *server.write_status.lock().unwrap() {
            return failure.into_response();
        }
        *server.record.lock().unwrap() = Some(body);
        AxumStatus::OK.into_response()
    }

    async fn spawn_server(server: Server) -> String {
        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/logout", post(logout))
            .route("/api/events", get(get_events).post(post_events))
            .with_state(server);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(url: &str) -> HttpStore {
        HttpStore::new(url, Duration::from_secs(5)).unwrap()
    }

    fn record() -> EnvelopeRecord {
        EnvelopeRecord::new("c2FsdA==", "aXY=", "Y2lwaGVydGV4dA==", 1)
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let store = client("http://localhost:8080/calendar");
        assert_eq!(store.base_url().as_str(), "http://localhost:8080/calendar/");
        assert_eq!(
            store.url(EVENTS_PATH).unwrap().as_str(),
            "http://localhost:8080/calendar/api/events"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = HttpStore::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_login_fetch_push_logout() {
        let url = spawn_server(Server::default()).await;
        let store = client(&url);

        store.login(ACCOUNT_PASSWORD).await.unwrap();
        assert_eq!(store.fetch().await.unwrap(), None);

        store.push(&record()).await.unwrap();
        assert_eq!(store.fetch().await.unwrap(), Some(record()));

        store.logout().await.unwrap();
        assert!(matches!(store.fetch().await, Err(Error::NotPermitted(_))));
    }

    #[tokio::test]
    async fn test_wrong_account_password() {
        let url = spawn_server(Server::default()).await;
        let store = client(&url);

        let err = store.login("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotPermitted(ref m) if m == "Invalid password"));
    }

    #[tokio::test]
    async fn test_empty_object_is_no_data() {
        let server = Server::default();
        *server.record.lock().unwrap() = Some(serde_json::json!({}));
        let url = spawn_server(server).await;
        let store = client(&url);

        store.login(ACCOUNT_PASSWORD).await.unwrap();
        assert_eq!(store.fetch().await.unwrap(), None);
    }

    async fn push_against(status: AxumStatus, body: &'static str) -> Error {
        let server = Server::default();
        *server.write_status.lock().unwrap() = Some((status, body));
        let url = spawn_server(server).await;
        let store = client(&url);

        store.login(ACCOUNT_PASSWORD).await.unwrap();
        store.push(&record()).await.unwrap_err()
    }

    #[tokio::test]
    async fn test_server_error_is_sync_failure() {
        let err = push_against(AxumStatus::INTERNAL_SERVER_ERROR, "disk full").await;
        assert!(matches!(err, Error::SyncFailed(ref m) if m.contains("disk full")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_is_final() {
        let err = push_against(AxumStatus::PAYLOAD_TOO_LARGE, "too big").await;
        assert!(matches!(err, Error::Rejected(ref m) if m.contains("413")));
        assert!(!err.is_retryable());

        let err = push_against(AxumStatus::BAD_REQUEST, "bad json").await;
        assert!(matches!(err, Error::Rejected(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retryable() {
        let err = push_against(AxumStatus::TOO_MANY_REQUESTS, "slow down").await;
        assert!(matches!(err, Error::SyncFailed(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = client(&format!("http://{}", addr));
        let err = store.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.is_retryable());
    }
}
