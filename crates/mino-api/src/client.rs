// Authenticated request pipeline
//
// Wraps `reqwest::Client` with Amino header construction, body signing,
// a bounded transport retry, response classification, and session
// recovery through an injected `CredentialProvider`. Endpoint groups
// (auth, chat) are inherent methods in separate files.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{ACCOUNT_TTL, LINK_TTL, TtlCache};
use crate::error::Error;
use crate::identity::{Generator, KeyMaterial};
use crate::models::{Account, ApiResponse};
use crate::session::{Session, SessionStore};
use crate::transport::{RetryPolicy, TransportConfig};

pub const SERVICE_URL: &str = "https://service.aminoapps.com/api/v1";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

// ── Request shape ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Request body. JSON is serialized and signed; raw bytes are signed as-is.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(Value),
    Raw { bytes: Bytes, content_type: String },
}

impl Body {
    fn encode(&self) -> Result<Option<(Vec<u8>, String)>, Error> {
        match self {
            Self::Empty => Ok(None),
            Self::Json(value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| Error::Deserialization {
                    message: format!("failed to encode request body: {e}"),
                    body: String::new(),
                })?;
                Ok(Some((bytes, JSON_CONTENT_TYPE.to_owned())))
            }
            Self::Raw {
                bytes,
                content_type,
            } => Ok(Some((bytes.to_vec(), content_type.clone()))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    Allowed,
    Disabled,
}

// ── CredentialProvider ───────────────────────────────────────────────

/// Something that can obtain a fresh session when the current one expires.
///
/// Installed with [`AminoClient::set_credential_provider`]. Without one,
/// an invalid-session response surfaces to the caller like any other
/// API error.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Establish a new session on `client`.
    async fn reauthenticate(&self, client: &AminoClient) -> Result<(), Error>;
}

// ── ClientConfig ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub transport: TransportConfig,
    pub keys: KeyMaterial,
    /// JSON file backing the identity key override cache.
    pub key_cache: Option<PathBuf>,
    /// Fixed device id. A fresh one is generated when unset.
    pub device_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: SERVICE_URL.into(),
            transport: TransportConfig::default(),
            keys: KeyMaterial::default(),
            key_cache: None,
            device_id: None,
        }
    }
}

// ── AminoClient ──────────────────────────────────────────────────────

/// HTTP client for the Amino service.
///
/// Cheaply cloneable via `Arc`. Holds the identity generator, the device
/// id, and the current session; the stream manager reads the same state
/// for its handshake.
#[derive(Clone)]
pub struct AminoClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    generator: Generator,
    device_id: RwLock<String>,
    session: SessionStore,
    retry: RetryPolicy,
    credentials: RwLock<Option<Arc<dyn CredentialProvider>>>,
    /// Held while a provider re-authenticates.
    refresh: tokio::sync::Mutex<()>,
    accounts: TtlCache<Account>,
    links: TtlCache<i64>,
}

impl fmt::Debug for AminoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AminoClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("generator", &self.inner.generator)
            .field("authenticated", &self.inner.session.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl AminoClient {
    /// Build a client: resolve identity keys, pick a device id, and
    /// construct the HTTP transport.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let generator = Generator::resolve(&config.keys, config.key_cache.as_deref())?;
        let http = config.transport.build_client()?;
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;
        Ok(Self::from_parts(
            http,
            base_url,
            generator,
            config.device_id,
            config.transport.retry,
        ))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, generator: Generator) -> Self {
        Self::from_parts(http, base_url, generator, None, RetryPolicy::default())
    }

    fn from_parts(
        http: reqwest::Client,
        base_url: Url,
        generator: Generator,
        device_id: Option<String>,
        retry: RetryPolicy,
    ) -> Self {
        let device_id = device_id.unwrap_or_else(|| generator.device_id());
        Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                generator,
                device_id: RwLock::new(device_id),
                session: SessionStore::new(),
                retry,
                credentials: RwLock::new(None),
                refresh: tokio::sync::Mutex::new(()),
                accounts: TtlCache::new(ACCOUNT_TTL),
                links: TtlCache::new(LINK_TTL),
            }),
        }
    }

    /// Replace the retry policy. Session and provider are not carried
    /// over, so call this before logging in.
    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        Self::from_parts(
            self.inner.http.clone(),
            self.inner.base_url.clone(),
            self.inner.generator.clone(),
            Some(self.device_id()),
            retry,
        )
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn generator(&self) -> &Generator {
        &self.inner.generator
    }

    pub fn device_id(&self) -> String {
        self.inner
            .device_id
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn set_device_id(&self, device_id: impl Into<String>) {
        *self
            .inner
            .device_id
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = device_id.into();
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.session.get()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.session.user_id()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    pub fn install_session(&self, session: Session) {
        self.inner.session.install(session);
    }

    pub fn clear_session(&self) {
        self.inner.session.clear();
    }

    pub fn set_credential_provider(&self, provider: Arc<dyn CredentialProvider>) {
        *self
            .inner
            .credentials
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(provider);
    }

    pub fn clear_credential_provider(&self) {
        *self
            .inner
            .credentials
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    fn credential_provider(&self) -> Option<Arc<dyn CredentialProvider>> {
        self.inner
            .credentials
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn accounts(&self) -> &TtlCache<Account> {
        &self.inner.accounts
    }

    pub(crate) fn links(&self) -> &TtlCache<i64> {
        &self.inner.links
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Resolve `path` against the service root. Absolute URLs pass through.
    pub fn service_url(&self, path: &str) -> Result<Url, Error> {
        if !path.starts_with('/') {
            return Ok(Url::parse(path)?);
        }
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a request and return the decoded JSON body.
    ///
    /// Transport failures are retried per the retry policy. An invalid
    /// session triggers one re-authentication through the installed
    /// provider, after which the request is sent once more.
    pub async fn handler(&self, method: Method, path: &str, body: Body) -> Result<Value, Error> {
        self.request(method, path, &body, Recovery::Allowed).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        decode(self.handler(Method::Get, path, Body::Empty).await?)
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, Error> {
        decode(self.handler(Method::Post, path, Body::Json(body)).await?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        decode(self.handler(Method::Delete, path, Body::Empty).await?)
    }

    pub(crate) async fn request(
        &self,
        method: Method,
        path: &str,
        body: &Body,
        recovery: Recovery,
    ) -> Result<Value, Error> {
        let used = self.session();
        match self.execute(method, path, body).await {
            Err(err) if err.is_invalid_session() && recovery == Recovery::Allowed => {
                let Some(provider) = self.credential_provider() else {
                    return Err(err);
                };

                // One re-login at a time; later callers reuse its session.
                let guard = self.inner.refresh.lock().await;
                if same_session(used.as_ref(), self.session().as_ref()) {
                    warn!(%method, path, "session invalid, re-authenticating");
                    provider.reauthenticate(self).await.map_err(|e| Error::RecoveryFailed {
                        message: e.to_string(),
                    })?;
                } else {
                    debug!(%method, path, "session already refreshed, resending");
                }
                drop(guard);

                self.execute(method, path, body).await
            }
            other => other,
        }
    }

    async fn execute(&self, method: Method, path: &str, body: &Body) -> Result<Value, Error> {
        let url = self.service_url(path)?;
        let encoded = body.encode()?;
        let max_attempts = self.inner.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = self.build_request(method, url.clone(), encoded.as_ref());

            match request.send().await {
                Ok(resp) => return self.classify(method, &url, resp).await,
                Err(e) => {
                    let err = Error::Transport(e);
                    if attempt >= max_attempts || !err.is_transient() {
                        warn!(%method, url = %url, attempt, error = %err, "request failed");
                        return Err(err);
                    }
                    let delay = self.inner.retry.delay_after(attempt);
                    debug!(
                        %method,
                        url = %url,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transport error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn build_request(
        &self,
        method: Method,
        url: Url,
        encoded: Option<&(Vec<u8>, String)>,
    ) -> reqwest::RequestBuilder {
        let mut headers = self.service_headers();

        let builder = match encoded {
            Some((bytes, content_type)) => {
                insert_header(&mut headers, "content-type", content_type);
                insert_header(
                    &mut headers,
                    "ndc-msg-sig",
                    &self.inner.generator.signature(bytes),
                );
                self.inner
                    .http
                    .request(method.into(), url)
                    .body(bytes.clone())
            }
            None => {
                if method == Method::Post {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
                }
                self.inner.http.request(method.into(), url)
            }
        };

        builder.headers(headers)
    }

    fn service_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("ndclang", HeaderValue::from_static("en"));
        headers.insert("accept-language", HeaderValue::from_static("en-US"));
        insert_header(&mut headers, "ndcdeviceid", &self.device_id());

        match self.inner.session.get() {
            Some(session) => {
                insert_header(&mut headers, "ndcauth", &session.auth_header());
                insert_header(&mut headers, "auid", session.user_id());
            }
            None => {
                insert_header(&mut headers, "auid", &uuid::Uuid::new_v4().to_string());
            }
        }
        headers
    }

    /// Map HTTP status and `api:statuscode` onto a result.
    async fn classify(
        &self,
        method: Method,
        url: &Url,
        resp: reqwest::Response,
    ) -> Result<Value, Error> {
        let status = resp.status();
        if status.is_success() {
            debug!(%method, url = %url, status = status.as_u16(), "request complete");
        } else {
            warn!(%method, url = %url, status = status.as_u16(), "request failed");
        }

        match status.as_u16() {
            403 => return Err(Error::Forbidden),
            502 => return Err(Error::BadGateway),
            503 => return Err(Error::ServiceUnavailable),
            _ => {}
        }

        let body = resp.text().await?;
        if body.trim_start().starts_with("null") {
            return Err(Error::NullResponse);
        }

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(Error::UnexpectedStatus {
                    status: status.as_u16(),
                    body: preview(&body).to_owned(),
                });
            }
            Err(e) => {
                return Err(Error::Deserialization {
                    message: format!("{e} (body preview: {:?})", preview(&body)),
                    body,
                });
            }
        };

        let code = value.get("api:statuscode").and_then(Value::as_i64);
        match code {
            Some(0) | None if status.is_success() => Ok(value),
            Some(code) if code != 0 => Err(api_error(code, &value)),
            _ => Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body: preview(&body).to_owned(),
            }),
        }
    }

    /// Classify an already-decoded envelope.
    pub fn check_envelope(value: &Value) -> Result<ApiResponse, Error> {
        let envelope: ApiResponse =
            serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: value.to_string(),
            })?;
        if envelope.is_success() {
            Ok(envelope)
        } else {
            Err(api_error(envelope.status_code, value))
        }
    }
}

fn api_error(code: i64, value: &Value) -> Error {
    let message = value
        .get("api:message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = match value.get("url").and_then(Value::as_str) {
        Some(url) => format!("{message} ({url})"),
        None => message.to_owned(),
    };
    Error::from_status(code, message)
}

/// Whether two snapshots hold the same sid.
fn same_session(a: Option<&Session>, b: Option<&Session>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.sid().expose_secret() == b.sid().expose_secret(),
        (None, None) => true,
        _ => false,
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(e) => warn!(header = name, error = %e, "dropping invalid header value"),
    }
}

fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn client() -> AminoClient {
        AminoClient::with_client(
            reqwest::Client::new(),
            Url::parse(SERVICE_URL).unwrap(),
            Generator::from_material(&KeyMaterial::builtin()).unwrap(),
        )
    }

    #[test]
    fn service_url_joins_relative_paths() {
        let client = client();
        assert_eq!(
            client.service_url("/g/s/account").unwrap().as_str(),
            "https://service.aminoapps.com/api/v1/g/s/account"
        );
        assert_eq!(
            client.service_url("https://example.com/x").unwrap().as_str(),
            "https://example.com/x"
        );
    }

    #[test]
    fn method_display_is_uppercase() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn unauthenticated_headers_carry_fresh_auid() {
        let client = client();
        let a = client.service_headers();
        let b = client.service_headers();
        assert!(a.get("ndcauth").is_none());
        assert_ne!(a.get("auid"), b.get("auid"));
        assert_eq!(
            a.get("ndcdeviceid").unwrap().to_str().unwrap(),
            client.device_id()
        );
    }

    #[test]
    fn authenticated_headers_carry_sid_and_user() {
        let client = client();
        client.install_session(Session::new("token".to_string().into(), "user-1"));
        let headers = client.service_headers();
        assert_eq!(headers.get("ndcauth").unwrap(), "sid=token");
        assert_eq!(headers.get("auid").unwrap(), "user-1");
    }

    #[test]
    fn api_error_appends_url() {
        let err = api_error(
            110,
            &json!({ "api:statuscode": 110, "api:message": "nope", "url": "narviiapp://x" }),
        );
        assert_eq!(err.to_string(), "ActionNotAllowed (110): nope (narviiapp://x)");
    }

    #[test]
    fn check_envelope_accepts_success() {
        let envelope = AminoClient::check_envelope(&json!({ "api:statuscode": 0, "x": 1 })).unwrap();
        assert_eq!(envelope.extra["x"], 1);
    }

    #[test]
    fn every_mapped_code_raises_its_kind() {
        for kind in crate::error::ApiErrorKind::ALL {
            let body = json!({ "api:statuscode": kind.code(), "api:message": "m" });
            let err = AminoClient::check_envelope(&body).unwrap_err();
            assert_eq!(err.api_kind(), Some(*kind));
        }
        let err =
            AminoClient::check_envelope(&json!({ "api:statuscode": 99_999 })).unwrap_err();
        assert!(matches!(err, Error::Api { kind: None, code: 99_999, .. }));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        assert_eq!(preview(&long).chars().count(), 200);
    }
}
