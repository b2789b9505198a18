//! Authenticated request dispatch.
//!
//! A [`Connection`] authenticates when it is created, keeps one transport per
//! host, injects the token into every request and recovers from two kinds of
//! failure: transport errors (reconnect and resend, bounded by the retry
//! policy) and expired tokens (re-authenticate once, then resend).

use crate::auth::{self, AuthStrategy, AuthVersion};
use crate::catalog::EndpointCatalog;
use crate::config::{ConnectionConfig, ConnectionOptions};
use crate::error::{Error, Result};
use crate::extensions::{self, ExtensionCatalog};
use crate::fault;
use crate::session::SessionState;
use crate::transport::{
    base_headers, sensitive_header, Connector, HttpMethod, ReqwestConnector, RequestBody,
    Response, StreamingResponse, Transport, TransportError, TransportRequest,
};
use async_trait::async_trait;
use crate::types::{Scheme, ServiceEndpoint};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OnceCell, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

type TransportSlot = Arc<AsyncMutex<Option<Box<dyn Transport>>>>;

/// Per-call overrides for [`Connection::request`] and [`Connection::req`].
#[derive(Debug, Default)]
pub struct RequestOptions {
    /// Send to this host instead of the service host
    pub host: Option<String>,
    /// Send to this port instead of the service port
    pub port: Option<u16>,
    /// Use this scheme instead of the service scheme
    pub scheme: Option<Scheme>,
    /// Extra headers; they replace defaults with the same name
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: RequestBody,
}

impl RequestOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the target host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Override the target port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Override the target scheme.
    #[must_use]
    pub const fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a streaming body.
    #[must_use]
    pub fn with_stream<R>(mut self, reader: R) -> Self
    where
        R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static,
    {
        self.body = RequestBody::stream(reader);
        self
    }

    /// Serialize a value as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the value cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = RequestBody::json(value)?;
        Ok(self)
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

/// An authenticated connection to one OpenStack service.
pub struct Connection {
    config: Arc<ConnectionConfig>,
    strategy: Arc<dyn AuthStrategy>,
    connector: Arc<dyn Connector>,
    session: RwLock<SessionState>,
    reauth_lock: AsyncMutex<()>,
    pool: Mutex<HashMap<String, TransportSlot>>,
    extensions: OnceCell<ExtensionCatalog>,
}

impl Connection {
    /// Check the options, authenticate and return a ready connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingArgument`] or [`Error::InvalidArgument`] for bad
    /// options, and any authentication failure.
    pub async fn create(options: ConnectionOptions) -> Result<Self> {
        let config = Arc::new(options.into_config()?);
        let connector: Arc<dyn Connector> =
            Arc::new(ReqwestConnector::new(config.client.clone())?);
        let strategy = auth::strategy_for(Arc::clone(&config), Arc::clone(&connector));
        Self::with_components(config, strategy, connector).await
    }

    /// Build a connection from explicit parts and authenticate it.
    ///
    /// # Errors
    ///
    /// Returns the authentication failure, if any.
    pub async fn with_components(
        config: Arc<ConnectionConfig>,
        strategy: Arc<dyn AuthStrategy>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let connection = Self {
            config,
            strategy,
            connector,
            session: RwLock::new(SessionState::new()),
            reauth_lock: AsyncMutex::new(()),
            pool: Mutex::new(HashMap::new()),
            extensions: OnceCell::new(),
        };
        connection.authenticate().await?;
        Ok(connection)
    }

    /// Send a request and return the raw response.
    ///
    /// Only a 401 is acted on; every other status is returned as is. The path
    /// is used verbatim (no service prefix).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the transport keeps failing, when a
    /// token expired and retry is disabled, or when a stream body would have
    /// to be resent; [`Error::ExpiredAuthToken`] when the service still
    /// answers 401 after re-authentication; and any re-authentication failure.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        self.dispatch(method, path, options).await
    }

    /// Send a request and return as soon as the status and headers arrive.
    ///
    /// The body is read from the wire as the caller consumes it. Reconnects
    /// and the single re-authentication on 401 behave as in
    /// [`Connection::request`] up to the first response byte; a body cut
    /// off afterwards surfaces from [`StreamingResponse::chunk`].
    ///
    /// # Errors
    ///
    /// As [`Connection::request`].
    pub async fn request_stream(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<StreamingResponse> {
        self.dispatch(method, path, options).await
    }

    async fn dispatch<R: Exchange>(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> Result<R> {
        let RequestOptions {
            host,
            port,
            scheme,
            headers: extra_headers,
            body,
        } = options;
        let mut body = Some(body);
        let mut reauthenticated = false;

        loop {
            let (target, headers, generation) = {
                let session = self.session.read().await;
                let target = resolve_target(&session, host.as_deref(), port, scheme)?;
                let headers = self.build_headers(&session, &extra_headers)?;
                (target, headers, session.generation())
            };
            let url = target.url_for(path)?;

            let response: R = self
                .send_with_reconnect(&target, method, &url, &headers, &mut body)
                .await?;
            if response.status() != 401 {
                return Ok(response);
            }

            warn!(%method, %url, "authentication token expired");
            if !self.config.retry_auth_on_expiry {
                return Err(Error::Connection(
                    "Authentication token expired and retry was disabled".to_string(),
                ));
            }
            if reauthenticated {
                return Err(Error::ExpiredAuthToken(format!(
                    "{method} {url} was rejected after re-authentication"
                )));
            }
            if body.is_none() {
                return Err(stream_consumed());
            }

            self.reauthenticate(generation).await?;
            reauthenticated = true;
        }
    }

    /// Send a request below the service path and fail on any non-2xx status.
    ///
    /// `Content-Type: application/json` is added unless the caller sets one.
    ///
    /// # Errors
    ///
    /// As [`Connection::request`], plus [`Error::Api`] for classified faults.
    pub async fn req(
        &self,
        method: HttpMethod,
        path: &str,
        mut options: RequestOptions,
    ) -> Result<Response> {
        let prefix = self
            .session
            .read()
            .await
            .endpoint()
            .map(|endpoint| endpoint.path.clone())
            .unwrap_or_default();
        let full_path = if path.starts_with('/') {
            format!("{prefix}{path}")
        } else {
            format!("{prefix}/{path}")
        };

        if !options.has_header("content-type") {
            options
                .headers
                .push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let response = self.request(method, &full_path, options).await?;
        fault::check(response)
    }

    /// Whether the connection holds a token and endpoint.
    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_authenticated()
    }

    /// Endpoint of the bound service.
    pub async fn service_endpoint(&self) -> Option<ServiceEndpoint> {
        self.session.read().await.endpoint().cloned()
    }

    /// Regions and services advertised at the last authentication.
    pub async fn endpoint_catalog(&self) -> EndpointCatalog {
        self.session.read().await.catalog().clone()
    }

    /// Expiry of the current token, when known.
    pub async fn token_expires(&self) -> Option<DateTime<Utc>> {
        self.session.read().await.token_expires()
    }

    /// Auth protocol in use.
    #[must_use]
    pub fn auth_version(&self) -> AuthVersion {
        self.strategy.version()
    }

    /// Connection configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Drop every pooled transport. Later requests reconnect on demand.
    pub fn close(&self) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(hosts = pool.len(), "closing pooled transports");
        pool.clear();
    }

    /// Extensions advertised by the service, fetched once per connection.
    ///
    /// # Errors
    ///
    /// Returns the failure of the discovery request; nothing is cached then.
    pub async fn extensions(&self) -> Result<&ExtensionCatalog> {
        self.extensions
            .get_or_try_init(|| extensions::discover(self))
            .await
    }

    /// Whether the service advertises the extension alias.
    ///
    /// # Errors
    ///
    /// Returns the failure of the discovery request.
    pub async fn supports_extension(&self, alias: &str) -> Result<bool> {
        Ok(self.extensions().await?.contains(alias))
    }

    async fn authenticate(&self) -> Result<()> {
        let outcome = self.strategy.authenticate().await?;
        self.session.write().await.apply(outcome);
        Ok(())
    }

    /// Re-authenticate unless another caller already did since `seen_generation`.
    async fn reauthenticate(&self, seen_generation: u64) -> Result<()> {
        let _guard = self.reauth_lock.lock().await;
        if self.session.read().await.generation() != seen_generation {
            debug!("token already refreshed by a concurrent request");
            return Ok(());
        }

        info!(auth_version = %self.strategy.version(), "re-authenticating");
        self.authenticate().await
    }

    fn build_headers(
        &self,
        session: &SessionState,
        extra: &[(String, String)],
    ) -> Result<HeaderMap> {
        let mut headers = base_headers(&self.config.client.user_agent)?;

        if let Some(token) = session.token() {
            let value = sensitive_header(token.expose_secret())?;
            if self.config.service_type.uses_storage_token() {
                headers.insert("x-storage-token", value.clone());
            }
            headers.insert("x-auth-token", value);
        }

        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| Error::InvalidArgument(format!("Invalid header name `{name}`: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| Error::InvalidArgument(format!("Invalid value for header `{name}`: {err}")))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    fn transport_slot(&self, target: &ServiceEndpoint) -> TransportSlot {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(pool.entry(target.pool_key()).or_default())
    }

    async fn send_with_reconnect<R: Exchange>(
        &self,
        target: &ServiceEndpoint,
        method: HttpMethod,
        url: &Url,
        headers: &HeaderMap,
        body: &mut Option<RequestBody>,
    ) -> Result<R> {
        let slot = self.transport_slot(target);
        let mut pooled = slot.lock().await;
        let policy = self.config.client.retry_policy;
        let mut reconnects = 0;

        loop {
            let request_body = next_body(body)?;
            let mut transport = match pooled.take() {
                Some(transport) => transport,
                None => self.connector.connect(target).await?,
            };

            debug!(%method, %url, attempt = reconnects, "sending request");
            if reconnects > 0 && !method.is_idempotent() {
                warn!(%method, %url, attempt = reconnects, "resending non-idempotent request");
            }
            if self.config.client.enable_logging {
                if let RequestBody::Bytes(bytes) = &request_body {
                    debug!(body = %String::from_utf8_lossy(bytes), "request body");
                }
            }

            let request = TransportRequest {
                method,
                url: url.clone(),
                headers: headers.clone(),
                body: request_body,
            };

            match R::exchange(&mut *transport, request).await {
                Ok(response) => {
                    *pooled = Some(transport);
                    debug!(%method, %url, status = response.status(), "received response");
                    if self.config.client.enable_logging {
                        response.log_body();
                    }
                    return Ok(response);
                }
                Err(err) if err.is_retryable() => {
                    if reconnects >= policy.max_reconnects {
                        return Err(Error::Connection(format!(
                            "Unable to reconnect to {} after {reconnects} attempts",
                            target.host
                        )));
                    }
                    reconnects += 1;
                    warn!(host = %target.host, error = %err, attempt = reconnects, "transport failed, reconnecting");

                    let delay = policy.delay_for_attempt(reconnects);
                    if delay > Duration::from_millis(0) {
                        sleep(delay).await;
                    }
                }
                Err(err) => {
                    warn!(host = %target.host, error = %err, "transport failed");
                    return Err(Error::Connection(format!(
                        "Unable to connect to {}",
                        target.host
                    )));
                }
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("auth_endpoint", &self.config.auth_endpoint)
            .field("service_type", &self.config.service_type)
            .field("auth_version", &self.strategy.version())
            .finish_non_exhaustive()
    }
}

/// How a response is read off a transport.
#[async_trait]
trait Exchange: Sized + Send {
    async fn exchange(
        transport: &mut dyn Transport,
        request: TransportRequest,
    ) -> std::result::Result<Self, TransportError>;

    fn status(&self) -> u16;

    fn log_body(&self) {}
}

#[async_trait]
impl Exchange for Response {
    async fn exchange(
        transport: &mut dyn Transport,
        request: TransportRequest,
    ) -> std::result::Result<Self, TransportError> {
        transport.send(request).await
    }

    fn status(&self) -> u16 {
        Response::status(self)
    }

    fn log_body(&self) {
        debug!(body = %self.text(), "response body");
    }
}

#[async_trait]
impl Exchange for StreamingResponse {
    async fn exchange(
        transport: &mut dyn Transport,
        request: TransportRequest,
    ) -> std::result::Result<Self, TransportError> {
        transport.send_streaming(request).await
    }

    fn status(&self) -> u16 {
        StreamingResponse::status(self)
    }
}

fn resolve_target(
    session: &SessionState,
    host: Option<&str>,
    port: Option<u16>,
    scheme: Option<Scheme>,
) -> Result<ServiceEndpoint> {
    let base = session
        .endpoint()
        .ok_or_else(|| Error::Connection("Connection is not authenticated".to_string()))?;

    Ok(ServiceEndpoint::new(
        scheme.unwrap_or(base.scheme),
        host.unwrap_or(&base.host),
        port.unwrap_or(base.port),
        base.path.as_str(),
    ))
}

/// Body for the next send. Buffers are kept for resending; streams are handed
/// out once.
fn next_body(body: &mut Option<RequestBody>) -> Result<RequestBody> {
    match body.take() {
        None => Err(stream_consumed()),
        Some(RequestBody::Stream(reader)) => Ok(RequestBody::Stream(reader)),
        Some(RequestBody::Bytes(bytes)) => {
            *body = Some(RequestBody::Bytes(bytes.clone()));
            Ok(RequestBody::Bytes(bytes))
        }
        Some(RequestBody::Empty) => {
            *body = Some(RequestBody::Empty);
            Ok(RequestBody::Empty)
        }
    }
}

fn stream_consumed() -> Error {
    Error::Connection("Request body stream was already sent and cannot be replayed".to_string())
}
