//! Transport layer.
//!
//! A [`Connector`] opens a [`Transport`] for one host; the dispatcher keeps one
//! open transport per host and sends every request to that host through it.
//! [`ReqwestConnector`] is the default implementation over a `reqwest` client.

use crate::client::{ClientConfig, STREAM_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::types::ServiceEndpoint;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONNECTION, USER_AGENT};
use reqwest::{Certificate, Client, ClientBuilder, RequestBuilder};
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use url::Url;

/// HTTP verbs supported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Returns the verb as sent on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Maps the verb to the HTTP engine's method type.
    #[must_use]
    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Head => reqwest::Method::HEAD,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }

    /// Whether repeating the request has no additional effect.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Put | Self::Delete)
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::InvalidArgument(format!("Unsupported HTTP method: {s}"))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an outgoing request.
#[derive(Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// A finite buffer; cheap to resend
    Bytes(Bytes),
    /// A streaming source, sent chunked and readable only once
    Stream(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl RequestBody {
    /// Serialize a value as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the value cannot be serialized.
    pub fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_vec(value)
            .map(|raw| Self::Bytes(Bytes::from(raw)))
            .map_err(|err| Error::InvalidArgument(format!("Unable to encode request body: {err}")))
    }

    /// Wrap a reader as a streaming body.
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Self::Stream(Box::new(reader))
    }

    /// Whether the body is a stream.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Whether there is no body.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// A fully resolved request handed to a transport.
#[derive(Debug)]
pub struct TransportRequest {
    /// HTTP verb
    pub method: HttpMethod,
    /// Absolute URL
    pub url: Url,
    /// Final header set
    pub headers: HeaderMap,
    /// Body
    pub body: RequestBody,
}

/// Headers every request starts from: JSON accept, keep-alive and user agent.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the user agent is not a valid header value.
pub fn base_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|err| Error::InvalidArgument(format!("Invalid user agent: {err}")))?,
    );
    Ok(headers)
}

/// Build a header value, marking it sensitive so it is never logged.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the value contains invalid characters.
pub fn sensitive_header(value: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| Error::InvalidArgument("Credential contains invalid header characters".to_string()))?;
    header.set_sensitive(true);
    Ok(header)
}

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create a response.
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Raw body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResponseParse`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }

    /// Consume the response and return its body.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// Response body delivered chunk by chunk.
pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

/// A response whose body is read from the wire as the caller consumes it.
pub struct StreamingResponse {
    status: u16,
    headers: HeaderMap,
    body: BodyStream,
}

impl StreamingResponse {
    /// Create a streaming response.
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Next body chunk, or `None` once the body is complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the body is cut off mid-transfer.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        self.body
            .next()
            .await
            .transpose()
            .map_err(|err| Error::Connection(format!("Response body interrupted: {err}")))
    }

    /// Read the rest of the body into a buffered [`Response`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the body is cut off mid-transfer.
    pub async fn buffer(mut self) -> Result<Response> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(Response::new(self.status, self.headers, body.freeze()))
    }

    /// Consume the response and return its body stream.
    #[must_use]
    pub fn into_body(self) -> BodyStream {
        self.body
    }
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Failure reported by a transport while sending a request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the write side
    #[error("broken pipe: {0}")]
    BrokenPipe(String),

    /// The request did not complete in time
    #[error("timed out: {0}")]
    Timeout(String),

    /// The peer reset the connection
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// The response ended early
    #[error("unexpected end of stream: {0}")]
    UnexpectedEof(String),

    /// The socket rejected the operation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No connection could be established
    #[error("connect failed: {0}")]
    Connect(String),

    /// Any other failure
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether reopening the transport and resending may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BrokenPipe(_)
                | Self::Timeout(_)
                | Self::ConnectionReset(_)
                | Self::UnexpectedEof(_)
                | Self::InvalidInput(_)
        )
    }

    /// Classify an I/O error.
    #[must_use]
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        let message = err.to_string();
        match err.kind() {
            ErrorKind::BrokenPipe => Self::BrokenPipe(message),
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout(message),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                Self::ConnectionReset(message)
            }
            ErrorKind::UnexpectedEof => Self::UnexpectedEof(message),
            ErrorKind::InvalidInput => Self::InvalidInput(message),
            ErrorKind::ConnectionRefused | ErrorKind::NotConnected | ErrorKind::AddrNotAvailable => {
                Self::Connect(message)
            }
            _ => Self::Other(message),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout(err.to_string());
        }
        if err.is_connect() {
            return Self::Connect(err.to_string());
        }

        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                return Self::from_io(io);
            }
            source = cause.source();
        }

        if err.is_request() || err.is_body() {
            Self::UnexpectedEof(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// A live channel to one host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Send a request and buffer the response.
    async fn send(&mut self, request: TransportRequest)
        -> std::result::Result<Response, TransportError>;

    /// Send a request and return once the status and headers have arrived.
    async fn send_streaming(
        &mut self,
        request: TransportRequest,
    ) -> std::result::Result<StreamingResponse, TransportError>;
}

/// Opens transports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to the endpoint's host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the client settings are unusable.
    async fn connect(&self, endpoint: &ServiceEndpoint) -> Result<Box<dyn Transport>>;
}

/// Default connector backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    config: ClientConfig,
    ca_cert: Option<Certificate>,
}

impl ReqwestConnector {
    /// Create a connector with the given HTTP settings.
    ///
    /// A configured CA certificate is read and parsed here, once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the CA certificate cannot be read or parsed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let ca_cert = config.tls_ca_cert.as_deref().map(load_ca_cert).transpose()?;
        Ok(Self { config, ca_cert })
    }

    fn build_client(&self, endpoint: &ServiceEndpoint) -> Result<Client> {
        let config = &self.config;
        let mut builder = ClientBuilder::new()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .gzip(config.enable_compression);

        if endpoint.scheme.is_secure() && !config.tls_verify {
            warn!(host = %endpoint.host, "TLS verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(cert) = &self.ca_cert {
            builder = builder.add_root_certificate(cert.clone());
        }

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|err| Error::ConfigError(format!("Invalid proxy: {err}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|err| Error::ConfigError(format!("Failed to build HTTP client: {err}")))
    }
}

impl Default for ReqwestConnector {
    fn default() -> Self {
        Self {
            config: ClientConfig::default(),
            ca_cert: None,
        }
    }
}

fn load_ca_cert(path: &std::path::Path) -> Result<Certificate> {
    debug!("loading CA certificate from {}", path.display());
    let bytes = std::fs::read(path).map_err(|err| {
        Error::ConfigError(format!(
            "Failed to read CA certificate {}: {err}",
            path.display()
        ))
    })?;
    Certificate::from_pem(&bytes)
        .map_err(|err| Error::ConfigError(format!("Invalid CA certificate: {err}")))
}

#[async_trait]
impl Connector for ReqwestConnector {
    async fn connect(&self, endpoint: &ServiceEndpoint) -> Result<Box<dyn Transport>> {
        debug!(host = %endpoint.host, port = endpoint.port, "opening transport");
        let client = self.build_client(endpoint)?;
        Ok(Box::new(ReqwestTransport { client }))
    }
}

/// Transport over a `reqwest` client.
#[derive(Debug)]
struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    fn prepare(&self, request: TransportRequest) -> RequestBuilder {
        let builder = self
            .client
            .request(request.method.to_reqwest(), request.url)
            .headers(request.headers);

        match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream(reader) => {
                let stream = ReaderStream::with_capacity(reader, STREAM_CHUNK_SIZE);
                builder.body(reqwest::Body::wrap_stream(stream))
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &mut self,
        request: TransportRequest,
    ) -> std::result::Result<Response, TransportError> {
        let response = self.prepare(request).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(Response::new(status, headers, body))
    }

    async fn send_streaming(
        &mut self,
        request: TransportRequest,
    ) -> std::result::Result<StreamingResponse, TransportError> {
        let response = self.prepare(request).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(TransportError::from).boxed();

        Ok(StreamingResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_http_method_from_str() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert_eq!("PATCH".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!(matches!(
            "TRACE".parse::<HttpMethod>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_http_method_mapping() {
        assert_eq!(HttpMethod::Head.to_reqwest(), reqwest::Method::HEAD);
        assert_eq!(HttpMethod::Put.to_reqwest(), reqwest::Method::PUT);
        assert_eq!(HttpMethod::Post.to_string(), "POST");
        assert!(HttpMethod::Delete.is_idempotent());
        assert!(!HttpMethod::Post.is_idempotent());
    }

    #[test]
    fn test_transport_error_retryable() {
        assert!(TransportError::BrokenPipe("x".into()).is_retryable());
        assert!(TransportError::Timeout("x".into()).is_retryable());
        assert!(TransportError::ConnectionReset("x".into()).is_retryable());
        assert!(TransportError::UnexpectedEof("x".into()).is_retryable());
        assert!(TransportError::InvalidInput("x".into()).is_retryable());
        assert!(!TransportError::Connect("x".into()).is_retryable());
        assert!(!TransportError::Other("x".into()).is_retryable());
    }

    #[test]
    fn test_transport_error_from_io() {
        use std::io::{Error as IoError, ErrorKind};

        let err = TransportError::from_io(&IoError::new(ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(err, TransportError::BrokenPipe(_)));

        let err = TransportError::from_io(&IoError::new(ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, TransportError::ConnectionReset(_)));

        let err = TransportError::from_io(&IoError::new(ErrorKind::UnexpectedEof, "eof"));
        assert!(matches!(err, TransportError::UnexpectedEof(_)));

        let err = TransportError::from_io(&IoError::new(ErrorKind::ConnectionRefused, "refused"));
        assert!(matches!(err, TransportError::Connect(_)));

        let err = TransportError::from_io(&IoError::new(ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(err, TransportError::Other(_)));
    }

    #[test]
    fn test_request_body_variants() {
        assert!(RequestBody::default().is_empty());
        assert!(RequestBody::stream(Cursor::new(vec![1, 2, 3])).is_stream());

        let body = RequestBody::json(&serde_json::json!({"a": 1})).unwrap();
        match body {
            RequestBody::Bytes(bytes) => assert_eq!(&bytes[..], br#"{"a":1}"#),
            other => panic!("unexpected body {other:?}"),
        }

        assert_eq!(format!("{:?}", RequestBody::from("abc")), "Bytes(3 bytes)");
    }

    #[test]
    fn test_base_headers() {
        let headers = base_headers("openstack-rust/test").unwrap();
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get(CONNECTION).unwrap(), "keep-alive");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "openstack-rust/test");

        assert!(base_headers("bad\nagent").is_err());
    }

    #[test]
    fn test_sensitive_header() {
        let value = sensitive_header("secret-token").unwrap();
        assert!(value.is_sensitive());
        assert!(sensitive_header("line\nbreak").is_err());
    }

    #[test]
    fn test_response_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert("x-auth-token", HeaderValue::from_static("abc"));
        let response = Response::new(203, headers, r#"{"ok":true}"#);

        assert!(response.is_success());
        assert_eq!(response.header("x-auth-token"), Some("abc"));
        assert_eq!(response.header("missing"), None);
        assert_eq!(response.text(), r#"{"ok":true}"#);

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);

        let response = Response::new(404, HeaderMap::new(), "not json");
        assert!(!response.is_success());
        assert!(matches!(
            response.json::<serde_json::Value>(),
            Err(Error::ResponseParse(_))
        ));
    }

    #[tokio::test]
    async fn test_reqwest_transport_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.1/servers"))
            .and(header("x-auth-token", "token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-compute-request-id", "req-1")
                    .set_body_json(serde_json::json!({"servers": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = ServiceEndpoint::parse(&server.uri()).unwrap();
        let mut transport = ReqwestConnector::default().connect(&endpoint).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-auth-token", HeaderValue::from_static("token"));
        let response = transport
            .send(TransportRequest {
                method: HttpMethod::Get,
                url: endpoint.url_for("/v1.1/servers").unwrap(),
                headers,
                body: RequestBody::Empty,
            })
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.header("x-compute-request-id"), Some("req-1"));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["servers"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_reqwest_transport_streams_chunked() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/AUTH_demo/container/object"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let payload = vec![7_u8; STREAM_CHUNK_SIZE * 3 + 17];
        let endpoint = ServiceEndpoint::parse(&server.uri()).unwrap();
        let mut transport = ReqwestConnector::default().connect(&endpoint).await.unwrap();

        let response = transport
            .send(TransportRequest {
                method: HttpMethod::Put,
                url: endpoint.url_for("/v1/AUTH_demo/container/object").unwrap(),
                headers: HeaderMap::new(),
                body: RequestBody::stream(Cursor::new(payload.clone())),
            })
            .await
            .unwrap();
        assert_eq!(response.status(), 201);

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, payload);
        assert!(received[0].headers.get("content-length").is_none());
    }

    #[tokio::test]
    async fn test_reqwest_transport_streams_response() {
        let server = MockServer::start().await;
        let payload = vec![3_u8; STREAM_CHUNK_SIZE * 2 + 5];
        Mock::given(method("GET"))
            .and(path("/v1/AUTH_demo/container/object"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "abc123")
                    .set_body_bytes(payload.clone()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = ServiceEndpoint::parse(&server.uri()).unwrap();
        let mut transport = ReqwestConnector::default().connect(&endpoint).await.unwrap();

        let mut response = transport
            .send_streaming(TransportRequest {
                method: HttpMethod::Get,
                url: endpoint.url_for("/v1/AUTH_demo/container/object").unwrap(),
                headers: HeaderMap::new(),
                body: RequestBody::Empty,
            })
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("etag"), Some("abc123"));

        let mut received = Vec::new();
        while let Some(chunk) = response.chunk().await.unwrap() {
            assert!(!chunk.is_empty());
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_streaming_response_buffer() {
        let chunks: Vec<std::result::Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"{\"a\":")),
            Ok(Bytes::from_static(b"1}")),
        ];
        let response =
            StreamingResponse::new(200, HeaderMap::new(), futures::stream::iter(chunks).boxed());

        let buffered = response.buffer().await.unwrap();
        let value: serde_json::Value = buffered.json().unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_streaming_response_interrupted() {
        let chunks: Vec<std::result::Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransportError::ConnectionReset("reset".to_string())),
        ];
        let mut response =
            StreamingResponse::new(200, HeaderMap::new(), futures::stream::iter(chunks).boxed());

        assert_eq!(
            response.chunk().await.unwrap(),
            Some(Bytes::from_static(b"partial"))
        );
        assert!(matches!(response.chunk().await, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connect_error() {
        let endpoint = ServiceEndpoint::parse("http://127.0.0.1:1").unwrap();
        let mut transport = ReqwestConnector::default().connect(&endpoint).await.unwrap();

        let err = transport
            .send(TransportRequest {
                method: HttpMethod::Get,
                url: endpoint.url_for("/").unwrap(),
                headers: HeaderMap::new(),
                body: RequestBody::Empty,
            })
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_proxy_config_is_accepted() {
        let config = ClientConfig::new().with_proxy(crate::client::ProxyConfig::new("proxy", None));
        let endpoint = ServiceEndpoint::parse("http://a.b.c").unwrap();
        let connector = ReqwestConnector::new(config).unwrap();
        assert!(connector.connect(&endpoint).await.is_ok());
    }

    #[test]
    fn test_missing_ca_cert_is_config_error() {
        let config = ClientConfig::new().with_ca_cert("/nonexistent/ca.pem".into());
        let err = ReqwestConnector::new(config).err();
        assert!(matches!(err, Some(Error::ConfigError(_))));
    }
}
